//! Document input for CLI commands.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;

/// Read a whole document from `path`, or from stdin when `path` is `-`.
pub fn read_document(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read document from stdin")?;
        return Ok(text);
    }

    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read document: {}", path.display()))
}
