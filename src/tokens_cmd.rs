//! `ragviz tokens`: count tokens in a document.
//!
//! Asks the configured provider first. Providers without a token counter
//! (and mock mode) fall back to the `ceil(chars / 4)` estimate.

use anyhow::Result;
use std::path::Path;

use ragviz_core::TokenCount;

use crate::config::Config;
use crate::embedding::create_provider;
use crate::input::read_document;

pub async fn run_tokens(config: &Config, path: &Path) -> Result<()> {
    let text = read_document(path)?;
    let provider = create_provider(&config.embedding)?;
    let count = provider.count_tokens(&text).await;
    println!("{}", format_count(count));
    Ok(())
}

pub fn format_count(count: TokenCount) -> String {
    match count {
        TokenCount::Provider(n) => format!("{} tokens (provider)", n),
        TokenCount::Estimated(n) => format!("{} tokens (estimated)", n),
    }
}
