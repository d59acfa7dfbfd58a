use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

const CATS: &str = "Cats are small furry animals that people keep as pets.";
const PARIS: &str = "Paris is a large city in France known for art.";

fn ragviz_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_ragviz"))
}

fn setup_test_env() -> (TempDir, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let doc_path = root.join("animals.txt");
    fs::write(&doc_path, format!("{}\n\n{}\n", CATS, PARIS)).unwrap();

    let config_content = r#"[chunking]
chunk_size = 10
overlap = 0

[embedding]
provider = "mock"
dims = 32
fallback_seed = 7

[visualization]
seed = 0.5
top_k = 5

[server]
bind = "127.0.0.1:7341"
"#;

    let config_path = config_dir.join("ragviz.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path, doc_path)
}

fn run_ragviz(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ragviz_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ragviz binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_chunk_prints_spans() {
    let (_tmp, config_path, doc_path) = setup_test_env();
    let (stdout, stderr, success) = run_ragviz(&config_path, &["chunk", doc_path.to_str().unwrap()]);

    assert!(success, "chunk failed: {}", stderr);
    assert!(stdout.contains("2 chunks from 20 words (size 10, overlap 0, step 10)"));
    assert!(stdout.contains("chunk-1 (words 0..10, 10 words)"));
    assert!(stdout.contains("chunk-2 (words 10..20, 10 words)"));
    assert!(stdout.contains(CATS));
}

#[test]
fn test_chunk_json_clamps_parameters() {
    let (_tmp, config_path, doc_path) = setup_test_env();
    let (stdout, stderr, success) = run_ragviz(
        &config_path,
        &[
            "chunk",
            doc_path.to_str().unwrap(),
            "--chunk-size",
            "3",
            "--overlap",
            "-4",
            "--json",
        ],
    );

    assert!(success, "chunk --json failed: {}", stderr);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["params"]["chunk_size"], 10);
    assert_eq!(json["params"]["overlap"], 0);
    assert_eq!(json["total_words"], 20);

    let chunks = json["chunks"].as_array().unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0]["id"], "chunk-1");
    assert_eq!(chunks[1]["end_word"], 20);
}

#[test]
fn test_chunk_reads_stdin() {
    let (_tmp, config_path, _doc) = setup_test_env();
    let mut child = Command::new(ragviz_binary())
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(["chunk", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"   one two   three  ")
        .unwrap();
    let output = child.wait_with_output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("1 chunks from 3 words"));
    assert!(stdout.contains("\"one two three\""));
}

#[test]
fn test_chunk_empty_document_yields_one_empty_chunk() {
    let (tmp, config_path, _doc) = setup_test_env();
    let empty = tmp.path().join("empty.txt");
    fs::write(&empty, "  \n\t ").unwrap();

    let (stdout, _stderr, success) =
        run_ragviz(&config_path, &["chunk", empty.to_str().unwrap(), "--json"]);
    assert!(success);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let chunks = json["chunks"].as_array().unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0]["text"], "");
    assert_eq!(chunks[0]["start_word"], 0);
    assert_eq!(chunks[0]["end_word"], 0);
}

#[test]
fn test_query_mock_mode_warns_and_ranks_every_chunk() {
    let (_tmp, config_path, doc_path) = setup_test_env();
    let (stdout, stderr, success) = run_ragviz(
        &config_path,
        &["query", doc_path.to_str().unwrap(), "Where do cats live?"],
    );

    assert!(success, "query failed: {}", stderr);
    assert!(stderr.contains("mock embeddings"));
    assert!(stdout.contains("Indexed 2 chunks (20 words, 32 dims, model mock)"));
    assert!(stdout.contains("1. ["));
    assert!(stdout.contains("2. ["));
    assert!(stdout.contains("point: ("));
}

#[test]
fn test_query_json_payload_is_reproducible() {
    let (_tmp, config_path, doc_path) = setup_test_env();
    let args = [
        "query",
        doc_path.to_str().unwrap(),
        "Where do cats live?",
        "--seed",
        "1.25",
        "--json",
    ];

    let (first, stderr, success) = run_ragviz(&config_path, &args);
    assert!(success, "query --json failed: {}", stderr);
    let (second, _, _) = run_ragviz(&config_path, &args);
    assert_eq!(first, second);

    let json: serde_json::Value = serde_json::from_str(&first).unwrap();
    assert_eq!(json["index"]["chunk_count"], 2);
    assert_eq!(json["index"]["fallback_count"], 2);
    assert_eq!(json["result"]["seed"], 1.25);
    assert_eq!(json["result"]["query_fallback"], true);

    let hits = json["result"]["hits"].as_array().unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0]["rank"], 1);
    let s0 = hits[0]["score"].as_f64().unwrap();
    let s1 = hits[1]["score"].as_f64().unwrap();
    assert!(s0 >= s1);
    assert!(hits[0]["projection"]["x"].is_number());
}

#[test]
fn test_query_blank_is_error() {
    let (_tmp, config_path, doc_path) = setup_test_env();
    let (_stdout, stderr, success) =
        run_ragviz(&config_path, &["query", doc_path.to_str().unwrap(), "   "]);
    assert!(!success);
    assert!(stderr.contains("query must not be empty"));
}

#[test]
fn test_query_non_finite_seed_is_error() {
    let (_tmp, config_path, doc_path) = setup_test_env();
    for seed in ["NaN", "inf"] {
        let (stdout, stderr, success) = run_ragviz(
            &config_path,
            &["query", doc_path.to_str().unwrap(), "cats", "--seed", seed],
        );
        assert!(!success);
        assert!(stdout.is_empty());
        assert!(stderr.contains("--seed must be a finite number"));
    }
}

#[test]
fn test_tokens_estimated_without_provider() {
    let (tmp, config_path, _doc) = setup_test_env();
    let doc = tmp.path().join("nine.txt");
    fs::write(&doc, "123456789").unwrap();

    let (stdout, stderr, success) = run_ragviz(&config_path, &["tokens", doc.to_str().unwrap()]);
    assert!(success, "tokens failed: {}", stderr);
    assert_eq!(stdout.trim(), "3 tokens (estimated)");
}

#[test]
fn test_missing_config_uses_defaults() {
    let (tmp, _config_path, doc_path) = setup_test_env();
    let missing = tmp.path().join("config").join("absent.toml");

    let (stdout, stderr, success) =
        run_ragviz(&missing, &["chunk", doc_path.to_str().unwrap()]);
    assert!(success, "chunk with default config failed: {}", stderr);
    // 20 words fit in one default 50-word window
    assert!(stdout.contains("1 chunks from 20 words (size 50, overlap 10, step 40)"));
}

#[test]
fn test_missing_api_key_degrades_to_mock() {
    let (tmp, _config_path, doc_path) = setup_test_env();
    let config_path = tmp.path().join("config").join("gemini.toml");
    fs::write(&config_path, "[embedding]\nprovider = \"gemini\"\n").unwrap();

    let output = Command::new(ragviz_binary())
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(["query", doc_path.to_str().unwrap(), "cats", "--json"])
        .env_remove("GEMINI_API_KEY")
        .output()
        .unwrap();

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "query failed: {}", stderr);
    assert!(stderr.contains("GEMINI_API_KEY not set"));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["index"]["model"], "mock");
    assert_eq!(json["index"]["dims"], 768);
}

#[test]
fn test_invalid_config_is_rejected() {
    let (tmp, _config_path, doc_path) = setup_test_env();
    let config_path = tmp.path().join("config").join("bad.toml");
    fs::write(&config_path, "[embedding]\nprovider = \"magic\"\n").unwrap();

    let (_stdout, stderr, success) =
        run_ragviz(&config_path, &["chunk", doc_path.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("Unknown embedding provider"));
}

#[test]
fn test_missing_document_is_error() {
    let (tmp, config_path, _doc) = setup_test_env();
    let missing = tmp.path().join("nope.txt");

    let (_stdout, stderr, success) =
        run_ragviz(&config_path, &["chunk", missing.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("Failed to read document"));
}

#[test]
fn test_completions_bash() {
    let (_tmp, config_path, _doc) = setup_test_env();
    let (stdout, _stderr, success) = run_ragviz(&config_path, &["completions", "bash"]);
    assert!(success);
    assert!(stdout.contains("ragviz"));
}
