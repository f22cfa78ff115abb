use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn atelier_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("atelier");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/atelier.sqlite"

[server]
bind = "127.0.0.1:7340"

[completion.gemini]
api_key_env = "ATELIER_TEST_NO_GEMINI_KEY"

[completion.openai]
api_key_env = "ATELIER_TEST_NO_OPENAI_KEY"
"#,
        root.display()
    );

    let config_path = config_dir.join("atelier.toml");
    fs::write(&config_path, config_content).unwrap();

    fs::write(
        root.join("feed.xml"),
        r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Lab</title>
<item><title>Sparse Attention</title><link>https://arxiv.org/abs/2401.01234</link>
<pubDate>Tue, 02 Jan 2024 10:00:00 GMT</pubDate></item>
</channel></rss>"#,
    )
    .unwrap();

    (tmp, config_path)
}

fn run_atelier(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = atelier_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run atelier binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config) = setup_test_env();
    let (stdout, _, success) = run_atelier(&config, &["init"]);
    assert!(success);
    assert!(stdout.contains("Database initialized"));
    assert!(tmp.path().join("data/atelier.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config) = setup_test_env();
    let (_, _, first) = run_atelier(&config, &["init"]);
    let (_, _, second) = run_atelier(&config, &["init"]);
    assert!(first && second);
}

#[test]
fn test_tags_create_list_and_merge() {
    let (_tmp, config) = setup_test_env();
    run_atelier(&config, &["init"]);

    let (stdout, _, success) = run_atelier(&config, &["tags", "create", "machine-learning"]);
    assert!(success);
    let id = stdout.split_whitespace().next().unwrap().to_string();

    let (stdout, _, success) = run_atelier(&config, &["tags", "list"]);
    assert!(success);
    assert!(stdout.contains("machine-learning"));

    let (stdout, stderr, success) = run_atelier(&config, &["tags", "merge", "ML", &id]);
    assert!(success, "merge failed: {}", stderr);
    assert!(stdout.contains("merge into 'ML'"));
    assert!(stdout.contains("tags deleted: 1"));

    let (stdout, _, _) = run_atelier(&config, &["tags", "list"]);
    assert!(stdout.contains("ML"));
    assert!(!stdout.contains("machine-learning"));
}

#[test]
fn test_list_empty_collection() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, success) = run_atelier(&config, &["list", "papers"]);
    assert!(success);
    assert!(stdout.contains("No papers."));
}

#[test]
fn test_list_unknown_collection_errors() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, success) = run_atelier(&config, &["list", "recipes"]);
    assert!(!success);
    assert!(stderr.contains("unknown collection"));
}

#[test]
fn test_generate_without_keys_errors() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, success) = run_atelier(&config, &["generate", "hello"]);
    assert!(!success);
    assert!(stderr.contains("no completion provider configured"));
}

#[test]
fn test_feed_from_file() {
    let (tmp, config) = setup_test_env();
    let feed = tmp.path().join("feed.xml");
    let (stdout, _, success) = run_atelier(&config, &["feed", feed.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("1 items"));
    assert!(stdout.contains("2024-01-02  Sparse Attention"));
}

#[test]
fn test_trending_without_feeds() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, success) = run_atelier(&config, &["trending"]);
    assert!(success);
    assert!(stdout.contains("No trending feeds configured"));
}

#[test]
fn test_missing_config_errors() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_atelier(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
