mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use common::{commit, init_repo, GRAVITY, NUMERIC, OPTICS};

fn segue_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_segue"))
}

/// A content repository with two commits and a config pointing at it.
fn setup_test_env() -> (TempDir, PathBuf, String, String) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let repo = root.join("content");
    fs::create_dir_all(&repo).unwrap();
    init_repo(&repo);
    let first = commit(
        &repo,
        &[("concepts/gravity.json", GRAVITY), ("concepts/optics.json", OPTICS)],
        "Add concepts",
    );
    let second = commit(
        &repo,
        &[
            ("questions/falling.json", NUMERIC),
            (
                "concepts/broken.json",
                r#"{"id":"broken","type":"isaacConceptPage","relatedContent":["ghost"]}"#,
            ),
            ("drafts/wip.json", r#"{"id":"wip","type":"content","value":"draft"}"#),
        ],
        "Add questions",
    );

    fs::create_dir_all(root.join("config")).unwrap();
    let config_content = format!(
        r#"[db]
path = "{root}/data/segue.sqlite"

[content]
repo_path = "{root}/content"
exclude_globs = ["drafts/**"]

[search]
default_limit = 5
"#,
        root = root.display()
    );
    let config_path = root.join("config").join("segue.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path, first, second)
}

fn run_segue(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = segue_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run segue binary at {:?}: {}", binary, e));

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

#[test]
fn test_init_is_idempotent() {
    let (_tmp, config, _, _) = setup_test_env();
    for _ in 0..2 {
        let (stdout, stderr, ok) = run_segue(&config, &["init"]);
        assert!(ok, "init failed: {}", stderr);
        assert!(stdout.contains("Database initialized successfully."));
    }
}

#[test]
fn test_versions_lists_commits() {
    let (_tmp, config, first, second) = setup_test_env();
    run_segue(&config, &["init"]);

    let (stdout, stderr, ok) = run_segue(&config, &["versions"]);
    assert!(ok, "versions failed: {}", stderr);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with(&second[..12]));
    assert!(lines[0].contains("Add questions"));
    assert!(lines[1].starts_with(&first[..12]));
}

#[test]
fn test_index_head_and_query() {
    let (_tmp, config, _first, second) = setup_test_env();
    run_segue(&config, &["init"]);

    let (stdout, stderr, ok) = run_segue(&config, &["index", "head", "--live"]);
    assert!(ok, "index failed: {}", stderr);
    assert!(stdout.contains(&format!("Indexed version {}", second)));
    assert!(stdout.contains(&format!("Live version is now {}", second)));

    let (stdout, _, ok) = run_segue(&config, &["index", &second]);
    assert!(ok);
    assert!(stdout.contains("already indexed"));

    let (stdout, stderr, ok) = run_segue(&config, &["search", "gravty"]);
    assert!(ok, "search failed: {}", stderr);
    assert!(stdout.contains("1. Gravity (isaacConceptPage)"));

    let (stdout, _, ok) = run_segue(&config, &["search", "draft"]);
    assert!(ok);
    assert!(stdout.contains("No results."));

    let (stdout, stderr, ok) = run_segue(&config, &["get", "falling|g"]);
    assert!(ok, "get failed: {}", stderr);
    let dto: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(dto["type"], "isaacNumericQuestion");

    let (stdout, _, ok) = run_segue(&config, &["problems"]);
    assert!(ok);
    assert!(stdout.contains("concepts/broken.json [broken]"));
    assert!(stdout.contains("ghost"));
}

#[test]
fn test_older_version_is_readable() {
    let (_tmp, config, first, _second) = setup_test_env();
    run_segue(&config, &["init"]);

    let (_, _, ok) = run_segue(&config, &["get", "falling", "--version", &first]);
    assert!(!ok);

    let (stdout, stderr, ok) = run_segue(&config, &["get", "optics", "--version", &first]);
    assert!(ok, "get failed: {}", stderr);
    assert!(stdout.contains("Light and lenses"));
}

#[test]
fn test_unknown_version_fails() {
    let (_tmp, config, _, _) = setup_test_env();
    run_segue(&config, &["init"]);
    let bogus = "0123456789abcdef0123456789abcdef01234567";
    let (_, stderr, ok) = run_segue(&config, &["index", bogus]);
    assert!(!ok);
    assert!(stderr.contains("content version not found"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, ok) = run_segue(&tmp.path().join("nope.toml"), &["versions"]);
    assert!(!ok);
    assert!(stderr.contains("Failed to read config file"));
}
