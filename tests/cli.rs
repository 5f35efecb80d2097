use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn docchat_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("docchat");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(files_dir.join("My Report.PDF"), b"hello").unwrap();
    fs::write(
        files_dir.join("notes.txt"),
        "Refunds are accepted within thirty days.\n\nShipping is free above fifty euros.",
    )
    .unwrap();
    fs::write(files_dir.join("README"), "plain notes without an extension").unwrap();

    let config_content = format!(
        r#"[data]
root = "{}/data"

[embedding]
provider = "disabled"

[llm]
provider = "disabled"
"#,
        root.display()
    );
    let config_path = config_dir.join("docchat.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_docchat(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docchat_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docchat binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn file_arg(config_path: &Path, name: &str) -> String {
    config_path
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("files")
        .join(name)
        .to_string_lossy()
        .into_owned()
}

#[test]
fn test_init_creates_layout_and_is_idempotent() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_docchat(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    for dir in ["uploaded_files", "vectorstores", "chat_history"] {
        assert!(tmp.path().join("data").join(dir).is_dir(), "missing {}", dir);
    }

    let (_, _, success) = run_docchat(&config_path, &["init"]);
    assert!(success, "second init failed (not idempotent)");
}

#[test]
fn test_upload_list_delete_example() {
    let (tmp, config_path) = setup_test_env();
    let report = file_arg(&config_path, "My Report.PDF");

    let (stdout, stderr, success) = run_docchat(&config_path, &["upload", &report]);
    assert!(success, "upload failed: {}", stderr);
    assert_eq!(stdout.trim(), "my_report_5d414.pdf");

    // Same file again: same name, no duplicate.
    let (stdout, _, _) = run_docchat(&config_path, &["upload", &report]);
    assert_eq!(stdout.trim(), "my_report_5d414.pdf");

    let (stdout, _, success) = run_docchat(&config_path, &["collections"]);
    assert!(success);
    assert_eq!(stdout.lines().collect::<Vec<_>>(), vec!["my_report_5d414.pdf"]);

    // Give the collection an index directory and a history file.
    let data = tmp.path().join("data");
    fs::create_dir_all(data.join("vectorstores/my_report_5d414.pdf")).unwrap();
    fs::write(
        data.join("chat_history/my_report_5d414.pdf.md"),
        "**User:** hi\n\n**Assistant:** hello\n\n",
    )
    .unwrap();

    let (stdout, _, success) = run_docchat(&config_path, &["history", "my_report_5d414.pdf"]);
    assert!(success);
    assert_eq!(stdout, "User: hi\nAssistant: hello\n");

    let (stdout, stderr, success) =
        run_docchat(&config_path, &["delete", "my_report_5d414.pdf"]);
    assert!(success, "delete failed: {}", stderr);
    assert!(stdout.contains("file, vector store, chat history"), "{}", stdout);
    assert!(!data.join("uploaded_files/my_report_5d414.pdf").exists());
    assert!(!data.join("vectorstores/my_report_5d414.pdf").exists());
    assert!(!data.join("chat_history/my_report_5d414.pdf.md").exists());

    let (stdout, _, _) = run_docchat(&config_path, &["collections"]);
    assert!(stdout.contains("No collections."));
}

#[test]
fn test_delete_nonexistent_succeeds() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_docchat(&config_path, &["delete", "ghost_00000.pdf"]);
    assert!(success, "delete failed: {}", stderr);
    assert!(stdout.contains("Nothing to delete"));
}

#[test]
fn test_delete_rejects_path_traversal() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_docchat(&config_path, &["delete", ".."]);
    assert!(!success);
    assert!(stderr.contains("invalid collection name"), "{}", stderr);
}

#[test]
fn test_upload_without_extension_needs_file_type() {
    let (_tmp, config_path) = setup_test_env();
    let readme = file_arg(&config_path, "README");

    let (_, stderr, success) = run_docchat(&config_path, &["upload", &readme]);
    assert!(!success);
    assert!(stderr.contains("--file-type"), "{}", stderr);

    let (stdout, stderr, success) =
        run_docchat(&config_path, &["upload", &readme, "--file-type", "txt"]);
    assert!(success, "upload failed: {}", stderr);
    assert!(stdout.trim().starts_with("readme_") && stdout.trim().ends_with(".txt"));
}

#[test]
fn test_clear_history() {
    let (tmp, config_path) = setup_test_env();
    let notes = file_arg(&config_path, "notes.txt");
    let (stdout, _, _) = run_docchat(&config_path, &["upload", &notes]);
    let name = stdout.trim().to_string();

    let history = tmp.path().join("data/chat_history").join(format!("{}.md", name));
    fs::write(&history, "**User:** q\n\n").unwrap();

    let (_, stderr, success) = run_docchat(&config_path, &["clear", &name]);
    assert!(success, "clear failed: {}", stderr);
    assert_eq!(fs::read_to_string(&history).unwrap(), "");

    let (_, _, success) = run_docchat(&config_path, &["clear", "missing_00000.txt"]);
    assert!(!success);
}

#[test]
fn test_ask_with_disabled_providers_fails_cleanly() {
    let (_tmp, config_path) = setup_test_env();
    let notes = file_arg(&config_path, "notes.txt");
    let (stdout, _, _) = run_docchat(&config_path, &["upload", &notes]);
    let name = stdout.trim().to_string();

    let (_, stderr, success) = run_docchat(&config_path, &["ask", &name, "How long for refunds?"]);
    assert!(!success);
    assert!(stderr.contains("disabled"), "{}", stderr);

    // Nothing was answered, so nothing was persisted.
    let (stdout, _, _) = run_docchat(&config_path, &["history", &name]);
    assert!(stdout.contains("No chat history"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_tmp, config_path) = setup_test_env();
    fs::write(&config_path, "[chunking]\nchunk_size = 100\nchunk_overlap = 200\n").unwrap();
    let (_, stderr, success) = run_docchat(&config_path, &["collections"]);
    assert!(!success);
    assert!(stderr.contains("chunk_overlap"), "{}", stderr);
}
