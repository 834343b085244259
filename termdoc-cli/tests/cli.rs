use assert_cmd::Command;
use tempfile::tempdir;

#[test]
fn missing_file_is_reported() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("absent.pdf");
    let output = Command::cargo_bin("termdoc")
        .unwrap()
        .arg(&missing)
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("file not found"), "stderr: {stderr}");
    assert!(stderr.contains("absent.pdf"));
}

#[test]
fn a_document_is_required() {
    Command::cargo_bin("termdoc").unwrap().assert().failure();
}

#[test]
fn help_lists_options() {
    let output = Command::cargo_bin("termdoc")
        .unwrap()
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for flag in ["--page", "--first-page", "--nvim-listen-address", "--citekey", "--ignore-cache"] {
        assert!(stdout.contains(flag), "missing {flag}");
    }
}
