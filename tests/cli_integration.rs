//! CLI integration tests
//!
//! Tests the command-line interface end-to-end: encrypt with generated
//! passphrase material on stdin, decrypt with the saved passphrase file,
//! verify with the passphrase on stdin.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

/// Get path to the supervault binary
fn supervault_bin() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // Remove test binary name
    path.pop(); // Remove deps/
    path.push("supervault");
    path
}

/// Run supervault with the given stdin content
fn run_supervault(args: &[&str], stdin_content: &str) -> std::process::Output {
    let mut child = Command::new(supervault_bin())
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn supervault");

    {
        let stdin = child.stdin.as_mut().expect("failed to open stdin");
        // Ignore BrokenPipe errors - the command may exit before reading
        // stdin if it encounters an error (e.g., file not found)
        let _ = stdin.write_all(stdin_content.as_bytes());
    }

    child.wait_with_output().expect("failed to wait for supervault")
}

/// Words, dates, and personal info sections for the passphrase generator,
/// each terminated by a blank line.
const GENERATOR_INPUT: &str = "orbit\nquartz\n\n2000-01-01\n\npet=ferret\n\n";

/// Find the single file in `dir` whose name starts with `prefix`.
fn find_by_prefix(dir: &Path, prefix: &str) -> PathBuf {
    let mut matches: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().starts_with(prefix))
                .unwrap_or(false)
        })
        .collect();
    assert_eq!(matches.len(), 1, "expected exactly one {prefix}* file in {}", dir.display());
    matches.pop().unwrap()
}

#[test]
fn test_encrypt_decrypt_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let plaintext = temp_dir.path().join("hello.txt");
    fs::write(&plaintext, "hello_abc\n").unwrap();

    let result = run_supervault(
        &[
            "--quiet",
            "encrypt",
            plaintext.to_str().unwrap(),
            "--keep",
            "--passes",
            "1",
            "--lines",
            "120",
        ],
        GENERATOR_INPUT,
    );
    assert!(
        result.status.success(),
        "encrypt failed: {}",
        String::from_utf8_lossy(&result.stderr)
    );
    assert!(plaintext.exists(), "--keep must leave the original in place");

    let container = find_by_prefix(temp_dir.path(), "ENCRYPTED_hello_");
    let passfile = find_by_prefix(temp_dir.path(), "SUPER_PASSWORD_hello_");

    let result = run_supervault(
        &[
            "--quiet",
            "decrypt",
            container.to_str().unwrap(),
            passfile.to_str().unwrap(),
        ],
        "",
    );
    assert!(
        result.status.success(),
        "decrypt failed: {}",
        String::from_utf8_lossy(&result.stderr)
    );

    let decrypted = find_by_prefix(temp_dir.path(), "DECRYPTED_hello_");
    assert_eq!(fs::read_to_string(&decrypted).unwrap(), "hello_abc\n");
}

#[test]
fn test_encrypt_erases_original_by_default() {
    let temp_dir = TempDir::new().unwrap();
    let plaintext = temp_dir.path().join("secret.txt");
    fs::write(&plaintext, "burn after reading").unwrap();

    let result = run_supervault(
        &[
            "--quiet",
            "encrypt",
            plaintext.to_str().unwrap(),
            "--passes",
            "1",
            "--lines",
            "120",
        ],
        GENERATOR_INPUT,
    );
    assert!(
        result.status.success(),
        "encrypt failed: {}",
        String::from_utf8_lossy(&result.stderr)
    );
    assert!(!plaintext.exists(), "original must be erased without --keep");

    let container = find_by_prefix(temp_dir.path(), "ENCRYPTED_secret_");
    let passfile = find_by_prefix(temp_dir.path(), "SUPER_PASSWORD_secret_");

    let result = run_supervault(
        &[
            "--quiet",
            "decrypt",
            container.to_str().unwrap(),
            passfile.to_str().unwrap(),
        ],
        "",
    );
    assert!(result.status.success());

    let decrypted = find_by_prefix(temp_dir.path(), "DECRYPTED_secret_");
    assert_eq!(fs::read_to_string(&decrypted).unwrap(), "burn after reading");
}

#[test]
fn test_verify_accepts_passphrase_file_body_on_stdin() {
    let temp_dir = TempDir::new().unwrap();
    let plaintext = temp_dir.path().join("doc.txt");
    fs::write(&plaintext, "verify me").unwrap();

    let result = run_supervault(
        &[
            "--quiet",
            "encrypt",
            plaintext.to_str().unwrap(),
            "--keep",
            "--passes",
            "1",
            "--lines",
            "120",
        ],
        GENERATOR_INPUT,
    );
    assert!(result.status.success());

    let container = find_by_prefix(temp_dir.path(), "ENCRYPTED_doc_");
    let passfile = find_by_prefix(temp_dir.path(), "SUPER_PASSWORD_doc_");
    let passfile_body = fs::read_to_string(&passfile).unwrap();

    let result = run_supervault(
        &["--quiet", "verify", container.to_str().unwrap()],
        &passfile_body,
    );
    assert!(
        result.status.success(),
        "verify failed: {}",
        String::from_utf8_lossy(&result.stderr)
    );
    let stdout = String::from_utf8_lossy(&result.stdout);
    assert!(stdout.contains("PASSED"), "expected PASSED in output, got: {}", stdout);
}

#[test]
fn test_verify_rejects_wrong_passphrase() {
    let temp_dir = TempDir::new().unwrap();
    let plaintext = temp_dir.path().join("doc.txt");
    fs::write(&plaintext, "verify me").unwrap();

    let result = run_supervault(
        &[
            "--quiet",
            "encrypt",
            plaintext.to_str().unwrap(),
            "--keep",
            "--passes",
            "1",
            "--lines",
            "120",
        ],
        GENERATOR_INPUT,
    );
    assert!(result.status.success());

    let container = find_by_prefix(temp_dir.path(), "ENCRYPTED_doc_");

    let result = run_supervault(
        &["--quiet", "verify", container.to_str().unwrap()],
        "not the passphrase\n",
    );
    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(
        stderr.contains("verification failed"),
        "expected verification failure message, got: {}",
        stderr
    );
}

#[test]
fn test_decrypt_tampered_container_fails() {
    let temp_dir = TempDir::new().unwrap();
    let plaintext = temp_dir.path().join("data.bin");
    fs::write(&plaintext, vec![0x42u8; 4096]).unwrap();

    let result = run_supervault(
        &[
            "--quiet",
            "encrypt",
            plaintext.to_str().unwrap(),
            "--keep",
            "--passes",
            "1",
            "--lines",
            "120",
        ],
        GENERATOR_INPUT,
    );
    assert!(result.status.success());

    let container = find_by_prefix(temp_dir.path(), "ENCRYPTED_data_");
    let passfile = find_by_prefix(temp_dir.path(), "SUPER_PASSWORD_data_");

    let mut bytes = fs::read(&container).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    fs::write(&container, &bytes).unwrap();

    let result = run_supervault(
        &[
            "--quiet",
            "decrypt",
            container.to_str().unwrap(),
            passfile.to_str().unwrap(),
        ],
        "",
    );
    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(
        stderr.contains("tag mismatch") || stderr.contains("corrupt"),
        "expected integrity failure message, got: {}",
        stderr
    );
}

#[test]
fn test_decrypt_nonexistent_container_fails() {
    let temp_dir = TempDir::new().unwrap();
    let container = temp_dir.path().join("missing.svx");
    let passfile = temp_dir.path().join("missing.txt");
    fs::write(&passfile, "L000001_irrelevant_line\n").unwrap();

    let result = run_supervault(
        &[
            "--quiet",
            "decrypt",
            container.to_str().unwrap(),
            passfile.to_str().unwrap(),
        ],
        "",
    );
    assert!(!result.status.success());
}

#[test]
fn test_encrypt_directory_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let src = temp_dir.path().join("project");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("a.txt"), "alpha").unwrap();
    fs::write(src.join("b.txt"), "beta").unwrap();

    let result = run_supervault(
        &[
            "--quiet",
            "encrypt",
            src.to_str().unwrap(),
            "--passes",
            "1",
            "--lines",
            "120",
        ],
        GENERATOR_INPUT,
    );
    assert!(
        result.status.success(),
        "directory encrypt failed: {}",
        String::from_utf8_lossy(&result.stderr)
    );

    let container = find_by_prefix(temp_dir.path(), "ENCRYPTED_project_");
    let passfile = find_by_prefix(temp_dir.path(), "SUPER_PASSWORD_project_");

    let result = run_supervault(
        &[
            "--quiet",
            "decrypt",
            container.to_str().unwrap(),
            passfile.to_str().unwrap(),
        ],
        "",
    );
    assert!(
        result.status.success(),
        "decrypt failed: {}",
        String::from_utf8_lossy(&result.stderr)
    );

    let restored = find_by_prefix(temp_dir.path(), "DECRYPTED_project_");
    let payload = fs::read(&restored).unwrap();
    assert_eq!(&payload[..4], b"PK\x03\x04", "restored payload must be a zip archive");
}
