//! Path-level encryption, decryption, and verification.
//!
//! These functions wire the engine to the filesystem: reading inputs,
//! deriving output names, writing containers atomically (tempfile + fsync +
//! rename), and running best-effort secure erasure of originals. All
//! cryptographic correctness lives in [`crate::engine`].

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::archive;
use crate::engine::{DecryptOutcome, EncryptOptions, Engine, SourceInfo, VerifyReport};
use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};
use crate::event::EventSink;
use crate::shred;

/// Result of encrypting one path.
#[derive(Debug)]
pub struct EncryptReport {
    pub container_path: PathBuf,
    pub original_size: u64,
    pub container_size: u64,
    pub was_compressed: bool,
    pub compression_ratio: f64,
    /// Set when the original was requested erased but erasure failed; the
    /// failure is logged, never propagated.
    pub erase_failed: bool,
}

/// Result of decrypting one container to disk.
#[derive(Debug)]
pub struct DecryptReport {
    pub output_path: PathBuf,
    pub restored_size: u64,
    /// The payload authenticated but its compressed stream would not
    /// inflate; the raw bytes were written instead.
    pub partial: bool,
    pub warnings: Vec<String>,
}

/// Aggregate outcome of per-file directory encryption. Files succeed or
/// fail independently; there is no rollback.
pub struct DirectorySummary {
    pub total_files: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub reports: Vec<(PathBuf, Result<EncryptReport>)>,
}

/// Encrypts a single file, writing `ENCRYPTED_<stem>_<timestamp>.svx` next
/// to it. When `erase_original` is set the input is securely overwritten
/// after the container is safely on disk; erase failures are logged and
/// reported, never raised.
pub fn encrypt_file(
    input: &Path,
    passphrase: &str,
    options: &EncryptOptions,
    erase_original: bool,
    sink: &dyn EventSink,
) -> Result<EncryptReport> {
    let plaintext = fs::read(input).map_err(|e| read_error(input, e))?;

    let source = SourceInfo {
        name: file_name(input),
        path: input
            .canonicalize()
            .unwrap_or_else(|_| input.to_path_buf())
            .display()
            .to_string(),
    };

    let engine = Engine::new(sink);
    let outcome = engine.encrypt(&plaintext, passphrase, &source, options)?;

    let container_path = sibling_path(input, &container_name(input));
    write_file_atomic(&container_path, &outcome.container)?;

    let mut erase_failed = false;
    if erase_original {
        if let Err(e) = shred::erase(input, options.secure_delete_passes, sink) {
            tracing::warn!(error = %e, path = %input.display(), "secure erase failed");
            erase_failed = true;
        }
    }

    Ok(EncryptReport {
        container_size: outcome.container.len() as u64,
        container_path,
        original_size: outcome.original_size,
        was_compressed: outcome.was_compressed,
        compression_ratio: outcome.compression_ratio,
        erase_failed,
    })
}

/// Encrypts a directory as a single archive container. The intermediate
/// archive is a scoped temporary file, removed whatever the outcome.
pub fn encrypt_directory(
    dir: &Path,
    passphrase: &str,
    options: &EncryptOptions,
    sink: &dyn EventSink,
) -> Result<EncryptReport> {
    let packed = archive::pack(dir, sink)?;
    let payload = fs::read(packed.path()).map_err(|e| read_error(packed.path(), e))?;

    let source = SourceInfo {
        name: format!("{}.zip", file_name(dir)),
        path: dir
            .canonicalize()
            .unwrap_or_else(|_| dir.to_path_buf())
            .display()
            .to_string(),
    };

    let engine = Engine::new(sink);
    let outcome = engine.encrypt(&payload, passphrase, &source, options)?;

    let container_path = sibling_path(dir, &container_name(dir));
    write_file_atomic(&container_path, &outcome.container)?;

    Ok(EncryptReport {
        container_size: outcome.container.len() as u64,
        container_path,
        original_size: outcome.original_size,
        was_compressed: outcome.was_compressed,
        compression_ratio: outcome.compression_ratio,
        erase_failed: false,
    })
}

/// Encrypts every regular file under `dir` individually, strictly
/// sequentially. Each file's result is reported on its own.
pub fn encrypt_directory_individually(
    dir: &Path,
    passphrase: &str,
    options: &EncryptOptions,
    erase_originals: bool,
    sink: &dyn EventSink,
) -> Result<DirectorySummary> {
    if !dir.is_dir() {
        return Err(VaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::InvalidInput,
            format!("{} is not a directory", dir.display()),
        ));
    }

    // Snapshot the file list up front so freshly written containers are
    // never picked up by the walk itself.
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(dir) {
        let entry = entry.map_err(|e| {
            VaultError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("failed to walk {}", dir.display()),
                e,
            )
        })?;
        if entry.file_type().is_file() {
            files.push(entry.path().to_path_buf());
        }
    }

    let mut reports = Vec::new();
    for path in files {
        let result = encrypt_file(&path, passphrase, options, erase_originals, sink);
        if let Err(e) = &result {
            tracing::warn!(path = %path.display(), error = %e, "file encryption failed");
        }
        reports.push((path, result));
    }

    let succeeded = reports.iter().filter(|(_, r)| r.is_ok()).count();
    Ok(DirectorySummary {
        total_files: reports.len(),
        succeeded,
        failed: reports.len() - succeeded,
        reports,
    })
}

/// Decrypts a container to `DECRYPTED_<...>` next to it.
pub fn decrypt_file(
    container: &Path,
    passphrase: &str,
    sink: &dyn EventSink,
) -> Result<DecryptReport> {
    let bytes = fs::read(container).map_err(|e| read_error(container, e))?;

    let engine = Engine::new(sink);
    let outcome = engine.decrypt(&bytes, passphrase, true)?;

    let output_path = sibling_path(container, &decrypted_name(container, &outcome.header.original_name));
    let DecryptOutcome { payload, warnings, .. } = outcome;
    let partial = payload.is_partial();
    let restored = payload.into_bytes();
    write_file_atomic(&output_path, &restored)?;

    Ok(DecryptReport {
        output_path,
        restored_size: restored.len() as u64,
        partial,
        warnings,
    })
}

/// Pre-flight container verification; reads the container and delegates to
/// [`Engine::verify`]. No plaintext is produced.
pub fn verify_file(container: &Path, passphrase: &str, sink: &dyn EventSink) -> Result<VerifyReport> {
    let bytes = fs::read(container).map_err(|e| read_error(container, e))?;
    Ok(Engine::new(sink).verify(&bytes, passphrase))
}

/// `ENCRYPTED_<stem>_<YYYYmmdd_HHMMSS>.svx`
fn container_name(input: &Path) -> String {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    format!("ENCRYPTED_{}_{stamp}.svx", file_stem(input))
}

/// Derives the restored file name: `ENCRYPTED_` becomes `DECRYPTED_` (or the
/// prefix is added), and the recorded original extension is appended when
/// the stem carries none of its own.
fn decrypted_name(container: &Path, original_name: &str) -> String {
    let stem = file_stem(container);
    let mut base = if stem.contains("ENCRYPTED_") {
        stem.replace("ENCRYPTED_", "DECRYPTED_")
    } else {
        format!("DECRYPTED_{stem}")
    };

    if !base.contains('.') {
        if let Some((_, ext)) = original_name.rsplit_once('.') {
            base.push('.');
            base.push_str(ext);
        }
    }
    base
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

fn file_stem(path: &Path) -> String {
    path.file_stem().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

fn sibling_path(reference: &Path, name: &str) -> PathBuf {
    reference.parent().unwrap_or_else(|| Path::new(".")).join(name)
}

/// Writes atomically: tempfile in the target directory, flush, fsync, then
/// rename. Either the complete file exists or nothing does.
fn write_file_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to create tempfile",
            e,
        )
    })?;
    temp.write_all(contents).map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to write to tempfile",
            e,
        )
    })?;
    temp.flush().map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to flush tempfile",
            e,
        )
    })?;
    temp.as_file().sync_all().map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to sync file prior to rename",
            e,
        )
    })?;
    temp.persist(path).map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            format!("failed to rename to target file {}", path.display()),
            e,
        )
    })?;
    Ok(())
}

fn read_error(path: &Path, err: io::Error) -> VaultError {
    let category = if err.kind() == io::ErrorKind::NotFound {
        ErrorCategory::User
    } else {
        ErrorCategory::Internal
    };
    VaultError::with_kind_and_source(
        category,
        ErrorKind::Io,
        format!("failed to read from {}", path.display()),
        err,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{NullSink, VaultEvent};
    use std::io::Read;
    use tempfile::TempDir;

    fn options() -> EncryptOptions {
        EncryptOptions { compress: true, secure_delete_passes: 2 }
    }

    #[test]
    fn file_round_trip_on_disk() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("notes.txt");
        fs::write(&input, b"hello_abc").unwrap();

        let report = encrypt_file(&input, "pass", &options(), false, &NullSink).unwrap();
        assert!(report.container_path.exists());
        assert!(input.exists()); // not erased
        assert_eq!(report.original_size, 9);

        let restored = decrypt_file(&report.container_path, "pass", &NullSink).unwrap();
        assert!(restored.output_path.exists());
        assert!(!restored.partial);
        assert_eq!(fs::read(&restored.output_path).unwrap(), b"hello_abc");
        let name = restored.output_path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("DECRYPTED_notes_"), "unexpected name: {name}");
        assert!(name.ends_with(".txt"), "extension not restored: {name}");
    }

    #[test]
    fn original_erased_after_encrypt() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("secret.bin");
        fs::write(&input, vec![7u8; 256]).unwrap();

        let report = encrypt_file(&input, "pass", &options(), true, &NullSink).unwrap();
        assert!(!input.exists());
        assert!(!report.erase_failed);
        assert!(report.container_path.exists());
    }

    /// Unlinks the target as soon as the first overwrite pass completes, so
    /// the erase step's final removal fails after a successful encryption.
    struct VanishOnErase {
        target: PathBuf,
    }

    impl EventSink for VanishOnErase {
        fn emit(&self, event: VaultEvent) {
            if matches!(event, VaultEvent::ErasePass { pass: 1, .. }) {
                let _ = fs::remove_file(&self.target);
            }
        }
    }

    #[test]
    fn erase_failure_never_propagates_from_encrypt() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("vanishing.txt");
        fs::write(&input, b"short lived").unwrap();

        let sink = VanishOnErase { target: input.clone() };
        let report = encrypt_file(&input, "pass", &options(), true, &sink).unwrap();

        assert!(report.erase_failed);
        assert!(report.container_path.exists());

        let restored = decrypt_file(&report.container_path, "pass", &NullSink).unwrap();
        assert_eq!(fs::read(&restored.output_path).unwrap(), b"short lived");
    }

    #[test]
    fn wrong_passphrase_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("notes.txt");
        fs::write(&input, b"content").unwrap();
        let report = encrypt_file(&input, "right", &options(), false, &NullSink).unwrap();

        let before = fs::read_dir(dir.path()).unwrap().count();
        let err = decrypt_file(&report.container_path, "wrong", &NullSink)
            .expect_err("expected wrong passphrase");
        assert_eq!(err.kind, Some(ErrorKind::WrongPassphrase));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), before);
    }

    #[test]
    fn directory_archive_round_trip() {
        let dir = TempDir::new().unwrap();
        let tree = dir.path().join("project");
        fs::create_dir_all(tree.join("sub")).unwrap();
        fs::write(tree.join("a.txt"), b"alpha file contents").unwrap();
        fs::write(tree.join("sub/b.txt"), b"beta file contents").unwrap();

        let report = encrypt_directory(&tree, "pass", &options(), &NullSink).unwrap();
        assert!(report.container_path.exists());

        let restored = decrypt_file(&report.container_path, "pass", &NullSink).unwrap();
        let mut archive =
            zip::ZipArchive::new(fs::File::open(&restored.output_path).unwrap()).unwrap();
        let mut contents = String::new();
        archive.by_name("sub/b.txt").unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "beta file contents");
    }

    #[test]
    fn per_file_mode_reports_independent_results() {
        let dir = TempDir::new().unwrap();
        let tree = dir.path().join("batch");
        fs::create_dir_all(&tree).unwrap();
        fs::write(tree.join("good.txt"), b"fine").unwrap();
        fs::write(tree.join("empty.txt"), b"").unwrap(); // will fail: EmptyInput

        let summary =
            encrypt_directory_individually(&tree, "pass", &options(), false, &NullSink).unwrap();
        assert_eq!(summary.total_files, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);

        let failed = summary
            .reports
            .iter()
            .find(|(p, _)| p.ends_with("empty.txt"))
            .map(|(_, r)| r.as_ref().unwrap_err())
            .unwrap();
        assert_eq!(failed.kind, Some(ErrorKind::EmptyInput));
    }

    #[test]
    fn verify_file_reports_validity() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("check.txt");
        fs::write(&input, b"verify me please").unwrap();
        let report = encrypt_file(&input, "pass", &options(), false, &NullSink).unwrap();

        let ok = verify_file(&report.container_path, "pass", &NullSink).unwrap();
        assert!(ok.valid);
        let bad = verify_file(&report.container_path, "nope", &NullSink).unwrap();
        assert!(!bad.valid);
        assert_eq!(bad.failure, Some(ErrorKind::WrongPassphrase));
    }

    #[test]
    fn decrypted_name_derivation() {
        assert_eq!(
            decrypted_name(Path::new("ENCRYPTED_report_20250101_120000.svx"), "report.pdf"),
            "DECRYPTED_report_20250101_120000.pdf"
        );
        assert_eq!(
            decrypted_name(Path::new("odd-container.svx"), "data.csv"),
            "DECRYPTED_odd-container.csv"
        );
        assert_eq!(
            decrypted_name(Path::new("ENCRYPTED_blob_20250101_120000.svx"), "blob"),
            "DECRYPTED_blob_20250101_120000"
        );
    }
}
