//! Directory packaging for whole-directory encryption.
//!
//! A directory is bundled into a single deflate-compressed zip archive whose
//! entry names are paths relative to the directory root. The archive lives
//! in a [`tempfile::NamedTempFile`], so it is removed on every exit path -
//! success, failure, or panic - once the [`PackedArchive`] drops.

use std::fs::File;
use std::io;
use std::path::Path;

use tempfile::NamedTempFile;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};
use crate::event::{EventSink, VaultEvent};

/// A temporary archive of a directory tree. The underlying file is deleted
/// when this value drops.
#[derive(Debug)]
pub struct PackedArchive {
    file: NamedTempFile,
    entries: usize,
}

impl PackedArchive {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Number of regular files written into the archive.
    pub fn entries(&self) -> usize {
        self.entries
    }
}

/// Recursively packs every regular file under `dir` into a zip archive.
///
/// Fails with `InvalidInput` if `dir` is not a directory, and with `Io` on
/// any traversal or write failure. Symlinks and other non-regular entries
/// are skipped.
pub fn pack(dir: &Path, sink: &dyn EventSink) -> Result<PackedArchive> {
    if !dir.is_dir() {
        return Err(VaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::InvalidInput,
            format!("{} is not a directory", dir.display()),
        ));
    }

    let temp = NamedTempFile::new().map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to create temporary archive",
            e,
        )
    })?;

    let mut writer = ZipWriter::new(temp.reopen().map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to reopen temporary archive",
            e,
        )
    })?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut entries = 0usize;
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| {
            VaultError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("failed to walk {}", dir.display()),
                e,
            )
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(dir)
            .expect("walked path is under the root")
            .to_string_lossy()
            .replace('\\', "/");

        writer
            .start_file(relative.clone(), options)
            .map_err(|e| archive_error(&relative, e))?;
        let mut source = File::open(entry.path()).map_err(|e| {
            VaultError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Io,
                format!("failed to read {}", entry.path().display()),
                e,
            )
        })?;
        io::copy(&mut source, &mut writer).map_err(|e| {
            VaultError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("failed to archive {}", entry.path().display()),
                e,
            )
        })?;

        sink.emit(VaultEvent::FileArchived { entry: relative });
        entries += 1;
    }

    writer.finish().map_err(|e| archive_error("archive central directory", e))?;

    tracing::debug!(dir = %dir.display(), entries, "directory packed");
    Ok(PackedArchive { file: temp, entries })
}

fn archive_error(context: &str, e: zip::result::ZipError) -> VaultError {
    VaultError::with_kind_and_source(
        ErrorCategory::Internal,
        ErrorKind::Io,
        format!("zip write failed for {context}"),
        e,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{MemorySink, NullSink};
    use std::fs;
    use std::io::Read;
    use tempfile::TempDir;

    fn fixture_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("top.txt"), b"top level").unwrap();
        fs::create_dir_all(dir.path().join("nested/deep")).unwrap();
        fs::write(dir.path().join("nested/inner.txt"), b"inner").unwrap();
        fs::write(dir.path().join("nested/deep/leaf.bin"), vec![0u8; 2048]).unwrap();
        dir
    }

    #[test]
    fn packs_all_regular_files_with_relative_names() {
        let tree = fixture_tree();
        let sink = MemorySink::new();
        let packed = pack(tree.path(), &sink).unwrap();
        assert_eq!(packed.entries(), 3);

        let mut archive = zip::ZipArchive::new(File::open(packed.path()).unwrap()).unwrap();
        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["nested/deep/leaf.bin", "nested/inner.txt", "top.txt"]);

        let mut contents = String::new();
        archive.by_name("nested/inner.txt").unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "inner");

        let archived: Vec<_> = sink
            .take()
            .into_iter()
            .filter(|e| matches!(e, VaultEvent::FileArchived { .. }))
            .collect();
        assert_eq!(archived.len(), 3);
    }

    #[test]
    fn archive_removed_on_drop() {
        let tree = fixture_tree();
        let packed = pack(tree.path(), &NullSink).unwrap();
        let path = packed.path().to_path_buf();
        assert!(path.exists());
        drop(packed);
        assert!(!path.exists());
    }

    #[test]
    fn non_directory_rejected() {
        let tree = fixture_tree();
        let err = pack(&tree.path().join("top.txt"), &NullSink)
            .expect_err("expected rejection of a file path");
        assert_eq!(err.kind, Some(ErrorKind::InvalidInput));
    }

    #[test]
    fn empty_directory_packs_zero_entries() {
        let dir = TempDir::new().unwrap();
        let packed = pack(dir.path(), &NullSink).unwrap();
        assert_eq!(packed.entries(), 0);
    }
}
