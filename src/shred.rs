//! Multi-pass secure file erasure.
//!
//! Overwrites a file in place with a fixed pattern schedule (zeros, ones,
//! alternating bits, CSPRNG bytes), forcing each pass to stable storage
//! before the next, then removes it. Erasure is best-effort: on storage that
//! remaps or journals writes the overwrite cannot be guaranteed, so callers
//! log failures and keep going rather than aborting their workflow.

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};
use crate::event::{EventSink, VaultEvent};

/// Upper bound on overwrite passes; matches the pattern schedule length.
pub const MAX_PASSES: u32 = 7;

/// Overwrites `path` with `passes` passes (clamped to 1..=[`MAX_PASSES`])
/// and removes it.
///
/// On overwrite failure a plain removal is still attempted; the returned
/// `EraseFailure` is for the caller to log, not to propagate as a workflow
/// abort.
pub fn erase(path: &Path, passes: u32, sink: &dyn EventSink) -> Result<()> {
    let passes = passes.clamp(1, MAX_PASSES);

    let len = match fs::metadata(path) {
        Ok(meta) => meta.len() as usize,
        Err(e) => {
            return Err(VaultError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::EraseFailure,
                format!("cannot stat {} for erasure", path.display()),
                e,
            ));
        }
    };

    if let Err(e) = overwrite(path, len, passes, sink) {
        // Best effort fallback: at least unlink the file.
        let _ = fs::remove_file(path);
        return Err(e);
    }

    fs::remove_file(path).map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::EraseFailure,
            format!("overwrote but failed to remove {}", path.display()),
            e,
        )
    })?;

    tracing::debug!(path = %path.display(), passes, "file securely erased");
    Ok(())
}

fn overwrite(path: &Path, len: usize, passes: u32, sink: &dyn EventSink) -> Result<()> {
    let mut file = OpenOptions::new().write(true).open(path).map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::EraseFailure,
            format!("cannot open {} for overwrite", path.display()),
            e,
        )
    })?;

    for pass in 0..passes {
        let pattern = pass_pattern(pass, len);
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.write_all(&pattern))
            .and_then(|_| file.flush())
            .and_then(|_| file.sync_all())
            .map_err(|e| {
                VaultError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::EraseFailure,
                    format!("overwrite pass {} of {} failed", pass + 1, passes),
                    e,
                )
            })?;
        sink.emit(VaultEvent::ErasePass { pass: pass + 1, total: passes });
    }
    Ok(())
}

/// Fixed pattern schedule: zeros, ones, 0xAA, 0x55, random, zeros, random.
fn pass_pattern(pass: u32, len: usize) -> Vec<u8> {
    match pass {
        0 | 5 => vec![0x00; len],
        1 => vec![0xFF; len],
        2 => vec![0xAA; len],
        3 => vec![0x55; len],
        _ => {
            let mut bytes = vec![0u8; len];
            OsRng.fill_bytes(&mut bytes);
            bytes
        }
    }
}
