//! Reading and writing the human-readable passphrase file.
//!
//! The file carries a banner, warnings, generation statistics, and the
//! passphrase body delimited by literal marker lines. Readers must also
//! cope with files that lost their markers (the body is recognized by the
//! per-line `L<6 digits>_` prefix) and with trailing rows of `=` characters.

use std::fs;
use std::path::Path;

use zeroize::Zeroizing;

use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};
use crate::passgen::PassphraseStats;

const START_MARKER: &str = "START OF PASSWORD";
const END_MARKER: &str = "END OF PASSWORD";
const SEPARATOR_ROW: &str = "================================================================================";

/// Lines with fewer passphrase rows than this trigger a warning on read.
const EXPECTED_MIN_LINES: usize = 100;

/// Writes the passphrase file: banner, warnings, statistics, then the body
/// between the start and end markers.
pub fn write_passphrase_file(
    path: &Path,
    passphrase_text: &str,
    original_name: &str,
    original_size: u64,
    stats: &PassphraseStats,
) -> Result<()> {
    let mut out = String::new();
    out.push_str(SEPARATOR_ROW);
    out.push('\n');
    out.push_str("SUPER PASSWORD FILE\n");
    out.push_str(SEPARATOR_ROW);
    out.push('\n');
    out.push_str(&format!("File: {original_name}\n"));
    out.push_str(&format!("Size: {original_size} bytes\n"));
    out.push_str(&format!("Created: {}\n", chrono::Utc::now().to_rfc3339()));
    out.push_str(&format!("Author: {} (c) {}\n", crate::header::AUTHOR, crate::header::YEAR));
    out.push_str(&format!("Version: {}\n", crate::header::FORMAT_VERSION));
    out.push_str(SEPARATOR_ROW);
    out.push('\n');

    out.push_str("\nIMPORTANT WARNINGS:\n");
    for warning in [
        "1. SAVE THIS FILE IN A SECURE PLACE!",
        "2. Without this file, recovery is IMPOSSIBLE!",
        "3. Never store the password with the encrypted file!",
        "4. Make multiple copies on different media!",
        "5. The password consists of unique generated lines!",
        "6. Each line contains a timestamp and unique ID!",
        "",
        "LOST PASSWORD = LOST DATA",
    ] {
        out.push_str(warning);
        out.push('\n');
    }
    out.push('\n');
    out.push_str(SEPARATOR_ROW);
    out.push('\n');

    out.push_str("\nPASSWORD GENERATION STATISTICS:\n");
    out.push_str(&format!("total_lines: {}\n", stats.total_lines));
    out.push_str(&format!("user_words: {}\n", stats.user_words));
    out.push_str(&format!("user_dates: {}\n", stats.user_dates));
    out.push_str(&format!("dictionary_words_used: {}\n", stats.dictionary_words_used));
    out.push_str(&format!("special_tokens_used: {}\n", stats.special_tokens_used));
    out.push_str(&format!("timestamps_added: {}\n", stats.timestamps_added));
    out.push('\n');
    out.push_str(SEPARATOR_ROW);
    out.push('\n');

    out.push_str(&format!("\n{START_MARKER}\n"));
    out.push_str(SEPARATOR_ROW);
    out.push_str("\n\n");
    out.push_str(passphrase_text);
    out.push_str(&format!("\n\n{SEPARATOR_ROW}\n"));
    out.push_str(&format!("{END_MARKER} - {} LINES GENERATED\n", stats.total_lines));
    out.push_str(SEPARATOR_ROW);
    out.push('\n');

    fs::write(path, out).map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            format!("failed to write passphrase file {}", path.display()),
            e,
        )
    })
}

/// Reads and parses a passphrase file from disk.
pub fn read_passphrase_file(path: &Path) -> Result<Zeroizing<String>> {
    let content = fs::read_to_string(path).map_err(|e| {
        let category = if e.kind() == std::io::ErrorKind::NotFound {
            ErrorCategory::User
        } else {
            ErrorCategory::Internal
        };
        VaultError::with_kind_and_source(
            category,
            ErrorKind::Io,
            format!("failed to read passphrase file {}", path.display()),
            e,
        )
    })?;

    let body = parse_passphrase_body(&content).ok_or_else(|| {
        VaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::PassphraseUnavailable,
            format!("no passphrase body found in {}", path.display()),
        )
    })?;

    let line_count = body.lines().count();
    if line_count < EXPECTED_MIN_LINES {
        tracing::warn!(lines = line_count, "passphrase body is unusually short");
    }

    Ok(body)
}

/// Extracts the passphrase body from file content.
///
/// Tolerates three layouts: marker-delimited bodies, marker-less files whose
/// body lines carry the `L<6 digits>_` prefix, and trailing `=`-rows after
/// the body in either case.
pub fn parse_passphrase_body(content: &str) -> Option<Zeroizing<String>> {
    let lines: Vec<&str> = content.split('\n').collect();

    let mut body: Vec<&str> = Vec::new();
    let mut in_body = false;
    for line in &lines {
        if !in_body {
            if line.contains(START_MARKER) {
                in_body = true;
            }
            continue;
        }
        if line.contains(END_MARKER) {
            break;
        }
        if line.trim().is_empty() || is_separator_row(line) {
            continue;
        }
        body.push(line);
    }

    // No markers: take the first contiguous run of lines carrying the
    // generated prefix. Prefixed lines after unrelated prose are not part
    // of the body.
    if body.is_empty() {
        for line in &lines {
            if has_line_prefix(line) {
                body.push(line);
            } else if !body.is_empty() {
                break;
            }
        }
    }

    if body.is_empty() {
        return None;
    }

    // Strip any trailing separator rows that slipped into the body.
    while body.last().is_some_and(|l| is_separator_row(l)) {
        body.pop();
    }
    if body.is_empty() {
        return None;
    }

    Some(Zeroizing::new(body.join("\n")))
}

/// A row of at least 20 leading `=` characters.
fn is_separator_row(line: &str) -> bool {
    line.len() >= 20 && line.bytes().take(20).all(|b| b == b'=')
}

/// `L` followed by exactly six ASCII digits and an underscore.
fn has_line_prefix(line: &str) -> bool {
    let bytes = line.as_bytes();
    bytes.len() > 8
        && bytes[0] == b'L'
        && bytes[1..7].iter().all(|b| b.is_ascii_digit())
        && bytes[7] == b'_'
}
