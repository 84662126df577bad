//! Supervault CLI - mega-passphrase file encryption.
//!
//! A thin shell over the library: `encrypt` gathers passphrase material
//! interactively, `decrypt` restores from a container plus a saved
//! passphrase file, `verify` checks a container without decrypting.

use std::collections::BTreeMap;
use std::io::{self, BufRead, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use zeroize::Zeroizing;

use supervault::engine::EncryptOptions;
use supervault::error::{ErrorCategory, ErrorKind, Result, VaultError};
use supervault::event::{EventSink, VaultEvent};
use supervault::{file_ops, passfile, passgen, shred};

#[derive(Parser)]
#[command(name = "supervault")]
#[command(version)]
#[command(about = "Mega-passphrase file encryption.", long_about = None)]
struct Cli {
    /// Suppress progress output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a file or directory, generating a fresh passphrase
    #[command(alias = "e")]
    Encrypt {
        /// File or directory to encrypt
        path: PathBuf,

        /// Keep the original instead of securely erasing it
        #[arg(long)]
        keep: bool,

        /// Skip compression of the payload
        #[arg(long)]
        no_compress: bool,

        /// Secure-delete overwrite passes (1-7)
        #[arg(long, default_value_t = shred::MAX_PASSES)]
        passes: u32,

        /// Encrypt each file in a directory individually instead of as one archive
        #[arg(long)]
        per_file: bool,

        /// Number of passphrase lines to generate
        #[arg(long, default_value_t = passgen::DEFAULT_LINE_COUNT)]
        lines: usize,
    },

    /// Decrypt a container using a saved passphrase file
    #[command(alias = "d")]
    Decrypt {
        /// Path to the .svx container
        container: PathBuf,

        /// Path to the passphrase file saved at encryption time
        passphrase_file: PathBuf,
    },

    /// Verify a container's integrity without producing plaintext
    #[command(alias = "v")]
    Verify {
        /// Path to the .svx container
        container: PathBuf,
    },
}

/// Prints progress events to stderr.
struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn emit(&self, event: VaultEvent) {
        match event {
            VaultEvent::LinesGenerated { done, total } => {
                eprintln!("generated {done}/{total} passphrase lines");
            }
            VaultEvent::Compressed { original, compressed } => {
                eprintln!("compressed {original} -> {compressed} bytes");
            }
            VaultEvent::ErasePass { pass, total } => {
                eprintln!("secure erase pass {pass}/{total}");
            }
            VaultEvent::FileArchived { entry } => {
                eprintln!("archived {entry}");
            }
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let sink: Box<dyn EventSink> = if cli.quiet { Box::new(supervault::event::NullSink) } else { Box::new(ConsoleSink) };

    let result = match cli.command {
        Commands::Encrypt { path, keep, no_compress, passes, per_file, lines } => {
            cmd_encrypt(&path, keep, no_compress, passes, per_file, lines, &*sink)
        }
        Commands::Decrypt { container, passphrase_file } => {
            cmd_decrypt(&container, &passphrase_file, &*sink)
        }
        Commands::Verify { container } => cmd_verify(&container, &*sink),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn cmd_encrypt(
    path: &Path,
    keep: bool,
    no_compress: bool,
    passes: u32,
    per_file: bool,
    lines: usize,
    sink: &dyn EventSink,
) -> Result<()> {
    let stdin = io::stdin();
    let mut input = stdin.lock();

    eprintln!("Enter your words (one per line, blank line to finish):");
    let words = read_section(&mut input)?;
    eprintln!("Enter important dates (one per line, blank line to finish):");
    let dates = read_section(&mut input)?;
    eprintln!("Enter personal info as key=value (one per line, blank line to finish):");
    let mut personal_info = BTreeMap::new();
    for line in read_section(&mut input)? {
        if let Some((key, value)) = line.split_once('=') {
            personal_info.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    let generated = passgen::generate(&words, &dates, &personal_info, lines, sink)?;
    eprintln!("Passphrase digest: {}", generated.digest);

    let options = EncryptOptions { compress: !no_compress, secure_delete_passes: passes };
    // Captured before encryption: the original may be erased afterwards.
    let original_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

    let report = if path.is_dir() {
        if per_file {
            let summary = file_ops::encrypt_directory_individually(
                path,
                &generated.text,
                &options,
                !keep,
                sink,
            )?;
            println!(
                "Encrypted {}/{} files ({} failed)",
                summary.succeeded, summary.total_files, summary.failed
            );
            write_passphrase_for(path, original_size, &generated)?;
            return Ok(());
        }
        file_ops::encrypt_directory(path, &generated.text, &options, sink)?
    } else {
        file_ops::encrypt_file(path, &generated.text, &options, !keep, sink)?
    };

    let passphrase_path = write_passphrase_for(path, original_size, &generated)?;

    println!("Container:       {}", report.container_path.display());
    println!("Passphrase file: {}", passphrase_path.display());
    println!(
        "Sizes:           {} -> {} bytes{}",
        report.original_size,
        report.container_size,
        if report.was_compressed {
            format!(" (compressed, ratio {:.2})", report.compression_ratio)
        } else {
            String::new()
        }
    );
    if report.erase_failed {
        eprintln!("warning: secure erase of the original failed; it may still be present");
    }
    Ok(())
}

fn write_passphrase_for(
    target: &Path,
    original_size: u64,
    generated: &passgen::GeneratedPassphrase,
) -> Result<PathBuf> {
    let stem = target.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S_%6f");
    let name = format!("SUPER_PASSWORD_{stem}_{stamp}.txt");
    let path = target.parent().unwrap_or_else(|| Path::new(".")).join(name);

    passfile::write_passphrase_file(
        &path,
        &generated.text,
        &target.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default(),
        original_size,
        &generated.stats,
    )?;
    Ok(path)
}

fn cmd_decrypt(container: &Path, passphrase_file: &Path, sink: &dyn EventSink) -> Result<()> {
    let passphrase = passfile::read_passphrase_file(passphrase_file)?;
    let report = file_ops::decrypt_file(container, &passphrase, sink)?;

    println!("Restored: {} ({} bytes)", report.output_path.display(), report.restored_size);
    if report.partial {
        eprintln!("warning: decompression failed; raw decrypted bytes were written");
    }
    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }
    Ok(())
}

fn cmd_verify(container: &Path, sink: &dyn EventSink) -> Result<()> {
    let passphrase = read_passphrase_stdin()?;
    let report = file_ops::verify_file(container, &passphrase, sink)?;

    if let Some(info) = &report.info {
        println!("Name:       {}", info.original_name);
        println!("Sizes:      {} plaintext / {} ciphertext", info.original_size, info.encrypted_size);
        println!("Algorithm:  {}", info.algorithm);
        println!("Created:    {}", info.timestamp);
        println!("Compressed: {}", info.was_compressed);
    }

    if report.valid {
        println!("Integrity:  PASSED");
        Ok(())
    } else {
        Err(VaultError::with_kind(
            ErrorCategory::User,
            report.failure.unwrap_or(ErrorKind::IntegrityFailure),
            "container verification failed",
        ))
    }
}

/// Reads lines until the first blank line or EOF.
fn read_section(input: &mut impl BufRead) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        let read = input.read_line(&mut line).map_err(|e| {
            VaultError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to read from stdin",
                e,
            )
        })?;
        let trimmed = line.trim();
        if read == 0 || trimmed.is_empty() {
            return Ok(lines);
        }
        lines.push(trimmed.to_string());
    }
}

/// Reads the verification passphrase: a no-echo prompt on a terminal,
/// otherwise all of stdin (a pasted passphrase file body is accepted too).
fn read_passphrase_stdin() -> Result<Zeroizing<String>> {
    if io::stdin().is_terminal() {
        eprint!("Passphrase (supervault): ");
        io::stderr().flush().ok();
        let entered = rpassword::read_password().map_err(|e| {
            VaultError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::PassphraseUnavailable,
                "failure reading passphrase from terminal",
                e,
            )
        })?;
        return Ok(Zeroizing::new(entered));
    }

    let mut raw = Zeroizing::new(String::new());
    io::stdin().read_to_string(&mut raw).map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::PassphraseUnavailable,
            "failure reading passphrase from stdin",
            e,
        )
    })?;

    // Tolerate a full passphrase-file body pasted on stdin.
    if let Some(body) = passfile::parse_passphrase_body(&raw) {
        return Ok(body);
    }
    Ok(Zeroizing::new(raw.trim_end_matches('\n').to_string()))
}
