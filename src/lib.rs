//! Supervault - mega-passphrase file encryption with a self-describing
//! `.svx` container.
//!
//! The container layout is a 2048-byte zero-padded JSON header, a 32-byte
//! authentication tag, and AES-256-CBC ciphertext keyed through
//! PBKDF2-HMAC-SHA512 over a large generated passphrase.

#![forbid(unsafe_code)]

pub mod archive;
pub mod engine;
pub mod error;
pub mod event;
pub mod file_ops;
pub mod header;
pub mod passfile;
pub mod passgen;
pub mod shred;

pub use engine::{DecryptOutcome, EncryptOptions, EncryptOutcome, Engine, Recovered, VerifyReport};
pub use error::{ErrorCategory, ErrorKind, Result, VaultError};
pub use event::{EventSink, VaultEvent};
