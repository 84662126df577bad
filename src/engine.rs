//! Encryption, decryption, and integrity verification.
//!
//! Key derivation is PBKDF2-HMAC-SHA512 (100000 iterations) over the *full
//! passphrase text*; the cipher is AES-256-CBC with PKCS#7 padding. The
//! authentication tag is `SHA256(ciphertext || salt || iv || key)` - a
//! compatibility-mode MAC keyed by the encryption key itself, as the .svx
//! format requires. Callers needing strict key separation must treat this
//! as a known format-level deviation.
//!
//! An [`Engine`] holds the caller's event sink and the last operation's
//! timing; it is not safe to drive one engine from two operations
//! concurrently. Concurrent invocations on different files each get their
//! own engine.

use std::cell::Cell;
use std::io::{Read, Write};
use std::time::{Duration, Instant};

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Sha256, Sha512};
use sha3::{Digest, Sha3_512};
use zeroize::Zeroizing;

use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};
use crate::event::{EventSink, VaultEvent};
use crate::header::{
    ContainerHeader, ALGORITHM, AUTHOR, FORMAT_VERSION, HEADER_SIZE, IV_LEN, SALT_LEN, TAG_LEN,
    YEAR,
};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const PBKDF2_ITERATIONS: u32 = 100_000;
const KEY_LEN: usize = 32;

/// Payloads at or below this size are never compressed.
pub const COMPRESSION_THRESHOLD: usize = 1024;

/// Caller-selected knobs for an encrypt operation.
#[derive(Debug, Clone)]
pub struct EncryptOptions {
    /// Compress the payload with zlib before encryption when it exceeds
    /// [`COMPRESSION_THRESHOLD`]. Never affects correctness, only container
    /// size and the compression header fields.
    pub compress: bool,
    /// Number of secure-delete passes the caller intends to use on the
    /// original; recorded in the header for forensic context.
    pub secure_delete_passes: u32,
}

impl Default for EncryptOptions {
    fn default() -> Self {
        Self { compress: true, secure_delete_passes: crate::shred::MAX_PASSES }
    }
}

/// Identity of the file being encrypted, recorded in the header.
#[derive(Debug, Clone, Default)]
pub struct SourceInfo {
    pub name: String,
    pub path: String,
}

/// Result of a successful encrypt operation.
#[derive(Debug)]
pub struct EncryptOutcome {
    /// The complete container: header region, raw tag, ciphertext.
    pub container: Vec<u8>,
    pub header: ContainerHeader,
    pub original_size: u64,
    pub was_compressed: bool,
    pub compression_ratio: f64,
    pub elapsed: Duration,
}

/// Plaintext recovered by a decrypt operation.
///
/// `Raw` is the explicit partial-result case: the payload decrypted and
/// authenticated, but its zlib stream would not inflate, so the compressed
/// bytes are handed back as-is for the caller to decide about.
#[derive(Debug)]
pub enum Recovered {
    Full(Vec<u8>),
    Raw { bytes: Vec<u8>, reason: String },
}

impl Recovered {
    pub fn bytes(&self) -> &[u8] {
        match self {
            Recovered::Full(b) => b,
            Recovered::Raw { bytes, .. } => bytes,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Recovered::Full(b) => b,
            Recovered::Raw { bytes, .. } => bytes,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, Recovered::Raw { .. })
    }
}

/// Result of a successful decrypt operation. Size and content-hash
/// mismatches after recovery are downgraded to `warnings`; the plaintext has
/// already been authenticated and restored at that point.
#[derive(Debug)]
pub struct DecryptOutcome {
    pub payload: Recovered,
    pub header: ContainerHeader,
    pub warnings: Vec<String>,
    pub elapsed: Duration,
}

/// Container metadata surfaced by [`Engine::verify`].
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub original_name: String,
    pub original_size: u64,
    pub encrypted_size: u64,
    pub algorithm: String,
    pub timestamp: String,
    pub was_compressed: bool,
}

/// Outcome of a lightweight pre-flight verification: header parsing, magic
/// and passphrase-digest checks, and tag recomputation - no plaintext is
/// ever produced.
#[derive(Debug)]
pub struct VerifyReport {
    pub valid: bool,
    /// Failure reason when `valid` is false.
    pub failure: Option<ErrorKind>,
    /// Present whenever the header itself parsed.
    pub info: Option<ContainerInfo>,
}

pub struct Engine<'a> {
    sink: &'a dyn EventSink,
    last_elapsed: Cell<Option<Duration>>,
}

impl<'a> Engine<'a> {
    pub fn new(sink: &'a dyn EventSink) -> Self {
        Self { sink, last_elapsed: Cell::new(None) }
    }

    /// Duration of the most recently completed operation on this engine.
    pub fn last_elapsed(&self) -> Option<Duration> {
        self.last_elapsed.get()
    }

    /// Encrypts `plaintext` under `passphrase`, producing a complete
    /// in-memory container. Fails with `EmptyInput` on zero-byte input and
    /// `HeaderTooLarge` if the metadata does not fit the fixed region; in
    /// both cases nothing has been written anywhere.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        passphrase: &str,
        source: &SourceInfo,
        options: &EncryptOptions,
    ) -> Result<EncryptOutcome> {
        let started = Instant::now();

        if plaintext.is_empty() {
            return Err(VaultError::with_kind(
                ErrorCategory::User,
                ErrorKind::EmptyInput,
                "refusing to encrypt an empty file",
            ));
        }
        let original_size = plaintext.len() as u64;

        let (payload, was_compressed, compression_ratio) =
            self.maybe_compress(plaintext, options.compress);

        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let key = derive_key(passphrase, &salt);

        let ciphertext =
            Aes256CbcEnc::new((&*key).into(), (&iv).into()).encrypt_padded_vec_mut::<Pkcs7>(&payload);

        let tag = compute_tag(&ciphertext, &salt, &iv, &key);

        let header = ContainerHeader {
            magic: crate::header::magic_hex(),
            version: FORMAT_VERSION.to_string(),
            algorithm: ALGORITHM.to_string(),
            original_size,
            encrypted_size: ciphertext.len() as u64,
            salt: BASE64.encode(salt),
            iv: BASE64.encode(iv),
            hmac_tag: BASE64.encode(tag),
            password_hash: passphrase_digest(passphrase),
            timestamp: chrono::Utc::now().to_rfc3339(),
            original_name: source.name.clone(),
            original_path: source.path.clone(),
            original_hash: hex::encode(Sha3_512::digest(plaintext)),
            was_compressed,
            compression_ratio,
            secure_delete_passes: options.secure_delete_passes,
            author: AUTHOR.to_string(),
            year: YEAR,
        };

        // HeaderTooLarge surfaces here, before any output exists.
        let header_region = header.to_padded_bytes()?;

        let mut container = Vec::with_capacity(HEADER_SIZE + TAG_LEN + ciphertext.len());
        container.extend_from_slice(&header_region);
        container.extend_from_slice(&tag);
        container.extend_from_slice(&ciphertext);

        let elapsed = started.elapsed();
        self.last_elapsed.set(Some(elapsed));
        tracing::debug!(
            original = original_size,
            container = container.len(),
            compressed = was_compressed,
            "encryption finished"
        );

        Ok(EncryptOutcome {
            container,
            header,
            original_size,
            was_compressed,
            compression_ratio,
            elapsed,
        })
    }

    /// Decrypts a container. The passphrase digest is checked before any key
    /// derivation; with `verify_integrity` the tag is recomputed and compared
    /// byte for byte against both stored copies before the cipher runs.
    pub fn decrypt(
        &self,
        container: &[u8],
        passphrase: &str,
        verify_integrity: bool,
    ) -> Result<DecryptOutcome> {
        let started = Instant::now();

        let (header, raw_tag, ciphertext) = split_container(container)?;
        header.check_magic()?;

        if header.password_hash != passphrase_digest(passphrase) {
            return Err(VaultError::with_kind(
                ErrorCategory::User,
                ErrorKind::WrongPassphrase,
                "passphrase digest does not match this container",
            ));
        }

        let salt = header.salt_bytes()?;
        let iv = header.iv_bytes()?;
        let key = derive_key(passphrase, &salt);

        if verify_integrity {
            let header_tag = header.tag_bytes()?;
            let computed = compute_tag(ciphertext, &salt, &iv, &key);
            if computed != raw_tag || computed != header_tag {
                return Err(VaultError::with_kind(
                    ErrorCategory::User,
                    ErrorKind::IntegrityFailure,
                    "authentication tag mismatch; container is corrupt or tampered with",
                ));
            }
        }

        let decrypted = Aes256CbcDec::new((&*key).into(), (&iv).into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| {
                VaultError::with_kind(
                    ErrorCategory::User,
                    ErrorKind::PaddingError,
                    "malformed cipher padding; corrupt data or wrong key",
                )
            })?;

        let payload = if header.was_compressed {
            match inflate(&decrypted) {
                Ok(full) => Recovered::Full(full),
                Err(reason) => {
                    tracing::warn!(%reason, "decompression failed; returning raw payload");
                    Recovered::Raw { bytes: decrypted, reason }
                }
            }
        } else {
            Recovered::Full(decrypted)
        };

        let mut warnings = Vec::new();
        let restored_len = payload.bytes().len() as u64;
        if restored_len != header.original_size {
            warnings.push(format!(
                "restored size {restored_len} differs from recorded size {}",
                header.original_size
            ));
        }
        if !header.original_hash.is_empty() && !payload.is_partial() {
            let restored_hash = hex::encode(Sha3_512::digest(payload.bytes()));
            if restored_hash != header.original_hash {
                warnings.push("restored content hash differs from recorded hash".to_string());
            }
        }
        for warning in &warnings {
            tracing::warn!(%warning, "post-decryption check");
        }

        let elapsed = started.elapsed();
        self.last_elapsed.set(Some(elapsed));

        Ok(DecryptOutcome { payload, header, warnings, elapsed })
    }

    /// Pre-flight container check: everything [`Engine::decrypt`] does short
    /// of running the cipher. Structural and authenticity failures land in
    /// the report rather than an error.
    pub fn verify(&self, container: &[u8], passphrase: &str) -> VerifyReport {
        let (header, raw_tag, ciphertext) = match split_container(container) {
            Ok(parts) => parts,
            Err(e) => return VerifyReport { valid: false, failure: e.kind, info: None },
        };
        let info = ContainerInfo {
            original_name: header.original_name.clone(),
            original_size: header.original_size,
            encrypted_size: header.encrypted_size,
            algorithm: header.algorithm.clone(),
            timestamp: header.timestamp.clone(),
            was_compressed: header.was_compressed,
        };

        if let Err(e) = header.check_magic() {
            return VerifyReport { valid: false, failure: e.kind, info: Some(info) };
        }
        if header.password_hash != passphrase_digest(passphrase) {
            return VerifyReport {
                valid: false,
                failure: Some(ErrorKind::WrongPassphrase),
                info: Some(info),
            };
        }

        let (salt, iv, header_tag) =
            match (header.salt_bytes(), header.iv_bytes(), header.tag_bytes()) {
                (Ok(s), Ok(i), Ok(t)) => (s, i, t),
                _ => {
                    return VerifyReport {
                        valid: false,
                        failure: Some(ErrorKind::CorruptHeader),
                        info: Some(info),
                    }
                }
            };

        let key = derive_key(passphrase, &salt);
        let computed = compute_tag(ciphertext, &salt, &iv, &key);
        if computed != raw_tag || computed != header_tag {
            return VerifyReport {
                valid: false,
                failure: Some(ErrorKind::IntegrityFailure),
                info: Some(info),
            };
        }

        VerifyReport { valid: true, failure: None, info: Some(info) }
    }

    fn maybe_compress(&self, plaintext: &[u8], compress: bool) -> (Vec<u8>, bool, f64) {
        if !compress || plaintext.len() <= COMPRESSION_THRESHOLD {
            return (plaintext.to_vec(), false, 1.0);
        }
        match deflate(plaintext) {
            Ok(compressed) => {
                let ratio = compressed.len() as f64 / plaintext.len() as f64;
                self.sink.emit(VaultEvent::Compressed {
                    original: plaintext.len() as u64,
                    compressed: compressed.len() as u64,
                });
                (compressed, true, ratio)
            }
            Err(reason) => {
                // Fallback never changes correctness, only container size.
                tracing::warn!(%reason, "compression failed; encrypting uncompressed");
                (plaintext.to_vec(), false, 1.0)
            }
        }
    }
}

/// PBKDF2-HMAC-SHA512, 100000 iterations, 256-bit output. The input is the
/// full passphrase text, never its digest.
fn derive_key(passphrase: &str, salt: &[u8; SALT_LEN]) -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::pbkdf2_hmac::<Sha512>(passphrase.as_bytes(), salt, PBKDF2_ITERATIONS, &mut *key);
    key
}

/// SHA3-512 hex of the passphrase text, as stored in the header for fast
/// wrong-passphrase rejection.
fn passphrase_digest(passphrase: &str) -> String {
    hex::encode(Sha3_512::digest(passphrase.as_bytes()))
}

/// `SHA256(ciphertext || salt || iv || key)`.
fn compute_tag(
    ciphertext: &[u8],
    salt: &[u8; SALT_LEN],
    iv: &[u8; IV_LEN],
    key: &[u8; KEY_LEN],
) -> [u8; TAG_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(ciphertext);
    hasher.update(salt);
    hasher.update(iv);
    hasher.update(key);
    hasher.finalize().into()
}

/// Splits a container into parsed header, raw tag, and ciphertext.
fn split_container(container: &[u8]) -> Result<(ContainerHeader, [u8; TAG_LEN], &[u8])> {
    // Minimum: header region, tag, one AES block.
    if container.len() < HEADER_SIZE + TAG_LEN + 16 {
        return Err(VaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::TooShort,
            "input is too short to be a supervault container",
        ));
    }
    let header = ContainerHeader::parse(&container[..HEADER_SIZE])?;
    let raw_tag: [u8; TAG_LEN] = container[HEADER_SIZE..HEADER_SIZE + TAG_LEN]
        .try_into()
        .expect("tag slice has fixed length");
    Ok((header, raw_tag, &container[HEADER_SIZE + TAG_LEN..]))
}

fn deflate(data: &[u8]) -> std::result::Result<Vec<u8>, String> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data).map_err(|e| e.to_string())?;
    encoder.finish().map_err(|e| e.to_string())
}

fn inflate(data: &[u8]) -> std::result::Result<Vec<u8>, String> {
    let mut out = Vec::new();
    ZlibDecoder::new(data).read_to_end(&mut out).map_err(|e| e.to_string())?;
    Ok(out)
}
