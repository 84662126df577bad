//! The .svx container header.
//!
//! On-disk layout of a container:
//!
//! - header region: 2048 bytes of UTF-8 JSON, right-padded with NUL bytes
//! - authentication tag: 32 raw bytes (also duplicated base64 in the header)
//! - ciphertext: variable length
//!
//! Readers locate the first NUL byte to find the true end of the JSON; if no
//! NUL is present the JSON occupies the whole region. A header that does not
//! fit the fixed region is rejected at write time, never at read time.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};

/// Magic constant identifying a container, stored hex-encoded in the header.
pub const MAGIC: &[u8; 17] = b"SUPER_VAULT_X_V5\x00";

/// Size of the fixed header region in bytes.
pub const HEADER_SIZE: usize = 2048;

/// Size of the raw authentication tag following the header region.
pub const TAG_LEN: usize = 32;

/// Salt length for key derivation.
pub const SALT_LEN: usize = 32;

/// AES-CBC initialization vector length.
pub const IV_LEN: usize = 16;

pub const FORMAT_VERSION: &str = "5.0.0";
pub const ALGORITHM: &str = "AES-256-CBC-PBKDF2-HMAC";
pub const AUTHOR: &str = "thetemirbolatov";
pub const YEAR: u16 = 2025;

/// Hex encoding of [`MAGIC`], as it appears in the serialized header.
pub fn magic_hex() -> String {
    hex::encode(MAGIC)
}

/// Recovery metadata serialized as JSON into the fixed header region.
///
/// Field names are part of the wire format. A container is created once per
/// encrypt operation and immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerHeader {
    pub magic: String,
    pub version: String,
    pub algorithm: String,
    pub original_size: u64,
    pub encrypted_size: u64,
    /// Base64, [`SALT_LEN`] bytes.
    pub salt: String,
    /// Base64, [`IV_LEN`] bytes.
    pub iv: String,
    /// Base64 duplicate of the raw tag stored after the header region.
    pub hmac_tag: String,
    /// SHA3-512 hex of the full passphrase text; checked before any cipher
    /// work as a fast wrong-passphrase rejection.
    pub password_hash: String,
    /// ISO-8601 creation timestamp.
    pub timestamp: String,
    #[serde(default)]
    pub original_name: String,
    #[serde(default)]
    pub original_path: String,
    /// Content hash of the original plaintext (SHA3-512 hex by default).
    #[serde(default)]
    pub original_hash: String,
    #[serde(default)]
    pub was_compressed: bool,
    #[serde(default = "default_ratio")]
    pub compression_ratio: f64,
    #[serde(default)]
    pub secure_delete_passes: u32,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub year: u16,
}

fn default_ratio() -> f64 {
    1.0
}

impl ContainerHeader {
    /// Serializes to JSON and pads with NUL bytes to [`HEADER_SIZE`].
    ///
    /// Fails with `HeaderTooLarge` if the JSON exceeds the fixed region; the
    /// caller must perform this check before creating any output file.
    pub fn to_padded_bytes(&self) -> Result<Vec<u8>> {
        let json = serde_json::to_vec_pretty(self).map_err(|e| {
            VaultError::with_source(ErrorCategory::Internal, "failed to serialize header", e)
        })?;
        if json.len() > HEADER_SIZE {
            return Err(VaultError::with_kind(
                ErrorCategory::User,
                ErrorKind::HeaderTooLarge,
                format!(
                    "serialized header is {} bytes, exceeding the {} byte region",
                    json.len(),
                    HEADER_SIZE
                ),
            ));
        }
        let mut region = json;
        region.resize(HEADER_SIZE, 0);
        Ok(region)
    }

    /// Parses a header from the fixed region, stopping at the first NUL byte.
    pub fn parse(region: &[u8]) -> Result<Self> {
        let end = region.iter().position(|&b| b == 0).unwrap_or(region.len());
        let header: ContainerHeader = serde_json::from_slice(&region[..end]).map_err(|e| {
            VaultError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::CorruptHeader,
                "header region does not contain valid JSON",
                e,
            )
        })?;
        Ok(header)
    }

    /// Verifies the magic field against the expected constant.
    pub fn check_magic(&self) -> Result<()> {
        if self.magic != magic_hex() {
            return Err(VaultError::with_kind(
                ErrorCategory::User,
                ErrorKind::BadMagic,
                "not a supervault container (magic mismatch)",
            ));
        }
        Ok(())
    }

    pub fn salt_bytes(&self) -> Result<[u8; SALT_LEN]> {
        decode_fixed(&self.salt, "salt")
    }

    pub fn iv_bytes(&self) -> Result<[u8; IV_LEN]> {
        decode_fixed(&self.iv, "iv")
    }

    pub fn tag_bytes(&self) -> Result<[u8; TAG_LEN]> {
        decode_fixed(&self.hmac_tag, "hmac_tag")
    }
}

fn decode_fixed<const N: usize>(encoded: &str, field: &str) -> Result<[u8; N]> {
    let bytes = BASE64.decode(encoded).map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::CorruptHeader,
            format!("header field '{field}' is not valid base64"),
            e,
        )
    })?;
    bytes.as_slice().try_into().map_err(|_| {
        VaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::CorruptHeader,
            format!("header field '{field}' has length {}, expected {N}", bytes.len()),
        )
    })
}
