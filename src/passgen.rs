//! Mega-passphrase generation.
//!
//! The passphrase is a large, structured text: one line per index, each
//! mixing user-supplied words and dates, words drawn from six topical
//! dictionaries, personal-info fragments, a random token, and optional
//! arithmetic/hex fragments. Every line carries a `L<index>_T<micros>_N<nonce>_`
//! prefix, which guarantees that no two lines (and no two generated
//! passphrases) are ever byte-identical.
//!
//! Dictionary and fragment *selection* uses a fast non-cryptographic RNG;
//! the random token, the hex fragment, and the per-line nonce come from the
//! OS CSPRNG, since weak randomness there would be indistinguishable from a
//! weak key.

use std::collections::BTreeMap;

use blake2::Blake2b512;
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use sha2::Sha512;
use sha3::{Digest, Sha3_512};
use zeroize::Zeroizing;

use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};
use crate::event::{EventSink, VaultEvent};

/// Default number of passphrase lines.
pub const DEFAULT_LINE_COUNT: usize = 10_000;

/// Punctuation mixed into the random token alongside letters and digits.
const SPECIAL_CHARS: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?/~`";

/// Per-line separators joining the assembled fragments.
const SEPARATORS: &[&str] = &["_", "-", ".", "|", ":", "#", "~", "\u{2022}", "\u{2192}", "\u{21e8}"];

/// Operators used in arithmetic fragments.
const MATH_OPS: &[&str] = &["+", "-", "*", "/", "=", "\u{2248}", "\u{2260}", ">", "<"];

const TECH_WORDS: &[&str] = &[
    "quantum", "cipher", "algorithm", "protocol", "neural", "biometric", "firewall", "entropy",
    "hash", "blockchain", "keystream", "handshake", "checksum", "opcode", "kernel", "compiler",
    "authentication", "encapsulation",
];

const NATURE_WORDS: &[&str] = &[
    "fire", "water", "earth", "wind", "metal", "timber", "star", "planet", "galaxy", "cosmos",
    "ocean", "volcano", "typhoon", "tornado", "glacier",
];

const POWER_WORDS: &[&str] = &[
    "force", "might", "energy", "current", "charge", "impulse", "wave", "vibration", "resonance",
    "gravity", "magnetism", "plasma", "momentum", "singularity",
];

const SECURE_WORDS: &[&str] = &[
    "secret", "passkey", "lock", "bastion", "fortress", "bunker", "armor", "shield", "labyrinth",
    "puzzle", "sentinel", "warden", "stronghold", "haven", "vault",
];

const MYTHOLOGY_WORDS: &[&str] = &[
    "dragon", "phoenix", "unicorn", "griffin", "centaur", "pegasus", "cyclops", "harpy",
    "minotaur", "siren", "basilisk", "hydra", "chimera", "leviathan", "kraken",
];

const SCIENCE_WORDS: &[&str] = &[
    "atom", "molecule", "genome", "cell", "virus", "enzyme", "hormone", "neuron", "synapse",
    "quark", "boson", "fermion", "lepton", "gluon", "isotope",
];

const DICTIONARIES: &[&[&str]] = &[
    TECH_WORDS,
    NATURE_WORDS,
    POWER_WORDS,
    SECURE_WORDS,
    MYTHOLOGY_WORDS,
    SCIENCE_WORDS,
];

/// Aggregate counters returned for caller display. Informational only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassphraseStats {
    pub total_lines: usize,
    pub user_words: usize,
    pub user_dates: usize,
    pub dictionary_words_used: usize,
    pub special_tokens_used: usize,
    pub timestamps_added: usize,
}

/// A freshly generated passphrase with its combined digest and statistics.
#[derive(Debug)]
pub struct GeneratedPassphrase {
    /// The full passphrase text: `line_count` newline-joined lines. This is
    /// the key-derivation input; it is wiped from memory on drop.
    pub text: Zeroizing<String>,
    /// `SHA3-512( hex(SHA512(text)) || hex(BLAKE2b-512(text)) )`, hex-encoded.
    /// A combined fingerprint for logging and statistics, never the KDF input.
    pub digest: String,
    pub stats: PassphraseStats,
}

/// Generates a passphrase of `line_count` lines.
///
/// Repeated calls with identical arguments produce different passphrases:
/// each run's passphrase is itself the secret.
///
/// Fails with `InvalidInput` if `words` is empty after trimming blanks, or
/// if `line_count` is zero.
pub fn generate(
    words: &[String],
    dates: &[String],
    personal_info: &BTreeMap<String, String>,
    line_count: usize,
    sink: &dyn EventSink,
) -> Result<GeneratedPassphrase> {
    let words: Vec<&str> = words.iter().map(|w| w.trim()).filter(|w| !w.is_empty()).collect();
    let dates: Vec<&str> = dates.iter().map(|d| d.trim()).filter(|d| !d.is_empty()).collect();

    if words.is_empty() {
        return Err(VaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::InvalidInput,
            "at least one non-blank user word is required",
        ));
    }
    if line_count == 0 {
        return Err(VaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::InvalidInput,
            "line count must be positive",
        ));
    }

    let mut stats = PassphraseStats {
        total_lines: line_count,
        user_words: words.len(),
        user_dates: dates.len(),
        ..Default::default()
    };

    let mut rng = rand::thread_rng();
    let base_micros = chrono::Utc::now().timestamp_micros();

    let mut lines = Zeroizing::new(String::new());
    for i in 0..line_count {
        let mut parts: Vec<String> = Vec::new();

        parts.push(words[i % words.len()].to_string());

        if !dates.is_empty() && i % 3 == 0 {
            parts.push(dates[i % dates.len()].to_string());
        }

        for dictionary in DICTIONARIES {
            if rng.gen_bool(0.4) {
                let word = dictionary.choose(&mut rng).expect("dictionary is non-empty");
                parts.push((*word).to_string());
                stats.dictionary_words_used += 1;
            }
        }

        for (key, value) in personal_info {
            if rng.gen_bool(0.2) {
                parts.push(format!("{key}_{value}"));
            }
        }

        parts.push(random_token());
        stats.special_tokens_used += 1;

        if rng.gen_bool(0.3) {
            let n1: u32 = rng.gen_range(1..=9999);
            let n2: u32 = rng.gen_range(1..=9999);
            let op = MATH_OPS.choose(&mut rng).expect("operator set is non-empty");
            parts.push(format!("{n1}{op}{n2}"));
        }

        if rng.gen_bool(0.5) {
            parts.push(random_hex_fragment());
        }

        let separator = SEPARATORS.choose(&mut rng).expect("separator set is non-empty");
        let body = parts.join(separator);

        let timestamp = base_micros + i as i64;
        let nonce = OsRng.next_u64();
        if i > 0 {
            lines.push('\n');
        }
        lines.push_str(&format!("L{:06}_T{timestamp}_N{nonce}_{body}", i + 1));
        stats.timestamps_added += 1;

        if (i + 1) % 1000 == 0 {
            sink.emit(VaultEvent::LinesGenerated { done: i + 1, total: line_count });
        }
    }
    sink.emit(VaultEvent::LinesGenerated { done: line_count, total: line_count });

    let digest = combined_digest(lines.as_bytes());

    tracing::debug!(
        lines = line_count,
        chars = lines.len(),
        "passphrase generated"
    );

    Ok(GeneratedPassphrase { text: lines, digest, stats })
}

/// Random token of 12..=32 characters from letters, digits, and punctuation.
/// Drawn entirely from the OS CSPRNG.
fn random_token() -> String {
    let mut charset: Vec<char> = ('a'..='z').chain('A'..='Z').chain('0'..='9').collect();
    charset.extend(SPECIAL_CHARS.chars());

    let len = OsRng.gen_range(12..=32);
    (0..len)
        .map(|_| *charset.choose(&mut OsRng).expect("charset is non-empty"))
        .collect()
}

/// `0x`-prefixed hex of 2..=8 CSPRNG bytes.
fn random_hex_fragment() -> String {
    let len = OsRng.gen_range(2..=8usize);
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    format!("0x{}", hex::encode(bytes))
}

/// The combined passphrase fingerprint described in the container format:
/// SHA3-512 over the concatenated hex digests of SHA512 and BLAKE2b-512.
pub fn combined_digest(text: &[u8]) -> String {
    let sha512_hex = hex::encode(Sha512::digest(text));
    let blake2b_hex = hex::encode(Blake2b512::digest(text));

    let mut outer = Sha3_512::new();
    outer.update(sha512_hex.as_bytes());
    outer.update(blake2b_hex.as_bytes());
    hex::encode(outer.finalize())
}
