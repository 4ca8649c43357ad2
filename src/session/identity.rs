// Session identity: deterministic file-name hashing plus the
// non-deterministic per-engine `local_seq`. `spec.md` §4.3.

use ring::rand::{SecureRandom, SystemRandom};

use crate::common::error::Result;
use crate::common::types::{LOCAL_SEQ_RANGE, SESSION_ID_ALPHABET};

/// 32-bit multiplicative hash, FNV-like, over the raw bytes of `file_name`.
/// Not cryptographic; `spec.md` §4.3 only asks for a good-enough spread,
/// not collision resistance.
fn multiplicative_hash(file_name: &str) -> u32 {
    let mut hash: u32 = 2166136261;
    for byte in file_name.as_bytes() {
        hash = hash.wrapping_mul(16777619);
        hash ^= *byte as u32;
    }
    hash
}

/// Derive a fixed-length session id over `A-Z0-9` from a file name.
/// Same input always yields the same id. The hash is converted to its
/// base-36 digit string (over `SESSION_ID_ALPHABET`), truncated to
/// `length` from the front, and right-padded with `A` if that natural
/// representation is shorter than `length`.
pub fn derive_session_id(file_name: &str, length: usize) -> String {
    let alphabet_len = SESSION_ID_ALPHABET.len() as u32;
    let mut hash = multiplicative_hash(file_name);

    let mut digits = Vec::with_capacity(length);
    while hash > 0 && digits.len() < length {
        let idx = (hash % alphabet_len) as usize;
        digits.push(SESSION_ID_ALPHABET[idx]);
        hash /= alphabet_len;
    }

    let mut id: String = digits.into_iter().map(|b| b as char).collect();
    while id.len() < length {
        id.push('A');
    }
    id
}

/// A random starting sequence number in `[0, 1000)`, drawn fresh at
/// engine construction to avoid accidental collisions across re-runs.
pub fn random_local_seq() -> Result<u32> {
    let mut bytes = [0u8; 4];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| crate::common::error::Error::Protocol("failed to generate randomness".into()))?;
    let raw = u32::from_le_bytes(bytes);
    Ok(raw % LOCAL_SEQ_RANGE)
}
