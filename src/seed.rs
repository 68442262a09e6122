//! Seed derivation - BIP39 mnemonic to 64-byte seed.
//!
//! The seed never leaves the caller's ownership except to derive node keys, and is
//! zeroized when dropped. Its `Debug` output is redacted.

use bip39::{Language, Mnemonic};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{SdkError, SdkResult};

pub const SEED_LEN: usize = 64;

/// 64-byte BIP39 seed (empty passphrase).
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Seed([u8; SEED_LEN]);

impl Seed {
    pub fn from_bytes(bytes: &[u8]) -> SdkResult<Self> {
        let arr: [u8; SEED_LEN] = bytes.try_into().map_err(|_| {
            SdkError::InvalidMnemonic(format!("seed must be {SEED_LEN} bytes, got {}", bytes.len()))
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; SEED_LEN] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl std::fmt::Debug for Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Seed(<redacted>)")
    }
}

/// Convert a whitespace-separated phrase to a seed.
pub fn mnemonic_to_seed(phrase: &str) -> SdkResult<Seed> {
    let mnemonic = Mnemonic::parse_in_normalized(Language::English, phrase.trim())
        .map_err(|e| SdkError::InvalidMnemonic(e.to_string()))?;
    Ok(Seed(mnemonic.to_seed("")))
}

/// Derive a seed from an already split word sequence.
pub fn derive_seed<S: AsRef<str>>(words: &[S]) -> SdkResult<Seed> {
    if words.is_empty() {
        return Err(SdkError::InvalidMnemonic("empty word sequence".into()));
    }
    if let Some(word) = words.iter().find(|w| w.as_ref().split_whitespace().count() != 1) {
        return Err(SdkError::InvalidMnemonic(format!("not a single word: {:?}", word.as_ref())));
    }
    let phrase = words.iter().map(|w| w.as_ref()).collect::<Vec<_>>().join(" ");
    mnemonic_to_seed(&phrase)
}

/// Generate a fresh English mnemonic (12, 15, 18, 21 or 24 words).
pub fn generate_mnemonic(word_count: usize) -> SdkResult<String> {
    let entropy_len = match word_count {
        12 => 16,
        15 => 20,
        18 => 24,
        21 => 28,
        24 => 32,
        _ => return Err(SdkError::InvalidMnemonic(format!("unsupported word count: {word_count}"))),
    };
    let mut entropy = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut entropy[..entropy_len]);
    let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy[..entropy_len])
        .map_err(|e| SdkError::InvalidMnemonic(e.to_string()));
    entropy.zeroize();
    Ok(mnemonic?.to_string())
}
