//! # Packet Cipher
//!
//! AES-256-CBC with PKCS#7 padding over whole packet bodies.
//!
//! Both peers hold the same pre-shared 32-byte key and 16-byte IV; the IV is
//! reused for every message on every connection. Encryption is therefore
//! deterministic: equal plaintext prefixes produce equal ciphertext prefixes,
//! and nothing authenticates the ciphertext. A tampered body either fails
//! padding checks ([`ProtocolError::DecryptionFailure`]) or decrypts to
//! garbage that the payload classifier has to cope with.

use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{ProtocolError, Result};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// AES-256 key length in bytes.
pub const KEY_SIZE: usize = 32;
/// CBC IV length in bytes.
pub const IV_SIZE: usize = 16;
/// AES block length in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Stateless AES-256-CBC encrypt/decrypt with a fixed key and IV.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Cipher {
    key: [u8; KEY_SIZE],
    iv: [u8; IV_SIZE],
}

impl Cipher {
    pub fn new(key: [u8; KEY_SIZE], iv: [u8; IV_SIZE]) -> Self {
        Self { key, iv }
    }

    /// Build a cipher from slices, checking their lengths.
    pub fn from_slices(key: &[u8], iv: &[u8]) -> Result<Self> {
        let key: [u8; KEY_SIZE] = key.try_into().map_err(|_| {
            ProtocolError::InvalidKey(format!("key must be {KEY_SIZE} bytes, got {}", key.len()))
        })?;
        let iv: [u8; IV_SIZE] = iv.try_into().map_err(|_| {
            ProtocolError::InvalidKey(format!("IV must be {IV_SIZE} bytes, got {}", iv.len()))
        })?;
        Ok(Self::new(key, iv))
    }

    /// Draw a fresh key and IV from the operating system RNG.
    pub fn generate() -> Result<Self> {
        let mut key = [0u8; KEY_SIZE];
        let mut iv = [0u8; IV_SIZE];
        getrandom::fill(&mut key)
            .and_then(|()| getrandom::fill(&mut iv))
            .map_err(|e| ProtocolError::InvalidKey(format!("OS RNG unavailable: {e}")))?;
        let cipher = Self::new(key, iv);
        key.zeroize();
        iv.zeroize();
        Ok(cipher)
    }

    pub fn encrypt(&self, plain: &[u8]) -> Result<Vec<u8>> {
        let enc = Aes256CbcEnc::new_from_slices(&self.key, &self.iv)
            .map_err(|_| ProtocolError::EncryptionFailure)?;
        Ok(enc.encrypt_padded_vec_mut::<Pkcs7>(plain))
    }

    /// Decrypt a body produced by [`Cipher::encrypt`].
    ///
    /// Empty, truncated (not a whole number of blocks) or badly padded input
    /// fails with [`ProtocolError::DecryptionFailure`].
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(ProtocolError::DecryptionFailure);
        }
        let dec = Aes256CbcDec::new_from_slices(&self.key, &self.iv)
            .map_err(|_| ProtocolError::DecryptionFailure)?;
        dec.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| ProtocolError::DecryptionFailure)
    }

    /// Ciphertext length for a plaintext of `plain_len` bytes.
    ///
    /// PKCS#7 always pads, so a block-aligned plaintext grows by a full block.
    pub const fn ciphertext_len(plain_len: usize) -> usize {
        (plain_len / BLOCK_SIZE + 1) * BLOCK_SIZE
    }
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cipher")
            .field("algorithm", &"AES-256-CBC")
            .finish_non_exhaustive()
    }
}
