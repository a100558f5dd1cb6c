//! The encryption envelope applied to every stored session payload.
//!
//! Stores only ever see ciphertext: the [`SessionHandler`](crate::SessionHandler)
//! encrypts before `set` and decrypts after `get`, regardless of the backend.

use ring::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use ring::digest::{SHA256, digest};
use ring::rand::{SecureRandom, SystemRandom};
use std::fmt::{self, Debug};
use thiserror::Error;

/// Length in bytes of an AES-256 key.
pub const KEY_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed")]
    Decrypt,
}

/// Symmetric encryption of session payloads.
///
/// `context` is authenticated but not encrypted: a payload only decrypts
/// with the context it was sealed with, which binds it to its session id.
pub trait Cipher: Send + Sync + 'static {
    fn encrypt(&self, plaintext: &[u8], context: &[u8]) -> Result<Vec<u8>, Error>;

    fn decrypt(&self, ciphertext: &[u8], context: &[u8]) -> Result<Vec<u8>, Error>;
}

/// AES-256-GCM with a random 96-bit nonce per payload.
///
/// The output layout is `nonce || ciphertext || tag`.
pub struct AesGcmCipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl AesGcmCipher {
    /// Creates a cipher from exactly [`KEY_LEN`] bytes of key material.
    pub fn new(key: &[u8]) -> Result<Self, Error> {
        if key.len() != KEY_LEN {
            return Err(Error::InvalidKey(format!(
                "expected {KEY_LEN} bytes, got {}",
                key.len()
            )));
        }

        let unbound = UnboundKey::new(&AES_256_GCM, key)
            .map_err(|_| Error::InvalidKey("rejected by AES-256-GCM".to_string()))?;

        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Derives the key as the SHA-256 digest of `passphrase`.
    pub fn from_passphrase(passphrase: &str) -> Result<Self, Error> {
        if passphrase.is_empty() {
            return Err(Error::InvalidKey("empty passphrase".to_string()));
        }

        Self::new(digest(&SHA256, passphrase.as_bytes()).as_ref())
    }
}

impl Debug for AesGcmCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesGcmCipher").finish_non_exhaustive()
    }
}

impl Cipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &[u8], context: &[u8]) -> Result<Vec<u8>, Error> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng.fill(&mut nonce_bytes).map_err(|_| Error::Encrypt)?;

        let mut in_out = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::from(context),
                &mut in_out,
            )
            .map_err(|_| Error::Encrypt)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + in_out.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&in_out);
        Ok(sealed)
    }

    fn decrypt(&self, ciphertext: &[u8], context: &[u8]) -> Result<Vec<u8>, Error> {
        if ciphertext.len() < NONCE_LEN + AES_256_GCM.tag_len() {
            return Err(Error::Decrypt);
        }

        let (nonce_bytes, sealed) = ciphertext.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes).map_err(|_| Error::Decrypt)?;

        let mut in_out = sealed.to_vec();
        let plaintext_len = self
            .key
            .open_in_place(nonce, Aad::from(context), &mut in_out)
            .map_err(|_| Error::Decrypt)?
            .len();
        in_out.truncate(plaintext_len);

        Ok(in_out)
    }
}
