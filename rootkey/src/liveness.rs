// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Proof that two processes hold the same root key
//!
//! The bootstrap process encrypts a random plaintext under its key and sends
//! plaintext, nonce and ciphertext to the storage service, which decrypts with
//! its own key. Only a matching key opens the ciphertext, and the key itself
//! never crosses the wire.

use crate::RootKey;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::{CryptoRng, RngCore};
use subtle::ConstantTimeEq;

pub const PLAINTEXT_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum LivenessError {
    #[error("failed to draw random bytes")]
    Rng,

    #[error("encryption failed")]
    Encrypt,

    #[error("nonce must be {NONCE_LEN} bytes, got {0}")]
    BadNonce(usize),
}

#[derive(Clone, PartialEq, Eq)]
pub struct LivenessProof {
    pub plaintext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

impl std::fmt::Debug for LivenessProof {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivenessProof")
            .field("plaintext_len", &self.plaintext.len())
            .field("ciphertext_len", &self.ciphertext.len())
            .finish()
    }
}

fn cipher(key: &RootKey) -> ChaCha20Poly1305 {
    let bytes = key.to_bytes();
    ChaCha20Poly1305::new(Key::from_slice(bytes.as_ref()))
}

impl LivenessProof {
    /// Encrypt a fresh random plaintext under `key` with a fresh nonce
    pub fn seal<R: RngCore + CryptoRng>(
        key: &RootKey,
        rng: &mut R,
    ) -> Result<LivenessProof, LivenessError> {
        let mut plaintext = vec![0u8; PLAINTEXT_LEN];
        let mut nonce = vec![0u8; NONCE_LEN];
        rng.try_fill_bytes(&mut plaintext).map_err(|_| LivenessError::Rng)?;
        rng.try_fill_bytes(&mut nonce).map_err(|_| LivenessError::Rng)?;
        let ciphertext = cipher(key)
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_ref())
            .map_err(|_| LivenessError::Encrypt)?;
        Ok(LivenessProof { plaintext, nonce, ciphertext })
    }

    /// Whether `key` opens the ciphertext to the claimed plaintext.
    ///
    /// A ciphertext that fails authentication means the keys differ and is
    /// reported as `Ok(false)`, not as an error.
    pub fn check(&self, key: &RootKey) -> Result<bool, LivenessError> {
        if self.nonce.len() != NONCE_LEN {
            return Err(LivenessError::BadNonce(self.nonce.len()));
        }
        let Ok(opened) = cipher(key)
            .decrypt(Nonce::from_slice(&self.nonce), self.ciphertext.as_ref())
        else {
            return Ok(false);
        };
        Ok(opened.as_slice().ct_eq(self.plaintext.as_slice()).into())
    }
}
