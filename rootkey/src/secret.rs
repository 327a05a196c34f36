// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The root key and the slot that owns it for the life of a process

use p256::elliptic_curve::ff::{Field, PrimeField};
use p256::{FieldBytes, Scalar};
use rand::{CryptoRng, RngCore};
use secrecy::{ExposeSecret, SecretBox};
use std::fmt;
use std::sync::{PoisonError, RwLock};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Size in bytes of an encoded root key
pub const ROOT_KEY_LEN: usize = 32;

/// The master symmetric key protecting the secrets store.
///
/// A `RootKey` is a non-zero element of the P-256 scalar field so that it can
/// be split directly with [`crate::shamir`]. Its byte form, used as a cipher
/// key, is the 32 byte big-endian canonical encoding of that scalar.
///
/// The key lives only in memory and is zeroized on drop.
pub struct RootKey {
    secret: SecretBox<Scalar>,
}

/// The seed bytes were not the canonical encoding of a non-zero scalar
#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq)]
#[error("seed bytes do not map to a valid field element")]
pub struct FieldMappingError;

impl RootKey {
    /// Map 32 seed bytes onto the scalar field.
    ///
    /// Bytes that encode a value at or above the group order, or zero, are
    /// rejected rather than reduced. For uniformly random seeds this happens
    /// with probability below 2^-32.
    pub fn from_seed(
        seed: &[u8; ROOT_KEY_LEN],
    ) -> Result<RootKey, FieldMappingError> {
        let scalar = scalar_from_bytes(seed).ok_or(FieldMappingError)?;
        if bool::from(scalar.is_zero()) {
            return Err(FieldMappingError);
        }
        Ok(RootKey::from_scalar(scalar))
    }

    pub(crate) fn from_scalar(scalar: Scalar) -> RootKey {
        RootKey { secret: SecretBox::new(Box::new(scalar)) }
    }

    pub(crate) fn scalar(&self) -> &Scalar {
        self.secret.expose_secret()
    }

    /// Return the key bytes in a buffer that is wiped on drop
    pub fn to_bytes(&self) -> Zeroizing<[u8; ROOT_KEY_LEN]> {
        let mut out = Zeroizing::new([0u8; ROOT_KEY_LEN]);
        out.copy_from_slice(&self.scalar().to_repr());
        out
    }
}

/// Decode a canonical big-endian scalar
pub(crate) fn scalar_from_bytes(bytes: &[u8; 32]) -> Option<Scalar> {
    Option::from(Scalar::from_repr(*FieldBytes::from_slice(bytes)))
}

impl Clone for RootKey {
    fn clone(&self) -> Self {
        RootKey::from_scalar(*self.scalar())
    }
}

impl PartialEq for RootKey {
    fn eq(&self, other: &Self) -> bool {
        self.scalar().ct_eq(other.scalar()).into()
    }
}

impl Eq for RootKey {}

// We don't want to risk debug-logging the key, so implement `Debug` manually.
impl fmt::Debug for RootKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootKey").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SlotError {
    /// A second generation attempt in the same process.
    ///
    /// Shares of the first key may already be in flight under the same ids,
    /// so a second key would leave them unrecoverable.
    #[error("root key generation was already attempted in this process")]
    AlreadyGenerated,

    #[error("root key is already installed")]
    AlreadyInstalled,

    #[error("failed to draw random bytes for the root key")]
    Rng,

    #[error(transparent)]
    FieldMapping(#[from] FieldMappingError),
}

enum SlotState {
    Empty,
    // Generation was attempted and failed. The slot can never be filled again.
    Poisoned,
    Ready(RootKey),
}

/// The single owner of a process's root key
///
/// The slot starts empty and can be filled exactly once, either by
/// [`RootKeySlot::generate`] (bootstrap) or by [`RootKeySlot::install`] (the
/// storage service, after recombining shares). Afterwards the key can be read
/// concurrently with [`RootKeySlot::with_key`].
pub struct RootKeySlot {
    state: RwLock<SlotState>,
}

impl Default for RootKeySlot {
    fn default() -> Self {
        RootKeySlot::new()
    }
}

impl RootKeySlot {
    pub fn new() -> RootKeySlot {
        RootKeySlot { state: RwLock::new(SlotState::Empty) }
    }

    /// Generate a fresh root key from `rng`.
    ///
    /// Only the first call on a slot can succeed. A failed generation is not
    /// retried with fresh randomness: it leaves the slot unusable, and later
    /// calls return [`SlotError::AlreadyGenerated`].
    pub fn generate<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
    ) -> Result<(), SlotError> {
        let mut state =
            self.state.write().unwrap_or_else(PoisonError::into_inner);
        if !matches!(*state, SlotState::Empty) {
            return Err(SlotError::AlreadyGenerated);
        }
        *state = SlotState::Poisoned;

        let mut seed = Zeroizing::new([0u8; ROOT_KEY_LEN]);
        rng.try_fill_bytes(seed.as_mut()).map_err(|_| SlotError::Rng)?;
        let key = RootKey::from_seed(&seed)?;
        *state = SlotState::Ready(key);
        Ok(())
    }

    /// Install a key recombined from shares.
    pub fn install(&self, key: RootKey) -> Result<(), SlotError> {
        let mut state =
            self.state.write().unwrap_or_else(PoisonError::into_inner);
        match &*state {
            SlotState::Empty => {}
            SlotState::Poisoned => return Err(SlotError::AlreadyGenerated),
            SlotState::Ready(_) => return Err(SlotError::AlreadyInstalled),
        }
        *state = SlotState::Ready(key);
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        matches!(
            *self.state.read().unwrap_or_else(PoisonError::into_inner),
            SlotState::Ready(_)
        )
    }

    /// Run `f` against the key, if there is one.
    ///
    /// The slot's read lock is held while `f` runs, so `f` must not block.
    pub fn with_key<T>(&self, f: impl FnOnce(&RootKey) -> T) -> Option<T> {
        match &*self.state.read().unwrap_or_else(PoisonError::into_inner) {
            SlotState::Ready(key) => Some(f(key)),
            SlotState::Empty | SlotState::Poisoned => None,
        }
    }
}
