// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Root key generation, splitting and the post-split self check

use crate::shamir::{self, ShamirError};
use crate::{
    ConfigError, RootKey, RootKeySlot, ShareConfig, ShareRng, ShareSet,
    SlotError,
};
use rand::{CryptoRng, RngCore};

/// Errors from [`generate_shares`]. Every one of them is fatal to the caller.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum GenerateError {
    #[error("invalid share configuration")]
    Config(#[from] ConfigError),

    #[error("root key generation failed")]
    Slot(#[from] SlotError),

    #[error("splitting the root key failed")]
    Split(#[from] ShamirError),

    #[error("reconstruction check failed")]
    Reconstruct(#[from] ReconstructError),
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ReconstructError {
    #[error("only {available} shares available for threshold {threshold}")]
    TooFewShares { available: usize, threshold: usize },

    #[error("failed to recombine shares")]
    Combine(#[from] ShamirError),

    #[error("recombined secret does not match the original")]
    Mismatch,
}

/// Split `key` using the generator keyed by `key` itself.
///
/// The same key and configuration always produce the same shares.
pub fn derive_shares(
    key: &RootKey,
    config: &ShareConfig,
) -> Result<ShareSet, ShamirError> {
    let mut rng = ShareRng::keyed(key);
    shamir::split(key, config, &mut rng)
}

/// Generate the process root key into `slot` and split it into shares.
///
/// The key seed is drawn from `rng`. This may be called at most once per slot;
/// a second call returns [`SlotError::AlreadyGenerated`]. The returned shares
/// have already passed [`verify_reconstruction`].
pub fn generate_shares<R: RngCore + CryptoRng>(
    slot: &RootKeySlot,
    config: &ShareConfig,
    rng: &mut R,
) -> Result<ShareSet, GenerateError> {
    config.validate()?;
    slot.generate(rng)?;
    slot.with_key(|key| {
        let shares = derive_shares(key, config)?;
        verify_reconstruction(key, &shares)?;
        Ok(shares)
    })
    // `generate` just succeeded and a ready slot never empties
    .unwrap_or(Err(GenerateError::Slot(SlotError::AlreadyGenerated)))
}

/// Recombine exactly `threshold` of `shares` and compare the result with
/// `key` in constant time.
///
/// The recombined key is dropped, and therefore zeroized, before this returns
/// on every path.
pub fn verify_reconstruction(
    key: &RootKey,
    shares: &ShareSet,
) -> Result<(), ReconstructError> {
    let threshold = usize::from(shares.threshold().0);
    if shares.len() < threshold || threshold == 0 {
        return Err(ReconstructError::TooFewShares {
            available: shares.len(),
            threshold,
        });
    }
    let reconstructed = shamir::combine(&shares.shares()[..threshold])?;
    let matches = reconstructed == *key;
    drop(reconstructed);
    if matches { Ok(()) } else { Err(ReconstructError::Mismatch) }
}
