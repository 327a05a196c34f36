// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Handing a threshold of shares to an operator for offline safekeeping

use crate::authz::{AuthzError, Grant, Role};
use crate::shamir::ShamirError;
use crate::{RootKey, Share, ShareConfig, ShareId, derive_shares};
use std::collections::BTreeSet;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ExportError {
    #[error("not authorized to export recovery shares")]
    Unauthorized(#[from] AuthzError),

    #[error("failed to derive shares")]
    Derive(#[from] ShamirError),

    #[error("only {available} shares available for threshold {threshold}")]
    TooFewShares { available: usize, threshold: usize },

    #[error("share id {0} appears more than once")]
    DuplicateId(ShareId),

    #[error("share {0} is all zero")]
    ZeroValue(ShareId),

    #[error("share id {id} outside 1..={max}")]
    IdOutOfRange { id: ShareId, max: u8 },
}

/// Return exactly `threshold` shares of `key`, ids `1..=T`.
///
/// The shares are re-derived with the keyed generator, so they are the same
/// shares the holders received at bootstrap. The set is checked with
/// [`validate_recovery_shares`] before it is returned.
pub fn export_recovery_shares(
    grant: &Grant,
    key: &RootKey,
    config: &ShareConfig,
) -> Result<Vec<Share>, ExportError> {
    grant.require(Role::RecoveryExport)?;
    let mut shares = derive_shares(key, config)?.into_shares();
    shares.truncate(config.threshold());
    validate_recovery_shares(&shares, config)?;
    Ok(shares)
}

/// Check that `shares` is a usable recovery set: at least `T` shares, ids
/// distinct and within `1..=N`, no all-zero value.
pub fn validate_recovery_shares(
    shares: &[Share],
    config: &ShareConfig,
) -> Result<(), ExportError> {
    if shares.len() < config.threshold() {
        return Err(ExportError::TooFewShares {
            available: shares.len(),
            threshold: config.threshold(),
        });
    }
    let mut seen = BTreeSet::new();
    for share in shares {
        let id = share.id();
        if id.get() > config.count {
            return Err(ExportError::IdOutOfRange { id, max: config.count });
        }
        if !seen.insert(id) {
            return Err(ExportError::DuplicateId(id));
        }
        if share.is_zero() {
            return Err(ExportError::ZeroValue(id));
        }
    }
    Ok(())
}
