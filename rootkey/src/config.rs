// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Share counts, thresholds and holder endpoints shared by every process

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The number of shares required to reconstruct the root key
///
/// Typically referred to as `T` (or `k`) in the docs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Threshold(pub u8);

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("share count must be at least 1")]
    NoShares,

    #[error("threshold must be at least 1")]
    ZeroThreshold,

    #[error("threshold {threshold} exceeds share count {count}")]
    ThresholdExceedsShares { threshold: u8, count: u8 },

    #[error("{holders} holders configured for {shares} shares")]
    HolderCountMismatch { holders: usize, shares: u8 },

    #[error("holder id {0} configured more than once")]
    DuplicateHolder(u8),

    #[error("holder id {0} has no endpoint")]
    EmptyEndpoint(u8),

    #[error("storage service endpoint must not be empty")]
    EmptyStorageEndpoint,

    #[error("trust domain must not be empty")]
    EmptyTrustDomain,

    #[error("identity {identity} is assigned to both {first} and {second}")]
    SharedIdentity { identity: String, first: String, second: String },
}

/// How many shares to produce and how many are needed to recombine them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareConfig {
    /// Total number of shares, `N`. One per holder.
    pub count: u8,
    /// Shares needed for reconstruction, `T`.
    pub threshold: Threshold,
}

impl ShareConfig {
    pub fn new(count: u8, threshold: u8) -> Result<ShareConfig, ConfigError> {
        let config = ShareConfig { count, threshold: Threshold(threshold) };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.count == 0 {
            return Err(ConfigError::NoShares);
        }
        if self.threshold.0 == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        if self.threshold.0 > self.count {
            return Err(ConfigError::ThresholdExceedsShares {
                threshold: self.threshold.0,
                count: self.count,
            });
        }
        Ok(())
    }

    pub fn threshold(&self) -> usize {
        usize::from(self.threshold.0)
    }

    pub fn count(&self) -> usize {
        usize::from(self.count)
    }
}

/// A holder of exactly one share
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderConfig {
    /// The id of the share this holder receives
    pub id: u8,
    /// Base URL of the holder's API, e.g. `https://keeper-1.example:8443`
    pub url: String,
}

/// Whether the storage service keeps data durably
///
/// In `memory` mode nothing survives a restart, so there is no root key to
/// protect and the whole bootstrap subsystem is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    Durable,
    Memory,
}

/// Check that `holders` lines up with `shares`: one holder per share, each id
/// used once and each with an endpoint.
///
/// Ids outside `1..=count` are not rejected here. They surface as a missing
/// share when the shares are matched to holders.
pub fn validate_holders(
    shares: &ShareConfig,
    holders: &[HolderConfig],
) -> Result<(), ConfigError> {
    if holders.len() != shares.count() {
        return Err(ConfigError::HolderCountMismatch {
            holders: holders.len(),
            shares: shares.count,
        });
    }
    let mut seen = BTreeSet::new();
    for holder in holders {
        if !seen.insert(holder.id) {
            return Err(ConfigError::DuplicateHolder(holder.id));
        }
        if holder.url.trim().is_empty() {
            return Err(ConfigError::EmptyEndpoint(holder.id));
        }
    }
    Ok(())
}
