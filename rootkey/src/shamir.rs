// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shamir secret sharing over the P-256 scalar field
//!
//! A secret `s` is the constant term of a random polynomial `f` of degree
//! `T - 1`. Share `i` is the point `(i, f(i))` for `i` in `1..=N`. Any `T`
//! points determine `f`, and therefore `s = f(0)`, by Lagrange interpolation.
//! Fewer than `T` points are consistent with every possible secret.

use crate::secret::scalar_from_bytes;
use crate::{RootKey, ShareConfig, Threshold};
use p256::Scalar;
use p256::elliptic_curve::ff::{Field, PrimeField};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Size in bytes of an encoded share value
pub const SHARE_VALUE_LEN: usize = 32;

/// The x-coordinate of a share
///
/// Ids start at 1; 0 is the secret itself.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct ShareId(u8);

impl ShareId {
    pub fn new(id: u8) -> Option<ShareId> {
        if id == 0 { None } else { Some(ShareId(id)) }
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for ShareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single point on the sharing polynomial
///
/// The value is the canonical big-endian encoding of `f(id)`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Share {
    #[zeroize(skip)]
    id: ShareId,
    value: [u8; SHARE_VALUE_LEN],
}

impl Share {
    pub fn new(id: ShareId, value: [u8; SHARE_VALUE_LEN]) -> Share {
        Share { id, value }
    }

    pub fn id(&self) -> ShareId {
        self.id
    }

    pub fn value(&self) -> &[u8; SHARE_VALUE_LEN] {
        &self.value
    }

    pub fn is_zero(&self) -> bool {
        self.value.ct_eq(&[0u8; SHARE_VALUE_LEN]).into()
    }

    /// Whether the value decodes to an element of the scalar field
    pub fn is_canonical(&self) -> bool {
        scalar_from_bytes(&self.value).is_some()
    }
}

impl PartialEq for Share {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && bool::from(self.value.ct_eq(&other.value))
    }
}

impl Eq for Share {}

// We don't want to risk debug-logging the actual share contents, so implement
// `Debug` manually and omit sensitive fields.
impl fmt::Debug for Share {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Share")
            .field("id", &self.id)
            .field("value", &"Share")
            .finish()
    }
}

/// The `N` shares produced by one split
#[derive(Clone, PartialEq, Eq)]
pub struct ShareSet {
    threshold: Threshold,
    shares: Vec<Share>,
}

impl ShareSet {
    #[cfg(test)]
    pub(crate) fn from_parts(
        threshold: Threshold,
        shares: Vec<Share>,
    ) -> ShareSet {
        ShareSet { threshold, shares }
    }

    pub fn threshold(&self) -> Threshold {
        self.threshold
    }

    pub fn len(&self) -> usize {
        self.shares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    pub fn get(&self, id: ShareId) -> Option<&Share> {
        self.shares.iter().find(|s| s.id == id)
    }

    pub fn shares(&self) -> &[Share] {
        &self.shares
    }

    pub fn into_shares(self) -> Vec<Share> {
        self.shares
    }
}

impl fmt::Debug for ShareSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShareSet")
            .field("threshold", &self.threshold)
            .field("shares", &self.shares)
            .finish()
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ShamirError {
    #[error(transparent)]
    Config(#[from] crate::ConfigError),

    #[error("no shares to combine")]
    NoShares,

    #[error("share id {0} appears more than once")]
    DuplicateId(ShareId),

    #[error("share {0} does not encode a field element")]
    NonCanonical(ShareId),

    #[error("recombined secret is zero")]
    ZeroSecret,

    #[error("interpolation failed")]
    Interpolation,
}

/// Split `key` into `config.count` shares, any `config.threshold` of which
/// recombine to `key`.
///
/// All polynomial coefficients are drawn from `rng`.
pub fn split<R: RngCore + CryptoRng>(
    key: &RootKey,
    config: &ShareConfig,
    rng: &mut R,
) -> Result<ShareSet, ShamirError> {
    config.validate()?;

    // coefficients[0] is the secret, the rest are random
    let mut coefficients: Zeroizing<Vec<Scalar>> =
        Zeroizing::new(Vec::with_capacity(config.threshold()));
    coefficients.push(*key.scalar());
    for _ in 1..config.threshold() {
        coefficients.push(Scalar::random(&mut *rng));
    }

    let shares = (1..=config.count)
        .map(|x| {
            let x_scalar = Scalar::from(u64::from(x));
            let y = Zeroizing::new(evaluate(&coefficients, x_scalar));
            let mut value = [0u8; SHARE_VALUE_LEN];
            value.copy_from_slice(&y.to_repr());
            Share { id: ShareId(x), value }
        })
        .collect();

    Ok(ShareSet { threshold: config.threshold, shares })
}

// Horner's method
fn evaluate(coefficients: &[Scalar], x: Scalar) -> Scalar {
    coefficients.iter().rev().fold(Scalar::ZERO, |acc, c| acc * x + c)
}

/// Recombine `shares` into the secret they were split from.
///
/// Every share given is used. Passing fewer than the threshold used at split
/// time yields a wrong secret, not an error: the scheme cannot tell.
pub fn combine(shares: &[Share]) -> Result<RootKey, ShamirError> {
    if shares.is_empty() {
        return Err(ShamirError::NoShares);
    }

    let mut seen = BTreeSet::new();
    let mut xs = Vec::with_capacity(shares.len());
    let mut ys: Zeroizing<Vec<Scalar>> =
        Zeroizing::new(Vec::with_capacity(shares.len()));
    for share in shares {
        if !seen.insert(share.id) {
            return Err(ShamirError::DuplicateId(share.id));
        }
        let y = scalar_from_bytes(&share.value)
            .ok_or(ShamirError::NonCanonical(share.id))?;
        xs.push(Scalar::from(u64::from(share.id.0)));
        ys.push(y);
    }

    // Lagrange interpolation at x = 0:
    //   f(0) = sum_j y_j * prod_{m != j} x_m / (x_m - x_j)
    let mut secret = Scalar::ZERO;
    for (j, (x_j, y_j)) in xs.iter().zip(ys.iter()).enumerate() {
        let mut numerator = Scalar::ONE;
        let mut denominator = Scalar::ONE;
        for (m, x_m) in xs.iter().enumerate() {
            if m == j {
                continue;
            }
            numerator *= x_m;
            denominator *= *x_m - x_j;
        }
        // Ids are distinct and non-zero, so this only fails on a bug
        let inverse: Option<Scalar> = denominator.invert().into();
        let Some(inverse) = inverse else {
            secret.zeroize();
            return Err(ShamirError::Interpolation);
        };
        secret += *y_j * numerator * inverse;
    }

    let key = if bool::from(secret.is_zero()) {
        Err(ShamirError::ZeroSecret)
    } else {
        Ok(RootKey::from_scalar(secret))
    };
    secret.zeroize();
    key
}
