// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Root key lifecycle for the secrets store
//!
//! The root key is the master symmetric key protecting every secret in the
//! store. It never touches durable storage. Instead, it is split into `N`
//! shares with a `(T, N)` Shamir threshold scheme and each share is handed to
//! an independent holder. The storage service recomputes the key by reading a
//! threshold of shares back from the holders, or, during disaster recovery,
//! from shares submitted one at a time by an operator.
//!
//! This crate contains the synchronous, network-free core of that lifecycle:
//!
//!   * [`RootKeySlot`] owns the key for the lifetime of a process and enforces
//!     that it is generated (or installed) exactly once.
//!   * [`generate_shares`] and [`verify_reconstruction`] create and self-check
//!     a [`ShareSet`].
//!   * [`export::export_recovery_shares`] hands a bounded subset of shares to
//!     an operator.
//!   * [`restore::RestoreCollector`] accumulates operator-submitted shares and
//!     reconstructs the key once a threshold is reached.
//!   * [`liveness::LivenessProof`] lets two processes prove they derived the
//!     same key without the key crossing the wire.
//!
//! Networking, retries and HTTP plumbing live in the `rootkey-bootstrap`,
//! `rootkey-keeper` and `rootkey-vault` crates.

mod config;
mod rng;
mod secret;
mod split;

pub mod authz;
pub mod export;
pub mod liveness;
pub mod restore;
pub mod shamir;

pub use config::{
    ConfigError, HolderConfig, ShareConfig, StorageMode, Threshold,
    validate_holders,
};
pub use rng::ShareRng;
pub use secret::{
    FieldMappingError, ROOT_KEY_LEN, RootKey, RootKeySlot, SlotError,
};
pub use shamir::{SHARE_VALUE_LEN, Share, ShareId, ShareSet};
pub use split::{
    GenerateError, ReconstructError, derive_shares, generate_shares,
    verify_reconstruction,
};
