// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The root key bootstrap process
//!
//! Bootstrap runs once, when the secrets store is first brought up with
//! durable storage:
//!
//! 1. Generate the root key and split it into one share per holder.
//! 2. Recombine a threshold of the shares and check the result.
//! 3. Deliver every share to its holder, retrying without limit.
//! 4. Optionally, prove to the storage service that it recombined the same
//!    key from the holders.
//!
//! The key only ever exists in this process's memory, and the process exits
//! when it is done. The caller owns the [`RootKeySlot`] and passes the same
//! one to every run, so a second run in one process fails before it derives
//! or sends anything.

use rand::rngs::OsRng;
use rootkey::liveness::{LivenessError, LivenessProof};
use rootkey::{
    ConfigError, GenerateError, RootKeySlot, StorageMode, generate_shares,
};
use rootkey_common::transport::ClientError;
use slog::{Logger, info};
use tokio::sync::watch;

mod config;
mod distribute;
mod transport;
mod verify;

pub use config::{Config, LivenessConfig, LoadError};
pub use distribute::{DistributeError, DistributionOutcome, distribute_shares};
pub use transport::{HolderTransport, HttpTransport, VaultTransport};
pub use verify::{LivenessCheckError, verify_liveness};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// Storage is not durable, so there is nothing to protect
    Skipped,
    /// Shares went out and, if configured, the liveness check passed
    Completed,
    /// Canceled while shares were still being delivered
    Canceled,
}

/// Every way bootstrap can fail. All of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("invalid configuration")]
    Config(#[from] ConfigError),

    #[error("failed to set up HTTP client")]
    Client(#[from] ClientError),

    #[error("failed to generate root key shares")]
    Generate(#[from] GenerateError),

    #[error("failed to distribute shares")]
    Distribute(#[from] DistributeError),

    #[error("failed to build liveness proof")]
    Proof(#[from] LivenessError),

    #[error("root key missing after generation")]
    KeyMissing,

    #[error("liveness check failed")]
    Liveness(#[from] LivenessCheckError),
}

/// Run bootstrap against real holders over HTTP.
pub async fn run(
    config: &Config,
    slot: &RootKeySlot,
    log: &Logger,
    cancel: watch::Receiver<bool>,
) -> Result<BootstrapOutcome, BootstrapError> {
    let transport = HttpTransport::new(&config.client)?;
    run_with_transport(config, slot, log, &transport, cancel).await
}

/// Run bootstrap using `transport` to reach holders and the storage service.
///
/// The root key is generated into `slot`. A slot that already holds a key
/// fails with [`rootkey::SlotError::AlreadyGenerated`] before any share is
/// derived.
pub async fn run_with_transport<T: HolderTransport + VaultTransport>(
    config: &Config,
    slot: &RootKeySlot,
    log: &Logger,
    transport: &T,
    cancel: watch::Receiver<bool>,
) -> Result<BootstrapOutcome, BootstrapError> {
    if config.storage_mode == StorageMode::Memory {
        info!(log, "storage is in memory; skipping root key bootstrap");
        return Ok(BootstrapOutcome::Skipped);
    }
    config.validate()?;

    let shares = generate_shares(slot, &config.shares, &mut OsRng)?;
    info!(
        log,
        "root key generated and split";
        "shares" => shares.len(),
        "threshold" => %shares.threshold(),
    );

    // Seal the proof now so the key is not needed across any await point.
    let liveness = match &config.liveness {
        Some(liveness) => {
            let proof = slot
                .with_key(|key| LivenessProof::seal(key, &mut OsRng))
                .ok_or(BootstrapError::KeyMissing)??;
            Some((liveness, proof))
        }
        None => None,
    };

    let outcome =
        distribute_shares(log, transport, &shares, &config.holders, cancel)
            .await?;
    drop(shares);
    if outcome == DistributionOutcome::Canceled {
        return Ok(BootstrapOutcome::Canceled);
    }

    if let Some((liveness, proof)) = liveness {
        verify_liveness(
            log,
            transport,
            &liveness.url,
            &proof,
            liveness.timeout(),
        )
        .await?;
    }

    Ok(BootstrapOutcome::Completed)
}
