// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Delivering each share to its holder

use crate::transport::HolderTransport;
use futures::future::try_join_all;
use rootkey::{HolderConfig, Share, ShareId, ShareSet};
use rootkey_common::backoff::{Backoff, distribution_policy};
use rootkey_common::transport::TransportError;
use slog::{Logger, info, o, warn};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributionOutcome {
    /// Every holder acknowledged its share
    Delivered,
    /// The cancel signal fired before every holder acknowledged
    Canceled,
}

#[derive(Debug, thiserror::Error)]
pub enum DistributeError {
    #[error("no share for holder {0}")]
    MissingShare(u8),

    #[error("holder {holder_id} refused its share")]
    Rejected {
        holder_id: u8,
        #[source]
        err: TransportError,
    },
}

/// Deliver every share to the holder with the same id.
///
/// Holders are matched to shares before anything is sent, so a configuration
/// that names an id with no share fails without contacting anybody. Each
/// holder is then retried independently and without limit until it
/// acknowledges. Setting `cancel` to `true` stops all retries at the next
/// attempt boundary.
pub async fn distribute_shares<T: HolderTransport + ?Sized>(
    log: &Logger,
    transport: &T,
    shares: &ShareSet,
    holders: &[HolderConfig],
    cancel: watch::Receiver<bool>,
) -> Result<DistributionOutcome, DistributeError> {
    let mut assignments = Vec::with_capacity(holders.len());
    for holder in holders {
        let share = ShareId::new(holder.id)
            .and_then(|id| shares.get(id))
            .ok_or(DistributeError::MissingShare(holder.id))?;
        assignments.push((holder, share));
    }

    let deliveries = assignments.into_iter().map(|(holder, share)| {
        let log = log.new(o!(
            "holder_id" => holder.id,
            "url" => holder.url.clone(),
        ));
        deliver(log, transport, holder, share, cancel.clone())
    });
    let outcomes = try_join_all(deliveries).await?;

    if outcomes.contains(&DistributionOutcome::Canceled) {
        info!(log, "share distribution canceled");
        Ok(DistributionOutcome::Canceled)
    } else {
        info!(log, "all shares delivered"; "holders" => holders.len());
        Ok(DistributionOutcome::Delivered)
    }
}

async fn deliver<T: HolderTransport + ?Sized>(
    log: Logger,
    transport: &T,
    holder: &HolderConfig,
    share: &Share,
    mut cancel: watch::Receiver<bool>,
) -> Result<DistributionOutcome, DistributeError> {
    let mut policy = distribution_policy();
    let mut attempt: u64 = 0;
    loop {
        if *cancel.borrow_and_update() {
            return Ok(DistributionOutcome::Canceled);
        }
        attempt += 1;
        match transport.contribute(holder, share).await {
            Ok(()) => {
                info!(log, "share delivered"; "attempts" => attempt);
                return Ok(DistributionOutcome::Delivered);
            }
            Err(err) if err.is_permanent() => {
                warn!(log, "holder refused share"; "error" => %err);
                return Err(DistributeError::Rejected {
                    holder_id: holder.id,
                    err,
                });
            }
            Err(err) => {
                let delay =
                    policy.next_backoff().unwrap_or(policy.max_interval);
                warn!(
                    log,
                    "failed to deliver share; will retry";
                    "attempt" => attempt,
                    "retry_after" => ?delay,
                    "error" => %err,
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    Ok(()) = cancel.changed() => {}
                }
            }
        }
    }
}
