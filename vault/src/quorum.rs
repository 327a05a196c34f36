// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reading the root key back from a quorum of holders at startup

use crate::context::{InstallError, KeySource, ServerContext};
use async_trait::async_trait;
use futures::future::join_all;
use rootkey::shamir::{ShamirError, combine};
use rootkey::{HolderConfig, SHARE_VALUE_LEN, Share, ShareId};
use rootkey_api::{Base64Bytes, ShardResponse};
use rootkey_common::backoff::{Backoff, quorum_policy};
use rootkey_common::transport::{
    ClientConfig, ClientError, HttpClient, StatusCode, TransportError, send,
};
use slog::{Logger, debug, error, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Reading one holder's share
#[async_trait]
pub trait ShareSource: Send + Sync {
    async fn fetch(
        &self,
        holder: &HolderConfig,
    ) -> Result<Base64Bytes, TransportError>;
}

/// Reads shares from keepers with `GET /shard`
pub struct HttpShareSource {
    client: HttpClient,
}

impl HttpShareSource {
    pub fn new(config: &ClientConfig) -> Result<HttpShareSource, ClientError> {
        Ok(HttpShareSource { client: HttpClient::new(config)? })
    }
}

#[async_trait]
impl ShareSource for HttpShareSource {
    async fn fetch(
        &self,
        holder: &HolderConfig,
    ) -> Result<Base64Bytes, TransportError> {
        let resp = send(self.client.get(&holder.url, "/shard")).await?;
        let ShardResponse { shard } = resp.json().await?;
        Ok(shard)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuorumOutcome {
    /// The key was recombined from the holders and installed
    Installed,
    /// A key was installed some other way first
    AlreadyRestored,
}

#[derive(Debug, thiserror::Error)]
pub enum QuorumError {
    #[error("failed to recombine shares read from holders")]
    Combine(#[source] ShamirError),
    #[error("failed to install the recombined root key")]
    Install(#[source] InstallError),
}

/// Why a holder's answer was not usable
#[derive(Debug, thiserror::Error)]
enum FetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("holder id is not a valid share id")]
    BadId,
    #[error("share is not a {SHARE_VALUE_LEN} byte field element")]
    InvalidShard,
}

/// Read shares from `holders` until a threshold is in hand, then recombine
/// and install the root key.
///
/// Holders that are unreachable, have nothing yet, or answer with an invalid
/// share are retried without limit. The loop ends early once the key has been
/// installed by other means, such as an operator restore.
pub async fn restore_from_holders<S: ShareSource + ?Sized>(
    ctx: &ServerContext,
    source: &S,
    holders: &[HolderConfig],
) -> Result<QuorumOutcome, QuorumError> {
    let log = ctx.log();
    let threshold = ctx.shares().threshold();
    let mut collected: BTreeMap<u8, Share> = BTreeMap::new();
    let mut policy = quorum_policy();
    let mut round: u64 = 0;

    loop {
        if ctx.slot().is_ready() {
            info!(log, "root key already installed; stopping holder reads");
            return Ok(QuorumOutcome::AlreadyRestored);
        }
        round += 1;

        let pending: Vec<&HolderConfig> = holders
            .iter()
            .filter(|h| !collected.contains_key(&h.id))
            .collect();
        let results = join_all(
            pending.iter().map(|holder| fetch_share(source, holder)),
        )
        .await;
        for (holder, result) in pending.into_iter().zip(results) {
            match result {
                Ok(share) => {
                    debug!(log, "read share"; "holder_id" => holder.id);
                    collected.insert(holder.id, share);
                }
                Err(err) => {
                    log_fetch_failure(log, holder, round, &err);
                }
            }
        }

        if collected.len() >= threshold {
            break;
        }
        let delay = policy.next_backoff().unwrap_or(policy.max_interval);
        info!(
            log,
            "waiting for more holders";
            "collected" => collected.len(),
            "threshold" => threshold,
            "retry_after" => ?delay,
        );
        tokio::time::sleep(delay).await;
    }

    let shares: Vec<Share> = collected.into_values().take(threshold).collect();
    let key = combine(&shares).map_err(QuorumError::Combine)?;
    drop(shares);
    ctx.install(key, KeySource::Holders).map_err(QuorumError::Install)?;
    Ok(QuorumOutcome::Installed)
}

async fn fetch_share<S: ShareSource + ?Sized>(
    source: &S,
    holder: &HolderConfig,
) -> Result<Share, FetchError> {
    let id = ShareId::new(holder.id).ok_or(FetchError::BadId)?;
    let bytes = source.fetch(holder).await?;
    let value = <[u8; SHARE_VALUE_LEN]>::try_from(bytes.as_bytes())
        .map_err(|_| FetchError::InvalidShard)?;
    let share = Share::new(id, value);
    if share.is_zero() || !share.is_canonical() {
        return Err(FetchError::InvalidShard);
    }
    Ok(share)
}

fn log_fetch_failure(
    log: &Logger,
    holder: &HolderConfig,
    round: u64,
    err: &FetchError,
) {
    let not_found = matches!(
        err,
        FetchError::Transport(e) if e.status() == Some(StatusCode::NOT_FOUND)
    );
    if not_found {
        debug!(
            log,
            "holder has no share yet";
            "holder_id" => holder.id,
            "round" => round,
        );
    } else {
        warn!(
            log,
            "failed to read share";
            "holder_id" => holder.id,
            "round" => round,
            "error" => %err,
        );
    }
}

/// Run [`restore_from_holders`] in the background, logging its outcome.
pub fn spawn_quorum_read<S: ShareSource + 'static>(
    ctx: Arc<ServerContext>,
    source: S,
    holders: Vec<HolderConfig>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match restore_from_holders(&ctx, &source, &holders).await {
            Ok(outcome) => {
                debug!(
                    ctx.log(),
                    "holder quorum read done";
                    "outcome" => ?outcome,
                );
            }
            Err(err) => {
                error!(
                    ctx.log(),
                    "holder quorum read failed";
                    "error" => %err,
                );
            }
        }
    })
}
