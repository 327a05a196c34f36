// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end check that the storage service derived our root key

use crate::transport::VaultTransport;
use rootkey::liveness::LivenessProof;
use rootkey_common::backoff::{BackoffError, liveness_policy, retry_notify};
use rootkey_common::transport::TransportError;
use slog::{Logger, info, warn};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LivenessCheckError {
    #[error("storage service holds a different root key")]
    Mismatch,

    #[error("could not reach the storage service")]
    Transport(#[source] TransportError),
}

/// Submit `proof` to the storage service at `url` until it answers, for at
/// most `timeout`.
///
/// A `verified: false` answer is not retried: the keys differ and will keep
/// differing.
pub async fn verify_liveness<T: VaultTransport + ?Sized>(
    log: &Logger,
    transport: &T,
    url: &str,
    proof: &LivenessProof,
    timeout: Duration,
) -> Result<(), LivenessCheckError> {
    let check = || async move {
        match transport.verify(url, proof).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                Err(BackoffError::permanent(LivenessCheckError::Mismatch))
            }
            Err(err) if err.is_permanent() => Err(BackoffError::permanent(
                LivenessCheckError::Transport(err),
            )),
            Err(err) => Err(BackoffError::transient(
                LivenessCheckError::Transport(err),
            )),
        }
    };
    let log_failure = |err: LivenessCheckError, delay: Duration| {
        warn!(
            log,
            "liveness check failed; will retry";
            "error" => %err,
            "retry_after" => ?delay,
        );
    };
    retry_notify(liveness_policy(timeout), check, log_failure).await?;
    info!(log, "storage service holds the same root key");
    Ok(())
}
