// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The storage service's side of the root key lifecycle
//!
//! In `durable` storage mode the service obtains its root key at startup:
//!
//! * with holders configured, it reads a threshold of shares back from the
//!   holders and recombines them;
//! * otherwise, or while the holders are unreachable, an operator can
//!   submit recovery shares one at a time with `POST /restore`.
//!
//! Once the key is in place the service answers liveness proofs from the
//! bootstrap process (`POST /verify`) and exports recovery shares
//! (`/recover`).
//!
//! In `memory` mode nothing survives a restart, so there is no root key.
//! Every endpoint answers 400 `NotApplicable` to an authorized caller.

use dropshot::HttpServer;
use rootkey::{ConfigError, StorageMode};
use rootkey_common::transport::ClientError;
use slog::{Logger, info};
use std::sync::Arc;

mod config;
mod context;
mod http_entrypoints;
mod quorum;

pub use config::{Config, LoadError};
pub use context::{InstallError, KeySource, ServerContext};
pub use quorum::{
    HttpShareSource, QuorumError, QuorumOutcome, ShareSource,
    restore_from_holders,
};

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("invalid configuration")]
    Config(#[from] ConfigError),
    #[error("failed to initialize logger")]
    InitializeLogger(#[source] std::io::Error),
    #[error("failed to set up HTTP client")]
    Client(#[from] ClientError),
    #[error("failed to initialize HTTP server")]
    InitializeHttpServer(#[source] dropshot::BuildError),
}

pub type Server = HttpServer<Arc<ServerContext>>;

/// Start the storage service's API server, logging to `log`.
///
/// In `durable` mode with holders configured, the holder quorum read runs in
/// the background while the server is already answering requests.
pub fn start_server(
    config: Config,
    log: &Logger,
) -> Result<Server, StartError> {
    config.validate()?;
    let context = Arc::new(ServerContext::new(
        config.authn,
        config.storage_mode,
        config.shares,
        log.clone(),
    ));

    match config.storage_mode {
        StorageMode::Memory => {
            info!(log, "storage is in memory; root key lifecycle disabled");
        }
        StorageMode::Durable if config.holders.is_empty() => {
            info!(log, "no holders configured; waiting for restore");
        }
        StorageMode::Durable => {
            let source = HttpShareSource::new(&config.client)?;
            quorum::spawn_quorum_read(
                Arc::clone(&context),
                source,
                config.holders,
            );
        }
    }

    let server = dropshot::ServerBuilder::new(
        http_entrypoints::api(),
        context,
        log.new(slog::o!("component" => "dropshot")),
    )
    .config(config.dropshot)
    .start()
    .map_err(StartError::InitializeHttpServer)?;
    info!(log, "vault listening"; "address" => %server.local_addr());
    Ok(server)
}

/// Start the storage service with the logger described by its config, and
/// run until the server exits.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let log = config
        .log
        .to_logger("rootkey-vault")
        .map_err(StartError::InitializeLogger)?;
    let server = start_server(config, &log)?;
    server.await.map_err(|e| anyhow::anyhow!(e))
}
