// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A holder of one root key share
//!
//! The bootstrap process delivers the share with `POST /contribute`, and the
//! storage service reads it back with `GET /shard`. The share is only ever
//! kept in memory.

use dropshot::HttpServer;
use slog::{Logger, info};
use std::sync::Arc;

mod config;
mod context;
mod http_entrypoints;

pub use config::{Config, LoadError};
pub use context::{ServerContext, StoreError, Stored};

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("failed to initialize logger")]
    InitializeLogger(#[source] std::io::Error),
    #[error("failed to initialize HTTP server")]
    InitializeHttpServer(#[source] dropshot::BuildError),
}

pub type Server = HttpServer<Arc<ServerContext>>;

/// Start the keeper API server, logging to `log`.
pub fn start_server(
    config: Config,
    log: &Logger,
) -> Result<Server, StartError> {
    let log = log.new(slog::o!("holder_id" => config.id));
    let context = ServerContext::new(config.authn, log.clone());
    let server = dropshot::ServerBuilder::new(
        http_entrypoints::api(),
        Arc::new(context),
        log.new(slog::o!("component" => "dropshot")),
    )
    .config(config.dropshot)
    .start()
    .map_err(StartError::InitializeHttpServer)?;
    info!(log, "keeper listening"; "address" => %server.local_addr());
    Ok(server)
}

/// Start the keeper with the logger described by its config, and run until
/// the server exits.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let log = config
        .log
        .to_logger("rootkey-keeper")
        .map_err(StartError::InitializeLogger)?;
    let server = start_server(config, &log)?;
    server.await.map_err(|e| anyhow::anyhow!(e))
}
