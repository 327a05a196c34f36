// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Executable program to bootstrap the root key

use anyhow::{Context, anyhow};
use camino::Utf8PathBuf;
use clap::Parser;
use rootkey::RootKeySlot;
use rootkey_bootstrap::{BootstrapOutcome, Config, run};
use rootkey_common::cmd::{CmdError, fatal};
use slog::{info, warn};
use tokio::sync::watch;

#[derive(Debug, Parser)]
#[clap(
    name = "rootkey-bootstrap",
    about = "Generates the root key and hands one share to each holder"
)]
struct Args {
    #[clap(name = "CONFIG_FILE_PATH", action)]
    config_file_path: Utf8PathBuf,
}

#[tokio::main]
async fn main() {
    if let Err(cmd_error) = do_run().await {
        fatal(cmd_error);
    }
}

async fn do_run() -> Result<(), CmdError> {
    let args = Args::parse();
    let config = Config::from_file(&args.config_file_path)
        .map_err(|e| CmdError::Failure(anyhow!(e)))?;
    let log = config
        .log
        .to_logger("rootkey-bootstrap")
        .context("failed to initialize logger")
        .map_err(CmdError::Failure)?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let interrupt_log = log.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!(interrupt_log, "interrupted; canceling share distribution");
            let _ = cancel_tx.send(true);
        }
    });

    // One slot for the life of the process
    let slot = RootKeySlot::new();
    match run(&config, &slot, &log, cancel_rx)
        .await
        .context("root key bootstrap failed")
        .map_err(CmdError::Failure)?
    {
        BootstrapOutcome::Completed => {
            info!(log, "root key bootstrap complete");
            Ok(())
        }
        BootstrapOutcome::Skipped => Ok(()),
        BootstrapOutcome::Canceled => Err(CmdError::Failure(anyhow!(
            "canceled before every holder received its share"
        ))),
    }
}
