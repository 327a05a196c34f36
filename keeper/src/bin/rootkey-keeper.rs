// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Executable program to run a root key share holder

use anyhow::anyhow;
use camino::Utf8PathBuf;
use clap::Parser;
use rootkey_common::cmd::{CmdError, fatal};
use rootkey_keeper::{Config, run_server};

#[derive(Debug, Parser)]
#[clap(name = "rootkey-keeper", about = "Holds one root key share in memory")]
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
    run_server(config).await.map_err(CmdError::Failure)
}
