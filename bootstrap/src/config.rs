// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bootstrap process configuration

use camino::{Utf8Path, Utf8PathBuf};
use dropshot::ConfigLogging;
use rootkey::{
    ConfigError, HolderConfig, ShareConfig, StorageMode, validate_holders,
};
use rootkey_common::transport::ClientConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

fn default_liveness_timeout_secs() -> u64 {
    120
}

/// Where to send the end-to-end liveness proof
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct LivenessConfig {
    /// Base URL of the storage service
    pub url: String,
    /// Give up after this long
    #[serde(default = "default_liveness_timeout_secs")]
    pub timeout_secs: u64,
}

impl LivenessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Config {
    pub storage_mode: StorageMode,
    pub shares: ShareConfig,
    /// One entry per share, in share id order
    pub holders: Vec<HolderConfig>,
    /// Skip the liveness check if absent
    #[serde(default)]
    pub liveness: Option<LivenessConfig>,
    #[serde(default)]
    pub client: ClientConfig,
    pub log: ConfigLogging,
}

impl Config {
    /// Load a `Config` from the given TOML file
    pub fn from_file(path: &Utf8Path) -> Result<Config, LoadError> {
        let file_contents = std::fs::read_to_string(path)
            .map_err(|err| LoadError::Io { path: path.into(), err })?;
        let config_parsed: Config = toml::from_str(&file_contents)
            .map_err(|err| LoadError::Parse { path: path.into(), err })?;
        Ok(config_parsed)
    }

    /// Semantic checks that TOML parsing cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shares.validate()?;
        validate_holders(&self.shares, &self.holders)?;
        if let Some(liveness) = &self.liveness {
            if liveness.url.trim().is_empty() {
                return Err(ConfigError::EmptyStorageEndpoint);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("error reading \"{path}\": {err}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("error parsing \"{path}\": {err}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        err: toml::de::Error,
    },
}
