// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Storage service configuration

use camino::{Utf8Path, Utf8PathBuf};
use dropshot::{ConfigDropshot, ConfigLogging};
use rootkey::{
    ConfigError, HolderConfig, ShareConfig, StorageMode, validate_holders,
};
use rootkey_common::authn::AuthnConfig;
use rootkey_common::transport::ClientConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Config {
    /// In `memory` mode nothing survives a restart, so there is no root key
    /// and the restore, recover and verify endpoints are refused.
    pub storage_mode: StorageMode,
    pub shares: ShareConfig,
    /// Holders to read the root key back from at startup.
    ///
    /// When empty, the key can only come from an operator-driven restore.
    #[serde(default)]
    pub holders: Vec<HolderConfig>,
    #[serde(default)]
    pub client: ClientConfig,
    /// Dropshot configuration for the API server
    pub dropshot: ConfigDropshot,
    /// Server-wide logging configuration
    pub log: ConfigLogging,
    pub authn: AuthnConfig,
}

impl Config {
    /// Load a `Config` from the given TOML file
    pub fn from_file(path: &Utf8Path) -> Result<Config, LoadError> {
        let file_contents = std::fs::read_to_string(path)
            .map_err(|err| LoadError::Io { path: path.into(), err })?;
        let config_parsed: Config = toml::from_str(&file_contents)
            .map_err(|err| LoadError::Parse { path: path.into(), err })?;
        config_parsed
            .validate()
            .map_err(|err| LoadError::Invalid { path: path.into(), err })?;
        Ok(config_parsed)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shares.validate()?;
        self.authn.validate()?;
        if self.storage_mode == StorageMode::Durable && !self.holders.is_empty()
        {
            validate_holders(&self.shares, &self.holders)?;
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
    #[error("invalid configuration in \"{path}\": {err}")]
    Invalid {
        path: Utf8PathBuf,
        #[source]
        err: ConfigError,
    },
}
