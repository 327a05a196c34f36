// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use rootkey::restore::RestoreCollector;
use rootkey::{RootKey, RootKeySlot, ShareConfig, SlotError, StorageMode};
use rootkey_common::authn::AuthnConfig;
use slog::{Logger, info, warn};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InstallError {
    #[error(transparent)]
    Slot(#[from] SlotError),
    #[error("{origin} produced a different root key than the one installed")]
    Mismatch { origin: &'static str },
}

/// Where an installed root key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Holders,
    Restore,
}

impl KeySource {
    fn as_str(&self) -> &'static str {
        match self {
            KeySource::Holders => "holder quorum",
            KeySource::Restore => "restore",
        }
    }
}

pub struct ServerContext {
    authn: AuthnConfig,
    storage_mode: StorageMode,
    slot: RootKeySlot,
    collector: RestoreCollector,
    log: Logger,
}

impl ServerContext {
    pub fn new(
        authn: AuthnConfig,
        storage_mode: StorageMode,
        shares: ShareConfig,
        log: Logger,
    ) -> ServerContext {
        ServerContext {
            authn,
            storage_mode,
            slot: RootKeySlot::new(),
            collector: RestoreCollector::new(shares),
            log,
        }
    }

    pub fn authn(&self) -> &AuthnConfig {
        &self.authn
    }

    pub fn log(&self) -> &Logger {
        &self.log
    }

    /// In memory mode there is no root key to protect, recover or restore.
    pub fn is_durable(&self) -> bool {
        self.storage_mode == StorageMode::Durable
    }

    pub fn slot(&self) -> &RootKeySlot {
        &self.slot
    }

    pub fn collector(&self) -> &RestoreCollector {
        &self.collector
    }

    pub fn shares(&self) -> &ShareConfig {
        self.collector.config()
    }

    /// Install `key` and close the restore session.
    ///
    /// The holder quorum read and an operator restore can race. If the slot
    /// was filled by the other path in the meantime, the same key is accepted
    /// and a different one is an error.
    pub fn install(
        &self,
        key: RootKey,
        source: KeySource,
    ) -> Result<(), InstallError> {
        match self.slot.install(key.clone()) {
            Ok(()) => {}
            Err(SlotError::AlreadyInstalled) => {
                let same = self.slot.with_key(|held| *held == key);
                if same != Some(true) {
                    warn!(
                        self.log,
                        "conflicting root key";
                        "source" => source.as_str(),
                    );
                    return Err(InstallError::Mismatch {
                        origin: source.as_str(),
                    });
                }
            }
            Err(err) => return Err(err.into()),
        }
        self.collector.mark_complete();
        info!(self.log, "root key installed"; "source" => source.as_str());
        Ok(())
    }
}
