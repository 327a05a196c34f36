// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use rootkey::SHARE_VALUE_LEN;
use rootkey_common::authn::AuthnConfig;
use slog::{Logger, debug, info, warn};
use std::sync::{PoisonError, RwLock};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

type ShareBytes = Zeroizing<[u8; SHARE_VALUE_LEN]>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("share must be {SHARE_VALUE_LEN} bytes, got {0}")]
    BadLength(usize),
    #[error("share is all zero")]
    Zero,
    #[error("a different share is already held")]
    Conflict,
}

/// What happened to a delivered share
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stored {
    New,
    Duplicate,
}

pub struct ServerContext {
    authn: AuthnConfig,
    share: RwLock<Option<ShareBytes>>,
    log: Logger,
}

impl ServerContext {
    pub fn new(authn: AuthnConfig, log: Logger) -> Self {
        Self { authn, share: RwLock::new(None), log }
    }

    pub fn authn(&self) -> &AuthnConfig {
        &self.authn
    }

    pub fn log(&self) -> &Logger {
        &self.log
    }

    /// Store the share, or confirm that it is already stored.
    pub fn store(&self, value: &[u8]) -> Result<Stored, StoreError> {
        let value: &[u8; SHARE_VALUE_LEN] = value
            .try_into()
            .map_err(|_| StoreError::BadLength(value.len()))?;
        if bool::from(value.ct_eq(&[0u8; SHARE_VALUE_LEN])) {
            return Err(StoreError::Zero);
        }

        let mut share =
            self.share.write().unwrap_or_else(PoisonError::into_inner);
        match share.as_ref() {
            Some(held) if bool::from(held.ct_eq(value)) => {
                debug!(self.log, "share delivered again");
                Ok(Stored::Duplicate)
            }
            Some(_) => {
                warn!(self.log, "rejecting delivery of a different share");
                Err(StoreError::Conflict)
            }
            None => {
                *share = Some(Zeroizing::new(*value));
                info!(self.log, "share stored");
                Ok(Stored::New)
            }
        }
    }

    /// A copy of the held share, if any
    pub fn share(&self) -> Option<ShareBytes> {
        self.share
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| Zeroizing::new(**s))
    }
}
