// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Collecting operator-submitted shares during disaster recovery
//!
//! A [`RestoreCollector`] moves through three states:
//!
//! ```text
//!   Empty ──submit──▶ Collecting ──T-th submit──▶ Complete
//!     ▲                                │
//!     └──────── reconstruction failed ─┘
//! ```
//!
//! `Complete` is terminal. Every submission, accepted or not, reports the
//! current [`RestoreStatus`].

use crate::authz::{AuthzError, Grant, Role};
use crate::shamir::{self, ShamirError};
use crate::{RootKey, SHARE_VALUE_LEN, Share, ShareConfig, ShareId};
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreState {
    Empty,
    Collecting,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreStatus {
    pub collected: usize,
    pub remaining: usize,
    pub restored: bool,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RestoreError {
    #[error("not authorized to restore")]
    Unauthorized(#[from] AuthzError),

    #[error("root key already restored")]
    AlreadyRestored,

    #[error("share id {id} outside 1..={max}")]
    IdOutOfRange { id: u8, max: u8 },

    #[error("share value is all zero")]
    ZeroValue,

    #[error("share value is not a {SHARE_VALUE_LEN} byte field element")]
    InvalidShard,

    #[error("share id {0} already submitted")]
    DuplicateId(ShareId),

    #[error("reconstruction failed; all submitted shares were discarded")]
    Reconstruct(#[source] ShamirError),
}

/// A submission that changed nothing, or whose reconstruction failed
#[derive(Debug)]
pub struct Rejection {
    pub error: RestoreError,
    pub status: RestoreStatus,
}

/// A submission that was added to the session
///
/// `key` is set on exactly one call per collector: the one that brought the
/// session to the threshold.
#[derive(Debug)]
pub struct Accepted {
    pub status: RestoreStatus,
    pub key: Option<RootKey>,
}

struct Session {
    // Complete is recorded separately so the shard buffer can be wiped
    complete: bool,
    shards: Vec<Share>,
}

pub struct RestoreCollector {
    config: ShareConfig,
    session: RwLock<Session>,
}

impl RestoreCollector {
    pub fn new(config: ShareConfig) -> RestoreCollector {
        RestoreCollector {
            config,
            session: RwLock::new(Session {
                complete: false,
                shards: Vec::with_capacity(config.threshold()),
            }),
        }
    }

    pub fn config(&self) -> &ShareConfig {
        &self.config
    }

    fn status_of(&self, session: &Session) -> RestoreStatus {
        let threshold = self.config.threshold();
        let collected =
            if session.complete { threshold } else { session.shards.len() };
        RestoreStatus {
            collected,
            remaining: threshold.saturating_sub(collected),
            restored: session.complete,
        }
    }

    pub fn status(&self) -> RestoreStatus {
        let session =
            self.session.read().unwrap_or_else(PoisonError::into_inner);
        self.status_of(&session)
    }

    pub fn state(&self) -> RestoreState {
        let session =
            self.session.read().unwrap_or_else(PoisonError::into_inner);
        if session.complete {
            RestoreState::Complete
        } else if session.shards.is_empty() {
            RestoreState::Empty
        } else {
            RestoreState::Collecting
        }
    }

    /// Move to `Complete` without reconstructing, because the key was obtained
    /// some other way. Any collected shards are discarded.
    pub fn mark_complete(&self) {
        let mut session =
            self.session.write().unwrap_or_else(PoisonError::into_inner);
        session.complete = true;
        session.shards.clear();
    }

    /// Validate and record one share.
    ///
    /// Checks run in this order and the first failure is returned: the grant
    /// holds [`Role::Restore`], the session is not complete, `id` is in
    /// `1..=N`, `value` is not all zero, `value` is a field element, and `id`
    /// has not been submitted before. Validation and insertion happen under a
    /// single write lock, so concurrent submissions are serialized.
    pub fn submit(
        &self,
        grant: &Grant,
        id: u8,
        value: &[u8],
    ) -> Result<Accepted, Rejection> {
        let mut session =
            self.session.write().unwrap_or_else(PoisonError::into_inner);
        let reject = |error: RestoreError, session: &Session| Rejection {
            error,
            status: self.status_of(session),
        };

        if let Err(e) = grant.require(Role::Restore) {
            return Err(reject(e.into(), &session));
        }
        if session.complete {
            return Err(reject(RestoreError::AlreadyRestored, &session));
        }
        let share_id = match ShareId::new(id) {
            Some(share_id) if id <= self.config.count => share_id,
            _ => {
                let error = RestoreError::IdOutOfRange {
                    id,
                    max: self.config.count,
                };
                return Err(reject(error, &session));
            }
        };
        if value.iter().all(|b| *b == 0) {
            return Err(reject(RestoreError::ZeroValue, &session));
        }
        let Ok(bytes) = <[u8; SHARE_VALUE_LEN]>::try_from(value) else {
            return Err(reject(RestoreError::InvalidShard, &session));
        };
        let share = Share::new(share_id, bytes);
        if !share.is_canonical() {
            return Err(reject(RestoreError::InvalidShard, &session));
        }
        if session.shards.iter().any(|s| s.id() == share_id) {
            return Err(reject(RestoreError::DuplicateId(share_id), &session));
        }

        session.shards.push(share);
        if session.shards.len() < self.config.threshold() {
            return Ok(Accepted { status: self.status_of(&session), key: None });
        }

        // Threshold reached. The buffer is wiped whatever the outcome; dropping
        // each `Share` zeroizes it.
        let result = shamir::combine(&session.shards);
        session.shards.clear();
        match result {
            Ok(key) => {
                session.complete = true;
                Ok(Accepted {
                    status: self.status_of(&session),
                    key: Some(key),
                })
            }
            Err(e) => Err(reject(RestoreError::Reconstruct(e), &session)),
        }
    }
}
