// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mapping verified workload identities onto roles
//!
//! Callers are authenticated by mutual TLS before a request reaches us. What
//! arrives here is the identity string that authentication produced, e.g.
//! `spiffe://example.org/rootkey/bootstrap`. Each endpoint accepts exactly one
//! [`Role`], and each role is granted to a configured set of identities.

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

const SPIFFE_SCHEME: &str = "spiffe://";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// The bootstrap process, pushing shares to holders
    BootstrapDistributor,
    /// An operator exporting shares for offline safekeeping
    RecoveryExport,
    /// An operator submitting shares during disaster recovery
    Restore,
    /// The storage service, reading shares back from holders
    Storage,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::BootstrapDistributor,
        Role::RecoveryExport,
        Role::Restore,
        Role::Storage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::BootstrapDistributor => "bootstrap-distributor",
            Role::RecoveryExport => "recovery-export",
            Role::Restore => "restore",
            Role::Storage => "storage",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AuthzError {
    #[error("request carries no verified identity")]
    MissingIdentity,

    #[error("identity {0:?} is not a workload identity URI")]
    MalformedIdentity(String),

    #[error("identity {identity:?} is outside trust domain {trust_domain:?}")]
    ForeignTrustDomain { identity: String, trust_domain: String },

    #[error("identity {identity:?} does not hold role {role}")]
    MissingRole { identity: String, role: Role },
}

/// Which identities hold which role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolePolicy {
    /// Every accepted identity must be `spiffe://<trust_domain>/...`
    pub trust_domain: String,
    pub bootstrap_distributor: BTreeSet<String>,
    pub recovery_export: BTreeSet<String>,
    pub restore: BTreeSet<String>,
    pub storage: BTreeSet<String>,
}

impl RolePolicy {
    pub fn identities(&self, role: Role) -> &BTreeSet<String> {
        match role {
            Role::BootstrapDistributor => &self.bootstrap_distributor,
            Role::RecoveryExport => &self.recovery_export,
            Role::Restore => &self.restore,
            Role::Storage => &self.storage,
        }
    }

    /// Reject a policy that leaves the trust domain unset or grants one
    /// identity more than one role.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trust_domain.trim().is_empty() {
            return Err(ConfigError::EmptyTrustDomain);
        }
        let mut owners: Vec<(&str, Role)> = Vec::new();
        for role in Role::ALL {
            for identity in self.identities(role) {
                if let Some((_, first)) =
                    owners.iter().find(|(id, _)| *id == identity.as_str())
                {
                    return Err(ConfigError::SharedIdentity {
                        identity: identity.clone(),
                        first: first.to_string(),
                        second: role.to_string(),
                    });
                }
                owners.push((identity, role));
            }
        }
        Ok(())
    }

    /// Check that `identity` holds `role`.
    pub fn authorize(
        &self,
        identity: Option<&str>,
        role: Role,
    ) -> Result<Grant, AuthzError> {
        let identity = identity
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(AuthzError::MissingIdentity)?;
        let Some(rest) = identity.strip_prefix(SPIFFE_SCHEME) else {
            return Err(AuthzError::MalformedIdentity(identity.to_string()));
        };
        let domain = rest.split('/').next().unwrap_or_default();
        if domain != self.trust_domain {
            return Err(AuthzError::ForeignTrustDomain {
                identity: identity.to_string(),
                trust_domain: self.trust_domain.clone(),
            });
        }
        if !self.identities(role).contains(identity) {
            return Err(AuthzError::MissingRole {
                identity: identity.to_string(),
                role,
            });
        }
        Ok(Grant { role, identity: identity.to_string() })
    }
}

/// Proof that a caller was authorized for one role
///
/// Operations that require a role take a `&Grant` and call
/// [`Grant::require`] before touching any state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    role: Role,
    identity: String,
}

impl Grant {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn require(&self, role: Role) -> Result<(), AuthzError> {
        if self.role == role {
            Ok(())
        } else {
            Err(AuthzError::MissingRole {
                identity: self.identity.clone(),
                role,
            })
        }
    }

    /// A grant for in-process callers and tests that bypass authentication
    pub fn local(role: Role) -> Grant {
        Grant { role, identity: format!("local:{role}") }
    }
}
