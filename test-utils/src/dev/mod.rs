// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Facilities for setting up root key servers in tests

use dropshot::test_util::LogContext;
use dropshot::{ConfigLogging, ConfigLoggingIfExists, ConfigLoggingLevel};
use rootkey::authz::{Role, RolePolicy};
use rootkey_api::DEFAULT_IDENTITY_HEADER;
use rootkey_common::authn::AuthnConfig;
use std::collections::BTreeSet;

pub const TRUST_DOMAIN: &str = "rootkey.test";

/// Set up a [`dropshot::test_util::LogContext`] appropriate for a test named
/// `test_name`
pub fn test_setup_log(test_name: &str) -> LogContext {
    let log_config = ConfigLogging::File {
        level: ConfigLoggingLevel::Trace,
        path: String::from("UNUSED").into(),
        if_exists: ConfigLoggingIfExists::Fail,
    };

    LogContext::new(test_name, &log_config)
}

/// The single identity that [`test_authn_config`] grants `role`
pub fn identity(role: Role) -> String {
    format!("spiffe://{TRUST_DOMAIN}/test/{role}")
}

/// Authorization config granting each role to [`identity`] of that role
pub fn test_authn_config() -> AuthnConfig {
    let one = |role: Role| -> BTreeSet<String> { [identity(role)].into() };
    AuthnConfig {
        identity_header: DEFAULT_IDENTITY_HEADER.to_string(),
        roles: RolePolicy {
            trust_domain: TRUST_DOMAIN.to_string(),
            bootstrap_distributor: one(Role::BootstrapDistributor),
            recovery_export: one(Role::RecoveryExport),
            restore: one(Role::Restore),
            storage: one(Role::Storage),
        },
    }
}
