// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Authorizing HTTP callers by their verified workload identity
//!
//! TLS is terminated in front of our servers. The terminator verifies the
//! client certificate and forwards the identity it carries in a request header
//! (by default [`rootkey_api::DEFAULT_IDENTITY_HEADER`]).

use dropshot::{ClientErrorStatusCode, HttpError, RequestContext};
use rootkey::ConfigError;
use rootkey::authz::{AuthzError, Grant, Role, RolePolicy};
use rootkey_api::{DEFAULT_IDENTITY_HEADER, error_code};
use serde::{Deserialize, Serialize};

fn default_identity_header() -> String {
    DEFAULT_IDENTITY_HEADER.to_string()
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct AuthnConfig {
    /// Header carrying the verified caller identity
    #[serde(default = "default_identity_header")]
    pub identity_header: String,
    pub roles: RolePolicy,
}

impl AuthnConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.roles.validate()
    }

    /// Authorize the caller of `rqctx` for `role`.
    pub fn authorize<C: dropshot::ServerContext>(
        &self,
        rqctx: &RequestContext<C>,
        role: Role,
    ) -> Result<Grant, AuthzError> {
        let identity = rqctx
            .request
            .headers()
            .get(self.identity_header.as_str())
            .and_then(|v| v.to_str().ok());
        self.roles.authorize(identity, role)
    }
}

/// Map an authorization failure onto a 401 response
pub fn unauthorized(error: AuthzError) -> HttpError {
    HttpError::for_client_error(
        Some(error_code::UNAUTHORIZED.to_string()),
        ClientErrorStatusCode::UNAUTHORIZED,
        error.to_string(),
    )
}
