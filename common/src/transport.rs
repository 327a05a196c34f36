// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP client shared by the bootstrap process and the storage service

use camino::{Utf8Path, Utf8PathBuf};
use rootkey_api::DEFAULT_IDENTITY_HEADER;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use reqwest::StatusCode;

fn default_identity_header() -> String {
    DEFAULT_IDENTITY_HEADER.to_string()
}

fn default_request_timeout_secs() -> u64 {
    15
}

/// Outbound client settings
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct ClientConfig {
    /// PEM file holding our client certificate and its private key
    #[serde(default)]
    pub identity_pem: Option<Utf8PathBuf>,
    /// PEM file holding the CA certificate that signs server certificates
    #[serde(default)]
    pub ca_pem: Option<Utf8PathBuf>,
    /// Workload identity to assert in `identity_header` on every request.
    ///
    /// Only for peers reached through a terminator that forwards the header
    /// unmodified, such as a local sidecar. Otherwise the identity comes from
    /// the client certificate.
    #[serde(default)]
    pub asserted_identity: Option<String>,
    #[serde(default = "default_identity_header")]
    pub identity_header: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            identity_pem: None,
            ca_pem: None,
            asserted_identity: None,
            identity_header: default_identity_header(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("error reading \"{path}\"")]
    ReadPem {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("invalid PEM in \"{path}\"")]
    ParsePem {
        path: Utf8PathBuf,
        #[source]
        err: reqwest::Error,
    },
    #[error("failed to build HTTP client")]
    Build(#[source] reqwest::Error),
}

/// A failed request to a peer
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed")]
    Request(#[from] reqwest::Error),
    #[error("peer answered {status}: {message}")]
    Status { status: StatusCode, message: String },
}

impl TransportError {
    /// Whether retrying the same request cannot help.
    ///
    /// A 400 or 409 means the peer understood us and refused; everything else
    /// (connection errors, timeouts, 401s while policy rolls out, 5xx) may
    /// clear up on its own.
    pub fn is_permanent(&self) -> bool {
        match self {
            TransportError::Request(_) => false,
            TransportError::Status { status, .. } => {
                *status == StatusCode::BAD_REQUEST
                    || *status == StatusCode::CONFLICT
            }
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            TransportError::Request(e) => e.status(),
            TransportError::Status { status, .. } => Some(*status),
        }
    }
}

fn read_pem(path: &Utf8Path) -> Result<Vec<u8>, ClientError> {
    std::fs::read(path)
        .map_err(|err| ClientError::ReadPem { path: path.to_owned(), err })
}

#[derive(Clone, Debug)]
pub struct HttpClient {
    client: reqwest::Client,
    identity_header: String,
    asserted_identity: Option<String>,
}

impl HttpClient {
    pub fn new(config: &ClientConfig) -> Result<HttpClient, ClientError> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(config.request_timeout_secs));
        if let Some(path) = &config.ca_pem {
            let cert = reqwest::Certificate::from_pem(&read_pem(path)?)
                .map_err(|err| ClientError::ParsePem {
                    path: path.clone(),
                    err,
                })?;
            builder = builder.add_root_certificate(cert);
        }
        if let Some(path) = &config.identity_pem {
            let identity = reqwest::Identity::from_pem(&read_pem(path)?)
                .map_err(|err| ClientError::ParsePem {
                    path: path.clone(),
                    err,
                })?;
            builder = builder.identity(identity);
        }
        Ok(HttpClient {
            client: builder.build().map_err(ClientError::Build)?,
            identity_header: config.identity_header.clone(),
            asserted_identity: config.asserted_identity.clone(),
        })
    }

    fn with_identity(
        &self,
        req: reqwest::RequestBuilder,
    ) -> reqwest::RequestBuilder {
        match &self.asserted_identity {
            Some(identity) => {
                req.header(self.identity_header.as_str(), identity.as_str())
            }
            None => req,
        }
    }

    pub fn get(&self, base: &str, path: &str) -> reqwest::RequestBuilder {
        self.with_identity(self.client.get(join_url(base, path)))
    }

    pub fn post(&self, base: &str, path: &str) -> reqwest::RequestBuilder {
        self.with_identity(self.client.post(join_url(base, path)))
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Send `req`, turning non-2xx answers into [`TransportError::Status`].
pub async fn send(
    req: reqwest::RequestBuilder,
) -> Result<reqwest::Response, TransportError> {
    let resp = req.send().await?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(TransportError::Status { status, message })
}
