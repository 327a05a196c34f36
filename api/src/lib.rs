// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP interfaces of the share holders ("keepers") and the storage service
//! ("vault"), and the JSON types they exchange with the bootstrap process and
//! with operators.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use dropshot::{
    ErrorStatusCode, HttpError, HttpResponseError, HttpResponseOk,
    HttpResponseUpdatedNoContent, RequestContext, TypedBody, UntypedBody,
};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Request header carrying the caller's verified workload identity, unless
/// configured otherwise.
pub const DEFAULT_IDENTITY_HEADER: &str = "x-workload-identity";

/// Error codes carried in error responses
pub mod error_code {
    pub const UNAUTHORIZED: &str = "Unauthorized";
    pub const INVALID_SHARD: &str = "InvalidShard";
    pub const ALREADY_RESTORED: &str = "AlreadyRestored";
    pub const ROOT_KEY_UNAVAILABLE: &str = "RootKeyUnavailable";
    pub const SHARD_CONFLICT: &str = "ShardConflict";
    pub const INTERNAL: &str = "Internal";
    pub const NOT_APPLICABLE: &str = "NotApplicable";
}

/// API served by each share holder
#[dropshot::api_description]
pub trait KeeperApi {
    type Context;

    /// Store this holder's share.
    ///
    /// Delivering the same share again is a no-op. Delivering a different
    /// share once one is held fails with a conflict.
    #[endpoint {
        method = POST,
        path = "/contribute",
    }]
    async fn contribute(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<ContributeRequest>,
    ) -> Result<HttpResponseUpdatedNoContent, HttpError>;

    /// Return the held share to the storage service.
    #[endpoint {
        method = GET,
        path = "/shard",
    }]
    async fn shard(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<HttpResponseOk<ShardResponse>, HttpError>;
}

/// API served by the storage service
#[dropshot::api_description]
pub trait VaultApi {
    type Context;

    /// Submit one share during disaster recovery.
    ///
    /// The body is a [`RestoreRequest`]. It is parsed by the handler after
    /// the caller's role is checked, so that a malformed body still gets a
    /// 401 for the wrong caller and restore progress for the right one.
    #[endpoint {
        method = POST,
        path = "/restore",
    }]
    async fn restore_submit(
        rqctx: RequestContext<Self::Context>,
        body: UntypedBody,
    ) -> Result<HttpResponseOk<RestoreResponse>, RestoreFailure>;

    /// Report restore progress without changing it.
    #[endpoint {
        method = GET,
        path = "/restore",
    }]
    async fn restore_status(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<HttpResponseOk<RestoreResponse>, HttpError>;

    /// Export a threshold of recovery shares.
    #[endpoint {
        method = GET,
        path = "/recover",
    }]
    async fn recover_get(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<HttpResponseOk<RecoverResponse>, HttpError>;

    /// Export a threshold of recovery shares.
    #[endpoint {
        method = POST,
        path = "/recover",
    }]
    async fn recover_post(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<HttpResponseOk<RecoverResponse>, HttpError>;

    /// Check a liveness proof against the storage service's root key.
    #[endpoint {
        method = POST,
        path = "/verify",
    }]
    async fn verify(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<VerifyRequest>,
    ) -> Result<HttpResponseOk<VerifyResponse>, HttpError>;
}

/// Secret bytes, base64 encoded on the wire
///
/// The buffer is wiped on drop and never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Base64Bytes(Vec<u8>);

impl Base64Bytes {
    pub fn new(bytes: Vec<u8>) -> Base64Bytes {
        Base64Bytes(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&[u8]> for Base64Bytes {
    fn from(bytes: &[u8]) -> Self {
        Base64Bytes(bytes.to_vec())
    }
}

impl fmt::Debug for Base64Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Base64Bytes({} bytes)", self.0.len())
    }
}

impl Serialize for Base64Bytes {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let encoded = Zeroizing::new(STANDARD.encode(&self.0));
        serializer.serialize_str(&encoded)
    }
}

impl<'de> Deserialize<'de> for Base64Bytes {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        let encoded = Zeroizing::new(String::deserialize(deserializer)?);
        STANDARD
            .decode(encoded.as_bytes())
            .map(Base64Bytes)
            .map_err(|e| {
                serde::de::Error::custom(format!("invalid base64: {e}"))
            })
    }
}

impl JsonSchema for Base64Bytes {
    fn schema_name() -> String {
        "Base64Bytes".to_string()
    }

    fn json_schema(
        _gen: &mut schemars::r#gen::SchemaGenerator,
    ) -> schemars::schema::Schema {
        schemars::schema::Schema::Object(schemars::schema::SchemaObject {
            instance_type: Some(schemars::schema::SingleOrVec::Single(
                Box::new(schemars::schema::InstanceType::String),
            )),
            format: Some("byte".to_string()),
            ..Default::default()
        })
    }
}

/// Body of `POST /contribute`
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ContributeRequest {
    pub shard: Base64Bytes,
}

/// Body of `GET /shard`
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ShardResponse {
    pub shard: Base64Bytes,
}

/// Body of `POST /restore`
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct RestoreRequest {
    pub id: u8,
    pub shard: Base64Bytes,
}

/// Restore progress, returned by every `/restore` call
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RestoreResponse {
    pub shards_collected: usize,
    pub shards_remaining: usize,
    pub restored: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

/// A rejected `POST /restore`
///
/// The body is a [`RestoreResponse`] with `err` set, plus an error code, so
/// that callers see restore progress on failures too.
#[derive(Debug, Serialize, JsonSchema)]
pub struct RestoreFailure {
    #[serde(flatten)]
    pub progress: RestoreResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip)]
    pub status_code: ErrorStatusCode,
}

impl RestoreFailure {
    pub fn new(
        status_code: ErrorStatusCode,
        error_code: &str,
        progress: RestoreResponse,
    ) -> RestoreFailure {
        RestoreFailure {
            progress,
            error_code: Some(error_code.to_string()),
            status_code,
        }
    }
}

// Only dropshot's own failures (e.g. an oversized body) land here. They
// happen before the handler runs, so the progress fields are zero and `err`
// says what went wrong.
impl From<HttpError> for RestoreFailure {
    fn from(error: HttpError) -> Self {
        RestoreFailure {
            progress: RestoreResponse {
                shards_collected: 0,
                shards_remaining: 0,
                restored: false,
                err: Some(error.external_message),
            },
            error_code: error.error_code,
            status_code: error.status_code,
        }
    }
}

impl fmt::Display for RestoreFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.progress.err {
            Some(err) => f.write_str(err),
            None => f.write_str("restore failed"),
        }
    }
}

impl HttpResponseError for RestoreFailure {
    fn status_code(&self) -> ErrorStatusCode {
        self.status_code
    }
}

/// One exported share
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct RecoveryShard {
    pub id: u8,
    pub value: Base64Bytes,
}

/// Body of `GET|POST /recover`
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct RecoverResponse {
    pub shards: Vec<RecoveryShard>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

/// Body of `POST /verify`
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct VerifyRequest {
    pub plaintext: Base64Bytes,
    pub nonce: Base64Bytes,
    pub ciphertext: Base64Bytes,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, JsonSchema)]
pub struct VerifyResponse {
    pub verified: bool,
}
