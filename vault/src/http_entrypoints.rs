// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::context::{KeySource, ServerContext};
use dropshot::{
    ErrorStatusCode, HttpError, HttpResponseOk, RequestContext, TypedBody,
    UntypedBody,
};
use rootkey::authz::Role;
use rootkey::export::export_recovery_shares;
use rootkey::liveness::{LivenessError, LivenessProof};
use rootkey::restore::{RestoreError, RestoreStatus};
use rootkey_api::*;
use rootkey_common::authn::unauthorized;
use slog::{error, info, warn};
use std::sync::Arc;

type VaultApiDescription = dropshot::ApiDescription<Arc<ServerContext>>;

pub fn api() -> VaultApiDescription {
    vault_api_mod::api_description::<VaultImpl>()
        .expect("registered entrypoints")
}

enum VaultImpl {}

fn progress(status: RestoreStatus, err: Option<String>) -> RestoreResponse {
    RestoreResponse {
        shards_collected: status.collected,
        shards_remaining: status.remaining,
        restored: status.restored,
        err,
    }
}

fn restore_failure(
    error: &RestoreError,
    status: RestoreStatus,
) -> RestoreFailure {
    let (status_code, code) = match error {
        RestoreError::Unauthorized(_) => {
            (ErrorStatusCode::UNAUTHORIZED, error_code::UNAUTHORIZED)
        }
        RestoreError::AlreadyRestored => {
            (ErrorStatusCode::BAD_REQUEST, error_code::ALREADY_RESTORED)
        }
        RestoreError::IdOutOfRange { .. }
        | RestoreError::ZeroValue
        | RestoreError::InvalidShard
        | RestoreError::DuplicateId(_) => {
            (ErrorStatusCode::BAD_REQUEST, error_code::INVALID_SHARD)
        }
        RestoreError::Reconstruct(_) => {
            (ErrorStatusCode::INTERNAL_SERVER_ERROR, error_code::INTERNAL)
        }
    };
    RestoreFailure::new(
        status_code,
        code,
        progress(status, Some(error.to_string())),
    )
}

const MEMORY_MODE: &str = "storage is in memory and has no root key";

fn not_applicable() -> HttpError {
    HttpError::for_bad_request(
        Some(error_code::NOT_APPLICABLE.to_string()),
        MEMORY_MODE.to_string(),
    )
}

fn key_unavailable() -> HttpError {
    HttpError::for_not_found(
        Some(error_code::ROOT_KEY_UNAVAILABLE.to_string()),
        "root key is not available yet".to_string(),
    )
}

async fn recover(
    rqctx: RequestContext<Arc<ServerContext>>,
) -> Result<HttpResponseOk<RecoverResponse>, HttpError> {
    let ctx = rqctx.context();
    let grant = ctx
        .authn()
        .authorize(&rqctx, Role::RecoveryExport)
        .map_err(|err| {
            warn!(ctx.log(), "unauthorized recovery export"; "error" => %err);
            unauthorized(err)
        })?;
    if !ctx.is_durable() {
        return Err(not_applicable());
    }
    let shares = ctx
        .slot()
        .with_key(|key| export_recovery_shares(&grant, key, ctx.shares()))
        .ok_or_else(key_unavailable)?
        .map_err(|err| {
            error!(ctx.log(), "recovery export failed"; "error" => %err);
            HttpError::for_internal_error(err.to_string())
        })?;
    info!(
        ctx.log(),
        "recovery shares exported";
        "caller" => grant.identity(),
        "shares" => shares.len(),
    );
    let shards = shares
        .iter()
        .map(|share| RecoveryShard {
            id: share.id().get(),
            value: Base64Bytes::from(share.value().as_slice()),
        })
        .collect();
    Ok(HttpResponseOk(RecoverResponse { shards, err: None }))
}

impl VaultApi for VaultImpl {
    type Context = Arc<ServerContext>;

    async fn restore_submit(
        rqctx: RequestContext<Self::Context>,
        body: UntypedBody,
    ) -> Result<HttpResponseOk<RestoreResponse>, RestoreFailure> {
        let ctx = rqctx.context();
        let collector = ctx.collector();
        let grant =
            ctx.authn().authorize(&rqctx, Role::Restore).map_err(|err| {
                warn!(ctx.log(), "unauthorized restore"; "error" => %err);
                restore_failure(&RestoreError::from(err), collector.status())
            })?;
        if !ctx.is_durable() {
            return Err(RestoreFailure::new(
                ErrorStatusCode::BAD_REQUEST,
                error_code::NOT_APPLICABLE,
                progress(collector.status(), Some(MEMORY_MODE.to_string())),
            ));
        }
        let request: RestoreRequest = serde_json::from_slice(body.as_bytes())
            .map_err(|err| {
                warn!(ctx.log(), "malformed restore request"; "error" => %err);
                RestoreFailure::new(
                    ErrorStatusCode::BAD_REQUEST,
                    error_code::INVALID_SHARD,
                    progress(
                        collector.status(),
                        Some("malformed restore request".to_string()),
                    ),
                )
            })?;

        let accepted = collector
            .submit(&grant, request.id, request.shard.as_bytes())
            .map_err(|rejection| {
                warn!(
                    ctx.log(),
                    "restore share rejected";
                    "id" => request.id,
                    "error" => %rejection.error,
                );
                restore_failure(&rejection.error, rejection.status)
            })?;
        info!(
            ctx.log(),
            "restore share accepted";
            "id" => request.id,
            "collected" => accepted.status.collected,
            "remaining" => accepted.status.remaining,
        );

        if let Some(key) = accepted.key {
            ctx.install(key, KeySource::Restore).map_err(|err| {
                error!(
                    ctx.log(),
                    "restored key not installed";
                    "error" => %err,
                );
                RestoreFailure::new(
                    ErrorStatusCode::INTERNAL_SERVER_ERROR,
                    error_code::INTERNAL,
                    progress(
                        collector.status(),
                        Some("restored root key was not installed".into()),
                    ),
                )
            })?;
        }
        Ok(HttpResponseOk(progress(accepted.status, None)))
    }

    async fn restore_status(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<HttpResponseOk<RestoreResponse>, HttpError> {
        let ctx = rqctx.context();
        if let Err(err) = ctx.authn().authorize(&rqctx, Role::Restore) {
            warn!(ctx.log(), "unauthorized restore status"; "error" => %err);
            return Err(unauthorized(err));
        }
        if !ctx.is_durable() {
            return Err(not_applicable());
        }
        Ok(HttpResponseOk(progress(ctx.collector().status(), None)))
    }

    async fn recover_get(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<HttpResponseOk<RecoverResponse>, HttpError> {
        recover(rqctx).await
    }

    async fn recover_post(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<HttpResponseOk<RecoverResponse>, HttpError> {
        recover(rqctx).await
    }

    async fn verify(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<VerifyRequest>,
    ) -> Result<HttpResponseOk<VerifyResponse>, HttpError> {
        let ctx = rqctx.context();
        if let Err(err) =
            ctx.authn().authorize(&rqctx, Role::BootstrapDistributor)
        {
            warn!(ctx.log(), "unauthorized liveness check"; "error" => %err);
            return Err(unauthorized(err));
        }
        if !ctx.is_durable() {
            return Err(not_applicable());
        }
        let request = body.into_inner();
        let proof = LivenessProof {
            plaintext: request.plaintext.as_bytes().to_vec(),
            nonce: request.nonce.as_bytes().to_vec(),
            ciphertext: request.ciphertext.as_bytes().to_vec(),
        };
        let verified = ctx
            .slot()
            .with_key(|key| proof.check(key))
            .ok_or_else(key_unavailable)?
            .map_err(|err| match err {
                LivenessError::BadNonce(_) => {
                    HttpError::for_bad_request(None, err.to_string())
                }
                LivenessError::Rng | LivenessError::Encrypt => {
                    HttpError::for_internal_error(err.to_string())
                }
            })?;
        if verified {
            info!(ctx.log(), "liveness proof verified");
        } else {
            warn!(ctx.log(), "liveness proof does not match our root key");
        }
        Ok(HttpResponseOk(VerifyResponse { verified }))
    }
}
