// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::context::{ServerContext, StoreError};
use dropshot::{
    ClientErrorStatusCode, HttpError, HttpResponseOk,
    HttpResponseUpdatedNoContent, RequestContext, TypedBody,
};
use rootkey::authz::Role;
use rootkey_api::*;
use rootkey_common::authn::unauthorized;
use slog::warn;
use std::sync::Arc;

type KeeperApiDescription = dropshot::ApiDescription<Arc<ServerContext>>;

pub fn api() -> KeeperApiDescription {
    keeper_api_mod::api_description::<KeeperImpl>()
        .expect("registered entrypoints")
}

enum KeeperImpl {}

impl KeeperApi for KeeperImpl {
    type Context = Arc<ServerContext>;

    async fn contribute(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<ContributeRequest>,
    ) -> Result<HttpResponseUpdatedNoContent, HttpError> {
        let ctx = rqctx.context();
        if let Err(err) =
            ctx.authn().authorize(&rqctx, Role::BootstrapDistributor)
        {
            warn!(ctx.log(), "unauthorized contribute"; "error" => %err);
            return Err(unauthorized(err));
        }
        let request = body.into_inner();
        ctx.store(request.shard.as_bytes()).map_err(|err| match err {
            StoreError::Conflict => HttpError::for_client_error(
                Some(error_code::SHARD_CONFLICT.to_string()),
                ClientErrorStatusCode::CONFLICT,
                err.to_string(),
            ),
            StoreError::BadLength(_) | StoreError::Zero => {
                HttpError::for_bad_request(
                    Some(error_code::INVALID_SHARD.to_string()),
                    err.to_string(),
                )
            }
        })?;
        Ok(HttpResponseUpdatedNoContent())
    }

    async fn shard(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<HttpResponseOk<ShardResponse>, HttpError> {
        let ctx = rqctx.context();
        if let Err(err) = ctx.authn().authorize(&rqctx, Role::Storage) {
            warn!(ctx.log(), "unauthorized shard read"; "error" => %err);
            return Err(unauthorized(err));
        }
        match ctx.share() {
            Some(share) => Ok(HttpResponseOk(ShardResponse {
                shard: Base64Bytes::from(share.as_slice()),
            })),
            None => Err(HttpError::for_not_found(
                None,
                "no share has been delivered".to_string(),
            )),
        }
    }
}
