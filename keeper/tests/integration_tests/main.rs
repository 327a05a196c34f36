// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use dropshot::ConfigDropshot;
use dropshot::test_util::LogContext;
use rootkey::authz::Role;
use rootkey_api::{DEFAULT_IDENTITY_HEADER, ShardResponse};
use rootkey_keeper::{Config, Server, start_server};
use rootkey_test_utils::dev::{identity, test_authn_config, test_setup_log};
use serde_json::json;

struct TestContext {
    logctx: LogContext,
    server: Server,
    client: reqwest::Client,
    base: String,
}

impl TestContext {
    fn new(test_name: &str) -> TestContext {
        let logctx = test_setup_log(test_name);
        let config = Config {
            id: 1,
            dropshot: ConfigDropshot::default(),
            log: dropshot::ConfigLogging::StderrTerminal {
                level: dropshot::ConfigLoggingLevel::Info,
            },
            authn: test_authn_config(),
        };
        let server = start_server(config, &logctx.log).unwrap();
        let base = format!("http://{}", server.local_addr());
        TestContext { logctx, server, client: reqwest::Client::new(), base }
    }

    async fn contribute(
        &self,
        caller: Option<Role>,
        shard: &str,
    ) -> reqwest::StatusCode {
        let mut req = self
            .client
            .post(format!("{}/contribute", self.base))
            .json(&json!({ "shard": shard }));
        if let Some(role) = caller {
            req = req.header(DEFAULT_IDENTITY_HEADER, identity(role));
        }
        req.send().await.unwrap().status()
    }

    async fn get_shard(&self, caller: Role) -> reqwest::Response {
        self.client
            .get(format!("{}/shard", self.base))
            .header(DEFAULT_IDENTITY_HEADER, identity(caller))
            .send()
            .await
            .unwrap()
    }

    async fn teardown(self) {
        self.server.close().await.unwrap();
        self.logctx.cleanup_successful();
    }
}

// 32 bytes of 0x07, and of 0x08
const SHARD_A: &str = "BwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwc=";
const SHARD_B: &str = "CAgICAgICAgICAgICAgICAgICAgICAgICAgICAgICAg=";

#[tokio::test]
async fn contribute_then_read_back() {
    let cx = TestContext::new("contribute_then_read_back");

    let resp = cx.get_shard(Role::Storage).await;
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

    let status = cx.contribute(Some(Role::BootstrapDistributor), SHARD_A).await;
    assert_eq!(status, reqwest::StatusCode::NO_CONTENT);

    let resp = cx.get_shard(Role::Storage).await;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: ShardResponse = resp.json().await.unwrap();
    assert_eq!(body.shard.as_bytes(), &[7u8; 32]);

    cx.teardown().await;
}

#[tokio::test]
async fn contribute_is_idempotent() {
    let cx = TestContext::new("contribute_is_idempotent");
    let caller = Some(Role::BootstrapDistributor);

    for _ in 0..3 {
        let status = cx.contribute(caller, SHARD_A).await;
        assert_eq!(status, reqwest::StatusCode::NO_CONTENT);
    }
    let status = cx.contribute(caller, SHARD_B).await;
    assert_eq!(status, reqwest::StatusCode::CONFLICT);

    // The original share is kept
    let body: ShardResponse =
        cx.get_shard(Role::Storage).await.json().await.unwrap();
    assert_eq!(body.shard.as_bytes(), &[7u8; 32]);

    cx.teardown().await;
}

#[tokio::test]
async fn contribute_rejects_bad_shards() {
    let cx = TestContext::new("contribute_rejects_bad_shards");
    let caller = Some(Role::BootstrapDistributor);

    // Too short
    let status = cx.contribute(caller, "AQID").await;
    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
    // All zero
    let zero = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";
    let status = cx.contribute(caller, zero).await;
    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
    // Not base64
    let status = cx.contribute(caller, "???").await;
    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);

    cx.teardown().await;
}

#[tokio::test]
async fn callers_need_the_right_role() {
    let cx = TestContext::new("callers_need_the_right_role");

    let status = cx.contribute(None, SHARD_A).await;
    assert_eq!(status, reqwest::StatusCode::UNAUTHORIZED);
    let status = cx.contribute(Some(Role::Storage), SHARD_A).await;
    assert_eq!(status, reqwest::StatusCode::UNAUTHORIZED);

    cx.contribute(Some(Role::BootstrapDistributor), SHARD_A).await;
    let resp = cx.get_shard(Role::BootstrapDistributor).await;
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
    let resp = cx.get_shard(Role::Restore).await;
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);

    // Right path, wrong trust domain
    let resp = cx
        .client
        .get(format!("{}/shard", cx.base))
        .header(DEFAULT_IDENTITY_HEADER, "spiffe://other.test/test/storage")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);

    cx.teardown().await;
}
