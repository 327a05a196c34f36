// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use dropshot::ConfigDropshot;
use dropshot::test_util::LogContext;
use rand::rngs::OsRng;
use rootkey::authz::Role;
use rootkey::liveness::LivenessProof;
use rootkey::shamir::combine;
use rootkey::{
    HolderConfig, RootKey, Share, ShareConfig, ShareId, StorageMode,
    derive_shares,
};
use rootkey_api::{
    Base64Bytes, DEFAULT_IDENTITY_HEADER, RecoverResponse, RestoreResponse,
    VerifyRequest, VerifyResponse,
};
use rootkey_common::transport::ClientConfig;
use rootkey_test_utils::dev::{identity, test_authn_config, test_setup_log};
use rootkey_vault::{Config, Server, start_server};
use serde_json::json;

fn log_config() -> dropshot::ConfigLogging {
    dropshot::ConfigLogging::StderrTerminal {
        level: dropshot::ConfigLoggingLevel::Info,
    }
}

fn vault_config(
    storage_mode: StorageMode,
    shares: ShareConfig,
    holders: Vec<HolderConfig>,
) -> Config {
    Config {
        storage_mode,
        shares,
        holders,
        client: ClientConfig {
            asserted_identity: Some(identity(Role::Storage)),
            ..ClientConfig::default()
        },
        dropshot: ConfigDropshot::default(),
        log: log_config(),
        authn: test_authn_config(),
    }
}

struct TestContext {
    logctx: LogContext,
    server: Server,
    client: reqwest::Client,
    base: String,
}

impl TestContext {
    fn new(test_name: &str, config_fn: impl FnOnce() -> Config) -> Self {
        let logctx = test_setup_log(test_name);
        let server = start_server(config_fn(), &logctx.log).unwrap();
        let base = format!("http://{}", server.local_addr());
        TestContext { logctx, server, client: reqwest::Client::new(), base }
    }

    fn restore_only(test_name: &str) -> Self {
        TestContext::new(test_name, || {
            vault_config(
                StorageMode::Durable,
                ShareConfig::new(5, 3).unwrap(),
                Vec::new(),
            )
        })
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        caller: Option<Role>,
    ) -> reqwest::RequestBuilder {
        let req = self.client.request(method, format!("{}{path}", self.base));
        match caller {
            Some(role) => req.header(DEFAULT_IDENTITY_HEADER, identity(role)),
            None => req,
        }
    }

    async fn submit(
        &self,
        caller: Option<Role>,
        id: u8,
        value: &[u8],
    ) -> (reqwest::StatusCode, serde_json::Value) {
        let resp = self
            .request(reqwest::Method::POST, "/restore", caller)
            .json(&json!({
                "id": id,
                "shard": Base64Bytes::from(value),
            }))
            .send()
            .await
            .unwrap();
        (resp.status(), resp.json().await.unwrap())
    }

    async fn verify(&self, proof: &LivenessProof) -> reqwest::Response {
        let body = VerifyRequest {
            plaintext: Base64Bytes::from(proof.plaintext.as_slice()),
            nonce: Base64Bytes::from(proof.nonce.as_slice()),
            ciphertext: Base64Bytes::from(proof.ciphertext.as_slice()),
        };
        self.request(
            reqwest::Method::POST,
            "/verify",
            Some(Role::BootstrapDistributor),
        )
        .json(&body)
        .send()
        .await
        .unwrap()
    }

    async fn teardown(self) {
        self.server.close().await.unwrap();
        self.logctx.cleanup_successful();
    }
}

fn progress(
    collected: usize,
    remaining: usize,
    restored: bool,
) -> RestoreResponse {
    RestoreResponse {
        shards_collected: collected,
        shards_remaining: remaining,
        restored,
        err: None,
    }
}

fn without_err(body: &serde_json::Value) -> RestoreResponse {
    let mut response: RestoreResponse =
        serde_json::from_value(body.clone()).unwrap();
    response.err = None;
    response
}

#[tokio::test]
async fn restore_five_three() {
    let cx = TestContext::restore_only("restore_five_three");
    let key = RootKey::from_seed(&[0x5a; 32]).unwrap();
    let config = ShareConfig::new(5, 3).unwrap();
    let shares = derive_shares(&key, &config).unwrap();
    let value = |id| *shares.get(ShareId::new(id).unwrap()).unwrap().value();

    let status: RestoreResponse = cx
        .request(reqwest::Method::GET, "/restore", Some(Role::Restore))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status, progress(0, 3, false));

    let (code, body) = cx.submit(Some(Role::Restore), 2, &value(2)).await;
    assert_eq!(code, reqwest::StatusCode::OK);
    assert_eq!(without_err(&body), progress(1, 2, false));

    // Duplicate id
    let (code, body) = cx.submit(Some(Role::Restore), 2, &value(2)).await;
    assert_eq!(code, reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "InvalidShard");
    assert_eq!(without_err(&body), progress(1, 2, false));

    // Out of range, all zero, wrong length
    let (code, _) = cx.submit(Some(Role::Restore), 6, &value(1)).await;
    assert_eq!(code, reqwest::StatusCode::BAD_REQUEST);
    let (code, _) = cx.submit(Some(Role::Restore), 4, &[0; 32]).await;
    assert_eq!(code, reqwest::StatusCode::BAD_REQUEST);
    let (code, _) = cx.submit(Some(Role::Restore), 4, &[1; 16]).await;
    assert_eq!(code, reqwest::StatusCode::BAD_REQUEST);

    // Wrong caller
    let (code, body) = cx.submit(None, 1, &value(1)).await;
    assert_eq!(code, reqwest::StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "Unauthorized");
    let (code, _) =
        cx.submit(Some(Role::RecoveryExport), 1, &value(1)).await;
    assert_eq!(code, reqwest::StatusCode::UNAUTHORIZED);

    let (_, body) = cx.submit(Some(Role::Restore), 1, &value(1)).await;
    assert_eq!(without_err(&body), progress(2, 1, false));
    let (code, body) = cx.submit(Some(Role::Restore), 5, &value(5)).await;
    assert_eq!(code, reqwest::StatusCode::OK);
    assert_eq!(without_err(&body), progress(3, 0, true));

    // Complete is terminal
    let (code, body) = cx.submit(Some(Role::Restore), 3, &value(3)).await;
    assert_eq!(code, reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "AlreadyRestored");
    assert_eq!(without_err(&body), progress(3, 0, true));

    // The restored key is the original one
    let proof = LivenessProof::seal(&key, &mut OsRng).unwrap();
    let resp: VerifyResponse = cx.verify(&proof).await.json().await.unwrap();
    assert!(resp.verified);
    let other = RootKey::from_seed(&[0x5b; 32]).unwrap();
    let proof = LivenessProof::seal(&other, &mut OsRng).unwrap();
    let resp: VerifyResponse = cx.verify(&proof).await.json().await.unwrap();
    assert!(!resp.verified);

    cx.teardown().await;
}

#[tokio::test]
async fn recover_exports_threshold_shares() {
    let cx = TestContext::restore_only("recover_exports_threshold_shares");
    let key = RootKey::from_seed(&[0x6c; 32]).unwrap();
    let config = ShareConfig::new(5, 3).unwrap();
    let shares = derive_shares(&key, &config).unwrap();

    // Nothing to export before there is a key
    let resp = cx
        .request(reqwest::Method::GET, "/recover", Some(Role::RecoveryExport))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    let proof = LivenessProof::seal(&key, &mut OsRng).unwrap();
    let resp = cx.verify(&proof).await;
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

    for share in &shares.shares()[2..] {
        let (code, _) = cx
            .submit(Some(Role::Restore), share.id().get(), share.value())
            .await;
        assert_eq!(code, reqwest::StatusCode::OK);
    }

    for method in [reqwest::Method::GET, reqwest::Method::POST] {
        let resp = cx
            .request(method.clone(), "/recover", Some(Role::RecoveryExport))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let body: RecoverResponse = resp.json().await.unwrap();
        assert!(body.err.is_none());
        assert_eq!(body.shards.len(), 3);
        for (shard, expected) in body.shards.iter().zip(shares.shares()) {
            assert_eq!(shard.id, expected.id().get());
            assert_eq!(shard.value.as_bytes(), expected.value());
        }

        let resp = cx
            .request(method, "/recover", Some(Role::Restore))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
    }

    cx.teardown().await;
}

#[tokio::test]
async fn memory_mode_has_nothing_to_recover() {
    let cx = TestContext::new("memory_mode_has_nothing_to_recover", || {
        vault_config(
            StorageMode::Memory,
            ShareConfig::new(3, 2).unwrap(),
            Vec::new(),
        )
    });

    for method in [reqwest::Method::GET, reqwest::Method::POST] {
        let resp = cx
            .request(method.clone(), "/recover", Some(Role::RecoveryExport))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error_code"], "NotApplicable");

        // The role is still checked first
        let resp = cx
            .request(method, "/recover", Some(Role::Restore))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
    }

    let (code, body) = cx.submit(Some(Role::Restore), 1, &[9; 32]).await;
    assert_eq!(code, reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "NotApplicable");
    assert_eq!(without_err(&body), progress(0, 2, false));

    let resp = cx
        .request(reqwest::Method::GET, "/restore", Some(Role::Restore))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    let key = RootKey::from_seed(&[0x7d; 32]).unwrap();
    let proof = LivenessProof::seal(&key, &mut OsRng).unwrap();
    let resp = cx.verify(&proof).await;
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    cx.teardown().await;
}

#[tokio::test]
async fn malformed_restore_reports_progress() {
    let cx = TestContext::restore_only("malformed_restore_reports_progress");
    let key = RootKey::from_seed(&[0x8e; 32]).unwrap();
    let shares = derive_shares(&key, &ShareConfig::new(5, 3).unwrap()).unwrap();
    let first = &shares.shares()[0];
    let (code, _) = cx
        .submit(Some(Role::Restore), first.id().get(), first.value())
        .await;
    assert_eq!(code, reqwest::StatusCode::OK);

    let bodies = [
        json!({ "id": 300, "shard": Base64Bytes::from(&[7u8; 32][..]) }),
        json!({ "id": 2, "shard": "not base64!" }),
        json!({ "shard": Base64Bytes::from(&[7u8; 32][..]) }),
    ];
    for body in &bodies {
        // A caller without the role learns nothing about the body
        let resp = cx
            .request(reqwest::Method::POST, "/restore", None)
            .json(body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);

        let resp = cx
            .request(reqwest::Method::POST, "/restore", Some(Role::Restore))
            .json(body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error_code"], "InvalidShard");
        assert_eq!(without_err(&body), progress(1, 2, false));
    }

    cx.teardown().await;
}

/// Keepers, then the vault reading from them, then bootstrap delivering
/// shares and proving the vault recombined the same key.
#[tokio::test]
async fn bootstrap_then_quorum_read() {
    let logctx = test_setup_log("bootstrap_then_quorum_read");
    let keepers: Vec<rootkey_keeper::Server> = (1..=3)
        .map(|id| {
            let config = rootkey_keeper::Config {
                id,
                dropshot: ConfigDropshot::default(),
                log: log_config(),
                authn: test_authn_config(),
            };
            rootkey_keeper::start_server(config, &logctx.log).unwrap()
        })
        .collect();
    let holders: Vec<HolderConfig> = keepers
        .iter()
        .zip(1..)
        .map(|(server, id)| HolderConfig {
            id,
            url: format!("http://{}", server.local_addr()),
        })
        .collect();
    let shares = ShareConfig::new(3, 2).unwrap();

    let vault = start_server(
        vault_config(StorageMode::Durable, shares, holders.clone()),
        &logctx.log,
    )
    .unwrap();

    let bootstrap = rootkey_bootstrap::Config {
        storage_mode: StorageMode::Durable,
        shares,
        holders,
        liveness: Some(rootkey_bootstrap::LivenessConfig {
            url: format!("http://{}", vault.local_addr()),
            timeout_secs: 60,
        }),
        client: ClientConfig {
            asserted_identity: Some(identity(Role::BootstrapDistributor)),
            ..ClientConfig::default()
        },
        log: log_config(),
    };
    let (_tx, rx) = tokio::sync::watch::channel(false);
    let slot = rootkey::RootKeySlot::new();
    let outcome = rootkey_bootstrap::run(&bootstrap, &slot, &logctx.log, rx)
        .await
        .unwrap();
    assert_eq!(outcome, rootkey_bootstrap::BootstrapOutcome::Completed);

    // The vault now holds the key, and its export recombines to it
    let client = reqwest::Client::new();
    let body: RecoverResponse = client
        .get(format!("http://{}/recover", vault.local_addr()))
        .header(DEFAULT_IDENTITY_HEADER, identity(Role::RecoveryExport))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let exported: Vec<Share> = body
        .shards
        .iter()
        .map(|s| {
            Share::new(
                ShareId::new(s.id).unwrap(),
                s.value.as_bytes().try_into().unwrap(),
            )
        })
        .collect();
    let key = combine(&exported).unwrap();
    let proof = LivenessProof::seal(&key, &mut OsRng).unwrap();
    let resp: VerifyResponse = client
        .post(format!("http://{}/verify", vault.local_addr()))
        .header(DEFAULT_IDENTITY_HEADER, identity(Role::BootstrapDistributor))
        .json(&VerifyRequest {
            plaintext: Base64Bytes::from(proof.plaintext.as_slice()),
            nonce: Base64Bytes::from(proof.nonce.as_slice()),
            ciphertext: Base64Bytes::from(proof.ciphertext.as_slice()),
        })
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(resp.verified);

    // Restore is closed once the holders supplied the key
    let resp = client
        .post(format!("http://{}/restore", vault.local_addr()))
        .header(DEFAULT_IDENTITY_HEADER, identity(Role::Restore))
        .json(&json!({
            "id": 1,
            "shard": Base64Bytes::from(exported[0].value().as_slice()),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error_code"], "AlreadyRestored");

    vault.close().await.unwrap();
    for server in keepers {
        server.close().await.unwrap();
    }
    logctx.cleanup_successful();
}
