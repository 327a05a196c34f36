// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bootstrap against real keepers over HTTP

use dropshot::ConfigDropshot;
use rootkey::authz::Role;
use rootkey::shamir::combine;
use rootkey::{
    GenerateError, HolderConfig, RootKeySlot, Share, ShareConfig, ShareId,
    SlotError, StorageMode,
};
use rootkey_api::{DEFAULT_IDENTITY_HEADER, ShardResponse};
use rootkey_bootstrap::{BootstrapError, BootstrapOutcome, Config, run};
use rootkey_common::transport::ClientConfig;
use rootkey_test_utils::dev::{identity, test_authn_config, test_setup_log};
use slog::Logger;
use tokio::sync::watch;

fn log_config() -> dropshot::ConfigLogging {
    dropshot::ConfigLogging::StderrTerminal {
        level: dropshot::ConfigLoggingLevel::Info,
    }
}

fn start_keepers(count: u8, log: &Logger) -> Vec<rootkey_keeper::Server> {
    (1..=count)
        .map(|id| {
            let config = rootkey_keeper::Config {
                id,
                dropshot: ConfigDropshot::default(),
                log: log_config(),
                authn: test_authn_config(),
            };
            rootkey_keeper::start_server(config, log).unwrap()
        })
        .collect()
}

fn bootstrap_config(
    keepers: &[rootkey_keeper::Server],
    threshold: u8,
    caller: Role,
) -> Config {
    let count = u8::try_from(keepers.len()).unwrap();
    Config {
        storage_mode: StorageMode::Durable,
        shares: ShareConfig::new(count, threshold).unwrap(),
        holders: keepers
            .iter()
            .zip(1..)
            .map(|(server, id)| HolderConfig {
                id,
                url: format!("http://{}", server.local_addr()),
            })
            .collect(),
        liveness: None,
        client: ClientConfig {
            asserted_identity: Some(identity(caller)),
            ..ClientConfig::default()
        },
        log: log_config(),
    }
}

async fn read_share(
    client: &reqwest::Client,
    server: &rootkey_keeper::Server,
    id: u8,
) -> Share {
    let body: ShardResponse = client
        .get(format!("http://{}/shard", server.local_addr()))
        .header(DEFAULT_IDENTITY_HEADER, identity(Role::Storage))
        .send()
        .await
        .unwrap()
        .error_for_status()
        .unwrap()
        .json()
        .await
        .unwrap();
    let value = body.shard.as_bytes().try_into().unwrap();
    Share::new(ShareId::new(id).unwrap(), value)
}

#[tokio::test]
async fn shares_reach_every_keeper() {
    let logctx = test_setup_log("shares_reach_every_keeper");
    let keepers = start_keepers(5, &logctx.log);
    let config = bootstrap_config(&keepers, 3, Role::BootstrapDistributor);
    let (_tx, rx) = watch::channel(false);

    let slot = RootKeySlot::new();
    let outcome = run(&config, &slot, &logctx.log, rx).await.unwrap();
    assert_eq!(outcome, BootstrapOutcome::Completed);

    let client = reqwest::Client::new();
    let mut shares = Vec::new();
    for (server, id) in keepers.iter().zip(1..) {
        shares.push(read_share(&client, server, id).await);
    }

    // Any threshold of them recombines to the same key
    let first = combine(&shares[..3]).unwrap();
    let last = combine(&shares[2..]).unwrap();
    let spread = combine(&[
        shares[0].clone(),
        shares[2].clone(),
        shares[4].clone(),
    ])
    .unwrap();
    assert_eq!(first, last);
    assert_eq!(first, spread);

    for server in keepers {
        server.close().await.unwrap();
    }
    logctx.cleanup_successful();
}

#[tokio::test]
async fn keepers_refuse_unauthorized_distributor() {
    let logctx = test_setup_log("keepers_refuse_unauthorized_distributor");
    let keepers = start_keepers(3, &logctx.log);
    // Keepers answer 401, which is retried, so cancel after a few attempts
    let config = bootstrap_config(&keepers, 2, Role::Restore);
    let (tx, rx) = watch::channel(false);

    let canceler = async {
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        tx.send(true).unwrap();
    };
    let slot = RootKeySlot::new();
    let (result, ()) =
        tokio::join!(run(&config, &slot, &logctx.log, rx), canceler);
    assert_eq!(result.unwrap(), BootstrapOutcome::Canceled);

    let client = reqwest::Client::new();
    for server in &keepers {
        let resp = client
            .get(format!("http://{}/shard", server.local_addr()))
            .header(DEFAULT_IDENTITY_HEADER, identity(Role::Storage))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    }

    for server in keepers {
        server.close().await.unwrap();
    }
    logctx.cleanup_successful();
}

#[tokio::test]
async fn second_bootstrap_is_refused() {
    let logctx = test_setup_log("second_bootstrap_is_refused");
    let keepers = start_keepers(3, &logctx.log);
    let config = bootstrap_config(&keepers, 2, Role::BootstrapDistributor);
    let slot = RootKeySlot::new();

    let (_tx, rx) = watch::channel(false);
    run(&config, &slot, &logctx.log, rx.clone()).await.unwrap();
    let client = reqwest::Client::new();
    let mut before = Vec::new();
    for (server, id) in keepers.iter().zip(1..) {
        before.push(read_share(&client, server, id).await);
    }

    // The process already generated its key, so nothing new goes out
    let err = run(&config, &slot, &logctx.log, rx).await.unwrap_err();
    assert!(matches!(
        err,
        BootstrapError::Generate(GenerateError::Slot(
            SlotError::AlreadyGenerated
        ))
    ));
    for ((server, id), share) in keepers.iter().zip(1..).zip(&before) {
        assert_eq!(read_share(&client, server, id).await, *share);
    }

    for server in keepers {
        server.close().await.unwrap();
    }
    logctx.cleanup_successful();
}
