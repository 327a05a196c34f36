// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! How the bootstrap process talks to holders and the storage service

use async_trait::async_trait;
use rootkey::liveness::LivenessProof;
use rootkey::{HolderConfig, Share};
use rootkey_api::{
    Base64Bytes, ContributeRequest, VerifyRequest, VerifyResponse,
};
use rootkey_common::transport::{
    ClientConfig, ClientError, HttpClient, TransportError, send,
};

/// Delivery of a share to its holder
#[async_trait]
pub trait HolderTransport: Send + Sync {
    async fn contribute(
        &self,
        holder: &HolderConfig,
        share: &Share,
    ) -> Result<(), TransportError>;
}

/// Submission of a liveness proof to the storage service
#[async_trait]
pub trait VaultTransport: Send + Sync {
    /// Returns whether the storage service's key opened the proof.
    async fn verify(
        &self,
        url: &str,
        proof: &LivenessProof,
    ) -> Result<bool, TransportError>;
}

/// The real transport, JSON over HTTPS
pub struct HttpTransport {
    client: HttpClient,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<HttpTransport, ClientError> {
        Ok(HttpTransport { client: HttpClient::new(config)? })
    }
}

#[async_trait]
impl HolderTransport for HttpTransport {
    async fn contribute(
        &self,
        holder: &HolderConfig,
        share: &Share,
    ) -> Result<(), TransportError> {
        let body = ContributeRequest {
            shard: Base64Bytes::from(share.value().as_slice()),
        };
        send(self.client.post(&holder.url, "/contribute").json(&body)).await?;
        Ok(())
    }
}

#[async_trait]
impl VaultTransport for HttpTransport {
    async fn verify(
        &self,
        url: &str,
        proof: &LivenessProof,
    ) -> Result<bool, TransportError> {
        let body = VerifyRequest {
            plaintext: Base64Bytes::from(proof.plaintext.as_slice()),
            nonce: Base64Bytes::from(proof.nonce.as_slice()),
            ciphertext: Base64Bytes::from(proof.ciphertext.as_slice()),
        };
        let resp = send(self.client.post(url, "/verify").json(&body)).await?;
        let VerifyResponse { verified } = resp.json().await?;
        Ok(verified)
    }
}
