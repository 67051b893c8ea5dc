use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blockchain::{Block, Transaction};

use super::auth;

/// Errors raised by outbound peer calls
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("peer answered with status {0}")]
    Status(reqwest::StatusCode),

    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Chain payload served by a peer's `GET /api/v1/chain`. Extra fields in the
/// response are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteChain {
    pub length: usize,
    pub chain: Vec<Block>,
}

/// Fetches a peer's full chain. Split out as a trait so chain-replacement
/// logic can run against canned chains in tests.
#[async_trait]
pub trait ChainFetcher: Send + Sync {
    async fn fetch_chain(&self, peer: &str) -> Result<RemoteChain, ClientError>;
}

/// Introduces one node's address to another. Split out as a trait so the
/// registration fan-out can run against a recording stub in tests.
#[async_trait]
pub trait PeerAnnouncer: Send + Sync {
    async fn announce(&self, peer: &str, address: &str) -> Result<(), ClientError>;
}

/// HTTP client for talking to other nodes.
///
/// Every call shares one connection pool and a per-request timeout, so an
/// unreachable peer costs a bounded wait instead of a hung task. Mutating
/// calls sign the exact body bytes they send; signed GETs sign the empty
/// body.
#[derive(Debug, Clone)]
pub struct PeerClient {
    http: Client,
    secret: String,
}

impl PeerClient {
    pub fn new(secret: impl Into<String>, timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client");

        PeerClient {
            http,
            secret: secret.into(),
        }
    }

    async fn post_signed<T: Serialize>(&self, url: String, payload: &T) -> Result<(), ClientError> {
        let body = serde_json::to_vec(payload)?;
        let signature = auth::sign(&body, &self.secret);

        let response = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(auth::SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::Status(response.status()));
        }
        Ok(())
    }

    /// Fetches `peer`'s chain. This is the one peer call that needs no
    /// signature, so that fresh nodes can sync before exchanging secrets
    /// is even relevant.
    pub async fn get_chain(&self, peer: &str) -> Result<RemoteChain, ClientError> {
        let url = format!("{}/api/v1/chain", peer);
        let response = self.http.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(ClientError::Status(response.status()));
        }
        Ok(response.json::<RemoteChain>().await?)
    }

    /// Fetches the peer list another node knows about.
    pub async fn get_peers(&self, peer: &str) -> Result<Vec<String>, ClientError> {
        let url = format!("{}/api/v1/nodes", peer);
        let response = self
            .http
            .get(&url)
            .header(auth::SIGNATURE_HEADER, auth::sign(b"", &self.secret))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::Status(response.status()));
        }
        Ok(response.json::<Vec<String>>().await?)
    }

    /// Offers a freshly mined block to `peer`.
    pub async fn send_block(&self, peer: &str, block: &Block) -> Result<(), ClientError> {
        self.post_signed(format!("{}/api/v1/blocks/receive", peer), block).await
    }

    /// Relays a transaction to `peer`'s pool, timestamp and all, so the
    /// peer sees the identical transaction and computes the identical id.
    pub async fn send_transaction(&self, peer: &str, tx: &Transaction) -> Result<(), ClientError> {
        self.post_signed(format!("{}/api/v1/transactions", peer), tx).await
    }

    /// Asks `peer` to add `address` to its registry.
    pub async fn register_with(&self, peer: &str, address: &str) -> Result<(), ClientError> {
        let payload = serde_json::json!({ "address": address });
        self.post_signed(format!("{}/api/v1/nodes/register", peer), &payload).await
    }
}

#[async_trait]
impl ChainFetcher for PeerClient {
    async fn fetch_chain(&self, peer: &str) -> Result<RemoteChain, ClientError> {
        self.get_chain(peer).await
    }
}

#[async_trait]
impl PeerAnnouncer for PeerClient {
    async fn announce(&self, peer: &str, address: &str) -> Result<(), ClientError> {
        self.register_with(peer, address).await
    }
}
