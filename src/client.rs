//! HTTP client for a remote powledger node

use crate::api::{BlockPage, StatusResponse, TransactionLookup, ValidationResult};
use crate::blockchain::{Block, BlockInfo, WalletSummary};
use crate::error::{ChainError, Result};
use crate::miner::WorkSource;
use crate::transaction::Transaction;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(ApiClient {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn status(&self) -> Result<StatusResponse> {
        let response = self.http.get(self.url("/status")).send().await?;
        Ok(expect_success(response).await?.json().await?)
    }

    /// Number of blocks, without the full-chain validation `/status` performs.
    pub async fn height(&self) -> Result<u64> {
        let response = self
            .http
            .get(self.url("/blocks"))
            .query(&[("limit", 1)])
            .send()
            .await?;
        let page: BlockPage = expect_success(response).await?.json().await?;
        Ok(page.total)
    }

    pub async fn block_template(&self) -> Result<Option<BlockInfo>> {
        let response = self.http.get(self.url("/blocks/next")).send().await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        Ok(Some(expect_success(response).await?.json().await?))
    }

    pub async fn submit_block(&self, block: &Block) -> Result<Block> {
        let response = self.http.post(self.url("/blocks")).json(block).send().await?;
        Ok(expect_success(response).await?.json().await?)
    }

    pub async fn submit_transaction(&self, tx: &Transaction) -> Result<Transaction> {
        let response = self
            .http
            .post(self.url("/transactions"))
            .json(tx)
            .send()
            .await?;
        Ok(expect_success(response).await?.json().await?)
    }

    pub async fn transaction(&self, hash: &str) -> Result<TransactionLookup> {
        let response = self
            .http
            .get(self.url(&format!("/transactions/{}", hash)))
            .send()
            .await?;
        Ok(expect_success(response).await?.json().await?)
    }

    pub async fn wallet(&self, address: &str) -> Result<WalletSummary> {
        let response = self
            .http
            .get(self.url(&format!("/wallets/{}", address)))
            .send()
            .await?;
        Ok(expect_success(response).await?.json().await?)
    }
}

/// Turns a refusal into `ChainError::Rejected` carrying the node's reason.
async fn expect_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status.is_client_error() {
        let reason = match response.json::<ValidationResult>().await {
            Ok(ValidationResult {
                message: Some(message),
                ..
            }) => message,
            _ => status.to_string(),
        };
        return Err(ChainError::Rejected(reason));
    }

    Err(ChainError::NetworkError(format!("node answered {}", status)))
}

impl WorkSource for ApiClient {
    async fn next_block(&self) -> Result<Option<BlockInfo>> {
        self.block_template().await
    }

    async fn submit_block(&self, block: Block) -> Result<()> {
        ApiClient::submit_block(self, &block).await.map(|_| ())
    }

    async fn tip(&self) -> Result<u64> {
        self.height().await
    }
}
