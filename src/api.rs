//! REST API for the coordination server
//!
//! Wallets submit transactions, miners fetch templates and submit solved
//! blocks, and anyone can query chain status, blocks, transactions and
//! wallet balances. All bodies are JSON with camelCase field names.

use axum::{
    extract::{Path, Query, Request, State},
    http::{self, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};

use crate::blockchain::{Block, Blockchain, TransactionLocation, WalletSummary};
use crate::error::ChainError;
use crate::transaction::Transaction;

const MAX_PAGE_SIZE: usize = 100;

/// Shared server state: the chain plus request counters.
#[derive(Clone)]
pub struct Node {
    pub blockchain: Arc<RwLock<Blockchain>>,
    api_stats: Arc<RwLock<ApiStats>>,
}

/// API statistics and monitoring
#[derive(Debug, Default)]
struct ApiStats {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    blocks_submitted: u64,
    blocks_accepted: u64,
    transactions_submitted: u64,
    transactions_accepted: u64,
    start_time: Option<Instant>,
}

impl ApiStats {
    fn new() -> Self {
        ApiStats {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    fn record_request(&mut self, success: bool) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }
    }
}

impl Node {
    pub fn new(blockchain: Blockchain) -> Self {
        Self::new_shared(Arc::new(RwLock::new(blockchain)))
    }

    /// API node over a chain that other components (an in-process miner,
    /// tests) also hold.
    pub fn new_shared(blockchain: Arc<RwLock<Blockchain>>) -> Self {
        Self {
            blockchain,
            api_stats: Arc::new(RwLock::new(ApiStats::new())),
        }
    }

    pub async fn get_stats(&self) -> ApiStatsResponse {
        let stats = self.api_stats.read().await;
        let uptime = stats.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0);

        ApiStatsResponse {
            total_requests: stats.total_requests,
            successful_requests: stats.successful_requests,
            failed_requests: stats.failed_requests,
            blocks_submitted: stats.blocks_submitted,
            blocks_accepted: stats.blocks_accepted,
            transactions_submitted: stats.transactions_submitted,
            transactions_accepted: stats.transactions_accepted,
            uptime_seconds: uptime,
        }
    }
}

// ============================================================================
// API Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    /// A business rule refused the request.
    Rejected(ChainError),
    /// The body is missing required fields or has the wrong shape.
    Unprocessable(String),
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Rejected(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        (status, Json(ValidationResult::failure(message))).into_response()
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        ApiError::Rejected(err)
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        ValidationResult {
            success: true,
            message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        ValidationResult {
            success: false,
            message: Some(message.into()),
        }
    }
}

impl From<Result<(), ChainError>> for ValidationResult {
    fn from(result: Result<(), ChainError>) -> Self {
        match result {
            Ok(()) => ValidationResult::ok(),
            Err(e) => ValidationResult::failure(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub mempool_size: usize,
    pub block_count: u64,
    pub is_valid: ValidationResult,
    pub last_block: Block,
}

/// `-1` stands for "not there".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionLookup {
    pub mempool_index: i64,
    pub block_index: i64,
}

impl From<TransactionLocation> for TransactionLookup {
    fn from(location: TransactionLocation) -> Self {
        TransactionLookup {
            mempool_index: location.mempool_index.map_or(-1, |i| i as i64),
            block_index: location.block_index.map_or(-1, |i| i as i64),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTransactions {
    /// What the next block template would carry.
    pub next: Vec<Transaction>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockPage {
    pub blocks: Vec<Block>,
    pub total: u64,
    pub page: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiStatsResponse {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub blocks_submitted: u64,
    pub blocks_accepted: u64,
    pub transactions_submitted: u64,
    pub transactions_accepted: u64,
    pub uptime_seconds: u64,
}

#[derive(Deserialize)]
struct PaginationQuery {
    #[serde(default)]
    page: usize,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    10
}

// ============================================================================
// Utility Functions
// ============================================================================

/// Deserializes a POSTed body, insisting on a `hash` field first.
fn parse_body<T: serde::de::DeserializeOwned>(body: Value, kind: &str) -> Result<T, ApiError> {
    match body.get("hash") {
        Some(Value::String(_)) => {}
        _ => {
            return Err(ApiError::Unprocessable(format!(
                "{} is missing its hash",
                kind
            )))
        }
    }
    serde_json::from_value(body)
        .map_err(|e| ApiError::Unprocessable(format!("Malformed {}: {}", kind, e)))
}

// ============================================================================
// Middleware
// ============================================================================

async fn stats_middleware(State(node): State<Arc<Node>>, req: Request, next: Next) -> Response {
    let response = next.run(req).await;

    let success = response.status().is_success();
    node.api_stats.write().await.record_request(success);

    response
}

/// Logs method, path, status and duration of every request.
async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "api.request"
    );

    response
}

// ============================================================================
// API Server
// ============================================================================

pub fn build_api_router(node: Arc<Node>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![
            http::Method::GET,
            http::Method::POST,
            http::Method::OPTIONS,
        ])
        .allow_headers(vec![http::header::CONTENT_TYPE]);

    Router::new()
        .route("/status", get(get_status))
        // Blocks
        .route("/blocks", get(get_blocks).post(submit_block))
        .route("/blocks/next", get(get_next_block))
        .route("/blocks/:id", get(get_block))
        // Transactions
        .route("/transactions", get(get_pending_transactions).post(submit_transaction))
        .route("/transactions/:hash", get(get_transaction))
        // Wallets
        .route("/wallets/:address", get(get_wallet))
        // System
        .route("/health", get(health_check))
        .route("/stats", get(get_api_stats))
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn_with_state(node.clone(), stats_middleware))
        .with_state(node)
        .layer(cors)
}

/// Serves the API on `addr` until Ctrl-C.
pub async fn run_api_server(
    node: Arc<Node>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_api_router(node);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "could not listen for shutdown signal");
            }
            tracing::info!("shutting down API server");
        })
        .await?;
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

async fn get_status(State(node): State<Arc<Node>>) -> Json<StatusResponse> {
    let blockchain = node.blockchain.read().await;
    Json(StatusResponse {
        mempool_size: blockchain.mempool().len(),
        block_count: blockchain.height(),
        is_valid: blockchain.is_valid().into(),
        last_block: blockchain.last_block().clone(),
    })
}

async fn get_blocks(
    State(node): State<Arc<Node>>,
    Query(params): Query<PaginationQuery>,
) -> Json<BlockPage> {
    let blockchain = node.blockchain.read().await;
    let limit = params.limit.min(MAX_PAGE_SIZE);

    let blocks = blockchain
        .blocks()
        .iter()
        .rev()
        .skip(params.page.saturating_mul(limit))
        .take(limit)
        .cloned()
        .collect();

    Json(BlockPage {
        blocks,
        total: blockchain.height(),
        page: params.page,
        limit,
    })
}

async fn get_next_block(State(node): State<Arc<Node>>) -> Response {
    match node.blockchain.read().await.next_block() {
        Some(info) => Json(info).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// `id` is either a block index or a block hash.
async fn get_block(
    State(node): State<Arc<Node>>,
    Path(id): Path<String>,
) -> Result<Json<Block>, ApiError> {
    let blockchain = node.blockchain.read().await;
    let block = match id.parse::<u64>() {
        Ok(index) => blockchain.block_at(index),
        Err(_) => blockchain.block_by_hash(&id),
    };

    block
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Block {} not found", id)))
}

async fn submit_block(
    State(node): State<Arc<Node>>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Block>), ApiError> {
    node.api_stats.write().await.blocks_submitted += 1;
    let block: Block = parse_body(body, "block")?;

    node.blockchain.write().await.add_block(block.clone())?;

    node.api_stats.write().await.blocks_accepted += 1;
    Ok((StatusCode::CREATED, Json(block)))
}

async fn get_pending_transactions(State(node): State<Arc<Node>>) -> Json<PendingTransactions> {
    let blockchain = node.blockchain.read().await;
    let mempool = blockchain.mempool();
    Json(PendingTransactions {
        next: mempool.head(blockchain.config().tx_per_block).to_vec(),
        total: mempool.len(),
    })
}

async fn submit_transaction(
    State(node): State<Arc<Node>>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Transaction>), ApiError> {
    node.api_stats.write().await.transactions_submitted += 1;
    let tx: Transaction = parse_body(body, "transaction")?;

    node.blockchain.write().await.add_transaction(tx.clone())?;

    node.api_stats.write().await.transactions_accepted += 1;
    Ok((StatusCode::CREATED, Json(tx)))
}

async fn get_transaction(
    State(node): State<Arc<Node>>,
    Path(hash): Path<String>,
) -> Json<TransactionLookup> {
    let blockchain = node.blockchain.read().await;
    Json(blockchain.transaction_location(&hash).into())
}

async fn get_wallet(
    State(node): State<Arc<Node>>,
    Path(address): Path<String>,
) -> Json<WalletSummary> {
    Json(node.blockchain.read().await.wallet(&address))
}

async fn health_check(State(node): State<Arc<Node>>) -> impl IntoResponse {
    let height = node.blockchain.read().await.height();
    Json(serde_json::json!({
        "status": "healthy",
        "height": height,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn get_api_stats(State(node): State<Arc<Node>>) -> Json<ApiStatsResponse> {
    Json(node.get_stats().await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_uses_minus_one_for_absent() {
        let lookup: TransactionLookup = TransactionLocation {
            mempool_index: None,
            block_index: Some(3),
        }
        .into();
        assert_eq!(lookup.mempool_index, -1);
        assert_eq!(lookup.block_index, 3);
        assert_eq!(
            serde_json::to_value(lookup).unwrap(),
            serde_json::json!({"mempoolIndex": -1, "blockIndex": 3})
        );
    }

    #[test]
    fn test_parse_body_requires_hash() {
        let missing = serde_json::json!({"index": 1});
        assert!(matches!(
            parse_body::<Block>(missing, "block"),
            Err(ApiError::Unprocessable(_))
        ));

        let wrong_shape = serde_json::json!({"hash": "abc"});
        assert!(matches!(
            parse_body::<Block>(wrong_shape, "block"),
            Err(ApiError::Unprocessable(_))
        ));
    }

    #[test]
    fn test_validation_result_shape() {
        let ok: ValidationResult = Ok(()).into();
        assert_eq!(serde_json::to_value(ok).unwrap(), serde_json::json!({"success": true}));

        let failed: ValidationResult = Err(ChainError::MempoolFull).into();
        assert_eq!(failed.message.as_deref(), Some("Mempool is full"));
    }
}
