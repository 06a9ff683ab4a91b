//! Integration tests for the coordination server endpoints
//!
//! These drive the router in-process and check status codes and JSON shapes
//! as a wallet or miner would see them.

use axum_test::TestServer;
use powledger::api::{build_api_router, Node};
use powledger::blockchain::{Block, BlockInfo, Blockchain};
use powledger::config::ChainConfig;
use powledger::transaction::{Transaction, TransactionInput, TransactionOutput};
use powledger::wallet::Wallet;
use serde_json::{json, Value};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn test_server() -> TestServer {
    let blockchain = Blockchain::new(ChainConfig {
        difficulty: 4,
        ..ChainConfig::default()
    });
    let app = build_api_router(Arc::new(Node::new(blockchain)));
    TestServer::new(app).expect("Failed to create test server")
}

fn fabricated_payment(from: &Wallet, to: &Wallet) -> Transaction {
    let mut input = TransactionInput::new(from.address(), 10, "ab".repeat(32));
    from.sign_input(&mut input);
    Transaction::regular(vec![input], vec![TransactionOutput::new(to.address(), 10)])
}

#[tokio::test]
async fn test_status_and_system_endpoints() {
    let server = test_server();

    let response = server.get("/status").await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["mempoolSize"], 0);
    assert_eq!(json["blockCount"], 1);
    assert_eq!(json["isValid"], json!({"success": true}));
    assert_eq!(json["lastBlock"]["index"], 0);
    assert!(json["lastBlock"]["previousHash"].is_string());

    let response = server.get("/health").await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["status"], "healthy");
    assert!(json["timestamp"].is_string());

    let response = server.get("/stats").await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert!(json["totalRequests"].as_u64().unwrap() >= 2);
    assert!(json["uptimeSeconds"].is_number());
}

#[tokio::test]
async fn test_block_lookup() {
    let server = test_server();

    let genesis: Block = server.get("/blocks/0").await.json();
    assert_eq!(genesis.index, 0);

    let by_hash = server.get(&format!("/blocks/{}", genesis.hash)).await;
    assert_eq!(by_hash.status_code(), 200);
    assert_eq!(by_hash.json::<Block>(), genesis);

    let response = server.get("/blocks/999").await;
    assert_eq!(response.status_code(), 404);
    let json: Value = response.json();
    assert_eq!(json["success"], false);
    assert!(json["message"].is_string());

    assert_eq!(server.get("/blocks/not-a-block").await.status_code(), 404);

    let json: Value = server.get("/blocks").await.json();
    assert_eq!(json["total"], 1);
    assert_eq!(json["blocks"][0]["index"], 0);
}

#[tokio::test]
async fn test_next_block_is_empty_without_work() {
    let server = test_server();
    assert_eq!(server.get("/blocks/next").await.status_code(), 204);
}

#[tokio::test]
async fn test_submit_transaction_then_mine() {
    let server = test_server();
    let alice = Wallet::create();
    let bob = Wallet::create();
    let tx = fabricated_payment(&alice, &bob);

    let response = server.post("/transactions").json(&tx).await;
    assert_eq!(response.status_code(), 201);
    assert_eq!(response.json::<Transaction>(), tx);

    let json: Value = server.get(&format!("/transactions/{}", tx.hash)).await.json();
    assert_eq!(json, json!({"mempoolIndex": 0, "blockIndex": -1}));

    let json: Value = server.get("/transactions").await.json();
    assert_eq!(json["total"], 1);
    assert_eq!(json["next"][0]["hash"], tx.hash.as_str());

    // Same hash again while pending.
    let response = server.post("/transactions").json(&tx).await;
    assert_eq!(response.status_code(), 400);
    let json: Value = response.json();
    assert_eq!(json["success"], false);
    assert!(json["message"]
        .as_str()
        .unwrap()
        .contains("Pending transaction already exists"));

    let response = server.get("/blocks/next").await;
    assert_eq!(response.status_code(), 200);
    let info: BlockInfo = response.json();
    assert_eq!(info.index, 1);
    assert_eq!(info.transactions, vec![tx.clone()]);

    let mut block = Block::from_block_info(&info, "miner");
    assert!(block.mine(info.difficulty, "miner", &AtomicBool::new(false)));

    let response = server.post("/blocks").json(&block).await;
    assert_eq!(response.status_code(), 201);
    assert_eq!(response.json::<Block>(), block);

    let json: Value = server.get(&format!("/transactions/{}", tx.hash)).await.json();
    assert_eq!(json, json!({"mempoolIndex": -1, "blockIndex": 1}));

    let json: Value = server.get("/status").await.json();
    assert_eq!(json["blockCount"], 2);
    assert_eq!(json["mempoolSize"], 0);
    assert_eq!(json["isValid"]["success"], true);

    let json: Value = server.get(&format!("/wallets/{}", bob.address())).await.json();
    assert_eq!(json["balance"], 10);
    assert_eq!(json["fee"], 0);
    assert_eq!(json["utxo"][0]["tx"], tx.hash.as_str());

    // Mined already: resubmitting is a duplicate.
    let response = server.post("/transactions").json(&tx).await;
    assert_eq!(response.status_code(), 400);
    let json: Value = response.json();
    assert!(json["message"].as_str().unwrap().contains("already part of the chain"));

    // Replaying the accepted block fails the index check.
    let response = server.post("/blocks").json(&block).await;
    assert_eq!(response.status_code(), 400);
    assert_eq!(response.json::<Value>()["success"], false);
}

#[tokio::test]
async fn test_structurally_incomplete_bodies() {
    let server = test_server();

    let response = server.post("/blocks").json(&json!({"index": 1})).await;
    assert_eq!(response.status_code(), 422);
    assert_eq!(response.json::<Value>()["success"], false);

    let response = server
        .post("/transactions")
        .json(&json!({"type": "regular", "txOutputs": []}))
        .await;
    assert_eq!(response.status_code(), 422);

    let response = server
        .post("/transactions")
        .json(&json!({"hash": "abc", "type": "bogus"}))
        .await;
    assert_eq!(response.status_code(), 422);
}

#[tokio::test]
async fn test_invalid_transaction_rejected_with_reason() {
    let server = test_server();
    let alice = Wallet::create();
    let bob = Wallet::create();

    let mut tx = fabricated_payment(&alice, &bob);
    tx.tx_outputs[0].amount = 0;
    tx.finalize();

    let response = server.post("/transactions").json(&tx).await;
    assert_eq!(response.status_code(), 400);
    let json: Value = response.json();
    assert!(json["message"].as_str().unwrap().contains("Outputs are invalid"));

    let json: Value = server.get(&format!("/transactions/{}", tx.hash)).await.json();
    assert_eq!(json, json!({"mempoolIndex": -1, "blockIndex": -1}));
}

#[tokio::test]
async fn test_unknown_wallet_is_empty() {
    let server = test_server();
    let json: Value = server.get("/wallets/nobody").await.json();
    assert_eq!(json, json!({"balance": 0, "fee": 0, "utxo": []}));
}
