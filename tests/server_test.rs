// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Integration tests for the HTTP endpoint with concurrent requests.
//!
//! These tests drive the JSON-RPC endpoint over real sockets and verify the
//! wallet stays consistent under many simultaneous calls.

use futures::future::join_all;
use reqwest::{Client, StatusCode};
use seamless_wallet::rpc::{RpcError, RpcResponse, WithdrawAndDepositResult};
use seamless_wallet::server::{self, SEAMLESS_PATH};
use seamless_wallet::{CallerId, Engine, ProvisioningPolicy, WalletError};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Test server that binds to an ephemeral port.
struct TestServer {
    url: String,
    engine: Arc<Engine>,
    client: Client,
}

impl TestServer {
    async fn new(policy: ProvisioningPolicy) -> Self {
        let engine = Arc::new(Engine::with_policy(policy));
        let app = server::router(Arc::clone(&engine));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{}{}", addr, SEAMLESS_PATH),
            engine,
            client: Client::new(),
        }
    }

    async fn call(&self, method: &str, id: i64, params: Value) -> RpcResponse {
        self.client
            .post(&self.url)
            .json(&json!({"jsonrpc": "2.0", "method": method, "id": id, "params": params}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    async fn withdraw_and_deposit(
        &self,
        caller: i64,
        reference: &str,
        withdraw: i64,
        deposit: i64,
    ) -> RpcResponse {
        self.call(
            "withdrawAndDeposit",
            caller,
            json!({"callerId": caller, "playerName": "player", "currency": "EUR",
                   "withdraw": withdraw, "deposit": deposit, "transactionRef": reference,
                   "gameId": "slots", "gameRoundRef": reference}),
        )
        .await
    }

    async fn rollback(&self, caller: i64, reference: &str) -> RpcResponse {
        self.call(
            "rollbackTransaction",
            caller,
            json!({"callerId": caller, "playerName": "player", "transactionRef": reference,
                   "roundId": reference}),
        )
        .await
    }

    async fn balance(&self, caller: i64) -> Value {
        self.call(
            "getBalance",
            caller,
            json!({"callerId": caller, "playerName": "player", "currency": "EUR"}),
        )
        .await
        .result
        .unwrap()
    }
}

#[tokio::test]
async fn get_balance_over_http() {
    let server = TestServer::new(ProvisioningPolicy::demo_fixed()).await;
    let response = server
        .call(
            "getBalance",
            77,
            json!({"callerId": 1, "playerName": "player", "currency": "EUR"}),
        )
        .await;

    assert_eq!(response.jsonrpc, "2.0");
    assert_eq!(response.id, json!(77));
    assert_eq!(response.result, Some(json!({"balance": 35000, "freeRoundsLeft": 2})));
}

#[tokio::test]
async fn round_and_rollback_over_http() {
    let server = TestServer::new(ProvisioningPolicy::fixed(1_000, 0)).await;

    let response = server.withdraw_and_deposit(1, "r1", 100, 25).await;
    let result: WithdrawAndDepositResult = serde_json::from_value(response.result.unwrap()).unwrap();
    assert_eq!(result.new_balance, 925);

    let duplicate = server.withdraw_and_deposit(1, "r1", 100, 25).await;
    assert_eq!(duplicate.error.unwrap().code, WalletError::DuplicateTransaction.code());

    let rollback = server.rollback(1, "r1").await;
    assert_eq!(rollback.result, Some(json!({})));
    assert_eq!(server.balance(1).await, json!({"balance": 1000}));

    let again = server.rollback(1, "r1").await;
    assert_eq!(again.error.unwrap().code, WalletError::AlreadyRolledBack.code());
}

#[tokio::test]
async fn insufficient_funds_over_http() {
    let server = TestServer::new(ProvisioningPolicy::fixed(40, 0)).await;
    let response = server.withdraw_and_deposit(1, "r1", 100, 10).await;

    let error = response.error.unwrap();
    assert_eq!(error.code, 1);
    assert_eq!(error.message, "insufficient funds");
    assert_eq!(server.balance(1).await, json!({"balance": 40}));
}

#[tokio::test]
async fn malformed_body_gets_parse_error() {
    let server = TestServer::new(ProvisioningPolicy::default()).await;
    let response = server
        .client
        .post(&server.url)
        .body("{\"jsonrpc\": ")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: RpcResponse = response.json().await.unwrap();
    assert_eq!(body.error.unwrap().code, RpcError::PARSE_ERROR);
}

#[tokio::test]
async fn get_is_not_allowed() {
    let server = TestServer::new(ProvisioningPolicy::default()).await;
    let response = server.client.get(&server.url).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_rounds_on_one_account() {
    let server = Arc::new(TestServer::new(ProvisioningPolicy::fixed(10_000, 0)).await);
    let n = 500;

    let responses = join_all((0..n).map(|i| {
        let server = Arc::clone(&server);
        async move { server.withdraw_and_deposit(1, &format!("c{i}"), 10, 0).await }
    }))
    .await;

    assert!(responses.iter().all(|response| response.error.is_none()));
    assert_eq!(
        server.engine.get_balance(CallerId(1)).unwrap().balance,
        10_000 - 10 * n
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_duplicates_apply_once() {
    let server = Arc::new(TestServer::new(ProvisioningPolicy::fixed(10_000, 0)).await);

    let responses = join_all((0..100).map(|_| {
        let server = Arc::clone(&server);
        async move { server.withdraw_and_deposit(1, "dup", 250, 0).await }
    }))
    .await;

    let applied = responses.iter().filter(|r| r.result.is_some()).count();
    assert_eq!(applied, 1);
    assert_eq!(server.engine.get_balance(CallerId(1)).unwrap().balance, 9_750);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_callers_stay_independent() {
    let server = Arc::new(TestServer::new(ProvisioningPolicy::fixed(1_000, 0)).await);

    join_all((0..400).map(|i| {
        let server = Arc::clone(&server);
        async move {
            let caller = i % 20;
            server.withdraw_and_deposit(caller, &format!("ind{i}"), 30, 10).await
        }
    }))
    .await;

    for caller in 0..20 {
        // 20 rounds each at -20.
        assert_eq!(server.balance(caller).await, json!({"balance": 600}));
    }
}
