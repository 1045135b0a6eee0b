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

//! HTTP front for the JSON-RPC adapter.
//!
//! A single endpoint, `POST /mascot/seamless`, receives every wallet call.
//!
//! ```bash
//! curl -X POST http://localhost:8080/mascot/seamless \
//!   -H "Content-Type: application/json" \
//!   -d '{"jsonrpc": "2.0", "method": "getBalance", "id": 1,
//!        "params": {"callerId": 1, "playerName": "bob", "currency": "EUR"}}'
//! ```

use crate::account::BalanceStore;
use crate::engine::Engine;
use crate::ledger::TransactionLedger;
use crate::rpc::{self, RpcError, RpcResponse};
use axum::{Json, Router, body::Bytes, extract::State, routing::post};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

pub const SEAMLESS_PATH: &str = "/mascot/seamless";

/// POST /mascot/seamless - Dispatch one JSON-RPC call.
async fn seamless<B, L>(State(engine): State<Arc<Engine<B, L>>>, body: Bytes) -> Json<RpcResponse>
where
    B: BalanceStore + 'static,
    L: TransactionLedger + 'static,
{
    // Store calls may block on I/O; keep them off the async workers.
    let response = tokio::task::spawn_blocking(move || rpc::dispatch(&*engine, &body[..])).await;

    match response {
        Ok(response) => Json(response),
        Err(err) => {
            error!(error = %err, "rpc worker failed");
            Json(RpcResponse {
                jsonrpc: rpc::JSONRPC_VERSION.to_string(),
                id: Value::Null,
                result: None,
                error: Some(RpcError {
                    code: RpcError::INTERNAL_ERROR,
                    message: "internal error".to_string(),
                }),
            })
        }
    }
}

pub fn router<B, L>(engine: Arc<Engine<B, L>>) -> Router
where
    B: BalanceStore + 'static,
    L: TransactionLedger + 'static,
{
    Router::new()
        .route(SEAMLESS_PATH, post(seamless::<B, L>))
        .with_state(engine)
}

/// Serves `engine` on `listener` until Ctrl-C.
pub async fn serve<B, L>(listener: TcpListener, engine: Arc<Engine<B, L>>) -> std::io::Result<()>
where
    B: BalanceStore + 'static,
    L: TransactionLedger + 'static,
{
    info!(addr = %listener.local_addr()?, path = SEAMLESS_PATH, "seamless wallet listening");
    axum::serve(listener, router(engine))
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(error = %err, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("shutting down");
        })
        .await
}
