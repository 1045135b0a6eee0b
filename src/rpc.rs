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

//! JSON-RPC 2.0 adapter.
//!
//! Decodes the seamless-wallet envelope, dispatches by method name to the
//! [`Engine`] and encodes the result or error. The envelope looks like:
//!
//! ```json
//! {"jsonrpc": "2.0", "method": "getBalance", "id": 1,
//!  "params": {"callerId": 7, "playerName": "bob", "currency": "EUR"}}
//! ```
//!
//! Only `callerId`, the amounts and `transactionRef` reach the engine; the
//! remaining fields are accepted and ignored.

use crate::account::BalanceStore;
use crate::base::{Amount, CallerId, GeneratedTransactionId, TransactionRef};
use crate::engine::{Engine, WithdrawAndDeposit};
use crate::error::WalletError;
use crate::ledger::TransactionLedger;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json::error::Category;
use tracing::{debug, warn};

pub const JSONRPC_VERSION: &str = "2.0";
pub const GET_BALANCE: &str = "getBalance";
pub const WITHDRAW_AND_DEPOSIT: &str = "withdrawAndDeposit";
pub const ROLLBACK_TRANSACTION: &str = "rollbackTransaction";

// === Requests ===

#[derive(Debug, Deserialize)]
struct Envelope {
    jsonrpc: String,
    method: String,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    id: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetBalanceParams {
    pub caller_id: CallerId,
    pub player_name: String,
    pub currency: String,
    #[serde(default)]
    pub game_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub session_alternative_id: Option<String>,
    #[serde(default)]
    pub bonus_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinDetails {
    #[serde(default)]
    pub bet_type: Option<String>,
    #[serde(default)]
    pub win_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawAndDepositParams {
    pub caller_id: CallerId,
    pub player_name: String,
    pub withdraw: Amount,
    pub deposit: Amount,
    pub currency: String,
    pub transaction_ref: TransactionRef,
    #[serde(default)]
    pub game_id: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub session_alternative_id: Option<String>,
    #[serde(default)]
    pub spin_details: Option<SpinDetails>,
    #[serde(default)]
    pub bonus_id: Option<String>,
    #[serde(default)]
    pub charge_freerounds: i64,
    #[serde(default)]
    pub game_round_ref: Option<String>,
}

impl From<WithdrawAndDepositParams> for WithdrawAndDeposit {
    fn from(params: WithdrawAndDepositParams) -> Self {
        WithdrawAndDeposit::new(
            params.caller_id,
            params.transaction_ref,
            params.withdraw,
            params.deposit,
        )
        .with_free_rounds(params.charge_freerounds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackTransactionParams {
    pub caller_id: CallerId,
    pub player_name: String,
    pub transaction_ref: TransactionRef,
    #[serde(default)]
    pub game_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub session_alternative_id: Option<String>,
    #[serde(default)]
    pub round_id: Option<String>,
}

// === Responses ===

fn is_zero(value: &i64) -> bool {
    *value == 0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResult {
    pub balance: Amount,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub free_rounds_left: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawAndDepositResult {
    pub new_balance: Amount,
    pub transaction_id: GeneratedTransactionId,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub free_rounds_left: i64,
}

/// `rollbackTransaction` answers with an empty object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackResult {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn malformed(err: &serde_json::Error) -> Self {
        match err.classify() {
            Category::Data => Self::new(Self::INVALID_REQUEST, format!("invalid request: {err}")),
            _ => Self::new(Self::PARSE_ERROR, format!("parse error: {err}")),
        }
    }
}

impl From<WalletError> for RpcError {
    fn from(err: WalletError) -> Self {
        RpcError::new(err.code(), err.client_message())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    fn new(id: Value, outcome: Result<Value, RpcError>) -> Self {
        let (result, error) = match outcome {
            Ok(result) => (Some(result), None),
            Err(error) => (None, Some(error)),
        };
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result,
            error,
        }
    }
}

// === Dispatch ===

fn call<P, R>(params: Value, handler: impl FnOnce(P) -> Result<R, WalletError>) -> Result<Value, RpcError>
where
    P: DeserializeOwned,
    R: Serialize,
{
    let params: P = serde_json::from_value(params)
        .map_err(|err| RpcError::new(RpcError::INVALID_PARAMS, format!("invalid params: {err}")))?;
    let result = handler(params).map_err(|err| {
        match &err {
            WalletError::Store(_) | WalletError::AmountOverflow => warn!(error = %err, "wallet call failed"),
            _ => debug!(error = %err, "wallet call refused"),
        }
        RpcError::from(err)
    })?;
    serde_json::to_value(result)
        .map_err(|err| RpcError::new(RpcError::INTERNAL_ERROR, err.to_string()))
}

/// Decodes one request body, runs it against `engine` and builds the response.
pub fn dispatch<B, L>(engine: &Engine<B, L>, body: &[u8]) -> RpcResponse
where
    B: BalanceStore,
    L: TransactionLedger,
{
    let envelope: Envelope = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(err) => return RpcResponse::new(Value::Null, Err(RpcError::malformed(&err))),
    };
    debug!(method = %envelope.method, id = %envelope.id, "rpc request");

    if envelope.jsonrpc != JSONRPC_VERSION {
        let error = RpcError::new(
            RpcError::INVALID_REQUEST,
            format!("unsupported jsonrpc version: {}", envelope.jsonrpc),
        );
        return RpcResponse::new(envelope.id, Err(error));
    }

    let outcome = match envelope.method.as_str() {
        GET_BALANCE => call(envelope.params, |params: GetBalanceParams| {
            engine.get_balance(params.caller_id).map(|account| BalanceResult {
                balance: account.balance,
                free_rounds_left: account.free_rounds,
            })
        }),
        WITHDRAW_AND_DEPOSIT => call(envelope.params, |params: WithdrawAndDepositParams| {
            engine
                .withdraw_and_deposit(params.into())
                .map(|receipt| WithdrawAndDepositResult {
                    new_balance: receipt.new_balance,
                    transaction_id: receipt.transaction_id,
                    free_rounds_left: receipt.free_rounds_left,
                })
        }),
        ROLLBACK_TRANSACTION => call(envelope.params, |params: RollbackTransactionParams| {
            engine
                .rollback_transaction(params.caller_id, &params.transaction_ref)
                .map(|()| RollbackResult::default())
        }),
        other => Err(RpcError::new(
            RpcError::METHOD_NOT_FOUND,
            format!("method not found: {other}"),
        )),
    };

    RpcResponse::new(envelope.id, outcome)
}
