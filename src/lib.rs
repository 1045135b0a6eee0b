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

//! # Seamless Wallet
//!
//! This library provides the wallet backend of a seamless-wallet gaming
//! integration: per-player balances and free rounds, game rounds applied
//! exactly once per transaction reference, and rollbacks that reverse a round
//! or pre-empt one that has not arrived yet.
//!
//! ## Core Components
//!
//! - [`Engine`]: Serves getBalance, withdrawAndDeposit and rollbackTransaction
//! - [`BalanceStore`]: Accounts keyed by caller, provisioned on first reference
//! - [`TransactionLedger`]: Append-only records keyed by transaction reference
//! - [`rpc`] / [`server`]: JSON-RPC adapter and its HTTP endpoint
//!
//! ## Example
//!
//! ```
//! use seamless_wallet::{CallerId, Engine, ProvisioningPolicy, TransactionRef, WalletError, WithdrawAndDeposit};
//!
//! let engine = Engine::with_policy(ProvisioningPolicy::fixed(1_000, 0));
//!
//! // Bet 100, win 40
//! let receipt = engine
//!     .withdraw_and_deposit(WithdrawAndDeposit::new(CallerId(1), "round-1", 100, 40))
//!     .unwrap();
//! assert_eq!(receipt.new_balance, 940);
//!
//! // The same reference is never applied twice
//! let again = engine.withdraw_and_deposit(WithdrawAndDeposit::new(CallerId(1), "round-1", 100, 40));
//! assert_eq!(again, Err(WalletError::DuplicateTransaction));
//!
//! // Rolling back restores the balance
//! engine.rollback_transaction(CallerId(1), &TransactionRef::from("round-1")).unwrap();
//! assert_eq!(engine.get_balance(CallerId(1)).unwrap().balance, 1_000);
//! ```
//!
//! ## Thread Safety
//!
//! The engine serializes work per caller and lets different callers proceed in
//! parallel. Transaction references are deduplicated by the ledger's atomic
//! insert, not by the in-process locks.

pub mod account;
mod base;
pub mod config;
mod engine;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod rpc;
pub mod server;
mod transaction;

pub use account::{Account, BalanceStore, MemoryBalanceStore, ProvisioningPolicy};
pub use base::{Amount, CallerId, GeneratedTransactionId, TransactionRef};
pub use engine::{Engine, Receipt, WithdrawAndDeposit};
pub use error::{StoreError, WalletError};
pub use ledger::{Insertion, MemoryLedger, TransactionLedger};
pub use transaction::{Settlement, TransactionRecord, TransactionStatus};
