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

//! Error types for wallet operations.

use thiserror::Error;

/// Failure of the underlying persistence layer.
///
/// Signals that a store could not be reached or could not complete a write.
/// It never carries a business meaning.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A write referenced a ledger entry that does not exist.
    #[error("no ledger entry for transaction {0}")]
    MissingRecord(String),
}

/// Wallet operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// Withdrawal exceeds the current balance
    #[error("insufficient funds")]
    InsufficientFunds,

    /// Deposit amount is negative
    #[error("negative deposit")]
    NegativeDeposit,

    /// Withdrawal amount is negative
    #[error("negative withdrawal")]
    NegativeWithdrawal,

    /// Transaction reference has already been seen
    #[error("duplicate transaction")]
    DuplicateTransaction,

    /// Transaction has already been rolled back
    #[error("transaction already rolled back")]
    AlreadyRolledBack,

    /// Balance arithmetic would overflow
    #[error("amount overflow")]
    AmountOverflow,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WalletError {
    /// RPC error code reported to the calling platform.
    pub fn code(&self) -> i64 {
        match self {
            WalletError::InsufficientFunds => 1,
            WalletError::NegativeDeposit => 3,
            WalletError::NegativeWithdrawal => 4,
            WalletError::DuplicateTransaction => -32010,
            WalletError::AlreadyRolledBack => -32011,
            WalletError::AmountOverflow | WalletError::Store(_) => -32603,
        }
    }

    /// Message safe to hand back to the caller.
    ///
    /// Store failures are reduced to a generic message so connection details
    /// never leave the process.
    pub fn client_message(&self) -> String {
        match self {
            WalletError::Store(_) => "internal error".to_string(),
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        assert_eq!(WalletError::InsufficientFunds.to_string(), "insufficient funds");
        assert_eq!(WalletError::NegativeDeposit.to_string(), "negative deposit");
        assert_eq!(WalletError::NegativeWithdrawal.to_string(), "negative withdrawal");
        assert_eq!(
            WalletError::DuplicateTransaction.to_string(),
            "duplicate transaction"
        );
        assert_eq!(
            WalletError::AlreadyRolledBack.to_string(),
            "transaction already rolled back"
        );
        assert_eq!(
            WalletError::Store(StoreError::Unavailable("db down".into())).to_string(),
            "store unavailable: db down"
        );
    }

    #[test]
    fn protocol_codes() {
        assert_eq!(WalletError::InsufficientFunds.code(), 1);
        assert_eq!(WalletError::NegativeDeposit.code(), 3);
        assert_eq!(WalletError::NegativeWithdrawal.code(), 4);
        assert_eq!(WalletError::DuplicateTransaction.code(), -32010);
        assert_eq!(WalletError::AlreadyRolledBack.code(), -32011);
        assert_eq!(
            WalletError::Store(StoreError::Unavailable(String::new())).code(),
            -32603
        );
    }

    #[test]
    fn store_details_are_hidden_from_clients() {
        let err = WalletError::from(StoreError::Unavailable("host=10.0.0.3".into()));
        assert_eq!(err.client_message(), "internal error");
        assert_eq!(
            WalletError::InsufficientFunds.client_message(),
            "insufficient funds"
        );
    }
}
