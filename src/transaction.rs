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

//! Transaction records.
//!
//! Every transaction reference owns exactly one record, written once by the
//! idempotency guard and never deleted:
//!
//! ```text
//!  Pending ──settle──► Committed ──rollback──► Committed + rolled_back
//!     │
//!     └────settle────► Rejected  ──rollback──► Rejected  + rolled_back
//!
//!  (unknown ref) ──rollback──► marker: Rejected + rolled_back, zero amounts
//! ```
//!
//! `rolled_back` only ever moves from `false` to `true`.

use crate::base::{Amount, CallerId, TransactionRef};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Written by the idempotency guard; nothing applied yet.
    Pending,
    /// Amounts are the effects actually applied to the account.
    Committed,
    /// Tombstone for a request that failed validation or business rules.
    Rejected,
}

/// Final outcome persisted into a pending record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Committed {
        withdraw: Amount,
        deposit: Amount,
        charge_freerounds: i64,
    },
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction_ref: TransactionRef,
    pub caller_id: CallerId,
    pub withdraw: Amount,
    pub deposit: Amount,
    pub charge_freerounds: i64,
    pub status: TransactionStatus,
    pub rolled_back: bool,
}

impl TransactionRecord {
    /// Record written by the idempotency guard, carrying the requested amounts.
    pub fn pending(
        transaction_ref: TransactionRef,
        caller_id: CallerId,
        withdraw: Amount,
        deposit: Amount,
        charge_freerounds: i64,
    ) -> Self {
        Self {
            transaction_ref,
            caller_id,
            withdraw,
            deposit,
            charge_freerounds,
            status: TransactionStatus::Pending,
            rolled_back: false,
        }
    }

    /// Zero-amount record for a rollback that arrived before its transaction.
    pub fn rolled_back_marker(transaction_ref: TransactionRef, caller_id: CallerId) -> Self {
        Self {
            transaction_ref,
            caller_id,
            withdraw: 0,
            deposit: 0,
            charge_freerounds: 0,
            status: TransactionStatus::Rejected,
            rolled_back: true,
        }
    }

    pub fn apply(&mut self, settlement: Settlement) {
        match settlement {
            Settlement::Committed {
                withdraw,
                deposit,
                charge_freerounds,
            } => {
                self.withdraw = withdraw;
                self.deposit = deposit;
                self.charge_freerounds = charge_freerounds;
                self.status = TransactionStatus::Committed;
            }
            Settlement::Rejected => {
                self.withdraw = 0;
                self.deposit = 0;
                self.charge_freerounds = 0;
                self.status = TransactionStatus::Rejected;
            }
        }
    }

    /// Whether the record describes an effect that a rollback must reverse.
    pub fn is_reversible(&self) -> bool {
        self.status == TransactionStatus::Committed && !self.rolled_back
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> TransactionRecord {
        TransactionRecord::pending(TransactionRef::from("r1"), CallerId(1), 100, 50, 1)
    }

    #[test]
    fn commit_overwrites_requested_amounts() {
        let mut record = pending();
        record.apply(Settlement::Committed {
            withdraw: 0,
            deposit: 50,
            charge_freerounds: 1,
        });
        assert_eq!(record.status, TransactionStatus::Committed);
        assert_eq!(record.withdraw, 0);
        assert!(record.is_reversible());
    }

    #[test]
    fn rejection_zeroes_amounts() {
        let mut record = pending();
        record.apply(Settlement::Rejected);
        assert_eq!(record.status, TransactionStatus::Rejected);
        assert_eq!((record.withdraw, record.deposit, record.charge_freerounds), (0, 0, 0));
        assert!(!record.is_reversible());
    }

    #[test]
    fn marker_is_terminal() {
        let marker = TransactionRecord::rolled_back_marker(TransactionRef::from("r2"), CallerId(3));
        assert!(marker.rolled_back);
        assert!(!marker.is_reversible());
    }

    #[test]
    fn pending_is_not_reversible() {
        assert!(!pending().is_reversible());
    }
}
