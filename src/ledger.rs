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

//! Append-only transaction ledger with atomic deduplication.
//!
//! The ledger is the idempotency guard of the wallet: a transaction reference
//! is admitted exactly once by [`TransactionLedger::create_if_absent`], which
//! must be a single atomic operation in every implementation.

use crate::base::TransactionRef;
use crate::error::StoreError;
use crate::transaction::{Settlement, TransactionRecord};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Outcome of [`TransactionLedger::create_if_absent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insertion {
    Inserted,
    /// The reference was already present; the stored record is returned unchanged.
    Existing(TransactionRecord),
}

/// Durable mapping from transaction reference to [`TransactionRecord`].
pub trait TransactionLedger: Send + Sync {
    /// Read-only lookup.
    fn lookup(&self, transaction_ref: &TransactionRef)
    -> Result<Option<TransactionRecord>, StoreError>;

    /// Inserts `record` unless its reference exists, as one atomic step
    /// (a unique-key insert in a database-backed ledger).
    fn create_if_absent(&self, record: TransactionRecord) -> Result<Insertion, StoreError>;

    /// Persists the final outcome of a pending record.
    fn settle(
        &self,
        transaction_ref: &TransactionRef,
        settlement: Settlement,
    ) -> Result<(), StoreError>;

    /// Flips `rolled_back` to `true`.
    ///
    /// Returns `false` without writing if the record was already rolled back.
    fn mark_rolled_back(&self, transaction_ref: &TransactionRef) -> Result<bool, StoreError>;
}

/// In-memory [`TransactionLedger`] backed by a [`DashMap`].
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: DashMap<TransactionRef, TransactionRecord>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl TransactionLedger for MemoryLedger {
    fn lookup(
        &self,
        transaction_ref: &TransactionRef,
    ) -> Result<Option<TransactionRecord>, StoreError> {
        Ok(self
            .records
            .get(transaction_ref)
            .map(|record| record.value().clone()))
    }

    fn create_if_absent(&self, record: TransactionRecord) -> Result<Insertion, StoreError> {
        // Entry API gives an atomic check-and-insert under the shard lock.
        match self.records.entry(record.transaction_ref.clone()) {
            Entry::Occupied(existing) => Ok(Insertion::Existing(existing.get().clone())),
            Entry::Vacant(entry) => {
                entry.insert(record);
                Ok(Insertion::Inserted)
            }
        }
    }

    fn settle(
        &self,
        transaction_ref: &TransactionRef,
        settlement: Settlement,
    ) -> Result<(), StoreError> {
        let mut record = self
            .records
            .get_mut(transaction_ref)
            .ok_or_else(|| StoreError::MissingRecord(transaction_ref.to_string()))?;
        record.apply(settlement);
        Ok(())
    }

    fn mark_rolled_back(&self, transaction_ref: &TransactionRef) -> Result<bool, StoreError> {
        let mut record = self
            .records
            .get_mut(transaction_ref)
            .ok_or_else(|| StoreError::MissingRecord(transaction_ref.to_string()))?;
        if record.rolled_back {
            return Ok(false);
        }
        record.rolled_back = true;
        Ok(true)
    }
}
