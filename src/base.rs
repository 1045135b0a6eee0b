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

//! Core identifier types for callers and transactions.

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Monetary amount in minor units (cents).
pub type Amount = i64;

/// Identity of a player account on the calling platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct CallerId(pub i64);

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-supplied idempotency key identifying one game-round financial event.
///
/// The value is opaque; two requests carrying the same reference are the same
/// event no matter what amounts they carry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct TransactionRef(pub String);

impl TransactionRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TransactionRef {
    fn from(value: &str) -> Self {
        TransactionRef(value.to_owned())
    }
}

impl From<String> for TransactionRef {
    fn from(value: String) -> Self {
        TransactionRef(value)
    }
}

impl fmt::Display for TransactionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier handed back to the caller for a successful withdraw/deposit.
///
/// Carries no persisted state of its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct GeneratedTransactionId(pub String);

impl GeneratedTransactionId {
    pub const LEN: usize = 18;

    /// Generates a fresh alphanumeric identifier.
    pub fn generate() -> Self {
        let id = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(Self::LEN)
            .map(char::from)
            .collect();
        GeneratedTransactionId(id)
    }
}

impl fmt::Display for GeneratedTransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_alphanumeric_and_fixed_length() {
        let id = GeneratedTransactionId::generate();
        assert_eq!(id.0.len(), GeneratedTransactionId::LEN);
        assert!(id.0.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn generated_ids_differ() {
        let a = GeneratedTransactionId::generate();
        let b = GeneratedTransactionId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn ids_serialize_transparently() {
        assert_eq!(serde_json::to_string(&CallerId(7)).unwrap(), "7");
        assert_eq!(
            serde_json::to_string(&TransactionRef::from("round-1")).unwrap(),
            "\"round-1\""
        );
    }
}
