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

//! Player accounts and the balance store.
//!
//! An [`Account`] is the pair `(balance, free_rounds)` kept per [`CallerId`].
//! Accounts are never created explicitly: the first reference to a caller
//! provisions one according to the store's [`ProvisioningPolicy`].
//!
//! # Example
//!
//! ```
//! use seamless_wallet::{Account, BalanceStore, CallerId, MemoryBalanceStore, ProvisioningPolicy};
//!
//! let store = MemoryBalanceStore::new(ProvisioningPolicy::fixed(500, 1));
//! let account = store.get(CallerId(1)).unwrap();
//! assert_eq!(account, Account::new(500, 1));
//! ```

use crate::base::{Amount, CallerId};
use crate::error::StoreError;
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Balance and free-round entitlement of one player.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub balance: Amount,
    pub free_rounds: i64,
}

impl Account {
    pub const fn new(balance: Amount, free_rounds: i64) -> Self {
        Self {
            balance,
            free_rounds,
        }
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.balance >= 0,
            "Invariant violated: balance went negative: {}",
            self.balance
        );
        debug_assert!(
            self.free_rounds >= 0,
            "Invariant violated: free rounds went negative: {}",
            self.free_rounds
        );
    }
}

/// How a never-seen caller's account is initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningPolicy {
    /// Every new account starts with the same values.
    Fixed { balance: Amount, free_rounds: i64 },
    /// Demo/test policy: `balance = random(0..balance_steps) * balance_step`,
    /// `free_rounds = random(0..max_free_rounds)`.
    Randomized {
        balance_steps: i64,
        balance_step: Amount,
        max_free_rounds: i64,
    },
}

impl ProvisioningPolicy {
    pub const fn fixed(balance: Amount, free_rounds: i64) -> Self {
        ProvisioningPolicy::Fixed {
            balance,
            free_rounds,
        }
    }

    /// Seed values used by the demo database: 35000 and two free rounds.
    pub const fn demo_fixed() -> Self {
        Self::fixed(35_000, 2)
    }

    pub const fn demo_randomized() -> Self {
        ProvisioningPolicy::Randomized {
            balance_steps: 300,
            balance_step: 100,
            max_free_rounds: 5,
        }
    }

    pub fn provision(&self) -> Account {
        match *self {
            ProvisioningPolicy::Fixed {
                balance,
                free_rounds,
            } => Account::new(balance.max(0), free_rounds.max(0)),
            ProvisioningPolicy::Randomized {
                balance_steps,
                balance_step,
                max_free_rounds,
            } => {
                let mut rng = rand::rng();
                let steps = if balance_steps > 0 {
                    rng.random_range(0..balance_steps)
                } else {
                    0
                };
                let free_rounds = if max_free_rounds > 0 {
                    rng.random_range(0..max_free_rounds)
                } else {
                    0
                };
                Account::new(steps.saturating_mul(balance_step).max(0), free_rounds)
            }
        }
    }
}

impl Default for ProvisioningPolicy {
    fn default() -> Self {
        Self::fixed(0, 0)
    }
}

/// Durable mapping from caller to [`Account`].
///
/// Implementations must make provisioning in [`BalanceStore::get`] race-free:
/// two concurrent first references to the same caller observe the same account.
pub trait BalanceStore: Send + Sync {
    /// Returns the caller's account, provisioning it first if unseen.
    fn get(&self, caller_id: CallerId) -> Result<Account, StoreError>;

    /// Replaces the stored account values.
    fn update(&self, caller_id: CallerId, account: Account) -> Result<(), StoreError>;
}

/// In-memory [`BalanceStore`] backed by a [`DashMap`].
#[derive(Debug, Default)]
pub struct MemoryBalanceStore {
    accounts: DashMap<CallerId, Account>,
    policy: ProvisioningPolicy,
}

impl MemoryBalanceStore {
    pub fn new(policy: ProvisioningPolicy) -> Self {
        Self {
            accounts: DashMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> ProvisioningPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// All accounts ordered by caller.
    pub fn snapshot(&self) -> Vec<(CallerId, Account)> {
        let mut accounts: Vec<_> = self
            .accounts
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        accounts.sort_by_key(|(caller_id, _)| *caller_id);
        accounts
    }
}

impl BalanceStore for MemoryBalanceStore {
    fn get(&self, caller_id: CallerId) -> Result<Account, StoreError> {
        // The entry API holds the shard lock, so provisioning happens once.
        let account = *self
            .accounts
            .entry(caller_id)
            .or_insert_with(|| self.policy.provision());
        Ok(account)
    }

    fn update(&self, caller_id: CallerId, account: Account) -> Result<(), StoreError> {
        account.assert_invariants();
        self.accounts.insert(caller_id, account);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_provisions_empty_account() {
        let store = MemoryBalanceStore::default();
        assert_eq!(store.get(CallerId(1)).unwrap(), Account::new(0, 0));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn provisioning_happens_once() {
        let store = MemoryBalanceStore::new(ProvisioningPolicy::demo_randomized());
        let first = store.get(CallerId(9)).unwrap();
        for _ in 0..20 {
            assert_eq!(store.get(CallerId(9)).unwrap(), first);
        }
    }

    #[test]
    fn randomized_policy_stays_in_range() {
        let policy = ProvisioningPolicy::demo_randomized();
        for _ in 0..200 {
            let account = policy.provision();
            assert!((0..30_000).contains(&account.balance));
            assert_eq!(account.balance % 100, 0);
            assert!((0..5).contains(&account.free_rounds));
        }
    }

    #[test]
    fn degenerate_randomized_policy_yields_zero() {
        let policy = ProvisioningPolicy::Randomized {
            balance_steps: 0,
            balance_step: 100,
            max_free_rounds: 0,
        };
        assert_eq!(policy.provision(), Account::new(0, 0));
    }

    #[test]
    fn fixed_policy_clamps_negative_seed() {
        assert_eq!(ProvisioningPolicy::fixed(-5, -1).provision(), Account::new(0, 0));
    }

    #[test]
    fn update_replaces_values() {
        let store = MemoryBalanceStore::new(ProvisioningPolicy::demo_fixed());
        assert_eq!(store.get(CallerId(1)).unwrap(), Account::new(35_000, 2));
        store.update(CallerId(1), Account::new(10, 0)).unwrap();
        assert_eq!(store.get(CallerId(1)).unwrap(), Account::new(10, 0));
    }

    #[test]
    fn snapshot_is_sorted_by_caller() {
        let store = MemoryBalanceStore::default();
        for id in [3, 1, 2] {
            store.get(CallerId(id)).unwrap();
        }
        let callers: Vec<_> = store.snapshot().into_iter().map(|(c, _)| c.0).collect();
        assert_eq!(callers, vec![1, 2, 3]);
    }
}
