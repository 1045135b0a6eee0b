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

//! Wallet engine.
//!
//! The [`Engine`] serves the three seamless-wallet operations against an
//! injected [`BalanceStore`] and [`TransactionLedger`]:
//!
//! - **GetBalance**: reads (and lazily provisions) a caller's account.
//! - **WithdrawAndDeposit**: applies one game round exactly once per
//!   transaction reference, consuming free rounds before touching the balance.
//! - **RollbackTransaction**: reverses a committed round, or leaves a
//!   rolled-back marker when the round was never seen.
//!
//! # Thread Safety
//!
//! Every read-modify-write of an account runs under a per-caller
//! [`parking_lot::Mutex`] held from the ledger insert until the ledger record is
//! settled. Unrelated callers never contend. The ledger insert itself is atomic
//! in the store, independent of these locks.

use crate::account::{Account, BalanceStore, MemoryBalanceStore, ProvisioningPolicy};
use crate::base::{Amount, CallerId, GeneratedTransactionId, TransactionRef};
use crate::error::WalletError;
use crate::ledger::{Insertion, MemoryLedger, TransactionLedger};
use crate::transaction::{Settlement, TransactionRecord};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// A single game-round debit/credit request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawAndDeposit {
    pub caller_id: CallerId,
    pub transaction_ref: TransactionRef,
    pub withdraw: Amount,
    pub deposit: Amount,
    pub charge_freerounds: i64,
}

impl WithdrawAndDeposit {
    pub fn new(
        caller_id: CallerId,
        transaction_ref: impl Into<TransactionRef>,
        withdraw: Amount,
        deposit: Amount,
    ) -> Self {
        Self {
            caller_id,
            transaction_ref: transaction_ref.into(),
            withdraw,
            deposit,
            charge_freerounds: 0,
        }
    }

    pub fn with_free_rounds(mut self, charge_freerounds: i64) -> Self {
        self.charge_freerounds = charge_freerounds;
        self
    }
}

/// Result of a successful [`Engine::withdraw_and_deposit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub new_balance: Amount,
    pub free_rounds_left: i64,
    pub transaction_id: GeneratedTransactionId,
}

/// Account state and ledger outcome computed for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AppliedRound {
    account: Account,
    settlement: Settlement,
}

/// Computes the effect of `request` on `account` without touching any store.
fn apply_round(account: Account, request: &WithdrawAndDeposit) -> Result<AppliedRound, WalletError> {
    let WithdrawAndDeposit {
        withdraw,
        deposit,
        charge_freerounds,
        ..
    } = *request;

    if deposit < 0 {
        return Err(WalletError::NegativeDeposit);
    }
    if withdraw < 0 {
        return Err(WalletError::NegativeWithdrawal);
    }

    // A free round absorbs the whole withdrawal; it never covers part of it.
    if withdraw > 0 && charge_freerounds > 0 && account.free_rounds >= charge_freerounds {
        let balance = account
            .balance
            .checked_add(deposit)
            .ok_or(WalletError::AmountOverflow)?;
        return Ok(AppliedRound {
            account: Account::new(balance, (account.free_rounds - charge_freerounds).max(0)),
            settlement: Settlement::Committed {
                withdraw: 0,
                deposit,
                charge_freerounds,
            },
        });
    }

    if account.balance < withdraw {
        return Err(WalletError::InsufficientFunds);
    }
    let balance = (account.balance - withdraw)
        .checked_add(deposit)
        .ok_or(WalletError::AmountOverflow)?;

    Ok(AppliedRound {
        account: Account::new(balance, account.free_rounds),
        settlement: Settlement::Committed {
            withdraw,
            deposit,
            charge_freerounds: 0,
        },
    })
}

/// Computes the account state after reversing a committed record.
fn reverse_round(account: Account, record: &TransactionRecord) -> Result<Account, WalletError> {
    let balance = account
        .balance
        .checked_add(record.withdraw)
        .and_then(|balance| balance.checked_sub(record.deposit))
        .ok_or(WalletError::AmountOverflow)?;
    let free_rounds = account
        .free_rounds
        .checked_add(record.charge_freerounds)
        .ok_or(WalletError::AmountOverflow)?;

    if balance < 0 {
        warn!(
            caller = %record.caller_id,
            transaction = %record.transaction_ref,
            shortfall = -balance,
            "rollback exceeds balance, flooring at zero"
        );
    }

    Ok(Account::new(balance.max(0), free_rounds))
}

/// Seamless wallet engine.
///
/// # Invariants
///
/// - A transaction reference is applied at most once; later requests with the
///   same reference fail with [`WalletError::DuplicateTransaction`].
/// - Stored balances and free-round counts are never negative.
/// - A rollback reverses exactly the effects recorded in the ledger, once.
pub struct Engine<B = MemoryBalanceStore, L = MemoryLedger> {
    balances: B,
    ledger: L,
    /// Per-caller critical sections.
    locks: DashMap<CallerId, Arc<Mutex<()>>>,
}

impl Engine {
    /// Creates an in-memory engine whose new accounts start empty.
    pub fn new() -> Self {
        Self::with_policy(ProvisioningPolicy::default())
    }

    /// Creates an in-memory engine provisioning new accounts with `policy`.
    pub fn with_policy(policy: ProvisioningPolicy) -> Self {
        Self::with_stores(MemoryBalanceStore::new(policy), MemoryLedger::new())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: BalanceStore, L: TransactionLedger> Engine<B, L> {
    pub fn with_stores(balances: B, ledger: L) -> Self {
        Self {
            balances,
            ledger,
            locks: DashMap::new(),
        }
    }

    pub fn balances(&self) -> &B {
        &self.balances
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Runs `f` inside the caller's critical section.
    fn locked<T>(&self, caller_id: CallerId, f: impl FnOnce() -> T) -> T {
        // Clone out of the map so the shard lock is released before we block.
        let lock = Arc::clone(&self.locks.entry(caller_id).or_default());
        let result = {
            let _guard = lock.lock();
            f()
        };
        drop(lock);

        // Clones are only taken under the shard lock, so a count of one means no
        // request holds or waits on this entry.
        self.locks
            .remove_if(&caller_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    /// Returns the caller's balance and free rounds, provisioning unseen callers.
    pub fn get_balance(&self, caller_id: CallerId) -> Result<Account, WalletError> {
        Ok(self.locked(caller_id, || self.balances.get(caller_id))?)
    }

    /// Returns the ledger record for `transaction_ref`, if any.
    pub fn transaction(
        &self,
        transaction_ref: &TransactionRef,
    ) -> Result<Option<TransactionRecord>, WalletError> {
        Ok(self.ledger.lookup(transaction_ref)?)
    }

    /// Applies one game round.
    ///
    /// The ledger entry for the reference is written before anything else, so
    /// a rejected request still consumes its reference.
    ///
    /// # Errors
    ///
    /// - [`WalletError::DuplicateTransaction`] - Reference already in the ledger.
    /// - [`WalletError::NegativeDeposit`] / [`WalletError::NegativeWithdrawal`] - Negative amount.
    /// - [`WalletError::InsufficientFunds`] - Withdrawal exceeds the balance; the balance is left untouched.
    /// - [`WalletError::Store`] - Persistence failed; no balance change survives.
    pub fn withdraw_and_deposit(&self, request: WithdrawAndDeposit) -> Result<Receipt, WalletError> {
        self.locked(request.caller_id, || self.apply_locked(&request))
    }

    /// Body of [`Engine::withdraw_and_deposit`]. Caller holds the account lock.
    fn apply_locked(&self, request: &WithdrawAndDeposit) -> Result<Receipt, WalletError> {
        let caller_id = request.caller_id;
        let transaction_ref = &request.transaction_ref;

        let pending = TransactionRecord::pending(
            transaction_ref.clone(),
            caller_id,
            request.withdraw,
            request.deposit,
            request.charge_freerounds,
        );
        if let Insertion::Existing(existing) = self.ledger.create_if_absent(pending)? {
            debug!(
                caller = %caller_id,
                transaction = %transaction_ref,
                rolled_back = existing.rolled_back,
                "duplicate transaction reference"
            );
            return Err(WalletError::DuplicateTransaction);
        }

        let previous = match self.balances.get(caller_id) {
            Ok(account) => account,
            Err(err) => {
                let err = WalletError::from(err);
                self.reject(transaction_ref, &err);
                return Err(err);
            }
        };
        let AppliedRound {
            account,
            settlement,
        } = match apply_round(previous, request) {
            Ok(applied) => applied,
            Err(err) => {
                self.reject(transaction_ref, &err);
                return Err(err);
            }
        };

        if let Err(err) = self.balances.update(caller_id, account) {
            let err = WalletError::from(err);
            self.reject(transaction_ref, &err);
            return Err(err);
        }

        if let Err(err) = self.ledger.settle(transaction_ref, settlement) {
            // The record stays pending, which carries no effect; undo the balance write.
            if let Err(restore) = self.balances.update(caller_id, previous) {
                error!(
                    caller = %caller_id,
                    transaction = %transaction_ref,
                    error = %restore,
                    "failed to restore account after ledger write failure"
                );
            }
            return Err(err.into());
        }

        debug!(
            caller = %caller_id,
            transaction = %transaction_ref,
            balance = account.balance,
            free_rounds = account.free_rounds,
            "round applied"
        );

        Ok(Receipt {
            new_balance: account.balance,
            free_rounds_left: account.free_rounds,
            transaction_id: GeneratedTransactionId::generate(),
        })
    }

    /// Tombstones a pending record after a failed round.
    fn reject(&self, transaction_ref: &TransactionRef, cause: &WalletError) {
        debug!(transaction = %transaction_ref, error = %cause, "round rejected");
        if let Err(err) = self.ledger.settle(transaction_ref, Settlement::Rejected) {
            warn!(
                transaction = %transaction_ref,
                error = %err,
                "failed to persist rejection, record left pending"
            );
        }
    }

    /// Rolls back the round identified by `transaction_ref`.
    ///
    /// Unknown references are recorded as already rolled back so that a
    /// delayed [`Engine::withdraw_and_deposit`] for them is refused.
    ///
    /// # Errors
    ///
    /// - [`WalletError::AlreadyRolledBack`] - The reference was rolled back before.
    /// - [`WalletError::Store`] - Persistence failed; the balance is unchanged.
    pub fn rollback_transaction(
        &self,
        caller_id: CallerId,
        transaction_ref: &TransactionRef,
    ) -> Result<(), WalletError> {
        loop {
            // Lock the account that owns the record, or the requester's if none exists yet.
            let owner = self
                .ledger
                .lookup(transaction_ref)?
                .map_or(caller_id, |record| record.caller_id);
            if self.locked(owner, || self.rollback_locked(owner, caller_id, transaction_ref))? {
                return Ok(());
            }
        }
    }

    /// One rollback attempt under `owner`'s lock. Returns `false` when the
    /// record moved to another account or a round claimed the reference first.
    fn rollback_locked(
        &self,
        owner: CallerId,
        caller_id: CallerId,
        transaction_ref: &TransactionRef,
    ) -> Result<bool, WalletError> {
        match self.ledger.lookup(transaction_ref)? {
            None => {
                let marker = TransactionRecord::rolled_back_marker(transaction_ref.clone(), caller_id);
                if self.ledger.create_if_absent(marker)? == Insertion::Inserted {
                    debug!(
                        caller = %caller_id,
                        transaction = %transaction_ref,
                        "rollback of unknown transaction recorded"
                    );
                    return Ok(true);
                }
                // Lost the race to a round with this reference.
                Ok(false)
            }
            Some(record) if record.caller_id != owner => Ok(false),
            Some(record) => self.reverse(caller_id, record).map(|()| true),
        }
    }

    /// Reverses `record` on its owning account. Caller holds the owner's lock.
    fn reverse(&self, requested_by: CallerId, record: TransactionRecord) -> Result<(), WalletError> {
        let owner = record.caller_id;
        let transaction_ref = &record.transaction_ref;

        if record.rolled_back {
            return Err(WalletError::AlreadyRolledBack);
        }
        if requested_by != owner {
            warn!(
                caller = %requested_by,
                owner = %owner,
                transaction = %transaction_ref,
                "rollback requested by a caller that does not own the transaction"
            );
        }

        if !record.is_reversible() {
            // Pending or rejected: nothing was applied.
            return if self.ledger.mark_rolled_back(transaction_ref)? {
                Ok(())
            } else {
                Err(WalletError::AlreadyRolledBack)
            };
        }

        let previous = self.balances.get(owner)?;
        let reversed = reverse_round(previous, &record)?;
        self.balances.update(owner, reversed)?;

        let outcome = match self.ledger.mark_rolled_back(transaction_ref) {
            Ok(true) => {
                debug!(
                    caller = %owner,
                    transaction = %transaction_ref,
                    balance = reversed.balance,
                    free_rounds = reversed.free_rounds,
                    "round rolled back"
                );
                return Ok(());
            }
            Ok(false) => WalletError::AlreadyRolledBack,
            Err(err) => err.into(),
        };

        if let Err(restore) = self.balances.update(owner, previous) {
            error!(
                caller = %owner,
                transaction = %transaction_ref,
                error = %restore,
                "failed to restore account after rollback failure"
            );
        }
        Err(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(withdraw: Amount, deposit: Amount, charge: i64) -> WithdrawAndDeposit {
        WithdrawAndDeposit::new(CallerId(1), "r", withdraw, deposit).with_free_rounds(charge)
    }

    #[test]
    fn free_round_absorbs_withdrawal() {
        let applied = apply_round(Account::new(500, 2), &request(100, 50, 1)).unwrap();
        assert_eq!(applied.account, Account::new(550, 1));
        assert_eq!(
            applied.settlement,
            Settlement::Committed {
                withdraw: 0,
                deposit: 50,
                charge_freerounds: 1
            }
        );
    }

    #[test]
    fn free_round_needs_a_withdrawal() {
        let applied = apply_round(Account::new(500, 2), &request(0, 50, 1)).unwrap();
        assert_eq!(applied.account, Account::new(550, 2));
    }

    #[test]
    fn too_few_free_rounds_falls_back_to_balance() {
        let applied = apply_round(Account::new(500, 1), &request(100, 0, 2)).unwrap();
        assert_eq!(applied.account, Account::new(400, 1));
        assert_eq!(
            applied.settlement,
            Settlement::Committed {
                withdraw: 100,
                deposit: 0,
                charge_freerounds: 0
            }
        );
    }

    #[test]
    fn deposit_checked_before_withdrawal() {
        assert_eq!(
            apply_round(Account::new(500, 0), &request(-1, -1, 0)),
            Err(WalletError::NegativeDeposit)
        );
        assert_eq!(
            apply_round(Account::new(500, 0), &request(-1, 0, 0)),
            Err(WalletError::NegativeWithdrawal)
        );
    }

    #[test]
    fn withdrawal_equal_to_balance_is_allowed() {
        let applied = apply_round(Account::new(100, 0), &request(100, 0, 0)).unwrap();
        assert_eq!(applied.account.balance, 0);
    }

    #[test]
    fn deposit_overflow_is_reported() {
        assert_eq!(
            apply_round(Account::new(i64::MAX, 0), &request(0, 1, 0)),
            Err(WalletError::AmountOverflow)
        );
    }

    #[test]
    fn reversal_floors_at_zero() {
        let mut record =
            TransactionRecord::pending(TransactionRef::from("r"), CallerId(1), 10, 100, 0);
        record.apply(Settlement::Committed {
            withdraw: 10,
            deposit: 100,
            charge_freerounds: 0,
        });
        assert_eq!(reverse_round(Account::new(40, 0), &record).unwrap(), Account::new(0, 0));
    }

    #[test]
    fn reversal_restores_free_rounds() {
        let mut record =
            TransactionRecord::pending(TransactionRef::from("r"), CallerId(1), 100, 50, 1);
        record.apply(Settlement::Committed {
            withdraw: 0,
            deposit: 50,
            charge_freerounds: 1,
        });
        assert_eq!(reverse_round(Account::new(550, 1), &record).unwrap(), Account::new(500, 2));
    }

    #[test]
    fn idle_account_locks_are_released() {
        let engine = Engine::with_policy(ProvisioningPolicy::fixed(1_000, 0));
        engine
            .withdraw_and_deposit(WithdrawAndDeposit::new(CallerId(1), "a", 10, 0))
            .unwrap();
        engine.get_balance(CallerId(2)).unwrap();
        // Requester differs from the owner; neither keeps an entry.
        engine.rollback_transaction(CallerId(3), &TransactionRef::from("a")).unwrap();
        engine.rollback_transaction(CallerId(4), &TransactionRef::from("unseen")).unwrap();

        assert!(engine.locks.is_empty());
        assert_eq!(engine.get_balance(CallerId(1)).unwrap().balance, 1_000);
    }
}
