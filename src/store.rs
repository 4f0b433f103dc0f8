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

//! Thread-safe account store.
//!
//! Accounts live in a [`DashMap`] keyed by [`AccountId`]. The map only guards
//! membership; each balance sits behind its own mutex inside [`Account`], so a
//! shard lock is never held while a balance is being changed.

use crate::LedgerError;
use crate::account::{Account, AccountSnapshot};
use crate::base::AccountId;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct AccountStore {
    accounts: DashMap<AccountId, Arc<Account>>,
}

impl AccountStore {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
        }
    }

    /// Inserts an account if its id is not taken yet.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DuplicateAccount`] if an account with the same id
    /// already exists. Two racing creates for one id never both succeed.
    pub fn create_account(&self, account: Account) -> Result<Arc<Account>, LedgerError> {
        // Entry API keeps check-and-insert atomic under the shard lock
        match self.accounts.entry(account.id().clone()) {
            Entry::Occupied(entry) => Err(LedgerError::DuplicateAccount(entry.key().clone())),
            Entry::Vacant(entry) => {
                let account = Arc::new(account);
                entry.insert(Arc::clone(&account));
                Ok(account)
            }
        }
    }

    pub fn get_account(&self, id: &AccountId) -> Option<Arc<Account>> {
        self.accounts.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Atomically replaces the balance of `id` with `f(balance)`.
    ///
    /// Serialized with every other mutation of the same account, including
    /// in-flight transfers.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAccount`] - no such account.
    /// - [`LedgerError::InsufficientFunds`] - `f` produced a negative balance.
    /// - Any error returned by `f`.
    pub fn mutate<F>(&self, id: &AccountId, f: F) -> Result<Decimal, LedgerError>
    where
        F: FnOnce(Decimal) -> Result<Decimal, LedgerError>,
    {
        let account = self
            .get_account(id)
            .ok_or_else(|| LedgerError::account_not_found(id))?;
        let mut data = account.lock();
        data.apply(f)
    }

    /// Removes every account.
    pub fn reset(&self) {
        self.accounts.clear();
    }

    /// Snapshots of all accounts, sorted by id.
    pub fn accounts(&self) -> Vec<AccountSnapshot> {
        let mut snapshots: Vec<AccountSnapshot> = self
            .accounts
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        snapshots
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Sum of all balances.
    ///
    /// Each balance is read under its own lock, so the sum is only a consistent
    /// snapshot when no transfer is in flight.
    pub fn total_balance(&self) -> Decimal {
        self.accounts
            .iter()
            .map(|entry| entry.value().balance())
            .sum()
    }
}
