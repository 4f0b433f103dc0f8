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

//! Account management.
//!
//! An [`Account`] owns its balance behind a [`parking_lot::Mutex`]. Every
//! balance change goes through [`AccountData::apply`], which rejects any result
//! below zero, so a balance can never be observed negative.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use ledger_transfer_rs::Account;
//!
//! let account = Account::new("Id-123", dec!(1000)).unwrap();
//! assert_eq!(account.balance(), dec!(1000));
//! ```

use crate::LedgerError;
use crate::base::AccountId;
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug)]
pub(crate) struct AccountData {
    id: AccountId,
    balance: Decimal,
}

impl AccountData {
    fn assert_invariants(&self) {
        debug_assert!(
            self.balance >= Decimal::ZERO,
            "Invariant violated: balance of {} went negative: {}",
            self.id,
            self.balance
        );
    }

    pub(crate) fn id(&self) -> &AccountId {
        &self.id
    }

    pub(crate) fn balance(&self) -> Decimal {
        self.balance
    }

    /// Replaces the balance with `f(balance)`.
    ///
    /// The balance is left untouched if `f` fails or yields a negative value.
    pub(crate) fn apply<F>(&mut self, f: F) -> Result<Decimal, LedgerError>
    where
        F: FnOnce(Decimal) -> Result<Decimal, LedgerError>,
    {
        let next = f(self.balance)?;
        if next < Decimal::ZERO {
            return Err(LedgerError::InsufficientFunds(self.id.clone()));
        }
        self.balance = next;
        self.assert_invariants();
        Ok(next)
    }

    /// Decreases the balance. Check and subtraction are one step.
    pub(crate) fn debit(&mut self, amount: Decimal) -> Result<Decimal, LedgerError> {
        if amount > self.balance {
            return Err(LedgerError::InsufficientFunds(self.id.clone()));
        }
        let next = self.exact_add(-amount)?;
        self.apply(|_| Ok(next))
    }

    /// Increases the balance.
    pub(crate) fn credit(&mut self, amount: Decimal) -> Result<Decimal, LedgerError> {
        let next = self.exact_add(amount)?;
        self.apply(|_| Ok(next))
    }

    /// `balance + delta`, refusing any result `Decimal` would have to round.
    ///
    /// Near 28 significant digits `Decimal` addition rounds instead of
    /// failing. A sum is exact only if subtracting either operand gives back
    /// the other one.
    fn exact_add(&self, delta: Decimal) -> Result<Decimal, LedgerError> {
        let next = self
            .balance
            .checked_add(delta)
            .ok_or_else(|| LedgerError::BalanceOverflow(self.id.clone()))?;
        let exact = next.checked_sub(delta) == Some(self.balance)
            && next.checked_sub(self.balance) == Some(delta);
        if !exact {
            return Err(LedgerError::PrecisionLoss(self.id.clone()));
        }
        Ok(next)
    }
}

/// Ledger account.
#[derive(Debug)]
pub struct Account {
    id: AccountId,
    inner: Mutex<AccountData>,
}

impl Account {
    /// Creates an account with an opening balance.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAccount`] - id is blank after trimming.
    /// - [`LedgerError::NegativeBalance`] - opening balance is below zero.
    pub fn new(id: impl Into<AccountId>, balance: Decimal) -> Result<Self, LedgerError> {
        let id = id.into();
        if id.is_empty() {
            return Err(LedgerError::blank_account_id());
        }
        if balance < Decimal::ZERO {
            return Err(LedgerError::NegativeBalance(balance));
        }
        Ok(Self {
            inner: Mutex::new(AccountData {
                id: id.clone(),
                balance,
            }),
            id,
        })
    }

    /// Immutable, so readable without taking the lock.
    pub fn id(&self) -> &AccountId {
        &self.id
    }

    pub fn balance(&self) -> Decimal {
        self.inner.lock().balance
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            account_id: self.id.clone(),
            balance: self.balance(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, AccountData> {
        self.inner.lock()
    }

    pub(crate) fn try_lock_for(&self, timeout: Duration) -> Option<MutexGuard<'_, AccountData>> {
        self.inner.try_lock_for(timeout)
    }
}

/// Point-in-time view of an account, as exposed over the API and in CSV output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    pub account_id: AccountId,
    pub balance: Decimal,
}
