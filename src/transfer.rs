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

//! Transfer requests and the two-account critical section.
//!
//! A transfer runs through these states:
//!
//! ```text
//! Validating ─► Locking ─► Debiting ─► Crediting ─┬─► Committed ─► Notifying ─► Done
//!     │            │           │                  └─► RolledBack ─────────────► Done
//!     └────────────┴───────────┴─────────────────────────────────────────────► Done (error)
//! ```
//!
//! [`LockedPair`] covers `Locking` through `Committed`/`RolledBack`. Locks are
//! always taken in ascending [`AccountId`] order, whichever side is the source,
//! so two transfers over the same pair can never wait on each other in a cycle.

use crate::LedgerError;
use crate::account::{Account, AccountData};
use crate::base::AccountId;
use parking_lot::MutexGuard;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

/// Request to move `amount` from one account to another.
///
/// `amount` deserializes from a JSON string or an exact JSON number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub account_from_id: AccountId,
    pub account_to_id: AccountId,
    #[serde(deserialize_with = "rust_decimal::serde::arbitrary_precision::deserialize")]
    pub amount: Decimal,
}

impl TransferRequest {
    pub fn new(from: impl Into<AccountId>, to: impl Into<AccountId>, amount: Decimal) -> Self {
        Self {
            account_from_id: from.into(),
            account_to_id: to.into(),
            amount,
        }
    }

    /// Checks the request shape. Never touches account state.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAccount`] - source and destination are the same.
    /// - [`LedgerError::InvalidAmount`] - amount is zero or negative.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.account_from_id == self.account_to_id {
            return Err(LedgerError::same_account());
        }
        if self.amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(self.amount));
        }
        Ok(())
    }
}

/// Outcome of a committed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    pub account_from_id: AccountId,
    pub account_to_id: AccountId,
    pub amount: Decimal,
    /// Source balance right after the debit.
    pub from_balance: Decimal,
    /// Destination balance right after the credit.
    pub to_balance: Decimal,
}

/// Both accounts of a transfer, locked.
///
/// Dropping the pair releases both locks. Release order does not matter, only
/// acquisition order does.
pub(crate) struct LockedPair<'a> {
    source: MutexGuard<'a, AccountData>,
    destination: MutexGuard<'a, AccountData>,
}

impl<'a> LockedPair<'a> {
    /// Locks `source` and `destination` in ascending id order.
    ///
    /// With a `timeout`, each lock is waited on for at most that long; a lock
    /// already taken is released again on failure.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::LockTimeout`] naming the account that could not
    /// be locked in time.
    pub(crate) fn acquire(
        source: &'a Account,
        destination: &'a Account,
        timeout: Option<Duration>,
    ) -> Result<Self, LedgerError> {
        debug_assert_ne!(source.id(), destination.id());

        let source_first = source.id() < destination.id();
        let (first, second) = if source_first {
            (source, destination)
        } else {
            (destination, source)
        };

        let first_guard = lock(first, timeout)?;
        debug!(account_id = %first.id(), "acquired first lock");
        let second_guard = lock(second, timeout)?;
        debug!(account_id = %second.id(), "acquired second lock");

        let (source, destination) = if source_first {
            (first_guard, second_guard)
        } else {
            (second_guard, first_guard)
        };
        Ok(Self {
            source,
            destination,
        })
    }

    /// Debits the source and credits the destination.
    ///
    /// If the credit fails the debit is undone before returning, still under
    /// both locks, so no caller ever sees a half-applied transfer.
    pub(crate) fn commit(&mut self, amount: Decimal) -> Result<TransferReceipt, LedgerError> {
        let from_balance = self.source.debit(amount)?;

        match self.destination.credit(amount) {
            Ok(to_balance) => Ok(TransferReceipt {
                account_from_id: self.source.id().clone(),
                account_to_id: self.destination.id().clone(),
                amount,
                from_balance,
                to_balance,
            }),
            Err(credit_error) => {
                self.roll_back(amount, &credit_error);
                Err(credit_error)
            }
        }
    }

    fn roll_back(&mut self, amount: Decimal, cause: &LedgerError) {
        match self.source.credit(amount) {
            Ok(restored) => error!(
                account_id = %self.source.id(),
                %amount,
                %restored,
                error = %cause,
                "credit failed, debit rolled back"
            ),
            // Unreachable: the source held this amount a moment ago.
            Err(rollback_error) => error!(
                account_id = %self.source.id(),
                %amount,
                error = %cause,
                rollback_error = %rollback_error,
                "credit failed and debit could not be rolled back"
            ),
        }
    }
}

fn lock(
    account: &Account,
    timeout: Option<Duration>,
) -> Result<MutexGuard<'_, AccountData>, LedgerError> {
    match timeout {
        None => Ok(account.lock()),
        Some(timeout) => account
            .try_lock_for(timeout)
            .ok_or_else(|| LedgerError::LockTimeout(account.id().clone())),
    }
}
