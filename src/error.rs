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

//! Error types for account management and transfers.

use crate::base::AccountId;
use rust_decimal::Decimal;
use thiserror::Error;

/// Ledger errors.
///
/// Every variant except [`LedgerError::BalanceOverflow`] and
/// [`LedgerError::LockTimeout`] describes a condition the caller can fix by
/// changing the request. None of them leave a partial balance change behind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Account id is already taken
    #[error("Account id {0} already exists!")]
    DuplicateAccount(AccountId),

    /// Referenced account is missing, blank, or both sides name the same account
    #[error("{0}")]
    InvalidAccount(String),

    /// Transfer amount is zero or negative
    #[error("{0} not a valid amount to transfer.")]
    InvalidAmount(Decimal),

    /// Source balance is below the requested amount
    #[error("{0} account does not have sufficient balance.")]
    InsufficientFunds(AccountId),

    /// Account created with a balance below zero
    #[error("{0} not a valid initial balance.")]
    NegativeBalance(Decimal),

    /// Credit would exceed the representable decimal range
    #[error("{0} account balance would overflow.")]
    BalanceOverflow(AccountId),

    /// Result needs more significant digits than a decimal can hold exactly
    #[error("{0} account balance cannot represent the result exactly.")]
    PrecisionLoss(AccountId),

    /// Bounded lock wait elapsed before the account could be locked
    #[error("timed out waiting for a lock on account {0}")]
    LockTimeout(AccountId),
}

impl LedgerError {
    pub(crate) fn same_account() -> Self {
        LedgerError::InvalidAccount("From and To accounts are same.".to_string())
    }

    pub(crate) fn account_not_found(id: &AccountId) -> Self {
        LedgerError::InvalidAccount(format!("{id} account does not exist"))
    }

    pub(crate) fn blank_account_id() -> Self {
        LedgerError::InvalidAccount("Account id must not be empty.".to_string())
    }
}
