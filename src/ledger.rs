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

//! Transfer coordination.
//!
//! The [`Ledger`] is the central component: it owns the [`AccountStore`],
//! runs transfers between accounts and hands owner notifications to a
//! background [`Notifier`].
//!
//! # Transfer Processing
//!
//! 1. Validate the request (same account, amount), fail fast, no locks.
//! 2. Resolve the source, then the destination account.
//! 3. Lock both accounts in ascending id order.
//! 4. Debit the source, credit the destination, roll the debit back if the
//!    credit fails.
//! 5. Release both locks.
//! 6. Queue one notification per side.
//!
//! # Thread Safety
//!
//! Transfers over disjoint account pairs run fully in parallel. Transfers
//! sharing an account are serialized on that account's lock.

use crate::LedgerError;
use crate::account::{Account, AccountSnapshot};
use crate::base::AccountId;
use crate::config::LedgerConfig;
use crate::notification::{LoggingNotificationSink, NotificationSink, Notifier};
use crate::store::AccountStore;
use crate::transfer::{LockedPair, TransferReceipt, TransferRequest};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, info_span, warn};

/// In-memory ledger of accounts.
///
/// # Invariants
///
/// - No balance is ever observed below zero.
/// - Successful transfers conserve the sum of all balances.
/// - A failed transfer leaves every balance as it was.
#[derive(Debug)]
pub struct Ledger {
    accounts: AccountStore,
    notifier: Notifier,
    config: LedgerConfig,
}

impl Ledger {
    /// Creates a ledger with default configuration that logs notifications.
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default(), Arc::new(LoggingNotificationSink))
    }

    pub fn with_config(config: LedgerConfig, sink: Arc<dyn NotificationSink>) -> Self {
        Ledger {
            accounts: AccountStore::new(),
            notifier: Notifier::new(sink, config.notification_workers)
                .with_drain_timeout(config.notification_drain_timeout),
            config,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Direct access to the underlying store.
    pub fn store(&self) -> &AccountStore {
        &self.accounts
    }

    /// Registers a new account.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DuplicateAccount`] if the id is already taken.
    pub fn create_account(&self, account: Account) -> Result<(), LedgerError> {
        let created = self.accounts.create_account(account)?;
        info!(account_id = %created.id(), balance = %created.balance(), "account created");
        Ok(())
    }

    /// Looks up an account by id. Surrounding whitespace in `id` is ignored.
    pub fn get_account(&self, id: &str) -> Option<AccountSnapshot> {
        self.accounts
            .get_account(&AccountId::new(id))
            .map(|account| account.snapshot())
    }

    pub fn accounts(&self) -> Vec<AccountSnapshot> {
        self.accounts.accounts()
    }

    pub fn total_balance(&self) -> Decimal {
        self.accounts.total_balance()
    }

    /// Removes every account.
    pub fn reset(&self) {
        self.accounts.reset();
        info!("ledger reset");
    }

    /// Moves `request.amount` from one account to another.
    ///
    /// Blocks while either account is locked by another transfer, bounded by
    /// [`LedgerConfig::lock_timeout`] when set. Notifications are queued after
    /// both locks are released and never affect the result.
    ///
    /// # Errors
    ///
    /// Checked in this order:
    ///
    /// - [`LedgerError::InvalidAccount`] - source and destination are the same.
    /// - [`LedgerError::InvalidAmount`] - amount is zero or negative.
    /// - [`LedgerError::InvalidAccount`] - source, then destination, does not exist.
    /// - [`LedgerError::LockTimeout`] - an account lock was not acquired in time.
    /// - [`LedgerError::InsufficientFunds`] - source balance is below the amount.
    /// - [`LedgerError::BalanceOverflow`] - destination credit overflowed; the
    ///   debit has been rolled back.
    pub fn transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, LedgerError> {
        let span = info_span!(
            "transfer",
            from = %request.account_from_id,
            to = %request.account_to_id,
            amount = %request.amount
        );
        let _enter = span.enter();

        let result = self.execute(request);
        match &result {
            Ok(receipt) => {
                info!(
                    from_balance = %receipt.from_balance,
                    to_balance = %receipt.to_balance,
                    "transfer committed"
                );
                self.notify(receipt);
            }
            Err(e) => warn!(error = %e, "transfer rejected"),
        }
        result
    }

    fn execute(&self, request: &TransferRequest) -> Result<TransferReceipt, LedgerError> {
        request.validate()?;

        let source = self.resolve(&request.account_from_id)?;
        let destination = self.resolve(&request.account_to_id)?;

        let mut pair = LockedPair::acquire(&source, &destination, self.config.lock_timeout)?;
        pair.commit(request.amount)
    }

    fn resolve(&self, id: &AccountId) -> Result<Arc<Account>, LedgerError> {
        self.accounts
            .get_account(id)
            .ok_or_else(|| LedgerError::account_not_found(id))
    }

    fn notify(&self, receipt: &TransferReceipt) {
        self.notifier.dispatch(
            receipt.account_from_id.clone(),
            format!(
                "Your account debited with {} amount. Now available balance is {}.",
                receipt.amount, receipt.from_balance
            ),
        );
        self.notifier.dispatch(
            receipt.account_to_id.clone(),
            format!(
                "Your account credited with {} amount. Now available balance is {}.",
                receipt.amount, receipt.to_balance
            ),
        );
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}
