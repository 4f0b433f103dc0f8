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

//! # Ledger Transfer
//!
//! This library provides an in-memory account ledger that moves funds between
//! accounts atomically under concurrent access.
//!
//! ## Core Components
//!
//! - [`Ledger`]: Transfer coordinator owning all accounts
//! - [`AccountStore`]: Concurrent account map with atomic create and update
//! - [`Account`]: Account with a lock-protected, never-negative balance
//! - [`Notifier`]: Background delivery of owner notifications
//! - [`LedgerError`]: Error types for account and transfer failures
//!
//! ## Example
//!
//! ```
//! use ledger_transfer_rs::{Account, Ledger, TransferRequest};
//! use rust_decimal_macros::dec;
//!
//! let ledger = Ledger::new();
//! ledger.create_account(Account::new("Id-101", dec!(525.45)).unwrap()).unwrap();
//! ledger.create_account(Account::new("Id-102", dec!(223.30)).unwrap()).unwrap();
//!
//! let request = TransferRequest::new("Id-101", "Id-102", dec!(125.45));
//! let receipt = ledger.transfer(&request).unwrap();
//! assert_eq!(receipt.from_balance, dec!(400.00));
//!
//! let account = ledger.get_account("Id-102").unwrap();
//! assert_eq!(account.balance, dec!(348.75));
//! ```
//!
//! ## Thread Safety
//!
//! Every account has its own lock. A transfer locks its two accounts in
//! ascending id order, so concurrent transfers never deadlock, and transfers
//! over disjoint accounts proceed in parallel.

pub mod account;
mod base;
pub mod config;
pub mod error;
mod ledger;
pub mod notification;
pub mod server;
mod store;
mod transfer;

pub use account::{Account, AccountSnapshot};
pub use base::AccountId;
pub use config::LedgerConfig;
pub use error::LedgerError;
pub use ledger::Ledger;
pub use notification::{LoggingNotificationSink, NotificationError, NotificationSink, Notifier};
pub use store::AccountStore;
pub use transfer::{TransferReceipt, TransferRequest};
