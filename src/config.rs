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

//! Ledger runtime configuration.

use std::time::Duration;

/// Tunables for a [`Ledger`](crate::Ledger).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Upper bound on how long a transfer waits for each account lock.
    ///
    /// `None` blocks until the lock is free. Critical sections are O(1), so
    /// this only matters under extreme contention.
    pub lock_timeout: Option<Duration>,

    /// Number of background threads delivering notifications. At least one
    /// worker is always started.
    pub notification_workers: usize,

    /// How long dropping the ledger waits for queued notifications to be
    /// delivered before detaching the workers.
    pub notification_drain_timeout: Duration,
}

impl LedgerConfig {
    pub const DEFAULT_NOTIFICATION_WORKERS: usize = 2;
    pub const DEFAULT_NOTIFICATION_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    pub fn with_notification_workers(mut self, workers: usize) -> Self {
        self.notification_workers = workers;
        self
    }

    pub fn with_notification_drain_timeout(mut self, timeout: Duration) -> Self {
        self.notification_drain_timeout = timeout;
        self
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout: None,
            notification_workers: Self::DEFAULT_NOTIFICATION_WORKERS,
            notification_drain_timeout: Self::DEFAULT_NOTIFICATION_DRAIN_TIMEOUT,
        }
    }
}
