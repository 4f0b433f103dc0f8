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

//! Fire-and-forget account owner notifications.
//!
//! A [`Notifier`] owns a small pool of worker threads fed through an unbounded
//! [`crossbeam`] channel. [`Notifier::dispatch`] only enqueues, so the caller
//! never waits on delivery. Sink errors and panics are logged and dropped.

use crate::base::AccountId;
use crossbeam::channel::{self, Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// Delivery failure reported by a [`NotificationSink`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("notification delivery failed: {0}")]
pub struct NotificationError(pub String);

/// Destination for account owner notifications (email, push, ...).
pub trait NotificationSink: Send + Sync + 'static {
    fn notify(&self, account_id: &AccountId, message: &str) -> Result<(), NotificationError>;
}

/// Sink that writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotificationSink;

impl NotificationSink for LoggingNotificationSink {
    fn notify(&self, account_id: &AccountId, message: &str) -> Result<(), NotificationError> {
        info!(
            target: "notifications",
            "Sending notification to owner of {}: {}",
            account_id,
            message
        );
        Ok(())
    }
}

#[derive(Debug)]
struct Notification {
    account_id: AccountId,
    message: String,
}

/// Background dispatcher in front of a [`NotificationSink`].
///
/// Dropping the notifier closes the channel and waits up to the drain timeout
/// for the workers to deliver what was already queued. Workers still busy after
/// that, for example inside a hung sink, are detached and their remaining
/// notifications are lost.
pub struct Notifier {
    sender: Option<Sender<Notification>>,
    workers: Vec<JoinHandle<()>>,
    drain_timeout: Duration,
}

impl Notifier {
    pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(sink: Arc<dyn NotificationSink>, workers: usize) -> Self {
        let (sender, receiver) = channel::unbounded();
        let workers = (0..workers.max(1))
            .filter_map(|n| {
                let receiver = receiver.clone();
                let sink = Arc::clone(&sink);
                thread::Builder::new()
                    .name(format!("ledger-notifier-{n}"))
                    .spawn(move || run_worker(receiver, sink))
                    .map_err(|e| warn!(error = %e, "failed to start notification worker"))
                    .ok()
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
            drain_timeout: Self::DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Sets how long dropping the notifier waits for queued deliveries.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Queues a notification and returns immediately.
    pub fn dispatch(&self, account_id: AccountId, message: String) {
        let Some(sender) = &self.sender else {
            return;
        };
        if let Err(e) = sender.send(Notification {
            account_id,
            message,
        }) {
            let dropped = e.into_inner();
            warn!(
                account_id = %dropped.account_id,
                "notification channel closed, dropping notification"
            );
        }
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        // Closing the channel ends each worker loop once the queue is empty.
        self.sender.take();
        let deadline = Instant::now() + self.drain_timeout;
        for worker in self.workers.drain(..) {
            while !worker.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            if !worker.is_finished() {
                warn!(
                    timeout_ms = self.drain_timeout.as_millis() as u64,
                    "notification worker still busy after drain timeout, detaching"
                );
                continue;
            }
            if worker.join().is_err() {
                warn!("notification worker terminated abnormally");
            }
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("workers", &self.workers.len())
            .field("drain_timeout", &self.drain_timeout)
            .finish()
    }
}

fn run_worker(receiver: Receiver<Notification>, sink: Arc<dyn NotificationSink>) {
    for notification in receiver {
        let delivery = panic::catch_unwind(AssertUnwindSafe(|| {
            sink.notify(&notification.account_id, &notification.message)
        }));
        match delivery {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(account_id = %notification.account_id, error = %e, "notification dropped");
            }
            Err(_) => {
                warn!(account_id = %notification.account_id, "notification sink panicked");
            }
        }
    }
}
