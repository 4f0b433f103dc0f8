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

//! Deadlock detection tests using parking_lot's built-in deadlock detector.
//!
//! The `deadlock_detection` feature is enabled for dev builds, so the account
//! mutexes inside the ledger itself are tracked. Any cycle in the lock graph
//! fails the test.

use ledger_transfer_rs::{Account, AccountId, Ledger, TransferRequest};
use parking_lot::deadlock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

// === Deadlock Detection Infrastructure ===

/// Starts a background thread that checks for deadlocks.
/// Returns a handle to stop the detector.
fn start_deadlock_detector() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();

    thread::spawn(move || {
        while running_clone.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(100));
            let deadlocks = deadlock::check_deadlock();
            if !deadlocks.is_empty() {
                eprintln!("\n=== DEADLOCK DETECTED ===");
                for (i, threads) in deadlocks.iter().enumerate() {
                    eprintln!("\nDeadlock #{}", i + 1);
                    for t in threads {
                        eprintln!("Thread ID: {:?}", t.thread_id());
                        eprintln!("Backtrace:\n{:#?}", t.backtrace());
                    }
                }
                // A panic here would only kill the detector; abort so the
                // deadlocked test process does not hang forever.
                std::process::abort();
            }
        }
    });

    running
}

/// Stops the deadlock detector.
fn stop_deadlock_detector(running: Arc<AtomicBool>) {
    running.store(false, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(150)); // Let detector thread exit
}

fn ledger_with(n: usize, balance: Decimal) -> Arc<Ledger> {
    let ledger = Ledger::new();
    for i in 0..n {
        ledger
            .create_account(Account::new(account_name(i), balance).unwrap())
            .unwrap();
    }
    Arc::new(ledger)
}

fn account_name(i: usize) -> String {
    format!("Id-{i:03}")
}

// === Tests ===

/// Many threads transfer back and forth over one pair in both directions.
#[test]
fn no_deadlock_reversed_pairs() {
    let detector = start_deadlock_detector();
    let ledger = ledger_with(2, dec!(1000.00));
    let barrier = Arc::new(Barrier::new(NUM_THREADS));

    const NUM_THREADS: usize = 32;
    const OPS_PER_THREAD: usize = 500;

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|t| {
            let ledger = ledger.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let (from, to) = if t % 2 == 0 {
                    (account_name(0), account_name(1))
                } else {
                    (account_name(1), account_name(0))
                };
                let request = TransferRequest::new(from, to, dec!(1.25));
                barrier.wait();
                for _ in 0..OPS_PER_THREAD {
                    let _ = ledger.transfer(&request);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    stop_deadlock_detector(detector);

    assert_eq!(ledger.total_balance(), dec!(2000.00));
    for account in ledger.accounts() {
        assert!(account.balance >= Decimal::ZERO);
    }
}

/// Transfers around a ring: every thread's lock pair overlaps its neighbours'
/// in opposite order, the classic circular-wait setup.
#[test]
fn no_deadlock_ring_of_accounts() {
    let detector = start_deadlock_detector();

    const NUM_ACCOUNTS: usize = 8;
    const OPS_PER_THREAD: usize = 300;

    let ledger = ledger_with(NUM_ACCOUNTS, dec!(100.00));
    let barrier = Arc::new(Barrier::new(NUM_ACCOUNTS));

    let handles: Vec<_> = (0..NUM_ACCOUNTS)
        .map(|i| {
            let ledger = ledger.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let request = TransferRequest::new(
                    account_name(i),
                    account_name((i + 1) % NUM_ACCOUNTS),
                    dec!(0.50),
                );
                barrier.wait();
                for _ in 0..OPS_PER_THREAD {
                    let _ = ledger.transfer(&request);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    stop_deadlock_detector(detector);

    assert_eq!(
        ledger.total_balance(),
        dec!(100.00) * Decimal::from(NUM_ACCOUNTS)
    );
}

/// Random-ish pairs across many accounts, mixed with readers and per-key
/// mutations through the store.
#[test]
fn no_deadlock_mixed_transfers_reads_and_mutations() {
    let detector = start_deadlock_detector();

    const NUM_ACCOUNTS: usize = 10;
    const NUM_THREADS: usize = 20;
    const OPS_PER_THREAD: usize = 200;

    let ledger = ledger_with(NUM_ACCOUNTS, dec!(50.00));
    let completed = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|t| {
            let ledger = ledger.clone();
            let completed = completed.clone();
            thread::spawn(move || {
                for i in 0..OPS_PER_THREAD {
                    let a = (t * 7 + i * 3) % NUM_ACCOUNTS;
                    let b = (t * 5 + i * 11 + 1) % NUM_ACCOUNTS;
                    match i % 4 {
                        0 | 1 if a != b => {
                            let amount = Decimal::new(((t + i) % 500 + 1) as i64, 2);
                            let request =
                                TransferRequest::new(account_name(a), account_name(b), amount);
                            let _ = ledger.transfer(&request);
                        }
                        2 => {
                            let _ = ledger.get_account(&account_name(a));
                            let _ = ledger.total_balance();
                        }
                        _ => {
                            // Net-zero per-key update, serialized with transfers.
                            let _ = ledger
                                .store()
                                .mutate(&AccountId::new(account_name(b)), |balance| Ok(balance));
                        }
                    }
                }
                completed.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    stop_deadlock_detector(detector);

    assert_eq!(completed.load(Ordering::SeqCst), NUM_THREADS);
    assert_eq!(
        ledger.total_balance(),
        dec!(50.00) * Decimal::from(NUM_ACCOUNTS)
    );
    for account in ledger.accounts() {
        assert!(account.balance >= Decimal::ZERO);
    }
}

/// Account creation racing with transfers over already-existing accounts.
#[test]
fn no_deadlock_creation_during_transfers() {
    let detector = start_deadlock_detector();
    let ledger = ledger_with(2, dec!(500.00));
    let running = Arc::new(AtomicBool::new(true));

    let creator = {
        let ledger = ledger.clone();
        let running = running.clone();
        thread::spawn(move || {
            let mut created = 0;
            while running.load(Ordering::SeqCst) && created < 500 {
                let id = format!("new-{created}");
                ledger
                    .create_account(Account::new(id, dec!(1)).unwrap())
                    .unwrap();
                created += 1;
                thread::yield_now();
            }
            created
        })
    };

    let transfers: Vec<_> = (0..4)
        .map(|t| {
            let ledger = ledger.clone();
            thread::spawn(move || {
                let (from, to) = if t % 2 == 0 { (0, 1) } else { (1, 0) };
                let request = TransferRequest::new(account_name(from), account_name(to), dec!(2));
                for _ in 0..500 {
                    let _ = ledger.transfer(&request);
                }
            })
        })
        .collect();

    for handle in transfers {
        handle.join().expect("Thread panicked");
    }
    running.store(false, Ordering::SeqCst);
    let created = creator.join().expect("Thread panicked");

    stop_deadlock_detector(detector);

    assert_eq!(ledger.accounts().len(), 2 + created);
    assert_eq!(
        ledger.total_balance(),
        dec!(1000.00) + Decimal::from(created)
    );
}
