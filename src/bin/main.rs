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

use clap::{Parser, Subcommand};
use csv::{ReaderBuilder, Trim, Writer};
use ledger_transfer_rs::{
    Account, Ledger, LedgerConfig, LoggingNotificationSink, TransferRequest, server,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Ledger - In-memory accounts with concurrent fund transfers
///
/// Serves the REST API or replays CSV files of accounts and transfers.
#[derive(Parser, Debug)]
#[command(name = "ledger-transfer-rs")]
#[command(about = "An in-memory ledger with deadlock-free concurrent transfers", long_about = None)]
struct Args {
    /// Maximum time in milliseconds a transfer waits for each account lock
    ///
    /// Unset means wait until the lock is free.
    #[arg(long, env = "LEDGER_LOCK_TIMEOUT_MS", global = true)]
    lock_timeout_ms: Option<u64>,

    /// Number of background notification workers
    #[arg(
        long,
        env = "LEDGER_NOTIFICATION_WORKERS",
        default_value_t = LedgerConfig::DEFAULT_NOTIFICATION_WORKERS,
        global = true
    )]
    notification_workers: usize,

    /// Emit logs as JSON lines
    #[arg(long, env = "LEDGER_JSON_LOGS", global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the REST API server
    Serve {
        /// Address to listen on
        #[arg(long, env = "LEDGER_BIND", default_value = "127.0.0.1:3000")]
        bind: SocketAddr,
    },
    /// Load accounts, apply transfers and print final balances as CSV
    ///
    /// Example: cargo run -- replay accounts.csv transfers.csv > balances.csv
    Replay {
        /// CSV with columns: account_id,balance
        #[arg(value_name = "ACCOUNTS")]
        accounts: PathBuf,
        /// CSV with columns: from,to,amount
        #[arg(value_name = "TRANSFERS")]
        transfers: PathBuf,
    },
}

impl Args {
    fn ledger_config(&self) -> LedgerConfig {
        let config =
            LedgerConfig::default().with_notification_workers(self.notification_workers);
        match self.lock_timeout_ms {
            Some(ms) => config.with_lock_timeout(Duration::from_millis(ms)),
            None => config,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let ledger = Ledger::with_config(args.ledger_config(), Arc::new(LoggingNotificationSink));
    let config = ledger.config();
    info!(
        lock_timeout_ms = config.lock_timeout.map(|t| t.as_millis() as u64),
        notification_workers = config.notification_workers,
        "ledger configured"
    );

    // Every path returns so the ledger is dropped and queued notifications drain.
    match args.command {
        Command::Serve { bind } => {
            if let Err(e) = run_server(bind, ledger) {
                error!(error = %e, "server failed");
                return ExitCode::FAILURE;
            }
        }
        Command::Replay {
            accounts,
            transfers,
        } => {
            if let Err(e) = replay(&ledger, &accounts, &transfers) {
                error!(error = %e, "replay failed");
                return ExitCode::FAILURE;
            }
            if let Err(e) = write_balances(&ledger, std::io::stdout()) {
                error!(error = %e, "error writing output");
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}

/// Installs the global subscriber. Logs go to stderr so CSV output on stdout
/// stays clean. Filter comes from `RUST_LOG`, defaulting to `info`.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = installed {
        eprintln!("failed to install tracing subscriber: {e}");
    }
}

fn run_server(bind: SocketAddr, ledger: Ledger) -> std::io::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let listener = TcpListener::bind(bind).await?;
        server::serve(listener, Arc::new(ledger)).await
    })
}

#[derive(Debug, thiserror::Error)]
enum ReplayError {
    #[error("error opening file '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

fn replay(ledger: &Ledger, accounts: &Path, transfers: &Path) -> Result<(), ReplayError> {
    let created = load_accounts(ledger, open(accounts)?)?;
    let (applied, rejected) = apply_transfers(ledger, open(transfers)?)?;
    info!(accounts = created, applied, rejected, "replay finished");
    Ok(())
}

fn open(path: &Path) -> Result<BufReader<File>, ReplayError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| ReplayError::Open {
            path: path.to_path_buf(),
            source,
        })
}

/// Raw account row: `account_id, balance`.
#[derive(Debug, Deserialize)]
struct AccountRecord {
    account_id: String,
    balance: Decimal,
}

/// Raw transfer row: `from, to, amount`.
#[derive(Debug, Deserialize)]
struct TransferRecord {
    from: String,
    to: String,
    amount: Decimal,
}

impl From<TransferRecord> for TransferRequest {
    fn from(record: TransferRecord) -> Self {
        TransferRequest::new(record.from, record.to, record.amount)
    }
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .trim(Trim::All) // Handle whitespace in fields like " Id-1 "
        .has_headers(true) // Skip first row as header
        .from_reader(reader)
}

/// Creates one account per valid row. Malformed rows and rejected accounts
/// (duplicate id, blank id, negative balance) are logged and skipped.
///
/// Returns the number of accounts created.
///
/// # Errors
///
/// Returns a CSV error only if the header cannot be read.
fn load_accounts<R: Read>(ledger: &Ledger, reader: R) -> Result<usize, csv::Error> {
    let mut rdr = csv_reader(reader);
    rdr.headers()?;

    let mut created = 0;
    for result in rdr.deserialize::<AccountRecord>() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                debug!(error = %e, "skipping malformed account row");
                continue;
            }
        };
        match Account::new(record.account_id, record.balance)
            .and_then(|account| ledger.create_account(account))
        {
            Ok(()) => created += 1,
            Err(e) => debug!(error = %e, "skipping account"),
        }
    }
    Ok(created)
}

/// Applies transfers in file order. Malformed rows are skipped; failed
/// transfers are counted as rejected and leave balances untouched.
///
/// Returns `(applied, rejected)`.
fn apply_transfers<R: Read>(ledger: &Ledger, reader: R) -> Result<(usize, usize), csv::Error> {
    let mut rdr = csv_reader(reader);
    rdr.headers()?;

    let (mut applied, mut rejected) = (0, 0);
    for result in rdr.deserialize::<TransferRecord>() {
        match result {
            Ok(record) => match ledger.transfer(&record.into()) {
                Ok(_) => applied += 1,
                Err(_) => rejected += 1,
            },
            Err(e) => debug!(error = %e, "skipping malformed transfer row"),
        }
    }
    Ok((applied, rejected))
}

/// Writes every account as `account_id,balance`, sorted by id.
fn write_balances<W: Write>(ledger: &Ledger, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    wtr.write_record(["account_id", "balance"])?;
    for account in ledger.accounts() {
        wtr.write_record([account.account_id.as_str(), account.balance.to_string().as_str()])?;
    }
    wtr.flush()?;
    Ok(())
}
