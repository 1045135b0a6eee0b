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

use clap::Parser;
use crossbeam::channel::{self, Sender};
use csv::{ReaderBuilder, Trim, Writer};
use seamless_wallet::config::{Cli, Command, ReplayArgs, ServeArgs};
use seamless_wallet::{
    CallerId, Engine, TransactionRef, WalletError, WithdrawAndDeposit, logging, server,
};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::process;
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

fn main() {
    let cli = Cli::parse();
    logging::init(&cli.log);

    match cli.command {
        Command::Serve(args) => serve(args),
        Command::Replay(args) => replay(args),
    }
}

fn serve(args: ServeArgs) {
    let engine = Arc::new(Engine::with_policy(args.provisioning.policy()));

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error starting runtime: {}", e);
            process::exit(1);
        }
    };

    let result = runtime.block_on(async {
        let listener = tokio::net::TcpListener::bind(args.bind).await?;
        server::serve(listener, engine).await
    });

    if let Err(e) = result {
        eprintln!("Error serving on {}: {}", args.bind, e);
        process::exit(1);
    }
}

fn replay(args: ReplayArgs) {
    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let engine = Engine::with_policy(args.provisioning.policy());
    if let Err(e) = process_operations(&engine, BufReader::new(file), usize::from(args.workers)) {
        eprintln!("Error processing operations: {}", e);
        process::exit(1);
    }

    if let Err(e) = write_accounts(&engine, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `op, caller, tx, withdraw, deposit, free_rounds`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    op: String,
    caller: i64,
    #[serde(default)]
    tx: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    withdraw: Option<i64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    deposit: Option<i64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    free_rounds: Option<i64>,
}

/// One wallet call decoded from a CSV row.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Operation {
    Balance(CallerId),
    Round(WithdrawAndDeposit),
    Rollback(CallerId, TransactionRef),
}

impl Operation {
    fn caller_id(&self) -> CallerId {
        match self {
            Operation::Balance(caller_id) | Operation::Rollback(caller_id, _) => *caller_id,
            Operation::Round(request) => request.caller_id,
        }
    }

    fn apply(self, engine: &Engine) -> Result<(), WalletError> {
        match self {
            Operation::Balance(caller_id) => engine.get_balance(caller_id).map(|_| ()),
            Operation::Round(request) => engine.withdraw_and_deposit(request).map(|_| ()),
            Operation::Rollback(caller_id, transaction_ref) => {
                engine.rollback_transaction(caller_id, &transaction_ref)
            }
        }
    }
}

impl CsvRecord {
    /// Converts CSV record to an [`Operation`].
    ///
    /// Returns `None` for unknown operations or a missing transaction reference.
    fn into_operation(self) -> Option<Operation> {
        let caller_id = CallerId(self.caller);
        let transaction_ref = self.tx.filter(|tx| !tx.is_empty()).map(TransactionRef);

        match self.op.to_lowercase().as_str() {
            "balance" | "getbalance" => Some(Operation::Balance(caller_id)),
            "round" | "withdrawanddeposit" => Some(Operation::Round(
                WithdrawAndDeposit::new(
                    caller_id,
                    transaction_ref?,
                    self.withdraw.unwrap_or(0),
                    self.deposit.unwrap_or(0),
                )
                .with_free_rounds(self.free_rounds.unwrap_or(0)),
            )),
            "rollback" | "rollbacktransaction" => {
                Some(Operation::Rollback(caller_id, transaction_ref?))
            }
            _ => None,
        }
    }
}

fn run(engine: &Engine, operation: Operation) {
    let caller_id = operation.caller_id();
    if let Err(e) = operation.apply(engine) {
        debug!(caller = %caller_id, error = %e, "operation refused");
    }
}

/// Decodes one CSV row, skipping rows that are malformed or not an operation.
///
/// Only reader failures are returned as errors.
fn decode(row: Result<CsvRecord, csv::Error>) -> Result<Option<Operation>, csv::Error> {
    match row {
        Ok(record) => {
            let operation = record.into_operation();
            if operation.is_none() {
                debug!("skipping invalid operation record");
            }
            Ok(operation)
        }
        Err(e) if e.is_io_error() => Err(e),
        Err(e) => {
            debug!(error = %e, "skipping malformed row");
            Ok(None)
        }
    }
}

/// Queues `operation` on its caller's worker. Returns `false` if it was dropped.
fn send_to_worker(senders: &[Sender<Operation>], operation: Operation) -> bool {
    let shard = operation.caller_id().0.rem_euclid(senders.len() as i64) as usize;
    // Workers only stop once every sender is dropped, so this fails only if the
    // worker panicked.
    match senders[shard].send(operation) {
        Ok(()) => true,
        Err(e) => {
            warn!(shard, caller = %e.0.caller_id(), "replay worker gone, operation dropped");
            false
        }
    }
}

/// Replays operations from a CSV reader against `engine`.
///
/// Rows are streamed; malformed rows and refused operations are skipped.
/// With more than one worker, rows are sharded by caller so each account
/// still sees its operations in file order.
///
/// # CSV Format
///
/// Expected columns: `op, caller, tx, withdraw, deposit, free_rounds`
/// - `op`: balance, round, or rollback
/// - `caller`: Caller ID (i64)
/// - `tx`: Transaction reference (required for round and rollback)
/// - `withdraw`, `deposit`, `free_rounds`: integers, default 0
///
/// # Example
///
/// ```csv
/// op,caller,tx,withdraw,deposit,free_rounds
/// round,1,r-1,100,40,
/// rollback,1,r-1,,,
/// ```
///
/// # Errors
///
/// Returns the I/O error if reading the input fails. Operations read before
/// the failure have already been applied.
fn process_operations<R: Read>(engine: &Engine, reader: R, workers: usize) -> Result<(), csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    if workers <= 1 {
        for row in rdr.deserialize::<CsvRecord>() {
            if let Some(operation) = decode(row)? {
                run(engine, operation);
            }
        }
    } else {
        thread::scope(|scope| {
            let senders: Vec<Sender<Operation>> = (0..workers)
                .map(|_| {
                    let (tx, rx) = channel::unbounded::<Operation>();
                    scope.spawn(move || {
                        for operation in rx {
                            run(engine, operation);
                        }
                    });
                    tx
                })
                .collect();

            for row in rdr.deserialize::<CsvRecord>() {
                let Some(operation) = decode(row)? else {
                    continue;
                };
                send_to_worker(&senders, operation);
            }
            Ok::<(), csv::Error>(())
        })?;
    }

    info!(accounts = engine.balances().len(), "replay finished");
    Ok(())
}

/// Output row: `caller, balance, free_rounds`.
#[derive(Debug, Serialize)]
struct AccountRow {
    caller: i64,
    balance: i64,
    free_rounds: i64,
}

/// Writes account states to a CSV writer, ordered by caller.
///
/// # Example
///
/// ```csv
/// caller,balance,free_rounds
/// 1,940,0
/// 2,35000,2
/// ```
fn write_accounts<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    for (caller_id, account) in engine.balances().snapshot() {
        wtr.serialize(AccountRow {
            caller: caller_id.0,
            balance: account.balance,
            free_rounds: account.free_rounds,
        })?;
    }

    wtr.flush()?;
    Ok(())
}
