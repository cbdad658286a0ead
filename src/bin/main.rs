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

use chrono::{DateTime, Utc};
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use log::{debug, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use ticket_ledger::{
    AllocationPolicy, BoxOffice, BuyerId, CategoryId, Config, EventId, InventoryError, NewEvent,
    OwnerId,
};

/// Ticket Ledger - Replay a CSV script of box office operations
///
/// Reads operations from a CSV file and outputs final category states to stdout.
/// Supports creating events, allocating ticket categories and purchasing tickets.
#[derive(Parser, Debug)]
#[command(name = "ticket-ledger")]
#[command(about = "A ticket inventory engine that replays operation CSVs", long_about = None)]
struct Args {
    /// Path to CSV file with operations
    ///
    /// Expected format: op,actor,target,label,price,quantity,venue,date
    /// Example: cargo run -- operations.csv > categories.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// How already-allocated stock is counted against event capacity
    #[arg(long, value_enum, default_value_t = AllocationPolicy::OutstandingStock)]
    allocation_policy: AllocationPolicy,

    /// Maximum wait for an event's lock, in milliseconds
    #[arg(long, default_value_t = Config::DEFAULT_LOCK_TIMEOUT.as_millis() as u64)]
    lock_timeout_ms: u64,

    /// Times a failed commit is retried from validation
    #[arg(long, default_value_t = Config::DEFAULT_COMMIT_RETRIES)]
    commit_retries: u32,
}

impl Args {
    fn config(&self) -> Config {
        Config::default()
            .with_allocation_policy(self.allocation_policy)
            .with_lock_timeout(Duration::from_millis(self.lock_timeout_ms))
            .with_commit_retries(self.commit_retries)
    }
}

fn main() {
    env_logger::init();

    // Parse command line arguments
    let args = Args::parse();

    // Open input file
    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    // Replay operations from CSV
    let office = match process_operations(BufReader::new(file), args.config()) {
        Ok(office) => office,
        Err(e) => {
            eprintln!("Error processing operations: {}", e);
            process::exit(1);
        }
    };

    // Write results to stdout
    if let Err(e) = write_categories(&office, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Errors that stop the replay entirely.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("ledger error: {0}")]
    Ledger(#[from] InventoryError),
}

/// Raw CSV record matching the input format.
///
/// Fields: `op, actor, target, label, price, quantity, venue, date`
///
/// Empty `price` and `date` cells take their defaults; a cell that does not
/// parse fails the whole row.
#[derive(Debug, Deserialize)]
struct CsvRecord {
    op: String,
    actor: u64,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    target: Option<u64>,
    #[serde(default)]
    label: String,
    #[serde(default)]
    price: Option<Decimal>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    quantity: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    venue: Option<String>,
    #[serde(default)]
    date: Option<DateTime<Utc>>,
}

/// A box office call decoded from one CSV row.
#[derive(Debug)]
enum Operation {
    CreateEvent {
        owner_id: OwnerId,
        new_event: NewEvent,
    },
    Allocate {
        owner_id: OwnerId,
        event_id: EventId,
        label: String,
        price: Decimal,
        quantity: u32,
    },
    Purchase {
        buyer_id: BuyerId,
        category_id: CategoryId,
        quantity: u32,
    },
}

impl CsvRecord {
    /// Converts a CSV record to an operation.
    ///
    /// Returns `None` for unknown operations or missing required fields.
    fn into_operation(self) -> Option<Operation> {
        match self.op.to_lowercase().as_str() {
            "event" => Some(Operation::CreateEvent {
                owner_id: OwnerId(self.actor),
                new_event: NewEvent {
                    name: self.label,
                    description: None,
                    date_time: self.date.unwrap_or_else(Utc::now),
                    venue: self.venue.unwrap_or_else(|| "TBA".to_string()),
                    capacity: self.quantity?,
                },
            }),
            "allocate" => Some(Operation::Allocate {
                owner_id: OwnerId(self.actor),
                event_id: EventId(self.target?),
                label: self.label,
                price: self.price.unwrap_or(Decimal::ZERO),
                quantity: self.quantity?,
            }),
            "purchase" => Some(Operation::Purchase {
                buyer_id: BuyerId(self.actor),
                category_id: CategoryId(self.target?),
                quantity: self.quantity?,
            }),
            _ => None,
        }
    }
}

fn apply(office: &BoxOffice, operation: Operation) -> Result<(), InventoryError> {
    match operation {
        Operation::CreateEvent {
            owner_id,
            new_event,
        } => office.create_event(owner_id, new_event).map(drop),
        Operation::Allocate {
            owner_id,
            event_id,
            label,
            price,
            quantity,
        } => office
            .allocate_category(event_id, owner_id, &label, price, quantity)
            .map(drop),
        Operation::Purchase {
            buyer_id,
            category_id,
            quantity,
        } => office.purchase(buyer_id, category_id, quantity).map(drop),
    }
}

/// Replay operations from a CSV reader.
///
/// Rows are streamed, so arbitrarily large scripts are never held in memory.
/// Malformed rows and rejected operations are logged and skipped; a store
/// failure that survives its retries aborts the replay.
///
/// # CSV Format
///
/// Expected columns: `op, actor, target, label, price, quantity, venue, date`
/// - `event`: actor = owner, label = name, quantity = capacity, optional venue and RFC 3339 date
/// - `allocate`: actor = owner, target = event ID, label, price, quantity
/// - `purchase`: actor = buyer, target = category ID, quantity
///
/// # Example
///
/// ```csv
/// op,actor,target,label,price,quantity,venue,date
/// event,1,,Concert,,100,Arena,2026-06-01T20:00:00Z
/// allocate,1,1,VIP,150.00,10,,
/// purchase,42,1,,,2,,
/// ```
///
/// # Errors
///
/// Returns an error if the CSV structure is invalid or the store fails.
fn process_operations<R: Read>(reader: R, config: Config) -> Result<BoxOffice, CliError> {
    let office = BoxOffice::with_config(config);

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All) // Handle whitespace in fields like " purchase "
        .flexible(true) // Allow trailing optional columns to be omitted
        .has_headers(true)
        .from_reader(reader);

    for (row, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!("skipping malformed row {}: {}", row + 1, e);
                continue;
            }
        };

        let Some(operation) = record.into_operation() else {
            warn!("skipping invalid operation at row {}", row + 1);
            continue;
        };

        debug!("row {}: {:?}", row + 1, operation);
        match apply(&office, operation) {
            Ok(()) => {}
            Err(e) if e.is_retryable() => return Err(e.into()),
            Err(e) => warn!("row {} rejected: {}", row + 1, e),
        }
    }

    Ok(office)
}

/// One output row per ticket category.
#[derive(Debug, Serialize)]
struct CategoryRow {
    category: CategoryId,
    event: EventId,
    label: String,
    price: Decimal,
    available: u32,
    sold: u32,
}

/// Write category states to a CSV writer.
///
/// # CSV Format
///
/// Columns: `category, event, label, price, available, sold`
///
/// # Errors
///
/// Returns an error if reading the store or writing fails.
fn write_categories<W: Write>(office: &BoxOffice, writer: W) -> Result<(), CliError> {
    let mut wtr = Writer::from_writer(writer);

    for category in office.categories()? {
        wtr.serialize(CategoryRow {
            category: category.id,
            event: category.event_id,
            label: category.label,
            price: category.price,
            available: category.available_quantity,
            sold: category.sold_quantity,
        })?;
    }

    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}
