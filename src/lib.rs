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

//! # Ticket Ledger
//!
//! This library provides the inventory and purchase engine of an
//! event-ticketing backend. It keeps three numbers consistent under
//! concurrent access: an event's available-ticket count, each ticket
//! category's available/sold split, and the append-only purchase ledger.
//!
//! ## Core Components
//!
//! - [`BoxOffice`]: Entry point wiring store, accountant and coordinator
//! - [`InventoryAccountant`]: Admits categories within an event's capacity
//! - [`PurchaseCoordinator`]: Commits purchases atomically
//! - [`LedgerStore`]: Sharded transactional store with all-or-nothing commits
//! - [`InventoryError`]: Error types for rejected operations
//!
//! ## Example
//!
//! ```
//! use chrono::Utc;
//! use rust_decimal_macros::dec;
//! use ticket_ledger::{BoxOffice, BuyerId, InventoryError, NewEvent, OwnerId};
//!
//! let office = BoxOffice::new();
//! let event = office
//!     .create_event(
//!         OwnerId(1),
//!         NewEvent {
//!             name: "Concert".into(),
//!             description: None,
//!             date_time: Utc::now(),
//!             venue: "Arena".into(),
//!             capacity: 100,
//!         },
//!     )
//!     .unwrap();
//!
//! let vip = office
//!     .allocate_category(event.id, OwnerId(1), "VIP", dec!(150.00), 10)
//!     .unwrap();
//! office.purchase(BuyerId(7), vip.id, 10).unwrap();
//!
//! assert!(matches!(
//!     office.purchase(BuyerId(8), vip.id, 1),
//!     Err(InventoryError::InsufficientInventory { .. })
//! ));
//! assert_eq!(office.event(event.id).unwrap().event.available_tickets, 90);
//! ```
//!
//! ## Thread Safety
//!
//! Work on different events runs in parallel; work on the same event is
//! serialized by that event's lock, which closes the check-then-decrement
//! race for both allocation and purchase.

mod accountant;
mod base;
mod box_office;
pub mod config;
mod coordinator;
pub mod error;
pub mod model;
mod purchase_ledger;
pub mod store;

pub use accountant::InventoryAccountant;
pub use base::{BuyerId, CategoryId, EventId, OwnerId, PurchaseId};
pub use box_office::BoxOffice;
pub use config::{AllocationPolicy, Config};
pub use coordinator::{PurchaseCoordinator, PurchaseState};
pub use error::{InventoryError, StoreError};
pub use model::{Event, EventListing, EventUpdate, NewEvent, Purchase, PurchaseRecord, TicketCategory};
pub use purchase_ledger::PurchaseLedger;
pub use store::{LedgerStore, Transaction};
