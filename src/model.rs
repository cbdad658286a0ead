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

//! Ledger records: events, ticket categories and purchases.
//!
//! Mutating methods re-check their invariants after every change, mirroring
//! the ledger rules:
//!
//! - `TicketCategory`: `available + sold` never changes after creation.
//! - `Event`: `available_tickets == capacity - Σ sold` over its categories.
//! - `Purchase`: immutable once created.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use ticket_ledger::{CategoryId, EventId, TicketCategory};
//!
//! let mut vip = TicketCategory::new(CategoryId(1), EventId(1), "VIP".into(), dec!(120), 10);
//! vip.debit(4).unwrap();
//! assert_eq!(vip.available_quantity, 6);
//! assert_eq!(vip.sold_quantity, 4);
//! ```

use crate::base::{BuyerId, CategoryId, EventId, OwnerId, PurchaseId};
use crate::error::{InventoryError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An organizer's event and its declared ticket capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub owner_id: OwnerId,
    pub name: String,
    pub description: String,
    pub date_time: DateTime<Utc>,
    pub venue: String,
    /// Total tickets the organizer authorized for sale across all categories.
    pub capacity: u32,
    /// Denormalized `capacity - Σ sold` kept in step with every purchase.
    ///
    /// Signed because the outstanding-stock allocation policy can admit more
    /// total stock than `capacity` over the event's lifetime.
    pub available_tickets: i64,
}

impl Event {
    pub(crate) fn create(id: EventId, owner_id: OwnerId, new_event: NewEvent) -> Self {
        Self {
            id,
            owner_id,
            name: new_event.name,
            description: new_event.description.unwrap_or_default(),
            date_time: new_event.date_time,
            venue: new_event.venue,
            capacity: new_event.capacity,
            available_tickets: i64::from(new_event.capacity),
        }
    }

    /// Mirrors a committed sale of `quantity` tickets.
    pub(crate) fn record_sale(&mut self, quantity: u32) {
        self.available_tickets -= i64::from(quantity);
    }

    pub(crate) fn apply(&mut self, update: EventUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(date_time) = update.date_time {
            self.date_time = date_time;
        }
        if let Some(venue) = update.venue {
            self.venue = venue;
        }
    }
}

/// Input for creating an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub date_time: DateTime<Utc>,
    pub venue: String,
    pub capacity: u32,
}

impl NewEvent {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(InventoryError::InvalidInput("event name must not be empty"));
        }
        if self.venue.trim().is_empty() {
            return Err(InventoryError::InvalidInput("venue must not be empty"));
        }
        Ok(())
    }
}

/// Partial update of an event's descriptive fields.
///
/// Capacity is fixed at creation and cannot be updated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub date_time: Option<DateTime<Utc>>,
    pub venue: Option<String>,
}

impl EventUpdate {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return Err(InventoryError::InvalidInput("event name must not be empty"));
        }
        if self.venue.as_deref().is_some_and(|venue| venue.trim().is_empty()) {
            return Err(InventoryError::InvalidInput("venue must not be empty"));
        }
        Ok(())
    }
}

/// An inventory lot of one event, e.g. "VIP" or "General Admission".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketCategory {
    pub id: CategoryId,
    pub event_id: EventId,
    pub label: String,
    pub price: Decimal,
    /// Remaining unsold units.
    pub available_quantity: u32,
    /// Units committed via purchase.
    pub sold_quantity: u32,
}

impl TicketCategory {
    pub fn new(
        id: CategoryId,
        event_id: EventId,
        label: String,
        price: Decimal,
        quantity: u32,
    ) -> Self {
        Self {
            id,
            event_id,
            label,
            price,
            available_quantity: quantity,
            sold_quantity: 0,
        }
    }

    /// Units allocated at creation.
    pub fn allocated(&self) -> u64 {
        u64::from(self.available_quantity) + u64::from(self.sold_quantity)
    }

    /// Moves `quantity` units from available to sold.
    ///
    /// The comparison and the mutation happen together; nothing changes when
    /// stock is short.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::InvalidInput`] - `quantity` is zero.
    /// - [`InventoryError::InsufficientInventory`] - fewer than `quantity` units remain.
    pub fn debit(&mut self, quantity: u32) -> Result<()> {
        if quantity == 0 {
            return Err(InventoryError::InvalidInput("quantity must be at least 1"));
        }
        if self.available_quantity < quantity {
            return Err(InventoryError::InsufficientInventory {
                requested: quantity,
                available: self.available_quantity,
            });
        }
        let allocated = self.allocated();
        self.available_quantity -= quantity;
        self.sold_quantity += quantity;
        debug_assert_eq!(
            self.allocated(),
            allocated,
            "Invariant violated: category {} allocation changed on debit",
            self.id
        );
        Ok(())
    }
}

/// An append-only purchase ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: PurchaseId,
    pub buyer_id: BuyerId,
    pub category_id: CategoryId,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
}

/// Event together with its categories, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventListing {
    pub event: Event,
    pub categories: Vec<TicketCategory>,
}

/// One row of a buyer's purchase history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseRecord {
    pub purchase: Purchase,
    pub category_label: String,
    pub price: Decimal,
    pub event_name: String,
    pub event_available_tickets: i64,
}
