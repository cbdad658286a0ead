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

//! Box office: the public entry point to the ticket ledger.
//!
//! The [`BoxOffice`] wires one [`LedgerStore`] to the
//! [`InventoryAccountant`] and the [`PurchaseCoordinator`], and adds the thin
//! event registry and read projections around them.
//!
//! # Operations
//!
//! | Operation | Writes |
//! |-----------|--------|
//! | `create_event` | new event row, `available_tickets = capacity` |
//! | `update_event` | descriptive fields only |
//! | `delete_event` | removes event and its categories (no sales allowed) |
//! | `allocate_category` | new category row |
//! | `purchase` | category split, event mirror, ledger entry |
//!
//! # Thread Safety
//!
//! `BoxOffice` is `Send + Sync`; share it behind an [`Arc`] and call it from
//! as many threads or tasks as needed.

use crate::accountant::InventoryAccountant;
use crate::base::{BuyerId, CategoryId, EventId, OwnerId};
use crate::config::Config;
use crate::coordinator::PurchaseCoordinator;
use crate::error::{InventoryError, Result};
use crate::model::{
    Event, EventListing, EventUpdate, NewEvent, Purchase, PurchaseRecord, TicketCategory,
};
use crate::store::LedgerStore;
use log::info;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Ticket inventory and purchase engine.
///
/// # Invariants
///
/// - For every event, `available_tickets == capacity - Σ sold_quantity`.
/// - For every category, `available_quantity + sold_quantity` equals the
///   quantity it was allocated with.
/// - For every category, `sold_quantity` equals the sum of the ledger's
///   purchase quantities against it.
pub struct BoxOffice {
    config: Config,
    store: Arc<LedgerStore>,
    accountant: InventoryAccountant,
    coordinator: PurchaseCoordinator,
}

impl BoxOffice {
    /// Creates an empty box office with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(LedgerStore::new(config.lock_timeout));
        BoxOffice {
            accountant: InventoryAccountant::new(Arc::clone(&store), &config),
            coordinator: PurchaseCoordinator::new(Arc::clone(&store), &config),
            store,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The underlying store, for direct snapshot reads.
    pub fn store(&self) -> &Arc<LedgerStore> {
        &self.store
    }

    // === Core ===

    /// Admits a new ticket category if the event's capacity allows it.
    ///
    /// See [`InventoryAccountant::allocate_category`].
    pub fn allocate_category(
        &self,
        event_id: EventId,
        owner_id: OwnerId,
        label: &str,
        price: Decimal,
        quantity: u32,
    ) -> Result<TicketCategory> {
        self.accountant
            .allocate_category(event_id, owner_id, label, price, quantity)
    }

    /// Buys tickets from a category.
    ///
    /// See [`PurchaseCoordinator::purchase`].
    pub fn purchase(
        &self,
        buyer_id: BuyerId,
        category_id: CategoryId,
        quantity: u32,
    ) -> Result<Purchase> {
        self.coordinator.purchase(buyer_id, category_id, quantity)
    }

    // === Event registry ===

    /// Registers a new event owned by `owner_id`.
    ///
    /// # Errors
    ///
    /// [`InventoryError::InvalidInput`] when the name or venue is blank.
    pub fn create_event(&self, owner_id: OwnerId, new_event: NewEvent) -> Result<Event> {
        new_event.validate()?;
        let event = self.store.insert_event(owner_id, new_event);
        info!(
            "created event {} '{}' with capacity {}",
            event.id, event.name, event.capacity
        );
        Ok(event)
    }

    /// Updates an event's name, description, date or venue.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::InvalidInput`] - a provided name or venue is blank.
    /// - [`InventoryError::NotFound`] - no event `event_id` owned by `owner_id`.
    pub fn update_event(
        &self,
        event_id: EventId,
        owner_id: OwnerId,
        update: EventUpdate,
    ) -> Result<Event> {
        update.validate()?;
        self.store.transaction(event_id, |tx| {
            if tx.event().owner_id != owner_id {
                return Err(InventoryError::NotFound);
            }
            Ok(tx.update_event(update))
        })
    }

    /// Deletes an event together with its categories.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::NotFound`] - no event `event_id` owned by `owner_id`.
    /// - [`InventoryError::EventHasPurchases`] - a category of the event has sold tickets.
    pub fn delete_event(&self, event_id: EventId, owner_id: OwnerId) -> Result<()> {
        self.store.transaction(event_id, |tx| {
            if tx.event().owner_id != owner_id {
                return Err(InventoryError::NotFound);
            }
            if tx.categories().iter().any(|c| c.sold_quantity > 0) {
                return Err(InventoryError::EventHasPurchases);
            }
            tx.delete_event();
            Ok(())
        })?;
        info!("deleted event {event_id}");
        Ok(())
    }

    // === Queries ===

    /// An event with its categories.
    ///
    /// # Errors
    ///
    /// [`InventoryError::NotFound`] when the event does not exist.
    pub fn event(&self, event_id: EventId) -> Result<EventListing> {
        self.store
            .event_listing(event_id)?
            .ok_or(InventoryError::NotFound)
    }

    /// All events, ordered by ID.
    pub fn events(&self) -> Result<Vec<Event>> {
        Ok(self.store.events()?)
    }

    /// Events owned by `owner_id`, ordered by ID.
    pub fn events_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Event>> {
        Ok(self
            .store
            .events()?
            .into_iter()
            .filter(|event| event.owner_id == owner_id)
            .collect())
    }

    /// Every category of every event.
    pub fn categories(&self) -> Result<Vec<TicketCategory>> {
        Ok(self.store.categories()?)
    }

    /// Categories of one event.
    ///
    /// # Errors
    ///
    /// [`InventoryError::NotFound`] when the event does not exist.
    pub fn categories_for_event(&self, event_id: EventId) -> Result<Vec<TicketCategory>> {
        Ok(self.event(event_id)?.categories)
    }

    /// A single category.
    ///
    /// # Errors
    ///
    /// [`InventoryError::NotFound`] when the category does not exist.
    pub fn category(&self, category_id: CategoryId) -> Result<TicketCategory> {
        self.store
            .category(category_id)?
            .ok_or(InventoryError::NotFound)
    }

    /// A buyer's purchases, oldest first, with category and event details.
    pub fn purchase_history(&self, buyer_id: BuyerId) -> Result<Vec<PurchaseRecord>> {
        let mut history = Vec::new();
        for purchase in self.store.purchases_by_buyer(buyer_id) {
            // Categories with sales are never deleted.
            let Some((category, event)) = self.store.category_with_event(purchase.category_id)?
            else {
                continue;
            };
            history.push(PurchaseRecord {
                purchase,
                category_label: category.label,
                price: category.price,
                event_name: event.name,
                event_available_tickets: event.available_tickets,
            });
        }
        Ok(history)
    }
}

impl Default for BoxOffice {
    fn default() -> Self {
        Self::new()
    }
}
