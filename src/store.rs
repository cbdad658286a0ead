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

//! In-process transactional ledger store.
//!
//! Each event and its categories live in one shard guarded by a
//! [`parking_lot::Mutex`]. The shards sit in a [`DashMap`] so that work on
//! different events proceeds in parallel while work on the same event is
//! serialized. Purchases go to the shared [`PurchaseLedger`].
//!
//! # Transactions
//!
//! [`LedgerStore::transaction`] locks one event's shard and runs a closure
//! against a [`Transaction`] that stages every write. The staged writes are
//! applied only when the closure returns `Ok`; on `Err` they are dropped and
//! the shard is left exactly as it was.
//!
//! Commit appends purchases to the ledger before it publishes the category
//! and event rows, and keeps the lock until both are done. A reader that sees
//! a decremented category therefore always finds the matching ledger entry.
//!
//! # Lock ordering
//!
//! The `DashMap` reference is always dropped before a shard mutex is taken,
//! and at most one shard mutex is held at a time.

use crate::base::{BuyerId, CategoryId, EventId, OwnerId, PurchaseId};
use crate::error::{InventoryError, Result, StoreError};
use crate::model::{Event, EventListing, EventUpdate, NewEvent, Purchase, TicketCategory};
use crate::purchase_ledger::PurchaseLedger;
use chrono::Utc;
use dashmap::DashMap;
use log::trace;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// One event row and the category rows that belong to it.
#[derive(Debug, Clone)]
struct EventShard {
    event: Event,
    categories: BTreeMap<CategoryId, TicketCategory>,
}

/// `None` once the event has been deleted. Requests that grabbed the shard
/// before deletion then observe the event as missing.
type ShardCell = Arc<Mutex<Option<EventShard>>>;

/// Transactional store for events, categories and purchases.
#[derive(Debug)]
pub struct LedgerStore {
    shards: DashMap<EventId, ShardCell>,
    /// Owning event of every live category.
    category_index: DashMap<CategoryId, EventId>,
    ledger: PurchaseLedger,
    next_event_id: AtomicU64,
    next_category_id: AtomicU64,
    next_purchase_id: AtomicU64,
    lock_timeout: Duration,
}

impl LedgerStore {
    /// Creates an empty store whose locks wait at most `lock_timeout`.
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            shards: DashMap::new(),
            category_index: DashMap::new(),
            ledger: PurchaseLedger::new(),
            next_event_id: AtomicU64::new(1),
            next_category_id: AtomicU64::new(1),
            next_purchase_id: AtomicU64::new(1),
            lock_timeout,
        }
    }

    /// Inserts a new event with `available_tickets == capacity`.
    pub fn insert_event(&self, owner_id: OwnerId, new_event: NewEvent) -> Event {
        let id = EventId(self.next_event_id.fetch_add(1, Ordering::Relaxed));
        let event = Event::create(id, owner_id, new_event);
        let shard = EventShard {
            event: event.clone(),
            categories: BTreeMap::new(),
        };
        self.shards.insert(id, Arc::new(Mutex::new(Some(shard))));
        trace!("inserted event {id} for owner {owner_id}");
        event
    }

    /// Runs `f` as one all-or-nothing unit against the shard of `event_id`.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::NotFound`] - the event does not exist.
    /// - [`InventoryError::StoreFailure`] - the event's lock was not acquired in time.
    /// - Any error returned by `f`, in which case nothing is written.
    pub fn transaction<T, F>(&self, event_id: EventId, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T>,
    {
        let cell = self.shard(event_id).ok_or(InventoryError::NotFound)?;
        let mut guard = cell
            .try_lock_for(self.lock_timeout)
            .ok_or(StoreError::LockTimeout(event_id))?;
        let shard = guard.as_ref().ok_or(InventoryError::NotFound)?;

        let mut tx = Transaction::new(self, shard);
        let value = f(&mut tx)?;
        let writes = tx.into_writes();

        self.commit(event_id, &mut guard, writes);
        Ok(value)
    }

    /// Like [`transaction`](Self::transaction), for the event owning `category_id`.
    pub fn category_transaction<T, F>(&self, category_id: CategoryId, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T>,
    {
        let event_id = self.event_of(category_id).ok_or(InventoryError::NotFound)?;
        self.transaction(event_id, f)
    }

    fn commit(&self, event_id: EventId, slot: &mut Option<EventShard>, writes: WriteSet) {
        let WriteSet {
            event,
            categories,
            purchases,
            delete,
        } = writes;

        if delete {
            if let Some(shard) = slot.take() {
                for category_id in shard.categories.keys() {
                    self.category_index.remove(category_id);
                }
            }
            self.shards.remove(&event_id);
            trace!("deleted event {event_id}");
            return;
        }

        let Some(shard) = slot.as_mut() else {
            return;
        };
        for purchase in purchases {
            self.ledger.append(purchase);
        }
        for (id, category) in categories {
            self.category_index.insert(id, event_id);
            shard.categories.insert(id, category);
        }
        if let Some(event) = event {
            shard.event = event;
        }
        debug_assert_eq!(
            shard.event.available_tickets,
            i64::from(shard.event.capacity)
                - shard
                    .categories
                    .values()
                    .map(|c| i64::from(c.sold_quantity))
                    .sum::<i64>(),
            "Invariant violated: availability mirror out of step for event {event_id}"
        );
    }

    // === Snapshot reads ===

    /// Current state of an event.
    pub fn event(&self, event_id: EventId) -> std::result::Result<Option<Event>, StoreError> {
        self.read(event_id, |shard| shard.event.clone())
    }

    /// An event together with its categories, ordered by category ID.
    pub fn event_listing(
        &self,
        event_id: EventId,
    ) -> std::result::Result<Option<EventListing>, StoreError> {
        self.read(event_id, |shard| EventListing {
            event: shard.event.clone(),
            categories: shard.categories.values().cloned().collect(),
        })
    }

    /// A category and its parent event, read under one lock.
    pub fn category_with_event(
        &self,
        category_id: CategoryId,
    ) -> std::result::Result<Option<(TicketCategory, Event)>, StoreError> {
        let Some(event_id) = self.event_of(category_id) else {
            return Ok(None);
        };
        let found = self.read(event_id, |shard| {
            shard
                .categories
                .get(&category_id)
                .map(|category| (category.clone(), shard.event.clone()))
        })?;
        Ok(found.flatten())
    }

    /// Current state of a category.
    pub fn category(
        &self,
        category_id: CategoryId,
    ) -> std::result::Result<Option<TicketCategory>, StoreError> {
        Ok(self
            .category_with_event(category_id)?
            .map(|(category, _)| category))
    }

    /// All events, ordered by ID.
    pub fn events(&self) -> std::result::Result<Vec<Event>, StoreError> {
        let mut events = Vec::new();
        for event_id in self.event_ids() {
            if let Some(event) = self.event(event_id)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// All categories, ordered by event then category ID.
    pub fn categories(&self) -> std::result::Result<Vec<TicketCategory>, StoreError> {
        let mut categories = Vec::new();
        for event_id in self.event_ids() {
            if let Some(listing) = self.event_listing(event_id)? {
                categories.extend(listing.categories);
            }
        }
        Ok(categories)
    }

    /// Purchases made by `buyer_id`, oldest first.
    pub fn purchases_by_buyer(&self, buyer_id: BuyerId) -> Vec<Purchase> {
        self.ledger.by_buyer(buyer_id)
    }

    /// The append-only purchase ledger.
    pub fn ledger(&self) -> &PurchaseLedger {
        &self.ledger
    }

    fn read<T>(
        &self,
        event_id: EventId,
        f: impl FnOnce(&EventShard) -> T,
    ) -> std::result::Result<Option<T>, StoreError> {
        let Some(cell) = self.shard(event_id) else {
            return Ok(None);
        };
        let guard = cell
            .try_lock_for(self.lock_timeout)
            .ok_or(StoreError::LockTimeout(event_id))?;
        Ok(guard.as_ref().map(f))
    }

    /// Clones the shard handle so the map reference is released before locking.
    fn shard(&self, event_id: EventId) -> Option<ShardCell> {
        self.shards.get(&event_id).map(|cell| Arc::clone(cell.value()))
    }

    fn event_of(&self, category_id: CategoryId) -> Option<EventId> {
        self.category_index.get(&category_id).map(|entry| *entry.value())
    }

    fn event_ids(&self) -> Vec<EventId> {
        let mut ids: Vec<EventId> = self.shards.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }
}

/// Writes staged by a [`Transaction`], applied together on commit.
#[derive(Debug, Default)]
struct WriteSet {
    event: Option<Event>,
    categories: BTreeMap<CategoryId, TicketCategory>,
    purchases: Vec<Purchase>,
    delete: bool,
}

/// A staged view of one event's shard.
///
/// Reads see the transaction's own writes. Nothing is visible to other
/// requests until the closure passed to [`LedgerStore::transaction`] returns
/// `Ok`.
pub struct Transaction<'s> {
    store: &'s LedgerStore,
    base: &'s EventShard,
    writes: WriteSet,
}

impl<'s> Transaction<'s> {
    fn new(store: &'s LedgerStore, base: &'s EventShard) -> Self {
        Self {
            store,
            base,
            writes: WriteSet::default(),
        }
    }

    fn into_writes(self) -> WriteSet {
        self.writes
    }

    pub fn event(&self) -> &Event {
        self.writes.event.as_ref().unwrap_or(&self.base.event)
    }

    pub fn category(&self, category_id: CategoryId) -> Option<&TicketCategory> {
        self.writes
            .categories
            .get(&category_id)
            .or_else(|| self.base.categories.get(&category_id))
    }

    /// The event's categories including staged inserts, ordered by ID.
    pub fn categories(&self) -> Vec<&TicketCategory> {
        let mut merged: BTreeMap<CategoryId, &TicketCategory> =
            self.base.categories.iter().map(|(id, c)| (*id, c)).collect();
        for (id, category) in &self.writes.categories {
            merged.insert(*id, category);
        }
        merged.into_values().collect()
    }

    /// Stages a new category with all of `quantity` available.
    pub fn insert_category(
        &mut self,
        label: String,
        price: Decimal,
        quantity: u32,
    ) -> TicketCategory {
        let id = CategoryId(self.store.next_category_id.fetch_add(1, Ordering::Relaxed));
        let category = TicketCategory::new(id, self.base.event.id, label, price, quantity);
        self.writes.categories.insert(id, category.clone());
        category
    }

    /// Conditionally moves `quantity` units of a category from available to
    /// sold, re-checking stock against the locked row.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::NotFound`] - the category is not part of this event.
    /// - [`InventoryError::InsufficientInventory`] - fewer than `quantity` units remain.
    pub fn debit_category(
        &mut self,
        category_id: CategoryId,
        quantity: u32,
    ) -> Result<TicketCategory> {
        let mut category = self
            .category(category_id)
            .cloned()
            .ok_or(InventoryError::NotFound)?;
        category.debit(quantity)?;
        self.writes.categories.insert(category_id, category.clone());
        Ok(category)
    }

    /// Decrements the event's availability mirror.
    pub fn record_sale(&mut self, quantity: u32) {
        let mut event = self.event().clone();
        event.record_sale(quantity);
        self.writes.event = Some(event);
    }

    /// Stages a ledger entry stamped with the current time.
    pub fn append_purchase(
        &mut self,
        buyer_id: BuyerId,
        category_id: CategoryId,
        quantity: u32,
    ) -> Purchase {
        let purchase = Purchase {
            id: PurchaseId(self.store.next_purchase_id.fetch_add(1, Ordering::Relaxed)),
            buyer_id,
            category_id,
            quantity,
            created_at: Utc::now(),
        };
        self.writes.purchases.push(purchase.clone());
        purchase
    }

    /// Stages an update of the event's descriptive fields.
    pub fn update_event(&mut self, update: EventUpdate) -> Event {
        let mut event = self.event().clone();
        event.apply(update);
        self.writes.event = Some(event.clone());
        event
    }

    /// Stages removal of the event and all of its categories.
    pub fn delete_event(&mut self) {
        self.writes.delete = true;
    }
}
