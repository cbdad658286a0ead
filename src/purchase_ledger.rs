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

//! Append-only purchase ledger.
//!
//! Purchases are written once, at commit time, and never updated or removed.
//! A per-buyer index keeps history lookups from scanning the whole ledger.

use crate::base::{BuyerId, CategoryId, PurchaseId};
use crate::model::Purchase;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// A thread-safe, write-once purchase ledger.
///
/// Combines a [`DashMap`] keyed by purchase ID with per-buyer and
/// per-category indexes that preserve insertion order.
#[derive(Debug, Default)]
pub struct PurchaseLedger {
    /// Purchases by ID.
    purchases: DashMap<PurchaseId, Purchase>,

    /// Purchase IDs per buyer, oldest first.
    by_buyer: DashMap<BuyerId, Vec<PurchaseId>>,

    /// Purchase IDs per category, oldest first.
    by_category: DashMap<CategoryId, Vec<PurchaseId>>,
}

impl PurchaseLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a purchase.
    ///
    /// Only called by the store while it holds the owning event's lock, after
    /// the transaction that produced the purchase has succeeded.
    pub(crate) fn append(&self, purchase: Purchase) {
        let id = purchase.id;
        let buyer_id = purchase.buyer_id;
        let category_id = purchase.category_id;

        match self.purchases.entry(id) {
            Entry::Occupied(_) => {
                debug_assert!(false, "Invariant violated: purchase {id} appended twice");
                return;
            }
            Entry::Vacant(entry) => {
                entry.insert(purchase);
            }
        }
        self.by_buyer.entry(buyer_id).or_default().push(id);
        self.by_category.entry(category_id).or_default().push(id);
    }

    /// Looks up a purchase by ID.
    pub fn get(&self, id: PurchaseId) -> Option<Purchase> {
        self.purchases.get(&id).map(|entry| entry.value().clone())
    }

    /// All purchases made by `buyer_id`, oldest first.
    pub fn by_buyer(&self, buyer_id: BuyerId) -> Vec<Purchase> {
        let ids = self
            .by_buyer
            .get(&buyer_id)
            .map(|ids| ids.value().clone())
            .unwrap_or_default();
        self.resolve(&ids)
    }

    /// All purchases against `category_id`, oldest first.
    pub fn by_category(&self, category_id: CategoryId) -> Vec<Purchase> {
        let ids = self
            .by_category
            .get(&category_id)
            .map(|ids| ids.value().clone())
            .unwrap_or_default();
        self.resolve(&ids)
    }

    /// Total units sold against `category_id`.
    pub fn quantity_sold(&self, category_id: CategoryId) -> u64 {
        self.by_category(category_id)
            .iter()
            .map(|purchase| u64::from(purchase.quantity))
            .sum()
    }

    pub fn len(&self) -> usize {
        self.purchases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.purchases.is_empty()
    }

    fn resolve(&self, ids: &[PurchaseId]) -> Vec<Purchase> {
        ids.iter().filter_map(|id| self.get(*id)).collect()
    }
}
