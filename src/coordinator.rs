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

//! Purchase coordinator.
//!
//! The only path by which tickets move from available to sold. Each request
//! walks a linear state machine:
//!
//! ```text
//!  Validating ──ok──► Committing ──ok──► Committed
//!      │                   │
//!      └──────error────────┴──────────► Rejected
//! ```
//!
//! Validation reads the category and its event from a snapshot. The commit
//! then locks the event, re-checks stock with a conditional debit on the
//! locked row and writes category, event mirror and ledger entry as one
//! unit. A request that passed validation can still be rejected at commit if
//! a concurrent purchase took the last units in between.

use crate::base::{BuyerId, CategoryId};
use crate::config::Config;
use crate::error::{InventoryError, Result, retrying};
use crate::model::Purchase;
use crate::store::LedgerStore;
use log::{debug, info, warn};
use std::fmt;
use std::sync::Arc;

/// Stage reached by a purchase request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseState {
    Validating,
    Committing,
    Committed,
    Rejected,
}

impl fmt::Display for PurchaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validating => "validating",
            Self::Committing => "committing",
            Self::Committed => "committed",
            Self::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// Validates and commits purchases.
#[derive(Debug, Clone)]
pub struct PurchaseCoordinator {
    store: Arc<LedgerStore>,
    retries: u32,
}

impl PurchaseCoordinator {
    pub fn new(store: Arc<LedgerStore>, config: &Config) -> Self {
        Self {
            store,
            retries: config.commit_retries,
        }
    }

    /// Buys `quantity` tickets of a category for `buyer_id`.
    ///
    /// On success the category's available stock, its sold count, the event's
    /// available-ticket mirror and the purchase ledger change together.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::InvalidInput`] - `quantity` is zero.
    /// - [`InventoryError::NotFound`] - the category or its event does not exist.
    /// - [`InventoryError::InsufficientInventory`] - fewer than `quantity` tickets remain.
    /// - [`InventoryError::StoreFailure`] - the store could not commit, after retries.
    pub fn purchase(
        &self,
        buyer_id: BuyerId,
        category_id: CategoryId,
        quantity: u32,
    ) -> Result<Purchase> {
        if quantity == 0 {
            return Err(InventoryError::InvalidInput("quantity must be at least 1"));
        }
        retrying(self.retries, || self.attempt(buyer_id, category_id, quantity))
    }

    /// One full pass of the state machine.
    fn attempt(
        &self,
        buyer_id: BuyerId,
        category_id: CategoryId,
        quantity: u32,
    ) -> Result<Purchase> {
        let mut state = PurchaseState::Validating;
        let outcome = self
            .validate(category_id, quantity)
            .and_then(|()| {
                state = transition(state, PurchaseState::Committing, category_id);
                self.commit(buyer_id, category_id, quantity)
            });

        match &outcome {
            Ok(purchase) => {
                transition(state, PurchaseState::Committed, category_id);
                info!(
                    "purchase {}: buyer {buyer_id} bought {quantity} of category {category_id}",
                    purchase.id
                );
            }
            Err(e) => {
                transition(state, PurchaseState::Rejected, category_id);
                warn!("purchase by buyer {buyer_id} of category {category_id} rejected: {e}");
            }
        }
        outcome
    }

    /// Snapshot check that the category exists and has enough stock.
    fn validate(&self, category_id: CategoryId, quantity: u32) -> Result<()> {
        let (category, _event) = self
            .store
            .category_with_event(category_id)?
            .ok_or(InventoryError::NotFound)?;

        if category.available_quantity < quantity {
            return Err(InventoryError::InsufficientInventory {
                requested: quantity,
                available: category.available_quantity,
            });
        }
        Ok(())
    }

    /// Re-validates under the event's lock and writes all three records.
    fn commit(
        &self,
        buyer_id: BuyerId,
        category_id: CategoryId,
        quantity: u32,
    ) -> Result<Purchase> {
        self.store.category_transaction(category_id, |tx| {
            tx.debit_category(category_id, quantity)?;
            tx.record_sale(quantity);
            Ok(tx.append_purchase(buyer_id, category_id, quantity))
        })
    }
}

fn transition(from: PurchaseState, to: PurchaseState, category_id: CategoryId) -> PurchaseState {
    debug!("purchase of category {category_id}: {from} -> {to}");
    to
}
