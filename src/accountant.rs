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

//! Inventory accountant.
//!
//! Admits a new ticket category only if the event's allocated stock stays
//! within its declared capacity. The aggregate, the comparison and the insert
//! all run inside one store transaction, so two concurrent allocations for the
//! same event are checked one after the other against committed state.

use crate::base::{EventId, OwnerId};
use crate::config::{AllocationPolicy, Config};
use crate::error::{InventoryError, Result, retrying};
use crate::model::TicketCategory;
use crate::store::{LedgerStore, Transaction};
use log::{debug, info, warn};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Enforces the capacity ceiling when categories are created.
#[derive(Debug, Clone)]
pub struct InventoryAccountant {
    store: Arc<LedgerStore>,
    policy: AllocationPolicy,
    retries: u32,
}

impl InventoryAccountant {
    pub fn new(store: Arc<LedgerStore>, config: &Config) -> Self {
        Self {
            store,
            policy: config.allocation_policy,
            retries: config.commit_retries,
        }
    }

    /// Creates a category of `quantity` tickets at `price` for an event.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::InvalidInput`] - `quantity` is zero, `price` is negative or `label` is blank.
    /// - [`InventoryError::NotFound`] - no event `event_id` owned by `owner_id`.
    /// - [`InventoryError::CapacityExceeded`] - the category would push allocation past capacity.
    /// - [`InventoryError::StoreFailure`] - the event's lock was not acquired in time.
    pub fn allocate_category(
        &self,
        event_id: EventId,
        owner_id: OwnerId,
        label: &str,
        price: Decimal,
        quantity: u32,
    ) -> Result<TicketCategory> {
        validate(label, price, quantity)?;

        let category = retrying(self.retries, || {
            self.try_allocate(event_id, owner_id, label, price, quantity)
        });
        match &category {
            Ok(category) => info!(
                "allocated category {} ({} x {}) for event {event_id}",
                category.id, category.available_quantity, category.label
            ),
            Err(e) => warn!("rejected category for event {event_id}: {e}"),
        }
        category
    }

    fn try_allocate(
        &self,
        event_id: EventId,
        owner_id: OwnerId,
        label: &str,
        price: Decimal,
        quantity: u32,
    ) -> Result<TicketCategory> {
        self.store.transaction(event_id, |tx| {
            if tx.event().owner_id != owner_id {
                return Err(InventoryError::NotFound);
            }

            let allocated = self.already_allocated(tx);
            let capacity = tx.event().capacity;
            if allocated + u64::from(quantity) > u64::from(capacity) {
                return Err(InventoryError::CapacityExceeded {
                    requested: quantity,
                    allocated,
                    capacity,
                });
            }

            debug!("event {event_id}: {allocated} + {quantity} within capacity {capacity}");
            Ok(tx.insert_category(label.trim().to_string(), price, quantity))
        })
    }

    /// Stock already counted against the event's capacity under the policy.
    fn already_allocated(&self, tx: &Transaction<'_>) -> u64 {
        let categories = tx.categories();
        match self.policy {
            AllocationPolicy::OutstandingStock => categories
                .iter()
                .map(|c| u64::from(c.available_quantity))
                .sum(),
            AllocationPolicy::TotalAllocated => categories.iter().map(|c| c.allocated()).sum(),
        }
    }
}

fn validate(label: &str, price: Decimal, quantity: u32) -> Result<()> {
    if quantity == 0 {
        return Err(InventoryError::InvalidInput("quantity must be at least 1"));
    }
    if price < Decimal::ZERO {
        return Err(InventoryError::InvalidInput("price must not be negative"));
    }
    if label.trim().is_empty() {
        return Err(InventoryError::InvalidInput("label must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn validate_rejects_bad_arguments() {
        assert!(validate("VIP", dec!(10), 0).is_err());
        assert!(validate("VIP", dec!(-0.01), 1).is_err());
        assert!(validate("  ", dec!(10), 1).is_err());
    }

    #[test]
    fn validate_accepts_free_tickets() {
        assert!(validate("Comp", dec!(0), 1).is_ok());
        assert!(validate("Comp", -dec!(0), 1).is_ok());
    }
}
