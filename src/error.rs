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

//! Error types for inventory allocation and purchasing.

use crate::base::EventId;
use thiserror::Error;

/// Failures raised by the ledger store itself rather than by business rules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The event's lock could not be acquired within the configured timeout
    #[error("timed out waiting for the lock on event {0}")]
    LockTimeout(EventId),
}

/// Inventory and purchase errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// Referenced event or category does not exist or is not owned by the caller
    #[error("not found")]
    NotFound,

    /// Allocating the category would exceed the event's declared capacity
    #[error("exceeds event capacity: {allocated} allocated + {requested} requested > {capacity}")]
    CapacityExceeded {
        requested: u32,
        allocated: u64,
        capacity: u32,
    },

    /// Purchase quantity exceeds the category's remaining stock
    #[error("insufficient inventory: requested {requested}, available {available}")]
    InsufficientInventory { requested: u32, available: u32 },

    /// Event still has sold tickets and cannot be deleted
    #[error("event has purchases")]
    EventHasPurchases,

    /// An argument failed validation before reaching the store
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    /// The store could not commit; the operation may be retried
    #[error("store failure: {0}")]
    StoreFailure(#[from] StoreError),
}

impl InventoryError {
    /// Returns `true` when re-running the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, InventoryError::StoreFailure(_))
    }
}

/// Result alias for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;

/// Runs `op`, re-running it from the start up to `retries` more times while
/// it fails with a retryable error.
pub(crate) fn retrying<T>(retries: u32, mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let mut attempt = 0;
    loop {
        match op() {
            Err(e) if e.is_retryable() && attempt < retries => {
                attempt += 1;
                log::warn!("retrying after {e} (attempt {attempt} of {retries})");
            }
            outcome => return outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        assert_eq!(InventoryError::NotFound.to_string(), "not found");
        assert_eq!(
            InventoryError::CapacityExceeded {
                requested: 50,
                allocated: 60,
                capacity: 100
            }
            .to_string(),
            "exceeds event capacity: 60 allocated + 50 requested > 100"
        );
        assert_eq!(
            InventoryError::InsufficientInventory {
                requested: 1,
                available: 0
            }
            .to_string(),
            "insufficient inventory: requested 1, available 0"
        );
        assert_eq!(InventoryError::EventHasPurchases.to_string(), "event has purchases");
        assert_eq!(
            InventoryError::InvalidInput("quantity must be at least 1").to_string(),
            "invalid input: quantity must be at least 1"
        );
        assert_eq!(
            InventoryError::from(StoreError::LockTimeout(EventId(3))).to_string(),
            "store failure: timed out waiting for the lock on event 3"
        );
    }

    #[test]
    fn only_store_failures_are_retryable() {
        assert!(InventoryError::StoreFailure(StoreError::LockTimeout(EventId(1))).is_retryable());
        assert!(!InventoryError::NotFound.is_retryable());
        assert!(
            !InventoryError::InsufficientInventory {
                requested: 2,
                available: 1
            }
            .is_retryable()
        );
    }

    #[test]
    fn retrying_reruns_store_failures_only() {
        let mut calls = 0;
        let result: Result<()> = retrying(1, || {
            calls += 1;
            Err(StoreError::LockTimeout(EventId(1)).into())
        });
        assert!(result.unwrap_err().is_retryable());
        assert_eq!(calls, 2);

        let mut calls = 0;
        let result: Result<()> = retrying(3, || {
            calls += 1;
            Err(InventoryError::NotFound)
        });
        assert_eq!(result, Err(InventoryError::NotFound));
        assert_eq!(calls, 1);
    }

    #[test]
    fn retrying_returns_first_success() {
        let mut calls = 0;
        let result = retrying(1, || {
            calls += 1;
            if calls == 1 {
                Err(StoreError::LockTimeout(EventId(1)).into())
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result, Ok(2));
    }

    #[test]
    fn errors_are_cloneable() {
        let error = InventoryError::NotFound;
        let cloned = error.clone();
        assert_eq!(error, cloned);
    }
}
