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

//! Engine configuration.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the capacity check counts stock already allocated to an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum AllocationPolicy {
    /// Sum of `available_quantity` only. Sold tickets free capacity headroom
    /// for new categories.
    #[default]
    OutstandingStock,
    /// Sum of `available_quantity + sold_quantity`. Capacity is never
    /// exceeded over the event's lifetime.
    TotalAllocated,
}

/// Runtime settings for a [`BoxOffice`](crate::BoxOffice).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub allocation_policy: AllocationPolicy,
    /// Maximum wait for an event's lock before failing with a store error.
    pub lock_timeout: Duration,
    /// How many times a retryable store failure re-runs the whole operation.
    pub commit_retries: u32,
}

impl Config {
    pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);
    pub const DEFAULT_COMMIT_RETRIES: u32 = 1;

    pub fn with_allocation_policy(mut self, policy: AllocationPolicy) -> Self {
        self.allocation_policy = policy;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_commit_retries(mut self, retries: u32) -> Self {
        self.commit_retries = retries;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            allocation_policy: AllocationPolicy::default(),
            lock_timeout: Self::DEFAULT_LOCK_TIMEOUT,
            commit_retries: Self::DEFAULT_COMMIT_RETRIES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.allocation_policy, AllocationPolicy::OutstandingStock);
        assert_eq!(config.lock_timeout, Duration::from_secs(5));
        assert_eq!(config.commit_retries, 1);
    }

    #[test]
    fn builders_override_fields() {
        let config = Config::default()
            .with_allocation_policy(AllocationPolicy::TotalAllocated)
            .with_lock_timeout(Duration::from_millis(10))
            .with_commit_retries(0);
        assert_eq!(config.allocation_policy, AllocationPolicy::TotalAllocated);
        assert_eq!(config.lock_timeout, Duration::from_millis(10));
        assert_eq!(config.commit_retries, 0);
    }

    #[test]
    fn policy_parses_from_cli_names() {
        assert_eq!(
            AllocationPolicy::from_str("total-allocated", false).unwrap(),
            AllocationPolicy::TotalAllocated
        );
        assert_eq!(
            AllocationPolicy::from_str("outstanding-stock", false).unwrap(),
            AllocationPolicy::OutstandingStock
        );
    }
}
