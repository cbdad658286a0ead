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

//! Concurrency tests for the check-then-decrement race.
//!
//! Many requests race for the same stock; the ledger must admit exactly as
//! many as the stock allows and reject the rest without partial writes.
//!
//! Run with: cargo test --test concurrency_test -- --nocapture

use chrono::Utc;
use rayon::prelude::*;
use rust_decimal_macros::dec;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use ticket_ledger::{
    BoxOffice, BuyerId, CategoryId, Config, EventId, InventoryError, NewEvent, OwnerId,
    StoreError,
};

const ORGANIZER: OwnerId = OwnerId(1);

fn office_with_event(config: Config, capacity: u32) -> (Arc<BoxOffice>, EventId) {
    let office = BoxOffice::with_config(config);
    let event = office
        .create_event(
            ORGANIZER,
            NewEvent {
                name: "Concert".into(),
                description: None,
                date_time: Utc::now(),
                venue: "Arena".into(),
                capacity,
            },
        )
        .unwrap();
    (Arc::new(office), event.id)
}

fn allocate(office: &BoxOffice, event_id: EventId, quantity: u32) -> CategoryId {
    office
        .allocate_category(event_id, ORGANIZER, "GA", dec!(25), quantity)
        .unwrap()
        .id
}

fn assert_consistent(office: &BoxOffice, event_id: EventId) {
    let listing = office.event(event_id).unwrap();
    let sold: i64 = listing
        .categories
        .iter()
        .map(|c| i64::from(c.sold_quantity))
        .sum();
    assert_eq!(
        listing.event.available_tickets,
        i64::from(listing.event.capacity) - sold
    );
    for category in &listing.categories {
        assert_eq!(
            u64::from(category.sold_quantity),
            office.store().ledger().quantity_sold(category.id)
        );
    }
}

/// Test: 100 concurrent single-ticket purchases for 10 tickets.
///
/// Exactly 10 commit and exactly 90 fail with InsufficientInventory.
#[test]
fn last_tickets_are_sold_exactly_once() {
    const STOCK: u32 = 10;
    const BUYERS: usize = 100;

    let (office, event_id) = office_with_event(Config::default(), 100);
    let category_id = allocate(&office, event_id, STOCK);
    let barrier = Arc::new(Barrier::new(BUYERS));

    let handles: Vec<_> = (0..BUYERS)
        .map(|buyer| {
            let office = Arc::clone(&office);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                office.purchase(BuyerId(buyer as u64), category_id, 1)
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("Thread panicked"))
        .collect();

    let committed = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(InventoryError::InsufficientInventory { .. })))
        .count();

    assert_eq!(committed, STOCK as usize);
    assert_eq!(rejected, BUYERS - STOCK as usize);

    let category = office.category(category_id).unwrap();
    assert_eq!(category.available_quantity, 0);
    assert_eq!(category.sold_quantity, STOCK);
    assert_eq!(office.store().ledger().len(), STOCK as usize);
    assert_consistent(&office, event_id);
}

/// Test: one seat, many buyers, repeated to shake out interleavings.
#[test]
fn single_ticket_race_has_one_winner() {
    for _ in 0..50 {
        let (office, event_id) = office_with_event(Config::default(), 1);
        let category_id = allocate(&office, event_id, 1);

        let winners = (0..16u64)
            .into_par_iter()
            .filter(|&buyer| office.purchase(BuyerId(buyer), category_id, 1).is_ok())
            .count();

        assert_eq!(winners, 1);
        assert_eq!(office.category(category_id).unwrap().available_quantity, 0);
        assert_consistent(&office, event_id);
    }
}

/// Test: mixed quantities across several categories never oversell.
///
/// Category `k` only ever receives requests for `k + 1` tickets, so the final
/// split is fully determined even though the interleaving is not.
#[test]
fn mixed_purchases_across_categories_stay_consistent() {
    let stock = [100u32, 250, 50, 300];
    let (office, event_id) = office_with_event(Config::default(), 1_000);
    let categories: Vec<_> = stock
        .iter()
        .map(|&quantity| allocate(&office, event_id, quantity))
        .collect();

    (0..2_000u64).into_par_iter().for_each(|i| {
        let k = (i % 4) as usize;
        let _ = office.purchase(BuyerId(i), categories[k], k as u32 + 1);
    });

    let sold: Vec<_> = categories
        .iter()
        .map(|&id| office.category(id).unwrap().sold_quantity)
        .collect();
    assert_eq!(sold, vec![100, 250, 48, 300]);
    for (&id, &quantity) in categories.iter().zip(&stock) {
        let category = office.category(id).unwrap();
        assert_eq!(category.available_quantity + category.sold_quantity, quantity);
    }
    assert_consistent(&office, event_id);
}

/// Test: 50 concurrent allocations of 10 against capacity 100.
///
/// The capacity check runs under the event lock, so exactly 10 succeed.
#[test]
fn concurrent_allocations_respect_capacity() {
    const ALLOCATORS: usize = 50;

    let (office, event_id) = office_with_event(Config::default(), 100);
    let barrier = Arc::new(Barrier::new(ALLOCATORS));

    let handles: Vec<_> = (0..ALLOCATORS)
        .map(|i| {
            let office = Arc::clone(&office);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let label = format!("Tier {i}");
                office.allocate_category(event_id, ORGANIZER, &label, dec!(10), 10)
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("Thread panicked"))
        .collect();

    let accepted = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(InventoryError::CapacityExceeded { .. })))
        .count();
    assert_eq!(accepted, 10);
    assert_eq!(rejected, ALLOCATORS - 10);

    let allocated: u64 = office
        .categories_for_event(event_id)
        .unwrap()
        .iter()
        .map(|c| c.allocated())
        .sum();
    assert_eq!(allocated, 100);
}

/// Test: purchases from independent async tasks.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn async_tasks_sell_exactly_the_stock() {
    const STOCK: u32 = 25;
    const REQUESTS: u64 = 200;

    let (office, event_id) = office_with_event(Config::default(), 100);
    let category_id = allocate(&office, event_id, STOCK);
    let start = Instant::now();

    let handles: Vec<_> = (0..REQUESTS)
        .map(|buyer| {
            let office = Arc::clone(&office);
            tokio::task::spawn_blocking(move || office.purchase(BuyerId(buyer), category_id, 1))
        })
        .collect();

    let results = futures::future::join_all(handles).await;
    let committed = results
        .iter()
        .filter(|r| r.as_ref().expect("Task panicked").is_ok())
        .count();

    println!(
        "{} purchase requests in {:?}, {} committed",
        REQUESTS,
        start.elapsed(),
        committed
    );

    assert_eq!(committed, STOCK as usize);
    assert_consistent(&office, event_id);
}

// === Store failures ===

/// Holds the event's lock from another thread for `hold`.
fn hold_event_lock(
    office: &Arc<BoxOffice>,
    event_id: EventId,
    hold: Duration,
) -> thread::JoinHandle<()> {
    let office = Arc::clone(office);
    let barrier = Arc::new(Barrier::new(2));
    let holder_barrier = Arc::clone(&barrier);

    let handle = thread::spawn(move || {
        office
            .store()
            .transaction(event_id, |_tx| {
                holder_barrier.wait();
                thread::sleep(hold);
                Ok(())
            })
            .unwrap();
    });

    barrier.wait();
    handle
}

/// Test: a purchase blocked past its retries fails with a store error and
/// writes nothing.
#[test]
fn lock_timeout_surfaces_store_failure() {
    let config = Config::default()
        .with_lock_timeout(Duration::from_millis(50))
        .with_commit_retries(1);
    let (office, event_id) = office_with_event(config, 100);
    let category_id = allocate(&office, event_id, 10);

    let holder = hold_event_lock(&office, event_id, Duration::from_millis(500));
    let result = office.purchase(BuyerId(1), category_id, 1);
    holder.join().expect("Thread panicked");

    assert_eq!(
        result,
        Err(InventoryError::StoreFailure(StoreError::LockTimeout(event_id)))
    );
    assert!(result.unwrap_err().is_retryable());
    assert_eq!(office.category(category_id).unwrap().available_quantity, 10);
    assert!(office.store().ledger().is_empty());
}

/// Test: the retry re-runs the purchase once the lock is released.
#[test]
fn allocation_lock_timeout_surfaces_store_failure() {
    let config = Config::default()
        .with_lock_timeout(Duration::from_millis(50))
        .with_commit_retries(1);
    let (office, event_id) = office_with_event(config, 100);

    let holder = hold_event_lock(&office, event_id, Duration::from_millis(500));
    let result = office.allocate_category(event_id, ORGANIZER, "VIP", dec!(150), 10);
    holder.join().expect("Thread panicked");

    assert_eq!(
        result,
        Err(InventoryError::StoreFailure(StoreError::LockTimeout(event_id)))
    );
    assert!(office.categories().unwrap().is_empty());
    assert_eq!(office.event(event_id).unwrap().event.available_tickets, 100);
}

#[test]
fn retry_succeeds_after_lock_release() {
    let config = Config::default()
        .with_lock_timeout(Duration::from_millis(200))
        .with_commit_retries(1);
    let (office, event_id) = office_with_event(config, 100);
    let category_id = allocate(&office, event_id, 10);

    let holder = hold_event_lock(&office, event_id, Duration::from_millis(300));
    let result = office.purchase(BuyerId(1), category_id, 4);
    holder.join().expect("Thread panicked");

    let purchase = result.unwrap();
    assert_eq!(purchase.quantity, 4);
    assert_eq!(office.category(category_id).unwrap().available_quantity, 6);
    assert_consistent(&office, event_id);
}

/// Test: a locked event does not block purchases for other events.
#[test]
fn other_events_proceed_while_one_is_locked() {
    let config = Config::default().with_lock_timeout(Duration::from_millis(50));
    let (office, busy_event) = office_with_event(config, 100);
    let other_event = office
        .create_event(
            ORGANIZER,
            NewEvent {
                name: "Opera".into(),
                description: None,
                date_time: Utc::now(),
                venue: "Hall".into(),
                capacity: 10,
            },
        )
        .unwrap()
        .id;
    let other_category = allocate(&office, other_event, 5);

    let holder = hold_event_lock(&office, busy_event, Duration::from_millis(300));
    let result = office.purchase(BuyerId(1), other_category, 1);
    holder.join().expect("Thread panicked");

    assert!(result.is_ok());
}
