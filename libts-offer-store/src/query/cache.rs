// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Small LRU over recently executed query results, keyed by a canonical
//! hash of the criteria. Optional: a zero capacity disables it entirely,
//! and disabling must never change query results. One mutex, no sharding;
//! the cache is tiny and queries are read-heavy anyway.

use crate::api::SearchCriteria;
use parking_lot::Mutex;
use std::hash::{Hash, Hasher};

pub(crate) struct QueryCache<T> {
    capacity: usize,
    /// MRU at the back.
    entries: Mutex<Vec<(u64, T)>>,
}

impl<T: Clone> QueryCache<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    pub fn get(&self, key: u64) -> Option<T> {
        if self.capacity == 0 {
            return None;
        }
        let mut entries = self.entries.lock();
        let position = entries.iter().position(|(k, _)| *k == key)?;
        let entry = entries.remove(position);
        let value = entry.1.clone();
        entries.push(entry);
        Some(value)
    }

    pub fn put(&self, key: u64, value: T) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        if let Some(position) = entries.iter().position(|(k, _)| *k == key) {
            entries.remove(position);
        } else if entries.len() == self.capacity {
            entries.remove(0);
        }
        entries.push((key, value));
    }

    /// Dropped wholesale on re-load and by governor-forced releases.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Canonical criteria hash. Floats hash by bit pattern; all prices in the
/// dataset are finite non-negative values, so bit equality is value
/// equality here.
pub(crate) fn criteria_key(criteria: &SearchCriteria) -> u64 {
    let mut hasher = rustc_hash::FxHasher::default();
    criteria.departure_airports.hash(&mut hasher);
    criteria.earliest_departure_date.hash(&mut hasher);
    criteria.latest_return_date.hash(&mut hasher);
    criteria.count_adults.hash(&mut hasher);
    criteria.count_children.hash(&mut hasher);
    criteria.duration.hash(&mut hasher);
    criteria.meal_types.hash(&mut hasher);
    criteria.room_types.hash(&mut hasher);
    criteria.ocean_view.hash(&mut hasher);
    criteria.min_price.map(f32::to_bits).hash(&mut hasher);
    criteria.max_price.map(f32::to_bits).hash(&mut hasher);
    for stars in &criteria.hotel_stars {
        stars.to_bits().hash(&mut hasher);
    }
    criteria.timeout_ms.hash(&mut hasher);
    hasher.finish()
}
