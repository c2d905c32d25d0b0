// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Query planning: pick the candidate row set from the prebuilt indexes
//! and choose an execution strategy. Bitset operands are ANDed in
//! ascending popcount order so an empty intersection is discovered as
//! early as possible.

use crate::collections::bitset::Bitset;
use crate::config::EngineConfig;
use crate::ingest::dates::month_key;
use crate::ingest::loader::LoadedDataset;
use crate::memory::Pressure;
use crate::query::criteria::ResolvedCriteria;
use rustc_hash::FxHashMap;
use std::hash::Hash;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Strategy {
    Sequential,
    StreamingChunked,
}

pub(crate) struct Plan {
    /// Conjunction of index bitsets; `None` means no indexed predicate
    /// applies and every row is a candidate.
    pub candidates: Option<Bitset>,
    /// An indexed predicate matched nothing; skip execution entirely.
    pub empty: bool,
    pub strategy: Strategy,
    pub chunk_rows: usize,
    pub total_candidates: usize,
}

impl Plan {
    fn empty_plan(strategy: Strategy, chunk_rows: usize) -> Plan {
        Plan {
            candidates: None,
            empty: true,
            strategy,
            chunk_rows,
            total_candidates: 0,
        }
    }
}

pub(crate) fn plan(
    dataset: &LoadedDataset,
    resolved: &ResolvedCriteria,
    config: &EngineConfig,
    pressure: Pressure,
    in_use_bytes: usize,
) -> Plan {
    let rows = dataset.store.len();
    let indexes = &dataset.indexes;

    let strategy = if rows > config.streaming_row_threshold
        || pressure >= Pressure::High
        || in_use_bytes > config.streaming_heap_threshold_bytes
    {
        Strategy::StreamingChunked
    } else {
        Strategy::Sequential
    };

    let mut operands: Vec<Bitset> = Vec::new();

    if resolved.impossible() {
        return Plan::empty_plan(strategy, config.chunk_size.max(1));
    }

    if let Some(hotel_id) = resolved.hotel_id {
        if let Some(family) = &indexes.hotel {
            match family.get(&hotel_id) {
                Some(bits) => operands.push(bits.clone()),
                None => return Plan::empty_plan(strategy, config.chunk_size.max(1)),
            }
        }
    }

    let string_sets = [
        (&resolved.airports, &indexes.outbound_departure_airport),
        (&resolved.meal_types, &indexes.meal_type),
        (&resolved.room_types, &indexes.room_type),
    ];
    for (ids, family) in string_sets {
        if let (Some(ids), Some(family)) = (ids, family) {
            match union_of(family, ids.iter().copied()) {
                Some(bits) => operands.push(bits),
                None => return Plan::empty_plan(strategy, config.chunk_size.max(1)),
            }
        }
    }

    if let (Some(pair), Some(family)) = (resolved.passengers, &indexes.passengers) {
        match family.get(&pair) {
            Some(bits) => operands.push(bits.clone()),
            None => return Plan::empty_plan(strategy, config.chunk_size.max(1)),
        }
    }

    if let (Some(duration), Some(family)) = (resolved.duration, &indexes.duration) {
        match family.get(&duration) {
            Some(bits) => operands.push(bits.clone()),
            None => return Plan::empty_plan(strategy, config.chunk_size.max(1)),
        }
    }

    // The coarse month index narrows a date range to O(months-in-range)
    // buckets; the exact bounds stay residual.
    if resolved.earliest_departure_ms.is_some() || resolved.latest_return_ms.is_some() {
        if let Some(family) = &indexes.departure_month {
            let start = resolved.earliest_departure_ms.map(month_key).unwrap_or(0);
            let end = resolved.latest_return_ms.map(month_key).unwrap_or(u32::MAX);
            let in_range = family
                .keys()
                .copied()
                .filter(|key| (start..=end).contains(key));
            match union_of(family, in_range) {
                Some(bits) => operands.push(bits),
                None => return Plan::empty_plan(strategy, config.chunk_size.max(1)),
            }
        }
    }

    // Plans with no index support touch every row; smaller chunks keep
    // the per-chunk residual work comparable.
    let chunk_rows = if operands.is_empty() {
        (config.chunk_size / 5).max(1)
    } else {
        config.chunk_size.max(1)
    };

    operands.sort_by_key(Bitset::popcount);
    let mut candidates: Option<Bitset> = None;
    for operand in operands {
        match candidates.as_mut() {
            None => candidates = Some(operand),
            Some(acc) => {
                if acc.and_assign(&operand).is_err() {
                    debug_assert!(false, "index bitsets must share the store's row count");
                    continue;
                }
                if acc.is_empty() {
                    return Plan::empty_plan(strategy, chunk_rows);
                }
            }
        }
    }

    let total_candidates = candidates.as_ref().map(Bitset::popcount).unwrap_or(rows);
    debug!(
        ?strategy,
        total_candidates,
        indexed = candidates.is_some(),
        chunk_rows,
        "query plan"
    );
    Plan {
        empty: total_candidates == 0 && candidates.is_some(),
        candidates,
        strategy,
        chunk_rows,
        total_candidates,
    }
}

/// OR of the bitsets for the given keys. `None` when no key is present in
/// the family, which means no row can match the option.
fn union_of<K: Eq + Hash>(
    family: &FxHashMap<K, Bitset>,
    keys: impl Iterator<Item = K>,
) -> Option<Bitset> {
    let mut acc: Option<Bitset> = None;
    for key in keys {
        if let Some(bits) = family.get(&key) {
            match acc.as_mut() {
                None => acc = Some(bits.clone()),
                Some(acc) => {
                    if acc.or_assign(bits).is_err() {
                        debug_assert!(false, "index bitsets must share the store's row count");
                    }
                }
            }
        }
    }
    acc
}
