// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Chunked query execution. Candidate rows stream through residual
//! predicate evaluation in fixed-size chunks; aggregation keeps only
//! running per-hotel state so the working set never holds all survivors.
//! Chunk evaluation optionally fans out across a bounded worker pool;
//! the per-worker partials merge with order-independent tie-breaks, so
//! results are deterministic under any thread count.

use crate::api::{BestHotelOffer, Offer, QueryNotice, QueryResult};
use crate::collections::string_table::StringTable;
use crate::config::EngineConfig;
use crate::error::QueryError;
use crate::ingest::loader::LoadedDataset;
use crate::memory::{MemoryGovernor, Pressure};
use crate::query::criteria::ResolvedCriteria;
use crate::query::planner::{Plan, Strategy};
use crate::storage::{OfferRow, OfferStore};
use rustc_hash::FxHashMap;
use std::collections::BinaryHeap;
use std::time::Instant;

/// Chunks between governor consultations in streaming mode.
const GOVERNOR_CONSULT_INTERVAL: usize = 16;

pub(crate) struct QueryContext<'d> {
    pub dataset: &'d LoadedDataset,
    pub config: &'d EngineConfig,
    pub governor: &'d MemoryGovernor,
}

/// Per-hotel or per-query running state folded over surviving rows.
/// Merging must be commutative and associative; worker partials arrive
/// in completion order.
trait Aggregator: Clone + Send {
    fn observe(&mut self, store: &OfferStore, row: u32);
    fn merge(&mut self, other: Self);
}

struct ChunkRun {
    processed: usize,
    timed_out: bool,
}

pub(crate) fn best_by_hotel(
    ctx: &QueryContext<'_>,
    resolved: &ResolvedCriteria,
    plan: &Plan,
    deadline: Instant,
) -> Result<QueryResult<BestHotelOffer>, QueryError> {
    if plan.empty {
        return Ok(QueryResult::new(Vec::new()));
    }
    let (agg, run) = run_chunks(ctx, resolved, plan, deadline, BestByHotel::default());

    let interner = &ctx.dataset.interner;
    let mut items = Vec::with_capacity(agg.best.len());
    for (hotel_id, best) in agg.best {
        let row = ctx.dataset.store.get(best.row)?;
        let hotel = ctx
            .dataset
            .hotels
            .get(hotel_id)
            .ok_or_else(|| QueryError::Internal(format!("aggregated unknown hotel {hotel_id}")))?;
        items.push(BestHotelOffer {
            hotel_id,
            hotel_name: hotel.name.to_string(),
            hotel_stars: hotel.stars,
            min_price: best.price,
            departure_ts: row.outbound_departure_ts,
            return_ts: row.inbound_departure_ts,
            room_type: interner.resolve(row.room_type)?.to_owned(),
            meal_type: interner.resolve(row.meal_type)?.to_owned(),
            count_adults: row.count_adults,
            count_children: row.count_children,
            duration: row.duration,
            available_offers_count: best.count,
        });
    }
    items.sort_by(|a, b| {
        a.min_price
            .total_cmp(&b.min_price)
            .then(a.hotel_id.cmp(&b.hotel_id))
    });

    let mut result = QueryResult::new(items);
    if run.timed_out {
        result.notices.push(QueryNotice::Timeout {
            processed: run.processed,
            total_candidates: plan.total_candidates,
        });
    }
    Ok(result)
}

pub(crate) fn offers_for_hotel(
    ctx: &QueryContext<'_>,
    resolved: &ResolvedCriteria,
    plan: &Plan,
    deadline: Instant,
) -> Result<QueryResult<Offer>, QueryError> {
    if plan.empty {
        return Ok(QueryResult::new(Vec::new()));
    }
    let seed = TopKByPrice::new(ctx.config.max_results_per_hotel);
    let (agg, run) = run_chunks(ctx, resolved, plan, deadline, seed);

    let survivors = agg.survivors;
    let ranked = agg.heap.into_sorted_vec();
    let mut items = Vec::with_capacity(ranked.len());
    for entry in &ranked {
        let row = ctx.dataset.store.get(entry.row)?;
        items.push(resolve_offer(&row, &ctx.dataset.interner)?);
    }

    let mut result = QueryResult::new(items);
    if survivors > ranked.len() {
        result.notices.push(QueryNotice::MaxResultsClamped {
            dropped: survivors - ranked.len(),
        });
    }
    if run.timed_out {
        result.notices.push(QueryNotice::Timeout {
            processed: run.processed,
            total_candidates: plan.total_candidates,
        });
    }
    Ok(result)
}

fn resolve_offer(row: &OfferRow, interner: &StringTable) -> Result<Offer, QueryError> {
    Ok(Offer {
        hotel_id: row.hotel_id,
        price: row.price,
        count_adults: row.count_adults,
        count_children: row.count_children,
        outbound_departure_ts: row.outbound_departure_ts,
        inbound_departure_ts: row.inbound_departure_ts,
        outbound_arrival_ts: row.outbound_arrival_ts,
        inbound_arrival_ts: row.inbound_arrival_ts,
        outbound_departure_airport: interner.resolve(row.outbound_departure_airport)?.to_owned(),
        inbound_departure_airport: interner.resolve(row.inbound_departure_airport)?.to_owned(),
        outbound_arrival_airport: interner.resolve(row.outbound_arrival_airport)?.to_owned(),
        inbound_arrival_airport: interner.resolve(row.inbound_arrival_airport)?.to_owned(),
        meal_type: interner.resolve(row.meal_type)?.to_owned(),
        room_type: interner.resolve(row.room_type)?.to_owned(),
        ocean_view: row.ocean_view,
        duration: row.duration,
    })
}

/// Streams candidate rows through residual evaluation in chunks,
/// checking the deadline at every chunk boundary and consulting the
/// governor between chunks in streaming mode.
fn run_chunks<A: Aggregator>(
    ctx: &QueryContext<'_>,
    resolved: &ResolvedCriteria,
    plan: &Plan,
    deadline: Instant,
    seed: A,
) -> (A, ChunkRun) {
    let store = &ctx.dataset.store;
    let hotels = &ctx.dataset.hotels;
    let rows = store.len() as u32;
    let chunk_rows = plan.chunk_rows.max(1);
    let streaming = plan.strategy == Strategy::StreamingChunked;

    let mut candidate_iter: Box<dyn Iterator<Item = u32>> = match &plan.candidates {
        Some(bits) => Box::new(bits.iter_set_indices().map(|i| i as u32)),
        None => Box::new(0..rows),
    };

    let workers = ctx.config.worker_threads;
    if workers == 0 {
        let mut agg = seed;
        let mut run = ChunkRun {
            processed: 0,
            timed_out: false,
        };
        let mut chunk: Vec<u32> = Vec::with_capacity(chunk_rows);
        let mut chunk_index = 0usize;
        loop {
            chunk.clear();
            chunk.extend(candidate_iter.by_ref().take(chunk_rows));
            if chunk.is_empty() {
                break;
            }
            for &row in &chunk {
                if resolved.matches(store, hotels, row as usize) {
                    agg.observe(store, row);
                }
            }
            run.processed += chunk.len();
            chunk_index += 1;
            if streaming && chunk_index % GOVERNOR_CONSULT_INTERVAL == 0 {
                consult_governor(ctx);
            }
            if Instant::now() >= deadline && run.processed < plan.total_candidates {
                run.timed_out = true;
                break;
            }
        }
        return (agg, run);
    }

    let (chunk_tx, chunk_rx) = crossbeam_channel::bounded::<Vec<u32>>(workers * 2);
    let (partial_tx, partial_rx) = crossbeam_channel::unbounded::<(A, usize)>();
    let mut run = ChunkRun {
        processed: 0,
        timed_out: false,
    };
    let mut merged = seed.clone();

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let chunk_rx = chunk_rx.clone();
            let partial_tx = partial_tx.clone();
            let mut agg = seed.clone();
            scope.spawn(move || {
                let mut processed = 0usize;
                for chunk in chunk_rx {
                    for &row in &chunk {
                        if resolved.matches(store, hotels, row as usize) {
                            agg.observe(store, row);
                        }
                    }
                    processed += chunk.len();
                }
                let _ = partial_tx.send((agg, processed));
            });
        }
        drop(chunk_rx);
        drop(partial_tx);

        let mut chunk_index = 0usize;
        loop {
            let mut chunk = Vec::with_capacity(chunk_rows);
            chunk.extend(candidate_iter.by_ref().take(chunk_rows));
            if chunk.is_empty() {
                break;
            }
            if chunk_tx.send(chunk).is_err() {
                break;
            }
            chunk_index += 1;
            if streaming && chunk_index % GOVERNOR_CONSULT_INTERVAL == 0 {
                consult_governor(ctx);
            }
            if Instant::now() >= deadline {
                run.timed_out = true;
                break;
            }
        }
        drop(chunk_tx);

        for (partial, processed) in partial_rx.iter() {
            run.processed += processed;
            merged.merge(partial);
        }
    });

    // Workers drained every chunk already sent, so a deadline hit only
    // counts as a timeout while candidates remain.
    run.timed_out = run.timed_out && run.processed < plan.total_candidates;
    (merged, run)
}

fn consult_governor(ctx: &QueryContext<'_>) {
    let in_use = MemoryGovernor::resident_memory_bytes()
        .unwrap_or_else(|| ctx.dataset.memory_bytes());
    ctx.governor.observe(in_use);
    if ctx.governor.pressure() >= Pressure::High {
        ctx.governor.force_release();
    }
}

#[derive(Clone, Copy)]
struct BestAgg {
    price: f32,
    row: u32,
    count: u32,
}

/// Cheapest offer and survivor count per hotel. Ties on price go to the
/// lowest row index, which is stable load order.
#[derive(Clone, Default)]
struct BestByHotel {
    best: FxHashMap<u32, BestAgg>,
}

fn wins(price: f32, row: u32, incumbent: &BestAgg) -> bool {
    price < incumbent.price || (price == incumbent.price && row < incumbent.row)
}

impl Aggregator for BestByHotel {
    fn observe(&mut self, store: &OfferStore, row: u32) {
        let hotel_id = store.hotel_ids()[row as usize];
        let price = store.prices()[row as usize];
        match self.best.entry(hotel_id) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                let incumbent = entry.get_mut();
                incumbent.count += 1;
                if wins(price, row, incumbent) {
                    incumbent.price = price;
                    incumbent.row = row;
                }
            }
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(BestAgg {
                    price,
                    row,
                    count: 1,
                });
            }
        }
    }

    fn merge(&mut self, other: Self) {
        for (hotel_id, incoming) in other.best {
            match self.best.entry(hotel_id) {
                std::collections::hash_map::Entry::Occupied(mut entry) => {
                    let incumbent = entry.get_mut();
                    incumbent.count += incoming.count;
                    if wins(incoming.price, incoming.row, incumbent) {
                        incumbent.price = incoming.price;
                        incumbent.row = incoming.row;
                    }
                }
                std::collections::hash_map::Entry::Vacant(slot) => {
                    slot.insert(incoming);
                }
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
struct RankedRow {
    price: f32,
    row: u32,
}

impl Eq for RankedRow {}

impl Ord for RankedRow {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.price
            .total_cmp(&other.price)
            .then(self.row.cmp(&other.row))
    }
}

impl PartialOrd for RankedRow {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Running top-K cheapest rows: a max-heap of the K best so far, so the
/// materialized state is bounded by the result cap rather than the
/// survivor count.
#[derive(Clone)]
struct TopKByPrice {
    k: usize,
    heap: BinaryHeap<RankedRow>,
    survivors: usize,
}

impl TopKByPrice {
    fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.min(4096).saturating_add(1)),
            survivors: 0,
        }
    }

    fn push(&mut self, item: RankedRow) {
        if self.k == 0 {
            return;
        }
        if self.heap.len() < self.k {
            self.heap.push(item);
        } else if let Some(top) = self.heap.peek() {
            if item < *top {
                self.heap.pop();
                self.heap.push(item);
            }
        }
    }
}

impl Aggregator for TopKByPrice {
    fn observe(&mut self, store: &OfferStore, row: u32) {
        self.survivors += 1;
        self.push(RankedRow {
            price: store.prices()[row as usize],
            row,
        });
    }

    fn merge(&mut self, other: Self) {
        self.survivors += other.survivors;
        for item in other.heap {
            self.push(item);
        }
    }
}
