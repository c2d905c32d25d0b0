// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Public data types crossing the engine boundary. The presentation layer
//! consumes these as JSON, so everything here derives serde.

use crate::memory::Pressure;
use std::ops::Deref;

/// A hotel as loaded from the hotels file.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Hotel {
    pub id: u32,
    pub name: String,
    /// Star rating in [0.0, 5.0], typically at 0.5-step granularity.
    pub stars: f32,
}

/// One purchasable travel package (round-trip flight + hotel stay), fully
/// resolved back to strings. Timestamps are epoch milliseconds, UTC.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Offer {
    pub hotel_id: u32,
    pub price: f32,
    pub count_adults: u8,
    pub count_children: u8,
    pub outbound_departure_ts: i64,
    pub inbound_departure_ts: i64,
    pub outbound_arrival_ts: i64,
    pub inbound_arrival_ts: i64,
    pub outbound_departure_airport: String,
    pub inbound_departure_airport: String,
    pub outbound_arrival_airport: String,
    pub inbound_arrival_airport: String,
    pub meal_type: String,
    pub room_type: String,
    pub ocean_view: bool,
    /// Days between outbound and inbound departure.
    pub duration: u16,
}

/// Per-hotel summary emitted by best-by-hotel queries. The representative
/// fields come from the hotel's cheapest surviving offer.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BestHotelOffer {
    pub hotel_id: u32,
    pub hotel_name: String,
    pub hotel_stars: f32,
    pub min_price: f32,
    pub departure_ts: i64,
    pub return_ts: i64,
    pub room_type: String,
    pub meal_type: String,
    pub count_adults: u8,
    pub count_children: u8,
    pub duration: u16,
    pub available_offers_count: u32,
}

/// Search constraints. Every field is optional; an absent or empty field
/// means "no filter on this column". Dates are ISO-8601 strings, either
/// `YYYY-MM-DD` or a full RFC 3339 timestamp.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SearchCriteria {
    pub departure_airports: Vec<String>,
    pub earliest_departure_date: Option<String>,
    pub latest_return_date: Option<String>,
    pub count_adults: Option<u8>,
    pub count_children: Option<u8>,
    pub duration: Option<u16>,
    pub meal_types: Vec<String>,
    pub room_types: Vec<String>,
    pub ocean_view: Option<bool>,
    pub min_price: Option<f32>,
    pub max_price: Option<f32>,
    pub hotel_stars: Vec<f32>,
    /// Per-query deadline override in milliseconds. Falls back to
    /// [crate::EngineConfig::query_timeout].
    pub timeout_ms: Option<u64>,
}

/// Advisory conditions attached to a query response. These are the
/// response's error log; none of them is a failure.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum QueryNotice {
    /// The per-hotel result cap trimmed the offer list.
    MaxResultsClamped { dropped: usize },
    /// The deadline expired; the result covers `processed` of
    /// `total_candidates` candidate rows.
    Timeout {
        processed: usize,
        total_candidates: usize,
    },
    /// Criteria were narrowed because of memory pressure.
    MemoryPressureAdjusted { pressure: Pressure, detail: String },
}

/// Query items plus the advisory notices accumulated while producing
/// them. Derefs to the item slice.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryResult<T> {
    pub items: Vec<T>,
    pub notices: Vec<QueryNotice>,
}

impl<T> QueryResult<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            notices: Vec::new(),
        }
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T> Deref for QueryResult<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<T> IntoIterator for QueryResult<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Counters accumulated by a load. Soft ingest problems land here; fatal
/// ones abort the load with [crate::error::IngestError].
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LoadStats {
    pub hotels: usize,
    pub offers_appended: usize,
    /// Offers skipped at ingest: unknown hotel, unparsable required
    /// timestamp, or inverted trip dates.
    pub offers_dropped: usize,
    /// Records skipped for malformed fields under `skip_errors`.
    pub parse_errors: usize,
    /// Offers whose arrival timestamps were derived as departure + 2h.
    pub arrivals_derived: usize,
    /// Distinct strings in the interner dictionary.
    pub interner_size: usize,
    pub index_memory_bytes: usize,
    /// Index families skipped because they exceeded the key-count budget.
    pub indexes_skipped: usize,
    pub load_time_ms: u64,
}

/// Coarse progress reporting for the external caller; granularity is
/// deliberately decoupled from internal chunking.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgressEvent {
    HotelsStart,
    HotelsDone { hotels: usize },
    OffersBatch { appended: usize, dropped: usize },
    OffersDone { appended: usize, dropped: usize },
    IndexesDone,
}
