// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Structure-of-arrays offer storage. One contiguous typed buffer per
//! column; categorical columns hold 16-bit interned string ids and the
//! ocean-view flag packs one bit per row. Rows are append-only during
//! load and immutable afterwards; row indices are stable load order.

use crate::collections::bitset::Bitset;
use crate::collections::identifiable::StringId;
use crate::error::StoreError;

/// A single offer row with interned categorical columns. This is the
/// internal row type; the engine resolves it to [crate::api::Offer] at
/// the boundary so hot paths never touch strings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OfferRow {
    pub hotel_id: u32,
    pub price: f32,
    pub count_adults: u8,
    pub count_children: u8,
    pub outbound_departure_ts: i64,
    pub inbound_departure_ts: i64,
    pub outbound_arrival_ts: i64,
    pub inbound_arrival_ts: i64,
    pub outbound_departure_airport: StringId,
    pub inbound_departure_airport: StringId,
    pub outbound_arrival_airport: StringId,
    pub inbound_arrival_airport: StringId,
    pub meal_type: StringId,
    pub room_type: StringId,
    pub ocean_view: bool,
    pub duration: u16,
}

const WORD_BITS: usize = u64::BITS as usize;

/// Rows per block visited by [OfferStore::scan].
pub const SCAN_BLOCK: usize = 1024;

#[derive(Debug)]
pub struct OfferStore {
    capacity: usize,
    hotel_ids: Vec<u32>,
    prices: Vec<f32>,
    count_adults: Vec<u8>,
    count_children: Vec<u8>,
    outbound_departures: Vec<i64>,
    inbound_departures: Vec<i64>,
    outbound_arrivals: Vec<i64>,
    inbound_arrivals: Vec<i64>,
    outbound_departure_airports: Vec<u16>,
    inbound_departure_airports: Vec<u16>,
    outbound_arrival_airports: Vec<u16>,
    inbound_arrival_airports: Vec<u16>,
    meal_types: Vec<u16>,
    room_types: Vec<u16>,
    durations: Vec<u16>,
    /// One bit per row, append order.
    ocean_views: Vec<u64>,
}

impl OfferStore {
    /// Reserves every column at `capacity` rows. Untouched reservations
    /// cost address space, not resident memory.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            hotel_ids: Vec::with_capacity(capacity),
            prices: Vec::with_capacity(capacity),
            count_adults: Vec::with_capacity(capacity),
            count_children: Vec::with_capacity(capacity),
            outbound_departures: Vec::with_capacity(capacity),
            inbound_departures: Vec::with_capacity(capacity),
            outbound_arrivals: Vec::with_capacity(capacity),
            inbound_arrivals: Vec::with_capacity(capacity),
            outbound_departure_airports: Vec::with_capacity(capacity),
            inbound_departure_airports: Vec::with_capacity(capacity),
            outbound_arrival_airports: Vec::with_capacity(capacity),
            inbound_arrival_airports: Vec::with_capacity(capacity),
            meal_types: Vec::with_capacity(capacity),
            room_types: Vec::with_capacity(capacity),
            durations: Vec::with_capacity(capacity),
            ocean_views: Vec::with_capacity(capacity.div_ceil(WORD_BITS)),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.hotel_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hotel_ids.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends a row and returns its index.
    pub fn append(&mut self, row: &OfferRow) -> Result<u32, StoreError> {
        let index = self.len();
        if index == self.capacity {
            return Err(StoreError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        self.hotel_ids.push(row.hotel_id);
        self.prices.push(row.price);
        self.count_adults.push(row.count_adults);
        self.count_children.push(row.count_children);
        self.outbound_departures.push(row.outbound_departure_ts);
        self.inbound_departures.push(row.inbound_departure_ts);
        self.outbound_arrivals.push(row.outbound_arrival_ts);
        self.inbound_arrivals.push(row.inbound_arrival_ts);
        self.outbound_departure_airports
            .push(row.outbound_departure_airport.to_u16());
        self.inbound_departure_airports
            .push(row.inbound_departure_airport.to_u16());
        self.outbound_arrival_airports
            .push(row.outbound_arrival_airport.to_u16());
        self.inbound_arrival_airports
            .push(row.inbound_arrival_airport.to_u16());
        self.meal_types.push(row.meal_type.to_u16());
        self.room_types.push(row.room_type.to_u16());
        self.durations.push(row.duration);
        if index % WORD_BITS == 0 {
            self.ocean_views.push(0);
        }
        if row.ocean_view {
            self.ocean_views[index / WORD_BITS] |= 1 << (index % WORD_BITS);
        }
        Ok(index as u32)
    }

    /// Reconstructs row `index` from the column arrays.
    pub fn get(&self, index: u32) -> Result<OfferRow, StoreError> {
        let i = index as usize;
        if i >= self.len() {
            return Err(StoreError::OutOfBounds {
                index,
                len: self.len(),
            });
        }
        Ok(OfferRow {
            hotel_id: self.hotel_ids[i],
            price: self.prices[i],
            count_adults: self.count_adults[i],
            count_children: self.count_children[i],
            outbound_departure_ts: self.outbound_departures[i],
            inbound_departure_ts: self.inbound_departures[i],
            outbound_arrival_ts: self.outbound_arrivals[i],
            inbound_arrival_ts: self.inbound_arrivals[i],
            outbound_departure_airport: StringId::from_u16(self.outbound_departure_airports[i]),
            inbound_departure_airport: StringId::from_u16(self.inbound_departure_airports[i]),
            outbound_arrival_airport: StringId::from_u16(self.outbound_arrival_airports[i]),
            inbound_arrival_airport: StringId::from_u16(self.inbound_arrival_airports[i]),
            meal_type: StringId::from_u16(self.meal_types[i]),
            room_type: StringId::from_u16(self.room_types[i]),
            ocean_view: self.ocean_view_at(i),
            duration: self.durations[i],
        })
    }

    /// Visits rows in contiguous blocks of [SCAN_BLOCK] and sets the
    /// result bit wherever the predicate holds.
    pub fn scan<F>(&self, mut predicate: F) -> Bitset
    where
        F: FnMut(&OfferStore, u32) -> bool,
    {
        let len = self.len();
        let mut result = Bitset::new(len);
        let mut base = 0;
        while base < len {
            let end = (base + SCAN_BLOCK).min(len);
            for row in base..end {
                if predicate(self, row as u32) {
                    result.set(row);
                }
            }
            base = end;
        }
        result
    }

    // Column accessors for residual predicate evaluation; the executor
    // touches these directly instead of materializing rows.

    #[inline]
    pub fn hotel_ids(&self) -> &[u32] {
        &self.hotel_ids
    }

    #[inline]
    pub fn prices(&self) -> &[f32] {
        &self.prices
    }

    #[inline]
    pub fn count_adults(&self) -> &[u8] {
        &self.count_adults
    }

    #[inline]
    pub fn count_children(&self) -> &[u8] {
        &self.count_children
    }

    #[inline]
    pub fn outbound_departures(&self) -> &[i64] {
        &self.outbound_departures
    }

    #[inline]
    pub fn inbound_departures(&self) -> &[i64] {
        &self.inbound_departures
    }

    #[inline]
    pub fn outbound_departure_airports(&self) -> &[u16] {
        &self.outbound_departure_airports
    }

    #[inline]
    pub fn inbound_departure_airports(&self) -> &[u16] {
        &self.inbound_departure_airports
    }

    #[inline]
    pub fn outbound_arrival_airports(&self) -> &[u16] {
        &self.outbound_arrival_airports
    }

    #[inline]
    pub fn inbound_arrival_airports(&self) -> &[u16] {
        &self.inbound_arrival_airports
    }

    #[inline]
    pub fn meal_types(&self) -> &[u16] {
        &self.meal_types
    }

    #[inline]
    pub fn room_types(&self) -> &[u16] {
        &self.room_types
    }

    #[inline]
    pub fn durations(&self) -> &[u16] {
        &self.durations
    }

    #[inline]
    pub fn ocean_view_at(&self, index: usize) -> bool {
        self.ocean_views[index / WORD_BITS] & (1 << (index % WORD_BITS)) != 0
    }

    pub fn memory_bytes(&self) -> usize {
        self.hotel_ids.capacity() * size_of::<u32>()
            + self.prices.capacity() * size_of::<f32>()
            + self.count_adults.capacity()
            + self.count_children.capacity()
            + (self.outbound_departures.capacity()
                + self.inbound_departures.capacity()
                + self.outbound_arrivals.capacity()
                + self.inbound_arrivals.capacity())
                * size_of::<i64>()
            + (self.outbound_departure_airports.capacity()
                + self.inbound_departure_airports.capacity()
                + self.outbound_arrival_airports.capacity()
                + self.inbound_arrival_airports.capacity()
                + self.meal_types.capacity()
                + self.room_types.capacity()
                + self.durations.capacity())
                * size_of::<u16>()
            + self.ocean_views.capacity() * size_of::<u64>()
    }
}
