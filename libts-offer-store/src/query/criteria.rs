// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Criteria validation and resolution. String options are resolved
//! through the interner exactly once per query (never inserting), date
//! bounds become epoch-millis day bounds, and the resolved form carries
//! everything the hot row-match path needs without touching a string.

use crate::api::{QueryNotice, SearchCriteria};
use crate::collections::identifiable::StringId;
use crate::collections::string_table::StringTable;
use crate::error::QueryError;
use crate::ingest::dates::{end_of_day_ms, parse_date, start_of_day_ms, MILLIS_PER_DAY};
use crate::memory::Pressure;
use crate::storage::{HotelTable, OfferStore};
use smallvec::SmallVec;

pub(crate) type IdSet = SmallVec<[StringId; 4]>;

/// Criteria after validation and interner resolution. `None` means "no
/// filter"; an empty id set means the option named only strings unknown
/// to the dictionary, so nothing can match.
#[derive(Debug)]
pub(crate) struct ResolvedCriteria {
    pub airports: Option<IdSet>,
    pub earliest_departure_ms: Option<i64>,
    pub latest_return_ms: Option<i64>,
    /// Exact (adults, children) pair; an absent side defaults to zero
    /// because the pair is queried as a unit.
    pub passengers: Option<(u8, u8)>,
    pub duration: Option<u16>,
    pub meal_types: Option<IdSet>,
    pub room_types: Option<IdSet>,
    pub ocean_view: Option<bool>,
    pub min_price: Option<f32>,
    pub max_price: Option<f32>,
    /// Star ratings in half-star units ((stars * 10).round()), sidestepping
    /// f32 equality.
    pub star_units: Option<SmallVec<[i32; 6]>>,
    /// Set by offers-for-hotel.
    pub hotel_id: Option<u32>,
}

impl ResolvedCriteria {
    pub fn resolve(
        criteria: &SearchCriteria,
        interner: &StringTable,
    ) -> Result<Self, QueryError> {
        let earliest_departure_ms = parse_bound(
            criteria.earliest_departure_date.as_deref(),
            "earliest_departure_date",
            start_of_day_ms,
        )?;
        let latest_return_ms = parse_bound(
            criteria.latest_return_date.as_deref(),
            "latest_return_date",
            end_of_day_ms,
        )?;
        if let (Some(earliest), Some(latest)) = (earliest_departure_ms, latest_return_ms) {
            if earliest > latest {
                return Err(QueryError::InvalidCriteria(
                    "earliest_departure_date is after latest_return_date".to_owned(),
                ));
            }
        }
        if let (Some(min), Some(max)) = (criteria.min_price, criteria.max_price) {
            if min > max {
                return Err(QueryError::InvalidCriteria(
                    "min_price is greater than max_price".to_owned(),
                ));
            }
        }

        let passengers = if criteria.count_adults.is_some() || criteria.count_children.is_some() {
            Some((
                criteria.count_adults.unwrap_or(0),
                criteria.count_children.unwrap_or(0),
            ))
        } else {
            None
        };

        let star_units = if criteria.hotel_stars.is_empty() {
            None
        } else {
            Some(
                criteria
                    .hotel_stars
                    .iter()
                    .map(|stars| star_units_of(*stars))
                    .collect(),
            )
        };

        Ok(Self {
            airports: resolve_set(&criteria.departure_airports, interner),
            earliest_departure_ms,
            latest_return_ms,
            passengers,
            duration: criteria.duration,
            meal_types: resolve_set(&criteria.meal_types, interner),
            room_types: resolve_set(&criteria.room_types, interner),
            ocean_view: criteria.ocean_view,
            min_price: criteria.min_price,
            max_price: criteria.max_price,
            star_units,
            hotel_id: None,
        })
    }

    /// True when a string option resolved to nothing; the planner
    /// short-circuits to an empty result.
    pub fn impossible(&self) -> bool {
        matches!(&self.airports, Some(ids) if ids.is_empty())
            || matches!(&self.meal_types, Some(ids) if ids.is_empty())
            || matches!(&self.room_types, Some(ids) if ids.is_empty())
    }

    /// Full predicate evaluation against the column arrays. Index
    /// bitsets only narrow candidates; every predicate is re-checked
    /// here so skipped index families cost selectivity, not correctness.
    pub fn matches(&self, store: &OfferStore, hotels: &HotelTable, row: usize) -> bool {
        if let Some(hotel_id) = self.hotel_id {
            if store.hotel_ids()[row] != hotel_id {
                return false;
            }
        }
        if let Some(ids) = &self.airports {
            if !ids.contains(&StringId::from_u16(store.outbound_departure_airports()[row])) {
                return false;
            }
        }
        if let Some(earliest) = self.earliest_departure_ms {
            if store.outbound_departures()[row] < earliest {
                return false;
            }
        }
        if let Some(latest) = self.latest_return_ms {
            if store.inbound_departures()[row] > latest {
                return false;
            }
        }
        if let Some((adults, children)) = self.passengers {
            if store.count_adults()[row] != adults || store.count_children()[row] != children {
                return false;
            }
        }
        if let Some(duration) = self.duration {
            if store.durations()[row] != duration {
                return false;
            }
        }
        if let Some(ids) = &self.meal_types {
            if !ids.contains(&StringId::from_u16(store.meal_types()[row])) {
                return false;
            }
        }
        if let Some(ids) = &self.room_types {
            if !ids.contains(&StringId::from_u16(store.room_types()[row])) {
                return false;
            }
        }
        if let Some(ocean_view) = self.ocean_view {
            if store.ocean_view_at(row) != ocean_view {
                return false;
            }
        }
        let price = store.prices()[row];
        if let Some(min) = self.min_price {
            if price < min {
                return false;
            }
        }
        if let Some(max) = self.max_price {
            if price > max {
                return false;
            }
        }
        if let Some(units) = &self.star_units {
            match hotels.stars(store.hotel_ids()[row]) {
                Some(stars) if units.contains(&star_units_of(stars)) => {}
                _ => return false,
            }
        }
        true
    }
}

pub(crate) fn star_units_of(stars: f32) -> i32 {
    (stars * 10.0).round() as i32
}

fn parse_bound(
    raw: Option<&str>,
    name: &str,
    to_ms: fn(chrono::NaiveDate) -> i64,
) -> Result<Option<i64>, QueryError> {
    raw.map(|raw| {
        parse_date(raw).map(to_ms).ok_or_else(|| {
            QueryError::InvalidCriteria(format!("unparsable {name} '{raw}'"))
        })
    })
    .transpose()
}

fn resolve_set(values: &[String], interner: &StringTable) -> Option<IdSet> {
    if values.is_empty() {
        return None;
    }
    Some(
        values
            .iter()
            .filter_map(|value| interner.lookup(value.trim()))
            .collect(),
    )
}

/// Pressure-driven criteria narrowing. Production query paths apply this
/// before planning; every adjustment is reported back as a notice.
pub(crate) fn apply_pressure_trim(
    resolved: &mut ResolvedCriteria,
    pressure: Pressure,
) -> Vec<QueryNotice> {
    let mut notices = Vec::new();
    let airport_cap = match pressure {
        Pressure::Low => None,
        Pressure::Medium => Some(5),
        Pressure::High => Some(3),
        Pressure::Critical => Some(1),
    };
    if let (Some(cap), Some(airports)) = (airport_cap, resolved.airports.as_mut()) {
        if airports.len() > cap {
            airports.truncate(cap);
            notices.push(QueryNotice::MemoryPressureAdjusted {
                pressure,
                detail: format!("departure airport list trimmed to {cap}"),
            });
        }
    }
    if pressure == Pressure::Critical {
        const WINDOW_MS: i64 = 30 * MILLIS_PER_DAY;
        let clamped = match (resolved.earliest_departure_ms, resolved.latest_return_ms) {
            (Some(earliest), Some(latest)) if latest - earliest > WINDOW_MS => {
                resolved.latest_return_ms = Some(earliest + WINDOW_MS);
                true
            }
            (Some(earliest), None) => {
                resolved.latest_return_ms = Some(earliest + WINDOW_MS);
                true
            }
            (None, Some(latest)) => {
                resolved.earliest_departure_ms = Some(latest - WINDOW_MS);
                true
            }
            _ => false,
        };
        if clamped {
            notices.push(QueryNotice::MemoryPressureAdjusted {
                pressure,
                detail: "date window clamped to 30 days".to_owned(),
            });
        }
    }
    notices
}
