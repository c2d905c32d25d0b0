// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-value bitset indexes over the frozen columnar store. Each family
//! maps a column value to the set of rows holding it; the planner ANDs
//! those sets before any row is touched. Families whose key count would
//! exceed the configured budget are skipped at build time and their
//! predicates fall back to residual evaluation.

use crate::collections::bitset::Bitset;
use crate::collections::identifiable::StringId;
use crate::ingest::dates::month_key;
use crate::storage::OfferStore;
use rustc_hash::FxHashMap;
use std::hash::Hash;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct OfferIndexes {
    rows: usize,
    pub hotel: Option<FxHashMap<u32, Bitset>>,
    pub outbound_departure_airport: Option<FxHashMap<StringId, Bitset>>,
    pub inbound_departure_airport: Option<FxHashMap<StringId, Bitset>>,
    pub outbound_arrival_airport: Option<FxHashMap<StringId, Bitset>>,
    pub inbound_arrival_airport: Option<FxHashMap<StringId, Bitset>>,
    /// Keyed by the (adults, children) pair; the two are queried together.
    pub passengers: Option<FxHashMap<(u8, u8), Bitset>>,
    pub duration: Option<FxHashMap<u16, Bitset>>,
    pub meal_type: Option<FxHashMap<StringId, Bitset>>,
    pub room_type: Option<FxHashMap<StringId, Bitset>>,
    /// Coarse bucketing of `outbound_departure_ts` by `year * 100 + month`.
    /// Exact timestamps would produce near-unique keys with no reuse;
    /// month buckets keep a date range at O(months-in-range) bitsets.
    pub departure_month: Option<FxHashMap<u32, Bitset>>,
    /// Names of families skipped for exceeding the key budget.
    pub skipped: Vec<&'static str>,
}

impl OfferIndexes {
    /// Builds every family from the frozen store, fanning out one worker
    /// per family and synchronizing before publication.
    pub fn build(store: &OfferStore, key_cap: usize) -> OfferIndexes {
        let rows = store.len();
        let (hotel, oda, ida, oaa, iaa, passengers, duration, meal, room, month) =
            std::thread::scope(|s| {
                let hotel =
                    s.spawn(|| build_family(rows, key_cap, |i| store.hotel_ids()[i]));
                let oda = s.spawn(|| {
                    build_family(rows, key_cap, |i| {
                        StringId::from_u16(store.outbound_departure_airports()[i])
                    })
                });
                let ida = s.spawn(|| {
                    build_family(rows, key_cap, |i| {
                        StringId::from_u16(store.inbound_departure_airports()[i])
                    })
                });
                let oaa = s.spawn(|| {
                    build_family(rows, key_cap, |i| {
                        StringId::from_u16(store.outbound_arrival_airports()[i])
                    })
                });
                let iaa = s.spawn(|| {
                    build_family(rows, key_cap, |i| {
                        StringId::from_u16(store.inbound_arrival_airports()[i])
                    })
                });
                let passengers = s.spawn(|| {
                    build_family(rows, key_cap, |i| {
                        (store.count_adults()[i], store.count_children()[i])
                    })
                });
                let duration =
                    s.spawn(|| build_family(rows, key_cap, |i| store.durations()[i]));
                let meal = s.spawn(|| {
                    build_family(rows, key_cap, |i| StringId::from_u16(store.meal_types()[i]))
                });
                let room = s.spawn(|| {
                    build_family(rows, key_cap, |i| StringId::from_u16(store.room_types()[i]))
                });
                let month = s.spawn(|| {
                    build_family(rows, key_cap, |i| month_key(store.outbound_departures()[i]))
                });
                (
                    hotel.join(),
                    oda.join(),
                    ida.join(),
                    oaa.join(),
                    iaa.join(),
                    passengers.join(),
                    duration.join(),
                    meal.join(),
                    room.join(),
                    month.join(),
                )
            });

        let mut skipped = Vec::new();
        let indexes = OfferIndexes {
            rows,
            hotel: publish(hotel, "hotel_id", &mut skipped),
            outbound_departure_airport: publish(oda, "outbound_departure_airport", &mut skipped),
            inbound_departure_airport: publish(ida, "inbound_departure_airport", &mut skipped),
            outbound_arrival_airport: publish(oaa, "outbound_arrival_airport", &mut skipped),
            inbound_arrival_airport: publish(iaa, "inbound_arrival_airport", &mut skipped),
            passengers: publish(passengers, "passengers", &mut skipped),
            duration: publish(duration, "duration", &mut skipped),
            meal_type: publish(meal, "meal_type", &mut skipped),
            room_type: publish(room, "room_type", &mut skipped),
            departure_month: publish(month, "departure_month", &mut skipped),
            skipped,
        };
        debug!(
            rows,
            skipped = indexes.skipped.len(),
            memory_bytes = indexes.memory_bytes(),
            "index build complete"
        );
        indexes
    }

    /// Row count of the store the indexes were built from; every bitset
    /// has exactly this many bits.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn memory_bytes(&self) -> usize {
        fn family_bytes<K>(family: &Option<FxHashMap<K, Bitset>>) -> usize {
            family
                .as_ref()
                .map(|map| map.values().map(Bitset::memory_bytes).sum())
                .unwrap_or(0)
        }
        family_bytes(&self.hotel)
            + family_bytes(&self.outbound_departure_airport)
            + family_bytes(&self.inbound_departure_airport)
            + family_bytes(&self.outbound_arrival_airport)
            + family_bytes(&self.inbound_arrival_airport)
            + family_bytes(&self.passengers)
            + family_bytes(&self.duration)
            + family_bytes(&self.meal_type)
            + family_bytes(&self.room_type)
            + family_bytes(&self.departure_month)
    }
}

fn publish<K>(
    family: std::thread::Result<Option<FxHashMap<K, Bitset>>>,
    name: &'static str,
    skipped: &mut Vec<&'static str>,
) -> Option<FxHashMap<K, Bitset>> {
    match family {
        Ok(Some(map)) => Some(map),
        Ok(None) => {
            warn!(index = name, "index family skipped: key budget exceeded");
            skipped.push(name);
            None
        }
        Err(_) => {
            warn!(index = name, "index family skipped: build worker panicked");
            skipped.push(name);
            None
        }
    }
}

fn build_family<K: Eq + Hash>(
    rows: usize,
    key_cap: usize,
    key_of: impl Fn(usize) -> K,
) -> Option<FxHashMap<K, Bitset>> {
    let mut map: FxHashMap<K, Bitset> = FxHashMap::default();
    for row in 0..rows {
        let key = key_of(row);
        if let Some(bits) = map.get_mut(&key) {
            bits.set(row);
        } else {
            if map.len() == key_cap {
                return None;
            }
            let mut bits = Bitset::new(rows);
            bits.set(row);
            map.insert(key, bits);
        }
    }
    Some(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::string_table::StringTable;
    use crate::storage::OfferRow;

    fn store_with_rows(rows: &[(u32, &str, u16)]) -> (OfferStore, StringTable) {
        let mut interner = StringTable::new();
        let mut store = OfferStore::with_capacity(rows.len());
        for (hotel_id, airport, duration) in rows {
            let airport_id = interner.intern(airport).unwrap();
            let row = OfferRow {
                hotel_id: *hotel_id,
                price: 100.0,
                count_adults: 2,
                count_children: 0,
                outbound_departure_ts: 1_717_200_000_000,
                inbound_departure_ts: 1_717_804_800_000,
                outbound_arrival_ts: 1_717_207_200_000,
                inbound_arrival_ts: 1_717_812_000_000,
                outbound_departure_airport: airport_id,
                inbound_departure_airport: airport_id,
                outbound_arrival_airport: airport_id,
                inbound_arrival_airport: airport_id,
                meal_type: StringId::ZERO,
                room_type: StringId::ZERO,
                ocean_view: false,
                duration: *duration,
            };
            store.append(&row).unwrap();
        }
        (store, interner)
    }

    #[test]
    fn test_popcount_matches_value_counts() {
        let (store, interner) = store_with_rows(&[
            (1, "FRA", 7),
            (2, "MUC", 7),
            (1, "FRA", 14),
            (3, "FRA", 7),
        ]);
        let indexes = OfferIndexes::build(&store, 1024);

        let hotel = indexes.hotel.as_ref().unwrap();
        assert_eq!(2, hotel[&1].popcount());
        assert_eq!(1, hotel[&2].popcount());
        assert_eq!(vec![0, 2], hotel[&1].iter_set_indices().collect::<Vec<_>>());

        let fra = interner.lookup("FRA").unwrap();
        let airports = indexes.outbound_departure_airport.as_ref().unwrap();
        assert_eq!(3, airports[&fra].popcount());

        let duration = indexes.duration.as_ref().unwrap();
        assert_eq!(3, duration[&7].popcount());
        assert_eq!(1, duration[&14].popcount());

        // Every row lands in exactly one bucket per family.
        let total: usize = hotel.values().map(Bitset::popcount).sum();
        assert_eq!(store.len(), total);
    }

    #[test]
    fn test_key_budget_skips_family() {
        let rows: Vec<(u32, &str, u16)> = (0..10).map(|i| (i, "FRA", 7)).collect();
        let (store, _) = store_with_rows(&rows);
        let indexes = OfferIndexes::build(&store, 4);

        // Ten distinct hotel ids exceed the cap of four.
        assert!(indexes.hotel.is_none());
        assert!(indexes.skipped.contains(&"hotel_id"));
        // One distinct airport stays well under it.
        assert!(indexes.outbound_departure_airport.is_some());
    }

    #[test]
    fn test_departure_month_buckets() {
        let mut interner = StringTable::new();
        let mut store = OfferStore::with_capacity(3);
        let airport = interner.intern("FRA").unwrap();
        for (departure, inbound) in [
            ("2024-06-01", "2024-06-08"),
            ("2024-06-30", "2024-07-07"),
            ("2024-07-01", "2024-07-08"),
        ] {
            let row = OfferRow {
                hotel_id: 1,
                price: 1.0,
                count_adults: 2,
                count_children: 0,
                outbound_departure_ts: crate::ingest::dates::parse_timestamp_ms(departure)
                    .unwrap(),
                inbound_departure_ts: crate::ingest::dates::parse_timestamp_ms(inbound).unwrap(),
                outbound_arrival_ts: 0,
                inbound_arrival_ts: 0,
                outbound_departure_airport: airport,
                inbound_departure_airport: airport,
                outbound_arrival_airport: airport,
                inbound_arrival_airport: airport,
                meal_type: StringId::ZERO,
                room_type: StringId::ZERO,
                ocean_view: false,
                duration: 7,
            };
            store.append(&row).unwrap();
        }
        let indexes = OfferIndexes::build(&store, 1024);
        let months = indexes.departure_month.as_ref().unwrap();
        assert_eq!(2, months[&202406].popcount());
        assert_eq!(1, months[&202407].popcount());
        assert!(!months.contains_key(&202408));
    }

    #[test]
    fn test_empty_store() {
        let store = OfferStore::with_capacity(0);
        let indexes = OfferIndexes::build(&store, 16);
        assert_eq!(0, indexes.rows());
        assert!(indexes.hotel.as_ref().unwrap().is_empty());
        assert!(indexes.skipped.is_empty());
    }
}
