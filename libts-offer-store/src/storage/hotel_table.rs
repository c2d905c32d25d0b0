// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::api::Hotel;
use crate::error::StoreError;
use rustc_hash::FxHashMap;

/// Hotel ids below this are direct-addressed; anything larger spills to a
/// hash map so a single stray huge id cannot balloon the dense array.
const DIRECT_LIMIT: u32 = 1 << 22;

/// A hotel record owned by the table. Offer rows hold hotel ids only.
#[derive(Clone, Debug, PartialEq)]
pub struct HotelRec {
    pub name: Box<str>,
    pub stars: f32,
}

/// hotel_id -> record lookup. Ids in the dataset are densely packed low
/// integers, so the common path is a flat array indexed by id.
#[derive(Debug, Default)]
pub struct HotelTable {
    dense: Vec<Option<HotelRec>>,
    sparse: FxHashMap<u32, HotelRec>,
    len: usize,
}

impl HotelTable {
    pub fn insert(&mut self, hotel: Hotel) -> Result<(), StoreError> {
        let rec = HotelRec {
            name: hotel.name.into_boxed_str(),
            stars: hotel.stars,
        };
        if hotel.id < DIRECT_LIMIT {
            let idx = hotel.id as usize;
            if idx >= self.dense.len() {
                self.dense.resize(idx + 1, None);
            }
            let slot = &mut self.dense[idx];
            if slot.is_some() {
                return Err(StoreError::DuplicateHotel(hotel.id));
            }
            *slot = Some(rec);
        } else {
            if self.sparse.contains_key(&hotel.id) {
                return Err(StoreError::DuplicateHotel(hotel.id));
            }
            self.sparse.insert(hotel.id, rec);
        }
        self.len += 1;
        Ok(())
    }

    #[inline]
    pub fn get(&self, id: u32) -> Option<&HotelRec> {
        if id < DIRECT_LIMIT {
            self.dense.get(id as usize)?.as_ref()
        } else {
            self.sparse.get(&id)
        }
    }

    /// O(1); offer ingest filters through this on every row.
    #[inline]
    pub fn contains(&self, id: u32) -> bool {
        self.get(id).is_some()
    }

    #[inline]
    pub fn stars(&self, id: u32) -> Option<f32> {
        self.get(id).map(|rec| rec.stars)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &HotelRec)> {
        let dense = self
            .dense
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|rec| (id as u32, rec)));
        dense.chain(self.sparse.iter().map(|(id, rec)| (*id, rec)))
    }

    pub fn memory_bytes(&self) -> usize {
        let names: usize = self.iter().map(|(_, rec)| rec.name.len()).sum();
        self.dense.capacity() * size_of::<Option<HotelRec>>()
            + self.sparse.len() * (size_of::<u32>() + size_of::<HotelRec>())
            + names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hotel(id: u32, name: &str, stars: f32) -> Hotel {
        Hotel {
            id,
            name: name.to_owned(),
            stars,
        }
    }

    #[test]
    fn test_insert_get_contains() {
        let mut table = HotelTable::default();
        table.insert(hotel(1, "Alpenhof", 4.0)).unwrap();
        table.insert(hotel(3, "Seeblick", 3.5)).unwrap();

        assert_eq!(2, table.len());
        assert!(table.contains(1));
        assert!(!table.contains(2));
        assert_eq!("Seeblick", &*table.get(3).unwrap().name);
        assert_eq!(Some(4.0), table.stars(1));
        assert_eq!(None, table.stars(999));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut table = HotelTable::default();
        table.insert(hotel(7, "first", 3.0)).unwrap();
        assert_eq!(
            Err(StoreError::DuplicateHotel(7)),
            table.insert(hotel(7, "second", 5.0))
        );
        assert_eq!(1, table.len());
        assert_eq!("first", &*table.get(7).unwrap().name);
    }

    #[test]
    fn test_sparse_spill() {
        let mut table = HotelTable::default();
        let big = u32::MAX - 1;
        table.insert(hotel(big, "edge of the id space", 5.0)).unwrap();
        assert!(table.contains(big));
        assert_eq!(
            Err(StoreError::DuplicateHotel(big)),
            table.insert(hotel(big, "again", 1.0))
        );
        // The dense side stays small.
        assert!(table.memory_bytes() < 1 << 20);
    }

    #[test]
    fn test_iter_covers_both_sides() {
        let mut table = HotelTable::default();
        table.insert(hotel(2, "a", 1.0)).unwrap();
        table.insert(hotel(u32::MAX, "b", 2.0)).unwrap();
        let mut ids: Vec<u32> = table.iter().map(|(id, _)| id).collect();
        ids.sort_unstable();
        assert_eq!(vec![2, u32::MAX], ids);
    }
}
