// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::hash::BuildHasherDefault;

pub type FxIndexSet<K> = indexmap::IndexSet<K, BuildHasherDefault<rustc_hash::FxHasher>>;

pub trait Id: Copy + Eq {
    type RawId;

    /// Convert from a usize offset into an Id. This should be loss-less
    /// except for certain edges.
    /// # Panics
    /// Panics if the usize cannot be represented in the Id, for instance if
    /// the offset cannot fit in the underlying integer type. Callers are
    /// expected to check capacity before minting new offsets.
    fn from_offset(inner: usize) -> Self;

    fn to_raw_id(&self) -> Self::RawId;
}

/// Identifies an interned string by its insertion order in the string
/// table. The id space is deliberately 16-bit: the categorical columns
/// (airports, meal types, room types) have small cardinalities, and a
/// two-byte column is the main memory saving at 100M offer rows.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct StringId(u16);

impl StringId {
    pub const ZERO: StringId = StringId(0);

    /// Total size of the id space, and the hard cap on distinct strings.
    pub const MAX_STRINGS: usize = u16::MAX as usize + 1;

    #[inline]
    pub fn to_offset(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn to_u16(self) -> u16 {
        self.0
    }

    #[inline]
    pub fn from_u16(raw: u16) -> Self {
        Self(raw)
    }
}

impl Id for StringId {
    type RawId = u16;

    fn from_offset(inner: usize) -> Self {
        #[allow(clippy::expect_used)]
        Self(u16::try_from(inner).expect("StringId to fit into a u16"))
    }

    fn to_raw_id(&self) -> u16 {
        self.0
    }
}
