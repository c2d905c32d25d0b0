// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::collections::identifiable::{FxIndexSet, Id, StringId};
use crate::error::InternerError;

type HashSet = FxIndexSet<Box<str>>;

/// Holds unique strings and provides [StringId]s that correspond to the
/// order that the strings were inserted. The table owns its string
/// storage; every offer row holds ids only.
#[derive(Debug)]
pub struct StringTable {
    /// The ordered hash set of unique strings. The order becomes the
    /// StringId.
    strings: HashSet,

    /// Bytes held by the string payloads, tracked for load stats and the
    /// memory governor.
    payload_bytes: usize,
}

impl Default for StringTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StringTable {
    /// Creates a new string table, which initially holds the empty string
    /// and no others.
    pub fn new() -> Self {
        let mut strings = HashSet::default();
        // A fresh set's first allocation tends to be tiny (capacity 3 or
        // so), and the categorical vocabulary of even a small offers file
        // lands well above that. Skip the obviously bad sizes.
        strings.reserve(32);

        // Always hold the empty string as item 0, so that absent optional
        // fields intern without a lookup.
        strings.insert("".into());

        Self {
            strings,
            payload_bytes: 0,
        }
    }

    /// Returns the number of strings currently held in the string table.
    #[inline]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Adds the string to the string table if it isn't present already, and
    /// returns a [StringId] that corresponds to the order that this string
    /// was originally inserted.
    ///
    /// Fails with [InternerError::Full] once 65,536 distinct strings are
    /// held; ids must stay representable in the u16 columns.
    pub fn intern(&mut self, str: &str) -> Result<StringId, InternerError> {
        if let Some(offset) = self.strings.get_index_of(str) {
            return Ok(StringId::from_offset(offset));
        }
        if self.strings.len() == StringId::MAX_STRINGS {
            return Err(InternerError::Full);
        }
        let string_id = StringId::from_offset(self.strings.len());
        self.payload_bytes += str.len();
        self.strings.insert(str.into());
        Ok(string_id)
    }

    /// Returns the id of a string that is already present, without
    /// inserting. Query planning resolves criteria through this so that
    /// unknown filter values never grow the dictionary.
    pub fn lookup(&self, str: &str) -> Option<StringId> {
        self.strings.get_index_of(str).map(StringId::from_offset)
    }

    /// Returns the original string for an id handed out by [Self::intern].
    pub fn resolve(&self, id: StringId) -> Result<&str, InternerError> {
        self.strings
            .get_index(id.to_offset())
            .map(|s| s.as_ref())
            .ok_or(InternerError::BadId {
                id: id.to_u16(),
                len: self.strings.len(),
            })
    }

    /// Approximate heap footprint of the table.
    pub fn memory_bytes(&self) -> usize {
        self.payload_bytes + self.strings.capacity() * size_of::<Box<str>>()
    }
}
