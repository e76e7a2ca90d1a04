// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Thread-local storage
//!
//! Each thread owns a growable table of pointer-sized slots. The
//! table starts at `TLS_INITIAL_SLOTS` entries and grows in
//! `TLS_EXPANSION_STEP`-sized steps up to `TLS_MAX_SLOTS` as indices
//! are allocated past the current capacity. `last_search_index` avoids
//! rescanning low slots that are known occupied on every allocation.

use crate::config::{TLS_EXPANSION_STEP, TLS_INITIAL_SLOTS, TLS_MAX_SLOTS};
use crate::error::{Error, Result};
use alloc::vec;
use alloc::vec::Vec;

pub type TlsIndex = usize;

pub struct TlsTable {
    slots: Vec<Option<usize>>,
    last_search_index: usize,
    max_tls_index: usize,
}

impl TlsTable {
    pub fn new() -> Self {
        Self {
            slots: vec![None; TLS_INITIAL_SLOTS],
            last_search_index: 0,
            max_tls_index: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn max_index_used(&self) -> usize {
        self.max_tls_index
    }

    /// Reserves the next free slot and initializes it to 0, growing
    /// the table if every existing slot is taken and there is still
    /// room under `TLS_MAX_SLOTS`.
    pub fn alloc(&mut self) -> Result<TlsIndex> {
        for offset in 0..self.slots.len() {
            let idx = (self.last_search_index + offset) % self.slots.len();
            if self.slots[idx].is_none() {
                self.slots[idx] = Some(0);
                self.last_search_index = idx;
                if idx > self.max_tls_index {
                    self.max_tls_index = idx;
                }
                return Ok(idx);
            }
        }

        if self.slots.len() >= TLS_MAX_SLOTS {
            return Err(Error::NoMoreEntries);
        }

        let grow_to = core::cmp::min(self.slots.len() + TLS_EXPANSION_STEP, TLS_MAX_SLOTS);
        let new_index = self.slots.len();
        self.slots.resize(grow_to, None);
        self.slots[new_index] = Some(0);
        self.last_search_index = new_index;
        self.max_tls_index = new_index;
        Ok(new_index)
    }

    pub fn get(&self, index: TlsIndex) -> Result<usize> {
        self.slots
            .get(index)
            .and_then(|s| *s)
            .ok_or(Error::InvalidParameter)
    }

    pub fn set(&mut self, index: TlsIndex, value: usize) -> Result<()> {
        match self.slots.get_mut(index) {
            Some(slot @ Some(_)) => {
                *slot = Some(value);
                Ok(())
            }
            _ => Err(Error::InvalidParameter),
        }
    }

    pub fn free(&mut self, index: TlsIndex) -> Result<()> {
        match self.slots.get_mut(index) {
            Some(slot @ Some(_)) => {
                *slot = None;
                Ok(())
            }
            _ => Err(Error::InvalidParameter),
        }
    }
}

impl Default for TlsTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_set_get_round_trip() {
        let mut table = TlsTable::new();
        let idx = table.alloc().unwrap();
        table.set(idx, 0xdead_beef).unwrap();
        assert_eq!(table.get(idx).unwrap(), 0xdead_beef);
    }

    #[test]
    fn freed_slot_is_reused_before_growing() {
        let mut table = TlsTable::new();
        let idx = table.alloc().unwrap();
        table.free(idx).unwrap();
        let cap_before = table.capacity();
        let idx2 = table.alloc().unwrap();
        assert_eq!(table.capacity(), cap_before);
        assert_eq!(idx, idx2);
    }

    #[test]
    fn table_grows_past_initial_capacity() {
        let mut table = TlsTable::new();
        for _ in 0..TLS_INITIAL_SLOTS {
            table.alloc().unwrap();
        }
        assert_eq!(table.capacity(), TLS_INITIAL_SLOTS);
        let idx = table.alloc().unwrap();
        assert_eq!(idx, TLS_INITIAL_SLOTS);
        assert_eq!(table.capacity(), TLS_INITIAL_SLOTS + TLS_EXPANSION_STEP);
    }

    #[test]
    fn get_set_free_on_unallocated_slot_errors() {
        let mut table = TlsTable::new();
        assert!(table.get(5).is_err());
        assert!(table.set(5, 1).is_err());
        assert!(table.free(5).is_err());
    }
}
