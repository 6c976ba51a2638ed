//! Fixed-size ring of recently sent log payloads, used to debounce repeats.
//!
//! Slots are reused strictly by write position. A payload drops out once
//! `capacity` other payloads have been recorded after it, however recent it is.

use std::{fmt, sync::RwLock};

use chrono::{DateTime, SubsecRound, Utc};

pub const DEFAULT_CAPACITY: usize = 20;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    pub payload: Vec<u8>,
    pub sent_at: DateTime<Utc>,
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{}, {}}}",
            String::from_utf8_lossy(&self.payload),
            self.sent_at.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

#[derive(Debug)]
struct Ring {
    slots: Vec<Option<HistoryEntry>>,
    cursor: usize,
}

#[derive(Debug)]
pub struct MessageHistory {
    capacity: usize,
    ring: RwLock<Ring>,
}

impl MessageHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            ring: RwLock::new(Ring {
                slots: vec![None; capacity],
                cursor: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Exact byte match against every occupied slot.
    pub fn contains(&self, payload: &[u8]) -> bool {
        let ring = self.ring.read().unwrap_or_else(|e| e.into_inner());
        ring.slots
            .iter()
            .flatten()
            .any(|entry| entry.payload == payload)
    }

    /// Advance the cursor and overwrite that slot unconditionally.
    pub fn record(&self, payload: &[u8]) {
        let mut ring = self.ring.write().unwrap_or_else(|e| e.into_inner());
        if ring.slots.is_empty() {
            ring.slots = vec![None; self.capacity];
            ring.cursor = 0;
        }
        ring.cursor = (ring.cursor + 1) % self.capacity;
        let cursor = ring.cursor;
        ring.slots[cursor] = Some(HistoryEntry {
            payload: payload.to_vec(),
            sent_at: Utc::now().round_subsecs(0),
        });
    }

    /// Drop every entry; storage is reallocated on the next record.
    pub fn clear(&self) {
        let mut ring = self.ring.write().unwrap_or_else(|e| e.into_inner());
        ring.slots = Vec::new();
    }

    /// Occupied slots in slot order.
    pub fn entries(&self) -> Vec<(usize, HistoryEntry)> {
        let ring = self.ring.read().unwrap_or_else(|e| e.into_inner());
        ring.slots
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.clone().map(|e| (i, e)))
            .collect()
    }

    pub fn len(&self) -> usize {
        let ring = self.ring.read().unwrap_or_else(|e| e.into_inner());
        ring.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MessageHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
