//! Append-only timestamped sample buffers.

use serde::{Deserialize, Serialize};

/// Ordered `(timestamp, value)` samples. Insertion order is kept as is, with
/// no sorting or de-duplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampedSeries<T> {
    timestamps: Vec<u64>,
    values: Vec<T>,
}

impl<T> Default for TimestampedSeries<T> {
    fn default() -> Self {
        Self {
            timestamps: Vec::new(),
            values: Vec::new(),
        }
    }
}

impl<T> TimestampedSeries<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample taken at `timestamp_ms`.
    pub fn push(&mut self, timestamp_ms: u64, value: T) {
        self.timestamps.push(timestamp_ms);
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.timestamps.clear();
        self.values.clear();
    }

    pub fn get(&self, index: usize) -> Option<(u64, &T)> {
        Some((*self.timestamps.get(index)?, self.values.get(index)?))
    }

    /// Most recent sample.
    pub fn last(&self) -> Option<(u64, &T)> {
        Some((*self.timestamps.last()?, self.values.last()?))
    }

    pub fn timestamps(&self) -> &[u64] {
        &self.timestamps
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &T)> {
        self.timestamps.iter().copied().zip(self.values.iter())
    }
}

impl<T: Copy + Default> TimestampedSeries<T> {
    /// Most recent value, or `T::default()` when empty.
    pub fn last_value(&self) -> T {
        self.values.last().copied().unwrap_or_default()
    }
}
