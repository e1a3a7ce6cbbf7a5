//! Recorded streams and their chunked storage
//!
//! A recording can run for minutes at hundreds of samples per second, and
//! camera frames are large. [`ChunkedBuffer`] stores entries in fixed-size
//! chunks so growing a stream never reallocates and copies everything that
//! was already captured; [`Stream`] adds the timeline invariants on top.

use serde::de::Deserializer;
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, SyncRecError};
use crate::types::{StreamKind, Timestamped};

/// Chunk size used when a buffer is rebuilt from a flat list
pub const DEFAULT_CHUNK_CAPACITY: usize = 1024;

/// Append-only storage split into fixed-capacity chunks
///
/// Every chunk except the last is full, so index lookups are O(1).
#[derive(Debug, Clone)]
pub struct ChunkedBuffer<T> {
    chunks: Vec<Vec<T>>,
    chunk_capacity: usize,
    len: usize,
}

impl<T> ChunkedBuffer<T> {
    /// Create an empty buffer with the given chunk capacity (minimum 1)
    pub fn new(chunk_capacity: usize) -> Self {
        Self {
            chunks: Vec::new(),
            chunk_capacity: chunk_capacity.max(1),
            len: 0,
        }
    }

    /// Build a buffer from a flat list
    pub fn from_vec(items: Vec<T>, chunk_capacity: usize) -> Self {
        let mut buffer = Self::new(chunk_capacity);
        for item in items {
            buffer.push(item);
        }
        buffer
    }

    /// Append an entry
    pub fn push(&mut self, item: T) {
        match self.chunks.last_mut() {
            Some(chunk) if chunk.len() < self.chunk_capacity => chunk.push(item),
            _ => {
                let mut chunk = Vec::with_capacity(self.chunk_capacity);
                chunk.push(item);
                self.chunks.push(chunk);
            }
        }
        self.len += 1;
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer holds no entries
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of allocated chunks
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Entry at `index`
    pub fn get(&self, index: usize) -> Option<&T> {
        self.chunks
            .get(index / self.chunk_capacity)
            .and_then(|chunk| chunk.get(index % self.chunk_capacity))
    }

    /// Last entry
    pub fn last(&self) -> Option<&T> {
        self.chunks.last().and_then(|chunk| chunk.last())
    }

    /// Iterate entries in order
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.chunks.iter().flatten()
    }

    /// Index of the first entry for which `pred` is false
    ///
    /// The buffer must be partitioned by `pred` (all `true` entries first).
    pub fn partition_point<P>(&self, mut pred: P) -> usize
    where
        P: FnMut(&T) -> bool,
    {
        let (mut lo, mut hi) = (0, self.len);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.get(mid) {
                Some(item) if pred(item) => lo = mid + 1,
                _ => hi = mid,
            }
        }
        lo
    }

    /// Flatten into a single contiguous vector
    pub fn materialize(self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.len);
        for chunk in self.chunks {
            out.extend(chunk);
        }
        out
    }
}

impl<T> Default for ChunkedBuffer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_CAPACITY)
    }
}

impl<T: Serialize> Serialize for ChunkedBuffer<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len))?;
        for item in self.iter() {
            seq.serialize_element(item)?;
        }
        seq.end()
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for ChunkedBuffer<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let items = Vec::<T>::deserialize(deserializer)?;
        Ok(Self::from_vec(items, DEFAULT_CHUNK_CAPACITY))
    }
}

/// An ordered sequence of samples or frames from one source
///
/// Timestamps never decrease. Only the crate appends to a stream; once a
/// stream is part of a finished recording it is read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stream<T> {
    kind: StreamKind,
    /// Rate the producer was asked for
    target_frequency: f64,
    entries: ChunkedBuffer<T>,
}

impl<T: Timestamped> Stream<T> {
    /// Create an empty stream
    pub fn new(kind: StreamKind, target_frequency: f64, chunk_capacity: usize) -> Self {
        Self {
            kind,
            target_frequency,
            entries: ChunkedBuffer::new(chunk_capacity),
        }
    }

    /// Build a stream from already-ordered entries
    pub fn from_entries(kind: StreamKind, target_frequency: f64, entries: Vec<T>) -> Result<Self> {
        let stream = Self {
            kind,
            target_frequency,
            entries: ChunkedBuffer::from_vec(entries, DEFAULT_CHUNK_CAPACITY),
        };
        stream.check_ordering()?;
        Ok(stream)
    }

    /// Append an entry, rejecting one that would go back in time
    pub(crate) fn push(&mut self, entry: T) -> Result<()> {
        if let Some(last) = self.entries.last() {
            if entry.timestamp() < last.timestamp() {
                return Err(SyncRecError::InvalidState(format!(
                    "{} entry at {:?} precedes last entry at {:?}",
                    self.kind,
                    entry.timestamp(),
                    last.timestamp()
                )));
            }
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Which source this stream came from
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Requested sampling rate in Hz
    pub fn target_frequency(&self) -> f64 {
        self.target_frequency
    }

    /// Number of entries (the achieved count)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the stream is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at `index`
    pub fn get(&self, index: usize) -> Option<&T> {
        self.entries.get(index)
    }

    /// Iterate entries in timeline order
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.entries.iter()
    }

    /// All timestamps, in order
    pub fn timestamps(&self) -> Vec<Duration> {
        self.entries.iter().map(|e| e.timestamp()).collect()
    }

    /// Timestamp of the last entry
    pub fn end_time(&self) -> Duration {
        self.entries
            .last()
            .map(|e| e.timestamp())
            .unwrap_or(Duration::ZERO)
    }

    /// Index of the entry on screen at `media_time` (hold-last, clamped)
    pub fn index_at(&self, media_time: Duration) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        let idx = self.entries.partition_point(|e| e.timestamp() <= media_time);
        Some(idx.saturating_sub(1))
    }

    /// Entries per second over `duration`
    pub fn achieved_frequency(&self, duration: Duration) -> f64 {
        let secs = duration.as_secs_f64();
        if secs <= 0.0 {
            0.0
        } else {
            self.len() as f64 / secs
        }
    }

    /// Verify the timestamp ordering invariant
    pub fn check_ordering(&self) -> Result<()> {
        let mut previous: Option<Duration> = None;
        for (i, entry) in self.entries.iter().enumerate() {
            let ts = entry.timestamp();
            if previous.is_some_and(|p| ts < p) {
                return Err(SyncRecError::InvalidState(format!(
                    "{} timestamps decrease at index {}",
                    self.kind, i
                )));
            }
            previous = Some(ts);
        }
        Ok(())
    }

    /// Give up the stream and return its entries as one vector
    pub fn into_entries(self) -> Vec<T> {
        self.entries.materialize()
    }
}
