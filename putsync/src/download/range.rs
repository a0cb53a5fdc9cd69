//! Byte-range assignments and chunk geometry.
//!
//! A file of `size` bytes is cut two ways: into `chunk_size` chunks (the
//! unit of resumability, one bitmap bit each) and into one contiguous
//! [`RangeAssignment`] per worker. [`ChunkLayout`] translates between the
//! two.

use super::bitmap::ProgressBitmap;

/// A worker's byte span `[offset, offset + length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeAssignment {
    pub offset: u64,
    pub length: u64,
}

impl RangeAssignment {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// First byte past the span.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// `Range` header value for this span (inclusive end).
    ///
    /// Must not be called on an empty span.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.offset, self.end() - 1)
    }
}

/// Split `[0, size)` into `workers` contiguous spans.
///
/// Every span gets `size / workers` bytes and the last one also takes the
/// `size % workers` remainder, which keeps chunk boundaries reproducible
/// between runs. A worker count of zero is treated as one.
pub fn partition(size: u64, workers: usize) -> Vec<RangeAssignment> {
    let workers = workers.max(1) as u64;
    let base = size / workers;
    let excess = size % workers;

    (0..workers)
        .map(|i| {
            let length = if i == workers - 1 { base + excess } else { base };
            RangeAssignment::new(i * base, length)
        })
        .collect()
}

/// Chunk geometry of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLayout {
    size: u64,
    chunk_size: u64,
}

impl ChunkLayout {
    /// Create a layout. A zero chunk size is treated as one byte.
    pub fn new(size: u64, chunk_size: u64) -> Self {
        Self {
            size,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Number of chunks, counting a trailing partial chunk.
    pub fn total_chunks(&self) -> u64 {
        self.size.div_ceil(self.chunk_size)
    }

    /// Length of the persisted bitmap in bytes.
    pub fn bitmap_len(&self) -> u64 {
        ProgressBitmap::byte_len(self.total_chunks()) as u64
    }

    /// First byte past chunk `index`.
    pub fn chunk_end(&self, index: u64) -> u64 {
        ((index + 1) * self.chunk_size).min(self.size)
    }

    /// Worker count actually used for this file.
    ///
    /// Capped so every range spans at least one full chunk. With that, a
    /// chunk never straddles more than two ranges, which the boundary
    /// marking rule relies on.
    pub fn effective_workers(&self, requested: usize) -> usize {
        let full_chunks = (self.size / self.chunk_size).max(1);
        let cap = usize::try_from(full_chunks).unwrap_or(usize::MAX);
        requested.clamp(1, cap)
    }

    /// Highest chunk whose last byte lies inside a range ending at `range_end`.
    ///
    /// For the range that ends the file this is the final, possibly partial,
    /// chunk.
    pub fn last_owned_chunk(&self, range_end: u64) -> Option<u64> {
        if range_end >= self.size {
            self.total_chunks().checked_sub(1)
        } else {
            (range_end / self.chunk_size).checked_sub(1)
        }
    }

    /// Chunks a range is responsible for marking, as `[low, high)`.
    pub fn window(&self, range: &RangeAssignment) -> (u64, u64) {
        let low = range.offset / self.chunk_size;
        let high = self
            .last_owned_chunk(range.end())
            .map(|last| last + 1)
            .unwrap_or(low);
        (low, high.max(low))
    }

    /// Chunks completed by a write of `[from, to)` inside a range ending at
    /// `range_end`.
    ///
    /// A chunk counts once the write produced its last byte. The range's own
    /// last chunk is held back until the write that reaches `range_end`:
    /// when the range ends mid-chunk, the bytes after that chunk belong to
    /// the neighbour's first chunk, and holding the bit back means a set bit
    /// always implies this worker delivered its whole share of that
    /// neighbour chunk too.
    pub fn completed_by_write(&self, from: u64, to: u64, range_end: u64) -> Vec<u64> {
        let mut done = Vec::new();
        if to <= from {
            return done;
        }

        let last_owned = self.last_owned_chunk(range_end);
        let reached_end = to == range_end;

        let mut index = from / self.chunk_size;
        while index < self.total_chunks() && self.chunk_end(index) <= to {
            if Some(index) != last_owned || reached_end {
                done.push(index);
            }
            index += 1;
        }

        if reached_end {
            if let Some(last) = last_owned {
                if !done.contains(&last) {
                    done.push(last);
                }
            }
        }

        done
    }

    /// Shrink a range to what is still missing according to `bitmap`.
    ///
    /// Returns `None` when the whole range is already complete. Otherwise
    /// the start moves forward to the first incomplete chunk; it never moves
    /// before the range's own offset.
    pub fn resume(
        &self,
        range: &RangeAssignment,
        bitmap: &ProgressBitmap,
    ) -> Option<RangeAssignment> {
        if range.is_empty() {
            return None;
        }

        let (low, high) = self.window(range);
        if low == high {
            return Some(*range);
        }

        let first_missing = bitmap.first_zero(low, high)?;
        let start = (first_missing * self.chunk_size).max(range.offset);
        Some(RangeAssignment::new(start, range.end() - start))
    }
}
