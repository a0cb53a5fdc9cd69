//! Per-chunk completion bitmap.
//!
//! One bit per chunk, stored most-significant-bit first within each byte,
//! in chunk-index order. The byte representation is exactly what is
//! persisted after the payload of a temporary download file, so
//! [`ProgressBitmap::as_bytes`] and [`ProgressBitmap::from_bytes`] are the
//! only conversion points.
//!
//! The structure carries no locking of its own; the job that owns it
//! serializes mutation and persistence.

/// Persisted bit-per-chunk completion record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressBitmap {
    bytes: Vec<u8>,
    bit_count: u64,
}

impl ProgressBitmap {
    /// Create an all-zero bitmap holding `bit_count` bits.
    pub fn new(bit_count: u64) -> Self {
        Self {
            bytes: vec![0u8; Self::byte_len(bit_count)],
            bit_count,
        }
    }

    /// Rebuild a bitmap from its persisted bytes.
    ///
    /// Returns `None` if the byte count does not match `bit_count`.
    pub fn from_bytes(bytes: Vec<u8>, bit_count: u64) -> Option<Self> {
        if bytes.len() != Self::byte_len(bit_count) {
            return None;
        }
        Some(Self { bytes, bit_count })
    }

    /// Number of bytes needed to store `bit_count` bits.
    pub fn byte_len(bit_count: u64) -> usize {
        bit_count.div_ceil(8) as usize
    }

    /// Number of bits (chunks) tracked.
    pub fn len(&self) -> u64 {
        self.bit_count
    }

    pub fn is_empty(&self) -> bool {
        self.bit_count == 0
    }

    /// The persisted representation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Mark chunk `index` complete.
    ///
    /// Returns `true` if the bit was previously clear. Indices past the end
    /// are ignored.
    pub fn set(&mut self, index: u64) -> bool {
        if index >= self.bit_count {
            return false;
        }
        let (byte, mask) = locate(index);
        let was_clear = self.bytes[byte] & mask == 0;
        self.bytes[byte] |= mask;
        was_clear
    }

    /// Whether chunk `index` is complete. Indices past the end read as clear.
    pub fn test(&self, index: u64) -> bool {
        if index >= self.bit_count {
            return false;
        }
        let (byte, mask) = locate(index);
        self.bytes[byte] & mask != 0
    }

    /// First clear bit in the half-open range `[low, high)`.
    ///
    /// `None` means every chunk in the range is complete. `high` is clamped
    /// to the bitmap length.
    pub fn first_zero(&self, low: u64, high: u64) -> Option<u64> {
        let high = high.min(self.bit_count);
        (low..high).find(|&index| !self.test(index))
    }

    /// Number of complete chunks.
    pub fn count_set(&self) -> u64 {
        (0..self.bit_count).filter(|&index| self.test(index)).count() as u64
    }

    /// Whether every chunk is complete.
    pub fn is_complete(&self) -> bool {
        self.first_zero(0, self.bit_count).is_none()
    }
}

fn locate(index: u64) -> (usize, u8) {
    ((index / 8) as usize, 0x80 >> (index % 8))
}
