//! Memory limited row buffer.

use csv::ByteRecord;
use rayon;

/// Row buffer limited by the total size of the row fields.
pub struct RowBuffer {
    limit: u64,
    current_size: u64,
    inner: Vec<ByteRecord>,
}

impl RowBuffer {
    pub fn new(limit: u64) -> Self {
        RowBuffer {
            limit,
            current_size: 0,
            inner: Vec::new(),
        }
    }

    /// Adds a new row to the buffer.
    pub fn push(&mut self, row: ByteRecord) {
        self.current_size += row_size(&row);
        self.inner.push(row);
    }

    /// Returns buffered rows number.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Checks if the buffer reached the limit.
    pub fn is_full(&self) -> bool {
        self.current_size >= self.limit
    }

    pub fn mem_size(&self) -> u64 {
        self.current_size
    }

    /// Takes all buffered rows out leaving the buffer empty.
    pub fn drain(&mut self) -> std::vec::Drain<'_, ByteRecord> {
        self.current_size = 0;
        self.inner.drain(..)
    }
}

impl rayon::slice::ParallelSliceMut<ByteRecord> for RowBuffer {
    fn as_parallel_slice_mut(&mut self) -> &mut [ByteRecord] {
        self.inner.as_mut_slice()
    }
}

/// Approximate row size: the sum of its field lengths.
pub fn row_size(row: &ByteRecord) -> u64 {
    row.as_slice().len() as u64
}
