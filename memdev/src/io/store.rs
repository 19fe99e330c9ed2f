//! Growable zero-filled byte store
//!
//! The store owns one contiguous region of `capacity` bytes. Only the first
//! `size` bytes hold written data; the rest is always zero, so a read can
//! never observe memory that no write put there.
//!
//! The store does no locking of its own. Every method that takes `&mut self`
//! is expected to run under the device's access gate.

use std::cmp;

use crate::config::{capacity_for, StoreConfig};
use crate::error::StoreError;

/// Copy the live prefix of `old` into a fresh region of `new_capacity` bytes.
///
/// Bytes `[0, size)` are copied from `old`, bytes `[size, new_capacity)` are
/// zero. Returns [`StoreError::AllocationExhausted`] if the allocator refuses
/// the region.
///
/// # Panics
///
/// Panics if `size` exceeds `old.len()` or `new_capacity`.
pub fn grown(old: &[u8], size: usize, new_capacity: usize) -> Result<Box<[u8]>, StoreError> {
    assert!(size <= old.len() && size <= new_capacity);

    let mut data = Vec::new();
    data.try_reserve_exact(new_capacity)
        .map_err(|_| StoreError::AllocationExhausted {
            requested: new_capacity,
        })?;
    data.extend_from_slice(&old[..size]);
    data.resize(new_capacity, 0);
    Ok(data.into_boxed_slice())
}

/// In-memory byte store with doubling growth
pub struct ByteStore {
    data: Box<[u8]>,
    size: usize,
    page_size: usize,
    order: u8,
    max_capacity: Option<usize>,
}

impl ByteStore {
    /// Allocate the initial zeroed region described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] for an inconsistent configuration
    /// and [`StoreError::AllocationExhausted`] if the initial region cannot be
    /// allocated.
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;
        let capacity = config.initial_capacity().ok_or_else(|| {
            StoreError::InvalidConfig("initial capacity overflows".to_string())
        })?;
        let data = grown(&[], 0, capacity)?;
        log::debug!("store: allocated {capacity} bytes (order {})", config.initial_order);

        Ok(Self {
            data,
            size: 0,
            page_size: config.page_size,
            order: config.initial_order,
            max_capacity: config.max_capacity,
        })
    }

    /// Number of valid bytes
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Allocated bytes
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// log2 of the allocated page count
    #[must_use]
    pub fn order(&self) -> u8 {
        self.order
    }

    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// The whole allocated region, including the zero tail past `size`
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.data
    }

    /// The valid bytes
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.size]
    }

    /// Double the capacity, preserving the data and zeroing the new space.
    ///
    /// Returns the new capacity. On failure the store is left as it was.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AllocationExhausted`] if the doubled capacity
    /// overflows, exceeds the configured maximum, or cannot be allocated.
    pub fn grow(&mut self) -> Result<usize, StoreError> {
        let order = self.order.saturating_add(1);
        let new_capacity = capacity_for(self.page_size, order).ok_or(
            StoreError::AllocationExhausted {
                requested: self.capacity().saturating_mul(2),
            },
        )?;
        if self.max_capacity.is_some_and(|max| new_capacity > max) {
            return Err(StoreError::AllocationExhausted {
                requested: new_capacity,
            });
        }

        self.data = grown(&self.data, self.size, new_capacity)?;
        self.order = order;
        log::debug!("store: grew to {new_capacity} bytes (order {order})");
        Ok(new_capacity)
    }

    /// Write `src` at `offset`, growing as needed.
    ///
    /// `offset` may not be past the end of the valid data. If growth fails,
    /// only the bytes that fit in the current capacity are written. Returns
    /// the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::OutOfRange`] if `offset > size`.
    pub fn write_at(&mut self, offset: usize, src: &[u8]) -> Result<usize, StoreError> {
        if offset > self.size {
            return Err(StoreError::out_of_range(offset as u64, self.size));
        }

        // offset <= capacity <= isize::MAX and src.len() <= isize::MAX, no overflow
        let mut count = src.len();
        while offset + count > self.capacity() {
            if let Err(e) = self.grow() {
                log::warn!(
                    "store: growth failed ({e}), writing {} of {count} bytes",
                    self.capacity() - offset
                );
                count = self.capacity() - offset;
                break;
            }
        }

        self.write_range(offset, &src[..count]);
        self.size = cmp::max(self.size, offset + count);
        Ok(count)
    }

    /// Read into `dst` from `offset`, clamped to the valid data.
    ///
    /// Returns the number of bytes read.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::OutOfRange`] if `offset >= size`: reading at the
    /// end is an error, not an empty read.
    pub fn read_at(&self, offset: usize, dst: &mut [u8]) -> Result<usize, StoreError> {
        if offset >= self.size {
            return Err(StoreError::out_of_range(offset as u64, self.size));
        }

        let count = cmp::min(dst.len(), self.size - offset);
        self.read_range(offset, &mut dst[..count]);
        Ok(count)
    }

    fn write_range(&mut self, offset: usize, src: &[u8]) {
        self.data[offset..offset + src.len()].copy_from_slice(src);
    }

    fn read_range(&self, offset: usize, dst: &mut [u8]) {
        dst.copy_from_slice(&self.data[offset..offset + dst.len()]);
    }
}

impl std::fmt::Debug for ByteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ByteStore(size={}, capacity={}, order={}, page_size={})",
            self.size,
            self.capacity(),
            self.order,
            self.page_size
        )
    }
}
