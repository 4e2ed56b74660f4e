//! Backing stores provide the raw bytes the allocator carves into blocks. The
//! only way a store can change is by growing at its high end, just like the
//! program break moved by `sbrk`. The allocator never asks for memory back.

/// Default capacity of a [`VecStore`], 20 MiB.
pub const DEFAULT_CAPACITY: usize = 20 * (1 << 20);

/// Interface consumed by the allocator. All offsets are relative to the
/// beginning of the store, so [`BackingStore::heap_low`] is usually 0.
pub trait BackingStore {
    /// Extends the store by `increment` bytes and returns the offset where the
    /// new bytes begin (the old break), or `None` if the store cannot grow.
    fn grow(&mut self, increment: usize) -> Option<usize>;

    /// Number of bytes granted so far.
    fn size(&self) -> usize;

    /// Every byte granted so far.
    fn bytes(&self) -> &[u8];

    /// Every byte granted so far, mutable.
    fn bytes_mut(&mut self) -> &mut [u8];

    /// Offset of the first byte in the store.
    fn heap_low(&self) -> usize {
        0
    }

    /// Offset of the last byte in the store. Equals [`BackingStore::heap_low`]
    /// when the store is still empty.
    fn heap_high(&self) -> usize {
        self.heap_low() + self.size().saturating_sub(1)
    }
}

/// Growable store backed by a [`Vec<u8>`] with a hard capacity limit. The
/// limit is what makes exhaustion observable.
#[derive(Debug, Clone)]
pub struct VecStore {
    bytes: Vec<u8>,
    capacity: usize,
}

impl VecStore {
    /// Store that can grow up to [`DEFAULT_CAPACITY`] bytes.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Store that can grow up to `capacity` bytes. Nothing is allocated until
    /// the first call to [`BackingStore::grow`].
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::new(),
            capacity,
        }
    }

    /// Maximum number of bytes this store can hand out.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for VecStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BackingStore for VecStore {
    fn grow(&mut self, increment: usize) -> Option<usize> {
        let old_break = self.bytes.len();
        let new_break = old_break.checked_add(increment)?;

        if new_break > self.capacity {
            return None;
        }

        self.bytes.resize(new_break, 0);

        Some(old_break)
    }

    fn size(&self) -> usize {
        self.bytes.len()
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}
