use std::ops::Range;

use crate::{error::AllocError, store::BackingStore};

/// Raw view of the heap as a byte arena. Block addresses are byte offsets
/// into the backing store and every read or write is checked against the
/// bytes the store has granted so far, so a corrupted tag can at worst
/// produce an [`AllocError::OutOfBounds`], never touch memory we don't own.
///
/// Words (boundary tags) are 4 bytes and links are 8 bytes, both little
/// endian. Everything that knows what those words *mean* lives in
/// [`crate::header`], [`crate::block`] and [`crate::freelist`].
#[derive(Debug)]
pub(crate) struct Heap<S> {
    store: S,
}

impl<S: BackingStore> Heap<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Current heap size in bytes.
    pub fn len(&self) -> usize {
        self.store.size()
    }

    /// Asks the backing store for `increment` more bytes. Returns the offset
    /// of the first new byte.
    pub fn grow(&mut self, increment: usize) -> Result<usize, AllocError> {
        self.store.grow(increment).ok_or_else(|| {
            log::warn!("backing store exhausted, cannot grow by {increment} bytes");
            AllocError::Exhausted {
                requested: increment,
            }
        })
    }

    fn range(&self, offset: usize, length: usize) -> Result<Range<usize>, AllocError> {
        match offset.checked_add(length) {
            Some(end) if end <= self.store.size() => Ok(offset..end),
            _ => Err(AllocError::OutOfBounds { offset }),
        }
    }

    /// Returns `length` bytes starting at `offset`.
    pub fn bytes(&self, offset: usize, length: usize) -> Result<&[u8], AllocError> {
        let range = self.range(offset, length)?;
        Ok(&self.store.bytes()[range])
    }

    /// Returns `length` mutable bytes starting at `offset`.
    pub fn bytes_mut(&mut self, offset: usize, length: usize) -> Result<&mut [u8], AllocError> {
        let range = self.range(offset, length)?;
        Ok(&mut self.store.bytes_mut()[range])
    }

    pub fn read_word(&self, offset: usize) -> Result<u32, AllocError> {
        let mut word = [0; 4];
        word.copy_from_slice(self.bytes(offset, 4)?);
        Ok(u32::from_le_bytes(word))
    }

    pub fn write_word(&mut self, offset: usize, value: u32) -> Result<(), AllocError> {
        self.bytes_mut(offset, 4)?.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn read_u64(&self, offset: usize) -> Result<u64, AllocError> {
        let mut word = [0; 8];
        word.copy_from_slice(self.bytes(offset, 8)?);
        Ok(u64::from_le_bytes(word))
    }

    pub fn write_u64(&mut self, offset: usize, value: u64) -> Result<(), AllocError> {
        self.bytes_mut(offset, 8)?.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Moves `length` bytes from `src` to `dest`. Ranges may overlap.
    pub fn copy_within(
        &mut self,
        src: usize,
        dest: usize,
        length: usize,
    ) -> Result<(), AllocError> {
        let source = self.range(src, length)?;
        self.range(dest, length)?;
        self.store.bytes_mut().copy_within(source, dest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::VecStore;

    #[test]
    fn words_are_bounds_checked() {
        let mut heap = Heap::new(VecStore::with_capacity(16));
        assert_eq!(heap.read_word(0), Err(AllocError::OutOfBounds { offset: 0 }));

        heap.grow(16).unwrap();
        heap.write_word(12, 0xdead_beef).unwrap();
        assert_eq!(heap.read_word(12), Ok(0xdead_beef));
        assert_eq!(heap.bytes(12, 4).unwrap(), &[0xef, 0xbe, 0xad, 0xde]);

        assert_eq!(
            heap.write_word(13, 1),
            Err(AllocError::OutOfBounds { offset: 13 })
        );
        assert_eq!(
            heap.read_u64(usize::MAX),
            Err(AllocError::OutOfBounds { offset: usize::MAX })
        );

        heap.write_u64(0, u64::MAX - 1).unwrap();
        assert_eq!(heap.read_u64(0), Ok(u64::MAX - 1));
    }

    #[test]
    fn exhaustion() {
        let mut heap = Heap::new(VecStore::with_capacity(16));
        assert_eq!(heap.grow(8), Ok(0));
        assert_eq!(heap.grow(16), Err(AllocError::Exhausted { requested: 16 }));
        assert_eq!(heap.len(), 8);
    }

    #[test]
    fn overlapping_copy() {
        let mut heap = Heap::new(VecStore::new());
        heap.grow(16).unwrap();
        heap.bytes_mut(0, 8).unwrap().copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);

        heap.copy_within(0, 4, 8).unwrap();
        assert_eq!(heap.bytes(4, 8).unwrap(), &[1, 2, 3, 4, 5, 6, 7, 8]);

        assert!(heap.copy_within(0, 12, 8).is_err());
    }
}
