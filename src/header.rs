use crate::{
    align::{ALIGNMENT, DSIZE, MAX_BLOCK_SIZE, WSIZE},
    error::AllocError,
    heap::Heap,
    store::BackingStore,
};

/// Boundary tag. Every block starts with a header word and ends with a footer
/// word holding the exact same value: the block size with the allocated flag
/// packed into the lowest bit. Sizes are multiples of 8 so the 3 low bits are
/// always available.
///
/// ```text
///          +-----------------------------+---+---+---+
/// Header   |         block size          | 0 | 0 | a |
///          +-----------------------------+---+---+---+
///          |                                         |
///          |      Payload (or free list links)       |
///          |                                         |
///          +-----------------------------+---+---+---+
/// Footer   |         block size          | 0 | 0 | a |
///          +-----------------------------+---+---+---+
/// ```
///
/// The size includes header and footer. Payload addresses (the addresses we
/// work with everywhere, also called `bp`) point right after the header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Tag {
    pub size: usize,
    pub allocated: bool,
}

impl Tag {
    pub fn free(size: usize) -> Self {
        Self {
            size,
            allocated: false,
        }
    }

    pub fn allocated(size: usize) -> Self {
        Self {
            size,
            allocated: true,
        }
    }

    /// Packs size and allocated bit into one word. Callers guarantee that
    /// `size <= MAX_BLOCK_SIZE`.
    pub fn pack(self) -> u32 {
        debug_assert!(self.size <= MAX_BLOCK_SIZE);
        self.size as u32 | u32::from(self.allocated)
    }

    pub fn unpack(word: u32) -> Self {
        Self {
            size: (word & !(ALIGNMENT as u32 - 1)) as usize,
            allocated: word & 0x1 != 0,
        }
    }
}

/// Address of the header of the block at `bp`.
#[inline]
pub(crate) fn header_of(bp: usize) -> usize {
    bp - WSIZE
}

/// Address of the footer of the block at `bp` with the given size.
#[inline]
pub(crate) fn footer_of(bp: usize, size: usize) -> usize {
    bp + size - DSIZE
}

impl<S: BackingStore> Heap<S> {
    /// Reads the tag stored at `offset`.
    pub fn tag(&self, offset: usize) -> Result<Tag, AllocError> {
        self.read_word(offset).map(Tag::unpack)
    }

    pub fn write_tag(&mut self, offset: usize, tag: Tag) -> Result<(), AllocError> {
        self.write_word(offset, tag.pack())
    }

    pub fn header(&self, bp: usize) -> Result<Tag, AllocError> {
        let header = bp.checked_sub(WSIZE).ok_or(AllocError::OutOfBounds { offset: bp })?;
        self.tag(header)
    }

    /// Reads the footer of the block at `bp`, locating it through the size
    /// recorded in the header.
    pub fn footer(&self, bp: usize) -> Result<Tag, AllocError> {
        let size = self.header(bp)?.size;
        let footer = (bp + size)
            .checked_sub(DSIZE)
            .ok_or(AllocError::OutOfBounds { offset: bp })?;
        self.tag(footer)
    }

    /// Writes the same tag as header and footer of the block at `bp`. The
    /// footer position is derived from `tag.size`, not from the old header.
    pub fn set_tags(&mut self, bp: usize, tag: Tag) -> Result<(), AllocError> {
        let footer = footer_of(bp, tag.size);
        self.bytes(footer, WSIZE)?;
        self.write_tag(header_of(bp), tag)?;
        self.write_tag(footer, tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::VecStore;

    #[test]
    fn pack_unpack() {
        assert_eq!(Tag::allocated(24).pack(), 25);
        assert_eq!(Tag::free(24).pack(), 24);
        assert_eq!(Tag::allocated(0).pack(), 1);

        assert_eq!(Tag::unpack(25), Tag::allocated(24));
        assert_eq!(Tag::unpack(0x10000), Tag::free(0x10000));

        // Bits 1 and 2 are never part of the size.
        assert_eq!(Tag::unpack(0b1_0110), Tag::free(16));
    }

    #[test]
    fn header_and_footer() {
        let mut heap = Heap::new(VecStore::new());
        heap.grow(64).unwrap();

        let bp = 8;
        heap.set_tags(bp, Tag::allocated(32)).unwrap();

        assert_eq!(header_of(bp), 4);
        assert_eq!(footer_of(bp, 32), 32);
        assert_eq!(heap.header(bp), Ok(Tag::allocated(32)));
        assert_eq!(heap.footer(bp), Ok(Tag::allocated(32)));
        assert_eq!(heap.read_word(32), Ok(33));

        // Footer past the end of the heap is reported, not written.
        assert_eq!(
            heap.set_tags(bp, Tag::free(128)),
            Err(AllocError::OutOfBounds { offset: 128 })
        );
        assert_eq!(heap.header(bp), Ok(Tag::allocated(32)));

        assert_eq!(heap.header(0), Err(AllocError::OutOfBounds { offset: 0 }));
    }
}
