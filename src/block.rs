use crate::{
    align::{DSIZE, LINK_SIZE},
    error::AllocError,
    header::{header_of, Tag},
    heap::Heap,
    store::BackingStore,
};

/// Decoded view of a block. Whether the payload bytes hold free list links
/// or client data is decided only by the allocated flag in the header, so a
/// block is read as one of these two variants and never both:
///
/// ```text
///            Allocated                              Free
/// +----------------------------+      +----------------------------+
/// | header: size | 1           |      | header: size | 0           |
/// +----------------------------+      +----------------------------+
/// |                            |      | prev free block (8 bytes)  |
/// |        Client data         |      +----------------------------+
/// |                            |      | next free block (8 bytes)  |
/// |                            |      +----------------------------+
/// |                            |      |          unused            |
/// +----------------------------+      +----------------------------+
/// | footer: size | 1           |      | footer: size | 0           |
/// +----------------------------+      +----------------------------+
/// ```
///
/// That's why a block can never be smaller than
/// [`crate::align::MIN_BLOCK_SIZE`]: once freed it must fit both links.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Block {
    Allocated { size: usize },
    Free {
        size: usize,
        prev: Option<usize>,
        next: Option<usize>,
    },
}

impl Block {
    pub fn size(&self) -> usize {
        match *self {
            Self::Allocated { size } | Self::Free { size, .. } => size,
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self, Self::Free { .. })
    }
}

/// Link value meaning "no block". Offset 0 can never be a payload address
/// because every payload sits after at least one header word.
const NULL_LINK: u64 = 0;

fn encode_link(link: Option<usize>) -> u64 {
    link.map_or(NULL_LINK, |bp| bp as u64)
}

fn decode_link(raw: u64) -> Option<usize> {
    match raw {
        NULL_LINK => None,
        bp => Some(bp as usize),
    }
}

impl<S: BackingStore> Heap<S> {
    /// Decodes the block at `bp`. Links are only read for free blocks.
    pub fn block(&self, bp: usize) -> Result<Block, AllocError> {
        let tag = self.header(bp)?;

        if tag.allocated {
            return Ok(Block::Allocated { size: tag.size });
        }

        Ok(Block::Free {
            size: tag.size,
            prev: self.prev_free(bp)?,
            next: self.next_free(bp)?,
        })
    }

    /// Payload address of the block physically after `bp`.
    pub fn next_block(&self, bp: usize) -> Result<usize, AllocError> {
        Ok(bp + self.header(bp)?.size)
    }

    /// Payload address of the block physically before `bp`, found through
    /// the footer that sits right before our header. Returns `bp` itself when
    /// that footer is empty, which only happens left of the prologue.
    pub fn prev_block(&self, bp: usize) -> Result<usize, AllocError> {
        let size = self.prev_footer(bp)?.size;
        bp.checked_sub(size)
            .ok_or(AllocError::OutOfBounds { offset: bp })
    }

    /// Footer of the physically previous block.
    pub fn prev_footer(&self, bp: usize) -> Result<Tag, AllocError> {
        let footer = bp.checked_sub(DSIZE).ok_or(AllocError::OutOfBounds { offset: bp })?;
        self.tag(footer)
    }

    /// Header of the physically next block.
    pub fn next_header(&self, bp: usize) -> Result<Tag, AllocError> {
        self.tag(header_of(self.next_block(bp)?))
    }

    pub fn prev_free(&self, bp: usize) -> Result<Option<usize>, AllocError> {
        self.read_u64(bp).map(decode_link)
    }

    pub fn next_free(&self, bp: usize) -> Result<Option<usize>, AllocError> {
        self.read_u64(bp + LINK_SIZE).map(decode_link)
    }

    pub fn set_prev_free(&mut self, bp: usize, prev: Option<usize>) -> Result<(), AllocError> {
        self.write_u64(bp, encode_link(prev))
    }

    pub fn set_next_free(&mut self, bp: usize, next: Option<usize>) -> Result<(), AllocError> {
        self.write_u64(bp + LINK_SIZE, encode_link(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::VecStore;

    /// Three adjacent blocks right after 4 bytes of padding.
    fn three_blocks() -> Heap<VecStore> {
        let mut heap = Heap::new(VecStore::new());
        heap.grow(128).unwrap();
        heap.set_tags(8, Tag::allocated(24)).unwrap();
        heap.set_tags(32, Tag::free(48)).unwrap();
        heap.set_tags(80, Tag::allocated(40)).unwrap();
        heap
    }

    #[test]
    fn physical_navigation() {
        let heap = three_blocks();

        assert_eq!(heap.next_block(8), Ok(32));
        assert_eq!(heap.next_block(32), Ok(80));
        assert_eq!(heap.prev_block(80), Ok(32));
        assert_eq!(heap.prev_block(32), Ok(8));

        // Nothing before the first block, empty footer.
        assert_eq!(heap.prev_block(8), Ok(8));

        assert_eq!(heap.prev_footer(80), Ok(Tag::free(48)));
        assert_eq!(heap.next_header(8), Ok(Tag::free(48)));
    }

    #[test]
    fn tagged_records() {
        let mut heap = three_blocks();

        heap.set_prev_free(32, None).unwrap();
        heap.set_next_free(32, Some(200)).unwrap();

        assert_eq!(heap.block(8), Ok(Block::Allocated { size: 24 }));
        assert_eq!(
            heap.block(32),
            Ok(Block::Free {
                size: 48,
                prev: None,
                next: Some(200)
            })
        );

        let block = heap.block(32).unwrap();
        assert!(block.is_free());
        assert_eq!(block.size(), 48);

        // Allocated blocks never have their payload interpreted as links.
        heap.bytes_mut(80, 16).unwrap().fill(0xff);
        assert_eq!(heap.block(80), Ok(Block::Allocated { size: 40 }));
    }
}
