use crate::{error::AllocError, heap::Heap, store::BackingStore};

/// Explicit free list. When a block is free we reuse its payload to store a
/// pointer to the previous and next free blocks (see [`crate::block::Block`]),
/// so the list itself only needs to remember its head:
///
/// ```text
///               +-----------------------------------+
///               |                                   v
/// +-------+---------+-------+---------+-------+---------+----------+
/// |  Pro  |  Free   | Alloc |  Free   | Alloc |  Free   | Epilogue |
/// +-------+---------+-------+---------+-------+---------+----------+
///               ^                |  ^                |
///               |                |  +----------------+
///               +----------------+
///                                ^
///                                +--- head
/// ```
///
/// Free blocks are not ordered by address nor by size. New blocks are always
/// pushed to the front, so the most recently freed block is the first one
/// visited by [`FreeList::first_fit`]. Removing a block is O(1) because every
/// free block knows its neighbours in the list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct FreeList {
    pub head: Option<usize>,
    pub len: usize,
}

impl FreeList {
    pub const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    /// Links `bp` at the front of the list. `bp` must already be tagged as
    /// free and must not be in the list.
    pub fn push_front<S: BackingStore>(
        &mut self,
        heap: &mut Heap<S>,
        bp: usize,
    ) -> Result<(), AllocError> {
        heap.set_prev_free(bp, None)?;
        heap.set_next_free(bp, self.head)?;

        if let Some(head) = self.head {
            heap.set_prev_free(head, Some(bp))?;
        }

        self.head = Some(bp);
        self.len += 1;

        Ok(())
    }

    /// Unlinks `bp`, which must currently be in the list. Nothing is written
    /// if the links around `bp` don't check out.
    pub fn remove<S: BackingStore>(
        &mut self,
        heap: &mut Heap<S>,
        bp: usize,
    ) -> Result<(), AllocError> {
        let (prev, next) = self.links(heap, bp)?;

        match prev {
            Some(prev) => heap.set_next_free(prev, next)?,
            None => self.head = next,
        }

        if let Some(next) = next {
            heap.set_prev_free(next, prev)?;
        }

        self.len -= 1;

        Ok(())
    }

    /// Returns the `(prev, next)` links of `bp` after making sure `bp` is a
    /// free block its list neighbours point back to.
    pub fn links<S: BackingStore>(
        &self,
        heap: &Heap<S>,
        bp: usize,
    ) -> Result<(Option<usize>, Option<usize>), AllocError> {
        let corrupted = AllocError::Corrupted { offset: bp };

        if self.len == 0 || heap.header(bp)?.allocated {
            return Err(corrupted);
        }

        let prev = heap.prev_free(bp)?;
        let next = heap.next_free(bp)?;

        let from_prev = match prev {
            Some(prev) => heap.next_free(prev)? == Some(bp),
            None => self.head == Some(bp),
        };
        let from_next = match next {
            Some(next) => heap.prev_free(next)? == Some(bp),
            None => true,
        };

        if !from_prev || !from_next {
            return Err(corrupted);
        }

        Ok((prev, next))
    }

    /// Returns the first free block that can hold `size` bytes (header and
    /// footer included) or `None` if we didn't find any.
    pub fn first_fit<S: BackingStore>(
        &self,
        heap: &Heap<S>,
        size: usize,
    ) -> Result<Option<usize>, AllocError> {
        let mut current = self.head;

        while let Some(bp) = current {
            let tag = heap.header(bp)?;

            if !tag.allocated && tag.size >= size {
                return Ok(Some(bp));
            }

            current = heap.next_free(bp)?;
        }

        Ok(None)
    }

    /// Collects the free list in list order, most recently inserted first.
    /// Stops after `len` steps so a corrupted cycle can't hang the caller.
    pub fn blocks<S: BackingStore>(&self, heap: &Heap<S>) -> Result<Vec<usize>, AllocError> {
        let mut blocks = Vec::with_capacity(self.len);
        let mut current = self.head;

        while let Some(bp) = current {
            if blocks.len() == self.len {
                break;
            }
            blocks.push(bp);
            current = heap.next_free(bp)?;
        }

        Ok(blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{header::Tag, store::VecStore};

    /// Heap with four free blocks of increasing size at 8, 32, 72 and 136.
    fn heap_with_free_blocks() -> (Heap<VecStore>, [usize; 4]) {
        let mut heap = Heap::new(VecStore::new());
        heap.grow(256).unwrap();

        let blocks = [(8, 24), (32, 40), (72, 64), (136, 96)];
        for (bp, size) in blocks {
            heap.set_tags(bp, Tag::free(size)).unwrap();
        }

        (heap, blocks.map(|(bp, _)| bp))
    }

    #[test]
    fn lifo_order() {
        let (mut heap, blocks) = heap_with_free_blocks();
        let mut list = FreeList::new();

        for bp in blocks {
            list.push_front(&mut heap, bp).unwrap();
        }

        assert_eq!(list.len, 4);
        assert_eq!(list.head, Some(136));
        assert_eq!(list.blocks(&heap).unwrap(), vec![136, 72, 32, 8]);
        assert_eq!(heap.prev_free(136), Ok(None));
        assert_eq!(heap.prev_free(72), Ok(Some(136)));
        assert_eq!(heap.next_free(8), Ok(None));
    }

    #[test]
    fn remove_head_middle_and_tail() {
        let (mut heap, blocks) = heap_with_free_blocks();
        let mut list = FreeList::new();

        for bp in blocks {
            list.push_front(&mut heap, bp).unwrap();
        }

        // Middle.
        list.remove(&mut heap, 72).unwrap();
        assert_eq!(list.blocks(&heap).unwrap(), vec![136, 32, 8]);
        assert_eq!(heap.prev_free(32), Ok(Some(136)));

        // Head.
        list.remove(&mut heap, 136).unwrap();
        assert_eq!(list.head, Some(32));
        assert_eq!(heap.prev_free(32), Ok(None));

        // Tail.
        list.remove(&mut heap, 8).unwrap();
        assert_eq!(list.blocks(&heap).unwrap(), vec![32]);
        assert_eq!(heap.next_free(32), Ok(None));

        // Last one.
        list.remove(&mut heap, 32).unwrap();
        assert_eq!(list, FreeList::new());
        assert!(list.blocks(&heap).unwrap().is_empty());
    }

    #[test]
    fn first_fit_follows_list_order() {
        let (mut heap, blocks) = heap_with_free_blocks();
        let mut list = FreeList::new();

        for bp in blocks {
            list.push_front(&mut heap, bp).unwrap();
        }

        // Largest block was pushed last, so it's found first even though a
        // smaller one would fit.
        assert_eq!(list.first_fit(&heap, 24), Ok(Some(136)));

        list.remove(&mut heap, 136).unwrap();
        assert_eq!(list.first_fit(&heap, 24), Ok(Some(72)));
        assert_eq!(list.first_fit(&heap, 40), Ok(Some(72)));
        assert_eq!(list.first_fit(&heap, 65), Ok(None));

        list.remove(&mut heap, 72).unwrap();
        assert_eq!(list.first_fit(&heap, 40), Ok(Some(32)));
    }

    #[test]
    fn remove_rejects_unlinked_blocks() {
        let (mut heap, blocks) = heap_with_free_blocks();
        let mut list = FreeList::new();

        // Empty list.
        assert_eq!(list.remove(&mut heap, 8), Err(AllocError::Corrupted { offset: 8 }));

        list.push_front(&mut heap, blocks[0]).unwrap();
        list.push_front(&mut heap, blocks[1]).unwrap();

        // Free block that was never pushed, with stale links pointing at
        // list members.
        heap.set_prev_free(72, Some(32)).unwrap();
        heap.set_next_free(72, Some(8)).unwrap();
        assert_eq!(list.remove(&mut heap, 72), Err(AllocError::Corrupted { offset: 72 }));

        // Allocated block.
        heap.set_tags(136, Tag::allocated(96)).unwrap();
        assert_eq!(list.remove(&mut heap, 136), Err(AllocError::Corrupted { offset: 136 }));

        // Nothing changed.
        assert_eq!(list.len, 2);
        assert_eq!(list.blocks(&heap).unwrap(), vec![32, 8]);
        assert_eq!(heap.prev_free(8), Ok(Some(32)));
    }
}
