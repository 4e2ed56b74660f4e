use crate::{align::DSIZE, error::AllocError, heap::Heap, store::BackingStore};

/// Carries realloc metadata around so we don't have to pass the same
/// parameters over and over again. [`Realloc::plan`] only reads the heap;
/// the real reallocation business happens in
/// [`crate::Allocator::reallocate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Realloc {
    /// Block whose contents we are trying to reallocate.
    pub block: usize,
    /// Current size of `block`, header and footer included.
    pub old_size: usize,
    /// Payload bytes requested by the caller.
    pub new_size: usize,
    /// What we are going to do about it.
    pub method: ReallocMethod,
}

/// Ways of satisfying a reallocation, in the order they are attempted.
///
/// ```text
///                 +------+-----------+------+
/// MergeBoth       | Prev |  Current  | Next |  -> one block at Prev
///                 +------+-----------+------+
///                 +------+-----------+
/// MergePrev       | Prev |  Current  |         -> one block at Prev
///                 +------+-----------+
///                        +-----------+------+
/// MergeNext              |  Current  | Next |  -> one block at Current
///                        +-----------+------+
/// ```
///
/// Merging with the previous block moves the payload down to the previous
/// block's address. Merging only with the next block leaves the payload
/// where it is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ReallocMethod {
    /// The block already has room for the new size. We never split on shrink.
    Keep,
    /// Both neighbours are free and together with the block they fit.
    MergeBoth { prev: usize, next: usize, size: usize },
    /// Previous neighbour is free and together with the block it fits.
    MergePrev { prev: usize, size: usize },
    /// Next neighbour is free and together with the block it fits.
    MergeNext { next: usize, size: usize },
    /// Allocate somewhere else, copy, free the block.
    Move,
}

impl Realloc {
    /// Inspects the block at `bp` and its physical neighbours and decides how
    /// `new_size` payload bytes are going to fit.
    pub fn plan<S: BackingStore>(
        heap: &Heap<S>,
        bp: usize,
        new_size: usize,
    ) -> Result<Self, AllocError> {
        let old_size = heap.header(bp)?.size;
        let required = new_size.saturating_add(DSIZE);

        let method = if old_size >= required {
            ReallocMethod::Keep
        } else {
            let prev_tag = heap.prev_footer(bp)?;
            let next_tag = heap.next_header(bp)?;
            let prev = heap.prev_block(bp)?;
            let next = bp + old_size;

            let prev_free = !prev_tag.allocated;
            let next_free = !next_tag.allocated;

            let both = prev_tag.size + old_size + next_tag.size;
            let with_prev = prev_tag.size + old_size;
            let with_next = old_size + next_tag.size;

            if prev_free && next_free && both >= required {
                ReallocMethod::MergeBoth { prev, next, size: both }
            } else if prev_free && with_prev >= required {
                ReallocMethod::MergePrev { prev, size: with_prev }
            } else if next_free && with_next >= required {
                ReallocMethod::MergeNext { next, size: with_next }
            } else {
                ReallocMethod::Move
            }
        };

        Ok(Self {
            block: bp,
            old_size,
            new_size,
            method,
        })
    }

    /// Number of payload bytes that have to survive the reallocation. If we
    /// are shrinking we only need to keep enough bytes to fill the new size,
    /// otherwise everything that was in the old payload.
    pub fn count(&self) -> usize {
        (self.old_size - DSIZE).min(self.new_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{header::Tag, store::VecStore};

    /// Builds `prev | current | next` at 8, 8 + prev, ... followed by an
    /// allocated zero-size end marker.
    fn heap_with(prev: Tag, current: usize, next: Tag) -> Heap<VecStore> {
        let mut heap = Heap::new(VecStore::new());
        heap.grow(512).unwrap();

        let current_bp = 8 + prev.size;
        let next_bp = current_bp + current;

        heap.set_tags(8, prev).unwrap();
        heap.set_tags(current_bp, Tag::allocated(current)).unwrap();
        heap.set_tags(next_bp, next).unwrap();
        heap.write_tag(next_bp + next.size - 4, Tag::allocated(0)).unwrap();

        heap
    }

    #[test]
    fn keep_when_block_is_big_enough() {
        let heap = heap_with(Tag::free(24), 40, Tag::free(24));

        let realloc = Realloc::plan(&heap, 32, 16).unwrap();
        assert_eq!(realloc.method, ReallocMethod::Keep);
        assert_eq!(realloc.count(), 16);

        // Exactly fits the current payload.
        let realloc = Realloc::plan(&heap, 32, 32).unwrap();
        assert_eq!(realloc.method, ReallocMethod::Keep);
    }

    #[test]
    fn tie_break_order() {
        let heap = heap_with(Tag::free(32), 40, Tag::free(48));
        let current = 40;

        // Only all three together can hold 100 bytes.
        let realloc = Realloc::plan(&heap, current, 100).unwrap();
        assert_eq!(
            realloc.method,
            ReallocMethod::MergeBoth { prev: 8, next: 80, size: 120 }
        );
        assert_eq!(realloc.count(), 32);

        // Previous alone would be enough, but with both neighbours free all
        // three blocks are merged.
        let realloc = Realloc::plan(&heap, current, 60).unwrap();
        assert_eq!(
            realloc.method,
            ReallocMethod::MergeBoth { prev: 8, next: 80, size: 120 }
        );

        // Too big for anything.
        let realloc = Realloc::plan(&heap, current, 200).unwrap();
        assert_eq!(realloc.method, ReallocMethod::Move);
    }

    #[test]
    fn merge_next_when_prev_is_allocated() {
        let heap = heap_with(Tag::allocated(32), 40, Tag::free(48));

        let realloc = Realloc::plan(&heap, 40, 70).unwrap();
        assert_eq!(realloc.method, ReallocMethod::MergeNext { next: 80, size: 88 });

        let realloc = Realloc::plan(&heap, 40, 81).unwrap();
        assert_eq!(realloc.method, ReallocMethod::Move);
    }

    #[test]
    fn merge_prev_when_next_is_allocated() {
        let heap = heap_with(Tag::free(32), 40, Tag::allocated(48));

        let realloc = Realloc::plan(&heap, 40, 64).unwrap();
        assert_eq!(realloc.method, ReallocMethod::MergePrev { prev: 8, size: 72 });
    }
}
