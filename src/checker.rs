use crate::{
    align::{ALIGNMENT, MIN_BLOCK_SIZE, WSIZE},
    allocator::Allocator,
    error::HeapViolation,
    header::{footer_of, header_of, Tag},
    store::BackingStore,
};

impl<S: BackingStore> Allocator<S> {
    /// Runs [`Allocator::verify`] and reports the first violation through
    /// the log. Returns `true` if the heap is consistent.
    pub fn check(&self) -> bool {
        match self.verify() {
            Ok(()) => true,
            Err(violation) => {
                log::error!("heap check failed: {violation}");
                false
            }
        }
    }

    /// Walks every block from the prologue to the epilogue and then the free
    /// list, returning the first inconsistency found. O(n) in the number of
    /// blocks, meant for tests and debugging only.
    ///
    /// Physical walk:
    ///
    /// - Prologue is an allocated minimum block, epilogue an allocated zero
    ///   sized header sitting in the last word of the heap.
    /// - Every block lies within the bounds reported by the backing store.
    /// - Payload addresses and sizes are aligned.
    /// - Header and footer agree.
    /// - No two adjacent blocks are free.
    ///
    /// Free list walk:
    ///
    /// - Every entry is the start of a free block (an entry inside an
    ///   allocated block means the free list and a live block overlap).
    /// - `prev` links mirror `next` links.
    /// - The list holds exactly the free blocks found by the physical walk.
    pub fn verify(&self) -> Result<(), HeapViolation> {
        let Some(prologue) = self.prologue else {
            return Ok(());
        };

        let blocks = self.verify_blocks(prologue)?;
        self.verify_free_list(&blocks)
    }

    /// Physical walk. Returns every block between the sentinels in address
    /// order.
    fn verify_blocks(&self, prologue: usize) -> Result<Vec<(usize, Tag)>, HeapViolation> {
        let heap = &self.heap;
        let low = self.store().heap_low();
        let end_of_heap = self.store().heap_high() + 1;

        let bad_prologue = HeapViolation::BadPrologue { block: prologue };
        let header = heap.header(prologue).map_err(|_| bad_prologue)?;
        let footer = heap.footer(prologue).map_err(|_| bad_prologue)?;

        if header != Tag::allocated(MIN_BLOCK_SIZE) || footer != header {
            return Err(bad_prologue);
        }

        let mut blocks = Vec::new();
        let mut bp = prologue + MIN_BLOCK_SIZE;
        let mut prev_free = false;

        loop {
            let out_of_bounds = HeapViolation::OutOfBounds { block: bp };
            let tag = heap.header(bp).map_err(|_| out_of_bounds)?;

            if header_of(bp) < low {
                return Err(out_of_bounds);
            }

            if tag.size == 0 {
                if !tag.allocated || header_of(bp) + WSIZE != end_of_heap {
                    return Err(HeapViolation::BadEpilogue { block: bp });
                }
                break;
            }

            if bp % ALIGNMENT != 0 || tag.size % ALIGNMENT != 0 || tag.size < MIN_BLOCK_SIZE {
                return Err(HeapViolation::Misaligned {
                    block: bp,
                    size: tag.size,
                });
            }

            // Block spans [header, footer + WSIZE).
            let footer_at = footer_of(bp, tag.size);
            if footer_at + WSIZE > end_of_heap {
                return Err(out_of_bounds);
            }

            let footer = heap.tag(footer_at).map_err(|_| out_of_bounds)?;
            if footer != tag {
                return Err(HeapViolation::TagMismatch { block: bp });
            }

            if !tag.allocated && prev_free {
                return Err(HeapViolation::Uncoalesced { block: bp });
            }

            prev_free = !tag.allocated;
            blocks.push((bp, tag));
            bp += tag.size;
        }

        Ok(blocks)
    }

    fn verify_free_list(&self, blocks: &[(usize, Tag)]) -> Result<(), HeapViolation> {
        let in_heap = blocks.iter().filter(|(_, tag)| !tag.allocated).count();
        let mismatch = |in_list| HeapViolation::FreeListCountMismatch { in_heap, in_list };

        let mut in_list = 0;
        let mut prev = None;
        let mut current = self.free_list.head;

        while let Some(entry) = current {
            // More entries than free blocks: duplicates or a cycle.
            if in_list == in_heap {
                return Err(mismatch(in_list + 1));
            }

            match blocks.binary_search_by_key(&entry, |(bp, _)| *bp) {
                Ok(index) if blocks[index].1.allocated => {
                    return Err(HeapViolation::FreeListNotFree { block: entry });
                }
                Ok(_) => {}
                Err(0) => return Err(HeapViolation::OutOfBounds { block: entry }),
                Err(index) => {
                    let (bp, tag) = blocks[index - 1];
                    if entry >= bp + tag.size {
                        return Err(HeapViolation::OutOfBounds { block: entry });
                    }
                    if tag.allocated {
                        return Err(HeapViolation::Overlap {
                            block: bp,
                            next: entry,
                        });
                    }
                    return Err(HeapViolation::FreeListLinkBroken { block: entry });
                }
            }

            let broken = HeapViolation::FreeListLinkBroken { block: entry };
            if self.heap.prev_free(entry).map_err(|_| broken)? != prev {
                return Err(broken);
            }

            in_list += 1;
            prev = Some(entry);
            current = self.heap.next_free(entry).map_err(|_| broken)?;
        }

        if in_list != in_heap || in_list != self.free_list.len {
            return Err(mismatch(in_list));
        }

        Ok(())
    }
}
