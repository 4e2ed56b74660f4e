use crate::{
    align::{checked_align, ALIGNMENT, DSIZE, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE, WSIZE},
    config::Config,
    error::AllocError,
    freelist::FreeList,
    header::{footer_of, header_of, Tag},
    heap::Heap,
    realloc::{Realloc, ReallocMethod},
    store::{BackingStore, VecStore},
    Address, AllocResult, Pointer,
};

/// Bytes requested from the backing store by [`Allocator::initialize`]: room
/// for two minimum blocks, of which the sentinels use the tail end.
pub(crate) const INITIAL_HEAP_SIZE: usize = 2 * MIN_BLOCK_SIZE;

/// This is the main allocator. It owns the heap and the free list and
/// exposes `initialize`, `allocate`, `free` and `reallocate`. Right after
/// initialization the heap looks like this:
///
/// ```text
/// +---------+----------------+--------------------------------+----------+
/// | Padding |    Prologue    |      Free block (one chunk)    | Epilogue |
/// |         | 24 bytes, used |                                |  0, used |
/// +---------+----------------+--------------------------------+----------+
///                                           ^
///                                           +--- Free list head.
/// ```
///
/// The prologue and the epilogue are never freed, so every real block always
/// has an allocated block on both sides of it as far as coalescing is
/// concerned. When no free block can satisfy a request the heap grows at the
/// end: the old epilogue becomes the header of the new free block and a new
/// epilogue is written after it.
///
/// Addresses handed out are [`Address`] offsets into the backing store;
/// payload bytes are reached through [`Allocator::payload`] and
/// [`Allocator::payload_mut`].
///
/// # Examples
///
/// ```rust
/// use tagalloc::Allocator;
///
/// let mut allocator = Allocator::new();
/// allocator.initialize().unwrap();
///
/// let address = allocator.allocate(100).unwrap().unwrap();
/// assert_eq!(address.offset() % 8, 0);
///
/// allocator.payload_mut(address).unwrap()[..5].copy_from_slice(b"hello");
///
/// let address = allocator.reallocate(Some(address), 500).unwrap().unwrap();
/// assert_eq!(&allocator.payload(address).unwrap()[..5], b"hello");
///
/// allocator.free(Some(address)).unwrap();
/// assert!(allocator.check());
/// ```
#[derive(Debug)]
pub struct Allocator<S = VecStore> {
    /// Every byte we own.
    pub(crate) heap: Heap<S>,
    /// Free blocks, most recently freed first.
    pub(crate) free_list: FreeList,
    /// Payload address of the prologue block, `None` until initialized.
    pub(crate) prologue: Option<usize>,
    pub(crate) config: Config,
}

impl Allocator {
    /// Allocator over a [`VecStore`] with default capacity and configuration.
    pub fn new() -> Self {
        Self::with_store(VecStore::new())
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: BackingStore> Allocator<S> {
    /// Builds an allocator on top of `store`. No memory is requested until
    /// [`Allocator::initialize`] is called.
    pub fn with_store(store: S) -> Self {
        Self::with_config(store, Config::default())
    }

    pub fn with_config(store: S, config: Config) -> Self {
        Self {
            heap: Heap::new(store),
            free_list: FreeList::new(),
            prologue: None,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &S {
        self.heap.store()
    }

    /// Gives the backing store back. All addresses become meaningless.
    pub fn into_store(self) -> S {
        self.heap.into_store()
    }

    pub fn is_initialized(&self) -> bool {
        self.prologue.is_some()
    }

    /// Writes the prologue and epilogue sentinels and grows the heap by one
    /// chunk. Calling this again starts a brand new heap after the current
    /// end of the store; every previously returned address is abandoned.
    pub fn initialize(&mut self) -> Result<(), AllocError> {
        let padding = (ALIGNMENT - self.heap.len() % ALIGNMENT) % ALIGNMENT;
        let base = self.heap.grow(padding + INITIAL_HEAP_SIZE)? + padding;

        // Sentinels are pushed to the end of the initial request so that the
        // epilogue header is the last word of the heap.
        let prologue = base + INITIAL_HEAP_SIZE - MIN_BLOCK_SIZE;
        self.heap.bytes_mut(base, header_of(prologue) - base)?.fill(0);
        self.heap.set_tags(prologue, Tag::allocated(MIN_BLOCK_SIZE))?;
        self.heap
            .write_tag(header_of(prologue + MIN_BLOCK_SIZE), Tag::allocated(0))?;

        self.free_list = FreeList::new();
        self.prologue = Some(prologue);

        if let Err(err) = self.extend_heap(self.config.get_chunk_size() / WSIZE) {
            self.prologue = None;
            return Err(err);
        }

        log::debug!("heap initialized, prologue at {prologue:#x}");
        self.after_operation("initialize");

        Ok(())
    }

    /// Allocates a block with at least `size` bytes of payload. Returns
    /// `Ok(None)` for zero sized requests. The payload is 8-aligned and not
    /// zeroed.
    pub fn allocate(&mut self, size: usize) -> AllocResult {
        if size == 0 {
            return Ok(None);
        }

        let bp = self.allocate_block(size)?;

        log::trace!("allocate({size}) -> {bp:#x}");
        self.after_operation("allocate");

        Ok(Some(Address(bp)))
    }

    /// Frees the block at `address`. Freeing `None` does nothing.
    pub fn free(&mut self, address: Pointer) -> Result<(), AllocError> {
        let Some(address) = address else {
            return Ok(());
        };

        let bp = self.live_block(address)?;
        self.free_block(bp)?;

        log::trace!("free({bp:#x})");
        self.after_operation("free");

        Ok(())
    }

    /// Resizes the block at `address` to hold at least `size` bytes. The
    /// first `min(old payload, size)` bytes are preserved.
    ///
    /// - `reallocate(None, size)` is `allocate(size)`.
    /// - `reallocate(address, 0)` is `free(address)` and returns `Ok(None)`.
    /// - Shrinking, or growing within the slack of the current block, keeps
    ///   the same address and never splits the block.
    /// - Otherwise adjacent free blocks are absorbed when they provide enough
    ///   room (see [`ReallocMethod`]), and only as a last resort the contents
    ///   are moved to a brand new block.
    ///
    /// On failure the original block is left untouched.
    pub fn reallocate(&mut self, address: Pointer, size: usize) -> AllocResult {
        let Some(address) = address else {
            return self.allocate(size);
        };

        if size == 0 {
            self.free(Some(address))?;
            return Ok(None);
        }

        let bp = self.live_block(address)?;
        let realloc = Realloc::plan(&self.heap, bp, size)?;

        let new_bp = match realloc.method {
            ReallocMethod::Keep => bp,

            ReallocMethod::MergeBoth { prev, next, size } => {
                self.free_list.links(&self.heap, prev)?;
                self.free_list.remove(&mut self.heap, next)?;
                self.free_list.remove(&mut self.heap, prev)?;
                self.move_into(prev, size, &realloc)?
            }

            ReallocMethod::MergePrev { prev, size } => {
                self.free_list.remove(&mut self.heap, prev)?;
                self.move_into(prev, size, &realloc)?
            }

            ReallocMethod::MergeNext { next, size } => {
                self.free_list.remove(&mut self.heap, next)?;
                self.heap.set_tags(bp, Tag::allocated(size))?;
                bp
            }

            ReallocMethod::Move => {
                let new_bp = self.allocate_block(size)?;
                self.heap.copy_within(bp, new_bp, realloc.count())?;
                self.free_block(bp)?;
                new_bp
            }
        };

        log::trace!("reallocate({bp:#x}, {size}) -> {new_bp:#x} ({:?})", realloc.method);
        self.after_operation("reallocate");

        Ok(Some(Address(new_bp)))
    }

    /// Payload of the live block at `address`.
    pub fn payload(&self, address: Address) -> Result<&[u8], AllocError> {
        let bp = self.live_block(address)?;
        let size = self.heap.header(bp)?.size;
        self.heap.bytes(bp, size - DSIZE)
    }

    /// Mutable payload of the live block at `address`.
    pub fn payload_mut(&mut self, address: Address) -> Result<&mut [u8], AllocError> {
        let bp = self.live_block(address)?;
        let size = self.heap.header(bp)?.size;
        self.heap.bytes_mut(bp, size - DSIZE)
    }

    /// Number of payload bytes the live block at `address` can hold. Might be
    /// more than what was requested.
    pub fn usable_size(&self, address: Address) -> Result<usize, AllocError> {
        self.payload(address).map(<[u8]>::len)
    }

    /// Size recorded in the header of the block at `address`, header and
    /// footer included. Works for free and allocated blocks alike.
    pub fn block_size(&self, address: Address) -> Result<usize, AllocError> {
        let bp = self.block_in_heap(address)?;
        Ok(self.heap.header(bp)?.size)
    }

    /// Free blocks in free list order, most recently inserted first.
    pub fn free_blocks(&self) -> Result<Vec<Address>, AllocError> {
        Ok(self
            .free_list
            .blocks(&self.heap)?
            .into_iter()
            .map(Address)
            .collect())
    }

    /// Finds (or makes) a block for `size > 0` payload bytes and marks it
    /// allocated.
    fn allocate_block(&mut self, size: usize) -> Result<usize, AllocError> {
        if self.prologue.is_none() {
            return Err(AllocError::Uninitialized);
        }

        let asize = adjusted_size(size)?;

        let bp = match self.free_list.first_fit(&self.heap, asize)? {
            Some(bp) => bp,
            None => {
                let extend = asize.max(self.config.get_chunk_size());
                self.extend_heap(extend / WSIZE)?
            }
        };

        self.place(bp, asize)?;

        Ok(bp)
    }

    /// Marks the block at `bp` free and merges it with its neighbours.
    fn free_block(&mut self, bp: usize) -> Result<usize, AllocError> {
        self.coalesce(bp)
    }

    /// Moves the payload of `realloc.block` to `dest`, which becomes an
    /// allocated block of `size` bytes. Source and destination may overlap.
    fn move_into(
        &mut self,
        dest: usize,
        size: usize,
        realloc: &Realloc,
    ) -> Result<usize, AllocError> {
        // Old tags end up inside the new payload. Wipe them so the old
        // address no longer looks like a block.
        self.heap.write_word(header_of(realloc.block), 0)?;
        self.heap.write_word(footer_of(realloc.block, realloc.old_size), 0)?;

        self.heap.copy_within(realloc.block, dest, realloc.count())?;
        self.heap.set_tags(dest, Tag::allocated(size))?;

        log::debug!(
            "grew {:#x} in place into {dest:#x}, {} -> {size} bytes",
            realloc.block,
            realloc.old_size
        );

        Ok(dest)
    }

    /// Grows the heap by `words` words (rounded up to an even count and to at
    /// least one minimum block) and returns the resulting free block, already
    /// merged with a free block that might precede it and linked in the free
    /// list.
    fn extend_heap(&mut self, words: usize) -> Result<usize, AllocError> {
        let size = if words % 2 == 1 {
            (words + 1) * WSIZE
        } else {
            words * WSIZE
        };
        let size = size.max(MIN_BLOCK_SIZE);

        // Keep every possible block size encodable in a boundary tag.
        if self.heap.len().saturating_add(size) > MAX_BLOCK_SIZE {
            return Err(AllocError::TooLarge { requested: size });
        }

        // The new block starts where the old epilogue was, so its header
        // overwrites the old epilogue header.
        let bp = self.heap.grow(size)?;
        self.heap.set_tags(bp, Tag::free(size))?;
        self.heap.write_tag(header_of(bp + size), Tag::allocated(0))?;

        log::debug!("heap grew by {size} bytes, new block at {bp:#x}");

        self.coalesce(bp)
    }

    /// Boundary tag coalescing. `bp` must not be in the free list yet; its
    /// tags are rewritten as free. Merges it with whichever physical
    /// neighbours are free, pushes the result to the front of the free list
    /// and returns its address. Free list links are validated before anything
    /// is unlinked.
    ///
    /// ```text
    /// +------+---------+------+        +-------------------------+
    /// | Free |   bp    | Free |   ->   |          Free           |
    /// +------+---------+------+        +-------------------------+
    ///                                  ^
    ///                                  +--- New head of the free list.
    /// ```
    fn coalesce(&mut self, bp: usize) -> Result<usize, AllocError> {
        let size = self.heap.header(bp)?.size;
        let prev = self.heap.prev_footer(bp)?;
        let next_bp = bp + size;
        let next = self.heap.header(next_bp)?;

        let (bp, size) = match (prev.allocated, next.allocated) {
            (true, true) => (bp, size),

            (true, false) => {
                self.free_list.remove(&mut self.heap, next_bp)?;
                (bp, size + next.size)
            }

            (false, true) => {
                let prev_bp = bp - prev.size;
                self.free_list.remove(&mut self.heap, prev_bp)?;
                (prev_bp, size + prev.size)
            }

            (false, false) => {
                let prev_bp = bp - prev.size;
                self.free_list.links(&self.heap, prev_bp)?;
                self.free_list.remove(&mut self.heap, next_bp)?;
                self.free_list.remove(&mut self.heap, prev_bp)?;
                (prev_bp, prev.size + size + next.size)
            }
        };

        self.heap.set_tags(bp, Tag::free(size))?;
        self.free_list.push_front(&mut self.heap, bp)?;

        Ok(bp)
    }

    /// Places an allocation of `asize` bytes at the start of the free block
    /// `bp`. The block is split when the remainder can stand on its own as a
    /// free block, otherwise the whole block is handed out.
    ///
    /// ```text
    /// +----------------------------+        +-------+--------------------+
    /// |        Free block          |   ->   | Alloc |     Free rest      |
    /// +----------------------------+        +-------+--------------------+
    /// ```
    fn place(&mut self, bp: usize, asize: usize) -> Result<(), AllocError> {
        let csize = self.heap.header(bp)?.size;
        self.free_list.remove(&mut self.heap, bp)?;

        if csize - asize >= MIN_BLOCK_SIZE {
            self.heap.set_tags(bp, Tag::allocated(asize))?;
            let rest = bp + asize;
            self.heap.set_tags(rest, Tag::free(csize - asize))?;
            self.coalesce(rest)?;
        } else {
            self.heap.set_tags(bp, Tag::allocated(csize))?;
        }

        Ok(())
    }

    /// Validates that `address` is the payload address of a block that lies
    /// between the prologue and the epilogue, whatever its state.
    fn block_in_heap(&self, address: Address) -> Result<usize, AllocError> {
        let prologue = self.prologue.ok_or(AllocError::Uninitialized)?;
        let bp = address.0;
        let invalid = AllocError::InvalidAddress { address: bp };

        if bp <= prologue || bp % ALIGNMENT != 0 || bp >= self.heap.len() {
            return Err(invalid);
        }

        self.bounded_block(prologue, bp).ok_or(invalid)
    }

    /// Checks the tags of `bp` and of both physical neighbours. The header
    /// must agree with the footer, the previous footer must lead to a header
    /// that agrees with it, and the next header must either be the epilogue
    /// or lead to a footer that agrees with it.
    fn bounded_block(&self, prologue: usize, bp: usize) -> Option<usize> {
        let heap = &self.heap;

        let tag = heap.header(bp).ok()?;
        if tag.size < MIN_BLOCK_SIZE || heap.footer(bp).ok()? != tag {
            return None;
        }

        let prev = heap.prev_footer(bp).ok()?;
        let prev_bp = bp.checked_sub(prev.size)?;
        if prev.size < MIN_BLOCK_SIZE || prev_bp < prologue || heap.header(prev_bp).ok()? != prev {
            return None;
        }

        let next_bp = bp + tag.size;
        let next = heap.header(next_bp).ok()?;
        let bounded = if next.size == 0 {
            next.allocated && header_of(next_bp) + WSIZE == heap.len()
        } else {
            next.size >= MIN_BLOCK_SIZE && heap.footer(next_bp).ok()? == next
        };

        bounded.then_some(bp)
    }

    /// Same as [`Self::block_in_heap`] but the block must also be allocated.
    /// Catches double frees.
    fn live_block(&self, address: Address) -> Result<usize, AllocError> {
        let bp = self.block_in_heap(address)?;

        if self.heap.block(bp)?.is_free() {
            return Err(AllocError::InvalidAddress { address: bp });
        }

        Ok(bp)
    }

    fn after_operation(&self, operation: &str) {
        if self.config.get_check_after_each_op() && !self.check() {
            log::error!("heap is inconsistent after {operation}");
        }
    }
}

/// Block size needed for `size` payload bytes: aligned payload plus header
/// and footer, never less than a minimum block.
fn adjusted_size(size: usize) -> Result<usize, AllocError> {
    checked_align(size)
        .and_then(|aligned| aligned.checked_add(DSIZE))
        .map(|total| total.max(MIN_BLOCK_SIZE))
        .filter(|total| *total <= MAX_BLOCK_SIZE)
        .ok_or(AllocError::TooLarge { requested: size })
}
