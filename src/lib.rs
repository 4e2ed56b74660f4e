//! # tagalloc - A boundary-tag heap allocator
//!
//! General purpose `allocate` / `free` / `reallocate` over a single
//! contiguous heap that can only grow at its high end, the way a classic
//! `sbrk` based `malloc` works. The heap is an arena: it lives in a
//! [`BackingStore`] and every address handed out is a byte offset into it, so
//! all block bookkeeping goes through bounds-checked reads and writes.
//!
//! ## Overview
//!
//! ```text
//!   +---------+----------+-------+--------+-------+--------+----------+
//!   | Padding | Prologue | Alloc |  Free  | Alloc |  Free  | Epilogue |
//!   +---------+----------+-------+--------+-------+--------+----------+
//!                                    ^                 ^
//!                                    |                 |
//!                                    +--- free list ---+
//! ```
//!
//! - Every block carries a header and a footer with its size and allocated
//!   flag (boundary tags), so we can move to the next *and* to the previous
//!   block in O(1).
//! - Free blocks are linked in an explicit, unordered doubly linked list
//!   stored inside their own payload. New free blocks go to the front.
//! - Allocation is first fit over the free list, splitting the block when
//!   the remainder can stand on its own.
//! - Freeing coalesces immediately with free neighbours, so no two free
//!   blocks are ever adjacent.
//! - Reallocation tries to grow in place by absorbing free neighbours before
//!   falling back to allocate, copy and free.
//!
//! ## Crate Structure
//!
//! ```text
//!   tagalloc
//!   ├── align      - Layout constants and the align! macro
//!   ├── header     - Boundary tags
//!   ├── block      - Block records and physical navigation
//!   ├── heap       - Bounds-checked byte arena
//!   ├── freelist   - Explicit LIFO free list
//!   ├── realloc    - Reallocation planning
//!   ├── allocator  - Allocator: initialize, allocate, free, reallocate
//!   ├── checker    - Heap consistency checker
//!   ├── stats      - Heap statistics
//!   ├── config     - Allocator configuration
//!   ├── store      - BackingStore trait and VecStore
//!   ├── region     - MappedRegion, a store backed by OS pages
//!   └── platform   - mmap / VirtualAlloc
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use tagalloc::{Allocator, MappedRegion};
//!
//! let region = MappedRegion::reserve(1 << 20).unwrap();
//! let mut allocator = Allocator::with_store(region);
//! allocator.initialize().unwrap();
//!
//! let address = allocator.allocate(64).unwrap().unwrap();
//! allocator.payload_mut(address).unwrap().fill(42);
//! assert!(allocator.payload(address).unwrap().iter().all(|byte| *byte == 42));
//!
//! allocator.free(Some(address)).unwrap();
//! assert!(allocator.check());
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded only**: all operations need `&mut self`. Wrap the
//!   allocator in a lock to share it.
//! - **Memory is never returned**: the heap only grows. Dropping a
//!   [`MappedRegion`] is the only way to give pages back.

use std::fmt;

pub mod align;
mod allocator;
mod block;
mod checker;
mod config;
mod error;
mod freelist;
mod header;
mod heap;
mod platform;
mod realloc;
mod region;
mod stats;
mod store;

/// Location of a block's payload: a byte offset from the start of the
/// backing store. Always a multiple of 8.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub(crate) usize);

impl Address {
    /// Byte offset from the start of the backing store.
    pub fn offset(self) -> usize {
        self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Address or null. `None` is what zero sized allocations return.
pub type Pointer = Option<Address>;

/// Shorter syntax for allocation/reallocation return types.
pub type AllocResult = Result<Pointer, AllocError>;

pub use allocator::Allocator;
pub use config::Config;
pub use error::{AllocError, HeapViolation};
pub use region::MappedRegion;
pub use stats::HeapStats;
pub use store::{BackingStore, VecStore, DEFAULT_CAPACITY};
