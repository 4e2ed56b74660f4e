use std::{error::Error, fmt};

/// Reasons why an allocator operation can fail. None of these leave the heap
/// in an inconsistent state: every check happens before any boundary tag or
/// free list link is written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocError {
    /// The backing store refused to grow by `requested` bytes.
    Exhausted { requested: usize },
    /// A block of `requested` bytes cannot be encoded in a boundary tag, or
    /// the heap would outgrow what a boundary tag can describe.
    TooLarge { requested: usize },
    /// [`crate::Allocator::initialize`] has not succeeded yet.
    Uninitialized,
    /// The address does not point to the payload of a live block.
    InvalidAddress { address: usize },
    /// Attempted to access bytes outside of the region granted by the
    /// backing store.
    OutOfBounds { offset: usize },
    /// Free list links around `offset` don't point back to it. Only happens
    /// when the heap metadata has been overwritten.
    Corrupted { offset: usize },
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted { requested } => {
                write!(f, "backing store cannot grow by {requested} bytes")
            }
            Self::TooLarge { requested } => {
                write!(f, "request of {requested} bytes exceeds the maximum block size")
            }
            Self::Uninitialized => f.write_str("allocator is not initialized"),
            Self::InvalidAddress { address } => {
                write!(f, "{address:#x} is not the address of a live block")
            }
            Self::OutOfBounds { offset } => {
                write!(f, "offset {offset:#x} is outside of the heap")
            }
            Self::Corrupted { offset } => {
                write!(f, "free list links around {offset:#x} are corrupted")
            }
        }
    }
}

impl Error for AllocError {}

/// First inconsistency found by [`crate::Allocator::verify`]. Offsets are
/// payload addresses of the block where the problem was detected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeapViolation {
    /// The prologue is missing or has been overwritten.
    BadPrologue { block: usize },
    /// The walk did not end at an allocated zero-size epilogue placed at the
    /// very end of the heap.
    BadEpilogue { block: usize },
    /// Block lies (partially) outside of the provider-reported bounds.
    OutOfBounds { block: usize },
    /// Payload address or block size is not a multiple of the alignment.
    Misaligned { block: usize, size: usize },
    /// Header and footer disagree.
    TagMismatch { block: usize },
    /// Forward and backward traversal disagree about where a block ends.
    Overlap { block: usize, next: usize },
    /// Two physically adjacent blocks are both free.
    Uncoalesced { block: usize },
    /// A free list entry is marked allocated in its header.
    FreeListNotFree { block: usize },
    /// A free list entry's links do not point back to it.
    FreeListLinkBroken { block: usize },
    /// Number of free blocks in the heap differs from the free list length.
    FreeListCountMismatch { in_heap: usize, in_list: usize },
}

impl fmt::Display for HeapViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadPrologue { block } => write!(f, "bad prologue block at {block:#x}"),
            Self::BadEpilogue { block } => write!(f, "bad epilogue block at {block:#x}"),
            Self::OutOfBounds { block } => write!(f, "block at {block:#x} is not in the heap"),
            Self::Misaligned { block, size } => {
                write!(f, "block at {block:#x} of size {size} is not aligned")
            }
            Self::TagMismatch { block } => {
                write!(f, "header and footer of block at {block:#x} do not match")
            }
            Self::Overlap { block, next } => {
                write!(f, "block at {block:#x} overlaps block at {next:#x}")
            }
            Self::Uncoalesced { block } => {
                write!(f, "block at {block:#x} and its predecessor are both free")
            }
            Self::FreeListNotFree { block } => {
                write!(f, "free list entry {block:#x} is marked allocated")
            }
            Self::FreeListLinkBroken { block } => {
                write!(f, "free list links of {block:#x} are inconsistent")
            }
            Self::FreeListCountMismatch { in_heap, in_list } => write!(
                f,
                "heap has {in_heap} free blocks but the free list has {in_list}"
            ),
        }
    }
}

impl Error for HeapViolation {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        let error = AllocError::Exhausted { requested: 65536 };
        assert_eq!(error.to_string(), "backing store cannot grow by 65536 bytes");

        let error = AllocError::InvalidAddress { address: 0x30 };
        assert_eq!(error.to_string(), "0x30 is not the address of a live block");

        let error = AllocError::Corrupted { offset: 0x48 };
        assert_eq!(error.to_string(), "free list links around 0x48 are corrupted");

        let violation = HeapViolation::FreeListCountMismatch { in_heap: 2, in_list: 1 };
        assert_eq!(
            violation.to_string(),
            "heap has 2 free blocks but the free list has 1"
        );
    }
}
