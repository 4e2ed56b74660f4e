//! Layout constants shared by every block in the heap. All of them are part
//! of the byte layout contract: a word is 4 bytes, block sizes are multiples
//! of 8 and a free block must have room for two 8 byte list links.

/// Word size in bytes. Headers and footers are one word each.
pub const WSIZE: usize = 4;

/// Double word size in bytes. Header plus footer overhead of every block.
pub const DSIZE: usize = 8;

/// Payload alignment in bytes. Block sizes are always multiples of this.
pub const ALIGNMENT: usize = 8;

/// Size in bytes of one free list link stored inside a free block.
pub const LINK_SIZE: usize = 8;

/// Smallest block we can ever create: header + two links + footer.
pub const MIN_BLOCK_SIZE: usize = WSIZE + 2 * LINK_SIZE + WSIZE;

/// Default amount of bytes requested from the backing store when no free
/// block can satisfy an allocation.
pub const CHUNK_SIZE: usize = 1 << 16;

/// Largest block size that can be encoded in a 4 byte boundary tag (the 3 low
/// bits are reserved for flags).
pub const MAX_BLOCK_SIZE: usize = u32::MAX as usize & !(ALIGNMENT - 1);

/// Rounds the given value up to the nearest multiple of [`ALIGNMENT`].
///
/// # Examples
///
/// ```rust
/// use tagalloc::align;
///
/// assert_eq!(align!(1), 8);
/// assert_eq!(align!(13), 16);
/// assert_eq!(align!(16), 16);
/// ```
#[macro_export]
macro_rules! align {
    ($value:expr) => {
        ($value + $crate::align::ALIGNMENT - 1) & !($crate::align::ALIGNMENT - 1)
    };
}

/// Same as [`align!`] but returns `None` instead of overflowing.
#[inline]
pub(crate) fn checked_align(value: usize) -> Option<usize> {
    value
        .checked_add(ALIGNMENT - 1)
        .map(|value| value & !(ALIGNMENT - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align() {
        let mut alignments = Vec::new();

        for i in 0..10 {
            let sizes = (ALIGNMENT * i + 1)..=(ALIGNMENT * (i + 1));
            let expected_alignment = ALIGNMENT * (i + 1);
            alignments.push((sizes, expected_alignment));
        }

        for (sizes, expected) in alignments {
            for size in sizes {
                assert_eq!(expected, align!(size));
                assert_eq!(Some(expected), checked_align(size));
            }
        }
    }

    #[test]
    fn layout_contract() {
        assert_eq!(MIN_BLOCK_SIZE, 24);
        assert_eq!(CHUNK_SIZE, 65536);
        assert_eq!(MIN_BLOCK_SIZE % ALIGNMENT, 0);
        assert_eq!(checked_align(usize::MAX), None);
        assert_eq!(align!(0), 0);
    }
}
