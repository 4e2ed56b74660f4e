use std::{ptr::NonNull, slice};

use crate::{
    platform::{self, page_size},
    store::BackingStore,
};

/// Backing store that lives in memory obtained directly from the kernel. We
/// reserve the whole capacity once (`mmap` on unix, `VirtualAlloc` on
/// windows) and then move a break pointer inside of it, so the region behaves
/// like the data segment does with `sbrk`:
///
/// ```text
/// +--------------------------------+--------------------------------+
/// |     Granted to the allocator   |        Reserved, untouched     |
/// +--------------------------------+--------------------------------+
/// ^                                ^                                ^
/// |                                |                                |
/// base                           break                     base + length
/// ```
///
/// On unix anonymous mappings are committed lazily by the kernel, so reserving
/// a big region costs nothing until the allocator writes to it. On Windows the
/// whole capacity is reserved and committed at once. The mapping is returned
/// to the OS when the region is dropped, never before.
#[derive(Debug)]
pub struct MappedRegion {
    /// First byte of the mapping.
    base: NonNull<u8>,
    /// Length of the mapping, a multiple of the page size.
    length: usize,
    /// Bytes granted so far.
    brk: usize,
}

impl MappedRegion {
    /// Reserves enough pages to hold `capacity` bytes. Returns `None` if the
    /// kernel refuses the mapping.
    pub fn reserve(capacity: usize) -> Option<Self> {
        let length = determine_region_length(capacity)?;
        let base = unsafe { platform::request_memory(length)? };

        log::debug!("reserved {length} bytes at {base:p}");

        Some(Self {
            base,
            length,
            brk: 0,
        })
    }

    /// Total bytes that can be granted before [`BackingStore::grow`] fails.
    pub fn capacity(&self) -> usize {
        self.length
    }
}

impl BackingStore for MappedRegion {
    fn grow(&mut self, increment: usize) -> Option<usize> {
        let old_break = self.brk;
        let new_break = old_break.checked_add(increment)?;

        if new_break > self.length {
            return None;
        }

        self.brk = new_break;

        Some(old_break)
    }

    fn size(&self) -> usize {
        self.brk
    }

    fn bytes(&self) -> &[u8] {
        // SAFETY: `brk <= length` and the whole mapping is readable and
        // writable for as long as `self` lives.
        unsafe { slice::from_raw_parts(self.base.as_ptr(), self.brk) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: see `bytes`. `&mut self` guarantees exclusive access.
        unsafe { slice::from_raw_parts_mut(self.base.as_ptr(), self.brk) }
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        unsafe { platform::return_memory(self.base, self.length) }
    }
}

/// Rounds `capacity` up to a whole number of pages. A region needs at least
/// one page.
fn determine_region_length(capacity: usize) -> Option<usize> {
    let page_size = page_size();
    let pages = capacity.max(1).checked_add(page_size - 1)? / page_size;

    pages.checked_mul(page_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_length_is_page_aligned() {
        let page = page_size();
        assert_eq!(determine_region_length(0), Some(page));
        assert_eq!(determine_region_length(1), Some(page));
        assert_eq!(determine_region_length(page), Some(page));
        assert_eq!(determine_region_length(page + 1), Some(page * 2));
        assert_eq!(determine_region_length(usize::MAX), None);
    }

    #[test]
    fn break_moves_inside_reservation() {
        let mut region = MappedRegion::reserve(page_size()).unwrap();
        let capacity = region.capacity();

        assert_eq!(region.size(), 0);
        assert!(region.bytes().is_empty());

        assert_eq!(region.grow(48), Some(0));
        assert_eq!(region.grow(16), Some(48));
        assert_eq!(region.heap_high(), 63);

        region.bytes_mut().fill(69);
        assert!(region.bytes().iter().all(|byte| *byte == 69));

        assert_eq!(region.grow(capacity), None);
        assert_eq!(region.grow(capacity - 64), Some(64));
        assert_eq!(region.size(), capacity);
    }
}
