use std::{
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering},
};

/// Abstraction for platform specific memory handling. [`crate::MappedRegion`]
/// only needs to reserve one big span of address space up front and give it
/// back when the store is dropped; it doesn't care about the APIs offered by
/// the underlying kernel or libraries.
trait PlatformSpecificMemory {
    /// Requests a zeroed memory region from the kernel where `length` bytes
    /// can be written safely.
    unsafe fn request_memory(length: usize) -> Option<NonNull<u8>>;

    /// Returns `length` bytes starting at `address` to the kernel. `address`
    /// and `length` must match a previous call to `request_memory`.
    unsafe fn return_memory(address: NonNull<u8>, length: usize) -> bool;

    /// Virtual memory page size in bytes.
    unsafe fn page_size() -> usize;
}

/// Zero sized type that implements [`PlatformSpecificMemory`] for each OS.
pub(crate) struct Platform;

/// Cached page size, 0 until first queried.
static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

/// We only know the page size at runtime, so we'll ask once and reuse it.
#[inline]
pub(crate) fn page_size() -> usize {
    match PAGE_SIZE.load(Ordering::Relaxed) {
        0 => {
            let size = unsafe { Platform::page_size() };
            PAGE_SIZE.store(size, Ordering::Relaxed);
            size
        }
        size => size,
    }
}

/// Convenience wrapper for [`PlatformSpecificMemory::request_memory`].
#[inline]
pub(crate) unsafe fn request_memory(length: usize) -> Option<NonNull<u8>> {
    Platform::request_memory(length)
}

/// Convenience wrapper for [`PlatformSpecificMemory::return_memory`].
#[inline]
pub(crate) unsafe fn return_memory(address: NonNull<u8>, length: usize) {
    if !Platform::return_memory(address, length) {
        log::warn!("failed to return {length} bytes at {address:p} to the kernel");
    }
}

#[cfg(unix)]
#[cfg(not(miri))]
mod unix {
    use std::ptr::{self, NonNull};

    use super::{Platform, PlatformSpecificMemory};

    impl PlatformSpecificMemory for Platform {
        unsafe fn request_memory(length: usize) -> Option<NonNull<u8>> {
            // Memory protection. Read-Write only.
            let protection = libc::PROT_READ | libc::PROT_WRITE;

            // Memory should be private to our process and not mapped to any file.
            let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;

            // Anonymous mappings are zero filled and only committed when touched.
            match libc::mmap(ptr::null_mut(), length, protection, flags, -1, 0) {
                libc::MAP_FAILED => None,
                address => NonNull::new(address.cast()),
            }
        }

        unsafe fn return_memory(address: NonNull<u8>, length: usize) -> bool {
            libc::munmap(address.cast().as_ptr(), length) == 0
        }

        unsafe fn page_size() -> usize {
            match libc::sysconf(libc::_SC_PAGE_SIZE) {
                size if size > 0 => size as usize,
                _ => 4096,
            }
        }
    }
}

#[cfg(windows)]
#[cfg(not(miri))]
mod windows {
    use std::{mem::MaybeUninit, ptr::NonNull};

    use windows::Win32::System::{Memory, SystemInformation};

    use super::{Platform, PlatformSpecificMemory};

    impl PlatformSpecificMemory for Platform {
        unsafe fn request_memory(length: usize) -> Option<NonNull<u8>> {
            // Similar to mmap on Linux, Read-Write only.
            let protection = Memory::PAGE_READWRITE;

            // Reserve and commit with one single call.
            let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;

            let address = Memory::VirtualAlloc(None, length, flags, protection);

            NonNull::new(address.cast())
        }

        unsafe fn return_memory(address: NonNull<u8>, _length: usize) -> bool {
            // MEM_RELEASE requires a length of 0 and releases the whole
            // reservation.
            Memory::VirtualFree(address.cast().as_ptr(), 0, Memory::MEM_RELEASE).as_bool()
        }

        unsafe fn page_size() -> usize {
            let mut system_info = MaybeUninit::uninit();
            SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

            system_info.assume_init().dwPageSize as usize
        }
    }
}

#[cfg(miri)]
mod miri {
    //! Miri has no FFI support, so the global allocator stands in for the
    //! kernel. It also reports regions that are never given back.

    use std::{alloc, ptr::NonNull};

    use super::{page_size, Platform, PlatformSpecificMemory};

    fn to_layout(length: usize) -> Option<alloc::Layout> {
        alloc::Layout::from_size_align(length, page_size()).ok()
    }

    impl PlatformSpecificMemory for Platform {
        unsafe fn request_memory(length: usize) -> Option<NonNull<u8>> {
            NonNull::new(alloc::alloc_zeroed(to_layout(length)?))
        }

        unsafe fn return_memory(address: NonNull<u8>, length: usize) -> bool {
            match to_layout(length) {
                Some(layout) => {
                    alloc::dealloc(address.as_ptr(), layout);
                    true
                }
                None => false,
            }
        }

        unsafe fn page_size() -> usize {
            4096
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_power_of_two() {
        let size = page_size();
        assert!(size.is_power_of_two());
        assert_eq!(size, page_size());
    }

    #[test]
    fn request_and_return() {
        unsafe {
            let length = page_size() * 2;
            let address = request_memory(length).unwrap();

            // Fresh mappings are zero filled.
            let bytes = std::slice::from_raw_parts_mut(address.as_ptr(), length);
            assert!(bytes.iter().all(|byte| *byte == 0));

            bytes.fill(69);
            assert!(bytes.iter().all(|byte| *byte == 69));

            return_memory(address, length);
        }
    }
}
