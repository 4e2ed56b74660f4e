use crate::align::{checked_align, CHUNK_SIZE, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};

/// Allocator configuration.
///
/// # Examples
///
/// ```rust
/// use tagalloc::Config;
///
/// let config = Config::default().chunk_size(4096).check_after_each_op(true);
/// assert_eq!(config.get_chunk_size(), 4096);
///
/// // Chunks are at least one minimum block and always aligned.
/// assert_eq!(Config::default().chunk_size(1).get_chunk_size(), 24);
/// assert_eq!(Config::default().chunk_size(30).get_chunk_size(), 32);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Minimum number of bytes requested from the backing store every time
    /// the heap grows.
    chunk_size: usize,
    /// Run the consistency checker after every mutating operation.
    check_after_each_op: bool,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            check_after_each_op: false,
        }
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        let aligned = checked_align(chunk_size).unwrap_or(MAX_BLOCK_SIZE);
        self.chunk_size = aligned.clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE);
        self
    }

    pub fn check_after_each_op(mut self, enabled: bool) -> Self {
        self.check_after_each_op = enabled;
        self
    }

    pub fn get_chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn get_check_after_each_op(&self) -> bool {
        self.check_after_each_op
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
