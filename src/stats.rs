use crate::{
    align::MIN_BLOCK_SIZE, allocator::Allocator, block::Block, error::AllocError,
    store::BackingStore,
};

/// Snapshot of the heap, computed by walking every block. Sizes include
/// boundary tags; the sentinels are not counted as blocks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Bytes granted by the backing store.
    pub heap_size: usize,
    pub allocated_blocks: usize,
    pub allocated_bytes: usize,
    pub free_blocks: usize,
    pub free_bytes: usize,
    pub largest_free_block: usize,
}

impl HeapStats {
    /// Fraction of the heap occupied by allocated blocks.
    pub fn utilization(&self) -> f64 {
        if self.heap_size == 0 {
            return 0.0;
        }

        self.allocated_bytes as f64 / self.heap_size as f64
    }
}

impl<S: BackingStore> Allocator<S> {
    /// Walks the heap and summarizes it. O(n) in the number of blocks.
    pub fn stats(&self) -> Result<HeapStats, AllocError> {
        let mut stats = HeapStats {
            heap_size: self.heap.len(),
            ..HeapStats::default()
        };

        let Some(prologue) = self.prologue else {
            return Ok(stats);
        };

        let mut bp = prologue + MIN_BLOCK_SIZE;

        loop {
            let block = self.heap.block(bp)?;
            let size = block.size();

            match block {
                Block::Allocated { size: 0 } => break,
                // Corrupted heap, don't loop forever.
                Block::Free { size: 0, .. } => return Err(AllocError::OutOfBounds { offset: bp }),
                Block::Allocated { size } => {
                    stats.allocated_blocks += 1;
                    stats.allocated_bytes += size;
                }
                Block::Free { size, .. } => {
                    stats.free_blocks += 1;
                    stats.free_bytes += size;
                    stats.largest_free_block = stats.largest_free_block.max(size);
                }
            }

            bp += size;
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{allocator::INITIAL_HEAP_SIZE, store::VecStore, Config};

    #[test]
    fn counts_blocks() {
        let config = Config::default().chunk_size(4096);
        let mut allocator = Allocator::with_config(VecStore::new(), config);

        assert_eq!(allocator.stats(), Ok(HeapStats::default()));

        allocator.initialize().unwrap();

        let a = allocator.allocate(100).unwrap();
        let _b = allocator.allocate(16).unwrap();
        let _c = allocator.allocate(16).unwrap();
        allocator.free(a).unwrap();

        let stats = allocator.stats().unwrap();
        assert_eq!(
            stats,
            HeapStats {
                heap_size: INITIAL_HEAP_SIZE + 4096,
                allocated_blocks: 2,
                allocated_bytes: 48,
                free_blocks: 2,
                free_bytes: 4096 - 48,
                largest_free_block: 4096 - 112 - 48,
            }
        );
        assert!(stats.utilization() > 0.0 && stats.utilization() < 0.02);
        assert_eq!(HeapStats::default().utilization(), 0.0);
    }
}
