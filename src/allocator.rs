//! Memory accounting for finalized arrays.
//!
//! Every repository owns one [`ArrayAllocator`] and hands it to each column as
//! it is finalized. Only leaf arrays are counted, since nested arrays hold
//! their children by reference.

use arrow::array::Array;

use crate::error::{Error, Result};

#[derive(Debug, Default)]
pub struct ArrayAllocator {
    limit: Option<usize>,
    allocated: usize,
}

impl ArrayAllocator {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            limit,
            allocated: 0,
        }
    }

    /// Bytes counted since the last [`ArrayAllocator::reset`].
    pub fn allocated_bytes(&self) -> usize {
        self.allocated
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Starts a new build pass.
    pub fn reset(&mut self) {
        self.allocated = 0;
    }

    /// Counts `array` against the limit.
    pub fn track(&mut self, array: &dyn Array) -> Result<()> {
        let requested = self.allocated + array.get_array_memory_size();
        if let Some(limit) = self.limit {
            if requested > limit {
                return Err(Error::ResourceExhausted { requested, limit });
            }
        }
        self.allocated = requested;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int64Array;

    #[test]
    fn test_track_without_limit() {
        let mut allocator = ArrayAllocator::default();
        let array = Int64Array::from(vec![1, 2, 3]);
        allocator.track(&array).unwrap();
        allocator.track(&array).unwrap();
        assert_eq!(allocator.allocated_bytes(), 2 * array.get_array_memory_size());

        allocator.reset();
        assert_eq!(allocator.allocated_bytes(), 0);
    }

    #[test]
    fn test_track_over_limit() {
        let array = Int64Array::from((0..1024).collect::<Vec<i64>>());
        let mut allocator = ArrayAllocator::new(Some(16));
        let err = allocator.track(&array).unwrap_err();
        assert!(matches!(err, Error::ResourceExhausted { limit: 16, .. }));
        // A refused request is not counted.
        assert_eq!(allocator.allocated_bytes(), 0);
    }
}
