//! Ping-pong storage for the density tensor.
//!
//! Two owned allocations and a `current` index. Primitives read the current
//! slot and write the other one, then [`DoubleBuffer::flip`] makes the
//! written slot current. Slots are only reallocated when too small.

use tracing::trace;

/// Buffer usage counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferStats {
    /// Allocated length of each slot, current slot first.
    pub capacity: [usize; 2],
    /// Logical length of the current tensor.
    pub len: usize,
    /// Number of times the work slot had to be reallocated.
    pub reallocations: usize,
}

/// Two tensor allocations of which one is current.
#[derive(Debug, Clone)]
pub struct DoubleBuffer {
    slots: [Vec<f64>; 2],
    current: usize,
    shape: Vec<usize>,
    reallocations: usize,
}

impl DoubleBuffer {
    /// Wrap `data` of the given shape; the work slot starts at the same size.
    pub fn new(data: Vec<f64>, shape: Vec<usize>) -> Self {
        debug_assert_eq!(data.len(), shape.iter().product::<usize>());
        let work = vec![0.0; data.len()];
        DoubleBuffer {
            slots: [data, work],
            current: 0,
            shape,
            reallocations: 0,
        }
    }

    /// Shape of the current tensor.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of elements in the current tensor.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    /// Whether the current tensor has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The current tensor, row-major.
    pub fn current(&self) -> &[f64] {
        &self.slots[self.current][..self.len()]
    }

    /// The current tensor, mutably.
    pub fn current_mut(&mut self) -> &mut [f64] {
        let len = self.len();
        &mut self.slots[self.current][..len]
    }

    /// Make sure the work slot holds at least `required` elements.
    ///
    /// With `lazy` set an oversized slot is kept; otherwise a slot of a
    /// different size is replaced by an exact-size allocation.
    pub fn reserve_work(&mut self, required: usize, lazy: bool) {
        let work = 1 - self.current;
        let capacity = self.slots[work].len();
        if capacity < required || (!lazy && capacity != required) {
            trace!(capacity, required, "reallocating work buffer");
            self.slots[work] = vec![0.0; required];
            self.reallocations += 1;
        } else {
            trace!(capacity, required, "reusing work buffer");
        }
    }

    /// The current tensor and the first `out_len` elements of the work slot.
    ///
    /// Call [`reserve_work`](Self::reserve_work) first.
    pub fn split(&mut self, out_len: usize) -> (&[f64], &mut [f64]) {
        let len = self.len();
        let (first, second) = self.slots.split_at_mut(1);
        let (current, work) = if self.current == 0 {
            (&first[0], &mut second[0])
        } else {
            (&second[0], &mut first[0])
        };
        (&current[..len], &mut work[..out_len])
    }

    /// Make the work slot current, now holding a tensor of `shape`.
    pub fn flip(&mut self, shape: Vec<usize>) {
        self.current = 1 - self.current;
        self.shape = shape;
    }

    /// Usage counters.
    pub fn stats(&self) -> BufferStats {
        BufferStats {
            capacity: [self.slots[self.current].len(), self.slots[1 - self.current].len()],
            len: self.len(),
            reallocations: self.reallocations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flip_swaps_roles() {
        let mut buf = DoubleBuffer::new(vec![1.0, 2.0], vec![2]);
        buf.reserve_work(2, true);
        {
            let (cur, work) = buf.split(2);
            work[0] = cur[1];
            work[1] = cur[0];
        }
        buf.flip(vec![2]);
        assert_eq!(buf.current(), &[2.0, 1.0]);
        assert_eq!(buf.stats().reallocations, 0);
    }

    #[test]
    fn test_grows_only_when_needed() {
        let mut buf = DoubleBuffer::new(vec![0.0; 4], vec![4]);
        buf.reserve_work(2, true);
        assert_eq!(buf.stats().reallocations, 0);
        buf.reserve_work(8, true);
        assert_eq!(buf.stats().reallocations, 1);
        assert_eq!(buf.stats().capacity[1], 8);
    }

    #[test]
    fn test_eager_shrink() {
        let mut buf = DoubleBuffer::new(vec![0.0; 4], vec![4]);
        buf.reserve_work(2, false);
        assert_eq!(buf.stats().capacity[1], 2);
        assert_eq!(buf.stats().reallocations, 1);
    }

    #[test]
    fn test_scalar_tensor() {
        let buf = DoubleBuffer::new(vec![0.5], vec![]);
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.current(), &[0.5]);
    }
}
