//! Unsynchronized shared view of a buffer that several workers write at once.
//!
//! The worker pool co-mutates the population and the child buffer without
//! per-element locks. Soundness rests on two facts the caller upholds:
//! within one phase no two threads touch overlapping index ranges unless all
//! of them only read, and phases are separated by a rendezvous barrier.

use std::marker::PhantomData;
use std::ops::Range;

/// A `&mut [T]` that can be handed to several threads.
///
/// Holding a `SharedSlice<'a, T>` keeps the original buffer exclusively
/// borrowed for `'a`, so nothing outside the pool can observe it meanwhile.
pub struct SharedSlice<'a, T> {
    ptr: *mut T,
    len: usize,
    _marker: PhantomData<&'a mut [T]>,
}

// SAFETY: the slice is only accessed through the unsafe accessors below,
// whose contracts rule out data races; `T: Send` lets elements be written
// from other threads and `T: Sync` lets them be read concurrently.
unsafe impl<T: Send> Send for SharedSlice<'_, T> {}
unsafe impl<T: Send + Sync> Sync for SharedSlice<'_, T> {}

impl<'a, T> SharedSlice<'a, T> {
    pub fn new(slice: &'a mut [T]) -> Self {
        SharedSlice {
            ptr: slice.as_mut_ptr(),
            len: slice.len(),
            _marker: PhantomData,
        }
    }

    /// Shared view of the whole buffer.
    ///
    /// # Safety
    /// No thread may write any element while the returned slice is alive.
    pub unsafe fn as_slice(&self) -> &[T] {
        std::slice::from_raw_parts(self.ptr, self.len)
    }

    /// Shared view of `range`.
    ///
    /// # Safety
    /// No thread may write inside `range` while the returned slice is alive.
    pub unsafe fn slice(&self, range: Range<usize>) -> &[T] {
        assert!(range.start <= range.end && range.end <= self.len, "range out of bounds");
        std::slice::from_raw_parts(self.ptr.add(range.start), range.end - range.start)
    }

    /// Exclusive view of `range`.
    ///
    /// # Safety
    /// No other thread may read or write inside `range` while the returned
    /// slice is alive.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn slice_mut(&self, range: Range<usize>) -> &mut [T] {
        assert!(range.start <= range.end && range.end <= self.len, "range out of bounds");
        std::slice::from_raw_parts_mut(self.ptr.add(range.start), range.end - range.start)
    }

    /// Exclusive view of the whole buffer.
    ///
    /// # Safety
    /// The caller must be the only thread touching the buffer while the
    /// returned slice is alive.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn as_mut_slice(&self) -> &mut [T] {
        std::slice::from_raw_parts_mut(self.ptr, self.len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genetic::population::WorkerPartition;
    use std::thread;

    #[test]
    fn test_disjoint_writers() {
        let mut data = vec![0usize; 103];
        {
            let shared = SharedSlice::new(&mut data);
            let partitions = WorkerPartition::split(103, 4);

            thread::scope(|s| {
                for (w, partition) in partitions.iter().enumerate() {
                    let shared = &shared;
                    s.spawn(move || {
                        // SAFETY: partitions are disjoint
                        let chunk = unsafe { shared.slice_mut(partition.range()) };
                        for (offset, slot) in chunk.iter_mut().enumerate() {
                            *slot = (w + 1) * 1000 + partition.start + offset;
                        }
                    });
                }
            });

            // SAFETY: every writer has been joined
            let all = unsafe { shared.as_slice() };
            assert_eq!(all.len(), 103);
        }

        for (i, value) in data.iter().enumerate() {
            assert_eq!(value % 1000, i);
        }
    }

    #[test]
    #[should_panic(expected = "range out of bounds")]
    fn test_out_of_bounds_range_panics() {
        let mut data = [1, 2, 3];
        let shared = SharedSlice::new(&mut data);
        // SAFETY: single-threaded
        let _ = unsafe { shared.slice(2..4) };
    }
}
