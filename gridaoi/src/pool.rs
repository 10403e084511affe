//! Free-list object pool for recycled containers.
//!
//! [`Pool`] is purely an allocation optimization: a disabled pool that always
//! hands out fresh instances produces identical engine behaviour.

/// Types that can be reset for reuse.
pub trait Recycle: Default {
    /// Clears the instance so it is indistinguishable from a fresh one.
    fn recycle(&mut self);

    /// Retained heap capacity, used to refuse oversized instances.
    fn retained_capacity(&self) -> usize {
        0
    }
}

impl<T> Recycle for Vec<T> {
    fn recycle(&mut self) {
        self.clear();
    }

    fn retained_capacity(&self) -> usize {
        self.capacity()
    }
}

/// Acquire/release cache backed by a LIFO free list.
#[derive(Debug)]
pub struct Pool<T> {
    free: Vec<T>,
    max_cached: usize,
    max_capacity: usize,
    allocated: u64,
    reused: u64,
}

impl<T: Recycle> Pool<T> {
    /// Creates a pool caching at most `max_cached` instances, each with at
    /// most `max_capacity` retained capacity.
    pub fn new(max_cached: usize, max_capacity: usize) -> Self {
        Self {
            free: Vec::new(),
            max_cached,
            max_capacity,
            allocated: 0,
            reused: 0,
        }
    }

    /// A pool that never caches anything.
    pub fn disabled() -> Self {
        Self::new(0, 0)
    }

    /// Returns a recycled instance, or allocates a new one.
    pub fn acquire(&mut self) -> T {
        match self.free.pop() {
            Some(obj) => {
                self.reused += 1;
                obj
            }
            None => {
                self.allocated += 1;
                T::default()
            }
        }
    }

    /// Returns an instance for reuse. It is dropped instead when the pool is
    /// full or the instance grew past the capacity limit.
    pub fn release(&mut self, mut obj: T) {
        if self.free.len() >= self.max_cached || obj.retained_capacity() > self.max_capacity {
            return;
        }
        obj.recycle();
        self.free.push(obj);
    }

    /// Number of instances currently cached.
    pub fn cached(&self) -> usize {
        self.free.len()
    }

    /// Total instances allocated because the free list was empty.
    pub fn allocated(&self) -> u64 {
        self.allocated
    }

    /// Total instances served from the free list.
    pub fn reused(&self) -> u64 {
        self.reused
    }
}

impl<T: Recycle> Default for Pool<T> {
    fn default() -> Self {
        Self::new(
            crate::config::DEFAULT_POOL_MAX_CACHED,
            crate::config::DEFAULT_MAX_POOLED_CAPACITY,
        )
    }
}
