//! Bounded free pools.
//!
//! Consumed snapshots and input buffers recycle here instead of being
//! freed. Pools are bounded; items returned to a full pool are dropped.
//! Pooled buffers keep their capacity, so steady-state reuse allocates
//! nothing.

/// A bounded LIFO free pool.
#[derive(Debug)]
pub struct Pool<T> {
    free: Vec<T>,
    capacity: usize,
}

impl<T> Pool<T> {
    /// Creates a pool bounded to `capacity` recycled items.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Vec::new(),
            capacity,
        }
    }

    /// Takes a recycled item, if any.
    #[must_use]
    pub fn take(&mut self) -> Option<T> {
        self.free.pop()
    }

    /// Returns an item to the pool; dropped if the pool is full.
    pub fn put(&mut self, item: T) {
        if self.free.len() < self.capacity {
            self.free.push(item);
        }
    }

    /// Returns the number of recycled items held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.free.len()
    }

    /// Returns `true` if no recycled items are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }
}
