use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("level pool exhausted: requested {requested} bytes, {available} bytes available")]
pub struct PoolExhausted {
    pub requested: usize,
    pub available: usize,
}

/// Allocation-only pool charged for level side-table entries.
///
/// Nothing is freed individually; the pool is reset when the level is cleared or a new pool
/// is allocated. Freezing caps the capacity at the bytes already used.
#[derive(Debug, Clone, Default)]
pub struct LevelPool {
    capacity: usize,
    used: usize,
}

impl LevelPool {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity, used: 0 }
    }

    pub fn allocate(&mut self, bytes: usize) -> Result<(), PoolExhausted> {
        let available = self.available();
        if bytes > available {
            return Err(PoolExhausted {
                requested: bytes,
                available,
            });
        }
        self.used += bytes;
        Ok(())
    }

    pub fn freeze(&mut self) {
        self.capacity = self.used;
    }

    pub fn reset(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.used = 0;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn available(&self) -> usize {
        self.capacity - self.used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frozen_pool_rejects_further_allocations() {
        let mut pool = LevelPool::with_capacity(64);
        pool.allocate(24).unwrap();
        pool.freeze();
        assert_eq!(pool.capacity(), 24);
        assert_eq!(
            pool.allocate(1),
            Err(PoolExhausted {
                requested: 1,
                available: 0
            })
        );
        pool.reset(8);
        assert_eq!(pool.available(), 8);
    }
}
