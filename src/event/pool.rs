//! Reusable scratch buffers for the publish path.

use std::ops::Deref;
use std::ops::DerefMut;
use std::sync::Mutex;
use std::sync::PoisonError;

use crate::config::RouterConfig;

/// A small pool of vectors that are cleared and handed back after use.
pub struct ScratchPool<T> {
    buffers: Mutex<Vec<Vec<T>>>,
    max_retained: usize,
    initial_capacity: usize,
    max_capacity: usize,
}

impl<T> ScratchPool<T> {
    pub fn new(max_retained: usize, initial_capacity: usize, max_capacity: usize) -> Self {
        Self {
            buffers: Mutex::new(Vec::with_capacity(max_retained)),
            max_retained,
            initial_capacity,
            max_capacity,
        }
    }

    pub fn from_config(config: &RouterConfig) -> Self {
        Self::new(
            config.pool_max_retained,
            config.pool_initial_capacity,
            config.pool_max_capacity,
        )
    }

    /// Takes a cleared buffer from the pool, or allocates a new one.
    pub fn acquire(&self) -> PooledVec<'_, T> {
        let buf = self
            .buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.initial_capacity));
        PooledVec { pool: self, buf }
    }

    /// Number of buffers currently waiting in the pool.
    pub fn retained(&self) -> usize {
        self.buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn release(&self, mut buf: Vec<T>) {
        // Elements are dropped here, outside the pool lock.
        buf.clear();
        if buf.capacity() > self.max_capacity {
            return;
        }
        let mut buffers = self.buffers.lock().unwrap_or_else(PoisonError::into_inner);
        if buffers.len() < self.max_retained {
            buffers.push(buf);
        }
    }
}

impl<T> Default for ScratchPool<T> {
    fn default() -> Self {
        Self::from_config(&RouterConfig::default())
    }
}

/// A buffer borrowed from a [`ScratchPool`]; returned when dropped.
pub struct PooledVec<'a, T> {
    pool: &'a ScratchPool<T>,
    buf: Vec<T>,
}

impl<T> Deref for PooledVec<'_, T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl<T> DerefMut for PooledVec<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

impl<T> Drop for PooledVec<'_, T> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buf));
    }
}
