//! Bounded free-list for reusable decode buffers (video planes, audio sample
//! scratch space), avoiding a fresh heap allocation per decoded frame.

use parking_lot::Mutex;
use std::sync::Arc;

struct Inner<T> {
    free: Mutex<Vec<T>>,
    capacity: usize,
}

/// A pool of reusable `T` buffers. Cheap to clone (shares the free list).
#[derive(Clone)]
pub struct FramePool<T> {
    inner: Arc<Inner<T>>,
}

impl<T> FramePool<T> {
    pub fn new(capacity: usize) -> Self {
        FramePool {
            inner: Arc::new(Inner {
                free: Mutex::new(Vec::with_capacity(capacity)),
                capacity,
            }),
        }
    }

    /// Pop a free buffer, or construct a new one via `make` if the pool is empty.
    pub fn acquire(&self, make: impl FnOnce() -> T) -> PooledBuf<T> {
        let buf = self.inner.free.lock().pop().unwrap_or_else(make);
        PooledBuf {
            buf: Some(buf),
            pool: self.inner.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.free.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A buffer checked out of a [`FramePool`]. Returned to the pool on drop,
/// unless the pool is already at capacity, in which case it is discarded.
pub struct PooledBuf<T> {
    buf: Option<T>,
    pool: Arc<Inner<T>>,
}

impl<T> std::ops::Deref for PooledBuf<T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.buf.as_ref().expect("PooledBuf used after drop")
    }
}

impl<T> std::ops::DerefMut for PooledBuf<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.buf.as_mut().expect("PooledBuf used after drop")
    }
}

impl<T> Drop for PooledBuf<T> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            let mut free = self.pool.free.lock();
            if free.len() < self.pool.capacity {
                free.push(buf);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_constructs_when_empty() {
        let pool: FramePool<Vec<u8>> = FramePool::new(4);
        let buf = pool.acquire(|| vec![0u8; 16]);
        assert_eq!(buf.len(), 16);
    }

    #[test]
    fn dropped_buffer_is_reused() {
        let pool: FramePool<Vec<u8>> = FramePool::new(4);
        {
            let _buf = pool.acquire(|| vec![0u8; 16]);
        }
        assert_eq!(pool.len(), 1);
        let mut made_new = false;
        let _buf = pool.acquire(|| {
            made_new = true;
            vec![0u8; 16]
        });
        assert!(!made_new);
    }

    #[test]
    fn respects_capacity_bound() {
        let pool: FramePool<Vec<u8>> = FramePool::new(1);
        let a = pool.acquire(Vec::new);
        let b = pool.acquire(Vec::new);
        drop(a);
        drop(b);
        assert_eq!(pool.len(), 1);
    }
}
