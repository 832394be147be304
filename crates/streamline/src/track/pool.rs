use std::{
    ops::{Deref, DerefMut},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

/// Byte budget shared by every track of one session.
#[derive(Debug)]
pub struct BufferPool {
    segment_size: usize,
    capacity: usize,
    allocated: AtomicUsize,
}

impl BufferPool {
    pub fn new(segment_size: usize, capacity: usize) -> Self {
        Self {
            segment_size,
            capacity,
            allocated: AtomicUsize::new(0),
        }
    }

    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Acquire)
    }

    fn try_reserve(&self, bytes: usize) -> bool {
        self.allocated
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current
                    .checked_add(bytes)
                    .filter(|next| *next <= self.capacity)
            })
            .is_ok()
    }

    fn release(&self, bytes: usize) {
        self.allocated.fetch_sub(bytes, Ordering::AcqRel);
    }
}

/// One track's slice of a [`BufferPool`].
///
/// A track never holds more than its own budget, so a burst on one track
/// cannot take the space the other track was promised.
#[derive(Debug, Clone)]
pub struct TrackBuffer {
    inner: Arc<TrackBufferInner>,
}

#[derive(Debug)]
struct TrackBufferInner {
    pool: Arc<BufferPool>,
    budget: usize,
    reserved: AtomicUsize,
}

impl TrackBuffer {
    pub fn new(pool: Arc<BufferPool>, budget: usize) -> Self {
        Self {
            inner: Arc::new(TrackBufferInner {
                pool,
                budget,
                reserved: AtomicUsize::new(0),
            }),
        }
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.inner.pool
    }

    pub fn budget(&self) -> usize {
        self.inner.budget
    }

    pub fn reserved(&self) -> usize {
        self.inner.reserved.load(Ordering::Acquire)
    }

    /// Takes one segment-sized buffer, or `None` when either the track budget
    /// or the shared pool is exhausted.
    pub fn allocate(&self) -> Option<Allocation> {
        let len = self.inner.pool.segment_size();
        let budget = self.inner.budget;
        self.inner
            .reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_add(len).filter(|next| *next <= budget)
            })
            .ok()?;

        if !self.inner.pool.try_reserve(len) {
            self.inner.reserved.fetch_sub(len, Ordering::AcqRel);
            return None;
        }

        Some(Allocation {
            owner: self.inner.clone(),
            data: vec![0; len],
        })
    }
}

/// A buffer taken from a [`TrackBuffer`]; its bytes go back on drop.
#[derive(Debug)]
pub struct Allocation {
    owner: Arc<TrackBufferInner>,
    data: Vec<u8>,
}

impl Deref for Allocation {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl DerefMut for Allocation {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        let len = self.data.len();
        self.owner.reserved.fetch_sub(len, Ordering::AcqRel);
        self.owner.pool.release(len);
    }
}
