//! Bounded reuse pool for hedging state objects.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_queue::ArrayQueue;
use tracing::warn;

/// Objects that can be returned to an [`ObjectPool`].
pub trait Resettable {
    /// Clears the object for reuse.
    ///
    /// Returns `false` when the object still holds live resources; the pool
    /// then drops it instead of retaining it.
    fn try_reset(&mut self) -> bool;
}

/// Lock-free pool of reusable objects.
///
/// The free list is shared across concurrent executions. Every object goes
/// through [`Resettable::try_reset`] on its way back, so objects handed out by
/// [`ObjectPool::get`] never carry state from a previous execution.
pub struct ObjectPool<O> {
    items: ArrayQueue<O>,
    factory: Box<dyn Fn() -> O + Send + Sync>,
    rented: AtomicUsize,
}

impl<O> ObjectPool<O>
where
    O: Resettable,
{
    /// Creates a pool retaining at most `capacity` idle objects.
    pub fn new<F>(capacity: usize, factory: F) -> Self
    where
        F: Fn() -> O + Send + Sync + 'static,
    {
        Self {
            items: ArrayQueue::new(capacity.max(1)),
            factory: Box::new(factory),
            rented: AtomicUsize::new(0),
        }
    }

    /// Takes an idle object, constructing a new one if none is available.
    pub fn get(&self) -> O {
        let item = self.items.pop().unwrap_or_else(|| (self.factory)());
        self.rented.fetch_add(1, Ordering::Relaxed);
        item
    }

    /// Returns an object previously obtained from [`ObjectPool::get`].
    pub fn release(&self, mut item: O) {
        self.rented.fetch_sub(1, Ordering::Relaxed);
        if !item.try_reset() {
            warn!("Pooled object still holds live resources, dropping it");
            return;
        }
        // A full pool simply drops the surplus object.
        let _ = self.items.push(item);
    }
}

impl<O> ObjectPool<O> {
    /// Records that a rented object was dropped instead of released.
    pub fn forget_rented(&self) {
        let _ = self
            .rented
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |rented| {
                rented.checked_sub(1)
            });
    }

    /// Number of objects handed out and not yet released.
    pub fn rented(&self) -> usize {
        self.rented.load(Ordering::Relaxed)
    }

    /// Number of idle objects held by the pool.
    pub fn available(&self) -> usize {
        self.items.len()
    }
}

impl<O> fmt::Debug for ObjectPool<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("capacity", &self.items.capacity())
            .field("available", &self.items.len())
            .field("rented", &self.rented.load(Ordering::Relaxed))
            .finish()
    }
}

/// Default number of idle objects retained per pool.
pub(crate) fn default_capacity() -> usize {
    std::thread::available_parallelism()
        .map(|parallelism| parallelism.get() * 2)
        .unwrap_or(8)
}
