//! How a pool serializes access to its free list.
//!
//! A pool is either private to one execution context ([`Exclusive`]) or shared between several
//! behind an injected mutex ([`Shared`]). The choice is a type parameter of the pool, so a private
//! pool is simply not `Sync` and cannot be reached from two threads at once.

use parking_lot::{Mutex, MutexGuard};
use std::{cell::Cell, marker::PhantomData, sync::Arc};

/// Grants exclusive access to a pool's free list and counters for as long as the guard lives.
///
/// # Safety
///
/// If the implementing type is `Sync`, guards returned by [`Serializer::lock`] on the same value
/// must never be alive at the same time.
pub unsafe trait Serializer {
    type Guard<'a>
    where
        Self: 'a;

    fn lock(&self) -> Self::Guard<'_>;
}

/// No locking. The pool may move between threads but is never shared by them.
#[derive(Debug, Default)]
pub struct Exclusive {
    _not_sync: PhantomData<Cell<()>>,
}

impl Exclusive {
    pub fn new() -> Self {
        Exclusive {
            _not_sync: PhantomData,
        }
    }
}

// SAFETY: `Exclusive` is not `Sync`.
unsafe impl Serializer for Exclusive {
    type Guard<'a> = ();

    fn lock(&self) -> Self::Guard<'_> {}
}

/// An external mutex, possibly shared by several pools.
///
/// The mutex only ever guards free-list and counter updates, never the trees built from the
/// nodes.
#[derive(Debug, Clone)]
pub struct Shared {
    mutex: Arc<Mutex<()>>,
}

impl Shared {
    pub fn new(mutex: Arc<Mutex<()>>) -> Self {
        Shared { mutex }
    }

    /// The mutex this serializer locks.
    pub fn mutex(&self) -> &Arc<Mutex<()>> {
        &self.mutex
    }
}

// SAFETY: every guard holds the mutex.
unsafe impl Serializer for Shared {
    type Guard<'a> = MutexGuard<'a, ()>;

    fn lock(&self) -> Self::Guard<'_> {
        self.mutex.lock()
    }
}
