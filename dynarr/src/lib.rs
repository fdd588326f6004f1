//! An auto-growing array of `u32` words, stored as a 256-way radix tree of fixed-size nodes.
//!
//! Nodes come from a [`Pool`], which carves them out of pages obtained from a [`MemoryContext`]
//! and recycles them through a free list. Any number of arrays may share one pool. Each array is
//! described by a small [`Head`] owned by the caller and accessed through a [`DynArr`], which
//! binds the head to its pool:
//!
//! - [`DynArr::get`] and [`DynArr::set`] walk the tree one level per byte of the position, and
//!   `set` grows the tree as needed.
//! - Shrinking is done in bounded steps through a [`ReleaseIter`], so that freeing a large array
//!   never takes more than a small, constant amount of work per call. See [`DynArr::release`],
//!   [`DynArr::trim`] and [`DynArr::truncate`].
//!
//! A pool is either private to one thread ([`Exclusive`]) or guarded by a mutex ([`Shared`]),
//! in which case arrays owned by different threads may allocate from it at the same time. An
//! array itself is never synchronized: its owner serializes access to it.

mod array;
mod context;
mod error;
mod fault;
mod head;
mod pool;
mod release;

#[cfg(feature = "benchmarks")]
pub mod benches;

pub use array::DynArr;
pub use context::{ContextOptions, MemoryContext, RawPage, RegionContext, PAGE_ALIGN, PAGE_SIZE};
pub use dynarr_core::{capacity, levels_for, NodeRef, MAX_LEVELS, MAX_POS, NODE_BYTES};
pub use error::Error;
pub use head::Head;
pub use pool::{Exclusive, Pool, PoolInfo, Serializer, Shared, NODES_PER_PAGE};
pub use release::{ReleaseIter, Step};
