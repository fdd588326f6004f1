//! The node pool.
//!
//! A [`Pool`] owns pages obtained from a [`MemoryContext`] and carves each one into
//! [`NODES_PER_PAGE`] nodes. Unused nodes are threaded into a free list through their own first
//! word. Pages are recycled, never returned, for the lifetime of the pool: node-level release only
//! pushes the node back on the free list, and the pages go back to the context when the pool is
//! dropped.
//!
//! Access to the free list and the counters is serialized according to the pool's
//! [`Serializer`]. Node contents are never guarded by the pool: a node belongs to whichever array
//! links it, and that array's owner serializes access to it.

mod lock;
mod page;

pub use lock::{Exclusive, Serializer, Shared};
pub use page::NODES_PER_PAGE;

pub(crate) use page::NodePtr;

use crate::{
    context::{MemoryContext, PAGE_SIZE},
    error::Error,
    fault::consistency_fault,
};
use dynarr_core::{node_ref::MAX_PAGES, NodeRef, NODE_BYTES, WORDS_PER_NODE};
use page::{in_use_magic, NodePage, FREE_MAGIC};
use parking_lot::{Mutex, RwLock};
use std::{cell::UnsafeCell, fmt, sync::Arc};

/// Point-in-time usage statistics of a [`Pool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolInfo {
    /// Number of pages allocated.
    pub pg_count: u32,
    /// Size of each page in bytes.
    pub pg_byte_sz: u32,
    /// Number of nodes in use.
    pub inuse_nodes: u64,
    /// Size of each node in bytes.
    pub node_byte_sz: u32,
    /// Number of nodes that fit in a page.
    pub nodes_per_page: u32,
}

struct FreeList {
    first_free: NodeRef,
    free_nodes: u64,
    inuse_nodes: u64,
    pg_count: u32,
}

/// An allocator of nodes, shared by any number of arrays.
pub struct Pool<S: Serializer = Exclusive> {
    type_id: u32,
    magic: u32,
    ctx: Arc<dyn MemoryContext>,
    serializer: S,
    // Indexed by page number. Only ever grows, under the serializer.
    pages: RwLock<Vec<NodePage>>,
    free: UnsafeCell<FreeList>,
}

impl Pool<Exclusive> {
    /// Create a pool private to one execution context.
    ///
    /// `type_id` is passed along with every page request to `ctx`, for accounting.
    pub fn new(type_id: u32, ctx: Arc<dyn MemoryContext>) -> Self {
        Self::with_serializer(Exclusive::new(), type_id, ctx)
    }
}

impl Pool<Shared> {
    /// Create a pool whose free list is guarded by `mutex`, so that arrays owned by different
    /// threads may allocate from it concurrently.
    ///
    /// The same mutex may be handed to several pools.
    pub fn with_mutex(mutex: Arc<Mutex<()>>, type_id: u32, ctx: Arc<dyn MemoryContext>) -> Self {
        Self::with_serializer(Shared::new(mutex), type_id, ctx)
    }
}

impl<S: Serializer> Pool<S> {
    fn with_serializer(serializer: S, type_id: u32, ctx: Arc<dyn MemoryContext>) -> Self {
        Pool {
            type_id,
            magic: in_use_magic(type_id),
            ctx,
            serializer,
            pages: RwLock::new(Vec::new()),
            free: UnsafeCell::new(FreeList {
                first_free: NodeRef::NIL,
                free_nodes: 0,
                inuse_nodes: 0,
                pg_count: 0,
            }),
        }
    }

    /// The type id this pool was created with.
    pub fn type_id(&self) -> u32 {
        self.type_id
    }

    /// Take a zeroed node off the free list, growing the pool by one page if the list is empty.
    ///
    /// Fails if the memory context cannot supply a page.
    pub fn seize(&self) -> Result<NodeRef, Error> {
        let (node_ref, node) = self.with_free_list(|free| {
            if free.first_free.is_nil() {
                self.grow(free)?;
            }

            let node_ref = free.first_free;
            let Some((page, slot)) = self.locate(node_ref) else {
                consistency_fault(format_args!(
                    "free list of pool {} points outside the pool: {:?}",
                    self.type_id, node_ref
                ));
            };

            let magic = page.magic(slot);
            let node = page.node(slot);
            // SAFETY: the node is on the free list, which we hold exclusively.
            unsafe {
                if magic.read() != FREE_MAGIC {
                    consistency_fault(format_args!(
                        "free list of pool {} holds node {:?} which is in use",
                        self.type_id, node_ref
                    ));
                }
                free.first_free = node.child(0);
                magic.write(self.magic);
            }

            free.free_nodes -= 1;
            free.inuse_nodes += 1;
            Ok((node_ref, node))
        })?;

        // SAFETY: the node was just stamped in use and is referenced by nobody else.
        unsafe { node.zero(0, WORDS_PER_NODE) };
        Ok(node_ref)
    }

    /// Return a node to the free list.
    ///
    /// Releasing a node which is not in use by this pool is a fatal consistency fault.
    pub fn release(&self, node_ref: NodeRef) {
        let Some((page, slot)) = self.locate(node_ref) else {
            consistency_fault(format_args!(
                "release of {:?} which does not belong to pool {}",
                node_ref, self.type_id
            ));
        };

        self.with_free_list(|free| {
            let magic = page.magic(slot);
            // SAFETY: the caller owned the node; it joins the free list under the lock.
            unsafe {
                if magic.read() != self.magic {
                    consistency_fault(format_args!(
                        "release of {:?} which is not in use in pool {}",
                        node_ref, self.type_id
                    ));
                }
                magic.write(FREE_MAGIC);
                page.node(slot).set_child(0, free.first_free);
            }

            if free.inuse_nodes == 0 {
                consistency_fault(format_args!(
                    "in-use node count of pool {} underflowed",
                    self.type_id
                ));
            }
            free.first_free = node_ref;
            free.free_nodes += 1;
            free.inuse_nodes -= 1;
        })
    }

    /// A snapshot of the pool's usage statistics.
    pub fn info(&self) -> PoolInfo {
        self.with_free_list(|free| PoolInfo {
            pg_count: free.pg_count,
            pg_byte_sz: PAGE_SIZE as u32,
            inuse_nodes: free.inuse_nodes,
            node_byte_sz: NODE_BYTES as u32,
            nodes_per_page: NODES_PER_PAGE as u32,
        })
    }

    /// The number of nodes sitting on the free list.
    pub fn free_nodes(&self) -> u64 {
        self.with_free_list(|free| {
            debug_assert_eq!(
                free.free_nodes + free.inuse_nodes,
                free.pg_count as u64 * NODES_PER_PAGE as u64
            );
            free.free_nodes
        })
    }

    /// The node referenced by `node_ref`, if it is a node of this pool which is in use.
    pub(crate) fn node(&self, node_ref: NodeRef) -> Option<NodePtr> {
        let (page, slot) = self.locate(node_ref)?;
        // SAFETY: reading the magic of a node we are told we own. Other threads only touch the
        // magic words of nodes they own.
        let magic = unsafe { page.magic(slot).read() };
        (magic == self.magic).then(|| page.node(slot))
    }

    fn locate(&self, node_ref: NodeRef) -> Option<(NodePage, usize)> {
        if node_ref.is_nil() || node_ref.slot() >= NODES_PER_PAGE {
            return None;
        }
        let page = self.pages.read().get(node_ref.page() as usize).copied()?;
        Some((page, node_ref.slot()))
    }

    fn grow(&self, free: &mut FreeList) -> Result<(), Error> {
        debug_assert!(free.first_free.is_nil());
        let out_of_memory = Error::OutOfMemory {
            type_id: self.type_id,
        };
        if free.pg_count >= MAX_PAGES {
            return Err(out_of_memory);
        }
        let Some(raw) = self.ctx.alloc_page(self.type_id) else {
            tracing::debug!(type_id = self.type_id, "memory context refused a page");
            return Err(out_of_memory);
        };

        let page = NodePage::format(raw);
        let page_no = free.pg_count;
        for slot in 0..NODES_PER_PAGE {
            let next = if slot + 1 < NODES_PER_PAGE {
                NodeRef::new(page_no, slot + 1)
            } else {
                free.first_free
            };
            // SAFETY: the page is fresh and not yet visible to anyone.
            unsafe { page.node(slot).set_child(0, next) };
        }

        self.pages.write().push(page);
        free.first_free = NodeRef::new(page_no, 0);
        free.free_nodes += NODES_PER_PAGE as u64;
        free.pg_count += 1;

        tracing::debug!(
            type_id = self.type_id,
            pg_count = free.pg_count,
            "pool grew by one page"
        );
        Ok(())
    }

    fn with_free_list<R>(&self, f: impl FnOnce(&mut FreeList) -> R) -> R {
        let _guard = self.serializer.lock();
        // SAFETY: the serializer grants exclusive access while `_guard` lives, and this is never
        // entered recursively.
        f(unsafe { &mut *self.free.get() })
    }
}

impl<S: Serializer> fmt::Debug for Pool<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("type_id", &self.type_id)
            .field("info", &self.info())
            .field("free_nodes", &self.free_nodes())
            .finish()
    }
}

impl<S: Serializer> Drop for Pool<S> {
    fn drop(&mut self) {
        let free = self.free.get_mut();
        if free.inuse_nodes != 0 {
            tracing::warn!(
                type_id = self.type_id,
                inuse_nodes = free.inuse_nodes,
                "pool dropped with nodes still in use"
            );
        }

        let pages = std::mem::take(self.pages.get_mut());
        tracing::debug!(
            type_id = self.type_id,
            pg_count = pages.len(),
            "returning pool pages"
        );
        for page in pages {
            // SAFETY: the pool is going away, so no node can be reached anymore.
            unsafe { self.ctx.release_page(self.type_id, page.into_raw()) };
        }
    }
}

// SAFETY: the pages are owned by the pool, and reached only through it. The free list is guarded
// by the serializer, which is only `Sync` when it provides mutual exclusion.
unsafe impl<S: Serializer + Send> Send for Pool<S> {}
unsafe impl<S: Serializer + Sync> Sync for Pool<S> {}
