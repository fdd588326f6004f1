//! The array accessor.
//!
//! A [`DynArr`] binds a [`Pool`] and a [`Head`] for as long as the caller needs them. It is a
//! pair of borrows and costs nothing to create, so callers typically build one per operation.
//!
//! Positions are resolved by walking the tree from the root, consuming one byte of the position
//! per level, most significant byte first. The tree grows upwards: when a write lands beyond the
//! current capacity, new index nodes are stacked on top of the old root until it fits.

use crate::{
    error::Error,
    fault::consistency_fault,
    head::Head,
    pool::{Exclusive, NodePtr, Pool, Serializer},
};
use dynarr_core::{capacity, child_index, levels_for, NodeRef, MAX_POS};

// What a read of a never-written subtree points at.
static ZERO: u32 = 0;

/// A [`Head`] bound to the [`Pool`] its nodes live in.
pub struct DynArr<'a, S: Serializer = Exclusive> {
    pub(crate) pool: &'a Pool<S>,
    pub(crate) head: &'a mut Head,
}

impl<'a, S: Serializer> DynArr<'a, S> {
    pub fn new(pool: &'a Pool<S>, head: &'a mut Head) -> Self {
        DynArr { pool, head }
    }

    pub fn head(&self) -> &Head {
        &*self.head
    }

    /// The word at `pos`, or `None` if `pos` is not below the array's size.
    ///
    /// Words that were never written read as zero.
    pub fn get(&self, pos: u32) -> Option<&u32> {
        if pos >= self.head.size {
            return None;
        }

        let levels = self.head.levels;
        let mut node_ref = self.head.root;
        for depth in 0..levels as usize {
            let node = self.resolve(node_ref, pos, depth);
            let index = child_index(pos, levels, depth);
            if depth + 1 == levels as usize {
                // SAFETY: the node is linked into this array, which we borrow. It can only be
                // released through `&mut self`.
                return Some(unsafe { &*node.word(index) });
            }

            // SAFETY: as above.
            node_ref = unsafe { node.child(index) };
            if node_ref.is_nil() {
                return Some(&ZERO);
            }
        }

        // A non-zero size with no levels.
        self.handle_invalid_ptr(pos, node_ref, 0)
    }

    /// The word at `pos` for reading and writing, growing the array as needed.
    ///
    /// Fails if the pool runs out of memory on the way. Every node allocated before the failure
    /// stays linked and counted in the head.
    pub fn set(&mut self, pos: u32) -> Result<&mut u32, Error> {
        if pos > MAX_POS {
            return Err(Error::OutOfRange(pos));
        }
        if pos >= self.head.size {
            self.expand(pos)?;
        }

        let levels = self.head.levels as usize;
        let mut node = self.resolve(self.head.root, pos, 0);
        for depth in 0..levels - 1 {
            let index = child_index(pos, self.head.levels, depth);
            // SAFETY: `node` is linked into this array, which we borrow mutably.
            let mut child = unsafe { node.child(index) };
            if child.is_nil() {
                child = self.pool.seize()?;
                // SAFETY: as above.
                unsafe { node.set_child(index, child) };
                self.head.node_count += 1;
            }
            node = self.resolve(child, pos, depth + 1);
        }

        let index = child_index(pos, self.head.levels, levels - 1);
        // SAFETY: as above; the returned borrow keeps the array borrowed.
        Ok(unsafe { &mut *node.word(index) })
    }

    /// Add levels on top of the tree until `pos` is addressable, and open up the full capacity
    /// of the tree.
    fn expand(&mut self, pos: u32) -> Result<(), Error> {
        let want = levels_for(pos).ok_or(Error::OutOfRange(pos))?;

        if self.head.levels == 0 {
            debug_assert!(self.head.root.is_nil());
            // The first level is a bare data node.
            self.head.root = self.pool.seize()?;
            self.head.node_count += 1;
            self.head.levels = 1;
            self.head.size = capacity(1);
        }

        while self.head.levels < want {
            let root = self.pool.seize()?;
            let node = self.resolve(root, pos, 0);
            // SAFETY: the node was just seized for this array.
            unsafe { node.set_child(0, self.head.root) };
            self.head.root = root;
            self.head.node_count += 1;
            self.head.levels += 1;
            self.head.size = capacity(self.head.levels);
        }

        self.head.size = capacity(self.head.levels);
        Ok(())
    }

    /// Count the nodes reachable from the root.
    ///
    /// This walks the whole tree and is meant for diagnostics and tests. In a consistent array
    /// the result equals [`Head::node_count`].
    pub fn node_census(&self) -> u32 {
        if self.head.root.is_nil() {
            return 0;
        }

        let levels = self.head.levels as usize;
        let mut count = 0;
        let mut stack = vec![(self.head.root, 0usize)];
        while let Some((node_ref, depth)) = stack.pop() {
            let node = self.resolve(node_ref, 0, depth);
            count += 1;
            if depth + 1 == levels {
                continue;
            }
            for index in 0..dynarr_core::FANOUT {
                // SAFETY: the node is linked into this array, which we borrow.
                let child = unsafe { node.child(index) };
                if !child.is_nil() {
                    stack.push((child, depth + 1));
                }
            }
        }
        count
    }

    /// Resolve a reference met on the way to `pos` at `depth`.
    pub(crate) fn resolve(&self, node_ref: NodeRef, pos: u32, depth: usize) -> NodePtr {
        match self.pool.node(node_ref) {
            Some(node) => node,
            None => self.handle_invalid_ptr(pos, node_ref, depth),
        }
    }

    /// A reference that must point at an in-use node of this pool does not.
    #[cold]
    pub(crate) fn handle_invalid_ptr(&self, pos: u32, node_ref: NodeRef, depth: usize) -> ! {
        consistency_fault(format_args!(
            "invalid node reference {:?} at depth {} on the path to position {} \
             (pool type {}, head {:?})",
            node_ref,
            depth,
            pos,
            self.pool.type_id(),
            self.head,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        context::{ContextOptions, RegionContext},
        pool::NODES_PER_PAGE,
    };
    use std::sync::Arc;

    fn pool(page_limit: Option<u32>) -> Pool {
        let mut options = ContextOptions::new();
        if let Some(limit) = page_limit {
            options.page_limit(limit);
        }
        Pool::new(1, Arc::new(RegionContext::new(options)))
    }

    fn release(pool: &Pool, head: &mut Head) {
        let mut arr = DynArr::new(pool, head);
        let mut iter = arr.release_iter();
        while !arr.trim(0, &mut iter).is_done() {}
    }

    #[test]
    fn first_write_allocates_a_bare_data_node() {
        let pool = pool(None);
        let mut head = Head::new();
        {
            let mut arr = DynArr::new(&pool, &mut head);
            *arr.set(5).unwrap() = 55;
            assert_eq!(arr.get(5), Some(&55));
        }
        assert_eq!(head.levels(), 1);
        assert_eq!(head.size(), 256);
        assert_eq!(head.node_count(), 1);
        release(&pool, &mut head);
    }

    #[test]
    fn growth_stacks_levels_on_the_old_root() {
        let pool = pool(None);
        let mut head = Head::new();
        {
            let mut arr = DynArr::new(&pool, &mut head);
            *arr.set(7).unwrap() = 77;
            *arr.set(1 << 24).unwrap() = 1;
            // the first data node is still reachable along child 0.
            assert_eq!(arr.get(7), Some(&77));
            assert_eq!(arr.get(1 << 24), Some(&1));
            assert_eq!(arr.node_census(), 7);
        }
        assert_eq!(head.levels(), 4);
        assert_eq!(head.size(), u32::MAX);
        assert_eq!(head.node_count(), 7);
        release(&pool, &mut head);
        assert_eq!(pool.info().inuse_nodes, 0);
    }

    #[test]
    fn unaddressable_position_is_rejected() {
        let pool = pool(None);
        let mut head = Head::new();
        let mut arr = DynArr::new(&pool, &mut head);
        assert_eq!(arr.set(u32::MAX).unwrap_err(), Error::OutOfRange(u32::MAX));
        assert!(arr.head().is_empty());

        *arr.set(MAX_POS).unwrap() = 9;
        assert_eq!(arr.get(MAX_POS), Some(&9));
        assert_eq!(arr.get(u32::MAX), None);
        release(&pool, &mut head);
    }

    #[test]
    fn out_of_memory_keeps_committed_growth() {
        // One page: enough for NODES_PER_PAGE nodes.
        let pool = pool(Some(1));
        let mut head = Head::new();
        let mut arr = DynArr::new(&pool, &mut head);

        // Fill the page with data nodes under a two-level tree.
        for i in 0..NODES_PER_PAGE as u32 - 1 {
            *arr.set(i * 256).unwrap() = i;
        }
        assert_eq!(arr.head().node_count(), NODES_PER_PAGE as i32);

        // Growing to three levels needs one more node.
        assert_eq!(
            arr.set(1 << 16).unwrap_err(),
            Error::OutOfMemory { type_id: 1 }
        );
        assert_eq!(arr.head().levels(), 2);
        assert_eq!(arr.head().size(), 1 << 16);
        assert_eq!(arr.node_census(), NODES_PER_PAGE as u32);

        // A new data node inside the current capacity fails too, without side effects.
        assert!(arr.set(200 * 256).is_err());
        assert_eq!(arr.get(200 * 256), Some(&0));
        assert_eq!(arr.node_census() as i32, arr.head().node_count());
        for i in 0..NODES_PER_PAGE as u32 - 1 {
            assert_eq!(arr.get(i * 256), Some(&i));
        }
        release(&pool, &mut head);
    }

    #[test]
    #[should_panic(expected = "invalid node reference")]
    fn dangling_root_is_fatal() {
        let pool = pool(None);
        let mut head = Head::new();
        *DynArr::new(&pool, &mut head).set(3).unwrap() = 3;

        // Release the root behind the array's back.
        pool.release(head.root);
        let arr = DynArr::new(&pool, &mut head);
        let _ = arr.get(3);
    }

    #[test]
    #[should_panic(expected = "invalid node reference")]
    fn size_without_levels_is_fatal() {
        let pool = pool(None);
        let mut head = Head::new();
        head.size = 10;
        let arr = DynArr::new(&pool, &mut head);
        let _ = arr.get(3);
    }
}
