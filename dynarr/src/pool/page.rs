//! The layout of a node page.
//!
//! A page obtained from the memory context is viewed as a header of one magic word per node
//! followed by [`NODES_PER_PAGE`] nodes of [`WORDS_PER_NODE`] words each. The magic word tells
//! whether the node is free or in use by the pool that owns the page, which is what lets the pool
//! catch double releases and dangling references.

use crate::context::{RawPage, PAGE_ALIGN, PAGE_SIZE};
use dynarr_core::{node_ref::MAX_SLOTS_PER_PAGE, NodeRef, NODE_BYTES, WORDS_PER_NODE};
use std::ptr::{addr_of_mut, NonNull};

/// The number of nodes carved out of one page.
pub const NODES_PER_PAGE: usize = (PAGE_SIZE - HEADER_BYTES) / NODE_BYTES;

// One magic word per node slot that fits in a page, rounded up to a cache line.
const HEADER_BYTES: usize = 128;

/// The magic word of a node sitting on the free list.
pub const FREE_MAGIC: u32 = 0;

/// The magic word stamped on in-use nodes of a pool with the given type id.
pub fn in_use_magic(type_id: u32) -> u32 {
    0xDA25_0000 | (!type_id & 0xFFFF)
}

#[repr(C)]
struct Layout {
    magic: [u32; HEADER_BYTES / 4],
    nodes: [[u32; WORDS_PER_NODE]; NODES_PER_PAGE],
}

const _: () = assert!(std::mem::size_of::<Layout>() <= PAGE_SIZE);
const _: () = assert!(std::mem::align_of::<Layout>() <= PAGE_ALIGN);
const _: () = assert!(NODES_PER_PAGE <= MAX_SLOTS_PER_PAGE);
const _: () = assert!(NODES_PER_PAGE <= HEADER_BYTES / 4);

/// A page of the pool, viewed as nodes.
///
/// This is a plain pointer: it is `Copy` and does not own the page. The pool keeps the
/// [`RawPage`] alive for as long as any `NodePage` built from it is used.
#[derive(Clone, Copy)]
pub(crate) struct NodePage(NonNull<Layout>);

impl NodePage {
    /// View a fresh page as nodes, marking every node free.
    pub fn format(page: RawPage) -> Self {
        let page = NodePage(page.into_raw().cast());
        for slot in 0..NODES_PER_PAGE {
            // SAFETY: the page was just handed to us and nobody else references it.
            unsafe { page.magic(slot).write(FREE_MAGIC) };
        }
        page
    }

    /// Give the page back in the form the memory context handed it out.
    ///
    /// # Safety
    ///
    /// No node of this page may be accessed afterwards.
    pub unsafe fn into_raw(self) -> RawPage {
        RawPage::from_raw(self.0.cast())
    }

    /// Pointer to the magic word of the node at `slot`.
    pub fn magic(self, slot: usize) -> *mut u32 {
        assert!(slot < NODES_PER_PAGE);
        // SAFETY: in bounds of the header, which is in bounds of the page.
        unsafe {
            addr_of_mut!((*self.0.as_ptr()).magic)
                .cast::<u32>()
                .add(slot)
        }
    }

    /// The node at `slot`.
    pub fn node(self, slot: usize) -> NodePtr {
        assert!(slot < NODES_PER_PAGE);
        // SAFETY: in bounds of the node array, which is in bounds of the page.
        let words = unsafe {
            addr_of_mut!((*self.0.as_ptr()).nodes)
                .cast::<[u32; WORDS_PER_NODE]>()
                .add(slot)
                .cast::<u32>()
        };
        // SAFETY: derived from a non-null page pointer.
        NodePtr(unsafe { NonNull::new_unchecked(words) })
    }
}

/// A pointer to the words of one node.
///
/// All accessors are `unsafe`: the caller must own the node (hold it through a live array, or
/// through the pool's free list under the pool lock) and the pool must outlive the access.
#[derive(Clone, Copy)]
pub(crate) struct NodePtr(NonNull<u32>);

impl NodePtr {
    /// Pointer to word `i` of the node.
    pub fn word(self, i: usize) -> *mut u32 {
        assert!(i < WORDS_PER_NODE);
        // SAFETY: in bounds of the node.
        unsafe { self.0.as_ptr().add(i) }
    }

    pub unsafe fn read(self, i: usize) -> u32 {
        self.word(i).read()
    }

    pub unsafe fn write(self, i: usize, value: u32) {
        self.word(i).write(value)
    }

    /// Interpret word `i` as a child reference.
    pub unsafe fn child(self, i: usize) -> NodeRef {
        NodeRef::from_raw(self.read(i))
    }

    pub unsafe fn set_child(self, i: usize, child: NodeRef) {
        self.write(i, child.to_raw())
    }

    /// Zero words `from..to`.
    pub unsafe fn zero(self, from: usize, to: usize) {
        assert!(from <= to && to <= WORDS_PER_NODE);
        std::ptr::write_bytes(self.0.as_ptr().add(from), 0, to - from);
    }
}
