//! Pool-relative node references.
//!
//! A [`NodeRef`] names one node inside a pool: a page number and a slot within that page. The
//! encoding reserves the raw value 0 for [`NodeRef::NIL`], so a zeroed index node is one whose
//! every child is empty.

#[cfg(feature = "borsh")]
use borsh::{BorshDeserialize, BorshSerialize};

/// Number of bits of the raw reference used for the slot within a page.
pub const SLOT_BITS: u32 = 5;

/// The maximum number of node slots a page may carry.
pub const MAX_SLOTS_PER_PAGE: usize = 1 << SLOT_BITS;

/// The number of pages addressable by a reference.
pub const MAX_PAGES: u32 = (u32::MAX >> SLOT_BITS) - 1;

/// A reference to a node within a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "borsh", derive(BorshSerialize, BorshDeserialize))]
pub struct NodeRef(u32);

impl NodeRef {
    /// The empty reference.
    pub const NIL: NodeRef = NodeRef(0);

    /// Create a reference to the node at `slot` of page `page`.
    ///
    /// Panics if the page or slot is out of the encodable range.
    pub fn new(page: u32, slot: usize) -> Self {
        assert!(page < MAX_PAGES, "page number {page} out of range");
        assert!(slot < MAX_SLOTS_PER_PAGE, "slot {slot} out of range");
        NodeRef(((page << SLOT_BITS) | slot as u32) + 1)
    }

    /// Interpret a word read out of an index node.
    pub const fn from_raw(raw: u32) -> Self {
        NodeRef(raw)
    }

    /// The word stored in an index node for this reference.
    pub const fn to_raw(self) -> u32 {
        self.0
    }

    pub const fn is_nil(self) -> bool {
        self.0 == 0
    }

    /// The page number. Meaningless for [`NodeRef::NIL`].
    pub fn page(self) -> u32 {
        debug_assert!(!self.is_nil());
        (self.0 - 1) >> SLOT_BITS
    }

    /// The slot within the page. Meaningless for [`NodeRef::NIL`].
    pub fn slot(self) -> usize {
        debug_assert!(!self.is_nil());
        ((self.0 - 1) & (MAX_SLOTS_PER_PAGE as u32 - 1)) as usize
    }
}

impl Default for NodeRef {
    fn default() -> Self {
        NodeRef::NIL
    }
}
