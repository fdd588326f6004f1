use dynarr_core::{NodeRef, NODE_BYTES};

#[cfg(feature = "borsh")]
use borsh::{BorshDeserialize, BorshSerialize};

/// The persistable descriptor of one array.
///
/// A `Head` is a small value embedded by its owner. It is only ever changed through a
/// [`crate::DynArr`] binding it to the pool its nodes come from, and it must be emptied (by
/// driving a release to completion) before it is dropped: dropping a non-empty head is a
/// programming error and panics.
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "borsh", derive(BorshSerialize, BorshDeserialize))]
pub struct Head {
    pub(crate) root: NodeRef,
    // Exclusive bound on addressable positions.
    pub(crate) size: u32,
    // Depth of the tree. `size <= capacity(levels)`.
    pub(crate) levels: u8,
    pub(crate) node_count: i32,
}

impl Head {
    /// An empty head.
    pub const fn new() -> Self {
        Head {
            root: NodeRef::NIL,
            size: 0,
            levels: 0,
            node_count: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The exclusive upper bound of addressable positions.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// The depth of the tree: 0 when empty, up to [`dynarr_core::MAX_LEVELS`].
    pub fn levels(&self) -> u8 {
        self.levels
    }

    /// The number of nodes allocated to this array.
    pub fn node_count(&self) -> i32 {
        self.node_count
    }

    /// The number of bytes of node storage allocated to this array.
    pub fn byte_size(&self) -> u32 {
        self.node_count.max(0) as u32 * NODE_BYTES as u32
    }
}

impl Default for Head {
    fn default() -> Self {
        Head::new()
    }
}

impl Drop for Head {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        assert_eq!(self.size, 0, "array head dropped while not empty");
        assert_eq!(
            self.node_count, 0,
            "array head dropped while still owning nodes"
        );
    }
}
