//! Level arithmetic.
//!
//! A tree with `levels` levels has `levels - 1` index levels above one data level. The root sits
//! at depth 0 and data nodes at depth `levels - 1`. Every level consumes [`CHUNK_BITS`] of the
//! position, most significant chunk first, so four levels cover the whole `u32` space.

use crate::{CHUNK_BITS, FANOUT};

/// The maximum depth of a tree.
pub const MAX_LEVELS: usize = 4;

/// The highest position that can ever be addressed.
///
/// The capacity of a full tree saturates at `u32::MAX`, which leaves `u32::MAX` itself outside
/// of every array.
pub const MAX_POS: u32 = u32::MAX - 1;

/// The number of addressable positions of a tree with `levels` levels.
///
/// Panics if `levels` exceeds [`MAX_LEVELS`].
pub const fn capacity(levels: u8) -> u32 {
    match levels {
        0 => 0,
        1 => 1 << CHUNK_BITS,
        2 => 1 << (2 * CHUNK_BITS),
        3 => 1 << (3 * CHUNK_BITS),
        4 => u32::MAX,
        _ => panic!("tree deeper than MAX_LEVELS"),
    }
}

/// The smallest number of levels whose capacity exceeds `pos`, or `None` if `pos` is beyond
/// [`MAX_POS`].
pub fn levels_for(pos: u32) -> Option<u8> {
    (1..=MAX_LEVELS as u8).find(|&levels| pos < capacity(levels))
}

/// The index of the child (or, at the data level, the word) selected by `pos` inside the node
/// at `depth` of a tree with `levels` levels.
pub fn child_index(pos: u32, levels: u8, depth: usize) -> usize {
    debug_assert!(depth < levels as usize);
    let shift = (levels as usize - 1 - depth) as u32 * CHUNK_BITS;
    ((pos >> shift) as usize) & (FANOUT - 1)
}

/// The number of positions covered by a single node at `depth` of a tree with `levels` levels.
///
/// `span(levels, levels)` is 1: the range of a single word.
pub fn span(levels: u8, depth: usize) -> u64 {
    debug_assert!(depth <= levels as usize);
    1u64 << ((levels as usize - depth) as u32 * CHUNK_BITS)
}
