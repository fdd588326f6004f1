//! Core types and position math for the 256-way dynamic array.
//!
//! This crate defines how a 32-bit linear position is decomposed into a path through a radix tree
//! of fixed-size nodes, and how nodes are named inside a pool, without owning any memory itself.
//!
//! Nothing here requires the standard library.

#![cfg_attr(all(not(feature = "std"), not(test)), no_std)]

pub mod level;
pub mod node_ref;

pub use level::{capacity, child_index, levels_for, span, MAX_LEVELS, MAX_POS};
pub use node_ref::NodeRef;

/// Number of bits of a position consumed by one level of the tree.
pub const CHUNK_BITS: u32 = 8;

/// Branching factor of an index node.
pub const FANOUT: usize = 1 << CHUNK_BITS;

/// Number of 4-byte words in every node, index and data alike.
pub const WORDS_PER_NODE: usize = FANOUT;

/// Size of a node in bytes.
pub const NODE_BYTES: usize = WORDS_PER_NODE * core::mem::size_of::<u32>();
