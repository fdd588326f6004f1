use std::fmt;

/// Recoverable failures of array operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The memory context could not supply a page.
    OutOfMemory {
        /// The type id of the pool that asked for the page.
        type_id: u32,
    },
    /// The position lies beyond [`dynarr_core::MAX_POS`] and can never be stored.
    OutOfRange(u32),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfMemory { type_id } => {
                write!(f, "out of memory: no page available for pool type {type_id}")
            }
            Error::OutOfRange(pos) => write!(f, "position {pos} is not addressable"),
        }
    }
}

impl std::error::Error for Error {}
