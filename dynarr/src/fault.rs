//! Fatal consistency faults.
//!
//! These report broken invariants: memory corruption or an accounting defect somewhere else. They
//! are never turned into recoverable errors.

use std::fmt;

/// Report a consistency fault and stop.
#[cold]
#[inline(never)]
#[track_caller]
pub(crate) fn consistency_fault(what: fmt::Arguments) -> ! {
    tracing::error!("{}", what);
    panic!("dynarr consistency fault: {}", what)
}
