//! Heuristics module for the CTOP.
//!
//! Insertion (destroy) and removal (repair) methods used by the ALNS, and the
//! construction of the initial solution.

pub mod construction;
pub mod destroy;
pub mod repair;

pub use construction::*;
pub use destroy::DestroyMethod;
pub use repair::{RepairContext, RepairMethod};
