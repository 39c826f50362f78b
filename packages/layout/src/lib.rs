//! StorageLayout allocation for slotproxy.
//!
//! A proxy's storage is shared by every module that ever runs against it, so
//! slot assignment has to be fixed and append-only:
//! - the proxy reserves `[0, n)` for its own fields;
//! - each module identity owns a range at or after `n`;
//! - ranges of different owners never overlap;
//! - a re-declared module may only append fields after its shipped ones.
//!
//! Violations are reported as `Error::LayoutConflict` at declaration time.

mod allocator;
mod field;

pub use allocator::{
    allocate, Allocation, FieldOffset, LayoutChecker, StorageSlotRange, PROXY_OWNER,
};
pub use field::{Field, FieldType};
