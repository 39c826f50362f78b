//! Call routing tables for slotproxy.
//!
//! Two lookups a proxy can be bound to:
//! - [`Registry`]: coarse routing, one module per name
//! - [`Resolver`]: fine routing, one module per function signature
//!
//! Both publish immutable snapshots on every mutation, so a reader never
//! observes a half-applied change. A [`ResolverSnapshot`] can be taken and
//! bound directly when a proxy must not follow later resolver edits.

mod lookup;
mod registry;
mod resolver;

pub use lookup::{Lookup, ReturnSize, Target, MAX_FIXED_RETURN_SIZE};
pub use registry::{Registry, RegistryEntry};
pub use resolver::{ModuleInterface, RegisterMode, Resolver, ResolverEntry, ResolverSnapshot};
