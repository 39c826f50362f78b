//! Core slotproxy: the host-facing vocabulary
//!
//! Everything the upper layers route between lives here:
//! - `Address`: 20-byte identities for callers, proxies, and modules
//! - `Signature` / `Selector`: validated function signatures and their
//!   4-byte routing keys
//! - `Slot` / `Word` / `Storage`: slot-addressed storage owned by a proxy,
//!   plus the journaled `StorageTx` that makes a call all-or-nothing
//! - `Forwardable`: the capability a deployed module exposes
//! - `Auth`: the single authorization guard on every mutation
//! - `Deployments`: immutable module code by address
//!
//! # Example
//!
//! ```rust
//! use slotproxy_core::{
//!     sig, Address, Bytes, CallContext, CallKey, Deployments, FnModule, Forwardable,
//!     MemoryStorage, Slot, SlotReader, SlotWriter, Word,
//! };
//!
//! let deployments = Deployments::new();
//! let counter = deployments.deploy(FnModule::new(|ctx, _key, _args| {
//!     let next = ctx.storage.load(Slot(0)).to_u64() + 1;
//!     ctx.storage.store(Slot(0), Word::from_u64(next));
//!     Ok(Bytes::new())
//! }));
//!
//! let mut storage = MemoryStorage::new();
//! let module = deployments.code(&counter).unwrap();
//! let mut ctx = CallContext::new(Address::from_low_u64(1), Address::from_low_u64(2), &mut storage);
//! module.invoke(&mut ctx, &CallKey::from(sig!("increment()")), &Bytes::new()).unwrap();
//! assert_eq!(storage.load(Slot(0)).to_u64(), 1);
//! ```

pub use bytes::Bytes;

mod address;
pub mod auth;
mod deployments;
mod error;
mod signature;
mod storage;
mod traits;

pub use address::Address;
pub use auth::{Action, Auth, Authority, RoleAuthority};
pub use deployments::Deployments;
pub use error::{Error, LayoutConflictKind, Result};
pub use signature::{Selector, Signature, SignatureError};
pub use storage::{Journal, MemoryStorage, Slot, SlotReader, SlotWriter, Storage, StorageTx, Word};
pub use traits::{CallContext, CallKey, FnModule, Forwardable, Revert};
