//! Forwarding proxies for slotproxy.
//!
//! A [`Proxy`] owns storage and a [`Binding`]. Calls are resolved through the
//! binding and executed by module code against the proxy's storage:
//!
//! ```text
//! caller -> Proxy -> Registry / Resolver / ResolverSnapshot -> module code
//!                         (lookup)                          (runs on proxy storage)
//! ```
//!
//! The [`VersionManager`] publishes frozen resolver snapshots as numbered
//! versions and moves proxies between them, one at a time or all together
//! depending on its [`Cadence`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use slotproxy_core::{sig, Address, Bytes, CallKey, Deployments, FnModule, Slot, SlotWriter, Word};
//! use slotproxy_registry::{RegisterMode, Resolver, ReturnSize};
//! use slotproxy_router::{Binding, Proxy};
//!
//! let admin = Address::from_low_u64(1);
//! let deployments = Arc::new(Deployments::new());
//! let setter = deployments.deploy(FnModule::new(|ctx, _key, args| {
//!     ctx.storage.store(Slot(3), Word::from_slice(args));
//!     Ok(Bytes::new())
//! }));
//!
//! let resolver = Arc::new(Resolver::new(admin));
//! resolver
//!     .register(&admin, sig!("set(uint256)"), setter, ReturnSize::Fixed(0), RegisterMode::Strict)
//!     .unwrap();
//!
//! let proxy = Proxy::builder(Address::from_low_u64(0x100), deployments)
//!     .owner(admin)
//!     .bind(Binding::Resolver(resolver))
//!     .build();
//!
//! let args = Bytes::copy_from_slice(Word::from_u64(7).as_bytes());
//! proxy.call(&admin, &CallKey::from(sig!("set(uint256)")), &args).unwrap();
//! assert_eq!(proxy.load(Slot(3)).to_u64(), 7);
//! ```

mod binding;
mod bootstrap;
mod config;
mod proxy;
mod version;

pub use binding::Binding;
pub use bootstrap::{bootstrap, Bootstrapped};
pub use config::{DeploymentManifest, FunctionManifest, ModuleManifest, RouterConfig};
pub use proxy::{Bound, Proxy, ProxyBuilder, Unbound};
pub use version::{Cadence, UpgradeKind, UpgradeRecord, VersionId, VersionManager};
