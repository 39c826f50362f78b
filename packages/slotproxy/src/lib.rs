//! slotproxy: upgradeable storage routing.
//!
//! A proxy holds storage and a binding to a routing table. Calls are looked
//! up by name or function signature and executed by replaceable module code
//! against the proxy's storage, so modules can be swapped without moving
//! state.
//!
//! The layers, bottom to top:
//! - [`slotproxy_core`]: addresses, signatures, slot storage, authorization, deployments
//! - [`layout`]: append-only storage layout allocation
//! - [`registry`]: the name registry and the signature resolver
//! - [`router`]: proxies, versions, manifests
//!
//! The most used types are re-exported at the root.
//!
//! ```rust
//! use std::sync::Arc;
//! use slotproxy::{Address, Binding, Bytes, Deployments, FnModule, Proxy, Registry};
//!
//! let admin = Address::from_low_u64(1);
//! let deployments = Arc::new(Deployments::new());
//! let v1 = deployments.deploy(FnModule::new(|_ctx, _key, _args| Ok(Bytes::from_static(b"v1"))));
//! let v2 = deployments.deploy(FnModule::new(|_ctx, _key, _args| Ok(Bytes::from_static(b"v2"))));
//!
//! let registry = Arc::new(Registry::new(admin));
//! registry.register(&admin, "Controller", v1).unwrap();
//! let proxy = Proxy::builder(Address::from_low_u64(0x100), deployments)
//!     .owner(admin)
//!     .bind(Binding::Registry(registry.clone()))
//!     .build();
//! assert_eq!(proxy.call_name(&admin, "Controller", &Bytes::new()).unwrap(), &b"v1"[..]);
//!
//! registry.register(&admin, "Controller", v2).unwrap();
//! assert_eq!(proxy.call_name(&admin, "Controller", &Bytes::new()).unwrap(), &b"v2"[..]);
//! ```

pub use slotproxy_core;
pub use slotproxy_layout as layout;
pub use slotproxy_registry as registry;
pub use slotproxy_router as router;

pub use slotproxy_core::{
    sig, Action, Address, Auth, Bytes, CallContext, CallKey, Deployments, Error, FnModule,
    Forwardable, Result, Revert, Signature, Slot, SlotReader, SlotWriter, Word,
};
pub use slotproxy_layout::{Field, FieldType, LayoutChecker};
pub use slotproxy_registry::{RegisterMode, Registry, Resolver, ReturnSize};
pub use slotproxy_router::{
    bootstrap, Binding, Cadence, DeploymentManifest, Proxy, RouterConfig, VersionId,
    VersionManager,
};
