//! The forwarding proxy.
//!
//! A proxy owns storage and a binding, and nothing else. Every call is
//! resolved through the binding and executed by the target module against
//! the proxy's storage, inside a journaled transaction that is committed only
//! when the module returns successfully.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use slotproxy_core::{
    Action, Address, Auth, Bytes, CallContext, CallKey, Deployments, Error, MemoryStorage,
    Result, Slot, SlotReader, StorageTx, Word,
};
use slotproxy_layout::Allocation;
use slotproxy_registry::Lookup;

use crate::Binding;

/// Builder state: no binding yet.
pub struct Unbound;

/// Builder state: a binding has been supplied.
pub struct Bound(Binding);

/// Builds a [`Proxy`].
///
/// `build` only exists once `bind` has been called, so an unbound proxy can
/// never receive calls.
///
/// ```rust
/// use std::sync::Arc;
/// use slotproxy_core::{Address, Deployments};
/// use slotproxy_registry::Registry;
/// use slotproxy_router::{Binding, Proxy};
///
/// let admin = Address::from_low_u64(1);
/// let registry = Arc::new(Registry::new(admin));
/// let proxy = Proxy::builder(Address::from_low_u64(0x100), Arc::new(Deployments::new()))
///     .owner(admin)
///     .bind(Binding::Registry(registry))
///     .build();
/// assert_eq!(proxy.binding().kind(), "registry");
/// ```
pub struct ProxyBuilder<S> {
    address: Address,
    deployments: Arc<Deployments>,
    auth: Option<Auth>,
    reserved: Option<Allocation>,
    storage: MemoryStorage,
    state: S,
}

impl<S> ProxyBuilder<S> {
    /// The owner allowed to rebind the proxy.
    #[must_use]
    pub fn owner(mut self, owner: Address) -> Self {
        self.auth = Some(Auth::new(owner));
        self
    }

    /// A full authorization guard, replacing `owner`.
    #[must_use]
    pub fn auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// The proxy's own reserved fields.
    #[must_use]
    pub fn reserved(mut self, allocation: Allocation) -> Self {
        self.reserved = Some(allocation);
        self
    }

    /// Initial storage contents.
    #[must_use]
    pub fn storage(mut self, storage: MemoryStorage) -> Self {
        self.storage = storage;
        self
    }
}

impl ProxyBuilder<Unbound> {
    /// Give the proxy its routing table.
    pub fn bind(self, binding: Binding) -> ProxyBuilder<Bound> {
        ProxyBuilder {
            address: self.address,
            deployments: self.deployments,
            auth: self.auth,
            reserved: self.reserved,
            storage: self.storage,
            state: Bound(binding),
        }
    }
}

impl ProxyBuilder<Bound> {
    pub fn build(self) -> Proxy {
        let address = self.address;
        let Bound(binding) = self.state;
        tracing::debug!(%address, binding = binding.kind(), "proxy bound");
        Proxy {
            address,
            auth: self.auth.unwrap_or_else(|| Auth::new(address)),
            binding: ArcSwap::from_pointee(binding),
            storage: Mutex::new(self.storage),
            deployments: self.deployments,
            reserved: self.reserved,
            managed: AtomicBool::new(false),
        }
    }
}

/// A bound, forwarding proxy.
///
/// Calls against one proxy are serialized: its storage lock is held for the
/// whole forwarded call. A module therefore cannot call back into the proxy
/// that is forwarding to it.
pub struct Proxy {
    address: Address,
    auth: Auth,
    binding: ArcSwap<Binding>,
    storage: Mutex<MemoryStorage>,
    deployments: Arc<Deployments>,
    reserved: Option<Allocation>,
    managed: AtomicBool,
}

impl Proxy {
    /// Start building a proxy at `address`, forwarding to code in
    /// `deployments`.
    ///
    /// Without an explicit owner the proxy administers itself: only `address`
    /// may rebind it.
    pub fn builder(address: Address, deployments: Arc<Deployments>) -> ProxyBuilder<Unbound> {
        ProxyBuilder {
            address,
            deployments,
            auth: None,
            reserved: None,
            storage: MemoryStorage::new(),
            state: Unbound,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    pub fn reserved(&self) -> Option<&Allocation> {
        self.reserved.as_ref()
    }

    /// The current binding.
    pub fn binding(&self) -> Arc<Binding> {
        self.binding.load_full()
    }

    /// Whether a version manager has taken over this proxy's binding.
    pub fn is_managed(&self) -> bool {
        self.managed.load(Ordering::Acquire)
    }

    /// Replace the binding.
    ///
    /// Calls already past their lookup finish against the old binding; every
    /// later call sees the new one. A managed proxy is only rebound through
    /// its version manager, so this fails with `Unauthorized` for every
    /// caller.
    pub fn set_binding(&self, caller: &Address, binding: Binding) -> Result<()> {
        self.auth.check(caller, Action::Rebind)?;
        if self.is_managed() {
            tracing::warn!(proxy = %self.address, %caller, "rebind refused: proxy is managed");
            return Err(Error::Unauthorized {
                caller: *caller,
                action: Action::Rebind,
            });
        }
        self.install(binding);
        Ok(())
    }

    /// Hand rebinding over to a version manager. Returns `false` if one
    /// already holds it.
    pub(crate) fn mark_managed(&self) -> bool {
        !self.managed.swap(true, Ordering::AcqRel)
    }

    /// Rebind without an authorization check. Callers have already
    /// established the right to rebind this proxy.
    pub(crate) fn install(&self, binding: Binding) {
        tracing::debug!(proxy = %self.address, binding = binding.kind(), "proxy rebound");
        self.binding.store(Arc::new(binding));
    }

    /// Forward a call.
    ///
    /// # Returns
    ///
    /// * `Ok(data)` - The module's return data, shaped by the entry's return
    ///   size. Its storage writes are committed.
    /// * `Err(Error::UnresolvedTarget)` - Nothing is bound to `key`, or the
    ///   bound address holds no code. Storage is untouched.
    /// * `Err(Error::Reverted)` - The module failed. Its revert data is
    ///   returned unchanged and its storage writes are discarded.
    pub fn call(&self, caller: &Address, key: &CallKey, args: &Bytes) -> Result<Bytes> {
        let mut storage = self.storage.lock();

        let binding = self.binding.load_full();
        let target = binding.resolve(key).map_err(|err| match err {
            Error::NotFound { .. } => Error::unresolved(key),
            other => other,
        })?;
        let module = self
            .deployments
            .code(&target.address)
            .ok_or_else(|| Error::unresolved(key))?;

        let mut tx = StorageTx::new(&*storage);
        let result = {
            let mut ctx = CallContext::new(self.address, *caller, &mut tx);
            module.invoke(&mut ctx, key, args)
        };

        match result {
            Ok(data) => {
                let journal = tx.into_journal();
                tracing::debug!(
                    proxy = %self.address,
                    %key,
                    target = %target.address,
                    writes = journal.len(),
                    "call forwarded"
                );
                journal.apply(&mut *storage);
                Ok(target.return_size.shape(data))
            }
            Err(revert) => {
                tracing::debug!(
                    proxy = %self.address,
                    %key,
                    target = %target.address,
                    %revert,
                    "forwarded call reverted"
                );
                Err(Error::Reverted(revert))
            }
        }
    }

    /// Forward a call by registry name.
    pub fn call_name(&self, caller: &Address, name: &str, args: &Bytes) -> Result<Bytes> {
        self.call(caller, &CallKey::name(name), args)
    }

    /// Read one slot of the proxy's storage.
    pub fn load(&self, slot: Slot) -> Word {
        self.storage.lock().load(slot)
    }

    /// A copy of the proxy's storage.
    pub fn storage_snapshot(&self) -> MemoryStorage {
        self.storage.lock().clone()
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("address", &self.address)
            .field("owner", &self.auth.owner())
            .field("binding", &self.binding.load().kind())
            .field("managed", &self.is_managed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotproxy_core::{sig, FnModule, Revert, SlotWriter};
    use slotproxy_registry::{RegisterMode, Registry, Resolver, ReturnSize};

    const ADMIN: u64 = 1;
    const PROXY: u64 = 0x100;

    fn admin() -> Address {
        Address::from_low_u64(ADMIN)
    }

    /// A module that bumps slot 0 and returns the new value, or reverts with
    /// the value once it reaches `limit`.
    fn counter(limit: u64) -> impl slotproxy_core::Forwardable {
        FnModule::new(move |ctx, _key, _args| {
            let next = ctx.storage.load(Slot(0)).to_u64() + 1;
            ctx.storage.store(Slot(0), Word::from_u64(next));
            if next >= limit {
                return Err(Revert::message("limit reached"));
            }
            Ok(Bytes::copy_from_slice(Word::from_u64(next).as_bytes()))
        })
    }

    fn setup(limit: u64) -> (Arc<Resolver>, Proxy, Address) {
        let deployments = Arc::new(Deployments::new());
        let module = deployments.deploy(counter(limit));
        let resolver = Arc::new(Resolver::new(admin()));
        resolver
            .register(
                &admin(),
                sig!("increment()"),
                module,
                ReturnSize::Fixed(32),
                RegisterMode::Strict,
            )
            .unwrap();
        let proxy = Proxy::builder(Address::from_low_u64(PROXY), deployments)
            .owner(admin())
            .bind(Binding::Resolver(resolver.clone()))
            .build();
        (resolver, proxy, module)
    }

    #[test]
    fn forwards_against_proxy_storage() {
        let (_resolver, proxy, _module) = setup(10);
        let key = CallKey::from(sig!("increment()"));

        let out = proxy.call(&Address::from_low_u64(7), &key, &Bytes::new()).unwrap();
        assert_eq!(Word::from_slice(&out).to_u64(), 1);
        proxy.call(&Address::from_low_u64(7), &key, &Bytes::new()).unwrap();
        assert_eq!(proxy.load(Slot(0)).to_u64(), 2);
    }

    #[test]
    fn unresolved_call_changes_nothing() {
        let (_resolver, proxy, _module) = setup(10);
        let err = proxy
            .call(&admin(), &CallKey::from(sig!("missing()")), &Bytes::new())
            .unwrap_err();
        assert!(matches!(err, Error::UnresolvedTarget { .. }));
        assert!(proxy.storage_snapshot().is_empty());
    }

    #[test]
    fn target_without_code_is_unresolved() {
        let (resolver, proxy, _module) = setup(10);
        resolver
            .register(
                &admin(),
                sig!("ghost()"),
                Address::from_low_u64(0xdead),
                ReturnSize::Dynamic,
                RegisterMode::Strict,
            )
            .unwrap();
        assert!(matches!(
            proxy.call(&admin(), &CallKey::from(sig!("ghost()")), &Bytes::new()),
            Err(Error::UnresolvedTarget { .. })
        ));
    }

    #[test]
    fn revert_passes_through_and_rolls_back() {
        let (_resolver, proxy, _module) = setup(2);
        let key = CallKey::from(sig!("increment()"));
        proxy.call(&admin(), &key, &Bytes::new()).unwrap();
        let before = proxy.storage_snapshot();

        let err = proxy.call(&admin(), &key, &Bytes::new()).unwrap_err();
        assert_eq!(err.revert(), Some(&Revert::message("limit reached")));
        assert_eq!(proxy.storage_snapshot(), before);
    }

    #[test]
    fn rebind_requires_authorization() {
        let (_resolver, proxy, _module) = setup(10);
        let registry = Arc::new(Registry::new(admin()));

        let err = proxy
            .set_binding(&Address::from_low_u64(9), Binding::Registry(registry.clone()))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Unauthorized {
                action: Action::Rebind,
                ..
            }
        ));
        assert_eq!(proxy.binding().kind(), "resolver");

        proxy
            .set_binding(&admin(), Binding::Registry(registry))
            .unwrap();
        assert_eq!(proxy.binding().kind(), "registry");
    }

    #[test]
    fn routes_by_name_through_a_registry() {
        let deployments = Arc::new(Deployments::new());
        let module = deployments.deploy(FnModule::new(|ctx, _key, args| {
            ctx.storage.store(Slot(5), Word::from_slice(args));
            Ok(args.clone())
        }));
        let registry = Arc::new(Registry::new(admin()));
        registry.register(&admin(), "Echo", module).unwrap();

        let proxy = Proxy::builder(Address::from_low_u64(PROXY), deployments)
            .bind(Binding::Registry(registry))
            .build();
        let args = Bytes::from_static(b"hello");
        assert_eq!(proxy.call_name(&admin(), "Echo", &args).unwrap(), args);
        assert_eq!(proxy.load(Slot(5)), Word::from_slice(b"hello"));
    }

    #[test]
    fn module_sees_proxy_and_caller() {
        let deployments = Arc::new(Deployments::new());
        let module = deployments.deploy(FnModule::new(|ctx, _key, _args| {
            let mut out = ctx.this.as_bytes().to_vec();
            out.extend_from_slice(ctx.caller.as_bytes());
            Ok(Bytes::from(out))
        }));
        let registry = Arc::new(Registry::new(admin()));
        registry.register(&admin(), "WhoAmI", module).unwrap();

        let proxy = Proxy::builder(Address::from_low_u64(PROXY), deployments)
            .bind(Binding::Registry(registry))
            .build();
        let out = proxy
            .call_name(&Address::from_low_u64(42), "WhoAmI", &Bytes::new())
            .unwrap();
        assert_eq!(&out[..20], Address::from_low_u64(PROXY).as_bytes());
        assert_eq!(&out[20..], Address::from_low_u64(42).as_bytes());
    }

    #[test]
    fn self_administered_by_default() {
        let registry = Arc::new(Registry::new(admin()));
        let proxy = Proxy::builder(Address::from_low_u64(PROXY), Arc::new(Deployments::new()))
            .bind(Binding::Registry(registry.clone()))
            .build();
        assert_eq!(proxy.auth().owner(), Address::from_low_u64(PROXY));
        assert!(proxy
            .set_binding(&admin(), Binding::Registry(registry))
            .is_err());
    }

    #[test]
    fn initial_storage_and_reservation() {
        let mut storage = MemoryStorage::new();
        storage.store(Slot(0), Word::from_address(&admin()));
        let allocation = slotproxy_layout::allocate(
            slotproxy_layout::PROXY_OWNER,
            0,
            &[slotproxy_layout::Field::new(
                "owner",
                slotproxy_layout::FieldType::Address,
            )],
        )
        .unwrap();

        let proxy = Proxy::builder(Address::from_low_u64(PROXY), Arc::new(Deployments::new()))
            .storage(storage)
            .reserved(allocation)
            .bind(Binding::Registry(Arc::new(Registry::new(admin()))))
            .build();
        assert_eq!(proxy.load(Slot(0)).to_address(), admin());
        assert_eq!(proxy.reserved().unwrap().range.len, 1);
    }
}
