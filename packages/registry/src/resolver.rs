//! Resolver: route by function signature.
//!
//! Entries are keyed by selector across the whole resolver. Registering a
//! selector that is already bound elsewhere fails unless the caller asks to
//! overwrite; re-registering the same binding is a no-op.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use slotproxy_core::{Action, Address, Auth, CallKey, Error, Result, Selector, Signature};

use crate::{Lookup, ReturnSize, Target};

/// One resolver entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverEntry {
    pub signature: Signature,
    pub target: Address,
    pub return_size: ReturnSize,
}

impl ResolverEntry {
    pub fn new(signature: Signature, target: Address, return_size: ReturnSize) -> Self {
        Self {
            signature,
            target,
            return_size,
        }
    }

    fn as_target(&self) -> Target {
        Target {
            address: self.target,
            return_size: self.return_size,
        }
    }
}

/// Whether a registration may replace an existing, different binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterMode {
    /// Fail with `SignatureConflict` on a differing binding.
    #[default]
    Strict,
    /// Replace the existing binding.
    Overwrite,
}

/// The signatures one module serves, for registrant-side checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInterface {
    pub target: Address,
    pub signatures: Vec<Signature>,
}

/// A frozen resolver configuration.
///
/// Snapshots never change once taken; versions and in-flight calls hold
/// them by `Arc`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverSnapshot {
    entries: BTreeMap<Selector, ResolverEntry>,
}

impl ResolverSnapshot {
    /// The target and return size bound to `signature`.
    pub fn lookup(&self, signature: &Signature) -> Result<Target> {
        match self.entries.get(&signature.selector()) {
            Some(entry) if entry.signature == *signature => Ok(entry.as_target()),
            _ => Err(Error::not_found(format!("signature '{}'", signature))),
        }
    }

    /// The entry bound to a raw selector.
    pub fn lookup_selector(&self, selector: &Selector) -> Result<&ResolverEntry> {
        self.entries
            .get(selector)
            .ok_or_else(|| Error::not_found(format!("selector {}", selector)))
    }

    /// All entries in selector order.
    pub fn entries(&self) -> impl Iterator<Item = &ResolverEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn apply(&mut self, entry: ResolverEntry, mode: RegisterMode) -> Result<bool> {
        let selector = entry.signature.selector();
        if let Some(existing) = self.entries.get(&selector) {
            if *existing == entry {
                return Ok(false);
            }
            let same_binding =
                existing.signature == entry.signature && existing.target == entry.target;
            if !same_binding && mode == RegisterMode::Strict {
                return Err(Error::SignatureConflict {
                    signature: entry.signature.to_string(),
                    existing_signature: existing.signature.to_string(),
                    existing: existing.target,
                    requested: entry.target,
                });
            }
        }
        self.entries.insert(selector, entry);
        Ok(true)
    }
}

impl Lookup for ResolverSnapshot {
    fn resolve(&self, key: &CallKey) -> Result<Target> {
        match key {
            CallKey::Signature(signature) => self.lookup(signature),
            CallKey::Name(_) => Err(Error::not_found(key)),
        }
    }
}

/// A live, signature-indexed resolver.
///
/// ```rust
/// use slotproxy_core::{sig, Address, Error};
/// use slotproxy_registry::{RegisterMode, Resolver, ReturnSize};
///
/// let admin = Address::from_low_u64(1);
/// let (m1, m2) = (Address::from_low_u64(0x11), Address::from_low_u64(0x22));
/// let resolver = Resolver::new(admin);
///
/// resolver
///     .register(&admin, sig!("balanceOf(address)"), m1, ReturnSize::Fixed(32), RegisterMode::Strict)
///     .unwrap();
///
/// let err = resolver
///     .register(&admin, sig!("balanceOf(address)"), m2, ReturnSize::Fixed(32), RegisterMode::Strict)
///     .unwrap_err();
/// assert!(matches!(err, Error::SignatureConflict { .. }));
/// assert_eq!(resolver.lookup(&sig!("balanceOf(address)")).unwrap().address, m1);
/// ```
pub struct Resolver {
    auth: Auth,
    snap: ArcSwap<ResolverSnapshot>,
    write: Mutex<()>,
}

impl Resolver {
    /// An empty resolver controlled by `owner`.
    pub fn new(owner: Address) -> Self {
        Self::with_auth(Auth::new(owner))
    }

    pub fn with_auth(auth: Auth) -> Self {
        Self {
            auth,
            snap: ArcSwap::from_pointee(ResolverSnapshot::default()),
            write: Mutex::new(()),
        }
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    /// Bind `signature` to `target`.
    ///
    /// Fails with `SignatureConflict` if the selector is bound to a different
    /// target or signature and `mode` is `Strict`; the existing binding is
    /// left unchanged. A fixed return size above
    /// [`MAX_FIXED_RETURN_SIZE`](crate::MAX_FIXED_RETURN_SIZE) is a `Config`
    /// error.
    pub fn register(
        &self,
        caller: &Address,
        signature: Signature,
        target: Address,
        return_size: ReturnSize,
        mode: RegisterMode,
    ) -> Result<()> {
        self.register_batch(
            caller,
            vec![ResolverEntry::new(signature, target, return_size)],
            mode,
        )
    }

    /// Apply every entry or none of them.
    ///
    /// Entries are applied in order, so with `Overwrite` a later entry in the
    /// batch replaces an earlier one for the same selector.
    pub fn register_batch(
        &self,
        caller: &Address,
        entries: Vec<ResolverEntry>,
        mode: RegisterMode,
    ) -> Result<()> {
        self.auth.check(caller, Action::RegisterSignature)?;
        for entry in &entries {
            entry.return_size.validate()?;
        }
        let _guard = self.write.lock();

        let mut next = ResolverSnapshot::clone(&self.snap.load());
        let mut changed = 0usize;
        for entry in entries {
            let signature = entry.signature.to_string();
            let target = entry.target;
            if next.apply(entry, mode)? {
                tracing::debug!(%signature, %target, "signature registered");
                changed += 1;
            }
        }

        if changed > 0 {
            self.snap.store(Arc::new(next));
        }
        Ok(())
    }

    /// The target and return size bound to `signature`.
    pub fn lookup(&self, signature: &Signature) -> Result<Target> {
        self.snap.load().lookup(signature)
    }

    pub fn lookup_selector(&self, selector: &Selector) -> Result<ResolverEntry> {
        self.snap.load().lookup_selector(selector).cloned()
    }

    /// Freeze the current configuration.
    pub fn snapshot(&self) -> Arc<ResolverSnapshot> {
        self.snap.load_full()
    }

    pub fn entries(&self) -> Vec<ResolverEntry> {
        self.snap.load().entries().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.snap.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check that no two modules share a signature or selector.
    ///
    /// This is the registrant's deployment-time check; the resolver itself
    /// only rejects collisions it is asked to register.
    pub fn check_disjoint(interfaces: &[ModuleInterface]) -> Result<()> {
        let mut seen: BTreeMap<Selector, (&Signature, Address)> = BTreeMap::new();
        for interface in interfaces {
            for signature in &interface.signatures {
                match seen.get(&signature.selector()) {
                    Some((existing, owner))
                        if *owner != interface.target || *existing != signature =>
                    {
                        return Err(Error::SignatureConflict {
                            signature: signature.to_string(),
                            existing_signature: existing.to_string(),
                            existing: *owner,
                            requested: interface.target,
                        });
                    }
                    Some(_) => {}
                    None => {
                        seen.insert(signature.selector(), (signature, interface.target));
                    }
                }
            }
        }
        Ok(())
    }
}

impl Lookup for Resolver {
    fn resolve(&self, key: &CallKey) -> Result<Target> {
        self.snap.load().resolve(key)
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("owner", &self.auth.owner())
            .field("entries", &self.len())
            .finish()
    }
}
