//! Registry: route by name.
//!
//! One name maps to one module address. Re-registering a name replaces its
//! target; names are never removed, only pointed at `Address::ZERO`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use slotproxy_core::{Action, Address, Auth, CallKey, Error, Result};

use crate::{Lookup, ReturnSize, Target};

/// One registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub name: String,
    pub target: Address,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

type Entries = BTreeMap<String, RegistryEntry>;

/// A name-indexed module registry.
///
/// Readers work on an immutable snapshot, so a lookup sees either all of a
/// mutation or none of it. Writers are serialized and guarded by [`Auth`].
///
/// ```rust
/// use slotproxy_core::Address;
/// use slotproxy_registry::Registry;
///
/// let admin = Address::from_low_u64(1);
/// let registry = Registry::new(admin);
///
/// registry.register(&admin, "Controller", Address::from_low_u64(0xa)).unwrap();
/// assert_eq!(registry.lookup("Controller").unwrap(), Address::from_low_u64(0xa));
///
/// registry.register(&admin, "Controller", Address::from_low_u64(0xb)).unwrap();
/// assert_eq!(registry.lookup("Controller").unwrap(), Address::from_low_u64(0xb));
/// ```
pub struct Registry {
    auth: Auth,
    snap: ArcSwap<Entries>,
    write: Mutex<()>,
}

impl Registry {
    /// An empty registry controlled by `owner`.
    pub fn new(owner: Address) -> Self {
        Self::with_auth(Auth::new(owner))
    }

    pub fn with_auth(auth: Auth) -> Self {
        Self {
            auth,
            snap: ArcSwap::from_pointee(Entries::new()),
            write: Mutex::new(()),
        }
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    /// Insert or replace the target for `name`, keeping existing metadata.
    pub fn register(&self, caller: &Address, name: &str, target: Address) -> Result<()> {
        self.update(caller, |entries| {
            let entry = entries
                .entry(name.to_string())
                .or_insert_with(|| RegistryEntry {
                    name: name.to_string(),
                    target,
                    metadata: BTreeMap::new(),
                });
            entry.target = target;
            Ok(())
        })?;
        tracing::debug!(name, %target, "name registered");
        Ok(())
    }

    /// Insert or replace the target and metadata for `name`.
    pub fn register_with(
        &self,
        caller: &Address,
        name: &str,
        target: Address,
        metadata: BTreeMap<String, String>,
    ) -> Result<()> {
        self.update(caller, |entries| {
            entries.insert(
                name.to_string(),
                RegistryEntry {
                    name: name.to_string(),
                    target,
                    metadata,
                },
            );
            Ok(())
        })?;
        tracing::debug!(name, %target, "name registered with metadata");
        Ok(())
    }

    /// Point `name` at the null target. The key stays in the registry.
    pub fn clear(&self, caller: &Address, name: &str) -> Result<()> {
        self.update(caller, |entries| match entries.get_mut(name) {
            Some(entry) => {
                entry.target = Address::ZERO;
                Ok(())
            }
            None => Err(Error::not_found(format!("name '{}'", name))),
        })?;
        tracing::debug!(name, "name cleared");
        Ok(())
    }

    /// The live target for `name`.
    ///
    /// A name pointing at the null target is reported as not found.
    pub fn lookup(&self, name: &str) -> Result<Address> {
        match self.snap.load().get(name) {
            Some(entry) if !entry.target.is_zero() => Ok(entry.target),
            _ => Err(Error::not_found(format!("name '{}'", name))),
        }
    }

    /// The full entry for `name`, including a cleared one.
    pub fn get(&self, name: &str) -> Option<RegistryEntry> {
        self.snap.load().get(name).cloned()
    }

    /// All entries in name order.
    pub fn entries(&self) -> Vec<RegistryEntry> {
        self.snap.load().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.snap.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn update<F>(&self, caller: &Address, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Entries) -> Result<()>,
    {
        self.auth.check(caller, Action::RegisterName)?;
        let _guard = self.write.lock();
        let mut next = Entries::clone(&self.snap.load());
        mutate(&mut next)?;
        self.snap.store(Arc::new(next));
        Ok(())
    }
}

impl Lookup for Registry {
    fn resolve(&self, key: &CallKey) -> Result<Target> {
        match key {
            CallKey::Name(name) => Ok(Target {
                address: self.lookup(name)?,
                return_size: ReturnSize::Dynamic,
            }),
            CallKey::Signature(_) => Err(Error::not_found(key)),
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("owner", &self.auth.owner())
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotproxy_core::sig;

    fn addr(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    #[test]
    fn last_write_wins() {
        let admin = addr(1);
        let registry = Registry::new(admin);
        assert!(matches!(registry.lookup("Controller"), Err(Error::NotFound { .. })));

        registry.register(&admin, "Controller", addr(0xa)).unwrap();
        assert_eq!(registry.lookup("Controller").unwrap(), addr(0xa));

        registry.register(&admin, "Controller", addr(0xb)).unwrap();
        assert_eq!(registry.lookup("Controller").unwrap(), addr(0xb));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn clear_keeps_the_key() {
        let admin = addr(1);
        let registry = Registry::new(admin);
        registry.register(&admin, "Cash", addr(0xc)).unwrap();

        registry.clear(&admin, "Cash").unwrap();
        assert!(matches!(registry.lookup("Cash"), Err(Error::NotFound { .. })));
        assert_eq!(registry.get("Cash").unwrap().target, Address::ZERO);
        assert_eq!(registry.len(), 1);

        assert!(matches!(
            registry.clear(&admin, "Missing"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn unauthorized_register_changes_nothing() {
        let admin = addr(1);
        let registry = Registry::new(admin);
        registry.register(&admin, "Controller", addr(0xa)).unwrap();

        let err = registry
            .register(&addr(2), "Controller", addr(0xbad))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Unauthorized {
                action: Action::RegisterName,
                ..
            }
        ));
        assert_eq!(registry.lookup("Controller").unwrap(), addr(0xa));
        assert!(registry.clear(&addr(2), "Controller").is_err());
        assert_eq!(registry.lookup("Controller").unwrap(), addr(0xa));
    }

    #[test]
    fn metadata_is_kept_on_plain_register() {
        let admin = addr(1);
        let registry = Registry::new(admin);
        let metadata = BTreeMap::from([("version".to_string(), "1".to_string())]);
        registry
            .register_with(&admin, "Orders", addr(3), metadata.clone())
            .unwrap();
        registry.register(&admin, "Orders", addr(4)).unwrap();

        let entry = registry.get("Orders").unwrap();
        assert_eq!(entry.target, addr(4));
        assert_eq!(entry.metadata, metadata);
    }

    #[test]
    fn entries_are_name_ordered() {
        let admin = addr(1);
        let registry = Registry::new(admin);
        registry.register(&admin, "b", addr(2)).unwrap();
        registry.register(&admin, "a", addr(1)).unwrap();
        registry.register(&admin, "c", addr(3)).unwrap();
        let names: Vec<_> = registry.entries().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn resolves_names_only() {
        let admin = addr(1);
        let registry = Registry::new(admin);
        registry.register(&admin, "Controller", addr(0xa)).unwrap();

        let target = registry.resolve(&CallKey::name("Controller")).unwrap();
        assert_eq!(target.address, addr(0xa));
        assert_eq!(target.return_size, ReturnSize::Dynamic);
        assert!(registry
            .resolve(&CallKey::from(sig!("Controller()")))
            .is_err());
    }

    #[test]
    fn entry_serde_skips_empty_metadata() {
        let entry = RegistryEntry {
            name: "Controller".to_string(),
            target: addr(0xa),
            metadata: BTreeMap::new(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("metadata"));
        let back: RegistryEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
