//! Versioned resolver snapshots and per-proxy upgrades.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use slotproxy_core::{Action, Address, Auth, Error, Result};
use slotproxy_registry::ResolverSnapshot;

use crate::{Binding, Proxy};

/// A published version. Ids start at 1 and only grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(pub u64);

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// How upgrades spread across attached proxies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    /// Each proxy moves on its own.
    #[default]
    PerInstance,
    /// Every attached proxy moves together and always shares one version.
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeKind {
    Attach,
    Upgrade,
    Rollback,
}

/// One entry in the upgrade audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeRecord {
    pub proxy: Address,
    pub from: Option<VersionId>,
    pub to: VersionId,
    pub kind: UpgradeKind,
    pub by: Address,
}

struct Instance {
    proxy: Arc<Proxy>,
    version: VersionId,
}

#[derive(Default)]
struct VersionState {
    versions: Vec<Arc<ResolverSnapshot>>,
    instances: BTreeMap<Address, Instance>,
    global: Option<VersionId>,
    history: Vec<UpgradeRecord>,
}

impl VersionState {
    fn snapshot(&self, id: VersionId) -> Result<Arc<ResolverSnapshot>> {
        id.0.checked_sub(1)
            .and_then(|index| self.versions.get(index as usize))
            .cloned()
            .ok_or_else(|| Error::not_found(format!("version {}", id)))
    }

    fn current(&self, proxy: &Address, cadence: Cadence) -> Result<VersionId> {
        let instance = self
            .instances
            .get(proxy)
            .ok_or_else(|| Error::not_found(format!("attached proxy {}", proxy)))?;
        Ok(match (cadence, self.global) {
            (Cadence::Global, Some(global)) => global,
            _ => instance.version,
        })
    }

    fn affected(&self, proxy: &Address, cadence: Cadence) -> Vec<Address> {
        match cadence {
            Cadence::PerInstance => vec![*proxy],
            Cadence::Global => self.instances.keys().copied().collect(),
        }
    }

    /// Whether every affected instance is on `id` and still bound to its
    /// snapshot.
    fn in_sync(&self, proxy: &Address, cadence: Cadence, id: VersionId) -> Result<bool> {
        let expected = Binding::Snapshot(self.snapshot(id)?);
        Ok(self.affected(proxy, cadence).iter().all(|address| {
            self.instances.get(address).map_or(true, |instance| {
                instance.version == id && instance.proxy.binding().same_as(&expected)
            })
        }))
    }

    /// Move the affected instances to `to`, logging one record each.
    fn apply(
        &mut self,
        proxy: &Address,
        cadence: Cadence,
        to: VersionId,
        kind: UpgradeKind,
        by: Address,
    ) -> Result<()> {
        let snapshot = self.snapshot(to)?;
        for address in self.affected(proxy, cadence) {
            if let Some(instance) = self.instances.get_mut(&address) {
                let from = instance.version;
                instance.proxy.install(Binding::Snapshot(snapshot.clone()));
                instance.version = to;
                self.history.push(UpgradeRecord {
                    proxy: address,
                    from: Some(from),
                    to,
                    kind,
                    by,
                });
                tracing::debug!(proxy = %address, %from, %to, ?kind, "proxy version changed");
            }
        }

        if cadence == Cadence::Global {
            self.global = Some(to);
        }
        Ok(())
    }
}

/// Publishes frozen resolver snapshots as numbered versions and moves
/// attached proxies between them.
///
/// Attaching a proxy hands its rebinding over to the manager: from then on
/// upgrades and rollbacks are authorized against the manager's guard, and
/// the proxy refuses direct `set_binding` calls. A proxy belongs to at most
/// one manager.
///
/// ```rust
/// use std::sync::Arc;
/// use slotproxy_core::{Address, Deployments};
/// use slotproxy_registry::Resolver;
/// use slotproxy_router::{Binding, Cadence, Proxy, VersionId, VersionManager};
///
/// let admin = Address::from_low_u64(1);
/// let resolver = Resolver::new(admin);
/// let manager = VersionManager::new(admin, Cadence::PerInstance);
/// let v1 = manager.add_version(&admin, resolver.snapshot()).unwrap();
/// assert_eq!(v1, VersionId(1));
///
/// let proxy = Arc::new(
///     Proxy::builder(Address::from_low_u64(0x100), Arc::new(Deployments::new()))
///         .owner(admin)
///         .bind(Binding::Snapshot(manager.version(v1).unwrap()))
///         .build(),
/// );
/// manager.attach(&admin, proxy.clone(), v1).unwrap();
/// assert_eq!(manager.instance_version(&proxy.address()), Some(v1));
/// ```
pub struct VersionManager {
    auth: Auth,
    cadence: Cadence,
    state: Mutex<VersionState>,
}

impl VersionManager {
    pub fn new(owner: Address, cadence: Cadence) -> Self {
        Self::with_auth(Auth::new(owner), cadence)
    }

    pub fn with_auth(auth: Auth, cadence: Cadence) -> Self {
        Self {
            auth,
            cadence,
            state: Mutex::new(VersionState::default()),
        }
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    /// Publish `snapshot` as the next version.
    pub fn add_version(
        &self,
        caller: &Address,
        snapshot: Arc<ResolverSnapshot>,
    ) -> Result<VersionId> {
        self.auth.check(caller, Action::AddVersion)?;
        let mut state = self.state.lock();
        state.versions.push(snapshot);
        let id = VersionId(state.versions.len() as u64);
        tracing::debug!(version = %id, "version added");
        Ok(id)
    }

    /// The highest published version.
    pub fn current_latest(&self) -> Option<VersionId> {
        match self.state.lock().versions.len() {
            0 => None,
            n => Some(VersionId(n as u64)),
        }
    }

    /// The frozen snapshot of a version.
    pub fn version(&self, id: VersionId) -> Result<Arc<ResolverSnapshot>> {
        self.state.lock().snapshot(id)
    }

    /// Put `proxy` under this manager and bind it to `version`.
    ///
    /// The caller must be allowed both to attach here and to rebind the
    /// proxy. Under the global cadence every proxy joins at the shared
    /// version once one is set.
    pub fn attach(&self, caller: &Address, proxy: Arc<Proxy>, version: VersionId) -> Result<()> {
        self.auth.check(caller, Action::Attach)?;
        proxy.auth().check(caller, Action::Rebind)?;

        let mut state = self.state.lock();
        if let (Cadence::Global, Some(global)) = (self.cadence, state.global) {
            if version != global {
                return Err(Error::config(format!(
                    "global cadence: proxies attach at {}, not {}",
                    global, version
                )));
            }
        }
        let snapshot = state.snapshot(version)?;

        let address = proxy.address();
        if !proxy.mark_managed() && !state.instances.contains_key(&address) {
            return Err(Error::config(format!(
                "proxy {} is already attached to another version manager",
                address
            )));
        }
        proxy.install(Binding::Snapshot(snapshot));
        let from = state
            .instances
            .insert(address, Instance { proxy, version })
            .map(|previous| previous.version);
        if self.cadence == Cadence::Global {
            state.global = Some(version);
        }
        state.history.push(UpgradeRecord {
            proxy: address,
            from,
            to: version,
            kind: UpgradeKind::Attach,
            by: *caller,
        });
        tracing::debug!(proxy = %address, %version, "proxy attached");
        Ok(())
    }

    /// Move `proxy` forward to `target`.
    ///
    /// Under the global cadence every attached proxy moves. Moving to the
    /// current version is a no-op when the proxy is still bound to that
    /// version's snapshot, and re-installs it otherwise; moving backwards
    /// fails with `Downgrade`.
    pub fn upgrade(&self, caller: &Address, proxy: &Address, target: VersionId) -> Result<()> {
        self.auth.check(caller, Action::Upgrade)?;
        let mut state = self.state.lock();
        let current = state.current(proxy, self.cadence)?;
        state.snapshot(target)?;

        if target < current {
            return Err(Error::Downgrade {
                proxy: *proxy,
                current: current.0,
                requested: target.0,
            });
        }
        if target == current {
            if state.in_sync(proxy, self.cadence, target)? {
                return Ok(());
            }
            tracing::warn!(
                %proxy,
                version = %target,
                "binding drifted from its version, re-installing"
            );
        }
        state.apply(proxy, self.cadence, target, UpgradeKind::Upgrade, *caller)
    }

    /// Move `proxy` back to an older `target`.
    pub fn rollback(&self, caller: &Address, proxy: &Address, target: VersionId) -> Result<()> {
        self.auth.check(caller, Action::Rollback)?;
        let mut state = self.state.lock();
        let current = state.current(proxy, self.cadence)?;
        state.snapshot(target)?;

        if target >= current {
            return Err(Error::InvalidRollback {
                proxy: *proxy,
                current: current.0,
                requested: target.0,
            });
        }
        tracing::warn!(%proxy, %current, %target, "rolling back");
        state.apply(proxy, self.cadence, target, UpgradeKind::Rollback, *caller)
    }

    /// The version an attached proxy is on.
    pub fn instance_version(&self, proxy: &Address) -> Option<VersionId> {
        self.state.lock().instances.get(proxy).map(|i| i.version)
    }

    /// Every attached proxy, in address order.
    pub fn instances(&self) -> Vec<(Address, VersionId)> {
        self.state
            .lock()
            .instances
            .iter()
            .map(|(address, instance)| (*address, instance.version))
            .collect()
    }

    /// The audit log, oldest first.
    pub fn history(&self) -> Vec<UpgradeRecord> {
        self.state.lock().history.clone()
    }
}

impl fmt::Debug for VersionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("VersionManager")
            .field("cadence", &self.cadence)
            .field("versions", &state.versions.len())
            .field("instances", &state.instances.len())
            .finish()
    }
}
