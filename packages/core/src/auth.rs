//! Authorization for mutating operations.
//!
//! Every registry, resolver, proxy, and version manager carries one [`Auth`]
//! guard. A caller is authorized when it is the owner, or when the attached
//! [`Authority`] permits the action.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{Address, Error, Result};

/// A mutating operation subject to authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    RegisterName,
    RegisterSignature,
    Rebind,
    AddVersion,
    Attach,
    Upgrade,
    Rollback,
    SetOwner,
    SetAuthority,
    ManageRoles,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::RegisterName => "register a name",
            Action::RegisterSignature => "register a signature",
            Action::Rebind => "rebind a proxy",
            Action::AddVersion => "add a version",
            Action::Attach => "attach a proxy",
            Action::Upgrade => "upgrade a proxy",
            Action::Rollback => "roll back a proxy",
            Action::SetOwner => "set the owner",
            Action::SetAuthority => "set the authority",
            Action::ManageRoles => "manage roles",
        };
        f.write_str(name)
    }
}

/// A policy deciding whether a non-owner may perform an action.
pub trait Authority: Send + Sync {
    fn can_call(&self, caller: &Address, action: Action) -> bool;
}

struct AuthState {
    owner: Address,
    authority: Option<Arc<dyn Authority>>,
}

/// Owner plus optional authority guard.
pub struct Auth {
    state: RwLock<AuthState>,
}

impl Auth {
    /// A guard where only `owner` is authorized.
    pub fn new(owner: Address) -> Self {
        Self {
            state: RwLock::new(AuthState {
                owner,
                authority: None,
            }),
        }
    }

    /// A guard that also consults `authority` for non-owners.
    pub fn with_authority(owner: Address, authority: Arc<dyn Authority>) -> Self {
        Self {
            state: RwLock::new(AuthState {
                owner,
                authority: Some(authority),
            }),
        }
    }

    pub fn owner(&self) -> Address {
        self.state.read().owner
    }

    pub fn is_authorized(&self, caller: &Address, action: Action) -> bool {
        let state = self.state.read();
        if *caller == state.owner {
            return true;
        }
        match &state.authority {
            Some(authority) => authority.can_call(caller, action),
            None => false,
        }
    }

    /// Reject `caller` unless it may perform `action`.
    pub fn check(&self, caller: &Address, action: Action) -> Result<()> {
        if self.is_authorized(caller, action) {
            Ok(())
        } else {
            tracing::warn!(%caller, %action, "rejected unauthorized call");
            Err(Error::Unauthorized {
                caller: *caller,
                action,
            })
        }
    }

    pub fn set_owner(&self, caller: &Address, owner: Address) -> Result<()> {
        self.check(caller, Action::SetOwner)?;
        self.state.write().owner = owner;
        tracing::debug!(%owner, "owner changed");
        Ok(())
    }

    pub fn set_authority(
        &self,
        caller: &Address,
        authority: Option<Arc<dyn Authority>>,
    ) -> Result<()> {
        self.check(caller, Action::SetAuthority)?;
        self.state.write().authority = authority;
        Ok(())
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Auth")
            .field("owner", &state.owner)
            .field("has_authority", &state.authority.is_some())
            .finish()
    }
}

/// Role-based authority.
///
/// Actions are mapped to role names; identities are granted roles. Only the
/// admin may change grants.
///
/// ```rust
/// use std::sync::Arc;
/// use slotproxy_core::{Action, Address, Auth, RoleAuthority};
///
/// let admin = Address::from_low_u64(1);
/// let deployer = Address::from_low_u64(2);
///
/// let roles = Arc::new(RoleAuthority::new(admin).require(Action::Upgrade, "upgrader"));
/// roles.grant(&admin, "upgrader", deployer).unwrap();
///
/// let auth = Auth::with_authority(admin, roles);
/// assert!(auth.is_authorized(&deployer, Action::Upgrade));
/// assert!(!auth.is_authorized(&deployer, Action::Rebind));
/// ```
pub struct RoleAuthority {
    admin: Address,
    required: BTreeMap<Action, String>,
    grants: RwLock<BTreeMap<String, BTreeSet<Address>>>,
}

impl RoleAuthority {
    pub fn new(admin: Address) -> Self {
        Self {
            admin,
            required: BTreeMap::new(),
            grants: RwLock::new(BTreeMap::new()),
        }
    }

    /// Require `role` for `action`. Actions without a role are denied.
    #[must_use]
    pub fn require(mut self, action: Action, role: impl Into<String>) -> Self {
        self.required.insert(action, role.into());
        self
    }

    pub fn grant(&self, caller: &Address, role: &str, who: Address) -> Result<()> {
        self.check_admin(caller)?;
        self.grants
            .write()
            .entry(role.to_string())
            .or_default()
            .insert(who);
        tracing::debug!(role, %who, "role granted");
        Ok(())
    }

    pub fn revoke(&self, caller: &Address, role: &str, who: &Address) -> Result<()> {
        self.check_admin(caller)?;
        if let Some(members) = self.grants.write().get_mut(role) {
            members.remove(who);
        }
        tracing::debug!(role, %who, "role revoked");
        Ok(())
    }

    pub fn has_role(&self, who: &Address, role: &str) -> bool {
        self.grants
            .read()
            .get(role)
            .is_some_and(|members| members.contains(who))
    }

    fn check_admin(&self, caller: &Address) -> Result<()> {
        if *caller == self.admin {
            Ok(())
        } else {
            Err(Error::Unauthorized {
                caller: *caller,
                action: Action::ManageRoles,
            })
        }
    }
}

impl Authority for RoleAuthority {
    fn can_call(&self, caller: &Address, action: Action) -> bool {
        match self.required.get(&action) {
            Some(role) => self.has_role(caller, role),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    #[test]
    fn owner_is_always_authorized() {
        let auth = Auth::new(addr(1));
        assert!(auth.check(&addr(1), Action::Rebind).is_ok());
        assert!(matches!(
            auth.check(&addr(2), Action::Rebind),
            Err(Error::Unauthorized { caller, action: Action::Rebind }) if caller == addr(2)
        ));
    }

    #[test]
    fn set_owner_requires_authorization() {
        let auth = Auth::new(addr(1));
        assert!(auth.set_owner(&addr(2), addr(2)).is_err());
        assert_eq!(auth.owner(), addr(1));

        auth.set_owner(&addr(1), addr(3)).unwrap();
        assert_eq!(auth.owner(), addr(3));
        assert!(!auth.is_authorized(&addr(1), Action::Rebind));
    }

    #[test]
    fn roles_gate_non_owners() {
        let roles = Arc::new(
            RoleAuthority::new(addr(1))
                .require(Action::RegisterSignature, "registrar")
                .require(Action::Upgrade, "upgrader"),
        );
        let auth = Auth::with_authority(addr(1), roles.clone());

        assert!(!auth.is_authorized(&addr(5), Action::RegisterSignature));
        roles.grant(&addr(1), "registrar", addr(5)).unwrap();
        assert!(auth.is_authorized(&addr(5), Action::RegisterSignature));
        assert!(!auth.is_authorized(&addr(5), Action::Upgrade));

        roles.revoke(&addr(1), "registrar", &addr(5)).unwrap();
        assert!(!auth.is_authorized(&addr(5), Action::RegisterSignature));
    }

    #[test]
    fn only_admin_manages_roles() {
        let roles = RoleAuthority::new(addr(1)).require(Action::Rebind, "ops");
        assert!(matches!(
            roles.grant(&addr(2), "ops", addr(2)),
            Err(Error::Unauthorized {
                action: Action::ManageRoles,
                ..
            })
        ));
        assert!(!roles.has_role(&addr(2), "ops"));
    }

    #[test]
    fn authority_can_be_detached() {
        let roles = Arc::new(RoleAuthority::new(addr(1)).require(Action::Rebind, "ops"));
        roles.grant(&addr(1), "ops", addr(4)).unwrap();
        let auth = Auth::with_authority(addr(1), roles);
        assert!(auth.is_authorized(&addr(4), Action::Rebind));

        auth.set_authority(&addr(1), None).unwrap();
        assert!(!auth.is_authorized(&addr(4), Action::Rebind));
    }
}
