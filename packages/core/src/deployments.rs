//! Immutable module code, addressed by deployment.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{Address, Forwardable};

const DEPLOY_DOMAIN: &[u8] = b"slotproxy/deploy";

struct DeploymentsInner {
    code: BTreeMap<Address, Arc<dyn Forwardable>>,
    nonce: u64,
}

/// The host's code store.
///
/// Deploying a module assigns it a fresh address. Code at an address never
/// changes: an upgrade deploys new code at a new address and rebinds a
/// registry entry to it.
pub struct Deployments {
    inner: RwLock<DeploymentsInner>,
}

impl Default for Deployments {
    fn default() -> Self {
        Self::new()
    }
}

impl Deployments {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(DeploymentsInner {
                code: BTreeMap::new(),
                nonce: 0,
            }),
        }
    }

    /// Deploy a module and return its address.
    pub fn deploy<M: Forwardable + 'static>(&self, module: M) -> Address {
        self.deploy_arc(Arc::new(module))
    }

    /// Deploy an already shared module.
    pub fn deploy_arc(&self, module: Arc<dyn Forwardable>) -> Address {
        let mut inner = self.inner.write();
        let address = loop {
            inner.nonce += 1;
            let candidate = Address::derive(DEPLOY_DOMAIN, inner.nonce);
            if !candidate.is_zero() && !inner.code.contains_key(&candidate) {
                break candidate;
            }
        };
        inner.code.insert(address, module);
        tracing::debug!(%address, "module deployed");
        address
    }

    /// The code at `address`, if any.
    pub fn code(&self, address: &Address) -> Option<Arc<dyn Forwardable>> {
        self.inner.read().code.get(address).cloned()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.inner.read().code.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.inner.read().code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Deployments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deployments")
            .field("modules", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FnModule;

    fn echo() -> impl Forwardable {
        FnModule::new(|_ctx, _key, args| Ok(args.clone()))
    }

    #[test]
    fn each_deploy_gets_a_new_address() {
        let deployments = Deployments::new();
        let a = deployments.deploy(echo());
        let b = deployments.deploy(echo());
        assert_ne!(a, b);
        assert!(!a.is_zero());
        assert_eq!(deployments.len(), 2);
        assert!(deployments.contains(&a));
    }

    #[test]
    fn code_lookup() {
        let deployments = Deployments::new();
        let a = deployments.deploy(echo());
        assert!(deployments.code(&a).is_some());
        assert!(deployments.code(&Address::ZERO).is_none());
        assert!(deployments.code(&Address::from_low_u64(1)).is_none());
    }
}
