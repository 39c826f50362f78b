//! Bring a manifest to life against an existing registry and resolver.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use slotproxy_core::{Action, Address, Deployments, Error, Result};
use slotproxy_layout::{Allocation, LayoutChecker};
use slotproxy_registry::{
    ModuleInterface, RegisterMode, Registry, Resolver, ResolverEntry, ResolverSnapshot,
};

use crate::DeploymentManifest;

/// The outcome of a successful [`bootstrap`].
#[derive(Debug, Clone)]
pub struct Bootstrapped {
    /// The proxy reservation, for `ProxyBuilder::reserved`.
    pub proxy: Option<Allocation>,
    /// The resolver as it stood right after registration.
    pub snapshot: Arc<ResolverSnapshot>,
}

impl Bootstrapped {
    pub fn proxy_allocation(&self) -> Option<Allocation> {
        self.proxy.clone()
    }
}

/// Validate `manifest` and register its modules.
///
/// `layout` holds the layouts shipped so far: empty for a first deployment,
/// the checker from the previous bootstrap for the next version. The
/// manifest's layouts are checked against it, so shipped fields can only be
/// appended to. `addresses` maps each manifest module name to where its code
/// was deployed.
///
/// Nothing is registered, and `layout` is left untouched, unless every check
/// passes:
/// - module names are unique;
/// - the proxy reservation and all module layouts are conflict-free;
/// - every module has code in `deployments`, and that code serves every
///   function the manifest routes to it when it declares its signatures;
/// - no two modules serve the same signature or selector;
/// - the caller may register on both `registry` and `resolver`.
///
/// Names go to `registry`, functions to `resolver` in manifest order.
/// Registration is strict, so a new version is bootstrapped into a fresh
/// resolver and published from its snapshot.
pub fn bootstrap(
    caller: &Address,
    manifest: &DeploymentManifest,
    layout: &mut LayoutChecker,
    addresses: &BTreeMap<String, Address>,
    deployments: &Deployments,
    registry: &Registry,
    resolver: &Resolver,
) -> Result<Bootstrapped> {
    let mut seen = BTreeSet::new();
    for module in &manifest.modules {
        if !seen.insert(module.name.as_str()) {
            return Err(Error::config(format!(
                "module '{}' is declared more than once",
                module.name
            )));
        }
    }

    let mut next = layout.clone();
    next.reserve_proxy(manifest.router.proxy_reserved.clone())?;
    for module in &manifest.modules {
        next.declare_module(&module.name, module.base, module.layout.clone())?;
    }

    let mut interfaces = Vec::with_capacity(manifest.modules.len());
    let mut entries = Vec::new();
    for module in &manifest.modules {
        let target = *addresses.get(&module.name).ok_or_else(|| {
            Error::config(format!("no deployment address for module '{}'", module.name))
        })?;
        let code = deployments.code(&target).ok_or_else(|| {
            Error::config(format!("module '{}' has no code at {}", module.name, target))
        })?;

        let served = code.signatures();
        for function in &module.functions {
            if !served.is_empty() && !served.contains(&function.signature) {
                return Err(Error::config(format!(
                    "module '{}' does not serve {}",
                    module.name, function.signature
                )));
            }
            entries.push(ResolverEntry::new(
                function.signature.clone(),
                target,
                function
                    .return_size
                    .unwrap_or(manifest.router.default_return_size),
            ));
        }
        interfaces.push(ModuleInterface {
            target,
            signatures: module.functions.iter().map(|f| f.signature.clone()).collect(),
        });
    }
    Resolver::check_disjoint(&interfaces)?;

    // Registry writes cannot fail once authorized, so the resolver batch is
    // the last point where bootstrap can be rejected.
    registry.auth().check(caller, Action::RegisterName)?;
    resolver.register_batch(caller, entries, RegisterMode::Strict)?;
    for (module, interface) in manifest.modules.iter().zip(&interfaces) {
        registry.register(caller, &module.name, interface.target)?;
    }

    *layout = next;
    tracing::info!(
        modules = manifest.modules.len(),
        signatures = resolver.len(),
        "manifest bootstrapped"
    );
    Ok(Bootstrapped {
        proxy: layout.proxy_allocation().cloned(),
        snapshot: resolver.snapshot(),
    })
}
