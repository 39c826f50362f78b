use std::fmt;
use std::sync::Arc;

use slotproxy_core::{CallKey, Result};
use slotproxy_registry::{Lookup, Registry, Resolver, ResolverSnapshot, Target};

/// What a proxy routes through.
#[derive(Clone)]
pub enum Binding {
    /// Coarse routing by name.
    Registry(Arc<Registry>),
    /// Live routing by signature; follows every later resolver edit.
    Resolver(Arc<Resolver>),
    /// Frozen routing by signature, as published by a version.
    Snapshot(Arc<ResolverSnapshot>),
}

impl Binding {
    pub fn kind(&self) -> &'static str {
        match self {
            Binding::Registry(_) => "registry",
            Binding::Resolver(_) => "resolver",
            Binding::Snapshot(_) => "snapshot",
        }
    }

    /// Whether two bindings route through the same table.
    pub fn same_as(&self, other: &Binding) -> bool {
        match (self, other) {
            (Binding::Registry(a), Binding::Registry(b)) => Arc::ptr_eq(a, b),
            (Binding::Resolver(a), Binding::Resolver(b)) => Arc::ptr_eq(a, b),
            (Binding::Snapshot(a), Binding::Snapshot(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Lookup for Binding {
    fn resolve(&self, key: &CallKey) -> Result<Target> {
        match self {
            Binding::Registry(registry) => registry.resolve(key),
            Binding::Resolver(resolver) => resolver.resolve(key),
            Binding::Snapshot(snapshot) => snapshot.resolve(key),
        }
    }
}

impl From<Arc<Registry>> for Binding {
    fn from(registry: Arc<Registry>) -> Self {
        Binding::Registry(registry)
    }
}

impl From<Arc<Resolver>> for Binding {
    fn from(resolver: Arc<Resolver>) -> Self {
        Binding::Resolver(resolver)
    }
}

impl From<Arc<ResolverSnapshot>> for Binding {
    fn from(snapshot: Arc<ResolverSnapshot>) -> Self {
        Binding::Snapshot(snapshot)
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Registry(registry) => f.debug_tuple("Registry").field(registry).finish(),
            Binding::Resolver(resolver) => f.debug_tuple("Resolver").field(resolver).finish(),
            Binding::Snapshot(snapshot) => f
                .debug_tuple("Snapshot")
                .field(&snapshot.len())
                .finish(),
        }
    }
}
