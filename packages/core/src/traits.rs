//! The forwardable module capability.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{Address, Signature, Storage};

/// How a call names the code it wants to reach.
///
/// `Name` is coarse routing through a registry (one module per name);
/// `Signature` is fine-grained routing through a resolver (one module per
/// function).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "lowercase")]
pub enum CallKey {
    Name(String),
    Signature(Signature),
}

impl CallKey {
    pub fn name(name: impl Into<String>) -> Self {
        CallKey::Name(name.into())
    }

    pub fn as_signature(&self) -> Option<&Signature> {
        match self {
            CallKey::Signature(sig) => Some(sig),
            CallKey::Name(_) => None,
        }
    }
}

impl From<Signature> for CallKey {
    fn from(sig: Signature) -> Self {
        CallKey::Signature(sig)
    }
}

impl fmt::Display for CallKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallKey::Name(name) => write!(f, "name '{}'", name),
            CallKey::Signature(sig) => write!(f, "signature '{}'", sig),
        }
    }
}

/// Failure data returned by a module.
///
/// A proxy hands this back to its caller byte-for-byte.
#[derive(Clone, PartialEq, Eq)]
pub struct Revert {
    pub data: Bytes,
}

impl Revert {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// A revert carrying a UTF-8 reason string.
    pub fn message(reason: &str) -> Self {
        Self::new(Bytes::copy_from_slice(reason.as_bytes()))
    }

    /// The revert data as a reason string, if it is valid UTF-8.
    pub fn reason(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }
}

impl fmt::Debug for Revert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "Revert({:?})", reason),
            None => write!(f, "Revert({:?})", self.data),
        }
    }
}

impl fmt::Display for Revert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason() {
            Some(reason) if !reason.is_empty() => write!(f, "call reverted: {}", reason),
            _ => write!(f, "call reverted ({} bytes)", self.data.len()),
        }
    }
}

impl std::error::Error for Revert {}

/// The execution context a module runs in.
///
/// `storage` belongs to the proxy that forwarded the call, and `this` is that
/// proxy's address: module code never sees its own deployment address.
pub struct CallContext<'a> {
    /// The forwarding proxy.
    pub this: Address,
    /// The original caller of the proxy.
    pub caller: Address,
    /// The proxy's storage for the duration of the call.
    pub storage: &'a mut dyn Storage,
}

impl<'a> CallContext<'a> {
    pub fn new(this: Address, caller: Address, storage: &'a mut dyn Storage) -> Self {
        Self {
            this,
            caller,
            storage,
        }
    }
}

/// A deployed unit of behavior that can run against a borrowed storage.
///
/// # Object Safety
///
/// This trait is object-safe: deployments hold `Arc<dyn Forwardable>`.
pub trait Forwardable: Send + Sync {
    /// Execute the call named by `key` with `args`.
    ///
    /// # Returns
    ///
    /// * `Ok(data)` - Return data for the caller.
    /// * `Err(revert)` - The call failed; every storage write it made is
    ///   discarded by the forwarding proxy.
    fn invoke(&self, ctx: &mut CallContext<'_>, key: &CallKey, args: &Bytes)
        -> Result<Bytes, Revert>;

    /// Signatures this module answers to. When non-empty, manifest
    /// bootstrapping refuses to route any other signature here. Modules
    /// routed only by name may leave this empty.
    fn signatures(&self) -> Vec<Signature> {
        Vec::new()
    }
}

impl<T: Forwardable + ?Sized> Forwardable for Arc<T> {
    fn invoke(
        &self,
        ctx: &mut CallContext<'_>,
        key: &CallKey,
        args: &Bytes,
    ) -> Result<Bytes, Revert> {
        self.as_ref().invoke(ctx, key, args)
    }

    fn signatures(&self) -> Vec<Signature> {
        self.as_ref().signatures()
    }
}

impl<T: Forwardable + ?Sized> Forwardable for Box<T> {
    fn invoke(
        &self,
        ctx: &mut CallContext<'_>,
        key: &CallKey,
        args: &Bytes,
    ) -> Result<Bytes, Revert> {
        self.as_ref().invoke(ctx, key, args)
    }

    fn signatures(&self) -> Vec<Signature> {
        self.as_ref().signatures()
    }
}

/// A module backed by a closure.
pub struct FnModule<F> {
    handler: F,
    signatures: Vec<Signature>,
}

impl<F> FnModule<F> {
    pub fn new(handler: F) -> Self
    where
        F: Fn(&mut CallContext<'_>, &CallKey, &Bytes) -> Result<Bytes, Revert> + Send + Sync,
    {
        Self {
            handler,
            signatures: Vec::new(),
        }
    }

    /// Declare the signatures this module serves.
    #[must_use]
    pub fn with_signatures(mut self, signatures: Vec<Signature>) -> Self {
        self.signatures = signatures;
        self
    }
}

impl<F> Forwardable for FnModule<F>
where
    F: Fn(&mut CallContext<'_>, &CallKey, &Bytes) -> Result<Bytes, Revert> + Send + Sync,
{
    fn invoke(
        &self,
        ctx: &mut CallContext<'_>,
        key: &CallKey,
        args: &Bytes,
    ) -> Result<Bytes, Revert> {
        (self.handler)(ctx, key, args)
    }

    fn signatures(&self) -> Vec<Signature> {
        self.signatures.clone()
    }
}
