//! The routing seam shared by registries, resolvers, and snapshots.

use std::fmt;

use serde::{Deserialize, Serialize};
use slotproxy_core::{Address, Bytes, CallKey, Error, Result};

/// Largest `ReturnSize::Fixed` a resolver accepts.
pub const MAX_FIXED_RETURN_SIZE: u32 = 64 * 1024;

/// How much return data a forwarded call hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnSize {
    /// Exactly `n` bytes: longer data is truncated, shorter data zero-padded.
    Fixed(u32),
    /// Whatever the module returned, unchanged.
    Dynamic,
}

impl ReturnSize {
    /// Reject fixed sizes above [`MAX_FIXED_RETURN_SIZE`].
    pub fn validate(&self) -> Result<()> {
        match self {
            ReturnSize::Fixed(n) if *n > MAX_FIXED_RETURN_SIZE => Err(Error::config(format!(
                "fixed return size {} exceeds the {} byte limit",
                n, MAX_FIXED_RETURN_SIZE
            ))),
            _ => Ok(()),
        }
    }

    /// Shape module return data to this size.
    ///
    /// Padding never grows past [`MAX_FIXED_RETURN_SIZE`].
    pub fn shape(&self, data: Bytes) -> Bytes {
        match self {
            ReturnSize::Dynamic => data,
            ReturnSize::Fixed(n) => {
                let n = (*n).min(MAX_FIXED_RETURN_SIZE) as usize;
                if data.len() >= n {
                    data.slice(..n)
                } else {
                    let mut padded = data.to_vec();
                    padded.resize(n, 0);
                    Bytes::from(padded)
                }
            }
        }
    }
}

impl fmt::Display for ReturnSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnSize::Fixed(n) => write!(f, "{} bytes", n),
            ReturnSize::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// A resolved forwarding target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub address: Address,
    pub return_size: ReturnSize,
}

/// Resolve a call key to the module that should run it.
///
/// # Object Safety
///
/// This trait is object-safe: proxies hold `Arc<dyn Lookup>`-shaped bindings.
pub trait Lookup: Send + Sync {
    /// # Returns
    ///
    /// * `Ok(target)` - The module bound to `key`.
    /// * `Err(Error::NotFound)` - Nothing is bound to `key`, or this lookup
    ///   does not route keys of that kind.
    fn resolve(&self, key: &CallKey) -> Result<Target>;
}

impl<T: Lookup + ?Sized> Lookup for std::sync::Arc<T> {
    fn resolve(&self, key: &CallKey) -> Result<Target> {
        self.as_ref().resolve(key)
    }
}
