//! Router configuration and deployment manifests.

use serde::{Deserialize, Serialize};
use slotproxy_core::{Error, Result, Signature};
use slotproxy_layout::Field;
use slotproxy_registry::ReturnSize;

use crate::Cadence;

/// Router-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// How upgrades spread across proxies.
    pub cadence: Cadence,
    /// Fields every proxy reserves for itself, starting at slot 0.
    pub proxy_reserved: Vec<Field>,
    /// Return size for functions that do not declare one.
    pub default_return_size: ReturnSize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            cadence: Cadence::PerInstance,
            proxy_reserved: Vec::new(),
            default_return_size: ReturnSize::Fixed(32),
        }
    }
}

impl RouterConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::config(e.to_string()))
    }
}

/// One function a module serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionManifest {
    pub signature: Signature,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_size: Option<ReturnSize>,
}

/// One module: its storage layout and the functions it serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// Module identity; also its registry name.
    pub name: String,
    /// Explicit first slot. Omitted means "after everything allocated so far".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<u64>,
    #[serde(default)]
    pub layout: Vec<Field>,
    #[serde(default)]
    pub functions: Vec<FunctionManifest>,
}

/// Everything deployment tooling declares about one router.
///
/// ```rust
/// use slotproxy_router::{Cadence, DeploymentManifest};
///
/// let manifest = DeploymentManifest::from_json(r#"{
///     "router": {
///         "cadence": "global",
///         "proxy_reserved": [{"name": "owner", "type": "address"}]
///     },
///     "modules": [{
///         "name": "Tokens",
///         "layout": [{"name": "balances", "type": "mapping"}],
///         "functions": [{"signature": "balanceOf(address)"}]
///     }]
/// }"#).unwrap();
///
/// assert_eq!(manifest.router.cadence, Cadence::Global);
/// assert_eq!(manifest.modules[0].functions[0].signature.name(), "balanceOf");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentManifest {
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub modules: Vec<ModuleManifest>,
}

impl DeploymentManifest {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::config(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }

    pub fn module(&self, name: &str) -> Option<&ModuleManifest> {
        self.modules.iter().find(|m| m.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotproxy_layout::FieldType;

    #[test]
    fn default_config() {
        let config = RouterConfig::default();
        assert_eq!(config.cadence, Cadence::PerInstance);
        assert!(config.proxy_reserved.is_empty());
        assert_eq!(config.default_return_size, ReturnSize::Fixed(32));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = RouterConfig::from_json(r#"{"default_return_size": "dynamic"}"#).unwrap();
        assert_eq!(config.cadence, Cadence::PerInstance);
        assert_eq!(config.default_return_size, ReturnSize::Dynamic);

        let config = RouterConfig::from_json(r#"{"default_return_size": {"fixed": 64}}"#).unwrap();
        assert_eq!(config.default_return_size, ReturnSize::Fixed(64));
    }

    #[test]
    fn bad_json_is_a_config_error() {
        assert!(matches!(
            RouterConfig::from_json(r#"{"cadence": "sometimes"}"#),
            Err(Error::Config { .. })
        ));
        assert!(matches!(
            DeploymentManifest::from_json(
                r#"{"modules": [{"name": "M", "functions": [{"signature": "bad name()"}]}]}"#
            ),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn manifest_survives_json() {
        let manifest = DeploymentManifest {
            router: RouterConfig {
                cadence: Cadence::Global,
                proxy_reserved: vec![Field::new("owner", FieldType::Address)],
                default_return_size: ReturnSize::Dynamic,
            },
            modules: vec![ModuleManifest {
                name: "Votes".to_string(),
                base: Some(10),
                layout: vec![Field::new("tally", FieldType::Mapping)],
                functions: vec![FunctionManifest {
                    signature: Signature::parse("vote(uint256)").unwrap(),
                    return_size: Some(ReturnSize::Fixed(0)),
                }],
            }],
        };
        let json = manifest.to_json().unwrap();
        assert_eq!(DeploymentManifest::from_json(&json).unwrap(), manifest);
        assert!(manifest.module("Votes").is_some());
        assert!(manifest.module("Tokens").is_none());
    }
}
