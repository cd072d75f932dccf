//! Fabric configuration: how netplugin and netmaster are launched

use super::defaults::*;
use crate::error::{SystestError, SystestResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Data-plane forwarding mode the plugin is started in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ForwardingMode {
    #[default]
    Bridge,
    Routing,
}

impl fmt::Display for ForwardingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardingMode::Bridge => write!(f, "bridge"),
            ForwardingMode::Routing => write!(f, "routing"),
        }
    }
}

impl FromStr for ForwardingMode {
    type Err = SystestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bridge" => Ok(ForwardingMode::Bridge),
            "routing" => Ok(ForwardingMode::Routing),
            other => Err(SystestError::configuration(
                "fabric.fwd_mode",
                format!("unknown forwarding mode '{}'", other),
            )),
        }
    }
}

/// Workload scheduler the fabric is integrated with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheduler {
    Docker,
    K8,
}

/// Key-value store family backing the fabric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFamily {
    Etcd,
    Consul,
}

impl StoreFamily {
    /// Service unit name used when restarting the store
    pub fn service_name(&self) -> &'static str {
        match self {
            StoreFamily::Etcd => "etcd",
            StoreFamily::Consul => "consul",
        }
    }
}

/// Fabric launch configuration shared by every node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FabricConfig {
    /// Directory holding the netplugin/netmaster binaries on each node
    pub binpath: String,

    /// Data interface handed to netplugin
    pub vlan_if: String,

    /// Cluster store URL, e.g. `etcd://localhost:2379`
    pub cluster_store: String,

    /// Forwarding mode
    pub fwd_mode: ForwardingMode,

    /// Start netmaster with DNS service discovery
    pub enable_dns: bool,

    /// Scheduler hint
    pub scheduler: Option<Scheduler>,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            binpath: DEFAULT_BINPATH.to_string(),
            vlan_if: DEFAULT_VLAN_IF.to_string(),
            cluster_store: DEFAULT_CLUSTER_STORE.to_string(),
            fwd_mode: ForwardingMode::default(),
            enable_dns: false,
            scheduler: None,
        }
    }
}

impl FabricConfig {
    /// Store family derived from the cluster-store URL scheme
    pub fn store_family(&self) -> SystestResult<StoreFamily> {
        let url = url::Url::parse(&self.cluster_store).map_err(|e| {
            SystestError::configuration(
                "fabric.cluster_store",
                format!("invalid URL '{}': {}", self.cluster_store, e),
            )
        })?;

        match url.scheme() {
            "etcd" => Ok(StoreFamily::Etcd),
            "consul" => Ok(StoreFamily::Consul),
            other => Err(SystestError::configuration(
                "fabric.cluster_store",
                format!("unsupported store scheme '{}'", other),
            )),
        }
    }

    /// Extra netplugin arguments implied by the forwarding mode
    pub fn plugin_mode_args(&self) -> String {
        match self.fwd_mode {
            ForwardingMode::Bridge => String::new(),
            ForwardingMode::Routing => {
                format!("-fwd-mode=routing -vlan-if={}", DEFAULT_ROUTING_VLAN_IF)
            }
        }
    }

    pub fn validate(&self) -> SystestResult<()> {
        if self.binpath.is_empty() {
            return Err(SystestError::configuration(
                "fabric.binpath",
                "binary path must not be empty",
            ));
        }
        if self.vlan_if.is_empty() {
            return Err(SystestError::configuration(
                "fabric.vlan_if",
                "VLAN interface must not be empty",
            ));
        }
        self.store_family()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_family_from_url() {
        let mut config = FabricConfig::default();
        assert_eq!(config.store_family().unwrap(), StoreFamily::Etcd);

        config.cluster_store = "consul://localhost:8500".to_string();
        assert_eq!(config.store_family().unwrap(), StoreFamily::Consul);

        config.cluster_store = "zk://localhost:2181".to_string();
        assert!(config.store_family().is_err());
    }

    #[test]
    fn test_plugin_mode_args() {
        let mut config = FabricConfig::default();
        assert_eq!(config.plugin_mode_args(), "");

        config.fwd_mode = ForwardingMode::Routing;
        assert_eq!(config.plugin_mode_args(), "-fwd-mode=routing -vlan-if=eth2");
    }

    #[test]
    fn test_forwarding_mode_parse() {
        assert_eq!("bridge".parse::<ForwardingMode>().unwrap(), ForwardingMode::Bridge);
        assert_eq!("routing".parse::<ForwardingMode>().unwrap(), ForwardingMode::Routing);
        assert!("vxlan".parse::<ForwardingMode>().is_err());
    }
}
