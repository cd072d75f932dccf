//! Testbed configuration: where the cluster nodes come from

use super::defaults::*;
use crate::error::{SystestError, SystestResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Which backend provides the cluster nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TestbedKind {
    /// Vagrant-managed VMs reached through `vagrant ssh`
    #[default]
    Vagrant,
    /// Pre-provisioned hosts reached through plain ssh
    Baremetal,
}

impl fmt::Display for TestbedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestbedKind::Vagrant => write!(f, "vagrant"),
            TestbedKind::Baremetal => write!(f, "baremetal"),
        }
    }
}

/// A single pre-provisioned host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    pub name: String,
    pub address: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub user: String,
}

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// Testbed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TestbedConfig {
    pub kind: TestbedKind,

    /// Number of fabric nodes expected from the managed-VM backend
    pub node_count: usize,

    /// Directory containing the Vagrantfile
    pub vagrant_dir: PathBuf,

    /// Hosts for the bare-metal backend
    pub hosts: Vec<HostConfig>,

    /// Private key used for bare-metal ssh and binary copies
    pub key_file: PathBuf,

    /// Base URL of the control-plane REST API
    pub control_plane_url: String,
}

impl Default for TestbedConfig {
    fn default() -> Self {
        Self {
            kind: TestbedKind::default(),
            node_count: DEFAULT_NODE_COUNT,
            vagrant_dir: PathBuf::from(DEFAULT_VAGRANT_DIR),
            hosts: Vec::new(),
            key_file: PathBuf::from(DEFAULT_KEY_FILE),
            control_plane_url: DEFAULT_CONTROL_PLANE_URL.to_string(),
        }
    }
}

impl TestbedConfig {
    /// Build bare-metal host entries from parallel address and user lists.
    ///
    /// Hosts are named `aci-swarm-node1`, `aci-swarm-node2`, ...
    pub fn hosts_from_lists(
        addresses: &[String],
        users: &[String],
    ) -> SystestResult<Vec<HostConfig>> {
        if addresses.len() != users.len() {
            return Err(SystestError::configuration(
                "testbed.hosts",
                format!(
                    "{} host addresses but {} user names",
                    addresses.len(),
                    users.len()
                ),
            ));
        }

        Ok(addresses
            .iter()
            .zip(users)
            .enumerate()
            .map(|(i, (address, user))| HostConfig {
                name: format!("{}{}", BAREMETAL_NODE_PREFIX, i + 1),
                address: address.trim().to_string(),
                port: DEFAULT_SSH_PORT,
                user: user.trim().to_string(),
            })
            .collect())
    }

    pub fn validate(&self) -> SystestResult<()> {
        match self.kind {
            TestbedKind::Vagrant => {
                if self.node_count == 0 {
                    return Err(SystestError::configuration(
                        "testbed.node_count",
                        "at least one node is required",
                    ));
                }
            }
            TestbedKind::Baremetal => {
                if self.hosts.is_empty() {
                    return Err(SystestError::configuration(
                        "testbed.hosts",
                        "bare-metal testbed needs at least one host",
                    ));
                }
                if let Some(host) = self.hosts.iter().find(|h| h.address.is_empty()) {
                    return Err(SystestError::configuration(
                        "testbed.hosts",
                        format!("host '{}' has no address", host.name),
                    ));
                }
            }
        }

        url::Url::parse(&self.control_plane_url).map_err(|e| {
            SystestError::configuration(
                "testbed.control_plane_url",
                format!("invalid URL '{}': {}", self.control_plane_url, e),
            )
        })?;

        Ok(())
    }
}
