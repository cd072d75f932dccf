//! Bare-metal testbed reached over plain ssh

use crate::process::LocalExecutor;
use crate::ssh::SshRunner;

use std::sync::Arc;
use systest_core::config::{HostConfig, SuiteConfig, TestbedKind};
use systest_core::error::SystestResult;
use systest_core::node::Node;
use tracing::{info, warn};

/// Fabric binaries copied from the first host to the others at suite start
pub const FABRIC_BINARIES: &[&str] = &["netmaster", "netplugin", "netctl", "contivk8s"];

/// Hosts listed in the testbed configuration
pub struct BaremetalTestbed {
    executor: Arc<dyn LocalExecutor>,
}

impl BaremetalTestbed {
    pub fn new(executor: Arc<dyn LocalExecutor>) -> Self {
        Self { executor }
    }

    /// One fabric node per configured host, in configuration order
    pub fn connect(&self, config: &SuiteConfig) -> Vec<Node> {
        config
            .testbed
            .hosts
            .iter()
            .map(|host| {
                info!("Host {} at {}@{}:{}", host.name, host.user, host.address, host.port);
                let runner = SshRunner::new(
                    host.clone(),
                    config.testbed.key_file.clone(),
                    Arc::clone(&self.executor),
                );
                Node::new(Box::new(runner), TestbedKind::Baremetal, &config.timing)
            })
            .collect()
    }
}

/// `scp` commands that push `binary` from the first host to every other one
pub fn copy_binary_commands(config: &SuiteConfig, binary: &str) -> Vec<String> {
    let path = format!("{}/{}", config.fabric.binpath, binary);
    config
        .testbed
        .hosts
        .iter()
        .skip(1)
        .map(|host: &HostConfig| {
            format!(
                "scp -i {} {} {}:{}",
                config.testbed.key_file.display(),
                path,
                host.address,
                path
            )
        })
        .collect()
}

/// Push the fabric binaries from the first node to the rest.
///
/// Copy failures are logged; a host missing a binary shows up later as a
/// failed process start.
pub async fn distribute_binaries(config: &SuiteConfig, nodes: &[Node]) -> SystestResult<()> {
    let Some(source) = nodes.first() else {
        return Ok(());
    };

    for binary in FABRIC_BINARIES {
        info!("Copying {} binary to {}", binary, config.fabric.binpath);
        for command in copy_binary_commands(config, binary) {
            if let Err(e) = source.run_foreground(&command).await {
                if e.is_transient() {
                    return Err(e);
                }
                warn!("Copying {} failed: {}", binary, e);
            }
        }
    }
    Ok(())
}
