//! Built-in test cases
//!
//! Each case runs against a freshly set up cluster. Cases only observe the
//! fabric through node commands and the plugin's introspection document.

use async_trait::async_trait;
use systest_core::config::{FabricConfig, SuiteConfig};
use systest_core::container::{self, Container, ContainerSpec};
use systest_core::node::{MASTER_PROCESS, PLUGIN_PROCESS};
use systest_core::poller::wait_until;
use systest_core::verifier::{verify_endpoints_present, verify_tunnel_membership};
use systest_core::{Cluster, Scenario, Suite, SystestError, SystestResult};
use tracing::{debug, info};

/// Interface whose address each node uses as its tunnel endpoint
pub const DEFAULT_VTEP_INTERFACE: &str = "eth1";

/// Network created for container cases
pub const TEST_NETWORK: &str = "private";
pub const TEST_SUBNET: &str = "10.1.1.0/24";

/// Argument netmaster carries when service discovery is on
pub const DNS_ENABLED_ARG: &str = "--dns-enable=true";

/// Knobs shared by the built-in cases
#[derive(Debug, Clone)]
pub struct ScenarioOptions {
    pub vtep_if: String,
    pub iterations: u32,
    pub containers: u32,
}

impl ScenarioOptions {
    /// Options for a run; short runs do a single iteration
    pub fn from_config(config: &SuiteConfig, vtep_if: impl Into<String>) -> Self {
        Self {
            vtep_if: vtep_if.into(),
            iterations: if config.run.short { 1 } else { config.run.iterations },
            containers: config.run.containers,
        }
    }
}

/// Every node answers a trivial command
pub struct SshCheck;

#[async_trait]
impl Scenario for SshCheck {
    fn name(&self) -> &str {
        "Test00SSH"
    }

    async fn run(&self, cluster: &Cluster) -> SystestResult<()> {
        cluster.check_connectivity().await
    }
}

/// Every fabric node knows every other fabric node as a tunnel endpoint
pub struct TunnelMembership {
    interface: String,
}

impl TunnelMembership {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
        }
    }
}

#[async_trait]
impl Scenario for TunnelMembership {
    fn name(&self) -> &str {
        "TestTunnelMembership"
    }

    async fn run(&self, cluster: &Cluster) -> SystestResult<()> {
        let mut vteps = Vec::new();
        for node in cluster.fabric_nodes() {
            vteps.push(node.get_interface_address(&self.interface).await?);
        }
        info!("Expecting VTEPs {:?}", vteps);

        for node in cluster.fabric_nodes() {
            node.wait_for_listeners().await?;
            verify_tunnel_membership(node, vteps.iter().cloned()).await?;
        }
        Ok(())
    }
}

/// Containers on a fabric network show up in the plugin and reach each other
pub struct EndpointConnectivity {
    options: ScenarioOptions,
}

impl EndpointConnectivity {
    pub fn new(options: ScenarioOptions) -> Self {
        Self { options }
    }

    async fn create_network(&self, cluster: &Cluster) -> SystestResult<()> {
        let first = cluster
            .fabric_nodes()
            .next()
            .ok_or_else(|| SystestError::internal("cluster has no fabric nodes"))?;
        first
            .run_single(&network_create_command(cluster.fabric(), TEST_NETWORK, TEST_SUBNET))
            .await?;

        for node in cluster.fabric_nodes() {
            let timing = node.timing();
            wait_until(
                || async {
                    node.check_docker_network_created(TEST_NETWORK)
                        .await
                        .unwrap_or(false)
                },
                timing.listener_poll_tick,
                timing.listener_poll_timeout,
                format!("network {} never appeared on {:?}", TEST_NETWORK, node.name()),
            )
            .await?;
        }
        Ok(())
    }

    async fn run_iteration(&self, cluster: &Cluster, iteration: u32) -> SystestResult<()> {
        debug!("Endpoint iteration {}/{}", iteration, self.options.iterations);

        let mut containers: Vec<Container<'_>> = Vec::new();
        for node in cluster.fabric_nodes() {
            for _ in 0..self.options.containers {
                let spec = ContainerSpec::new().network(TEST_NETWORK);
                containers.push(container::run(node, spec).await?);
            }
        }

        let mut addresses = Vec::with_capacity(containers.len());
        for c in &containers {
            addresses.push(c.ip_address().await?);
        }

        for node in cluster.fabric_nodes() {
            let local: Vec<&str> = containers
                .iter()
                .zip(&addresses)
                .filter(|(c, _)| c.node().name() == node.name())
                .map(|(_, address)| address.as_str())
                .collect();
            verify_endpoints_present(node, &local).await?;
        }

        if let Some(source) = containers.first() {
            for address in addresses.iter().skip(1) {
                source.check_ping(address).await?;
            }
        }

        for c in containers {
            c.remove().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Scenario for EndpointConnectivity {
    fn name(&self) -> &str {
        "TestEndpointConnectivity"
    }

    async fn run(&self, cluster: &Cluster) -> SystestResult<()> {
        self.create_network(cluster).await?;
        for iteration in 1..=self.options.iterations {
            self.run_iteration(cluster, iteration).await?;
        }
        Ok(())
    }
}

/// The fabric survives a restart of the cluster store underneath it
pub struct ClusterStoreRestart;

#[async_trait]
impl Scenario for ClusterStoreRestart {
    fn name(&self) -> &str {
        "TestClusterStoreRestart"
    }

    async fn run(&self, cluster: &Cluster) -> SystestResult<()> {
        for node in cluster.fabric_nodes() {
            node.restart_cluster_store(cluster.fabric()).await?;
        }
        for node in cluster.fabric_nodes() {
            node.wait_for_process(PLUGIN_PROCESS).await?;
            node.wait_for_process(MASTER_PROCESS).await?;
            node.wait_for_listeners().await?;
        }
        Ok(())
    }
}

/// The master runs with service discovery for cases that ask for it
pub struct SvcDiscoveryDns;

#[async_trait]
impl Scenario for SvcDiscoveryDns {
    fn name(&self) -> &str {
        "TestSvcDiscoveryDNS"
    }

    async fn run(&self, cluster: &Cluster) -> SystestResult<()> {
        for node in cluster.fabric_nodes() {
            let args = node.run_foreground("ps -eo args | grep [n]etmaster").await?;
            if !args.contains(DNS_ENABLED_ARG) {
                return Err(SystestError::MissingToken {
                    node: node.name().to_string(),
                    token: DNS_ENABLED_ARG.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// `netctl` invocation creating a network in the default tenant
pub fn network_create_command(fabric: &FabricConfig, network: &str, subnet: &str) -> String {
    format!("{}/netctl net create -s {} {}", fabric.binpath, subnet, network)
}

/// All built-in cases in run order
pub fn builtin_scenarios(options: &ScenarioOptions) -> Vec<Box<dyn Scenario>> {
    vec![
        Box::new(SshCheck),
        Box::new(TunnelMembership::new(options.vtep_if.clone())),
        Box::new(EndpointConnectivity::new(options.clone())),
        Box::new(ClusterStoreRestart),
        Box::new(SvcDiscoveryDns),
    ]
}

/// Suite of the built-in cases whose name contains `filter`
pub fn select_suite(options: &ScenarioOptions, filter: Option<&str>) -> Suite {
    builtin_scenarios(options)
        .into_iter()
        .filter(|s| filter.map_or(true, |f| s.name().contains(f)))
        .fold(Suite::new(), Suite::add_boxed)
}
