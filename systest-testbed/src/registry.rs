//! Backend selection
//!
//! A [`TestbedFactory`] turns a suite configuration into nodes for one kind
//! of testbed. The registry picks the factory once, from
//! `testbed.kind`, and everything after that works on plain [`Node`]s.

use crate::baremetal::{distribute_binaries, BaremetalTestbed};
use crate::process::{LocalExecutor, SystemCommandExecutor};
use crate::vagrant::VagrantTestbed;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use systest_core::abstractions::HttpControlPlaneClient;
use systest_core::config::{SuiteConfig, TestbedKind};
use systest_core::error::{SystestError, SystestResult};
use systest_core::{Cluster, Node};
use tracing::info;

/// Builds the nodes of one kind of testbed
#[async_trait]
pub trait TestbedFactory: Send + Sync {
    fn kind(&self) -> TestbedKind;

    fn description(&self) -> &'static str;

    /// Discover or connect to the hosts
    async fn build_nodes(&self, config: &SuiteConfig) -> SystestResult<Vec<Node>>;

    /// One-time host preparation before the suite starts
    async fn prepare(&self, _config: &SuiteConfig, _nodes: &[Node]) -> SystestResult<()> {
        Ok(())
    }
}

pub struct VagrantFactory {
    testbed: VagrantTestbed,
}

impl VagrantFactory {
    pub fn new(executor: Arc<dyn LocalExecutor>) -> Self {
        Self {
            testbed: VagrantTestbed::new(executor),
        }
    }
}

#[async_trait]
impl TestbedFactory for VagrantFactory {
    fn kind(&self) -> TestbedKind {
        TestbedKind::Vagrant
    }

    fn description(&self) -> &'static str {
        "Running vagrant machines reached with vagrant ssh"
    }

    async fn build_nodes(&self, config: &SuiteConfig) -> SystestResult<Vec<Node>> {
        self.testbed.discover(config).await
    }
}

pub struct BaremetalFactory {
    testbed: BaremetalTestbed,
}

impl BaremetalFactory {
    pub fn new(executor: Arc<dyn LocalExecutor>) -> Self {
        Self {
            testbed: BaremetalTestbed::new(executor),
        }
    }
}

#[async_trait]
impl TestbedFactory for BaremetalFactory {
    fn kind(&self) -> TestbedKind {
        TestbedKind::Baremetal
    }

    fn description(&self) -> &'static str {
        "Configured hosts reached with ssh"
    }

    async fn build_nodes(&self, config: &SuiteConfig) -> SystestResult<Vec<Node>> {
        Ok(self.testbed.connect(config))
    }

    async fn prepare(&self, config: &SuiteConfig, nodes: &[Node]) -> SystestResult<()> {
        distribute_binaries(config, nodes).await
    }
}

/// Registry of testbed factories
pub struct TestbedRegistry {
    factories: HashMap<TestbedKind, Arc<dyn TestbedFactory>>,
}

impl TestbedRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with both built-in backends sharing `executor`
    pub fn with_executor(executor: Arc<dyn LocalExecutor>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(VagrantFactory::new(Arc::clone(&executor))));
        registry.register(Arc::new(BaremetalFactory::new(executor)));
        registry
    }

    pub fn register(&mut self, factory: Arc<dyn TestbedFactory>) {
        info!(
            "Registering testbed backend: {} ({})",
            factory.kind(),
            factory.description()
        );
        self.factories.insert(factory.kind(), factory);
    }

    pub fn factory(&self, kind: TestbedKind) -> SystestResult<Arc<dyn TestbedFactory>> {
        self.factories.get(&kind).cloned().ok_or_else(|| {
            SystestError::configuration(
                "testbed.kind",
                format!(
                    "no backend registered for '{}'; available: {:?}",
                    kind,
                    self.list_available()
                ),
            )
        })
    }

    pub fn list_available(&self) -> Vec<TestbedKind> {
        let mut kinds: Vec<_> = self.factories.keys().copied().collect();
        kinds.sort_by_key(|k| k.to_string());
        kinds
    }

    /// Nodes for the configured testbed, prepared for the suite
    pub async fn build_nodes(&self, config: &SuiteConfig) -> SystestResult<Vec<Node>> {
        let factory = self.factory(config.testbed.kind)?;
        let nodes = factory.build_nodes(config).await?;
        factory.prepare(config, &nodes).await?;
        Ok(nodes)
    }

    /// A ready-to-run cluster for `config`
    pub async fn build_cluster(&self, config: SuiteConfig) -> SystestResult<Cluster> {
        config.validate()?;
        let nodes = self.build_nodes(&config).await?;
        let control_plane = HttpControlPlaneClient::new(
            &config.testbed.control_plane_url,
            config.timing.control_plane_request_timeout,
        )?;
        Cluster::new(config, nodes, Box::new(control_plane))
    }
}

impl Default for TestbedRegistry {
    fn default() -> Self {
        Self::with_executor(Arc::new(SystemCommandExecutor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::mock::MockLocalExecutor;
    use crate::process::CommandOutput;
    use systest_core::config::HostConfig;

    #[test]
    fn test_default_registry_has_both_backends() {
        let registry = TestbedRegistry::with_executor(Arc::new(MockLocalExecutor::default()));
        assert_eq!(
            registry.list_available(),
            vec![TestbedKind::Baremetal, TestbedKind::Vagrant]
        );
    }

    #[test]
    fn test_unknown_backend() {
        let registry = TestbedRegistry::new();
        assert!(registry.factory(TestbedKind::Vagrant).is_err());
    }

    #[tokio::test]
    async fn test_build_vagrant_cluster() {
        let executor = Arc::new(MockLocalExecutor::default());
        executor.reply(CommandOutput::success(
            "1,netplugin-node1,state,running\n1,netplugin-node2,state,running\n",
        ));
        let registry = TestbedRegistry::with_executor(executor);

        let cluster = registry.build_cluster(SuiteConfig::test()).await.unwrap();
        assert_eq!(cluster.fabric_nodes().count(), 2);
    }

    #[tokio::test]
    async fn test_build_baremetal_nodes_distributes_binaries() {
        let executor = Arc::new(MockLocalExecutor::default());
        let registry = TestbedRegistry::with_executor(executor.clone());
        let mut config = SuiteConfig::test();
        config.testbed.kind = TestbedKind::Baremetal;
        config.testbed.hosts = vec![
            HostConfig {
                name: "aci-swarm-node1".into(),
                address: "10.0.0.1".into(),
                port: 22,
                user: "admin".into(),
            },
            HostConfig {
                name: "aci-swarm-node2".into(),
                address: "10.0.0.2".into(),
                port: 22,
                user: "admin".into(),
            },
        ];

        let nodes = registry.build_nodes(&config).await.unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(executor.calls().len(), 4);
    }
}
