//! Cluster lifecycle management
//!
//! [`Cluster::setup_test`] takes every fabric node from whatever state the
//! previous case left behind to a freshly started fabric, in six strictly
//! ordered phases. Each phase is fanned out over the fabric nodes one node
//! at a time and must finish everywhere before the next one begins:
//!
//! ```text
//!  quiesce ─▶ stop-control-plane ─▶ wipe-state ─▶ restart-data-plane
//!                                                        │
//!        restart-control-plane ◀──────── barrier ◀───────┘
//! ```
//!
//! A failing phase is reported as [`SystestError::SetupFailed`] naming the
//! phase; it fails only the current case.

use crate::abstractions::ControlPlaneClient;
use crate::config::{FabricConfig, SuiteConfig, DEFAULT_TENANT};
use crate::error::{SystestError, SystestResult};
use crate::node::{Node, MASTER_PROCESS, PLUGIN_PROCESS};
use crate::poller::poll_attempts;

use scopeguard::ScopeGuard;
use std::fmt;
use std::future::Future;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Case names containing this marker run with DNS enabled on the master
pub const SVC_DISCOVERY_MARKER: &str = "SvcDiscovery";

/// Image pulled onto every node at suite start
pub const WORKLOAD_IMAGE: &str = "alpine";

/// Ordered steps of per-case setup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Quiesce,
    StopControlPlane,
    WipeState,
    RestartDataPlane,
    Barrier,
    RestartControlPlane,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Quiesce,
        Phase::StopControlPlane,
        Phase::WipeState,
        Phase::RestartDataPlane,
        Phase::Barrier,
        Phase::RestartControlPlane,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Quiesce => "quiesce",
            Phase::StopControlPlane => "stop-control-plane",
            Phase::WipeState => "wipe-state",
            Phase::RestartDataPlane => "restart-data-plane",
            Phase::Barrier => "barrier",
            Phase::RestartControlPlane => "restart-control-plane",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log markers found on one node during suite teardown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFindings {
    pub node: String,
    pub lines: Vec<String>,
}

/// The nodes under test and the configuration they run with
pub struct Cluster {
    config: SuiteConfig,
    nodes: Vec<Node>,
    control_plane: Box<dyn ControlPlaneClient>,
}

impl fmt::Debug for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("nodes", &self.nodes)
            .field("fabric", &self.config.fabric)
            .finish()
    }
}

impl Cluster {
    pub fn new(
        config: SuiteConfig,
        nodes: Vec<Node>,
        control_plane: Box<dyn ControlPlaneClient>,
    ) -> SystestResult<Self> {
        config.validate()?;
        if !nodes.iter().any(|n| !n.is_routing_peer()) {
            return Err(SystestError::configuration(
                "cluster",
                "no fabric nodes were discovered",
            ));
        }
        info!(
            "Cluster of {} nodes ({} fabric), {} mode, store {}",
            nodes.len(),
            nodes.iter().filter(|n| !n.is_routing_peer()).count(),
            config.fabric.fwd_mode,
            config.fabric.cluster_store
        );
        Ok(Self {
            config,
            nodes,
            control_plane,
        })
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    pub fn fabric(&self) -> &FabricConfig {
        &self.config.fabric
    }

    /// Every node, routing peers included
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Nodes that run the fabric, in discovery order
    pub fn fabric_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| !n.is_routing_peer())
    }

    pub fn routing_peers(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_routing_peer())
    }

    pub fn node_by_name(&self, name: &str) -> SystestResult<&Node> {
        self.nodes
            .iter()
            .find(|n| n.name() == name)
            .ok_or_else(|| SystestError::NodeNotFound {
                name: name.to_string(),
            })
    }

    /// Enter a test case.
    ///
    /// For service-discovery cases DNS is switched on for the master; the
    /// previous setting is restored when the returned guard drops, however
    /// the case ends.
    pub fn enter_case<'a>(
        &'a mut self,
        case: &str,
    ) -> ScopeGuard<&'a mut Cluster, impl FnOnce(&'a mut Cluster)> {
        let previous = self.config.fabric.enable_dns;
        if case.contains(SVC_DISCOVERY_MARKER) {
            debug!("Enabling DNS for {}", case);
            self.config.fabric.enable_dns = true;
        }
        scopeguard::guard(self, move |cluster| {
            cluster.config.fabric.enable_dns = previous;
        })
    }

    /// Remove stale logs and pull the workload image on every fabric node
    pub async fn setup_suite(&self) -> SystestResult<()> {
        info!("Pulling {} on all nodes", WORKLOAD_IMAGE);
        for node in self.fabric_nodes() {
            node.remove_stale_logs().await?;
            node.pull_image(WORKLOAD_IMAGE).await?;
        }
        Ok(())
    }

    /// Check every node answers a trivial command
    pub async fn check_connectivity(&self) -> SystestResult<()> {
        for node in &self.nodes {
            node.run_foreground("true").await?;
        }
        Ok(())
    }

    /// Bring the fabric up from scratch for the next case
    pub async fn setup_test(&self) -> SystestResult<()> {
        self.run_phase(Phase::Quiesce, self.quiesce()).await?;
        self.run_phase(Phase::StopControlPlane, self.stop_control_plane())
            .await?;
        self.run_phase(Phase::WipeState, self.wipe_state()).await?;
        self.run_phase(Phase::RestartDataPlane, self.restart_data_plane())
            .await?;
        self.run_phase(Phase::Barrier, self.barrier()).await?;
        self.run_phase(Phase::RestartControlPlane, self.restart_control_plane())
            .await?;
        Ok(())
    }

    async fn run_phase<F>(&self, phase: Phase, work: F) -> SystestResult<()>
    where
        F: Future<Output = SystestResult<()>>,
    {
        info!("Setup phase: {}", phase);
        work.await.map_err(|e| {
            error!("Setup phase {} failed: {}", phase, e);
            SystestError::setup_failed(phase.as_str(), e)
        })
    }

    async fn quiesce(&self) -> SystestResult<()> {
        for node in self.fabric_nodes() {
            node.cleanup_containers().await?;
            node.cleanup_docker_network().await?;
            ignore_command_failure(node.stop_plugin().await)?;
            node.wait_for_process_exit(PLUGIN_PROCESS).await?;
        }
        Ok(())
    }

    async fn stop_control_plane(&self) -> SystestResult<()> {
        for node in self.fabric_nodes() {
            ignore_command_failure(node.stop_master().await)?;
        }
        Ok(())
    }

    async fn wipe_state(&self) -> SystestResult<()> {
        for node in self.fabric_nodes() {
            node.cleanup_cluster_state(&self.config.fabric).await?;
        }
        for node in self.fabric_nodes() {
            node.cleanup_local_state().await?;
            node.cleanup_installed_files().await?;
        }
        Ok(())
    }

    async fn restart_data_plane(&self) -> SystestResult<()> {
        let args = self.config.fabric.plugin_mode_args();
        for node in self.fabric_nodes() {
            node.start_plugin(&self.config.fabric, &args).await?;
            node.wait_for_process(PLUGIN_PROCESS).await?;
        }
        Ok(())
    }

    async fn barrier(&self) -> SystestResult<()> {
        // The plugins expose no signal for "joined the store and programmed
        // the switch"; assume it happens within the settle delay.
        sleep(self.config.timing.data_plane_settle).await;
        Ok(())
    }

    async fn restart_control_plane(&self) -> SystestResult<()> {
        let timing = &self.config.timing;
        for node in self.fabric_nodes() {
            node.start_master(&self.config.fabric).await?;
            sleep(timing.master_start_pause).await;
            node.wait_for_process(MASTER_PROCESS).await?;
        }

        // A running master process is not yet serving its API
        sleep(timing.control_plane_settle).await;
        poll_attempts(timing.control_plane_attempts, timing.control_plane_spacing, || {
            self.control_plane.tenant_get(DEFAULT_TENANT)
        })
        .await
    }

    /// Check logs for fatal markers and rotate them aside.
    ///
    /// Every node is checked and rotated even when an earlier one fails.
    pub async fn teardown_test(&self) -> SystestResult<()> {
        let mut errors = Vec::new();
        for node in self.fabric_nodes() {
            if let Err(e) = node.check_for_errors().await {
                errors.push(e);
            }
            for process in [PLUGIN_PROCESS, MASTER_PROCESS] {
                if let Err(e) = node.rotate_log(process).await {
                    errors.push(e);
                }
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(SystestError::Multiple {
                context: "test teardown".to_string(),
                errors,
            }),
        }
    }

    /// Remove containers and report log markers from the whole run.
    ///
    /// Findings are diagnostics only; nothing here fails the suite.
    pub async fn teardown_suite(&self) -> Vec<LogFindings> {
        for node in self.fabric_nodes() {
            if let Err(e) = node.cleanup_containers().await {
                warn!("Container cleanup on {} failed: {}", node.name(), e);
            }
        }
        self.scan_logs().await
    }

    /// Collect log markers from the rotated logs of every fabric node.
    ///
    /// Read-only; a node that cannot be scanned is logged and skipped.
    pub async fn scan_logs(&self) -> Vec<LogFindings> {
        let mut findings = Vec::new();
        for node in self.fabric_nodes() {
            info!("Checking for errors on {}", node.name());
            match node.scan_log_markers().await {
                Ok(lines) if lines.is_empty() => {}
                Ok(lines) => {
                    error!("Errors in logfiles on {}:\n{}", node.name(), lines.join("\n"));
                    findings.push(LogFindings {
                        node: node.name().to_string(),
                        lines,
                    });
                }
                Err(e) => warn!("Could not scan logs on {}: {}", node.name(), e),
            }
        }
        findings
    }
}

/// Stopping a process that is not running exits non-zero; that is fine
fn ignore_command_failure(result: SystestResult<()>) -> SystestResult<()> {
    match result {
        Err(SystestError::CommandFailed { .. }) => Ok(()),
        other => other,
    }
}
