//! Managed-VM testbed driven through the vagrant CLI
//!
//! Machines are expected to be up already; this backend only discovers
//! them and runs commands over `vagrant ssh`.

use crate::process::{classify_output, detached, LocalExecutor};

use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use systest_core::abstractions::CommandRunner;
use systest_core::config::{
    ForwardingMode, Scheduler, SuiteConfig, TestbedKind, DEFAULT_ROUTING_PEER_COUNT,
};
use systest_core::error::{SystestError, SystestResult};
use systest_core::node::{Node, NodeRole};
use tracing::{debug, info, warn};

/// Cluster bring-up script for the k8 scheduler, relative to the vagrant dir
pub const K8S_SETUP_SCRIPT: &str = "./vagrant/k8s/setup_cluster.sh";

/// Runs commands on one vagrant machine
pub struct VagrantRunner {
    name: String,
    vagrant_dir: PathBuf,
    executor: Arc<dyn LocalExecutor>,
}

impl VagrantRunner {
    pub fn new(
        name: impl Into<String>,
        vagrant_dir: PathBuf,
        executor: Arc<dyn LocalExecutor>,
    ) -> Self {
        Self {
            name: name.into(),
            vagrant_dir,
            executor,
        }
    }

    async fn vagrant_ssh(&self, command: &str) -> SystestResult<String> {
        let args = vec![
            "ssh".to_string(),
            self.name.clone(),
            "-c".to_string(),
            command.to_string(),
        ];
        let output = self
            .executor
            .execute("vagrant", &args, Some(&self.vagrant_dir))
            .await
            .map_err(|e| {
                SystestError::transport(&self.name, format!("failed to run vagrant: {}", e))
            })?;
        classify_output(&self.name, command, output)
    }
}

#[async_trait]
impl CommandRunner for VagrantRunner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, command: &str) -> SystestResult<String> {
        debug!("vagrant ssh {}: {}", self.name, command);
        self.vagrant_ssh(command).await
    }

    async fn run_background(&self, command: &str) -> SystestResult<()> {
        self.vagrant_ssh(&detached(command)).await.map(|_| ())
    }
}

/// Running machines listed by `vagrant status --machine-readable`, in order
pub fn parse_machine_status(output: &str) -> SystestResult<Vec<String>> {
    let state_line = Regex::new(r"^\d+,([^,]+),state,([^,\s]+)").map_err(|e| {
        SystestError::internal(format!("invalid status pattern: {}", e))
    })?;

    Ok(output
        .lines()
        .filter_map(|line| state_line.captures(line.trim()))
        .filter(|caps| &caps[2] == "running")
        .map(|caps| caps[1].to_string())
        .collect())
}

/// Discovers and wraps the machines of a vagrant environment
pub struct VagrantTestbed {
    executor: Arc<dyn LocalExecutor>,
}

impl VagrantTestbed {
    pub fn new(executor: Arc<dyn LocalExecutor>) -> Self {
        Self { executor }
    }

    async fn run_local(&self, program: &str, args: &[&str], cwd: &Path) -> SystestResult<String> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let output = self.executor.execute(program, &args, Some(cwd)).await?;
        classify_output("localhost", &format!("{} {}", program, args.join(" ")), output)
    }

    /// Build nodes for every running machine.
    ///
    /// Machines whose name lacks the fabric marker are routing peers. With
    /// the k8 scheduler the cluster setup script runs first.
    pub async fn discover(&self, config: &SuiteConfig) -> SystestResult<Vec<Node>> {
        let dir = &config.testbed.vagrant_dir;

        if config.fabric.scheduler == Some(Scheduler::K8) {
            info!("Running k8s cluster setup");
            self.run_local("/bin/sh", &[K8S_SETUP_SCRIPT], dir).await?;
        }

        let status = self
            .run_local("vagrant", &["status", "--machine-readable"], dir)
            .await?;
        let machines = parse_machine_status(&status)?;

        let nodes: Vec<Node> = machines
            .into_iter()
            .map(|name| {
                let role = NodeRole::from_machine_name(&name);
                let runner = VagrantRunner::new(name, dir.clone(), Arc::clone(&self.executor));
                Node::new(Box::new(runner), TestbedKind::Vagrant, &config.timing).with_role(role)
            })
            .collect();

        let fabric = nodes.iter().filter(|n| !n.is_routing_peer()).count();
        info!(
            "Discovered {} vagrant machines ({} fabric nodes)",
            nodes.len(),
            fabric
        );
        if fabric < config.testbed.node_count {
            return Err(SystestError::configuration(
                "testbed.node_count",
                format!(
                    "expected {} fabric nodes, found {} running",
                    config.testbed.node_count, fabric
                ),
            ));
        }
        let peers = nodes.len() - fabric;
        if config.fabric.fwd_mode == ForwardingMode::Routing && peers < DEFAULT_ROUTING_PEER_COUNT {
            warn!(
                "Routing mode expects {} routing peers, found {}",
                DEFAULT_ROUTING_PEER_COUNT, peers
            );
        }
        if fabric > config.testbed.node_count {
            warn!(
                "{} fabric nodes running, {} configured; using all",
                fabric, config.testbed.node_count
            );
        }
        Ok(nodes)
    }
}
