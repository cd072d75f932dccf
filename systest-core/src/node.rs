//! A single cluster host and the fabric operations it supports
//!
//! A [`Node`] owns the command capability for one host and composes every
//! fabric operation (start/stop the plugin and the master, wipe local and
//! cluster state, probe processes and listeners) from it. Process state is
//! never cached: each question is answered by asking the host again.
//!
//! All operations are safe to repeat. Cleanup steps that fail because the
//! thing they remove is already gone are logged and ignored; only transport
//! trouble or genuine probe failures propagate.

use crate::abstractions::CommandRunner;
use crate::config::{
    FabricConfig, StoreFamily, TestbedKind, TimingConfig, CONSUL_HTTP_PORT, FABRIC_NODE_MARKER,
    INSPECT_PORT,
};
use crate::error::{SystestError, SystestResult};
use crate::executor::{ExecutionMode, RemoteExecutor};
use crate::patterns::RetryConfig;
use crate::poller::wait_until;

use std::fmt;
use tracing::{debug, info, instrument, warn};

pub const PLUGIN_PROCESS: &str = "netplugin";
pub const MASTER_PROCESS: &str = "netmaster";

/// Plugin socket left behind by an unclean plugin exit
pub const PLUGIN_SOCKET: &str = "/var/run/docker/plugins/netplugin.sock";

/// Unit files and tools installed on bare-metal hosts by the fabric packages
pub const BAREMETAL_INSTALLED_FILES: &[&str] = &[
    "/etc/systemd/system/netplugin.service",
    "/etc/systemd/system/netmaster.service",
    "/usr/bin/netctl",
];

const DELETE_VETH_PORTS: &str = "for p in `ifconfig  | grep vport | awk '{print $1}'`; \
                                 do sudo ip link delete $p type veth; done";

const ETCD_PREFIXES: &[&str] = &["/contiv", "/contiv.io", "/docker", "/skydns"];
const CONSUL_PREFIXES: &[&str] = &["contiv.io", "docker"];

/// Where a node sits in the test topology
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// Runs the plugin and master; part of every lifecycle fan-out
    Fabric,
    /// Extra router in the routing topology; never runs the fabric
    RoutingPeer,
}

impl NodeRole {
    /// Role of a managed machine in the routing topology, from its name
    pub fn from_machine_name(name: &str) -> Self {
        if name.contains(FABRIC_NODE_MARKER) {
            NodeRole::Fabric
        } else {
            NodeRole::RoutingPeer
        }
    }
}

/// One cluster host
pub struct Node {
    name: String,
    role: NodeRole,
    testbed: TestbedKind,
    executor: RemoteExecutor,
    timing: TimingConfig,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("testbed", &self.testbed)
            .finish()
    }
}

impl Node {
    /// Create a fabric node around a command runner
    pub fn new(
        runner: Box<dyn CommandRunner>,
        testbed: TestbedKind,
        timing: &TimingConfig,
    ) -> Self {
        let name = runner.name().to_string();
        let retry = RetryConfig::for_transport(
            timing.transport_retry_attempts,
            timing.transport_retry_delay,
        )
        .with_operation_name(format!("command on {}", name));

        Self {
            name,
            role: NodeRole::Fabric,
            testbed,
            executor: RemoteExecutor::new(runner, retry),
            timing: timing.clone(),
        }
    }

    pub fn with_role(mut self, role: NodeRole) -> Self {
        self.role = role;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn is_routing_peer(&self) -> bool {
        self.role == NodeRole::RoutingPeer
    }

    pub fn testbed(&self) -> TestbedKind {
        self.testbed
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    /// Run a command to completion, retrying dropped sessions
    pub async fn run_foreground(&self, command: &str) -> SystestResult<String> {
        self.executor.execute(command, ExecutionMode::Foreground).await
    }

    /// Run a command to completion exactly once, for launches that must not
    /// be repeated after a dropped session
    pub async fn run_single(&self, command: &str) -> SystestResult<String> {
        self.executor.run_once(command).await
    }

    /// Launch a command detached; it must redirect its own output
    pub async fn run_background(&self, command: &str) -> SystestResult<()> {
        self.executor.run_background(command).await
    }

    /// Single attempt, success means exit 0
    pub async fn probe(&self, command: &str) -> bool {
        match self.executor.run_once(command).await {
            Ok(_) => true,
            Err(e) => {
                debug!("Probe '{}' on {} not ready: {}", command, self.name, e);
                false
            }
        }
    }

    // Process lifecycle

    /// Launch the plugin; readiness is checked separately
    #[instrument(skip(self, fabric), fields(node = %self.name))]
    pub async fn start_plugin(&self, fabric: &FabricConfig, extra_args: &str) -> SystestResult<()> {
        info!("Starting netplugin on {}", self.name);
        self.run_background(&plugin_command(fabric, extra_args)).await
    }

    /// Signal the plugin to stop
    #[instrument(skip(self), fields(node = %self.name))]
    pub async fn stop_plugin(&self) -> SystestResult<()> {
        info!("Stopping netplugin on {}", self.name);
        self.run_foreground(&format!("sudo pkill {}", PLUGIN_PROCESS))
            .await
            .map(|_| ())
    }

    /// Launch the master; readiness is checked separately
    #[instrument(skip(self, fabric), fields(node = %self.name))]
    pub async fn start_master(&self, fabric: &FabricConfig) -> SystestResult<()> {
        info!("Starting netmaster on {}", self.name);
        self.run_background(&master_command(fabric)).await
    }

    /// Signal the master to stop
    #[instrument(skip(self), fields(node = %self.name))]
    pub async fn stop_master(&self) -> SystestResult<()> {
        info!("Stopping netmaster on {}", self.name);
        self.run_foreground(&format!("sudo pkill {}", MASTER_PROCESS))
            .await
            .map(|_| ())
    }

    /// Wait until `pgrep <process>` succeeds
    pub async fn wait_for_process(&self, process: &str) -> SystestResult<()> {
        let command = format!("pgrep {}", process);
        wait_until(
            || self.probe(&command),
            self.timing.process_poll_tick,
            self.timing.process_poll_timeout,
            format!("timeout reached trying to run {} on {:?}", command, self.name),
        )
        .await
    }

    /// Wait until `pgrep <process>` stops finding anything
    pub async fn wait_for_process_exit(&self, process: &str) -> SystestResult<()> {
        let command = format!("pgrep {}", process);
        wait_until(
            || async { !self.probe(&command).await },
            self.timing.process_exit_tick,
            self.timing.process_exit_timeout,
            format!("timeout reached waiting for {} to exit on {:?}", process, self.name),
        )
        .await
    }

    /// Wait until the plugin's introspection port is listening
    pub async fn wait_for_listeners(&self) -> SystestResult<()> {
        let command = format!("netstat -tlpn | grep {} | grep LISTEN", INSPECT_PORT);
        wait_until(
            || self.probe(&command),
            self.timing.listener_poll_tick,
            self.timing.listener_poll_timeout,
            format!(
                "timeout reached waiting for listener on port {} on {:?}",
                INSPECT_PORT, self.name
            ),
        )
        .await
    }

    // State cleanup

    #[instrument(skip(self), fields(node = %self.name))]
    pub async fn delete_remote_file(&self, path: &str) -> SystestResult<()> {
        let result = self.run_foreground(&format!("sudo rm {}", path)).await;
        self.best_effort("delete file", result)
    }

    /// Remove switch bridges, veth ports and the plugin socket
    ///
    /// On managed VMs docker is also restarted so it forgets the plugin.
    #[instrument(skip(self), fields(node = %self.name))]
    pub async fn cleanup_local_state(&self) -> SystestResult<()> {
        info!("Cleaning up local state on {}", self.name);
        for bridge in ["contivVxlanBridge", "contivVlanBridge"] {
            let result = self
                .run_foreground(&format!("sudo ovs-vsctl del-br {}", bridge))
                .await;
            self.best_effort("delete bridge", result)?;
        }

        let result = self.run_foreground(DELETE_VETH_PORTS).await;
        self.best_effort("delete veth ports", result)?;

        self.delete_remote_file(PLUGIN_SOCKET).await?;

        if self.testbed == TestbedKind::Vagrant {
            let result = self.run_foreground("sudo service docker restart").await;
            self.best_effort("restart docker", result)?;
        }
        Ok(())
    }

    /// Remove unit files and tools installed by the bare-metal packages
    pub async fn cleanup_installed_files(&self) -> SystestResult<()> {
        if self.testbed != TestbedKind::Baremetal {
            return Ok(());
        }
        for path in BAREMETAL_INSTALLED_FILES {
            self.delete_remote_file(path).await?;
        }
        Ok(())
    }

    /// Wipe every fabric key prefix from the cluster store
    #[instrument(skip(self, fabric), fields(node = %self.name))]
    pub async fn cleanup_cluster_state(&self, fabric: &FabricConfig) -> SystestResult<()> {
        info!("Cleaning up cluster store state from {}", self.name);
        for command in store_cleanup_commands(fabric.store_family()?) {
            let result = self.run_foreground(&command).await;
            self.best_effort("wipe store prefix", result)?;
        }
        Ok(())
    }

    /// Restart the cluster-store service on this host
    #[instrument(skip(self, fabric), fields(node = %self.name))]
    pub async fn restart_cluster_store(&self, fabric: &FabricConfig) -> SystestResult<()> {
        let service = fabric.store_family()?.service_name();
        info!("Restarting {} on {}", service, self.name);
        self.run_foreground(&format!("sudo systemctl stop {}", service))
            .await?;
        tokio::time::sleep(self.timing.store_restart_pause).await;
        self.run_foreground(&format!("sudo systemctl start {}", service))
            .await?;
        Ok(())
    }

    /// Kill and remove every container on the host
    pub async fn cleanup_containers(&self) -> SystestResult<()> {
        debug!("Cleaning up containers on {}", self.name);
        let result = self
            .run_foreground("docker kill -s 9 `docker ps -q`; docker rm -f `docker ps -a -q`")
            .await;
        self.best_effort("remove containers", result)
    }

    /// Remove fabric-managed docker networks
    pub async fn cleanup_docker_network(&self) -> SystestResult<()> {
        debug!("Cleaning up docker networks on {}", self.name);
        let result = self
            .run_foreground("docker network ls | grep netplugin | awk '{print $2}'")
            .await;
        let networks = match output_of(result)? {
            out if out.trim().is_empty() => return Ok(()),
            out => out,
        };
        for network in networks.lines().map(str::trim).filter(|n| !n.is_empty()) {
            let result = self
                .run_foreground(&format!("docker network rm {}", network))
                .await;
            self.best_effort("remove docker network", result)?;
        }
        Ok(())
    }

    /// Whether the fabric has created the docker network `name`
    pub async fn check_docker_network_created(&self, name: &str) -> SystestResult<bool> {
        let out = output_of(
            self.run_foreground(&format!("docker network ls | grep netplugin | grep {}", name))
                .await,
        )?;
        Ok(out.lines().any(|line| line.contains(name)))
    }

    // Logs

    /// Remove log files left over from an earlier run
    pub async fn remove_stale_logs(&self) -> SystestResult<()> {
        let result = self.run_foreground("sudo rm /tmp/net*").await;
        self.best_effort("remove stale logs", result)
    }

    /// Move `/tmp/<process>.log` aside under a timestamped name
    pub async fn rotate_log(&self, process: &str) -> SystestResult<()> {
        let result = self
            .run_foreground(&rotate_log_command(process))
            .await;
        self.best_effort("rotate log", result)
    }

    /// Fail if the live fabric logs carry panic or fatal lines.
    ///
    /// Lines mentioning `error` are logged but do not fail the check.
    pub async fn check_for_errors(&self) -> SystestResult<()> {
        let errors = grep_lines(
            output_of(
                self.run_foreground(r#"for i in /tmp/net*; do grep "error" $i; done"#)
                    .await,
            )?,
        );
        for line in &errors {
            debug!("{}: {}", self.name, line);
        }

        let fatal = grep_lines(
            output_of(
                self.run_foreground(r#"for i in /tmp/net*; do grep "panic\|fatal" $i; done"#)
                    .await,
            )?,
        );
        if fatal.is_empty() {
            return Ok(());
        }
        for line in &fatal {
            warn!("{}: {}", self.name, line);
        }
        Err(SystestError::LogMarkers {
            node: self.name.clone(),
            lines: fatal,
        })
    }

    /// Collect `error|fatal|panic` lines from the rotated logs
    pub async fn scan_log_markers(&self) -> SystestResult<Vec<String>> {
        let out = output_of(
            self.run_foreground(r#"for i in /tmp/_net*; do grep "error\|fatal\|panic" $i; done"#)
                .await,
        )?;
        Ok(grep_lines(out))
    }

    // Network

    /// First IPv4 address configured on `dev`
    pub async fn get_interface_address(&self, dev: &str) -> SystestResult<String> {
        let out = self
            .run_foreground(&format!("ip addr show dev {} | grep inet | head -1", dev))
            .await?;
        parse_inet_line(&out).ok_or_else(|| SystestError::Parse {
            node: self.name.clone(),
            output: out,
        })
    }

    /// Ping `address` from the host
    pub async fn check_ping(&self, address: &str) -> SystestResult<()> {
        self.check_ping_with_count(address, 1).await
    }

    pub async fn check_ping_with_count(&self, address: &str, count: u32) -> SystestResult<()> {
        let command = format!("ping -c {} {}", count, address);
        let out = self.run_foreground(&command).await?;
        if ping_lost(&out) {
            return Err(SystestError::command_failed(&self.name, command, None, out));
        }
        debug!("Ping from {} to {} succeeded", self.name, address);
        Ok(())
    }

    /// Pull a container image
    pub async fn pull_image(&self, image: &str) -> SystestResult<()> {
        self.run_foreground(&format!("docker pull {}", image))
            .await
            .map(|_| ())
    }

    fn best_effort(&self, what: &str, result: SystestResult<String>) -> SystestResult<()> {
        match result {
            Ok(_) => Ok(()),
            Err(SystestError::CommandFailed {
                command, exit_code, ..
            }) => {
                debug!(
                    "{} on {}: '{}' exited {:?}, ignoring",
                    what, self.name, command, exit_code
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Output of a command whether or not it exited zero
///
/// `grep` exits non-zero on no match, which for a scan just means "nothing".
pub(crate) fn output_of(result: SystestResult<String>) -> SystestResult<String> {
    match result {
        Ok(output) => Ok(output),
        Err(SystestError::CommandFailed { output, .. }) => Ok(output),
        Err(e) => Err(e),
    }
}

fn grep_lines(output: String) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

pub fn plugin_command(fabric: &FabricConfig, extra_args: &str) -> String {
    format!(
        "sudo {}/netplugin -plugin-mode docker -vlan-if {} --cluster-store {} {}\
         &> /tmp/netplugin.log",
        fabric.binpath, fabric.vlan_if, fabric.cluster_store, extra_args
    )
}

pub fn master_command(fabric: &FabricConfig) -> String {
    format!(
        "sudo {}/netmaster --dns-enable={}  --cluster-store {} &> /tmp/netmaster.log",
        fabric.binpath, fabric.enable_dns, fabric.cluster_store
    )
}

pub fn rotate_log_command(process: &str) -> String {
    format!(
        "mv /tmp/{p}.log /tmp/_{p}-`date +%s`.log",
        p = process
    )
}

pub fn store_cleanup_commands(family: StoreFamily) -> Vec<String> {
    match family {
        StoreFamily::Etcd => ETCD_PREFIXES
            .iter()
            .map(|prefix| format!("etcdctl rm --recursive {}", prefix))
            .collect(),
        StoreFamily::Consul => CONSUL_PREFIXES
            .iter()
            .map(|prefix| {
                format!(
                    "curl -X DELETE localhost:{}/v1/kv/{}?recurse=true",
                    CONSUL_HTTP_PORT, prefix
                )
            })
            .collect(),
    }
}

/// Address part of an `inet a.b.c.d/len ...` line
pub fn parse_inet_line(line: &str) -> Option<String> {
    let mut tokens = line.split_whitespace();
    tokens.next()?;
    let cidr = tokens.next()?;
    cidr.split('/')
        .next()
        .filter(|addr| !addr.is_empty())
        .map(String::from)
}

fn ping_lost(output: &str) -> bool {
    output.contains("0 received, 100% packet loss")
}
