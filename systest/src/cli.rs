//! Command-line interface
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then flags (each of which may also come from its environment variable).

use crate::scenarios::DEFAULT_VTEP_INTERFACE;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use systest_core::config::{
    ForwardingMode, Scheduler, SuiteConfig, TestbedConfig, TestbedKind, DEFAULT_BAREMETAL_BINPATH,
    DEFAULT_BINPATH,
};
use systest_core::SystestResult;

/// Value of `ACI_SYS_TEST_MODE` that selects the bare-metal testbed
pub const ACI_MODE_ON: &str = "ON";

#[derive(Debug, Parser)]
#[command(name = "systest")]
#[command(about = "System tests for the netplugin container-networking fabric", long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, short, global = true, env = "SYSTEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub fabric: FabricArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Fabric and testbed overrides
#[derive(Debug, Default, Args)]
pub struct FabricArgs {
    /// Number of fabric nodes expected on a vagrant testbed
    #[arg(long, global = true, env = "CONTIV_NODES")]
    pub nodes: Option<usize>,

    /// Cluster store URL
    #[arg(long, global = true, env = "CONTIV_CLUSTER_STORE")]
    pub cluster_store: Option<String>,

    /// Any non-empty value selects routing mode
    #[arg(long, global = true, env = "CONTIV_L3")]
    pub l3: Option<String>,

    /// Forwarding mode, overrides --l3
    #[arg(long, global = true, value_parser = parse_fwd_mode)]
    pub fwd_mode: Option<ForwardingMode>,

    /// Any non-empty value selects the k8 scheduler
    #[arg(long, global = true, env = "CONTIV_K8")]
    pub k8: Option<String>,

    /// `ON` runs against bare-metal hosts
    #[arg(long, global = true, env = "ACI_SYS_TEST_MODE")]
    pub aci_mode: Option<String>,

    /// Data interface handed to netplugin on bare-metal hosts
    #[arg(long, global = true, env = "HOST_DATA_INTERFACE")]
    pub vlan_if: Option<String>,

    /// ssh private key for bare-metal hosts
    #[arg(long, global = true, env = "KEY_FILE")]
    pub key_file: Option<PathBuf>,

    /// Bare-metal host addresses, comma separated
    #[arg(long, global = true, env = "HOST_IPS", value_delimiter = ',')]
    pub host_ips: Vec<String>,

    /// Bare-metal login names, one per address
    #[arg(long, global = true, env = "HOST_USER_NAMES", value_delimiter = ',')]
    pub host_users: Vec<String>,

    /// Directory holding the fabric binaries on each node
    #[arg(long, global = true)]
    pub binpath: Option<String>,

    /// Start netmaster with DNS service discovery
    #[arg(long, global = true)]
    pub dns_enable: Option<bool>,

    /// Directory containing the Vagrantfile
    #[arg(long, global = true)]
    pub vagrant_dir: Option<PathBuf>,

    /// netmaster REST endpoint
    #[arg(long, global = true)]
    pub control_plane_url: Option<String>,

    /// Set when running host-only unit tests; the system tests are skipped
    #[arg(long, global = true, env = "HOST_TEST")]
    pub host_test: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the system-test suite
    Run(RunArgs),
    /// Check that every node answers a trivial command
    CheckSsh,
    /// Verify the tunnel endpoints one node knows about
    VerifyVteps {
        /// Node to inspect
        #[arg(long)]
        node: String,

        /// Expected VTEP addresses, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        expect: Vec<String>,
    },
    /// Verify endpoint tokens appear in one node's driver state
    VerifyEps {
        #[arg(long)]
        node: String,

        #[arg(long, value_delimiter = ',', required = true)]
        expect: Vec<String>,
    },
    /// Print error, fatal and panic lines from rotated fabric logs
    ScanLogs,
    /// Print the merged configuration as TOML
    ShowConfig,
    /// List testbed backends
    ListTestbeds,
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Run(_) => "run",
            Commands::CheckSsh => "check-ssh",
            Commands::VerifyVteps { .. } => "verify-vteps",
            Commands::VerifyEps { .. } => "verify-eps",
            Commands::ScanLogs => "scan-logs",
            Commands::ShowConfig => "show-config",
            Commands::ListTestbeds => "list-testbeds",
        }
    }
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Quick validation run, one iteration per case
    #[arg(long)]
    pub short: bool,

    /// Iterations for repeated cases
    #[arg(long)]
    pub iterations: Option<u32>,

    /// Containers launched per node
    #[arg(long)]
    pub containers: Option<u32>,

    /// Only run cases whose name contains this text
    #[arg(long)]
    pub filter: Option<String>,

    /// Interface carrying each node's tunnel endpoint address
    #[arg(long, default_value = DEFAULT_VTEP_INTERFACE)]
    pub vtep_if: String,
}

impl RunArgs {
    pub fn apply(&self, config: &mut SuiteConfig) {
        if self.short {
            config.run.short = true;
        }
        if let Some(iterations) = self.iterations {
            config.run.iterations = iterations;
        }
        if let Some(containers) = self.containers {
            config.run.containers = containers;
        }
    }
}

fn parse_fwd_mode(s: &str) -> Result<ForwardingMode, String> {
    ForwardingMode::from_str(s).map_err(|e| e.to_string())
}

fn is_set(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

impl FabricArgs {
    pub fn host_test_requested(&self) -> bool {
        is_set(&self.host_test)
    }

    pub fn aci_mode_requested(&self) -> bool {
        self.aci_mode.as_deref() == Some(ACI_MODE_ON)
    }

    /// Apply every override that was given
    pub fn apply(&self, config: &mut SuiteConfig) -> SystestResult<()> {
        let fabric = &mut config.fabric;
        let testbed = &mut config.testbed;

        if let Some(store) = &self.cluster_store {
            fabric.cluster_store = store.clone();
        }
        if is_set(&self.l3) {
            fabric.fwd_mode = ForwardingMode::Routing;
        }
        if let Some(mode) = self.fwd_mode {
            fabric.fwd_mode = mode;
        }
        if is_set(&self.k8) {
            fabric.scheduler = Some(Scheduler::K8);
        }
        if let Some(enable) = self.dns_enable {
            fabric.enable_dns = enable;
        }

        if self.aci_mode_requested() {
            testbed.kind = TestbedKind::Baremetal;
            if fabric.binpath == DEFAULT_BINPATH {
                fabric.binpath = DEFAULT_BAREMETAL_BINPATH.to_string();
            }
            if let Some(vlan_if) = &self.vlan_if {
                fabric.vlan_if = vlan_if.clone();
            }
        }
        if let Some(binpath) = &self.binpath {
            fabric.binpath = binpath.clone();
        }

        if let Some(nodes) = self.nodes {
            testbed.node_count = nodes;
        }
        if let Some(key_file) = &self.key_file {
            testbed.key_file = key_file.clone();
        }
        if !self.host_ips.is_empty() || !self.host_users.is_empty() {
            testbed.hosts = TestbedConfig::hosts_from_lists(&self.host_ips, &self.host_users)?;
        }
        if let Some(dir) = &self.vagrant_dir {
            testbed.vagrant_dir = dir.clone();
        }
        if let Some(url) = &self.control_plane_url {
            testbed.control_plane_url = url.clone();
        }
        Ok(())
    }
}

impl Cli {
    /// Defaults, then the config file, then flags; validated
    pub fn build_config(&self) -> SystestResult<SuiteConfig> {
        let mut config = match &self.config {
            Some(path) => SuiteConfig::load(path)?,
            None => SuiteConfig::default(),
        };

        self.fabric.apply(&mut config)?;
        if let Commands::Run(run) = &self.command {
            run.apply(&mut config);
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use systest_core::config::{FabricConfig, StoreFamily};

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("systest").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_run_flags() {
        let cli = parse(&["run", "--short", "--iterations", "5", "--filter", "Tunnel"]);
        let Commands::Run(run) = &cli.command else {
            panic!("expected run");
        };
        assert!(run.short);
        assert_eq!(run.filter.as_deref(), Some("Tunnel"));
        assert_eq!(run.vtep_if, "eth1");

        let mut config = SuiteConfig::default();
        run.apply(&mut config);
        assert_eq!(config.run.iterations, 5);
        assert!(config.run.short);
        assert_eq!(config.run.containers, 3);
    }

    #[test]
    fn test_fabric_overrides() {
        let args = FabricArgs {
            cluster_store: Some("consul://localhost:8500".into()),
            l3: Some("1".into()),
            k8: Some("1".into()),
            dns_enable: Some(true),
            ..Default::default()
        };
        let mut config = SuiteConfig::default();
        args.apply(&mut config).unwrap();

        assert_eq!(config.fabric.store_family().unwrap(), StoreFamily::Consul);
        assert_eq!(config.fabric.fwd_mode, ForwardingMode::Routing);
        assert_eq!(config.fabric.scheduler, Some(Scheduler::K8));
        assert!(config.fabric.enable_dns);
    }

    #[test]
    fn test_empty_env_values_are_unset() {
        let args = FabricArgs {
            l3: Some(String::new()),
            host_test: Some(" ".into()),
            ..Default::default()
        };
        let mut config = SuiteConfig::default();
        args.apply(&mut config).unwrap();

        assert_eq!(config.fabric.fwd_mode, ForwardingMode::Bridge);
        assert!(!args.host_test_requested());
    }

    #[test]
    fn test_fwd_mode_flag_wins_over_l3() {
        let args = FabricArgs {
            l3: Some("1".into()),
            fwd_mode: Some(ForwardingMode::Bridge),
            ..Default::default()
        };
        let mut config = SuiteConfig::default();
        args.apply(&mut config).unwrap();
        assert_eq!(config.fabric.fwd_mode, ForwardingMode::Bridge);
    }

    #[test]
    fn test_aci_mode_selects_baremetal() {
        let args = FabricArgs {
            aci_mode: Some("ON".into()),
            host_ips: vec!["10.0.0.1".into(), "10.0.0.2".into()],
            host_users: vec!["admin".into(), "admin".into()],
            vlan_if: Some("eth3".into()),
            ..Default::default()
        };
        let mut config = SuiteConfig::default();
        args.apply(&mut config).unwrap();

        assert_eq!(config.testbed.kind, TestbedKind::Baremetal);
        assert_eq!(config.fabric.binpath, DEFAULT_BAREMETAL_BINPATH);
        assert_eq!(config.fabric.vlan_if, "eth3");
        assert_eq!(config.testbed.hosts.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_data_interface_only_in_aci_mode() {
        let args = FabricArgs {
            vlan_if: Some("eth3".into()),
            ..Default::default()
        };
        let mut config = SuiteConfig::default();
        args.apply(&mut config).unwrap();
        assert_eq!(config.fabric.vlan_if, FabricConfig::default().vlan_if);
        assert_eq!(config.testbed.kind, TestbedKind::Vagrant);
    }

    #[test]
    fn test_explicit_binpath_survives_aci_mode() {
        let args = FabricArgs {
            aci_mode: Some("ON".into()),
            binpath: Some("/usr/local/bin".into()),
            ..Default::default()
        };
        let mut config = SuiteConfig::default();
        args.apply(&mut config).unwrap();
        assert_eq!(config.fabric.binpath, "/usr/local/bin");
    }

    #[test]
    fn test_mismatched_host_lists() {
        let args = FabricArgs {
            host_ips: vec!["10.0.0.1".into()],
            ..Default::default()
        };
        assert!(args.apply(&mut SuiteConfig::default()).is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[fabric]\nbinpath = \"/srv/bin\"\nvlan_if = \"eth5\"\n\n[run]\niterations = 7\n"
        )
        .unwrap();

        let mut cli = parse(&["run", "--containers", "1"]);
        cli.config = Some(file.path().to_path_buf());
        cli.fabric = FabricArgs {
            cluster_store: Some("consul://localhost:8500".into()),
            ..Default::default()
        };

        let config = cli.build_config().unwrap();
        assert_eq!(config.fabric.binpath, "/srv/bin");
        assert_eq!(config.fabric.vlan_if, "eth5");
        assert_eq!(config.fabric.cluster_store, "consul://localhost:8500");
        assert_eq!(config.run.iterations, 7);
        assert_eq!(config.run.containers, 1);
    }

    #[test]
    fn test_verify_vteps_requires_expectation() {
        let result = Cli::try_parse_from(["systest", "verify-vteps", "--node", "netplugin-node1"]);
        assert!(result.is_err());

        let cli = parse(&[
            "verify-vteps",
            "--node",
            "netplugin-node1",
            "--expect",
            "10.0.0.1,10.0.0.2",
        ]);
        match cli.command {
            Commands::VerifyVteps { node, expect } => {
                assert_eq!(node, "netplugin-node1");
                assert_eq!(expect, vec!["10.0.0.1", "10.0.0.2"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
