//! Default configuration values for the system-test engine
//!
//! This module centralizes all default values to make them easy to find and modify.

use std::time::Duration;

// Fabric defaults
pub const DEFAULT_BINPATH: &str = "/opt/gopath/bin";
pub const DEFAULT_BAREMETAL_BINPATH: &str = "/home/admin/bin";
pub const DEFAULT_VLAN_IF: &str = "eth2";
pub const DEFAULT_CLUSTER_STORE: &str = "etcd://localhost:2379";
pub const DEFAULT_ROUTING_VLAN_IF: &str = "eth2";

// Ports on each node
pub const INSPECT_PORT: u16 = 9090;
pub const CONSUL_HTTP_PORT: u16 = 8500;
pub const DEFAULT_CONTROL_PLANE_URL: &str = "http://localhost:9999";
pub const DEFAULT_TENANT: &str = "default";

// Testbed defaults
pub const DEFAULT_NODE_COUNT: usize = 2;
pub const DEFAULT_ROUTING_PEER_COUNT: usize = 2;
pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_KEY_FILE: &str = "/home/admin/.ssh/id_rsa";
pub const DEFAULT_VAGRANT_DIR: &str = ".";
pub const FABRIC_NODE_MARKER: &str = "netplugin-node";
pub const BAREMETAL_NODE_PREFIX: &str = "aci-swarm-node";

// Run defaults
pub const DEFAULT_ITERATIONS: u32 = 3;
pub const DEFAULT_CONTAINERS: u32 = 3;

// Readiness polling
pub const DEFAULT_PROCESS_POLL_TICK: Duration = Duration::from_millis(10);
pub const DEFAULT_PROCESS_POLL_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_PROCESS_EXIT_TICK: Duration = Duration::from_millis(100);
pub const DEFAULT_PROCESS_EXIT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_LISTENER_POLL_TICK: Duration = Duration::from_millis(500);
pub const DEFAULT_LISTENER_POLL_TIMEOUT: Duration = Duration::from_secs(50);

// Settle delays. There is no observable readiness signal at these points:
// netmaster must not attach before every netplugin has finished its initial
// sync with the store, and the REST server takes a moment after the process
// appears before it accepts requests.
pub const DEFAULT_DATA_PLANE_SETTLE: Duration = Duration::from_secs(15);
pub const DEFAULT_MASTER_START_PAUSE: Duration = Duration::from_secs(1);
pub const DEFAULT_CONTROL_PLANE_SETTLE: Duration = Duration::from_secs(5);

// Control-plane reachability
pub const DEFAULT_CONTROL_PLANE_ATTEMPTS: u32 = 11;
pub const DEFAULT_CONTROL_PLANE_SPACING: Duration = Duration::from_millis(500);
pub const DEFAULT_CONTROL_PLANE_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

// Transport retry
pub const DEFAULT_TRANSPORT_RETRY_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_TRANSPORT_RETRY_ATTEMPTS: u32 = 50;

// Cluster store
pub const DEFAULT_STORE_RESTART_PAUSE: Duration = Duration::from_secs(5);
