pub mod baremetal;
pub mod process;
pub mod registry;
pub mod ssh;
pub mod vagrant;

pub use baremetal::BaremetalTestbed;
pub use process::{CommandOutput, LocalExecutor, SystemCommandExecutor};
pub use registry::{TestbedFactory, TestbedRegistry};
pub use ssh::SshRunner;
pub use vagrant::{VagrantRunner, VagrantTestbed};

// Re-export core types for convenience
pub use systest_core::{
    config::{SuiteConfig, TestbedKind},
    error::{SystestError, SystestResult},
    Cluster, Node,
};
