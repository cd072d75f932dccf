pub mod abstractions;
pub mod cluster;
pub mod config;
pub mod container;
pub mod error;
pub mod executor;
pub mod node;
pub mod patterns;
pub mod poller;
pub mod suite;
pub mod verifier;

pub use abstractions::{CommandRunner, ControlPlaneClient, HttpControlPlaneClient};
pub use cluster::{Cluster, LogFindings, Phase};
pub use config::{SuiteConfig, SuiteConfigBuilder};
pub use container::{Container, ContainerSpec};
pub use error::{SystestError, SystestResult};
pub use node::{Node, NodeRole};
pub use suite::{CaseOutcome, CaseReport, Scenario, Suite, SuiteReport};
