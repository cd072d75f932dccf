pub mod cli;
pub mod commands;
pub mod observability;
pub mod scenarios;

// Re-export commonly used types
pub use systest_core::{
    config::SuiteConfig,
    error::{SystestError, SystestResult},
    suite::{Suite, SuiteReport},
    Cluster,
};

pub use systest_testbed::TestbedRegistry;
