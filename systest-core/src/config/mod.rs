//! Configuration for a system-test run
//!
//! A [`SuiteConfig`] is built once (from defaults, a TOML file, or the CLI)
//! and threaded by value into the cluster. Nothing in the engine reads
//! configuration from globals or the environment.

use crate::error::{SystestError, SystestResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod defaults;
pub mod fabric;
pub mod testbed;
pub mod timing;

pub use defaults::*;
pub use fabric::{FabricConfig, ForwardingMode, Scheduler, StoreFamily};
pub use testbed::{HostConfig, TestbedConfig, TestbedKind};
pub use timing::TimingConfig;

/// Per-run knobs consumed by the scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Number of iterations for repeated scenarios
    pub iterations: u32,

    /// Number of containers scenarios launch per node
    pub containers: u32,

    /// Quick validation run instead of the full suite
    pub short: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            containers: DEFAULT_CONTAINERS,
            short: false,
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    pub fabric: FabricConfig,
    pub timing: TimingConfig,
    pub testbed: TestbedConfig,
    pub run: RunConfig,
}

impl SuiteConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate configuration from a TOML file; missing sections
    /// keep defaults
    pub fn from_file(path: impl AsRef<Path>) -> SystestResult<Self> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file without validating, for callers that layer further
    /// overrides on top
    pub fn load(path: impl AsRef<Path>) -> SystestResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SystestError::configuration(
                "file",
                format!("failed to read {}: {}", path.display(), e),
            )
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> SystestResult<Self> {
        let config: SuiteConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> SystestResult<()> {
        self.fabric.validate()?;
        self.timing.validate()?;
        self.testbed.validate()?;
        if self.run.iterations == 0 {
            return Err(SystestError::configuration(
                "run.iterations",
                "iterations must be non-zero",
            ));
        }
        Ok(())
    }

    /// Configuration with collapsed timings, for tests
    pub fn test() -> Self {
        Self {
            timing: TimingConfig::immediate(),
            ..Self::default()
        }
    }
}

/// Builder for SuiteConfig
pub struct SuiteConfigBuilder {
    config: SuiteConfig,
}

impl SuiteConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SuiteConfig::default(),
        }
    }

    pub fn fwd_mode(mut self, mode: ForwardingMode) -> Self {
        self.config.fabric.fwd_mode = mode;
        self
    }

    pub fn cluster_store(mut self, url: impl Into<String>) -> Self {
        self.config.fabric.cluster_store = url.into();
        self
    }

    pub fn binpath(mut self, path: impl Into<String>) -> Self {
        self.config.fabric.binpath = path.into();
        self
    }

    pub fn vlan_if(mut self, vlan_if: impl Into<String>) -> Self {
        self.config.fabric.vlan_if = vlan_if.into();
        self
    }

    pub fn enable_dns(mut self, enable: bool) -> Self {
        self.config.fabric.enable_dns = enable;
        self
    }

    pub fn scheduler(mut self, scheduler: Option<Scheduler>) -> Self {
        self.config.fabric.scheduler = scheduler;
        self
    }

    pub fn timing(mut self, timing: TimingConfig) -> Self {
        self.config.timing = timing;
        self
    }

    pub fn testbed(mut self, testbed: TestbedConfig) -> Self {
        self.config.testbed = testbed;
        self
    }

    pub fn run(mut self, run: RunConfig) -> Self {
        self.config.run = run;
        self
    }

    pub fn build(self) -> SystestResult<SuiteConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for SuiteConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
