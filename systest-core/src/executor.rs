//! Remote command execution with transport retry

use crate::abstractions::CommandRunner;
use crate::error::SystestResult;
use crate::patterns::{retry, RetryConfig};

use tracing::{debug, instrument};

/// Whether a command blocks until it completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Foreground,
    Background,
}

/// Runs commands on one host through its [`CommandRunner`].
///
/// Foreground commands are retried while the failure is a dropped session;
/// a non-zero exit is returned to the caller untouched. Background commands
/// are handed over once and never retried, since a second launch could
/// start a duplicate process.
pub struct RemoteExecutor {
    runner: Box<dyn CommandRunner>,
    retry: RetryConfig,
}

impl RemoteExecutor {
    pub fn new(runner: Box<dyn CommandRunner>, retry: RetryConfig) -> Self {
        Self { runner, retry }
    }

    pub fn node_name(&self) -> &str {
        self.runner.name()
    }

    /// Run `command` in the given mode; background commands yield empty output
    pub async fn execute(&self, command: &str, mode: ExecutionMode) -> SystestResult<String> {
        match mode {
            ExecutionMode::Foreground => self.run(command).await,
            ExecutionMode::Background => self.run_background(command).await.map(|_| String::new()),
        }
    }

    /// Run to completion, retrying transient transport failures
    #[instrument(skip(self), fields(node = %self.runner.name()))]
    pub async fn run(&self, command: &str) -> SystestResult<String> {
        debug!("Running: {}", command);
        retry(&self.retry, || self.runner.run(command)).await
    }

    /// Run to completion exactly once; used by readiness probes, which
    /// already repeat on their own schedule
    pub async fn run_once(&self, command: &str) -> SystestResult<String> {
        self.runner.run(command).await
    }

    /// Launch detached
    #[instrument(skip(self), fields(node = %self.runner.name()))]
    pub async fn run_background(&self, command: &str) -> SystestResult<()> {
        debug!("Launching in background: {}", command);
        self.runner.run_background(command).await
    }
}
