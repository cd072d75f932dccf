//! Direct ssh access to a bare-metal host

use crate::process::{classify_output, detached, LocalExecutor};

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use systest_core::abstractions::CommandRunner;
use systest_core::config::HostConfig;
use systest_core::error::{SystestError, SystestResult};
use tracing::debug;

/// Runs commands on one host through the local ssh client
pub struct SshRunner {
    host: HostConfig,
    key_file: PathBuf,
    executor: Arc<dyn LocalExecutor>,
}

impl SshRunner {
    pub fn new(host: HostConfig, key_file: PathBuf, executor: Arc<dyn LocalExecutor>) -> Self {
        Self {
            host,
            key_file,
            executor,
        }
    }

    pub fn host(&self) -> &HostConfig {
        &self.host
    }

    fn ssh_args(&self, command: &str) -> Vec<String> {
        vec![
            "-i".to_string(),
            self.key_file.display().to_string(),
            "-p".to_string(),
            self.host.port.to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "LogLevel=ERROR".to_string(),
            format!("{}@{}", self.host.user, self.host.address),
            "--".to_string(),
            command.to_string(),
        ]
    }

    async fn ssh(&self, command: &str) -> SystestResult<String> {
        let output = self
            .executor
            .execute("ssh", &self.ssh_args(command), None)
            .await
            .map_err(|e| {
                SystestError::transport(&self.host.name, format!("failed to run ssh: {}", e))
            })?;
        classify_output(&self.host.name, command, output)
    }
}

#[async_trait]
impl CommandRunner for SshRunner {
    fn name(&self) -> &str {
        &self.host.name
    }

    async fn run(&self, command: &str) -> SystestResult<String> {
        debug!("ssh {}@{}: {}", self.host.user, self.host.address, command);
        self.ssh(command).await
    }

    async fn run_background(&self, command: &str) -> SystestResult<()> {
        self.ssh(&detached(command)).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::mock::MockLocalExecutor;
    use crate::process::CommandOutput;
    use pretty_assertions::assert_eq;

    fn host() -> HostConfig {
        HostConfig {
            name: "aci-swarm-node1".to_string(),
            address: "10.193.246.1".to_string(),
            port: 22,
            user: "admin".to_string(),
        }
    }

    #[tokio::test]
    async fn test_run_builds_ssh_invocation() {
        let executor = Arc::new(MockLocalExecutor::default());
        executor.reply(CommandOutput::success("1234\n"));
        let runner = SshRunner::new(
            host(),
            PathBuf::from("/home/admin/.ssh/id_rsa"),
            executor.clone(),
        );

        assert_eq!(runner.run("pgrep netplugin").await.unwrap(), "1234\n");

        let call = &executor.calls()[0];
        assert_eq!(call.program, "ssh");
        assert_eq!(call.args[1], "/home/admin/.ssh/id_rsa");
        assert_eq!(call.args[call.args.len() - 2], "--");
        assert_eq!(call.args.last().unwrap(), "pgrep netplugin");
        assert!(call.args.contains(&"admin@10.193.246.1".to_string()));
    }

    #[tokio::test]
    async fn test_connection_failure_is_transport() {
        let executor = Arc::new(MockLocalExecutor::default());
        executor.reply(CommandOutput::failure(255, "ssh: connect to host: EOF"));
        let runner = SshRunner::new(host(), PathBuf::from("key"), executor);

        assert!(runner.run("true").await.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn test_background_is_detached() {
        let executor = Arc::new(MockLocalExecutor::default());
        let runner = SshRunner::new(host(), PathBuf::from("key"), executor.clone());

        runner
            .run_background("sudo /home/admin/bin/netmaster &> /tmp/netmaster.log")
            .await
            .unwrap();

        assert_eq!(
            executor.calls()[0].args.last().unwrap(),
            "nohup bash -c 'sudo /home/admin/bin/netmaster &> /tmp/netmaster.log' > /dev/null 2>&1 &"
        );
    }
}
