//! Local process plumbing shared by the testbed backends
//!
//! Both backends reach their hosts by running a local client (`vagrant ssh`
//! or `ssh`). [`LocalExecutor`] is the seam: the system implementation runs
//! real processes, tests substitute a scripted one.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use systest_core::error::{SystestError, SystestResult};
use tokio::process::Command;
use tracing::debug;

/// Exit status the ssh client reserves for its own connection failures
pub const SSH_TRANSPORT_EXIT: i32 = 255;

/// Runs local programs
#[async_trait]
pub trait LocalExecutor: Send + Sync {
    async fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> Result<CommandOutput, std::io::Error>;
}

/// Result of a finished local process
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: Vec::new(),
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: Vec::new(),
            stderr: stderr.into(),
        }
    }

    /// stdout followed by stderr, lossily decoded
    pub fn combined(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&self.stderr));
        text
    }
}

/// Executor that runs real processes
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandExecutor;

#[async_trait]
impl LocalExecutor for SystemCommandExecutor {
    async fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> Result<CommandOutput, std::io::Error> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let output = cmd.output().await?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Map a finished remote-client process onto the engine's error taxonomy
///
/// The client's own connection failures (exit 255) become transport errors;
/// anything else non-zero is the remote command's failure.
pub fn classify_output(node: &str, command: &str, output: CommandOutput) -> SystestResult<String> {
    let text = output.combined();
    match output.exit_code {
        Some(0) => Ok(text),
        Some(SSH_TRANSPORT_EXIT) => {
            debug!("Transport failure on {}: {}", node, text.trim());
            Err(SystestError::transport(node, text.trim()))
        }
        code => Err(SystestError::command_failed(node, command, code, text)),
    }
}

/// Quote `s` for a POSIX shell as a single word
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Wrap a command so it keeps running after the session closes
pub fn detached(command: &str) -> String {
    format!("nohup bash -c {} > /dev/null 2>&1 &", shell_quote(command))
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// One recorded local invocation
    #[derive(Debug, Clone)]
    pub struct LocalCall {
        pub program: String,
        pub args: Vec<String>,
        pub cwd: Option<std::path::PathBuf>,
    }

    /// Scripted executor: replies are consumed in order, then success
    #[derive(Default)]
    pub struct MockLocalExecutor {
        replies: Mutex<VecDeque<CommandOutput>>,
        calls: Mutex<Vec<LocalCall>>,
    }

    impl MockLocalExecutor {
        pub fn reply(&self, output: CommandOutput) -> &Self {
            self.replies.lock().unwrap().push_back(output);
            self
        }

        pub fn calls(&self) -> Vec<LocalCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LocalExecutor for MockLocalExecutor {
        async fn execute(
            &self,
            program: &str,
            args: &[String],
            cwd: Option<&Path>,
        ) -> Result<CommandOutput, std::io::Error> {
            self.calls.lock().unwrap().push(LocalCall {
                program: program.to_string(),
                args: args.to_vec(),
                cwd: cwd.map(Path::to_path_buf),
            });
            Ok(self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| CommandOutput::success("")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_output() {
        assert_eq!(
            classify_output("n1", "true", CommandOutput::success("ok\n")).unwrap(),
            "ok\n"
        );

        let err = classify_output(
            "n1",
            "true",
            CommandOutput::failure(255, "Connection reset by peer"),
        )
        .unwrap_err();
        assert!(err.is_transient());

        let err = classify_output("n1", "pgrep netplugin", CommandOutput::failure(1, ""))
            .unwrap_err();
        assert!(matches!(
            err,
            SystestError::CommandFailed {
                exit_code: Some(1),
                ..
            }
        ));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("echo hi"), "'echo hi'");
        assert_eq!(shell_quote("awk '{print $1}'"), r"'awk '\''{print $1}'\'''");
    }

    #[test]
    fn test_detached() {
        assert_eq!(
            detached("sudo netmaster &> /tmp/netmaster.log"),
            "nohup bash -c 'sudo netmaster &> /tmp/netmaster.log' > /dev/null 2>&1 &"
        );
    }

    #[tokio::test]
    async fn test_system_executor_runs_process() {
        let out = SystemCommandExecutor
            .execute("sh", &["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()], None)
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.combined(), "out\nerr\n");
    }

    #[tokio::test]
    async fn test_system_executor_honours_cwd() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Vagrantfile"), "").unwrap();

        let out = SystemCommandExecutor
            .execute("ls", &[], Some(dir.path()))
            .await
            .unwrap();
        assert!(out.combined().contains("Vagrantfile"));
    }
}
