//! Remote command capability
//!
//! A [`CommandRunner`] is the only thing the engine needs from a testbed
//! backend: run a shell command on one specific host, either to completion
//! or detached. Vagrant VMs, bare-metal ssh hosts and the scripted mock all
//! implement it; the rest of the engine never learns which one it has.

use crate::error::{SystestError, SystestResult};

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

/// Execution capability for a single cluster host
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Host name as known to the testbed
    fn name(&self) -> &str;

    /// Run a shell command to completion.
    ///
    /// Returns the combined output on exit status 0. A non-zero exit is
    /// [`SystestError::CommandFailed`] carrying the output; a broken session
    /// is [`SystestError::Transport`].
    async fn run(&self, command: &str) -> SystestResult<String>;

    /// Launch a shell command detached from the session and return once it
    /// has been handed to the remote host.
    async fn run_background(&self, command: &str) -> SystestResult<()>;
}

/// How a [`MockCommandRunner`] answers a matching command
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Exit 0 with this output
    Output(String),
    /// Non-zero exit with this output
    Fail { exit_code: i32, output: String },
    /// Broken session with this message
    Transport(String),
}

impl MockResponse {
    pub fn ok() -> Self {
        MockResponse::Output(String::new())
    }

    pub fn output(output: impl Into<String>) -> Self {
        MockResponse::Output(output.into())
    }

    pub fn fail() -> Self {
        MockResponse::Fail {
            exit_code: 1,
            output: String::new(),
        }
    }

    pub fn fail_with(exit_code: i32, output: impl Into<String>) -> Self {
        MockResponse::Fail {
            exit_code,
            output: output.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        MockResponse::Transport(message.into())
    }
}

#[derive(Debug, Clone)]
struct MockRule {
    needle: String,
    response: MockResponse,
    remaining: Option<usize>,
}

/// One recorded command
#[derive(Debug, Clone)]
pub struct Invocation {
    pub node: String,
    pub command: String,
    pub background: bool,
    pub at: Instant,
}

/// Shared, ordered record of commands across every mock runner
pub type Journal = Arc<Mutex<Vec<Invocation>>>;

/// Scripted runner for tests
///
/// Rules are matched in insertion order by substring; a rule added with
/// [`MockCommandRunner::expect_times`] expires after that many matches.
/// Commands with no matching rule succeed with empty output. Background
/// commands always succeed unless a rule says otherwise.
///
/// Processes registered with [`MockCommandRunner::track_process`] are
/// simulated: a background launch of `.../<name> ` starts it, `sudo pkill
/// <name>` stops it (exit 1 if it was not running) and `pgrep <name>`
/// succeeds only while it runs. Explicit rules still take precedence.
#[derive(Debug, Clone)]
pub struct MockCommandRunner {
    name: String,
    rules: Arc<Mutex<Vec<MockRule>>>,
    processes: Arc<Mutex<BTreeMap<String, bool>>>,
    journal: Journal,
}

impl MockCommandRunner {
    /// Create a mock runner with its own journal
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_journal(name, Arc::new(Mutex::new(Vec::new())))
    }

    /// Create a mock runner that records into a shared journal
    pub fn with_journal(name: impl Into<String>, journal: Journal) -> Self {
        Self {
            name: name.into(),
            rules: Arc::new(Mutex::new(Vec::new())),
            processes: Arc::new(Mutex::new(BTreeMap::new())),
            journal,
        }
    }

    /// Answer every command containing `needle` with `response`
    pub fn expect(&self, needle: &str, response: MockResponse) -> &Self {
        self.push_rule(needle, response, None)
    }

    /// Answer the next `times` commands containing `needle` with `response`
    pub fn expect_times(&self, needle: &str, times: usize, response: MockResponse) -> &Self {
        self.push_rule(needle, response, Some(times))
    }

    fn push_rule(&self, needle: &str, response: MockResponse, remaining: Option<usize>) -> &Self {
        self.rules.lock().push(MockRule {
            needle: needle.to_string(),
            response,
            remaining,
        });
        self
    }

    /// Simulate the lifecycle of `process`, initially stopped
    pub fn track_process(&self, process: &str) -> &Self {
        self.processes.lock().insert(process.to_string(), false);
        self
    }

    /// Whether a tracked process is currently running
    pub fn is_running(&self, process: &str) -> bool {
        self.processes.lock().get(process).copied().unwrap_or(false)
    }

    /// All commands this runner has seen, in order
    pub fn commands(&self) -> Vec<String> {
        self.journal
            .lock()
            .iter()
            .filter(|inv| inv.node == self.name)
            .map(|inv| inv.command.clone())
            .collect()
    }

    /// Number of recorded commands containing `needle`
    pub fn count(&self, needle: &str) -> usize {
        self.commands().iter().filter(|c| c.contains(needle)).count()
    }

    pub fn journal(&self) -> Journal {
        Arc::clone(&self.journal)
    }

    fn respond(&self, command: &str) -> Option<MockResponse> {
        let mut rules = self.rules.lock();
        let rule = rules
            .iter_mut()
            .find(|r| command.contains(&r.needle) && r.remaining != Some(0))?;
        if let Some(remaining) = rule.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(rule.response.clone())
    }

    fn simulate(&self, command: &str, background: bool) -> Option<MockResponse> {
        let mut processes = self.processes.lock();
        for (process, running) in processes.iter_mut() {
            if command.trim() == format!("pgrep {}", process) {
                return Some(if *running {
                    MockResponse::output("4242")
                } else {
                    MockResponse::fail()
                });
            }
            if command.trim() == format!("sudo pkill {}", process) {
                let was_running = std::mem::replace(running, false);
                return Some(if was_running {
                    MockResponse::ok()
                } else {
                    MockResponse::fail()
                });
            }
            if background && command.contains(&format!("/{} ", process)) {
                *running = true;
                return Some(MockResponse::ok());
            }
        }
        None
    }

    fn record(&self, command: &str, background: bool) {
        self.journal.lock().push(Invocation {
            node: self.name.clone(),
            command: command.to_string(),
            background,
            at: Instant::now(),
        });
    }

    fn into_result(&self, command: &str, response: MockResponse) -> SystestResult<String> {
        match response {
            MockResponse::Output(output) => Ok(output),
            MockResponse::Fail { exit_code, output } => Err(SystestError::command_failed(
                &self.name,
                command,
                Some(exit_code),
                output,
            )),
            MockResponse::Transport(message) => Err(SystestError::transport(&self.name, message)),
        }
    }
}

#[async_trait]
impl CommandRunner for MockCommandRunner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, command: &str) -> SystestResult<String> {
        debug!("Mock run on {}: {}", self.name, command);
        self.record(command, false);
        let response = self
            .respond(command)
            .or_else(|| self.simulate(command, false))
            .unwrap_or_else(MockResponse::ok);
        self.into_result(command, response)
    }

    async fn run_background(&self, command: &str) -> SystestResult<()> {
        debug!("Mock background on {}: {}", self.name, command);
        self.record(command, true);
        match self
            .respond(command)
            .or_else(|| self.simulate(command, true))
        {
            Some(response) => self.into_result(command, response).map(|_| ()),
            None => Ok(()),
        }
    }
}
