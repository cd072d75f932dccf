//! Serial execution of test cases against one cluster

use crate::cluster::{Cluster, LogFindings};
use crate::error::{SystestError, SystestResult};

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info};

/// One test case body
#[async_trait]
pub trait Scenario: Send + Sync {
    /// Case name; cases whose name contains `SvcDiscovery` run with DNS on
    fn name(&self) -> &str;

    async fn run(&self, cluster: &Cluster) -> SystestResult<()>;
}

/// How a case ended
#[derive(Debug)]
pub enum CaseOutcome {
    Passed,
    /// Cluster bring-up failed; the body never ran
    SetupFailed(SystestError),
    /// The body ran and failed
    Failed(SystestError),
}

impl CaseOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, CaseOutcome::Passed)
    }
}

#[derive(Debug)]
pub struct CaseReport {
    pub name: String,
    pub outcome: CaseOutcome,
    /// Fatal log markers or rotation trouble found after the case
    pub teardown_error: Option<SystestError>,
    pub duration: Duration,
}

impl CaseReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_passed() && self.teardown_error.is_none()
    }
}

#[derive(Debug, Default)]
pub struct SuiteReport {
    pub cases: Vec<CaseReport>,
    pub log_findings: Vec<LogFindings>,
}

impl SuiteReport {
    pub fn passed(&self) -> usize {
        self.cases.iter().filter(|c| c.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.cases.len() - self.passed()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn case(&self, name: &str) -> Option<&CaseReport> {
        self.cases.iter().find(|c| c.name == name)
    }
}

impl fmt::Display for SuiteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for case in &self.cases {
            let status = match (&case.outcome, &case.teardown_error) {
                (CaseOutcome::Passed, None) => "PASS".to_string(),
                (CaseOutcome::Passed, Some(e)) => format!("FAIL (teardown: {})", e),
                (CaseOutcome::SetupFailed(e), _) => format!("FAIL (setup: {})", setup_detail(e)),
                (CaseOutcome::Failed(e), _) => format!("FAIL ({})", e),
            };
            writeln!(f, "{:<40} {:>8.1?} {}", case.name, case.duration, status)?;
        }
        write!(f, "{} passed, {} failed", self.passed(), self.failed())
    }
}

fn setup_detail(error: &SystestError) -> String {
    match error {
        SystestError::SetupFailed { phase, source } => format!("{}: {}", phase, source),
        other => other.to_string(),
    }
}

/// An ordered list of scenarios run against one cluster
#[derive(Default)]
pub struct Suite {
    scenarios: Vec<Box<dyn Scenario>>,
}

impl Suite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, scenario: impl Scenario + 'static) -> Self {
        self.scenarios.push(Box::new(scenario));
        self
    }

    pub fn add_boxed(mut self, scenario: Box<dyn Scenario>) -> Self {
        self.scenarios.push(scenario);
        self
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Run every scenario in order.
    ///
    /// Only a failed suite bring-up is an error; per-case failures are
    /// recorded in the report and the next case is set up regardless.
    pub async fn run(&self, cluster: &mut Cluster) -> SystestResult<SuiteReport> {
        cluster.setup_suite().await?;

        let mut report = SuiteReport::default();
        for scenario in &self.scenarios {
            report.cases.push(run_case(cluster, scenario.as_ref()).await);
        }

        report.log_findings = cluster.teardown_suite().await;
        info!("{}", report);
        Ok(report)
    }
}

/// Set up, run and tear down a single case
pub async fn run_case(cluster: &mut Cluster, scenario: &dyn Scenario) -> CaseReport {
    let name = scenario.name().to_string();
    let start = Instant::now();
    info!("============================= {} starting ==========================", name);

    let case = cluster.enter_case(&name);

    let outcome = match case.setup_test().await {
        Err(e) => CaseOutcome::SetupFailed(e),
        Ok(()) => match scenario.run(&case).await {
            Ok(()) => CaseOutcome::Passed,
            Err(e) => {
                error!("{} failed: {}", name, e);
                CaseOutcome::Failed(e)
            }
        },
    };

    let teardown_error = case.teardown_test().await.err();
    if let Some(e) = &teardown_error {
        error!("{} teardown: {}", name, e);
    }
    drop(case);

    info!("============================= {} completed ==========================", name);
    CaseReport {
        name,
        outcome,
        teardown_error,
        duration: start.elapsed(),
    }
}
