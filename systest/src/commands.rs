//! CLI command handlers
//!
//! Each handler returns whether the command succeeded; errors are reserved
//! for failures to reach or build the testbed.

use crate::cli::{Commands, RunArgs};
use crate::scenarios::{select_suite, ScenarioOptions};

use systest_core::config::SuiteConfig;
use systest_core::verifier::{verify_endpoints_present, verify_tunnel_membership};
use systest_core::{SystestError, SystestResult};
use systest_testbed::{TestbedFactory, TestbedRegistry};
use tracing::{error, info};

pub async fn execute(
    command: &Commands,
    config: SuiteConfig,
    registry: &TestbedRegistry,
) -> SystestResult<bool> {
    match command {
        Commands::Run(args) => run_suite(args, config, registry).await,
        Commands::CheckSsh => {
            let cluster = registry.build_cluster(config).await?;
            cluster.check_connectivity().await?;
            println!("All {} nodes reachable", cluster.nodes().len());
            Ok(true)
        }
        Commands::VerifyVteps { node, expect } => {
            let cluster = registry.build_cluster(config).await?;
            let node = cluster.node_by_name(node)?;
            report_check(verify_tunnel_membership(node, expect.iter().cloned()).await)
        }
        Commands::VerifyEps { node, expect } => {
            let cluster = registry.build_cluster(config).await?;
            let node = cluster.node_by_name(node)?;
            report_check(verify_endpoints_present(node, expect).await)
        }
        Commands::ScanLogs => {
            let cluster = registry.build_cluster(config).await?;
            let findings = cluster.scan_logs().await;
            for finding in &findings {
                println!("{}:", finding.node);
                for line in &finding.lines {
                    println!("  {}", line);
                }
            }
            Ok(findings.is_empty())
        }
        Commands::ShowConfig => {
            let text = toml::to_string_pretty(&config)
                .map_err(|e| SystestError::internal(format!("failed to render config: {}", e)))?;
            println!("{}", text);
            Ok(true)
        }
        Commands::ListTestbeds => {
            for kind in registry.list_available() {
                let factory = registry.factory(kind)?;
                println!("{:<12} {}", kind, factory.description());
            }
            Ok(true)
        }
    }
}

async fn run_suite(
    args: &RunArgs,
    config: SuiteConfig,
    registry: &TestbedRegistry,
) -> SystestResult<bool> {
    let options = ScenarioOptions::from_config(&config, &args.vtep_if);
    let suite = select_suite(&options, args.filter.as_deref());
    if suite.is_empty() {
        return Err(SystestError::configuration(
            "run.filter",
            format!("no test case matches '{}'", args.filter.as_deref().unwrap_or_default()),
        ));
    }

    info!(
        "Running {} cases, {} iterations, {} containers per node",
        suite.len(),
        options.iterations,
        options.containers
    );
    let mut cluster = registry.build_cluster(config).await?;
    let report = suite.run(&mut cluster).await?;

    println!("{}", report);
    for finding in &report.log_findings {
        println!("log markers on {}: {} lines", finding.node, finding.lines.len());
    }
    Ok(report.is_success())
}

/// Mismatches are a failed check; anything else is an error
fn report_check(result: SystestResult<()>) -> SystestResult<bool> {
    match result {
        Ok(()) => {
            println!("OK");
            Ok(true)
        }
        Err(e) if e.is_verification_mismatch() => {
            error!("{}", e);
            println!("FAIL: {}", e);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use systest_core::abstractions::{MockCommandRunner, MockResponse};
    use systest_core::config::TestbedKind;
    use systest_core::Node;

    /// Vagrant stand-in handing out scripted nodes
    struct ScriptedFactory {
        runners: Vec<MockCommandRunner>,
    }

    #[async_trait]
    impl TestbedFactory for ScriptedFactory {
        fn kind(&self) -> TestbedKind {
            TestbedKind::Vagrant
        }

        fn description(&self) -> &'static str {
            "scripted nodes"
        }

        async fn build_nodes(&self, config: &SuiteConfig) -> SystestResult<Vec<Node>> {
            Ok(self
                .runners
                .iter()
                .map(|r| Node::new(Box::new(r.clone()), TestbedKind::Vagrant, &config.timing))
                .collect())
        }
    }

    fn registry(runners: &[MockCommandRunner]) -> TestbedRegistry {
        let mut registry = TestbedRegistry::new();
        registry.register(Arc::new(ScriptedFactory {
            runners: runners.to_vec(),
        }));
        registry
    }

    fn runners() -> Vec<MockCommandRunner> {
        vec![
            MockCommandRunner::new("netplugin-node1"),
            MockCommandRunner::new("netplugin-node2"),
        ]
    }

    #[tokio::test]
    async fn test_check_ssh() {
        let runners = runners();
        let ok = execute(&Commands::CheckSsh, SuiteConfig::test(), &registry(&runners))
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(runners[1].commands(), vec!["true"]);
    }

    #[tokio::test]
    async fn test_verify_vteps_mismatch_is_failed_check() {
        let runners = runners();
        runners[0].expect(
            "inspect/driver",
            MockResponse::output(r#"{"vxlan": {"VtepTable": {"10.0.0.2": {}}}}"#),
        );
        let command = Commands::VerifyVteps {
            node: "netplugin-node1".into(),
            expect: vec!["10.0.0.2".into(), "10.0.0.3".into()],
        };

        let ok = execute(&command, SuiteConfig::test(), &registry(&runners))
            .await
            .unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn test_verify_vteps_bad_document_is_error() {
        let runners = runners();
        runners[0].expect("inspect/driver", MockResponse::output("not json"));
        let command = Commands::VerifyVteps {
            node: "netplugin-node1".into(),
            expect: vec!["10.0.0.2".into()],
        };

        let err = execute(&command, SuiteConfig::test(), &registry(&runners))
            .await
            .unwrap_err();
        assert!(err.is_document_shape());
    }

    #[tokio::test]
    async fn test_verify_eps_unknown_node() {
        let command = Commands::VerifyEps {
            node: "netplugin-node9".into(),
            expect: vec!["10.1.1.2".into()],
        };
        let err = execute(&command, SuiteConfig::test(), &registry(&runners()))
            .await
            .unwrap_err();
        assert!(matches!(err, SystestError::NodeNotFound { .. }));
    }

    #[tokio::test]
    async fn test_scan_logs_fails_on_findings() {
        let runners = runners();
        runners[1].expect("/tmp/_net*", MockResponse::output("panic: runtime error\n"));

        let ok = execute(&Commands::ScanLogs, SuiteConfig::test(), &registry(&runners))
            .await
            .unwrap();
        assert!(!ok);
        for runner in &runners {
            assert_eq!(runner.count("docker rm"), 0);
        }
    }

    #[tokio::test]
    async fn test_show_config_needs_no_testbed() {
        let ok = execute(&Commands::ShowConfig, SuiteConfig::default(), &TestbedRegistry::new())
            .await
            .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn test_run_with_unmatched_filter() {
        let args = RunArgs {
            short: true,
            iterations: None,
            containers: None,
            filter: Some("NoSuchCase".into()),
            vtep_if: "eth1".into(),
        };
        let err = execute(&Commands::Run(args), SuiteConfig::test(), &registry(&runners()))
            .await
            .unwrap_err();
        assert!(matches!(err, SystestError::ConfigurationError { .. }));
    }
}
