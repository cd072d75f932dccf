use anyhow::Context;
use clap::Parser;
use tracing::{info, Instrument};

use systest::cli::Cli;
use systest::commands;
use systest::observability::{command_span, init_tracing};
use systest::TestbedRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.fabric.host_test_requested() {
        info!("HOST_TEST is set, skipping system tests");
        return Ok(());
    }

    let config = cli.build_config().context("invalid configuration")?;
    info!(
        "systest {} started at {} against {} testbed",
        cli.command.name(),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        config.testbed.kind
    );

    let span = command_span(cli.command.name(), &config.testbed.kind.to_string());
    let registry = TestbedRegistry::default();
    let success = commands::execute(&cli.command, config, &registry)
        .instrument(span)
        .await
        .with_context(|| format!("{} failed", cli.command.name()))?;

    if !success {
        std::process::exit(1);
    }
    Ok(())
}
