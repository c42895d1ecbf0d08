use anyhow::Context;
use clap::Parser;
use endpoint_snapshot::{
    install_prometheus_exporter, load_config, setup_logging, Cli, CliRunner, PipelineMetrics,
};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let config = load_config(&args)
        .await
        .context("failed to load configuration")?;

    setup_logging(config.log_level);
    info!("Starting endpoint-snapshot v{}", env!("CARGO_PKG_VERSION"));

    // The recorder has to exist before the handles are registered.
    if let Some(port) = config.metrics_port {
        install_prometheus_exporter(port).context("failed to start metrics exporter")?;
    }
    let metrics = Arc::new(PipelineMetrics::new());

    let runner = CliRunner::new(config, &args, metrics);

    let result = tokio::select! {
        result = runner.run(args.command) => result.map_err(anyhow::Error::from),
        _ = signal::ctrl_c() => {
            warn!("Received Ctrl-C, stopping");
            Err(anyhow::anyhow!("interrupted"))
        }
    };

    runner.shutdown().await;

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
