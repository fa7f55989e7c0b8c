mod application;
mod config;
mod infrastructure;

use anyhow::Result;
use config::get_config;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use application::service::{BulkLoaderService, publish_report};
use infrastructure::{sorter::FileSorter, writer::JsonLinesLoader};
use rowflow_engine::StepCounter;

fn setup_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(level.parse()?)
        .from_env_lossy();

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}

fn main() -> Result<()> {
    let config = get_config()?;
    setup_tracing(&config.rowflow.logging.level)?;
    tracing::info!("Configuration loaded successfully");

    tracing::info!("Starting bulk_loader...");
    tracing::debug!(?config, "Full application configuration");

    let counter = StepCounter::new();
    let sorter = FileSorter::new(&config, &counter);
    let loader = JsonLinesLoader::new(&config, &counter);

    let service = BulkLoaderService::new(sorter, loader);

    let runtime = tokio::runtime::Runtime::new()?;
    let report = match runtime.block_on(service.run()) {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Application finished with an error: {:?}", e);
            std::process::exit(1);
        }
    };

    publish_report(&report.steps, config.paths.report_csv.as_deref())?;

    tracing::info!(
        sorted = report.sorted_records,
        written = report.written_records(),
        "Bulk loading completed successfully!"
    );
    Ok(())
}
