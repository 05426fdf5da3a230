//! Exporter entrypoint: load config, bind the scrape port, serve until Ctrl-C.
//! Sampling happens only when a scrape arrives; there is no background loop.

use proc_exporter::{
    collectors::{ProcessMetricsCollector, SysinfoSource},
    config::ExporterConfig,
    exposition::server,
    logging,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config_path = std::env::var("PROC_EXPORTER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.json"));
    let config = ExporterConfig::load(&config_path)?;

    logging::init(&config.log);

    let collector = Arc::new(ProcessMetricsCollector::new(
        SysinfoSource::new(),
        &config.collector,
    ));
    let app = server::router(collector, &config.listen.metrics_path);

    let addr = config.listen.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        config = %config_path.display(),
        %addr,
        path = %config.listen.metrics_path,
        privileged_user = %config.collector.privileged_user,
        "process exporter started"
    );

    server::serve(listener, app).await?;
    info!("process exporter stopped");
    Ok(())
}
