use std::sync::Arc;

use tracing::info;

use fitclub_sched::config::Config;
use fitclub_sched::directory::{Directory, StaticDirectory};
use fitclub_sched::Scheduler;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fitclub_sched::observability::init_tracing();

    let config = Config::from_env();
    fitclub_sched::observability::init(config.metrics_port);

    let directory = match &config.directory_path {
        Some(path) => StaticDirectory::from_json_file(path)?,
        None => StaticDirectory::new(),
    };
    let (members, trainers, rooms) = directory.counts();
    let directory: Arc<dyn Directory> = Arc::new(directory);

    let scheduler = Scheduler::start(&config, directory)?;
    info!("fitclub scheduler running");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  directory: {members} members, {trainers} trainers, {rooms} rooms");
    info!("  reservations: {}", scheduler.reservation_count());
    info!("  compact_threshold: {}", config.compact_threshold);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    // Hosts embed the scheduler; standalone we only keep it alive until told to stop.
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }

    info!("shutdown signal received");
    scheduler.shutdown().await?;
    info!("fitclub scheduler stopped");
    Ok(())
}
