use alert_notify::config::NotifyConfig;
use alert_notify::database;
use alert_notify::logging::init_logging;
use alert_notify::services::ServiceContainer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = NotifyConfig::from_env()?;

    // Keep the guard alive so buffered file logs are flushed on exit.
    let (logging, _log_guard) = init_logging(&config.log_filter, config.log_dir.as_deref())?;

    let pool = database::init_pool_with_size(&config.database_url, config.db_pool_size).await?;
    database::run_migrations(&pool).await?;

    let container = ServiceContainer::new(pool, &config)?;
    logging.start_retention_cleanup(container.cancellation_token());

    let types: Vec<_> = container
        .notification_service
        .available_notifiers()
        .into_iter()
        .map(|p| p.notifier_type)
        .collect();
    tracing::info!(
        notifier_types = ?types,
        log_filter = %logging.filter(),
        log_dir = ?logging.log_dir(),
        "alert-notify initialized successfully"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    container.shutdown().await;

    Ok(())
}
