use anyhow::{Result, anyhow};
use homevolt_local::config::Config;
use homevolt_local::config_flow::{ConfigFlow, FlowResult};
use homevolt_local::entry::{SetupOptions, setup_entry, unload_entry};
use homevolt_local::logging::{get_logger, init_logging};
use homevolt_local::services::ServiceRegistry;
use homevolt_local::web::{self, AppState};
use std::sync::Arc;
use tokio::sync::broadcast;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| anyhow!("Failed to load configuration: {e}"))?;
    config
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {e}"))?;
    init_logging(&config.logging).map_err(|e| anyhow!("Failed to initialize logging: {e}"))?;

    let logger = get_logger("main");
    logger.info(&format!(
        "homevolt-local {} starting for {}",
        env!("CARGO_PKG_VERSION"),
        config.device.host
    ));

    // Identify the device the same way interactive setup does
    let mut flow = ConfigFlow::new(Vec::new()).with_request_config(config.request.clone());
    let entry = match flow.step_user(Some(config.device.clone())).await {
        FlowResult::CreateEntry { entry } => entry,
        other => {
            let reason = other.error().unwrap_or("unknown").to_string();
            return Err(anyhow!(
                "Could not set up {}: {reason}",
                config.device.host
            ));
        }
    };

    let loaded = setup_entry(entry, SetupOptions::from_config(&config))
        .await
        .map_err(|e| {
            if e.requires_reauth() {
                logger.error("Credentials rejected; update device.username/device.password");
            }
            anyhow!("Setup failed ({}): {e}", e.translation_key())
        })?;

    let services = Arc::new(ServiceRegistry::new());
    services.register(Arc::clone(&loaded.coordinator));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let state = AppState::new(&loaded, Arc::clone(&services));
    let web_shutdown = shutdown_tx.subscribe();
    let (web_host, web_port) = (config.web.host.clone(), config.web.port);
    let web_task = tokio::spawn(async move {
        if let Err(e) = web::serve(state, &web_host, web_port, web_shutdown).await {
            get_logger("web").error(&format!("Web server error: {e}"));
        }
    });

    let coordinator = Arc::clone(&loaded.coordinator);
    let poll_shutdown = shutdown_tx.subscribe();
    let poll_task = tokio::spawn(async move { coordinator.run(poll_shutdown).await });

    tokio::signal::ctrl_c().await?;
    logger.info("Shutdown requested");
    let _ = shutdown_tx.send(());

    if let Err(e) = poll_task.await {
        logger.warn(&format!("Coordinator task ended abnormally: {e}"));
    }
    if let Err(e) = web_task.await {
        logger.warn(&format!("Web task ended abnormally: {e}"));
    }

    services.unregister(&loaded.coordinator);
    let entry = unload_entry(loaded);
    logger.info(&format!("Shutdown complete for {}", entry.title));
    Ok(())
}
