mod backup;
mod config;
mod error;
mod log;
mod storage;
mod web;

use backup::{Pipeline, VendorToolExecutor, ZipCompressor};
use config::ConnectionRegistry;
use error::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use storage::StoreSelector;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use web::AppState;

#[tokio::main]
async fn main() {
    log::init();

    info!("Azurite Backup starting...");

    let shutdown = CancellationToken::new();
    let ctrl_c_count = Arc::new(AtomicUsize::new(0));
    let handler_token = shutdown.clone();

    let handler = ctrlc::set_handler(move || {
        let count = ctrl_c_count.fetch_add(1, Ordering::SeqCst);

        if count == 0 {
            println!("\n\nShutdown signal received. Press Ctrl+C again to force exit...");
            handler_token.cancel();
        } else {
            println!("\nForce exiting...");
            std::process::exit(130);
        }
    });
    if let Err(e) = handler {
        error!("Error setting Ctrl-C handler: {}", e);
        std::process::exit(1);
    }

    match run(shutdown).await {
        Ok(_) => {
            info!("Application exited normally");
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run(shutdown: CancellationToken) -> Result<()> {
    let config = config::load()?;
    config.validate()?;

    let stores = StoreSelector::from_config(&config.storage)?;
    stores.select(config.storage.provider)?;
    info!("Remote store: {}", config.storage.provider);

    let pipeline = Pipeline::new(
        Arc::new(VendorToolExecutor::new(config.tools.clone(), config.local_backup_dir.clone())),
        Arc::new(ZipCompressor::new()),
        stores,
        config.storage.provider,
        config.remote_folder_prefix.clone(),
    );
    let registry = ConnectionRegistry::new(config.connections.clone());
    info!("{} database connection(s) configured", registry.len());

    let state = AppState::new(
        Arc::new(pipeline),
        registry,
        shutdown.clone(),
        config.web.username.clone(),
        config.web.password.clone(),
    );

    let server = config
        .web
        .enabled
        .then(|| tokio::spawn(web::start_server(state.clone(), config.web.port)));

    backup::run_scheduler(config.schedule.clone(), state, shutdown.clone()).await;

    if let Some(server) = server {
        shutdown.cancel();
        if let Err(e) = server.await {
            error!("Web server task failed: {}", e);
        }
    }
    Ok(())
}
