use anyhow::Result;
use axum::Router;
use std::{io::ErrorKind, process::ExitCode, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod db;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;
#[cfg(test)]
mod test_support;

use config::{AppConfig, Command};
use state::AppState;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + command ---
    let (cfg, command) = AppConfig::from_env_and_args()?;
    tracing::debug!("Starting bucket-mover with config: {:?}", cfg);

    // --- Initialize SQLite connection ---
    let db = Arc::new(db::connect(&cfg.database_url).await?);

    if let Command::Migrate = command {
        db::run_migrations(&db).await?;
        tracing::info!("Database migration complete.");
        return Ok(ExitCode::SUCCESS);
    }

    // --- Connect home storage ---
    let store = services::object_store::open(&cfg.backend).await?;
    let state = AppState::new(db, cfg.multibucket, store);

    match command {
        Command::MoveTenant(args) => commands::move_tenant::run(&state, &args).await,
        Command::ListObjects(args) => commands::list_objects::run(&state, &args).await,
        Command::ByBucket(args) => commands::by_bucket::run(&state, &args).await,
        Command::Serve(_) => {
            serve(&cfg, state).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Migrate => Ok(ExitCode::SUCCESS),
    }
}

async fn serve(cfg: &AppConfig, state: AppState) -> Result<()> {
    let app: Router = routes::routes::routes().with_state(state);

    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Admin API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
