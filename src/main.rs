mod config;
mod shutdown;

use std::process::ExitCode;
use std::sync::Arc;

use character_db::CharacterDb;
use character_session::{CharacterAutoSave, CharacterManager, PlayerEventListener};

use crate::config::parse_cli_args;

#[tokio::main]
async fn main() -> ExitCode {
    observability::init_logging();

    let config = parse_cli_args();
    tracing::info!(
        database = %config.database.path,
        autosave = config.autosave.enabled,
        "Character server starting..."
    );

    // Connect and migrate before anything touches the store.
    let db = match CharacterDb::connect(&config.to_database_config()) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            tracing::error!(error = %e, "Failed to open character database");
            return ExitCode::FAILURE;
        }
    };

    if !db.is_fully_migrated() {
        tracing::warn!("Continuing with a partially migrated character schema");
    }

    let manager = Arc::new(CharacterManager::new(db.clone()));
    let listener = PlayerEventListener::new(manager.clone(), config.spawn.default_world.clone());

    let mut autosave = CharacterAutoSave::new(manager);
    if config.autosave.enabled {
        autosave.start(config.autosave_interval());
    }

    tracing::info!("Character subsystem ready (Ctrl+C to stop)");
    match shutdown::wait_for_signal().await {
        Ok(reason) => tracing::info!(?reason, "Shutdown signal received"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signals"),
    }

    autosave.stop_and_wait().await;
    match tokio::task::spawn_blocking(move || listener.on_shutdown()).await {
        Ok(saved) => tracing::info!(saved, "Final save complete"),
        Err(e) => tracing::error!(error = %e, "Final save failed"),
    }
    db.disconnect();

    tracing::info!("Server stopped.");
    ExitCode::SUCCESS
}
