use anyhow::Context;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fortyseven::config::{get_config, CliArgs};
use fortyseven::integrations::Integrations;
use fortyseven::state::AppState;
use fortyseven::{create_app, db};

/// Sets up console logging, plus daily-rotated JSON files when `log_dir` is given
///
/// The returned guard flushes the file writer on drop and must live as long as
/// the server.
fn init_logging(debug: bool, log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let default_level = if debug { "fortyseven=debug,tower_http=debug" } else { "fortyseven=info" };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).with_context(|| format!("creating log directory {:?}", dir))?;
            let file_appender = tracing_appender::rolling::daily(dir, "fortyseven.log");
            let (writer, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(writer))
                .with(fmt::layer().with_writer(std::io::stdout))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stdout))
                .init();
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let args = CliArgs::parse();
    let debug = args.debug;
    let config = get_config(args);
    let _guard = init_logging(debug, config.log_dir.as_deref())?;
    info!("Configuration: {}", config.redacted_summary());

    let pool = db::connect_and_migrate(&config.database_url)?;
    let integrations = Integrations::from_config(&config)?;
    std::fs::create_dir_all(&config.storage_dir)
        .with_context(|| format!("creating storage directory {:?}", config.storage_dir))?;

    let bind_address = config.bind_address.clone();
    let state = Arc::new(AppState::new(pool, config, integrations));
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("binding {}", bind_address))?;
    info!("Listening on {}", bind_address);
    axum::serve(listener, app).await?;

    Ok(())
}
