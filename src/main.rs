use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tripshare::config::AppConfig;
use tripshare::error::AppError;
use tripshare::routes::create_router;
use tripshare::services::notify::MatrixNotifier;
use tripshare::state::AppState;
use tripshare::store::json::JsonStore;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_logging();

    let config = AppConfig::from_env()?;
    let store = Arc::new(JsonStore::open(config.data_root.clone()).await?);
    let notifier = MatrixNotifier::new(config.matrix.clone());

    let state = AppState::new(config.clone(), store, notifier);
    let app = create_router(state);

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tripshare=debug".into());

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
