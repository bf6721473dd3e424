//! `lectern-server` binary: loads configuration, opens the account store,
//! bootstraps the root account and serves the HTTP API until Ctrl+C.

use std::sync::Arc;

use lectern_store::{Database, UserAccount};
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use lectern_server::api::{self, AppState};
use lectern_server::config::ServerConfig;
use lectern_server::image_cache::ImageCache;
use lectern_server::resize::FfmpegResizer;

/// Create the root account on a fresh database. Returns it when created.
fn bootstrap_root(db: &Database, config: &ServerConfig) -> lectern_store::Result<Option<UserAccount>> {
    if db.count_users()? > 0 {
        return Ok(None);
    }

    let mut root = UserAccount::new_root(config.root_username.clone(), None);
    root.token = Some(
        config
            .root_token
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string()),
    );
    db.upsert_user(&root)?;
    Ok(Some(root))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Tracing (respects RUST_LOG)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,lectern_server=debug")),
        )
        .init();

    info!("Starting Lectern server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Account store
    // -----------------------------------------------------------------------
    let database = Database::open_at(&config.database_path())?;
    if let Some(root) = bootstrap_root(&database, &config)? {
        info!(
            username = root.username.as_deref().unwrap_or_default(),
            token_from_env = config.root_token.is_some(),
            "Created root account"
        );
    }

    // -----------------------------------------------------------------------
    // 4. Image cache (creates its directories if missing)
    // -----------------------------------------------------------------------
    let resizer = Arc::new(FfmpegResizer::new(config.ffmpeg_path.clone()));
    let image_cache = Arc::new(ImageCache::new(config.cache_path(), config.x_accel.clone(), resizer).await?);

    let http_addr = config.http_addr;
    let app_state = AppState {
        image_cache,
        database: Arc::new(Mutex::new(database)),
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 5. HTTP API (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
