//! Session pool service — multiplexes one persistent, authenticated browser
//! session across a fixed number of tabs, leased over HTTP to concurrent
//! clients.

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gem_pool::api::{create_router, AppState};
use gem_pool::clipboard::ClipboardExtractor;
use gem_pool::config::{self, AppConfig};
use gem_pool::driver::{ChromeDriver, Driver};
use gem_pool::pool::Pool;
use gem_pool::slot::Slot;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_config_from_env()?;
    init_logging(&config);

    tracing::info!(slots = config.pool.size, port = config.server.port, "starting session pool");

    let driver: Arc<dyn Driver> = Arc::new(ChromeDriver::new(config.browser.clone()));
    driver.start().await?;

    let slots = warm_up_slots(&driver, &config).await?;

    let lock_file = clipboard_lock_path();
    let extractor = ClipboardExtractor::new(lock_file);

    let pool = Pool::new(slots, driver, extractor, &config);
    pool.start_monitors();

    let state = AppState::new(pool.clone(), Arc::new(config.clone()));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(cors)
        .layer(compression)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0])),
        config.server.port,
    ));
    tracing::info!(%addr, "session pool listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(pool))
        .await?;

    Ok(())
}

/// Path to the advisory lock file guarding clipboard access across every
/// pool process on this host, regardless of each instance's own profile
/// directory — a fixed `~/.clipboard-lock`, the same path `config.rs`'s
/// `expand_tilde` resolves a bare `~` to.
fn clipboard_lock_path() -> std::path::PathBuf {
    match directories::UserDirs::new() {
        Some(dirs) => dirs.home_dir().join(".clipboard-lock"),
        None => std::path::PathBuf::from(".clipboard-lock"),
    }
}

/// Create the first slot and, if it isn't already authenticated, hold
/// startup until a human completes login in the visible browser window.
/// Remaining slots are created against the now-authenticated profile; a
/// slot that fails to open is still handed to the pool, marked in error so
/// it surfaces on `/api/pool/status` rather than silently shrinking the
/// fleet.
async fn warm_up_slots(
    driver: &Arc<dyn Driver>,
    config: &AppConfig,
) -> Result<Vec<Slot>, Box<dyn std::error::Error>> {
    let first_page = driver.create_slot_page().await?;

    if !driver.is_logged_in(first_page).await {
        tracing::warn!("not logged in, waiting for manual login in the browser window");
        if !driver.wait_for_login(first_page).await {
            return Err("timed out waiting for login".into());
        }
        tracing::info!("login detected, continuing startup");
    }

    let mut slots = vec![Slot::new(0, first_page)];

    for id in 1..config.pool.size as u32 {
        match driver.create_slot_page().await {
            Ok(page) => slots.push(Slot::new(id, page)),
            Err(e) => {
                tracing::error!(slot_id = id, error = %e, "failed to open slot, retrying before falling back to a blank tab");
                let page = match driver.create_slot_page().await {
                    Ok(page) => page,
                    Err(e) => {
                        tracing::error!(slot_id = id, error = %e, "retry failed, opening a blank placeholder tab instead");
                        driver.open_blank_page().await?
                    }
                };
                let mut slot = Slot::new(id, page);
                slot.mark_error();
                slots.push(slot);
            }
        }
    }

    Ok(slots)
}

fn init_logging(config: &AppConfig) {
    let stderr_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("gem_pool={},tower_http=info", config.logging.level).into());

    let log_dir = config.logging.resolved_dir();
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "gem-pool.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    // Leaked deliberately: the guard must outlive `main`'s body for buffered
    // log lines to flush, and there is no later point to drop it from.
    Box::leak(Box::new(guard));

    let file_filter: tracing_subscriber::EnvFilter = format!(
        "gem_pool={},tower_http=info",
        config.logging.error_level
    )
    .into();

    tracing_subscriber::registry()
        .with(stderr_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .json()
                .with_filter(file_filter),
        )
        .init();
}

async fn shutdown_signal(pool: Arc<Pool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
    pool.shutdown().await;
}
