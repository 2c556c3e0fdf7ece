use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use axum::body::Body;
use axum::{routing::get, Router};
use http::{HeaderValue, StatusCode};
use tokio::sync::RwLock;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::SmartIpKeyExtractor;
use tower_governor::{GovernorError, GovernorLayer};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod error;
mod i18n;
mod routes;
mod services;
mod timefmt;

use config::Config;
use services::{init, telegram::TelegramService};

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    pub telegram: Arc<RwLock<Option<TelegramService>>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "studio_notifications=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let mut config = Config::from_env()?;

    let lang = i18n::normalize_language(&config.telegram.language);
    if i18n::is_supported_language(&lang) {
        config.telegram.language = lang;
    } else {
        tracing::warn!(
            "Unsupported BOT_LANGUAGE {:?}; falling back to {}",
            config.telegram.language,
            i18n::DEFAULT_LANG
        );
        config.telegram.language = i18n::DEFAULT_LANG.to_string();
    }

    tracing::info!("Starting Studio Notifications Service");

    // Initialize database
    let pool = init::init_db(&config).await?;

    let app_state = Arc::new(AppState {
        db: pool,
        config: config.clone(),
        telegram: Arc::new(RwLock::new(None)),
    });

    // Initialize the Telegram bot (optional; the API works without it)
    init::initialize_telegram(&app_state).await;

    // Create shutdown notifier for background workers and std threads
    let (shutdown_tx, _shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);
    let thread_shutdown = Arc::new(AtomicBool::new(false));

    // Spawn the sweep workers (returns JoinHandles so we can await shutdown)
    let mut bg_handles = init::spawn_background_workers(app_state.clone(), shutdown_tx.clone());

    // Spawn the inbound dispatcher that watches studio chats for report replies
    if let Some(telegram) = app_state.telegram.read().await.clone() {
        bg_handles.push(services::bot::spawn_dispatcher(
            app_state.clone(),
            telegram.bot().clone(),
            shutdown_tx.clone(),
        ));
    }

    // Rate limiter for the event-mutation endpoints
    let mut events_builder = GovernorConfigBuilder::default();
    events_builder.per_second(config.rate_limit.events_per_second.into());
    events_builder.burst_size(config.rate_limit.events_burst);
    events_builder.key_extractor(SmartIpKeyExtractor);
    events_builder.error_handler(rate_limit_response);

    let events_gov_conf = Arc::new(
        events_builder
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Failed to build events governor config"))?,
    );

    // Background cleanup for the limiter storage
    let events_cleaner = {
        let limiter = events_gov_conf.limiter().clone();
        let interval = Duration::from_secs(60);
        let flag = thread_shutdown.clone();
        std::thread::spawn(move || {
            // Use smaller sleep granularity to allow quick shutdown.
            let tick = Duration::from_secs(1);
            loop {
                for _ in 0..interval.as_secs() {
                    if flag.load(Ordering::SeqCst) {
                        tracing::info!("Events rate limiter cleanup thread exiting");
                        return;
                    }
                    std::thread::sleep(tick);
                }
                tracing::debug!("events rate limiter size: {}", limiter.len());
                limiter.retain_recent();
            }
        })
    };

    let events_rate_layer = GovernorLayer {
        config: events_gov_conf.clone(),
    };

    // Build router
    let app = Router::new()
        // Health check
        .route("/health", get(routes::health::health_check))
        // Event mutations (rate limited)
        .merge(routes::events::mutation_router().layer(events_rate_layer))
        // Event listings
        .merge(routes::events::query_router())
        // Add shared state
        .with_state(app_state.clone())
        // Add middleware
        .layer(TraceLayer::new_for_http())
        .layer(build_cors(&config.server.frontend_url));

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server_fut = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );

    let shutdown_tx_clone = shutdown_tx.clone();
    let thread_shutdown_clone = thread_shutdown.clone();

    let signal_fut = async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut term =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("Failed to bind SIGTERM");
            tokio::select! {
                _ = ctrl_c => {},
                _ = term.recv() => {},
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await.expect("Failed to bind Ctrl+C");
        }

        tracing::info!("Shutdown signal received, notifying background workers and threads");
        let _ = shutdown_tx_clone.send(());
        thread_shutdown_clone.store(true, Ordering::SeqCst);
    };

    tokio::select! {
        res = server_fut => {
            if let Err(e) = res {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = signal_fut => {
            tracing::info!("Signal handler completed; server future dropped to stop accepting new connections");
        }
    }

    // Give background workers some time to finish their work.
    let shutdown_wait = Duration::from_secs(15);
    tracing::info!(
        "Waiting up to {}s for background workers to exit",
        shutdown_wait.as_secs()
    );

    let bg_wait = async {
        for handle in bg_handles {
            let _ = handle.await;
        }
    };
    let _ = tokio::time::timeout(shutdown_wait, bg_wait).await;

    // Join the std thread; it checks `thread_shutdown` and should exit quickly.
    if let Err(e) = events_cleaner.join() {
        tracing::warn!("Events cleanup thread join failed: {:?}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// CORS policy: wide open when FRONTEND_URL is "*" (the legacy default),
/// locked to the admin panel origin otherwise.
fn build_cors(frontend_url: &str) -> CorsLayer {
    if frontend_url == "*" {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(
                frontend_url
                    .parse::<HeaderValue>()
                    .expect("Invalid FRONTEND_URL for CORS"),
            )
            .allow_methods([
                http::Method::GET,
                http::Method::POST,
                http::Method::DELETE,
                http::Method::OPTIONS,
            ])
            .allow_headers([http::header::CONTENT_TYPE, http::header::ACCEPT])
            .allow_credentials(true)
    }
}

/// 429 (and friends) for the event-mutation rate limiter, in the same JSON
/// error envelope as `AppError`.
fn rate_limit_response(error: GovernorError) -> http::Response<Body> {
    match error {
        GovernorError::TooManyRequests { wait_time, headers } => {
            // `wait_time` is provided as seconds
            let body = serde_json::json!({
                "error": {
                    "code": "RATE_LIMITED",
                    "message": "Rate limit exceeded",
                    "details": { "retry_after_seconds": wait_time }
                }
            })
            .to_string();

            let mut resp = http::Response::new(Body::from(body));
            *resp.status_mut() = StatusCode::TOO_MANY_REQUESTS;

            // Ensure clients see JSON
            resp.headers_mut().insert(
                http::header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );

            // Include any headers provided by the governor
            if let Some(hmap) = headers {
                for (name, value) in hmap.iter() {
                    resp.headers_mut().append(name.clone(), value.clone());
                }
            }

            // Retry-After (seconds)
            if let Ok(retry_after) = HeaderValue::from_str(&wait_time.to_string()) {
                resp.headers_mut()
                    .insert(http::header::RETRY_AFTER, retry_after);
            }

            resp
        }
        GovernorError::UnableToExtractKey => {
            let mut resp = http::Response::new(Body::from(
                "Unable to determine client IP for rate limiting",
            ));
            *resp.status_mut() = StatusCode::BAD_REQUEST;
            resp
        }
        GovernorError::Other { code, msg, headers } => {
            let body = msg.unwrap_or_else(|| "Rate limiting error".to_string());
            let mut resp = http::Response::new(Body::from(body));
            *resp.status_mut() =
                StatusCode::from_u16(code.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            if let Some(hmap) = headers {
                for (name, value) in hmap.iter() {
                    resp.headers_mut().append(name.clone(), value.clone());
                }
            }
            resp
        }
    }
}
