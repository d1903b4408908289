//! Backend for a car dealership listing.
//!
//!
//!
//! # Listing
//!
//! `GET /cars?page=&limit=&random=&seed=`
//!
//! - `random` off: natural store order, plain skip/limit
//! - `random` on: stable shuffled order per seed, cached for 10 minutes
//! - No seed on a random request: one is generated and echoed back
//! - Response: `{ items, total, page, limit, seed? }`
//!
//! Bad `page`/`limit` values fall back to defaults, pages past the end are empty.
//!
//!
//!
//! # Admin
//!
//! `POST /cars` and `DELETE /cars/{id}` need `Authorization: Bearer <ADMIN_TOKEN>`.
//! Without a configured token both always answer 401.
//!
//!
//!
//! # Accounts
//!
//! - `POST /auth/register` with `{ name, email, password }`: 201, 422 missing fields,
//!   409 taken email, 400 password under 6 characters
//! - `POST /subscribe` with `{ email }`: 200, 400 on a malformed email
//!
//!
//!
//! # Environment
//!
//! | Variable | Default |
//! |---|---|
//! | `RUST_PORT` | 1111 |
//! | `REDIS_URL` | unset, in-memory store |
//! | `DEFAULT_LIMIT` | 100 |
//! | `MAX_LIMIT` | 500 |
//! | `SEED_TTL_SECS` | 600 |
//! | `SWEEP_INTERVAL_SECS` | 0, no background sweep |
//! | `ADMIN_TOKEN` | `/run/secrets/ADMIN_TOKEN`, then env |
//! | `RUST_LOG` | tracing filter |
//!
//!
//!
//! # Setup
//!
//! ```sh
//! RUST_LOG=info cargo run
//! ```
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    Router,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal, time::interval};
use tower_http::cors::CorsLayer;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod pagination;
pub mod prng;
pub mod randomizer;
pub mod routes;
pub mod shuffle;
pub mod state;
pub mod users;

use error::AppError;
use routes::{
    car_handler, create_handler, delete_handler, health_handler, listings_handler, register_handler,
    subscribe_handler,
};
use state::State;

pub fn router(state: Arc<State>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/health", get(health_handler))
        .route("/cars", get(listings_handler).post(create_handler))
        .route("/cars/{id}", get(car_handler).delete(delete_handler))
        .route("/auth/register", post(register_handler))
        .route("/subscribe", post(subscribe_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn start_server() -> Result<(), AppError> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = State::new().await?;

    if let Some(period) = state.config.sweep_interval {
        info!("Sweeping expired seeds every {period:?}");
        tokio::spawn(sweep_expired(state.clone(), period));
    }

    info!("Starting server...");

    let app = router(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address)
        .await
        .map_err(|e| AppError::InternalError(Box::new(e)))?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::InternalError(Box::new(e)))?;

    info!("Server shut down");

    Ok(())
}

/// Runs alongside the inline sweep done by every random listing request.
async fn sweep_expired(state: Arc<State>, period: Duration) {
    let mut ticker = interval(period);

    loop {
        ticker.tick().await;

        let evicted = state.randomizer.sweep(Instant::now());
        debug!(evicted, cached = state.randomizer.cache().len(), "Periodic sweep");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
