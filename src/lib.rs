//! # Storefront
//!
//! A small e-commerce backend: catalog browsing and search, per-user carts,
//! transactional checkout, order history, account management and an admin
//! surface with analytics. Everything persists to a single SQLite database
//! accessed with hand-written SQL.
//!
//! The binary serves a JSON API; run it with `cargo run` and point it at a
//! database via `DATABASE_URL` (a fresh file is created and seeded when
//! missing).
use std::time::Duration;

use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    routing::{delete, get, post, put},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod admin;
pub mod audit;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod orders;
pub mod state;

use state::AppState;

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await;

    info!("Starting server...");

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let app = Router::new()
        .route("/", get(catalog::list_products))
        .route("/search", get(catalog::search_products))
        .route("/categories", get(catalog::list_categories))
        .route("/product/{id}", get(catalog::product_detail))
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", get(auth::logout))
        .route("/profile", get(auth::profile).put(auth::update_profile))
        .route("/cart", get(cart::view_cart).delete(cart::clear_cart))
        .route("/cart/add", post(cart::add_to_cart))
        .route("/cart/{product_id}", delete(cart::remove_from_cart))
        .route("/checkout", get(orders::checkout_summary).post(orders::checkout))
        .route("/orders", get(orders::order_history))
        .route(
            "/admin/products",
            get(admin::list_products).post(admin::create_product),
        )
        .route(
            "/admin/products/{id}",
            put(admin::update_product).delete(admin::delete_product),
        )
        .route("/admin/orders", get(admin::list_orders))
        .route("/admin/orders/{id}/status", post(admin::update_order_status))
        .route("/admin/users", get(admin::list_users))
        .route("/admin/dashboard", get(admin::dashboard))
        .route("/admin/analytics", get(admin::analytics))
        .route("/admin/logs", get(audit::view_logs))
        .layer(cors)
        .with_state(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
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
