//! # Gallery
//!
//! Backend for a social image-sharing site: upload with compression and
//! automated NSFW moderation, a shuffled infinite feed, tag exploration,
//! likes with like notifications, and profiles.
//!
//!
//!
//! # General Infrastructure
//! - The web client talks to this server; the server talks to the managed
//!   document store and the image hosts
//! - Image bytes never live here: hosting is catbox or R2, both behind the
//!   upload endpoints
//! - The document store sits behind a trait so the managed database can be
//!   swapped without touching the views
//!
//!
//!
//! # Notes
//!
//! ## Feed
//! The feed fetches one recency window, shuffles it client-side, and pages
//! through it; when the cursor runs off the end it reshuffles and starts
//! over, so a finite collection scrolls forever. Fetch-then-shuffle is a
//! deliberate shortcut at current collection sizes; server-side sampling
//! only becomes worth it well past that.
//!
//! ## Likes
//! Like writes are a single atomic set-add/remove plus counter move, so
//! concurrent likers cannot lose updates. The client applies the change
//! optimistically and rolls back if the write is rejected. Unliking never
//! retracts the notification the like created.
//!
//!
//!
//! # Setup
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
use std::time::Duration;

use axum::{
    http::{header::CONTENT_TYPE, Method},
    routing::{get, post},
    Router,
};

use signal::{
    ctrl_c,
    unix::{signal, SignalKind},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub mod auth;
pub mod config;
pub mod error;
pub mod likes;
pub mod models;
pub mod notifications;
pub mod paginator;
pub mod routes;
pub mod scroll;
pub mod shuffle;
pub mod state;
pub mod store;
pub mod upload;

use routes::{
    create_image_handler, delete_image_handler, download_proxy_handler, edit_image_handler,
    feed_handler, get_image_handler, like_handler, mark_read_handler, notifications_handler,
    profile_images_handler, profile_user_handler, random_handler, share_handler, sitemap_handler,
    upload_catbox_handler, upload_r2_handler,
};
use state::State;

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = State::new();

    info!("Starting server...");

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let app = Router::new()
        .route("/api/images", get(feed_handler).post(create_image_handler))
        .route(
            "/api/images/{id}",
            get(get_image_handler)
                .patch(edit_image_handler)
                .delete(delete_image_handler),
        )
        .route("/api/images/{id}/like", post(like_handler))
        .route("/api/users/{uid}", get(profile_user_handler))
        .route("/api/users/{uid}/images", get(profile_images_handler))
        .route("/api/notifications", get(notifications_handler))
        .route("/api/notifications/read", post(mark_read_handler))
        .route("/api/random", get(random_handler))
        .route("/api/share", get(share_handler))
        .route("/api/sitemap", get(sitemap_handler))
        .route("/api/downloadProxy", get(download_proxy_handler))
        .route("/api/uploadToCatbox", post(upload_catbox_handler))
        .route("/api/uploadToR2", post(upload_r2_handler))
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
