//! Notes Service — minimal REST API over a SQLite document table.
//!
//! Endpoints:
//!   GET    /notes         list all notes (insertion order)
//!   POST   /notes/add     create a note
//!   PUT    /notes/:id     replace title and content
//!   DELETE /notes/:id     delete a note
//!   GET    /notes/watch   WebSocket feed of full snapshots
//!   GET    /health        service status
//!
//! Default: http://127.0.0.1:9110/

mod config;
mod db;
mod feed;
mod routes;

use config::Config;
use db::Database;
use routes::AppState;
use std::sync::Arc;

fn router(state: Arc<AppState>) -> axum::Router {
    let cors = tower_http::cors::CorsLayer::permissive();

    axum::Router::new()
        .route("/notes", axum::routing::get(routes::list_notes))
        .route("/notes/add", axum::routing::post(routes::add_note))
        .route(
            "/notes/:id",
            axum::routing::put(routes::replace_note).delete(routes::delete_note),
        )
        .route("/notes/watch", axum::routing::get(routes::watch_notes))
        .route("/health", axum::routing::get(routes::health))
        .with_state(state)
        .layer(cors)
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = Config::from_env();

    let db = match Database::open(&config.database_url) {
        Ok(db) => db,
        Err(e) => {
            log::error!("Failed to open database {}: {}", config.database_url, e);
            std::process::exit(1);
        }
    };
    log::info!("[DB] Using {}", config.database_url);

    let state = Arc::new(AppState::new(db));
    let app = router(state);

    let addr = config.bind_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            log::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    log::info!("Notes Service listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        log::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
