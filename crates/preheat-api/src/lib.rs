//! preheat-api: REST API for the preheat monitor.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/v1/watches` | Watch a preheat task on an instance |
//! | GET | `/api/v1/histories` | List preheat history records |
//! | GET | `/api/v1/histories/{task_id}` | Get one history record |
//! | GET | `/api/v1/instances` | List provider instances |
//! | GET | `/api/v1/instances/{id}` | Get one provider instance |
//!
//! List endpoints accept `page`, `page_size` and `keyword`; any other query
//! key is an equality filter on the record field of that name.

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use preheat_monitor::Monitor;
use preheat_state::{HistoryStore, InstanceStore};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub monitor: Monitor,
    pub instances: Arc<dyn InstanceStore>,
    pub histories: Arc<dyn HistoryStore>,
}

/// Build the API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/watches", post(handlers::create_watch))
        .route("/histories", get(handlers::list_histories))
        .route("/histories/{task_id}", get(handlers::get_history))
        .route("/instances", get(handlers::list_instances))
        .route("/instances/{id}", get(handlers::get_instance))
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}
