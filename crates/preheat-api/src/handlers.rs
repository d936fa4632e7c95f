//! REST API handlers.
//!
//! Reads go straight to the stores; watch registration goes through the
//! monitor so de-duplication applies to API callers too.

use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use preheat_state::{HistoryStore, InstanceStore, QueryParam, StateError};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

fn state_error(e: StateError) -> Response {
    match e {
        StateError::NotFound(_) => error_response(&e.to_string(), StatusCode::NOT_FOUND),
        StateError::Validation(_) | StateError::InvalidStatus(_) | StateError::EmptyKey(_) => {
            error_response(&e.to_string(), StatusCode::BAD_REQUEST)
        }
        _ => {
            error!(error = %e, "state store failure");
            error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Turn raw query pairs into a [`QueryParam`].
///
/// `page`, `page_size` and `keyword` are reserved; every other key becomes
/// an equality filter.
fn query_param(raw: HashMap<String, String>) -> Result<QueryParam, String> {
    let mut params = QueryParam::default();
    for (key, value) in raw {
        match key.as_str() {
            "page" => {
                params.page = value
                    .parse()
                    .map_err(|_| format!("invalid page: {value}"))?;
            }
            "page_size" => {
                params.page_size = value
                    .parse()
                    .map_err(|_| format!("invalid page_size: {value}"))?;
            }
            "keyword" => params.keyword = Some(value),
            _ => {
                params.additions.insert(key, serde_json::Value::String(value));
            }
        }
    }
    Ok(params)
}

// ── Watches ────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize)]
pub struct WatchRequest {
    pub instance_id: String,
    pub task_id: String,
}

/// POST /api/v1/watches
pub async fn create_watch(
    State(state): State<ApiState>,
    Json(req): Json<WatchRequest>,
) -> Response {
    if req.instance_id.is_empty() || req.task_id.is_empty() {
        return error_response("instance_id and task_id are required", StatusCode::BAD_REQUEST);
    }
    if let Err(e) = state.instances.get(&req.instance_id) {
        return state_error(e);
    }

    if state.monitor.watch_progress(&req.instance_id, &req.task_id) {
        debug!(instance_id = %req.instance_id, task_id = %req.task_id, "watch registered");
        (StatusCode::ACCEPTED, ApiResponse::ok(req)).into_response()
    } else {
        error_response(
            &format!("task {} on {} is already watched", req.task_id, req.instance_id),
            StatusCode::CONFLICT,
        )
    }
}

// ── Histories ──────────────────────────────────────────────────

/// GET /api/v1/histories
pub async fn list_histories(
    State(state): State<ApiState>,
    Query(raw): Query<HashMap<String, String>>,
) -> Response {
    let params = match query_param(raw) {
        Ok(params) => params,
        Err(msg) => return error_response(&msg, StatusCode::BAD_REQUEST),
    };
    match state.histories.load_histories(Some(&params)) {
        Ok(records) => ApiResponse::ok(records).into_response(),
        Err(e) => state_error(e),
    }
}

/// GET /api/v1/histories/{task_id}
pub async fn get_history(
    State(state): State<ApiState>,
    Path(task_id): Path<String>,
) -> Response {
    match state.histories.get_history(&task_id) {
        Ok(record) => ApiResponse::ok(record).into_response(),
        Err(e) => state_error(e),
    }
}

// ── Instances ──────────────────────────────────────────────────

/// GET /api/v1/instances
pub async fn list_instances(
    State(state): State<ApiState>,
    Query(raw): Query<HashMap<String, String>>,
) -> Response {
    let params = match query_param(raw) {
        Ok(params) => params,
        Err(msg) => return error_response(&msg, StatusCode::BAD_REQUEST),
    };
    match state.instances.list(Some(&params)) {
        Ok(instances) => {
            let redacted: Vec<_> = instances.iter().map(|i| i.redacted()).collect();
            ApiResponse::ok(redacted).into_response()
        }
        Err(e) => state_error(e),
    }
}

/// GET /api/v1/instances/{id}
pub async fn get_instance(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.instances.get(&id) {
        Ok(instance) => ApiResponse::ok(instance.redacted()).into_response(),
        Err(e) => state_error(e),
    }
}
