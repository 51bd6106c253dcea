// Copyright 2025 Fernando Borretti
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use serde_json::json;
use tokio::net::TcpListener;

use crate::db::Database;
use crate::error::ErrorKind;
use crate::error::ErrorReport;
use crate::error::Fallible;
use crate::server::get::deck_handler;
use crate::server::get::due_handler;
use crate::server::post::review_handler;
use crate::server::state::ServerState;

/// An engine error on its way out as an HTTP response.
pub struct ApiError(ErrorReport);

impl From<ErrorReport> for ApiError {
    fn from(value: ErrorReport) -> Self {
        Self(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::OwnershipViolation => StatusCode::FORBIDDEN,
            ErrorKind::AggregateInconsistency | ErrorKind::Other => {
                log::error!("{}", self.0);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.0.message() }))).into_response()
    }
}

pub fn router(state: ServerState) -> Router {
    let app = Router::new();
    let app = app.route("/decks/{deck_id}", get(deck_handler));
    let app = app.route("/decks/{deck_id}/due", get(due_handler));
    let app = app.route("/cards/{card_id}/review", post(review_handler));
    let app = app.fallback(not_found_handler);
    app.with_state(state)
}

pub async fn start_server(db: Database, bind: &str, session_limit: Option<usize>) -> Fallible<()> {
    let state = ServerState { db, session_limit };
    let app = router(state);
    log::info!("Starting server on {bind}");
    let listener = TcpListener::bind(bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::debug!("Shutting down.");
        })
        .await?;
    Ok(())
}

async fn not_found_handler() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" })))
}
