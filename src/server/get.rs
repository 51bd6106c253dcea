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
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use serde::Deserialize;

use crate::server::server::ApiError;
use crate::server::state::ServerState;
use crate::server::state::authorize;
use crate::types::card::Card;
use crate::types::deck::Deck;
use crate::types::deck::DeckId;
use crate::types::timestamp::Timestamp;

#[derive(Deserialize)]
pub struct DueQuery {
    limit: Option<usize>,
}

pub async fn deck_handler(
    State(state): State<ServerState>,
    Path(deck_id): Path<DeckId>,
    headers: HeaderMap,
) -> Result<Json<Deck>, ApiError> {
    let deck = state.db.load_deck(deck_id)?;
    authorize(&headers, &deck)?;
    Ok(Json(deck))
}

pub async fn due_handler(
    State(state): State<ServerState>,
    Path(deck_id): Path<DeckId>,
    Query(query): Query<DueQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<Card>>, ApiError> {
    let deck = state.db.load_deck(deck_id)?;
    authorize(&headers, &deck)?;
    let limit = query.limit.or(state.session_limit);
    let cards = state.db.due_cards(deck_id, Timestamp::now(), limit)?;
    Ok(Json(cards))
}
