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
use axum::extract::State;
use axum::http::HeaderMap;
use serde::Deserialize;
use serde::Deserializer;
use serde::de::Error;
use serde_json::Number;

use crate::server::server::ApiError;
use crate::server::state::ServerState;
use crate::server::state::authorize;
use crate::sm2::Quality;
use crate::types::card::Card;
use crate::types::card::CardId;
use crate::types::timestamp::Timestamp;

#[derive(Deserialize)]
pub struct ReviewForm {
    #[serde(deserialize_with = "saturating_grade")]
    quality: i64,
}

/// Integer grades too large for an `i64` saturate instead of failing, and are
/// then clamped like any other out-of-range grade.
fn saturating_grade<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let number = Number::deserialize(deserializer)?;
    if let Some(n) = number.as_i64() {
        return Ok(n);
    }
    if number.as_u64().is_some() {
        return Ok(i64::MAX);
    }
    match number.as_f64() {
        // `as` saturates.
        Some(f) if f.fract() == 0.0 => Ok(f as i64),
        _ => Err(D::Error::custom("quality must be an integer")),
    }
}

pub async fn review_handler(
    State(state): State<ServerState>,
    Path(card_id): Path<CardId>,
    headers: HeaderMap,
    Json(form): Json<ReviewForm>,
) -> Result<Json<Card>, ApiError> {
    let card = state.db.load_card(card_id)?;
    let deck = state.db.load_deck(card.deck_id)?;
    authorize(&headers, &deck)?;
    let card = state
        .db
        .review_card(card_id, Quality::clamped(form.quality), Timestamp::now())?;
    Ok(Json(card))
}
