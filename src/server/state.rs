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

use axum::http::HeaderMap;

use crate::db::Database;
use crate::error::ErrorKind;
use crate::error::ErrorReport;
use crate::error::Fallible;
use crate::types::deck::Deck;

/// Requests that carry this header are checked against the deck owner.
/// Requests without it are taken as already authorised upstream.
pub const OWNER_HEADER: &str = "x-owner";

#[derive(Clone)]
pub struct ServerState {
    pub db: Database,
    pub session_limit: Option<usize>,
}

pub fn authorize(headers: &HeaderMap, deck: &Deck) -> Fallible<()> {
    match headers.get(OWNER_HEADER) {
        None => Ok(()),
        Some(value) => {
            if value.to_str().ok() == Some(deck.owner.as_str()) {
                Ok(())
            } else {
                Err(ErrorReport::with_kind(
                    ErrorKind::OwnershipViolation,
                    format!("deck {} belongs to someone else.", deck.id),
                ))
            }
        }
    }
}
