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

use serde::Serialize;

use crate::types::progress::StudyProgress;
use crate::types::timestamp::Timestamp;

pub type DeckId = i64;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    pub id: DeckId,
    /// Opaque reference to the owning user.
    pub owner: String,
    pub name: String,
    pub total_cards: i64,
    pub study_progress: StudyProgress,
    /// The most recent review of any card in the deck.
    pub last_studied: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl Deck {
    /// Whether the per-status counters add up to the card total.
    pub fn is_consistent(&self) -> bool {
        self.study_progress.sum() == self.total_cards
    }
}
