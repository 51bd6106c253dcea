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

use crate::sm2::Schedule;
use crate::types::card_status::CardStatus;
use crate::types::timestamp::Timestamp;

pub type CardId = i64;

/// A card together with its scheduling state.
#[derive(Clone, PartialEq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: CardId,
    /// The owning deck. Never changes after creation.
    pub deck_id: i64,
    pub question: String,
    pub answer: String,
    pub status: CardStatus,
    /// Days until the next review.
    pub interval: u32,
    pub ease_factor: f64,
    /// The number of completed reviews.
    pub repetitions: u32,
    pub next_review: Timestamp,
    pub last_reviewed: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl Card {
    /// A card that has just been created, before it has an ID.
    pub fn fresh(deck_id: i64, question: String, answer: String, now: Timestamp) -> Self {
        let schedule = Schedule::initial();
        Self {
            id: 0,
            deck_id,
            question,
            answer,
            status: schedule.status,
            interval: schedule.interval,
            ease_factor: schedule.ease_factor,
            repetitions: 0,
            next_review: now,
            last_reviewed: None,
            created_at: now,
        }
    }

    /// Due when `now >= next_review`. A never-reviewed card is always due.
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.last_reviewed.is_none() || self.next_review <= now
    }
}
