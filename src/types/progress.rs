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

use crate::types::card_status::CardStatus;

/// Per-status card counts for a deck.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize)]
pub struct StudyProgress {
    pub new: i64,
    pub learning: i64,
    pub mastered: i64,
}

impl StudyProgress {
    pub fn sum(&self) -> i64 {
        self.new + self.learning + self.mastered
    }

    /// Count one card with the given status.
    pub fn tally(&mut self, status: CardStatus) {
        match status {
            CardStatus::New => self.new += 1,
            CardStatus::Learning => self.learning += 1,
            CardStatus::Mastered => self.mastered += 1,
        }
    }
}

/// A change to a deck's counters caused by a single card event.
///
/// Deltas commute, so they can be applied as in-place increments in any order
/// without losing updates.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct ProgressDelta {
    pub new: i64,
    pub learning: i64,
    pub mastered: i64,
    pub total: i64,
}

impl ProgressDelta {
    pub fn created(status: CardStatus) -> Self {
        let mut delta = Self {
            total: 1,
            ..Self::default()
        };
        delta.bump(status, 1);
        delta
    }

    pub fn transitioned(from: CardStatus, to: CardStatus) -> Self {
        let mut delta = Self::default();
        if from != to {
            delta.bump(from, -1);
            delta.bump(to, 1);
        }
        delta
    }

    pub fn deleted(status: CardStatus) -> Self {
        let mut delta = Self {
            total: -1,
            ..Self::default()
        };
        delta.bump(status, -1);
        delta
    }

    fn bump(&mut self, status: CardStatus, by: i64) {
        match status {
            CardStatus::New => self.new += by,
            CardStatus::Learning => self.learning += by,
            CardStatus::Mastered => self.mastered += by,
        }
    }
}
