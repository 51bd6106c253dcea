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

//! A variant of the SM-2 scheduling formula.
//!
//! Everything here is pure: no I/O, no clock reads, no randomness. Inputs
//! outside their domains are clamped, never rejected.

use serde::Serialize;

use crate::types::card_status::CardStatus;
use crate::types::timestamp::Timestamp;

/// The ease factor a new card starts with.
pub const INITIAL_EASE_FACTOR: f64 = 2.5;

/// The lowest ease factor a card can have.
pub const MIN_EASE_FACTOR: f64 = 1.3;

/// The maximum review interval in days.
pub const MAX_INTERVAL: u32 = 365;

/// Cards with an interval of at least this many days are mastered.
pub const MASTERY_THRESHOLD: u32 = 21;

/// A self-reported recall score in `[0, 5]`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize)]
pub struct Quality(u8);

impl Quality {
    /// Clamps any integer into the valid range.
    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(0, 5) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Grades of 3 and up count as recalled.
    pub fn is_passing(self) -> bool {
        self.0 >= 3
    }
}

/// The scheduling parameters that follow from one review.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Schedule {
    pub status: CardStatus,
    pub interval: u32,
    pub ease_factor: f64,
}

impl Schedule {
    /// The parameters of a card that has never been reviewed. This is not the
    /// same as reviewing with a quality of zero.
    pub fn initial() -> Self {
        Self {
            status: CardStatus::New,
            interval: 0,
            ease_factor: INITIAL_EASE_FACTOR,
        }
    }
}

/// The full outcome of a review: new parameters plus the next due instant.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Evaluation {
    pub status: CardStatus,
    pub interval: u32,
    pub ease_factor: f64,
    pub next_review: Timestamp,
}

/// `EF' = EF + (0.1 - (5 - q) * (0.08 + (5 - q) * 0.02))`, floored at 1.3.
pub fn next_ease_factor(quality: Quality, ease_factor: f64) -> f64 {
    let miss = f64::from(5 - quality.value());
    let ease_factor = ease_factor.max(MIN_EASE_FACTOR) + (0.1 - miss * (0.08 + miss * 0.02));
    ease_factor.max(MIN_EASE_FACTOR)
}

/// The state machine. The previous status does not influence the result,
/// but every arm is spelled out so that each transition is visible.
pub fn transition(
    status: CardStatus,
    quality: Quality,
    interval: u32,
    ease_factor: f64,
) -> Schedule {
    let ease_factor = next_ease_factor(quality, ease_factor);
    let interval = interval.min(MAX_INTERVAL);
    match (status, quality.is_passing()) {
        // A failed review resets the interval, whatever came before. `New` is
        // never re-entered.
        (CardStatus::New | CardStatus::Learning | CardStatus::Mastered, false) => Schedule {
            status: CardStatus::Learning,
            interval: 1,
            ease_factor,
        },
        (CardStatus::New | CardStatus::Learning | CardStatus::Mastered, true) => {
            let interval = match interval {
                0 => 1,
                1 => 6,
                n => (f64::from(n) * ease_factor).round() as u32,
            };
            let interval = interval.min(MAX_INTERVAL);
            let status = if interval >= MASTERY_THRESHOLD {
                CardStatus::Mastered
            } else {
                CardStatus::Learning
            };
            Schedule {
                status,
                interval,
                ease_factor,
            }
        }
    }
}

/// Computes the outcome of a review at `now`.
///
/// `repetitions` is accepted for symmetry with the stored card and does not
/// affect the result.
pub fn evaluate(
    status: CardStatus,
    quality: Quality,
    interval: u32,
    ease_factor: f64,
    _repetitions: u32,
    now: Timestamp,
) -> Evaluation {
    let schedule = transition(status, quality, interval, ease_factor);
    Evaluation {
        status: schedule.status,
        interval: schedule.interval,
        ease_factor: schedule.ease_factor,
        next_review: now.plus_days(schedule.interval),
    }
}
