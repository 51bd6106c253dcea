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

use crate::types::card::CardId;
use crate::types::card_status::CardStatus;
use crate::types::timestamp::Timestamp;

/// One entry in a card's review log. Written alongside the card update and
/// never modified afterwards.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecord {
    pub review_id: i64,
    pub card_id: CardId,
    pub reviewed_at: Timestamp,
    pub quality: u8,
    /// The interval computed by this review.
    pub interval: u32,
    pub ease_factor: f64,
    pub status: CardStatus,
}
