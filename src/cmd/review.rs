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

use crate::cmd::print_json;
use crate::db::Database;
use crate::error::Fallible;
use crate::sm2::Quality;
use crate::types::card::CardId;
use crate::types::timestamp::Timestamp;

/// Submit a review. The grade is clamped to `[0, 5]`.
pub fn review_card(db: &Database, card_id: CardId, quality: i64) -> Fallible<()> {
    let card = db.review_card(card_id, Quality::clamped(quality), Timestamp::now())?;
    print_json(&card)
}
