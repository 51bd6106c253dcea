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
use crate::types::card::CardId;
use crate::types::deck::DeckId;
use crate::types::timestamp::Timestamp;

pub fn add_card(db: &Database, deck_id: DeckId, question: &str, answer: &str) -> Fallible<()> {
    let card = db.create_card(deck_id, question, answer, Timestamp::now())?;
    print_json(&card)
}

pub fn show_card(db: &Database, card_id: CardId) -> Fallible<()> {
    let card = db.load_card(card_id)?;
    print_json(&card)
}

pub fn delete_card(db: &Database, card_id: CardId) -> Fallible<()> {
    db.delete_card(card_id)?;
    println!("Deleted card {card_id}.");
    Ok(())
}

pub fn card_history(db: &Database, card_id: CardId) -> Fallible<()> {
    let reviews = db.card_reviews(card_id)?;
    print_json(&reviews)
}
