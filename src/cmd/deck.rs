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
use crate::types::deck::DeckId;
use crate::types::timestamp::Timestamp;

pub fn create_deck(db: &Database, owner: &str, name: &str) -> Fallible<()> {
    let deck = db.create_deck(owner, name, Timestamp::now())?;
    print_json(&deck)
}

pub fn show_deck(db: &Database, deck_id: DeckId) -> Fallible<()> {
    let deck = db.load_deck(deck_id)?;
    if !deck.is_consistent() {
        log::error!("Deck {deck_id} counters do not add up to its card total.");
    }
    print_json(&deck)
}

pub fn list_decks(db: &Database, owner: Option<&str>) -> Fallible<()> {
    let decks = db.list_decks(owner)?;
    print_json(&decks)
}

pub fn delete_deck(db: &Database, deck_id: DeckId) -> Fallible<()> {
    db.delete_deck(deck_id)?;
    println!("Deleted deck {deck_id}.");
    Ok(())
}
