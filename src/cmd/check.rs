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

use crate::db::Audit;
use crate::db::Database;
use crate::error::ErrorKind;
use crate::error::ErrorReport;
use crate::error::Fallible;
use crate::types::deck::DeckId;

fn describe(audit: &Audit) -> String {
    format!(
        "stored new={} learning={} mastered={} total={}; counted new={} learning={} mastered={} total={}",
        audit.stored.new,
        audit.stored.learning,
        audit.stored.mastered,
        audit.stored_total,
        audit.counted.new,
        audit.counted.learning,
        audit.counted.mastered,
        audit.counted.sum(),
    )
}

/// Verify that a deck's counters match its cards. Fails if they drifted.
pub fn check_deck(db: &Database, deck_id: DeckId) -> Fallible<()> {
    let audit = db.audit_deck(deck_id)?;
    if !audit.is_consistent() {
        log::error!("Deck {deck_id} is inconsistent: {}", describe(&audit));
        return Err(ErrorReport::with_kind(
            ErrorKind::AggregateInconsistency,
            format!("deck {deck_id} counters are out of sync; run `reconcile`."),
        ));
    }
    println!("ok");
    Ok(())
}

/// Rewrite a deck's counters from its cards.
pub fn reconcile_deck(db: &Database, deck_id: DeckId) -> Fallible<()> {
    let audit = db.reconcile_deck(deck_id)?;
    if audit.is_consistent() {
        println!("ok");
    } else {
        println!("repaired: {}", describe(&audit));
    }
    Ok(())
}
