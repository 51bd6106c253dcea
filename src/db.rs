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

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::Transaction;
use rusqlite::config::DbConfig;

use crate::error::ErrorKind;
use crate::error::ErrorReport;
use crate::error::Fallible;
use crate::sm2::Quality;
use crate::sm2::evaluate;
use crate::types::card::Card;
use crate::types::card::CardId;
use crate::types::card_status::CardStatus;
use crate::types::deck::Deck;
use crate::types::deck::DeckId;
use crate::types::progress::ProgressDelta;
use crate::types::progress::StudyProgress;
use crate::types::review::ReviewRecord;
use crate::types::timestamp::Timestamp;

const CARD_COLUMNS: &str = "card_id, deck_id, question, answer, status, interval_days, ease_factor, repetitions, next_review, last_reviewed, created_at";

const DECK_COLUMNS: &str = "deck_id, owner, name, total_cards, new_count, learning_count, mastered_count, last_studied, created_at";

/// The persistence store. Every operation that changes a card's status also
/// adjusts the owning deck's counters inside the same transaction.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

/// The outcome of comparing a deck's stored counters against a fresh count of
/// its cards.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Audit {
    pub deck_id: DeckId,
    pub stored: StudyProgress,
    pub stored_total: i64,
    pub counted: StudyProgress,
}

/// How long a writer waits on a lock held by another process.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

impl Audit {
    pub fn is_consistent(&self) -> bool {
        self.stored == self.counted && self.stored_total == self.counted.sum()
    }
}

impl Database {
    pub fn new(database_path: &str) -> Fallible<Self> {
        log::debug!("Opening database at {database_path}");
        let mut conn = Connection::open(database_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.set_db_config(DbConfig::SQLITE_DBCONFIG_ENABLE_FKEY, true)?;
        {
            let tx = conn.transaction()?;
            if !probe_schema_exists(&tx)? {
                log::debug!("Creating schema.");
                tx.execute_batch(include_str!("schema.sql"))?;
                tx.commit()?;
            }
        }
        let conn = Arc::new(Mutex::new(conn));
        Ok(Self { conn })
    }

    // Decks.

    pub fn create_deck(&self, owner: &str, name: &str, now: Timestamp) -> Fallible<Deck> {
        let mut conn = self.acquire();
        let tx = conn.transaction()?;
        let sql = "insert into decks (owner, name, created_at) values (?, ?, ?) returning deck_id;";
        let deck_id: DeckId = tx.query_row(sql, (owner, name, now), |row| row.get(0))?;
        let deck = select_deck(&tx, deck_id)?.ok_or_else(|| deck_not_found(deck_id))?;
        tx.commit()?;
        log::debug!("Created deck {deck_id} for {owner}.");
        Ok(deck)
    }

    pub fn load_deck(&self, deck_id: DeckId) -> Fallible<Deck> {
        let conn = self.acquire();
        select_deck(&conn, deck_id)?.ok_or_else(|| deck_not_found(deck_id))
    }

    /// List decks, optionally only those of one owner.
    pub fn list_decks(&self, owner: Option<&str>) -> Fallible<Vec<Deck>> {
        let conn = self.acquire();
        let sql = format!(
            "select {DECK_COLUMNS} from decks where ?1 is null or owner = ?1 order by deck_id;"
        );
        let mut stmt = conn.prepare(&sql)?;
        let decks = stmt
            .query_map([owner], deck_from_row)?
            .collect::<Result<Vec<Deck>, rusqlite::Error>>()?;
        Ok(decks)
    }

    /// Delete a deck along with all of its cards and their reviews.
    pub fn delete_deck(&self, deck_id: DeckId) -> Fallible<()> {
        let mut conn = self.acquire();
        let tx = conn.transaction()?;
        let deleted = tx.execute("delete from decks where deck_id = ?;", [deck_id])?;
        if deleted == 0 {
            return Err(deck_not_found(deck_id));
        }
        tx.commit()?;
        log::debug!("Deleted deck {deck_id}.");
        Ok(())
    }

    // Cards.

    /// Add a new card to a deck. The card starts out `new` and the deck's
    /// `new` bucket and total grow by one.
    pub fn create_card(
        &self,
        deck_id: DeckId,
        question: &str,
        answer: &str,
        now: Timestamp,
    ) -> Fallible<Card> {
        let mut conn = self.acquire();
        let tx = conn.transaction()?;
        if select_deck(&tx, deck_id)?.is_none() {
            return Err(deck_not_found(deck_id));
        }
        let mut card = Card::fresh(deck_id, question.to_string(), answer.to_string(), now);
        card.id = insert_card(&tx, &card)?;
        adjust_deck_counters(&tx, deck_id, ProgressDelta::created(card.status), None)?;
        tx.commit()?;
        log::debug!("Added card {} to deck {deck_id}.", card.id);
        Ok(card)
    }

    pub fn load_card(&self, card_id: CardId) -> Fallible<Card> {
        let conn = self.acquire();
        select_card(&conn, card_id)?.ok_or_else(|| card_not_found(card_id))
    }

    /// Apply a review to a card. The card update, the review log entry, and
    /// the deck counter adjustment commit together or not at all.
    pub fn review_card(&self, card_id: CardId, quality: Quality, now: Timestamp) -> Fallible<Card> {
        let mut conn = self.acquire();
        let tx = conn.transaction()?;
        let mut card = select_card(&tx, card_id)?.ok_or_else(|| card_not_found(card_id))?;
        let previous = card.status;
        let evaluation = evaluate(
            card.status,
            quality,
            card.interval,
            card.ease_factor,
            card.repetitions,
            now,
        );
        card.status = evaluation.status;
        card.interval = evaluation.interval;
        card.ease_factor = evaluation.ease_factor;
        card.next_review = evaluation.next_review;
        card.repetitions += 1;
        card.last_reviewed = Some(now);

        update_card(&tx, &card)?;
        insert_review(&tx, &card, quality, now)?;
        adjust_deck_counters(
            &tx,
            card.deck_id,
            ProgressDelta::transitioned(previous, card.status),
            Some(now),
        )?;
        tx.commit()?;

        log::debug!(
            "card {} q={} {} -> {} I={}d EF={:.2} due={}",
            card.id,
            quality.value(),
            previous,
            card.status,
            card.interval,
            card.ease_factor,
            card.next_review
        );
        Ok(card)
    }

    /// Delete a card, removing it from its deck's counters.
    pub fn delete_card(&self, card_id: CardId) -> Fallible<()> {
        let mut conn = self.acquire();
        let tx = conn.transaction()?;
        let card = select_card(&tx, card_id)?.ok_or_else(|| card_not_found(card_id))?;
        tx.execute("delete from cards where card_id = ?;", [card_id])?;
        adjust_deck_counters(&tx, card.deck_id, ProgressDelta::deleted(card.status), None)?;
        tx.commit()?;
        log::debug!("Deleted card {card_id} from deck {}.", card.deck_id);
        Ok(())
    }

    /// The cards of a deck that are due at `now`, most overdue first.
    pub fn due_cards(
        &self,
        deck_id: DeckId,
        now: Timestamp,
        limit: Option<usize>,
    ) -> Fallible<Vec<Card>> {
        let conn = self.acquire();
        if select_deck(&conn, deck_id)?.is_none() {
            return Err(deck_not_found(deck_id));
        }
        // A negative limit means no limit.
        let limit: i64 = limit.map(|l| l as i64).unwrap_or(-1);
        let sql = format!(
            "select {CARD_COLUMNS} from cards where deck_id = ? and (last_reviewed is null or next_review <= ?) order by next_review asc, card_id asc limit ?;"
        );
        let mut stmt = conn.prepare(&sql)?;
        let cards = stmt
            .query_map((deck_id, now, limit), card_from_row)?
            .collect::<Result<Vec<Card>, rusqlite::Error>>()?;
        debug_assert!(cards.iter().all(|card| card.is_due(now)));
        Ok(cards)
    }

    /// A card's review log, oldest first.
    pub fn card_reviews(&self, card_id: CardId) -> Fallible<Vec<ReviewRecord>> {
        let conn = self.acquire();
        if select_card(&conn, card_id)?.is_none() {
            return Err(card_not_found(card_id));
        }
        let sql = "select review_id, card_id, reviewed_at, quality, interval_days, ease_factor, status from reviews where card_id = ? order by review_id;";
        let mut stmt = conn.prepare(sql)?;
        let reviews = stmt
            .query_map([card_id], |row| {
                Ok(ReviewRecord {
                    review_id: row.get(0)?,
                    card_id: row.get(1)?,
                    reviewed_at: row.get(2)?,
                    quality: row.get(3)?,
                    interval: row.get(4)?,
                    ease_factor: row.get(5)?,
                    status: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<ReviewRecord>, rusqlite::Error>>()?;
        Ok(reviews)
    }

    // Integrity.

    /// Recount the statuses of a deck's cards and compare with the stored
    /// counters. Read-only.
    pub fn audit_deck(&self, deck_id: DeckId) -> Fallible<Audit> {
        let conn = self.acquire();
        audit(&conn, deck_id)
    }

    /// Overwrite a deck's counters with a fresh count. Returns the audit taken
    /// before the repair.
    pub fn reconcile_deck(&self, deck_id: DeckId) -> Fallible<Audit> {
        let mut conn = self.acquire();
        let tx = conn.transaction()?;
        let audit = audit(&tx, deck_id)?;
        if !audit.is_consistent() {
            log::error!(
                "Deck {deck_id} counters drifted: stored {:?} (total {}), counted {:?}. Repairing.",
                audit.stored,
                audit.stored_total,
                audit.counted
            );
            let sql = "update decks set new_count = ?, learning_count = ?, mastered_count = ?, total_cards = ? where deck_id = ?;";
            tx.execute(
                sql,
                (
                    audit.counted.new,
                    audit.counted.learning,
                    audit.counted.mastered,
                    audit.counted.sum(),
                    deck_id,
                ),
            )?;
        }
        tx.commit()?;
        Ok(audit)
    }

    /// Run raw SQL against the database, bypassing the counters.
    #[cfg(test)]
    pub fn execute_batch(&self, sql: &str) -> Fallible<()> {
        self.acquire().execute_batch(sql)?;
        Ok(())
    }

    fn acquire(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }
}

fn card_not_found(card_id: CardId) -> ErrorReport {
    ErrorReport::not_found(format!("no card with ID {card_id}."))
}

fn deck_not_found(deck_id: DeckId) -> ErrorReport {
    ErrorReport::not_found(format!("no deck with ID {deck_id}."))
}

fn card_from_row(row: &Row) -> rusqlite::Result<Card> {
    Ok(Card {
        id: row.get(0)?,
        deck_id: row.get(1)?,
        question: row.get(2)?,
        answer: row.get(3)?,
        status: row.get(4)?,
        interval: row.get(5)?,
        ease_factor: row.get(6)?,
        repetitions: row.get(7)?,
        next_review: row.get(8)?,
        last_reviewed: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn deck_from_row(row: &Row) -> rusqlite::Result<Deck> {
    Ok(Deck {
        id: row.get(0)?,
        owner: row.get(1)?,
        name: row.get(2)?,
        total_cards: row.get(3)?,
        study_progress: StudyProgress {
            new: row.get(4)?,
            learning: row.get(5)?,
            mastered: row.get(6)?,
        },
        last_studied: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn select_card(conn: &Connection, card_id: CardId) -> Fallible<Option<Card>> {
    let sql = format!("select {CARD_COLUMNS} from cards where card_id = ?;");
    let card = conn
        .query_row(&sql, [card_id], card_from_row)
        .optional()?;
    Ok(card)
}

fn select_deck(conn: &Connection, deck_id: DeckId) -> Fallible<Option<Deck>> {
    let sql = format!("select {DECK_COLUMNS} from decks where deck_id = ?;");
    let deck = conn
        .query_row(&sql, [deck_id], deck_from_row)
        .optional()?;
    Ok(deck)
}

fn insert_card(tx: &Transaction, card: &Card) -> Fallible<CardId> {
    let sql = "insert into cards (deck_id, question, answer, status, interval_days, ease_factor, repetitions, next_review, last_reviewed, created_at) values (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) returning card_id;";
    let card_id: CardId = tx.query_row(
        sql,
        (
            card.deck_id,
            &card.question,
            &card.answer,
            card.status,
            card.interval,
            card.ease_factor,
            card.repetitions,
            card.next_review,
            card.last_reviewed,
            card.created_at,
        ),
        |row| row.get(0),
    )?;
    Ok(card_id)
}

fn update_card(tx: &Transaction, card: &Card) -> Fallible<()> {
    let sql = "update cards set status = ?, interval_days = ?, ease_factor = ?, repetitions = ?, next_review = ?, last_reviewed = ? where card_id = ?;";
    let updated = tx.execute(
        sql,
        (
            card.status,
            card.interval,
            card.ease_factor,
            card.repetitions,
            card.next_review,
            card.last_reviewed,
            card.id,
        ),
    )?;
    if updated == 0 {
        return Err(card_not_found(card.id));
    }
    Ok(())
}

fn insert_review(tx: &Transaction, card: &Card, quality: Quality, now: Timestamp) -> Fallible<i64> {
    let sql = "insert into reviews (card_id, reviewed_at, quality, interval_days, ease_factor, status) values (?, ?, ?, ?, ?, ?) returning review_id;";
    let review_id: i64 = tx.query_row(
        sql,
        (
            card.id,
            now,
            quality.value(),
            card.interval,
            card.ease_factor,
            card.status,
        ),
        |row| row.get(0),
    )?;
    Ok(review_id)
}

/// Apply a counter delta as in-place increments. Every call touches the deck
/// row, even for a zero delta, so a missing deck aborts the surrounding
/// transaction.
fn adjust_deck_counters(
    tx: &Transaction,
    deck_id: DeckId,
    delta: ProgressDelta,
    studied_at: Option<Timestamp>,
) -> Fallible<()> {
    let sql = "update decks set new_count = new_count + ?, learning_count = learning_count + ?, mastered_count = mastered_count + ?, total_cards = total_cards + ?, last_studied = coalesce(?, last_studied) where deck_id = ?;";
    let result = tx.execute(
        sql,
        (
            delta.new,
            delta.learning,
            delta.mastered,
            delta.total,
            studied_at,
            deck_id,
        ),
    );
    match result {
        Ok(1) => Ok(()),
        Ok(_) => {
            log::error!("Deck {deck_id} is missing while one of its cards was being written.");
            Err(ErrorReport::with_kind(
                ErrorKind::AggregateInconsistency,
                format!("deck {deck_id} could not be updated; the change was rolled back."),
            ))
        }
        Err(rusqlite::Error::SqliteFailure(e, msg)) if e.code == ErrorCode::ConstraintViolation => {
            log::error!(
                "Deck {deck_id} counters would go negative applying {delta:?}: {}",
                msg.unwrap_or_default()
            );
            Err(ErrorReport::with_kind(
                ErrorKind::AggregateInconsistency,
                format!("deck {deck_id} counters are out of sync; the change was rolled back."),
            ))
        }
        Err(e) => Err(e.into()),
    }
}

fn count_statuses(conn: &Connection, deck_id: DeckId) -> Fallible<StudyProgress> {
    let mut progress = StudyProgress::default();
    let mut stmt = conn.prepare("select status from cards where deck_id = ?;")?;
    let mut rows = stmt.query([deck_id])?;
    while let Some(row) = rows.next()? {
        let status: CardStatus = row.get(0)?;
        progress.tally(status);
    }
    Ok(progress)
}

fn audit(conn: &Connection, deck_id: DeckId) -> Fallible<Audit> {
    let deck = select_deck(conn, deck_id)?.ok_or_else(|| deck_not_found(deck_id))?;
    let counted = count_statuses(conn, deck_id)?;
    Ok(Audit {
        deck_id,
        stored: deck.study_progress,
        stored_total: deck.total_cards,
        counted,
    })
}

fn probe_schema_exists(tx: &Transaction) -> Fallible<bool> {
    let sql = "select count(*) from sqlite_master where type='table' AND name=?;";
    let count: i64 = tx.query_row(sql, ["decks"], |row| row.get(0))?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use std::thread;

    use chrono::TimeZone;
    use chrono::Utc;

    use super::*;
    use crate::helper::create_tmp_database;

    fn ts(minutes: i64) -> Timestamp {
        let base = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
        Timestamp::new(base + chrono::Duration::minutes(minutes))
    }

    fn q(value: i64) -> Quality {
        Quality::clamped(value)
    }

    fn assert_consistent(db: &Database, deck_id: DeckId) -> Fallible<()> {
        let deck = db.load_deck(deck_id)?;
        assert!(deck.is_consistent(), "counters do not add up: {deck:?}");
        let audit = db.audit_deck(deck_id)?;
        assert!(audit.is_consistent(), "counters drifted: {audit:?}");
        Ok(())
    }

    #[test]
    fn test_create_and_load_deck() -> Fallible<()> {
        let (_dir, db) = create_tmp_database()?;
        let deck = db.create_deck("alice", "Spanish", ts(0))?;
        let loaded = db.load_deck(deck.id)?;
        assert_eq!(loaded.owner, "alice");
        assert_eq!(loaded.name, "Spanish");
        assert_eq!(loaded.total_cards, 0);
        assert_eq!(loaded.study_progress, StudyProgress::default());
        assert!(loaded.last_studied.is_none());
        Ok(())
    }

    #[test]
    fn test_missing_records() -> Fallible<()> {
        let (_dir, db) = create_tmp_database()?;
        assert_eq!(db.load_deck(42).err().unwrap().kind(), ErrorKind::NotFound);
        assert_eq!(db.load_card(42).err().unwrap().kind(), ErrorKind::NotFound);
        assert_eq!(
            db.review_card(42, q(4), ts(0)).err().unwrap().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(db.delete_card(42).err().unwrap().kind(), ErrorKind::NotFound);
        assert_eq!(db.delete_deck(42).err().unwrap().kind(), ErrorKind::NotFound);
        assert_eq!(
            db.due_cards(42, ts(0), None).err().unwrap().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            db.create_card(42, "Q", "A", ts(0)).err().unwrap().kind(),
            ErrorKind::NotFound
        );
        Ok(())
    }

    #[test]
    fn test_list_decks_by_owner() -> Fallible<()> {
        let (_dir, db) = create_tmp_database()?;
        db.create_deck("alice", "One", ts(0))?;
        db.create_deck("bob", "Two", ts(0))?;
        db.create_deck("alice", "Three", ts(0))?;
        assert_eq!(db.list_decks(None)?.len(), 3);
        let names: Vec<String> = db
            .list_decks(Some("alice"))?
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["One".to_string(), "Three".to_string()]);
        Ok(())
    }

    #[test]
    fn test_create_card() -> Fallible<()> {
        let (_dir, db) = create_tmp_database()?;
        let deck = db.create_deck("alice", "Spanish", ts(0))?;
        let a = db.create_card(deck.id, "perro", "dog", ts(1))?;
        let b = db.create_card(deck.id, "gato", "cat", ts(2))?;
        assert_ne!(a.id, b.id);
        for card in [db.load_card(a.id)?, db.load_card(b.id)?] {
            assert_eq!(card.status, CardStatus::New);
            assert_eq!(card.interval, 0);
            assert_eq!(card.ease_factor, 2.5);
            assert_eq!(card.repetitions, 0);
            assert!(card.last_reviewed.is_none());
        }
        assert_eq!(db.load_card(a.id)?.next_review, ts(1));
        let deck = db.load_deck(deck.id)?;
        assert_eq!(deck.total_cards, 2);
        assert_eq!(deck.study_progress.new, 2);
        assert_consistent(&db, deck.id)
    }

    #[test]
    fn test_review_sequence() -> Fallible<()> {
        let (_dir, db) = create_tmp_database()?;
        let deck = db.create_deck("alice", "Spanish", ts(0))?;
        let card = db.create_card(deck.id, "perro", "dog", ts(0))?;

        let card = db.review_card(card.id, q(2), ts(10))?;
        assert_eq!(card.interval, 1);
        assert_eq!(card.status, CardStatus::Learning);
        assert_eq!(card.repetitions, 1);
        assert_eq!(card.last_reviewed, Some(ts(10)));
        assert_eq!(card.next_review, ts(10).plus_days(1));
        let progress = db.load_deck(deck.id)?.study_progress;
        assert_eq!(progress.new, 0);
        assert_eq!(progress.learning, 1);

        let card = db.review_card(card.id, q(5), ts(20))?;
        assert_eq!(card.interval, 6);
        assert_eq!(card.status, CardStatus::Learning);

        let card = db.review_card(card.id, q(5), ts(30))?;
        assert_eq!(card.interval, (6.0 * card.ease_factor).round() as u32);
        assert_eq!(card.status, CardStatus::Learning);
        assert_eq!(card.repetitions, 3);

        let stored = db.load_card(card.id)?;
        assert_eq!(stored.interval, card.interval);
        assert_eq!(stored.next_review, card.next_review);
        assert_eq!(db.load_deck(deck.id)?.last_studied, Some(ts(30)));
        assert_consistent(&db, deck.id)
    }

    #[test]
    fn test_returned_card_matches_stored_row() -> Fallible<()> {
        let (_dir, db) = create_tmp_database()?;
        let deck = db.create_deck("alice", "Spanish", Timestamp::now())?;
        let created = db.create_card(deck.id, "perro", "dog", Timestamp::now())?;
        assert_eq!(created, db.load_card(created.id)?);
        let reviewed = db.review_card(created.id, q(4), Timestamp::now())?;
        assert_eq!(reviewed, db.load_card(created.id)?);
        assert_eq!(db.load_deck(deck.id)?.last_studied, reviewed.last_reviewed);
        Ok(())
    }

    #[test]
    fn test_second_writer_waits_for_lock() -> Fallible<()> {
        let (dir, db) = create_tmp_database()?;
        let deck = db.create_deck("alice", "Spanish", ts(0))?;
        let path = dir.path().join("studydeck.db");
        let other = Database::new(path.to_str().unwrap())?;
        let holder = thread::spawn(move || -> Fallible<()> {
            let mut conn = other.acquire();
            let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
            tx.execute("update decks set name = 'Held' where deck_id = ?;", [deck.id])?;
            thread::sleep(Duration::from_millis(200));
            tx.commit()?;
            Ok(())
        });
        thread::sleep(Duration::from_millis(50));
        let card = db.create_card(deck.id, "perro", "dog", ts(1))?;
        holder.join().unwrap()?;
        assert_eq!(db.load_card(card.id)?.question, "perro");
        assert_eq!(db.load_deck(deck.id)?.name, "Held");
        assert_consistent(&db, deck.id)
    }

    #[test]
    fn test_mastery_moves_buckets() -> Fallible<()> {
        let (_dir, db) = create_tmp_database()?;
        let deck = db.create_deck("alice", "Spanish", ts(0))?;
        let mut card = db.create_card(deck.id, "perro", "dog", ts(0))?;
        let mut minute = 1;
        while card.status != CardStatus::Mastered {
            card = db.review_card(card.id, q(5), ts(minute))?;
            minute += 1;
            assert!(minute < 10);
        }
        let progress = db.load_deck(deck.id)?.study_progress;
        assert_eq!(progress.mastered, 1);
        assert_eq!(progress.learning, 0);

        // A lapse demotes the card.
        let card = db.review_card(card.id, q(0), ts(minute))?;
        assert_eq!(card.status, CardStatus::Learning);
        assert_eq!(card.interval, 1);
        let progress = db.load_deck(deck.id)?.study_progress;
        assert_eq!(progress.mastered, 0);
        assert_eq!(progress.learning, 1);
        assert_consistent(&db, deck.id)
    }

    #[test]
    fn test_out_of_range_quality_is_clamped() -> Fallible<()> {
        let (_dir, db) = create_tmp_database()?;
        let deck = db.create_deck("alice", "Spanish", ts(0))?;
        let card = db.create_card(deck.id, "perro", "dog", ts(0))?;
        let card = db.review_card(card.id, Quality::clamped(-7), ts(1))?;
        assert_eq!(card.status, CardStatus::Learning);
        let card = db.review_card(card.id, Quality::clamped(12), ts(2))?;
        assert_eq!(card.interval, 6);
        let history = db.card_reviews(card.id)?;
        let grades: Vec<u8> = history.iter().map(|r| r.quality).collect();
        assert_eq!(grades, vec![0, 5]);
        Ok(())
    }

    #[test]
    fn test_card_reviews() -> Fallible<()> {
        let (_dir, db) = create_tmp_database()?;
        let deck = db.create_deck("alice", "Spanish", ts(0))?;
        let card = db.create_card(deck.id, "perro", "dog", ts(0))?;
        assert!(db.card_reviews(card.id)?.is_empty());
        db.review_card(card.id, q(4), ts(1))?;
        db.review_card(card.id, q(3), ts(2))?;
        let history = db.card_reviews(card.id)?;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].reviewed_at, ts(1));
        assert_eq!(history[0].interval, 1);
        assert_eq!(history[1].interval, 6);
        assert_eq!(history[1].status, CardStatus::Learning);
        Ok(())
    }

    #[test]
    fn test_delete_card() -> Fallible<()> {
        let (_dir, db) = create_tmp_database()?;
        let deck = db.create_deck("alice", "Spanish", ts(0))?;
        let a = db.create_card(deck.id, "perro", "dog", ts(0))?;
        let b = db.create_card(deck.id, "gato", "cat", ts(0))?;
        db.review_card(b.id, q(4), ts(1))?;

        db.delete_card(b.id)?;
        let deck_after = db.load_deck(deck.id)?;
        assert_eq!(deck_after.total_cards, 1);
        assert_eq!(deck_after.study_progress.learning, 0);
        assert_eq!(deck_after.study_progress.new, 1);
        assert_eq!(db.load_card(b.id).err().unwrap().kind(), ErrorKind::NotFound);

        db.delete_card(a.id)?;
        let deck_after = db.load_deck(deck.id)?;
        assert_eq!(deck_after.total_cards, 0);
        assert_eq!(deck_after.study_progress, StudyProgress::default());
        assert_consistent(&db, deck.id)
    }

    #[test]
    fn test_delete_deck_cascades() -> Fallible<()> {
        let (_dir, db) = create_tmp_database()?;
        let deck = db.create_deck("alice", "Spanish", ts(0))?;
        let card = db.create_card(deck.id, "perro", "dog", ts(0))?;
        db.review_card(card.id, q(4), ts(1))?;
        db.delete_deck(deck.id)?;
        assert_eq!(db.load_deck(deck.id).err().unwrap().kind(), ErrorKind::NotFound);
        assert_eq!(
            db.review_card(card.id, q(4), ts(2)).err().unwrap().kind(),
            ErrorKind::NotFound
        );
        Ok(())
    }

    #[test]
    fn test_due_cards() -> Fallible<()> {
        let (_dir, db) = create_tmp_database()?;
        let deck = db.create_deck("alice", "Spanish", ts(0))?;
        let a = db.create_card(deck.id, "uno", "one", ts(0))?;
        let b = db.create_card(deck.id, "dos", "two", ts(0))?;
        let c = db.create_card(deck.id, "tres", "three", ts(0))?;

        // All new cards are due at creation.
        let due: Vec<CardId> = db.due_cards(deck.id, ts(0), None)?.iter().map(|c| c.id).collect();
        assert_eq!(due, vec![a.id, b.id, c.id]);

        // `a` becomes due one day after ts(5), `b` one day after ts(1).
        db.review_card(a.id, q(4), ts(5))?;
        db.review_card(b.id, q(4), ts(1))?;

        let due: Vec<CardId> = db.due_cards(deck.id, ts(10), None)?.iter().map(|c| c.id).collect();
        assert_eq!(due, vec![c.id]);

        // The boundary is inclusive.
        let at_b = ts(1).plus_days(1);
        let due: Vec<CardId> = db.due_cards(deck.id, at_b, None)?.iter().map(|c| c.id).collect();
        assert_eq!(due, vec![c.id, b.id]);

        // Soonest-due first.
        let later = ts(5).plus_days(2);
        let due: Vec<CardId> = db.due_cards(deck.id, later, None)?.iter().map(|c| c.id).collect();
        assert_eq!(due, vec![c.id, b.id, a.id]);

        let due = db.due_cards(deck.id, later, Some(2))?;
        assert_eq!(due.len(), 2);
        Ok(())
    }

    #[test]
    fn test_never_reviewed_is_always_due() -> Fallible<()> {
        let (_dir, db) = create_tmp_database()?;
        let deck = db.create_deck("alice", "Spanish", ts(0))?;
        // Created "in the future" relative to the query.
        let card = db.create_card(deck.id, "uno", "one", ts(60))?;
        let due = db.due_cards(deck.id, ts(0), None)?;
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, card.id);
        Ok(())
    }

    #[test]
    fn test_due_cards_is_read_only() -> Fallible<()> {
        let (_dir, db) = create_tmp_database()?;
        let deck = db.create_deck("alice", "Spanish", ts(0))?;
        let card = db.create_card(deck.id, "uno", "one", ts(0))?;
        let before = db.load_deck(deck.id)?;
        db.due_cards(deck.id, ts(100), None)?;
        let after = db.load_deck(deck.id)?;
        assert_eq!(before.study_progress, after.study_progress);
        assert_eq!(before.last_studied, after.last_studied);
        assert_eq!(db.load_card(card.id)?.status, CardStatus::New);
        Ok(())
    }

    #[test]
    fn test_review_rolls_back_when_deck_row_is_missing() -> Fallible<()> {
        let (_dir, db) = create_tmp_database()?;
        let deck = db.create_deck("alice", "Spanish", ts(0))?;
        let card = db.create_card(deck.id, "perro", "dog", ts(0))?;
        {
            // Remove the deck row but leave its card behind.
            let conn = db.acquire();
            conn.execute_batch("pragma foreign_keys = off;")?;
            conn.execute("delete from decks where deck_id = ?;", [deck.id])?;
        }
        let err = db.review_card(card.id, q(5), ts(1)).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::AggregateInconsistency);

        // The card write was not committed.
        let stored = db.load_card(card.id)?;
        assert_eq!(stored.status, CardStatus::New);
        assert_eq!(stored.repetitions, 0);
        assert_eq!(stored.interval, 0);
        assert!(stored.last_reviewed.is_none());
        let reviews: i64 = db.acquire().query_row(
            "select count(*) from reviews where card_id = ?;",
            [card.id],
            |row| row.get(0),
        )?;
        assert_eq!(reviews, 0);

        // Deleting is refused for the same reason.
        let err = db.delete_card(card.id).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::AggregateInconsistency);
        assert!(db.load_card(card.id).is_ok());
        Ok(())
    }

    #[test]
    fn test_review_rolls_back_on_counter_underflow() -> Fallible<()> {
        let (_dir, db) = create_tmp_database()?;
        let deck = db.create_deck("alice", "Spanish", ts(0))?;
        let card = db.create_card(deck.id, "perro", "dog", ts(0))?;
        db.acquire().execute(
            "update decks set new_count = 0, total_cards = 0 where deck_id = ?;",
            [deck.id],
        )?;
        assert!(!db.audit_deck(deck.id)?.is_consistent());

        let err = db.review_card(card.id, q(4), ts(1)).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::AggregateInconsistency);
        assert_eq!(db.load_card(card.id)?.status, CardStatus::New);

        let audit = db.reconcile_deck(deck.id)?;
        assert!(!audit.is_consistent());
        assert_consistent(&db, deck.id)?;

        let card = db.review_card(card.id, q(4), ts(2))?;
        assert_eq!(card.status, CardStatus::Learning);
        assert_consistent(&db, deck.id)
    }

    #[test]
    fn test_reconcile_consistent_deck_is_noop() -> Fallible<()> {
        let (_dir, db) = create_tmp_database()?;
        let deck = db.create_deck("alice", "Spanish", ts(0))?;
        db.create_card(deck.id, "perro", "dog", ts(0))?;
        let audit = db.reconcile_deck(deck.id)?;
        assert!(audit.is_consistent());
        assert_eq!(audit.stored_total, 1);
        Ok(())
    }

    #[test]
    fn test_concurrent_events_keep_counters_consistent() -> Fallible<()> {
        let (_dir, db) = create_tmp_database()?;
        let deck = db.create_deck("alice", "Spanish", ts(0))?;
        let mut ids = Vec::new();
        for i in 0..40 {
            ids.push(db.create_card(deck.id, &format!("q{i}"), &format!("a{i}"), ts(0))?.id);
        }

        let mut handles = Vec::new();
        // Reviewers, each with a disjoint set of cards.
        for (t, chunk) in ids.chunks(10).enumerate() {
            let db = db.clone();
            let chunk: Vec<CardId> = chunk.to_vec();
            handles.push(thread::spawn(move || -> Fallible<()> {
                for round in 0..6 {
                    for (i, id) in chunk.iter().enumerate() {
                        let grade = ((t + i + round) % 6) as i64;
                        db.review_card(*id, Quality::clamped(grade), ts(round as i64 + 1))?;
                    }
                }
                Ok(())
            }));
        }
        // Writers that add and remove their own cards.
        for t in 0..3 {
            let db = db.clone();
            let deck_id = deck.id;
            handles.push(thread::spawn(move || -> Fallible<()> {
                for i in 0..15 {
                    let card = db.create_card(deck_id, &format!("w{t}-{i}"), "x", ts(0))?;
                    if i % 3 == 0 {
                        db.review_card(card.id, Quality::clamped(5), ts(1))?;
                    }
                    if i % 2 == 0 {
                        db.delete_card(card.id)?;
                    }
                }
                Ok(())
            }));
        }
        for handle in handles {
            handle.join().unwrap()?;
        }

        let deck = db.load_deck(deck.id)?;
        // 40 seeded, 3 writers each keep 7 of 15.
        assert_eq!(deck.total_cards, 40 + 3 * 7);
        assert_consistent(&db, deck.id)
    }
}
