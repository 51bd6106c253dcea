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

use std::num::IntErrorKind;
use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;

use crate::cmd::card::add_card;
use crate::cmd::card::card_history;
use crate::cmd::card::delete_card;
use crate::cmd::card::show_card;
use crate::cmd::check::check_deck;
use crate::cmd::check::reconcile_deck;
use crate::cmd::deck::create_deck;
use crate::cmd::deck::delete_deck;
use crate::cmd::deck::list_decks;
use crate::cmd::deck::show_deck;
use crate::cmd::due::print_due_cards;
use crate::cmd::review::review_card;
use crate::config::Config;
use crate::db::Database;
use crate::error::ErrorReport;
use crate::error::Fallible;
use crate::server::server::start_server;
use crate::types::card::CardId;
use crate::types::deck::DeckId;

/// Parses a grade, saturating integers that do not fit in an `i64`.
fn parse_grade(s: &str) -> Result<i64, String> {
    match s.parse::<i64>() {
        Ok(n) => Ok(n),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => Ok(i64::MAX),
            IntErrorKind::NegOverflow => Ok(i64::MIN),
            _ => Err(e.to_string()),
        },
    }
}

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the config file. Defaults to `studydeck.toml` if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Path to the database. Overrides the config file.
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage decks.
    Deck {
        #[command(subcommand)]
        command: DeckCommand,
    },
    /// Manage cards.
    Card {
        #[command(subcommand)]
        command: CardCommand,
    },
    /// Submit a review for a card.
    Review {
        card_id: CardId,
        /// Recall quality from 0 (blackout) to 5 (perfect). Out-of-range
        /// values are clamped.
        #[arg(allow_negative_numbers = true, value_parser = parse_grade)]
        quality: i64,
    },
    /// List the cards of a deck that are due now, most overdue first.
    Due {
        deck_id: DeckId,
        /// Maximum number of cards to list.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Verify that a deck's progress counters match its cards.
    Check { deck_id: DeckId },
    /// Recompute a deck's progress counters from its cards.
    Reconcile { deck_id: DeckId },
    /// Serve the review API over HTTP.
    Serve {
        /// Address to listen on. Overrides the config file.
        #[arg(long)]
        bind: Option<String>,
    },
}

#[derive(Subcommand)]
enum DeckCommand {
    /// Create a deck.
    Create { owner: String, name: String },
    /// Show a deck's progress counters.
    Show { deck_id: DeckId },
    /// List decks.
    List {
        #[arg(long)]
        owner: Option<String>,
    },
    /// Delete a deck and all of its cards.
    Delete { deck_id: DeckId },
}

#[derive(Subcommand)]
enum CardCommand {
    /// Add a card to a deck.
    Add {
        deck_id: DeckId,
        question: String,
        answer: String,
    },
    /// Show a card's scheduling state.
    Show { card_id: CardId },
    /// Delete a card.
    Delete { card_id: CardId },
    /// Show a card's review history.
    History { card_id: CardId },
}

pub async fn entrypoint() -> Fallible<()> {
    let cli: Cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database = db;
    }
    let db_path: &str = config
        .database
        .to_str()
        .ok_or_else(|| ErrorReport::new("invalid path"))?;
    let db = Database::new(db_path)?;

    match cli.command {
        Command::Deck { command } => match command {
            DeckCommand::Create { owner, name } => create_deck(&db, &owner, &name),
            DeckCommand::Show { deck_id } => show_deck(&db, deck_id),
            DeckCommand::List { owner } => list_decks(&db, owner.as_deref()),
            DeckCommand::Delete { deck_id } => delete_deck(&db, deck_id),
        },
        Command::Card { command } => match command {
            CardCommand::Add {
                deck_id,
                question,
                answer,
            } => add_card(&db, deck_id, &question, &answer),
            CardCommand::Show { card_id } => show_card(&db, card_id),
            CardCommand::Delete { card_id } => delete_card(&db, card_id),
            CardCommand::History { card_id } => card_history(&db, card_id),
        },
        Command::Review { card_id, quality } => review_card(&db, card_id, quality),
        Command::Due { deck_id, limit } => {
            print_due_cards(&db, deck_id, limit.or(config.session_limit))
        }
        Command::Check { deck_id } => check_deck(&db, deck_id),
        Command::Reconcile { deck_id } => reconcile_deck(&db, deck_id),
        Command::Serve { bind } => {
            let bind = bind.unwrap_or(config.bind);
            start_server(db, &bind, config.session_limit).await
        }
    }
}
