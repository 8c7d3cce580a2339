//! Bring the local announcement ledger in line with the feed

use anyhow::Result;
use colored::Colorize;
use stealth_core::{Announcement, Felt, NoteStatus};
use tracing::info;

use crate::config::{Config, DataDir};
use crate::feed::{AnnouncementLedger, JsonFileFeed};
use crate::note_store::NoteStore;

/// Mark relayed notes spent once their withdrawal shows up in `announcements`
pub fn mark_withdrawn(store: &NoteStore, announcements: &[Announcement]) -> Result<Vec<Felt>> {
    let mut spent = Vec::new();

    for mut note in store.load_all()? {
        if note.status != NoteStatus::Relayed {
            continue;
        }
        if announcements
            .iter()
            .any(|a| note.is_withdrawn_to(&a.stealth_address))
        {
            note.mark_spent();
            store.upsert(&note)?;
            info!(commitment = %note.commitment, "withdrawal announced; note spent");
            spent.push(note.commitment);
        }
    }

    Ok(spent)
}

pub async fn run(data_dir: &DataDir, config: &Config, page_size: usize) -> Result<()> {
    let feed = JsonFileFeed::new(data_dir.feed_file());
    let mut ledger = AnnouncementLedger::open(data_dir.ledger_file())?;

    let report = ledger
        .reconcile(&feed, page_size, &config.retry_policy())
        .await?;

    println!("{}", "Ledger reconciled".green().bold());
    println!("  New:       {}", report.inserted);
    println!("  Updated:   {}", report.updated);
    println!("  Unchanged: {}", report.unchanged);
    if report.malformed > 0 {
        println!(
            "{}",
            format!("  Skipped {} malformed announcements", report.malformed).dimmed()
        );
    }
    if let Some(block) = ledger.latest_block() {
        println!("  Latest block: {}", block);
    }

    if data_dir.notes_file().exists() && !ledger.is_empty() {
        let store = NoteStore::unlock(data_dir.notes_file())?;
        let spent = mark_withdrawn(&store, &ledger.announcements())?;
        if !spent.is_empty() {
            println!("  Withdrawn: {} note(s) now spent", spent.len());
        }
    }

    Ok(())
}
