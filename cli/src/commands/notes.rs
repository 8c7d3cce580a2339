//! List locally stored deposit notes

use anyhow::Result;
use colored::Colorize;
use stealth_core::NoteStatus;

use crate::config::DataDir;
use crate::note_store::NoteStore;

pub fn run(data_dir: &DataDir, all: bool) -> Result<()> {
    if !data_dir.notes_file().exists() {
        println!("{}", "No deposit notes.".yellow());
        return Ok(());
    }

    let store = NoteStore::unlock(data_dir.notes_file())?;
    let notes = if all { store.load_all()? } else { store.unspent()? };

    if notes.is_empty() {
        println!("{}", "No deposit notes.".yellow());
        return Ok(());
    }

    for note in &notes {
        let status = match note.status {
            NoteStatus::Created => "CREATED".yellow(),
            NoteStatus::Deposited => "DEPOSITED".cyan(),
            NoteStatus::Relayed => "RELAYED".green(),
            NoteStatus::Spent => "SPENT".dimmed(),
        };
        println!("{} [{}]", note.commitment, status);
        println!("   Amount:  {} {}", note.amount, note.token);
        println!("   Created: {}", note.created_at.to_rfc3339());
        if let Some(tx_hash) = &note.deposit_tx_hash {
            println!("   Deposit: {}", tx_hash);
        }
        if let Some(destination) = &note.relay_destination {
            println!("   Relay:   {}", destination.stealth.address);
            println!("   To:      {}", destination.recipient);
        }
    }

    Ok(())
}
