//! Split an amount into fixed-size deposits

use anyhow::{Context, Result};
use colored::Colorize;
use stealth_core::{split_amount_into_denominations, DenominationSplit};

use crate::commands::deposit::deposit_note;
use crate::config::{Config, DataDir};
use crate::note_store::NoteStore;
use crate::settlement::FileOutbox;

pub fn plan(config: &Config, amount: &str) -> Result<DenominationSplit> {
    let denominations = config.denominations()?;
    split_amount_into_denominations(amount, &denominations)
        .with_context(|| format!("Cannot split {:?} into {:?}", amount, config.denominations))
}

pub async fn run(data_dir: &DataDir, config: &Config, amount: &str, token: &str, deposit: bool) -> Result<()> {
    let split = plan(config, amount)?;

    println!("{}", format!("Split of {}", amount).cyan().bold());
    println!();
    for part in &split.parts {
        println!("  {:>3} x {}", part.count, part.tier);
    }
    println!();
    println!("Total notes: {}", split.total_notes());

    if !deposit {
        println!();
        println!("{}", "Run again with --deposit to create and submit the notes.".dimmed());
        return Ok(());
    }

    let store = NoteStore::unlock(data_dir.notes_file())?;
    let outbox = FileOutbox::new(data_dir.outbox_dir());
    let policy = config.retry_policy();

    println!();
    for part in &split.parts {
        let base_units = part.base_units.to_str_radix(10);
        for _ in 0..part.count {
            let note = deposit_note(&store, &outbox, &policy, &base_units, token).await?;
            println!("  {} {} ({})", "deposited".green(), note.commitment, part.tier);
        }
    }

    Ok(())
}
