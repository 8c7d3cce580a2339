//! Create a deposit note and submit the deposit

use anyhow::{bail, Context, Result};
use colored::Colorize;
use stealth_core::{create_deposit_note, parse_units, DepositNote, Felt, NoteStatus};
use tracing::info;

use crate::config::{Config, DataDir};
use crate::note_store::NoteStore;
use crate::settlement::{submit_deposit, FileOutbox, RelaySettlement, RetryPolicy};

/// Create, persist, submit, persist again.
///
/// The note hits the disk before the deposit goes out, so a crash or a
/// failed submission never leaves funds without their secrets.
pub async fn deposit_note<S: RelaySettlement>(
    store: &NoteStore,
    settlement: &S,
    policy: &RetryPolicy,
    base_units: &str,
    token: &str,
) -> Result<DepositNote> {
    let note = create_deposit_note(base_units, token)?;
    store.upsert(&note)?;
    submit_note(store, settlement, policy, note).await
}

/// Submit the deposit for a saved note that has none recorded yet.
///
/// The calldata comes from the note itself, so a resubmission is identical
/// to the first attempt.
pub async fn resubmit_note<S: RelaySettlement>(
    store: &NoteStore,
    settlement: &S,
    policy: &RetryPolicy,
    commitment: &Felt,
) -> Result<DepositNote> {
    let note = created_note(store, commitment)?;
    submit_note(store, settlement, policy, note).await
}

/// Record a deposit that landed without the CLI seeing the receipt
pub fn record_deposit(store: &NoteStore, commitment: &Felt, tx_hash: &str) -> Result<DepositNote> {
    let mut note = created_note(store, commitment)?;
    note.mark_deposited(tx_hash);
    store.upsert(&note)?;

    info!(commitment = %note.commitment, tx_hash, "deposit recorded");
    Ok(note)
}

fn created_note(store: &NoteStore, commitment: &Felt) -> Result<DepositNote> {
    let note = match store.find(commitment)? {
        Some(note) => note,
        None => bail!("No note with commitment {}", commitment),
    };
    if note.status != NoteStatus::Created || note.deposit_tx_hash.is_some() {
        bail!(
            "Note {} already has a deposit recorded ({})",
            commitment,
            note.deposit_tx_hash.as_deref().unwrap_or("unknown tx")
        );
    }
    Ok(note)
}

async fn submit_note<S: RelaySettlement>(
    store: &NoteStore,
    settlement: &S,
    policy: &RetryPolicy,
    mut note: DepositNote,
) -> Result<DepositNote> {
    let calldata = note.deposit_calldata()?;
    let tx_hash = submit_deposit(settlement, policy, &calldata)
        .await
        .with_context(|| {
            format!(
                "Deposit submission failed; note {} is saved. Resubmit with \
                 'stealthpay deposit --resubmit {}'",
                note.commitment, note.commitment
            )
        })?;

    note.mark_deposited(&tx_hash);
    store.upsert(&note)?;

    info!(commitment = %note.commitment, tx_hash = %tx_hash, "deposit submitted");
    Ok(note)
}

pub async fn run(data_dir: &DataDir, config: &Config, amount: &str, token: &str) -> Result<()> {
    let base_units = parse_units(amount, config.decimals)
        .with_context(|| format!("Invalid amount {:?}", amount))?
        .to_str_radix(10);

    println!("{}", "Creating deposit note...".cyan());

    let store = NoteStore::unlock(data_dir.notes_file())?;
    let outbox = FileOutbox::new(data_dir.outbox_dir());
    let note = deposit_note(&store, &outbox, &config.retry_policy(), &base_units, token).await?;

    println!();
    println!("{}", "Deposit submitted".green().bold());
    println!("Commitment: {}", note.commitment);
    println!("Amount:     {} ({} base units)", amount, note.amount);
    print_next_steps(&note);

    Ok(())
}

/// `deposit --resubmit`, optionally only recording a known transaction
pub async fn resubmit(
    data_dir: &DataDir,
    config: &Config,
    commitment: &str,
    tx_hash: Option<&str>,
) -> Result<()> {
    let commitment = Felt::from_hex(commitment).context("Invalid note commitment")?;
    let store = NoteStore::unlock(data_dir.notes_file())?;

    let note = match tx_hash {
        Some(tx_hash) => record_deposit(&store, &commitment, tx_hash)?,
        None => {
            println!("{}", "Resubmitting deposit...".cyan());
            let outbox = FileOutbox::new(data_dir.outbox_dir());
            resubmit_note(&store, &outbox, &config.retry_policy(), &commitment).await?
        }
    };

    println!();
    println!("{}", "Deposit recorded".green().bold());
    println!("Commitment: {}", note.commitment);
    println!("Amount:     {} base units", note.amount);
    print_next_steps(&note);

    Ok(())
}

fn print_next_steps(note: &DepositNote) {
    println!("Token:      {}", note.token);
    if let Some(tx_hash) = &note.deposit_tx_hash {
        println!("Tx:         {}", tx_hash);
    }
    println!();
    println!(
        "{}",
        "Note saved locally. Relay it with 'stealthpay relay --note <commitment> --to <meta-address>'."
            .dimmed()
    );
}
