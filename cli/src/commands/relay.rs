//! Relay a deposited note to a fresh stealth address of the recipient

use anyhow::{bail, Context, Result};
use colored::Colorize;
use stealth_core::{
    build_relay_request, derive_stealth_address, DepositNote, Felt, MetaAddress,
    RelayDestination, StealthAddress,
};
use tracing::info;

use crate::config::{Config, DataDir};
use crate::note_store::NoteStore;
use crate::settlement::{settle, FileOutbox, RelaySettlement, RelaySubmission, RetryPolicy};

/// Send `note` to a one-time address of `recipient`.
///
/// The destination is derived on the first attempt and saved on the note
/// before anything leaves; later attempts resubmit the exact same request.
/// The note is marked relayed only once the relayer accepted it.
pub async fn relay_note<S: RelaySettlement>(
    store: &NoteStore,
    settlement: &S,
    policy: &RetryPolicy,
    mut note: DepositNote,
    recipient: &MetaAddress,
) -> Result<(DepositNote, StealthAddress)> {
    let recipient_text = recipient.to_text();
    let destination = match note.relay_destination.clone() {
        Some(pending) if pending.recipient == recipient_text => pending.stealth,
        Some(pending) => bail!(
            "Note {} is already being relayed to {}; retry with that recipient",
            note.commitment,
            pending.recipient
        ),
        None => {
            let stealth = derive_stealth_address(recipient)?.stealth;
            note.relay_destination = Some(RelayDestination {
                recipient: recipient_text,
                stealth,
            });
            stealth
        }
    };

    let submission = RelaySubmission {
        request: build_relay_request(&note, &destination.address)?,
        ephemeral_pub_key: destination.ephemeral_pub_key,
    };

    store.upsert(&note)?;
    settle(settlement, policy, &submission).await?;

    note.mark_relayed();
    store.upsert(&note)?;

    info!(commitment = %note.commitment, recipient = %destination.address, "note relayed");
    Ok((note, destination))
}

pub async fn run(data_dir: &DataDir, config: &Config, commitment: &str, to: &str) -> Result<()> {
    let commitment = Felt::from_hex(commitment).context("Invalid note commitment")?;
    let recipient = MetaAddress::from_text(to).context("Invalid meta-address format")?;

    let store = NoteStore::unlock(data_dir.notes_file())?;
    let note = match store.find(&commitment)? {
        Some(note) => note,
        None => bail!("No note with commitment {} in {:?}", commitment, data_dir.notes_file()),
    };
    if note.deposit_tx_hash.is_none() {
        bail!(
            "Note {} has no recorded deposit; run 'stealthpay deposit --resubmit {}' first",
            commitment,
            commitment
        );
    }

    println!("{}", "Relaying note...".cyan());

    let outbox = FileOutbox::new(data_dir.outbox_dir());
    let (note, destination) =
        relay_note(&store, &outbox, &config.retry_policy(), note, &recipient).await?;

    println!();
    println!("{}", "Relay request submitted".green().bold());
    println!("Commitment:  {}", note.commitment);
    println!("Destination: {}", destination.address);
    println!("Ephemeral:   {}", destination.ephemeral_pub_key);
    println!("Amount:      {}", note.amount);
    println!();
    println!(
        "{}",
        "The destination is saved with the note; rerunning this command resubmits the same request."
            .dimmed()
    );

    Ok(())
}
