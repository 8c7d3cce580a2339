//! Scan the announcement feed for incoming stealth payments

use anyhow::{Context, Result};
use colored::Colorize;
use stealth_core::{detect_payments_parallel, Announcement, DetectedPayment, StealthIdentity};
use tracing::info;

use crate::config::{Config, DataDir};
use crate::feed::{collect_feed, AnnouncementLedger, JsonFileFeed, DEFAULT_PAGE_SIZE};
use crate::secure_storage::{prompt_password, SecureKeyStorage};

pub struct ScanOptions {
    /// Ignore announcements below this block
    pub from_block: Option<u64>,
    /// Scan the reconciled local ledger instead of the live feed
    pub use_ledger: bool,
    /// Print the one-time spending keys
    pub show_keys: bool,
}

/// Payments in `announcements` that belong to `identity`, newest block first
pub fn find_payments(
    identity: &StealthIdentity,
    announcements: &[Announcement],
    from_block: Option<u64>,
) -> Vec<(u64, DetectedPayment)> {
    let candidates: Vec<Announcement> = announcements
        .iter()
        .filter(|a| from_block.map_or(true, |min| a.block_number >= min))
        .cloned()
        .collect();

    let mut found: Vec<(u64, DetectedPayment)> = detect_payments_parallel(identity, &candidates)
        .into_iter()
        .map(|payment| {
            let block = candidates
                .iter()
                .find(|a| a.tx_hash == payment.tx_hash)
                .map_or(0, |a| a.block_number);
            (block, payment)
        })
        .collect();

    // Sort by block (newest first)
    found.sort_by(|a, b| b.0.cmp(&a.0));
    found
}

pub async fn run(data_dir: &DataDir, config: &Config, options: ScanOptions) -> Result<()> {
    println!("{}", "Scanning for incoming stealth payments...".cyan());

    let storage = SecureKeyStorage::new(data_dir.identity_file());
    let password = prompt_password("Enter password to decrypt keys: ")?;
    let identity = storage
        .load(&password)
        .context("Failed to decrypt keys. Wrong password?")?;

    let (announcements, malformed) = if options.use_ledger {
        let ledger = AnnouncementLedger::open(data_dir.ledger_file())?;
        if ledger.is_empty() {
            println!(
                "{}",
                "The local ledger is empty. Run 'stealthpay reconcile' first.".yellow()
            );
        }
        (ledger.announcements(), 0)
    } else {
        let feed = JsonFileFeed::new(data_dir.feed_file());
        let snapshot = collect_feed(&feed, DEFAULT_PAGE_SIZE, &config.retry_policy()).await?;
        (snapshot.announcements, snapshot.malformed)
    };

    println!("Found {} announcements, scanning...", announcements.len());
    if malformed > 0 {
        println!(
            "{}",
            format!("Skipped {} malformed announcements", malformed).dimmed()
        );
    }

    let found = find_payments(&identity, &announcements, options.from_block);
    info!(scanned = announcements.len(), matched = found.len(), "scan complete");

    println!();
    if found.is_empty() {
        println!("{}", "No incoming payments found.".yellow());
        if options.from_block.is_some() {
            println!(
                "{}",
                "Try without --from-block to scan all announcements.".dimmed()
            );
        }
        return Ok(());
    }

    println!(
        "{}",
        format!("Found {} payment(s):", found.len()).green().bold()
    );
    println!();

    for (i, (block, payment)) in found.iter().enumerate() {
        println!("{}. {}", i + 1, "Payment".yellow());
        println!("   Address:  {}", payment.stealth_address);
        println!("   Amount:   {}", payment.display_amount());
        println!("   Token:    {}", payment.token);
        println!("   Tx:       {}", payment.tx_hash);
        println!("   Block:    {}", block);
        if options.show_keys {
            println!(
                "   Key:      {}",
                payment.stealth_private_key.to_hex().red()
            );
        }
        println!();
    }

    if !options.show_keys {
        println!(
            "{}",
            "Use --show-keys to print the spending key for each address.".dimmed()
        );
    }

    Ok(())
}
