//! Announcement feed and local ledger
//!
//! The feed is the chain-indexer collaborator: an ordered-by-block stream of
//! announcements fetched a page at a time. [`JsonFileFeed`] reads a JSON
//! array mirrored from an indexer. Entries that do not parse (bad points, bad
//! felts, missing fields) are counted and skipped, never fatal.
//!
//! [`AnnouncementLedger`] keeps the local copy. Reconciliation upserts by
//! `txHash`, so re-running it over the same or an overlapping feed is a no-op.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stealth_core::Announcement;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::write_private;
use crate::settlement::{with_retry, RetryPolicy};

pub const DEFAULT_PAGE_SIZE: usize = 500;

/// One page of the feed
#[derive(Debug, Default)]
pub struct FeedPage {
    pub announcements: Vec<Announcement>,
    /// Entries in this page that failed to parse
    pub malformed: usize,
    /// Cursor for the next page; `None` at the end of the feed
    pub next_cursor: Option<usize>,
}

#[allow(async_fn_in_trait)]
pub trait AnnouncementFeed {
    /// Fetch up to `limit` raw entries starting at `cursor`
    async fn fetch_page(&self, cursor: usize, limit: usize) -> Result<FeedPage>;
}

/// Feed backed by a JSON array on disk.
///
/// The file is read on the first page and served from memory afterwards, so
/// one pass over the feed sees one consistent snapshot.
pub struct JsonFileFeed {
    path: PathBuf,
    entries: OnceCell<Vec<serde_json::Value>>,
}

impl JsonFileFeed {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            entries: OnceCell::new(),
        }
    }

    async fn entries(&self) -> Result<&[serde_json::Value]> {
        let entries = self
            .entries
            .get_or_try_init(|| async {
                let json = tokio::fs::read_to_string(&self.path)
                    .await
                    .with_context(|| format!("Failed to read announcement feed {:?}", self.path))?;
                serde_json::from_str::<Vec<serde_json::Value>>(&json)
                    .context("Announcement feed is not a JSON array")
            })
            .await?;
        Ok(entries.as_slice())
    }
}

impl AnnouncementFeed for JsonFileFeed {
    async fn fetch_page(&self, cursor: usize, limit: usize) -> Result<FeedPage> {
        let entries = self.entries().await?;

        let end = entries.len().min(cursor.saturating_add(limit));
        let mut page = FeedPage::default();

        for (index, entry) in entries.iter().enumerate().take(end).skip(cursor) {
            match serde_json::from_value::<Announcement>(entry.clone()) {
                Ok(announcement) => page.announcements.push(announcement),
                Err(err) => {
                    debug!(index, error = %err, "skipping malformed announcement");
                    page.malformed += 1;
                }
            }
        }

        page.next_cursor = (end < entries.len()).then_some(end);
        Ok(page)
    }
}

/// Everything a feed yields, oldest block first
#[derive(Debug, Default)]
pub struct FeedSnapshot {
    pub announcements: Vec<Announcement>,
    pub malformed: usize,
}

/// Drain the feed page by page, retrying each page independently.
///
/// A page size of zero is treated as one. A feed whose cursor does not move
/// forward is an error.
pub async fn collect_feed<F: AnnouncementFeed>(
    feed: &F,
    page_size: usize,
    policy: &RetryPolicy,
) -> Result<FeedSnapshot> {
    let page_size = page_size.max(1);
    let mut snapshot = FeedSnapshot::default();
    let mut cursor = Some(0);

    while let Some(at) = cursor {
        let page = with_retry(policy, "feed", move || feed.fetch_page(at, page_size)).await?;
        snapshot.malformed += page.malformed;
        snapshot.announcements.extend(page.announcements);
        cursor = page.next_cursor;
        if let Some(next) = cursor {
            if next <= at {
                bail!("Announcement feed cursor did not advance past {}", at);
            }
        }
    }

    snapshot.announcements.sort_by_key(|a| a.block_number);
    Ok(snapshot)
}

// ============================================================================
// Ledger
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub announcement: Announcement,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Outcome of one reconciliation run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub inserted: usize,
    /// Same txHash, different contents (e.g. re-org moved the block)
    pub updated: usize,
    pub unchanged: usize,
    pub malformed: usize,
}

/// Local mirror of the announcement feed keyed by transaction hash
pub struct AnnouncementLedger {
    path: PathBuf,
    entries: BTreeMap<String, LedgerEntry>,
}

impl AnnouncementLedger {
    /// Open the ledger, creating an empty one if the file does not exist
    pub fn open(path: PathBuf) -> Result<Self> {
        let entries = if path.exists() {
            let json = fs::read_to_string(&path).context("Failed to read announcement ledger")?;
            serde_json::from_str(&json).context("Failed to parse announcement ledger")?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, tx_hash: &str) -> Option<&LedgerEntry> {
        self.entries.get(tx_hash)
    }

    /// Highest block seen so far
    pub fn latest_block(&self) -> Option<u64> {
        self.entries
            .values()
            .map(|e| e.announcement.block_number)
            .max()
    }

    /// Ledger contents ordered by block, then transaction hash
    pub fn announcements(&self) -> Vec<Announcement> {
        let mut all: Vec<Announcement> = self
            .entries
            .values()
            .map(|e| e.announcement.clone())
            .collect();
        all.sort_by(|a, b| {
            a.block_number
                .cmp(&b.block_number)
                .then_with(|| a.tx_hash.cmp(&b.tx_hash))
        });
        all
    }

    /// Insert or refresh one announcement
    pub fn upsert(&mut self, announcement: Announcement, report: &mut ReconcileReport) {
        let now = Utc::now();
        match self.entries.get_mut(&announcement.tx_hash) {
            Some(entry) if entry.announcement == announcement => {
                entry.last_seen = now;
                report.unchanged += 1;
            }
            Some(entry) => {
                entry.announcement = announcement;
                entry.last_seen = now;
                report.updated += 1;
            }
            None => {
                self.entries.insert(
                    announcement.tx_hash.clone(),
                    LedgerEntry {
                        announcement,
                        first_seen: now,
                        last_seen: now,
                    },
                );
                report.inserted += 1;
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        write_private(&self.path, json.as_bytes()).context("Failed to persist announcement ledger")
    }

    /// Pull the whole feed into the ledger and persist it
    pub async fn reconcile<F: AnnouncementFeed>(
        &mut self,
        feed: &F,
        page_size: usize,
        policy: &RetryPolicy,
    ) -> Result<ReconcileReport> {
        let snapshot = collect_feed(feed, page_size, policy).await?;

        let mut report = ReconcileReport {
            malformed: snapshot.malformed,
            ..Default::default()
        };
        for announcement in snapshot.announcements {
            self.upsert(announcement, &mut report);
        }
        self.save()?;

        info!(
            inserted = report.inserted,
            updated = report.updated,
            unchanged = report.unchanged,
            malformed = report.malformed,
            total = self.len(),
            "ledger reconciled"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use stealth_core::{derive_stealth_address, StealthIdentity};
    use tempfile::{tempdir, TempDir};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 2,
            base_delay: Duration::from_millis(1),
        }
    }

    fn sample(tx_hash: &str, block_number: u64) -> Announcement {
        let identity = StealthIdentity::generate();
        let computation = derive_stealth_address(&identity.meta_address()).unwrap();
        Announcement {
            ephemeral_pub_key: *computation.ephemeral_pub_key(),
            stealth_address: *computation.address(),
            amount: "1000".to_string(),
            token: "0xeth".to_string(),
            tx_hash: tx_hash.to_string(),
            block_number,
            timestamp: 1_700_000_000 + block_number,
            amount_commitment: None,
            encrypted_amount: None,
        }
    }

    fn write_feed(dir: &TempDir, entries: &[serde_json::Value]) -> PathBuf {
        let path = dir.path().join("announcements.json");
        fs::write(&path, serde_json::to_string(entries).unwrap()).unwrap();
        path
    }

    #[tokio::test]
    async fn test_paging_and_malformed_entries() {
        let dir = tempdir().unwrap();
        let mut entries: Vec<serde_json::Value> = (0..5)
            .map(|i| serde_json::to_value(sample(&format!("0x{}", i), 10 - i)).unwrap())
            .collect();
        // Off-curve key, bad felt, missing fields
        let mut bad_point = entries[0].clone();
        bad_point["ephemeralPubKey"] = serde_json::json!(format!("02{}", "00".repeat(32)));
        let mut bad_felt = entries[0].clone();
        bad_felt["stealthAddress"] = serde_json::json!(format!("0x{}", "ff".repeat(32)));
        entries.push(bad_point);
        entries.push(bad_felt);
        entries.push(serde_json::json!({ "txHash": "0xpartial" }));

        let feed = JsonFileFeed::new(write_feed(&dir, &entries));

        let first = feed.fetch_page(0, 3).await.unwrap();
        assert_eq!(first.announcements.len(), 3);
        assert_eq!(first.next_cursor, Some(3));

        let snapshot = collect_feed(&feed, 3, &policy()).await.unwrap();
        assert_eq!(snapshot.announcements.len(), 5);
        assert_eq!(snapshot.malformed, 3);
        let blocks: Vec<u64> = snapshot.announcements.iter().map(|a| a.block_number).collect();
        assert_eq!(blocks, vec![6, 7, 8, 9, 10]);
    }

    #[tokio::test]
    async fn test_zero_page_size_still_drains_feed() {
        let dir = tempdir().unwrap();
        let entries: Vec<serde_json::Value> = (0..3)
            .map(|i| serde_json::to_value(sample(&format!("0x{}", i), i)).unwrap())
            .collect();
        let feed = JsonFileFeed::new(write_feed(&dir, &entries));

        let snapshot = collect_feed(&feed, 0, &policy()).await.unwrap();
        assert_eq!(snapshot.announcements.len(), 3);
    }

    #[tokio::test]
    async fn test_feed_file_read_once_per_pass() {
        let dir = tempdir().unwrap();
        let entries: Vec<serde_json::Value> = (0..4)
            .map(|i| serde_json::to_value(sample(&format!("0x{}", i), i)).unwrap())
            .collect();
        let path = write_feed(&dir, &entries);
        let feed = JsonFileFeed::new(path.clone());

        let first = feed.fetch_page(0, 2).await.unwrap();
        assert_eq!(first.next_cursor, Some(2));

        // Later pages come from the snapshot taken on the first read
        fs::remove_file(&path).unwrap();
        let second = feed.fetch_page(2, 2).await.unwrap();
        assert_eq!(second.announcements.len(), 2);
        assert_eq!(second.next_cursor, None);
    }

    /// Keeps returning the same cursor
    struct StuckFeed;

    impl AnnouncementFeed for StuckFeed {
        async fn fetch_page(&self, cursor: usize, _limit: usize) -> Result<FeedPage> {
            Ok(FeedPage {
                next_cursor: Some(cursor),
                ..FeedPage::default()
            })
        }
    }

    #[tokio::test]
    async fn test_stuck_cursor_is_an_error() {
        assert!(collect_feed(&StuckFeed, 10, &policy()).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_feed_is_an_error() {
        let dir = tempdir().unwrap();
        let feed = JsonFileFeed::new(dir.path().join("missing.json"));
        assert!(collect_feed(&feed, 10, &policy()).await.is_err());
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let dir = tempdir().unwrap();
        let a = sample("0xa", 1);
        let b = sample("0xb", 2);
        let feed_path = write_feed(
            &dir,
            &[serde_json::to_value(&a).unwrap(), serde_json::to_value(&b).unwrap()],
        );
        let feed = JsonFileFeed::new(feed_path);
        let ledger_path = dir.path().join("ledger.json");

        let mut ledger = AnnouncementLedger::open(ledger_path.clone()).unwrap();
        let first = ledger.reconcile(&feed, 10, &policy()).await.unwrap();
        assert_eq!(first.inserted, 2);

        // Reopen from disk and run again over the same feed
        let mut ledger = AnnouncementLedger::open(ledger_path).unwrap();
        let second = ledger.reconcile(&feed, 1, &policy()).await.unwrap();
        assert_eq!(
            second,
            ReconcileReport {
                inserted: 0,
                updated: 0,
                unchanged: 2,
                malformed: 0,
            }
        );
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.latest_block(), Some(2));
    }

    #[test]
    fn test_upsert_detects_moved_announcement() {
        let dir = tempdir().unwrap();
        let mut ledger = AnnouncementLedger::open(dir.path().join("ledger.json")).unwrap();
        let mut report = ReconcileReport::default();

        let original = sample("0xreorg", 100);
        ledger.upsert(original.clone(), &mut report);

        let mut moved = original.clone();
        moved.block_number = 101;
        ledger.upsert(moved, &mut report);

        assert_eq!(report.inserted, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(ledger.len(), 1);
        let entry = ledger.get("0xreorg").unwrap();
        assert_eq!(entry.announcement.block_number, 101);
        assert!(entry.first_seen <= entry.last_seen);
    }
}
