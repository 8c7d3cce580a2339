//! Data directory layout and user configuration for the StealthPay CLI

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use stealth_core::Denominations;

/// Default directory for StealthPay state, relative to the home directory
const STEALTH_DIR: &str = ".stealthpay";
const CONFIG_FILE: &str = "config.json";
const IDENTITY_FILE: &str = "identity.enc";
const NOTES_FILE: &str = "notes.enc";
const LEDGER_FILE: &str = "ledger.json";
const FEED_FILE: &str = "announcements.json";
const OUTBOX_DIR: &str = "outbox";

/// Resolve the data directory: explicit flag / env first, then `~/.stealthpay`
pub fn resolve_data_dir(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(dir) => Ok(dir),
        None => Ok(dirs::home_dir()
            .context("Could not find home directory; pass --data-dir")?
            .join(STEALTH_DIR)),
    }
}

/// Every path the CLI reads or writes, derived from one data directory
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
    feed: Option<PathBuf>,
    outbox: Option<PathBuf>,
}

impl DataDir {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            feed: None,
            outbox: None,
        }
    }

    /// Override the announcement feed location
    pub fn with_feed(mut self, feed: Option<PathBuf>) -> Self {
        self.feed = feed;
        self
    }

    /// Override the relay outbox location
    pub fn with_outbox(mut self, outbox: Option<PathBuf>) -> Self {
        self.outbox = outbox;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn identity_file(&self) -> PathBuf {
        self.root.join(IDENTITY_FILE)
    }

    pub fn notes_file(&self) -> PathBuf {
        self.root.join(NOTES_FILE)
    }

    pub fn ledger_file(&self) -> PathBuf {
        self.root.join(LEDGER_FILE)
    }

    pub fn feed_file(&self) -> PathBuf {
        self.feed
            .clone()
            .unwrap_or_else(|| self.root.join(FEED_FILE))
    }

    pub fn outbox_dir(&self) -> PathBuf {
        self.outbox
            .clone()
            .unwrap_or_else(|| self.root.join(OUTBOX_DIR))
    }
}

/// `config.json` contents. Every field has a default, so a partial file works.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Decimal places of the token's base unit
    pub decimals: u32,
    /// Allowed deposit sizes in human units
    pub denominations: Vec<String>,
    /// Attempts per collaborator call before giving up
    pub retry_attempts: u32,
    /// First backoff delay; doubles on every retry
    pub retry_base_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            decimals: 18,
            denominations: ["0.1", "1", "10", "100"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            retry_attempts: 3,
            retry_base_delay_ms: 250,
        }
    }
}

impl Config {
    /// Load `config.json`, falling back to defaults when it does not exist
    pub fn load(data_dir: &DataDir) -> Result<Self> {
        let path = data_dir.config_file();
        if !path.exists() {
            return Ok(Self::default());
        }

        let json = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: Config = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        Ok(config)
    }

    pub fn save(&self, data_dir: &DataDir) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_private(&data_dir.config_file(), json.as_bytes())
    }

    /// Validated denomination tiers
    pub fn denominations(&self) -> Result<Denominations> {
        Denominations::parse(self.denominations.as_slice(), self.decimals)
            .context("Invalid denominations in config")
    }

    pub fn retry_policy(&self) -> crate::settlement::RetryPolicy {
        crate::settlement::RetryPolicy {
            attempts: self.retry_attempts.max(1),
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }
}

/// Durably replace `path` with `contents`, readable only by the owner.
///
/// Writes a sibling temp file, syncs it, then renames over the target, so a
/// crash leaves either the old or the new contents and never a torn file.
pub fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .context("Target path has no parent directory")?;
    fs::create_dir_all(dir).with_context(|| format!("Failed to create directory {:?}", dir))?;

    let file_name = path
        .file_name()
        .context("Target path has no file name")?
        .to_string_lossy();
    let tmp_path = dir.join(format!(".{}.tmp", file_name));

    {
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);

        // Set restrictive permissions on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options
            .open(&tmp_path)
            .with_context(|| format!("Failed to create {:?}", tmp_path))?;
        file.write_all(contents)
            .with_context(|| format!("Failed to write {:?}", tmp_path))?;
        file.sync_all()
            .with_context(|| format!("Failed to sync {:?}", tmp_path))?;
    }

    fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to move {:?} into place", path))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        // Persist the rename itself
        if let Ok(dir_handle) = fs::File::open(dir) {
            let _ = dir_handle.sync_all();
        }
    }

    Ok(())
}
