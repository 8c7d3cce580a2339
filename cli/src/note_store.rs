//! Durable, encrypted local store for deposit notes
//!
//! Notes carry the secret and nullifier that prove the right to withdraw, so
//! the file is sealed with the same AES-256-GCM/Argon2id codec as the
//! identity. The key is derived once when the store is opened and every
//! rewrite goes out under a fresh nonce.
//!
//! Every mutation rewrites the whole file through [`write_private`], so a note
//! is on disk before the caller moves on to the deposit or relay step that
//! depends on it.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use stealth_core::{blob_salt, DepositNote, Felt, SealingKey};
use tracing::debug;
use zeroize::Zeroize;

use crate::config::write_private;
use crate::secure_storage::{prompt_new_password, prompt_password};

pub struct NoteStore {
    path: PathBuf,
    key: SealingKey,
}

impl NoteStore {
    /// Open the store at `path`, creating the key for a new one.
    ///
    /// An existing file must decrypt under `password`.
    pub fn open(path: PathBuf, password: &str) -> Result<Self> {
        let key = if path.exists() {
            let blob = fs::read(&path).context("Failed to read note store")?;
            let salt = blob_salt(&blob).context("Note store is corrupted")?;
            let key = SealingKey::derive(password, salt)?;
            let mut plaintext = key
                .open(&blob)
                .context("Failed to unlock note store - wrong password?")?;
            plaintext.zeroize();
            key
        } else {
            SealingKey::generate(password)?
        };
        Ok(Self { path, key })
    }

    /// Prompt for the note password and open the store.
    ///
    /// A store that does not exist yet gets a confirmed, strength-checked
    /// password: losing it loses every note.
    pub fn unlock(path: PathBuf) -> Result<Self> {
        let password = if path.exists() {
            prompt_password("Enter password to unlock notes: ")?
        } else {
            prompt_new_password("Choose a password for the note store: ")?
        };
        Self::open(path, &password)
    }

    /// All stored notes, oldest first. A missing file is an empty store.
    pub fn load_all(&self) -> Result<Vec<DepositNote>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let blob = fs::read(&self.path).context("Failed to read note store")?;
        let mut plaintext = self
            .key
            .open(&blob)
            .context("Failed to decrypt note store")?;
        let notes = serde_json::from_slice(&plaintext);
        plaintext.zeroize();
        notes.context("Failed to parse note store")
    }

    fn save_all(&self, notes: &[DepositNote]) -> Result<()> {
        let mut plaintext = serde_json::to_vec(notes)?;
        let blob = self.key.seal(&plaintext);
        plaintext.zeroize();
        write_private(&self.path, &blob?).context("Failed to persist note store")
    }

    /// Insert or replace the note with the same commitment, then sync to disk
    pub fn upsert(&self, note: &DepositNote) -> Result<()> {
        if !note.verify() {
            bail!("Refusing to store a note whose commitment does not match its secrets");
        }

        let mut notes = self.load_all()?;
        match notes.iter_mut().find(|n| n.commitment == note.commitment) {
            Some(existing) => *existing = note.clone(),
            None => notes.push(note.clone()),
        }
        self.save_all(&notes)?;

        debug!(commitment = %note.commitment, status = ?note.status, "note persisted");
        Ok(())
    }

    pub fn find(&self, commitment: &Felt) -> Result<Option<DepositNote>> {
        Ok(self
            .load_all()?
            .into_iter()
            .find(|n| n.commitment == *commitment))
    }

    /// Notes that have not been withdrawn yet
    pub fn unspent(&self) -> Result<Vec<DepositNote>> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|n| !n.is_spent())
            .collect())
    }
}
