//! Export and import password-protected identity backups

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use stealth_core::{export_backup_base64, import_backup_base64};

use crate::config::{write_private, DataDir};
use crate::secure_storage::{prompt_new_password, prompt_password, SecureKeyStorage};

/// Write the stored identity to `output` as a base64 backup blob
pub fn export(data_dir: &DataDir, output: &Path) -> Result<()> {
    let storage = SecureKeyStorage::new(data_dir.identity_file());
    let password = prompt_password("Enter password to decrypt keys: ")?;
    let identity = storage
        .load(&password)
        .context("Failed to decrypt keys. Wrong password?")?;

    println!("{}", "Choose a password for the backup file.".cyan());
    let backup_password = prompt_new_password("Backup password: ")?;

    let text = export_backup_base64(&identity, &backup_password)?;
    write_private(output, text.as_bytes())?;

    println!("{}", "Backup written".green().bold());
    println!("{}", format!("{:?}", output).dimmed());
    Ok(())
}

/// Restore an identity from a backup file into the encrypted key store
pub fn import(data_dir: &DataDir, input: &Path, force: bool) -> Result<()> {
    let storage = SecureKeyStorage::new(data_dir.identity_file());
    if storage.exists() && !force {
        bail!("Stealth keys already exist. Use --force to overwrite.");
    }

    let text = fs::read_to_string(input)
        .with_context(|| format!("Failed to read backup file {:?}", input))?;
    let backup_password = prompt_password("Backup password: ")?;
    let identity = import_backup_base64(&text, &backup_password)
        .context("Failed to open backup. Wrong password or corrupted file?")?;

    println!("{}", "Backup opened. Choose a password for local storage.".cyan());
    let password = prompt_new_password("Enter password: ")?;
    storage.save(&identity, &password)?;

    println!("{}", "Identity restored".green().bold());
    println!("Meta-address: {}", identity.meta_address());
    Ok(())
}
