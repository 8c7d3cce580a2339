//! Secure identity storage with encryption at rest
//!
//! The private keys are sealed with the same password-based backup codec the
//! core exposes (AES-256-GCM under an Argon2id key). The meta-address is kept
//! in clear next to the blob so it can be shown without a password.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use stealth_core::{export_backup_base64, import_backup_base64, MetaAddress, StealthIdentity};

use crate::config::write_private;

/// Environment variable consulted before prompting, for scripted use
pub const PASSWORD_ENV: &str = "STEALTHPAY_PASSWORD";

/// Encrypted identity file format
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedIdentityFile {
    /// Version for future compatibility
    pub version: u8,
    /// Public meta-address (`st:` text form)
    pub meta_address: String,
    /// Backup blob (base64)
    pub blob: String,
    /// Creation timestamp
    pub created_at: String,
}

impl EncryptedIdentityFile {
    /// Encrypt an identity with a password
    pub fn encrypt(identity: &StealthIdentity, password: &str) -> Result<Self> {
        let blob = export_backup_base64(identity, password).context("Encryption failed")?;

        Ok(Self {
            version: 1,
            meta_address: identity.meta_address().to_text(),
            blob,
            created_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Decrypt the identity with a password
    pub fn decrypt(&self, password: &str) -> Result<StealthIdentity> {
        let identity = import_backup_base64(&self.blob, password)
            .context("Decryption failed - wrong password or corrupted data")?;

        if identity.meta_address().to_text() != self.meta_address {
            bail!("Stored meta-address does not match the decrypted keys");
        }

        Ok(identity)
    }
}

/// Secure identity storage manager
pub struct SecureKeyStorage {
    path: PathBuf,
}

impl SecureKeyStorage {
    /// Create a new secure key storage at the given path
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Check if an encrypted identity exists
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Save the identity encrypted under `password`
    pub fn save(&self, identity: &StealthIdentity, password: &str) -> Result<()> {
        let encrypted = EncryptedIdentityFile::encrypt(identity, password)?;
        let json = serde_json::to_string_pretty(&encrypted)?;
        write_private(&self.path, json.as_bytes())
    }

    fn read_file(&self) -> Result<EncryptedIdentityFile> {
        if !self.exists() {
            bail!("No stealth identity found. Run 'stealthpay keygen' first.");
        }

        let json = fs::read_to_string(&self.path)
            .context("Failed to read encrypted identity file")?;
        serde_json::from_str(&json).context("Failed to parse encrypted identity file")
    }

    /// Load and decrypt the identity
    pub fn load(&self, password: &str) -> Result<StealthIdentity> {
        self.read_file()?.decrypt(password)
    }

    /// Meta-address, without needing the password
    pub fn meta_address(&self) -> Result<MetaAddress> {
        let file = self.read_file()?;
        MetaAddress::from_text(&file.meta_address).context("Stored meta-address is invalid")
    }

    /// Change the password for the stored identity
    pub fn change_password(&self, old_password: &str, new_password: &str) -> Result<()> {
        let identity = self.load(old_password)?;
        self.save(&identity, new_password)
    }
}

/// Password strength validation
pub fn validate_password_strength(password: &str) -> Result<()> {
    if password.len() < 8 {
        bail!("Password must be at least 8 characters");
    }

    let has_upper = password.chars().any(|c| c.is_uppercase());
    let has_lower = password.chars().any(|c| c.is_lowercase());
    let has_digit = password.chars().any(|c| c.is_numeric());

    if !has_upper || !has_lower || !has_digit {
        bail!("Password must contain uppercase, lowercase, and numeric characters");
    }

    Ok(())
}

/// Prompt for password securely (hides input)
pub fn prompt_password(prompt: &str) -> Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(password);
    }
    rpassword::prompt_password(prompt).context("Failed to read password")
}

/// Prompt for password with confirmation
pub fn prompt_new_password(prompt: &str) -> Result<String> {
    let password = match std::env::var(PASSWORD_ENV) {
        Ok(password) => password,
        Err(_) => {
            let password = rpassword::prompt_password(prompt).context("Failed to read password")?;
            let confirm = rpassword::prompt_password("Confirm password: ")
                .context("Failed to read password")?;
            if password != confirm {
                bail!("Passwords do not match");
            }
            password
        }
    };

    validate_password_strength(&password)?;

    Ok(password)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let identity = StealthIdentity::generate();
        let password = "TestPassword123";

        let encrypted = EncryptedIdentityFile::encrypt(&identity, password).unwrap();
        let decrypted = encrypted.decrypt(password).unwrap();

        assert_eq!(identity.export_private_keys(), decrypted.export_private_keys());
        assert_eq!(encrypted.meta_address, identity.meta_address().to_text());
    }

    #[test]
    fn test_wrong_password_fails() {
        let identity = StealthIdentity::generate();
        let encrypted = EncryptedIdentityFile::encrypt(&identity, "TestPassword123").unwrap();

        assert!(encrypted.decrypt("WrongPassword123").is_err());
    }

    #[test]
    fn test_tampered_meta_address_rejected() {
        let identity = StealthIdentity::generate();
        let mut encrypted = EncryptedIdentityFile::encrypt(&identity, "TestPassword123").unwrap();
        encrypted.meta_address = StealthIdentity::generate().meta_address().to_text();

        assert!(encrypted.decrypt("TestPassword123").is_err());
    }

    #[test]
    fn test_storage_lifecycle() {
        let dir = tempdir().unwrap();
        let storage = SecureKeyStorage::new(dir.path().join("identity.enc"));
        assert!(!storage.exists());
        assert!(storage.meta_address().is_err());

        let identity = StealthIdentity::generate();
        storage.save(&identity, "TestPassword123").unwrap();
        assert!(storage.exists());
        assert_eq!(storage.meta_address().unwrap(), identity.meta_address());

        storage
            .change_password("TestPassword123", "NewPassword456")
            .unwrap();
        assert!(storage.load("TestPassword123").is_err());
        let loaded = storage.load("NewPassword456").unwrap();
        assert_eq!(loaded.meta_address(), identity.meta_address());
    }

    #[cfg(unix)]
    #[test]
    fn test_identity_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let storage = SecureKeyStorage::new(dir.path().join("nested").join("identity.enc"));
        storage
            .save(&StealthIdentity::generate(), "TestPassword123")
            .unwrap();

        let mode = fs::metadata(storage.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_password_validation() {
        assert!(validate_password_strength("short").is_err());
        assert!(validate_password_strength("alllowercase").is_err());
        assert!(validate_password_strength("ALLUPPERCASE").is_err());
        assert!(validate_password_strength("NoNumbers").is_err());
        assert!(validate_password_strength("ValidPass123").is_ok());
    }
}
