//! Password-protected identity backups
//!
//! Uses AES-256-GCM for encryption and Argon2id for key derivation.
//!
//! Blob layout:
//! ```text
//! version (1) || salt (16) || nonce (12) || ciphertext + tag
//! ```
//! The plaintext is a JSON object holding both private keys and the
//! meta-address. [`SealingKey`] exposes the same layout for other local
//! secrets. Import fails as a whole on any authentication error; there
//! is no partial result.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::Argon2;
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, StealthError};
use crate::identity::{MetaAddress, StealthIdentity};
use crate::keys::SecretScalar;

/// Current blob format
pub const BACKUP_VERSION: u8 = 1;
pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const HEADER_LEN: usize = 1 + SALT_LEN + NONCE_LEN;

/// Argon2 parameters for key derivation (version 1)
const ARGON2_M_COST: u32 = 65536; // 64 MB memory
const ARGON2_T_COST: u32 = 3; // 3 iterations
const ARGON2_P_COST: u32 = 4; // 4 parallel lanes

/// Serialized identity (internal use only)
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
struct BackupPayload {
    spend_private_key: String,
    view_private_key: String,
    spend_pub_key: String,
    viewing_pub_key: String,
}

/// Derive the 32-byte cipher key from a password and salt
fn derive_key(password: &str, salt: &[u8]) -> Result<[u8; 32]> {
    let params = argon2::Params::new(ARGON2_M_COST, ARGON2_T_COST, ARGON2_P_COST, Some(32))
        .map_err(|e| StealthError::KeyDerivation(e.to_string()))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut key_bytes = [0u8; 32];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key_bytes)
        .map_err(|e| StealthError::KeyDerivation(e.to_string()))?;
    Ok(key_bytes)
}

/// Split a sealed blob into (salt, nonce, ciphertext), checking version and length
fn split_blob(blob: &[u8]) -> Result<(&[u8], &[u8], &[u8])> {
    let (&version, rest) = blob
        .split_first()
        .ok_or_else(|| StealthError::MalformedBackup("empty backup".to_string()))?;
    if version != BACKUP_VERSION {
        return Err(StealthError::UnsupportedBackupVersion(version));
    }
    if blob.len() < HEADER_LEN + TAG_LEN {
        return Err(StealthError::MalformedBackup(format!(
            "backup too short: {} bytes",
            blob.len()
        )));
    }

    let (salt, rest) = rest.split_at(SALT_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
    Ok((salt, nonce, ciphertext))
}

/// Salt recorded in the header of a sealed blob
pub fn blob_salt(blob: &[u8]) -> Result<[u8; SALT_LEN]> {
    let (salt, _, _) = split_blob(blob)?;
    let mut out = [0u8; SALT_LEN];
    out.copy_from_slice(salt);
    Ok(out)
}

/// Argon2id-derived AES-256-GCM key bound to one salt.
///
/// Deriving is the expensive step; a store that rewrites the same file many
/// times derives once and seals each write under a fresh nonce.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SealingKey {
    key: [u8; 32],
    salt: [u8; SALT_LEN],
}

impl SealingKey {
    /// Key for a new blob, under a fresh random salt
    pub fn generate(password: &str) -> Result<Self> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        Self::derive(password, salt)
    }

    /// Key for an existing blob, given the salt from its header
    pub fn derive(password: &str, salt: [u8; SALT_LEN]) -> Result<Self> {
        Ok(Self {
            key: derive_key(password, &salt)?,
            salt,
        })
    }

    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.key).map_err(|_| StealthError::Encryption)
    }

    /// `version || salt || nonce || ciphertext + tag`
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher()?
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| StealthError::Encryption)?;

        let mut blob = Vec::with_capacity(HEADER_LEN + ciphertext.len());
        blob.push(BACKUP_VERSION);
        blob.extend_from_slice(&self.salt);
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Authenticate and decrypt a blob sealed under this key
    pub fn open(&self, blob: &[u8]) -> Result<Vec<u8>> {
        let (salt, nonce, ciphertext) = split_blob(blob)?;
        if salt != self.salt.as_slice() {
            return Err(StealthError::BackupAuthentication);
        }
        self.cipher()?
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| StealthError::BackupAuthentication)
    }
}

/// Encrypt an identity under `password`
pub fn export_backup(identity: &StealthIdentity, password: &str) -> Result<Vec<u8>> {
    let meta = identity.meta_address();
    let payload = BackupPayload {
        spend_private_key: identity.spend_secret().to_hex(),
        view_private_key: identity.viewing_secret().to_hex(),
        spend_pub_key: meta.spend_pub_key.to_hex(),
        viewing_pub_key: meta.viewing_pub_key.to_hex(),
    };
    let mut plaintext = serde_json::to_vec(&payload)?;

    let blob = SealingKey::generate(password).and_then(|key| key.seal(&plaintext));
    plaintext.zeroize();
    let blob = blob?;

    debug!(bytes = blob.len(), "exported identity backup");
    Ok(blob)
}

/// Decrypt a backup blob and rebuild the identity
pub fn import_backup(blob: &[u8], password: &str) -> Result<StealthIdentity> {
    let key = SealingKey::derive(password, blob_salt(blob)?)?;
    let mut plaintext = key.open(blob)?;

    let payload: std::result::Result<BackupPayload, _> = serde_json::from_slice(&plaintext);
    plaintext.zeroize();
    let payload =
        payload.map_err(|e| StealthError::MalformedBackup(format!("invalid payload: {}", e)))?;

    let spend = SecretScalar::from_hex(&payload.spend_private_key, "spend private key")?;
    let view = SecretScalar::from_hex(&payload.view_private_key, "viewing private key")?;
    let identity = StealthIdentity::from_private_keys(&spend.to_bytes(), &view.to_bytes())?;

    let stored = MetaAddress::from_hex(&payload.spend_pub_key, &payload.viewing_pub_key)?;
    if stored != identity.meta_address() {
        return Err(StealthError::MalformedBackup(
            "meta-address does not match private keys".to_string(),
        ));
    }

    debug!("imported identity backup");
    Ok(identity)
}

/// Base64 text form of [`export_backup`]
pub fn export_backup_base64(identity: &StealthIdentity, password: &str) -> Result<String> {
    Ok(STANDARD.encode(export_backup(identity, password)?))
}

/// Base64 text form of [`import_backup`]
pub fn import_backup_base64(text: &str, password: &str) -> Result<StealthIdentity> {
    let blob = STANDARD
        .decode(text.trim())
        .map_err(|e| StealthError::MalformedBackup(format!("invalid base64: {}", e)))?;
    import_backup(&blob, password)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_import_roundtrip() {
        let identity = StealthIdentity::generate();
        let password = "TestPassword123";

        let blob = export_backup(&identity, password).unwrap();
        let restored = import_backup(&blob, password).unwrap();

        assert_eq!(identity.export_private_keys(), restored.export_private_keys());
        assert_eq!(identity.meta_address(), restored.meta_address());
    }

    #[test]
    fn test_blob_layout() {
        let identity = StealthIdentity::generate();
        let blob = export_backup(&identity, "TestPassword123").unwrap();

        assert_eq!(blob[0], BACKUP_VERSION);
        assert!(blob.len() > HEADER_LEN + TAG_LEN);
    }

    #[test]
    fn test_fresh_salt_and_nonce_per_export() {
        let identity = StealthIdentity::generate();
        let a = export_backup(&identity, "TestPassword123").unwrap();
        let b = export_backup(&identity, "TestPassword123").unwrap();

        assert_ne!(a[1..HEADER_LEN], b[1..HEADER_LEN]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_password_fails() {
        let identity = StealthIdentity::generate();
        let blob = export_backup(&identity, "TestPassword123").unwrap();

        let result = import_backup(&blob, "WrongPassword123");
        assert!(matches!(result, Err(StealthError::BackupAuthentication)));
    }

    #[test]
    fn test_corrupted_ciphertext_fails() {
        let identity = StealthIdentity::generate();
        let mut blob = export_backup(&identity, "TestPassword123").unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;

        let result = import_backup(&blob, "TestPassword123");
        assert!(matches!(result, Err(StealthError::BackupAuthentication)));
    }

    #[test]
    fn test_unknown_version_and_truncation() {
        assert!(matches!(
            import_backup(&[], "pw"),
            Err(StealthError::MalformedBackup(_))
        ));
        assert!(matches!(
            import_backup(&[2u8; 64], "pw"),
            Err(StealthError::UnsupportedBackupVersion(2))
        ));
        assert!(matches!(
            import_backup(&[BACKUP_VERSION; 20], "pw"),
            Err(StealthError::MalformedBackup(_))
        ));
    }

    #[test]
    fn test_sealing_key_reuse() {
        let key = SealingKey::generate("TestPassword123").unwrap();
        let first = key.seal(b"first").unwrap();
        let second = key.seal(b"second").unwrap();

        // Same salt, fresh nonce each time
        assert_eq!(blob_salt(&first).unwrap(), *key.salt());
        assert_eq!(blob_salt(&second).unwrap(), *key.salt());
        assert_ne!(first[1 + SALT_LEN..HEADER_LEN], second[1 + SALT_LEN..HEADER_LEN]);

        let reopened = SealingKey::derive("TestPassword123", blob_salt(&first).unwrap()).unwrap();
        assert_eq!(reopened.open(&second).unwrap(), b"second");

        let wrong = SealingKey::derive("WrongPassword123", *key.salt()).unwrap();
        assert!(matches!(
            wrong.open(&first),
            Err(StealthError::BackupAuthentication)
        ));
    }

    #[test]
    fn test_base64_roundtrip() {
        let identity = StealthIdentity::generate();
        let text = export_backup_base64(&identity, "TestPassword123").unwrap();
        let restored = import_backup_base64(&text, "TestPassword123").unwrap();
        assert_eq!(identity.meta_address(), restored.meta_address());

        assert!(matches!(
            import_backup_base64("not base64!!", "TestPassword123"),
            Err(StealthError::MalformedBackup(_))
        ));
    }
}
