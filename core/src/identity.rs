//! Stealth identities and meta-addresses
//!
//! A [`StealthIdentity`] owns a spend key pair and a view key pair. Its public
//! projection, the [`MetaAddress`], is what recipients publish.

use std::fmt;
use std::str::FromStr;

use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::{Result, StealthError};
use crate::keys::{hash_to_scalar, KeyPair, PublicPoint, SecretScalar, PUBLIC_KEY_LEN};

/// Prefix of the single-string meta-address form
pub const META_ADDRESS_PREFIX: &str = "st:";

const MNEMONIC_SPEND_DOMAIN: &[u8] = b"stealthpay/spend";
const MNEMONIC_VIEW_DOMAIN: &[u8] = b"stealthpay/view";

// ============================================================================
// Meta Address
// ============================================================================

/// A recipient's long-lived public key pair.
///
/// JSON form matches the alias registry: `{"spendPubKey": hex, "viewingPubKey": hex}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaAddress {
    pub spend_pub_key: PublicPoint,
    pub viewing_pub_key: PublicPoint,
}

impl MetaAddress {
    pub fn new(spend_pub_key: PublicPoint, viewing_pub_key: PublicPoint) -> Self {
        Self {
            spend_pub_key,
            viewing_pub_key,
        }
    }

    /// Build from the registry's hex pair
    pub fn from_hex(spend_pub_key: &str, viewing_pub_key: &str) -> Result<Self> {
        Ok(Self {
            spend_pub_key: PublicPoint::from_hex(spend_pub_key, "spend public key")?,
            viewing_pub_key: PublicPoint::from_hex(viewing_pub_key, "viewing public key")?,
        })
    }

    /// `st:<spend hex><viewing hex>`
    pub fn to_text(&self) -> String {
        format!(
            "{}{}{}",
            META_ADDRESS_PREFIX,
            self.spend_pub_key.to_hex(),
            self.viewing_pub_key.to_hex()
        )
    }

    /// Parse either the `st:` text form or a bare 132-digit hex string
    pub fn from_text(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let encoded = trimmed.strip_prefix(META_ADDRESS_PREFIX).unwrap_or(trimmed);
        let expected = PUBLIC_KEY_LEN * 4;
        if encoded.len() != expected {
            return Err(StealthError::InvalidMetaAddress(format!(
                "expected {} hex digits, got {}",
                expected,
                encoded.len()
            )));
        }
        if !encoded.is_ascii() {
            return Err(StealthError::InvalidMetaAddress(
                "non-ASCII characters".to_string(),
            ));
        }
        let (spend, view) = encoded.split_at(PUBLIC_KEY_LEN * 2);
        Self::from_hex(spend, view)
    }
}

impl fmt::Display for MetaAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl FromStr for MetaAddress {
    type Err = StealthError;

    fn from_str(s: &str) -> Result<Self> {
        MetaAddress::from_text(s)
    }
}

// ============================================================================
// Stealth Identity
// ============================================================================

/// Complete stealth key set for a recipient
///
/// Security:
/// - Secret scalars are zeroized on drop
/// - Clone is NOT derived to prevent accidental copies
pub struct StealthIdentity {
    spend: KeyPair,
    view: KeyPair,
}

impl StealthIdentity {
    /// Generate fresh keys from OS entropy
    pub fn generate() -> Self {
        Self {
            spend: KeyPair::generate(),
            view: KeyPair::generate(),
        }
    }

    /// Rebuild from stored private keys. Public keys are always re-derived.
    pub fn from_private_keys(spend_secret: &[u8; 32], view_secret: &[u8; 32]) -> Result<Self> {
        Ok(Self {
            spend: KeyPair::from_secret_bytes(spend_secret, "spend private key")?,
            view: KeyPair::from_secret_bytes(view_secret, "viewing private key")?,
        })
    }

    /// Derive keys from a BIP-39 mnemonic phrase
    ///
    /// Derivation:
    /// - spend_secret = SHA256("stealthpay/spend" || seed) mod n
    /// - view_secret = SHA256("stealthpay/view" || seed) mod n
    pub fn from_mnemonic(mnemonic_phrase: &str, passphrase: &str) -> Result<Self> {
        let mnemonic: bip39::Mnemonic = mnemonic_phrase
            .parse()
            .map_err(|e: bip39::Error| StealthError::InvalidMnemonic(e.to_string()))?;

        let mut seed = mnemonic.to_seed(passphrase);
        let spend = SecretScalar::from_scalar(
            hash_to_scalar(MNEMONIC_SPEND_DOMAIN, &seed),
            "spend private key",
        );
        let view = SecretScalar::from_scalar(
            hash_to_scalar(MNEMONIC_VIEW_DOMAIN, &seed),
            "viewing private key",
        );
        seed.zeroize();

        Ok(Self {
            spend: KeyPair::from_secret(spend?),
            view: KeyPair::from_secret(view?),
        })
    }

    /// Generate a new 24-word mnemonic and derive keys from it
    pub fn generate_with_mnemonic() -> Result<(Self, String)> {
        let mut entropy = [0u8; 32];
        OsRng.fill_bytes(&mut entropy);

        let mnemonic = bip39::Mnemonic::from_entropy(&entropy)
            .map_err(|e| StealthError::InvalidMnemonic(e.to_string()));
        entropy.zeroize();

        let phrase = mnemonic?.to_string();
        let identity = Self::from_mnemonic(&phrase, "")?;
        Ok((identity, phrase))
    }

    pub fn meta_address(&self) -> MetaAddress {
        MetaAddress::new(*self.spend.public(), *self.view.public())
    }

    pub fn spend_public_key(&self) -> &PublicPoint {
        self.spend.public()
    }

    pub fn viewing_public_key(&self) -> &PublicPoint {
        self.view.public()
    }

    pub fn spend_secret(&self) -> &SecretScalar {
        self.spend.secret()
    }

    pub fn viewing_secret(&self) -> &SecretScalar {
        self.view.secret()
    }

    /// Export (spend, view) private keys
    ///
    /// WARNING: Handle these bytes with extreme care!
    pub fn export_private_keys(&self) -> ([u8; 32], [u8; 32]) {
        (self.spend.secret().to_bytes(), self.view.secret().to_bytes())
    }

    /// Watch-only capability: can recognise payments but not spend them
    pub fn viewing_key(&self) -> ViewingKey {
        ViewingKey {
            viewing_secret: self.view.secret().clone(),
            spend_pub_key: *self.spend.public(),
        }
    }
}

impl fmt::Debug for StealthIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StealthIdentity")
            .field("meta_address", &self.meta_address())
            .finish_non_exhaustive()
    }
}

/// Viewing private key plus spend public key
#[derive(Clone, Debug)]
pub struct ViewingKey {
    viewing_secret: SecretScalar,
    spend_pub_key: PublicPoint,
}

impl ViewingKey {
    pub fn new(viewing_secret: SecretScalar, spend_pub_key: PublicPoint) -> Self {
        Self {
            viewing_secret,
            spend_pub_key,
        }
    }

    pub fn viewing_secret(&self) -> &SecretScalar {
        &self.viewing_secret
    }

    pub fn spend_pub_key(&self) -> &PublicPoint {
        &self.spend_pub_key
    }
}
