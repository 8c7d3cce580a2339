//! Stealth address derivation (sender) and payment detection (receiver)
//!
//! Sender, given a meta-address (spend public key B, viewing public key V):
//!   r  = fresh ephemeral scalar,      R = r·G
//!   S  = x(r·V)
//!   t  = H(domain || S) mod n
//!   P  = B + t·G
//!   address = mask251(SHA256(compressed P))
//!
//! Receiver, holding (b, v) with B = b·G, V = v·G:
//!   S' = x(v·R) = S, so the same t and P are recomputed,
//!   and the one-time spending key is p = b + t mod n (p·G = P).

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::amount::{decrypt_amount, EncryptedAmount};
use crate::error::{Result, StealthError};
use crate::felt::Felt;
use crate::identity::{MetaAddress, StealthIdentity, ViewingKey};
use crate::keys::{ecdh, hash_to_scalar, sha256, KeyPair, PublicPoint, SecretScalar};

/// Domain separator for the shared-secret tweak
const TWEAK_DOMAIN: &[u8] = b"stealthpay_tweak_v1";

// ============================================================================
// Types
// ============================================================================

/// One-time destination plus the ephemeral key published with the payment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StealthAddress {
    pub address: Felt,
    pub ephemeral_pub_key: PublicPoint,
}

/// Result of computing a stealth address (sender side)
///
/// The ephemeral secret stays available to the sender for encrypting the
/// amount to the recipient; it is zeroized on drop.
pub struct StealthAddressComputation {
    /// The published part: address and ephemeral public key
    pub stealth: StealthAddress,
    /// The one-time public key P the address was hashed from
    pub stealth_pub_key: PublicPoint,
    ephemeral: KeyPair,
}

impl StealthAddressComputation {
    pub fn address(&self) -> &Felt {
        &self.stealth.address
    }

    pub fn ephemeral_pub_key(&self) -> &PublicPoint {
        &self.stealth.ephemeral_pub_key
    }

    pub fn ephemeral_secret(&self) -> &SecretScalar {
        self.ephemeral.secret()
    }
}

/// A payment announcement as mirrored from the chain
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub ephemeral_pub_key: PublicPoint,
    pub stealth_address: Felt,
    /// Opaque base-10 integer (wei-scale)
    pub amount: String,
    pub token: String,
    pub tx_hash: String,
    pub block_number: u64,
    pub timestamp: u64,
    /// Commitment to the real amount when it is hidden (`amount` is then "0")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_commitment: Option<Felt>,
    /// (amount, blinding) encrypted to the recipient's viewing key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_amount: Option<EncryptedAmount>,
}

/// What became of a hidden amount attached to a detected payment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HiddenAmount {
    /// Decrypted and matched against the commitment
    Opened(u128),
    /// Ciphertext missing, or it does not open to the commitment
    NoMatch,
}

/// A payment that belongs to the scanning identity.
///
/// Holds a spending key: it deliberately does not implement `Serialize`.
#[derive(Clone)]
pub struct DetectedPayment {
    pub stealth_address: Felt,
    pub stealth_private_key: SecretScalar,
    pub ephemeral_pub_key: PublicPoint,
    pub amount: String,
    /// Set when the announcement carried a hidden amount
    pub hidden_amount: Option<HiddenAmount>,
    pub token: String,
    pub tx_hash: String,
}

impl DetectedPayment {
    /// Amount to show the owner: the opened hidden amount when there is one
    pub fn display_amount(&self) -> String {
        match self.hidden_amount {
            Some(HiddenAmount::Opened(amount)) => amount.to_string(),
            Some(HiddenAmount::NoMatch) => "no match".to_string(),
            None => self.amount.clone(),
        }
    }

    /// Public key controlled by `stealth_private_key`
    pub fn stealth_pub_key(&self) -> PublicPoint {
        self.stealth_private_key.public_key()
    }
}

impl std::fmt::Debug for DetectedPayment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectedPayment")
            .field("stealth_address", &self.stealth_address)
            .field("ephemeral_pub_key", &self.ephemeral_pub_key)
            .field("amount", &self.amount)
            .field("hidden_amount", &self.hidden_amount)
            .field("token", &self.token)
            .field("tx_hash", &self.tx_hash)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Shared Derivation
// ============================================================================

/// Chain address of a one-time public key: mask251(SHA256(compressed P))
pub fn address_from_public_key(public: &PublicPoint) -> Felt {
    Felt::from_digest(sha256(&[public.as_bytes()]))
}

/// t = H(domain || x(secret·public)) mod n, rejecting t = 0
fn derive_tweak(secret: &SecretScalar, public: &PublicPoint) -> Result<k256::Scalar> {
    let shared = ecdh(secret, public);
    let tweak = hash_to_scalar(TWEAK_DOMAIN, shared.as_bytes());
    if bool::from(k256::elliptic_curve::Field::is_zero(&tweak)) {
        return Err(StealthError::DegenerateTweak);
    }
    Ok(tweak)
}

// ============================================================================
// Stealth Address Computation (Sender Side)
// ============================================================================

/// Compute a fresh stealth address for a recipient (sender side)
///
/// Each call draws a new ephemeral key, so repeated payments to the same
/// meta-address are unlinkable.
pub fn derive_stealth_address(meta: &MetaAddress) -> Result<StealthAddressComputation> {
    derive_stealth_address_with_ephemeral(meta, KeyPair::generate())
}

/// Deterministic variant for a caller-supplied ephemeral key pair
pub fn derive_stealth_address_with_ephemeral(
    meta: &MetaAddress,
    ephemeral: KeyPair,
) -> Result<StealthAddressComputation> {
    // t = H(x(r·V))
    let tweak = derive_tweak(ephemeral.secret(), &meta.viewing_pub_key)?;

    // P = B + t·G
    let stealth_pub_key = meta.spend_pub_key.tweak_add(&tweak)?;
    let address = address_from_public_key(&stealth_pub_key);

    trace!(address = %address, "derived stealth address");

    Ok(StealthAddressComputation {
        stealth: StealthAddress {
            address,
            ephemeral_pub_key: *ephemeral.public(),
        },
        stealth_pub_key,
        ephemeral,
    })
}

// ============================================================================
// Payment Detection (Recipient Side)
// ============================================================================

/// Recompute (t, address) for an announcement from the receiver's side
fn candidate(
    viewing_secret: &SecretScalar,
    spend_pub_key: &PublicPoint,
    ephemeral_pub_key: &PublicPoint,
) -> Option<(k256::Scalar, Felt)> {
    let tweak = derive_tweak(viewing_secret, ephemeral_pub_key).ok()?;
    let stealth_pub_key = spend_pub_key.tweak_add(&tweak).ok()?;
    Some((tweak, address_from_public_key(&stealth_pub_key)))
}

/// Check whether an announcement pays the given identity.
///
/// Returns the payment with its recovered spending key, or `None` when the
/// announcement belongs to someone else.
pub fn detect_payment(
    identity: &StealthIdentity,
    announcement: &Announcement,
) -> Option<DetectedPayment> {
    let (tweak, expected) = candidate(
        identity.viewing_secret(),
        identity.spend_public_key(),
        &announcement.ephemeral_pub_key,
    )?;

    if !expected.ct_eq(&announcement.stealth_address) {
        return None;
    }

    // p = b + t mod n
    let stealth_private_key = identity.spend_secret().add(&tweak).ok()?;
    let hidden_amount = open_hidden_amount(identity, announcement);

    Some(DetectedPayment {
        stealth_address: announcement.stealth_address,
        stealth_private_key,
        ephemeral_pub_key: announcement.ephemeral_pub_key,
        amount: announcement.amount.clone(),
        hidden_amount,
        token: announcement.token.clone(),
        tx_hash: announcement.tx_hash.clone(),
    })
}

fn open_hidden_amount(
    identity: &StealthIdentity,
    announcement: &Announcement,
) -> Option<HiddenAmount> {
    let commitment = announcement.amount_commitment.as_ref()?;
    let opened = announcement.encrypted_amount.as_ref().and_then(|encrypted| {
        decrypt_amount(
            encrypted,
            commitment,
            identity.viewing_secret(),
            &announcement.ephemeral_pub_key,
        )
    });
    Some(match opened {
        Some(opened) => HiddenAmount::Opened(opened.amount),
        None => HiddenAmount::NoMatch,
    })
}

/// Watch-only check: viewing secret and spend public key, no spending key
pub fn check_payment(view: &ViewingKey, announcement: &Announcement) -> bool {
    candidate(
        view.viewing_secret(),
        view.spend_pub_key(),
        &announcement.ephemeral_pub_key,
    )
    .map(|(_, expected)| expected.ct_eq(&announcement.stealth_address))
    .unwrap_or(false)
}

/// Scan announcements and keep the ones addressed to `identity`.
///
/// Stateless per item: input order does not matter, and re-running over the
/// same or overlapping announcements yields the same payments.
pub fn detect_payments<'a, I>(identity: &StealthIdentity, announcements: I) -> Vec<DetectedPayment>
where
    I: IntoIterator<Item = &'a Announcement>,
{
    let mut scanned = 0usize;
    let found: Vec<DetectedPayment> = announcements
        .into_iter()
        .inspect(|_| scanned += 1)
        .filter_map(|announcement| detect_payment(identity, announcement))
        .collect();

    debug!(scanned, matched = found.len(), "announcement scan complete");
    found
}

/// Same as [`detect_payments`], sharded across the rayon thread pool.
///
/// Output order follows input order.
pub fn detect_payments_parallel(
    identity: &StealthIdentity,
    announcements: &[Announcement],
) -> Vec<DetectedPayment> {
    let found: Vec<DetectedPayment> = announcements
        .par_iter()
        .filter_map(|announcement| detect_payment(identity, announcement))
        .collect();

    debug!(
        scanned = announcements.len(),
        matched = found.len(),
        "parallel announcement scan complete"
    );
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn announce(computation: &StealthAddressComputation, tx_hash: &str) -> Announcement {
        Announcement {
            ephemeral_pub_key: *computation.ephemeral_pub_key(),
            stealth_address: *computation.address(),
            amount: "1000".to_string(),
            token: "0x0".to_string(),
            tx_hash: tx_hash.to_string(),
            block_number: 1,
            timestamp: 1_700_000_000,
            amount_commitment: None,
            encrypted_amount: None,
        }
    }

    #[test]
    fn test_stealth_address_roundtrip() {
        let identity = StealthIdentity::generate();
        let computation = derive_stealth_address(&identity.meta_address()).unwrap();

        let detected = detect_payment(&identity, &announce(&computation, "0x1"))
            .expect("owner should detect payment");

        // The spending key controls exactly the derived one-time key
        assert_eq!(detected.stealth_pub_key(), computation.stealth_pub_key);
        assert_eq!(
            address_from_public_key(&detected.stealth_pub_key()),
            *computation.address()
        );
    }

    #[test]
    fn test_sender_and_receiver_share_masking_rule() {
        let identity = StealthIdentity::generate();
        let computation = derive_stealth_address(&identity.meta_address()).unwrap();

        let (_, receiver_view) = candidate(
            identity.viewing_secret(),
            identity.spend_public_key(),
            computation.ephemeral_pub_key(),
        )
        .unwrap();
        assert_eq!(receiver_view, *computation.address());
        assert!(computation.address().as_bytes()[0] <= crate::felt::FELT_TOP_BYTE_MASK);
    }

    #[test]
    fn test_detect_rejects_other_identity() {
        let owner = StealthIdentity::generate();
        let stranger = StealthIdentity::generate();
        let computation = derive_stealth_address(&owner.meta_address()).unwrap();

        assert!(detect_payment(&stranger, &announce(&computation, "0x1")).is_none());
    }

    #[test]
    fn test_detect_compares_address_case_insensitively() {
        let identity = StealthIdentity::generate();
        let computation = derive_stealth_address(&identity.meta_address()).unwrap();

        let json = serde_json::json!({
            "ephemeralPubKey": computation.ephemeral_pub_key().to_hex().to_uppercase(),
            "stealthAddress": computation.address().to_hex().to_uppercase().replacen("0X", "0x", 1),
            "amount": "5",
            "token": "0x0",
            "txHash": "0xabc",
            "blockNumber": 7,
            "timestamp": 0,
        });
        let announcement: Announcement = serde_json::from_value(json).unwrap();
        assert!(detect_payment(&identity, &announcement).is_some());
    }

    #[test]
    fn test_detect_with_tampered_address() {
        let identity = StealthIdentity::generate();
        let computation = derive_stealth_address(&identity.meta_address()).unwrap();

        let mut bytes = computation.address().to_bytes();
        bytes[31] ^= 0x01;
        let mut announcement = announce(&computation, "0x1");
        announcement.stealth_address = Felt::from_be_bytes(bytes).unwrap();

        assert!(detect_payment(&identity, &announcement).is_none());
    }

    #[test]
    fn test_check_payment_view_only() {
        let identity = StealthIdentity::generate();
        let computation = derive_stealth_address(&identity.meta_address()).unwrap();
        let announcement = announce(&computation, "0x1");

        assert!(check_payment(&identity.viewing_key(), &announcement));

        let mut wrong = announcement.clone();
        wrong.stealth_address = Felt::ZERO;
        assert!(!check_payment(&identity.viewing_key(), &wrong));
    }

    #[test]
    fn test_unique_per_call() {
        let meta = StealthIdentity::generate().meta_address();
        let first = derive_stealth_address(&meta).unwrap();
        let second = derive_stealth_address(&meta).unwrap();

        assert_ne!(first.address(), second.address());
        assert_ne!(first.ephemeral_pub_key(), second.ephemeral_pub_key());
    }

    #[test]
    fn test_deterministic_with_fixed_ephemeral() {
        let meta = StealthIdentity::generate().meta_address();
        let ephemeral = KeyPair::generate();

        let a = derive_stealth_address_with_ephemeral(&meta, ephemeral.clone()).unwrap();
        let b = derive_stealth_address_with_ephemeral(&meta, ephemeral).unwrap();
        assert_eq!(a.stealth, b.stealth);
    }

    #[test]
    fn test_parallel_scan_matches_sequential() {
        let identity = StealthIdentity::generate();
        let mut announcements = Vec::new();
        for i in 0..20 {
            let target = if i % 5 == 0 {
                identity.meta_address()
            } else {
                StealthIdentity::generate().meta_address()
            };
            let computation = derive_stealth_address(&target).unwrap();
            announcements.push(announce(&computation, &format!("0x{:x}", i)));
        }

        let sequential: Vec<String> = detect_payments(&identity, &announcements)
            .into_iter()
            .map(|p| p.tx_hash)
            .collect();
        let parallel: Vec<String> = detect_payments_parallel(&identity, &announcements)
            .into_iter()
            .map(|p| p.tx_hash)
            .collect();

        assert_eq!(sequential, vec!["0x0", "0x5", "0xa", "0xf"]);
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_hidden_amount_opened_on_detection() {
        use crate::amount::{create_amount_commitment, encrypt_amount_for_receiver};

        let identity = StealthIdentity::generate();
        let meta = identity.meta_address();
        let computation = derive_stealth_address(&meta).unwrap();
        let committed = create_amount_commitment(250_000);
        let encrypted = encrypt_amount_for_receiver(
            250_000,
            &committed.blinding,
            computation.ephemeral_secret(),
            &meta.viewing_pub_key,
        );

        let mut announcement = announce(&computation, "0x1");
        announcement.amount = "0".to_string();
        announcement.amount_commitment = Some(committed.commitment);
        announcement.encrypted_amount = Some(encrypted);

        let detected = detect_payment(&identity, &announcement).unwrap();
        assert_eq!(detected.hidden_amount, Some(HiddenAmount::Opened(250_000)));
        assert_eq!(detected.display_amount(), "250000");

        // Fields survive the JSON form used by feeds
        let json = serde_json::to_string(&announcement).unwrap();
        assert!(json.contains("amountCommitment"));
        let back: Announcement = serde_json::from_str(&json).unwrap();
        assert_eq!(back, announcement);

        // A commitment the ciphertext does not open to
        announcement.amount_commitment = Some(create_amount_commitment(250_000).commitment);
        let detected = detect_payment(&identity, &announcement).unwrap();
        assert_eq!(detected.hidden_amount, Some(HiddenAmount::NoMatch));
        assert_eq!(detected.display_amount(), "no match");

        // Public amounts are shown as published
        let plain = detect_payment(&identity, &announce(&computation, "0x2")).unwrap();
        assert_eq!(plain.hidden_amount, None);
        assert_eq!(plain.display_amount(), "1000");
    }

    #[test]
    fn test_detected_payment_debug_hides_key() {
        let identity = StealthIdentity::generate();
        let computation = derive_stealth_address(&identity.meta_address()).unwrap();
        let detected = detect_payment(&identity, &announce(&computation, "0x1")).unwrap();

        let rendered = format!("{:?}", detected);
        assert!(!rendered.contains(&detected.stealth_private_key.to_hex()));
    }
}
