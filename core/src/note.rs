//! Deposit notes: commitment/nullifier pairs for relayed settlement
//!
//! ```text
//! nullifier_hash = H(nullifier, 0)
//! commitment     = H(secret, nullifier_hash)
//! ```
//!
//! The commitment goes on-chain with the deposit. At withdrawal the relayer
//! receives the nullifier hash and secret; the settlement ledger accepts a
//! given nullifier hash once, which is what stops a note being spent twice.
//!
//! A note is the only record of the right to withdraw. Callers must persist it
//! durably before submitting the deposit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroize;

use crate::error::{Result, StealthError};
use crate::felt::{hash2, parse_decimal_integer, Felt, U256Halves};
use crate::stealth::StealthAddress;

/// Lifecycle of a note as seen by its owner
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NoteStatus {
    /// Saved locally, deposit not yet confirmed
    #[default]
    Created,
    /// Deposit transaction submitted
    Deposited,
    /// Relay request handed to the relayer
    Relayed,
    /// Withdrawn; kept only as a receipt
    Spent,
}

/// H(nullifier, 0). The constant second input separates it from commitment hashing.
pub fn nullifier_hash(nullifier: &Felt) -> Felt {
    hash2(nullifier, &Felt::ZERO)
}

/// H(secret, nullifier_hash)
pub fn note_commitment(secret: &Felt, nullifier_hash: &Felt) -> Felt {
    hash2(secret, nullifier_hash)
}

/// Sender-side record of a deposit
///
/// `secret` and `nullifier` are wiped on drop.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositNote {
    pub secret: Felt,
    pub nullifier: Felt,
    pub commitment: Felt,
    /// Base-10 integer, wei-scale
    pub amount: String,
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deposit_tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: NoteStatus,
    /// Withdrawal destination, fixed the first time a relay is attempted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_destination: Option<RelayDestination>,
}

/// One-time address a note is withdrawn to.
///
/// The ephemeral key cannot be recomputed, so it lives with the note until
/// the withdrawal has been announced. Every retry reuses it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayDestination {
    /// Recipient meta-address in `st:` form
    pub recipient: String,
    pub stealth: StealthAddress,
}

impl Drop for DepositNote {
    fn drop(&mut self) {
        self.secret.zeroize();
        self.nullifier.zeroize();
    }
}

impl std::fmt::Debug for DepositNote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DepositNote")
            .field("commitment", &self.commitment)
            .field("amount", &self.amount)
            .field("token", &self.token)
            .field("deposit_tx_hash", &self.deposit_tx_hash)
            .field("status", &self.status)
            .field("relay_destination", &self.relay_destination)
            .finish_non_exhaustive()
    }
}

/// Create a note for depositing `amount` (base-10 integer) of `token`
pub fn create_deposit_note(amount: &str, token: &str) -> Result<DepositNote> {
    // Validates and canonicalises (e.g. strips leading zeros)
    let amount = U256Halves::from_decimal(amount)?.to_decimal();

    let secret = Felt::random();
    let nullifier = Felt::random();
    let commitment = note_commitment(&secret, &nullifier_hash(&nullifier));

    debug!(commitment = %commitment, amount = %amount, token, "created deposit note");

    Ok(DepositNote {
        secret,
        nullifier,
        commitment,
        amount,
        token: token.to_string(),
        deposit_tx_hash: None,
        created_at: Utc::now(),
        status: NoteStatus::Created,
        relay_destination: None,
    })
}

impl DepositNote {
    pub fn nullifier_hash(&self) -> Felt {
        nullifier_hash(&self.nullifier)
    }

    /// Does the stored commitment follow from the stored secret and nullifier?
    pub fn verify(&self) -> bool {
        note_commitment(&self.secret, &self.nullifier_hash()).ct_eq(&self.commitment)
    }

    pub fn is_spent(&self) -> bool {
        self.status == NoteStatus::Spent
    }

    pub fn mark_deposited(&mut self, tx_hash: &str) {
        self.deposit_tx_hash = Some(tx_hash.to_string());
        if self.status == NoteStatus::Created {
            self.status = NoteStatus::Deposited;
        }
    }

    pub fn mark_relayed(&mut self) {
        if self.status != NoteStatus::Spent {
            self.status = NoteStatus::Relayed;
        }
    }

    pub fn mark_spent(&mut self) {
        self.status = NoteStatus::Spent;
    }

    /// Whether a withdrawal to `address` settles this note
    pub fn is_withdrawn_to(&self, address: &Felt) -> bool {
        self.relay_destination
            .as_ref()
            .is_some_and(|d| d.stealth.address == *address)
    }

    /// Data the deposit pool contract needs
    pub fn deposit_calldata(&self) -> Result<DepositCalldata> {
        Ok(DepositCalldata {
            commitment: self.commitment,
            amount: U256Halves::from_decimal(&self.amount)?,
            token: self.token.clone(),
        })
    }
}

/// Calldata for the on-chain deposit
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositCalldata {
    pub commitment: Felt,
    pub amount: U256Halves,
    pub token: String,
}

/// What the relayer needs to settle a note to a stealth address
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    pub nullifier_hash: Felt,
    pub commitment: Felt,
    pub recipient: Felt,
    pub amount: String,
    pub token: String,
    pub secret: Felt,
}

/// Package a note for withdrawal to `recipient`
///
/// Spent notes and notes whose commitment no longer matches their secrets
/// are refused.
pub fn build_relay_request(note: &DepositNote, recipient: &Felt) -> Result<RelayRequest> {
    if note.is_spent() {
        return Err(StealthError::NoteSpent {
            commitment: note.commitment.to_hex(),
        });
    }
    if !note.verify() {
        return Err(StealthError::NoteCommitmentMismatch);
    }
    // Amount must still be a valid 256-bit integer
    parse_decimal_integer(&note.amount)?;

    Ok(RelayRequest {
        nullifier_hash: note.nullifier_hash(),
        commitment: note.commitment,
        recipient: *recipient,
        amount: note.amount.clone(),
        token: note.token.clone(),
        secret: note.secret,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commitment_structure() {
        let note = create_deposit_note("1000000000000000000", "0xeth").unwrap();
        let expected = hash2(&note.secret, &hash2(&note.nullifier, &Felt::ZERO));
        assert_eq!(note.commitment, expected);
        assert!(note.verify());
        assert_eq!(note.status, NoteStatus::Created);
    }

    #[test]
    fn test_nullifier_hash_deterministic() {
        let nullifier = Felt::random();
        assert_eq!(nullifier_hash(&nullifier), nullifier_hash(&nullifier));
        assert_ne!(nullifier_hash(&nullifier), nullifier);
    }

    #[test]
    fn test_nullifier_hash_domain_separated_from_commitment() {
        // H(n, 0) differs from a commitment built with the same first input
        let n = Felt::random();
        let other = Felt::random();
        assert_ne!(nullifier_hash(&n), note_commitment(&n, &other));
    }

    #[test]
    fn test_amount_is_canonicalised_and_validated() {
        let note = create_deposit_note("000100", "0xeth").unwrap();
        assert_eq!(note.amount, "100");
        assert!(create_deposit_note("1.5", "0xeth").is_err());
        assert!(create_deposit_note("", "0xeth").is_err());
    }

    #[test]
    fn test_relay_request_contents() {
        let note = create_deposit_note("500", "0xtoken").unwrap();
        let recipient = Felt::random();
        let request = build_relay_request(&note, &recipient).unwrap();

        assert_eq!(request.nullifier_hash, note.nullifier_hash());
        assert_eq!(request.commitment, note.commitment);
        assert_eq!(request.recipient, recipient);
        assert_eq!(request.amount, "500");
        assert_eq!(request.token, "0xtoken");
        assert_eq!(request.secret, note.secret);

        let json = serde_json::to_value(&request).unwrap();
        for field in ["nullifierHash", "commitment", "recipient", "amount", "token", "secret"] {
            assert!(json.get(field).is_some(), "missing {}", field);
        }
    }

    #[test]
    fn test_spent_note_refused() {
        let mut note = create_deposit_note("500", "0xtoken").unwrap();
        note.mark_spent();
        assert!(matches!(
            build_relay_request(&note, &Felt::random()),
            Err(StealthError::NoteSpent { .. })
        ));
    }

    #[test]
    fn test_tampered_note_refused() {
        let mut note = create_deposit_note("500", "0xtoken").unwrap();
        note.secret = Felt::random();
        assert!(!note.verify());
        assert!(matches!(
            build_relay_request(&note, &Felt::random()),
            Err(StealthError::NoteCommitmentMismatch)
        ));
    }

    #[test]
    fn test_status_transitions() {
        let mut note = create_deposit_note("1", "0xtoken").unwrap();
        note.mark_deposited("0xdeadbeef");
        assert_eq!(note.status, NoteStatus::Deposited);
        assert_eq!(note.deposit_tx_hash.as_deref(), Some("0xdeadbeef"));

        note.mark_relayed();
        assert_eq!(note.status, NoteStatus::Relayed);

        note.mark_spent();
        note.mark_relayed();
        assert!(note.is_spent());
    }

    #[test]
    fn test_note_json_roundtrip() {
        let mut note = create_deposit_note("42", "0xtoken").unwrap();
        note.mark_deposited("0x1");

        let json = serde_json::to_string(&note).unwrap();
        assert!(json.contains("depositTxHash"));
        assert!(json.contains("createdAt"));

        let back: DepositNote = serde_json::from_str(&json).unwrap();
        assert_eq!(back.secret, note.secret);
        assert_eq!(back.nullifier, note.nullifier);
        assert_eq!(back.commitment, note.commitment);
        assert_eq!(back.status, NoteStatus::Deposited);
        assert!(back.verify());
    }

    #[test]
    fn test_deposit_calldata_splits_amount() {
        let note = create_deposit_note("340282366920938463463374607431768211457", "0xtoken").unwrap();
        let calldata = note.deposit_calldata().unwrap();
        assert_eq!(calldata.commitment, note.commitment);
        assert_eq!(calldata.amount, U256Halves { low: 1, high: 1 });
    }

    #[test]
    fn test_relay_destination_survives_json() {
        use crate::identity::StealthIdentity;
        use crate::stealth::derive_stealth_address;

        let meta = StealthIdentity::generate().meta_address();
        let destination = derive_stealth_address(&meta).unwrap();
        let mut note = create_deposit_note("42", "0xtoken").unwrap();
        assert!(!note.is_withdrawn_to(destination.address()));

        note.relay_destination = Some(RelayDestination {
            recipient: meta.to_text(),
            stealth: destination.stealth,
        });
        let json = serde_json::to_string(&note).unwrap();
        assert!(json.contains("relayDestination"));
        assert!(json.contains("ephemeralPubKey"));

        let back: DepositNote = serde_json::from_str(&json).unwrap();
        assert_eq!(back.relay_destination, note.relay_destination);
        assert!(back.is_withdrawn_to(destination.address()));
        assert!(!back.is_withdrawn_to(&Felt::random()));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let note = create_deposit_note("1", "0xtoken").unwrap();
        let rendered = format!("{:?}", note);
        assert!(!rendered.contains(&note.secret.to_hex()));
        assert!(!rendered.contains(&note.nullifier.to_hex()));
    }
}
