//! Hidden payment amounts
//!
//! The sender commits to the amount on-chain and encrypts (amount, blinding)
//! to the recipient's viewing key with a one-time pad keyed by the payment's
//! ECDH secret. The pad is safe because every payment mints a fresh
//! ephemeral key, so each shared secret encrypts exactly one payload.
//!
//! Payload layout (32 bytes): amount as u128 big-endian || blinding as u128
//! big-endian.

use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, StealthError};
use crate::felt::{hash2, Felt};
use crate::keys::{decode_hex, ecdh, sha256, PublicPoint, SecretScalar};

/// Domain tag appended to the shared secret to derive the key stream
const AMOUNT_STREAM_DOMAIN: &[u8] = b"amount";

/// Size of the encrypted payload
pub const ENCRYPTED_AMOUNT_LEN: usize = 32;

/// Single-use blinding factor for an amount commitment
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Blinding(u128);

impl Blinding {
    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        let blinding = Blinding(u128::from_be_bytes(bytes));
        bytes.zeroize();
        blinding
    }

    pub fn from_u128(value: u128) -> Self {
        Blinding(value)
    }

    pub fn value(&self) -> u128 {
        self.0
    }
}

impl std::fmt::Debug for Blinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Blinding(<redacted>)")
    }
}

/// Commitment to an amount together with the blinding that opens it
#[derive(Clone, Debug)]
pub struct AmountCommitment {
    pub commitment: Felt,
    pub blinding: Blinding,
}

/// Hash(amount, blinding)
pub fn commit_amount(amount: u128, blinding: &Blinding) -> Felt {
    hash2(&Felt::from_u128(amount), &Felt::from_u128(blinding.value()))
}

/// Draw a fresh blinding and commit to `amount`
pub fn create_amount_commitment(amount: u128) -> AmountCommitment {
    let blinding = Blinding::random();
    AmountCommitment {
        commitment: commit_amount(amount, &blinding),
        blinding,
    }
}

/// (amount, blinding) ciphertext for the recipient
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncryptedAmount([u8; ENCRYPTED_AMOUNT_LEN]);

impl EncryptedAmount {
    pub fn from_bytes(bytes: [u8; ENCRYPTED_AMOUNT_LEN]) -> Self {
        Self(bytes)
    }

    pub fn to_bytes(&self) -> [u8; ENCRYPTED_AMOUNT_LEN] {
        self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(input: &str) -> Result<Self> {
        let bytes = decode_hex(input, "encrypted amount")?;
        let array: [u8; ENCRYPTED_AMOUNT_LEN] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| StealthError::InvalidLength {
                    field: "encrypted amount",
                    expected: ENCRYPTED_AMOUNT_LEN,
                    actual: bytes.len(),
                })?;
        Ok(Self(array))
    }
}

impl Serialize for EncryptedAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for EncryptedAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        EncryptedAmount::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// An amount that opened to its on-chain commitment
#[derive(Clone, Debug)]
pub struct OpenedAmount {
    pub amount: u128,
    pub blinding: Blinding,
}

/// Key stream = SHA256(shared_secret || "amount")
fn key_stream(secret: &SecretScalar, public: &PublicPoint) -> [u8; ENCRYPTED_AMOUNT_LEN] {
    let shared = ecdh(secret, public);
    sha256(&[shared.as_bytes(), AMOUNT_STREAM_DOMAIN])
}

fn xor_in_place(payload: &mut [u8; ENCRYPTED_AMOUNT_LEN], stream: &[u8; ENCRYPTED_AMOUNT_LEN]) {
    for (byte, key) in payload.iter_mut().zip(stream.iter()) {
        *byte ^= key;
    }
}

/// Encrypt (amount, blinding) so only the holder of the viewing key can open it
pub fn encrypt_amount_for_receiver(
    amount: u128,
    blinding: &Blinding,
    ephemeral_secret: &SecretScalar,
    viewing_pub_key: &PublicPoint,
) -> EncryptedAmount {
    let mut stream = key_stream(ephemeral_secret, viewing_pub_key);

    let mut payload = [0u8; ENCRYPTED_AMOUNT_LEN];
    payload[..16].copy_from_slice(&amount.to_be_bytes());
    payload[16..].copy_from_slice(&blinding.value().to_be_bytes());
    xor_in_place(&mut payload, &stream);
    stream.zeroize();

    EncryptedAmount(payload)
}

/// Decrypt an amount and check it against the on-chain commitment.
///
/// Returns `None` when the ciphertext was not meant for this viewing key or
/// was corrupted: the decrypted value is only released once
/// Hash(amount, blinding) equals `commitment`.
pub fn decrypt_amount(
    encrypted: &EncryptedAmount,
    commitment: &Felt,
    viewing_secret: &SecretScalar,
    ephemeral_pub_key: &PublicPoint,
) -> Option<OpenedAmount> {
    let mut stream = key_stream(viewing_secret, ephemeral_pub_key);
    let mut payload = encrypted.0;
    xor_in_place(&mut payload, &stream);
    stream.zeroize();

    let mut amount_bytes = [0u8; 16];
    let mut blinding_bytes = [0u8; 16];
    amount_bytes.copy_from_slice(&payload[..16]);
    blinding_bytes.copy_from_slice(&payload[16..]);
    payload.zeroize();

    let amount = u128::from_be_bytes(amount_bytes);
    let blinding = Blinding(u128::from_be_bytes(blinding_bytes));
    blinding_bytes.zeroize();

    if !commit_amount(amount, &blinding).ct_eq(commitment) {
        debug!("amount ciphertext does not open to commitment");
        return None;
    }

    Some(OpenedAmount { amount, blinding })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyPair;

    #[test]
    fn test_commitment_is_deterministic_and_binding() {
        let blinding = Blinding::from_u128(7);
        assert_eq!(commit_amount(100, &blinding), commit_amount(100, &blinding));
        assert_ne!(commit_amount(100, &blinding), commit_amount(101, &blinding));
        assert_ne!(
            commit_amount(100, &blinding),
            commit_amount(100, &Blinding::from_u128(8))
        );
    }

    #[test]
    fn test_fresh_blinding_hides_equal_amounts() {
        let a = create_amount_commitment(1_000);
        let b = create_amount_commitment(1_000);
        assert_ne!(a.commitment, b.commitment);
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let ephemeral = KeyPair::generate();
        let viewer = KeyPair::generate();
        let committed = create_amount_commitment(123_456_789);

        let encrypted = encrypt_amount_for_receiver(
            123_456_789,
            &committed.blinding,
            ephemeral.secret(),
            viewer.public(),
        );
        let opened = decrypt_amount(
            &encrypted,
            &committed.commitment,
            viewer.secret(),
            ephemeral.public(),
        )
        .expect("recipient should open the amount");

        assert_eq!(opened.amount, 123_456_789);
        assert_eq!(opened.blinding, committed.blinding);
    }

    #[test]
    fn test_wrong_viewing_key_yields_no_match() {
        let ephemeral = KeyPair::generate();
        let viewer = KeyPair::generate();
        let stranger = KeyPair::generate();
        let committed = create_amount_commitment(42);

        let encrypted =
            encrypt_amount_for_receiver(42, &committed.blinding, ephemeral.secret(), viewer.public());
        assert!(decrypt_amount(
            &encrypted,
            &committed.commitment,
            stranger.secret(),
            ephemeral.public()
        )
        .is_none());
    }

    #[test]
    fn test_each_corrupted_byte_yields_no_match() {
        let ephemeral = KeyPair::generate();
        let viewer = KeyPair::generate();
        let committed = create_amount_commitment(u128::MAX);

        let encrypted = encrypt_amount_for_receiver(
            u128::MAX,
            &committed.blinding,
            ephemeral.secret(),
            viewer.public(),
        );

        for index in 0..ENCRYPTED_AMOUNT_LEN {
            let mut bytes = encrypted.to_bytes();
            bytes[index] ^= 0x80;
            let corrupted = EncryptedAmount::from_bytes(bytes);
            assert!(
                decrypt_amount(&corrupted, &committed.commitment, viewer.secret(), ephemeral.public())
                    .is_none(),
                "corruption at byte {} must not open",
                index
            );
        }
    }

    #[test]
    fn test_zero_amount_is_not_a_fallback() {
        // A ciphertext for amount 0 opens only against its own commitment
        let ephemeral = KeyPair::generate();
        let viewer = KeyPair::generate();
        let zero = create_amount_commitment(0);
        let other = create_amount_commitment(5);

        let encrypted =
            encrypt_amount_for_receiver(0, &zero.blinding, ephemeral.secret(), viewer.public());
        assert!(
            decrypt_amount(&encrypted, &other.commitment, viewer.secret(), ephemeral.public())
                .is_none()
        );
        assert_eq!(
            decrypt_amount(&encrypted, &zero.commitment, viewer.secret(), ephemeral.public())
                .map(|o| o.amount),
            Some(0)
        );
    }

    #[test]
    fn test_encrypted_amount_hex_roundtrip() {
        let encrypted = EncryptedAmount::from_bytes([0xab; ENCRYPTED_AMOUNT_LEN]);
        let parsed = EncryptedAmount::from_hex(&encrypted.to_hex()).unwrap();
        assert_eq!(parsed, encrypted);
        assert!(EncryptedAmount::from_hex("0xabcd").is_err());
    }
}
