//! 251-bit field elements and 256-bit amount encodings for chain calldata
//!
//! The settlement chain works over a 251-bit integer domain. Every value the
//! core hands to it (addresses, commitments, nullifier hashes) is produced by
//! masking a SHA-256 digest down to 251 bits: the top five bits of the first
//! big-endian byte are cleared. Derivation and detection share [`Felt::from_digest`],
//! so both sides always agree on the rule.

use std::fmt;
use std::str::FromStr;

use num_bigint::BigUint;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::DefaultIsZeroes;

use crate::error::{Result, StealthError};
use crate::keys::{ct_eq, decode_hex, sha256};

/// Mask applied to the most significant byte: keeps 3 of 8 bits (251 = 256 - 5)
pub const FELT_TOP_BYTE_MASK: u8 = 0x07;

/// Bit width of the felt domain
pub const FELT_BITS: u32 = 251;

/// A big-endian 32-byte integer strictly below 2^251
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Felt([u8; 32]);

impl DefaultIsZeroes for Felt {}

impl Felt {
    pub const ZERO: Felt = Felt([0u8; 32]);

    /// Mask a 256-bit digest into the felt domain (never overflows)
    pub fn from_digest(mut digest: [u8; 32]) -> Self {
        digest[0] &= FELT_TOP_BYTE_MASK;
        Felt(digest)
    }

    /// Strict conversion: values of 2^251 or more are rejected, not masked
    pub fn from_be_bytes(bytes: [u8; 32]) -> Result<Self> {
        if bytes[0] & !FELT_TOP_BYTE_MASK != 0 {
            return Err(StealthError::FeltOverflow);
        }
        Ok(Felt(bytes))
    }

    pub fn from_u128(value: u128) -> Self {
        let mut bytes = [0u8; 32];
        bytes[16..].copy_from_slice(&value.to_be_bytes());
        Felt(bytes)
    }

    /// Uniform random nonzero felt. Every felt is below the secp256k1 order.
    pub fn random() -> Self {
        loop {
            let mut bytes = [0u8; 32];
            OsRng.fill_bytes(&mut bytes);
            let felt = Felt::from_digest(bytes);
            if felt != Felt::ZERO {
                return felt;
            }
        }
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// `0x`-prefixed, 64 lowercase hex digits
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse hex with optional `0x`, any case, leading zeros optional
    pub fn from_hex(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if digits.is_empty() || digits.len() > 64 {
            return Err(StealthError::InvalidHex {
                field: "felt",
                reason: format!("expected 1 to 64 hex digits, got {}", digits.len()),
            });
        }
        let padded = format!("{:0>64}", digits);
        let decoded = decode_hex(&padded, "felt")?;
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&decoded);
        Felt::from_be_bytes(bytes)
    }

    /// Constant-time comparison
    pub fn ct_eq(&self, other: &Felt) -> bool {
        ct_eq(&self.0, &other.0)
    }
}

impl fmt::Display for Felt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Felt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Felt({})", self.to_hex())
    }
}

impl FromStr for Felt {
    type Err = StealthError;

    fn from_str(s: &str) -> Result<Self> {
        Felt::from_hex(s)
    }
}

impl Serialize for Felt {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Felt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Felt::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Two-input felt hash: mask(SHA256(a ‖ b))
pub fn hash2(a: &Felt, b: &Felt) -> Felt {
    Felt::from_digest(sha256(&[a.as_bytes(), b.as_bytes()]))
}

// ============================================================================
// 256-bit amounts
// ============================================================================

/// A 256-bit unsigned amount split into two 128-bit limbs, as chain calldata
/// expects it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct U256Halves {
    #[serde(with = "hex_u128")]
    pub low: u128,
    #[serde(with = "hex_u128")]
    pub high: u128,
}

impl U256Halves {
    pub fn from_u128(value: u128) -> Self {
        Self { low: value, high: 0 }
    }

    /// Parse a base-10 integer string (wei-scale); anything over 256 bits is an error
    pub fn from_decimal(input: &str) -> Result<Self> {
        let value = parse_decimal_integer(input)?;
        Self::from_biguint(&value)
    }

    pub fn from_biguint(value: &BigUint) -> Result<Self> {
        if value.bits() > 256 {
            return Err(StealthError::AmountOverflow { bits: 256 });
        }
        let digits = value.to_bytes_be();
        let mut bytes = [0u8; 32];
        bytes[32 - digits.len()..].copy_from_slice(&digits);

        let mut high = [0u8; 16];
        let mut low = [0u8; 16];
        high.copy_from_slice(&bytes[..16]);
        low.copy_from_slice(&bytes[16..]);
        Ok(Self {
            low: u128::from_be_bytes(low),
            high: u128::from_be_bytes(high),
        })
    }

    pub fn to_biguint(&self) -> BigUint {
        (BigUint::from(self.high) << 128usize) + BigUint::from(self.low)
    }

    pub fn to_decimal(&self) -> String {
        self.to_biguint().to_str_radix(10)
    }
}

/// Strict base-10 parse: ASCII digits only, no sign, no separators
pub(crate) fn parse_decimal_integer(input: &str) -> Result<BigUint> {
    let trimmed = input.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(StealthError::InvalidAmount {
            input: input.to_string(),
            reason: "expected a non-negative base-10 integer".to_string(),
        });
    }
    BigUint::parse_bytes(trimmed.as_bytes(), 10).ok_or_else(|| StealthError::InvalidAmount {
        input: input.to_string(),
        reason: "not a base-10 integer".to_string(),
    })
}

mod hex_u128 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{:#x}", value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let s = String::deserialize(deserializer)?;
        let digits = s.strip_prefix("0x").unwrap_or(&s);
        u128::from_str_radix(digits, 16).map_err(serde::de::Error::custom)
    }
}
