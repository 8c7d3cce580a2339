//! Scalar and point arithmetic over secp256k1
//!
//! Thin adapter around `k256` and SHA-256: key generation, scalar·G, ECDH,
//! point addition and scalar addition mod the curve order. Everything above
//! this module works with [`SecretScalar`] and [`PublicPoint`] only.

use k256::{
    elliptic_curve::{
        ops::Reduce, point::AffineCoordinates, sec1::ToEncodedPoint, Field, PrimeField,
    },
    FieldBytes, NonZeroScalar, ProjectivePoint, PublicKey, Scalar, U256,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::error::{Result, StealthError};

/// Length of a compressed SEC1 public key
pub const PUBLIC_KEY_LEN: usize = 33;

/// Length of a private scalar
pub const SECRET_KEY_LEN: usize = 32;

// ============================================================================
// Hashing
// ============================================================================

/// SHA-256 over the concatenation of `parts`
pub fn sha256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Hash to a scalar, reduced mod n
pub(crate) fn hash_to_scalar(domain: &[u8], data: &[u8]) -> Scalar {
    let mut digest = sha256(&[domain, data]);
    let scalar = <Scalar as Reduce<U256>>::reduce_bytes(&FieldBytes::from(digest));
    digest.zeroize();
    scalar
}

/// Decode a hex string, tolerating a `0x` prefix
pub(crate) fn decode_hex(input: &str, field: &'static str) -> Result<Vec<u8>> {
    let trimmed = input.trim();
    let stripped = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    hex::decode(stripped).map_err(|e| StealthError::InvalidHex {
        field,
        reason: e.to_string(),
    })
}

// ============================================================================
// Secret Scalars
// ============================================================================

/// A nonzero scalar below the curve order that zeroizes on drop
#[derive(Clone)]
pub struct SecretScalar {
    scalar: Scalar,
}

impl SecretScalar {
    /// Draw a fresh scalar from OS entropy
    pub fn random() -> Self {
        Self {
            scalar: *NonZeroScalar::random(&mut OsRng),
        }
    }

    /// Parse canonical big-endian bytes. Values `>= n` and zero are rejected.
    pub fn from_bytes(bytes: &[u8; SECRET_KEY_LEN], field: &'static str) -> Result<Self> {
        let scalar: Option<Scalar> = Scalar::from_repr(FieldBytes::from(*bytes)).into();
        let scalar = scalar.ok_or(StealthError::InvalidScalar { field })?;
        Self::from_scalar(scalar, field)
    }

    /// Parse from a slice, checking the length first
    pub fn from_slice(bytes: &[u8], field: &'static str) -> Result<Self> {
        let array: [u8; SECRET_KEY_LEN] =
            bytes.try_into().map_err(|_| StealthError::InvalidLength {
                field,
                expected: SECRET_KEY_LEN,
                actual: bytes.len(),
            })?;
        Self::from_bytes(&array, field)
    }

    pub fn from_hex(input: &str, field: &'static str) -> Result<Self> {
        let mut bytes = decode_hex(input, field)?;
        let secret = Self::from_slice(&bytes, field);
        bytes.zeroize();
        secret
    }

    pub(crate) fn from_scalar(scalar: Scalar, field: &'static str) -> Result<Self> {
        if bool::from(scalar.is_zero()) {
            return Err(StealthError::InvalidScalar { field });
        }
        Ok(Self { scalar })
    }

    pub(crate) fn scalar(&self) -> &Scalar {
        &self.scalar
    }

    /// Raw big-endian bytes (handle with care)
    pub fn to_bytes(&self) -> [u8; SECRET_KEY_LEN] {
        let mut out = [0u8; SECRET_KEY_LEN];
        out.copy_from_slice(&self.scalar.to_bytes());
        out
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Public key for this scalar (s·G)
    pub fn public_key(&self) -> PublicPoint {
        PublicPoint::from_nonidentity(ProjectivePoint::GENERATOR * self.scalar)
    }

    /// (self + other) mod n
    pub fn add(&self, other: &Scalar) -> Result<SecretScalar> {
        Self::from_scalar(self.scalar + other, "scalar sum")
    }
}

impl Drop for SecretScalar {
    fn drop(&mut self) {
        self.scalar.zeroize();
    }
}

impl std::fmt::Debug for SecretScalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretScalar(<redacted>)")
    }
}

// ============================================================================
// Public Points
// ============================================================================

/// A validated, non-identity secp256k1 point with its 33-byte compressed form
#[derive(Clone, Copy)]
pub struct PublicPoint {
    point: ProjectivePoint,
    compressed: [u8; PUBLIC_KEY_LEN],
}

impl PublicPoint {
    /// Parse a 33-byte compressed SEC1 point. Off-curve input is rejected.
    pub fn from_bytes(bytes: &[u8], field: &'static str) -> Result<Self> {
        if bytes.len() != PUBLIC_KEY_LEN {
            return Err(StealthError::InvalidLength {
                field,
                expected: PUBLIC_KEY_LEN,
                actual: bytes.len(),
            });
        }
        // Only the compressed tags; k256 also takes the 0x05 compact form
        if !matches!(bytes[0], 0x02 | 0x03) {
            return Err(StealthError::InvalidPoint { field });
        }
        let key =
            PublicKey::from_sec1_bytes(bytes).map_err(|_| StealthError::InvalidPoint { field })?;
        let encoded = key.to_encoded_point(true);
        if encoded.as_bytes() != bytes {
            return Err(StealthError::InvalidPoint { field });
        }
        let mut compressed = [0u8; PUBLIC_KEY_LEN];
        compressed.copy_from_slice(bytes);
        Ok(Self {
            point: key.to_projective(),
            compressed,
        })
    }

    pub fn from_hex(input: &str, field: &'static str) -> Result<Self> {
        Self::from_bytes(&decode_hex(input, field)?, field)
    }

    /// Wrap a point that is known not to be the identity.
    ///
    /// Callers only pass `k·G` for nonzero `k < n`, which is never the identity
    /// in a prime-order group.
    fn from_nonidentity(point: ProjectivePoint) -> Self {
        let encoded = point.to_affine().to_encoded_point(true);
        let mut compressed = [0u8; PUBLIC_KEY_LEN];
        compressed.copy_from_slice(encoded.as_bytes());
        Self { point, compressed }
    }

    pub(crate) fn from_projective(point: ProjectivePoint, field: &'static str) -> Result<Self> {
        let key = PublicKey::from_affine(point.to_affine())
            .map_err(|_| StealthError::InvalidPoint { field })?;
        let encoded = key.to_encoded_point(true);
        let mut compressed = [0u8; PUBLIC_KEY_LEN];
        compressed.copy_from_slice(encoded.as_bytes());
        Ok(Self { point, compressed })
    }

    pub(crate) fn point(&self) -> &ProjectivePoint {
        &self.point
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.compressed
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.compressed
    }

    /// Lowercase hex of the compressed point, no prefix
    pub fn to_hex(&self) -> String {
        hex::encode(self.compressed)
    }

    /// self + t·G
    pub fn tweak_add(&self, tweak: &Scalar) -> Result<PublicPoint> {
        Self::from_projective(
            self.point + ProjectivePoint::GENERATOR * tweak,
            "tweaked public key",
        )
    }
}

impl PartialEq for PublicPoint {
    fn eq(&self, other: &Self) -> bool {
        self.compressed == other.compressed
    }
}

impl Eq for PublicPoint {}

impl std::fmt::Debug for PublicPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicPoint({})", self.to_hex())
    }
}

impl std::fmt::Display for PublicPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for PublicPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicPoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PublicPoint::from_hex(&s, "public key").map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Key Pairs
// ============================================================================

/// A private scalar together with its public point.
///
/// Invariant: `public == secret·G`. Both constructors derive the public half.
#[derive(Clone)]
pub struct KeyPair {
    secret: SecretScalar,
    public: PublicPoint,
}

impl KeyPair {
    pub fn generate() -> Self {
        Self::from_secret(SecretScalar::random())
    }

    pub fn from_secret(secret: SecretScalar) -> Self {
        let public = secret.public_key();
        Self { secret, public }
    }

    pub fn from_secret_bytes(bytes: &[u8; SECRET_KEY_LEN], field: &'static str) -> Result<Self> {
        Ok(Self::from_secret(SecretScalar::from_bytes(bytes, field)?))
    }

    pub fn secret(&self) -> &SecretScalar {
        &self.secret
    }

    pub fn public(&self) -> &PublicPoint {
        &self.public
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ECDH
// ============================================================================

/// x-coordinate of secret·public, zeroized on drop
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Drop for SharedSecret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// ECDH: the x-coordinate of `secret · public`.
///
/// Symmetric: `a · (b·G)` and `b · (a·G)` give the same bytes.
pub fn ecdh(secret: &SecretScalar, public: &PublicPoint) -> SharedSecret {
    let shared = (*public.point() * secret.scalar()).to_affine();
    let mut x = [0u8; 32];
    x.copy_from_slice(&shared.x());
    SharedSecret(x)
}

/// Constant-time equality of two byte strings of equal length
pub(crate) fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}
