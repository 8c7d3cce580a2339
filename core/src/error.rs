//! Error types for the StealthPay core
//!
//! Only malformed input and hard failures are errors. A payment that is not
//! ours, or an amount ciphertext that does not open to its commitment, is an
//! ordinary outcome and is reported as `None` by the relevant function.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StealthError {
    #[error("Invalid hex in {field}: {reason}")]
    InvalidHex { field: &'static str, reason: String },

    #[error("Invalid length for {field}: expected {expected} bytes, got {actual}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid {field} - not a valid secp256k1 point")]
    InvalidPoint { field: &'static str },

    #[error("Invalid {field} - scalar must be nonzero and below the curve order")]
    InvalidScalar { field: &'static str },

    #[error("Derived tweak is zero - refusing degenerate stealth key")]
    DegenerateTweak,

    #[error("Invalid felt - value must fit in 251 bits")]
    FeltOverflow,

    #[error("Invalid meta-address: {0}")]
    InvalidMetaAddress(String),

    #[error("Invalid amount '{input}': {reason}")]
    InvalidAmount { input: String, reason: String },

    #[error("Amount does not fit in {bits} bits")]
    AmountOverflow { bits: u32 },

    #[error("Invalid denomination tiers: {0}")]
    InvalidDenominations(String),

    #[error("Amount {amount} cannot be represented with the allowed denominations (remainder {remainder})")]
    Unrepresentable { amount: String, remainder: String },

    #[error("Deposit note {commitment} is already spent")]
    NoteSpent { commitment: String },

    #[error("Deposit note is corrupted - commitment does not match its secret and nullifier")]
    NoteCommitmentMismatch,

    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Malformed backup: {0}")]
    MalformedBackup(String),

    #[error("Unsupported backup version {0}")]
    UnsupportedBackupVersion(u8),

    #[error("Backup decryption failed - wrong password or corrupted data")]
    BackupAuthentication,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Encryption failed")]
    Encryption,

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StealthError>;
