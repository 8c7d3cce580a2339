//! StealthPay core - stealth addresses, hidden amounts and deposit notes
//!
//! Client-side implementation of a dual-key stealth address protocol over
//! secp256k1, with commitment-based amount hiding and a commitment/nullifier
//! note scheme for relayed settlement.
//!
//! Everything here is synchronous, pure and free of I/O. Fetching
//! announcements, persisting notes and talking to a relayer belong to the
//! caller.

pub mod amount;
pub mod backup;
pub mod denomination;
pub mod error;
pub mod felt;
pub mod identity;
pub mod keys;
pub mod note;
pub mod stealth;


#[cfg(test)]
mod test_vectors;


pub use amount::{
    commit_amount, create_amount_commitment, decrypt_amount, encrypt_amount_for_receiver,
    AmountCommitment, Blinding, EncryptedAmount, OpenedAmount,
};
pub use backup::{
    blob_salt, export_backup, export_backup_base64, import_backup, import_backup_base64,
    SealingKey,
};
pub use denomination::{
    parse_units, split_amount_into_denominations, DenominationCount, DenominationSplit,
    Denominations,
};
pub use error::{Result, StealthError};
pub use felt::{hash2, Felt, U256Halves};
pub use identity::{MetaAddress, StealthIdentity, ViewingKey};
pub use keys::{KeyPair, PublicPoint, SecretScalar};
pub use note::{
    build_relay_request, create_deposit_note, nullifier_hash, DepositCalldata, DepositNote,
    NoteStatus, RelayDestination, RelayRequest,
};
pub use stealth::{
    address_from_public_key, check_payment, derive_stealth_address, detect_payment,
    detect_payments, detect_payments_parallel, Announcement, DetectedPayment, HiddenAmount,
    StealthAddress, StealthAddressComputation,
};
