//! Subcommand implementations

pub mod address;
pub mod backup;
pub mod deposit;
pub mod init;
pub mod keygen;
pub mod notes;
pub mod reconcile;
pub mod relay;
pub mod scan;
pub mod send;
pub mod split;
