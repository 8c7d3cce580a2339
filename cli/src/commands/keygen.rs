//! Key generation command with encrypted storage and mnemonic support

use anyhow::{bail, Result};
use colored::Colorize;
use stealth_core::StealthIdentity;
use tracing::info;

use crate::config::DataDir;
use crate::secure_storage::{prompt_new_password, SecureKeyStorage};

/// Options for key generation
pub struct KeygenOptions {
    /// Force overwrite existing keys
    pub force: bool,
    /// Use mnemonic for key generation (allows recovery)
    pub with_mnemonic: bool,
    /// Import from existing mnemonic
    pub import_mnemonic: Option<String>,
    /// Passphrase for mnemonic (optional extra security)
    pub passphrase: Option<String>,
}

pub fn run(data_dir: &DataDir, options: KeygenOptions) -> Result<()> {
    let storage = SecureKeyStorage::new(data_dir.identity_file());

    // Check for existing keys
    if storage.exists() && !options.force {
        bail!(
            "Stealth keys already exist. Use --force to overwrite.\n\
             Warning: Overwriting keys will make any existing stealth payments unrecoverable!"
        );
    }

    println!("{}", "=== StealthPay Key Generation ===".cyan().bold());
    println!();

    let (identity, mnemonic) = if let Some(ref phrase) = options.import_mnemonic {
        println!("{}", "Importing keys from mnemonic phrase...".cyan());
        let passphrase = options.passphrase.as_deref().unwrap_or("");
        let identity = StealthIdentity::from_mnemonic(phrase, passphrase)?;
        (identity, None)
    } else if options.with_mnemonic {
        println!("{}", "Generating keys with recovery phrase...".cyan());
        let (identity, phrase) = StealthIdentity::generate_with_mnemonic()?;
        (identity, Some(phrase))
    } else {
        println!("{}", "Generating random keys (no recovery phrase)...".cyan());
        println!(
            "{}",
            "Warning: Without a recovery phrase, losing your password means losing your funds!"
                .yellow()
        );
        (StealthIdentity::generate(), None)
    };

    println!();
    println!("{}", "Choose a strong password to encrypt your keys.".cyan());
    println!(
        "{}",
        "Requirements: 8+ chars, uppercase, lowercase, and numbers".dimmed()
    );
    println!();

    let password = prompt_new_password("Enter password: ")?;
    storage.save(&identity, &password)?;
    info!(path = ?storage.path(), "identity stored");

    println!();
    println!("{}", "Keys generated and encrypted successfully!".green().bold());
    println!();

    if let Some(ref phrase) = mnemonic {
        print_mnemonic(phrase);
    }

    let meta = identity.meta_address();
    println!("{}:", "Spend Public Key".yellow());
    println!("  {}", meta.spend_pub_key);
    println!();
    println!("{}:", "Viewing Public Key".yellow());
    println!("  {}", meta.viewing_pub_key);
    println!();
    println!("{}:", "Meta-Address (share this to receive payments)".yellow());
    println!("  {}", meta);
    println!();
    println!(
        "{}",
        format!("Encrypted keys saved to: {:?}", storage.path()).dimmed()
    );
    println!();

    if mnemonic.is_none() && options.import_mnemonic.is_none() {
        println!("{}", "IMPORTANT: You did not use a recovery phrase.".red().bold());
        println!(
            "{}",
            "Export an encrypted backup with 'stealthpay backup export'.".yellow()
        );
    }

    Ok(())
}

fn print_mnemonic(phrase: &str) {
    println!("{}", "=== RECOVERY PHRASE - WRITE THIS DOWN! ===".red().bold());
    println!();
    println!(
        "{}",
        "┌────────────────────────────────────────────────────────────┐".yellow()
    );

    // Display mnemonic words in a grid
    let words: Vec<&str> = phrase.split_whitespace().collect();
    for (i, chunk) in words.chunks(4).enumerate() {
        let line: String = chunk
            .iter()
            .enumerate()
            .map(|(j, word)| format!("{:2}. {:<12}", i * 4 + j + 1, word))
            .collect::<Vec<_>>()
            .join(" ");
        println!("│ {} │", format!("{:<58}", line).yellow());
    }

    println!(
        "{}",
        "└────────────────────────────────────────────────────────────┘".yellow()
    );
    println!();
    println!("{}", "CRITICAL: Store this phrase securely OFFLINE!".red().bold());
    println!("{}", "You will NOT be shown this phrase again.".red());
    println!();
}

/// Re-encrypt the stored identity under a new password
pub fn change_password(data_dir: &DataDir) -> Result<()> {
    let storage = SecureKeyStorage::new(data_dir.identity_file());
    let old_password = crate::secure_storage::prompt_password("Current password: ")?;
    let new_password = prompt_new_password("New password: ")?;

    storage.change_password(&old_password, &new_password)?;
    println!("{}", "Password changed".green().bold());
    Ok(())
}
