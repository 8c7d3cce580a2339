//! Display stealth meta-address

use anyhow::Result;
use colored::Colorize;

use crate::config::DataDir;
use crate::secure_storage::SecureKeyStorage;

pub fn run(data_dir: &DataDir, json: bool) -> Result<()> {
    let meta = SecureKeyStorage::new(data_dir.identity_file()).meta_address()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&meta)?);
        return Ok(());
    }

    println!();
    println!("{}", "Your Stealth Meta-Address".yellow().bold());
    println!();
    println!("{}", meta);
    println!();
    println!("{}:", "Components".dimmed());
    println!("  Spend pubkey:   {}", meta.spend_pub_key);
    println!("  Viewing pubkey: {}", meta.viewing_pub_key);
    println!();
    println!(
        "{}",
        "Share the meta-address above to receive private payments.".dimmed()
    );

    Ok(())
}
