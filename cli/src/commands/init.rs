//! Create the data directory and a default configuration

use anyhow::Result;
use colored::Colorize;

use crate::config::{Config, DataDir};

pub fn run(data_dir: &DataDir) -> Result<()> {
    if data_dir.config_file().exists() {
        let config = Config::load(data_dir)?;
        // Validate what is already there
        config.denominations()?;
        println!(
            "{}",
            format!("Config already present at {:?}", data_dir.config_file()).dimmed()
        );
        return Ok(());
    }

    Config::default().save(data_dir)?;
    println!("{}", "Initialised StealthPay data directory".green().bold());
    println!("  {}", data_dir.root().display());
    Ok(())
}
