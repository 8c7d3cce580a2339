//! StealthPay CLI - stealth payments, hidden amounts and relayed deposit notes

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod feed;
mod note_store;
mod secure_storage;
mod settlement;


use commands::*;
use config::{resolve_data_dir, Config, DataDir};

#[derive(Parser)]
#[command(name = "stealthpay")]
#[command(author = "StealthPay Team")]
#[command(version = "0.1.0")]
#[command(about = "Stealth payments over secp256k1 - one-time addresses, hidden amounts, relayed notes")]
#[command(long_about = r#"
StealthPay lets anyone pay you at a fresh one-time address that only you
can link to your identity. Share your meta-address publicly, receive
payments privately.

Quick Start:
  1. stealthpay keygen                      Generate your stealth keys
  2. stealthpay address                     Show the meta-address to share
  3. stealthpay send --to st:... --amount N Prepare a payment (sender)
  4. stealthpay scan                        Check for incoming payments
  5. stealthpay split --amount 25 --deposit Deposit in fixed denominations
  6. stealthpay relay --note 0x.. --to st:..  Settle a note to a stealth address
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding keys, notes, ledger and config (default: ~/.stealthpay)
    #[arg(long, global = true, env = "STEALTHPAY_HOME")]
    data_dir: Option<PathBuf>,

    /// Announcement feed JSON file (default: <data-dir>/announcements.json)
    #[arg(long, global = true)]
    feed: Option<PathBuf>,

    /// Relay outbox directory (default: <data-dir>/outbox)
    #[arg(long, global = true)]
    outbox: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory with a default config.json
    Init,

    /// Generate new stealth key pairs (spend + viewing keys)
    Keygen {
        /// Force overwrite existing keys
        #[arg(short, long)]
        force: bool,

        /// Generate without a recovery phrase
        #[arg(long)]
        no_mnemonic: bool,

        /// Import from existing recovery phrase
        #[arg(long)]
        import_mnemonic: Option<String>,

        /// Passphrase for mnemonic (optional extra security)
        #[arg(long)]
        passphrase: Option<String>,
    },

    /// Change the password protecting the stored keys
    Passwd,

    /// Show your stealth meta-address
    Address {
        /// Print the JSON exchange form
        #[arg(long)]
        json: bool,
    },

    /// Prepare a stealth payment to a meta-address
    Send {
        /// Recipient's meta-address (st:... format)
        #[arg(short, long)]
        to: String,

        /// Amount in base units
        #[arg(short, long)]
        amount: String,

        /// Token address
        #[arg(long, default_value = "0x0")]
        token: String,

        /// Commit to the amount and encrypt it for the recipient
        #[arg(long)]
        hide_amount: bool,

        /// Print the payment as JSON
        #[arg(long)]
        json: bool,
    },

    /// Scan for incoming stealth payments
    Scan {
        /// Start from this block (default: scan all)
        #[arg(long)]
        from_block: Option<u64>,

        /// Scan the reconciled ledger instead of the feed
        #[arg(long)]
        ledger: bool,

        /// Print one-time spending keys
        #[arg(long)]
        show_keys: bool,
    },

    /// Create a deposit note and submit the deposit
    Deposit {
        /// Amount in token units (e.g. 1.5)
        #[arg(short, long, required_unless_present = "resubmit")]
        amount: Option<String>,

        /// Token address
        #[arg(long, default_value = "0x0")]
        token: String,

        /// Resubmit the deposit of a saved note that has none recorded
        #[arg(long, value_name = "COMMITMENT", conflicts_with = "amount")]
        resubmit: Option<String>,

        /// With --resubmit: record this transaction instead of submitting again
        #[arg(long, requires = "resubmit")]
        tx_hash: Option<String>,
    },

    /// Split an amount into the configured denominations
    Split {
        /// Amount in token units
        #[arg(short, long)]
        amount: String,

        /// Token address
        #[arg(long, default_value = "0x0")]
        token: String,

        /// Create and submit one deposit note per piece
        #[arg(long)]
        deposit: bool,
    },

    /// Relay a deposited note to a fresh stealth address of the recipient
    Relay {
        /// Commitment of the note to relay
        #[arg(short, long)]
        note: String,

        /// Recipient's meta-address
        #[arg(short, long)]
        to: String,
    },

    /// List deposit notes
    Notes {
        /// Include spent notes
        #[arg(long)]
        all: bool,
    },

    /// Encrypted identity backups
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },

    /// Sync the local announcement ledger with the feed
    Reconcile {
        /// Feed entries fetched per page
        #[arg(long, default_value_t = feed::DEFAULT_PAGE_SIZE)]
        page_size: usize,
    },
}

#[derive(Subcommand)]
enum BackupAction {
    /// Write an encrypted backup file
    Export {
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Restore keys from a backup file
    Import {
        #[arg(short, long)]
        input: PathBuf,

        /// Overwrite existing keys
        #[arg(short, long)]
        force: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let data_dir = DataDir::new(resolve_data_dir(cli.data_dir)?)
        .with_feed(cli.feed)
        .with_outbox(cli.outbox);

    match cli.command {
        Commands::Init => {
            init::run(&data_dir)?;
        }
        Commands::Keygen {
            force,
            no_mnemonic,
            import_mnemonic,
            passphrase,
        } => {
            keygen::run(
                &data_dir,
                keygen::KeygenOptions {
                    force,
                    with_mnemonic: !no_mnemonic,
                    import_mnemonic,
                    passphrase,
                },
            )?;
        }
        Commands::Passwd => {
            keygen::change_password(&data_dir)?;
        }
        Commands::Address { json } => {
            address::run(&data_dir, json)?;
        }
        Commands::Send {
            to,
            amount,
            token,
            hide_amount,
            json,
        } => {
            send::run(&to, &amount, &token, hide_amount, json)?;
        }
        Commands::Scan {
            from_block,
            ledger,
            show_keys,
        } => {
            let config = Config::load(&data_dir)?;
            scan::run(
                &data_dir,
                &config,
                scan::ScanOptions {
                    from_block,
                    use_ledger: ledger,
                    show_keys,
                },
            )
            .await?;
        }
        Commands::Deposit {
            amount,
            token,
            resubmit,
            tx_hash,
        } => {
            let config = Config::load(&data_dir)?;
            match (resubmit, amount) {
                (Some(commitment), _) => {
                    deposit::resubmit(&data_dir, &config, &commitment, tx_hash.as_deref()).await?
                }
                (None, Some(amount)) => deposit::run(&data_dir, &config, &amount, &token).await?,
                (None, None) => anyhow::bail!("--amount or --resubmit is required"),
            }
        }
        Commands::Split {
            amount,
            token,
            deposit,
        } => {
            let config = Config::load(&data_dir)?;
            split::run(&data_dir, &config, &amount, &token, deposit).await?;
        }
        Commands::Relay { note, to } => {
            let config = Config::load(&data_dir)?;
            relay::run(&data_dir, &config, &note, &to).await?;
        }
        Commands::Notes { all } => {
            notes::run(&data_dir, all)?;
        }
        Commands::Backup { action } => match action {
            BackupAction::Export { output } => backup::export(&data_dir, &output)?,
            BackupAction::Import { input, force } => backup::import(&data_dir, &input, force)?,
        },
        Commands::Reconcile { page_size } => {
            let config = Config::load(&data_dir)?;
            reconcile::run(&data_dir, &config, page_size).await?;
        }
    }

    Ok(())
}
