//! Prepare a stealth payment to a meta-address
//!
//! Produces the destination address and the announcement fields the sender
//! publishes with the transfer. With `--hide-amount` the amount is committed
//! to and encrypted for the recipient's viewing key under the same ephemeral
//! key.

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use stealth_core::{
    create_amount_commitment, derive_stealth_address, encrypt_amount_for_receiver,
    EncryptedAmount, Felt, MetaAddress, PublicPoint,
};
use tracing::info;

/// What the sender submits alongside the transfer
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInstruction {
    pub stealth_address: Felt,
    pub ephemeral_pub_key: PublicPoint,
    /// Public amount; "0" when hidden
    pub amount: String,
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_commitment: Option<Felt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_amount: Option<EncryptedAmount>,
}

/// Build the payment for `recipient` (`st:` text form or 132 hex digits)
pub fn prepare(recipient: &str, amount: &str, token: &str, hide_amount: bool) -> Result<PaymentInstruction> {
    let meta = MetaAddress::from_text(recipient).context("Invalid meta-address format")?;
    let computation =
        derive_stealth_address(&meta).context("Failed to compute stealth address")?;

    let (public_amount, amount_commitment, encrypted_amount) = if hide_amount {
        let value: u128 = amount
            .parse()
            .with_context(|| format!("Hidden amounts must be a base-unit integer below 2^128, got {:?}", amount))?;
        let committed = create_amount_commitment(value);
        let encrypted = encrypt_amount_for_receiver(
            value,
            &committed.blinding,
            computation.ephemeral_secret(),
            &meta.viewing_pub_key,
        );
        ("0".to_string(), Some(committed.commitment), Some(encrypted))
    } else {
        (amount.to_string(), None, None)
    };

    info!(stealth_address = %computation.address(), hidden = hide_amount, "prepared stealth payment");

    Ok(PaymentInstruction {
        stealth_address: *computation.address(),
        ephemeral_pub_key: *computation.ephemeral_pub_key(),
        amount: public_amount,
        token: token.to_string(),
        amount_commitment,
        encrypted_amount,
    })
}

pub fn run(recipient: &str, amount: &str, token: &str, hide_amount: bool, json: bool) -> Result<()> {
    let payment = prepare(recipient, amount, token, hide_amount)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&payment)?);
        return Ok(());
    }

    println!("{}", "Prepared stealth payment".green().bold());
    println!();
    println!("Stealth address: {}", payment.stealth_address);
    println!("Ephemeral key:   {}", payment.ephemeral_pub_key);
    println!("Token:           {}", payment.token);
    match (&payment.amount_commitment, &payment.encrypted_amount) {
        (Some(commitment), Some(encrypted)) => {
            println!("Amount:          {}", "hidden".yellow());
            println!("Commitment:      {}", commitment);
            println!("Encrypted:       {}", encrypted.to_hex());
        }
        _ => println!("Amount:          {}", payment.amount),
    }
    println!();
    println!(
        "{}",
        "Transfer to the stealth address and publish the ephemeral key with it.".dimmed()
    );

    Ok(())
}
