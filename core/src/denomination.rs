//! Fixed-denomination splitting
//!
//! Deposits only come in a small set of sizes so that individual deposits
//! look alike on-chain. An arbitrary amount is split greedily, largest tier
//! first; amounts that leave a remainder below the smallest tier are refused.

use num_bigint::BigUint;
use num_traits::Zero;

use crate::error::{Result, StealthError};

/// One allowed deposit size
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tier {
    /// Human-readable form as configured, e.g. "0.1"
    pub label: String,
    /// Value in base units (label × 10^decimals)
    pub base_units: BigUint,
}

/// Validated set of tiers, kept in ascending order
#[derive(Clone, Debug)]
pub struct Denominations {
    tiers: Vec<Tier>,
    decimals: u32,
}

impl Denominations {
    /// Parse human-readable tiers. Order of input does not matter.
    pub fn parse<S: AsRef<str>>(tiers: &[S], decimals: u32) -> Result<Self> {
        if tiers.is_empty() {
            return Err(StealthError::InvalidDenominations(
                "at least one tier is required".to_string(),
            ));
        }

        let mut parsed = Vec::with_capacity(tiers.len());
        for tier in tiers {
            let label = tier.as_ref().trim().to_string();
            let base_units = parse_units(&label, decimals)?;
            if base_units.is_zero() {
                return Err(StealthError::InvalidDenominations(format!(
                    "tier '{}' is zero",
                    label
                )));
            }
            parsed.push(Tier { label, base_units });
        }

        parsed.sort_by(|a, b| a.base_units.cmp(&b.base_units));
        if let Some(pair) = parsed.windows(2).find(|w| w[0].base_units == w[1].base_units) {
            return Err(StealthError::InvalidDenominations(format!(
                "duplicate tier '{}'",
                pair[1].label
            )));
        }

        Ok(Self {
            tiers: parsed,
            decimals,
        })
    }

    /// Tiers in ascending order
    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn decimals(&self) -> u32 {
        self.decimals
    }
}

/// Count of notes of one tier
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DenominationCount {
    pub tier: String,
    pub base_units: BigUint,
    pub count: u64,
}

/// Result of a split, largest tier first; tiers with a zero count are omitted
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DenominationSplit {
    pub parts: Vec<DenominationCount>,
}

impl DenominationSplit {
    pub fn total_notes(&self) -> u64 {
        self.parts.iter().map(|p| p.count).sum()
    }

    pub fn count_for(&self, tier: &str) -> u64 {
        self.parts
            .iter()
            .find(|p| p.tier == tier)
            .map(|p| p.count)
            .unwrap_or(0)
    }
}

/// Convert a human decimal ("25", "0.5") to base units with `decimals` places
pub fn parse_units(amount: &str, decimals: u32) -> Result<BigUint> {
    let invalid = |reason: String| StealthError::InvalidAmount {
        input: amount.to_string(),
        reason,
    };

    let trimmed = amount.trim();
    let (whole, fraction) = match trimmed.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (trimmed, ""),
    };

    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("expected a non-negative decimal number".to_string()));
    }
    if trimmed.contains('.') && fraction.is_empty() {
        return Err(invalid("missing digits after the decimal point".to_string()));
    }
    if !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("expected a non-negative decimal number".to_string()));
    }
    if fraction.len() > decimals as usize {
        return Err(invalid(format!(
            "more than {} fractional digits",
            decimals
        )));
    }

    let padded = format!("{}{}{}", whole, fraction, "0".repeat(decimals as usize - fraction.len()));
    BigUint::parse_bytes(padded.as_bytes(), 10)
        .ok_or_else(|| invalid("not a decimal number".to_string()))
}

/// Split `amount` into the fewest notes of the allowed tiers (greedy)
pub fn split_amount_into_denominations(
    amount: &str,
    denominations: &Denominations,
) -> Result<DenominationSplit> {
    let total = parse_units(amount, denominations.decimals)?;
    if total.is_zero() {
        return Err(StealthError::InvalidAmount {
            input: amount.to_string(),
            reason: "amount must be positive".to_string(),
        });
    }

    let mut remaining = total;
    let mut parts = Vec::new();
    for tier in denominations.tiers.iter().rev() {
        let count = &remaining / &tier.base_units;
        if count.is_zero() {
            continue;
        }
        remaining -= &count * &tier.base_units;
        let count = u64::try_from(&count).map_err(|_| StealthError::AmountOverflow { bits: 64 })?;
        parts.push(DenominationCount {
            tier: tier.label.clone(),
            base_units: tier.base_units.clone(),
            count,
        });
    }

    if !remaining.is_zero() {
        return Err(StealthError::Unrepresentable {
            amount: amount.trim().to_string(),
            remainder: remaining.to_str_radix(10),
        });
    }

    Ok(DenominationSplit { parts })
}
