//! Exact decimal-string to base-unit conversion
//!
//! Human-readable amounts like "1.5" are converted to integer base units
//! without ever touching floating point: the result is exactly
//! `floor(amount * 10^decimals)`. Excess fractional digits are truncated.

use crate::tx::error::SendError;

/// Convert a human-readable decimal string to integer base units
///
/// `to_base_units("1.5", 6) == 1_500_000`; `to_base_units("0.000001", 6) == 1`.
/// Rejects empty, non-numeric and non-positive inputs.
pub fn to_base_units(amount: &str, decimals: u32) -> Result<u128, SendError> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err(SendError::invalid_amount(amount, "empty amount"));
    }

    let (whole, frac) = match amount.split_once('.') {
        Some((w, f)) => (w, f),
        None => (amount, ""),
    };

    if whole.is_empty() && frac.is_empty() {
        return Err(SendError::invalid_amount(amount, "no digits"));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(SendError::invalid_amount(amount, "not a decimal number"));
    }

    let scale = 10u128
        .checked_pow(decimals)
        .ok_or_else(|| SendError::invalid_amount(amount, "decimals out of range"))?;

    let whole_units = if whole.is_empty() {
        0
    } else {
        whole
            .parse::<u128>()
            .map_err(|_| SendError::invalid_amount(amount, "integer part out of range"))?
    };
    let whole_units = whole_units
        .checked_mul(scale)
        .ok_or_else(|| SendError::invalid_amount(amount, "amount out of range"))?;

    // Fractional digits beyond `decimals` are floored away
    let frac = if frac.len() > decimals as usize {
        &frac[..decimals as usize]
    } else {
        frac
    };
    let frac_units = if frac.is_empty() {
        0
    } else {
        let parsed = frac
            .parse::<u128>()
            .map_err(|_| SendError::invalid_amount(amount, "fraction out of range"))?;
        parsed * 10u128.pow(decimals - frac.len() as u32)
    };

    let base_units = whole_units
        .checked_add(frac_units)
        .ok_or_else(|| SendError::invalid_amount(amount, "amount out of range"))?;
    if base_units == 0 {
        return Err(SendError::invalid_amount(amount, "amount must be positive"));
    }
    Ok(base_units)
}
