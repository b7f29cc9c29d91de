//! Size arithmetic on Kubernetes quantities
//!
//! Converts `resource.Quantity` strings to byte counts, grows them by a
//! percentage and renders the result with binary (power-of-1024) suffixes.

use crate::error::{Error, Result};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

// =============================================================================
// Size Calculation
// =============================================================================

/// Grow a byte count by `increase_percent`, truncating toward zero.
///
/// Never returns less than zero bytes, so negative percentages bottom out.
pub fn grow_bytes(current_bytes: u64, increase_percent: i32) -> u64 {
    let scaled = current_bytes as f64 * (1.0 + f64::from(increase_percent) / 100.0);
    if scaled <= 0.0 {
        0
    } else {
        // `as` truncates and saturates at u64::MAX
        scaled as u64
    }
}

/// Compute the new requested size for a claim currently requesting `current`.
pub fn calculate_new_size(current: &Quantity, increase_percent: i32) -> Result<Quantity> {
    let bytes = parse_quantity_bytes(current)?;
    Ok(format_binary_si(grow_bytes(bytes, increase_percent)))
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse a quantity into whole bytes, rounding fractional bytes up.
pub fn parse_quantity_bytes(quantity: &Quantity) -> Result<u64> {
    let s = quantity.0.trim();
    let invalid = |reason: &str| Error::InvalidQuantity {
        value: quantity.0.clone(),
        reason: reason.to_string(),
    };

    if s.is_empty() {
        return Err(invalid("empty quantity"));
    }

    let body = s.strip_prefix('+').unwrap_or(s);
    if body.starts_with('-') {
        return Err(invalid("negative quantity"));
    }

    // Find where the number ends and the suffix begins
    let num_end = body
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit() && *c != '.')
        .map(|(i, _)| i)
        .unwrap_or(body.len());

    let (num_str, suffix) = body.split_at(num_end);
    let (numerator, denominator) = parse_decimal(num_str).ok_or_else(|| invalid("invalid number"))?;
    let (mult_num, mult_den) = suffix_multiplier(suffix).ok_or_else(|| invalid("unknown suffix"))?;

    let num = numerator
        .checked_mul(mult_num)
        .ok_or_else(|| invalid("quantity too large"))?;
    let den = denominator
        .checked_mul(mult_den)
        .ok_or_else(|| invalid("quantity too precise"))?;

    let bytes = num / den + u128::from(num % den != 0);
    u64::try_from(bytes).map_err(|_| invalid("quantity too large"))
}

/// Parse "12", "12.5" or ".5" into an exact fraction
fn parse_decimal(s: &str) -> Option<(u128, u128)> {
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }

    let mut numerator: u128 = 0;
    let mut denominator: u128 = 1;
    for c in int_part.chars().chain(frac_part.chars()) {
        let digit = c.to_digit(10)?;
        numerator = numerator.checked_mul(10)?.checked_add(u128::from(digit))?;
    }
    for _ in 0..frac_part.len() {
        denominator = denominator.checked_mul(10)?;
    }
    Some((numerator, denominator))
}

/// Multiplier for a quantity suffix as an exact fraction
fn suffix_multiplier(suffix: &str) -> Option<(u128, u128)> {
    const KI: u128 = 1024;
    let binary = |exp: u32| Some((KI.pow(exp), 1));
    let decimal = |exp: i32| {
        if exp >= 0 {
            10u128.checked_pow(exp as u32).map(|m| (m, 1))
        } else {
            10u128.checked_pow(exp.unsigned_abs()).map(|d| (1, d))
        }
    };

    match suffix {
        "" => Some((1, 1)),
        "Ki" => binary(1),
        "Mi" => binary(2),
        "Gi" => binary(3),
        "Ti" => binary(4),
        "Pi" => binary(5),
        "Ei" => binary(6),
        "n" => decimal(-9),
        "u" => decimal(-6),
        "m" => decimal(-3),
        "k" => decimal(3),
        "M" => decimal(6),
        "G" => decimal(9),
        "T" => decimal(12),
        "P" => decimal(15),
        "E" => decimal(18),
        _ => {
            // Exponent form: 1e3, 5E-2
            let exp = suffix.strip_prefix(['e', 'E'])?;
            let exp: i32 = exp.parse().ok()?;
            decimal(exp)
        }
    }
}

// =============================================================================
// Formatting
// =============================================================================

/// Render bytes in BinarySI canonical form.
///
/// Uses the largest binary suffix that divides the value exactly, or the bare
/// integer when it is not a multiple of 1024. Values below 1024 use decimal
/// suffixes, matching how the API server canonicalises small quantities.
pub fn format_binary_si(bytes: u64) -> Quantity {
    if bytes < 1024 {
        return Quantity(format_decimal_si(bytes));
    }

    const SUFFIXES: [&str; 7] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];
    let mut value = bytes;
    let mut exponent = 0;
    while exponent < SUFFIXES.len() - 1 && value % 1024 == 0 {
        value /= 1024;
        exponent += 1;
    }
    Quantity(format!("{}{}", value, SUFFIXES[exponent]))
}

fn format_decimal_si(bytes: u64) -> String {
    if bytes != 0 && bytes % 1000 == 0 {
        format!("{}k", bytes / 1000)
    } else {
        bytes.to_string()
    }
}
