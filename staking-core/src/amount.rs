//! Exact conversion between human-denominated amounts and integer subunits
//!
//! Amounts cross the API boundary as plain ASCII strings: dot-separated
//! decimals on the macro side, non-negative digit strings on the subunit side.
//! Literals are split into their integer and fractional digits (never parsed
//! through binary floating point) and scaled with [`U256`] arithmetic, widened
//! to [`U512`] for intermediate products, so a conversion either is exact or
//! fails. Nothing is rounded on the way into subunits.
//!
//! Multipliers and subunit amounts range over `U256`. Trailing fractional
//! zeros carry no precision and are ignored, so `"1.000000000000000000000"`
//! is one whole unit at any multiplier.
//!
//! ```
//! use staking_core::amount::{macro_to_subunits, subunits_to_macro};
//!
//! assert_eq!(macro_to_subunits("1.5", "1000000").unwrap(), "1500000");
//! assert_eq!(subunits_to_macro("1500000", "1000000").unwrap(), "1.5");
//! assert!(macro_to_subunits("0.1234567", "1000000").is_err());
//! ```

use crate::{Error, Result};
use alloy_primitives::{U256, U512};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// Converts a macro-denominated amount into integer subunits.
///
/// `multiplier` is the number of subunits per whole unit, as a decimal digit
/// string (e.g. `"1000000"` for a 6-decimal token).
pub fn macro_to_subunits(amount: &str, multiplier: &str) -> Result<String> {
    let multiplier = parse_multiplier(multiplier)?;
    let literal = MacroLiteral::parse(amount)?;
    scale_to_subunits(&literal, multiplier).map(|subunits| subunits.to_string())
}

/// Converts an integer subunit amount back into a macro-denominated decimal.
///
/// The result is truncated to the precision implied by `multiplier` and
/// printed without trailing zeros or exponent notation. Division can only
/// drop precision, so this never fails for "too many decimals".
pub fn subunits_to_macro(amount: &str, multiplier: &str) -> Result<String> {
    let multiplier = parse_multiplier(multiplier)?;
    let subunits = parse_subunits(amount)?;
    Ok(divide_subunits(subunits, multiplier))
}

/// Typed variant of [`macro_to_subunits`].
pub fn decimal_to_subunits(value: Decimal, multiplier: U256) -> Result<U256> {
    check_multiplier(multiplier)?;
    scale_to_subunits(&MacroLiteral::parse(&value.to_string())?, multiplier)
}

/// Typed variant of [`subunits_to_macro`].
pub fn subunits_to_decimal_string(subunits: U256, multiplier: U256) -> Result<String> {
    check_multiplier(multiplier)?;
    Ok(divide_subunits(subunits, multiplier))
}

/// A validated macro amount together with its denomination multiplier.
///
/// Construction guarantees `multiplier != 0`, `value >= 0` and that
/// `value * multiplier` is an exact integer. The value is kept in its
/// canonical decimal form: no leading or trailing zeros, no exponent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Amount {
    value: String,
    multiplier: U256,
    subunits: U256,
}

impl Amount {
    /// Validate a decimal value against a multiplier
    pub fn new(value: Decimal, multiplier: U256) -> Result<Self> {
        check_multiplier(multiplier)?;
        Self::from_literal(MacroLiteral::parse(&value.to_string())?, multiplier)
    }

    /// Parse from the string forms used at the API boundary
    pub fn parse(amount: &str, multiplier: &str) -> Result<Self> {
        let multiplier = parse_multiplier(multiplier)?;
        Self::from_literal(MacroLiteral::parse(amount)?, multiplier)
    }

    /// Build from an exact subunit count.
    ///
    /// Fails if the macro value, truncated to the multiplier's implied
    /// precision, does not scale back to `subunits` (e.g. 1 subunit with a
    /// multiplier of 3).
    pub fn from_subunits(subunits: U256, multiplier: U256) -> Result<Self> {
        let literal = subunits_to_decimal_string(subunits, multiplier)?;
        let amount = Self::from_literal(MacroLiteral::parse(&literal)?, multiplier)?;
        if amount.subunits != subunits {
            return Err(Error::invalid_input(format!(
                "{subunits} subunits at denomMultiplier {multiplier} has no exact macro value"
            )));
        }
        Ok(amount)
    }

    fn from_literal(literal: MacroLiteral, multiplier: U256) -> Result<Self> {
        let subunits = scale_to_subunits(&literal, multiplier)?;
        Ok(Self {
            value: literal.canonical(),
            multiplier,
            subunits,
        })
    }

    /// Macro-denominated value in canonical decimal form
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Subunits per whole unit
    pub fn multiplier(&self) -> U256 {
        self.multiplier
    }

    /// Exact subunit amount
    pub fn subunits(&self) -> U256 {
        self.subunits
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Digits of a non-negative macro literal with insignificant zeros removed.
#[derive(Debug)]
struct MacroLiteral {
    integer: String,
    fraction: String,
}

impl MacroLiteral {
    /// Parses a decimal literal: optional `-`, digits, at most one `.`.
    fn parse(literal: &str) -> Result<Self> {
        let (negative, body) = match literal.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, literal),
        };

        let well_formed = body.bytes().any(|b| b.is_ascii_digit())
            && body.bytes().all(|b| b.is_ascii_digit() || b == b'.')
            && body.bytes().filter(|b| *b == b'.').count() <= 1;
        if !well_formed {
            return Err(Error::invalid_input(format!(
                "amount {literal:?} is not a valid decimal number"
            )));
        }

        // "5." and ".5" are accepted
        let (integer, fraction) = body.split_once('.').unwrap_or((body, ""));
        let parsed = Self {
            integer: integer.trim_start_matches('0').to_string(),
            fraction: fraction.trim_end_matches('0').to_string(),
        };

        // -0 is zero
        if negative && !parsed.is_zero() {
            return Err(Error::invalid_input("amount cannot be negative"));
        }
        Ok(parsed)
    }

    fn is_zero(&self) -> bool {
        self.integer.is_empty() && self.fraction.is_empty()
    }

    /// All significant digits as one integer, i.e. the value times `10^scale`.
    fn mantissa(&self) -> Result<U512> {
        let digits = format!("{}{}", self.integer, self.fraction);
        let digits = digits.trim_start_matches('0');
        if digits.is_empty() {
            return Ok(U512::ZERO);
        }
        U512::from_str_radix(digits, 10).map_err(|_| {
            Error::invalid_input(format!("amount {} is out of range", self.canonical()))
        })
    }

    fn scale(&self) -> usize {
        self.fraction.len()
    }

    fn canonical(&self) -> String {
        let integer = if self.integer.is_empty() { "0" } else { &self.integer };
        if self.fraction.is_empty() {
            integer.to_string()
        } else {
            format!("{integer}.{}", self.fraction)
        }
    }
}

fn check_multiplier(multiplier: U256) -> Result<()> {
    if multiplier.is_zero() {
        return Err(Error::invalid_input("denomMultiplier cannot be 0"));
    }
    Ok(())
}

fn parse_multiplier(literal: &str) -> Result<U256> {
    if literal.is_empty() || !literal.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::invalid_input(format!(
            "denomMultiplier {literal:?} is not a positive integer"
        )));
    }
    let multiplier = parse_digits(literal).ok_or_else(|| {
        Error::invalid_input(format!("denomMultiplier {literal:?} is out of range"))
    })?;
    check_multiplier(multiplier)?;
    Ok(multiplier)
}

fn parse_subunits(literal: &str) -> Result<U256> {
    if literal.starts_with('-') {
        return Err(Error::invalid_input("amount cannot be negative"));
    }
    if literal.is_empty() || !literal.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::invalid_input(format!(
            "amount {literal:?} is not a non-negative integer"
        )));
    }
    parse_digits(literal)
        .ok_or_else(|| Error::invalid_input(format!("amount {literal:?} is out of range")))
}

/// Parses an ASCII digit string, `None` if it does not fit in 256 bits.
fn parse_digits(digits: &str) -> Option<U256> {
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Some(U256::ZERO);
    }
    U256::from_str_radix(digits, 10).ok()
}

fn scale_to_subunits(literal: &MacroLiteral, multiplier: U256) -> Result<U256> {
    let mantissa = literal.mantissa()?;
    if mantissa.is_zero() {
        return Ok(U256::ZERO);
    }

    let overflow = || {
        Error::invalid_input(format!(
            "amount {} times denomMultiplier {multiplier} overflows",
            literal.canonical()
        ))
    };
    let product = mantissa.checked_mul(widen(multiplier)).ok_or_else(overflow)?;

    // a divisor beyond 512 bits cannot divide a non-zero product
    let scale = literal.scale();
    if let Some(divisor) = U512::from(10u64).checked_pow(U512::from(scale as u64)) {
        if (product % divisor).is_zero() {
            return narrow(product / divisor).ok_or_else(overflow);
        }
    }

    let exact = format_scaled(product, scale);
    let fraction = exact.split_once('.').map(|(_, f)| f).unwrap_or_default();
    Err(Error::invalid_input(format!(
        "amount {exact} is not a whole number of subunits: fractional part .{fraction} has {} digit(s)",
        fraction.len()
    )))
}

fn divide_subunits(subunits: U256, multiplier: U256) -> String {
    let divisor = widen(multiplier);
    let whole = subunits / multiplier;
    let mut remainder = widen(subunits % multiplier);

    // remainder < multiplier < 2^256, so remainder * 10 stays well inside U512
    let mut fraction = String::new();
    for _ in 0..implied_precision(multiplier) {
        if remainder.is_zero() {
            break;
        }
        remainder *= U512::from(10u64);
        let digit = remainder / divisor;
        remainder %= divisor;
        fraction.push(char::from(b'0' + digit.as_limbs()[0] as u8));
    }

    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{fraction}")
    }
}

/// Number of fractional digits a multiplier can resolve: the smallest `p`
/// with `10^p >= multiplier`.
fn implied_precision(multiplier: U256) -> u32 {
    let target = widen(multiplier);
    let ten = U512::from(10u64);
    let mut precision = 0;
    let mut power = U512::from(1u64);
    while power < target {
        power *= ten;
        precision += 1;
    }
    precision
}

fn widen(value: U256) -> U512 {
    U512::from_limbs_slice(value.as_limbs())
}

fn narrow(value: U512) -> Option<U256> {
    (value.bit_len() <= 256).then(|| U256::from_limbs_slice(&value.as_limbs()[..4]))
}

/// Formats `value / 10^scale` without trailing zeros.
fn format_scaled(value: U512, scale: usize) -> String {
    let digits = value.to_string();
    if scale == 0 {
        return digits;
    }
    let padded = format!("{digits:0>width$}", width = scale + 1);
    let (int_part, frac_part) = padded.split_at(padded.len() - scale);
    let frac_part = frac_part.trim_end_matches('0');
    if frac_part.is_empty() {
        int_part.to_string()
    } else {
        format!("{int_part}.{frac_part}")
    }
}
