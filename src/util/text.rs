use std::str::FromStr;

use anyhow::{anyhow, Result};
use rust_decimal::{Decimal, RoundingStrategy};

/// Parses a decimal value from a given string.
///
/// Leading and trailing whitespace is ignored and scientific notation such as
/// `1.5e2` is accepted. Thousands separators are not.
///
/// # Arguments
///
/// * `s`: A string slice containing the representation of a decimal number.
///
/// # Returns
///
/// * `Result<Decimal>`: The parsed `Decimal` value if successful, or an error
///                      if the conversion fails.
///
/// # Example
///
/// ```
/// let decimal_value = parse_decimal(" 123.4 ").unwrap();
/// ```
pub fn parse_decimal(s: &str) -> Result<Decimal> {
    let cleaned = s.trim();
    Decimal::from_str(cleaned)
        .or_else(|_| Decimal::from_scientific(cleaned))
        .map_err(|why| anyhow!("Failed to parse '{}' as Decimal because {:?}", cleaned, why))
}

/// 以貨幣格式輸出，固定兩位小數，四捨五入
pub fn format_currency(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("${:.2}", rounded)
}
