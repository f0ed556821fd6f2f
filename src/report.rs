use std::fmt::Write as _;

use crate::{declare::QuoteResult, util::text};

pub const NO_DATA: &str = "No stock data available.";
const HEADER: &str = "Stock Prices:";

/// Formats quote results into the text used for the console and the email
/// body, one line per result in input order.
pub fn format_prices(results: &[QuoteResult]) -> String {
    if results.is_empty() {
        return NO_DATA.to_string();
    }

    let mut report = String::with_capacity(32 * (results.len() + 1));
    report.push_str(HEADER);
    report.push('\n');

    for result in results {
        // 寫入 String 不會失敗
        let _ = writeln!(report, "{}", format_line(result));
    }

    report.trim_end().to_string()
}

fn format_line(result: &QuoteResult) -> String {
    match result.price.as_deref() {
        Some(price) => match text::parse_decimal(price) {
            Ok(value) => format!("{}: {}", result.symbol, text::format_currency(value)),
            Err(_) => format!(
                "{}: {} (unable to format as currency)",
                result.symbol, price
            ),
        },
        None => format!("{}: Data not available", result.symbol),
    }
}
