// Utilitários para manipulação de valores monetários.
// Amounts travel through the crate as integer cents; the gateway wire format
// uses decimal strings ("2.99").

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("empty amount")]
    Empty,
    #[error("invalid amount: {0}")]
    Invalid(String),
    #[error("too many fractional digits: {0}")]
    Precision(String),
}

pub fn format_currency(amount_cents: u64) -> String {
    format!("${}", to_decimal_string(amount_cents))
}

/// Cents as the gateway's decimal string, always two fractional digits.
pub fn to_decimal_string(amount_cents: u64) -> String {
    format!("{}.{:02}", amount_cents / 100, amount_cents % 100)
}

/// Parses "$1,234.5", "2.99" or "3" into cents without going through floats.
pub fn parse_currency(currency_str: &str) -> Result<u64, MoneyError> {
    let cleaned: String = currency_str
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();

    if cleaned.is_empty() {
        return Err(MoneyError::Empty);
    }

    let (whole, fraction) = match cleaned.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (cleaned.as_str(), ""),
    };

    if fraction.len() > 2 {
        return Err(MoneyError::Precision(currency_str.to_string()));
    }

    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if !all_digits(whole) || !all_digits(fraction) || (whole.is_empty() && fraction.is_empty()) {
        return Err(MoneyError::Invalid(currency_str.to_string()));
    }

    let whole: u64 = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .map_err(|_| MoneyError::Invalid(currency_str.to_string()))?
    };
    let cents: u64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<u64>().unwrap_or(0) * 10,
        _ => fraction.parse().unwrap_or(0),
    };

    whole
        .checked_mul(100)
        .and_then(|value| value.checked_add(cents))
        .ok_or_else(|| MoneyError::Invalid(currency_str.to_string()))
}
