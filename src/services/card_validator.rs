use crate::models::card::{CardRejection, CardValidationResult};
use chrono::{Datelike, NaiveDate, Utc};

const MIN_PAN_LEN: usize = 13;
const MAX_PAN_LEN: usize = 19;

/// Validates number and expiry against today's date (UTC).
pub fn validate_card(number: &str, expiry: &str) -> CardValidationResult {
    validate_card_at(number, expiry, Utc::now().date_naive())
}

pub fn validate_card_at(number: &str, expiry: &str, today: NaiveDate) -> CardValidationResult {
    validate_number(number)?;
    validate_expiry(expiry, today)
}

pub fn validate_number(number: &str) -> CardValidationResult {
    let digits: String = number.chars().filter(|c| !c.is_whitespace()).collect();

    if !(MIN_PAN_LEN..=MAX_PAN_LEN).contains(&digits.len()) {
        return Err(CardRejection::BadChecksum);
    }

    if luhn_valid(&digits) {
        Ok(())
    } else {
        Err(CardRejection::BadChecksum)
    }
}

/// Luhn mod-10 over an all-digit string. Any non-digit fails.
pub fn luhn_valid(digits: &str) -> bool {
    let mut sum = 0u32;

    for (position, c) in digits.chars().rev().enumerate() {
        let Some(mut digit) = c.to_digit(10) else {
            return false;
        };
        if position % 2 == 1 {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
    }

    sum % 10 == 0
}

/// `MM/YY`; the card is good through the end of its expiry month.
pub fn validate_expiry(expiry: &str, today: NaiveDate) -> CardValidationResult {
    let (month, year) = expiry
        .trim()
        .split_once('/')
        .ok_or(CardRejection::BadExpiryFormat)?;

    let two_digits = |s: &str| s.len() == 2 && s.chars().all(|c| c.is_ascii_digit());
    if !two_digits(month) || !two_digits(year) {
        return Err(CardRejection::BadExpiryFormat);
    }

    let month: u32 = month.parse().map_err(|_| CardRejection::BadExpiryFormat)?;
    let year: i32 = year.parse().map_err(|_| CardRejection::BadExpiryFormat)?;

    if !(1..=12).contains(&month) {
        return Err(CardRejection::BadExpiryFormat);
    }

    let century = today.year() - today.year().rem_euclid(100);
    let expiry_year = century + year;

    if (expiry_year, month) < (today.year(), today.month()) {
        return Err(CardRejection::Expired);
    }

    Ok(())
}
