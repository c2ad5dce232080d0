use film_checkout::services::card_validator::{luhn_valid, validate_number};
use proptest::prelude::*;

/// Appends the digit that makes `payload` pass mod-10.
fn with_check_digit(payload: &[u8]) -> String {
    let mut sum = 0u32;
    for (position, digit) in payload.iter().rev().enumerate() {
        let mut digit = u32::from(*digit);
        // the check digit will sit at position 0, so payload starts doubled
        if position % 2 == 0 {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
    }
    let check = (10 - sum % 10) % 10;

    let mut number: String = payload.iter().map(|d| char::from(b'0' + d)).collect();
    number.push(char::from_digit(check, 10).unwrap_or('0'));
    number
}

proptest! {
    #[test]
    fn generated_numbers_pass(payload in prop::collection::vec(0u8..10, 12..18)) {
        let number = with_check_digit(&payload);
        prop_assert!(luhn_valid(&number));
        prop_assert_eq!(validate_number(&number), Ok(()));
    }

    #[test]
    fn any_single_digit_change_is_caught(
        payload in prop::collection::vec(0u8..10, 12..18),
        index in any::<prop::sample::Index>(),
        bump in 1u8..10,
    ) {
        let number = with_check_digit(&payload);
        let mut digits: Vec<u8> = number.bytes().map(|b| b - b'0').collect();
        let at = index.index(digits.len());
        digits[at] = (digits[at] + bump) % 10;

        let mutated: String = digits.iter().map(|d| char::from(b'0' + d)).collect();
        prop_assert!(!luhn_valid(&mutated));
    }

    #[test]
    fn spaces_between_groups_are_ignored(payload in prop::collection::vec(0u8..10, 15..16)) {
        let number = with_check_digit(&payload);
        let grouped = number
            .as_bytes()
            .chunks(4)
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        prop_assert_eq!(validate_number(&grouped), Ok(()));
    }
}
