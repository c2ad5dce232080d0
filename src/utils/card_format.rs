// Presentation-only formatting for card input fields. None of this is a
// security control; the card validator decides what is acceptable.

/// Groups the digits of a card number in blocks of four: "4242 4242 4242 4242".
pub fn group_card_number(input: &str) -> String {
    let digits: Vec<char> = input.chars().filter(char::is_ascii_digit).take(19).collect();

    digits
        .chunks(4)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalizes free-form expiry input ("4/27", "0427", "04 / 27") to `MM/YY`.
/// Returns the partial value while the user is still typing.
pub fn normalize_expiry(input: &str) -> String {
    let (month, year) = match input.split_once('/') {
        Some((month, year)) => {
            let month: String = month.chars().filter(char::is_ascii_digit).collect();
            let year: String = year.chars().filter(char::is_ascii_digit).collect();
            let year = if year.len() == 4 { year[2..].to_string() } else { year.chars().take(2).collect() };
            let month = if month.len() == 1 { format!("0{month}") } else { month };
            (month, year)
        }
        None => {
            let digits: String = input.chars().filter(char::is_ascii_digit).take(4).collect();
            if digits.len() <= 2 {
                return digits;
            }
            let (month, year) = digits.split_at(2);
            (month.to_string(), year.to_string())
        }
    };

    format!("{}/{}", month.chars().take(2).collect::<String>(), year)
}

/// Keeps at most four digits. `None` until the value has three or four.
pub fn sanitize_cvv(input: &str) -> Option<String> {
    let digits: String = input.chars().filter(char::is_ascii_digit).take(4).collect();
    (digits.len() >= 3).then_some(digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_digits_in_fours() {
        assert_eq!(group_card_number("4242424242424242"), "4242 4242 4242 4242");
        assert_eq!(group_card_number("4242-4242-42"), "4242 4242 42");
        assert_eq!(group_card_number(""), "");
    }

    #[test]
    fn normalizes_expiry() {
        assert_eq!(normalize_expiry("0427"), "04/27");
        assert_eq!(normalize_expiry("4/27"), "04/27");
        assert_eq!(normalize_expiry("04 / 2027"), "04/27");
        assert_eq!(normalize_expiry("04"), "04");
    }

    #[test]
    fn cvv_limits() {
        assert_eq!(sanitize_cvv("12"), None);
        assert_eq!(sanitize_cvv("123"), Some("123".to_string()));
        assert_eq!(sanitize_cvv("12345"), Some("1234".to_string()));
        assert_eq!(sanitize_cvv("1a2b3"), Some("123".to_string()));
    }
}
