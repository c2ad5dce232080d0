use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Card-like instrument as typed by the buyer.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardInstrument {
    pub number: String,
    pub expiry: String,
    pub cvv: String,
    #[serde(default)]
    pub holder_name: Option<String>,
}

// Never print the PAN or CVV.
impl fmt::Debug for CardInstrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits: String = self.number.chars().filter(char::is_ascii_digit).collect();
        let last4 = digits.get(digits.len().saturating_sub(4)..).unwrap_or("");
        f.debug_struct("CardInstrument")
            .field("number", &format!("****{last4}"))
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardRejection {
    #[error("card number is not valid")]
    BadChecksum,
    #[error("expiry must be MM/YY")]
    BadExpiryFormat,
    #[error("card has expired")]
    Expired,
}

impl CardRejection {
    pub fn code(self) -> &'static str {
        match self {
            CardRejection::BadChecksum => "bad_checksum",
            CardRejection::BadExpiryFormat => "bad_expiry_format",
            CardRejection::Expired => "expired",
        }
    }
}

pub type CardValidationResult = Result<(), CardRejection>;
