pub mod card_format;
pub mod money;
