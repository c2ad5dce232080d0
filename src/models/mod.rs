pub mod card;
pub mod order;
pub mod payment;
pub mod progress;
pub mod purchase;
pub mod session;
