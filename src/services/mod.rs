pub mod atomic_metrics;
pub mod capture_reconciler;
pub mod card_validator;
pub mod checkout_service;
pub mod circuit_breaker;
pub mod gateway_adapter;
pub mod order_metadata;
pub mod payment_gateway;
pub mod payment_processor_client;
pub mod progress_autosave;
pub mod purchase_ledger;
pub mod sandbox_gateway;

pub use checkout_service::{CheckoutError, CheckoutService};
pub use payment_gateway::{GatewayError, PaymentGateway};
pub use payment_processor_client::PaymentProcessorClient;
