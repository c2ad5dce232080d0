use serde::{Deserialize, Serialize};

/// Gateway-side order status. Only ever moves forward; `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
    Approved,
    Completed,
    /// Anything else the gateway reports (voided, payer action required, ...).
    #[serde(other)]
    Other,
}

impl OrderStatus {
    fn rank(self) -> u8 {
        match self {
            OrderStatus::Created => 0,
            OrderStatus::Approved => 1,
            OrderStatus::Completed => 2,
            OrderStatus::Other => 0,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == OrderStatus::Completed
    }

    /// Moves to `next` unless that would regress the order.
    pub fn advance(self, next: OrderStatus) -> OrderStatus {
        if self.is_terminal() || next.rank() < self.rank() {
            self
        } else {
            next
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub currency_code: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCollection {
    #[serde(default)]
    pub captures: Vec<CaptureRecord>,
}

/// A settled payment inside an order, as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub amount: Option<Money>,
    #[serde(default)]
    pub custom_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseUnit {
    #[serde(default)]
    pub reference_id: Option<String>,
    /// Structured metadata blob (JSON).
    #[serde(default)]
    pub custom_id: Option<String>,
    /// Delimited metadata string, `film_<film>_user_<buyer>`.
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub amount: Option<Money>,
    #[serde(default)]
    pub payments: Option<PaymentCollection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    pub rel: String,
}

/// The gateway's view of an order, returned by create, fetch and capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub id: String,
    pub status: OrderStatus,
    #[serde(default)]
    pub purchase_units: Vec<PurchaseUnit>,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl OrderSnapshot {
    pub fn primary_unit(&self) -> Option<&PurchaseUnit> {
        self.purchase_units.first()
    }

    pub fn first_capture(&self) -> Option<&CaptureRecord> {
        self.purchase_units
            .iter()
            .filter_map(|unit| unit.payments.as_ref())
            .flat_map(|payments| payments.captures.iter())
            .next()
    }

    pub fn approve_link(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|link| link.rel == "approve" || link.rel == "payer-action")
            .map(|link| link.href.as_str())
    }
}

/// What the initiator asks the gateway to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub amount_cents: u64,
    pub currency: String,
    pub custom_id: String,
    pub description: String,
    pub return_url: String,
    pub cancel_url: String,
}

/// Handed back to the buyer's browser after order creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedOrder {
    pub order_id: String,
    pub redirect_url: String,
}

/// Query parameters present when the gateway sends the buyer back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnParams {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub film_id: Option<String>,
    #[serde(default)]
    pub buyer_id: Option<String>,
}
