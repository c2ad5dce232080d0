//! Encoding and recovery of our own transaction metadata (which film, which
//! buyer) around a gateway order.
//!
//! The metadata is written twice at creation time, as a JSON blob and as a
//! `film_<film>_user_<buyer>` string, and the return URL carries it a third
//! time. Recovery walks [`EXTRACTORS`] in order and stops at the first channel
//! that yields both ids; a missing or garbled earlier channel is expected.

use crate::models::order::{OrderSnapshot, ReturnParams};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const FILM_PREFIX: &str = "film_";
const USER_SEPARATOR: &str = "_user_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderMetadata {
    pub film_id: String,
    pub buyer_id: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl OrderMetadata {
    pub fn new(film_id: &str, buyer_id: &str, email: Option<&str>) -> Self {
        Self {
            film_id: film_id.to_string(),
            buyer_id: buyer_id.to_string(),
            email: email.map(str::to_string),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::json!({
            "filmId": self.film_id,
            "buyerId": self.buyer_id,
            "email": self.email,
        })
        .to_string()
    }

    /// Whether [`to_delimited`](Self::to_delimited) can be parsed back
    /// unambiguously.
    pub fn delimited_is_unambiguous(&self) -> bool {
        !self.film_id.contains(USER_SEPARATOR) && !self.buyer_id.contains(USER_SEPARATOR)
    }

    pub fn to_delimited(&self) -> String {
        format!("{FILM_PREFIX}{}{USER_SEPARATOR}{}", self.film_id, self.buyer_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataSource {
    CaptureBlob,
    OrderBlob,
    DelimitedString,
    ReturnParams,
}

/// Recovered attribution plus the channel that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    pub film_id: String,
    pub buyer_id: String,
    pub email: Option<String>,
    pub source: MetadataSource,
}

impl Attribution {
    fn build(
        film_id: &str,
        buyer_id: &str,
        email: Option<String>,
        source: MetadataSource,
    ) -> Option<Self> {
        let film_id = film_id.trim();
        let buyer_id = buyer_id.trim();
        if film_id.is_empty() || buyer_id.is_empty() {
            return None;
        }
        Some(Self {
            film_id: film_id.to_string(),
            buyer_id: buyer_id.to_string(),
            email: email.filter(|e| !e.trim().is_empty()),
            source,
        })
    }
}

/// Everything the gateway round trip gave us back.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionContext<'a> {
    /// Capture response, or the fetched order itself when it was already
    /// settled before we got here.
    pub capture: Option<&'a OrderSnapshot>,
    pub order: &'a OrderSnapshot,
    pub return_params: &'a ReturnParams,
}

pub type Extractor = fn(&ExtractionContext<'_>) -> Option<Attribution>;

/// Recovery channels, tried in this order.
pub const EXTRACTORS: &[(MetadataSource, Extractor)] = &[
    (MetadataSource::CaptureBlob, from_capture_blob),
    (MetadataSource::OrderBlob, from_order_blob),
    (MetadataSource::DelimitedString, from_delimited),
    (MetadataSource::ReturnParams, from_return_params),
];

pub fn extract_attribution(ctx: &ExtractionContext<'_>) -> Option<Attribution> {
    EXTRACTORS.iter().find_map(|(_, extractor)| extractor(ctx))
}

fn id_field(object: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find_map(|value| match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

pub fn parse_blob(raw: &str, source: MetadataSource) -> Option<Attribution> {
    let value: Value = serde_json::from_str(raw.trim()).ok()?;
    let object = value.as_object()?;

    let film_id = id_field(object, &["filmId", "film_id"])?;
    let buyer_id = id_field(object, &["buyerId", "userId", "buyer_id", "user_id"])?;
    let email = id_field(object, &["email"]);

    Attribution::build(&film_id, &buyer_id, email, source)
}

/// `film_<film>_user_<buyer>`. An id that itself contains `_user_` makes the
/// split ambiguous; that yields nothing rather than a guess.
pub fn parse_delimited(raw: &str) -> Option<Attribution> {
    let rest = raw.trim().strip_prefix(FILM_PREFIX)?;
    if rest.matches(USER_SEPARATOR).count() != 1 {
        return None;
    }
    let (film_id, buyer_id) = rest.split_once(USER_SEPARATOR)?;
    Attribution::build(film_id, buyer_id, None, MetadataSource::DelimitedString)
}

fn from_capture_blob(ctx: &ExtractionContext<'_>) -> Option<Attribution> {
    let capture = ctx.capture?;
    let on_record = capture
        .first_capture()
        .and_then(|record| record.custom_id.as_deref());
    let on_unit = capture.primary_unit().and_then(|unit| unit.custom_id.as_deref());

    on_record
        .into_iter()
        .chain(on_unit)
        .find_map(|raw| parse_blob(raw, MetadataSource::CaptureBlob))
}

fn from_order_blob(ctx: &ExtractionContext<'_>) -> Option<Attribution> {
    ctx.order
        .purchase_units
        .iter()
        .filter_map(|unit| unit.custom_id.as_deref())
        .find_map(|raw| parse_blob(raw, MetadataSource::OrderBlob))
}

fn from_delimited(ctx: &ExtractionContext<'_>) -> Option<Attribution> {
    ctx.capture
        .into_iter()
        .chain(std::iter::once(ctx.order))
        .flat_map(|snapshot| snapshot.purchase_units.iter())
        .flat_map(|unit| unit.description.as_deref().into_iter().chain(unit.custom_id.as_deref()))
        .find_map(parse_delimited)
}

fn from_return_params(ctx: &ExtractionContext<'_>) -> Option<Attribution> {
    let params = ctx.return_params;
    Attribution::build(
        params.film_id.as_deref()?,
        params.buyer_id.as_deref()?,
        None,
        MetadataSource::ReturnParams,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::{CaptureRecord, OrderStatus, PaymentCollection, PurchaseUnit};

    fn snapshot(custom_id: Option<&str>, description: Option<&str>) -> OrderSnapshot {
        OrderSnapshot {
            id: "O-1".to_string(),
            status: OrderStatus::Completed,
            purchase_units: vec![PurchaseUnit {
                custom_id: custom_id.map(str::to_string),
                description: description.map(str::to_string),
                ..PurchaseUnit::default()
            }],
            links: vec![],
        }
    }

    fn capture_with_record(custom_id: &str) -> OrderSnapshot {
        let mut snapshot = snapshot(None, None);
        snapshot.purchase_units[0].payments = Some(PaymentCollection {
            captures: vec![CaptureRecord {
                id: "CAP-1".to_string(),
                status: Some("COMPLETED".to_string()),
                amount: None,
                custom_id: Some(custom_id.to_string()),
            }],
        });
        snapshot
    }

    #[test]
    fn encodings_round_trip_through_their_parsers() {
        let metadata = OrderMetadata::new("f1", "u1", Some("u1@example.com"));
        let blob = parse_blob(&metadata.to_json(), MetadataSource::OrderBlob).unwrap();
        assert_eq!(blob.email.as_deref(), Some("u1@example.com"));
        assert_eq!(metadata.to_delimited(), "film_f1_user_u1");
        let delimited = parse_delimited(&metadata.to_delimited()).unwrap();
        assert_eq!((delimited.film_id.as_str(), delimited.buyer_id.as_str()), ("f1", "u1"));
    }

    #[test]
    fn separator_inside_an_id_is_not_guessed() {
        let metadata = OrderMetadata::new("best_user_guide", "u1", None);
        assert!(!metadata.delimited_is_unambiguous());
        assert_eq!(parse_delimited(&metadata.to_delimited()), None);
        assert_eq!(parse_delimited("film_f1_user_jane_user_doe"), None);

        // the blob still carries it, and return params are consulted after
        let order = snapshot(None, Some(&metadata.to_delimited()));
        let params = ReturnParams {
            token: Some("O-1".to_string()),
            film_id: Some("best_user_guide".to_string()),
            buyer_id: Some("u1".to_string()),
        };
        let ctx = ExtractionContext {
            capture: None,
            order: &order,
            return_params: &params,
        };
        let attribution = extract_attribution(&ctx).unwrap();
        assert_eq!(attribution.source, MetadataSource::ReturnParams);
        assert_eq!(attribution.film_id, "best_user_guide");
        assert_eq!(attribution.buyer_id, "u1");

        let blob = parse_blob(&metadata.to_json(), MetadataSource::OrderBlob).unwrap();
        assert_eq!(blob.film_id, "best_user_guide");
    }

    #[test]
    fn capture_blob_wins_when_present() {
        let capture = capture_with_record(r#"{"filmId":"f1","buyerId":"u1"}"#);
        let order = snapshot(Some(r#"{"filmId":"other","buyerId":"x"}"#), None);
        let params = ReturnParams::default();
        let ctx = ExtractionContext {
            capture: Some(&capture),
            order: &order,
            return_params: &params,
        };

        let attribution = extract_attribution(&ctx).unwrap();
        assert_eq!(attribution.source, MetadataSource::CaptureBlob);
        assert_eq!(attribution.film_id, "f1");
    }

    #[test]
    fn falls_back_to_order_blob() {
        let capture = capture_with_record("not json");
        let order = snapshot(Some(r#"{"filmId":"f1","userId":42}"#), None);
        let params = ReturnParams::default();
        let ctx = ExtractionContext {
            capture: Some(&capture),
            order: &order,
            return_params: &params,
        };

        let attribution = extract_attribution(&ctx).unwrap();
        assert_eq!(attribution.source, MetadataSource::OrderBlob);
        assert_eq!(attribution.buyer_id, "42");
    }

    #[test]
    fn half_filled_blob_is_not_enough() {
        let order = snapshot(Some(r#"{"filmId":"f1","buyerId":""}"#), Some("film_f1_user_u1"));
        let params = ReturnParams::default();
        let ctx = ExtractionContext {
            capture: None,
            order: &order,
            return_params: &params,
        };

        let attribution = extract_attribution(&ctx).unwrap();
        assert_eq!(attribution.source, MetadataSource::DelimitedString);
        assert_eq!(attribution.buyer_id, "u1");
    }

    #[test]
    fn return_params_are_the_last_resort() {
        let order = snapshot(Some("{"), Some("film__user_"));
        let params = ReturnParams {
            token: Some("O-1".to_string()),
            film_id: Some("f1".to_string()),
            buyer_id: Some("u1".to_string()),
        };
        let ctx = ExtractionContext {
            capture: Some(&order),
            order: &order,
            return_params: &params,
        };

        let attribution = extract_attribution(&ctx).unwrap();
        assert_eq!(attribution.source, MetadataSource::ReturnParams);
    }

    #[test]
    fn nothing_recoverable() {
        let order = snapshot(None, Some("thanks for your purchase"));
        let params = ReturnParams {
            token: Some("O-1".to_string()),
            film_id: Some("f1".to_string()),
            buyer_id: None,
        };
        let ctx = ExtractionContext {
            capture: None,
            order: &order,
            return_params: &params,
        };

        assert_eq!(extract_attribution(&ctx), None);
    }

    #[test]
    fn extractor_order_is_fixed() {
        let order: Vec<_> = EXTRACTORS.iter().map(|(source, _)| *source).collect();
        assert_eq!(
            order,
            vec![
                MetadataSource::CaptureBlob,
                MetadataSource::OrderBlob,
                MetadataSource::DelimitedString,
                MetadataSource::ReturnParams,
            ]
        );
    }
}
