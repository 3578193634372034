//! Webhook event envelope and payload field extraction
//!
//! Creem's payload shapes have changed over time and differ between the
//! programmatic and administrative flows: the same logical field (user id,
//! product id, order id) can appear at several locations depending on which
//! provider code path produced the event. Extraction is therefore
//! data-driven: an ordered list of pure rules per field, applied
//! first-match-wins, so a new payload shape is one rule added to a table
//! rather than another nested conditional.
//!
//! Parsing is tolerant by design. Unknown event types become
//! [`EventType::Other`] and are recorded without processing; a refund with
//! no directly extractable user id is not an error here (the order id is
//! carried for backfill).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use kidsdraw_shared::PlanTier;

/// Provider event types this service reacts to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    CheckoutCompleted,
    SubscriptionActive,
    SubscriptionPaid,
    SubscriptionTrialing,
    SubscriptionUpdate,
    SubscriptionCanceled,
    SubscriptionExpired,
    RefundCreated,
    /// Unrecognized type; recorded for audit, never processed.
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::CheckoutCompleted => "checkout.completed",
            EventType::SubscriptionActive => "subscription.active",
            EventType::SubscriptionPaid => "subscription.paid",
            EventType::SubscriptionTrialing => "subscription.trialing",
            EventType::SubscriptionUpdate => "subscription.update",
            EventType::SubscriptionCanceled => "subscription.canceled",
            EventType::SubscriptionExpired => "subscription.expired",
            EventType::RefundCreated => "refund.created",
            EventType::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "checkout.completed" => EventType::CheckoutCompleted,
            "subscription.active" => EventType::SubscriptionActive,
            "subscription.paid" => EventType::SubscriptionPaid,
            "subscription.trialing" => EventType::SubscriptionTrialing,
            "subscription.update" => EventType::SubscriptionUpdate,
            "subscription.canceled" => EventType::SubscriptionCanceled,
            "subscription.expired" => EventType::SubscriptionExpired,
            "refund.created" => EventType::RefundCreated,
            _ => EventType::Other(s),
        }
    }
}

impl From<EventType> for String {
    fn from(t: EventType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical webhook event envelope
///
/// The `object` payload varies by event type (checkout session,
/// subscription, refund) and is not self-describing, so it stays an opaque
/// [`Value`] interrogated through the extraction rules below.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "eventType")]
    pub event_type: EventType,
    /// Provider-side creation time (unix seconds); absent in some shapes.
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub object: Value,
}

impl WebhookEvent {
    /// Parse the raw (signature-verified) body into an envelope.
    pub fn parse(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }
}

/// A single extraction rule: pure payload -> value-or-absent
type Rule = fn(&Value) -> Option<String>;

/// User id locations, most reliable first. The nested checkout/subscription
/// paths appear on refund shapes from the administrative flow.
const USER_ID_RULES: &[Rule] = &[
    |o| string_at(o, &["metadata", "internal_user_id"]),
    |o| string_at(o, &["checkout", "metadata", "internal_user_id"]),
    |o| string_at(o, &["subscription", "metadata", "internal_user_id"]),
    |o| string_at(o, &["metadata", "user_id"]),
];

/// Product id locations on checkout sessions. The bare-string `product`
/// form is the legacy shape.
const CHECKOUT_PRODUCT_RULES: &[Rule] = &[
    |o| string_at(o, &["order", "product"]),
    |o| string_at(o, &["product", "id"]),
    |o| string_at(o, &["metadata", "product_id"]),
    |o| string_at(o, &["product"]),
];

/// Product id locations on subscription objects: `product` is a bare id
/// string in current payloads and an expanded object in some older ones.
const SUBSCRIPTION_PRODUCT_RULES: &[Rule] = &[
    |o| string_at(o, &["product"]),
    |o| string_at(o, &["product", "id"]),
    |o| string_at(o, &["metadata", "product_id"]),
];

/// Order id locations on refunds (the backfill correlation key).
const ORDER_ID_RULES: &[Rule] = &[
    |o| string_at(o, &["order", "id"]),
    |o| string_at(o, &["order_id"]),
];

/// Customer id locations.
const CUSTOMER_ID_RULES: &[Rule] = &[
    |o| string_at(o, &["order", "customer"]),
    |o| string_at(o, &["customer"]),
    |o| string_at(o, &["customer", "id"]),
];

pub fn extract_user_id(object: &Value) -> Option<String> {
    first_match(USER_ID_RULES, object)
}

pub fn extract_checkout_product_id(object: &Value) -> Option<String> {
    first_match(CHECKOUT_PRODUCT_RULES, object)
}

pub fn extract_subscription_product_id(object: &Value) -> Option<String> {
    first_match(SUBSCRIPTION_PRODUCT_RULES, object)
}

pub fn extract_order_id(object: &Value) -> Option<String> {
    first_match(ORDER_ID_RULES, object)
}

pub fn extract_customer_id(object: &Value) -> Option<String> {
    first_match(CUSTOMER_ID_RULES, object)
}

/// The subject object's own id (checkout sessions without an expanded
/// order use it as the correlation key).
pub fn extract_object_id(object: &Value) -> Option<String> {
    string_at(object, &["id"])
}

/// Charged or refunded amount in cents.
pub fn extract_amount(object: &Value) -> Option<i64> {
    int_at(object, &["refund_amount"])
        .or_else(|| int_at(object, &["order", "amount"]))
        .or_else(|| int_at(object, &["amount"]))
}

/// Plan tier stamped into metadata at checkout time; renewal events fall
/// back to it when the product id cannot be resolved.
pub fn extract_plan_hint(object: &Value) -> Option<PlanTier> {
    string_at(object, &["metadata", "plan_type"]).and_then(|s| s.parse().ok())
}

fn first_match(rules: &[Rule], object: &Value) -> Option<String> {
    rules.iter().find_map(|rule| rule(object))
}

/// Read a non-empty string at a nested path. Empty or whitespace-only
/// values count as absent so extraction falls through to the next rule.
fn string_at(object: &Value, path: &[&str]) -> Option<String> {
    let mut current = object;
    for key in path {
        current = current.get(key)?;
    }
    let s = current.as_str()?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn int_at(object: &Value, path: &[&str]) -> Option<i64> {
    let mut current = object;
    for key in path {
        current = current.get(key)?;
    }
    current.as_i64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_envelope() {
        let raw = br#"{
            "id": "evt_123",
            "eventType": "checkout.completed",
            "created_at": 1700000000,
            "object": {"id": "ch_1", "metadata": {"internal_user_id": "u1"}}
        }"#;
        let event = WebhookEvent::parse(raw).unwrap();
        assert_eq!(event.id, "evt_123");
        assert_eq!(event.event_type, EventType::CheckoutCompleted);
        assert_eq!(event.created_at, Some(1700000000));
    }

    #[test]
    fn parses_envelope_without_created_at() {
        let raw = br#"{"id": "evt_1", "eventType": "refund.created", "object": {}}"#;
        let event = WebhookEvent::parse(raw).unwrap();
        assert_eq!(event.event_type, EventType::RefundCreated);
        assert_eq!(event.created_at, None);
    }

    #[test]
    fn unknown_event_type_is_preserved_not_rejected() {
        let raw = br#"{"id": "evt_2", "eventType": "dispute.created", "object": {}}"#;
        let event = WebhookEvent::parse(raw).unwrap();
        assert_eq!(
            event.event_type,
            EventType::Other("dispute.created".to_string())
        );
        assert_eq!(event.event_type.as_str(), "dispute.created");
    }

    #[test]
    fn user_id_prefers_direct_metadata() {
        let object = json!({
            "metadata": {"internal_user_id": "u_direct"},
            "checkout": {"metadata": {"internal_user_id": "u_checkout"}}
        });
        assert_eq!(extract_user_id(&object), Some("u_direct".to_string()));
    }

    #[test]
    fn user_id_falls_through_nested_refund_shapes() {
        let via_checkout = json!({
            "checkout": {"metadata": {"internal_user_id": "u_checkout"}}
        });
        assert_eq!(
            extract_user_id(&via_checkout),
            Some("u_checkout".to_string())
        );

        let via_subscription = json!({
            "subscription": {"metadata": {"internal_user_id": "u_sub"}}
        });
        assert_eq!(extract_user_id(&via_subscription), Some("u_sub".to_string()));

        let via_plain_user_id = json!({"metadata": {"user_id": "u_plain"}});
        assert_eq!(
            extract_user_id(&via_plain_user_id),
            Some("u_plain".to_string())
        );

        assert_eq!(extract_user_id(&json!({"metadata": {}})), None);
    }

    #[test]
    fn empty_strings_count_as_absent() {
        let object = json!({
            "metadata": {"internal_user_id": "  ", "user_id": "u_fallback"}
        });
        assert_eq!(extract_user_id(&object), Some("u_fallback".to_string()));
    }

    #[test]
    fn checkout_product_precedence() {
        let from_order = json!({
            "order": {"product": "prod_order"},
            "product": {"id": "prod_obj"},
            "metadata": {"product_id": "prod_meta"}
        });
        assert_eq!(
            extract_checkout_product_id(&from_order),
            Some("prod_order".to_string())
        );

        let from_object = json!({
            "product": {"id": "prod_obj"},
            "metadata": {"product_id": "prod_meta"}
        });
        assert_eq!(
            extract_checkout_product_id(&from_object),
            Some("prod_obj".to_string())
        );

        let from_metadata = json!({"metadata": {"product_id": "prod_meta"}});
        assert_eq!(
            extract_checkout_product_id(&from_metadata),
            Some("prod_meta".to_string())
        );

        // Legacy shape: bare string directly on the session
        let legacy = json!({"product": "prod_legacy"});
        assert_eq!(
            extract_checkout_product_id(&legacy),
            Some("prod_legacy".to_string())
        );
    }

    #[test]
    fn subscription_product_handles_string_and_object_forms() {
        let bare = json!({"product": "prod_plain"});
        assert_eq!(
            extract_subscription_product_id(&bare),
            Some("prod_plain".to_string())
        );

        let expanded = json!({"product": {"id": "prod_expanded", "name": "Explorer"}});
        assert_eq!(
            extract_subscription_product_id(&expanded),
            Some("prod_expanded".to_string())
        );

        let from_metadata = json!({"metadata": {"product_id": "prod_meta"}});
        assert_eq!(
            extract_subscription_product_id(&from_metadata),
            Some("prod_meta".to_string())
        );
    }

    #[test]
    fn order_id_prefers_nested_order_object() {
        let nested = json!({"order": {"id": "ord_nested"}, "order_id": "ord_flat"});
        assert_eq!(extract_order_id(&nested), Some("ord_nested".to_string()));

        let flat = json!({"order_id": "ord_flat"});
        assert_eq!(extract_order_id(&flat), Some("ord_flat".to_string()));

        assert_eq!(extract_order_id(&json!({})), None);
    }

    #[test]
    fn object_id_reads_top_level_id() {
        assert_eq!(
            extract_object_id(&json!({"id": "ch_123"})),
            Some("ch_123".to_string())
        );
        assert_eq!(extract_object_id(&json!({})), None);
    }

    #[test]
    fn amount_prefers_refund_amount() {
        let refund = json!({"refund_amount": 799, "amount": 1499});
        assert_eq!(extract_amount(&refund), Some(799));

        let order = json!({"order": {"amount": 5900}, "amount": 100});
        assert_eq!(extract_amount(&order), Some(5900));

        let flat = json!({"amount": 3000});
        assert_eq!(extract_amount(&flat), Some(3000));
    }

    #[test]
    fn plan_hint_parses_known_tiers_only() {
        let known = json!({"metadata": {"plan_type": "creator_monthly"}});
        assert_eq!(extract_plan_hint(&known), Some(PlanTier::CreatorMonthly));

        let unknown = json!({"metadata": {"plan_type": "mega_ultra"}});
        assert_eq!(extract_plan_hint(&unknown), None);
    }

    #[test]
    fn customer_id_from_order_or_top_level() {
        let via_order = json!({"order": {"customer": "cus_1"}});
        assert_eq!(extract_customer_id(&via_order), Some("cus_1".to_string()));

        let top_level = json!({"customer": "cus_2"});
        assert_eq!(extract_customer_id(&top_level), Some("cus_2".to_string()));

        let expanded = json!({"customer": {"id": "cus_3"}});
        assert_eq!(extract_customer_id(&expanded), Some("cus_3".to_string()));
    }
}
