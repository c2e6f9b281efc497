//! Record types for the live and archive collections.
//!
//! Field names follow what the POS front end writes into the document store
//! (`payment_mode`, `created_at`, camelCase archive metadata), so records
//! written by either side decode here unchanged.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::money::Money;

// ---------------------------------------------------------------------------
// Payment enums
// ---------------------------------------------------------------------------

/// How an order was paid. Unrecognised modes are kept verbatim in `Other`
/// so they still show up in the payment breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PaymentMethod {
    Cash,
    Card,
    Online,
    Other(String),
}

impl PaymentMethod {
    pub fn as_str(&self) -> &str {
        match self {
            PaymentMethod::Cash => "Cash",
            PaymentMethod::Card => "Card",
            PaymentMethod::Online => "Online",
            PaymentMethod::Other(raw) => raw,
        }
    }
}

impl Default for PaymentMethod {
    fn default() -> Self {
        PaymentMethod::Other(String::new())
    }
}

impl From<&str> for PaymentMethod {
    fn from(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cash" => PaymentMethod::Cash,
            "card" | "credit" | "debit" => PaymentMethod::Card,
            "online" => PaymentMethod::Online,
            _ => PaymentMethod::Other(raw.trim().to_string()),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for PaymentMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PaymentMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        Ok(PaymentMethod::from(raw.as_str()))
    }
}

/// Settlement state of an order. Only `Cancelled` changes how an order is
/// counted; `Other` keeps unknown statuses readable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PaymentStatus {
    Paid,
    Pending,
    Cancelled,
    Other(String),
}

impl PaymentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            PaymentStatus::Paid => "Paid",
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Cancelled => "Cancelled",
            PaymentStatus::Other(raw) => raw,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PaymentStatus::Cancelled)
    }
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Pending
    }
}

impl From<&str> for PaymentStatus {
    fn from(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "paid" | "completed" => PaymentStatus::Paid,
            "pending" | "" => PaymentStatus::Pending,
            "cancelled" | "canceled" => PaymentStatus::Cancelled,
            _ => PaymentStatus::Other(raw.trim().to_string()),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for PaymentStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PaymentStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        Ok(PaymentStatus::from(raw.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Live records
// ---------------------------------------------------------------------------

/// A checkout in the live `orders` collection.
///
/// `subtotal`, `tax` and `total` were computed at checkout and are treated
/// as ground truth; nothing here re-derives them from the tax rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staff_name: Option<String>,
    #[serde(default, rename = "payment_mode")]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub subtotal: Money,
    #[serde(default)]
    pub tax: Money,
    #[serde(default)]
    pub total: Money,
    /// Raw creation timestamp. Kept unparsed so an unreadable value excludes
    /// the order from date filters instead of failing the whole read.
    #[serde(default)]
    pub created_at: Option<String>,
}

/// One product line of an order (`order_items` collection).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub order_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    /// Denormalized at sale time; grouping key for product reports.
    pub product_name: String,
    pub quantity: u32,
    #[serde(rename = "price")]
    pub unit_price: Money,
    pub total: Money,
}

impl LineItem {
    /// `quantity × unit_price == total`, the checkout invariant.
    pub fn is_consistent(&self) -> bool {
        self.unit_price.times(self.quantity) == self.total
    }
}

/// An order joined with its line items, the unit every report works on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    #[serde(rename = "order_items")]
    pub items: Vec<LineItem>,
}

/// Anything that carries an [`Order`]; lets the aggregation functions run
/// over bare orders and joined orders alike.
pub trait AsOrder {
    fn as_order(&self) -> &Order;
}

impl AsOrder for Order {
    fn as_order(&self) -> &Order {
        self
    }
}

impl AsOrder for OrderWithItems {
    fn as_order(&self) -> &Order {
        &self.order
    }
}

// ---------------------------------------------------------------------------
// Archive records
// ---------------------------------------------------------------------------

/// A day-closed order in `archived_orders`, line items embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedOrder {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub original_order_id: String,
    /// Local calendar day of the order's own `created_at`, `YYYY-MM-DD`.
    pub archived_date: String,
    /// When the migration wrote this record (RFC 3339).
    pub archived_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staff_name: Option<String>,
    #[serde(default)]
    pub payment_mode: PaymentMethod,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub subtotal: Money,
    #[serde(default)]
    pub tax: Money,
    #[serde(default)]
    pub total: Money,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub order_items: Vec<LineItem>,
}

impl ArchivedOrder {
    pub fn from_live(
        order: &Order,
        items: Vec<LineItem>,
        archived_date: String,
        archived_at: String,
    ) -> Self {
        ArchivedOrder {
            id: String::new(),
            original_order_id: order.id.clone(),
            archived_date,
            archived_at,
            customer_name: order.customer_name.clone(),
            staff_name: order.staff_name.clone(),
            payment_mode: order.payment_method.clone(),
            payment_status: order.payment_status.clone(),
            subtotal: order.subtotal,
            tax: order.tax,
            total: order.total,
            created_at: order.created_at.clone(),
            order_items: items,
        }
    }

    /// Rebuild the order as it looked in the live store.
    pub fn to_order_with_items(&self) -> OrderWithItems {
        OrderWithItems {
            order: Order {
                id: self.original_order_id.clone(),
                customer_name: self.customer_name.clone(),
                staff_name: self.staff_name.clone(),
                payment_method: self.payment_mode.clone(),
                payment_status: self.payment_status.clone(),
                subtotal: self.subtotal,
                tax: self.tax,
                total: self.total,
                created_at: self.created_at.clone(),
            },
            items: self.order_items.clone(),
        }
    }
}

/// Summary written once per archived day (`archive_metadata`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveMetadata {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub archive_date: String,
    pub archived_at: String,
    pub total_orders: u64,
    pub total_revenue: Money,
    #[serde(default)]
    pub order_ids: Vec<String>,
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

pub const DEFAULT_CURRENCY: &str = "AED";
pub const DEFAULT_TAX_RATE: f64 = 5.0;

/// Store-wide display settings (`settings` collection). Read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Percentage; informational only, stored order amounts already include it.
    #[serde(default = "default_tax_rate", alias = "taxRate")]
    pub tax_rate: f64,
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_tax_rate() -> f64 {
    DEFAULT_TAX_RATE
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            currency: default_currency(),
            tax_rate: default_tax_rate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_order_decodes_front_end_record() {
        let order: Order = serde_json::from_value(json!({
            "id": "o1",
            "customer_name": "Walk-in",
            "payment_mode": "cash",
            "payment_status": "Paid",
            "subtotal": 95.24,
            "tax": "4.76",
            "total": 100,
            "created_at": "2024-01-15T10:30:00.000Z",
        }))
        .unwrap();
        assert_eq!(order.payment_method, PaymentMethod::Cash);
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.subtotal, Money::from_cents(9524));
        assert_eq!(order.tax, Money::from_cents(476));
        assert_eq!(order.total, Money::from_cents(10000));
        assert!(order.staff_name.is_none());
    }

    #[test]
    fn test_unknown_payment_values_are_kept() {
        let order: Order = serde_json::from_value(json!({
            "payment_mode": "Voucher",
            "payment_status": "Refunded",
            "total": 5,
        }))
        .unwrap();
        assert_eq!(order.payment_method, PaymentMethod::Other("Voucher".into()));
        assert_eq!(order.payment_status, PaymentStatus::Other("Refunded".into()));
        assert!(order.created_at.is_none());
        assert_eq!(PaymentStatus::from("canceled"), PaymentStatus::Cancelled);
    }

    #[test]
    fn test_line_item_consistency() {
        let mut item: LineItem = serde_json::from_value(json!({
            "order_id": "o1",
            "product_name": "Latte",
            "quantity": 3,
            "price": 4.5,
            "total": 13.5,
        }))
        .unwrap();
        assert!(item.is_consistent());
        item.total = Money::from_cents(1300);
        assert!(!item.is_consistent());
    }

    #[test]
    fn test_archived_order_round_trips_live_fields() {
        let order = Order {
            id: "o7".into(),
            customer_name: None,
            staff_name: Some("Sam".into()),
            payment_method: PaymentMethod::Card,
            payment_status: PaymentStatus::Pending,
            subtotal: Money::from_cents(1000),
            tax: Money::from_cents(50),
            total: Money::from_cents(1050),
            created_at: Some("2024-01-15T09:00:00".into()),
        };
        let archived = ArchivedOrder::from_live(
            &order,
            vec![],
            "2024-01-15".into(),
            "2024-01-16T02:00:00+00:00".into(),
        );
        let body = serde_json::to_value(&archived).unwrap();
        assert_eq!(body["original_order_id"], "o7");
        assert_eq!(body["archived_date"], "2024-01-15");
        assert!(body.get("id").is_none());
        assert_eq!(archived.to_order_with_items().order, order);
    }

    #[test]
    fn test_metadata_uses_camel_case() {
        let meta = ArchiveMetadata {
            id: String::new(),
            archive_date: "2024-01-15".into(),
            archived_at: "2024-01-16T02:00:00Z".into(),
            total_orders: 3,
            total_revenue: Money::from_cents(17500),
            order_ids: vec!["a".into()],
        };
        let body = serde_json::to_value(&meta).unwrap();
        assert_eq!(body["archiveDate"], "2024-01-15");
        assert_eq!(body["totalOrders"], 3);
        assert_eq!(body["totalRevenue"], 175.0);
        assert_eq!(body["orderIds"], json!(["a"]));
    }

    #[test]
    fn test_settings_defaults() {
        let settings: StoreSettings = serde_json::from_value(json!({})).unwrap();
        assert_eq!(settings, StoreSettings::default());
        let settings: StoreSettings =
            serde_json::from_value(json!({"currency": "USD", "taxRate": 10})).unwrap();
        assert_eq!(settings.currency, "USD");
        assert_eq!(settings.tax_rate, 10.0);
    }
}
