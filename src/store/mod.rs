//! The document store collaborator.
//!
//! The archive pipeline only needs four operations from its backing store:
//! list a collection, list by one field, insert and delete. There are no
//! transactions and no multi-record atomicity; callers order their writes
//! so a failure between two calls never loses data.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::error::StoreError;

mod sqlite;
#[cfg(test)]
pub(crate) mod testing;

pub use sqlite::SqliteDocumentStore;

pub const ORDERS: &str = "orders";
pub const ORDER_ITEMS: &str = "order_items";
pub const ARCHIVED_ORDERS: &str = "archived_orders";
pub const ARCHIVE_METADATA: &str = "archive_metadata";
pub const PRODUCTS: &str = "products";
pub const SETTINGS: &str = "settings";

/// Record-level access to named collections.
///
/// Records are JSON objects. Reads return each record with its
/// store-assigned id under `"id"`; an `"id"` key on an inserted record is
/// ignored. Listing preserves insertion order.
pub trait DocumentStore: Send + Sync {
    fn list_all(
        &self,
        collection: &str,
    ) -> impl Future<Output = Result<Vec<Value>, StoreError>> + Send;

    fn list_where(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> impl Future<Output = Result<Vec<Value>, StoreError>> + Send;

    /// Insert a record and return its new id.
    fn insert(
        &self,
        collection: &str,
        record: Value,
    ) -> impl Future<Output = Result<String, StoreError>> + Send;

    /// Delete a record. Deleting an id that does not exist is not an error.
    fn delete(&self, collection: &str, id: &str)
        -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Decode raw records, skipping (and logging) any that do not fit `T`.
pub fn decode_records<T: DeserializeOwned>(collection: &str, records: Vec<Value>) -> Vec<T> {
    records
        .into_iter()
        .filter_map(|record| {
            let id = record
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            match serde_json::from_value::<T>(record) {
                Ok(decoded) => Some(decoded),
                Err(e) => {
                    warn!(collection, record_id = %id, error = %e, "Skipping undecodable record");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Order;
    use serde_json::json;

    #[test]
    fn test_decode_records_skips_bad_rows() {
        let records = vec![
            json!({"id": "a", "payment_mode": "Cash", "payment_status": "Paid", "total": 10}),
            json!({"id": "b", "total": "not money"}),
            json!("not an object"),
        ];
        let orders: Vec<Order> = decode_records(ORDERS, records);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].id, "a");
    }
}
