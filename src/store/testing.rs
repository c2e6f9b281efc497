//! Fault-injecting store wrapper for archive and scheduler tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde_json::Value;

use super::{DocumentStore, SqliteDocumentStore};
use crate::error::StoreError;

#[derive(Default)]
struct Faults {
    /// (collection, field, value): inserts whose record matches fail.
    failing_inserts: Vec<(String, String, Value)>,
    /// (collection, id): deletes that never complete.
    hanging_deletes: Vec<(String, String)>,
    /// (collection, id): deletes that fail.
    failing_deletes: Vec<(String, String)>,
    failing_reads: Vec<String>,
}

pub(crate) struct FaultyStore {
    inner: SqliteDocumentStore,
    faults: Mutex<Faults>,
    pub list_all_calls: AtomicUsize,
}

enum Action {
    Proceed,
    Fail(String),
    Hang,
}

impl FaultyStore {
    pub fn new() -> Self {
        FaultyStore {
            inner: SqliteDocumentStore::in_memory().expect("in-memory store"),
            faults: Mutex::new(Faults::default()),
            list_all_calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_insert_when(&self, collection: &str, field: &str, value: Value) {
        self.faults.lock().unwrap().failing_inserts.push((
            collection.to_string(),
            field.to_string(),
            value,
        ));
    }

    pub fn hang_delete(&self, collection: &str, id: &str) {
        self.faults
            .lock()
            .unwrap()
            .hanging_deletes
            .push((collection.to_string(), id.to_string()));
    }

    pub fn fail_delete(&self, collection: &str, id: &str) {
        self.faults
            .lock()
            .unwrap()
            .failing_deletes
            .push((collection.to_string(), id.to_string()));
    }

    pub fn fail_reads(&self, collection: &str) {
        self.faults
            .lock()
            .unwrap()
            .failing_reads
            .push(collection.to_string());
    }

    pub fn clear_faults(&self) {
        *self.faults.lock().unwrap() = Faults::default();
    }

    fn read_action(&self, collection: &str) -> Action {
        let faults = self.faults.lock().unwrap();
        if faults.failing_reads.iter().any(|c| c == collection) {
            Action::Fail(format!("read of {collection} refused"))
        } else {
            Action::Proceed
        }
    }
}

impl DocumentStore for FaultyStore {
    async fn list_all(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
        self.list_all_calls.fetch_add(1, Ordering::SeqCst);
        if let Action::Fail(msg) = self.read_action(collection) {
            return Err(StoreError::Unavailable(msg));
        }
        self.inner.list_all(collection).await
    }

    async fn list_where(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Value>, StoreError> {
        if let Action::Fail(msg) = self.read_action(collection) {
            return Err(StoreError::Unavailable(msg));
        }
        self.inner.list_where(collection, field, value).await
    }

    async fn insert(&self, collection: &str, record: Value) -> Result<String, StoreError> {
        let action = {
            let faults = self.faults.lock().unwrap();
            let hit = faults.failing_inserts.iter().any(|(c, f, v)| {
                c == collection && record.get(f.as_str()).is_some_and(|got| got == v)
            });
            if hit {
                Action::Fail(format!("insert into {collection} refused"))
            } else {
                Action::Proceed
            }
        };
        if let Action::Fail(msg) = action {
            return Err(StoreError::Unavailable(msg));
        }
        self.inner.insert(collection, record).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let action = {
            let faults = self.faults.lock().unwrap();
            let is_target = |(c, i): &(String, String)| c == collection && i == id;
            if faults.hanging_deletes.iter().any(is_target) {
                Action::Hang
            } else if faults.failing_deletes.iter().any(is_target) {
                Action::Fail(format!("delete from {collection} refused"))
            } else {
                Action::Proceed
            }
        };
        match action {
            Action::Proceed => self.inner.delete(collection, id).await,
            Action::Fail(msg) => Err(StoreError::Unavailable(msg)),
            Action::Hang => std::future::pending().await,
        }
    }
}
