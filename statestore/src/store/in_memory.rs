use std::{
    future::Future,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU32, AtomicUsize, Ordering},
    },
};

use anyhow::anyhow;
use dashmap::{DashMap, mapref::entry::Entry};

use crate::{
    errors::StoreError,
    store::{
        CreateTableRequest, Document, DocumentStore, FIELD_NAME_PRIMARY_ID, Table,
        TableDescription, TableStatus,
    },
};

/// In-process [`DocumentStore`].
///
/// Tables report [`TableStatus::Creating`] for a configurable number of
/// describes after creation, which is enough to drive every provisioning path.
#[derive(Clone, Default)]
pub struct InMemoryStore(Arc<Inner>);

#[derive(Clone, Debug)]
pub struct InMemoryTable(Arc<TableState>);

#[derive(Default)]
struct Inner {
    tables: DashMap<String, Arc<TableState>>,
    creation_polls: AtomicU32,
    describe_calls: AtomicUsize,
    create_calls: AtomicUsize,
    tables_created: AtomicUsize,
    describe_failure: Mutex<Option<String>>,
}

#[derive(Debug)]
struct TableState {
    name: String,
    key_attribute: String,
    pending_polls: AtomicU32,
    vanishing: bool,
    items: DashMap<String, Document>,
}

// Implementations

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables created from now on report `Creating` for `polls` describes.
    pub fn with_creation_delay(self, polls: u32) -> Self {
        self.0.creation_polls.store(polls, Ordering::SeqCst);
        self
    }

    /// Every describe from now on fails with an opaque store error carrying
    /// `message`. A later call replaces the message.
    pub fn fail_describes(&self, message: impl Into<String>) {
        *self.describe_failure() = Some(message.into());
    }

    pub fn restore_describes(&self) {
        *self.describe_failure() = None;
    }

    fn describe_failure(&self) -> MutexGuard<'_, Option<String>> {
        self.0
            .describe_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a table that is still being created by someone else.
    pub fn insert_creating_table(&self, name: impl Into<String>, polls: u32) {
        let name = name.into();
        let state = TableState::new(name.clone(), FIELD_NAME_PRIMARY_ID.to_string(), polls);

        self.0.tables.insert(name, Arc::new(state));
    }

    /// Insert a table that reports `Deleting` for `polls` describes, then is gone.
    pub fn insert_deleting_table(&self, name: impl Into<String>, polls: u32) {
        let name = name.into();
        let mut state = TableState::new(name.clone(), FIELD_NAME_PRIMARY_ID.to_string(), polls);
        state.vanishing = true;

        self.0.tables.insert(name, Arc::new(state));
    }

    pub fn delete_table(&self, name: &str) -> bool {
        self.0.tables.remove(name).is_some()
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.0.tables.contains_key(name)
    }

    /// Keys of every document in `table`, sorted. Empty for a missing table.
    pub fn keys(&self, table: &str) -> Vec<String> {
        let Some(state) = self.0.tables.get(table) else {
            return Vec::new();
        };

        let mut keys: Vec<String> = state.items.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn count(&self, table: &str) -> usize {
        self.0
            .tables
            .get(table)
            .map(|state| state.items.len())
            .unwrap_or(0)
    }

    /// Raw document, bypassing any table handle.
    pub fn document(&self, table: &str, key: &str) -> Option<Document> {
        let state = self.0.tables.get(table)?;
        let document = state.items.get(key)?.value().clone();
        Some(document)
    }

    pub fn describe_calls(&self) -> usize {
        self.0.describe_calls.load(Ordering::SeqCst)
    }

    /// Create requests received, successful or not.
    pub fn create_calls(&self) -> usize {
        self.0.create_calls.load(Ordering::SeqCst)
    }

    pub fn tables_created(&self) -> usize {
        self.0.tables_created.load(Ordering::SeqCst)
    }
}

impl DocumentStore for InMemoryStore {
    type Table = InMemoryTable;

    fn describe_table(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<TableDescription, StoreError>> + Send {
        self.0.describe_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = self.describe_failure().clone() {
            return futures::future::ready(Err(StoreError::Other(anyhow!(message))));
        }

        let result = match self.0.tables.get(name).map(|state| state.describe()) {
            Some(Some(description)) => Ok(description),
            Some(None) => {
                self.0.tables.remove(name);
                Err(StoreError::TableNotFound(name.to_string()))
            }
            None => Err(StoreError::TableNotFound(name.to_string())),
        };

        futures::future::ready(result)
    }

    fn create_table(
        &self,
        request: CreateTableRequest,
    ) -> impl Future<Output = Result<TableDescription, StoreError>> + Send {
        self.0.create_calls.fetch_add(1, Ordering::SeqCst);

        let result = match self.0.tables.entry(request.table_name.clone()) {
            Entry::Occupied(_) => Err(StoreError::TableInUse(request.table_name)),
            Entry::Vacant(entry) => {
                let polls = self.0.creation_polls.load(Ordering::SeqCst);
                let state = TableState::new(request.table_name.clone(), request.key_attribute, polls);
                entry.insert(Arc::new(state));

                self.0.tables_created.fetch_add(1, Ordering::SeqCst);

                Ok(TableDescription {
                    name: request.table_name,
                    status: if polls > 0 {
                        TableStatus::Creating
                    } else {
                        TableStatus::Active
                    },
                })
            }
        };

        futures::future::ready(result)
    }

    fn table(&self, name: &str) -> Result<InMemoryTable, StoreError> {
        self.0
            .tables
            .get(name)
            .map(|state| InMemoryTable(state.value().clone()))
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))
    }
}

impl InMemoryTable {
    pub fn key_attribute(&self) -> &str {
        &self.0.key_attribute
    }

    /// Whether both handles refer to the same table instance.
    pub fn same_table(&self, other: &InMemoryTable) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Table for InMemoryTable {
    fn name(&self) -> &str {
        &self.0.name
    }

    fn get_item(
        &self,
        key: &str,
        _consistent_read: bool,
    ) -> impl Future<Output = Result<Option<Document>, StoreError>> + Send {
        futures::future::ready(Ok(self.0.items.get(key).map(|d| d.value().clone())))
    }

    fn put_item(&self, document: Document) -> impl Future<Output = Result<(), StoreError>> + Send {
        self.0.items.insert(document.id.clone(), document);
        futures::future::ready(Ok(()))
    }

    fn delete_item(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send {
        self.0.items.remove(key);
        futures::future::ready(Ok(()))
    }
}

impl TableState {
    fn new(name: String, key_attribute: String, pending_polls: u32) -> Self {
        Self {
            name,
            key_attribute,
            pending_polls: AtomicU32::new(pending_polls),
            vanishing: false,
            items: DashMap::new(),
        }
    }

    /// `None` once a vanishing table has run out of polls.
    fn describe(&self) -> Option<TableDescription> {
        let was_pending = self
            .pending_polls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        let status = match (was_pending, self.vanishing) {
            (true, false) => TableStatus::Creating,
            (true, true) => TableStatus::Deleting,
            (false, false) => TableStatus::Active,
            (false, true) => return None,
        };

        Some(TableDescription {
            name: self.name.clone(),
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProvisionConfig;

    fn request(name: &str) -> CreateTableRequest {
        CreateTableRequest::new(name, &ProvisionConfig::default())
    }

    #[tokio::test]
    async fn test_describe_missing_table() {
        let store = InMemoryStore::new();

        let err = store.describe_table("orbit").await.unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(store.describe_calls(), 1);
    }

    #[tokio::test]
    async fn test_create_then_activate() {
        let store = InMemoryStore::new().with_creation_delay(2);

        let created = store.create_table(request("orbit")).await.unwrap();
        assert_eq!(created.status, TableStatus::Creating);

        let statuses = [
            store.describe_table("orbit").await.unwrap().status,
            store.describe_table("orbit").await.unwrap().status,
            store.describe_table("orbit").await.unwrap().status,
        ];

        assert_eq!(
            statuses,
            [TableStatus::Creating, TableStatus::Creating, TableStatus::Active]
        );
    }

    #[tokio::test]
    async fn test_duplicate_create_is_in_use() {
        let store = InMemoryStore::new();

        store.create_table(request("orbit")).await.unwrap();
        let err = store.create_table(request("orbit")).await.unwrap_err();

        assert!(err.is_in_use());
        assert_eq!(store.create_calls(), 2);
        assert_eq!(store.tables_created(), 1);
    }

    #[tokio::test]
    async fn test_item_operations() {
        let store = InMemoryStore::new();
        store.create_table(request("orbit")).await.unwrap();
        let table = store.table("orbit").unwrap();

        let document = Document {
            id: "actor-1/Hello".to_string(),
            owning_type: "Hello".to_string(),
            state: Some("{}".to_string()),
        };

        table.put_item(document.clone()).await.unwrap();
        assert_eq!(
            table.get_item("actor-1/Hello", true).await.unwrap(),
            Some(document)
        );
        assert_eq!(store.keys("orbit"), vec!["actor-1/Hello".to_string()]);

        table.delete_item("actor-1/Hello").await.unwrap();
        table.delete_item("actor-1/Hello").await.unwrap();

        assert_eq!(table.get_item("actor-1/Hello", true).await.unwrap(), None);
        assert_eq!(store.count("orbit"), 0);
    }

    #[tokio::test]
    async fn test_describe_failure() {
        let store = InMemoryStore::new();
        store.fail_describes("bad credentials");

        let err = store.describe_table("orbit").await.unwrap_err();

        assert!(matches!(err, StoreError::Other(_)));
        assert_eq!(err.to_string(), "bad credentials");
    }

    #[tokio::test]
    async fn test_describe_failure_can_change() {
        let store = InMemoryStore::new();
        store.create_table(request("orbit")).await.unwrap();

        store.fail_describes("bad credentials");
        store.fail_describes("throttled");
        let err = store.describe_table("orbit").await.unwrap_err();
        assert_eq!(err.to_string(), "throttled");

        store.restore_describes();
        let description = store.describe_table("orbit").await.unwrap();
        assert_eq!(description.status, TableStatus::Active);
    }

    #[tokio::test]
    async fn test_deleting_table_disappears() {
        let store = InMemoryStore::new();
        store.insert_deleting_table("orbit", 1);

        let status = store.describe_table("orbit").await.unwrap().status;
        let gone = store.describe_table("orbit").await.unwrap_err();

        assert_eq!(status, TableStatus::Deleting);
        assert!(gone.is_not_found());
        assert!(!store.has_table("orbit"));
    }

    #[test]
    fn test_table_handle_for_missing_table() {
        let store = InMemoryStore::new();

        assert!(store.table("orbit").unwrap_err().is_not_found());
    }
}
