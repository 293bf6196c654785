use std::{fmt, sync::Arc};

use dashmap::DashMap;
use uuid::Uuid;

use crate::{
    config::ProvisionConfig,
    debug, error,
    errors::{PersistenceError, Result, StoreError},
    info,
    store::{CreateTableRequest, DocumentStore, TableDescription},
    trace,
};

/// Unique identifier of a [`Connection`].
pub type ConnectionId = Uuid;

/// One configured session with a [`DocumentStore`].
///
/// Owns the cache of resolved table handles. Entries are inserted at most once
/// per table name and never invalidated; they go away with the connection.
pub struct Connection<S: DocumentStore> {
    id: ConnectionId,
    store: S,
    tables: DashMap<String, Arc<S::Table>>,
}

/// Turns a table name into a usable table handle, discovering, creating or
/// waiting for the table on first use per connection.
#[derive(Debug, Clone, Default)]
pub struct TableProvisioner {
    cfg: ProvisionConfig,
}

/// `None` means resolution has to start over from a fresh describe.
type Step = Option<TableDescription>;

// Implementations

impl<S: DocumentStore> Connection<S> {
    pub fn new(store: S) -> Self {
        Self {
            id: Uuid::new_v4(),
            store,
            tables: DashMap::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Cached handle for `table_name`, without any I/O.
    pub fn cached(&self, table_name: &str) -> Option<Arc<S::Table>> {
        self.tables.get(table_name).map(|t| t.value().clone())
    }

    pub fn cached_tables(&self) -> usize {
        self.tables.len()
    }

    /// First writer wins; every caller gets the handle that landed.
    fn cache(&self, table_name: &str, table: S::Table) -> Arc<S::Table> {
        self.tables
            .entry(table_name.to_string())
            .or_insert_with(|| Arc::new(table))
            .value()
            .clone()
    }
}

impl<S: DocumentStore> fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("cached_tables", &self.tables.len())
            .finish()
    }
}

impl TableProvisioner {
    pub fn new(cfg: ProvisionConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.cfg
    }

    /// Ready-to-use handle for `table_name` on `conn`.
    ///
    /// Concurrent first-time callers may all provision; a lost creation race
    /// restarts from a fresh describe and they converge on one cached handle.
    pub async fn resolve<S: DocumentStore>(
        &self,
        conn: &Connection<S>,
        table_name: &str,
    ) -> Result<Arc<S::Table>> {
        if let Some(table) = conn.cached(table_name) {
            return Ok(table);
        }

        loop {
            if let Some(description) = self.discover(conn, table_name).await? {
                let table = conn.store.table(&description.name)?;

                debug!(
                    "Connection {} resolved table {table_name} ({:?}).",
                    conn.id, description.status
                );
                return Ok(conn.cache(table_name, table));
            }

            trace!("Restarting resolution of table {table_name}.");
        }
    }

    async fn discover<S: DocumentStore>(
        &self,
        conn: &Connection<S>,
        table_name: &str,
    ) -> Result<Step> {
        let description = match conn.store.describe_table(table_name).await {
            Ok(description) => description,
            Err(StoreError::TableNotFound(_)) => {
                debug!("Table {table_name} does not exist.");
                return self.create(conn, table_name).await;
            }
            Err(e) => return Err(e.into()),
        };

        debug!("Table {table_name} is {:?}.", description.status);

        if description.status.is_usable() {
            Ok(Some(description))
        } else {
            self.wait_for_active(conn, table_name).await
        }
    }

    async fn create<S: DocumentStore>(
        &self,
        conn: &Connection<S>,
        table_name: &str,
    ) -> Result<Step> {
        info!("Creating table {table_name}.");

        let request = CreateTableRequest::new(table_name, &self.cfg);

        match conn.store.create_table(request).await {
            Ok(description) if description.status.is_usable() => Ok(Some(description)),
            Ok(_) => self.wait_for_active(conn, table_name).await,
            Err(StoreError::TableInUse(_)) => {
                debug!("Table {table_name} is already being created.");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    async fn wait_for_active<S: DocumentStore>(
        &self,
        conn: &Connection<S>,
        table_name: &str,
    ) -> Result<Step> {
        let delay = self.cfg.retry_delay();

        for attempt in 0..self.cfg.max_attempts {
            match conn.store.describe_table(table_name).await {
                Ok(description) if description.status.is_usable() => {
                    return Ok(Some(description));
                }
                Ok(description) => trace!(
                    "Table {table_name} is {:?}, attempt {}/{}.",
                    description.status,
                    attempt + 1,
                    self.cfg.max_attempts
                ),
                Err(StoreError::TableNotFound(_)) => return Ok(None),
                Err(e) => return Err(e.into()),
            }

            tokio::time::sleep(delay).await;
        }

        error!(
            "Table {table_name} did not become active after {} attempts.",
            self.cfg.max_attempts
        );

        Err(PersistenceError::ProvisionTimeout {
            table: table_name.to_string(),
            attempts: self.cfg.max_attempts,
            delay,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::{InMemoryStore, Table};

    fn provisioner(max_attempts: u32) -> TableProvisioner {
        TableProvisioner::new(
            ProvisionConfig::default()
                .with_max_attempts(max_attempts)
                .with_retry_delay(Duration::from_millis(1)),
        )
    }

    #[tokio::test]
    async fn test_creates_missing_table() {
        let store = InMemoryStore::new();
        let conn = Connection::new(store.clone());

        let table = provisioner(5).resolve(&conn, "orbit").await.unwrap();

        assert_eq!(table.name(), "orbit");
        assert_eq!(table.key_attribute(), "_id");
        assert_eq!(store.tables_created(), 1);
        assert_eq!(conn.cached_tables(), 1);
    }

    #[tokio::test]
    async fn test_cache_hit_does_no_io() {
        let store = InMemoryStore::new();
        let conn = Connection::new(store.clone());
        let provisioner = provisioner(5);

        let first = provisioner.resolve(&conn, "orbit").await.unwrap();
        let describes = store.describe_calls();
        let second = provisioner.resolve(&conn, "orbit").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.describe_calls(), describes);
    }

    #[tokio::test]
    async fn test_uses_existing_active_table() {
        let store = InMemoryStore::new();
        store.insert_creating_table("orbit", 0);
        let conn = Connection::new(store.clone());

        provisioner(5).resolve(&conn, "orbit").await.unwrap();

        assert_eq!(store.create_calls(), 0);
        assert_eq!(store.describe_calls(), 1);
    }

    #[tokio::test]
    async fn test_waits_for_table_being_created() {
        let store = InMemoryStore::new();
        store.insert_creating_table("orbit", 3);
        let conn = Connection::new(store.clone());

        provisioner(10).resolve(&conn, "orbit").await.unwrap();

        assert_eq!(store.create_calls(), 0);
        // One discovery describe, then the wait loop sees Creating twice before Active.
        assert_eq!(store.describe_calls(), 4);
    }

    #[tokio::test]
    async fn test_waits_after_own_create() {
        let store = InMemoryStore::new().with_creation_delay(2);
        let conn = Connection::new(store.clone());

        provisioner(10).resolve(&conn, "orbit").await.unwrap();

        assert_eq!(store.tables_created(), 1);
        assert!(conn.cached("orbit").is_some());
    }

    #[tokio::test]
    async fn test_recreates_table_deleted_while_waiting() {
        let store = InMemoryStore::new();
        store.insert_deleting_table("orbit", 2);
        let conn = Connection::new(store.clone());

        let table = provisioner(10).resolve(&conn, "orbit").await.unwrap();

        assert_eq!(store.create_calls(), 1);
        assert_eq!(store.tables_created(), 1);
        assert!(table.same_table(&store.table("orbit").unwrap()));
    }

    #[tokio::test]
    async fn test_wait_bound_is_fatal() {
        let store = InMemoryStore::new();
        store.insert_creating_table("orbit", u32::MAX);
        let conn = Connection::new(store.clone());

        let err = provisioner(3).resolve(&conn, "orbit").await.unwrap_err();

        assert!(matches!(
            err,
            PersistenceError::ProvisionTimeout { ref table, attempts: 3, .. } if table == "orbit"
        ));
        assert!(conn.cached("orbit").is_none());
        assert_eq!(store.describe_calls(), 4);
    }

    #[tokio::test]
    async fn test_other_store_errors_propagate() {
        let store = InMemoryStore::new();
        store.fail_describes("access denied");
        let conn = Connection::new(store.clone());

        let err = provisioner(3).resolve(&conn, "orbit").await.unwrap_err();

        assert!(matches!(err, PersistenceError::Store(StoreError::Other(_))));
        assert_eq!(store.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_connections_do_not_share_cache() {
        let store = InMemoryStore::new();
        let one = Connection::new(store.clone());
        let two = Connection::new(store.clone());
        let provisioner = provisioner(5);

        let a = provisioner.resolve(&one, "orbit").await.unwrap();
        let describes = store.describe_calls();
        let b = provisioner.resolve(&two, "orbit").await.unwrap();

        assert_ne!(one.id(), two.id());
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(a.same_table(&b));
        assert!(store.describe_calls() > describes);
        assert_eq!(store.tables_created(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_resolution_converges() {
        let store = InMemoryStore::new().with_creation_delay(3);
        let conn = Arc::new(Connection::new(store.clone()));
        let provisioner = Arc::new(provisioner(50));

        let tasks = (0..16)
            .map(|_| {
                let conn = conn.clone();
                let provisioner = provisioner.clone();
                tokio::spawn(async move { provisioner.resolve(&conn, "orbit").await })
            })
            .collect::<Vec<_>>();

        let tables = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect::<Vec<_>>();

        assert_eq!(store.tables_created(), 1);
        assert!(tables.iter().all(|t| Arc::ptr_eq(t, &tables[0])));
        assert!(Arc::ptr_eq(&tables[0], &conn.cached("orbit").unwrap()));
    }
}
