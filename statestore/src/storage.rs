use std::{any::Any, sync::Arc};

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    address::DocumentAddresser,
    codec,
    config::StorageConfig,
    errors::{PersistenceError, Result},
    info,
    provision::{Connection, TableProvisioner},
    reference::ActorReference,
    state::{StateRegistry, StateType},
    store::{Document, DocumentStore, Table},
    trace,
};

/// Actor state persistence on a [`DocumentStore`].
///
/// Every operation derives the table and key through the same
/// [`DocumentAddresser`], so a document written for an actor and state type is
/// found again by the matching read or clear, across restarts.
///
/// # Example
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use statestore::prelude::*;
///
/// #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
/// struct Counter {
///     count: i64,
/// }
///
/// trait CounterActor {}
///
/// impl ActorInterface for dyn CounterActor {
///     const INTERFACE_NAME: &'static str = "game.Counter";
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), PersistenceError> {
/// let mut storage = Storage::new(InMemoryStore::new(), StorageConfig::default());
/// storage.start().await?;
///
/// let reference = Reference::new::<dyn CounterActor>("counter-1");
/// storage.write_state(&reference, &Counter { count: 3 }, None).await?;
///
/// let mut loaded = Counter::default();
/// assert!(storage.read_state(&reference, &mut loaded, None).await?);
/// assert_eq!(loaded.count, 3);
/// # Ok(())
/// # }
/// ```
pub struct Storage<S: DocumentStore> {
    cfg: StorageConfig,
    addresser: DocumentAddresser,
    provisioner: TableProvisioner,
    store: S,
    connection: Option<Arc<Connection<S>>>,
}

// Implementations

impl<S: DocumentStore> Storage<S> {
    pub fn new(store: S, cfg: StorageConfig) -> Self {
        Self {
            addresser: DocumentAddresser::new(&cfg.default_table_name, StateRegistry::default()),
            provisioner: TableProvisioner::new(cfg.provision.clone()),
            cfg,
            store,
            connection: None,
        }
    }

    /// Replace the per state type overrides.
    pub fn with_registry(mut self, registry: StateRegistry) -> Self {
        self.addresser = DocumentAddresser::new(&self.cfg.default_table_name, registry);
        self
    }

    pub fn name(&self) -> &str {
        &self.cfg.name
    }

    pub fn default_table_name(&self) -> &str {
        self.addresser.default_table_name()
    }

    pub fn config(&self) -> &StorageConfig {
        &self.cfg
    }

    pub fn addresser(&self) -> &DocumentAddresser {
        &self.addresser
    }

    pub fn connection(&self) -> Option<&Arc<Connection<S>>> {
        self.connection.as_ref()
    }

    pub fn is_started(&self) -> bool {
        self.connection.is_some()
    }

    /// Open a fresh connection and make sure the default table is usable.
    ///
    /// Misconfiguration of the store surfaces here rather than on first traffic.
    /// A connection from an earlier start is replaced along with its cache.
    pub async fn start(&mut self) -> Result<()>
    where
        S: Clone,
    {
        let connection = Arc::new(Connection::new(self.store.clone()));

        info!(
            "Starting storage {} on connection {}.",
            self.cfg.name,
            connection.id()
        );

        self.provisioner
            .resolve(&connection, self.addresser.default_table_name())
            .await?;

        self.connection = Some(connection);

        Ok(())
    }

    /// Drop the connection and its table cache.
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    pub fn stop(&mut self) {
        if let Some(connection) = self.connection.take() {
            info!(
                "Stopped storage {} on connection {}.",
                self.cfg.name,
                connection.id()
            );
        }
    }

    /// Load the stored state of `reference` into `state`.
    ///
    /// Returns `false` and leaves `state` untouched when nothing is stored.
    /// When `expected` is given, `T` must be that type.
    pub async fn read_state<R, T>(
        &self,
        reference: &R,
        state: &mut T,
        expected: Option<&StateType>,
    ) -> Result<bool>
    where
        R: ActorReference + ?Sized,
        T: Serialize + DeserializeOwned + Any,
    {
        let state_type = checked_state_type::<T>(expected)?;
        let (table, key) = self.locate(reference, &state_type).await?;

        trace!("Reading {key} from table {}.", table.name());

        let Some(document) = table.get_item(&key, true).await? else {
            return Ok(false);
        };

        if let Some(payload) = document.state {
            codec::decode_into(&payload, state)?;
        }

        Ok(true)
    }

    /// Overwrite the stored state of `reference` with `state`.
    ///
    /// A state encoding to `null` is stored as a key-only document.
    pub async fn write_state<R, T>(
        &self,
        reference: &R,
        state: &T,
        expected: Option<&StateType>,
    ) -> Result<()>
    where
        R: ActorReference + ?Sized,
        T: Serialize + Any,
    {
        let state_type = checked_state_type::<T>(expected)?;

        let payload = match codec::encode(state)? {
            Value::Null => None,
            value => Some(serde_json::to_string(&value)?),
        };

        let (table, key) = self.locate(reference, &state_type).await?;

        trace!("Writing {key} to table {}.", table.name());

        table
            .put_item(Document {
                id: key,
                owning_type: reference.interface_name().to_string(),
                state: payload,
            })
            .await?;

        Ok(())
    }

    /// Delete the stored state of `reference`. Clearing absent state succeeds.
    pub async fn clear_state<R, T>(
        &self,
        reference: &R,
        _state: &T,
        expected: Option<&StateType>,
    ) -> Result<()>
    where
        R: ActorReference + ?Sized,
        T: Any,
    {
        let state_type = checked_state_type::<T>(expected)?;
        let (table, key) = self.locate(reference, &state_type).await?;

        trace!("Clearing {key} from table {}.", table.name());

        table.delete_item(&key).await?;

        Ok(())
    }

    async fn locate<R>(&self, reference: &R, state_type: &StateType) -> Result<(Arc<S::Table>, String)>
    where
        R: ActorReference + ?Sized,
    {
        let connection = self
            .connection
            .as_ref()
            .ok_or(PersistenceError::NotStarted)?;

        let table_name = self
            .addresser
            .table_name(reference.interface_name(), state_type);
        let key = self.addresser.document_key(reference, state_type);

        let table = self.provisioner.resolve(connection, table_name).await?;

        Ok((table, key))
    }
}

fn checked_state_type<T: Any>(expected: Option<&StateType>) -> Result<StateType> {
    let actual = StateType::of::<T>();

    match expected {
        Some(expected) if *expected != actual => Err(PersistenceError::StateTypeMismatch {
            expected: expected.name(),
            actual: actual.name(),
        }),
        _ => Ok(actual),
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::{reference::Reference, store::InMemoryStore};

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct HelloState {
        name: Option<String>,
    }

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct OtherState {
        name: Option<String>,
    }

    trait Hello {}

    impl crate::reference::ActorInterface for dyn Hello {
        const INTERFACE_NAME: &'static str = "game.Hello";
    }

    #[test]
    fn test_checked_state_type() {
        assert_eq!(
            checked_state_type::<HelloState>(None).unwrap(),
            StateType::of::<HelloState>()
        );
        assert!(checked_state_type::<HelloState>(Some(&StateType::of::<HelloState>())).is_ok());

        let err = checked_state_type::<HelloState>(Some(&StateType::of::<OtherState>())).unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[tokio::test]
    async fn test_operations_before_start() {
        let storage = Storage::new(InMemoryStore::new(), StorageConfig::default());
        let reference = Reference::new::<dyn Hello>("actor-1");

        let err = storage
            .write_state(&reference, &HelloState::default(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, PersistenceError::NotStarted));
    }

    #[tokio::test]
    async fn test_start_provisions_default_table() {
        let store = InMemoryStore::new();
        let mut storage = Storage::new(store.clone(), StorageConfig::default());

        storage.start().await.unwrap();

        assert!(store.has_table("orbit"));
        assert!(storage.connection().unwrap().cached("orbit").is_some());
        assert_eq!(storage.name(), "default");
    }

    #[tokio::test]
    async fn test_stop_discards_connection() {
        let mut storage = Storage::new(InMemoryStore::new(), StorageConfig::default());
        storage.start().await.unwrap();

        let first = storage.connection().unwrap().id();
        storage.stop();
        assert!(!storage.is_started());

        storage.start().await.unwrap();
        assert_ne!(storage.connection().unwrap().id(), first);
    }

    #[tokio::test]
    async fn test_start_surfaces_store_failure() {
        let store = InMemoryStore::new();
        store.fail_describes("invalid endpoint");
        let mut storage = Storage::new(store, StorageConfig::default());

        let err = storage.start().await.unwrap_err();

        assert!(matches!(err, PersistenceError::Store(_)));
        assert!(!storage.is_started());
    }

    #[tokio::test]
    async fn test_document_carries_owning_type() {
        let store = InMemoryStore::new();
        let mut storage = Storage::new(store.clone(), StorageConfig::default());
        storage.start().await.unwrap();

        let reference = Reference::with_interface_name("actor-1", "game.Hello");
        let state = HelloState {
            name: Some("Larry".to_string()),
        };
        storage.write_state(&reference, &state, None).await.unwrap();

        let document = store.document("orbit", "actor-1/game.Hello").unwrap();
        assert_eq!(document.owning_type, "game.Hello");
        assert_eq!(document.state.as_deref(), Some(r#"{"name":"Larry"}"#));
    }

    #[tokio::test]
    async fn test_null_state_is_key_only() {
        let store = InMemoryStore::new();
        let mut storage = Storage::new(store.clone(), StorageConfig::default());
        storage.start().await.unwrap();

        let reference = Reference::with_interface_name("actor-1", "game.Hello");
        storage
            .write_state(&reference, &Option::<HelloState>::None, None)
            .await
            .unwrap();

        let document = store.document("orbit", "actor-1/game.Hello").unwrap();
        assert_eq!(document.state, None);

        let mut loaded: Option<HelloState> = Some(HelloState::default());
        assert!(storage.read_state(&reference, &mut loaded, None).await.unwrap());
        assert_eq!(loaded, Some(HelloState::default()));
    }
}
