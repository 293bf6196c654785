use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{config::ProvisionConfig, errors::StoreError};

mod in_memory;
pub use in_memory::{InMemoryStore, InMemoryTable};

pub const FIELD_NAME_PRIMARY_ID: &str = "_id";
pub const FIELD_NAME_DATA: &str = "_state";
pub const FIELD_NAME_OWNING_ACTOR_TYPE: &str = "_owningType";

/// Remote key-value document store holding one table per logical table name.
///
/// Implementations wrap an already configured client; credentials, region and
/// endpoint are their concern.
pub trait DocumentStore: Send + Sync + 'static {
    type Table: Table;

    /// Current description of `name`, or [`StoreError::TableNotFound`].
    fn describe_table(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<TableDescription, StoreError>> + Send;

    /// Request creation of a table. Fails with [`StoreError::TableInUse`] when
    /// the table already exists or is being created.
    fn create_table(
        &self,
        request: CreateTableRequest,
    ) -> impl Future<Output = Result<TableDescription, StoreError>> + Send;

    /// Handle to an existing table. No I/O.
    fn table(&self, name: &str) -> Result<Self::Table, StoreError>;
}

/// Handle to a single table.
pub trait Table: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn get_item(
        &self,
        key: &str,
        consistent_read: bool,
    ) -> impl Future<Output = Result<Option<Document>, StoreError>> + Send;

    /// Unconditional upsert.
    fn put_item(&self, document: Document) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Deleting an absent key succeeds.
    fn delete_item(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableStatus {
    Creating,
    Active,
    Updating,
    Deleting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescription {
    pub name: String,
    pub status: TableStatus,
}

/// Table with a single hash-partitioned string key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTableRequest {
    pub table_name: String,
    pub key_attribute: String,
    pub read_capacity: u64,
    pub write_capacity: u64,
}

/// Persisted unit of actor state.
///
/// Attribute names are part of the on-disk format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_owningType")]
    pub owning_type: String,
    #[serde(rename = "_state", default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

// Implementations

impl TableStatus {
    /// Whether reads and writes can be served.
    pub fn is_usable(&self) -> bool {
        matches!(self, TableStatus::Active | TableStatus::Updating)
    }
}

impl CreateTableRequest {
    pub fn new(table_name: impl Into<String>, cfg: &ProvisionConfig) -> Self {
        Self {
            table_name: table_name.into(),
            key_attribute: FIELD_NAME_PRIMARY_ID.to_string(),
            read_capacity: cfg.read_capacity,
            write_capacity: cfg.write_capacity,
        }
    }
}
