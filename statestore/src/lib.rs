extern crate self as statestore;

pub mod address;
pub mod base;
pub mod binary;
pub mod codec;
pub mod config;
pub mod errors;
pub mod provision;
pub mod reference;
pub mod state;
pub mod storage;
pub mod store;

pub mod prelude {
    pub use crate::address::DocumentAddresser;
    pub use crate::binary::Binary;
    pub use crate::config::{ProvisionConfig, StorageConfig};
    pub use crate::errors::{PersistenceError, StoreError};
    pub use crate::provision::{Connection, TableProvisioner};
    pub use crate::reference::{ActorInterface, ActorReference, Reference};
    pub use crate::state::{StateOptions, StateRegistry, StateType};
    pub use crate::storage::Storage;
    pub use crate::store::{Document, DocumentStore, InMemoryStore, Table};
}
