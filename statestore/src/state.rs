use std::any::{Any, TypeId};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::base::{non_blank, qualified_name};

/// Identity of a state type, used both for override lookup and for
/// checking a state object against the type an actor declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateType {
    id: TypeId,
    name: &'static str,
}

/// Per state type storage overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateOptions {
    pub table_name: Option<String>,
    pub id_decoration: Option<String>,
}

/// Explicit registry of [`StateOptions`] keyed by state type.
///
/// Types never registered use the storage defaults.
#[derive(Debug, Clone, Default)]
pub struct StateRegistry {
    options: FxHashMap<TypeId, StateOptions>,
}

// Implementations

impl StateType {
    pub fn of<S: Any>() -> Self {
        Self {
            id: TypeId::of::<S>(),
            name: qualified_name::<S>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl StateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    pub fn with_id_decoration(mut self, id_decoration: impl Into<String>) -> Self {
        self.id_decoration = Some(id_decoration.into());
        self
    }

    /// Table override, if declared and not blank.
    pub fn table_name(&self) -> Option<&str> {
        non_blank(self.table_name.as_deref())
    }

    /// Id decoration override, if declared and not blank.
    pub fn id_decoration(&self) -> Option<&str> {
        non_blank(self.id_decoration.as_deref())
    }
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers overrides for `S`, replacing any earlier registration.
    pub fn register<S: Any>(&mut self, options: StateOptions) -> &mut Self {
        self.options.insert(TypeId::of::<S>(), options);
        self
    }

    pub fn with<S: Any>(mut self, options: StateOptions) -> Self {
        self.register::<S>(options);
        self
    }

    pub fn get(&self, state_type: &StateType) -> Option<&StateOptions> {
        self.options.get(&state_type.id)
    }
}
