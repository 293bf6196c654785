use crate::{
    reference::ActorReference,
    state::{StateRegistry, StateType},
};

/// Separator between the actor identity and the id decoration.
///
/// Part of the persisted key format; changing it orphans existing documents.
pub const DOCUMENT_ID_DECORATION_SEPARATOR: &str = "/";

/// Decides which table and which key hold a given actor's state.
///
/// Pure: the same inputs always give the same table and key.
#[derive(Debug, Clone)]
pub struct DocumentAddresser {
    default_table_name: String,
    registry: StateRegistry,
}

// Implementations

impl DocumentAddresser {
    pub fn new(default_table_name: impl Into<String>, registry: StateRegistry) -> Self {
        Self {
            default_table_name: default_table_name.into(),
            registry,
        }
    }

    pub fn default_table_name(&self) -> &str {
        &self.default_table_name
    }

    pub fn registry(&self) -> &StateRegistry {
        &self.registry
    }

    /// Table holding documents of `state_type`.
    ///
    /// The interface name does not participate today; it is accepted so callers
    /// address tables and keys through the same inputs.
    pub fn table_name(&self, _interface_name: &str, state_type: &StateType) -> &str {
        self.registry
            .get(state_type)
            .and_then(|o| o.table_name())
            .unwrap_or(self.default_table_name.as_str())
    }

    /// Suffix distinguishing documents of different interfaces sharing one identity.
    pub fn id_decoration<'a>(&'a self, interface_name: &'a str, state_type: &StateType) -> &'a str {
        self.registry
            .get(state_type)
            .and_then(|o| o.id_decoration())
            .unwrap_or(interface_name)
    }

    /// `<identity>/<id decoration>`
    pub fn document_key<R>(&self, reference: &R, state_type: &StateType) -> String
    where
        R: ActorReference + ?Sized,
    {
        let interface_name = reference.interface_name();

        format!(
            "{}{}{}",
            reference.identity(),
            DOCUMENT_ID_DECORATION_SEPARATOR,
            self.id_decoration(interface_name, state_type)
        )
    }
}
