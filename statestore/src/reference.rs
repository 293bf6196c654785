use std::fmt::{self, Display};

/// What the storage needs to know about an actor to address its state.
pub trait ActorReference {
    /// Stable logical identity of the actor.
    fn identity(&self) -> String;

    /// Fully qualified name of the actor interface.
    fn interface_name(&self) -> &str;
}

/// Actor interface with a persisted name.
///
/// The name becomes part of document keys and ownership tags, so it has to stay
/// the same for as long as stored state should be found again. Usually
/// implemented on the interface's trait object:
///
/// ```
/// use statestore::prelude::*;
///
/// trait Player {}
///
/// impl ActorInterface for dyn Player {
///     const INTERFACE_NAME: &'static str = "game.Player";
/// }
///
/// let reference = Reference::new::<dyn Player>("player-1");
/// assert_eq!(reference.interface_name(), "game.Player");
/// ```
pub trait ActorInterface {
    const INTERFACE_NAME: &'static str;
}

/// Plain [`ActorReference`] carrying an identity and an interface name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    identity: String,
    interface: &'static str,
}

// Implementations

impl Reference {
    /// Reference to the actor `identity` implementing interface `I`.
    pub fn new<I: ActorInterface + ?Sized>(identity: impl Display) -> Self {
        Self::with_interface_name(identity, I::INTERFACE_NAME)
    }

    pub fn with_interface_name(identity: impl Display, interface: &'static str) -> Self {
        Self {
            identity: identity.to_string(),
            interface,
        }
    }
}

impl ActorReference for Reference {
    fn identity(&self) -> String {
        self.identity.clone()
    }

    fn interface_name(&self) -> &str {
        self.interface
    }
}

impl<R: ActorReference + ?Sized> ActorReference for &R {
    fn identity(&self) -> String {
        (**self).identity()
    }

    fn interface_name(&self) -> &str {
        (**self).interface_name()
    }
}

impl Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.interface, self.identity)
    }
}
