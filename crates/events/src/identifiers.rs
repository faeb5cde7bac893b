//! Newtype identifiers for the processes a supervisor manages.
//!
//! The supervisor names every managed program twice: the process name and the
//! group it belongs to. Both arrive as plain `key:value` tokens on the wire and
//! both must be non-empty. Wrapping them in distinct newtypes prevents
//! accidentally swapping a [`GroupName`] for a [`ProcessName`] when building
//! notification bodies.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty
            /// or whitespace only.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.trim().is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id! {
    /// The `processname` of a supervised program instance (e.g. `worker_01`).
    ProcessName
}

string_id! {
    /// The `groupname` of the program group a process belongs to.
    ///
    /// For a program without `numprocs` this usually equals the process name.
    GroupName
}
