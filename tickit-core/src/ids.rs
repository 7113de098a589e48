// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Opaque identifiers for components and ports.
//!
//! Both [`ComponentId`] and [`PortId`] wrap a non-empty string restricted to
//! `[A-Za-z0-9_.-]+` so that they can be used verbatim as bus topic segments
//! (see the `tickit-bus` topic naming convention).

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::TickitError;

/// The component id reserved for a slave scheduler's synthetic source of
/// incoming changes.
pub const EXTERNAL: &str = "external";

/// The component id reserved for a slave scheduler's synthetic sink of
/// outgoing changes.
pub const EXPOSE: &str = "expose";

fn valid_id(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

macro_rules! opaque_id {
    ($name:ident, $what:literal) => {
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(Arc<str>);

        impl $name {
            /// Build a new identifier, rejecting empty strings or anything
            /// outside `[A-Za-z0-9_.-]+`.
            pub fn new(s: impl Into<String>) -> Result<Self, TickitError> {
                let s = s.into();
                if !valid_id(&s) {
                    return Err(TickitError::config(format!(
                        "invalid {}: {s:?} (must match [A-Za-z0-9_.-]+ and be non-empty)",
                        $what
                    )));
                }
                Ok(Self(Arc::from(s)))
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = TickitError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::new(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0.to_string()
            }
        }

        impl TryFrom<&str> for $name {
            type Error = TickitError;

            fn try_from(s: &str) -> Result<Self, Self::Error> {
                Self::new(s)
            }
        }
    };
}

opaque_id!(ComponentId, "component id");
opaque_id!(PortId, "port id");

impl ComponentId {
    /// The synthetic component a [`SlaveScheduler`](tickit_engine)
    /// exposes its incoming `Changes` through.
    #[must_use]
    pub fn external() -> Self {
        Self::new(EXTERNAL).expect("EXTERNAL is a valid id")
    }

    /// The synthetic component a `SlaveScheduler` collects its outgoing
    /// `Changes` through.
    #[must_use]
    pub fn expose() -> Self {
        Self::new(EXPOSE).expect("EXPOSE is a valid id")
    }

    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.as_str() == EXTERNAL || self.as_str() == EXPOSE
    }
}

/// One endpoint of a connection: the pair `(component, port)`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentPort {
    pub component: ComponentId,
    pub port: PortId,
}

impl ComponentPort {
    pub fn new(component: ComponentId, port: PortId) -> Self {
        Self { component, port }
    }
}

impl fmt::Display for ComponentPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.component, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_bad_chars() {
        assert!(ComponentId::new("").is_err());
        assert!(ComponentId::new("has space").is_err());
        assert!(ComponentId::new("has/slash").is_err());
        assert!(ComponentId::new("ok-id_1.2").is_ok());
    }

    #[test]
    fn reserved_ids_are_synthetic() {
        assert!(ComponentId::external().is_synthetic());
        assert!(ComponentId::expose().is_synthetic());
        assert!(!ComponentId::new("sensor").unwrap().is_synthetic());
    }
}
