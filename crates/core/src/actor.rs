//! Acting user as supplied by the identity collaborator.

use serde::{Deserialize, Serialize};

use crate::id::UserId;

/// The person driving an operation.
///
/// The engine never looks users up; callers pass whoever the identity source
/// says is acting, and the name is copied into audit fields as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub name: String,
}

impl Actor {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl core::fmt::Display for Actor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}
