//! `NewResource` object model.
//!
//! The spec schema is owned by whoever defines the custom resource, so it is
//! carried as an opaque JSON value. Status is owned by the reconciler.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `(namespace, name)` address of one resource instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceIdentity {
    pub namespace: String,
    pub name: String,
}

impl ResourceIdentity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(flatten)]
    pub identity: ResourceIdentity,
    /// Bumped by the store on every write; used for optimistic concurrency.
    #[serde(default)]
    pub resource_version: u64,
    /// Bumped by the store only when the spec changes.
    #[serde(default)]
    pub generation: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewResourceStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewResource {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: Value,
    #[serde(default)]
    pub status: NewResourceStatus,
}

impl NewResource {
    pub const KIND: &'static str = "NewResource";

    pub fn new(identity: ResourceIdentity, spec: Value) -> Self {
        Self {
            metadata: ObjectMeta {
                identity,
                resource_version: 0,
                generation: 0,
            },
            spec,
            status: NewResourceStatus::default(),
        }
    }

    pub fn identity(&self) -> &ResourceIdentity {
        &self.metadata.identity
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.identity.namespace
    }

    pub fn name(&self) -> &str {
        &self.metadata.identity.name
    }
}
