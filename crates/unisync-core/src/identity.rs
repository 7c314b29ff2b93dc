//! Identities used by the sync engine.
//!
//! - [`OwnerRef`] names the declarative object contributing a config fragment.
//! - [`ExternalId`] is either the real identifier assigned by the external
//!   system or a `pending-` placeholder used until the resource exists.
//! - [`SyncStateKey`] is the storage identity of a `SyncState` record.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;
use crate::resource_type::ResourceType;

/// Reserved prefix for provisional identifiers. Real identifiers never carry it.
pub const PLACEHOLDER_PREFIX: &str = "pending-";

/// Reference to the declarative object that contributes a config fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerRef {
    pub kind: String,
    /// Empty for cluster-scoped objects.
    #[serde(default)]
    pub namespace: String,
    pub name: String,
}

impl OwnerRef {
    pub fn new(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Convenience constructor for cluster-scoped owners.
    pub fn cluster(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(kind, "", name)
    }
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{}", self.kind, self.name)
        } else {
            write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
        }
    }
}

/// External identifier of a synced resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ExternalId {
    Real(String),
    Placeholder(String),
}

impl ExternalId {
    /// Wraps an identifier returned by the external system.
    ///
    /// Rejects empty values and values carrying the reserved placeholder prefix.
    pub fn real(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        if id.is_empty() || id.starts_with(PLACEHOLDER_PREFIX) {
            return Err(CoreError::invalid_external_id(id));
        }
        Ok(Self::Real(id))
    }

    /// Deterministic placeholder for a resource registered by `owner`.
    ///
    /// Rendered as `pending-[namespace/]name[:naturalKey]`, each part escaped
    /// so that distinct owners never share a placeholder. The same owner (and
    /// natural key) always yields the same placeholder, so re-registration
    /// before the resource exists finds the same record. The owner's kind is
    /// not part of it; see `SyncStateStore::register` for how two kinds
    /// sharing a name are kept apart.
    pub fn placeholder_for(owner: &OwnerRef, natural_key: Option<&str>) -> Self {
        let mut id = String::from(PLACEHOLDER_PREFIX);
        if !owner.namespace.is_empty() {
            push_escaped(&mut id, &owner.namespace);
            id.push('/');
        }
        push_escaped(&mut id, &owner.name);
        if let Some(key) = natural_key.filter(|k| !k.is_empty()) {
            id.push(':');
            push_escaped(&mut id, key);
        }
        Self::Placeholder(id)
    }

    /// Parses a stored identifier, classifying it by prefix.
    pub fn parse(id: impl Into<String>) -> Self {
        let id = id.into();
        if id.starts_with(PLACEHOLDER_PREFIX) {
            Self::Placeholder(id)
        } else {
            Self::Real(id)
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Real(id) | Self::Placeholder(id) => id,
        }
    }

    /// The real identifier, if the resource has been created.
    pub fn real_id(&self) -> Option<&str> {
        match self {
            Self::Real(id) => Some(id),
            Self::Placeholder(_) => None,
        }
    }
}

/// Percent-escapes the placeholder separators (and `%` itself).
fn push_escaped(out: &mut String, part: &str) {
    for c in part.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            ':' => out.push_str("%3A"),
            c => out.push(c),
        }
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ExternalId> for String {
    fn from(id: ExternalId) -> Self {
        match id {
            ExternalId::Real(id) | ExternalId::Placeholder(id) => id,
        }
    }
}

impl From<String> for ExternalId {
    fn from(id: String) -> Self {
        Self::parse(id)
    }
}

/// Storage identity of a `SyncState`.
///
/// `name` is fixed when the record is created: the real identifier when it was
/// already known, otherwise the placeholder. Identity migration rewrites the
/// record's `external_id`, never its key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SyncStateKey {
    pub resource_type: ResourceType,
    pub name: String,
}

impl SyncStateKey {
    pub fn new(resource_type: ResourceType, name: impl Into<String>) -> Self {
        Self {
            resource_type,
            name: name.into(),
        }
    }
}

impl fmt::Display for SyncStateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.name)
    }
}
