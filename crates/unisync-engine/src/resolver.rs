//! Resolving references to external identifiers.
//!
//! A reference is resolved by the first tier it populates:
//! 1. an explicit external identifier, used verbatim;
//! 2. the name of a local declared object, which must already carry a real
//!    external identifier;
//! 3. a display-name lookup in the external system, which must match exactly one
//!    resource.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use unisync_core::{ApiContext, DynExternalApi, ExternalId, ResourceType};
use unisync_storage::DynStorage;

use crate::error::ResolveError;

/// A reference as written by a contributor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl ResourceRef {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn by_display_name(display_name: impl Into<String>) -> Self {
        Self {
            display_name: Some(display_name.into()),
            ..Default::default()
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// State of a local declared object as seen by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalObject {
    Missing,
    /// Exists but has no real external identifier yet.
    Pending,
    Ready(String),
}

/// Finds local declared objects by name.
#[async_trait]
pub trait ObjectLookup: Send + Sync {
    async fn find(
        &self,
        resource_type: ResourceType,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<LocalObject, ResolveError>;
}

/// Looks objects up through the `SyncState` records they contribute to.
///
/// An object named `name` is the owner of a source on a record of the
/// requested type; its external identifier is that record's. A name that
/// matches owners on more than one record is ambiguous; the namespace
/// narrows the match when given.
pub struct SyncStateObjectLookup {
    storage: DynStorage,
}

impl SyncStateObjectLookup {
    pub fn new(storage: DynStorage) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl ObjectLookup for SyncStateObjectLookup {
    async fn find(
        &self,
        resource_type: ResourceType,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<LocalObject, ResolveError> {
        let states = self
            .storage
            .list(Some(resource_type))
            .await
            .map_err(|e| ResolveError::Lookup(e.to_string()))?;

        let mut owned: Vec<_> = states
            .into_iter()
            .filter(|state| {
                state.sources.iter().any(|s| {
                    s.owner_ref.name == name
                        && namespace.is_none_or(|ns| s.owner_ref.namespace == ns)
                })
            })
            .collect();

        if owned.len() > 1 {
            return Err(ResolveError::AmbiguousObject {
                name: match namespace {
                    Some(ns) => format!("{ns}/{name}"),
                    None => name.to_string(),
                },
                count: owned.len(),
            });
        }

        Ok(match owned.pop().map(|s| s.external_id) {
            None => LocalObject::Missing,
            Some(ExternalId::Placeholder(_)) => LocalObject::Pending,
            Some(ExternalId::Real(id)) => LocalObject::Ready(id),
        })
    }
}

/// Outcome of [`ReferenceResolver::resolve_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolved {
    /// Distinct identifiers in first-seen order.
    pub ids: Vec<String>,
    /// Failures by index into the input.
    pub errors: Vec<(usize, ResolveError)>,
}

impl Resolved {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct ReferenceResolver {
    objects: Arc<dyn ObjectLookup>,
    api: DynExternalApi,
    timeout: Duration,
}

impl ReferenceResolver {
    pub fn new(objects: Arc<dyn ObjectLookup>, api: DynExternalApi, timeout: Duration) -> Self {
        Self {
            objects,
            api,
            timeout,
        }
    }

    /// Resolves one reference. Never returns an empty identifier.
    pub async fn resolve(
        &self,
        ctx: &ApiContext,
        resource_type: ResourceType,
        reference: &ResourceRef,
    ) -> Result<String, ResolveError> {
        if let Some(id) = non_empty(&reference.id) {
            return Ok(id.to_string());
        }

        if let Some(name) = non_empty(&reference.name) {
            let namespace = non_empty(&reference.namespace);
            let qualified = match namespace {
                Some(ns) => format!("{ns}/{name}"),
                None => name.to_string(),
            };
            return match self.objects.find(resource_type, namespace, name).await? {
                LocalObject::Ready(id) if !id.is_empty() => Ok(id),
                LocalObject::Ready(_) | LocalObject::Pending => {
                    Err(ResolveError::NotReady { name: qualified })
                }
                LocalObject::Missing => Err(ResolveError::ObjectNotFound { name: qualified }),
            };
        }

        if let Some(display_name) = non_empty(&reference.display_name) {
            return self.resolve_display_name(ctx, resource_type, display_name).await;
        }

        Err(ResolveError::EmptyReference)
    }

    async fn resolve_display_name(
        &self,
        ctx: &ApiContext,
        resource_type: ResourceType,
        display_name: &str,
    ) -> Result<String, ResolveError> {
        let listed = tokio::time::timeout(
            self.timeout,
            self.api.list_by_name(ctx, resource_type, display_name),
        )
        .await
        .map_err(|_| ResolveError::Lookup(format!("listing {resource_type} timed out")))?
        .map_err(|e| ResolveError::Lookup(e.to_string()))?;

        let mut matches = listed
            .into_iter()
            .filter(|r| r.name.as_deref() == Some(display_name) && !r.id.is_empty());

        match (matches.next(), matches.next()) {
            (Some(found), None) => Ok(found.id),
            (None, _) => Err(ResolveError::NoMatch {
                resource_type,
                name: display_name.to_string(),
            }),
            (Some(_), Some(_)) => Err(ResolveError::Ambiguous {
                resource_type,
                name: display_name.to_string(),
                count: 2 + matches.count(),
            }),
        }
    }

    /// Resolves every reference, collecting failures instead of stopping at
    /// the first one.
    pub async fn resolve_all(
        &self,
        ctx: &ApiContext,
        resource_type: ResourceType,
        references: &[ResourceRef],
    ) -> Resolved {
        let mut resolved = Resolved::default();
        let mut seen = HashSet::new();

        for (index, reference) in references.iter().enumerate() {
            match self.resolve(ctx, resource_type, reference).await {
                Ok(id) => {
                    if seen.insert(id.clone()) {
                        resolved.ids.push(id);
                    }
                }
                Err(e) => resolved.errors.push((index, e)),
            }
        }

        resolved
    }
}
