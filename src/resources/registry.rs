// src/resources/registry.rs
//! In-memory resource store
//!
//! Plain CRUD over registered resources. Callers outside the engine only
//! ever see clones; the engine mutates entries through `get_mut` while it
//! holds its state lock.

use crate::resources::model::{Resource, ResourceId, ResourceSpec, ResourceType};
use crate::utils::errors::{EngineError, Result};
use std::collections::BTreeMap;
use tracing::debug;
use ulid::Ulid;

/// Resource table keyed by id
///
/// Ids are ULIDs, so iteration order follows registration order.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    resources: BTreeMap<ResourceId, Resource>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store a new resource
    pub fn register(&mut self, spec: ResourceSpec) -> Result<ResourceId> {
        if spec.name.trim().is_empty() {
            return Err(EngineError::Validation("Resource name cannot be empty".to_string()));
        }
        spec.capacity.validate()?;
        if !spec.cost.is_finite() || spec.cost < 0.0 {
            return Err(EngineError::Validation(format!(
                "Resource cost must be a non-negative number, got {}",
                spec.cost
            )));
        }

        let id = format!("res_{}", Ulid::new());
        debug!("Registering {} resource '{}' as {}", spec.resource_type, spec.name, id);

        self.resources.insert(id.clone(), Resource::new(id.clone(), spec));
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Result<&Resource> {
        self.resources
            .get(id)
            .ok_or_else(|| EngineError::ResourceNotFound(id.to_string()))
    }

    pub fn get_mut(&mut self, id: &str) -> Result<&mut Resource> {
        self.resources
            .get_mut(id)
            .ok_or_else(|| EngineError::ResourceNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.resources.contains_key(id)
    }

    pub fn remove(&mut self, id: &str) -> Result<Resource> {
        self.resources
            .remove(id)
            .ok_or_else(|| EngineError::ResourceNotFound(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Resource> {
        self.resources.values_mut()
    }

    pub fn ids(&self) -> Vec<ResourceId> {
        self.resources.keys().cloned().collect()
    }

    pub fn all(&self) -> Vec<Resource> {
        self.resources.values().cloned().collect()
    }

    pub fn by_type(&self, resource_type: ResourceType) -> Vec<Resource> {
        self.resources
            .values()
            .filter(|r| r.resource_type == resource_type)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
