//! Scenes: named sets of entity states applied together

use dashmap::DashMap;
use hub_core::State;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::StateStore;

#[derive(Debug, Clone, Error)]
pub enum SceneError {
    #[error("scene not found: {0}")]
    NotFound(String),

    #[error("scene {0} has no entities")]
    Empty(String),
}

/// A scene definition: entity_id → target state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scene {
    pub name: String,
    #[serde(default)]
    pub entities: HashMap<String, String>,
}

/// Registry of scenes that `run_scene` actions activate
#[derive(Default)]
pub struct SceneRegistry {
    scenes: DashMap<String, Scene>,
}

impl SceneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define (or redefine) a scene
    pub fn define(&self, scene: Scene) {
        debug!(scene = %scene.name, entities = scene.entities.len(), "Defining scene");
        self.scenes.insert(scene.name.clone(), scene);
    }

    pub fn get(&self, name: &str) -> Option<Scene> {
        self.scenes.get(name).map(|s| s.clone())
    }

    pub fn remove(&self, name: &str) -> Option<Scene> {
        self.scenes.remove(name).map(|(_, s)| s)
    }

    /// Scene names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.scenes.iter().map(|s| s.key().clone()).collect();
        names.sort();
        names
    }

    /// Apply every entity state of the scene to the store
    ///
    /// Entities are applied in entity_id order so activation is deterministic.
    pub fn activate(&self, name: &str, store: &StateStore) -> Result<Vec<State>, SceneError> {
        let scene = self
            .get(name)
            .ok_or_else(|| SceneError::NotFound(name.to_string()))?;

        if scene.entities.is_empty() {
            return Err(SceneError::Empty(name.to_string()));
        }

        let mut entities: Vec<_> = scene.entities.iter().collect();
        entities.sort();

        let applied: Vec<State> = entities
            .into_iter()
            .map(|(entity_id, state)| store.set(entity_id, state.clone(), HashMap::new()))
            .collect();

        info!(scene = %name, entities = applied.len(), "Scene activated");
        Ok(applied)
    }
}
