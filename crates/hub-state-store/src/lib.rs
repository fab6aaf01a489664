//! Entity state storage for the automation hub
//!
//! This crate provides the StateStore written by `set_state` actions and
//! the [`SceneRegistry`] used by `run_scene` actions.

mod scene;

pub use scene::{Scene, SceneError, SceneRegistry};

use dashmap::DashMap;
use hub_core::State;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Current state of every entity written by `set_state` and `run_scene`
#[derive(Default)]
pub struct StateStore {
    states: DashMap<String, State>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the state of an entity
    ///
    /// An unchanged state value keeps its `last_changed` timestamp.
    #[instrument(skip(self, state, attributes))]
    pub fn set(
        &self,
        entity_id: &str,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
    ) -> State {
        let new_state = match self.states.get(entity_id) {
            Some(existing) => existing.with_update(state, attributes),
            None => State::new(entity_id, state, attributes),
        };

        debug!(state = %new_state.state, "Setting entity state");
        self.states.insert(entity_id.to_string(), new_state.clone());
        new_state
    }

    pub fn get(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    /// State value only
    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.states.get(entity_id).map(|s| s.state.clone())
    }

    pub fn is_state(&self, entity_id: &str, state: &str) -> bool {
        self.get_state(entity_id).as_deref() == Some(state)
    }

    /// Every state, ordered by entity_id
    pub fn all(&self) -> Vec<State> {
        let mut states: Vec<State> = self.states.iter().map(|r| r.value().clone()).collect();
        states.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        states
    }

    pub fn entity_count(&self) -> usize {
        self.states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_and_get() {
        let store = StateStore::new();
        store.set("light.hallway", "on", HashMap::new());

        assert!(store.is_state("light.hallway", "on"));
        assert!(!store.is_state("light.kitchen", "on"));
        assert_eq!(store.entity_count(), 1);
    }

    #[test]
    fn test_update_keeps_entity_count_and_attributes() {
        let store = StateStore::new();
        store.set("light.hallway", "on", HashMap::new());
        let updated = store.set(
            "light.hallway",
            "off",
            HashMap::from([("brightness".to_string(), json!(0))]),
        );

        assert_eq!(updated.state, "off");
        assert_eq!(updated.attributes["brightness"], json!(0));
        assert_eq!(store.entity_count(), 1);
    }

    #[test]
    fn test_all_is_sorted() {
        let store = StateStore::new();
        store.set("switch.fan", "on", HashMap::new());
        store.set("light.kitchen", "off", HashMap::new());

        let ids: Vec<String> = store.all().into_iter().map(|s| s.entity_id).collect();
        assert_eq!(ids, vec!["light.kitchen", "switch.fan"]);
    }
}
