//! State type representing an entity's current state

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The state of an entity at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    /// The entity this state belongs to (e.g., "light.hallway")
    pub entity_id: String,

    /// The state value (e.g., "on", "off", "23.5")
    pub state: String,

    /// Additional attributes associated with the state
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,

    /// When the state value last changed
    pub last_changed: DateTime<Utc>,

    /// When the state was last written, even if unchanged
    pub last_updated: DateTime<Utc>,
}

impl State {
    /// Create a new state with current timestamp
    pub fn new(
        entity_id: impl Into<String>,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            entity_id: entity_id.into(),
            state: truncate_state(state.into()),
            attributes,
            last_changed: now,
            last_updated: now,
        }
    }

    /// Create an updated state, preserving last_changed if the value is the same
    pub fn with_update(
        &self,
        new_state: impl Into<String>,
        new_attributes: HashMap<String, serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        let new_state = truncate_state(new_state.into());
        let state_changed = self.state != new_state;

        Self {
            entity_id: self.entity_id.clone(),
            state: new_state,
            attributes: new_attributes,
            last_changed: if state_changed {
                now
            } else {
                self.last_changed
            },
            last_updated: now,
        }
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        // Timestamps are not compared
        self.entity_id == other.entity_id
            && self.state == other.state
            && self.attributes == other.attributes
    }
}

fn truncate_state(state: String) -> String {
    if state.len() > crate::MAX_STATE_LENGTH {
        crate::STATE_UNKNOWN.to_string()
    } else {
        state
    }
}
