//! State file structures for persisting resource state

use std::collections::HashMap;

use filess_core::resource::{ResourceId, State, Value};
use serde::{Deserialize, Serialize};

/// The main state file structure that persists to the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    /// State file format version
    pub version: u32,
    /// Monotonically increasing number for each state modification
    pub serial: u64,
    /// Unique identifier for this state lineage
    pub lineage: String,
    /// Version of filess that last modified this state
    pub filess_version: String,
    /// All managed resources and their last observed state
    pub resources: Vec<ResourceState>,
}

impl StateFile {
    /// Current state file format version
    pub const CURRENT_VERSION: u32 = 1;

    /// Create a new empty state file
    pub fn new() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            serial: 0,
            lineage: uuid::Uuid::new_v4().to_string(),
            filess_version: env!("CARGO_PKG_VERSION").to_string(),
            resources: Vec::new(),
        }
    }

    /// Increment serial and stamp the current version before a write
    pub fn increment_serial(&mut self) {
        self.serial += 1;
        self.filess_version = env!("CARGO_PKG_VERSION").to_string();
    }

    pub fn find_resource(&self, resource_type: &str, name: &str) -> Option<&ResourceState> {
        self.resources
            .iter()
            .find(|r| r.resource_type == resource_type && r.name == name)
    }

    fn find_resource_mut(&mut self, resource_type: &str, name: &str) -> Option<&mut ResourceState> {
        self.resources
            .iter_mut()
            .find(|r| r.resource_type == resource_type && r.name == name)
    }

    /// Add or replace a resource in the state
    pub fn upsert_resource(&mut self, resource: ResourceState) {
        if let Some(existing) = self.find_resource_mut(&resource.resource_type, &resource.name) {
            *existing = resource;
        } else {
            self.resources.push(resource);
        }
    }

    /// Remove a resource from the state
    pub fn remove_resource(&mut self, resource_type: &str, name: &str) -> Option<ResourceState> {
        let pos = self
            .resources
            .iter()
            .position(|r| r.resource_type == resource_type && r.name == name)?;
        Some(self.resources.remove(pos))
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a single managed resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Resource type (e.g., "filess_database")
    pub resource_type: String,
    /// Resource name (key in the configuration file)
    pub name: String,
    /// Provider name (e.g., "filess")
    pub provider: String,
    /// Backend identifier used to address the resource
    pub identifier: String,
    /// All attributes of the resource as JSON values
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl ResourceState {
    pub fn new(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        provider: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            provider: provider.into(),
            identifier: identifier.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Record an existing provider state; `None` when it has no identifier
    pub fn from_state(state: &State, provider: &str) -> Option<Self> {
        let identifier = state.identifier.as_deref().filter(|_| state.exists)?;
        Some(Self {
            resource_type: state.id.resource_type.clone(),
            name: state.id.name.clone(),
            provider: provider.to_string(),
            identifier: identifier.to_string(),
            attributes: state
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        })
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(&self.resource_type, &self.name)
    }

    /// Stored attributes as provider values; nulls are dropped
    pub fn attribute_values(&self) -> HashMap<String, Value> {
        self.attributes
            .iter()
            .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
            .collect()
    }

    /// The stored state as last observed
    pub fn to_state(&self) -> State {
        State::existing(self.id(), self.attribute_values()).with_identifier(&self.identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_file_new() {
        let state = StateFile::new();
        assert_eq!(state.version, StateFile::CURRENT_VERSION);
        assert_eq!(state.serial, 0);
        assert!(!state.lineage.is_empty());
        assert!(state.resources.is_empty());
    }

    #[test]
    fn test_state_file_increment_serial() {
        let mut state = StateFile::new();
        state.increment_serial();
        state.increment_serial();
        assert_eq!(state.serial, 2);
    }

    #[test]
    fn test_state_file_upsert_and_remove() {
        let mut state = StateFile::new();

        state.upsert_resource(
            ResourceState::new("filess_database", "main", "filess", "501")
                .with_attribute("status", json!("creating")),
        );
        state.upsert_resource(
            ResourceState::new("filess_database", "main", "filess", "501")
                .with_attribute("status", json!("deployed")),
        );
        assert_eq!(state.resources.len(), 1);
        assert_eq!(
            state.find_resource("filess_database", "main").unwrap().attributes["status"],
            json!("deployed")
        );

        assert!(state.remove_resource("filess_database", "main").is_some());
        assert!(state.remove_resource("filess_database", "main").is_none());
        assert!(state.resources.is_empty());
    }

    #[test]
    fn test_resource_state_from_provider_state() {
        let id = ResourceId::new("filess_database", "main");
        let state = State::existing(
            id.clone(),
            HashMap::from([
                ("status".to_string(), Value::from("deployed")),
                ("database_service_port".to_string(), Value::from("3307")),
            ]),
        )
        .with_identifier("501");

        let stored = ResourceState::from_state(&state, "filess").unwrap();
        assert_eq!(stored.identifier, "501");
        assert_eq!(stored.attributes["status"], json!("deployed"));
        assert_eq!(stored.to_state(), state);

        assert!(ResourceState::from_state(&State::not_found(id), "filess").is_none());
    }

    #[test]
    fn test_state_file_serialization() {
        let mut state = StateFile::new();
        state.upsert_resource(
            ResourceState::new("filess_database", "main", "filess", "501")
                .with_attribute("database_plan", json!({"billable_items": [{"quantity": 2}]})),
        );

        let text = serde_json::to_string_pretty(&state).unwrap();
        let deserialized: StateFile = serde_json::from_str(&text).unwrap();

        assert_eq!(deserialized.lineage, state.lineage);
        assert_eq!(deserialized.resources, state.resources);
    }
}
