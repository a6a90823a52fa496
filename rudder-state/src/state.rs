//! State file structures for persisting infrastructure state
//!
//! A `ResourceState` is the last confirmed snapshot of one resource. It is
//! also the declared state store the reconciler consults: it answers whether
//! a field changed against a desired resource, and it owns the remote
//! identifier (set once on create, cleared when the resource is found gone).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use rudder_core::interpreter::{ApplyResult, EffectOutcome};
use rudder_core::resource::{Resource, ResourceId, State, Value};

/// The main state file structure that persists to the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    /// State file format version
    pub version: u32,
    /// Monotonically increasing number for each state modification
    pub serial: u64,
    /// Unique identifier for this state lineage (prevents accidental overwrites)
    pub lineage: String,
    /// Version of Rudder that last modified this state
    pub rudder_version: String,
    /// All managed resources and their last confirmed state
    pub resources: Vec<ResourceState>,
}

impl StateFile {
    /// Current state file format version
    pub const CURRENT_VERSION: u32 = 1;

    /// Create a new empty state file
    pub fn new() -> Self {
        Self::with_lineage(uuid::Uuid::new_v4().to_string())
    }

    /// Create a new state file with a specific lineage (for initialization)
    pub fn with_lineage(lineage: String) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            serial: 0,
            lineage,
            rudder_version: env!("CARGO_PKG_VERSION").to_string(),
            resources: Vec::new(),
        }
    }

    /// Increment serial and update rudder version for a new state write
    pub fn increment_serial(&mut self) {
        self.serial += 1;
        self.rudder_version = env!("CARGO_PKG_VERSION").to_string();
    }

    /// Find a resource by type and name
    pub fn find_resource(&self, resource_type: &str, name: &str) -> Option<&ResourceState> {
        self.resources
            .iter()
            .find(|r| r.resource_type == resource_type && r.name == name)
    }

    /// Find a resource mutably by type and name
    pub fn find_resource_mut(
        &mut self,
        resource_type: &str,
        name: &str,
    ) -> Option<&mut ResourceState> {
        self.resources
            .iter_mut()
            .find(|r| r.resource_type == resource_type && r.name == name)
    }

    /// Add or update a resource in the state
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

    /// All persisted resources as provider states, keyed by resource id
    pub fn current_states(&self) -> HashMap<ResourceId, State> {
        self.resources
            .iter()
            .map(|r| (r.resource_id(), r.to_state()))
            .collect()
    }

    /// Record the confirmed outcomes of an apply
    ///
    /// Only successful outcomes are recorded, so a failed step leaves the
    /// previously confirmed state of that resource untouched. Returns whether
    /// anything changed.
    pub fn record_apply(&mut self, provider: &str, result: &ApplyResult) -> bool {
        let mut changed = false;
        for outcome in result.successes() {
            changed |= self.record_outcome(provider, outcome);
        }
        if changed {
            self.increment_serial();
        }
        changed
    }

    fn record_outcome(&mut self, provider: &str, outcome: &EffectOutcome) -> bool {
        match outcome {
            EffectOutcome::Created { state }
            | EffectOutcome::Updated { state }
            | EffectOutcome::Replaced { state, .. } => {
                let protected = self
                    .find_resource(&state.id.resource_type, &state.id.name)
                    .is_some_and(|r| r.protected);
                self.upsert_resource(
                    ResourceState::from_state(provider, state).with_protected(protected),
                );
                true
            }
            EffectOutcome::Read { state } if state.exists => {
                let Some(existing) = self.find_resource_mut(&state.id.resource_type, &state.id.name)
                else {
                    return false;
                };
                let refreshed = ResourceState::from_state(provider, state)
                    .with_protected(existing.protected);
                *existing = refreshed;
                true
            }
            EffectOutcome::Read { state } => {
                // Drift: the remote entity is gone, forget its identifier
                log::warn!("{} was deleted outside of rudder", state.id);
                self.remove_resource(&state.id.resource_type, &state.id.name)
                    .is_some()
            }
            EffectOutcome::Deleted { id } => self
                .remove_resource(&id.resource_type, &id.name)
                .is_some(),
            EffectOutcome::Skipped { .. } => false,
        }
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a single managed resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    /// Resource type (e.g., "route_table")
    pub resource_type: String,
    /// Resource name (binding given by the caller)
    pub name: String,
    /// Provider name (e.g., "apsarastack")
    pub provider: String,
    /// Remote identifier, assigned once at creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// All attributes of the resource as JSON values
    pub attributes: HashMap<String, serde_json::Value>,
    /// Whether this resource is protected from deletion
    #[serde(default)]
    pub protected: bool,
}

impl ResourceState {
    /// Create a new resource state
    pub fn new(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            provider: provider.into(),
            identifier: None,
            attributes: HashMap::new(),
            protected: false,
        }
    }

    /// Snapshot a confirmed provider state
    pub fn from_state(provider: impl Into<String>, state: &State) -> Self {
        let attributes = state
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), value_to_json(v)))
            .collect();
        Self {
            resource_type: state.id.resource_type.clone(),
            name: state.id.name.clone(),
            provider: provider.into(),
            identifier: state.identifier.clone(),
            attributes,
            protected: false,
        }
    }

    /// Set an attribute value
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Mark this resource as protected
    pub fn with_protected(mut self, protected: bool) -> Self {
        self.protected = protected;
        self
    }

    pub fn resource_id(&self) -> ResourceId {
        ResourceId::new(&self.resource_type, &self.name)
    }

    /// Convert back into a provider state
    pub fn to_state(&self) -> State {
        let attributes = self
            .attributes
            .iter()
            .filter_map(|(k, v)| json_to_value(v).map(|v| (k.clone(), v)))
            .collect();
        let state = State::existing(self.resource_id(), attributes);
        match &self.identifier {
            Some(identifier) => state.with_identifier(identifier),
            None => state,
        }
    }

    // ---- declared state store queries ----

    /// The remote identifier, if the resource has been created
    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    /// Record the identifier assigned at creation
    ///
    /// The identifier is write-once: setting a different one on a resource
    /// that already has an identifier is refused.
    pub fn set_identifier(&mut self, identifier: impl Into<String>) -> Result<(), String> {
        let identifier = identifier.into();
        match &self.identifier {
            Some(existing) if *existing != identifier => Err(format!(
                "{} already has identifier {}, refusing to replace it with {}",
                self.resource_id(),
                existing,
                identifier
            )),
            _ => {
                self.identifier = Some(identifier);
                Ok(())
            }
        }
    }

    /// Forget the identifier after the resource was found deleted
    pub fn clear_identifier(&mut self) -> Option<String> {
        self.identifier.take()
    }

    /// Whether `field` differs between the persisted snapshot and `desired`
    ///
    /// Same comparison the planner uses; an unset field and an empty
    /// collection are equal.
    pub fn has_field_changed(&self, field: &str, desired: &Resource) -> bool {
        self.to_state().has_field_changed(field, desired)
    }
}

/// Convert a DSL value into its persisted JSON form
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::List(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Map(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
        Value::ResourceRef(binding, attr) => {
            serde_json::Value::String(format!("${{{}.{}}}", binding, attr))
        }
    }
}

/// Convert a persisted JSON value back into a DSL value
pub fn json_to_value(value: &serde_json::Value) -> Option<Value> {
    match value {
        serde_json::Value::String(s) => Some(Value::String(s.clone())),
        serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
        serde_json::Value::Number(n) => n.as_i64().map(Value::Int),
        serde_json::Value::Array(arr) => Some(Value::List(
            arr.iter().filter_map(json_to_value).collect(),
        )),
        serde_json::Value::Object(map) => Some(Value::Map(
            map.iter()
                .filter_map(|(k, v)| json_to_value(v).map(|v| (k.clone(), v)))
                .collect(),
        )),
        serde_json::Value::Null => None,
    }
}
