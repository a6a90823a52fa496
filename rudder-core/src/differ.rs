//! Differ - Compare desired state with current state to generate a Plan
//!
//! Compares the desired state declared by the caller with the state last
//! persisted (or freshly read), and generates the Effects required to
//! converge them.

use std::collections::{BTreeSet, HashMap};

use crate::effect::Effect;
use crate::plan::Plan;
use crate::resource::{Resource, ResourceId, State};
use crate::schema::ResourceSchema;

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with differences -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists but an immutable attribute changed -> delete and create
    Replace {
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
        forced_by: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
    /// Resource exists but not in desired state -> needs deletion
    Delete(ResourceId),
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Compare desired state with current state to compute a Diff
///
/// When a schema is given, computed attributes are ignored and attributes
/// marked `force_new` turn an update into a replacement.
pub fn diff(desired: &Resource, current: &State, schema: Option<&ResourceSchema>) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let changed = find_changed_attributes(desired, current, schema);

    if changed.is_empty() {
        return Diff::NoChange(desired.id.clone());
    }

    let forced_by: Vec<String> = match schema {
        Some(schema) => {
            let force_new = schema.force_new_attributes();
            changed
                .iter()
                .filter(|name| force_new.contains(&name.as_str()))
                .cloned()
                .collect()
        }
        None => Vec::new(),
    };

    if forced_by.is_empty() {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    } else {
        Diff::Replace {
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
            forced_by,
        }
    }
}

/// Find changed attributes between desired and current state
///
/// Without a schema only the desired keys are compared. With a schema every
/// configurable attribute is compared, so removing an attribute from the
/// desired state is also a change. An unset attribute and an empty collection
/// compare equal.
fn find_changed_attributes(
    desired: &Resource,
    current: &State,
    schema: Option<&ResourceSchema>,
) -> Vec<String> {
    let mut keys: BTreeSet<&str> = desired.attributes.keys().map(String::as_str).collect();
    if let Some(schema) = schema {
        keys.extend(schema.configurable_attributes());
    }

    keys.into_iter()
        // Skip internal attributes (starting with _)
        .filter(|key| !key.starts_with('_'))
        .filter(|key| !schema.is_some_and(|s| s.is_computed(key)))
        .filter(|key| current.has_field_changed(key, desired))
        .map(str::to_string)
        .collect()
}

/// Compute Diff for multiple resources and generate a Plan
///
/// Resources present in `current_states` but absent from `desired` are
/// planned for deletion.
pub fn create_plan(
    desired: &[Resource],
    current_states: &HashMap<ResourceId, State>,
    schemas: &HashMap<String, ResourceSchema>,
) -> Plan {
    let mut plan = Plan::new();

    for resource in desired {
        let current = current_states
            .get(&resource.id)
            .cloned()
            .unwrap_or_else(|| State::not_found(resource.id.clone()));

        let schema = schemas.get(&resource.id.resource_type);

        match diff(resource, &current, schema) {
            Diff::Create(r) => plan.add(Effect::Create(r)),
            Diff::Update {
                id,
                from,
                to,
                changed_attributes,
            } => plan.add(Effect::Update {
                id,
                from,
                to,
                changed_attributes,
            }),
            Diff::Replace {
                from, to, forced_by, ..
            } => plan.add(Effect::Replace {
                from,
                to,
                reasons: forced_by,
            }),
            Diff::NoChange(_) => {}
            Diff::Delete(_) => {}
        }
    }

    let mut orphans: Vec<&State> = current_states
        .values()
        .filter(|s| s.exists && !desired.iter().any(|r| r.id == s.id))
        .collect();
    orphans.sort_by(|a, b| a.id.cmp(&b.id));

    for state in orphans {
        match &state.identifier {
            Some(identifier) => plan.add(Effect::Delete {
                id: state.id.clone(),
                identifier: identifier.clone(),
            }),
            None => log::warn!(
                "{} is no longer declared but has no identifier, skipping delete",
                state.id
            ),
        }
    }

    plan
}

/// Plan a refresh of every persisted resource that has an identifier
pub fn refresh_plan(current_states: &HashMap<ResourceId, State>) -> Plan {
    let mut plan = Plan::new();
    let mut states: Vec<&State> = current_states.values().collect();
    states.sort_by(|a, b| a.id.cmp(&b.id));

    for state in states {
        if let Some(identifier) = &state.identifier {
            plan.add(Effect::Read {
                id: state.id.clone(),
                identifier: identifier.clone(),
            });
        }
    }
    plan
}
