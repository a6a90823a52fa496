//! Effect - A single side effect to be performed against a Provider

use crate::resource::{Resource, ResourceId, State};

/// An operation the Interpreter will perform
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Refresh a resource by its remote identifier
    Read { id: ResourceId, identifier: String },
    /// Create a resource that does not exist yet
    Create(Resource),
    /// Update an existing resource in place
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Delete an existing resource, then create it again from the desired state
    Replace {
        from: State,
        to: Resource,
        /// Attributes that cannot be changed in place
        reasons: Vec<String>,
    },
    /// Delete a resource by its remote identifier
    Delete { id: ResourceId, identifier: String },
}

impl Effect {
    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Effect::Read { id, .. } => id,
            Effect::Create(resource) => &resource.id,
            Effect::Update { id, .. } => id,
            Effect::Replace { to, .. } => &to.id,
            Effect::Delete { id, .. } => id,
        }
    }

    /// Whether this Effect mutates remote state
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Effect::Read { .. })
    }
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::Read { id, identifier } => write!(f, "read {} ({})", id, identifier),
            Effect::Create(resource) => write!(f, "create {}", resource.id),
            Effect::Update {
                id,
                changed_attributes,
                ..
            } => write!(f, "update {} [{}]", id, changed_attributes.join(", ")),
            Effect::Replace { to, reasons, .. } => {
                write!(f, "replace {} (forced by {})", to.id, reasons.join(", "))
            }
            Effect::Delete { id, identifier } => write!(f, "delete {} ({})", id, identifier),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_is_not_mutating() {
        let read = Effect::Read {
            id: ResourceId::new("route_table", "rt"),
            identifier: "vtb-1".to_string(),
        };
        assert!(!read.is_mutating());
        assert!(Effect::Create(Resource::new("route_table", "rt")).is_mutating());
    }

    #[test]
    fn display_replace() {
        let effect = Effect::Replace {
            from: State::not_found(ResourceId::new("route_table", "rt")),
            to: Resource::new("route_table", "rt"),
            reasons: vec!["vpc_id".to_string()],
        };
        assert_eq!(
            effect.to_string(),
            "replace route_table.rt (forced by vpc_id)"
        );
        assert_eq!(effect.resource_id().name, "rt");
    }
}
