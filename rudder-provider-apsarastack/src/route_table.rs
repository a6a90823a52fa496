//! Route table model
//!
//! [`RouteTableSpec`] is the desired state the caller declares,
//! [`RouteTableState`] what the control plane reports back, and
//! [`Changeset`] the in-place difference between two specs.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use rudder_core::provider::{ProviderError, ProviderResult};
use rudder_core::resource::Value;

use crate::client::ModifyRouteTableAttributesRequest;
use crate::resources::route_table_schema;
use crate::tags::{Tags, tags_from_value, tags_to_value};
use crate::utils::non_empty;

/// Route table status as reported by the control plane
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RouteTableStatus {
    Pending,
    Available,
    Deleting,
    Deleted,
    /// A status this client does not know, preserved verbatim
    Unknown(String),
}

impl RouteTableStatus {
    pub fn as_str(&self) -> &str {
        match self {
            RouteTableStatus::Pending => "Pending",
            RouteTableStatus::Available => "Available",
            RouteTableStatus::Deleting => "Deleting",
            RouteTableStatus::Deleted => "Deleted",
            RouteTableStatus::Unknown(s) => s,
        }
    }
}

impl From<&str> for RouteTableStatus {
    fn from(s: &str) -> Self {
        match s {
            "Pending" => RouteTableStatus::Pending,
            "Available" => RouteTableStatus::Available,
            "Deleting" => RouteTableStatus::Deleting,
            "Deleted" => RouteTableStatus::Deleted,
            other => RouteTableStatus::Unknown(other.to_string()),
        }
    }
}

impl From<String> for RouteTableStatus {
    fn from(s: String) -> Self {
        RouteTableStatus::from(s.as_str())
    }
}

impl From<RouteTableStatus> for String {
    fn from(status: RouteTableStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for RouteTableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Desired state of a route table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTableSpec {
    /// Parent VPC; fixed for the life of the route table
    pub vpc_id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Tags,
}

impl RouteTableSpec {
    pub fn new(vpc_id: impl Into<String>) -> Self {
        Self {
            vpc_id: vpc_id.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Check names, lengths and tags against the route table schema
    pub fn validate(&self) -> ProviderResult<()> {
        route_table_schema()
            .validate(&self.to_attributes())
            .map_err(|errors| {
                let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
                ProviderError::validation(format!(
                    "invalid route table: {}",
                    messages.join("; ")
                ))
            })
    }

    /// Build a spec from resource attributes
    ///
    /// Read-only attributes are ignored. References must already be resolved.
    pub fn from_attributes(attributes: &HashMap<String, Value>) -> ProviderResult<Self> {
        let vpc_id = match attributes.get("vpc_id") {
            Some(value) => string_attribute("vpc_id", value)?,
            None => return Err(ProviderError::validation("vpc_id is required")),
        };
        let name = attributes
            .get("name")
            .map(|v| string_attribute("name", v))
            .transpose()?;
        let description = attributes
            .get("description")
            .map(|v| string_attribute("description", v))
            .transpose()?;
        let tags = match attributes.get("tags") {
            Some(value) => tags_from_value(value).map_err(ProviderError::validation)?,
            None => Tags::new(),
        };

        Ok(Self {
            vpc_id,
            name,
            description,
            tags,
        })
    }

    pub fn to_attributes(&self) -> HashMap<String, Value> {
        let mut attributes = HashMap::new();
        attributes.insert("vpc_id".to_string(), Value::from(self.vpc_id.as_str()));
        if let Some(name) = &self.name {
            attributes.insert("name".to_string(), Value::from(name.as_str()));
        }
        if let Some(description) = &self.description {
            attributes.insert("description".to_string(), Value::from(description.as_str()));
        }
        if !self.tags.is_empty() {
            attributes.insert("tags".to_string(), tags_to_value(&self.tags));
        }
        attributes
    }
}

fn string_attribute(name: &str, value: &Value) -> ProviderResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::ResourceRef(binding, attr) => Err(ProviderError::validation(format!(
            "{} references {}.{}, which has not been resolved",
            name, binding, attr
        ))),
        other => Err(ProviderError::validation(format!(
            "{} must be a string, got {}",
            name,
            other.type_name()
        ))),
    }
}

/// Observed state of a route table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTableState {
    pub id: String,
    pub status: RouteTableStatus,
    pub vpc_id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Tags,
    pub route_table_type: Option<String>,
    pub router_id: Option<String>,
    pub creation_time: Option<String>,
}

impl RouteTableState {
    pub fn is_available(&self) -> bool {
        self.status == RouteTableStatus::Available
    }

    /// The declarable part of the observed state
    pub fn spec(&self) -> RouteTableSpec {
        RouteTableSpec {
            vpc_id: self.vpc_id.clone(),
            name: non_empty(self.name.clone()),
            description: non_empty(self.description.clone()),
            tags: self.tags.clone(),
        }
    }

    /// Declarable attributes plus the read-only ones the control plane reports
    pub fn to_attributes(&self) -> HashMap<String, Value> {
        let mut attributes = self.spec().to_attributes();
        let computed = [
            ("route_table_type", &self.route_table_type),
            ("router_id", &self.router_id),
            ("creation_time", &self.creation_time),
        ];
        for (key, value) in computed {
            if let Some(value) = non_empty(value.clone()) {
                attributes.insert(key.to_string(), Value::String(value));
            }
        }
        attributes
    }
}

/// In-place changes between two specs of the same route table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changeset {
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags_changed: bool,
}

impl Changeset {
    /// Diff `from` against `to`
    ///
    /// Fails with an immutable-field error when `vpc_id` differs. Clearing
    /// `name` or `description` cannot be expressed by the modify action, so a
    /// cleared field is left as it is remotely.
    pub fn diff(from: &RouteTableSpec, to: &RouteTableSpec) -> ProviderResult<Self> {
        if from.vpc_id != to.vpc_id {
            return Err(ProviderError::immutable_field("vpc_id"));
        }

        Ok(Self {
            name: changed_field("name", &from.name, &to.name),
            description: changed_field("description", &from.description, &to.description),
            tags_changed: from.tags != to.tags,
        })
    }

    /// Whether the modify action has anything to send
    pub fn has_attribute_changes(&self) -> bool {
        self.name.is_some() || self.description.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_attribute_changes() && !self.tags_changed
    }

    /// The modify request carrying only the changed fields, if any
    pub fn into_modify_request(
        self,
        region_id: &str,
        route_table_id: &str,
    ) -> Option<ModifyRouteTableAttributesRequest> {
        if !self.has_attribute_changes() {
            return None;
        }
        Some(ModifyRouteTableAttributesRequest {
            region_id: region_id.to_string(),
            route_table_id: route_table_id.to_string(),
            route_table_name: self.name,
            description: self.description,
        })
    }
}

fn changed_field(field: &str, from: &Option<String>, to: &Option<String>) -> Option<String> {
    match (from, to) {
        (_, Some(to)) if from.as_ref() != Some(to) => Some(to.clone()),
        (Some(_), None) => {
            log::warn!(
                "clearing {} is not supported by the control plane, keeping the current value",
                field
            );
            None
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rudder_core::provider::ErrorKind;

    fn spec() -> RouteTableSpec {
        RouteTableSpec::new("vpc-1")
            .with_name("private")
            .with_description("private subnets")
            .with_tag("env", "prod")
    }

    #[test]
    fn test_status_roundtrip_preserves_unknown() {
        assert_eq!(RouteTableStatus::from("Available"), RouteTableStatus::Available);
        let status = RouteTableStatus::from("Updating");
        assert_eq!(status, RouteTableStatus::Unknown("Updating".to_string()));
        assert_eq!(status.to_string(), "Updating");

        let json = serde_json::to_string(&RouteTableStatus::Pending).unwrap();
        assert_eq!(json, "\"Pending\"");
    }

    #[test]
    fn test_spec_validate() {
        assert!(spec().validate().is_ok());
        assert!(RouteTableSpec::new("vpc-1").validate().is_ok());

        let err = spec().with_name("a").validate().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(err.message.contains("name"));

        assert!(spec().with_name("n".repeat(128)).validate().is_ok());
        assert!(spec().with_name("n".repeat(129)).validate().is_err());
        assert!(spec().with_description("d").validate().is_err());
        assert!(spec().with_description("d".repeat(257)).validate().is_err());
        assert!(RouteTableSpec::new("").validate().is_err());
        assert!(spec().with_tag("", "x").validate().is_err());
    }

    #[test]
    fn test_spec_attributes() {
        let attributes = spec().to_attributes();
        assert_eq!(attributes.get("vpc_id"), Some(&Value::from("vpc-1")));
        assert_eq!(RouteTableSpec::from_attributes(&attributes).unwrap(), spec());

        let mut unresolved = attributes.clone();
        unresolved.insert(
            "vpc_id".to_string(),
            Value::ResourceRef("main".to_string(), "id".to_string()),
        );
        assert!(RouteTableSpec::from_attributes(&unresolved).is_err());

        assert!(RouteTableSpec::from_attributes(&HashMap::new()).is_err());
    }

    #[test]
    fn test_state_attributes_include_read_only() {
        let state = RouteTableState {
            id: "vtb-1".to_string(),
            status: RouteTableStatus::Available,
            vpc_id: "vpc-1".to_string(),
            name: Some(String::new()),
            description: None,
            tags: Tags::new(),
            route_table_type: Some("Custom".to_string()),
            router_id: Some("vrt-1".to_string()),
            creation_time: None,
        };
        let attributes = state.to_attributes();
        assert_eq!(attributes.get("router_id"), Some(&Value::from("vrt-1")));
        assert!(!attributes.contains_key("name"));
        assert!(!attributes.contains_key("creation_time"));
        assert_eq!(state.spec(), RouteTableSpec::new("vpc-1"));
    }

    #[test]
    fn test_changeset_only_changed_fields() {
        let to = spec().with_description("shared");
        let changeset = Changeset::diff(&spec(), &to).unwrap();
        assert_eq!(changeset.name, None);
        assert_eq!(changeset.description.as_deref(), Some("shared"));
        assert!(!changeset.tags_changed);

        let request = changeset.into_modify_request("cn-qingdao", "vtb-1").unwrap();
        assert_eq!(request.route_table_name, None);
        assert_eq!(request.description.as_deref(), Some("shared"));
    }

    #[test]
    fn test_changeset_tags_only() {
        let changeset = Changeset::diff(&spec(), &spec().with_tag("team", "net")).unwrap();
        assert!(changeset.tags_changed);
        assert!(!changeset.has_attribute_changes());
        assert!(changeset.into_modify_request("cn-qingdao", "vtb-1").is_none());

        assert!(Changeset::diff(&spec(), &spec()).unwrap().is_empty());
    }

    #[test]
    fn test_changeset_cleared_field_is_not_sent() {
        let mut to = spec();
        to.description = None;
        let changeset = Changeset::diff(&spec(), &to).unwrap();
        assert!(changeset.is_empty());
    }

    #[test]
    fn test_changeset_rejects_vpc_change() {
        let mut to = spec();
        to.vpc_id = "vpc-2".to_string();
        let err = Changeset::diff(&spec(), &to).unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::ImmutableFieldChange {
                field: "vpc_id".to_string()
            }
        );
    }
}
