//! Resource type definitions for the ApsaraStack provider
//!
//! This module defines:
//! - The `route_table` resource type (implementing the ResourceType trait)
//! - Its attribute schema, including length limits and read-only attributes

use rudder_core::provider::ResourceType;
use rudder_core::resource::Value;
use rudder_core::schema::{AttributeSchema, AttributeType, ResourceSchema, validate_string_length};

use crate::tags::{Tags, tags_from_value, validate_tags};

pub const ROUTE_TABLE: &str = "route_table";

/// Route table name type (2-128 characters)
pub fn route_table_name() -> AttributeType {
    AttributeType::Custom {
        name: "RouteTableName".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| validate_string_length(value, 2, 128),
    }
}

/// Route table description type (2-256 characters)
pub fn description() -> AttributeType {
    AttributeType::Custom {
        name: "Description".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| validate_string_length(value, 2, 256),
    }
}

/// VPC id type (any non-empty string or a reference to a VPC)
pub fn vpc_id() -> AttributeType {
    AttributeType::Custom {
        name: "VpcId".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| match value {
            Value::String(s) if s.is_empty() => Err("vpc_id must not be empty".to_string()),
            _ => Ok(()),
        },
    }
}

/// Tag map type (keys 1-128 characters, values up to 256)
pub fn tags() -> AttributeType {
    AttributeType::Custom {
        name: "Tags".to_string(),
        base: Box::new(AttributeType::Map(Box::new(AttributeType::String))),
        validate: |value| tags_from_value(value).and_then(|tags: Tags| validate_tags(&tags)),
    }
}

pub fn route_table_schema() -> ResourceSchema {
    ResourceSchema::new(ROUTE_TABLE)
        .with_description("A custom route table attached to a VPC")
        .attribute(
            AttributeSchema::new("vpc_id", vpc_id())
                .required()
                .force_new()
                .with_provider_name("VpcId")
                .with_description("VPC the route table belongs to"),
        )
        .attribute(
            AttributeSchema::new("name", route_table_name()).with_provider_name("RouteTableName"),
        )
        .attribute(
            AttributeSchema::new("description", description()).with_provider_name("Description"),
        )
        .attribute(AttributeSchema::new("tags", tags()).with_provider_name("Tags"))
        .attribute(
            AttributeSchema::new("route_table_type", AttributeType::String)
                .computed()
                .with_provider_name("RouteTableType"),
        )
        .attribute(
            AttributeSchema::new("router_id", AttributeType::String)
                .computed()
                .with_provider_name("RouterId"),
        )
        .attribute(
            AttributeSchema::new("creation_time", AttributeType::String)
                .computed()
                .with_provider_name("CreationTime"),
        )
}

pub struct RouteTableType;

impl ResourceType for RouteTableType {
    fn name(&self) -> &'static str {
        ROUTE_TABLE
    }

    fn schema(&self) -> ResourceSchema {
        route_table_schema()
    }
}

/// Returns all resource types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![Box::new(RouteTableType)]
}
