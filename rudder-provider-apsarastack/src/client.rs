//! VPC control plane client
//!
//! The [`VpcApi`] trait is the seam between the reconciler and the remote
//! ApsaraStack VPC API. Request and response types mirror the RPC actions so
//! that every exchange can be logged verbatim.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use rudder_core::provider::ProviderResult;

use crate::route_table::RouteTableState;

pub const CREATE_ROUTE_TABLE: &str = "CreateRouteTable";
pub const MODIFY_ROUTE_TABLE_ATTRIBUTES: &str = "ModifyRouteTableAttributes";
pub const DELETE_ROUTE_TABLE: &str = "DeleteRouteTable";
pub const DESCRIBE_ROUTE_TABLE_LIST: &str = "DescribeRouteTableList";

/// Upper bound the control plane accepts for a ClientToken
const MAX_CLIENT_TOKEN_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateRouteTableRequest {
    pub region_id: String,
    pub vpc_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_table_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Idempotency token; retries with the same token yield the same route table
    pub client_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateRouteTableResponse {
    pub route_table_id: String,
    pub request_id: String,
}

/// Modify request; only the fields that are `Some` are sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModifyRouteTableAttributesRequest {
    pub region_id: String,
    pub route_table_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_table_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ModifyRouteTableAttributesRequest {
    pub fn is_empty(&self) -> bool {
        self.route_table_name.is_none() && self.description.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteRouteTableRequest {
    pub region_id: String,
    pub route_table_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeRouteTableRequest {
    pub region_id: String,
    pub route_table_id: String,
}

/// Remote API client for route tables
///
/// Implementations classify failures: an absent entity is reported with
/// `ErrorKind::NotFound`, network and authorization failures with
/// `ErrorKind::Transport`, malformed responses with `ErrorKind::Internal`.
#[async_trait]
pub trait VpcApi: Send + Sync {
    async fn create_route_table(
        &self,
        request: &CreateRouteTableRequest,
    ) -> ProviderResult<CreateRouteTableResponse>;

    async fn modify_route_table_attributes(
        &self,
        request: &ModifyRouteTableAttributesRequest,
    ) -> ProviderResult<()>;

    async fn delete_route_table(&self, request: &DeleteRouteTableRequest) -> ProviderResult<()>;

    /// Describe a single route table, failing with NotFound when it is absent
    async fn describe_route_table(
        &self,
        request: &DescribeRouteTableRequest,
    ) -> ProviderResult<RouteTableState>;
}

/// Build the idempotency token for `action` on the resource named by `key`
///
/// Format: `rudder-<uuid>`, where the UUID is a name-based (v5) hash of the
/// action and key. The same action on the same key always yields the same
/// token, so a retried create is deduplicated by the control plane.
pub fn build_client_token(action: &str, key: &str) -> String {
    let name = format!("{}/{}", action, key);
    let uuid = uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, name.as_bytes());
    let token = format!("rudder-{}", uuid.simple());
    debug_assert!(token.len() <= MAX_CLIENT_TOKEN_LEN);
    token
}

/// Log a request/response pair at debug level
pub(crate) fn debug_exchange<Q: Serialize, R: Serialize>(action: &str, request: &Q, response: &R) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    let request = serde_json::to_string(request).unwrap_or_default();
    let response = serde_json::to_string(response).unwrap_or_default();
    log::debug!("{} request: {} response: {}", action, request, response);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_token_format() {
        let token = build_client_token(CREATE_ROUTE_TABLE, "route_table.private");
        assert!(token.starts_with("rudder-"));
        assert_eq!(token.len(), "rudder-".len() + 32);
        assert!(token.len() <= MAX_CLIENT_TOKEN_LEN);
        assert_eq!(
            token,
            build_client_token(CREATE_ROUTE_TABLE, "route_table.private")
        );
    }

    #[test]
    fn test_client_token_depends_on_action_and_key() {
        let token = build_client_token(CREATE_ROUTE_TABLE, "route_table.private");
        assert_ne!(
            token,
            build_client_token(CREATE_ROUTE_TABLE, "route_table.public")
        );
        assert_ne!(
            token,
            build_client_token(DELETE_ROUTE_TABLE, "route_table.private")
        );

        // long inputs still fit
        let long = build_client_token(&"A".repeat(80), &"k".repeat(500));
        assert!(long.starts_with("rudder-"));
        assert!(long.len() <= MAX_CLIENT_TOKEN_LEN);
    }

    #[test]
    fn test_modify_request_serializes_only_changed_fields() {
        let request = ModifyRouteTableAttributesRequest {
            region_id: "cn-qingdao".to_string(),
            route_table_id: "vtb-1".to_string(),
            route_table_name: None,
            description: Some("private".to_string()),
        };
        assert!(!request.is_empty());

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["Description"], "private");
        assert!(json.get("RouteTableName").is_none());
    }
}
