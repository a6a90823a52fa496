//! Rudder ApsaraStack Provider
//!
//! Manages ApsaraStack VPC route tables.
//!
//! ## Module Structure
//!
//! - `client` - VPC control plane client trait and request/response types
//! - `route_table` - Desired/observed route table model and changeset diff
//! - `poller` - Waits for a route table to reach a status or disappear
//! - `tags` - Tag API, tag reconciler and the tag sync adapter
//! - `reconciler` - Create/read/update/delete lifecycle of a route table
//! - `config` - Provider configuration
//! - `resources` - Resource type definitions and attribute schema
//! - `mock` - In-memory control plane
//! - `utils` - Helper functions for value normalization

pub mod client;
pub mod config;
pub mod mock;
pub mod poller;
pub mod reconciler;
pub mod resources;
pub mod route_table;
pub mod tags;
pub mod utils;

use std::sync::Arc;

use rudder_core::provider::{BoxFuture, Provider, ProviderError, ProviderResult, ResourceType};
use rudder_core::resource::{Resource, ResourceId, State};

pub use client::VpcApi;
pub use config::ProviderConfig;
pub use reconciler::RouteTableReconciler;
pub use route_table::{RouteTableSpec, RouteTableState, RouteTableStatus};
pub use tags::{ApiTagReconciler, TagApi, TagReconciler};

use client::{CREATE_ROUTE_TABLE, build_client_token};
use resources::{ROUTE_TABLE, resource_types};

/// ApsaraStack Provider
pub struct ApsaraStackProvider<C, R> {
    reconciler: RouteTableReconciler<C, R>,
}

impl<C: VpcApi + TagApi> ApsaraStackProvider<C, ApiTagReconciler<C>> {
    /// Create a provider whose tags are managed through the client's tag API
    pub fn new(client: Arc<C>, config: ProviderConfig) -> ProviderResult<Self> {
        let tags = Arc::new(ApiTagReconciler::new(client.clone()));
        Self::with_tag_reconciler(client, tags, config)
    }
}

impl<C: VpcApi, R: TagReconciler> ApsaraStackProvider<C, R> {
    pub fn with_tag_reconciler(
        client: Arc<C>,
        tag_reconciler: Arc<R>,
        config: ProviderConfig,
    ) -> ProviderResult<Self> {
        config.validate()?;
        log::debug!("apsarastack provider configured for {}", config.region_id);
        Ok(Self {
            reconciler: RouteTableReconciler::new(client, tag_reconciler, config),
        })
    }

    pub fn reconciler(&self) -> &RouteTableReconciler<C, R> {
        &self.reconciler
    }

    fn check_resource_type(id: &ResourceId) -> ProviderResult<()> {
        if id.resource_type == ROUTE_TABLE {
            Ok(())
        } else {
            Err(
                ProviderError::internal(format!("Unknown resource type: {}", id.resource_type))
                    .for_resource(id.clone()),
            )
        }
    }

    fn to_state(id: ResourceId, route_table: &RouteTableState) -> State {
        State::existing(id, route_table.to_attributes()).with_identifier(&route_table.id)
    }

    /// Idempotency token for creating `spec` under `id`
    ///
    /// Derived from the resource id and the declared spec, so re-running a
    /// create whose first attempt never made it into state reuses the route
    /// table that attempt made.
    fn create_token(id: &ResourceId, spec: &RouteTableSpec) -> ProviderResult<String> {
        let spec = serde_json::to_string(spec).map_err(|e| {
            ProviderError::internal("failed to encode route table spec")
                .with_cause(e)
                .for_resource(id.clone())
        })?;
        Ok(build_client_token(
            CREATE_ROUTE_TABLE,
            &format!("{}/{}", id, spec),
        ))
    }

    /// Read a route table; a bare identifier with no prior state imports it
    pub async fn read_resource(
        &self,
        id: ResourceId,
        identifier: Option<&str>,
    ) -> ProviderResult<State> {
        Self::check_resource_type(&id)?;

        let identifier = match identifier {
            Some(identifier) => identifier,
            None => return Ok(State::not_found(id)),
        };

        match self
            .reconciler
            .read(identifier)
            .await
            .map_err(|e| e.for_resource(id.clone()))?
        {
            Some(route_table) => Ok(Self::to_state(id, &route_table)),
            None => Ok(State::not_found(id)),
        }
    }

    pub async fn create_resource(&self, resource: Resource) -> ProviderResult<State> {
        Self::check_resource_type(&resource.id)?;
        let spec = RouteTableSpec::from_attributes(&resource.attributes)
            .map_err(|e| e.for_resource(resource.id.clone()))?;

        let token = Self::create_token(&resource.id, &spec)?;
        let route_table = self
            .reconciler
            .create(&spec, &token)
            .await
            .map_err(|e| e.for_resource(resource.id.clone()))?;

        Ok(Self::to_state(resource.id, &route_table))
    }

    pub async fn update_resource(
        &self,
        id: ResourceId,
        identifier: &str,
        from: &State,
        to: Resource,
    ) -> ProviderResult<State> {
        Self::check_resource_type(&id)?;
        let from = RouteTableSpec::from_attributes(&from.attributes)
            .map_err(|e| e.for_resource(id.clone()))?;
        let to = RouteTableSpec::from_attributes(&to.attributes)
            .map_err(|e| e.for_resource(id.clone()))?;

        let route_table = self
            .reconciler
            .update(identifier, &from, &to)
            .await
            .map_err(|e| e.for_resource(id.clone()))?;

        Ok(Self::to_state(id, &route_table))
    }

    pub async fn delete_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        Self::check_resource_type(id)?;
        self.reconciler
            .delete(identifier)
            .await
            .map_err(|e| e.for_resource(id.clone()))
    }
}

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl<C, R> Provider for ApsaraStackProvider<C, R>
where
    C: VpcApi + 'static,
    R: TagReconciler + 'static,
{
    fn name(&self) -> &'static str {
        "apsarastack"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(|s| s.to_string());
        Box::pin(async move { self.read_resource(id, identifier.as_deref()).await })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(resource).await })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move { self.update_resource(id, &identifier, &from, to).await })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.delete_resource(&id, &identifier).await })
    }
}
