//! Route table reconciler
//!
//! Drives a route table through its lifecycle:
//!
//! ```text
//! Absent --create--> Creating --id assigned--> Converging --Available--> Present
//! Present --update--> Converging --re-read--> Present
//! Present --delete--> Deleting --not found--> Gone
//! ```
//!
//! Every mutating call is followed by a wait on the [`Poller`] or a re-read,
//! so a returned state is always one the control plane has confirmed. Any
//! failure aborts the transition and is returned as is.

use std::fmt;
use std::sync::Arc;

use rudder_core::provider::{ProviderError, ProviderResult};

use crate::client::{
    CREATE_ROUTE_TABLE, CreateRouteTableRequest, DELETE_ROUTE_TABLE, DeleteRouteTableRequest,
    DescribeRouteTableRequest, MODIFY_ROUTE_TABLE_ATTRIBUTES, VpcApi, debug_exchange,
};
use crate::config::ProviderConfig;
use crate::poller::{Poller, WaitTarget};
use crate::route_table::{Changeset, RouteTableSpec, RouteTableState, RouteTableStatus};
use crate::tags::{TagReconciler, TagSync};

/// Lifecycle phase of a route table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Absent,
    Creating,
    Converging,
    Present,
    Deleting,
    Gone,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Absent => "absent",
            Phase::Creating => "creating",
            Phase::Converging => "converging",
            Phase::Present => "present",
            Phase::Deleting => "deleting",
            Phase::Gone => "gone",
        };
        write!(f, "{}", s)
    }
}

pub struct RouteTableReconciler<C, R> {
    client: Arc<C>,
    tags: TagSync<R>,
    poller: Poller<C>,
    config: ProviderConfig,
}

impl<C: VpcApi, R: TagReconciler> RouteTableReconciler<C, R> {
    pub fn new(client: Arc<C>, tag_reconciler: Arc<R>, config: ProviderConfig) -> Self {
        let poller = Poller::new(client.clone(), config.region_id.clone())
            .with_interval(config.poll_interval, config.min_poll_interval);
        Self {
            client,
            tags: TagSync::new(tag_reconciler),
            poller,
            config,
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn transition(&self, id: &str, from: Phase, to: Phase) {
        log::info!("route table {}: {} -> {}", id, from, to);
    }

    /// Create a route table and wait until it is available
    ///
    /// `client_token` makes the create call idempotent: retrying with the same
    /// token yields the same route table.
    pub async fn create(
        &self,
        spec: &RouteTableSpec,
        client_token: &str,
    ) -> ProviderResult<RouteTableState> {
        spec.validate()?;

        self.transition("(new)", Phase::Absent, Phase::Creating);
        let request = CreateRouteTableRequest {
            region_id: self.config.region_id.clone(),
            vpc_id: spec.vpc_id.clone(),
            route_table_name: spec.name.clone(),
            description: spec.description.clone(),
            client_token: client_token.to_string(),
        };
        let response = self.client.create_route_table(&request).await?;
        debug_exchange(CREATE_ROUTE_TABLE, &request, &response);

        let id = response.route_table_id;
        if id.is_empty() {
            return Err(ProviderError::internal(format!(
                "{} returned no route table id (request {})",
                CREATE_ROUTE_TABLE, response.request_id
            )));
        }
        self.transition(&id, Phase::Creating, Phase::Converging);

        self.converge_created(&id, spec).await.inspect_err(|e| {
            log::warn!(
                "route table {} was created but did not converge: {}",
                id,
                e
            );
        })
    }

    async fn converge_created(
        &self,
        id: &str,
        spec: &RouteTableSpec,
    ) -> ProviderResult<RouteTableState> {
        self.poller
            .wait_for(
                id,
                WaitTarget::Status(RouteTableStatus::Available),
                self.config.create_timeout,
            )
            .await?;

        // Tags cannot be passed to the create call
        self.tags.sync(id, &spec.tags).await?;

        let state = self.read(id).await?.ok_or_else(|| {
            ProviderError::not_found(format!("route table {} disappeared after creation", id))
        })?;
        self.transition(id, Phase::Converging, Phase::Present);
        Ok(state)
    }

    /// Describe a route table; `None` when it no longer exists
    pub async fn read(&self, id: &str) -> ProviderResult<Option<RouteTableState>> {
        if id.is_empty() {
            return Err(ProviderError::validation(
                "cannot read a route table without an id",
            ));
        }

        let request = DescribeRouteTableRequest {
            region_id: self.config.region_id.clone(),
            route_table_id: id.to_string(),
        };
        match self.client.describe_route_table(&request).await {
            Ok(state) => Ok(Some(state)),
            Err(e) if e.is_not_found() => {
                log::warn!("route table {} not found", id);
                self.transition(id, Phase::Present, Phase::Absent);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Bring route table `id` from `from` to `to` in place
    ///
    /// Tags are always synced. The modify call is issued only when the name or
    /// description changed, and carries only the changed fields.
    pub async fn update(
        &self,
        id: &str,
        from: &RouteTableSpec,
        to: &RouteTableSpec,
    ) -> ProviderResult<RouteTableState> {
        to.validate()?;
        if id.is_empty() {
            return Err(ProviderError::validation(
                "cannot update a route table without an id",
            ));
        }
        let changeset = Changeset::diff(from, to)?;

        self.transition(id, Phase::Present, Phase::Converging);
        self.tags.sync(id, &to.tags).await?;

        if let Some(request) = changeset.into_modify_request(&self.config.region_id, id) {
            self.client.modify_route_table_attributes(&request).await?;
            debug_exchange(MODIFY_ROUTE_TABLE_ATTRIBUTES, &request, &());
        }

        let state = self.read(id).await?.ok_or_else(|| {
            ProviderError::not_found(format!("route table {} disappeared during update", id))
        })?;
        self.transition(id, Phase::Converging, Phase::Present);
        Ok(state)
    }

    /// Delete route table `id` and wait until it is gone
    pub async fn delete(&self, id: &str) -> ProviderResult<()> {
        if id.is_empty() {
            return Err(ProviderError::validation(
                "cannot delete a route table without an id",
            ));
        }

        self.transition(id, Phase::Present, Phase::Deleting);
        let request = DeleteRouteTableRequest {
            region_id: self.config.region_id.clone(),
            route_table_id: id.to_string(),
        };
        match self.client.delete_route_table(&request).await {
            Ok(()) => {
                debug_exchange(DELETE_ROUTE_TABLE, &request, &());
                self.poller
                    .wait_for(id, WaitTarget::Deleted, self.config.delete_timeout)
                    .await?;
            }
            Err(e) if e.is_not_found() => {
                log::debug!("route table {} was already deleted", id);
            }
            Err(e) => return Err(e),
        }

        self.transition(id, Phase::Deleting, Phase::Gone);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use rudder_core::provider::ErrorKind;

    use crate::client::{DESCRIBE_ROUTE_TABLE_LIST, build_client_token};
    use crate::mock::{LIST_TAG_RESOURCES, MockVpc, TAG_RESOURCES, UNTAG_RESOURCES};
    use crate::tags::ApiTagReconciler;

    type Reconciler = RouteTableReconciler<MockVpc, ApiTagReconciler<MockVpc>>;

    fn reconciler(mock: &Arc<MockVpc>) -> Reconciler {
        let config = ProviderConfig::new("cn-qingdao")
            .with_timeouts(Duration::from_secs(60), Duration::from_secs(60));
        RouteTableReconciler::new(
            mock.clone(),
            Arc::new(ApiTagReconciler::new(mock.clone())),
            config,
        )
    }

    fn spec() -> RouteTableSpec {
        RouteTableSpec::new("vpc-1")
            .with_name("private")
            .with_description("private subnets")
            .with_tag("env", "prod")
    }

    fn token() -> String {
        build_client_token(CREATE_ROUTE_TABLE, &uuid::Uuid::new_v4().to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_waits_and_applies_tags() {
        let mock = Arc::new(MockVpc::new().with_pending_polls(2));
        let state = reconciler(&mock).create(&spec(), &token()).await.unwrap();

        assert!(state.is_available());
        assert!(state.id.starts_with("vtb-"));
        assert_eq!(state.spec(), spec());
        assert_eq!(state.route_table_type.as_deref(), Some("Custom"));
        assert_eq!(
            mock.calls(),
            vec![
                CREATE_ROUTE_TABLE,
                DESCRIBE_ROUTE_TABLE_LIST,
                DESCRIBE_ROUTE_TABLE_LIST,
                DESCRIBE_ROUTE_TABLE_LIST,
                LIST_TAG_RESOURCES,
                TAG_RESOURCES,
                DESCRIBE_ROUTE_TABLE_LIST,
            ]
        );
    }

    #[tokio::test]
    async fn test_retried_create_with_same_token_is_deduplicated() {
        let mock = Arc::new(MockVpc::new());
        let reconciler = reconciler(&mock);
        let token = token();

        let first = reconciler.create(&spec(), &token).await.unwrap();
        let retry = reconciler.create(&spec(), &token).await.unwrap();

        assert_eq!(first.id, retry.id);
        assert_eq!(mock.route_table_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_spec_makes_no_remote_call() {
        let mock = Arc::new(MockVpc::new());
        let reconciler = reconciler(&mock);

        let err = reconciler
            .create(&spec().with_name("x"), &token())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);

        let err = reconciler
            .update("vtb-1", &spec(), &spec().with_description("d".repeat(300)))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);

        assert!(mock.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_timeout_surfaces_pending() {
        let mock = Arc::new(MockVpc::new().stuck_pending());
        let err = reconciler(&mock)
            .create(&spec(), &token())
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(err.last_status(), Some("Pending"));
        assert_eq!(mock.call_count(TAG_RESOURCES), 0);
    }

    #[tokio::test]
    async fn test_read_missing_is_absent() {
        let mock = Arc::new(MockVpc::new());
        let reconciler = reconciler(&mock);
        let id = mock.insert_route_table(&spec());

        assert!(reconciler.read(&id).await.unwrap().is_some());
        mock.remove_out_of_band(&id);
        assert!(reconciler.read(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_propagates_other_errors() {
        let mock = Arc::new(MockVpc::new());
        mock.fail_next(DESCRIBE_ROUTE_TABLE_LIST, ErrorKind::Transport);

        let err = reconciler(&mock).read("vtb-1").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_update_sends_only_changed_fields() {
        let mock = Arc::new(MockVpc::new());
        let id = mock.insert_route_table(&spec());

        let to = spec().with_description("shared subnets");
        let state = reconciler(&mock).update(&id, &spec(), &to).await.unwrap();

        assert_eq!(state.description.as_deref(), Some("shared subnets"));
        let requests = mock.modify_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].route_table_name, None);
        assert_eq!(requests[0].description.as_deref(), Some("shared subnets"));
    }

    #[tokio::test]
    async fn test_update_tags_only_skips_modify() {
        let mock = Arc::new(MockVpc::new());
        let id = mock.insert_route_table(&spec());

        let to = spec().with_tag("env", "dev");
        let state = reconciler(&mock).update(&id, &spec(), &to).await.unwrap();

        assert_eq!(state.tags.get("env").map(String::as_str), Some("dev"));
        assert_eq!(mock.call_count(MODIFY_ROUTE_TABLE_ATTRIBUTES), 0);
        assert_eq!(mock.call_count(UNTAG_RESOURCES), 1);
        assert_eq!(mock.call_count(TAG_RESOURCES), 1);
    }

    #[tokio::test]
    async fn test_update_with_no_changes_is_idempotent() {
        let mock = Arc::new(MockVpc::new());
        let id = mock.insert_route_table(&spec());
        let reconciler = reconciler(&mock);

        reconciler.update(&id, &spec(), &spec()).await.unwrap();
        reconciler.update(&id, &spec(), &spec()).await.unwrap();

        assert_eq!(mock.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_update_rejects_vpc_change_without_remote_calls() {
        let mock = Arc::new(MockVpc::new());
        let id = mock.insert_route_table(&spec());
        let before = mock.calls().len();

        let mut to = spec().with_description("moved");
        to.vpc_id = "vpc-2".to_string();
        let err = reconciler(&mock).update(&id, &spec(), &to).await.unwrap_err();

        assert_eq!(
            err.kind,
            ErrorKind::ImmutableFieldChange {
                field: "vpc_id".to_string()
            }
        );
        assert_eq!(mock.calls().len(), before);
        assert!(mock.modify_requests().is_empty());
    }

    #[tokio::test]
    async fn test_update_of_missing_route_table_fails() {
        let mock = Arc::new(MockVpc::new());
        let err = reconciler(&mock)
            .update("vtb-missing", &spec(), &spec())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_waits_until_gone() {
        let mock = Arc::new(MockVpc::new().with_deleting_polls(2));
        let reconciler = reconciler(&mock);
        let state = reconciler.create(&spec(), &token()).await.unwrap();

        reconciler.delete(&state.id).await.unwrap();

        assert!(mock.route_table(&state.id).is_none());
        assert!(reconciler.read(&state.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_of_missing_route_table_succeeds() {
        let mock = Arc::new(MockVpc::new());
        reconciler(&mock).delete("vtb-missing").await.unwrap();
        assert_eq!(mock.call_count(DESCRIBE_ROUTE_TABLE_LIST), 0);
    }

    #[tokio::test]
    async fn test_delete_failure_aborts() {
        let mock = Arc::new(MockVpc::new());
        let id = mock.insert_route_table(&spec());
        mock.fail_next(DELETE_ROUTE_TABLE, ErrorKind::Transport);

        let err = reconciler(&mock).delete(&id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Transport);
        assert!(mock.route_table(&id).is_some());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Converging.to_string(), "converging");
        assert_eq!(Phase::Gone.to_string(), "gone");
    }
}
