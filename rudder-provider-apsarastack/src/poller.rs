//! Status poller
//!
//! Turns the asynchronous provisioning of a route table into a synchronous
//! result by describing it until it reaches a target status, disappears, or
//! the deadline passes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use rudder_core::provider::{ProviderError, ProviderResult};

use crate::client::{DescribeRouteTableRequest, VpcApi};
use crate::config::{DEFAULT_MIN_POLL_INTERVAL, DEFAULT_POLL_INTERVAL};
use crate::route_table::{RouteTableState, RouteTableStatus};

/// Condition a wait completes on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitTarget {
    /// The route table reports this status
    Status(RouteTableStatus),
    /// The route table is gone
    Deleted,
}

impl WaitTarget {
    fn is_reached_by(&self, status: &RouteTableStatus) -> bool {
        match self {
            WaitTarget::Status(target) => target == status,
            WaitTarget::Deleted => *status == RouteTableStatus::Deleted,
        }
    }
}

impl fmt::Display for WaitTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitTarget::Status(status) => write!(f, "{}", status),
            WaitTarget::Deleted => write!(f, "deleted"),
        }
    }
}

pub struct Poller<C> {
    client: Arc<C>,
    region_id: String,
    interval: Duration,
    min_interval: Duration,
}

impl<C: VpcApi> Poller<C> {
    pub fn new(client: Arc<C>, region_id: impl Into<String>) -> Self {
        Self {
            client,
            region_id: region_id.into(),
            interval: DEFAULT_POLL_INTERVAL,
            min_interval: DEFAULT_MIN_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration, min_interval: Duration) -> Self {
        self.interval = interval;
        self.min_interval = min_interval;
        self
    }

    /// Wait until route table `id` reaches `target`
    ///
    /// Returns the last observed state, or `None` when the route table is
    /// gone. Only NotFound while waiting for deletion is absorbed; every other
    /// describe error is returned as is. On timeout the error carries the last
    /// observed status. Polls are spaced by the interval, never less than the
    /// minimum interval, except that the wait never sleeps past the deadline.
    pub async fn wait_for(
        &self,
        id: &str,
        target: WaitTarget,
        timeout: Duration,
    ) -> ProviderResult<Option<RouteTableState>> {
        if id.is_empty() {
            return Err(ProviderError::validation(
                "cannot wait for a route table without an id",
            ));
        }

        let deadline = Instant::now() + timeout;
        let request = DescribeRouteTableRequest {
            region_id: self.region_id.clone(),
            route_table_id: id.to_string(),
        };
        let mut last_status: Option<RouteTableStatus> = None;

        loop {
            match self.client.describe_route_table(&request).await {
                Ok(state) if target.is_reached_by(&state.status) => {
                    log::debug!("route table {} reached {}", id, target);
                    return Ok(Some(state));
                }
                Ok(state) => {
                    log::debug!(
                        "route table {} is {}, waiting for {}",
                        id,
                        state.status,
                        target
                    );
                    last_status = Some(state.status);
                }
                Err(e) if e.is_not_found() && target == WaitTarget::Deleted => {
                    log::debug!("route table {} is gone", id);
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                let last = last_status.map(|s| s.to_string());
                return Err(ProviderError::timeout(
                    last.clone(),
                    format!(
                        "timed out after {:?} waiting for route table {} to be {} (last status: {})",
                        timeout,
                        id,
                        target,
                        last.as_deref().unwrap_or("unknown")
                    ),
                ));
            }

            // The last sleep may be shorter than the minimum so the final poll
            // lands on the deadline
            let sleep = self.interval.max(self.min_interval).min(deadline - now);
            tokio::time::sleep(sleep).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockVpc;
    use crate::route_table::RouteTableSpec;
    use rudder_core::provider::ErrorKind;

    async fn create(mock: &Arc<MockVpc>) -> String {
        mock.insert_route_table(&RouteTableSpec::new("vpc-1"))
    }

    fn poller(mock: &Arc<MockVpc>) -> Poller<MockVpc> {
        Poller::new(mock.clone(), "cn-qingdao")
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_poll_match_does_not_sleep() {
        let mock = Arc::new(MockVpc::new());
        let id = create(&mock).await;
        let start = Instant::now();

        let state = poller(&mock)
            .wait_for(
                &id,
                WaitTarget::Status(RouteTableStatus::Available),
                Duration::from_secs(60),
            )
            .await
            .unwrap()
            .unwrap();

        assert!(state.is_available());
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(mock.call_count("DescribeRouteTableList"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_through_pending() {
        let mock = Arc::new(MockVpc::new().with_pending_polls(2));
        let id = create(&mock).await;
        let start = Instant::now();

        poller(&mock)
            .wait_for(
                &id,
                WaitTarget::Status(RouteTableStatus::Available),
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        assert_eq!(mock.call_count("DescribeRouteTableList"), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_surfaces_last_status() {
        let mock = Arc::new(MockVpc::new().stuck_pending());
        let id = create(&mock).await;

        let err = poller(&mock)
            .wait_for(
                &id,
                WaitTarget::Status(RouteTableStatus::Available),
                Duration::from_secs(10),
            )
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(err.last_status(), Some("Pending"));
        // polls at 0s, 5s and 10s
        assert_eq!(mock.call_count("DescribeRouteTableList"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_is_clamped_to_remaining_time() {
        let mock = Arc::new(MockVpc::new().stuck_pending());
        let id = create(&mock).await;
        let start = Instant::now();

        let err = Poller::new(mock.clone(), "cn-qingdao")
            .with_interval(Duration::from_secs(5), Duration::from_secs(1))
            .wait_for(
                &id,
                WaitTarget::Status(RouteTableStatus::Available),
                Duration::from_secs(7),
            )
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        // 0s, 5s, then clamped to the 2s left
        assert_eq!(start.elapsed(), Duration::from_secs(7));
        assert_eq!(mock.call_count("DescribeRouteTableList"), 3);

        // less than the minimum left: the last poll still lands on the deadline
        let start = Instant::now();
        let err = Poller::new(mock.clone(), "cn-qingdao")
            .with_interval(Duration::from_secs(5), Duration::from_secs(1))
            .wait_for(
                &id,
                WaitTarget::Status(RouteTableStatus::Available),
                Duration::from_millis(5500),
            )
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(start.elapsed(), Duration::from_millis(5500));
        assert_eq!(mock.call_count("DescribeRouteTableList"), 6);

        let err = Poller::new(mock.clone(), "cn-qingdao")
            .with_interval(Duration::from_secs(5), Duration::from_secs(1))
            .wait_for(
                &id,
                WaitTarget::Status(RouteTableStatus::Available),
                Duration::ZERO,
            )
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deleted_target_accepts_not_found() {
        let mock = Arc::new(MockVpc::new());
        let result = poller(&mock)
            .wait_for("vtb-missing", WaitTarget::Deleted, Duration::from_secs(10))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_target_propagates_not_found() {
        let mock = Arc::new(MockVpc::new());
        let err = poller(&mock)
            .wait_for(
                "vtb-missing",
                WaitTarget::Status(RouteTableStatus::Available),
                Duration::from_secs(10),
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_are_not_retried() {
        let mock = Arc::new(MockVpc::new());
        let id = create(&mock).await;
        mock.fail_next("DescribeRouteTableList", ErrorKind::Transport);

        let err = poller(&mock)
            .wait_for(&id, WaitTarget::Deleted, Duration::from_secs(10))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Transport);
        assert_eq!(mock.call_count("DescribeRouteTableList"), 1);
    }

    #[tokio::test]
    async fn test_empty_id_is_rejected() {
        let mock = Arc::new(MockVpc::new());
        let err = poller(&mock)
            .wait_for("", WaitTarget::Deleted, Duration::from_secs(10))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(mock.call_count("DescribeRouteTableList"), 0);
    }
}
