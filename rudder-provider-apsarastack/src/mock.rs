//! In-memory control plane
//!
//! `MockVpc` implements both [`VpcApi`] and [`TagApi`] against an in-memory
//! table. It simulates asynchronous provisioning (a configurable number of
//! `Pending`/`Deleting` describes), create idempotency through client
//! tokens, injected failures, and out-of-band deletion. Every call is
//! recorded so tests can assert on exactly what was sent.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use rudder_core::provider::{ErrorKind, ProviderError, ProviderResult};

use crate::client::{
    CREATE_ROUTE_TABLE, CreateRouteTableRequest, CreateRouteTableResponse, DELETE_ROUTE_TABLE,
    DESCRIBE_ROUTE_TABLE_LIST, DeleteRouteTableRequest, DescribeRouteTableRequest,
    MODIFY_ROUTE_TABLE_ATTRIBUTES, ModifyRouteTableAttributesRequest, VpcApi,
};
use crate::route_table::{RouteTableSpec, RouteTableState, RouteTableStatus};
use crate::tags::{MAX_TAGS_PER_CALL, ROUTE_TABLE_RESOURCE_TYPE, TagApi, Tags};

pub const LIST_TAG_RESOURCES: &str = "ListTagResources";
pub const TAG_RESOURCES: &str = "TagResources";
pub const UNTAG_RESOURCES: &str = "UnTagResources";

struct Entry {
    state: RouteTableState,
    /// Describes left before a pending table turns available; `None` never does
    pending_polls: Option<u32>,
    /// Describes left before a deleting table disappears
    deleting_polls: u32,
}

#[derive(Default)]
struct Inner {
    tables: BTreeMap<String, Entry>,
    tokens: HashMap<String, String>,
    next_id: u64,
    failures: HashMap<String, ErrorKind>,
    calls: Vec<String>,
    modify_requests: Vec<ModifyRouteTableAttributesRequest>,
}

pub struct MockVpc {
    inner: Mutex<Inner>,
    pending_polls: Option<u32>,
    deleting_polls: u32,
}

impl Default for MockVpc {
    fn default() -> Self {
        Self::new()
    }
}

impl MockVpc {
    /// Route tables become available on the first describe and vanish on delete
    pub fn new() -> Self {
        Self {
            inner: Mutex::default(),
            pending_polls: Some(0),
            deleting_polls: 0,
        }
    }

    /// New route tables report `Pending` for this many describes
    pub fn with_pending_polls(mut self, polls: u32) -> Self {
        self.pending_polls = Some(polls);
        self
    }

    /// New route tables never leave `Pending`
    pub fn stuck_pending(mut self) -> Self {
        self.pending_polls = None;
        self
    }

    /// Deleted route tables report `Deleting` for this many describes
    pub fn with_deleting_polls(mut self, polls: u32) -> Self {
        self.deleting_polls = polls;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock only means another test thread panicked
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next call of `action` fail with `kind`
    pub fn fail_next(&self, action: &str, kind: ErrorKind) {
        self.lock().failures.insert(action.to_string(), kind);
    }

    /// Create a route table directly, as if by another client
    pub fn insert_route_table(&self, spec: &RouteTableSpec) -> String {
        let mut inner = self.lock();
        self.insert(&mut inner, spec)
    }

    /// Delete a route table behind the provider's back
    pub fn remove_out_of_band(&self, id: &str) -> bool {
        self.lock().tables.remove(id).is_some()
    }

    /// Current remote view of a route table
    pub fn route_table(&self, id: &str) -> Option<RouteTableState> {
        self.lock().tables.get(id).map(|e| e.state.clone())
    }

    pub fn route_table_count(&self) -> usize {
        self.lock().tables.len()
    }

    /// Actions called so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, action: &str) -> usize {
        self.lock().calls.iter().filter(|c| *c == action).count()
    }

    /// Mutating calls (everything but describes and tag listings)
    pub fn mutation_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| *c != DESCRIBE_ROUTE_TABLE_LIST && *c != LIST_TAG_RESOURCES)
            .count()
    }

    pub fn modify_requests(&self) -> Vec<ModifyRouteTableAttributesRequest> {
        self.lock().modify_requests.clone()
    }

    fn insert(&self, inner: &mut Inner, spec: &RouteTableSpec) -> String {
        inner.next_id += 1;
        let id = format!("vtb-mock{:012}", inner.next_id);
        let pending_polls = self.pending_polls;
        let status = if pending_polls == Some(0) {
            RouteTableStatus::Available
        } else {
            RouteTableStatus::Pending
        };
        let state = RouteTableState {
            id: id.clone(),
            status,
            vpc_id: spec.vpc_id.clone(),
            name: spec.name.clone(),
            description: spec.description.clone(),
            tags: spec.tags.clone(),
            route_table_type: Some("Custom".to_string()),
            router_id: Some(format!("vrt-mock{:012}", inner.next_id)),
            creation_time: Some(chrono::Utc::now().to_rfc3339()),
        };
        inner.tables.insert(
            id.clone(),
            Entry {
                state,
                pending_polls,
                deleting_polls: 0,
            },
        );
        id
    }
}

/// Record a call and fire an injected failure, if any
fn record(inner: &mut Inner, action: &str) -> ProviderResult<()> {
    inner.calls.push(action.to_string());
    match inner.failures.remove(action) {
        Some(kind) => Err(ProviderError::new(
            kind,
            format!("{} failed (injected)", action),
        )),
        None => Ok(()),
    }
}

fn not_found(id: &str) -> ProviderError {
    ProviderError::not_found(format!(
        "InvalidRouteTableId.NotFound: route table {} does not exist",
        id
    ))
}

fn entry_mut<'a>(inner: &'a mut Inner, id: &str) -> ProviderResult<&'a mut Entry> {
    inner.tables.get_mut(id).ok_or_else(|| not_found(id))
}

fn check_tag_resource_type(resource_type: &str) -> ProviderResult<()> {
    if resource_type == ROUTE_TABLE_RESOURCE_TYPE {
        Ok(())
    } else {
        Err(ProviderError::validation(format!(
            "unsupported tag resource type {}",
            resource_type
        )))
    }
}

#[async_trait]
impl VpcApi for MockVpc {
    async fn create_route_table(
        &self,
        request: &CreateRouteTableRequest,
    ) -> ProviderResult<CreateRouteTableResponse> {
        let mut inner = self.lock();
        record(&mut inner, CREATE_ROUTE_TABLE)?;

        // A token whose route table is gone is spent
        let existing = inner
            .tokens
            .get(&request.client_token)
            .filter(|id| inner.tables.contains_key(*id))
            .cloned();
        let route_table_id = match existing {
            Some(existing) => existing,
            None => {
                let spec = RouteTableSpec {
                    vpc_id: request.vpc_id.clone(),
                    name: request.route_table_name.clone(),
                    description: request.description.clone(),
                    tags: Tags::new(),
                };
                let id = self.insert(&mut inner, &spec);
                inner.tokens.insert(request.client_token.clone(), id.clone());
                id
            }
        };

        Ok(CreateRouteTableResponse {
            request_id: uuid::Uuid::new_v4().to_string(),
            route_table_id,
        })
    }

    async fn modify_route_table_attributes(
        &self,
        request: &ModifyRouteTableAttributesRequest,
    ) -> ProviderResult<()> {
        let mut inner = self.lock();
        record(&mut inner, MODIFY_ROUTE_TABLE_ATTRIBUTES)?;
        inner.modify_requests.push(request.clone());

        let entry = entry_mut(&mut inner, &request.route_table_id)?;
        if let Some(name) = &request.route_table_name {
            entry.state.name = Some(name.clone());
        }
        if let Some(description) = &request.description {
            entry.state.description = Some(description.clone());
        }
        Ok(())
    }

    async fn delete_route_table(&self, request: &DeleteRouteTableRequest) -> ProviderResult<()> {
        let mut inner = self.lock();
        record(&mut inner, DELETE_ROUTE_TABLE)?;

        if self.deleting_polls == 0 {
            return match inner.tables.remove(&request.route_table_id) {
                Some(_) => Ok(()),
                None => Err(not_found(&request.route_table_id)),
            };
        }

        let deleting_polls = self.deleting_polls;
        let entry = entry_mut(&mut inner, &request.route_table_id)?;
        entry.state.status = RouteTableStatus::Deleting;
        entry.deleting_polls = deleting_polls;
        Ok(())
    }

    async fn describe_route_table(
        &self,
        request: &DescribeRouteTableRequest,
    ) -> ProviderResult<RouteTableState> {
        let mut inner = self.lock();
        record(&mut inner, DESCRIBE_ROUTE_TABLE_LIST)?;

        let id = request.route_table_id.as_str();
        let entry = entry_mut(&mut inner, id)?;
        let gone = match entry.state.status {
            RouteTableStatus::Pending => {
                match entry.pending_polls {
                    Some(0) => entry.state.status = RouteTableStatus::Available,
                    Some(ref mut left) => *left -= 1,
                    None => {}
                }
                false
            }
            RouteTableStatus::Deleting if entry.deleting_polls == 0 => true,
            RouteTableStatus::Deleting => {
                entry.deleting_polls -= 1;
                false
            }
            _ => false,
        };
        let state = entry.state.clone();

        if gone {
            inner.tables.remove(id);
            return Err(not_found(id));
        }
        Ok(state)
    }
}

#[async_trait]
impl TagApi for MockVpc {
    async fn list_tags(&self, resource_type: &str, resource_id: &str) -> ProviderResult<Tags> {
        let mut inner = self.lock();
        record(&mut inner, LIST_TAG_RESOURCES)?;
        check_tag_resource_type(resource_type)?;
        Ok(entry_mut(&mut inner, resource_id)?.state.tags.clone())
    }

    async fn tag_resource(
        &self,
        resource_type: &str,
        resource_id: &str,
        tags: &Tags,
    ) -> ProviderResult<()> {
        let mut inner = self.lock();
        record(&mut inner, TAG_RESOURCES)?;
        check_tag_resource_type(resource_type)?;
        if tags.len() > MAX_TAGS_PER_CALL {
            return Err(ProviderError::validation(format!(
                "at most {} tags per call, got {}",
                MAX_TAGS_PER_CALL,
                tags.len()
            )));
        }
        let entry = entry_mut(&mut inner, resource_id)?;
        entry.state.tags.extend(tags.clone());
        Ok(())
    }

    async fn untag_resource(
        &self,
        resource_type: &str,
        resource_id: &str,
        keys: &[String],
    ) -> ProviderResult<()> {
        let mut inner = self.lock();
        record(&mut inner, UNTAG_RESOURCES)?;
        check_tag_resource_type(resource_type)?;
        if keys.len() > MAX_TAGS_PER_CALL {
            return Err(ProviderError::validation(format!(
                "at most {} keys per call, got {}",
                MAX_TAGS_PER_CALL,
                keys.len()
            )));
        }
        let entry = entry_mut(&mut inner, resource_id)?;
        for key in keys {
            entry.state.tags.remove(key);
        }
        Ok(())
    }
}
