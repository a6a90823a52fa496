//! Tag synchronization
//!
//! Tags are not part of the route table's own attributes on the control
//! plane; they are managed through the generic tag API. [`TagSync`] is the
//! adapter the reconciler calls, [`TagReconciler`] the collaborator it
//! delegates to, and [`ApiTagReconciler`] the implementation backed by
//! [`TagApi`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;

use rudder_core::provider::{ProviderError, ProviderResult};
use rudder_core::resource::Value;

/// Resource type the tag API uses for route tables
pub const ROUTE_TABLE_RESOURCE_TYPE: &str = "ROUTETABLE";

/// Maximum number of tags (or keys) a single tag/untag call accepts
pub const MAX_TAGS_PER_CALL: usize = 20;

pub const MAX_TAG_KEY_LEN: usize = 128;
pub const MAX_TAG_VALUE_LEN: usize = 256;

/// Tags keyed by tag key; ordering keeps requests and logs deterministic
pub type Tags = BTreeMap<String, String>;

/// Remote tag API
#[async_trait]
pub trait TagApi: Send + Sync {
    async fn list_tags(&self, resource_type: &str, resource_id: &str) -> ProviderResult<Tags>;

    async fn tag_resource(
        &self,
        resource_type: &str,
        resource_id: &str,
        tags: &Tags,
    ) -> ProviderResult<()>;

    async fn untag_resource(
        &self,
        resource_type: &str,
        resource_id: &str,
        keys: &[String],
    ) -> ProviderResult<()>;
}

/// Makes the tags on a resource equal to a desired set
///
/// Implementations must be idempotent: syncing the tags a resource already
/// carries is a no-op.
#[async_trait]
pub trait TagReconciler: Send + Sync {
    async fn sync_tags(
        &self,
        resource_type: &str,
        resource_id: &str,
        desired: &Tags,
    ) -> ProviderResult<()>;
}

/// Mutations needed to go from one tag set to another
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagDiff {
    /// Keys that are gone or whose value changed
    pub remove: Vec<String>,
    /// Keys that are new or whose value changed
    pub add: Tags,
}

impl TagDiff {
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.add.is_empty()
    }
}

/// Compute the tag mutations between `current` and `desired`
///
/// A changed value is removed and then re-added, matching how the tag API
/// treats an existing key.
pub fn diff_tags(current: &Tags, desired: &Tags) -> TagDiff {
    let remove = current
        .iter()
        .filter(|(key, value)| desired.get(*key) != Some(*value))
        .map(|(key, _)| key.clone())
        .collect();
    let add = desired
        .iter()
        .filter(|(key, value)| current.get(*key) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    TagDiff { remove, add }
}

/// Check tag keys and values against the control plane's limits
pub fn validate_tags(tags: &Tags) -> Result<(), String> {
    for (key, value) in tags {
        if key.is_empty() {
            return Err("tag keys must not be empty".to_string());
        }
        let key_len = key.chars().count();
        if key_len > MAX_TAG_KEY_LEN {
            return Err(format!(
                "tag key '{}' is {} characters, at most {} are allowed",
                key, key_len, MAX_TAG_KEY_LEN
            ));
        }
        let value_len = value.chars().count();
        if value_len > MAX_TAG_VALUE_LEN {
            return Err(format!(
                "value of tag '{}' is {} characters, at most {} are allowed",
                key, value_len, MAX_TAG_VALUE_LEN
            ));
        }
    }
    Ok(())
}

/// Convert a DSL map value into tags
pub fn tags_from_value(value: &Value) -> Result<Tags, String> {
    let map = value
        .as_map()
        .ok_or_else(|| format!("tags must be a map, got {}", value.type_name()))?;
    map.iter()
        .map(|(key, value)| match value {
            Value::String(s) => Ok((key.clone(), s.clone())),
            other => Err(format!(
                "tag '{}' must be a string, got {}",
                key,
                other.type_name()
            )),
        })
        .collect()
}

pub fn tags_to_value(tags: &Tags) -> Value {
    Value::Map(
        tags.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect::<HashMap<_, _>>(),
    )
}

/// Tag reconciler backed by the remote tag API
///
/// Lists the current tags, untags what is gone or changed, then tags what is
/// missing. Nothing is sent when the sets already match.
pub struct ApiTagReconciler<T> {
    api: Arc<T>,
}

impl<T: TagApi> ApiTagReconciler<T> {
    pub fn new(api: Arc<T>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl<T: TagApi> TagReconciler for ApiTagReconciler<T> {
    async fn sync_tags(
        &self,
        resource_type: &str,
        resource_id: &str,
        desired: &Tags,
    ) -> ProviderResult<()> {
        let current = self.api.list_tags(resource_type, resource_id).await?;
        let diff = diff_tags(&current, desired);
        if diff.is_empty() {
            log::debug!("tags of {} already up to date", resource_id);
            return Ok(());
        }

        for keys in diff.remove.chunks(MAX_TAGS_PER_CALL) {
            log::debug!("untagging {}: {:?}", resource_id, keys);
            self.api
                .untag_resource(resource_type, resource_id, keys)
                .await?;
        }

        let additions: Vec<(String, String)> = diff.add.into_iter().collect();
        for chunk in additions.chunks(MAX_TAGS_PER_CALL) {
            let tags: Tags = chunk.iter().cloned().collect();
            log::debug!("tagging {}: {:?}", resource_id, tags);
            self.api.tag_resource(resource_type, resource_id, &tags).await?;
        }

        Ok(())
    }
}

/// Adapter between the route table reconciler and a [`TagReconciler`]
pub struct TagSync<R> {
    reconciler: Arc<R>,
}

impl<R: TagReconciler> TagSync<R> {
    pub fn new(reconciler: Arc<R>) -> Self {
        Self { reconciler }
    }

    /// Make the tags of route table `id` equal to `desired`
    pub async fn sync(&self, id: &str, desired: &Tags) -> ProviderResult<()> {
        if id.is_empty() {
            return Err(ProviderError::validation(
                "cannot sync tags without a route table id",
            ));
        }
        validate_tags(desired).map_err(ProviderError::validation)?;
        self.reconciler
            .sync_tags(ROUTE_TABLE_RESOURCE_TYPE, id, desired)
            .await
    }
}
