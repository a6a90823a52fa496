//! Provider configuration

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use rudder_core::provider::ProviderError;
use rudder_core::resource::Value;

use crate::utils::normalize_region;

/// Default create/delete wait
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(500);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("region is required")]
    MissingRegion,

    #[error("'{field}' must be {expected}")]
    InvalidAttribute {
        field: String,
        expected: &'static str,
    },

    #[error("'{field}' must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("poll_interval ({interval:?}) must not be shorter than min_poll_interval ({min:?})")]
    IntervalBelowMinimum { interval: Duration, min: Duration },
}

impl From<ConfigError> for ProviderError {
    fn from(e: ConfigError) -> Self {
        ProviderError::validation(format!("Invalid provider configuration: {}", e)).with_cause(e)
    }
}

/// Configuration of the ApsaraStack provider
///
/// There is no default: a region is always required, so build one with
/// [`ProviderConfig::new`]. Durations are expressed in whole seconds when
/// (de)serialized and fall back to the defaults when omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub region_id: String,
    #[serde(with = "duration_secs", default = "default_timeout")]
    pub create_timeout: Duration,
    #[serde(with = "duration_secs", default = "default_timeout")]
    pub delete_timeout: Duration,
    #[serde(with = "duration_secs", default = "default_poll_interval")]
    pub poll_interval: Duration,
    #[serde(with = "duration_secs", default = "default_min_poll_interval")]
    pub min_poll_interval: Duration,
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

fn default_min_poll_interval() -> Duration {
    DEFAULT_MIN_POLL_INTERVAL
}

impl ProviderConfig {
    pub fn new(region_id: impl Into<String>) -> Self {
        Self {
            region_id: region_id.into(),
            create_timeout: DEFAULT_TIMEOUT,
            delete_timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            min_poll_interval: DEFAULT_MIN_POLL_INTERVAL,
        }
    }

    pub fn with_timeouts(mut self, create: Duration, delete: Duration) -> Self {
        self.create_timeout = create;
        self.delete_timeout = delete;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration, min_interval: Duration) -> Self {
        self.poll_interval = interval;
        self.min_poll_interval = min_interval;
        self
    }

    /// Build a configuration from a provider block's attributes
    ///
    /// Recognized attributes: `region` (required), and `create_timeout`,
    /// `delete_timeout`, `poll_interval`, `min_poll_interval` in seconds.
    pub fn from_attributes(attributes: &HashMap<String, Value>) -> Result<Self, ConfigError> {
        let region = match attributes.get("region") {
            Some(Value::String(s)) => normalize_region(s),
            Some(_) => {
                return Err(ConfigError::InvalidAttribute {
                    field: "region".to_string(),
                    expected: "a string",
                });
            }
            None => return Err(ConfigError::MissingRegion),
        };

        let mut config = Self::new(region);
        let durations: [(&str, &mut Duration); 4] = [
            ("create_timeout", &mut config.create_timeout),
            ("delete_timeout", &mut config.delete_timeout),
            ("poll_interval", &mut config.poll_interval),
            ("min_poll_interval", &mut config.min_poll_interval),
        ];
        for (field, slot) in durations {
            match attributes.get(field) {
                Some(Value::Int(secs)) if *secs >= 0 => *slot = Duration::from_secs(*secs as u64),
                Some(_) => {
                    return Err(ConfigError::InvalidAttribute {
                        field: field.to_string(),
                        expected: "a non-negative number of seconds",
                    });
                }
                None => {}
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region_id.is_empty() {
            return Err(ConfigError::MissingRegion);
        }
        let durations = [
            ("create_timeout", self.create_timeout),
            ("delete_timeout", self.delete_timeout),
            ("min_poll_interval", self.min_poll_interval),
        ];
        for (field, value) in durations {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration { field });
            }
        }
        if self.poll_interval < self.min_poll_interval {
            return Err(ConfigError::IntervalBelowMinimum {
                interval: self.poll_interval,
                min: self.min_poll_interval,
            });
        }
        Ok(())
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
