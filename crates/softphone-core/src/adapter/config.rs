//! Adapter configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, AdapterResult};
use crate::events::Permission;

/// What happens to a send against a room that is not created yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendPolicy {
    /// Hold the send and flush it once the room is created
    #[default]
    Queue,
    /// Refuse the send immediately
    Reject,
}

/// What happens to an incoming call while another call is tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecondCallPolicy {
    /// Ask the engine to decline it as busy
    #[default]
    Decline,
    /// Log and leave it to the engine
    Ignore,
}

/// Configuration for the session adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Iterate tick period of the session driver in milliseconds
    pub iterate_interval_ms: u64,
    /// Sends against rooms that are not created yet
    pub send_policy: SendPolicy,
    /// Maximum queued sends per room
    pub max_queued_sends: usize,
    /// Incoming call while a call is tracked
    pub second_call_policy: SecondCallPolicy,
    /// Download incoming file attachments as soon as they arrive
    pub auto_download_files: bool,
    /// Permissions already granted at startup
    pub granted_permissions: Vec<Permission>,
    /// Capacity of the effect broadcast channel
    pub effect_channel_capacity: usize,
}

impl AdapterConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self {
            iterate_interval_ms: 20,
            send_policy: SendPolicy::Queue,
            max_queued_sends: 32,
            second_call_policy: SecondCallPolicy::Decline,
            auto_download_files: false,
            granted_permissions: Vec::new(),
            effect_channel_capacity: 256,
        }
    }

    /// Load a configuration from JSON; absent fields take their defaults
    pub fn from_json(json: &str) -> AdapterResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            AdapterError::invalid_configuration("adapter", e.to_string())
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Set the iterate tick period
    pub fn with_iterate_interval_ms(mut self, interval_ms: u64) -> Self {
        self.iterate_interval_ms = interval_ms;
        self
    }

    /// Set the send policy
    pub fn with_send_policy(mut self, policy: SendPolicy) -> Self {
        self.send_policy = policy;
        self
    }

    /// Set the per-room send queue limit
    pub fn with_max_queued_sends(mut self, limit: usize) -> Self {
        self.max_queued_sends = limit;
        self
    }

    /// Set the second incoming call policy
    pub fn with_second_call_policy(mut self, policy: SecondCallPolicy) -> Self {
        self.second_call_policy = policy;
        self
    }

    /// Enable automatic download of incoming files
    pub fn with_auto_download(mut self, enabled: bool) -> Self {
        self.auto_download_files = enabled;
        self
    }

    /// Mark a permission as granted at startup
    pub fn with_granted_permission(mut self, permission: Permission) -> Self {
        if !self.granted_permissions.contains(&permission) {
            self.granted_permissions.push(permission);
        }
        self
    }

    /// Iterate tick period
    pub fn iterate_interval(&self) -> Duration {
        Duration::from_millis(self.iterate_interval_ms)
    }

    pub fn validate(&self) -> AdapterResult<()> {
        if !(1..=1000).contains(&self.iterate_interval_ms) {
            return Err(AdapterError::invalid_configuration(
                "iterate_interval_ms",
                format!("{} is outside 1..=1000", self.iterate_interval_ms),
            ));
        }
        if self.send_policy == SendPolicy::Queue && self.max_queued_sends == 0 {
            return Err(AdapterError::invalid_configuration(
                "max_queued_sends",
                "must be at least 1 with the queue policy",
            ));
        }
        if self.effect_channel_capacity == 0 {
            return Err(AdapterError::invalid_configuration(
                "effect_channel_capacity",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self::new()
    }
}
