//! Adapter builder

use crate::context::{SessionContext, SessionHandle};
use crate::engine::SessionEngine;
use crate::error::AdapterResult;
use crate::events::Permission;

use super::config::{AdapterConfig, SecondCallPolicy, SendPolicy};
use super::SessionAdapter;

/// Builder for creating a session adapter
pub struct AdapterBuilder {
    config: AdapterConfig,
}

impl AdapterBuilder {
    /// Create a new adapter builder
    pub fn new() -> Self {
        Self {
            config: AdapterConfig::default(),
        }
    }

    /// Start from an existing configuration
    pub fn config(mut self, config: AdapterConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the iterate tick period in milliseconds
    pub fn iterate_interval_ms(mut self, interval_ms: u64) -> Self {
        self.config.iterate_interval_ms = interval_ms;
        self
    }

    /// Set the policy for sends against rooms that are not created yet
    pub fn send_policy(mut self, policy: SendPolicy) -> Self {
        self.config.send_policy = policy;
        self
    }

    /// Set the per-room send queue limit
    pub fn max_queued_sends(mut self, limit: usize) -> Self {
        self.config.max_queued_sends = limit;
        self
    }

    /// Set the policy for a second incoming call
    pub fn second_call_policy(mut self, policy: SecondCallPolicy) -> Self {
        self.config.second_call_policy = policy;
        self
    }

    /// Download incoming files as soon as they arrive
    pub fn auto_download(mut self, enabled: bool) -> Self {
        self.config.auto_download_files = enabled;
        self
    }

    /// Treat a permission as already granted
    pub fn grant_permission(mut self, permission: Permission) -> Self {
        self.config = self.config.with_granted_permission(permission);
        self
    }

    /// Set the effect broadcast channel capacity
    pub fn effect_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.effect_channel_capacity = capacity;
        self
    }

    /// Build the adapter
    pub fn build(self, engine: impl SessionEngine + 'static) -> AdapterResult<SessionAdapter> {
        SessionAdapter::new(self.config, Box::new(engine))
    }

    /// Build the adapter and start its session driver
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self, engine: impl SessionEngine + 'static) -> AdapterResult<SessionHandle> {
        Ok(SessionContext::start(self.build(engine)?))
    }
}

impl Default for AdapterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
