//! Gateway state
//!
//! Application state for the gateway server, built once and cloned into
//! every connection task.

use crate::broadcast::EventDispatcher;
use crate::connection::SessionRegistry;
use crate::protocol::HelloPayload;
use chat_common::{AppConfig, GatewayConfig};
use chat_core::{Authenticator, Storage};
use std::sync::Arc;

/// Gateway application state
#[derive(Clone)]
pub struct GatewayState {
    /// Application configuration
    config: Arc<AppConfig>,
    /// Live and resumable sessions
    registry: Arc<SessionRegistry>,
    /// Subscription tables and fanout
    dispatcher: Arc<EventDispatcher>,
    /// Read projections for READY snapshots
    storage: Arc<dyn Storage>,
    /// Token verification for IDENTIFY and RESUME
    authenticator: Arc<dyn Authenticator>,
}

impl GatewayState {
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn Storage>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        let registry = SessionRegistry::new_shared(config.gateway.resume_window());
        let dispatcher = EventDispatcher::new_shared(registry.clone());
        Self {
            config: Arc::new(config),
            registry,
            dispatcher,
            storage,
            authenticator,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn gateway_config(&self) -> &GatewayConfig {
        &self.config.gateway
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    /// Diagnostic trace list sent in HELLO, READY and RESUMED
    pub fn trace(&self) -> Vec<String> {
        vec![self.config.gateway.trace_name.clone()]
    }

    pub fn hello(&self) -> HelloPayload {
        HelloPayload::new(self.config.gateway.heartbeat_interval_ms, self.trace())
    }
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("sessions", &self.registry.len())
            .field("retained", &self.registry.retained_count())
            .field("config", &"AppConfig")
            .finish()
    }
}
