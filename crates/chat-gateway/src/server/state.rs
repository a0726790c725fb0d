//! Gateway state
//!
//! Application state for the gateway server.

use crate::broadcast::EventDispatcher;
use crate::connection::SessionRegistry;
use crate::presence::PresenceTracker;
use chat_common::{JwtService, SessionConfig};
use std::sync::Arc;

/// Gateway application state
///
/// Holds all shared dependencies for the gateway server.
#[derive(Clone)]
pub struct GatewayState {
    registry: Arc<SessionRegistry>,
    dispatcher: Arc<EventDispatcher>,
    jwt_service: Arc<JwtService>,
    /// Session timing shared by every connection
    config: SessionConfig,
}

impl GatewayState {
    /// Create a new gateway state
    pub fn new(
        dispatcher: Arc<EventDispatcher>,
        jwt_service: Arc<JwtService>,
        config: SessionConfig,
    ) -> Self {
        Self {
            registry: dispatcher.registry().clone(),
            dispatcher,
            jwt_service,
            config,
        }
    }

    /// Get the session registry
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Get the event dispatcher
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// Get the presence tracker
    pub fn presence(&self) -> &Arc<PresenceTracker> {
        self.dispatcher.presence()
    }

    /// Get the JWT service
    pub fn jwt_service(&self) -> &JwtService {
        &self.jwt_service
    }

    pub fn session_config(&self) -> SessionConfig {
        self.config
    }
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
