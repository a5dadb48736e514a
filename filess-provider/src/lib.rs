//! Filess Provider
//!
//! Provider for managed databases on filess.io.
//!
//! ## Module Structure
//!
//! - `client` - Authenticated HTTP transport with retry
//! - `config` - Provider configuration (token, base URL)
//! - `database` - `filess_database` lifecycle
//! - `wait` - Provisioning wait loop
//! - `resources` - Resource type definitions and schema
//! - `notify` - Terminal notifications
//! - `utils` - Field extraction from API payloads

pub mod client;
pub mod config;
pub mod database;
pub mod notify;
pub mod resources;
pub mod utils;
pub mod wait;

// Re-export main types
pub use client::{ApiClient, ApiError, ApiResponse, ClientError};
pub use config::{ConfigError, ProviderConfig};
pub use database::DatabaseController;
pub use wait::{Cancellation, WaitConfig};

use filess_core::provider::{BoxFuture, Outcome, Provider, ProviderError, ProviderResult, ResourceType};
use filess_core::resource::{Resource, ResourceId, State};

use resources::{DATABASE_TYPE, resource_types};

/// filess.io Provider
#[derive(Clone)]
pub struct FilessProvider {
    databases: DatabaseController,
}

impl FilessProvider {
    pub fn new(client: ApiClient) -> Self {
        Self::with_controller(DatabaseController::new(client))
    }

    pub fn with_controller(databases: DatabaseController) -> Self {
        Self { databases }
    }

    /// Validate the configuration and open a session
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.connect()?))
    }

    fn check_type(id: &ResourceId) -> ProviderResult<()> {
        if id.resource_type == DATABASE_TYPE {
            Ok(())
        } else {
            Err(
                ProviderError::new(format!("Unknown resource type: {}", id.resource_type))
                    .for_resource(id.clone()),
            )
        }
    }
}

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for FilessProvider {
    fn name(&self) -> &'static str {
        "filess"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        resource_types()
    }

    fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move {
            Self::check_type(&id)?;
            self.databases.read(&id, &identifier).await
        })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<Outcome<State>>> {
        let resource = resource.clone();
        Box::pin(async move {
            Self::check_type(&resource.id)?;
            self.databases.create(&resource).await
        })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        _from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<Outcome<State>>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let to = to.clone();
        Box::pin(async move {
            Self::check_type(&id)?;
            self.databases.update(&id, &identifier, &to).await
        })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move {
            Self::check_type(&id)?;
            self.databases.delete(&id, &identifier).await
        })
    }
}
