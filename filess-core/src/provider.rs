//! Provider - Trait abstracting resource operations
//!
//! A Provider defines operations for a specific backend API.
//! It is responsible for converting desired resources into actual API calls.

use std::future::Future;
use std::pin::Pin;

use crate::diagnostic::Diagnostic;
use crate::resource::{Resource, ResourceId, State};
use crate::schema::ResourceSchema;

/// Classification of a provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Backend or transport failure
    General,
    /// Configuration could not be turned into a request
    InvalidConfig,
    /// An asynchronous operation did not finish in time
    Timeout,
    /// The caller asked the operation to stop
    Cancelled,
}

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub message: String,
    pub kind: ErrorKind,
    pub resource_id: Option<ResourceId>,
    /// Backend identifier of a resource that exists despite the failure
    pub identifier: Option<String>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref id) = self.resource_id {
            write!(f, "[{}.{}] {}", id.resource_type, id.name, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ErrorKind::General,
            resource_id: None,
            identifier: None,
            cause: None,
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::new(message).with_kind(ErrorKind::InvalidConfig)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(message).with_kind(ErrorKind::Timeout)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(message).with_kind(ErrorKind::Cancelled)
    }

    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    /// Record that the resource was created under `identifier` before failing
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::Timeout
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A successful operation result together with its non-fatal diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub value: T,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Outcome<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            diagnostics: Vec::new(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Vec<Diagnostic>) -> Self {
        self.diagnostics.extend(diagnostics);
        self
    }
}

/// Definition of resource types that a Provider can handle
pub trait ResourceType: Send + Sync {
    /// Resource type name (e.g., "filess_database")
    fn name(&self) -> &'static str;

    /// Attribute schema for this resource type
    fn schema(&self) -> ResourceSchema;
}

/// Main Provider trait
///
/// All operations are async and involve side effects.
pub trait Provider: Send + Sync {
    /// Name of this Provider (e.g., "filess")
    fn name(&self) -> &'static str;

    /// List of resource types this Provider can handle
    fn resource_types(&self) -> Vec<Box<dyn ResourceType>>;

    /// Get the current state of a resource
    ///
    /// Returns `State::not_found()` if the resource no longer exists.
    fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>>;

    /// Create a resource
    ///
    /// Returns State with identifier set to the backend id.
    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<Outcome<State>>>;

    /// Update a resource
    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<Outcome<State>>>;

    /// Delete a resource
    ///
    /// Deleting a resource that is already gone is not an error.
    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>>;
}

/// Provider implementation for Box<dyn Provider>
/// This enables dynamic dispatch for Providers
impl Provider for Box<dyn Provider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        (**self).resource_types()
    }

    fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read(id, identifier)
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<Outcome<State>>> {
        (**self).create(resource)
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<Outcome<State>>> {
        (**self).update(id, identifier, from, to)
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        (**self).delete(id, identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Diagnostic;

    // Mock Provider for testing
    struct MockProvider;

    impl Provider for MockProvider {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
            vec![]
        }

        fn read(
            &self,
            id: &ResourceId,
            _identifier: &str,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            let id = id.clone();
            Box::pin(async move { Ok(State::not_found(id)) })
        }

        fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<Outcome<State>>> {
            let id = resource.id.clone();
            let attrs = resource.attributes.clone();
            Box::pin(async move {
                Ok(
                    Outcome::new(State::existing(id, attrs).with_identifier("mock-id-123"))
                        .with_diagnostics(vec![Diagnostic::warning("heads up", "")]),
                )
            })
        }

        fn update(
            &self,
            id: &ResourceId,
            _identifier: &str,
            _from: &State,
            to: &Resource,
        ) -> BoxFuture<'_, ProviderResult<Outcome<State>>> {
            let id = id.clone();
            let attrs = to.attributes.clone();
            Box::pin(async move { Ok(Outcome::new(State::existing(id, attrs))) })
        }

        fn delete(&self, _id: &ResourceId, _identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[tokio::test]
    async fn mock_provider_read_returns_not_found() {
        let provider: Box<dyn Provider> = Box::new(MockProvider);
        let id = ResourceId::new("test", "example");
        let state = provider.read(&id, "1").await.unwrap();
        assert!(!state.exists);
    }

    #[tokio::test]
    async fn mock_provider_create_returns_existing() {
        let provider = MockProvider;
        let resource = Resource::new("test", "example");
        let outcome = provider.create(&resource).await.unwrap();
        assert!(outcome.value.exists);
        assert_eq!(outcome.value.identifier, Some("mock-id-123".to_string()));
        assert_eq!(outcome.diagnostics.len(), 1);
    }

    #[test]
    fn provider_error_display_includes_resource() {
        let err = ProviderError::timeout("timed out waiting")
            .for_resource(ResourceId::new("filess_database", "main"))
            .with_identifier("501");
        assert_eq!(err.to_string(), "[filess_database.main] timed out waiting");
        assert!(err.is_timeout());
        assert_eq!(err.identifier.as_deref(), Some("501"));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn cancelled_error_keeps_identifier() {
        let err = ProviderError::cancelled("stopped").with_identifier("501");
        assert!(err.is_cancelled());
        assert!(!err.is_timeout());
        assert_eq!(err.identifier.as_deref(), Some("501"));
    }
}
