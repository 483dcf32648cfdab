//! Error types for the Appsody operator

use thiserror::Error;

/// Errors that can occur while reconciling an application
#[derive(Error, Debug)]
pub enum OperatorError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// A resource the application depends on does not exist yet
    #[error("Resource not found: {kind}/{name} in namespace {namespace}")]
    NotFound {
        kind: String,
        name: String,
        namespace: String,
    },

    /// Operator-side configuration (ConfigMaps, flags) is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The application spec failed validation after defaults were applied
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// A stack entry in the defaults or constants ConfigMap is not valid YAML
    #[error("Invalid stack configuration: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// The child object is controlled by another owner
    #[error("{kind} {name} is already controlled by {controller}")]
    OwnershipConflict {
        kind: String,
        name: String,
        controller: String,
    },

    /// A required API group is not served by the cluster
    #[error("API {0} is not available on this cluster")]
    ApiUnavailable(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Metrics error: {0}")]
    MetricsError(#[from] prometheus::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for operator operations
pub type Result<T> = std::result::Result<T, OperatorError>;

impl OperatorError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self, OperatorError::ValidationError(_))
    }

    /// Reason recorded on the `Reconciled` status condition
    pub fn reason(&self) -> &'static str {
        match self {
            OperatorError::KubeError(_) => "KubernetesApiError",
            OperatorError::NotFound { .. } => "DependencyNotFound",
            OperatorError::InvalidConfig(_) | OperatorError::YamlError(_) => "InvalidOperatorConfig",
            OperatorError::ValidationError(_) => "ValidationFailed",
            OperatorError::OwnershipConflict { .. } => "OwnershipConflict",
            OperatorError::ApiUnavailable(_) => "ApiUnavailable",
            OperatorError::SerializationError(_) => "SerializationError",
            OperatorError::MetricsError(_) | OperatorError::IoError(_) => "InternalError",
        }
    }

    pub fn not_found(kind: &str, name: &str, namespace: &str) -> Self {
        OperatorError::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
        }
    }
}
