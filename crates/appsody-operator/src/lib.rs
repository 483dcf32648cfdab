//! # Appsody Application Operator
//!
//! Kubernetes operator that turns `AppsodyApplication` resources into
//! Deployments or StatefulSets, Services, Routes, autoscalers, Knative
//! services and ServiceMonitors, and wires applications together through
//! binding Secrets.

pub mod binding;
pub mod controller;
pub mod crds;
pub mod defaults;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod reconciler;
pub mod resources;
pub mod watchers;

pub use controller::{run_controller, ClusterApis, ControllerContext, DiscoveryCache};
pub use crds::{AppsodyApplication, AppsodyApplicationSpec, AppsodyApplicationStatus};
pub use error::{OperatorError, Result};
pub use manager::{OperatorBuilder, OperatorManager};
pub use reconciler::{ClusterReader, ObjectClient, OperationResult, ReconcilerBase};

use std::net::SocketAddr;
use std::time::Duration;

/// Default interval between reconciles of a healthy application
pub const DEFAULT_RESYNC_SECONDS: u64 = 300;

/// Operator configuration
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Namespace to watch; `None` watches the whole cluster
    pub watch_namespace: Option<String>,

    /// Namespace holding the defaults, constants and operator ConfigMaps.
    /// Falls back to the application's own namespace.
    pub operator_namespace: Option<String>,

    pub resync_interval: Duration,
    pub health_addr: SocketAddr,
    pub metrics_addr: SocketAddr,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            operator_namespace: None,
            resync_interval: Duration::from_secs(DEFAULT_RESYNC_SECONDS),
            health_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

pub mod prelude {
    //! Re-exports for convenient usage
    pub use crate::binding::{binding_env_name, binding_secret_name, BindingWiring};
    pub use crate::crds::{
        AppsodyApplication, AppsodyApplicationSpec, AppsodyApplicationStatus, ConditionStatus,
        ConditionType, StatusCondition,
    };
    pub use crate::defaults::{init_and_validate, OperatorSettings, StackLayers};
    pub use crate::error::{OperatorError, Result};
    pub use crate::manager::{OperatorBuilder, OperatorManager};
    pub use crate::OperatorConfig;
}
