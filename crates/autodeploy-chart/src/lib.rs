//! Manifest generation for auto-deploy releases
//!
//! Expands a release's values tree into Kubernetes primitives: one web
//! Deployment, one Deployment per configured worker, and an optional
//! NetworkPolicy. Generation is a pure function of its inputs; nothing here
//! talks to a cluster.
//!
//! # Usage
//!
//! ```rust,ignore
//! let values = ValuesLoader::new()
//!     .with_yaml(&std::fs::read_to_string("values.yaml")?)?
//!     .with_set("workers.sidekiq.command[0]=bundle")?
//!     .build()?;
//!
//! let manifests = ChartRenderer::new("production", &values).render();
//! println!("{}", manifests.to_yaml()?);
//! ```

#![deny(missing_docs)]

pub mod error;
pub mod k8s;
pub mod labels;
pub mod manifest;
pub mod naming;
pub mod network_policy;
pub mod values;
pub mod workload;

pub use error::ChartError;
pub use labels::{ChartIdentity, LabelContext, ResourceLabels, Tier};
pub use manifest::{ChartRenderer, GeneratedResource, ManifestSet};
pub use naming::ResourceNames;
pub use network_policy::{NetworkPolicyGenerator, NetworkPolicyMode};
pub use values::{ReleaseValues, StrategyType, ValuesLoader, Worker, WorkerSpec, Workers};
pub use workload::WorkloadGenerator;

/// Result type alias using the chart error type
pub type Result<T> = std::result::Result<T, ChartError>;

/// Name of the chart; also used as the container name
pub const CHART_NAME: &str = "auto-deploy-app";

/// Version of the chart carried in the `chart` label
pub const CHART_VERSION: &str = "0.4.1";

/// Value of the `heritage` label on every top-level resource
pub const HERITAGE: &str = "Tiller";

/// Maximum length of a Kubernetes object name (DNS-1123 label)
pub const DNS_LABEL_MAX_LEN: usize = 63;
