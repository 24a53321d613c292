//! Core types for modelhub-deploy.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wrap a raw database identifier.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Get the raw identifier.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

numeric_id!(
    /// Unique identifier for a deployment.
    DeploymentId
);
numeric_id!(
    /// Unique identifier for a user (deployment and model owner).
    UserId
);
numeric_id!(
    /// Unique identifier for a model.
    ModelId
);
numeric_id!(
    /// Unique identifier for a model version.
    ModelVersionId
);
numeric_id!(
    /// Unique identifier for a deployment event.
    EventId
);

/// Lifecycle status of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Created, provisioning not yet started.
    Pending,
    /// Provisioning task is preparing the build.
    Building,
    /// Start requested or endpoint being activated.
    Deploying,
    /// Serving at its endpoint URL.
    Running,
    /// Provisioning failed; `start` re-enters `Deploying`.
    Failed,
    /// Stopped by the owner.
    Stopped,
    /// Reserved for configuration hot-reloads.
    Updating,
}

impl DeploymentStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 7] = [
        Self::Pending,
        Self::Building,
        Self::Deploying,
        Self::Running,
        Self::Failed,
        Self::Stopped,
        Self::Updating,
    ];

    /// Get the status name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Building => "building",
            Self::Deploying => "deploying",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
            Self::Updating => "updating",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DeploymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown deployment status: {s}"))
    }
}

/// How a deployment is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentKind {
    /// Container image behind a load balancer.
    #[default]
    Container,
    /// Serverless function.
    Serverless,
    /// Dedicated inference endpoint.
    #[serde(alias = "dedicated_endpoint", alias = "dedicated-endpoint")]
    Endpoint,
}

impl DeploymentKind {
    /// Get the kind name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::Serverless => "serverless",
            Self::Endpoint => "endpoint",
        }
    }
}

impl fmt::Display for DeploymentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DeploymentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "container" => Ok(Self::Container),
            "serverless" => Ok(Self::Serverless),
            "endpoint" | "dedicated_endpoint" | "dedicated-endpoint" => Ok(Self::Endpoint),
            _ => Err(format!("unknown deployment kind: {s}")),
        }
    }
}

/// Resource limits for a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// CPU cores.
    #[serde(default = "default_cpu_cores")]
    pub cpu_cores: f64,
    /// Memory in MB.
    #[serde(default = "default_memory_mb")]
    pub memory_mb: u32,
    /// Minimum replica count.
    #[serde(default = "default_min_replicas")]
    pub min_replicas: u32,
    /// Maximum replica count.
    #[serde(default = "default_max_replicas")]
    pub max_replicas: u32,
}

const fn default_cpu_cores() -> f64 {
    1.0
}

const fn default_memory_mb() -> u32 {
    512
}

const fn default_min_replicas() -> u32 {
    1
}

const fn default_max_replicas() -> u32 {
    3
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu_cores: default_cpu_cores(),
            memory_mb: default_memory_mb(),
            min_replicas: default_min_replicas(),
            max_replicas: default_max_replicas(),
        }
    }
}

/// Autoscaling thresholds, as CPU percentages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutoscalePolicy {
    /// Whether autoscaling is enabled.
    #[serde(default = "default_autoscale_enabled")]
    pub enabled: bool,
    /// Scale up above this percentage.
    #[serde(default = "default_scale_up")]
    pub scale_up_threshold: f64,
    /// Scale down below this percentage.
    #[serde(default = "default_scale_down")]
    pub scale_down_threshold: f64,
}

const fn default_autoscale_enabled() -> bool {
    true
}

const fn default_scale_up() -> f64 {
    70.0
}

const fn default_scale_down() -> f64 {
    30.0
}

impl Default for AutoscalePolicy {
    fn default() -> Self {
        Self {
            enabled: default_autoscale_enabled(),
            scale_up_threshold: default_scale_up(),
            scale_down_threshold: default_scale_down(),
        }
    }
}

/// Environment variables passed to a deployment.
///
/// Immutable once built; a patch replaces the whole set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvVars(BTreeMap<String, String>);

impl EnvVars {
    /// Look up a variable.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Iterate over variables in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no variables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvVars {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

fn default_health_check_path() -> String {
    "/health".to_owned()
}

/// Request to create a deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentSpec {
    /// Name, unique per owner.
    pub name: String,
    /// Optional free-text description.
    #[serde(default)]
    pub description: Option<String>,
    /// How the deployment is served.
    #[serde(default)]
    pub kind: DeploymentKind,
    /// Model to deploy.
    pub model_id: ModelId,
    /// Version to deploy; the latest version when absent.
    #[serde(default)]
    pub model_version_id: Option<ModelVersionId>,
    /// Resource limits.
    #[serde(default)]
    pub resources: ResourceLimits,
    /// Environment variables.
    #[serde(default)]
    pub env: EnvVars,
    /// Path probed by health checks.
    #[serde(default = "default_health_check_path")]
    pub health_check_path: String,
    /// Autoscaling thresholds.
    #[serde(default)]
    pub autoscale: AutoscalePolicy,
}

impl DeploymentSpec {
    /// Create a spec with default configuration.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: DeploymentKind, model_id: ModelId) -> Self {
        Self {
            name: name.into(),
            description: None,
            kind,
            model_id,
            model_version_id: None,
            resources: ResourceLimits::default(),
            env: EnvVars::default(),
            health_check_path: default_health_check_path(),
            autoscale: AutoscalePolicy::default(),
        }
    }
}

/// Partial update of a deployment's configuration.
///
/// Only fields that are present are applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentPatch {
    /// New name.
    #[serde(default)]
    pub name: Option<String>,
    /// New description.
    #[serde(default)]
    pub description: Option<String>,
    /// New CPU limit.
    #[serde(default)]
    pub cpu_cores: Option<f64>,
    /// New memory limit.
    #[serde(default)]
    pub memory_mb: Option<u32>,
    /// New minimum replica count.
    #[serde(default)]
    pub min_replicas: Option<u32>,
    /// New maximum replica count.
    #[serde(default)]
    pub max_replicas: Option<u32>,
    /// Replacement environment variables.
    #[serde(default)]
    pub env: Option<EnvVars>,
    /// New health check path.
    #[serde(default)]
    pub health_check_path: Option<String>,
    /// Enable or disable autoscaling.
    #[serde(default)]
    pub autoscale_enabled: Option<bool>,
    /// New scale-up threshold.
    #[serde(default)]
    pub scale_up_threshold: Option<f64>,
    /// New scale-down threshold.
    #[serde(default)]
    pub scale_down_threshold: Option<f64>,
}

impl DeploymentPatch {
    /// Apply present fields to a record, returning the names of changed fields.
    ///
    /// Does not touch status, endpoint or timestamps.
    pub fn apply(self, record: &mut DeploymentRecord) -> Vec<&'static str> {
        let mut changed = Vec::new();

        if let Some(name) = self.name {
            record.name = name;
            changed.push("name");
        }
        if let Some(description) = self.description {
            record.description = Some(description);
            changed.push("description");
        }
        if let Some(cpu_cores) = self.cpu_cores {
            record.resources.cpu_cores = cpu_cores;
            changed.push("cpu_cores");
        }
        if let Some(memory_mb) = self.memory_mb {
            record.resources.memory_mb = memory_mb;
            changed.push("memory_mb");
        }
        if let Some(min_replicas) = self.min_replicas {
            record.resources.min_replicas = min_replicas;
            changed.push("min_replicas");
        }
        if let Some(max_replicas) = self.max_replicas {
            record.resources.max_replicas = max_replicas;
            changed.push("max_replicas");
        }
        if let Some(env) = self.env {
            record.env = env;
            changed.push("env");
        }
        if let Some(path) = self.health_check_path {
            record.health_check_path = path;
            changed.push("health_check_path");
        }
        if let Some(enabled) = self.autoscale_enabled {
            record.autoscale.enabled = enabled;
            changed.push("autoscale_enabled");
        }
        if let Some(up) = self.scale_up_threshold {
            record.autoscale.scale_up_threshold = up;
            changed.push("scale_up_threshold");
        }
        if let Some(down) = self.scale_down_threshold {
            record.autoscale.scale_down_threshold = down;
            changed.push("scale_down_threshold");
        }

        changed
    }
}

/// Usage counters recorded against a deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageCounters {
    /// Number of prediction requests served.
    pub request_count: u64,
    /// Average response time in milliseconds.
    pub avg_response_time_ms: Option<f64>,
    /// Time of the last prediction request.
    pub last_request_at: Option<DateTime<Utc>>,
    /// Time of the last health check.
    pub last_health_check: Option<DateTime<Utc>>,
}

/// A deployment that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct DeploymentDraft {
    /// Owner of the deployment.
    pub owner_id: UserId,
    /// Validated creation request.
    pub spec: DeploymentSpec,
    /// Resolved model version.
    pub model_version_id: ModelVersionId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl DeploymentDraft {
    /// Create a draft for a resolved model version.
    #[must_use]
    pub fn new(owner_id: UserId, spec: DeploymentSpec, model_version_id: ModelVersionId) -> Self {
        Self {
            owner_id,
            spec,
            model_version_id,
            created_at: Utc::now(),
        }
    }

    /// Build the initial `Pending` record once the store has assigned an ID.
    #[must_use]
    pub fn into_record(self, id: DeploymentId) -> DeploymentRecord {
        DeploymentRecord {
            id,
            owner_id: self.owner_id,
            name: self.spec.name,
            description: self.spec.description,
            kind: self.spec.kind,
            model_id: self.spec.model_id,
            model_version_id: self.model_version_id,
            resources: self.spec.resources,
            env: self.spec.env,
            health_check_path: self.spec.health_check_path,
            autoscale: self.spec.autoscale,
            status: DeploymentStatus::Pending,
            endpoint_url: None,
            error_message: None,
            generation: 1,
            created_at: self.created_at,
            updated_at: self.created_at,
            deployed_at: None,
            usage: UsageCounters::default(),
        }
    }
}

/// A deployment as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// Deployment ID.
    pub id: DeploymentId,
    /// Owner.
    pub owner_id: UserId,
    /// Name, unique per owner.
    pub name: String,
    /// Description.
    pub description: Option<String>,
    /// How the deployment is served.
    pub kind: DeploymentKind,
    /// Deployed model.
    pub model_id: ModelId,
    /// Deployed model version.
    pub model_version_id: ModelVersionId,
    /// Resource limits.
    pub resources: ResourceLimits,
    /// Environment variables.
    pub env: EnvVars,
    /// Health check path.
    pub health_check_path: String,
    /// Autoscaling thresholds.
    pub autoscale: AutoscalePolicy,
    /// Current status.
    pub status: DeploymentStatus,
    /// Public endpoint, only while running.
    pub endpoint_url: Option<String>,
    /// Failure reason, only while failed.
    pub error_message: Option<String>,
    /// Fencing token, bumped by every start and stop.
    pub generation: u64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Time the deployment last reached `Running`.
    pub deployed_at: Option<DateTime<Utc>>,
    /// Usage counters.
    pub usage: UsageCounters,
}

impl DeploymentRecord {
    /// Metrics snapshot for this deployment.
    ///
    /// There is no live scaling or resource signal: replicas are reported as
    /// the configured minimum and CPU/memory usage are always unset.
    #[must_use]
    pub fn metrics(&self) -> DeploymentMetrics {
        DeploymentMetrics {
            request_count: self.usage.request_count,
            avg_response_time: self.usage.avg_response_time_ms,
            last_request_at: self.usage.last_request_at,
            last_health_check: self.usage.last_health_check,
            current_replicas: self.resources.min_replicas,
            cpu_usage: None,
            memory_usage: None,
        }
    }
}

/// Metrics snapshot for a deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentMetrics {
    /// Number of prediction requests served.
    pub request_count: u64,
    /// Average response time in milliseconds.
    pub avg_response_time: Option<f64>,
    /// Time of the last prediction request.
    pub last_request_at: Option<DateTime<Utc>>,
    /// Time of the last health check.
    pub last_health_check: Option<DateTime<Utc>>,
    /// Current replica count.
    pub current_replicas: u32,
    /// CPU usage percentage.
    pub cpu_usage: Option<f64>,
    /// Memory usage percentage.
    pub memory_usage: Option<f64>,
}

/// Severity of a deployment event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventLevel {
    /// Diagnostic detail.
    Debug,
    /// Normal lifecycle progress.
    Info,
    /// Something unexpected but recoverable.
    Warning,
    /// Failure.
    Error,
}

impl EventLevel {
    /// Get the level name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARNING" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            _ => Err(format!("unknown event level: {s}")),
        }
    }
}

/// An event to append to a deployment's log.
#[derive(Debug, Clone)]
pub struct NewEvent {
    /// Owning deployment.
    pub deployment_id: DeploymentId,
    /// Severity.
    pub level: EventLevel,
    /// Message.
    pub message: String,
    /// Component that produced the event.
    pub component: String,
    /// Structured metadata.
    pub metadata: serde_json::Value,
}

/// A persisted deployment event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentEvent {
    /// Event ID, increasing in append order.
    pub id: EventId,
    /// Owning deployment.
    pub deployment_id: DeploymentId,
    /// Severity.
    pub level: EventLevel,
    /// Message.
    pub message: String,
    /// Component that produced the event.
    pub component: String,
    /// Structured metadata.
    pub metadata: serde_json::Value,
    /// Append time.
    pub created_at: DateTime<Utc>,
}

/// A model as seen by the deployment subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    /// Model ID.
    pub id: ModelId,
    /// Owner.
    pub owner_id: UserId,
    /// Display name.
    pub name: String,
    /// Framework (pytorch, tensorflow, onnx, ...).
    pub framework: String,
}

/// A model version as seen by the deployment subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersion {
    /// Version ID.
    pub id: ModelVersionId,
    /// Parent model.
    pub model_id: ModelId,
    /// Version label.
    pub version: String,
    /// Where the uploaded artifact is stored.
    pub artifact_path: String,
    /// Upload time.
    pub created_at: DateTime<Utc>,
}
