use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Identifier assigned to a [`Service`] by the store on registration.
pub type ServiceId = i64;

/// Identifier assigned to a [`CheckResult`] by the store on save.
pub type ResultId = i64;

/// Protocol used to probe a service target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Http,
    Tcp,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::Http => write!(f, "http"),
            ServiceKind::Tcp => write!(f, "tcp"),
        }
    }
}

/// A monitored network endpoint.
///
/// A freshly built service carries id `0`; the store assigns the real
/// identifier when the service is registered and never lets callers pick it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    pub kind: ServiceKind,
    /// URL for `http` services, `host:port` for `tcp` services.
    pub target: String,
    /// Desired check cadence in seconds. Stored for reporting; the scheduler
    /// probes every service on one shared tick.
    pub interval_secs: u64,
    /// Optional availability objective label, e.g. "99.9".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slo_target: Option<String>,
}

impl Service {
    /// Create an unregistered service definition.
    pub fn new(
        name: impl Into<String>,
        kind: ServiceKind,
        target: impl Into<String>,
        interval_secs: u64,
    ) -> Self {
        Self {
            id: 0,
            name: name.into(),
            kind,
            target: target.into(),
            interval_secs,
            slo_target: None,
        }
    }

    /// Attach an availability objective label.
    pub fn with_slo_target(mut self, slo_target: impl Into<String>) -> Self {
        self.slo_target = Some(slo_target.into());
        self
    }

    /// Check that the definition is complete enough to be registered and
    /// probed. Stores accept whatever they are given; registration
    /// front-ends are expected to call this first.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.target.trim().is_empty() {
            return Err(ValidationError::EmptyTarget);
        }
        if self.interval_secs == 0 {
            return Err(ValidationError::InvalidInterval);
        }

        match self.kind {
            ServiceKind::Http => validate_http_target(&self.target),
            ServiceKind::Tcp => validate_tcp_target(&self.target),
        }
    }
}

fn validate_http_target(target: &str) -> Result<(), ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidTarget {
        kind: ServiceKind::Http,
        target: target.to_string(),
        reason,
    };

    let url = Url::parse(target).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme {other:?}"))),
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }

    Ok(())
}

fn validate_tcp_target(target: &str) -> Result<(), ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidTarget {
        kind: ServiceKind::Tcp,
        target: target.to_string(),
        reason: reason.to_string(),
    };

    let (host, port) = target.rsplit_once(':').ok_or_else(|| invalid("expected host:port"))?;
    if host.is_empty() {
        return Err(invalid("missing host"));
    }
    let port: u16 = port.parse().map_err(|_| invalid("invalid port"))?;
    if port == 0 {
        return Err(invalid("port must be non-zero"));
    }

    Ok(())
}

/// Why a service definition was rejected at the registration boundary.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("service name must not be empty")]
    EmptyName,
    #[error("service target must not be empty")]
    EmptyTarget,
    #[error("check interval must be greater than zero")]
    InvalidInterval,
    #[error("invalid {kind} target {target:?}: {reason}")]
    InvalidTarget { kind: ServiceKind, target: String, reason: String },
}

/// The recorded outcome of one probe execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub id: ResultId,
    pub service_id: ServiceId,
    /// When the probe completed.
    pub checked_at: DateTime<Utc>,
    pub success: bool,
    /// Wall-clock duration of the probe attempt, recorded on failure too.
    pub latency_ms: u64,
    /// Present exactly when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    /// Record a successful probe.
    pub fn success(service_id: ServiceId, latency: Duration) -> Self {
        Self {
            id: 0,
            service_id,
            checked_at: Utc::now(),
            success: true,
            latency_ms: latency.as_millis() as u64,
            error: None,
        }
    }

    /// Record a failed probe along with the error text that caused it.
    pub fn failure(service_id: ServiceId, latency: Duration, error: impl Into<String>) -> Self {
        Self {
            id: 0,
            service_id,
            checked_at: Utc::now(),
            success: false,
            latency_ms: latency.as_millis() as u64,
            error: Some(error.into()),
        }
    }
}
