//! upwatch - periodic service health-check engine
//!
//! Registers network services (HTTP endpoints, TCP sockets), probes them all
//! on a shared tick, and keeps an in-memory history of results for reporting
//! and alerting layers to consume.

use std::time::Duration;

pub mod checker;
pub mod model;
pub mod scheduler;
pub mod store;

// Re-export main types
pub use checker::{CheckError, Checker, DefaultChecker, HttpChecker, TcpChecker};
pub use model::{CheckResult, ResultId, Service, ServiceId, ServiceKind, ValidationError};
pub use scheduler::{ProbeOutcome, Scheduler};
pub use store::{MemoryStore, ResultStore, ServiceStore, StoreError};

/// Tick period used when a scheduler is configured with a zero interval.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(10);

/// Per-probe timeout applied by the built-in HTTP and TCP handlers.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
