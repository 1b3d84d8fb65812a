//! Storage contracts for services and their check history.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{CheckResult, ResultId, Service, ServiceId};

pub mod memory;

pub use memory::MemoryStore;

/// Errors surfaced by the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested service id has never been registered. Distinct from a
    /// registered service with no results yet, which is not an error.
    #[error("service not found: {0}")]
    ServiceNotFound(ServiceId),
    /// Failure inside a storage backend. The in-memory store never produces
    /// this.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Registration and lookup of monitored services.
#[async_trait]
pub trait ServiceStore: Send + Sync {
    /// Register a service under the next free identifier and return it.
    /// Any id already set on the passed definition is ignored.
    async fn create_service(&self, service: &Service) -> Result<ServiceId, StoreError>;

    /// Fetch one service by id.
    async fn get_service(&self, id: ServiceId) -> Result<Service, StoreError>;

    /// Snapshot of every registered service. Iteration order is not part of
    /// the contract.
    async fn list_services(&self) -> Result<Vec<Service>, StoreError>;
}

/// Append-only history of check results, windowed per service.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Append a result to its service's history under the next free result
    /// identifier and return it.
    async fn save_result(&self, result: &CheckResult) -> Result<ResultId, StoreError>;

    /// The most recent `limit` results for a service, oldest first. A limit
    /// of zero, or one larger than the stored history, returns everything.
    /// A service id nothing was ever saved for yields an empty vector.
    async fn recent_results(
        &self,
        service_id: ServiceId,
        limit: usize,
    ) -> Result<Vec<CheckResult>, StoreError>;
}
