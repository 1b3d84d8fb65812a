//! Probe execution: one check against one service target.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::model::{CheckResult, Service, ServiceKind};

/// Errors that prevent a probe from being executed at all.
///
/// Transport failures are not errors at this level: they come back as failed
/// [`CheckResult`]s with latency and error text recorded.
#[derive(Debug, Error)]
pub enum CheckError {
    /// No handler is registered for the service's kind. A configuration
    /// defect; never recorded as a check result.
    #[error("unsupported service kind: {0}")]
    UnsupportedKind(ServiceKind),
    /// The underlying HTTP client could not be constructed.
    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// A probe strategy for one or more service kinds.
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Execute one check and report its outcome. Implementations fill in
    /// latency even when the probe fails.
    async fn check(&self, service: &Service) -> Result<CheckResult, CheckError>;
}

/// HTTP prober: GET the target and classify the response status.
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    /// Build a prober whose every request is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, CheckError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self, service: &Service) -> Result<CheckResult, CheckError> {
        let start = Instant::now();
        let response = self.client.get(&service.target).send().await;
        let latency = start.elapsed();

        Ok(match response {
            // 2xx and 3xx responses count as up
            Ok(response) if (200..400).contains(&response.status().as_u16()) => {
                CheckResult::success(service.id, latency)
            }
            Ok(response) => CheckResult::failure(
                service.id,
                latency,
                format!("unexpected status code: {}", response.status()),
            ),
            Err(e) => CheckResult::failure(service.id, latency, e.to_string()),
        })
    }
}

/// TCP prober: a bounded connect attempt, closed as soon as it succeeds.
pub struct TcpChecker {
    timeout: Duration,
}

impl TcpChecker {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait::async_trait]
impl Checker for TcpChecker {
    async fn check(&self, service: &Service) -> Result<CheckResult, CheckError> {
        let start = Instant::now();
        let attempt = timeout(self.timeout, TcpStream::connect(&service.target)).await;
        let latency = start.elapsed();

        Ok(match attempt {
            // Reaching the accept queue is enough; no data is exchanged.
            Ok(Ok(_stream)) => CheckResult::success(service.id, latency),
            Ok(Err(e)) => {
                CheckResult::failure(service.id, latency, format!("connection failed: {e}"))
            }
            Err(_) => CheckResult::failure(
                service.id,
                latency,
                format!("connection timed out after {:?}", self.timeout),
            ),
        })
    }
}

/// Routes each service to the handler registered for its kind.
pub struct DefaultChecker {
    handlers: HashMap<ServiceKind, Box<dyn Checker>>,
}

impl DefaultChecker {
    /// A router with the built-in HTTP and TCP handlers, each bounding a
    /// probe by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, CheckError> {
        let mut checker = Self::empty();
        checker.register(ServiceKind::Http, Box::new(HttpChecker::new(timeout)?));
        checker.register(ServiceKind::Tcp, Box::new(TcpChecker::new(timeout)));

        Ok(checker)
    }

    /// A router with no handlers registered.
    pub fn empty() -> Self {
        Self { handlers: HashMap::new() }
    }

    /// Register (or replace) the handler for a kind.
    pub fn register(&mut self, kind: ServiceKind, handler: Box<dyn Checker>) {
        self.handlers.insert(kind, handler);
    }
}

#[async_trait::async_trait]
impl Checker for DefaultChecker {
    async fn check(&self, service: &Service) -> Result<CheckResult, CheckError> {
        match self.handlers.get(&service.kind) {
            Some(handler) => handler.check(service).await,
            None => Err(CheckError::UnsupportedKind(service.kind)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcp_service(target: &str) -> Service {
        let mut svc = Service::new("probe", ServiceKind::Tcp, target, 30);
        svc.id = 11;
        svc
    }

    #[tokio::test]
    async fn unregistered_kind_is_an_error_not_a_result() {
        let checker = DefaultChecker::empty();

        let err = checker.check(&tcp_service("127.0.0.1:80")).await.unwrap_err();

        assert!(matches!(err, CheckError::UnsupportedKind(ServiceKind::Tcp)));
    }

    #[tokio::test]
    async fn tcp_connect_to_open_port_succeeds() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let checker = TcpChecker::new(Duration::from_secs(2));
        let result = checker.check(&tcp_service(&addr.to_string())).await.unwrap();

        assert_eq!(result.service_id, 11);
        assert!(result.success);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn tcp_connect_to_closed_port_fails_with_latency() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let checker = TcpChecker::new(Duration::from_secs(2));
        let result = checker.check(&tcp_service(&addr.to_string())).await.unwrap();

        assert!(!result.success);
        assert!(result.error.as_deref().is_some_and(|e| !e.is_empty()));
        assert!(result.latency_ms < 2_500);
    }

    #[tokio::test]
    async fn router_dispatches_by_kind() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let checker = DefaultChecker::new(Duration::from_secs(2)).unwrap();
        let result = checker.check(&tcp_service(&addr.to_string())).await.unwrap();

        assert!(result.success);
    }
}
