use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ResultStore, ServiceStore, StoreError};
use crate::model::{CheckResult, ResultId, Service, ServiceId};

/// In-memory store holding services and results for the process lifetime.
///
/// All state sits behind one readers-writer lock; every operation takes the
/// lock once and hands out value copies, so callers never observe later
/// mutation through data they already received.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Debug)]
struct Inner {
    next_service_id: ServiceId,
    services: BTreeMap<ServiceId, Service>,
    next_result_id: ResultId,
    results: HashMap<ServiceId, Vec<CheckResult>>,
}

impl Default for Inner {
    fn default() -> Self {
        // Counters start at 1; id 0 marks an unregistered definition.
        Self {
            next_service_id: 1,
            services: BTreeMap::new(),
            next_result_id: 1,
            results: HashMap::new(),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ServiceStore for MemoryStore {
    async fn create_service(&self, service: &Service) -> Result<ServiceId, StoreError> {
        let mut inner = self.inner.write().await;
        let id = inner.next_service_id;
        inner.next_service_id += 1;

        let mut stored = service.clone();
        stored.id = id;
        inner.services.insert(id, stored);

        Ok(id)
    }

    async fn get_service(&self, id: ServiceId) -> Result<Service, StoreError> {
        let inner = self.inner.read().await;
        inner.services.get(&id).cloned().ok_or(StoreError::ServiceNotFound(id))
    }

    async fn list_services(&self) -> Result<Vec<Service>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.services.values().cloned().collect())
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn save_result(&self, result: &CheckResult) -> Result<ResultId, StoreError> {
        let mut inner = self.inner.write().await;
        let id = inner.next_result_id;
        inner.next_result_id += 1;

        let mut stored = result.clone();
        stored.id = id;
        inner.results.entry(stored.service_id).or_default().push(stored);

        Ok(id)
    }

    async fn recent_results(
        &self,
        service_id: ServiceId,
        limit: usize,
    ) -> Result<Vec<CheckResult>, StoreError> {
        let inner = self.inner.read().await;
        let Some(history) = inner.results.get(&service_id) else {
            return Ok(Vec::new());
        };

        let window = if limit == 0 || limit > history.len() { history.len() } else { limit };
        Ok(history[history.len() - window..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::model::ServiceKind;

    fn web_service(name: &str) -> Service {
        Service::new(name, ServiceKind::Http, "https://example.com", 30)
    }

    #[tokio::test]
    async fn assigns_increasing_ids_from_one() {
        let store = MemoryStore::new();
        let first = store.create_service(&web_service("a")).await.unwrap();
        let second = store.create_service(&web_service("b")).await.unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[tokio::test]
    async fn ignores_caller_supplied_ids() {
        let store = MemoryStore::new();
        let mut svc = web_service("a");
        svc.id = 99;

        let id = store.create_service(&svc).await.unwrap();

        assert_eq!(id, 1);
        assert!(matches!(store.get_service(99).await, Err(StoreError::ServiceNotFound(99))));
        assert_eq!(store.get_service(id).await.unwrap().name, "a");
    }

    #[tokio::test]
    async fn unknown_service_is_a_distinct_error() {
        let store = MemoryStore::new();
        assert!(matches!(store.get_service(7).await, Err(StoreError::ServiceNotFound(7))));
    }

    #[tokio::test]
    async fn listed_services_are_value_snapshots() {
        let store = MemoryStore::new();
        store.create_service(&web_service("a")).await.unwrap();

        let mut listed = store.list_services().await.unwrap();
        listed[0].name = "mutated".to_string();

        assert_eq!(store.list_services().await.unwrap()[0].name, "a");
    }

    #[tokio::test]
    async fn concurrent_creates_never_reuse_ids() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for n in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.create_service(&web_service(&format!("svc-{n}"))).await.unwrap()
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.sort_unstable();
        ids.dedup();

        assert_eq!(ids.len(), 8);
    }

    #[tokio::test]
    async fn result_ids_are_global_across_services() {
        let store = MemoryStore::new();
        let a = store.create_service(&web_service("a")).await.unwrap();
        let b = store.create_service(&web_service("b")).await.unwrap();

        let r1 = store.save_result(&CheckResult::success(a, Duration::from_millis(5))).await.unwrap();
        let r2 = store.save_result(&CheckResult::success(b, Duration::from_millis(5))).await.unwrap();
        let r3 = store.save_result(&CheckResult::success(a, Duration::from_millis(5))).await.unwrap();

        assert_eq!((r1, r2, r3), (1, 2, 3));
    }

    #[tokio::test]
    async fn recent_results_windows_the_tail() {
        let store = MemoryStore::new();
        let id = store.create_service(&web_service("a")).await.unwrap();
        for ms in [1, 2, 3, 4, 5] {
            store.save_result(&CheckResult::success(id, Duration::from_millis(ms))).await.unwrap();
        }

        let tail = store.recent_results(id, 2).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].latency_ms, 4);
        assert_eq!(tail[1].latency_ms, 5);

        assert_eq!(store.recent_results(id, 0).await.unwrap().len(), 5);
        assert_eq!(store.recent_results(id, 50).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn missing_history_yields_empty_not_error() {
        let store = MemoryStore::new();
        let id = store.create_service(&web_service("a")).await.unwrap();

        assert!(store.recent_results(id, 10).await.unwrap().is_empty());
        assert!(store.recent_results(4242, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn results_keep_insertion_order() {
        let store = MemoryStore::new();
        let id = store.create_service(&web_service("a")).await.unwrap();
        store
            .save_result(&CheckResult::failure(id, Duration::from_millis(9), "connection refused"))
            .await
            .unwrap();
        store.save_result(&CheckResult::success(id, Duration::from_millis(3))).await.unwrap();

        let all = store.recent_results(id, 0).await.unwrap();
        assert!(all[0].id < all[1].id);
        assert!(all[0].checked_at <= all[1].checked_at);
        assert!(!all[0].success);
        assert_eq!(all[0].error.as_deref(), Some("connection refused"));
        assert!(all[1].success);
    }
}
