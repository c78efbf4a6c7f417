//! Application State
//!
//! Shared state across all handlers.

use std::sync::Arc;

use dashmap::DashMap;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::Semaphore;
use uuid::Uuid;

use dfir_agent::{Assistant, ResponseFormatter};
use dfir_config::Settings;
use dfir_core::{cancel_pair, CancelHandle, CancelToken};

use crate::ServerError;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub assistant: Arc<dyn Assistant>,
    pub config: Arc<Settings>,
    /// Cancel handles of requests currently being answered
    pub inflight: Arc<DashMap<Uuid, CancelHandle>>,
    /// Limits concurrent queries; waiting requests queue on the semaphore
    pub query_permits: Arc<Semaphore>,
    pub formatter: ResponseFormatter,
    /// None when metrics are disabled or the recorder was already installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(assistant: Arc<dyn Assistant>, config: Settings) -> Self {
        let permits = config.server.max_concurrent_queries.max(1);
        Self {
            assistant,
            config: Arc::new(config),
            inflight: Arc::new(DashMap::new()),
            query_permits: Arc::new(Semaphore::new(permits)),
            formatter: ResponseFormatter::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics = handle;
        self
    }

    /// Register a request as in flight
    ///
    /// The returned guard removes the entry when dropped, which also covers
    /// handlers whose future is dropped by a client disconnect or timeout.
    pub fn begin(&self, request_id: Uuid) -> Result<(InflightGuard, CancelToken), ServerError> {
        use dashmap::mapref::entry::Entry;

        let (handle, token) = cancel_pair();
        match self.inflight.entry(request_id) {
            Entry::Occupied(_) => {
                return Err(ServerError::Conflict(format!(
                    "request {} is already in flight",
                    request_id
                )))
            },
            Entry::Vacant(slot) => {
                slot.insert(handle.clone());
            },
        }
        Ok((
            InflightGuard {
                request_id,
                handle,
                inflight: self.inflight.clone(),
            },
            token,
        ))
    }

    /// Cancel an in-flight request; false if the id is unknown
    pub fn cancel(&self, request_id: &Uuid) -> bool {
        match self.inflight.get(request_id) {
            Some(handle) => {
                handle.cancel();
                true
            },
            None => false,
        }
    }

    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }
}

/// Drop guard for one in-flight request
pub struct InflightGuard {
    request_id: Uuid,
    handle: CancelHandle,
    inflight: Arc<DashMap<Uuid, CancelHandle>>,
}

impl InflightGuard {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.inflight.remove(&self.request_id);
        // Stops any stage still running on a detached task
        self.handle.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dfir_agent::Readiness;
    use dfir_core::{AssistantResponse, Document, Error, Result};
    use dfir_rag::{IndexStats, IngestReport};
    use tokio::sync::mpsc;

    struct Unused;

    #[async_trait]
    impl Assistant for Unused {
        async fn answer(&self, _: Uuid, _: &str, _: CancelToken) -> Result<AssistantResponse> {
            Err(Error::Cancelled)
        }

        async fn answer_stream(
            &self,
            _: Uuid,
            _: &str,
            _: mpsc::Sender<String>,
            _: CancelToken,
        ) -> Result<AssistantResponse> {
            Err(Error::Cancelled)
        }

        async fn ingest(&self, _: &Document) -> Result<IngestReport> {
            Err(Error::Configuration("unused".into()))
        }

        async fn index_stats(&self) -> Result<IndexStats> {
            Err(Error::Configuration("unused".into()))
        }

        async fn readiness(&self) -> Readiness {
            Readiness::default()
        }
    }

    fn state() -> AppState {
        AppState::new(Arc::new(Unused), Settings::default())
    }

    #[test]
    fn test_duplicate_request_id_conflicts() {
        let state = state();
        let id = Uuid::new_v4();
        let (_guard, _token) = state.begin(id).unwrap();
        assert!(matches!(state.begin(id), Err(ServerError::Conflict(_))));
    }

    #[test]
    fn test_guard_drop_clears_and_cancels() {
        let state = state();
        let id = Uuid::new_v4();
        let (guard, token) = state.begin(id).unwrap();
        assert_eq!(state.inflight_count(), 1);

        drop(guard);
        assert_eq!(state.inflight_count(), 0);
        assert!(token.is_cancelled());
        assert!(!state.cancel(&id));
    }

    #[test]
    fn test_cancel_reaches_token() {
        let state = state();
        let id = Uuid::new_v4();
        let (_guard, token) = state.begin(id).unwrap();
        assert!(state.cancel(&id));
        assert!(token.is_cancelled());
    }
}
