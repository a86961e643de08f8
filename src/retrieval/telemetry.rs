//! Per-call retrieval telemetry

use super::provenance::RetrievalMode;
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;

/// One retrieval call as seen by telemetry
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalEvent {
    pub elapsed: Duration,
    /// `None` when the call failed
    pub mode: Option<RetrievalMode>,
    pub result_count: usize,
    pub vector_candidates: usize,
    pub lexical_candidates: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lexical_error: Option<String>,
}

impl RetrievalEvent {
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }

    pub fn is_degraded(&self) -> bool {
        !matches!(self.mode, Some(RetrievalMode::Hybrid))
    }
}

/// Structured event sink
pub trait RetrievalTelemetry: Send + Sync {
    fn record(&self, event: &RetrievalEvent);
}

/// Sink that writes events to the tracing subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl RetrievalTelemetry for TracingTelemetry {
    fn record(&self, event: &RetrievalEvent) {
        let mode = event
            .mode
            .map(|m| m.to_string())
            .unwrap_or_else(|| "unavailable".to_string());

        if event.is_degraded() {
            tracing::warn!(
                mode = %mode,
                elapsed_ms = event.elapsed_ms(),
                results = event.result_count,
                vector_candidates = event.vector_candidates,
                lexical_candidates = event.lexical_candidates,
                vector_error = event.vector_error.as_deref().unwrap_or(""),
                lexical_error = event.lexical_error.as_deref().unwrap_or(""),
                "Retrieval degraded"
            );
        } else {
            tracing::info!(
                mode = %mode,
                elapsed_ms = event.elapsed_ms(),
                results = event.result_count,
                vector_candidates = event.vector_candidates,
                lexical_candidates = event.lexical_candidates,
                "Retrieval complete"
            );
        }
    }
}

/// Sink that keeps every event in memory
#[derive(Debug, Default)]
pub struct InMemoryTelemetry {
    events: Mutex<Vec<RetrievalEvent>>,
}

impl InMemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RetrievalEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn last(&self) -> Option<RetrievalEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RetrievalTelemetry for InMemoryTelemetry {
    fn record(&self, event: &RetrievalEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}
