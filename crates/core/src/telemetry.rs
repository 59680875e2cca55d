use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::funnel::FunnelId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationEventType {
    RequestReceived,
    ResultComputed,
    ErrorOccurred,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationOutcome {
    Accepted,
    Success,
    EmptyInput,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationTelemetryEvent {
    pub event_id: String,
    pub funnel_id: FunnelId,
    pub correlation_id: String,
    pub event_type: CalculationEventType,
    pub outcome: CalculationOutcome,
    pub step_count: usize,
    pub variation_count: usize,
    pub cache_hit: bool,
    pub latency_ms: i64,
    pub error_code: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl CalculationTelemetryEvent {
    pub fn new(
        funnel_id: FunnelId,
        correlation_id: impl Into<String>,
        event_type: CalculationEventType,
        outcome: CalculationOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            funnel_id,
            correlation_id: correlation_id.into(),
            event_type,
            outcome,
            step_count: 0,
            variation_count: 0,
            cache_hit: false,
            latency_ms: 0,
            error_code: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_shape(mut self, step_count: usize, variation_count: usize) -> Self {
        self.step_count = step_count;
        self.variation_count = variation_count;
        self
    }

    pub fn with_cache_hit(mut self, cache_hit: bool) -> Self {
        self.cache_hit = cache_hit;
        self
    }

    pub fn with_latency_ms(mut self, latency_ms: i64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_error_code(mut self, error_code: impl Into<String>) -> Self {
        self.error_code = Some(error_code.into());
        self
    }
}

pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: CalculationTelemetryEvent);
}

/// Discards everything; the default for embedders that bring their own
/// observability.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTelemetrySink;

impl TelemetrySink for NoopTelemetrySink {
    fn emit(&self, _event: CalculationTelemetryEvent) {}
}

#[derive(Clone, Default)]
pub struct InMemoryTelemetrySink {
    events: Arc<Mutex<Vec<CalculationTelemetryEvent>>>,
}

impl InMemoryTelemetrySink {
    pub fn events(&self) -> Vec<CalculationTelemetryEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl TelemetrySink for InMemoryTelemetrySink {
    fn emit(&self, event: CalculationTelemetryEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
