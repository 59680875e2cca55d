use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::calc::calculator::{CalculationRequest, CalculationResult, CalculationRun};
use crate::calc::random::{RatioSource, ThreadRngRatioSource};
use crate::calc::{FunnelCalculator, ResultsCache};
use crate::config::EngineConfig;
use crate::errors::CalculationError;
use crate::telemetry::{
    CalculationEventType, CalculationOutcome, CalculationTelemetryEvent, NoopTelemetrySink,
    TelemetrySink,
};

/// Calculation entry point for callers that want caching, telemetry, and the
/// original product's simulated backend latency in one place.
///
/// The computation itself is synchronous and pure; the only suspension point
/// is the optional artificial delay at the call boundary, so concurrent
/// calls interact through nothing but the idempotent cache. Callers re-invoke
/// explicitly after funnel edits; nothing here recalculates on its own.
pub struct CalculationService<S> {
    calculator: FunnelCalculator<S>,
    cache: Option<ResultsCache>,
    telemetry: Arc<dyn TelemetrySink>,
    simulated_latency: Duration,
}

impl CalculationService<ThreadRngRatioSource> {
    pub fn with_defaults() -> Self {
        Self::new(&EngineConfig::default(), ThreadRngRatioSource, Arc::new(NoopTelemetrySink))
    }
}

impl<S: RatioSource + Clone> CalculationService<S> {
    pub fn new(config: &EngineConfig, ratios: S, telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self {
            calculator: FunnelCalculator::with_config(ratios, config),
            cache: config.cache.enabled.then(|| ResultsCache::new(config.cache.max_entries)),
            telemetry,
            simulated_latency: Duration::from_millis(config.service.simulated_latency_ms),
        }
    }

    pub async fn calculate(
        &self,
        request: &CalculationRequest,
        correlation_id: &str,
    ) -> Result<CalculationResult, CalculationError> {
        let step_count = request.funnel.steps.iter().filter(|step| step.is_enabled).count();
        let variation_count = request.funnel.variation_count();

        self.telemetry.emit(
            CalculationTelemetryEvent::new(
                request.funnel.id.clone(),
                correlation_id,
                CalculationEventType::RequestReceived,
                CalculationOutcome::Accepted,
            )
            .with_shape(step_count, variation_count),
        );

        if !self.simulated_latency.is_zero() {
            tokio::time::sleep(self.simulated_latency).await;
        }

        let started = Instant::now();
        let key = self.cache.as_ref().map(|_| ResultsCache::fingerprint(request));

        if let (Some(cache), Some(key)) = (&self.cache, key.as_deref()) {
            if let Some(hit) = cache.get(key) {
                debug!(
                    funnel_id = %request.funnel.id.0,
                    correlation_id,
                    "served funnel calculation from cache"
                );
                self.telemetry.emit(
                    CalculationTelemetryEvent::new(
                        request.funnel.id.clone(),
                        correlation_id,
                        CalculationEventType::ResultComputed,
                        CalculationOutcome::Success,
                    )
                    .with_shape(step_count, variation_count)
                    .with_cache_hit(true)
                    .with_latency_ms(duration_to_millis_i64(started.elapsed())),
                );
                return Ok(hit);
            }
        }

        let mut run = CalculationRun::new();
        let result = run.execute(&self.calculator, request);
        let latency_ms = duration_to_millis_i64(started.elapsed());

        match result {
            Ok(result) => {
                if let (Some(cache), Some(key)) = (&self.cache, key) {
                    cache.put(key, result.clone());
                }

                let outcome = if result.calculated_results.is_empty() {
                    CalculationOutcome::EmptyInput
                } else {
                    CalculationOutcome::Success
                };
                debug!(
                    funnel_id = %request.funnel.id.0,
                    correlation_id,
                    entries = result.calculated_results.len(),
                    "funnel calculation completed"
                );
                self.telemetry.emit(
                    CalculationTelemetryEvent::new(
                        request.funnel.id.clone(),
                        correlation_id,
                        CalculationEventType::ResultComputed,
                        outcome,
                    )
                    .with_shape(step_count, variation_count)
                    .with_latency_ms(latency_ms),
                );
                Ok(result)
            }
            Err(error) => {
                warn!(
                    funnel_id = %request.funnel.id.0,
                    correlation_id,
                    error = %error,
                    "funnel calculation failed"
                );
                self.telemetry.emit(
                    CalculationTelemetryEvent::new(
                        request.funnel.id.clone(),
                        correlation_id,
                        CalculationEventType::ErrorOccurred,
                        CalculationOutcome::Failed,
                    )
                    .with_shape(step_count, variation_count)
                    .with_latency_ms(latency_ms)
                    .with_error_code(error.error_code()),
                );
                Err(error)
            }
        }
    }

    /// Drops every memoized result. Results are recomputable, so this is
    /// always safe.
    pub fn invalidate_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }
}

fn duration_to_millis_i64(duration: Duration) -> i64 {
    duration.as_millis().min(i64::MAX as u128) as i64
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::Value;

    use crate::calc::calculator::{CalculationOptions, CalculationRequest};
    use crate::calc::random::FixedRatioSource;
    use crate::config::EngineConfig;
    use crate::domain::funnel::{FunnelDefinition, FunnelId, Step, StepId};
    use crate::errors::CalculationError;
    use crate::telemetry::{CalculationEventType, CalculationOutcome, InMemoryTelemetrySink};

    use super::CalculationService;

    fn step(id: &str, order: u32) -> Step {
        Step {
            id: StepId(id.to_string()),
            name: format!("Step {order}"),
            order,
            is_enabled: true,
            is_required: true,
            conditions: Value::Null,
            split_variations: Vec::new(),
        }
    }

    fn request(steps: Vec<Step>, initial_value: u64) -> CalculationRequest {
        CalculationRequest {
            funnel: FunnelDefinition {
                id: FunnelId("F-SVC-1".to_string()),
                name: "Trial funnel".to_string(),
                description: String::new(),
                timeframe: String::new(),
                performed_by: String::new(),
                steps,
            },
            initial_value,
            options: CalculationOptions::default(),
        }
    }

    fn service(
        cache_enabled: bool,
        sink: &InMemoryTelemetrySink,
    ) -> CalculationService<FixedRatioSource> {
        let mut config = EngineConfig::default();
        config.cache.enabled = cache_enabled;
        CalculationService::new(&config, FixedRatioSource(0.7), Arc::new(sink.clone()))
    }

    #[tokio::test]
    async fn successful_calculation_emits_request_and_result_events() {
        let sink = InMemoryTelemetrySink::default();
        let service = service(false, &sink);

        let result = service
            .calculate(&request(vec![step("s1", 1), step("s2", 2)], 1_000), "req-svc-1")
            .await
            .expect("calculate");

        assert_eq!(result.calculated_results.len(), 2);
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, CalculationEventType::RequestReceived);
        assert_eq!(events[1].event_type, CalculationEventType::ResultComputed);
        assert_eq!(events[1].outcome, CalculationOutcome::Success);
        assert!(!events[1].cache_hit);
        assert!(events[1].latency_ms >= 0);
    }

    #[tokio::test]
    async fn repeated_requests_are_served_from_cache() {
        let sink = InMemoryTelemetrySink::default();
        let service = service(true, &sink);
        let input = request(vec![step("s1", 1), step("s2", 2)], 1_000);

        let first = service.calculate(&input, "req-svc-2a").await.expect("first run");
        let second = service.calculate(&input, "req-svc-2b").await.expect("second run");

        assert_eq!(first.calculated_results, second.calculated_results);
        let events = sink.events();
        assert_eq!(events.len(), 4);
        assert!(!events[1].cache_hit);
        assert!(events[3].cache_hit);
    }

    #[tokio::test]
    async fn cache_on_and_cache_off_runs_agree() {
        let sink = InMemoryTelemetrySink::default();
        let cached = service(true, &sink);
        let uncached = service(false, &sink);
        let input = request(vec![step("s1", 1), step("s2", 2), step("s3", 3)], 10_000);

        let with_cache = cached.calculate(&input, "req-svc-3a").await.expect("cached run");
        let without_cache = uncached.calculate(&input, "req-svc-3b").await.expect("plain run");

        assert_eq!(with_cache.calculated_results, without_cache.calculated_results);
        assert_eq!(with_cache.insights, without_cache.insights);
    }

    #[tokio::test]
    async fn cache_invalidation_forces_a_recompute() {
        let sink = InMemoryTelemetrySink::default();
        let service = service(true, &sink);
        let input = request(vec![step("s1", 1)], 500);

        service.calculate(&input, "req-svc-4a").await.expect("warm");
        service.invalidate_cache();
        service.calculate(&input, "req-svc-4b").await.expect("recompute");

        let events = sink.events();
        assert!(!events[3].cache_hit);
    }

    #[tokio::test]
    async fn empty_funnel_reports_an_empty_input_outcome() {
        let sink = InMemoryTelemetrySink::default();
        let service = service(false, &sink);

        let result = service.calculate(&request(Vec::new(), 1_000), "req-svc-5").await.expect("ok");

        assert!(result.calculated_results.is_empty());
        assert_eq!(sink.events()[1].outcome, CalculationOutcome::EmptyInput);
    }

    #[tokio::test]
    async fn malformed_funnel_emits_an_error_event_with_code() {
        let sink = InMemoryTelemetrySink::default();
        let service = service(false, &sink);

        let error = service
            .calculate(&request(vec![step("dup", 1), step("dup", 2)], 1_000), "req-svc-6")
            .await
            .expect_err("must fail");

        assert!(matches!(error, CalculationError::MalformedStep(_)));
        let events = sink.events();
        assert_eq!(events[1].event_type, CalculationEventType::ErrorOccurred);
        assert_eq!(events[1].error_code.as_deref(), Some("duplicate_step_id"));
    }

    #[tokio::test]
    async fn simulated_latency_suspends_only_at_the_call_boundary() {
        let sink = InMemoryTelemetrySink::default();
        let mut config = EngineConfig::default();
        config.cache.enabled = false;
        config.service.simulated_latency_ms = 10;
        let service =
            CalculationService::new(&config, FixedRatioSource(0.7), Arc::new(sink.clone()));

        let started = std::time::Instant::now();
        service
            .calculate(&request(vec![step("s1", 1)], 100), "req-svc-7")
            .await
            .expect("calculate");
        assert!(started.elapsed() >= std::time::Duration::from_millis(10));
    }
}
