pub mod calc;
pub mod config;
pub mod domain;
pub mod errors;
pub mod service;
pub mod telemetry;
pub mod templates;

pub use calc::calculator::{
    variation_result_key, CalculationMetadata, CalculationOptions, CalculationRequest,
    CalculationResult, CalculationRun, FunnelCalculator, RunState,
};
pub use calc::insights::{aggregate_insights, FunnelInsights};
pub use calc::random::{FixedRatioSource, RatioSource, ThreadRngRatioSource};
pub use calc::{ResultsCache, SplitDistributor, StepConversionModel};
pub use config::{ConfigError, ConfigOverrides, EngineConfig, LoadOptions, RatioBand};
pub use domain::funnel::{FunnelDefinition, FunnelId, SplitVariation, Step, StepId, VariationId};
pub use errors::{CalculationError, MalformedStepError};
pub use service::CalculationService;
pub use telemetry::{
    CalculationEventType, CalculationOutcome, CalculationTelemetryEvent, InMemoryTelemetrySink,
    NoopTelemetrySink, TelemetrySink,
};
pub use templates::StepTemplateLibrary;
