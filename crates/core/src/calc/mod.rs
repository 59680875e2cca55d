//! Funnel calculation engine
//!
//! Walks the ordered, enabled steps of a funnel once, threading visitor
//! counts through per-step conversion, split distribution, and insight
//! aggregation. Every piece is a pure function of its inputs; the only
//! injected capability is the conversion-ratio source.

pub mod cache;
pub mod calculator;
pub mod conversion;
pub mod insights;
pub mod random;
pub mod split;

pub use cache::ResultsCache;
pub use calculator::{
    CalculationMetadata, CalculationOptions, CalculationRequest, CalculationResult,
    CalculationRun, FunnelCalculator, RunState,
};
pub use conversion::StepConversionModel;
pub use insights::{aggregate_insights, FunnelInsights};
pub use random::{FixedRatioSource, RatioSource, ThreadRngRatioSource};
pub use split::SplitDistributor;
