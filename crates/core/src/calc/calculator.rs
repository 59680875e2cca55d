use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calc::conversion::StepConversionModel;
use crate::calc::insights::{aggregate_insights, FunnelInsights};
use crate::calc::random::{RatioSource, ThreadRngRatioSource};
use crate::calc::split::SplitDistributor;
use crate::config::EngineConfig;
use crate::domain::funnel::{FunnelDefinition, StepId};
use crate::errors::CalculationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationOptions {
    pub include_split_variations: bool,
    pub include_metrics: bool,
    pub include_insights: bool,
}

impl Default for CalculationOptions {
    fn default() -> Self {
        Self { include_split_variations: true, include_metrics: true, include_insights: true }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalculationRequest {
    pub funnel: FunnelDefinition,
    /// Visitor pool entering the first enabled step. Zero resolves to an
    /// empty result, not an error.
    pub initial_value: u64,
    #[serde(default)]
    pub options: CalculationOptions,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalculationMetadata {
    pub initial_value: u64,
    pub calculated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalculationResult {
    /// Keyed by step id, plus `"{stepId}-variation-{n}"` (1-based) per split
    /// variation. Downstream rendering joins on these keys verbatim.
    pub calculated_results: BTreeMap<String, u64>,
    pub metadata: Option<CalculationMetadata>,
    pub insights: Option<FunnelInsights>,
}

/// Results-map key for one split variation. `position` is 1-based.
pub fn variation_result_key(step_id: &StepId, position: usize) -> String {
    format!("{}-variation-{}", step_id.0, position)
}

/// Lifecycle of a single calculation pass. A run is one linear walk over the
/// enabled steps; recalculation always restarts from the initial value and
/// never trusts results of a previous run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Succeeded,
    Failed,
}

#[derive(Clone, Debug)]
pub struct CalculationRun {
    state: RunState,
}

impl CalculationRun {
    pub fn new() -> Self {
        Self { state: RunState::Idle }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn execute<S: RatioSource>(
        &mut self,
        calculator: &FunnelCalculator<S>,
        request: &CalculationRequest,
    ) -> Result<CalculationResult, CalculationError> {
        self.state = RunState::Running;
        match calculator.calculate(request) {
            Ok(result) => {
                self.state = RunState::Succeeded;
                Ok(result)
            }
            Err(error) => {
                self.state = RunState::Failed;
                Err(error)
            }
        }
    }
}

impl Default for CalculationRun {
    fn default() -> Self {
        Self::new()
    }
}

/// Walks the ordered, enabled steps of a funnel once, threading visitor
/// counts from one step to the next and assembling the flat results map.
#[derive(Clone, Debug)]
pub struct FunnelCalculator<S> {
    conversion: StepConversionModel<S>,
    splits: SplitDistributor<S>,
}

impl Default for FunnelCalculator<ThreadRngRatioSource> {
    fn default() -> Self {
        Self::new(ThreadRngRatioSource)
    }
}

impl<S: RatioSource + Clone> FunnelCalculator<S> {
    pub fn new(ratios: S) -> Self {
        Self::with_config(ratios, &EngineConfig::default())
    }

    pub fn with_config(ratios: S, config: &EngineConfig) -> Self {
        Self {
            conversion: StepConversionModel::with_bands(ratios.clone(), config.bands.clone()),
            splits: SplitDistributor::with_weight_band(ratios, config.split.weight),
        }
    }
}

impl<S: RatioSource> FunnelCalculator<S> {
    /// Pure: same inputs plus a fixed ratio source give the same results.
    /// Per-call local state only, so concurrent invocations never interact.
    pub fn calculate(
        &self,
        request: &CalculationRequest,
    ) -> Result<CalculationResult, CalculationError> {
        let enabled = request.funnel.enabled_steps()?;
        if enabled.is_empty() || request.initial_value == 0 {
            return Ok(Self::empty_result(request));
        }

        // First pass: every step's output, eagerly, so split records can
        // look one step ahead. `current` carries the merge rule: required
        // steps narrow the stream, optional steps divert and rejoin.
        let mut outputs = Vec::with_capacity(enabled.len());
        let mut current = request.initial_value;
        for (depth, step) in enabled.iter().enumerate() {
            let output = self.conversion.step_output(current, step, depth);
            if output > current {
                return Err(CalculationError::Internal(format!(
                    "step {} emitted {output} visitors from an incoming {current}",
                    step.id.0
                )));
            }
            outputs.push(output);
            if step.is_required {
                current = output;
            }
        }

        let mut calculated_results = BTreeMap::new();
        for (step, output) in enabled.iter().zip(&outputs) {
            calculated_results.insert(step.id.0.clone(), *output);
        }

        // Second pass: split records. A step's variations are distributed
        // over its own total, then scaled against the next step's already
        // resolved total; the trailing step keeps the reconciled
        // distribution as-is.
        if request.options.include_split_variations {
            for (index, step) in enabled.iter().enumerate() {
                let arm_count = step.split_variations.len();
                if arm_count == 0 {
                    continue;
                }

                let total = outputs[index];
                let counts = self.splits.distribute(total, arm_count);
                let recorded = match outputs.get(index + 1) {
                    Some(&next_step_total) => {
                        self.splits.forward_counts(&counts, total, next_step_total)
                    }
                    None => counts,
                };
                for (position, value) in recorded.iter().enumerate() {
                    calculated_results.insert(variation_result_key(&step.id, position + 1), *value);
                }
            }
        }

        let metadata = request.options.include_metrics.then(|| CalculationMetadata {
            initial_value: request.initial_value,
            calculated_at: Utc::now(),
        });
        let insights = request
            .options
            .include_insights
            .then(|| aggregate_insights(&calculated_results, &enabled, request.initial_value));

        Ok(CalculationResult { calculated_results, metadata, insights })
    }

    fn empty_result(request: &CalculationRequest) -> CalculationResult {
        CalculationResult {
            calculated_results: BTreeMap::new(),
            metadata: request.options.include_metrics.then(|| CalculationMetadata {
                initial_value: request.initial_value,
                calculated_at: Utc::now(),
            }),
            insights: request.options.include_insights.then(FunnelInsights::empty),
        }
    }
}
