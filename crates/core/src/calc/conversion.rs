use crate::calc::random::RatioSource;
use crate::config::BandConfig;
use crate::domain::funnel::Step;

/// Computes one step's outgoing visitor count from its incoming count.
///
/// Two regimes: required steps convert a fraction of their incoming
/// population and lose the rest; optional steps convert a fraction (the
/// completions) while the remainder bypasses the action and continues. The
/// orchestrator tracks the bypass population, not this model.
#[derive(Clone, Debug)]
pub struct StepConversionModel<S> {
    bands: BandConfig,
    ratios: S,
}

impl<S: RatioSource> StepConversionModel<S> {
    pub fn new(ratios: S) -> Self {
        Self { bands: crate::config::EngineConfig::default().bands, ratios }
    }

    pub fn with_bands(ratios: S, bands: BandConfig) -> Self {
        Self { bands, ratios }
    }

    /// `depth` is the step's 0-based position among enabled steps.
    ///
    /// Invariants: `0 <= output <= incoming`; `incoming == 0` yields 0; a
    /// required step past the entry step always sheds at least one visitor.
    pub fn step_output(&self, incoming: u64, step: &Step, depth: usize) -> u64 {
        if incoming == 0 {
            return 0;
        }

        let band = if step.is_required {
            self.bands.required_band_for_depth(depth)
        } else {
            self.bands.optional_action
        };
        let ratio = self.ratios.ratio_between(band.lower, band.upper).clamp(0.0, 1.0);
        let output = ((incoming as f64) * ratio).round() as u64;
        let output = output.min(incoming);

        if step.is_required && depth > 0 && output == incoming {
            incoming - 1
        } else {
            output
        }
    }
}
