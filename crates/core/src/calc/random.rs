use rand::Rng;

/// Source of conversion ratios.
///
/// The default implementation simulates believable funnel behavior with a
/// thread-local RNG; a future event-query backend slots in here without the
/// orchestrator changing. The only invariant is that the returned value lies
/// inside the requested closed interval.
pub trait RatioSource: Send + Sync {
    fn ratio_between(&self, lower: f64, upper: f64) -> f64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadRngRatioSource;

impl RatioSource for ThreadRngRatioSource {
    fn ratio_between(&self, lower: f64, upper: f64) -> f64 {
        if upper <= lower {
            return lower;
        }
        rand::thread_rng().gen_range(lower..=upper)
    }
}

/// Pins every draw to a single ratio, clamped into the requested interval.
/// Used by tests and by callers that want reproducible runs.
#[derive(Clone, Copy, Debug)]
pub struct FixedRatioSource(pub f64);

impl RatioSource for FixedRatioSource {
    fn ratio_between(&self, lower: f64, upper: f64) -> f64 {
        self.0.clamp(lower, upper)
    }
}
