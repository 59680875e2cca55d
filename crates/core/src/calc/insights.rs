use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::funnel::{Step, StepId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunnelInsights {
    /// Visitors reaching the last enabled step as a percentage of the pool
    /// entering the funnel.
    pub overall_conversion_rate: f64,
    /// Visitors lost at required steps. Optional-step bypass populations and
    /// split diversions are not losses.
    pub total_drop_off: u64,
    /// Step with the largest single-step loss; `None` with fewer than two
    /// enabled steps or when nothing was lost.
    pub biggest_drop_off_step: Option<StepId>,
}

impl FunnelInsights {
    pub fn empty() -> Self {
        Self { overall_conversion_rate: 0.0, total_drop_off: 0, biggest_drop_off_step: None }
    }
}

/// Pure aggregation over a completed results map and the ordered enabled
/// steps the map was computed from.
pub fn aggregate_insights(
    results: &BTreeMap<String, u64>,
    enabled: &[&Step],
    initial_value: u64,
) -> FunnelInsights {
    let Some(last) = enabled.last() else {
        return FunnelInsights::empty();
    };
    if initial_value == 0 {
        return FunnelInsights::empty();
    }

    let last_count = results.get(last.id.0.as_str()).copied().unwrap_or(0);
    let overall_conversion_rate = last_count as f64 / initial_value as f64 * 100.0;

    // Replays the calculator's merge rule: required steps lose the gap to
    // their incoming population, optional steps divert and rejoin.
    let mut carried = initial_value;
    let mut total_drop_off = 0u64;
    let mut biggest: Option<(StepId, u64)> = None;

    for step in enabled {
        let count = results.get(step.id.0.as_str()).copied().unwrap_or(0);
        if !step.is_required {
            continue;
        }

        let lost = carried.saturating_sub(count);
        total_drop_off += lost;
        let is_new_max = lost > 0 && biggest.as_ref().map_or(true, |(_, best)| lost > *best);
        if is_new_max {
            biggest = Some((step.id.clone(), lost));
        }
        carried = count;
    }

    let biggest_drop_off_step =
        if enabled.len() < 2 { None } else { biggest.map(|(step_id, _)| step_id) };

    FunnelInsights { overall_conversion_rate, total_drop_off, biggest_drop_off_step }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::Value;

    use crate::domain::funnel::{Step, StepId};

    use super::{aggregate_insights, FunnelInsights};

    fn step(id: &str, order: u32, required: bool) -> Step {
        Step {
            id: StepId(id.to_string()),
            name: id.to_uppercase(),
            order,
            is_enabled: true,
            is_required: required,
            conditions: Value::Null,
            split_variations: Vec::new(),
        }
    }

    fn results(pairs: &[(&str, u64)]) -> BTreeMap<String, u64> {
        pairs.iter().map(|(key, value)| (key.to_string(), *value)).collect()
    }

    #[test]
    fn no_enabled_steps_yields_empty_insights() {
        let insights = aggregate_insights(&BTreeMap::new(), &[], 10_000);
        assert_eq!(insights, FunnelInsights::empty());
    }

    #[test]
    fn overall_rate_tracks_the_last_enabled_step() {
        let steps = [step("a", 1, true), step("b", 2, true)];
        let refs: Vec<&Step> = steps.iter().collect();
        let map = results(&[("a", 1_000), ("b", 250)]);

        let insights = aggregate_insights(&map, &refs, 1_000);
        assert!((insights.overall_conversion_rate - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn drop_off_accumulates_required_losses_and_finds_the_biggest() {
        let steps = [step("a", 1, true), step("b", 2, true), step("c", 3, true)];
        let refs: Vec<&Step> = steps.iter().collect();
        let map = results(&[("a", 1_000), ("b", 400), ("c", 300)]);

        let insights = aggregate_insights(&map, &refs, 1_000);
        assert_eq!(insights.total_drop_off, 700);
        assert_eq!(insights.biggest_drop_off_step, Some(StepId("b".to_string())));
    }

    #[test]
    fn optional_steps_contribute_no_drop_off() {
        let steps = [step("a", 1, true), step("opt", 2, false), step("c", 3, true)];
        let refs: Vec<&Step> = steps.iter().collect();
        // The optional step completed 120 of 1000, but its bypass population
        // rejoined; only the required step "c" loses visitors.
        let map = results(&[("a", 1_000), ("opt", 120), ("c", 800)]);

        let insights = aggregate_insights(&map, &refs, 1_000);
        assert_eq!(insights.total_drop_off, 200);
        assert_eq!(insights.biggest_drop_off_step, Some(StepId("c".to_string())));
    }

    #[test]
    fn single_step_funnel_has_no_biggest_drop_off() {
        let steps = [step("only", 1, true)];
        let refs: Vec<&Step> = steps.iter().collect();
        let map = results(&[("only", 600)]);

        let insights = aggregate_insights(&map, &refs, 1_000);
        assert_eq!(insights.biggest_drop_off_step, None);
        assert_eq!(insights.total_drop_off, 400);
    }

    #[test]
    fn lossless_funnel_reports_no_biggest_drop_off() {
        let steps = [step("a", 1, true), step("b", 2, true)];
        let refs: Vec<&Step> = steps.iter().collect();
        let map = results(&[("a", 1_000), ("b", 1_000)]);

        let insights = aggregate_insights(&map, &refs, 1_000);
        assert_eq!(insights.total_drop_off, 0);
        assert_eq!(insights.biggest_drop_off_step, None);
    }
}
