use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::calc::calculator::{CalculationOptions, CalculationRequest, CalculationResult};
use crate::domain::funnel::Step;

/// Memoizes calculations keyed by a content hash of the funnel's steps, the
/// initial value, and the options. Hashing the whole step list is
/// deliberately conservative: any edit to `order`, `is_enabled`,
/// `is_required`, or the variation set changes the key, and condition-only
/// edits merely cost a recompute.
///
/// Purely a performance layer: values are idempotent per key, so
/// last-write-wins under concurrent use, and its absence never changes
/// results.
#[derive(Debug, Default)]
pub struct ResultsCache {
    entries: Mutex<HashMap<String, CalculationResult>>,
    max_entries: usize,
}

impl ResultsCache {
    pub fn new(max_entries: usize) -> Self {
        Self { entries: Mutex::new(HashMap::new()), max_entries: max_entries.max(1) }
    }

    /// Stable key for a calculation request.
    pub fn fingerprint(request: &CalculationRequest) -> String {
        #[derive(Serialize)]
        struct KeyMaterial<'a> {
            steps: &'a [Step],
            initial_value: u64,
            options: &'a CalculationOptions,
        }

        let material = KeyMaterial {
            steps: &request.funnel.steps,
            initial_value: request.initial_value,
            options: &request.options,
        };
        let payload = match serde_json::to_vec(&material) {
            Ok(payload) => payload,
            Err(_) => request.funnel.id.0.as_bytes().to_vec(),
        };
        sha256_hex(&payload)
    }

    pub fn get(&self, key: &str) -> Option<CalculationResult> {
        let entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.get(key).cloned()
    }

    pub fn put(&self, key: String, result: CalculationResult) {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Wholesale flush at capacity: entries are cheap to recompute and
        // the working set for a dashboard session is tiny.
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            entries.clear();
        }
        entries.insert(key, result);
    }

    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(entries) => entries.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        match self.entries.lock() {
            Ok(mut entries) => entries.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

fn sha256_hex(payload: &[u8]) -> String {
    let digest = Sha256::digest(payload);
    let mut output = String::with_capacity(digest.len() * 2);
    for byte in digest {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use crate::calc::calculator::{CalculationOptions, CalculationRequest};
    use crate::calc::random::FixedRatioSource;
    use crate::calc::FunnelCalculator;
    use crate::domain::funnel::{FunnelDefinition, FunnelId, Step, StepId};

    use super::ResultsCache;

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
                id: FunnelId("F-CACHE-1".to_string()),
                name: "Checkout".to_string(),
                description: String::new(),
                timeframe: String::new(),
                performed_by: String::new(),
                steps,
            },
            initial_value,
            options: CalculationOptions::default(),
        }
    }

    #[test]
    fn identical_requests_share_a_fingerprint() {
        let a = request(vec![step("s1", 1), step("s2", 2)], 1_000);
        let b = request(vec![step("s1", 1), step("s2", 2)], 1_000);
        assert_eq!(ResultsCache::fingerprint(&a), ResultsCache::fingerprint(&b));
    }

    #[test]
    fn step_topology_edits_change_the_fingerprint() {
        let base = request(vec![step("s1", 1), step("s2", 2)], 1_000);

        let mut reordered = base.clone();
        reordered.funnel.steps[1].order = 3;
        assert_ne!(ResultsCache::fingerprint(&base), ResultsCache::fingerprint(&reordered));

        let mut toggled = base.clone();
        toggled.funnel.steps[0].is_required = false;
        assert_ne!(ResultsCache::fingerprint(&base), ResultsCache::fingerprint(&toggled));

        let mut resized = base.clone();
        resized.initial_value = 2_000;
        assert_ne!(ResultsCache::fingerprint(&base), ResultsCache::fingerprint(&resized));

        let mut flagged = base.clone();
        flagged.options.include_insights = false;
        assert_ne!(ResultsCache::fingerprint(&base), ResultsCache::fingerprint(&flagged));
    }

    #[test]
    fn funnel_metadata_edits_do_not_change_the_fingerprint() {
        let base = request(vec![step("s1", 1)], 1_000);
        let mut renamed = base.clone();
        renamed.funnel.name = "Renamed funnel".to_string();
        renamed.funnel.description = "New description".to_string();

        assert_eq!(ResultsCache::fingerprint(&base), ResultsCache::fingerprint(&renamed));
    }

    #[test]
    fn get_returns_what_put_stored() {
        let cache = ResultsCache::new(8);
        let calculator = FunnelCalculator::new(FixedRatioSource(0.7));
        let input = request(vec![step("s1", 1), step("s2", 2)], 1_000);
        let result = calculator.calculate(&input).expect("calculate");

        let key = ResultsCache::fingerprint(&input);
        assert!(cache.get(&key).is_none());
        cache.put(key.clone(), result.clone());

        let hit = cache.get(&key).expect("cached");
        assert_eq!(hit.calculated_results, result.calculated_results);
    }

    #[test]
    fn capacity_overflow_flushes_rather_than_growing() {
        let cache = ResultsCache::new(2);
        let calculator = FunnelCalculator::new(FixedRatioSource(0.7));

        for initial in [100u64, 200, 300] {
            let input = request(vec![step("s1", 1)], initial);
            let result = calculator.calculate(&input).expect("calculate");
            cache.put(ResultsCache::fingerprint(&input), result);
        }

        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cached_and_fresh_runs_agree() {
        let cache = ResultsCache::new(8);
        let calculator = FunnelCalculator::new(FixedRatioSource(0.65));
        let input = request(vec![step("s1", 1), step("s2", 2), step("s3", 3)], 10_000);

        let fresh = calculator.calculate(&input).expect("fresh run");
        cache.put(ResultsCache::fingerprint(&input), fresh.clone());
        let cached = cache.get(&ResultsCache::fingerprint(&input)).expect("hit");

        assert_eq!(fresh.calculated_results, cached.calculated_results);
        assert_eq!(fresh.insights, cached.insights);
    }
}
