use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::MalformedStepError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunnelId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariationId(pub String);

/// A named sub-path within a step (an A/B arm). Visitor counts for
/// variations are always derived by the calculator; any count present on
/// input is disregarded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplitVariation {
    pub id: VariationId,
    pub name: String,
    /// Entry conditions, carried through but never evaluated here.
    #[serde(default)]
    pub conditions: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Stable across edits; used as the results-map key.
    pub id: StepId,
    pub name: String,
    /// 1-based position, unique among enabled steps.
    pub order: u32,
    pub is_enabled: bool,
    /// Required steps lose visitors; optional steps divert but do not lose.
    pub is_required: bool,
    /// Entry conditions, carried through but never evaluated here.
    #[serde(default)]
    pub conditions: serde_json::Value,
    #[serde(default)]
    pub split_variations: Vec<SplitVariation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunnelDefinition {
    pub id: FunnelId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub timeframe: String,
    #[serde(default)]
    pub performed_by: String,
    pub steps: Vec<Step>,
}

impl FunnelDefinition {
    /// Filters to enabled steps in ascending `order`, rejecting malformed
    /// input before any arithmetic runs: empty step ids, duplicate step ids,
    /// order collisions among enabled steps, and variations without identity.
    pub fn enabled_steps(&self) -> Result<Vec<&Step>, MalformedStepError> {
        let mut steps: Vec<&Step> = self.steps.iter().filter(|step| step.is_enabled).collect();
        steps.sort_by_key(|step| step.order);

        let mut seen_ids = HashSet::new();
        let mut seen_orders = HashSet::new();
        for step in &steps {
            if step.id.0.trim().is_empty() {
                return Err(MalformedStepError::EmptyStepId);
            }
            if !seen_ids.insert(step.id.0.as_str()) {
                return Err(MalformedStepError::DuplicateStepId { step_id: step.id.0.clone() });
            }
            if !seen_orders.insert(step.order) {
                return Err(MalformedStepError::StepOrderCollision { order: step.order });
            }
            for (index, variation) in step.split_variations.iter().enumerate() {
                if variation.id.0.trim().is_empty() || variation.name.trim().is_empty() {
                    return Err(MalformedStepError::VariationMissingIdentity {
                        step_id: step.id.0.clone(),
                        position: index + 1,
                    });
                }
            }
        }

        Ok(steps)
    }

    /// Total declared split variations across enabled steps.
    pub fn variation_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| step.is_enabled)
            .map(|step| step.split_variations.len())
            .sum()
    }
}
