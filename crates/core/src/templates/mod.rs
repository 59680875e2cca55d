//! Canned funnel step templates
//!
//! Matches a free-text prompt against keyword groups and materializes
//! ready-to-calculate steps. This stays a keyword lookup over a fixed
//! library; anything model-driven is out of scope.

use serde_json::Value;
use uuid::Uuid;

use crate::domain::funnel::{SplitVariation, Step, StepId, VariationId};

#[derive(Debug, Clone, Copy)]
struct StepSeed {
    name: &'static str,
    is_required: bool,
    split_names: &'static [&'static str],
}

#[derive(Debug, Clone, Copy)]
struct TemplateSeed {
    key: &'static str,
    keywords: &'static [&'static str],
    steps: &'static [StepSeed],
}

const TEMPLATE_SEEDS: &[TemplateSeed] = &[
    TemplateSeed {
        key: "checkout",
        keywords: &["checkout", "purchase", "cart", "buy", "payment", "order"],
        steps: &[
            StepSeed { name: "Visited product page", is_required: true, split_names: &[] },
            StepSeed { name: "Added to cart", is_required: true, split_names: &[] },
            StepSeed { name: "Started checkout", is_required: true, split_names: &[] },
            StepSeed {
                name: "Entered payment details",
                is_required: true,
                split_names: &["One-page form", "Multi-step form"],
            },
            StepSeed { name: "Completed purchase", is_required: true, split_names: &[] },
        ],
    },
    TemplateSeed {
        key: "signup",
        keywords: &["signup", "sign up", "register", "registration", "account", "join"],
        steps: &[
            StepSeed { name: "Landed on signup page", is_required: true, split_names: &[] },
            StepSeed {
                name: "Started registration form",
                is_required: true,
                split_names: &["Email form", "Social login"],
            },
            StepSeed { name: "Verified email", is_required: false, split_names: &[] },
            StepSeed { name: "Completed profile", is_required: true, split_names: &[] },
        ],
    },
    TemplateSeed {
        key: "onboarding",
        keywords: &["onboarding", "activation", "setup", "getting started", "first run"],
        steps: &[
            StepSeed { name: "Finished signup", is_required: true, split_names: &[] },
            StepSeed { name: "Completed welcome tour", is_required: false, split_names: &[] },
            StepSeed { name: "Connected first integration", is_required: true, split_names: &[] },
            StepSeed { name: "Invited a teammate", is_required: false, split_names: &[] },
            StepSeed { name: "Reached first value moment", is_required: true, split_names: &[] },
        ],
    },
    TemplateSeed {
        key: "subscription",
        keywords: &["subscription", "upgrade", "trial", "billing", "plan", "pricing"],
        steps: &[
            StepSeed { name: "Viewed pricing page", is_required: true, split_names: &[] },
            StepSeed { name: "Started trial", is_required: true, split_names: &[] },
            StepSeed { name: "Used a premium feature", is_required: false, split_names: &[] },
            StepSeed {
                name: "Opened upgrade dialog",
                is_required: true,
                split_names: &["Monthly emphasis", "Annual emphasis"],
            },
            StepSeed { name: "Upgraded to paid", is_required: true, split_names: &[] },
        ],
    },
];

const FALLBACK_STEPS: &[StepSeed] = &[
    StepSeed { name: "Entered funnel", is_required: true, split_names: &[] },
    StepSeed { name: "Engaged with content", is_required: false, split_names: &[] },
    StepSeed { name: "Completed key action", is_required: true, split_names: &[] },
    StepSeed { name: "Converted", is_required: true, split_names: &[] },
];

fn normalize_prompt(value: &str) -> String {
    value
        .to_ascii_lowercase()
        .replace(['_', '-', '/'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn materialize(seeds: &[StepSeed]) -> Vec<Step> {
    seeds
        .iter()
        .enumerate()
        .map(|(index, seed)| Step {
            id: StepId(Uuid::new_v4().to_string()),
            name: seed.name.to_string(),
            order: index as u32 + 1,
            is_enabled: true,
            is_required: seed.is_required,
            conditions: Value::Null,
            split_variations: seed
                .split_names
                .iter()
                .map(|name| SplitVariation {
                    id: VariationId(Uuid::new_v4().to_string()),
                    name: (*name).to_string(),
                    conditions: Value::Null,
                })
                .collect(),
        })
        .collect()
}

/// Keyword-matched library of funnel step templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepTemplateLibrary;

impl StepTemplateLibrary {
    pub fn new() -> Self {
        Self
    }

    pub fn template_keys(&self) -> Vec<&'static str> {
        TEMPLATE_SEEDS.iter().map(|seed| seed.key).collect()
    }

    /// Steps for the first template whose keywords appear in the prompt;
    /// a generic funnel when nothing matches. Ids are freshly generated,
    /// orders contiguous from 1.
    pub fn suggest_steps(&self, prompt: &str) -> Vec<Step> {
        let normalized = normalize_prompt(prompt);
        let seed = TEMPLATE_SEEDS
            .iter()
            .find(|template| template.keywords.iter().any(|keyword| normalized.contains(keyword)));

        materialize(seed.map_or(FALLBACK_STEPS, |template| template.steps))
    }
}
