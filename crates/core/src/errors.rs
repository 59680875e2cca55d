use thiserror::Error;

/// Structural defects in a funnel definition, detected at the calculation
/// boundary before any visitor arithmetic runs.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MalformedStepError {
    #[error("step id cannot be empty")]
    EmptyStepId,
    #[error("duplicate step id detected: {step_id}")]
    DuplicateStepId { step_id: String },
    #[error("order collision among enabled steps at position {order}")]
    StepOrderCollision { order: u32 },
    #[error("variation {position} on step {step_id} is missing a name or id")]
    VariationMissingIdentity { step_id: String, position: usize },
}

/// Fatal calculation failures. Empty funnels and non-positive visitor pools
/// are not errors: they resolve to a well-formed empty result so downstream
/// renderers show an empty state instead of crashing.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CalculationError {
    #[error(transparent)]
    MalformedStep(#[from] MalformedStepError),
    /// Would only occur from a defect (e.g. a step emitting more visitors
    /// than it received). Never retried, never clamped away.
    #[error("internal calculation defect: {0}")]
    Internal(String),
}

impl CalculationError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MalformedStep(MalformedStepError::EmptyStepId) => "empty_step_id",
            Self::MalformedStep(MalformedStepError::DuplicateStepId { .. }) => "duplicate_step_id",
            Self::MalformedStep(MalformedStepError::StepOrderCollision { .. }) => {
                "step_order_collision"
            }
            Self::MalformedStep(MalformedStepError::VariationMissingIdentity { .. }) => {
                "variation_missing_identity"
            }
            Self::Internal(_) => "internal_calculation_defect",
        }
    }

    pub fn user_safe_message(&self) -> String {
        match self {
            Self::MalformedStep(MalformedStepError::EmptyStepId) => {
                "A funnel step is missing its identifier.".to_string()
            }
            Self::MalformedStep(MalformedStepError::DuplicateStepId { step_id }) => {
                format!("Step '{step_id}' appears more than once; step ids must be unique.")
            }
            Self::MalformedStep(MalformedStepError::StepOrderCollision { order }) => {
                format!("Two enabled steps share position {order}; reorder the funnel and retry.")
            }
            Self::MalformedStep(MalformedStepError::VariationMissingIdentity {
                step_id, ..
            }) => {
                format!("A split variation on step '{step_id}' needs both a name and an id.")
            }
            Self::Internal(_) => "An unexpected internal error occurred.".to_string(),
        }
    }
}
