use crate::crd::ConditionReason;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslateError {
    /// The spec contradicts itself; nothing is generated for this generation.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("unsupported transport: {0}")]
    UnsupportedTransport(String),

    /// A reference could not be resolved while building objects.
    #[error("image not found: {0}")]
    ImageNotFound(String),
}

impl TranslateError {
    /// Whether the error rejects the spec itself (surfaced via `Accepted`).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TranslateError::InvalidConfig(_)
                | TranslateError::UnsupportedTransport(_)
        )
    }

    pub fn reason(&self) -> ConditionReason {
        match self {
            TranslateError::InvalidConfig(_) => ConditionReason::InvalidConfig,
            TranslateError::UnsupportedTransport(_) => {
                ConditionReason::UnsupportedTransport
            }
            TranslateError::ImageNotFound(_) => ConditionReason::ImageNotFound,
        }
    }
}
