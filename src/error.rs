use crate::domain::service::ServiceStatus;
use thiserror::Error;

/// Malformed template or caller input. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("milestone template cannot be empty")]
    TemplateEmpty,
    #[error("milestone value must be > 0")]
    ValueInvalid,
    #[error("milestone type must be fixed or percentage, got `{0}`")]
    TypeInvalid(String),
    #[error("exactly one final milestone is required")]
    FinalDuplicate,
    #[error("final milestone is required")]
    FinalMissing,
    #[error("final milestone must be last")]
    FinalNotLast,
    #[error("percentage milestones must sum to 100")]
    PercentageSumInvalid,
    #[error("service total must be > 0")]
    TotalInvalid,
    #[error("final milestone amount must be > 0")]
    FinalMilestoneInvalid,
    #[error("override reason is required")]
    OverrideReasonRequired,
    #[error("{0} is required")]
    Required(&'static str),
    #[error("milestone id is required for {0}")]
    MilestoneRequired(&'static str),
    #[error("invalid service product config: {0}")]
    ConfigInvalid(String),
    #[error("unknown service status `{0}`")]
    StatusInvalid(String),
    #[error("unknown override action `{0}`")]
    ActionInvalid(String),
    #[error("unknown deliverable kind `{0}`")]
    DeliverableKindInvalid(String),
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::TemplateEmpty => "MILESTONE_TEMPLATE_EMPTY",
            Self::ValueInvalid => "MILESTONE_VALUE_INVALID",
            Self::TypeInvalid(_) => "MILESTONE_TYPE_INVALID",
            Self::FinalDuplicate => "FINAL_MILESTONE_DUPLICATE",
            Self::FinalMissing => "FINAL_MILESTONE_MISSING",
            Self::FinalNotLast => "FINAL_MILESTONE_NOT_LAST",
            Self::PercentageSumInvalid => "MILESTONE_SUM_INVALID",
            Self::TotalInvalid => "SERVICE_TOTAL_INVALID",
            Self::FinalMilestoneInvalid => "FINAL_MILESTONE_INVALID",
            Self::OverrideReasonRequired => "OVERRIDE_REASON_REQUIRED",
            Self::Required(_)
            | Self::MilestoneRequired(_)
            | Self::ConfigInvalid(_)
            | Self::StatusInvalid(_)
            | Self::ActionInvalid(_)
            | Self::DeliverableKindInvalid(_) => "VALIDATION_FAILED",
        }
    }
}

/// State-machine or row-state violations surfaced to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConflictError {
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        from: ServiceStatus,
        to: ServiceStatus,
    },
    #[error("milestone already paid")]
    AlreadyPaid,
    #[error("milestone is locked")]
    Locked,
    #[error("final payment requires approval")]
    FinalMilestoneLocked,
}

impl ConflictError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            Self::AlreadyPaid => "MILESTONE_ALREADY_PAID",
            Self::Locked => "MILESTONE_LOCKED",
            Self::FinalMilestoneLocked => "FINAL_MILESTONE_LOCKED",
        }
    }
}

#[derive(Error, Debug)]
pub enum EscrowError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("Conflict: {0}")]
    Conflict(#[from] ConflictError),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Unauthorized: {0}")]
    Unauthorized(&'static str),
    #[error("Payment platform error: {0}")]
    Platform(String),
    #[error("Store error: {0}")]
    Store(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EscrowError {
    /// Stable machine-readable code, the same one an HTTP layer would return.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.code(),
            Self::Conflict(e) => e.code(),
            Self::NotFound(_) => "NOT_FOUND",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Platform(_) | Self::Store(_) | Self::Serialization(_) | Self::Csv(_) | Self::Io(_) => {
                "INTERNAL"
            }
        }
    }

    /// Transient failures abort the transaction; the caller (or the event origin) retries.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Platform(_) | Self::Store(_) | Self::Serialization(_) | Self::Csv(_) | Self::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EscrowError>;
