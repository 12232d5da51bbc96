//! Ranking errors.

use std::fmt;

use crate::providers::ProviderError;

/// Why a ranking produced no routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundReason {
    /// No profile matched the event
    NoProfiles,
    /// Profiles matched but no route survived filtering and sorting
    NoRoutes,
    /// Routes survived but every one was above the max cost
    MaxCostExceeded,
}

impl fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoProfiles => write!(f, "no matching route profile"),
            Self::NoRoutes => write!(f, "no matching route"),
            Self::MaxCostExceeded => write!(f, "max cost exceeded"),
        }
    }
}

/// What stopped a cancelled call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    /// The caller cancelled the token
    Cancelled,
    /// The call deadline passed
    DeadlineExceeded,
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled by caller"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Ranking errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RankError {
    #[error("NOT_FOUND: {0}")]
    NotFound(NotFoundReason),

    #[error("unsupported sorting strategy: {0}")]
    UnsupportedSortingStrategy(String),

    #[error("profile '{profile}': invalid sorting parameter '{parameter}': {reason}")]
    InvalidSortingParameter {
        profile: String,
        parameter: String,
        reason: String,
    },

    #[error("route '{route}' cannot be ranked: {reason}")]
    Unrankable { route: String, reason: String },

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("cannot compute event cost: {0}")]
    EventCost(String),

    #[error("{0}")]
    Cancelled(CancelCause),
}

impl RankError {
    /// Errors confined to one route: the route is dropped, the call goes on.
    pub fn is_route_local(&self) -> bool {
        matches!(self, Self::Provider(_) | Self::Unrankable { .. })
    }

    /// Errors confined to one profile: the profile contributes nothing.
    pub fn is_profile_local(&self) -> bool {
        matches!(self, Self::InvalidSortingParameter { .. })
    }

    /// Short label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::UnsupportedSortingStrategy(_) => "unsupported_strategy",
            Self::InvalidSortingParameter { .. } => "invalid_sorting_parameter",
            Self::Unrankable { .. } => "unrankable",
            Self::Provider(_) => "provider_error",
            Self::EventCost(_) => "event_cost",
            Self::Cancelled(_) => "cancelled",
        }
    }
}
