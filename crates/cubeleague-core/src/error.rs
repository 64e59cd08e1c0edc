// Error taxonomy shared by every engine component.
//
// Messages are shown to end users on the manual-queue and voting paths, so
// each variant renders an actionable cause instead of a bare code.

use thiserror::Error;

use crate::card::{Balance, InstanceId, TeamId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("No cards available in the pool")]
    NoCardsAvailable,

    #[error("Card {instance_id} is no longer available")]
    CardUnavailable { instance_id: InstanceId },

    #[error("Insufficient funds: need {need}, have {have}")]
    InsufficientBalance { need: Balance, have: Balance },

    #[error("Team {team} is not on the clock")]
    TeamNotOnClock { team: TeamId },

    #[error("Draft store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Card {instance_id} is not in the queue for team {team}")]
    QueueEntryNotFound { team: TeamId, instance_id: InstanceId },

    #[error("User {user} is not allowed to change team {team}")]
    Unauthorized { user: UserId, team: TeamId },
}

impl DraftError {
    /// Wrap a transient collaborator failure.
    pub fn store(err: impl std::fmt::Display) -> Self {
        DraftError::StoreUnavailable(err.to_string())
    }

    /// Only transient store failures may be retried as-is. A lost race
    /// (`CardUnavailable`) requires recomputing the decision instead.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DraftError::StoreUnavailable(_))
    }
}
