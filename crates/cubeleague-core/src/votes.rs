// Vote coordinator: team approvals on queue entries and quorum-triggered picks.

use serde::Serialize;
use tracing::{debug, info};

use crate::error::DraftError;
use crate::gateway::{ExecutionGateway, PickReceipt, PickSource};
use crate::ports::{queue_edit, Collaborators};

/// Approvals needed for a team of `member_count`: 51% of the team, rounded
/// to the nearest member, never less than one.
///
/// 1 -> 1, 3 -> 2, 4 -> 2, 5 -> 3.
pub fn quorum_for(member_count: u32) -> u32 {
    ((member_count * 51 + 50) / 100).max(1)
}

/// What happened to the pick after a vote.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionAttempt {
    /// Quorum not reached on the first entry, or the team is not on the clock.
    NotAttempted,
    Committed(Box<PickReceipt>),
    /// The vote stands; the commit did not.
    Failed(DraftError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoteOutcome {
    /// Whether the voter now approves the entry.
    pub approved: bool,
    pub approvals: u32,
    pub quorum: u32,
    /// True only for the position-1 entry.
    pub quorum_reached: bool,
    pub execution: ExecutionAttempt,
}

/// Serializable summary for callers that report vote state over the wire.
#[derive(Debug, Clone, Serialize)]
pub struct VoteSummary {
    pub approvals: u32,
    pub quorum: u32,
    pub quorum_reached: bool,
    pub executed: bool,
    pub error: Option<String>,
}

impl From<&VoteOutcome> for VoteSummary {
    fn from(outcome: &VoteOutcome) -> Self {
        let (executed, error) = match &outcome.execution {
            ExecutionAttempt::NotAttempted => (false, None),
            ExecutionAttempt::Committed(_) => (true, None),
            ExecutionAttempt::Failed(e) => (false, Some(e.to_string())),
        };
        VoteSummary {
            approvals: outcome.approvals,
            quorum: outcome.quorum,
            quorum_reached: outcome.quorum_reached,
            executed,
            error,
        }
    }
}

#[derive(Clone)]
pub struct VoteCoordinator {
    c: Collaborators,
    gateway: ExecutionGateway,
}

impl VoteCoordinator {
    pub fn new(c: Collaborators) -> Self {
        let gateway = ExecutionGateway::new(c.clone());
        VoteCoordinator { c, gateway }
    }

    /// Flip `user`'s approval on a queued instance.
    ///
    /// When the entry sits at position 1, has quorum and the team is on the
    /// clock, the pick is executed with `user` as the actor. An execution
    /// failure is reported in the outcome; the vote itself is kept.
    pub async fn toggle_vote(
        &self,
        team: &str,
        instance_id: &str,
        user: &str,
    ) -> Result<VoteOutcome, DraftError> {
        if self.c.members.member_role(team, user).await?.is_none() {
            return Err(DraftError::Unauthorized {
                user: user.to_string(),
                team: team.to_string(),
            });
        }

        let mut approved = false;
        let queue = self
            .c
            .queues
            .update_queue(
                team,
                queue_edit(|queue| {
                    approved = queue.toggle_approval(instance_id, user).ok_or_else(|| {
                        DraftError::QueueEntryNotFound {
                            team: team.to_string(),
                            instance_id: instance_id.to_string(),
                        }
                    })?;
                    Ok(())
                }),
            )
            .await?;

        let Some(entry) = queue.get(instance_id) else {
            return Err(DraftError::QueueEntryNotFound {
                team: team.to_string(),
                instance_id: instance_id.to_string(),
            });
        };
        let position = entry.position;
        // Approvals from users who have since left the team do not count.
        let mut approvals = 0;
        for voter in &entry.approvals {
            if self.c.members.member_role(team, voter).await?.is_some() {
                approvals += 1;
            }
        }
        let quorum = quorum_for(self.c.members.team_member_count(team).await?);
        let quorum_reached = position == 1 && approvals >= quorum;
        debug!(team, instance_id, user, approved, approvals, quorum, "vote recorded");

        let execution = if quorum_reached {
            self.try_execute(team, instance_id, user).await
        } else {
            ExecutionAttempt::NotAttempted
        };

        Ok(VoteOutcome {
            approved,
            approvals,
            quorum,
            quorum_reached,
            execution,
        })
    }

    async fn try_execute(&self, team: &str, instance_id: &str, user: &str) -> ExecutionAttempt {
        let turn = match self.c.turns.current_turn().await {
            Ok(turn) => turn,
            Err(e) => return ExecutionAttempt::Failed(e),
        };
        if !turn.is_on_the_clock(team) {
            debug!(team, on_the_clock = %turn.on_the_clock, "quorum reached off the clock");
            return ExecutionAttempt::NotAttempted;
        }

        info!(team, instance_id, user, turn_id = turn.turn_id, "quorum reached, executing pick");
        match self
            .gateway
            .execute_pick(team, instance_id, turn.turn_id, Some(user), PickSource::ManualQueue)
            .await
        {
            Ok(receipt) => ExecutionAttempt::Committed(Box::new(receipt)),
            Err(e) => ExecutionAttempt::Failed(e),
        }
    }
}
