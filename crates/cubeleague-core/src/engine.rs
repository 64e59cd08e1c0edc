// Draft engine facade: wires the queue, vote, resolver and gateway components
// over one set of collaborators and exposes the per-turn entry points.

use tracing::info;

use crate::error::DraftError;
use crate::gateway::{ExecutionGateway, PickReceipt, PickSource, SkipReceipt};
use crate::ports::Collaborators;
use crate::queue::QueueService;
use crate::resolver::{PickDecision, PickResolver, ResolveMode, SkipReason};
use crate::turn::DraftTurnState;
use crate::votes::VoteCoordinator;

/// How a turn ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Picked(Box<PickReceipt>),
    Skipped {
        receipt: SkipReceipt,
        reason: SkipReason,
    },
}

#[derive(Clone)]
pub struct DraftEngine {
    c: Collaborators,
    queues: QueueService,
    votes: VoteCoordinator,
    resolver: PickResolver,
    gateway: ExecutionGateway,
}

impl DraftEngine {
    pub fn new(c: Collaborators) -> Self {
        DraftEngine {
            queues: QueueService::new(c.clone()),
            votes: VoteCoordinator::new(c.clone()),
            resolver: PickResolver::new(c.clone()),
            gateway: ExecutionGateway::new(c.clone()),
            c,
        }
    }

    pub fn queues(&self) -> &QueueService {
        &self.queues
    }

    pub fn votes(&self) -> &VoteCoordinator {
        &self.votes
    }

    pub async fn current_turn(&self) -> Result<DraftTurnState, DraftError> {
        self.c.turns.current_turn().await
    }

    /// What `team` would draft right now, without committing anything.
    pub async fn preview(&self, team: &str) -> Result<PickDecision, DraftError> {
        self.resolver.resolve(team, ResolveMode::Preview).await
    }

    /// Resolve and commit `team`'s pick for the open turn.
    ///
    /// A skip is a successful outcome. `CardUnavailable` means the decision
    /// went stale between resolving and committing; call again to recompute.
    pub async fn run_turn(&self, team: &str, actor: Option<&str>) -> Result<TurnOutcome, DraftError> {
        let turn = self.c.turns.current_turn().await?;
        if !turn.is_on_the_clock(team) {
            return Err(DraftError::TeamNotOnClock {
                team: team.to_string(),
            });
        }
        self.run_turn_at(&turn, actor).await
    }

    /// Scheduler trigger: draft for whichever team is on the clock.
    pub async fn auto_draft_on_the_clock(&self) -> Result<TurnOutcome, DraftError> {
        let turn = self.c.turns.current_turn().await?;
        info!(team = %turn.on_the_clock, turn_id = turn.turn_id, "auto-draft triggered");
        self.run_turn_at(&turn, None).await
    }

    async fn run_turn_at(
        &self,
        turn: &DraftTurnState,
        actor: Option<&str>,
    ) -> Result<TurnOutcome, DraftError> {
        let team = turn.on_the_clock.as_str();
        let decision = self.resolver.resolve(team, ResolveMode::Commit).await?;

        let (instance_id, source) = match decision {
            PickDecision::ManualQueue { card, .. } => (card.instance_id, PickSource::ManualQueue),
            PickDecision::Algorithm { card, explanation } => {
                (card.instance_id, PickSource::Algorithm { explanation })
            }
            PickDecision::Skipped(reason) => {
                let receipt = self
                    .gateway
                    .record_skip(team, turn.turn_id, actor, reason.to_string(), reason.explanation())
                    .await?;
                return Ok(TurnOutcome::Skipped { receipt, reason });
            }
        };

        let receipt = self
            .gateway
            .execute_pick(team, &instance_id, turn.turn_id, actor, source)
            .await?;
        Ok(TurnOutcome::Picked(Box::new(receipt)))
    }
}
