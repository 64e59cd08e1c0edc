// Pick resolver: one-shot decision of what a team should draft this turn.
//
// The manual queue wins when any of its entries is still in the pool;
// otherwise the affinity scorer decides. The outcome is a closed set of
// variants so callers handle every case.

use std::fmt;

use tracing::debug;

use crate::card::{Balance, CardInstance, InstanceId};
use crate::error::DraftError;
use crate::ports::Collaborators;
use crate::queue::QueueEntry;
use crate::scorer::{compute_auto_draft_pick, ScoreExplanation};

/// Whether the decision is for display or about to be committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Affordability is only enforced on the algorithm path.
    Preview,
    /// Affordability is enforced on both paths.
    Commit,
}

/// Why a turn resolves without a card.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// The first available queued card costs more than the team has.
    InsufficientFunds {
        instance_id: InstanceId,
        name: String,
        need: Balance,
        have: Balance,
    },
    /// Nothing in the pool is affordable.
    NoAffordableCard {
        balance: Balance,
        explanation: Box<ScoreExplanation>,
    },
}

impl SkipReason {
    pub fn explanation(&self) -> Option<Box<ScoreExplanation>> {
        match self {
            SkipReason::InsufficientFunds { .. } => None,
            SkipReason::NoAffordableCard { explanation, .. } => Some(explanation.clone()),
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::InsufficientFunds { need, have, .. } => {
                write!(f, "Insufficient funds: need {need}, have {have}")
            }
            SkipReason::NoAffordableCard { balance, .. } => {
                write!(f, "No affordable card in the pool (balance {balance})")
            }
        }
    }
}

/// Terminal outcome of resolving a turn.
#[derive(Debug, Clone, PartialEq)]
pub enum PickDecision {
    ManualQueue {
        entry: QueueEntry,
        card: CardInstance,
    },
    Algorithm {
        card: CardInstance,
        explanation: Box<ScoreExplanation>,
    },
    Skipped(SkipReason),
}

impl PickDecision {
    /// The card that would be committed, if any.
    pub fn card(&self) -> Option<&CardInstance> {
        match self {
            PickDecision::ManualQueue { card, .. } | PickDecision::Algorithm { card, .. } => {
                Some(card)
            }
            PickDecision::Skipped(_) => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PickDecision::ManualQueue { .. } => "manual_queue",
            PickDecision::Algorithm { .. } => "algorithm",
            PickDecision::Skipped(_) => "skipped",
        }
    }
}

#[derive(Clone)]
pub struct PickResolver {
    c: Collaborators,
}

impl PickResolver {
    pub fn new(c: Collaborators) -> Self {
        PickResolver { c }
    }

    pub async fn resolve(&self, team: &str, mode: ResolveMode) -> Result<PickDecision, DraftError> {
        let available = self.c.pool.available_cards().await?;
        let balance = self.c.pool.team_balance(team).await?;
        let queue = self.c.queues.load_queue(team).await?;

        // Queue-check
        let queued = queue.entries().iter().find_map(|entry| {
            available
                .iter()
                .find(|c| c.instance_id == entry.instance_id)
                .map(|card| (entry, card))
        });

        if let Some((entry, card)) = queued {
            if mode == ResolveMode::Commit && card.cost > balance {
                debug!(team, instance_id = %card.instance_id, need = card.cost, have = balance, "queued card unaffordable");
                return Ok(PickDecision::Skipped(SkipReason::InsufficientFunds {
                    instance_id: card.instance_id.clone(),
                    name: card.name.clone(),
                    need: card.cost,
                    have: balance,
                }));
            }
            return Ok(PickDecision::ManualQueue {
                entry: entry.clone(),
                card: card.clone(),
            });
        }

        // Fallback
        let history = self.c.pool.team_history(team).await?;
        let pick = compute_auto_draft_pick(&available, &history, balance)?;
        let explanation = Box::new(pick.explanation);
        Ok(match pick.card {
            Some(card) => PickDecision::Algorithm { card, explanation },
            None => PickDecision::Skipped(SkipReason::NoAffordableCard {
                balance,
                explanation,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::memory::{test_card, ChannelBroadcast, InMemoryLeague};
    use crate::ports::{MemberRole, PickCommit, PickSourceKind, PickStore};
    use crate::queue::QueueService;
    use crate::scorer::SelectionSource;

    fn setup(balance: Balance) -> (Arc<InMemoryLeague>, Collaborators) {
        let league = Arc::new(
            InMemoryLeague::builder()
                .team("owls", balance)
                .member("owls", "cap", MemberRole::Captain)
                .cards([test_card("A", 90.0, "R", 10), test_card("B", 80.0, "", 200)])
                .build(),
        );
        let c = Collaborators::from_backend(league.clone(), Arc::new(ChannelBroadcast::default()));
        (league, c)
    }

    #[tokio::test]
    async fn empty_queue_falls_back_to_algorithm() {
        let (_, c) = setup(50);
        let decision = PickResolver::new(c).resolve("owls", ResolveMode::Commit).await.unwrap();
        match decision {
            PickDecision::Algorithm { card, explanation } => {
                assert_eq!(card.instance_id, "A");
                assert_eq!(explanation.source, SelectionSource::DominantColor);
            }
            other => panic!("expected algorithm pick, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn nothing_affordable_is_a_skip() {
        let (_, c) = setup(5);
        let decision = PickResolver::new(c).resolve("owls", ResolveMode::Preview).await.unwrap();
        assert_eq!(decision.label(), "skipped");
        assert!(decision.card().is_none());
        let PickDecision::Skipped(reason) = decision else {
            unreachable!()
        };
        assert!(reason.explanation().is_some());
    }

    #[tokio::test]
    async fn first_available_queue_entry_wins() {
        let (league, c) = setup(500);
        let queues = QueueService::new(c.clone());
        queues.insert("owls", "cap", "A", None).await.unwrap();
        queues.insert("owls", "cap", "B", None).await.unwrap();
        // Drafting A elsewhere leaves the stale entry in place until cleanup.
        league
            .commit_pick(&PickCommit {
                team: "owls".into(),
                instance_id: "A".into(),
                turn_id: 0,
                actor: None,
                source: PickSourceKind::Algorithm,
            })
            .await
            .unwrap();

        let decision = PickResolver::new(c).resolve("owls", ResolveMode::Commit).await.unwrap();
        match decision {
            PickDecision::ManualQueue { entry, card } => {
                assert_eq!(card.instance_id, "B");
                assert_eq!(entry.position, 2);
            }
            other => panic!("expected manual pick, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn affordability_gate_applies_to_queue_only_at_commit() {
        let (_, c) = setup(50);
        QueueService::new(c.clone())
            .insert("owls", "cap", "B", None)
            .await
            .unwrap();
        let resolver = PickResolver::new(c);

        let preview = resolver.resolve("owls", ResolveMode::Preview).await.unwrap();
        assert_eq!(preview.label(), "manual_queue");

        let commit = resolver.resolve("owls", ResolveMode::Commit).await.unwrap();
        let PickDecision::Skipped(reason) = commit else {
            panic!("expected a skip")
        };
        assert_eq!(reason.to_string(), "Insufficient funds: need 200, have 50");
        assert!(reason.explanation().is_none());
    }

    #[tokio::test]
    async fn empty_pool_is_an_error() {
        let league = Arc::new(InMemoryLeague::builder().team("owls", 10).build());
        let c = Collaborators::from_backend(league, Arc::new(ChannelBroadcast::default()));
        let err = PickResolver::new(c).resolve("owls", ResolveMode::Preview).await.unwrap_err();
        assert_eq!(err, DraftError::NoCardsAvailable);
    }
}
