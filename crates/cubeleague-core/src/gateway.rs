// Atomic execution gateway: commit a pick or a skip, then run post-commit hooks.
//
// The commit itself is a single call into the atomic store; the gateway only
// interprets the result. Everything that happens afterwards (queue cleanup,
// audit, turn advance, broadcast) is a best-effort hook whose failure is
// logged and reported in the receipt but never unwinds the commit.

use std::fmt;

use serde_json::json;
use tracing::{info, warn};

use crate::card::TeamId;
use crate::error::DraftError;
use crate::ports::{AuditRecord, Collaborators, CommittedPick, PickCommit, PickSourceKind, SkipRecord};
use crate::queue::{CleanupReport, QueueService};
use crate::scorer::ScoreExplanation;
use crate::turn::DraftTurnState;

pub const TOPIC_PICK: &str = "draft.pick";
pub const TOPIC_SKIP: &str = "draft.skip";

/// Source of a pick being executed, with its source-specific data.
#[derive(Debug, Clone, PartialEq)]
pub enum PickSource {
    ManualQueue,
    Algorithm { explanation: Box<ScoreExplanation> },
}

impl PickSource {
    pub fn kind(&self) -> PickSourceKind {
        match self {
            PickSource::ManualQueue => PickSourceKind::ManualQueue,
            PickSource::Algorithm { .. } => PickSourceKind::Algorithm,
        }
    }

    fn into_explanation(self) -> Option<Box<ScoreExplanation>> {
        match self {
            PickSource::ManualQueue => None,
            PickSource::Algorithm { explanation } => Some(explanation),
        }
    }
}

/// Best-effort actions run after a successful commit, in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostCommitHook {
    QueueCleanup,
    AuditLog,
    AdvanceTurn,
    Broadcast,
}

impl PostCommitHook {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostCommitHook::QueueCleanup => "queue_cleanup",
            PostCommitHook::AuditLog => "audit_log",
            PostCommitHook::AdvanceTurn => "advance_turn",
            PostCommitHook::Broadcast => "broadcast",
        }
    }
}

impl fmt::Display for PostCommitHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const PICK_HOOKS: [PostCommitHook; 4] = [
    PostCommitHook::QueueCleanup,
    PostCommitHook::AuditLog,
    PostCommitHook::AdvanceTurn,
    PostCommitHook::Broadcast,
];

const SKIP_HOOKS: [PostCommitHook; 3] = [
    PostCommitHook::AuditLog,
    PostCommitHook::AdvanceTurn,
    PostCommitHook::Broadcast,
];

#[derive(Debug, Clone, PartialEq)]
pub struct HookFailure {
    pub hook: PostCommitHook,
    pub error: DraftError,
}

/// Result of a committed pick.
#[derive(Debug, Clone, PartialEq)]
pub struct PickReceipt {
    pub pick: CommittedPick,
    /// `None` if the cleanup hook failed.
    pub cleanup: Option<CleanupReport>,
    /// `None` if the advance hook failed.
    pub next_turn: Option<DraftTurnState>,
    pub hook_failures: Vec<HookFailure>,
}

/// Result of a recorded skip.
#[derive(Debug, Clone, PartialEq)]
pub struct SkipReceipt {
    pub skip: SkipRecord,
    pub next_turn: Option<DraftTurnState>,
    pub hook_failures: Vec<HookFailure>,
}

#[derive(Clone)]
pub struct ExecutionGateway {
    c: Collaborators,
    queues: QueueService,
}

impl ExecutionGateway {
    pub fn new(c: Collaborators) -> Self {
        let queues = QueueService::new(c.clone());
        ExecutionGateway { c, queues }
    }

    /// Commit `instance_id` for `team` on `turn_id`.
    ///
    /// Store failures (`CardUnavailable`, `TeamNotOnClock`,
    /// `InsufficientBalance`, `StoreUnavailable`) are returned unchanged and
    /// leave no state behind. Once the store commits, this always returns
    /// `Ok`.
    pub async fn execute_pick(
        &self,
        team: &str,
        instance_id: &str,
        turn_id: u64,
        actor: Option<&str>,
        source: PickSource,
    ) -> Result<PickReceipt, DraftError> {
        let commit = PickCommit {
            team: team.to_string(),
            instance_id: instance_id.to_string(),
            turn_id,
            actor: actor.map(str::to_string),
            source: source.kind(),
        };

        let pick = match self.c.store.commit_pick(&commit).await {
            Ok(pick) => pick,
            Err(e) => {
                info!(team, instance_id, turn_id, error = %e, "pick rejected");
                return Err(e);
            }
        };
        info!(
            team,
            instance_id,
            turn_id,
            pick_number = pick.pick_number,
            source = pick.source.as_str(),
            "pick committed"
        );

        let explanation = source.into_explanation();
        let mut cleanup = None;
        let mut next_turn = None;
        let mut hook_failures = Vec::new();

        for hook in PICK_HOOKS {
            let result = match hook {
                PostCommitHook::QueueCleanup => self
                    .queues
                    .cleanup_drafted(team, &pick.card)
                    .await
                    .map(|report| cleanup = Some(report)),
                PostCommitHook::AuditLog => {
                    let record = AuditRecord::Pick {
                        pick: pick.clone(),
                        explanation: explanation.clone(),
                    };
                    self.c.audit.append(record).await
                }
                PostCommitHook::AdvanceTurn => self
                    .c
                    .turns
                    .advance_turn(turn_id)
                    .await
                    .map(|state| next_turn = Some(state)),
                PostCommitHook::Broadcast => {
                    let payload = pick_payload(&pick, next_turn.as_ref());
                    self.c.broadcast.publish(TOPIC_PICK, payload).await
                }
            };
            if let Err(error) = result {
                warn!(team, turn_id, hook = %hook, error = %error, "post-commit hook failed");
                hook_failures.push(HookFailure { hook, error });
            }
        }

        Ok(PickReceipt {
            pick,
            cleanup,
            next_turn,
            hook_failures,
        })
    }

    /// Record a zero-cost skip for `team` on `turn_id`, then advance the
    /// turn and broadcast it like a pick.
    pub async fn record_skip(
        &self,
        team: &str,
        turn_id: u64,
        actor: Option<&str>,
        reason: String,
        explanation: Option<Box<ScoreExplanation>>,
    ) -> Result<SkipReceipt, DraftError> {
        let skip = SkipRecord {
            team: team.to_string(),
            turn_id,
            actor: actor.map(str::to_string),
            reason,
        };
        self.c.store.record_skip(&skip).await?;
        info!(team, turn_id, reason = %skip.reason, "turn skipped");

        let mut next_turn = None;
        let mut hook_failures = Vec::new();

        for hook in SKIP_HOOKS {
            let result = match hook {
                PostCommitHook::AuditLog => {
                    let record = AuditRecord::Skip {
                        skip: skip.clone(),
                        explanation: explanation.clone(),
                    };
                    self.c.audit.append(record).await
                }
                PostCommitHook::AdvanceTurn => self
                    .c
                    .turns
                    .advance_turn(turn_id)
                    .await
                    .map(|state| next_turn = Some(state)),
                PostCommitHook::Broadcast => {
                    let payload = skip_payload(&skip, next_turn.as_ref());
                    self.c.broadcast.publish(TOPIC_SKIP, payload).await
                }
                PostCommitHook::QueueCleanup => Ok(()),
            };
            if let Err(error) = result {
                warn!(team, turn_id, hook = %hook, error = %error, "post-skip hook failed");
                hook_failures.push(HookFailure { hook, error });
            }
        }

        Ok(SkipReceipt {
            skip,
            next_turn,
            hook_failures,
        })
    }
}

fn next_team(next_turn: Option<&DraftTurnState>) -> Option<TeamId> {
    next_turn.map(|t| t.on_the_clock.clone())
}

fn pick_payload(pick: &CommittedPick, next_turn: Option<&DraftTurnState>) -> serde_json::Value {
    json!({
        "team": pick.team,
        "turn_id": pick.turn_id,
        "pick_number": pick.pick_number,
        "instance_id": pick.card.instance_id,
        "card_id": pick.card.card_id,
        "name": pick.card.name,
        "cost": pick.card.cost,
        "balance_after": pick.balance_after,
        "source": pick.source,
        "actor": pick.actor,
        "committed_at": pick.committed_at,
        "next_on_the_clock": next_team(next_turn),
    })
}

fn skip_payload(skip: &SkipRecord, next_turn: Option<&DraftTurnState>) -> serde_json::Value {
    json!({
        "team": skip.team,
        "turn_id": skip.turn_id,
        "actor": skip.actor,
        "reason": skip.reason,
        "next_on_the_clock": next_team(next_turn),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::memory::{test_card, test_printing, ChannelBroadcast, Fault, InMemoryLeague};
    use crate::ports::{BroadcastSink, MemberRole};

    struct FailingBroadcast;

    #[async_trait]
    impl BroadcastSink for FailingBroadcast {
        async fn publish(&self, _topic: &str, _payload: serde_json::Value) -> Result<(), DraftError> {
            Err(DraftError::store("bus down"))
        }
    }

    fn league() -> Arc<InMemoryLeague> {
        Arc::new(
            InMemoryLeague::builder()
                .team("owls", 100)
                .team("foxes", 100)
                .member("owls", "cap", MemberRole::Captain)
                .member("foxes", "fcap", MemberRole::Captain)
                .cards([
                    test_printing("bolt-1", "bolt", 90.0, "R", 10),
                    test_printing("bolt-2", "bolt", 90.0, "R", 10),
                    test_card("ring", 80.0, "", 200),
                    test_card("elf", 70.0, "G", 30),
                ])
                .build(),
        )
    }

    fn gateway(league: &Arc<InMemoryLeague>, broadcast: Arc<dyn BroadcastSink>) -> ExecutionGateway {
        ExecutionGateway::new(Collaborators::from_backend(league.clone(), broadcast))
    }

    #[tokio::test]
    async fn commit_runs_every_hook() {
        let league = league();
        let bus = ChannelBroadcast::new(8);
        let mut rx = bus.subscribe();
        let gw = gateway(&league, Arc::new(bus));

        let receipt = gw
            .execute_pick("owls", "elf", 0, Some("cap"), PickSource::ManualQueue)
            .await
            .unwrap();

        assert!(receipt.hook_failures.is_empty());
        assert_eq!(receipt.pick.balance_after, 70);
        assert_eq!(receipt.next_turn.as_ref().map(|t| t.turn_id), Some(1));
        assert_eq!(league.turn_id(), 1);

        let audit = league.audit_log();
        assert_eq!(audit.len(), 1);
        assert!(matches!(&audit[0], AuditRecord::Pick { explanation: None, pick } if pick.actor.as_deref() == Some("cap")));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.topic, TOPIC_PICK);
        assert_eq!(event.payload["instance_id"], "elf");
        assert_eq!(event.payload["source"], "manual_queue");
        assert_eq!(event.payload["next_on_the_clock"], "foxes");
    }

    #[tokio::test]
    async fn rejected_commit_runs_no_hooks() {
        let league = league();
        let gw = gateway(&league, Arc::new(ChannelBroadcast::default()));

        let err = gw
            .execute_pick("owls", "ring", 0, None, PickSource::ManualQueue)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Insufficient funds: need 200, have 100");
        assert_eq!(league.turn_id(), 0);
        assert!(league.audit_log().is_empty());
    }

    #[tokio::test]
    async fn stale_turn_fails_cleanly() {
        let league = league();
        let gw = gateway(&league, Arc::new(ChannelBroadcast::default()));
        league.set_turn(1);

        let err = gw
            .execute_pick("owls", "elf", 0, None, PickSource::ManualQueue)
            .await
            .unwrap_err();
        assert!(matches!(err, DraftError::TeamNotOnClock { .. }));
        assert_eq!(league.available_count(), 4);
    }

    #[tokio::test]
    async fn hook_failures_do_not_unwind_the_commit() {
        let league = league();
        league.set_fault(Fault::Audit, true);
        let gw = gateway(&league, Arc::new(FailingBroadcast));

        let receipt = gw
            .execute_pick("owls", "elf", 0, None, PickSource::ManualQueue)
            .await
            .unwrap();

        let failed: Vec<PostCommitHook> = receipt.hook_failures.iter().map(|f| f.hook).collect();
        assert_eq!(failed, vec![PostCommitHook::AuditLog, PostCommitHook::Broadcast]);
        // Later hooks still ran.
        assert_eq!(league.turn_id(), 1);
        assert_eq!(league.drafted_by("elf").as_deref(), Some("owls"));
    }

    #[tokio::test]
    async fn failed_advance_is_reported() {
        let league = league();
        league.set_fault(Fault::AdvanceTurn, true);
        let gw = gateway(&league, Arc::new(ChannelBroadcast::default()));

        let receipt = gw
            .execute_pick("owls", "elf", 0, None, PickSource::ManualQueue)
            .await
            .unwrap();
        assert!(receipt.next_turn.is_none());
        assert_eq!(receipt.hook_failures[0].hook, PostCommitHook::AdvanceTurn);
    }

    #[tokio::test]
    async fn failed_cleanup_leaves_later_hooks_running() {
        let league = league();
        let bus = ChannelBroadcast::new(8);
        let mut rx = bus.subscribe();
        let c = Collaborators::from_backend(league.clone(), Arc::new(bus));
        QueueService::new(c.clone())
            .insert("owls", "cap", "elf", None)
            .await
            .unwrap();
        league.set_fault(Fault::QueueSave, true);

        let receipt = ExecutionGateway::new(c)
            .execute_pick("owls", "elf", 0, Some("cap"), PickSource::ManualQueue)
            .await
            .unwrap();

        assert!(receipt.cleanup.is_none());
        assert_eq!(receipt.hook_failures.len(), 1);
        assert_eq!(receipt.hook_failures[0].hook, PostCommitHook::QueueCleanup);
        assert_eq!(league.drafted_by("elf").as_deref(), Some("owls"));
        // The stale entry stays queued; audit, advance and broadcast still ran.
        assert!(league.queue("owls").contains("elf"));
        assert_eq!(league.audit_log().len(), 1);
        assert_eq!(league.turn_id(), 1);
        assert_eq!(receipt.next_turn.map(|t| t.turn_id), Some(1));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.topic, TOPIC_PICK);
        assert_eq!(event.payload["instance_id"], "elf");
    }

    #[tokio::test]
    async fn cleanup_retargets_other_teams_to_duplicates() {
        let league = league();
        let c = Collaborators::from_backend(league.clone(), Arc::new(ChannelBroadcast::default()));
        let queues = QueueService::new(c.clone());
        queues.insert("owls", "cap", "bolt-1", None).await.unwrap();
        queues.insert("owls", "cap", "elf", None).await.unwrap();
        queues.insert("foxes", "fcap", "bolt-1", None).await.unwrap();
        queues.insert("foxes", "fcap", "elf", None).await.unwrap();

        let receipt = ExecutionGateway::new(c)
            .execute_pick("owls", "bolt-1", 0, None, PickSource::ManualQueue)
            .await
            .unwrap();

        let cleanup = receipt.cleanup.unwrap();
        assert_eq!(cleanup.removed, vec![("owls".to_string(), "bolt-1".to_string())]);
        assert_eq!(
            cleanup.retargeted,
            vec![("foxes".to_string(), "bolt-1".to_string(), "bolt-2".to_string())]
        );

        let foxes = league.queue("foxes");
        assert_eq!(foxes.first().unwrap().instance_id, "bolt-2");
        assert_eq!(foxes.len(), 2);
        assert_eq!(league.queue("owls").first().unwrap().instance_id, "elf");
    }

    #[tokio::test]
    async fn cleanup_removes_last_copy_everywhere() {
        let league = league();
        let c = Collaborators::from_backend(league.clone(), Arc::new(ChannelBroadcast::default()));
        let queues = QueueService::new(c.clone());
        queues.insert("foxes", "fcap", "elf", None).await.unwrap();
        queues.insert("foxes", "fcap", "bolt-1", None).await.unwrap();

        let receipt = ExecutionGateway::new(c)
            .execute_pick("owls", "elf", 0, None, PickSource::ManualQueue)
            .await
            .unwrap();

        assert_eq!(
            receipt.cleanup.unwrap().removed,
            vec![("foxes".to_string(), "elf".to_string())]
        );
        let foxes = league.queue("foxes");
        assert_eq!(foxes.len(), 1);
        assert_eq!(foxes.first().unwrap().position, 1);
    }

    #[tokio::test]
    async fn skip_advances_and_broadcasts() {
        let league = league();
        let bus = ChannelBroadcast::new(8);
        let mut rx = bus.subscribe();
        let gw = gateway(&league, Arc::new(bus));

        let receipt = gw
            .record_skip("owls", 0, None, "Insufficient funds: need 200, have 100".into(), None)
            .await
            .unwrap();

        assert_eq!(receipt.next_turn.unwrap().on_the_clock, "foxes");
        assert_eq!(league.skips().len(), 1);
        assert!(matches!(league.audit_log()[0], AuditRecord::Skip { .. }));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.topic, TOPIC_SKIP);
        assert_eq!(event.payload["reason"], "Insufficient funds: need 200, have 100");
    }

    #[tokio::test]
    async fn skip_off_the_clock_is_rejected() {
        let league = league();
        let gw = gateway(&league, Arc::new(ChannelBroadcast::default()));
        let err = gw
            .record_skip("foxes", 0, None, "nothing".into(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DraftError::TeamNotOnClock { .. }));
        assert!(league.skips().is_empty());
    }
}
