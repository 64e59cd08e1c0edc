// Collaborator interfaces consumed by the engine.
//
// The engine never talks to a database, clock or message bus directly. Each
// external concern sits behind one of these traits and is injected through
// `Collaborators`, so the SQLite store and the in-memory adapters are
// interchangeable.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::card::{Balance, CardInstance, DraftedCard, InstanceId, TeamId, UserId};
use crate::error::DraftError;
use crate::queue::TeamQueue;
use crate::scorer::ScoreExplanation;
use crate::turn::DraftTurnState;

// ---------------------------------------------------------------------------
// Pick records
// ---------------------------------------------------------------------------

/// Which pick source produced a committed pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickSourceKind {
    ManualQueue,
    Algorithm,
}

impl PickSourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PickSourceKind::ManualQueue => "manual_queue",
            PickSourceKind::Algorithm => "algorithm",
        }
    }
}

/// Request to the atomic store: record pick, debit cost, consume instance.
#[derive(Debug, Clone, PartialEq)]
pub struct PickCommit {
    pub team: TeamId,
    pub instance_id: InstanceId,
    /// The turn this pick claims. The store rejects it unless the turn is
    /// still open and belongs to `team`.
    pub turn_id: u64,
    pub actor: Option<UserId>,
    pub source: PickSourceKind,
}

/// A pick that the store has durably committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedPick {
    pub team: TeamId,
    /// Team-local pick number (1-indexed).
    pub pick_number: u32,
    pub turn_id: u64,
    pub card: CardInstance,
    pub balance_after: Balance,
    pub actor: Option<UserId>,
    pub source: PickSourceKind,
    pub committed_at: DateTime<Utc>,
}

/// A zero-cost placeholder written when a turn resolves without a card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipRecord {
    pub team: TeamId,
    pub turn_id: u64,
    pub actor: Option<UserId>,
    pub reason: String,
}

/// Audit trail entry written after every commit or skip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditRecord {
    Pick {
        pick: CommittedPick,
        /// Full scorer explanation for algorithmic picks.
        explanation: Option<Box<ScoreExplanation>>,
    },
    Skip {
        skip: SkipRecord,
        explanation: Option<Box<ScoreExplanation>>,
    },
}

impl AuditRecord {
    pub fn team(&self) -> &str {
        match self {
            AuditRecord::Pick { pick, .. } => &pick.team,
            AuditRecord::Skip { skip, .. } => &skip.team,
        }
    }

    pub fn turn_id(&self) -> u64 {
        match self {
            AuditRecord::Pick { pick, .. } => pick.turn_id,
            AuditRecord::Skip { skip, .. } => skip.turn_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Membership
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Captain,
    Member,
}

impl MemberRole {
    pub fn from_str_role(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "captain" => Some(MemberRole::Captain),
            "member" => Some(MemberRole::Member),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Captain => "captain",
            MemberRole::Member => "member",
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Read access to the shared pool, team histories and balances.
#[async_trait]
pub trait PoolQuery: Send + Sync {
    /// Undrafted instances in a stable pool order.
    async fn available_cards(&self) -> Result<Vec<CardInstance>, DraftError>;
    async fn team_history(&self, team: &str) -> Result<Vec<DraftedCard>, DraftError>;
    async fn team_balance(&self, team: &str) -> Result<Balance, DraftError>;
}

/// Owner of draft order.
#[async_trait]
pub trait TurnAuthority: Send + Sync {
    async fn current_turn(&self) -> Result<DraftTurnState, DraftError>;
    /// Advance past `from_turn_id`. A no-op returning the current state when
    /// the clock has already moved on.
    async fn advance_turn(&self, from_turn_id: u64) -> Result<DraftTurnState, DraftError>;
}

/// Atomic store primitive.
///
/// `commit_pick` must run as one transaction that, in order, rejects an
/// unknown or consumed instance (`CardUnavailable`), rejects a turn that is
/// closed or not owned by the team (`TeamNotOnClock`), rejects a debit that
/// would go negative (`InsufficientBalance`), and otherwise records the
/// history row, debits the cost and consumes the instance. Failures leave no
/// side effects. `record_skip` claims the turn the same way.
#[async_trait]
pub trait PickStore: Send + Sync {
    async fn commit_pick(&self, commit: &PickCommit) -> Result<CommittedPick, DraftError>;
    async fn record_skip(&self, skip: &SkipRecord) -> Result<(), DraftError>;
}

/// In-place edit applied to a team's queue by `QueueStore::update_queue`.
/// Returning `Err` discards the edit.
pub type QueueEdit<'a> = Box<dyn FnOnce(&mut TeamQueue) -> Result<(), DraftError> + Send + 'a>;

/// Box a closure as a `QueueEdit`, letting the closure's signature be inferred.
pub fn queue_edit<'a>(
    f: impl FnOnce(&mut TeamQueue) -> Result<(), DraftError> + Send + 'a,
) -> QueueEdit<'a> {
    Box::new(f)
}

/// Persistence for each team's manual queue.
///
/// `update_queue` must load, edit and store the queue as one atomic step
/// with respect to every other `update_queue` on the same team, so
/// concurrent votes and edits never overwrite each other.
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn load_queue(&self, team: &str) -> Result<TeamQueue, DraftError>;
    /// Apply `edit` and return the stored result. An empty result deletes
    /// the team's queue.
    async fn update_queue(&self, team: &str, edit: QueueEdit<'_>) -> Result<TeamQueue, DraftError>;
    /// Teams that currently have at least one queue entry.
    async fn queued_teams(&self) -> Result<Vec<TeamId>, DraftError>;
}

#[async_trait]
pub trait MembershipSource: Send + Sync {
    async fn team_member_count(&self, team: &str) -> Result<u32, DraftError>;
    async fn member_role(&self, team: &str, user: &str) -> Result<Option<MemberRole>, DraftError>;
}

/// Best-effort fan-out of draft events.
#[async_trait]
pub trait BroadcastSink: Send + Sync {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), DraftError>;
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: AuditRecord) -> Result<(), DraftError>;
}

// ---------------------------------------------------------------------------
// Injection bundle
// ---------------------------------------------------------------------------

/// Every collaborator the engine needs, shared behind `Arc`.
#[derive(Clone)]
pub struct Collaborators {
    pub pool: Arc<dyn PoolQuery>,
    pub turns: Arc<dyn TurnAuthority>,
    pub store: Arc<dyn PickStore>,
    pub queues: Arc<dyn QueueStore>,
    pub members: Arc<dyn MembershipSource>,
    pub broadcast: Arc<dyn BroadcastSink>,
    pub audit: Arc<dyn AuditSink>,
}

impl Collaborators {
    /// Build a bundle from one backend that implements every store-side
    /// trait, plus a separate broadcast sink.
    pub fn from_backend<B>(backend: Arc<B>, broadcast: Arc<dyn BroadcastSink>) -> Self
    where
        B: PoolQuery
            + TurnAuthority
            + PickStore
            + QueueStore
            + MembershipSource
            + AuditSink
            + 'static,
    {
        Collaborators {
            pool: backend.clone(),
            turns: backend.clone(),
            store: backend.clone(),
            queues: backend.clone(),
            members: backend.clone(),
            audit: backend,
            broadcast,
        }
    }
}
