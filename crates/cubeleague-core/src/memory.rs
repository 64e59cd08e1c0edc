// In-memory league backend and broadcast channel.
//
// `InMemoryLeague` implements every store-side collaborator trait over a
// single mutex-guarded state, so a commit is atomic with respect to every
// other call. It backs the engine's unit tests and any embedding that does
// not need durable storage.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::card::{Balance, CardInstance, DraftedCard, InstanceId, TeamId, UserId};
use crate::error::DraftError;
use crate::ports::{
    AuditRecord, AuditSink, BroadcastSink, CommittedPick, MemberRole, MembershipSource,
    PickCommit, PickStore, PoolQuery, QueueEdit, QueueStore, SkipRecord, TurnAuthority,
};
use crate::queue::TeamQueue;
use crate::turn::DraftTurnState;

// ---------------------------------------------------------------------------
// League state
// ---------------------------------------------------------------------------

/// Collaborator calls that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    Audit,
    AdvanceTurn,
    QueueSave,
}

#[derive(Debug, Default)]
struct TeamData {
    balance: Balance,
    members: BTreeMap<UserId, MemberRole>,
    history: Vec<DraftedCard>,
}

#[derive(Debug, Default)]
struct LeagueData {
    order: Vec<TeamId>,
    snake: bool,
    teams: BTreeMap<TeamId, TeamData>,
    /// Every instance in pool order, with the team that drafted it.
    pool: Vec<(CardInstance, Option<TeamId>)>,
    turn_id: u64,
    /// Turns already claimed by a pick or skip.
    claimed: BTreeMap<u64, TeamId>,
    queues: BTreeMap<TeamId, TeamQueue>,
    skips: Vec<SkipRecord>,
    audit: Vec<AuditRecord>,
    faults: Vec<Fault>,
}

impl LeagueData {
    fn turn_state(&self) -> Result<DraftTurnState, DraftError> {
        DraftTurnState::for_turn(self.turn_id, &self.order, self.snake)
            .ok_or_else(|| DraftError::store("draft order is empty"))
    }

    fn fail_if(&self, fault: Fault) -> Result<(), DraftError> {
        if self.faults.contains(&fault) {
            return Err(DraftError::store(format!("injected {fault:?} failure")));
        }
        Ok(())
    }

    /// Shared turn-claim check for picks and skips.
    fn check_turn(&self, team: &str, turn_id: u64) -> Result<(), DraftError> {
        let state = self.turn_state()?;
        if state.turn_id != turn_id
            || !state.is_on_the_clock(team)
            || self.claimed.contains_key(&turn_id)
        {
            return Err(DraftError::TeamNotOnClock {
                team: team.to_string(),
            });
        }
        Ok(())
    }
}

/// Builder for an `InMemoryLeague`.
#[derive(Debug, Default)]
pub struct LeagueBuilder {
    data: LeagueData,
}

impl LeagueBuilder {
    /// Add a team to the end of the draft order.
    pub fn team(mut self, id: &str, balance: Balance) -> Self {
        self.data.order.push(id.to_string());
        self.data.teams.insert(
            id.to_string(),
            TeamData {
                balance,
                ..TeamData::default()
            },
        );
        self
    }

    pub fn member(mut self, team: &str, user: &str, role: MemberRole) -> Self {
        if let Some(data) = self.data.teams.get_mut(team) {
            data.members.insert(user.to_string(), role);
        }
        self
    }

    pub fn snake(mut self, snake: bool) -> Self {
        self.data.snake = snake;
        self
    }

    pub fn cards(mut self, cards: impl IntoIterator<Item = CardInstance>) -> Self {
        self.data.pool.extend(cards.into_iter().map(|c| (c, None)));
        self
    }

    /// Seed a team's history with an already-drafted card.
    pub fn drafted(mut self, team: &str, card: CardInstance) -> Self {
        if let Some(data) = self.data.teams.get_mut(team) {
            let pick_number = data.history.len() as u32 + 1;
            data.history.push(DraftedCard {
                pick_number,
                card: card.clone(),
            });
            self.data.pool.push((card, Some(team.to_string())));
        }
        self
    }

    pub fn build(self) -> InMemoryLeague {
        InMemoryLeague {
            state: Mutex::new(self.data),
        }
    }
}

/// Mutex-backed league implementing every store collaborator.
#[derive(Debug)]
pub struct InMemoryLeague {
    state: Mutex<LeagueData>,
}

impl InMemoryLeague {
    pub fn builder() -> LeagueBuilder {
        LeagueBuilder::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, LeagueData>, DraftError> {
        self.state
            .lock()
            .map_err(|_| DraftError::store("league state lock poisoned"))
    }

    /// Lock for inspection helpers, which never fail.
    fn peek(&self) -> MutexGuard<'_, LeagueData> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -- Inspection and fault injection --------------------------------------

    pub fn set_fault(&self, fault: Fault, enabled: bool) {
        let mut data = self.peek();
        data.faults.retain(|f| *f != fault);
        if enabled {
            data.faults.push(fault);
        }
    }

    pub fn available_count(&self) -> usize {
        self.peek().pool.iter().filter(|(_, by)| by.is_none()).count()
    }

    pub fn balance(&self, team: &str) -> Option<Balance> {
        self.peek().teams.get(team).map(|t| t.balance)
    }

    pub fn history(&self, team: &str) -> Vec<DraftedCard> {
        self.peek()
            .teams
            .get(team)
            .map(|t| t.history.clone())
            .unwrap_or_default()
    }

    pub fn drafted_by(&self, instance_id: &str) -> Option<TeamId> {
        self.peek()
            .pool
            .iter()
            .find(|(c, _)| c.instance_id == instance_id)
            .and_then(|(_, by)| by.clone())
    }

    pub fn queue(&self, team: &str) -> TeamQueue {
        self.peek().queues.get(team).cloned().unwrap_or_default()
    }

    pub fn audit_log(&self) -> Vec<AuditRecord> {
        self.peek().audit.clone()
    }

    pub fn skips(&self) -> Vec<SkipRecord> {
        self.peek().skips.clone()
    }

    pub fn turn_id(&self) -> u64 {
        self.peek().turn_id
    }

    /// Drop `user` from a team's roster, leaving any stored votes in place.
    pub fn remove_member(&self, team: &str, user: &str) {
        if let Some(data) = self.peek().teams.get_mut(team) {
            data.members.remove(user);
        }
    }

    /// Jump the clock, e.g. to simulate another process advancing it.
    pub fn set_turn(&self, turn_id: u64) {
        self.peek().turn_id = turn_id;
    }
}

// ---------------------------------------------------------------------------
// Collaborator impls
// ---------------------------------------------------------------------------

#[async_trait]
impl PoolQuery for InMemoryLeague {
    async fn available_cards(&self) -> Result<Vec<CardInstance>, DraftError> {
        let data = self.lock()?;
        Ok(data
            .pool
            .iter()
            .filter(|(_, by)| by.is_none())
            .map(|(c, _)| c.clone())
            .collect())
    }

    async fn team_history(&self, team: &str) -> Result<Vec<DraftedCard>, DraftError> {
        let data = self.lock()?;
        Ok(data
            .teams
            .get(team)
            .map(|t| t.history.clone())
            .unwrap_or_default())
    }

    async fn team_balance(&self, team: &str) -> Result<Balance, DraftError> {
        let data = self.lock()?;
        data.teams
            .get(team)
            .map(|t| t.balance)
            .ok_or_else(|| DraftError::store(format!("unknown team {team}")))
    }
}

#[async_trait]
impl TurnAuthority for InMemoryLeague {
    async fn current_turn(&self) -> Result<DraftTurnState, DraftError> {
        self.lock()?.turn_state()
    }

    async fn advance_turn(&self, from_turn_id: u64) -> Result<DraftTurnState, DraftError> {
        let mut data = self.lock()?;
        data.fail_if(Fault::AdvanceTurn)?;
        if data.turn_id == from_turn_id {
            data.turn_id += 1;
        }
        data.turn_state()
    }
}

#[async_trait]
impl PickStore for InMemoryLeague {
    async fn commit_pick(&self, commit: &PickCommit) -> Result<CommittedPick, DraftError> {
        let mut data = self.lock()?;

        let unavailable = || DraftError::CardUnavailable {
            instance_id: commit.instance_id.clone(),
        };
        let idx = data
            .pool
            .iter()
            .position(|(c, by)| c.instance_id == commit.instance_id && by.is_none())
            .ok_or_else(unavailable)?;

        data.check_turn(&commit.team, commit.turn_id)?;

        let card = data.pool[idx].0.clone();
        let team = data
            .teams
            .get_mut(&commit.team)
            .ok_or_else(|| DraftError::TeamNotOnClock {
                team: commit.team.clone(),
            })?;
        if team.balance < card.cost {
            return Err(DraftError::InsufficientBalance {
                need: card.cost,
                have: team.balance,
            });
        }

        team.balance -= card.cost;
        let pick_number = team.history.len() as u32 + 1;
        team.history.push(DraftedCard {
            pick_number,
            card: card.clone(),
        });
        let balance_after = team.balance;

        data.pool[idx].1 = Some(commit.team.clone());
        data.claimed.insert(commit.turn_id, commit.team.clone());

        debug!(team = %commit.team, instance_id = %commit.instance_id, pick_number, "committed pick");
        Ok(CommittedPick {
            team: commit.team.clone(),
            pick_number,
            turn_id: commit.turn_id,
            card,
            balance_after,
            actor: commit.actor.clone(),
            source: commit.source,
            committed_at: Utc::now(),
        })
    }

    async fn record_skip(&self, skip: &SkipRecord) -> Result<(), DraftError> {
        let mut data = self.lock()?;
        data.check_turn(&skip.team, skip.turn_id)?;
        data.claimed.insert(skip.turn_id, skip.team.clone());
        data.skips.push(skip.clone());
        Ok(())
    }
}

#[async_trait]
impl QueueStore for InMemoryLeague {
    async fn load_queue(&self, team: &str) -> Result<TeamQueue, DraftError> {
        Ok(self.lock()?.queues.get(team).cloned().unwrap_or_default())
    }

    async fn update_queue(&self, team: &str, edit: QueueEdit<'_>) -> Result<TeamQueue, DraftError> {
        let mut data = self.lock()?;
        let mut queue = data.queues.get(team).cloned().unwrap_or_default();
        edit(&mut queue)?;
        data.fail_if(Fault::QueueSave)?;
        if queue.is_empty() {
            data.queues.remove(team);
        } else {
            data.queues.insert(team.to_string(), queue.clone());
        }
        Ok(queue)
    }

    async fn queued_teams(&self) -> Result<Vec<TeamId>, DraftError> {
        Ok(self.lock()?.queues.keys().cloned().collect())
    }
}

#[async_trait]
impl MembershipSource for InMemoryLeague {
    async fn team_member_count(&self, team: &str) -> Result<u32, DraftError> {
        let data = self.lock()?;
        Ok(data
            .teams
            .get(team)
            .map(|t| t.members.len() as u32)
            .unwrap_or(0))
    }

    async fn member_role(&self, team: &str, user: &str) -> Result<Option<MemberRole>, DraftError> {
        let data = self.lock()?;
        Ok(data
            .teams
            .get(team)
            .and_then(|t| t.members.get(user).copied()))
    }
}

#[async_trait]
impl AuditSink for InMemoryLeague {
    async fn append(&self, record: AuditRecord) -> Result<(), DraftError> {
        let mut data = self.lock()?;
        data.fail_if(Fault::Audit)?;
        data.audit.push(record);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Broadcast
// ---------------------------------------------------------------------------

/// One published draft event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftEvent {
    pub topic: String,
    pub payload: serde_json::Value,
}

/// Broadcast sink over a tokio broadcast channel. Publishing never blocks;
/// with no subscribers the event is dropped.
#[derive(Debug, Clone)]
pub struct ChannelBroadcast {
    tx: broadcast::Sender<DraftEvent>,
}

impl ChannelBroadcast {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        ChannelBroadcast { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DraftEvent> {
        self.tx.subscribe()
    }
}

impl Default for ChannelBroadcast {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl BroadcastSink for ChannelBroadcast {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), DraftError> {
        let event = DraftEvent {
            topic: topic.to_string(),
            payload,
        };
        if self.tx.send(event).is_err() {
            debug!(topic, "no broadcast subscribers");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------

/// Card fixture shared by the engine's unit tests.
#[cfg(test)]
pub(crate) fn test_card(id: &str, rating: f64, colors: &str, cost: Balance) -> CardInstance {
    test_printing(id, id, rating, colors, cost)
}

/// Like `test_card`, but with an explicit logical card id for duplicates.
#[cfg(test)]
pub(crate) fn test_printing(
    instance_id: &str,
    card_id: &str,
    rating: f64,
    colors: &str,
    cost: Balance,
) -> CardInstance {
    CardInstance {
        instance_id: instance_id.to_string(),
        card_id: card_id.to_string(),
        name: format!("Card {card_id}"),
        type_line: "Creature".to_string(),
        rarity: crate::card::Rarity::Common,
        colors: crate::card::parse_colors(colors),
        mana_cost: String::new(),
        mana_value: 2.0,
        rating,
        cost,
    }
}

#[cfg(test)]
pub(crate) fn instance_ids(cards: &[CardInstance]) -> Vec<InstanceId> {
    cards.iter().map(|c| c.instance_id.clone()).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ports::PickSourceKind;

    fn league() -> InMemoryLeague {
        InMemoryLeague::builder()
            .team("owls", 100)
            .team("foxes", 100)
            .cards([
                test_card("a", 90.0, "R", 10),
                test_card("b", 80.0, "", 200),
                test_card("c", 70.0, "G", 30),
            ])
            .build()
    }

    fn commit(team: &str, instance_id: &str, turn_id: u64) -> PickCommit {
        PickCommit {
            team: team.into(),
            instance_id: instance_id.into(),
            turn_id,
            actor: None,
            source: PickSourceKind::Algorithm,
        }
    }

    #[tokio::test]
    async fn commit_debits_and_consumes() {
        let league = league();
        let pick = league.commit_pick(&commit("owls", "a", 0)).await.unwrap();
        assert_eq!(pick.pick_number, 1);
        assert_eq!(pick.balance_after, 90);
        assert_eq!(league.balance("owls"), Some(90));
        assert_eq!(league.drafted_by("a").as_deref(), Some("owls"));
        assert_eq!(league.available_count(), 2);
        assert_eq!(instance_ids(&league.available_cards().await.unwrap()), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn commit_rejects_consumed_instance_first() {
        let league = league();
        league.commit_pick(&commit("owls", "a", 0)).await.unwrap();
        // Wrong team and stale turn, but availability is checked first.
        let err = league.commit_pick(&commit("foxes", "a", 0)).await.unwrap_err();
        assert!(matches!(err, DraftError::CardUnavailable { .. }));
    }

    #[tokio::test]
    async fn commit_rejects_team_off_the_clock() {
        let league = league();
        let err = league.commit_pick(&commit("foxes", "a", 0)).await.unwrap_err();
        assert_eq!(err, DraftError::TeamNotOnClock { team: "foxes".into() });

        league.commit_pick(&commit("owls", "a", 0)).await.unwrap();
        // Turn 0 is claimed even before the clock advances.
        let err = league.commit_pick(&commit("owls", "c", 0)).await.unwrap_err();
        assert!(matches!(err, DraftError::TeamNotOnClock { .. }));
        assert_eq!(league.available_count(), 2);
    }

    #[tokio::test]
    async fn commit_rejects_overdraft_without_side_effects() {
        let league = league();
        let err = league.commit_pick(&commit("owls", "b", 0)).await.unwrap_err();
        assert_eq!(err, DraftError::InsufficientBalance { need: 200, have: 100 });
        assert_eq!(league.balance("owls"), Some(100));
        assert_eq!(league.available_count(), 3);
        assert!(league.history("owls").is_empty());
    }

    #[tokio::test]
    async fn advance_turn_is_idempotent_per_turn() {
        let league = league();
        let next = league.advance_turn(0).await.unwrap();
        assert_eq!(next.turn_id, 1);
        assert_eq!(next.on_the_clock, "foxes");
        let again = league.advance_turn(0).await.unwrap();
        assert_eq!(again.turn_id, 1);
    }

    #[tokio::test]
    async fn skip_claims_the_turn() {
        let league = league();
        let skip = SkipRecord {
            team: "owls".into(),
            turn_id: 0,
            actor: None,
            reason: "nothing affordable".into(),
        };
        league.record_skip(&skip).await.unwrap();
        assert_eq!(league.skips().len(), 1);
        let err = league.commit_pick(&commit("owls", "a", 0)).await.unwrap_err();
        assert!(matches!(err, DraftError::TeamNotOnClock { .. }));
    }

    #[tokio::test]
    async fn injected_faults_surface_as_store_errors() {
        let league = league();
        league.set_fault(Fault::Audit, true);
        let record = AuditRecord::Skip {
            skip: SkipRecord {
                team: "owls".into(),
                turn_id: 0,
                actor: None,
                reason: String::new(),
            },
            explanation: None,
        };
        let err = league.append(record.clone()).await.unwrap_err();
        assert!(err.is_retryable());
        league.set_fault(Fault::Audit, false);
        league.append(record).await.unwrap();
        assert_eq!(league.audit_log().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_commits_for_one_instance_yield_one_winner() {
        for _ in 0..20 {
            let league = Arc::new(league());
            let tasks: Vec<_> = (0..2)
                .map(|_| {
                    let league = league.clone();
                    tokio::spawn(async move { league.commit_pick(&commit("owls", "a", 0)).await })
                })
                .collect();

            let results = futures_util::future::join_all(tasks).await;
            let results: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();

            assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
            assert!(results.iter().any(|r| matches!(
                r,
                Err(DraftError::CardUnavailable { instance_id }) if instance_id == "a"
            )));
            assert_eq!(league.available_count(), 2);
            assert_eq!(league.balance("owls"), Some(90));
        }
    }

    #[tokio::test]
    async fn channel_broadcast_delivers_to_subscribers() {
        let sink = ChannelBroadcast::new(8);
        // No subscriber yet: still Ok.
        sink.publish("draft.pick", serde_json::json!({"n": 0})).await.unwrap();

        let mut rx = sink.subscribe();
        sink.publish("draft.skip", serde_json::json!({"n": 1})).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.topic, "draft.skip");
        assert_eq!(event.payload["n"], 1);
    }
}
