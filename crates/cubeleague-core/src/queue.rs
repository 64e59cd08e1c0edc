// Manual pick queues: a captain-managed, position-indexed list per team.
//
// `TeamQueue` holds the pure list logic and keeps positions dense (1..=N)
// after every mutation. `QueueService` wraps it with membership checks,
// pool lookups and persistence through the `QueueStore` collaborator.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::card::{CardId, CardInstance, InstanceId, TeamId, UserId};
use crate::error::DraftError;
use crate::ports::{queue_edit, Collaborators, MemberRole};
use crate::scorer::rank_for_preview;

// ---------------------------------------------------------------------------
// Queue entries
// ---------------------------------------------------------------------------

/// A team's standing request to acquire one card instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub instance_id: InstanceId,
    /// Logical card id, kept so cleanup can match reprints without a pool lookup.
    pub card_id: CardId,
    /// 1-based, dense and unique within the team's queue.
    pub position: u32,
    pub pinned: bool,
    /// Members who approved drafting this entry.
    #[serde(default)]
    pub approvals: BTreeSet<UserId>,
}

/// Ordered queue for one team.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamQueue {
    entries: Vec<QueueEntry>,
}

impl TeamQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a queue from stored entries, ordering by stored position and
    /// repairing any gaps or duplicates.
    pub fn from_entries(mut entries: Vec<QueueEntry>) -> Self {
        entries.sort_by_key(|e| e.position);
        let mut seen = HashSet::new();
        entries.retain(|e| seen.insert(e.instance_id.clone()));
        let mut queue = TeamQueue { entries };
        queue.renumber();
        queue
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, instance_id: &str) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.instance_id == instance_id)
    }

    pub fn first(&self) -> Option<&QueueEntry> {
        self.entries.first()
    }

    pub fn contains(&self, instance_id: &str) -> bool {
        self.get(instance_id).is_some()
    }

    /// Insert an instance at `position` (clamped into `1..=len+1`), shifting
    /// everything at or after it down by one. An instance already in the
    /// queue is moved instead, keeping its approvals. Returns the final
    /// position.
    pub fn insert(&mut self, instance_id: &str, card_id: &str, position: u32) -> u32 {
        let entry = match self.take(instance_id) {
            Some(existing) => existing,
            None => QueueEntry {
                instance_id: instance_id.to_string(),
                card_id: card_id.to_string(),
                position: 0,
                pinned: false,
                approvals: BTreeSet::new(),
            },
        };
        let idx = self.clamp_index(position);
        self.entries.insert(idx, entry);
        self.renumber();
        idx as u32 + 1
    }

    /// Move or insert the instance at the top and mark it pinned.
    pub fn pin(&mut self, instance_id: &str, card_id: &str) {
        self.insert(instance_id, card_id, 1);
        if let Some(entry) = self.entries.first_mut() {
            entry.pinned = true;
        }
    }

    /// Clear the pinned flag without moving the entry.
    pub fn unpin(&mut self, instance_id: &str) -> bool {
        match self.entries.iter_mut().find(|e| e.instance_id == instance_id) {
            Some(entry) => {
                entry.pinned = false;
                true
            }
            None => false,
        }
    }

    /// Remove an entry, shifting everything after it up by one.
    pub fn remove(&mut self, instance_id: &str) -> Option<QueueEntry> {
        let removed = self.take(instance_id);
        self.renumber();
        removed
    }

    /// Move an existing entry to `position` (clamped into `1..=len`).
    pub fn reorder(&mut self, instance_id: &str, position: u32) -> Option<u32> {
        let entry = self.take(instance_id)?;
        let idx = self.clamp_index(position);
        self.entries.insert(idx, entry);
        self.renumber();
        Some(idx as u32 + 1)
    }

    /// Replace the whole queue with `items` in order. Pins and approvals carry over
    /// for instances that were already queued; duplicate ids keep the first.
    pub fn replace_all(&mut self, items: &[(InstanceId, CardId)]) {
        let mut seen = HashSet::new();
        let mut next = Vec::with_capacity(items.len());
        for (instance_id, card_id) in items {
            if !seen.insert(instance_id.clone()) {
                continue;
            }
            let (pinned, approvals) = self
                .get(instance_id)
                .map(|e| (e.pinned, e.approvals.clone()))
                .unwrap_or_default();
            next.push(QueueEntry {
                instance_id: instance_id.clone(),
                card_id: card_id.clone(),
                position: 0,
                pinned,
                approvals,
            });
        }
        self.entries = next;
        self.renumber();
    }

    /// Flip `user`'s approval on an entry. Returns the new approval state,
    /// or `None` if the entry does not exist.
    pub fn toggle_approval(&mut self, instance_id: &str, user: &str) -> Option<bool> {
        let entry = self.entries.iter_mut().find(|e| e.instance_id == instance_id)?;
        if entry.approvals.remove(user) {
            Some(false)
        } else {
            entry.approvals.insert(user.to_string());
            Some(true)
        }
    }

    /// Point an entry at a different instance of the same logical card.
    fn retarget(&mut self, from: &str, to: &str) -> bool {
        match self.entries.iter_mut().find(|e| e.instance_id == from) {
            Some(entry) => {
                entry.instance_id = to.to_string();
                true
            }
            None => false,
        }
    }

    fn take(&mut self, instance_id: &str) -> Option<QueueEntry> {
        let idx = self.entries.iter().position(|e| e.instance_id == instance_id)?;
        Some(self.entries.remove(idx))
    }

    fn clamp_index(&self, position: u32) -> usize {
        (position.max(1) as usize - 1).min(self.entries.len())
    }

    fn renumber(&mut self) {
        for (i, entry) in self.entries.iter_mut().enumerate() {
            entry.position = i as u32 + 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Materialized queue view
// ---------------------------------------------------------------------------

/// Where a row of the materialized queue came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MaterializedSource {
    Manual { pinned: bool, approvals: usize },
    Suggested { score: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterializedEntry {
    pub position: u32,
    pub card: CardInstance,
    pub source: MaterializedSource,
}

/// What post-commit cleanup did to the queues.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Entries removed, as (team, instance id).
    pub removed: Vec<(TeamId, InstanceId)>,
    /// Entries moved to a remaining duplicate, as (team, from, to).
    pub retargeted: Vec<(TeamId, InstanceId, InstanceId)>,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Queue store adapter: authorized, persisted queue operations.
#[derive(Clone)]
pub struct QueueService {
    c: Collaborators,
}

impl QueueService {
    pub fn new(c: Collaborators) -> Self {
        QueueService { c }
    }

    pub async fn list(&self, team: &str) -> Result<TeamQueue, DraftError> {
        self.c.queues.load_queue(team).await
    }

    /// Insert at `position`, or append when `None`.
    pub async fn insert(
        &self,
        team: &str,
        actor: &str,
        instance_id: &str,
        position: Option<u32>,
    ) -> Result<TeamQueue, DraftError> {
        self.require_captain(team, actor).await?;
        let card = self.available_instance(instance_id).await?;
        let mut placed = 0;
        let queue = self
            .c
            .queues
            .update_queue(
                team,
                queue_edit(|queue| {
                    let position = position.unwrap_or(queue.len() as u32 + 1);
                    placed = queue.insert(&card.instance_id, &card.card_id, position);
                    Ok(())
                }),
            )
            .await?;
        debug!(team, instance_id, placed, "queued card");
        Ok(queue)
    }

    pub async fn pin(
        &self,
        team: &str,
        actor: &str,
        instance_id: &str,
    ) -> Result<TeamQueue, DraftError> {
        self.require_captain(team, actor).await?;
        let card = self.available_instance(instance_id).await?;
        let queue = self
            .c
            .queues
            .update_queue(
                team,
                queue_edit(|queue| {
                    queue.pin(&card.instance_id, &card.card_id);
                    Ok(())
                }),
            )
            .await?;
        debug!(team, instance_id, "pinned card");
        Ok(queue)
    }

    pub async fn unpin(
        &self,
        team: &str,
        actor: &str,
        instance_id: &str,
    ) -> Result<TeamQueue, DraftError> {
        self.require_captain(team, actor).await?;
        self.c
            .queues
            .update_queue(
                team,
                queue_edit(|queue| {
                    if !queue.unpin(instance_id) {
                        return Err(not_found(team, instance_id));
                    }
                    Ok(())
                }),
            )
            .await
    }

    pub async fn remove(
        &self,
        team: &str,
        actor: &str,
        instance_id: &str,
    ) -> Result<TeamQueue, DraftError> {
        self.require_captain(team, actor).await?;
        let queue = self
            .c
            .queues
            .update_queue(
                team,
                queue_edit(|queue| {
                    queue
                        .remove(instance_id)
                        .map(|_| ())
                        .ok_or_else(|| not_found(team, instance_id))
                }),
            )
            .await?;
        debug!(team, instance_id, "removed queued card");
        Ok(queue)
    }

    pub async fn reorder(
        &self,
        team: &str,
        actor: &str,
        instance_id: &str,
        position: u32,
    ) -> Result<TeamQueue, DraftError> {
        self.require_captain(team, actor).await?;
        self.c
            .queues
            .update_queue(
                team,
                queue_edit(|queue| {
                    queue
                        .reorder(instance_id, position)
                        .map(|_| ())
                        .ok_or_else(|| not_found(team, instance_id))
                }),
            )
            .await
    }

    /// Swap the team's whole queue in one write. Every instance must be
    /// available; approvals and pins survive for instances that stay queued.
    pub async fn set_queue(
        &self,
        team: &str,
        actor: &str,
        instance_ids: &[InstanceId],
    ) -> Result<TeamQueue, DraftError> {
        self.require_captain(team, actor).await?;
        let available = self.c.pool.available_cards().await?;

        let mut items = Vec::with_capacity(instance_ids.len());
        for instance_id in instance_ids {
            let card = available
                .iter()
                .find(|c| &c.instance_id == instance_id)
                .ok_or_else(|| DraftError::CardUnavailable {
                    instance_id: instance_id.clone(),
                })?;
            items.push((card.instance_id.clone(), card.card_id.clone()));
        }

        let queue = self
            .c
            .queues
            .update_queue(
                team,
                queue_edit(|queue| {
                    queue.replace_all(&items);
                    Ok(())
                }),
            )
            .await?;
        info!(team, entries = queue.len(), "replaced queue");
        Ok(queue)
    }

    /// Read-through view: the team's available manual entries followed by
    /// suggested filler (by preview score) up to `depth` rows.
    pub async fn materialized(
        &self,
        team: &str,
        depth: usize,
    ) -> Result<Vec<MaterializedEntry>, DraftError> {
        let queue = self.c.queues.load_queue(team).await?;
        let available = self.c.pool.available_cards().await?;

        let mut rows = Vec::with_capacity(depth);
        for entry in queue.entries() {
            if rows.len() >= depth {
                break;
            }
            if let Some(card) = available.iter().find(|c| c.instance_id == entry.instance_id) {
                rows.push(MaterializedEntry {
                    position: rows.len() as u32 + 1,
                    card: card.clone(),
                    source: MaterializedSource::Manual {
                        pinned: entry.pinned,
                        approvals: entry.approvals.len(),
                    },
                });
            }
        }

        if rows.len() < depth {
            let history = self.c.pool.team_history(team).await?;
            let remaining: Vec<CardInstance> = available
                .into_iter()
                .filter(|c| !queue.contains(&c.instance_id))
                .collect();
            for (card, score) in rank_for_preview(&remaining, &history) {
                if rows.len() >= depth {
                    break;
                }
                rows.push(MaterializedEntry {
                    position: rows.len() as u32 + 1,
                    card: card.clone(),
                    source: MaterializedSource::Suggested { score },
                });
            }
        }

        Ok(rows)
    }

    /// Drop the drafted instance from every queue, duplicate-aware.
    ///
    /// The drafting team's entry is consumed. Other teams' entries for the
    /// drafted instance move to another undrafted instance of the same card
    /// when one exists and is not already in that queue; otherwise they are
    /// removed.
    pub async fn cleanup_drafted(
        &self,
        drafting_team: &str,
        drafted: &CardInstance,
    ) -> Result<CleanupReport, DraftError> {
        let available = self.c.pool.available_cards().await?;
        let duplicates: Vec<&CardInstance> = available
            .iter()
            .filter(|c| c.card_id == drafted.card_id && c.instance_id != drafted.instance_id)
            .collect();

        let mut teams = self.c.queues.queued_teams().await?;
        if !teams.iter().any(|t| t == drafting_team) {
            teams.push(drafting_team.to_string());
        }

        let mut report = CleanupReport::default();
        for team in teams {
            // Some(None): removed. Some(Some(id)): retargeted to `id`.
            let mut outcome: Option<Option<InstanceId>> = None;
            let drafting = team == drafting_team;
            self.c
                .queues
                .update_queue(
                    &team,
                    queue_edit(|queue| {
                        if !queue.contains(&drafted.instance_id) {
                            return Ok(());
                        }
                        let replacement = if drafting {
                            None
                        } else {
                            duplicates
                                .iter()
                                .find(|d| !queue.contains(&d.instance_id))
                                .map(|d| d.instance_id.clone())
                        };
                        match &replacement {
                            Some(to) => {
                                queue.retarget(&drafted.instance_id, to);
                            }
                            None => {
                                queue.remove(&drafted.instance_id);
                            }
                        }
                        outcome = Some(replacement);
                        Ok(())
                    }),
                )
                .await?;

            match outcome {
                Some(Some(to)) => {
                    report
                        .retargeted
                        .push((team, drafted.instance_id.clone(), to))
                }
                Some(None) => report.removed.push((team, drafted.instance_id.clone())),
                None => {}
            }
        }

        debug!(
            instance_id = %drafted.instance_id,
            removed = report.removed.len(),
            retargeted = report.retargeted.len(),
            "queue cleanup finished"
        );
        Ok(report)
    }

    async fn require_captain(&self, team: &str, user: &str) -> Result<(), DraftError> {
        match self.c.members.member_role(team, user).await? {
            Some(MemberRole::Captain) => Ok(()),
            _ => Err(DraftError::Unauthorized {
                user: user.to_string(),
                team: team.to_string(),
            }),
        }
    }

    async fn available_instance(&self, instance_id: &str) -> Result<CardInstance, DraftError> {
        self.c
            .pool
            .available_cards()
            .await?
            .into_iter()
            .find(|c| c.instance_id == instance_id)
            .ok_or_else(|| DraftError::CardUnavailable {
                instance_id: instance_id.to_string(),
            })
    }
}

fn not_found(team: &str, instance_id: &str) -> DraftError {
    DraftError::QueueEntryNotFound {
        team: team.to_string(),
        instance_id: instance_id.to_string(),
    }
}
