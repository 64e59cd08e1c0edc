// SQLite persistence layer: league, pool, picks, queues and audit trail.
//
// `Database` implements every store-side collaborator trait from
// `cubeleague_core::ports`. Pick and skip commits run inside an IMMEDIATE
// transaction with conditional updates, so concurrent writers (even in
// separate processes sharing the file) cannot draft the same instance twice
// or claim the same turn twice.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::debug;

use cubeleague_core::card::{format_colors, parse_colors};
use cubeleague_core::ports::{
    AuditRecord, AuditSink, CommittedPick, MemberRole, MembershipSource, PickCommit, PickStore,
    PoolQuery, QueueEdit, QueueStore, SkipRecord, TurnAuthority,
};
use cubeleague_core::queue::{QueueEntry, TeamQueue};
use cubeleague_core::{Balance, CardInstance, DraftError, DraftTurnState, DraftedCard, Rarity, TeamId};

const TURN_KEY: &str = "turn_id";
const SNAKE_KEY: &str = "snake_order";

const CARD_COLUMNS: &str = "c.instance_id, c.card_id, c.name, c.type_line, c.rarity, c.colors, \
                            c.mana_cost, c.mana_value, c.rating, c.cost";

/// One row of the `draft_picks` table: a pick or a skip placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct PickRow {
    pub turn_id: u64,
    pub team_id: TeamId,
    /// `None` for skips.
    pub pick_number: Option<u32>,
    pub instance_id: Option<String>,
    pub cost: Balance,
    pub actor: Option<String>,
    /// `manual_queue`, `algorithm` or `skipped`.
    pub source: String,
    pub reason: Option<String>,
}

/// SQLite-backed league store.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS teams (
                id               TEXT PRIMARY KEY,
                name             TEXT NOT NULL,
                draft_slot       INTEGER NOT NULL,
                starting_balance INTEGER NOT NULL,
                balance          INTEGER NOT NULL CHECK (balance >= 0)
            );

            CREATE TABLE IF NOT EXISTS team_members (
                team_id TEXT NOT NULL REFERENCES teams(id),
                user_id TEXT NOT NULL,
                role    TEXT NOT NULL,
                PRIMARY KEY (team_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS card_instances (
                instance_id TEXT PRIMARY KEY,
                card_id     TEXT NOT NULL,
                name        TEXT NOT NULL,
                type_line   TEXT NOT NULL,
                rarity      TEXT NOT NULL,
                colors      TEXT NOT NULL,
                mana_cost   TEXT NOT NULL,
                mana_value  REAL NOT NULL,
                rating      REAL NOT NULL,
                cost        INTEGER NOT NULL,
                pool_order  INTEGER NOT NULL,
                drafted_by  TEXT REFERENCES teams(id)
            );

            CREATE TABLE IF NOT EXISTS draft_picks (
                turn_id     INTEGER PRIMARY KEY,
                team_id     TEXT NOT NULL REFERENCES teams(id),
                pick_number INTEGER,
                instance_id TEXT UNIQUE REFERENCES card_instances(instance_id),
                cost        INTEGER NOT NULL DEFAULT 0,
                actor       TEXT,
                source      TEXT NOT NULL,
                reason      TEXT,
                timestamp   TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS queue_entries (
                team_id     TEXT NOT NULL REFERENCES teams(id),
                instance_id TEXT NOT NULL,
                card_id     TEXT NOT NULL,
                position    INTEGER NOT NULL,
                pinned      INTEGER NOT NULL DEFAULT 0,
                approvals   TEXT NOT NULL DEFAULT '[]',
                PRIMARY KEY (team_id, instance_id)
            );

            CREATE TABLE IF NOT EXISTS audit_log (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                team_id   TEXT NOT NULL,
                turn_id   INTEGER NOT NULL,
                kind      TEXT NOT NULL,
                record    TEXT NOT NULL,
                timestamp TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS draft_state (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )
        .context("failed to create database schema")?;

        conn.execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_draft_picks_team ON draft_picks(team_id);
             CREATE INDEX IF NOT EXISTS idx_cards_available ON card_instances(drafted_by, pool_order);",
        )
        .context("failed to create indexes")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database mutex poisoned"))
    }

    // ------------------------------------------------------------------
    // League setup
    // ------------------------------------------------------------------

    /// Insert a team or update its name, slot and starting balance. An
    /// existing team's current balance is left alone.
    pub fn upsert_team(&self, id: &str, name: &str, draft_slot: u32, starting_balance: Balance) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO teams (id, name, draft_slot, starting_balance, balance)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(id) DO UPDATE SET
                name             = excluded.name,
                draft_slot       = excluded.draft_slot,
                starting_balance = excluded.starting_balance",
            params![id, name, draft_slot, starting_balance],
        )
        .context("failed to upsert team")?;
        Ok(())
    }

    /// Replace a team's roster in one transaction.
    pub fn set_members(&self, team: &str, members: &[(String, MemberRole)]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().context("failed to begin transaction")?;
        tx.execute("DELETE FROM team_members WHERE team_id = ?1", params![team])
            .context("failed to clear team members")?;
        for (user, role) in members {
            tx.execute(
                "INSERT OR REPLACE INTO team_members (team_id, user_id, role) VALUES (?1, ?2, ?3)",
                params![team, user, role.as_str()],
            )
            .context("failed to insert team member")?;
        }
        tx.commit().context("failed to commit team members")?;
        Ok(())
    }

    pub fn set_snake_order(&self, snake: bool) -> Result<()> {
        let conn = self.conn()?;
        save_state(&conn, SNAKE_KEY, &serde_json::Value::Bool(snake))
    }

    /// Import pool instances in a single transaction, in slice order.
    ///
    /// Re-importing an instance refreshes its card data and pool order but
    /// never its drafted state.
    pub fn import_cards(&self, cards: &[CardInstance]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().context("failed to begin import transaction")?;

        for (order, card) in cards.iter().enumerate() {
            tx.execute(
                "INSERT INTO card_instances
                    (instance_id, card_id, name, type_line, rarity, colors, mana_cost,
                     mana_value, rating, cost, pool_order)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(instance_id) DO UPDATE SET
                    card_id    = excluded.card_id,
                    name       = excluded.name,
                    type_line  = excluded.type_line,
                    rarity     = excluded.rarity,
                    colors     = excluded.colors,
                    mana_cost  = excluded.mana_cost,
                    mana_value = excluded.mana_value,
                    rating     = excluded.rating,
                    cost       = excluded.cost,
                    pool_order = excluded.pool_order",
                params![
                    card.instance_id,
                    card.card_id,
                    card.name,
                    card.type_line,
                    card.rarity.display_str(),
                    format_colors(&card.colors),
                    card.mana_cost,
                    card.mana_value,
                    card.rating,
                    card.cost,
                    order as i64,
                ],
            )
            .context("failed to import card instance")?;
        }

        tx.commit().context("failed to commit card import")?;
        Ok(cards.len())
    }

    /// Delete all picks, skips, queues and audit rows, return every card to
    /// the pool and reset balances. Teams, members and the pool survive.
    pub fn clear_draft(&self) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().context("failed to begin transaction")?;
        tx.execute("DELETE FROM draft_picks", [])
            .context("failed to delete draft picks")?;
        tx.execute("DELETE FROM queue_entries", [])
            .context("failed to delete queue entries")?;
        tx.execute("DELETE FROM audit_log", [])
            .context("failed to delete audit log")?;
        tx.execute("UPDATE card_instances SET drafted_by = NULL", [])
            .context("failed to reset pool")?;
        tx.execute("UPDATE teams SET balance = starting_balance", [])
            .context("failed to reset balances")?;
        tx.execute("DELETE FROM draft_state WHERE key = ?1", params![TURN_KEY])
            .context("failed to reset turn")?;
        tx.commit().context("failed to commit clear_draft")?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Number of committed card picks, skips excluded.
    pub fn pick_count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM draft_picks WHERE instance_id IS NOT NULL",
                [],
                |row| row.get(0),
            )
            .context("failed to count draft picks")?;
        Ok(count as usize)
    }

    /// Every pick and skip, in turn order.
    pub fn load_picks(&self) -> Result<Vec<PickRow>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT turn_id, team_id, pick_number, instance_id, cost, actor, source, reason
                 FROM draft_picks ORDER BY turn_id",
            )
            .context("failed to prepare load_picks query")?;

        let picks = stmt
            .query_map([], |row| {
                Ok(PickRow {
                    turn_id: row.get::<_, i64>(0)? as u64,
                    team_id: row.get(1)?,
                    pick_number: row.get(2)?,
                    instance_id: row.get(3)?,
                    cost: row.get(4)?,
                    actor: row.get(5)?,
                    source: row.get(6)?,
                    reason: row.get(7)?,
                })
            })
            .context("failed to query draft picks")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map draft pick rows")?;

        Ok(picks)
    }

    /// Audit records, oldest first.
    pub fn load_audit(&self) -> Result<Vec<AuditRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT record FROM audit_log ORDER BY id")
            .context("failed to prepare audit query")?;
        let raw = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("failed to query audit log")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to read audit rows")?;

        raw.iter()
            .map(|json| serde_json::from_str(json).context("failed to deserialize audit record"))
            .collect()
    }

    pub fn balance(&self, team: &str) -> Result<Option<Balance>> {
        let conn = self.conn()?;
        team_balance(&conn, team)
    }

    // ------------------------------------------------------------------
    // Commits
    // ------------------------------------------------------------------

    /// Outer error: SQLite failure. Inner error: the store rejected the pick.
    fn commit_pick_tx(&self, commit: &PickCommit) -> Result<std::result::Result<CommittedPick, DraftError>> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to begin pick transaction")?;

        let found: Option<(CardInstance, Option<String>)> = tx
            .query_row(
                &format!(
                    "SELECT {CARD_COLUMNS}, c.drafted_by FROM card_instances c WHERE c.instance_id = ?1"
                ),
                params![commit.instance_id],
                |row| Ok((card_from_row(row, 0)?, row.get(10)?)),
            )
            .optional()
            .context("failed to look up card instance")?;

        let card = match found {
            Some((card, None)) => card,
            _ => {
                return Ok(Err(DraftError::CardUnavailable {
                    instance_id: commit.instance_id.clone(),
                }))
            }
        };

        if !turn_is_open_for(&tx, &commit.team, commit.turn_id)? {
            return Ok(Err(DraftError::TeamNotOnClock {
                team: commit.team.clone(),
            }));
        }

        let debited = tx
            .execute(
                "UPDATE teams SET balance = balance - ?1 WHERE id = ?2 AND balance >= ?1",
                params![card.cost, commit.team],
            )
            .context("failed to debit team balance")?;
        if debited == 0 {
            let have = team_balance(&tx, &commit.team)?.unwrap_or(0);
            return Ok(Err(DraftError::InsufficientBalance {
                need: card.cost,
                have,
            }));
        }

        let consumed = tx
            .execute(
                "UPDATE card_instances SET drafted_by = ?1 WHERE instance_id = ?2 AND drafted_by IS NULL",
                params![commit.team, commit.instance_id],
            )
            .context("failed to consume card instance")?;
        if consumed != 1 {
            return Ok(Err(DraftError::CardUnavailable {
                instance_id: commit.instance_id.clone(),
            }));
        }

        let pick_number: u32 = tx
            .query_row(
                "SELECT COUNT(*) + 1 FROM draft_picks WHERE team_id = ?1 AND instance_id IS NOT NULL",
                params![commit.team],
                |row| row.get(0),
            )
            .context("failed to compute pick number")?;

        let committed_at = Utc::now();
        tx.execute(
            "INSERT INTO draft_picks
                (turn_id, team_id, pick_number, instance_id, cost, actor, source, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                commit.turn_id as i64,
                commit.team,
                pick_number,
                commit.instance_id,
                card.cost,
                commit.actor,
                commit.source.as_str(),
                committed_at.to_rfc3339(),
            ],
        )
        .context("failed to record draft pick")?;

        let balance_after = team_balance(&tx, &commit.team)?.unwrap_or(0);
        tx.commit().context("failed to commit pick")?;

        debug!(team = %commit.team, instance_id = %commit.instance_id, pick_number, "pick stored");
        Ok(Ok(CommittedPick {
            team: commit.team.clone(),
            pick_number,
            turn_id: commit.turn_id,
            card,
            balance_after,
            actor: commit.actor.clone(),
            source: commit.source,
            committed_at,
        }))
    }

    fn record_skip_tx(&self, skip: &SkipRecord) -> Result<std::result::Result<(), DraftError>> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to begin skip transaction")?;

        if !turn_is_open_for(&tx, &skip.team, skip.turn_id)? {
            return Ok(Err(DraftError::TeamNotOnClock {
                team: skip.team.clone(),
            }));
        }

        tx.execute(
            "INSERT INTO draft_picks (turn_id, team_id, cost, actor, source, reason, timestamp)
             VALUES (?1, ?2, 0, ?3, 'skipped', ?4, ?5)",
            params![
                skip.turn_id as i64,
                skip.team,
                skip.actor,
                skip.reason,
                Utc::now().to_rfc3339(),
            ],
        )
        .context("failed to record skip")?;
        tx.commit().context("failed to commit skip")?;
        Ok(Ok(()))
    }

    fn advance_turn_tx(&self, from_turn_id: u64) -> Result<Option<DraftTurnState>> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to begin turn transaction")?;
        if current_turn_id(&tx)? == from_turn_id {
            save_state(&tx, TURN_KEY, &serde_json::json!(from_turn_id + 1))?;
        }
        let state = turn_state(&tx)?;
        tx.commit().context("failed to commit turn advance")?;
        Ok(state)
    }

    /// Outer error: SQLite failure. Inner error: the edit rejected the change.
    fn update_queue_tx(
        &self,
        team: &str,
        edit: QueueEdit<'_>,
    ) -> Result<std::result::Result<TeamQueue, DraftError>> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to begin queue transaction")?;

        let mut queue = read_queue(&tx, team)?;
        if let Err(e) = edit(&mut queue) {
            return Ok(Err(e));
        }

        tx.execute("DELETE FROM queue_entries WHERE team_id = ?1", params![team])
            .context("failed to clear queue")?;
        for entry in queue.entries() {
            let approvals =
                serde_json::to_string(&entry.approvals).context("failed to serialize approvals")?;
            tx.execute(
                "INSERT INTO queue_entries (team_id, instance_id, card_id, position, pinned, approvals)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![team, entry.instance_id, entry.card_id, entry.position, entry.pinned, approvals],
            )
            .context("failed to insert queue entry")?;
        }
        tx.commit().context("failed to commit queue")?;
        Ok(Ok(queue))
    }
}

// ---------------------------------------------------------------------------
// Connection-level helpers
// ---------------------------------------------------------------------------

fn store_err(e: anyhow::Error) -> DraftError {
    DraftError::store(format!("{e:#}"))
}

fn save_state(conn: &Connection, key: &str, value: &serde_json::Value) -> Result<()> {
    let json_str = serde_json::to_string(value).context("failed to serialize state value")?;
    conn.execute(
        "INSERT OR REPLACE INTO draft_state (key, value) VALUES (?1, ?2)",
        params![key, json_str],
    )
    .context("failed to save state")?;
    Ok(())
}

fn load_state(conn: &Connection, key: &str) -> Result<Option<serde_json::Value>> {
    let json_str: Option<String> = conn
        .query_row(
            "SELECT value FROM draft_state WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .context("failed to query draft state")?;

    json_str
        .map(|s| serde_json::from_str(&s).context("failed to deserialize state value"))
        .transpose()
}

fn current_turn_id(conn: &Connection) -> Result<u64> {
    Ok(load_state(conn, TURN_KEY)?
        .and_then(|v| v.as_u64())
        .unwrap_or(0))
}

fn turn_state(conn: &Connection) -> Result<Option<DraftTurnState>> {
    let mut stmt = conn
        .prepare("SELECT id FROM teams ORDER BY draft_slot, id")
        .context("failed to prepare team order query")?;
    let order = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("failed to query team order")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("failed to read team order")?;

    let snake = load_state(conn, SNAKE_KEY)?
        .and_then(|v| v.as_bool())
        .unwrap_or(true);
    Ok(DraftTurnState::for_turn(current_turn_id(conn)?, &order, snake))
}

/// True when `turn_id` is the open turn, belongs to `team` and has nothing
/// recorded against it yet.
fn turn_is_open_for(conn: &Connection, team: &str, turn_id: u64) -> Result<bool> {
    let Some(state) = turn_state(conn)? else {
        return Ok(false);
    };
    if state.turn_id != turn_id || !state.is_on_the_clock(team) {
        return Ok(false);
    }
    let claimed: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM draft_picks WHERE turn_id = ?1)",
            params![turn_id as i64],
            |row| row.get(0),
        )
        .context("failed to check turn claim")?;
    Ok(!claimed)
}

fn read_queue(conn: &Connection, team: &str) -> Result<TeamQueue> {
    let mut stmt = conn
        .prepare(
            "SELECT instance_id, card_id, position, pinned, approvals
             FROM queue_entries WHERE team_id = ?1 ORDER BY position",
        )
        .context("failed to prepare queue query")?;
    let rows = stmt
        .query_map(params![team], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, bool>(3)?,
                row.get::<_, String>(4)?,
            ))
        })
        .context("failed to query queue")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("failed to map queue rows")?;

    let mut entries = Vec::with_capacity(rows.len());
    for (instance_id, card_id, position, pinned, approvals) in rows {
        let approvals: BTreeSet<String> =
            serde_json::from_str(&approvals).context("failed to parse approvals")?;
        entries.push(QueueEntry {
            instance_id,
            card_id,
            position,
            pinned,
            approvals,
        });
    }
    Ok(TeamQueue::from_entries(entries))
}

fn team_balance(conn: &Connection, team: &str) -> Result<Option<Balance>> {
    conn.query_row(
        "SELECT balance FROM teams WHERE id = ?1",
        params![team],
        |row| row.get(0),
    )
    .optional()
    .context("failed to read team balance")
}

fn card_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<CardInstance> {
    let rarity: String = row.get(offset + 4)?;
    let colors: String = row.get(offset + 5)?;
    Ok(CardInstance {
        instance_id: row.get(offset)?,
        card_id: row.get(offset + 1)?,
        name: row.get(offset + 2)?,
        type_line: row.get(offset + 3)?,
        rarity: Rarity::from_str_rarity(&rarity).unwrap_or(Rarity::Common),
        colors: parse_colors(&colors),
        mana_cost: row.get(offset + 6)?,
        mana_value: row.get(offset + 7)?,
        rating: row.get(offset + 8)?,
        cost: row.get(offset + 9)?,
    })
}

// ---------------------------------------------------------------------------
// Collaborator impls
// ---------------------------------------------------------------------------

#[async_trait]
impl PoolQuery for Database {
    async fn available_cards(&self) -> std::result::Result<Vec<CardInstance>, DraftError> {
        let conn = self.conn().map_err(store_err)?;
        let query = || -> Result<Vec<CardInstance>> {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {CARD_COLUMNS} FROM card_instances c
                     WHERE c.drafted_by IS NULL ORDER BY c.pool_order, c.instance_id"
                ))
                .context("failed to prepare pool query")?;
            let cards = stmt
                .query_map([], |row| card_from_row(row, 0))
                .context("failed to query pool")?
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("failed to map pool rows")?;
            Ok(cards)
        };
        query().map_err(store_err)
    }

    async fn team_history(&self, team: &str) -> std::result::Result<Vec<DraftedCard>, DraftError> {
        let conn = self.conn().map_err(store_err)?;
        let query = || -> Result<Vec<DraftedCard>> {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT p.pick_number, {CARD_COLUMNS}
                     FROM draft_picks p JOIN card_instances c ON c.instance_id = p.instance_id
                     WHERE p.team_id = ?1 ORDER BY p.pick_number"
                ))
                .context("failed to prepare history query")?;
            let history = stmt
                .query_map(params![team], |row| {
                    Ok(DraftedCard {
                        pick_number: row.get(0)?,
                        card: card_from_row(row, 1)?,
                    })
                })
                .context("failed to query history")?
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("failed to map history rows")?;
            Ok(history)
        };
        query().map_err(store_err)
    }

    async fn team_balance(&self, team: &str) -> std::result::Result<Balance, DraftError> {
        let conn = self.conn().map_err(store_err)?;
        team_balance(&conn, team)
            .map_err(store_err)?
            .ok_or_else(|| DraftError::store(format!("unknown team {team}")))
    }
}

#[async_trait]
impl TurnAuthority for Database {
    async fn current_turn(&self) -> std::result::Result<DraftTurnState, DraftError> {
        let conn = self.conn().map_err(store_err)?;
        turn_state(&conn)
            .map_err(store_err)?
            .ok_or_else(|| DraftError::store("no teams configured"))
    }

    async fn advance_turn(&self, from_turn_id: u64) -> std::result::Result<DraftTurnState, DraftError> {
        self.advance_turn_tx(from_turn_id)
            .map_err(store_err)?
            .ok_or_else(|| DraftError::store("no teams configured"))
    }
}

#[async_trait]
impl PickStore for Database {
    async fn commit_pick(&self, commit: &PickCommit) -> std::result::Result<CommittedPick, DraftError> {
        self.commit_pick_tx(commit).map_err(store_err)?
    }

    async fn record_skip(&self, skip: &SkipRecord) -> std::result::Result<(), DraftError> {
        self.record_skip_tx(skip).map_err(store_err)?
    }
}

#[async_trait]
impl QueueStore for Database {
    async fn load_queue(&self, team: &str) -> std::result::Result<TeamQueue, DraftError> {
        let conn = self.conn().map_err(store_err)?;
        read_queue(&conn, team).map_err(store_err)
    }

    async fn update_queue(
        &self,
        team: &str,
        edit: QueueEdit<'_>,
    ) -> std::result::Result<TeamQueue, DraftError> {
        self.update_queue_tx(team, edit).map_err(store_err)?
    }

    async fn queued_teams(&self) -> std::result::Result<Vec<TeamId>, DraftError> {
        let conn = self.conn().map_err(store_err)?;
        let query = || -> Result<Vec<TeamId>> {
            let mut stmt = conn
                .prepare("SELECT DISTINCT team_id FROM queue_entries ORDER BY team_id")
                .context("failed to prepare queued teams query")?;
            let teams = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .context("failed to query queued teams")?
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("failed to map queued teams")?;
            Ok(teams)
        };
        query().map_err(store_err)
    }
}

#[async_trait]
impl MembershipSource for Database {
    async fn team_member_count(&self, team: &str) -> std::result::Result<u32, DraftError> {
        let conn = self.conn().map_err(store_err)?;
        conn.query_row(
            "SELECT COUNT(*) FROM team_members WHERE team_id = ?1",
            params![team],
            |row| row.get(0),
        )
        .context("failed to count team members")
        .map_err(store_err)
    }

    async fn member_role(&self, team: &str, user: &str) -> std::result::Result<Option<MemberRole>, DraftError> {
        let conn = self.conn().map_err(store_err)?;
        let role: Option<String> = conn
            .query_row(
                "SELECT role FROM team_members WHERE team_id = ?1 AND user_id = ?2",
                params![team, user],
                |row| row.get(0),
            )
            .optional()
            .context("failed to read member role")
            .map_err(store_err)?;
        Ok(role.as_deref().and_then(MemberRole::from_str_role))
    }
}

#[async_trait]
impl AuditSink for Database {
    async fn append(&self, record: AuditRecord) -> std::result::Result<(), DraftError> {
        let conn = self.conn().map_err(store_err)?;
        let kind = match &record {
            AuditRecord::Pick { .. } => "pick",
            AuditRecord::Skip { .. } => "skip",
        };
        let json = serde_json::to_string(&record)
            .context("failed to serialize audit record")
            .map_err(store_err)?;
        conn.execute(
            "INSERT INTO audit_log (team_id, turn_id, kind, record) VALUES (?1, ?2, ?3, ?4)",
            params![record.team(), record.turn_id() as i64, kind, json],
        )
        .context("failed to append audit record")
        .map_err(store_err)?;
        Ok(())
    }
}
