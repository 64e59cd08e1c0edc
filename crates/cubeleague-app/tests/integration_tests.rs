// Integration tests for the cube league runner.
//
// These tests exercise the full system end-to-end through the library
// crate's public API: config structs, the SQLite store, CSV pool import and
// the draft engine working together.

use std::collections::HashMap;
use std::sync::Arc;

use cubeleague_app::cli::{self, Command};
use cubeleague_app::config::*;
use cubeleague_app::league::{self, League};
use cubeleague_core::ports::{MemberRole, MembershipSource, PoolQuery, TurnAuthority};
use cubeleague_core::votes::ExecutionAttempt;
use cubeleague_core::{DraftError, TurnOutcome};

// ===========================================================================
// Test helpers
// ===========================================================================

/// Fixture directory path (relative to the crate root, which is the cwd for
/// `cargo test`).
const FIXTURES: &str = "tests/fixtures";

/// Two teams: a three-person team (quorum 2) and a solo captain.
fn inline_config(db_path: &str) -> Config {
    Config {
        league: LeagueConfig {
            name: "Test Cube League".into(),
            snake_order: true,
            starting_balance: 100,
            teams: vec![
                TeamConfig {
                    id: "owls".into(),
                    name: "Night Owls".into(),
                    captain: "alice".into(),
                    members: vec!["bob".into(), "carol".into()],
                },
                TeamConfig {
                    id: "foxes".into(),
                    name: "Red Foxes".into(),
                    captain: "dave".into(),
                    members: vec![],
                },
            ],
        },
        database: DatabaseConfig {
            path: db_path.into(),
        },
        pool: PoolConfig {
            csv: Some(format!("{FIXTURES}/pool.csv")),
        },
        logging: LoggingConfig::default(),
    }
}

fn open_memory_league() -> League {
    league::open(&inline_config(":memory:")).expect("league should open")
}

// ===========================================================================
// Full draft
// ===========================================================================

#[tokio::test]
async fn full_snake_draft_over_sqlite() {
    let league = open_memory_league();
    assert_eq!(league.db.available_cards().await.unwrap().len(), 12);

    for _ in 0..30 {
        league.engine.auto_draft_on_the_clock().await.unwrap();
    }

    // Every turn was claimed exactly once, by a pick or a skip.
    let picks = league.db.load_picks().unwrap();
    let turns: Vec<u64> = picks.iter().map(|p| p.turn_id).collect();
    assert_eq!(turns, (0..30).collect::<Vec<_>>());
    assert_eq!(league.db.current_turn().await.unwrap().turn_id, 30);

    // Snake order: owls, foxes, foxes, owls, ...
    let order: Vec<&str> = picks.iter().take(4).map(|p| p.team_id.as_str()).collect();
    assert_eq!(order, vec!["owls", "foxes", "foxes", "owls"]);

    // Balances reconcile with committed costs and pick numbers are dense.
    for team in ["owls", "foxes"] {
        let spent: u32 = picks
            .iter()
            .filter(|p| p.team_id == team && p.instance_id.is_some())
            .map(|p| p.cost)
            .sum();
        assert_eq!(league.db.balance(team).unwrap(), Some(100 - spent));

        let history = league.db.team_history(team).await.unwrap();
        let numbers: Vec<u32> = history.iter().map(|d| d.pick_number).collect();
        assert_eq!(numbers, (1..=history.len() as u32).collect::<Vec<_>>());
    }

    // The 500-cost lotus is never affordable.
    let remaining = league.db.available_cards().await.unwrap();
    assert!(remaining.iter().any(|c| c.instance_id == "lotus-1"));
    assert!(picks.iter().any(|p| p.source == "skipped"));
}

#[tokio::test]
async fn auto_draft_audits_algorithm_explanation() {
    let league = open_memory_league();
    let outcome = league.engine.auto_draft_on_the_clock().await.unwrap();
    let TurnOutcome::Picked(receipt) = outcome else {
        panic!("expected a pick");
    };
    // Black Lotus outrates Lightning Bolt but costs 500, so the best
    // affordable card in the window wins.
    assert_eq!(receipt.pick.card.instance_id, "ring-1");
    assert!(receipt.hook_failures.is_empty());

    let audit = league.db.load_audit().unwrap();
    assert_eq!(audit.len(), 1);
    let json = serde_json::to_value(&audit[0]).unwrap();
    assert_eq!(json["kind"], "pick");
    assert_eq!(json["explanation"]["source"], "affordable_in_window");
    assert_eq!(json["explanation"]["dominant_color"], "R");
}

// ===========================================================================
// Queues and votes
// ===========================================================================

#[tokio::test]
async fn quorum_vote_commits_queued_card() {
    let league = open_memory_league();
    let mut events = league.events.subscribe();
    let queues = league.engine.queues();
    queues.insert("owls", "alice", "swords-1", None).await.unwrap();
    queues.insert("owls", "alice", "bolt-1", None).await.unwrap();

    let votes = league.engine.votes();
    let first = votes.toggle_vote("owls", "swords-1", "bob").await.unwrap();
    assert_eq!(first.quorum, 2);
    assert_eq!(first.execution, ExecutionAttempt::NotAttempted);

    let second = votes.toggle_vote("owls", "swords-1", "carol").await.unwrap();
    let ExecutionAttempt::Committed(receipt) = second.execution else {
        panic!("expected the vote to commit");
    };
    assert_eq!(receipt.pick.actor.as_deref(), Some("carol"));
    assert_eq!(receipt.pick.card.instance_id, "swords-1");
    assert_eq!(league.db.balance("owls").unwrap(), Some(90));

    let queue = queues.list("owls").await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.first().unwrap().instance_id, "bolt-1");

    let event = events.try_recv().unwrap();
    assert_eq!(event.topic, "draft.pick");
    assert_eq!(event.payload["actor"], "carol");
    assert_eq!(event.payload["next_on_the_clock"], "foxes");
}

#[tokio::test]
async fn only_captains_edit_queues() {
    let league = open_memory_league();
    let queues = league.engine.queues();
    let err = queues.insert("owls", "bob", "bolt-1", None).await.unwrap_err();
    assert!(matches!(err, DraftError::Unauthorized { .. }));
    let err = queues.insert("owls", "dave", "bolt-1", None).await.unwrap_err();
    assert!(matches!(err, DraftError::Unauthorized { .. }));

    let err = queues
        .set_queue("owls", "alice", &["bolt-1".into(), "no-such-card".into()])
        .await
        .unwrap_err();
    assert!(matches!(err, DraftError::CardUnavailable { .. }));
    assert!(queues.list("owls").await.unwrap().is_empty());
}

#[tokio::test]
async fn drafted_duplicate_retargets_other_queues() {
    let league = open_memory_league();
    let queues = league.engine.queues();
    queues.insert("owls", "alice", "bolt-1", None).await.unwrap();
    queues.insert("foxes", "dave", "bolt-1", None).await.unwrap();
    queues.insert("foxes", "dave", "swords-1", Some(1)).await.unwrap();

    let outcome = league.engine.run_turn("owls", Some("alice")).await.unwrap();
    let TurnOutcome::Picked(receipt) = outcome else {
        panic!("expected a pick");
    };
    assert_eq!(receipt.pick.card.instance_id, "bolt-1");

    let foxes = queues.list("foxes").await.unwrap();
    let ids: Vec<&str> = foxes.entries().iter().map(|e| e.instance_id.as_str()).collect();
    assert_eq!(ids, vec!["swords-1", "bolt-2"]);
    assert!(queues.list("owls").await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn vote_and_scheduler_race_claims_turn_once() {
    let league = Arc::new(open_memory_league());
    let queues = league.engine.queues();
    queues.insert("owls", "alice", "swords-1", None).await.unwrap();
    league
        .engine
        .votes()
        .toggle_vote("owls", "swords-1", "bob")
        .await
        .unwrap();

    let voter = {
        let league = league.clone();
        tokio::spawn(async move {
            league
                .engine
                .votes()
                .toggle_vote("owls", "swords-1", "carol")
                .await
        })
    };
    let scheduler = {
        let league = league.clone();
        tokio::spawn(async move { league.engine.auto_draft_on_the_clock().await })
    };
    let _ = voter.await.unwrap();
    let _ = scheduler.await.unwrap();

    let picks = league.db.load_picks().unwrap();
    let first_turn: Vec<_> = picks.iter().filter(|p| p.turn_id == 0).collect();
    assert_eq!(first_turn.len(), 1);
    assert_eq!(first_turn[0].team_id, "owls");
    assert_eq!(first_turn[0].instance_id.as_deref(), Some("swords-1"));

    let swords: Vec<_> = picks
        .iter()
        .filter(|p| p.instance_id.as_deref() == Some("swords-1"))
        .collect();
    assert_eq!(swords.len(), 1);
}

// ===========================================================================
// Runner and persistence
// ===========================================================================

#[tokio::test]
async fn cli_commands_report_and_reset() {
    let league = open_memory_league();

    let report = cli::run(&Command::Preview { team: None }, &league).await.unwrap();
    assert!(report.starts_with("owls: Sol Ring (ring-1) by algorithm"));

    let report = cli::run(
        &Command::Queue {
            team: "foxes".into(),
            depth: 3,
        },
        &league,
    )
    .await
    .unwrap();
    assert_eq!(report.lines().count(), 3);
    assert!(report.lines().all(|l| l.contains("suggested")));

    let report = cli::run(&Command::Auto, &league).await.unwrap();
    assert!(report.starts_with("owls drafted Sol Ring"));
    assert_eq!(league.db.pick_count().unwrap(), 1);

    let report = cli::run(&Command::Reset, &league).await.unwrap();
    assert_eq!(report.trim(), "draft progress cleared");
    assert_eq!(league.db.pick_count().unwrap(), 0);
    assert_eq!(league.db.balance("owls").unwrap(), Some(100));
}

#[tokio::test]
async fn seeded_roster_includes_unlisted_captain() {
    let config = inline_config(":memory:");
    let league = league::open(&config).unwrap();

    for team in &config.league.teams {
        let seeded = league.db.team_member_count(&team.id).await.unwrap();
        assert_eq!(seeded as usize, team.member_count());
    }
    assert_eq!(
        league.db.member_role("owls", "alice").await.unwrap(),
        Some(MemberRole::Captain)
    );
    assert_eq!(
        league.db.member_role("foxes", "dave").await.unwrap(),
        Some(MemberRole::Captain)
    );
}

#[tokio::test]
async fn reopening_keeps_draft_progress() {
    let path = std::env::temp_dir().join("cubeleague_integration_reopen.db");
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
    }
    let config = inline_config(&path.to_string_lossy());

    {
        let league = league::open(&config).unwrap();
        league.engine.auto_draft_on_the_clock().await.unwrap();
    }

    let league = league::open(&config).unwrap();
    assert_eq!(league.db.pick_count().unwrap(), 1);
    assert_eq!(league.db.current_turn().await.unwrap().on_the_clock, "foxes");
    assert_eq!(league.db.available_cards().await.unwrap().len(), 11);

    let mut by_team: HashMap<String, usize> = HashMap::new();
    for pick in league.db.load_picks().unwrap() {
        *by_team.entry(pick.team_id).or_default() += 1;
    }
    assert_eq!(by_team.get("owls"), Some(&1));

    drop(league);
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
    }
}
