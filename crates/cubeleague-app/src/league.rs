// League bootstrap: seed the store from config and wire the draft engine.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;

use cubeleague_core::memory::ChannelBroadcast;
use cubeleague_core::ports::{BroadcastSink, MemberRole};
use cubeleague_core::{Collaborators, DraftEngine};

use crate::config::Config;
use crate::db::Database;
use crate::pool_import;

/// Open handles for one league.
pub struct League {
    pub db: Arc<Database>,
    pub engine: DraftEngine,
    pub events: ChannelBroadcast,
}

/// Write teams, members, draft order and (optionally) the pool CSV into
/// `db`. Safe to run on every startup: existing draft progress is kept.
pub fn seed(db: &Database, config: &Config) -> Result<()> {
    for (slot, team) in config.league.teams.iter().enumerate() {
        db.upsert_team(&team.id, &team.name, slot as u32, config.league.starting_balance)
            .with_context(|| format!("failed to seed team {}", team.id))?;

        let mut members = vec![(team.captain.clone(), MemberRole::Captain)];
        members.extend(
            team.members
                .iter()
                .filter(|m| **m != team.captain)
                .map(|m| (m.clone(), MemberRole::Member)),
        );
        db.set_members(&team.id, &members)?;
        info!("Seeded team {} with {} members", team.id, team.member_count());
    }
    db.set_snake_order(config.league.snake_order)?;

    if let Some(csv) = &config.pool.csv {
        let cards = pool_import::load_pool(Path::new(csv))
            .with_context(|| format!("failed to load pool from {csv}"))?;
        let imported = db.import_cards(&cards)?;
        info!("Imported {} card instances from {}", imported, csv);
    }

    info!(
        "Seeded league '{}' with {} teams",
        config.league.name,
        config.league.teams.len()
    );
    Ok(())
}

/// Open the configured database, seed it and build an engine over it.
pub fn open(config: &Config) -> Result<League> {
    if config.league.teams.is_empty() {
        bail!("league has no teams");
    }
    let db = Arc::new(Database::open(&config.database.path).context("failed to open database")?);
    seed(&db, config)?;

    let events = ChannelBroadcast::default();
    let sink: Arc<dyn BroadcastSink> = Arc::new(events.clone());
    let engine = DraftEngine::new(Collaborators::from_backend(db.clone(), sink));

    Ok(League { db, engine, events })
}
