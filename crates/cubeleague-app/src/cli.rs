// Command-line runner: one reactive draft action per invocation.
//
//   cubeleague                      preview the team on the clock
//   cubeleague preview [team]       preview a team's next pick
//   cubeleague auto                 auto-draft for the team on the clock
//   cubeleague queue <team> [depth] show a team's materialized queue
//   cubeleague reset                clear all draft progress

use std::fmt::Write as _;

use anyhow::Result;
use clap::{Parser, Subcommand};

use cubeleague_core::queue::MaterializedSource;
use cubeleague_core::resolver::PickDecision;
use cubeleague_core::TurnOutcome;

use crate::league::League;

pub const DEFAULT_QUEUE_DEPTH: usize = 10;

/// Cube league auto-draft runner
#[derive(Parser, Debug)]
#[command(name = "cubeleague")]
#[command(version, about = "Run one auto-draft action against the league database")]
pub struct Cli {
    /// Action to run; previews the team on the clock when omitted
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// The requested subcommand, or a preview of the team on the clock.
    pub fn action(&self) -> Command {
        self.command
            .clone()
            .unwrap_or(Command::Preview { team: None })
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Preview a team's next pick without committing it
    Preview {
        /// Team id (defaults to the team on the clock)
        team: Option<String>,
    },
    /// Auto-draft for the team on the clock
    Auto,
    /// Show a team's materialized queue
    Queue {
        /// Team id
        team: String,
        /// Number of rows to show
        #[arg(default_value_t = DEFAULT_QUEUE_DEPTH)]
        depth: usize,
    },
    /// Clear all draft progress
    Reset,
}

/// Execute `command` and return the report to print.
pub async fn run(command: &Command, league: &League) -> Result<String> {
    let engine = &league.engine;
    let mut out = String::new();

    match command {
        Command::Preview { team } => {
            let team = match team {
                Some(t) => t.clone(),
                None => engine.current_turn().await?.on_the_clock,
            };
            let decision = engine.preview(&team).await?;
            match &decision {
                PickDecision::ManualQueue { entry, card } => writeln!(
                    out,
                    "{team}: {} ({}) from queue position {}, cost {}",
                    card.name, card.instance_id, entry.position, card.cost
                )?,
                PickDecision::Algorithm { card, explanation } => writeln!(
                    out,
                    "{team}: {} ({}) by algorithm [{:?}], cost {}",
                    card.name, card.instance_id, explanation.source, card.cost
                )?,
                PickDecision::Skipped(reason) => writeln!(out, "{team}: skip ({reason})")?,
            }
        }
        Command::Auto => match engine.auto_draft_on_the_clock().await? {
            TurnOutcome::Picked(receipt) => {
                let pick = &receipt.pick;
                writeln!(
                    out,
                    "{} drafted {} ({}) as pick {} via {}, balance now {}",
                    pick.team,
                    pick.card.name,
                    pick.card.instance_id,
                    pick.pick_number,
                    pick.source.as_str(),
                    pick.balance_after
                )?;
                for failure in &receipt.hook_failures {
                    writeln!(out, "warning: {} failed: {}", failure.hook, failure.error)?;
                }
            }
            TurnOutcome::Skipped { receipt, reason } => {
                writeln!(out, "{} skipped turn {}: {reason}", receipt.skip.team, receipt.skip.turn_id)?;
                for failure in &receipt.hook_failures {
                    writeln!(out, "warning: {} failed: {}", failure.hook, failure.error)?;
                }
            }
        },
        Command::Queue { team, depth } => {
            let rows = engine.queues().materialized(team, *depth).await?;
            if rows.is_empty() {
                writeln!(out, "{team}: no cards available")?;
            }
            for row in rows {
                let tag = match row.source {
                    MaterializedSource::Manual { pinned: true, approvals } => {
                        format!("pinned, {approvals} votes")
                    }
                    MaterializedSource::Manual { pinned: false, approvals } => {
                        format!("queued, {approvals} votes")
                    }
                    MaterializedSource::Suggested { score } => format!("suggested, {score:.1}"),
                };
                writeln!(
                    out,
                    "{:>3}. {} ({}) cost {} [{tag}]",
                    row.position, row.card.name, row.card.instance_id, row.card.cost
                )?;
            }
        }
        Command::Reset => {
            league.db.clear_draft()?;
            writeln!(out, "draft progress cleared")?;
        }
    }

    Ok(out)
}
