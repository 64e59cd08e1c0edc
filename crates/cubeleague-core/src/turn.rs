// Draft turn state: which team is on the clock for a given pick slot.

use serde::{Deserialize, Serialize};

use crate::card::TeamId;

/// Snapshot of the draft clock. Owned by the turn authority; the engine only
/// reads it and asks for an advance after a committed pick or skip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftTurnState {
    /// Monotonic, 0-based pick slot across the whole draft.
    pub turn_id: u64,
    /// 1-based round number.
    pub round: u32,
    pub on_the_clock: TeamId,
    pub on_deck: Option<TeamId>,
}

impl DraftTurnState {
    /// Derive the turn state for `turn_id` from a fixed draft order.
    ///
    /// With `snake` enabled, even-numbered rounds run the order in reverse.
    /// Returns `None` for an empty order.
    pub fn for_turn(turn_id: u64, order: &[TeamId], snake: bool) -> Option<Self> {
        let on_the_clock = team_for_turn(turn_id, order, snake)?;
        let on_deck = team_for_turn(turn_id + 1, order, snake);
        let n = order.len() as u64;
        Some(DraftTurnState {
            turn_id,
            round: (turn_id / n + 1) as u32,
            on_the_clock,
            on_deck,
        })
    }

    pub fn is_on_the_clock(&self, team: &str) -> bool {
        self.on_the_clock == team
    }
}

fn team_for_turn(turn_id: u64, order: &[TeamId], snake: bool) -> Option<TeamId> {
    if order.is_empty() {
        return None;
    }
    let n = order.len() as u64;
    let round_idx = turn_id / n;
    let slot = (turn_id % n) as usize;
    let idx = if snake && round_idx % 2 == 1 {
        order.len() - 1 - slot
    } else {
        slot
    };
    Some(order[idx].clone())
}
