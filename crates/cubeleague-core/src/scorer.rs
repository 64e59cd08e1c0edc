// Affinity scorer: deterministic algorithmic pick recommendation.
//
// Given the available pool, a team's draft history and its balance, rank
// every card by an affinity-adjusted rating, narrow to a candidate window,
// settle on the team's dominant color and choose between the best card of
// that color and the best colorless card. An affordability pass then makes
// sure the recommendation can actually be paid for.
//
// The function is pure: no clock, no randomness, no I/O. Repeated calls
// with the same inputs produce identical output.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::card::{Balance, CardInstance, Color, DraftedCard, InstanceId};
use crate::error::DraftError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Number of top-ranked cards considered for a pick.
pub const CANDIDATE_WINDOW: usize = 50;

/// Modifier added to a color for every drafted card that includes it.
pub const COLOR_MATCH_BONUS: f64 = 0.10;

/// Modifier removed from a color for every colored drafted card without it.
pub const COLOR_MISS_PENALTY: f64 = 0.05;

/// Lower bound for any color modifier.
pub const MODIFIER_FLOOR: f64 = 0.5;

/// Multiplier applied to cards whose type line contains "land".
pub const LAND_DISCOUNT: f64 = 0.8;

/// Per-drafted-card color bonus used by the cheaper display ranking.
pub const PREVIEW_COLOR_BONUS: f64 = 0.01;

/// One value per color, indexed by `Color::index()`.
pub type ColorValues = [f64; 5];

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// How the final recommendation was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionSource {
    /// Best card of the dominant color.
    DominantColor,
    /// Best colorless card, whose raw rating beat the colored finalist.
    Colorless,
    /// Replaced by the best affordable card inside the candidate window.
    AffordableInWindow,
    /// Replaced by the best affordable card anywhere in the pool.
    AffordableInPool,
    /// A card was selected but nothing in the pool is affordable.
    Unaffordable,
    /// Neither a dominant-color card nor a colorless card was available.
    NoCandidate,
}

/// Summary of a card that reached the final comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finalist {
    pub instance_id: InstanceId,
    pub name: String,
    pub rating: f64,
    pub effective_rating: f64,
    pub cost: Balance,
}

/// Audit trail for one recommendation. Everything here is an intermediate
/// of the computation that a caller could not cheaply re-derive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreExplanation {
    /// Instance ids in the candidate window, in rank order.
    pub candidate_ids: Vec<InstanceId>,
    /// True when no candidate rated positively and the window fell back to
    /// alphabetical order over the whole pool.
    pub alphabetical_fallback: bool,
    pub color_totals: BTreeMap<Color, f64>,
    pub modifiers: BTreeMap<Color, f64>,
    pub colored_finalist: Option<Finalist>,
    pub colorless_finalist: Option<Finalist>,
    pub source: SelectionSource,
    pub drafted_color_counts: BTreeMap<Color, u32>,
    pub dominant_color: Option<Color>,
    pub balance: Balance,
}

/// Scorer output: the recommended card (if any) plus its explanation.
/// `card == None` is a valid skip condition, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoDraftPick {
    pub card: Option<CardInstance>,
    pub explanation: ScoreExplanation,
}

// ---------------------------------------------------------------------------
// Modifier math
// ---------------------------------------------------------------------------

/// Color-affinity modifiers from a team's draft history.
///
/// Every colored pick adds `COLOR_MATCH_BONUS` to each of its colors and
/// removes `COLOR_MISS_PENALTY` from each other color. Colorless picks are
/// ignored. Results are clamped to `MODIFIER_FLOOR`.
pub fn color_modifiers(history: &[DraftedCard]) -> ColorValues {
    let mut modifiers = [1.0; 5];

    for drafted in history {
        if drafted.card.is_colorless() {
            continue;
        }
        for color in Color::ALL {
            if drafted.card.has_color(color) {
                modifiers[color.index()] += COLOR_MATCH_BONUS;
            } else {
                modifiers[color.index()] -= COLOR_MISS_PENALTY;
            }
        }
    }

    for value in &mut modifiers {
        *value = value.max(MODIFIER_FLOOR);
    }
    modifiers
}

/// Cheaper display-only modifiers: `1 + 0.01` per drafted card of a color,
/// with no penalty for other colors.
pub fn preview_modifiers(history: &[DraftedCard]) -> ColorValues {
    let counts = drafted_color_counts(history);
    let mut modifiers = [1.0; 5];
    for color in Color::ALL {
        modifiers[color.index()] += PREVIEW_COLOR_BONUS * counts[color.index()] as f64;
    }
    modifiers
}

/// Number of drafted cards that include each color.
pub fn drafted_color_counts(history: &[DraftedCard]) -> [u32; 5] {
    let mut counts = [0u32; 5];
    for drafted in history {
        for color in &drafted.card.colors {
            counts[color.index()] += 1;
        }
    }
    counts
}

/// Rating after the land discount and the best affinity multiplier among
/// the card's colors (1.0 for colorless cards).
pub fn effective_rating(card: &CardInstance, modifiers: &ColorValues) -> f64 {
    let mut rating = card.rating;
    if card.is_land() {
        rating *= LAND_DISCOUNT;
    }
    let affinity = card
        .colors
        .iter()
        .map(|c| modifiers[c.index()])
        .reduce(f64::max)
        .unwrap_or(1.0);
    rating * affinity
}

// ---------------------------------------------------------------------------
// Core computation
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
struct Scored<'a> {
    card: &'a CardInstance,
    effective: f64,
}

/// Recommend the next algorithmic pick for a team.
///
/// 1. Fail with `NoCardsAvailable` on an empty pool.
/// 2. Derive color modifiers from the history.
/// 3. Rank all cards by effective rating (stable on pool order); if nothing
///    in the top window rates positively, rank the whole pool by name.
/// 4. Take the top `CANDIDATE_WINDOW` as candidates and sum effective
///    ratings per color to find the dominant color.
/// 5. Compare the best dominant-color card with the best colorless card;
///    the colorless card wins only on a strictly higher raw rating.
/// 6. If the choice is unaffordable, fall back to the best affordable
///    candidate, then the best affordable card in the pool, then nothing.
pub fn compute_auto_draft_pick(
    pool: &[CardInstance],
    history: &[DraftedCard],
    balance: Balance,
) -> Result<AutoDraftPick, DraftError> {
    if pool.is_empty() {
        return Err(DraftError::NoCardsAvailable);
    }

    let modifiers = color_modifiers(history);

    let mut ranked: Vec<Scored<'_>> = pool
        .iter()
        .map(|card| Scored {
            card,
            effective: effective_rating(card, &modifiers),
        })
        .collect();
    ranked.sort_by(|a, b| b.effective.total_cmp(&a.effective));

    let alphabetical_fallback = !ranked
        .iter()
        .take(CANDIDATE_WINDOW)
        .any(|s| s.effective > 0.0);
    if alphabetical_fallback {
        ranked.sort_by(|a, b| {
            a.card
                .name
                .cmp(&b.card.name)
                .then_with(|| a.card.instance_id.cmp(&b.card.instance_id))
        });
    }

    let window = &ranked[..ranked.len().min(CANDIDATE_WINDOW)];

    let totals = color_totals(window);
    let dominant_color = dominant_color(&totals);

    let colored = dominant_color.and_then(|color| {
        best_by_effective(window.iter().filter(|s| s.card.has_color(color)))
    });
    let colorless = best_by_effective(window.iter().filter(|s| s.card.is_colorless()));

    let (mut selected, mut source) = match (colored, colorless) {
        (Some(c), Some(l)) if l.card.rating > c.card.rating => {
            (Some(l), SelectionSource::Colorless)
        }
        (Some(c), _) => (Some(c), SelectionSource::DominantColor),
        (None, Some(l)) => (Some(l), SelectionSource::Colorless),
        (None, None) => (None, SelectionSource::NoCandidate),
    };

    if let Some(choice) = selected {
        if choice.card.cost > balance {
            let affordable = |s: &&Scored<'_>| s.card.cost <= balance;
            if let Some(alt) = best_by_effective(window.iter().filter(affordable)) {
                selected = Some(alt);
                source = SelectionSource::AffordableInWindow;
            } else if let Some(alt) = best_by_effective(ranked.iter().filter(affordable)) {
                selected = Some(alt);
                source = SelectionSource::AffordableInPool;
            } else {
                selected = None;
                source = SelectionSource::Unaffordable;
            }
        }
    }

    let counts = drafted_color_counts(history);
    let explanation = ScoreExplanation {
        candidate_ids: window.iter().map(|s| s.card.instance_id.clone()).collect(),
        alphabetical_fallback,
        color_totals: to_color_map(&totals),
        modifiers: to_color_map(&modifiers),
        colored_finalist: colored.map(finalist),
        colorless_finalist: colorless.map(finalist),
        source,
        drafted_color_counts: Color::ALL
            .into_iter()
            .map(|c| (c, counts[c.index()]))
            .collect(),
        dominant_color,
        balance,
    };

    Ok(AutoDraftPick {
        card: selected.map(|s| s.card.clone()),
        explanation,
    })
}

/// Rank cards for the materialized queue view using the cheaper preview
/// modifiers. Highest first; ties keep pool order.
pub fn rank_for_preview<'a>(
    cards: &'a [CardInstance],
    history: &[DraftedCard],
) -> Vec<(&'a CardInstance, f64)> {
    let modifiers = preview_modifiers(history);
    let mut ranked: Vec<(&CardInstance, f64)> = cards
        .iter()
        .map(|card| (card, effective_rating(card, &modifiers)))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn color_totals(window: &[Scored<'_>]) -> ColorValues {
    let mut totals = [0.0; 5];
    for scored in window {
        for color in &scored.card.colors {
            totals[color.index()] += scored.effective;
        }
    }
    totals
}

/// Highest positive total; ties keep the earlier color in WUBRG order.
fn dominant_color(totals: &ColorValues) -> Option<Color> {
    let mut best: Option<Color> = None;
    for color in Color::ALL {
        let total = totals[color.index()];
        if total <= 0.0 {
            continue;
        }
        match best {
            Some(b) if totals[b.index()] >= total => {}
            _ => best = Some(color),
        }
    }
    best
}

/// Highest effective rating; ties keep the first card seen.
fn best_by_effective<'a, 'b>(
    iter: impl Iterator<Item = &'b Scored<'a>>,
) -> Option<Scored<'a>>
where
    'a: 'b,
{
    iter.fold(None, |best: Option<Scored<'a>>, s| match best {
        Some(b) if b.effective >= s.effective => Some(b),
        _ => Some(*s),
    })
}

fn finalist(s: Scored<'_>) -> Finalist {
    Finalist {
        instance_id: s.card.instance_id.clone(),
        name: s.card.name.clone(),
        rating: s.card.rating,
        effective_rating: s.effective,
        cost: s.card.cost,
    }
}

fn to_color_map(values: &ColorValues) -> BTreeMap<Color, f64> {
    Color::ALL
        .into_iter()
        .map(|c| (c, values[c.index()]))
        .collect()
}
