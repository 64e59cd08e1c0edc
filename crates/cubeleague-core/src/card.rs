// Card instances in the shared pool and the colors/rarities that describe them.

use serde::{Deserialize, Serialize};
use std::fmt;

pub type TeamId = String;
pub type UserId = String;
/// Identity of one physical copy in the pool.
pub type InstanceId = String;
/// Logical card identity shared by reprints and duplicates.
pub type CardId = String;
/// Spendable currency. Costs and balances never go negative.
pub type Balance = u32;

// ---------------------------------------------------------------------------
// Colors
// ---------------------------------------------------------------------------

/// The five card colors. Iteration order is always W, U, B, R, G.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Color {
    #[serde(rename = "W")]
    White,
    #[serde(rename = "U")]
    Blue,
    #[serde(rename = "B")]
    Black,
    #[serde(rename = "R")]
    Red,
    #[serde(rename = "G")]
    Green,
}

impl Color {
    pub const ALL: [Color; 5] = [
        Color::White,
        Color::Blue,
        Color::Black,
        Color::Red,
        Color::Green,
    ];

    /// Parse a single color symbol or name ("R", "red", "Red").
    pub fn from_str_color(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "W" | "WHITE" => Some(Color::White),
            "U" | "BLUE" => Some(Color::Blue),
            "B" | "BLACK" => Some(Color::Black),
            "R" | "RED" => Some(Color::Red),
            "G" | "GREEN" => Some(Color::Green),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Color::White => "W",
            Color::Blue => "U",
            Color::Black => "B",
            Color::Red => "R",
            Color::Green => "G",
        }
    }

    /// Position in WUBRG order, used to index per-color arrays.
    pub fn index(&self) -> usize {
        match self {
            Color::White => 0,
            Color::Blue => 1,
            Color::Black => 2,
            Color::Red => 3,
            Color::Green => 4,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Parse a color identity string into a deduplicated, WUBRG-ordered list.
///
/// Accepts packed symbols (`"WU"`), mana-cost style (`"{W}{U}"`), separated
/// lists (`"W,U"`, `"white blue"`). Unknown tokens such as `{2}` or `C` are
/// ignored, so colorless cards parse to an empty list.
pub fn parse_colors(s: &str) -> Vec<Color> {
    let mut found = [false; 5];

    for token in s.split(|c: char| c == ',' || c == ' ' || c == '/' || c == ';') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if let Some(color) = Color::from_str_color(token) {
            found[color.index()] = true;
            continue;
        }
        let upper = token.to_uppercase();
        if !upper.chars().all(|ch| "WUBRGCX{}0123456789".contains(ch)) {
            continue;
        }
        for ch in upper.chars() {
            if let Some(color) = Color::from_str_color(&ch.to_string()) {
                found[color.index()] = true;
            }
        }
    }

    Color::ALL
        .into_iter()
        .filter(|c| found[c.index()])
        .collect()
}

/// Pack colors back into a WUBRG symbol string (`"UR"`); empty for colorless.
pub fn format_colors(colors: &[Color]) -> String {
    Color::ALL
        .iter()
        .filter(|c| colors.contains(c))
        .map(|c| c.symbol())
        .collect()
}

// ---------------------------------------------------------------------------
// Rarity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Mythic,
    Special,
}

impl Rarity {
    pub fn from_str_rarity(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "c" | "common" => Some(Rarity::Common),
            "u" | "uncommon" => Some(Rarity::Uncommon),
            "r" | "rare" => Some(Rarity::Rare),
            "m" | "mythic" | "mythic rare" => Some(Rarity::Mythic),
            "s" | "special" | "bonus" => Some(Rarity::Special),
            _ => None,
        }
    }

    pub fn display_str(&self) -> &'static str {
        match self {
            Rarity::Common => "common",
            Rarity::Uncommon => "uncommon",
            Rarity::Rare => "rare",
            Rarity::Mythic => "mythic",
            Rarity::Special => "special",
        }
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_str())
    }
}

// ---------------------------------------------------------------------------
// Card instances
// ---------------------------------------------------------------------------

/// One physical, uniquely draftable copy of a card in the shared pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardInstance {
    pub instance_id: InstanceId,
    pub card_id: CardId,
    pub name: String,
    /// Full type line, e.g. "Legendary Creature — Elf Druid" or "Basic Land — Forest".
    pub type_line: String,
    pub rarity: Rarity,
    pub colors: Vec<Color>,
    pub mana_cost: String,
    pub mana_value: f64,
    /// Externally supplied desirability rating (ELO-style).
    pub rating: f64,
    /// Acquisition cost debited from the drafting team's balance.
    pub cost: Balance,
}

impl CardInstance {
    pub fn is_land(&self) -> bool {
        self.type_line.to_lowercase().contains("land")
    }

    pub fn is_colorless(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn has_color(&self, color: Color) -> bool {
        self.colors.contains(&color)
    }
}

/// One row of a team's draft history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftedCard {
    /// Team-local pick number (1-indexed).
    pub pick_number: u32,
    pub card: CardInstance,
}
