// Card pool CSV loading.
//
// Expected columns: instance_id, card_id, name, type_line, rarity, colors,
// mana_cost, mana_value, rating, cost. Extra columns are ignored.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use cubeleague_core::card::parse_colors;
use cubeleague_core::{Balance, CardInstance, Rarity};

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Deserialize)]
struct RawCardRow {
    instance_id: String,
    card_id: String,
    name: String,
    #[serde(default)]
    type_line: String,
    #[serde(default)]
    rarity: String,
    #[serde(default)]
    colors: String,
    #[serde(default)]
    mana_cost: String,
    #[serde(default)]
    mana_value: f64,
    rating: f64,
    cost: Balance,
}

/// Parse pool rows from any reader. Malformed rows are skipped with a
/// warning; duplicate instance ids keep the first row.
pub fn load_pool_from_reader<R: Read>(rdr: R) -> Result<Vec<CardInstance>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(rdr);
    let mut seen = HashSet::new();
    let mut cards = Vec::new();

    for result in reader.deserialize::<RawCardRow>() {
        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                warn!("skipping malformed pool row: {}", e);
                continue;
            }
        };
        if raw.instance_id.is_empty() || raw.card_id.is_empty() {
            warn!("skipping pool row '{}': missing id", raw.name);
            continue;
        }
        if !raw.rating.is_finite() || !raw.mana_value.is_finite() {
            warn!("skipping '{}': non-finite rating or mana value", raw.name);
            continue;
        }
        if !seen.insert(raw.instance_id.clone()) {
            warn!("skipping duplicate instance id '{}'", raw.instance_id);
            continue;
        }

        cards.push(CardInstance {
            rarity: Rarity::from_str_rarity(&raw.rarity).unwrap_or(Rarity::Common),
            colors: parse_colors(&raw.colors),
            instance_id: raw.instance_id,
            card_id: raw.card_id,
            name: raw.name,
            type_line: raw.type_line,
            mana_cost: raw.mana_cost,
            mana_value: raw.mana_value,
            rating: raw.rating,
            cost: raw.cost,
        });
    }

    Ok(cards)
}

/// Load the pool CSV at `path`. An empty pool is an error.
pub fn load_pool(path: &Path) -> Result<Vec<CardInstance>, PoolError> {
    let display = path.display().to_string();
    let file = std::fs::File::open(path).map_err(|e| PoolError::Io {
        path: display.clone(),
        source: e,
    })?;
    let cards = load_pool_from_reader(file).map_err(|e| PoolError::Csv {
        path: display.clone(),
        source: e,
    })?;
    if cards.is_empty() {
        return Err(PoolError::Validation(format!("no cards found in {display}")));
    }
    Ok(cards)
}
