// Configuration loading and parsing (league.toml).

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },
}

// ---------------------------------------------------------------------------
// league.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub league: LeagueConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeagueConfig {
    pub name: String,
    /// Reverse the draft order every other round.
    #[serde(default = "default_snake_order")]
    pub snake_order: bool,
    pub starting_balance: u32,
    /// Teams in draft order.
    pub teams: Vec<TeamConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamConfig {
    pub id: String,
    pub name: String,
    pub captain: String,
    #[serde(default)]
    pub members: Vec<String>,
}

impl TeamConfig {
    /// Number of distinct people on the team, captain included.
    pub fn member_count(&self) -> usize {
        let mut people: HashSet<&str> = self.members.iter().map(String::as_str).collect();
        people.insert(&self.captain);
        people.len()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PoolConfig {
    /// Card pool CSV imported on startup, relative to the working directory.
    #[serde(default)]
    pub csv: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Log directory. Defaults to the platform data directory.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            filter: default_log_filter(),
            dir: None,
        }
    }
}

fn default_snake_order() -> bool {
    true
}

fn default_db_path() -> String {
    "cubeleague.db".to_string()
}

fn default_log_filter() -> String {
    "cubeleague_app=info,cubeleague_core=info,warn".to_string()
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load `config/league.toml` relative to `base_dir`.
///
/// Relative database and pool paths are resolved against `base_dir`.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join("league.toml");
    let text = read_file(&path)?;
    let mut config: Config = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;

    validate(&config)?;

    if config.database.path != ":memory:" {
        config.database.path = resolve(base_dir, &config.database.path);
    }
    if let Some(csv) = config.pool.csv.take() {
        config.pool.csv = Some(resolve(base_dir, &csv));
    }

    Ok(config)
}

/// Convenience wrapper: loads config relative to the current working directory.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn resolve(base_dir: &Path, path: &str) -> String {
    let p = Path::new(path);
    if p.is_absolute() {
        path.to_string()
    } else {
        base_dir.join(p).to_string_lossy().into_owned()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let league = &config.league;

    if league.name.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "league.name".into(),
            message: "must not be empty".into(),
        });
    }

    if league.teams.is_empty() {
        return Err(ConfigError::ValidationError {
            field: "league.teams".into(),
            message: "at least one team is required".into(),
        });
    }

    let mut ids = HashSet::new();
    for (i, team) in league.teams.iter().enumerate() {
        if team.id.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                field: format!("league.teams[{i}].id"),
                message: "must not be empty".into(),
            });
        }
        if !ids.insert(team.id.as_str()) {
            return Err(ConfigError::ValidationError {
                field: format!("league.teams[{i}].id"),
                message: format!("duplicate team id `{}`", team.id),
            });
        }
        if team.captain.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                field: format!("league.teams[{i}].captain"),
                message: "must not be empty".into(),
            });
        }
    }

    if config.database.path.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "database.path".into(),
            message: "must not be empty".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const VALID_LEAGUE: &str = r#"
[league]
name = "Vintage Cube League"
starting_balance = 1000

[[league.teams]]
id = "owls"
name = "Night Owls"
captain = "alice"
members = ["bob", "carol"]

[[league.teams]]
id = "foxes"
name = "Red Foxes"
captain = "dave"

[database]
path = "league.db"

[pool]
csv = "data/pool.csv"
"#;

    /// Helper: write `league_toml` into a fresh temp base dir.
    fn write_config(name: &str, league_toml: &str) -> PathBuf {
        let tmp = std::env::temp_dir().join(name);
        let config_dir = tmp.join("config");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join("league.toml"), league_toml).unwrap();
        tmp
    }

    #[test]
    fn load_valid_config() {
        let tmp = write_config("cubeleague_config_valid", VALID_LEAGUE);
        let config = load_config_from(&tmp).unwrap();

        assert_eq!(config.league.name, "Vintage Cube League");
        assert!(config.league.snake_order);
        assert_eq!(config.league.starting_balance, 1000);
        assert_eq!(config.league.teams.len(), 2);
        assert_eq!(config.league.teams[0].member_count(), 3);
        assert_eq!(config.league.teams[1].member_count(), 1);
        assert!(config.database.path.ends_with("league.db"));
        assert!(Path::new(&config.database.path).is_absolute());
        assert!(config.pool.csv.as_deref().unwrap().ends_with("pool.csv"));
        assert_eq!(config.logging.filter, default_log_filter());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn captain_need_not_be_listed_in_members() {
        let tmp = write_config(
            "cubeleague_config_implicit_captain",
            r#"
[league]
name = "Solo"
starting_balance = 10

[[league.teams]]
id = "owls"
name = "Owls"
captain = "alice"
members = ["bob"]
"#,
        );

        let config = load_config_from(&tmp).unwrap();
        let team = &config.league.teams[0];
        assert!(!team.members.contains(&team.captain));
        assert_eq!(team.member_count(), 2);

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn captain_listed_as_member_counts_once() {
        let team = TeamConfig {
            id: "owls".into(),
            name: "Owls".into(),
            captain: "alice".into(),
            members: vec!["alice".into(), "bob".into()],
        };
        assert_eq!(team.member_count(), 2);
    }

    #[test]
    fn rejects_empty_team_list() {
        let tmp = write_config(
            "cubeleague_config_no_teams",
            r#"
[league]
name = "Empty"
starting_balance = 10
teams = []
"#,
        );

        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::ValidationError { field, .. } => assert_eq!(field, "league.teams"),
            other => panic!("expected ValidationError, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_duplicate_team_ids() {
        let tmp = write_config(
            "cubeleague_config_dup_ids",
            r#"
[league]
name = "Dupes"
starting_balance = 10

[[league.teams]]
id = "owls"
name = "Owls"
captain = "a"

[[league.teams]]
id = "owls"
name = "Owls Again"
captain = "b"
"#,
        );

        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::ValidationError { field, message } => {
                assert_eq!(field, "league.teams[1].id");
                assert!(message.contains("owls"));
            }
            other => panic!("expected ValidationError, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn memory_database_path_is_kept() {
        let tmp = write_config(
            "cubeleague_config_memory_db",
            r#"
[league]
name = "Ephemeral"
snake_order = false
starting_balance = 10

[[league.teams]]
id = "owls"
name = "Owls"
captain = "a"

[database]
path = ":memory:"
"#,
        );

        let config = load_config_from(&tmp).unwrap();
        assert_eq!(config.database.path, ":memory:");
        assert!(!config.league.snake_order);
        assert!(config.pool.csv.is_none());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn file_not_found_for_missing_league_toml() {
        let tmp = std::env::temp_dir().join("cubeleague_config_missing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();

        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::FileNotFound { path } => assert!(path.ends_with("league.toml")),
            other => panic!("expected FileNotFound, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn parse_error_for_invalid_toml() {
        let tmp = write_config("cubeleague_config_invalid", "this is not valid [[[ toml");

        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::ParseError { path, .. } => assert!(path.ends_with("league.toml")),
            other => panic!("expected ParseError, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }
}
