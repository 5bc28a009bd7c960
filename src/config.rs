//! Application-level configuration loading: player role, scope restriction,
//! countdown timing and the static member directory.

use std::{
    collections::{BTreeSet, HashMap},
    env, fs,
    io::ErrorKind,
    path::PathBuf,
    time::Duration,
};

use serde::Deserialize;
use serde_with::{DurationSeconds, serde_as};
use tracing::{info, warn};

use crate::state::{
    ScopeId,
    countdown::{CountdownTiming, DEFAULT_COUNTDOWN_DURATION, DEFAULT_UPDATE_INTERVAL},
    players::PlayerId,
};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "MAFIADON_BACK_CONFIG_PATH";
/// Environment variable that overrides the configured player role name.
const PLAYER_ROLE_ENV: &str = "PLAYER_ROLE_NAME";
/// Environment variable holding a comma-separated scope allow-list.
const ALLOWED_SCOPES_ENV: &str = "ALLOWED_SCOPES";

const DEFAULT_PLAYER_ROLE: &str = "i play mafia";
const DEFAULT_MIN_PLAYERS: usize = 3;

/// One member of a scope directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MemberEntry {
    /// Platform identifier.
    pub id: PlayerId,
    /// Role names the member holds.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Bots never take part in a game.
    #[serde(default)]
    pub bot: bool,
}

/// Roles, members and moderators known for one scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ScopeDirectory {
    /// Moderators of this scope only.
    #[serde(default)]
    pub moderators: BTreeSet<PlayerId>,
    /// Roles declared in the scope, held or not.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Members and their roles.
    #[serde(default)]
    pub members: Vec<MemberEntry>,
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    player_role_name: String,
    allowed_scopes: Option<BTreeSet<ScopeId>>,
    min_players: usize,
    countdown: CountdownTiming,
    moderators: BTreeSet<PlayerId>,
    scopes: HashMap<ScopeId, ScopeDirectory>,
}

impl AppConfig {
    /// Load the configuration from disk and the environment, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let config = match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        scopes = config.scopes.len(),
                        "loaded configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        config.with_overrides(
            env::var(PLAYER_ROLE_ENV).ok(),
            env::var(ALLOWED_SCOPES_ENV).ok(),
        )
    }

    /// Parse a configuration document.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }

    /// Apply the `PLAYER_ROLE_NAME` / `ALLOWED_SCOPES` values on top of the file.
    pub fn with_overrides(
        mut self,
        player_role: Option<String>,
        allowed_scopes: Option<String>,
    ) -> Self {
        if let Some(role) = player_role
            .map(|role| role.trim().to_string())
            .filter(|role| !role.is_empty())
        {
            self.player_role_name = role;
        }
        if let Some(raw) = allowed_scopes {
            let scopes = parse_scope_list(&raw);
            self.allowed_scopes = (!scopes.is_empty()).then_some(scopes);
        }
        self
    }

    /// Role name identifying players at startup.
    pub fn player_role_name(&self) -> &str {
        &self.player_role_name
    }

    /// Scopes commands are restricted to, or `None` when every scope is allowed.
    pub fn allowed_scopes(&self) -> Option<&BTreeSet<ScopeId>> {
        self.allowed_scopes.as_ref()
    }

    /// True when commands from `scope` are accepted.
    pub fn is_scope_allowed(&self, scope: &ScopeId) -> bool {
        self.allowed_scopes
            .as_ref()
            .is_none_or(|allowed| allowed.contains(scope))
    }

    /// Role holders needed to start a game.
    pub fn min_players(&self) -> usize {
        self.min_players
    }

    /// Countdown length and broadcast spacing.
    pub fn countdown(&self) -> CountdownTiming {
        self.countdown
    }

    /// Moderators of every scope.
    pub fn moderators(&self) -> &BTreeSet<PlayerId> {
        &self.moderators
    }

    /// Per-scope directories.
    pub fn scopes(&self) -> &HashMap<ScopeId, ScopeDirectory> {
        &self.scopes
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Default, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    player_role_name: Option<String>,
    #[serde(default)]
    allowed_scopes: Option<Vec<ScopeId>>,
    #[serde(default)]
    min_players: Option<usize>,
    #[serde(default)]
    countdown: RawCountdown,
    #[serde(default)]
    moderators: BTreeSet<PlayerId>,
    #[serde(default)]
    scopes: HashMap<ScopeId, ScopeDirectory>,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct RawCountdown {
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_duration")]
    duration_secs: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_update_interval")]
    update_interval_secs: Duration,
}

impl Default for RawCountdown {
    fn default() -> Self {
        Self {
            duration_secs: DEFAULT_COUNTDOWN_DURATION,
            update_interval_secs: DEFAULT_UPDATE_INTERVAL,
        }
    }
}

fn default_duration() -> Duration {
    DEFAULT_COUNTDOWN_DURATION
}

fn default_update_interval() -> Duration {
    DEFAULT_UPDATE_INTERVAL
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let player_role_name = value
            .player_role_name
            .map(|role| role.trim().to_string())
            .filter(|role| !role.is_empty())
            .unwrap_or_else(|| DEFAULT_PLAYER_ROLE.to_string());
        let allowed_scopes = value
            .allowed_scopes
            .map(|scopes| scopes.into_iter().collect::<BTreeSet<_>>())
            .filter(|scopes| !scopes.is_empty());

        let requested = CountdownTiming {
            duration: value.countdown.duration_secs,
            update_interval: value.countdown.update_interval_secs,
        };
        let countdown = match requested.validate() {
            Ok(()) => requested,
            Err(err) => {
                warn!(
                    error = %err,
                    duration_secs = requested.duration.as_secs(),
                    update_interval_secs = requested.update_interval.as_secs(),
                    "invalid countdown timing; falling back to defaults"
                );
                CountdownTiming::default()
            }
        };

        Self {
            player_role_name,
            allowed_scopes,
            min_players: value.min_players.unwrap_or(DEFAULT_MIN_PLAYERS),
            countdown,
            moderators: value.moderators,
            scopes: value.scopes,
        }
    }
}

fn parse_scope_list(raw: &str) -> BTreeSet<ScopeId> {
    raw.split(',')
        .map(str::trim)
        .filter(|scope| !scope.is_empty())
        .map(ScopeId::from)
        .collect()
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_day_cycle() {
        let config = AppConfig::default();
        assert_eq!(config.player_role_name(), "i play mafia");
        assert_eq!(config.min_players(), 3);
        assert_eq!(config.countdown().duration, Duration::from_secs(86_400));
        assert_eq!(config.countdown().update_interval, Duration::from_secs(14_400));
        assert!(config.allowed_scopes().is_none());
        assert!(config.is_scope_allowed(&ScopeId::from("anywhere")));
    }

    #[test]
    fn parses_every_section() {
        let config = AppConfig::from_json(
            r#"{
                "player_role_name": "  Town  ",
                "allowed_scopes": ["guild/day"],
                "min_players": 5,
                "countdown": { "duration_secs": 600, "update_interval_secs": 120 },
                "moderators": [7],
                "scopes": {
                    "guild/day": { "members": [{ "id": 1, "roles": ["Town"] }] }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.player_role_name(), "Town");
        assert_eq!(config.min_players(), 5);
        assert_eq!(config.countdown().duration, Duration::from_secs(600));
        assert_eq!(config.countdown().update_interval, Duration::from_secs(120));
        assert!(config.moderators().contains(&PlayerId(7)));
        assert!(config.is_scope_allowed(&ScopeId::from("guild/day")));
        assert!(!config.is_scope_allowed(&ScopeId::from("guild/night")));
        assert_eq!(config.scopes()[&ScopeId::from("guild/day")].members.len(), 1);
    }

    #[test]
    fn partial_countdown_keeps_other_default() {
        let config = AppConfig::from_json(r#"{ "countdown": { "duration_secs": 60 } }"#).unwrap();
        assert_eq!(config.countdown().duration, Duration::from_secs(60));
        assert_eq!(config.countdown().update_interval, DEFAULT_UPDATE_INTERVAL);
    }

    #[test]
    fn out_of_range_countdown_falls_back_to_defaults() {
        for countdown in [
            r#"{ "duration_secs": 18446744073709551615, "update_interval_secs": 0 }"#,
            r#"{ "duration_secs": 18446744073709551615 }"#,
            r#"{ "update_interval_secs": 1 }"#,
            r#"{ "duration_secs": 0 }"#,
        ] {
            let config =
                AppConfig::from_json(&format!(r#"{{ "countdown": {countdown} }}"#)).unwrap();
            assert_eq!(config.countdown(), CountdownTiming::default(), "{countdown}");
        }

        let disabled = AppConfig::from_json(
            r#"{ "countdown": { "duration_secs": 3600, "update_interval_secs": 0 } }"#,
        )
        .unwrap();
        assert_eq!(disabled.countdown().duration, Duration::from_secs(3600));
        assert!(disabled.countdown().update_interval.is_zero());
    }

    #[test]
    fn environment_values_override_the_file() {
        let config = AppConfig::default().with_overrides(
            Some("Village".into()),
            Some(" guild/a, ,guild/b ".into()),
        );
        assert_eq!(config.player_role_name(), "Village");
        assert_eq!(
            config.allowed_scopes().unwrap(),
            &BTreeSet::from([ScopeId::from("guild/a"), ScopeId::from("guild/b")])
        );

        let unchanged = config.with_overrides(Some("   ".into()), None);
        assert_eq!(unchanged.player_role_name(), "Village");
    }

    #[test]
    fn rejects_malformed_documents() {
        assert!(AppConfig::from_json("{ not json").is_err());
    }
}
