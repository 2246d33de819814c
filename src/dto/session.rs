use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dto::validation::{validate_color, validate_roster},
    state::game::{
        ClockState, GameClock, GameSettings, GameState, Player, PlayerStats, SessionCode, TeamId,
        TeamState,
    },
};

/// Everything needed to open a new scoreboard.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[validate(length(min = 1, max = 64))]
    pub game_name: String,
    /// Minutes per period.
    #[validate(range(min = 1, max = 60))]
    pub period_duration: u32,
    /// Seconds; 0 disables the shot clock.
    #[validate(range(max = 60))]
    pub shot_clock_duration: u32,
    #[validate(range(max = 10))]
    pub timeouts_per_team: u32,
    #[validate(nested)]
    pub team_a: TeamConfig,
    #[validate(nested)]
    pub team_b: TeamConfig,
}

/// One side of a new session.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TeamConfig {
    pub name: String,
    /// CSS hex color (`#rrggbb`).
    pub color: String,
    #[serde(default)]
    pub roster: Vec<PlayerInput>,
}

impl Validate for TeamConfig {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.name.trim().is_empty() {
            let mut err = validator::ValidationError::new("team_name");
            err.message = Some("Team name must not be empty".into());
            errors.add("name", err);
        }

        if let Err(e) = validate_color(&self.color) {
            errors.add("color", e);
        }

        if let Err(e) = validate_roster(&self.roster) {
            errors.add("roster", e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Roster entry supplied at creation.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PlayerInput {
    pub number: u8,
    pub name: String,
}

impl TeamConfig {
    fn into_team_state(self, timeouts: u32) -> TeamState {
        let stats: IndexMap<u8, PlayerStats> = self
            .roster
            .iter()
            .map(|player| (player.number, PlayerStats::default()))
            .collect();
        let roster = self
            .roster
            .into_iter()
            .map(|player| Player {
                number: player.number,
                name: player.name.trim().to_owned(),
            })
            .collect();

        TeamState {
            name: self.name.trim().to_owned(),
            color: self.color.to_ascii_lowercase(),
            score: 0,
            timeouts,
            fouls: 0,
            roster,
            stats,
        }
    }
}

impl SessionConfig {
    /// Build the first document of a session: period 1, full clocks, both stopped,
    /// possession to team A and zeroed stats for every rostered player.
    pub fn into_initial_state(self, now_ms: i64) -> GameState {
        let settings = GameSettings {
            game_name: self.game_name.trim().to_owned(),
            period_duration: self.period_duration,
            shot_clock_duration: self.shot_clock_duration,
            timeouts_per_team: self.timeouts_per_team,
        };

        GameState {
            team_a: self.team_a.into_team_state(settings.timeouts_per_team),
            team_b: self.team_b.into_team_state(settings.timeouts_per_team),
            game_state: ClockState {
                period: 1,
                game_time: GameClock::new(settings.period_duration, 0),
                shot_clock: settings.shot_clock_duration,
                possession: TeamId::TeamA,
                game_running: false,
                shot_clock_running: false,
                clock_anchor: None,
            },
            settings,
            last_update: now_ms,
        }
    }
}

/// Returned once a session has been created. The token authorizes later mutations.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    #[schema(value_type = String, example = "482913")]
    pub code: SessionCode,
    /// Send back in the `X-Host-Token` header.
    pub host_token: Uuid,
    pub state: GameState,
}

/// A session's current document.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshotResponse {
    #[schema(value_type = String, example = "482913")]
    pub code: SessionCode,
    pub state: GameState,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_config() -> SessionConfig {
        SessionConfig {
            game_name: "Finals".into(),
            period_duration: 12,
            shot_clock_duration: 24,
            timeouts_per_team: 5,
            team_a: TeamConfig {
                name: "Home".into(),
                color: "#1D4ED8".into(),
                roster: vec![PlayerInput {
                    number: 7,
                    name: "Home #7".into(),
                }],
            },
            team_b: TeamConfig {
                name: "Away".into(),
                color: "#dc2626".into(),
                roster: vec![PlayerInput {
                    number: 23,
                    name: "Away #23".into(),
                }],
            },
        }
    }

    #[test]
    fn sample_config_is_valid() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn out_of_range_settings_are_rejected() {
        let mut config = sample_config();
        config.period_duration = 0;
        config.shot_clock_duration = 61;
        config.timeouts_per_team = 11;
        config.game_name = String::new();

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.field_errors().len(), 4);
    }

    #[test]
    fn nested_team_errors_are_reported() {
        let mut config = sample_config();
        config.team_b.color = "red".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn initial_state_matches_the_sample_document() {
        let state = sample_config().into_initial_state(0);
        assert_eq!(state, crate::state::game::tests::sample_state());
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn request_body_uses_camel_case() {
        let config: SessionConfig = serde_json::from_value(serde_json::json!({
            "gameName": "Pickup",
            "periodDuration": 10,
            "shotClockDuration": 0,
            "timeoutsPerTeam": 2,
            "teamA": { "name": "Shirts", "color": "#ffffff" },
            "teamB": { "name": "Skins", "color": "#000000" }
        }))
        .unwrap();

        let state = config.into_initial_state(5);
        assert!(!state.shot_clock_enabled());
        assert_eq!(state.game_state.shot_clock, 0);
        assert_eq!(state.team_b.timeouts, 2);
        assert_eq!(state.last_update, 5);
    }
}
