use std::{fmt, str::FromStr};

use indexmap::IndexMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, DisplayFromStr, SerializeDisplay, serde_as};
use thiserror::Error;
use utoipa::ToSchema;

/// Maximum number of players a team may register.
pub const MAX_ROSTER_SIZE: usize = 15;
/// Highest jersey number accepted on a roster.
pub const MAX_JERSEY_NUMBER: u8 = 99;
/// Upper bound applied to every shot clock value.
pub const MAX_SHOT_CLOCK: u32 = 60;
/// Seconds in a game-clock minute.
pub const SECONDS_PER_MINUTE: u32 = 60;

/// Six digit numeric key identifying one scoreboard document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, SerializeDisplay, DeserializeFromStr)]
pub struct SessionCode(u32);

/// Returned when a value cannot be used as a [`SessionCode`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid session code `{value}`: expected exactly 6 digits")]
pub struct InvalidSessionCode {
    /// The rejected input.
    pub value: String,
}

impl SessionCode {
    /// Smallest valid code.
    pub const MIN: u32 = 100_000;
    /// Largest valid code.
    pub const MAX: u32 = 999_999;

    /// Wrap a raw number, rejecting anything outside the 6-digit range.
    pub fn new(value: u32) -> Result<Self, InvalidSessionCode> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(InvalidSessionCode {
                value: value.to_string(),
            })
        }
    }

    /// Draw a uniformly random code.
    pub fn random() -> Self {
        Self(rand::rng().random_range(Self::MIN..=Self::MAX))
    }

    /// Raw numeric value.
    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06}", self.0)
    }
}

impl FromStr for SessionCode {
    type Err = InvalidSessionCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = || InvalidSessionCode {
            value: s.to_string(),
        };
        if trimmed.len() != 6 || !trimmed.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let value = trimmed.parse::<u32>().map_err(|_| invalid())?;
        Self::new(value).map_err(|_| invalid())
    }
}

/// Whether a client is allowed to change the shared document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The single authoritative writer of a session.
    Host,
    /// Read-only subscriber.
    Viewer,
}

impl Role {
    /// True for [`Role::Host`].
    pub fn is_host(self) -> bool {
        matches!(self, Role::Host)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Host => f.write_str("host"),
            Role::Viewer => f.write_str("viewer"),
        }
    }
}

/// One of the two sides of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum TeamId {
    /// Home side, holds the opening possession.
    #[serde(rename = "teamA")]
    TeamA,
    /// Away side.
    #[serde(rename = "teamB")]
    TeamB,
}

impl TeamId {
    /// The opposing side.
    pub fn other(self) -> Self {
        match self {
            TeamId::TeamA => TeamId::TeamB,
            TeamId::TeamB => TeamId::TeamA,
        }
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeamId::TeamA => f.write_str("teamA"),
            TeamId::TeamB => f.write_str("teamB"),
        }
    }
}

/// Fixed parameters chosen when the session was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameSettings {
    /// Display name of the game.
    pub game_name: String,
    /// Length of one period, in minutes.
    pub period_duration: u32,
    /// Shot clock length in seconds; 0 disables the shot clock.
    pub shot_clock_duration: u32,
    /// Timeouts granted to each team.
    pub timeouts_per_team: u32,
}

/// A rostered player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Player {
    /// Jersey number, unique within the team.
    pub number: u8,
    /// Display name.
    pub name: String,
}

/// Per-player counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerStats {
    pub free_throws: u32,
    pub field_goals: u32,
    pub three_pointers: u32,
    pub offensive_rebounds: u32,
    pub defensive_rebounds: u32,
    pub assists: u32,
    pub steals: u32,
    pub blocks: u32,
    pub turnovers: u32,
    pub fouls: u32,
    pub minutes: u32,
    pub points: u32,
}

/// Everything tracked for one side.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TeamState {
    pub name: String,
    /// CSS hex color (`#rrggbb`).
    pub color: String,
    pub score: u32,
    /// Timeouts remaining.
    pub timeouts: u32,
    pub fouls: u32,
    #[serde(default)]
    pub roster: Vec<Player>,
    /// Counters keyed by jersey number. Keys are written as strings so every backend accepts them.
    #[serde_as(as = "IndexMap<DisplayFromStr, _>")]
    #[serde(default)]
    #[schema(value_type = Object)]
    pub stats: IndexMap<u8, PlayerStats>,
}

impl TeamState {
    /// Look up a rostered player by jersey number.
    pub fn player(&self, number: u8) -> Option<&Player> {
        self.roster.iter().find(|player| player.number == number)
    }
}

/// Minutes and seconds left in the current period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub struct GameClock {
    pub minutes: u32,
    /// Always within `0..=59`.
    pub seconds: u32,
}

impl GameClock {
    /// Build a clock, folding surplus seconds into `seconds <= 59`.
    pub fn new(minutes: u32, seconds: u32) -> Self {
        Self {
            minutes,
            seconds: seconds.min(SECONDS_PER_MINUTE - 1),
        }
    }

    /// Split a number of seconds into minutes and seconds.
    pub fn from_total_seconds(total: u32) -> Self {
        Self {
            minutes: total / SECONDS_PER_MINUTE,
            seconds: total % SECONDS_PER_MINUTE,
        }
    }

    pub fn total_seconds(self) -> u32 {
        self.minutes
            .saturating_mul(SECONDS_PER_MINUTE)
            .saturating_add(self.seconds)
    }

    pub fn is_zero(self) -> bool {
        self.minutes == 0 && self.seconds == 0
    }

    /// Remove one second, borrowing a minute when needed. Stays at 00:00 once reached.
    pub fn decrement(&mut self) {
        if self.seconds > 0 {
            self.seconds -= 1;
        } else if self.minutes > 0 {
            self.minutes -= 1;
            self.seconds = SECONDS_PER_MINUTE - 1;
        }
    }
}

impl fmt::Display for GameClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.minutes, self.seconds)
    }
}

/// Reference point used by the deadline clock mode to recompute remaining time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClockAnchor {
    /// Wall clock time (Unix milliseconds) at which the values below were exact.
    pub at_ms: i64,
    /// Game clock at `at_ms`, in seconds.
    pub game_seconds: u32,
    /// Shot clock at `at_ms`.
    pub shot_clock: u32,
}

/// Time-dependent part of the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClockState {
    /// Current period, starting at 1.
    pub period: u32,
    pub game_time: GameClock,
    /// Shot clock seconds remaining.
    pub shot_clock: u32,
    pub possession: TeamId,
    pub game_running: bool,
    pub shot_clock_running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock_anchor: Option<ClockAnchor>,
}

/// The replicated scoreboard document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub settings: GameSettings,
    pub team_a: TeamState,
    pub team_b: TeamState,
    pub game_state: ClockState,
    /// Unix milliseconds of the last write. Advisory only.
    pub last_update: i64,
}

/// A document that breaks one of the model invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("{team} roster has {size} players (max 15)")]
    RosterTooLarge { team: TeamId, size: usize },
    #[error("{team} roster repeats jersey number {number}")]
    DuplicateJersey { team: TeamId, number: u8 },
    #[error("{team} roster uses out of range jersey number {number}")]
    JerseyOutOfRange { team: TeamId, number: u8 },
    #[error("shot clock is running while disabled")]
    ShotClockRunningWhileDisabled,
    #[error("game clock seconds out of range ({0})")]
    SecondsOutOfRange(u32),
    #[error("{team} has {timeouts} timeouts remaining (max {max})")]
    TimeoutsOutOfRange { team: TeamId, timeouts: u32, max: u32 },
    #[error("period must start at 1")]
    PeriodZero,
}

impl GameState {
    pub fn team(&self, team: TeamId) -> &TeamState {
        match team {
            TeamId::TeamA => &self.team_a,
            TeamId::TeamB => &self.team_b,
        }
    }

    pub fn team_mut(&mut self, team: TeamId) -> &mut TeamState {
        match team {
            TeamId::TeamA => &mut self.team_a,
            TeamId::TeamB => &mut self.team_b,
        }
    }

    /// Whether the shot clock is configured at all.
    pub fn shot_clock_enabled(&self) -> bool {
        self.settings.shot_clock_duration > 0
    }

    /// True when either run-flag asks for the local clock to advance.
    pub fn is_clock_running(&self) -> bool {
        self.game_state.game_running || self.game_state.shot_clock_running
    }

    /// Game clock value at the start of a period.
    pub fn period_start_clock(&self) -> GameClock {
        GameClock::new(self.settings.period_duration, 0)
    }

    /// Shot clock value after a full reset, clamped to the allowed range.
    pub fn shot_clock_reset_value(&self) -> u32 {
        self.settings.shot_clock_duration.min(MAX_SHOT_CLOCK)
    }

    /// Advance `last_update` without ever moving it backwards.
    pub fn touch(&mut self, now_ms: i64) {
        self.last_update = self.last_update.max(now_ms);
    }

    /// Check the structural invariants of the document.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        for team_id in [TeamId::TeamA, TeamId::TeamB] {
            let team = self.team(team_id);
            if team.roster.len() > MAX_ROSTER_SIZE {
                return Err(InvariantViolation::RosterTooLarge {
                    team: team_id,
                    size: team.roster.len(),
                });
            }
            let mut seen = [false; MAX_JERSEY_NUMBER as usize + 1];
            for player in &team.roster {
                let Some(slot) = seen.get_mut(player.number as usize) else {
                    return Err(InvariantViolation::JerseyOutOfRange {
                        team: team_id,
                        number: player.number,
                    });
                };
                if *slot {
                    return Err(InvariantViolation::DuplicateJersey {
                        team: team_id,
                        number: player.number,
                    });
                }
                *slot = true;
            }
            if team.timeouts > self.settings.timeouts_per_team {
                return Err(InvariantViolation::TimeoutsOutOfRange {
                    team: team_id,
                    timeouts: team.timeouts,
                    max: self.settings.timeouts_per_team,
                });
            }
        }

        let clock = &self.game_state;
        if clock.shot_clock_running && !self.shot_clock_enabled() {
            return Err(InvariantViolation::ShotClockRunningWhileDisabled);
        }
        if clock.game_time.seconds >= SECONDS_PER_MINUTE {
            return Err(InvariantViolation::SecondsOutOfRange(clock.game_time.seconds));
        }
        if clock.period == 0 {
            return Err(InvariantViolation::PeriodZero);
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Twelve minute periods, 24 second shot clock, one rostered player per side.
    pub(crate) fn sample_state() -> GameState {
        let team = |name: &str, color: &str, number: u8| TeamState {
            name: name.into(),
            color: color.into(),
            score: 0,
            timeouts: 5,
            fouls: 0,
            roster: vec![Player {
                number,
                name: format!("{name} #{number}"),
            }],
            stats: IndexMap::from([(number, PlayerStats::default())]),
        };

        GameState {
            settings: GameSettings {
                game_name: "Finals".into(),
                period_duration: 12,
                shot_clock_duration: 24,
                timeouts_per_team: 5,
            },
            team_a: team("Home", "#1d4ed8", 7),
            team_b: team("Away", "#dc2626", 23),
            game_state: ClockState {
                period: 1,
                game_time: GameClock::new(12, 0),
                shot_clock: 24,
                possession: TeamId::TeamA,
                game_running: false,
                shot_clock_running: false,
                clock_anchor: None,
            },
            last_update: 0,
        }
    }

    #[test]
    fn session_code_formats_as_six_digits() {
        let code = SessionCode::new(123_456).unwrap();
        assert_eq!(code.to_string(), "123456");
        assert_eq!("123456".parse::<SessionCode>().unwrap(), code);
    }

    #[test]
    fn session_code_rejects_bad_input() {
        assert!("12345".parse::<SessionCode>().is_err());
        assert!("1234567".parse::<SessionCode>().is_err());
        assert!("012345".parse::<SessionCode>().is_err());
        assert!("12a456".parse::<SessionCode>().is_err());
        assert!(SessionCode::new(99_999).is_err());
    }

    #[test]
    fn random_codes_stay_in_range() {
        for _ in 0..1_000 {
            let code = SessionCode::random();
            assert!((SessionCode::MIN..=SessionCode::MAX).contains(&code.value()));
        }
    }

    #[test]
    fn game_clock_borrows_a_minute() {
        let mut clock = GameClock::new(1, 0);
        clock.decrement();
        assert_eq!(clock, GameClock::new(0, 59));
    }

    #[test]
    fn game_clock_never_underflows() {
        let mut clock = GameClock::new(0, 1);
        clock.decrement();
        clock.decrement();
        assert!(clock.is_zero());
    }

    #[test]
    fn touch_is_monotonic() {
        let mut state = sample_state();
        state.touch(1_000);
        state.touch(500);
        assert_eq!(state.last_update, 1_000);
    }

    #[test]
    fn document_uses_camel_case_wire_shape() {
        let value = serde_json::to_value(sample_state()).unwrap();
        assert_eq!(value["gameState"]["gameTime"]["minutes"], 12);
        assert_eq!(value["gameState"]["possession"], "teamA");
        assert_eq!(value["settings"]["shotClockDuration"], 24);
        assert!(value["teamA"]["stats"]["7"].is_object());
        assert!(value["gameState"].get("clockAnchor").is_none());
    }

    #[test]
    fn document_survives_json_round_trip() {
        let state = sample_state();
        let text = serde_json::to_string(&state).unwrap();
        let back: GameState = serde_json::from_str(&text).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn invariants_flag_disabled_shot_clock_running() {
        let mut state = sample_state();
        state.settings.shot_clock_duration = 0;
        state.game_state.shot_clock_running = true;
        assert_eq!(
            state.check_invariants(),
            Err(InvariantViolation::ShotClockRunningWhileDisabled)
        );
    }

    #[test]
    fn invariants_flag_duplicate_jerseys() {
        let mut state = sample_state();
        state.team_b.roster.push(Player {
            number: 23,
            name: "Twin".into(),
        });
        assert!(matches!(
            state.check_invariants(),
            Err(InvariantViolation::DuplicateJersey { number: 23, .. })
        ));
    }
}
