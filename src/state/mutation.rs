//! Host-side transitions of the scoreboard document.
//!
//! Every operation is a pure function from one [`GameState`] to the next. Inputs are clamped
//! into range rather than rejected; only operations that cannot be applied at all (starting an
//! expired clock, recording a stat for an unknown jersey) fail with a [`MutationError`], and a
//! failed operation leaves the input untouched.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::state::game::{GameClock, GameState, MAX_SHOT_CLOCK, SECONDS_PER_MINUTE, TeamId};

/// Counter recorded against a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum StatKind {
    /// Made free throw, one point.
    FreeThrow,
    /// Made two point field goal.
    FieldGoal,
    /// Made three point shot.
    ThreePointer,
    OffensiveRebound,
    DefensiveRebound,
    Assist,
    Steal,
    Block,
    Turnover,
    /// Personal foul, also charged to the team.
    Foul,
}

impl StatKind {
    /// Points awarded for the stat.
    pub fn points(self) -> u32 {
        match self {
            StatKind::FreeThrow => 1,
            StatKind::FieldGoal => 2,
            StatKind::ThreePointer => 3,
            _ => 0,
        }
    }
}

/// A named host operation with its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Mutation {
    /// Start both clocks when stopped, stop both when running.
    ToggleClock,
    /// Restore the period and shot clocks to their configured durations and stop them.
    ResetClocks,
    /// Set the shot clock to `value` seconds, keeping it in step with the game clock.
    ResetShotClockTo { value: i64 },
    /// Run the shot clock while the game clock stays stopped.
    StartShotClockOnly,
    AdjustScore { team: TeamId, delta: i32 },
    RecordStat { team: TeamId, player: u8, stat: StatKind },
    SetPossession { team: TeamId },
    /// Move to the next period with fresh clocks and team fouls.
    AdvancePeriod,
    EditGameClock { minutes: i64, seconds: i64 },
    EditShotClock { seconds: i64 },
    AdjustTimeouts { team: TeamId, delta: i32 },
    AdjustFouls { team: TeamId, delta: i32 },
}

/// Reasons an operation cannot be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error("the game clock has expired; reset or edit it before starting")]
    ClockExpired,
    #[error("the shot clock is disabled for this game")]
    ShotClockDisabled,
    #[error("{team} has no player wearing number {number}")]
    UnknownPlayer { team: TeamId, number: u8 },
}

impl Mutation {
    /// Operation name as written on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::ToggleClock => "toggleClock",
            Mutation::ResetClocks => "resetClocks",
            Mutation::ResetShotClockTo { .. } => "resetShotClockTo",
            Mutation::StartShotClockOnly => "startShotClockOnly",
            Mutation::AdjustScore { .. } => "adjustScore",
            Mutation::RecordStat { .. } => "recordStat",
            Mutation::SetPossession { .. } => "setPossession",
            Mutation::AdvancePeriod => "advancePeriod",
            Mutation::EditGameClock { .. } => "editGameClock",
            Mutation::EditShotClock { .. } => "editShotClock",
            Mutation::AdjustTimeouts { .. } => "adjustTimeouts",
            Mutation::AdjustFouls { .. } => "adjustFouls",
        }
    }

    /// Produce the document that results from applying this operation to `state`.
    pub fn applied_to(&self, state: &GameState) -> Result<GameState, MutationError> {
        let mut next = state.clone();
        self.apply(&mut next)?;
        if !next.shot_clock_enabled() {
            next.game_state.shot_clock_running = false;
        }
        Ok(next)
    }

    fn apply(&self, state: &mut GameState) -> Result<(), MutationError> {
        let shot_clock_enabled = state.shot_clock_enabled();
        let period_start = state.period_start_clock();
        let shot_clock_reset = state.shot_clock_reset_value();
        let max_timeouts = state.settings.timeouts_per_team;

        match *self {
            Mutation::ToggleClock => {
                let clock = &mut state.game_state;
                if clock.game_running {
                    clock.game_running = false;
                    clock.shot_clock_running = false;
                } else {
                    if clock.game_time.is_zero() {
                        return Err(MutationError::ClockExpired);
                    }
                    clock.game_running = true;
                    clock.shot_clock_running = shot_clock_enabled && clock.shot_clock > 0;
                }
            }
            Mutation::ResetClocks => {
                let clock = &mut state.game_state;
                clock.game_time = period_start;
                clock.shot_clock = shot_clock_reset;
                clock.game_running = false;
                clock.shot_clock_running = false;
            }
            Mutation::ResetShotClockTo { value } => {
                let clock = &mut state.game_state;
                clock.shot_clock = clamp_to(value, MAX_SHOT_CLOCK);
                clock.shot_clock_running =
                    shot_clock_enabled && clock.shot_clock > 0 && clock.game_running;
            }
            Mutation::StartShotClockOnly => {
                if !shot_clock_enabled {
                    return Err(MutationError::ShotClockDisabled);
                }
                let clock = &mut state.game_state;
                if clock.shot_clock == 0 {
                    clock.shot_clock = shot_clock_reset;
                }
                clock.shot_clock_running = true;
            }
            Mutation::AdjustScore { team, delta } => {
                let team = state.team_mut(team);
                team.score = apply_delta(team.score, delta);
            }
            Mutation::RecordStat {
                team: team_id,
                player,
                stat,
            } => {
                let team = state.team_mut(team_id);
                if team.player(player).is_none() {
                    return Err(MutationError::UnknownPlayer {
                        team: team_id,
                        number: player,
                    });
                }
                let entry = team.stats.entry(player).or_default();
                let counter = match stat {
                    StatKind::FreeThrow => &mut entry.free_throws,
                    StatKind::FieldGoal => &mut entry.field_goals,
                    StatKind::ThreePointer => &mut entry.three_pointers,
                    StatKind::OffensiveRebound => &mut entry.offensive_rebounds,
                    StatKind::DefensiveRebound => &mut entry.defensive_rebounds,
                    StatKind::Assist => &mut entry.assists,
                    StatKind::Steal => &mut entry.steals,
                    StatKind::Block => &mut entry.blocks,
                    StatKind::Turnover => &mut entry.turnovers,
                    StatKind::Foul => &mut entry.fouls,
                };
                *counter = counter.saturating_add(1);
                entry.points = entry.points.saturating_add(stat.points());
                team.score = team.score.saturating_add(stat.points());
                if stat == StatKind::Foul {
                    team.fouls = team.fouls.saturating_add(1);
                }
            }
            Mutation::SetPossession { team } => {
                state.game_state.possession = team;
            }
            Mutation::AdvancePeriod => {
                let clock = &mut state.game_state;
                clock.period = clock.period.saturating_add(1);
                clock.game_time = period_start;
                clock.shot_clock = shot_clock_reset;
                clock.game_running = false;
                clock.shot_clock_running = false;
                state.team_a.fouls = 0;
                state.team_b.fouls = 0;
            }
            Mutation::EditGameClock { minutes, seconds } => {
                let clock = &mut state.game_state;
                clock.game_time = GameClock::new(
                    clamp_to(minutes, u32::MAX),
                    clamp_to(seconds, SECONDS_PER_MINUTE - 1),
                );
                if clock.game_time.is_zero() {
                    clock.game_running = false;
                    clock.shot_clock_running = false;
                }
            }
            Mutation::EditShotClock { seconds } => {
                let clock = &mut state.game_state;
                clock.shot_clock = clamp_to(seconds, MAX_SHOT_CLOCK);
                if clock.shot_clock == 0 {
                    clock.shot_clock_running = false;
                }
            }
            Mutation::AdjustTimeouts { team, delta } => {
                let team = state.team_mut(team);
                team.timeouts = apply_delta(team.timeouts, delta).min(max_timeouts);
            }
            Mutation::AdjustFouls { team, delta } => {
                let team = state.team_mut(team);
                team.fouls = apply_delta(team.fouls, delta);
            }
        }

        Ok(())
    }
}

fn apply_delta(value: u32, delta: i32) -> u32 {
    (i64::from(value) + i64::from(delta)).clamp(0, i64::from(u32::MAX)) as u32
}

fn clamp_to(value: i64, max: u32) -> u32 {
    value.clamp(0, i64::from(max)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::game::tests::sample_state;

    fn apply(state: &GameState, mutation: Mutation) -> GameState {
        mutation.applied_to(state).unwrap()
    }

    #[test]
    fn toggle_starts_both_clocks_then_stops_them() {
        let started = apply(&sample_state(), Mutation::ToggleClock);
        assert!(started.game_state.game_running);
        assert!(started.game_state.shot_clock_running);

        let stopped = apply(&started, Mutation::ToggleClock);
        assert!(!stopped.game_state.game_running);
        assert!(!stopped.game_state.shot_clock_running);
    }

    #[test]
    fn toggle_leaves_disabled_shot_clock_idle() {
        let mut state = sample_state();
        state.settings.shot_clock_duration = 0;
        let started = apply(&state, Mutation::ToggleClock);
        assert!(started.game_state.game_running);
        assert!(!started.game_state.shot_clock_running);
    }

    #[test]
    fn toggle_refuses_an_expired_clock() {
        let mut state = sample_state();
        state.game_state.game_time = GameClock::new(0, 0);
        assert_eq!(
            Mutation::ToggleClock.applied_to(&state),
            Err(MutationError::ClockExpired)
        );
    }

    #[test]
    fn score_never_goes_negative() {
        let state = apply(
            &sample_state(),
            Mutation::AdjustScore {
                team: TeamId::TeamA,
                delta: -5,
            },
        );
        assert_eq!(state.team_a.score, 0);

        let state = apply(
            &state,
            Mutation::AdjustScore {
                team: TeamId::TeamA,
                delta: 3,
            },
        );
        assert_eq!(state.team_a.score, 3);
    }

    #[test]
    fn timeouts_are_clamped_to_configured_maximum() {
        let state = apply(
            &sample_state(),
            Mutation::AdjustTimeouts {
                team: TeamId::TeamB,
                delta: 4,
            },
        );
        assert_eq!(state.team_b.timeouts, 5);

        let state = apply(
            &state,
            Mutation::AdjustTimeouts {
                team: TeamId::TeamB,
                delta: -9,
            },
        );
        assert_eq!(state.team_b.timeouts, 0);
    }

    #[test]
    fn shot_clock_edits_are_clamped() {
        let state = apply(&sample_state(), Mutation::EditShotClock { seconds: 90 });
        assert_eq!(state.game_state.shot_clock, 60);

        let state = apply(&state, Mutation::ResetShotClockTo { value: -3 });
        assert_eq!(state.game_state.shot_clock, 0);
        assert!(!state.game_state.shot_clock_running);
    }

    #[test]
    fn game_clock_edits_are_clamped() {
        let state = apply(
            &sample_state(),
            Mutation::EditGameClock {
                minutes: -2,
                seconds: 75,
            },
        );
        assert_eq!(state.game_state.game_time, GameClock::new(0, 59));
    }

    #[test]
    fn editing_the_game_clock_to_zero_stops_everything() {
        let running = apply(&sample_state(), Mutation::ToggleClock);
        let state = apply(
            &running,
            Mutation::EditGameClock {
                minutes: 0,
                seconds: 0,
            },
        );
        assert!(!state.game_state.game_running);
        assert!(!state.game_state.shot_clock_running);
    }

    #[test]
    fn reset_shot_clock_follows_the_game_clock() {
        let running = apply(&sample_state(), Mutation::ToggleClock);
        let mut expired = running.clone();
        expired.game_state.shot_clock = 0;
        expired.game_state.shot_clock_running = false;

        let reset = apply(&expired, Mutation::ResetShotClockTo { value: 14 });
        assert_eq!(reset.game_state.shot_clock, 14);
        assert!(reset.game_state.shot_clock_running);

        let idle = apply(&sample_state(), Mutation::ResetShotClockTo { value: 14 });
        assert!(!idle.game_state.shot_clock_running);
    }

    #[test]
    fn start_shot_clock_only_refills_an_expired_clock() {
        let mut state = sample_state();
        state.game_state.shot_clock = 0;
        let state = apply(&state, Mutation::StartShotClockOnly);
        assert_eq!(state.game_state.shot_clock, 24);
        assert!(state.game_state.shot_clock_running);
        assert!(!state.game_state.game_running);
    }

    #[test]
    fn start_shot_clock_only_requires_an_enabled_clock() {
        let mut state = sample_state();
        state.settings.shot_clock_duration = 0;
        assert_eq!(
            Mutation::StartShotClockOnly.applied_to(&state),
            Err(MutationError::ShotClockDisabled)
        );
    }

    #[test]
    fn three_pointer_updates_player_and_team() {
        let state = apply(
            &sample_state(),
            Mutation::RecordStat {
                team: TeamId::TeamA,
                player: 7,
                stat: StatKind::ThreePointer,
            },
        );
        let stats = &state.team_a.stats[&7];
        assert_eq!(stats.three_pointers, 1);
        assert_eq!(stats.points, 3);
        assert_eq!(state.team_a.score, 3);
    }

    #[test]
    fn foul_is_charged_to_the_team() {
        let state = apply(
            &sample_state(),
            Mutation::RecordStat {
                team: TeamId::TeamB,
                player: 23,
                stat: StatKind::Foul,
            },
        );
        assert_eq!(state.team_b.stats[&23].fouls, 1);
        assert_eq!(state.team_b.fouls, 1);
        assert_eq!(state.team_b.score, 0);
    }

    #[test]
    fn stats_for_unknown_players_are_rejected() {
        let result = Mutation::RecordStat {
            team: TeamId::TeamA,
            player: 99,
            stat: StatKind::Assist,
        }
        .applied_to(&sample_state());
        assert_eq!(
            result,
            Err(MutationError::UnknownPlayer {
                team: TeamId::TeamA,
                number: 99
            })
        );
    }

    #[test]
    fn advance_period_resets_clocks_and_fouls() {
        let mut state = apply(&sample_state(), Mutation::ToggleClock);
        state.game_state.game_time = GameClock::new(3, 12);
        state.team_a.fouls = 4;

        let next = apply(&state, Mutation::AdvancePeriod);
        assert_eq!(next.game_state.period, 2);
        assert_eq!(next.game_state.game_time, GameClock::new(12, 0));
        assert_eq!(next.game_state.shot_clock, 24);
        assert!(!next.is_clock_running());
        assert_eq!(next.team_a.fouls, 0);
    }

    #[test]
    fn possession_can_be_set_explicitly() {
        let state = apply(
            &sample_state(),
            Mutation::SetPossession {
                team: TeamId::TeamB,
            },
        );
        assert_eq!(state.game_state.possession, TeamId::TeamB);
    }

    #[test]
    fn mutations_parse_from_tagged_json() {
        let mutation: Mutation =
            serde_json::from_str(r#"{"op":"adjustScore","team":"teamB","delta":2}"#).unwrap();
        assert_eq!(
            mutation,
            Mutation::AdjustScore {
                team: TeamId::TeamB,
                delta: 2
            }
        );
        let mutation: Mutation = serde_json::from_str(r#"{"op":"toggleClock"}"#).unwrap();
        assert_eq!(mutation.name(), "toggleClock");
    }
}
