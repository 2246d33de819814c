//! Local clock engine.
//!
//! [`advance`] is the pure per-tick rule set; [`ClockEngine`] owns the single repeating timer
//! that drives it. The engine is started and stopped by the session runtime to match the
//! replicated run-flags.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

use crate::state::game::{ClockAnchor, GameClock, GameState, Role, TeamId};

/// How remaining time is derived between snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClockMode {
    /// Counters are decremented once per tick. A stalled client falls behind until the next
    /// snapshot arrives.
    #[default]
    TickCounted,
    /// Remaining time is recomputed from a replicated anchor on every tick and snapshot.
    Deadline,
}

/// Fixed parameters of the per-tick rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickRules {
    pub role: Role,
    pub mode: ClockMode,
    /// The low shot clock signal fires when the shot clock reaches this value.
    pub low_shot_clock_threshold: u32,
}

/// Presentation-level signals raised by a tick. None of them are replicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    LowShotClock { remaining: u32 },
    /// Host only: possession flipped to `possession`.
    ShotClockViolation { possession: TeamId },
    /// Viewer only: the local shot clock hit zero; the host decides what happens next.
    ShotClockExpired,
    PeriodEnded { period: u32 },
}

/// What a tick changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub events: Vec<ClockEvent>,
    /// The host must write the document back to the store.
    pub persist: bool,
    /// Both run-flags are down; the timer should stop.
    pub halt: bool,
}

/// Current wall clock time in Unix milliseconds.
pub fn wall_clock_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Advance the document by one tick.
pub fn advance(state: &mut GameState, rules: &TickRules, now_ms: i64) -> TickOutcome {
    let mut outcome = TickOutcome::default();
    let shot_clock_enabled = state.shot_clock_enabled();
    let anchor = match rules.mode {
        ClockMode::TickCounted => None,
        ClockMode::Deadline => state.game_state.clock_anchor,
    };
    let clock = &mut state.game_state;

    if clock.game_running {
        match anchor {
            Some(anchor) => {
                let remaining = anchor.game_seconds.saturating_sub(elapsed_seconds(&anchor, now_ms));
                let previous = clock.game_time.total_seconds();
                clock.game_time = GameClock::from_total_seconds(remaining.min(previous));
            }
            None => clock.game_time.decrement(),
        }

        if clock.game_time.is_zero() {
            clock.game_running = false;
            clock.shot_clock_running = false;
            outcome.events.push(ClockEvent::PeriodEnded {
                period: clock.period,
            });
            outcome.persist |= rules.role.is_host();
        }
    }

    if clock.shot_clock_running && shot_clock_enabled {
        let previous = clock.shot_clock;
        clock.shot_clock = match anchor {
            Some(anchor) => anchor
                .shot_clock
                .saturating_sub(elapsed_seconds(&anchor, now_ms))
                .min(previous),
            None => previous.saturating_sub(1),
        };

        let threshold = rules.low_shot_clock_threshold;
        if previous > threshold && clock.shot_clock <= threshold && clock.shot_clock > 0 {
            outcome.events.push(ClockEvent::LowShotClock {
                remaining: clock.shot_clock,
            });
        }

        if clock.shot_clock == 0 {
            clock.shot_clock_running = false;
            if rules.role.is_host() {
                clock.possession = clock.possession.other();
                outcome.events.push(ClockEvent::ShotClockViolation {
                    possession: clock.possession,
                });
                outcome.persist = true;
            } else {
                outcome.events.push(ClockEvent::ShotClockExpired);
            }
        }
    }

    outcome.halt = !clock.game_running && !clock.shot_clock_running;
    outcome
}

/// Record the current clock values as the reference point for deadline mode.
pub fn anchor(state: &mut GameState, now_ms: i64) {
    let clock = &mut state.game_state;
    clock.clock_anchor = Some(ClockAnchor {
        at_ms: now_ms,
        game_seconds: clock.game_time.total_seconds(),
        shot_clock: clock.shot_clock,
    });
}

/// Bring running clocks up to date with the replicated anchor without firing any transition.
///
/// Used when a snapshot arrives in deadline mode; the next tick handles zero crossings.
pub fn project_from_anchor(state: &mut GameState, now_ms: i64) {
    let Some(anchor) = state.game_state.clock_anchor else {
        return;
    };
    let elapsed = elapsed_seconds(&anchor, now_ms);
    let clock = &mut state.game_state;
    if clock.game_running {
        clock.game_time = GameClock::from_total_seconds(anchor.game_seconds.saturating_sub(elapsed));
    }
    if clock.shot_clock_running {
        clock.shot_clock = anchor.shot_clock.saturating_sub(elapsed);
    }
}

fn elapsed_seconds(anchor: &ClockAnchor, now_ms: i64) -> u32 {
    let elapsed_ms = now_ms.saturating_sub(anchor.at_ms).max(0);
    u32::try_from(elapsed_ms / 1_000).unwrap_or(u32::MAX)
}

/// The single repeating timer of a client.
#[derive(Debug)]
pub struct ClockEngine {
    period: Duration,
    ticker: Option<Interval>,
}

impl ClockEngine {
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            ticker: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.ticker.is_some()
    }

    /// Start ticking one period from now. Any previous timer is replaced, never doubled.
    pub fn start(&mut self) {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
    }

    pub fn stop(&mut self) {
        self.ticker = None;
    }

    /// Wait for the next tick. Never resolves while the engine is stopped.
    pub async fn next_tick(&mut self) {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{
        game::tests::sample_state,
        mutation::Mutation,
    };

    fn host_rules() -> TickRules {
        TickRules {
            role: Role::Host,
            mode: ClockMode::TickCounted,
            low_shot_clock_threshold: 5,
        }
    }

    fn viewer_rules() -> TickRules {
        TickRules {
            role: Role::Viewer,
            ..host_rules()
        }
    }

    fn running_state() -> GameState {
        Mutation::ToggleClock.applied_to(&sample_state()).unwrap()
    }

    #[test]
    fn game_clock_strictly_decreases_until_zero() {
        let mut state = running_state();
        state.settings.shot_clock_duration = 0;
        state.game_state.shot_clock_running = false;
        state.game_state.game_time = GameClock::new(1, 5);

        let mut previous = state.game_state.game_time;
        let mut ticks = 0;
        while state.game_state.game_running {
            advance(&mut state, &host_rules(), 0);
            assert!(state.game_state.game_time < previous);
            previous = state.game_state.game_time;
            ticks += 1;
        }
        assert_eq!(ticks, 65);
        assert!(state.game_state.game_time.is_zero());

        let outcome = advance(&mut state, &host_rules(), 0);
        assert!(state.game_state.game_time.is_zero());
        assert!(outcome.halt);
    }

    #[test]
    fn period_end_stops_both_clocks_and_persists_on_host() {
        let mut state = running_state();
        state.game_state.game_time = GameClock::new(0, 1);

        let outcome = advance(&mut state, &host_rules(), 0);
        assert!(!state.game_state.game_running);
        assert!(!state.game_state.shot_clock_running);
        assert!(outcome.persist);
        assert!(outcome.halt);
        assert_eq!(outcome.events, vec![ClockEvent::PeriodEnded { period: 1 }]);
    }

    #[test]
    fn viewer_period_end_is_not_persisted() {
        let mut state = running_state();
        state.game_state.game_time = GameClock::new(0, 1);
        let outcome = advance(&mut state, &viewer_rules(), 0);
        assert!(!outcome.persist);
        assert!(!state.game_state.game_running);
    }

    #[test]
    fn twenty_four_ticks_trigger_one_violation() {
        let mut state = running_state();
        let mut violations = 0;
        let mut lows = 0;
        for _ in 0..24 {
            let outcome = advance(&mut state, &host_rules(), 0);
            for event in outcome.events {
                match event {
                    ClockEvent::ShotClockViolation { possession } => {
                        assert_eq!(possession, TeamId::TeamB);
                        violations += 1;
                    }
                    ClockEvent::LowShotClock { remaining } => {
                        assert_eq!(remaining, 5);
                        lows += 1;
                    }
                    other => panic!("unexpected event {other:?}"),
                }
            }
        }

        assert_eq!(violations, 1);
        assert_eq!(lows, 1);
        let clock = &state.game_state;
        assert_eq!(clock.possession, TeamId::TeamB);
        assert_eq!(clock.shot_clock, 0);
        assert!(!clock.shot_clock_running);
        assert!(clock.game_running);
        assert_eq!(clock.game_time, GameClock::new(11, 36));

        let outcome = advance(&mut state, &host_rules(), 0);
        assert!(outcome.events.is_empty());
        assert_eq!(state.game_state.possession, TeamId::TeamB);
    }

    #[test]
    fn viewer_never_flips_possession() {
        let mut state = running_state();
        state.game_state.shot_clock = 1;
        let outcome = advance(&mut state, &viewer_rules(), 0);
        assert_eq!(outcome.events, vec![ClockEvent::ShotClockExpired]);
        assert_eq!(state.game_state.possession, TeamId::TeamA);
        assert!(!state.game_state.shot_clock_running);
        assert!(!outcome.persist);
    }

    #[test]
    fn shot_clock_only_ticks_alone_and_halts_at_zero() {
        let mut state = Mutation::StartShotClockOnly
            .applied_to(&sample_state())
            .unwrap();
        state.game_state.shot_clock = 2;

        let first = advance(&mut state, &host_rules(), 0);
        assert!(!first.halt);
        assert_eq!(state.game_state.game_time, GameClock::new(12, 0));

        let second = advance(&mut state, &host_rules(), 0);
        assert!(second.halt);
        assert_eq!(state.game_state.shot_clock, 0);
    }

    #[test]
    fn deadline_mode_catches_up_after_a_stall() {
        let rules = TickRules {
            mode: ClockMode::Deadline,
            ..host_rules()
        };
        let mut state = running_state();
        anchor(&mut state, 1_000);

        let outcome = advance(&mut state, &rules, 11_400);
        assert_eq!(state.game_state.game_time, GameClock::new(11, 50));
        assert_eq!(state.game_state.shot_clock, 14);
        assert!(outcome.events.is_empty());

        let outcome = advance(&mut state, &rules, 21_000);
        assert_eq!(state.game_state.shot_clock, 4);
        assert_eq!(outcome.events, vec![ClockEvent::LowShotClock { remaining: 4 }]);
    }

    #[test]
    fn project_from_anchor_only_moves_running_clocks() {
        let mut state = Mutation::StartShotClockOnly
            .applied_to(&sample_state())
            .unwrap();
        anchor(&mut state, 0);
        project_from_anchor(&mut state, 10_000);
        assert_eq!(state.game_state.shot_clock, 14);
        assert_eq!(state.game_state.game_time, GameClock::new(12, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn engine_restart_never_double_ticks() {
        let mut engine = ClockEngine::new(Duration::from_secs(1));
        assert!(!engine.is_active());

        engine.start();
        tokio::time::sleep(Duration::from_millis(600)).await;
        engine.start();

        let started = Instant::now();
        engine.next_tick().await;
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_engine_never_ticks() {
        let mut engine = ClockEngine::new(Duration::from_secs(1));
        engine.start();
        engine.stop();
        let result = tokio::time::timeout(Duration::from_secs(5), engine.next_tick()).await;
        assert!(result.is_err());
    }
}
