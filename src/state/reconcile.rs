use crate::state::game::GameState;

/// What the clock engine should do after a snapshot was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    Start,
    Stop,
    Keep,
}

/// Result of applying one store notification to the local replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The document is gone; the synchronized view must close.
    Ended,
    /// The replica now equals the snapshot.
    Applied {
        engine: EngineCommand,
        /// Whether the replica differed from the snapshot before it was applied.
        changed: bool,
    },
}

/// Replace the replica with `snapshot` and derive the engine transition from its run-flags.
///
/// The remote document always wins in full; no field of the local replica survives.
pub fn reconcile(
    replica: &mut Option<GameState>,
    snapshot: Option<GameState>,
    engine_active: bool,
) -> ReconcileOutcome {
    let Some(snapshot) = snapshot else {
        *replica = None;
        return ReconcileOutcome::Ended;
    };

    let should_run = snapshot.is_clock_running();
    let changed = replica.as_ref() != Some(&snapshot);
    *replica = Some(snapshot);

    let engine = match (should_run, engine_active) {
        (true, false) => EngineCommand::Start,
        (false, true) => EngineCommand::Stop,
        _ => EngineCommand::Keep,
    };

    ReconcileOutcome::Applied { engine, changed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{game::tests::sample_state, mutation::Mutation};

    #[test]
    fn running_snapshot_starts_an_idle_engine() {
        let running = Mutation::ToggleClock.applied_to(&sample_state()).unwrap();
        let mut replica = Some(sample_state());

        let outcome = reconcile(&mut replica, Some(running.clone()), false);
        assert_eq!(
            outcome,
            ReconcileOutcome::Applied {
                engine: EngineCommand::Start,
                changed: true
            }
        );
        assert_eq!(replica, Some(running));
    }

    #[test]
    fn stopped_snapshot_stops_an_active_engine() {
        let mut replica = None;
        let outcome = reconcile(&mut replica, Some(sample_state()), true);
        assert_eq!(
            outcome,
            ReconcileOutcome::Applied {
                engine: EngineCommand::Stop,
                changed: true
            }
        );
    }

    #[test]
    fn applying_the_same_snapshot_twice_is_idempotent() {
        let running = Mutation::ToggleClock.applied_to(&sample_state()).unwrap();
        let mut replica = None;
        let mut engine_active = false;

        for round in 0..2 {
            let outcome = reconcile(&mut replica, Some(running.clone()), engine_active);
            if let ReconcileOutcome::Applied { engine, changed } = outcome {
                if engine == EngineCommand::Start {
                    engine_active = true;
                }
                if round == 1 {
                    assert_eq!(engine, EngineCommand::Keep);
                    assert!(!changed);
                }
            }
        }

        assert!(engine_active);
        assert_eq!(replica, Some(running));
    }

    #[test]
    fn snapshot_replaces_local_predictions_wholesale() {
        let mut local = Mutation::ToggleClock.applied_to(&sample_state()).unwrap();
        local.game_state.shot_clock = 3;
        local.team_a.score = 40;
        let mut replica = Some(local);

        let remote = sample_state();
        reconcile(&mut replica, Some(remote.clone()), true);
        assert_eq!(replica, Some(remote));
    }

    #[test]
    fn missing_document_ends_the_session() {
        let mut replica = Some(sample_state());
        assert_eq!(reconcile(&mut replica, None, true), ReconcileOutcome::Ended);
        assert!(replica.is_none());
    }
}
