//! Pure lifecycle state machine for a single case execution.
//!
//! `transition` maps `(current state, transition)` to the next state and the
//! standard event the transition emits. It knows nothing about trees,
//! sentries or variables, so every rule can be tested in isolation.

use thiserror::Error;

use crate::core::types::{StandardEvent, State};

/// A requested lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// AVAILABLE -> ENABLED (manual activation required).
    Enable,
    /// AVAILABLE -> ACTIVE (automatic start).
    Start,
    /// ENABLED -> ACTIVE.
    ManualStart,
    /// AVAILABLE -> COMPLETED, milestones only.
    Occur,
    /// ACTIVE -> COMPLETED.
    Complete,
    /// Exit sentry fired on the execution itself.
    Exit,
    /// Terminate command addressed to the execution.
    Terminate,
    /// An ancestor exited or was terminated.
    ParentTerminate,
    Suspend,
    ParentSuspend,
    /// SUSPENDED -> `previous`.
    Resume { previous: State },
    ParentResume { previous: State },
    /// COMPLETED/TERMINATED -> CLOSED.
    Close,
}

impl Transition {
    pub fn name(self) -> &'static str {
        self.event().as_str()
    }

    /// Event emitted when the transition succeeds.
    pub fn event(self) -> StandardEvent {
        match self {
            Transition::Enable => StandardEvent::Enable,
            Transition::Start => StandardEvent::Start,
            Transition::ManualStart => StandardEvent::ManualStart,
            Transition::Occur => StandardEvent::Occur,
            Transition::Complete => StandardEvent::Complete,
            Transition::Exit => StandardEvent::Exit,
            Transition::Terminate => StandardEvent::Terminate,
            Transition::ParentTerminate => StandardEvent::ParentTerminate,
            Transition::Suspend => StandardEvent::Suspend,
            Transition::ParentSuspend => StandardEvent::ParentSuspend,
            Transition::Resume { .. } => StandardEvent::Resume,
            Transition::ParentResume { .. } => StandardEvent::ParentResume,
            Transition::Close => StandardEvent::Close,
        }
    }
}

/// A transition that is not legal from the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot {transition} from state {from}", transition = .transition.name())]
pub struct TransitionError {
    pub from: State,
    pub transition: Transition,
}

/// Compute the next state for `transition` applied to `from`.
pub fn transition(
    from: State,
    transition: Transition,
) -> Result<(State, StandardEvent), TransitionError> {
    let next = match (from, transition) {
        (State::Available, Transition::Enable) => State::Enabled,
        (State::Available, Transition::Start) => State::Active,
        (State::Enabled, Transition::ManualStart) => State::Active,
        (State::Available, Transition::Occur) => State::Completed,
        (State::Active, Transition::Complete) => State::Completed,
        (
            State::Available | State::Enabled | State::Active | State::Suspended,
            Transition::Exit | Transition::Terminate | Transition::ParentTerminate,
        ) => State::Terminated,
        (
            State::Available | State::Enabled | State::Active,
            Transition::Suspend | Transition::ParentSuspend,
        ) => State::Suspended,
        (
            State::Suspended,
            Transition::Resume { previous } | Transition::ParentResume { previous },
        ) if is_resumable(previous) => previous,
        (State::Completed | State::Terminated, Transition::Close) => State::Closed,
        _ => return Err(TransitionError { from, transition }),
    };
    Ok((next, transition.event()))
}

fn is_resumable(previous: State) -> bool {
    matches!(
        previous,
        State::Available | State::Enabled | State::Active
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATES: [State; 7] = [
        State::Available,
        State::Enabled,
        State::Active,
        State::Suspended,
        State::Completed,
        State::Terminated,
        State::Closed,
    ];

    fn legal_sources(t: Transition) -> Vec<State> {
        STATES
            .iter()
            .copied()
            .filter(|state| transition(*state, t).is_ok())
            .collect()
    }

    #[test]
    fn complete_requires_active() {
        assert_eq!(legal_sources(Transition::Complete), vec![State::Active]);
        let err = transition(State::Enabled, Transition::Complete).expect_err("enabled");
        assert_eq!(err.to_string(), "cannot complete from state enabled");
    }

    #[test]
    fn manual_start_requires_enabled() {
        assert_eq!(
            transition(State::Enabled, Transition::ManualStart),
            Ok((State::Active, StandardEvent::ManualStart))
        );
        assert_eq!(legal_sources(Transition::ManualStart), vec![State::Enabled]);
    }

    /// Exit, terminate and parent-terminate are legal from every non-terminal state.
    #[test]
    fn termination_from_any_non_terminal_state() {
        let expected = vec![
            State::Available,
            State::Enabled,
            State::Active,
            State::Suspended,
        ];
        for t in [
            Transition::Exit,
            Transition::Terminate,
            Transition::ParentTerminate,
        ] {
            assert_eq!(legal_sources(t), expected, "{t:?}");
        }
        assert_eq!(
            transition(State::Suspended, Transition::Exit),
            Ok((State::Terminated, StandardEvent::Exit))
        );
    }

    #[test]
    fn suspend_and_resume_restore_previous_state() {
        let (suspended, event) = transition(State::Enabled, Transition::ParentSuspend).expect("suspend");
        assert_eq!(suspended, State::Suspended);
        assert_eq!(event, StandardEvent::ParentSuspend);

        let (resumed, event) = transition(
            suspended,
            Transition::ParentResume {
                previous: State::Enabled,
            },
        )
        .expect("resume");
        assert_eq!(resumed, State::Enabled);
        assert_eq!(event, StandardEvent::ParentResume);
    }

    #[test]
    fn suspend_rejects_suspended_and_terminal_states() {
        assert_eq!(
            legal_sources(Transition::Suspend),
            vec![State::Available, State::Enabled, State::Active]
        );
    }

    #[test]
    fn resume_rejects_terminal_previous_state() {
        assert!(
            transition(
                State::Suspended,
                Transition::Resume {
                    previous: State::Completed
                }
            )
            .is_err()
        );
        assert!(
            transition(
                State::Active,
                Transition::Resume {
                    previous: State::Active
                }
            )
            .is_err()
        );
    }

    #[test]
    fn milestones_occur_from_available() {
        assert_eq!(
            transition(State::Available, Transition::Occur),
            Ok((State::Completed, StandardEvent::Occur))
        );
        assert!(transition(State::Active, Transition::Occur).is_err());
    }

    #[test]
    fn close_only_after_completion_or_termination() {
        assert_eq!(
            legal_sources(Transition::Close),
            vec![State::Completed, State::Terminated]
        );
    }
}
