//! Registration lifecycle as an explicit state machine.
//!
//! ```text
//! NotRegistered ─RegisterCalled─▶ Registering ─Accepted─▶ WaitingForInstall
//!                                                               │ WorkerFound
//!                                                               ▼
//!                      ┌──── no prior controller ─────────── Installing
//!                      ▼                                        │ prior controller
//!                  Installed ──Activated──▶ Activated ◀──── UpdateAvailable
//!
//! any ─Errored─▶ Failed
//! ```
//!
//! First install and update are told apart only by whether a controller
//! existed when the new worker was found.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of one registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LifecycleState {
    #[default]
    NotRegistered,
    Registering,
    WaitingForInstall,
    Installing,
    /// First install finished; content is cached for offline use.
    Installed,
    /// A new worker is installed and waits for the next full reload.
    UpdateAvailable,
    Activated,
    Failed,
}

impl LifecycleState {
    /// States after which an attempt has nothing more to wait for.
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            LifecycleState::Installed
                | LifecycleState::UpdateAvailable
                | LifecycleState::Activated
                | LifecycleState::Failed
        )
    }
}

/// Input to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    /// `register` was called after the page load event.
    RegisterCalled,
    /// The platform accepted the registration and returned a handle.
    Accepted,
    /// The handle reported a new installing worker.
    WorkerFound { had_controller: bool },
    /// The installing worker reached `installed`.
    InstallCompleted,
    /// The waiting worker became active.
    Activated,
    /// Registration or install error.
    Errored,
}

/// Host notification produced by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notification {
    /// Content is now cached for offline use.
    Success,
    /// New content is queued for the next full reload.
    Update,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Invalid lifecycle transition from {from:?} on {event:?}")]
    InvalidTransition {
        from: LifecycleState,
        event: LifecycleEvent,
    },
}

/// State machine for a single registration attempt.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: LifecycleState,
    had_controller: bool,
    trace: Vec<LifecycleState>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::NotRegistered,
            had_controller: false,
            trace: vec![LifecycleState::NotRegistered],
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Every state visited so far, starting with `NotRegistered`.
    pub fn trace(&self) -> &[LifecycleState] {
        &self.trace
    }

    /// Apply one event.
    ///
    /// On an invalid pairing the state is left untouched.
    pub fn apply(&mut self, event: LifecycleEvent) -> Result<Option<Notification>, LifecycleError> {
        let (next, notification) = transition(self.state, self.had_controller, event).ok_or(
            LifecycleError::InvalidTransition {
                from: self.state,
                event,
            },
        )?;

        if let LifecycleEvent::WorkerFound { had_controller } = event {
            self.had_controller = had_controller;
        }
        if next != self.state {
            self.state = next;
            self.trace.push(next);
        }
        Ok(notification)
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// The transition function.
pub fn transition(
    state: LifecycleState,
    had_controller: bool,
    event: LifecycleEvent,
) -> Option<(LifecycleState, Option<Notification>)> {
    use LifecycleEvent as E;
    use LifecycleState as S;

    match (state, event) {
        (_, E::Errored) => Some((S::Failed, None)),
        (S::NotRegistered, E::RegisterCalled) => Some((S::Registering, None)),
        (S::Registering, E::Accepted) => Some((S::WaitingForInstall, None)),
        (
            S::WaitingForInstall | S::Installed | S::UpdateAvailable | S::Activated,
            E::WorkerFound { .. },
        ) => Some((S::Installing, None)),
        (S::Installing, E::InstallCompleted) => {
            // Recorded by the WorkerFound that started this cycle.
            if had_controller {
                Some((S::UpdateAvailable, Some(Notification::Update)))
            } else {
                Some((S::Installed, Some(Notification::Success)))
            }
        }
        (S::Installed | S::UpdateAvailable, E::Activated) => Some((S::Activated, None)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LifecycleEvent as E;
    use LifecycleState as S;

    fn run(events: &[LifecycleEvent]) -> (Lifecycle, Vec<Option<Notification>>) {
        let mut lifecycle = Lifecycle::new();
        let notes = events
            .iter()
            .map(|e| lifecycle.apply(*e).unwrap())
            .collect();
        (lifecycle, notes)
    }

    #[test]
    fn test_first_install_notifies_success() {
        let (lifecycle, notes) = run(&[
            E::RegisterCalled,
            E::Accepted,
            E::WorkerFound {
                had_controller: false,
            },
            E::InstallCompleted,
        ]);

        assert_eq!(lifecycle.state(), S::Installed);
        assert_eq!(notes.last(), Some(&Some(Notification::Success)));
        assert!(!notes.contains(&Some(Notification::Update)));
        assert_eq!(
            lifecycle.trace(),
            &[
                S::NotRegistered,
                S::Registering,
                S::WaitingForInstall,
                S::Installing,
                S::Installed
            ]
        );
    }

    #[test]
    fn test_prior_controller_notifies_update() {
        let (lifecycle, notes) = run(&[
            E::RegisterCalled,
            E::Accepted,
            E::WorkerFound {
                had_controller: true,
            },
            E::InstallCompleted,
        ]);

        assert_eq!(lifecycle.state(), S::UpdateAvailable);
        assert_eq!(notes.last(), Some(&Some(Notification::Update)));
        assert!(!notes.contains(&Some(Notification::Success)));
    }

    #[test]
    fn test_activation_after_install() {
        let (lifecycle, _) = run(&[
            E::RegisterCalled,
            E::Accepted,
            E::WorkerFound {
                had_controller: false,
            },
            E::InstallCompleted,
            E::Activated,
        ]);
        assert_eq!(lifecycle.state(), S::Activated);
    }

    #[test]
    fn test_error_from_any_state() {
        for events in [
            vec![],
            vec![E::RegisterCalled],
            vec![E::RegisterCalled, E::Accepted],
            vec![
                E::RegisterCalled,
                E::Accepted,
                E::WorkerFound {
                    had_controller: true,
                },
            ],
        ] {
            let (mut lifecycle, _) = run(&events);
            assert_eq!(lifecycle.apply(E::Errored), Ok(None));
            assert_eq!(lifecycle.state(), S::Failed);
        }
    }

    #[test]
    fn test_invalid_transition_keeps_state() {
        let mut lifecycle = Lifecycle::new();
        let err = lifecycle.apply(E::InstallCompleted).unwrap_err();

        assert_eq!(
            err,
            LifecycleError::InvalidTransition {
                from: S::NotRegistered,
                event: E::InstallCompleted
            }
        );
        assert_eq!(lifecycle.state(), S::NotRegistered);
        assert_eq!(lifecycle.trace(), &[S::NotRegistered]);
    }

    #[test]
    fn test_later_update_in_same_session() {
        let (mut lifecycle, _) = run(&[
            E::RegisterCalled,
            E::Accepted,
            E::WorkerFound {
                had_controller: false,
            },
            E::InstallCompleted,
            E::Activated,
        ]);

        lifecycle
            .apply(E::WorkerFound {
                had_controller: true,
            })
            .unwrap();
        assert_eq!(
            lifecycle.apply(E::InstallCompleted),
            Ok(Some(Notification::Update))
        );
    }

    #[test]
    fn test_failed_is_final_for_install_events() {
        let (mut lifecycle, _) = run(&[E::RegisterCalled, E::Errored]);
        assert!(lifecycle
            .apply(E::WorkerFound {
                had_controller: false
            })
            .is_err());
        assert!(lifecycle.apply(E::RegisterCalled).is_err());
    }

    #[test]
    fn test_settled_states() {
        assert!(S::Installed.is_settled());
        assert!(S::UpdateAvailable.is_settled());
        assert!(S::Failed.is_settled());
        assert!(!S::Installing.is_settled());
        assert!(!S::WaitingForInstall.is_settled());
    }
}
