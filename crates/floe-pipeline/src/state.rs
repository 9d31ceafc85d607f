//! Pipeline lifecycle state machine.
//!
//! # Design
//!
//! Every lifecycle change goes through [`StateMachine::transition`], which
//! enforces two invariants:
//!
//! 1. **Legal transitions only.** Illegal targets return
//!    [`TransitionError`] and leave the state untouched.
//! 2. **Listener delivery.** Registered listeners are invoked after a
//!    successful transition, with the state lock released, in registration
//!    order, exactly once per transition.
//!
//! # State diagram
//!
//! ```text
//! Starting -> Running | Failed | Stopping
//! Running  -> Paused  | Stopping | Failed
//! Paused   -> Running | Stopping | Failed
//! Stopping -> Stopped | Failed
//! Stopped  -> Starting
//! Failed   -> Starting | Stopped
//! ```

use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// PipelineState
// ---------------------------------------------------------------------------

/// All states a pipeline can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Starting,
    Running,
    Paused,
    Stopping,
    Stopped,
    Failed,
}

impl PipelineState {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineState::Starting => "starting",
            PipelineState::Running => "running",
            PipelineState::Paused => "paused",
            PipelineState::Stopping => "stopping",
            PipelineState::Stopped => "stopped",
            PipelineState::Failed => "failed",
        }
    }

    /// Returns `true` if no work is in flight in this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Stopped | PipelineState::Failed)
    }
}

/// The allowed-transition relation.
pub fn is_allowed(from: PipelineState, to: PipelineState) -> bool {
    use PipelineState::*;
    matches!(
        (from, to),
        (Starting, Running | Failed | Stopping)
            | (Running, Paused | Stopping | Failed)
            | (Paused, Running | Stopping | Failed)
            | (Stopping, Stopped | Failed)
            | (Stopped, Starting)
            | (Failed, Starting | Stopped)
    )
}

// ---------------------------------------------------------------------------
// TransitionError
// ---------------------------------------------------------------------------

/// Returned when a transition is not in the allowed relation. This is a
/// programmer error; callers log it and surface it, they do not retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionError {
    pub from: PipelineState,
    pub to: PipelineState,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid pipeline transition: {} -> {}",
            self.from.as_str(),
            self.to.as_str()
        )
    }
}

impl std::error::Error for TransitionError {}

// ---------------------------------------------------------------------------
// StateMachine
// ---------------------------------------------------------------------------

type Listener = dyn Fn(PipelineState, PipelineState) + Send + Sync;

/// Thread-safe pipeline state with observer registration.
pub struct StateMachine {
    state: Mutex<PipelineState>,
    listeners: Mutex<Vec<Arc<Listener>>>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// New machine in `Starting`.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PipelineState::Starting),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock().expect("state lock poisoned")
    }

    /// Events may be processed only while `Running`.
    pub fn can_process(&self) -> bool {
        self.state() == PipelineState::Running
    }

    /// Register a listener invoked on every successful transition.
    /// Listeners run in registration order with the state lock released.
    pub fn on_transition(&self, f: impl Fn(PipelineState, PipelineState) + Send + Sync + 'static) {
        self.listeners
            .lock()
            .expect("listener lock poisoned")
            .push(Arc::new(f));
    }

    /// Atomically move to `to`. Returns the previous state on success.
    pub fn transition(&self, to: PipelineState) -> Result<PipelineState, TransitionError> {
        let from = {
            let mut guard = self.state.lock().expect("state lock poisoned");
            let from = *guard;
            if !is_allowed(from, to) {
                return Err(TransitionError { from, to });
            }
            *guard = to;
            from
        };

        // Lock released before callbacks; a listener may inspect or even
        // transition the machine again without deadlocking.
        let listeners: Vec<Arc<Listener>> = self
            .listeners
            .lock()
            .expect("listener lock poisoned")
            .clone();
        for l in &listeners {
            l(from, to);
        }

        Ok(from)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ALL: [PipelineState; 6] = [
        PipelineState::Starting,
        PipelineState::Running,
        PipelineState::Paused,
        PipelineState::Stopping,
        PipelineState::Stopped,
        PipelineState::Failed,
    ];

    #[test]
    fn relation_matches_the_lifecycle_table() {
        use PipelineState::*;
        let allowed = [
            (Starting, Running),
            (Starting, Failed),
            (Starting, Stopping),
            (Running, Paused),
            (Running, Stopping),
            (Running, Failed),
            (Paused, Running),
            (Paused, Stopping),
            (Paused, Failed),
            (Stopping, Stopped),
            (Stopping, Failed),
            (Stopped, Starting),
            (Failed, Starting),
            (Failed, Stopped),
        ];

        for from in ALL {
            for to in ALL {
                let expect = allowed.contains(&(from, to));
                assert_eq!(
                    is_allowed(from, to),
                    expect,
                    "relation mismatch for {from:?} -> {to:?}"
                );
            }
        }
    }

    #[test]
    fn transition_updates_state_and_returns_previous() {
        let sm = StateMachine::new();
        assert_eq!(sm.state(), PipelineState::Starting);

        let prev = sm.transition(PipelineState::Running).unwrap();
        assert_eq!(prev, PipelineState::Starting);
        assert_eq!(sm.state(), PipelineState::Running);
        assert!(sm.can_process());
    }

    #[test]
    fn illegal_transition_leaves_state_untouched() {
        let sm = StateMachine::new();
        let err = sm.transition(PipelineState::Paused).unwrap_err();
        assert_eq!(err.from, PipelineState::Starting);
        assert_eq!(err.to, PipelineState::Paused);
        assert_eq!(sm.state(), PipelineState::Starting);
    }

    #[test]
    fn listeners_fire_in_registration_order_once_per_transition() {
        let sm = StateMachine::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            sm.on_transition(move |from, to| {
                log.lock().unwrap().push((tag, from, to));
            });
        }

        sm.transition(PipelineState::Running).unwrap();
        sm.transition(PipelineState::Paused).unwrap();

        let got = log.lock().unwrap().clone();
        assert_eq!(
            got,
            vec![
                ("first", PipelineState::Starting, PipelineState::Running),
                ("second", PipelineState::Starting, PipelineState::Running),
                ("third", PipelineState::Starting, PipelineState::Running),
                ("first", PipelineState::Running, PipelineState::Paused),
                ("second", PipelineState::Running, PipelineState::Paused),
                ("third", PipelineState::Running, PipelineState::Paused),
            ]
        );
    }

    #[test]
    fn failed_transition_does_not_invoke_listeners() {
        let sm = StateMachine::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        sm.on_transition(move |_, _| {
            calls2.fetch_add(1, Ordering::SeqCst);
        });

        assert!(sm.transition(PipelineState::Stopped).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn listener_may_reenter_the_machine() {
        // A listener that reads state must not deadlock against the
        // transition that triggered it.
        let sm = Arc::new(StateMachine::new());
        let sm2 = Arc::clone(&sm);
        let seen = Arc::new(Mutex::new(None));
        let seen2 = Arc::clone(&seen);
        sm.on_transition(move |_, _| {
            *seen2.lock().unwrap() = Some(sm2.state());
        });

        sm.transition(PipelineState::Running).unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(PipelineState::Running));
    }

    #[test]
    fn full_lifecycle_walk() {
        let sm = StateMachine::new();
        for to in [
            PipelineState::Running,
            PipelineState::Paused,
            PipelineState::Running,
            PipelineState::Stopping,
            PipelineState::Stopped,
            PipelineState::Starting,
            PipelineState::Failed,
            PipelineState::Starting,
        ] {
            sm.transition(to).unwrap();
        }
        assert_eq!(sm.state(), PipelineState::Starting);
    }
}
