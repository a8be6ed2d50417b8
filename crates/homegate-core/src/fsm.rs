// ── Finite state machine ──
//
// Ordered, append-only registry of states plus a current pointer.
// Exit hooks belong to the state being *left*: its guard may veto the
// move and its notify runs right before the commit. The machine does no
// locking of its own; callers serialize access.

use std::fmt;

use thiserror::Error;

/// Exit guard: `(from, to, arg) -> allowed`.
pub type ExitGuard<S, A> = Box<dyn Fn(S, S, &A) -> bool + Send + Sync>;

/// Exit notification: `(from, to, arg)`, invoked once the guard passed.
pub type ExitNotify<S, A> = Box<dyn Fn(S, S, &A) + Send + Sync>;

/// Why a transition did not happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// Target (or current) is unregistered, or target equals current.
    #[error("invalid target state")]
    InvalidState,
    /// The exit guard of the current state vetoed the move.
    #[error("transition vetoed by exit guard")]
    TransitionFailed,
}

// ── Hooks ────────────────────────────────────────────────────────────

/// Optional exit hooks attached to a state at registration.
pub struct StateHooks<S, A = ()> {
    guard: Option<ExitGuard<S, A>>,
    notify: Option<ExitNotify<S, A>>,
}

impl<S, A> Default for StateHooks<S, A> {
    fn default() -> Self {
        Self {
            guard: None,
            notify: None,
        }
    }
}

impl<S, A> StateHooks<S, A> {
    /// No guard, no notify.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_guard(mut self, guard: impl Fn(S, S, &A) -> bool + Send + Sync + 'static) -> Self {
        self.guard = Some(Box::new(guard));
        self
    }

    pub fn with_notify(mut self, notify: impl Fn(S, S, &A) + Send + Sync + 'static) -> Self {
        self.notify = Some(Box::new(notify));
        self
    }
}

// ── StateMachine ─────────────────────────────────────────────────────

struct StateEntry<S, A> {
    value: S,
    hooks: StateHooks<S, A>,
}

/// A finite state machine over values of `S`, with hook argument `A`.
///
/// The ordinal of a state is its registration index; [`travel_to_state`]
/// walks ordinals in the direction of travel.
///
/// [`travel_to_state`]: StateMachine::travel_to_state
pub struct StateMachine<S, A = ()> {
    states: Vec<StateEntry<S, A>>,
    current: Option<usize>,
}

impl<S: Copy + Eq, A> Default for StateMachine<S, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Copy + Eq, A> StateMachine<S, A> {
    /// Empty machine with an undefined current state.
    pub fn new() -> Self {
        Self {
            states: Vec::new(),
            current: None,
        }
    }

    /// Register `value` at the next ordinal. Returns `false` (and changes
    /// nothing) if it is already registered. The first state registered
    /// becomes current; no hook runs.
    pub fn append_state(&mut self, value: S, hooks: StateHooks<S, A>) -> bool {
        if self.position(value).is_some() {
            return false;
        }
        self.states.push(StateEntry { value, hooks });
        if self.current.is_none() {
            self.current = Some(self.states.len() - 1);
        }
        true
    }

    /// Current state, or `None` while the registry is empty.
    pub fn current_state(&self) -> Option<S> {
        self.current
            .and_then(|idx| self.states.get(idx))
            .map(|entry| entry.value)
    }

    pub fn contains(&self, value: S) -> bool {
        self.position(value).is_some()
    }

    /// Registration index of `value`.
    pub fn ordinal(&self, value: S) -> Option<usize> {
        self.position(value)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Single-step transition to `target`.
    ///
    /// Runs the current state's guard, then its notify, then commits. A
    /// vetoed move leaves the machine untouched.
    pub fn set_state(&mut self, target: S, arg: &A) -> Result<(), TransitionError> {
        let target_idx = self
            .position(target)
            .ok_or(TransitionError::InvalidState)?;
        let current_idx = self.current.ok_or(TransitionError::InvalidState)?;
        if current_idx == target_idx {
            return Err(TransitionError::InvalidState);
        }
        let entry = self
            .states
            .get(current_idx)
            .ok_or(TransitionError::InvalidState)?;

        let from = entry.value;
        if let Some(guard) = &entry.hooks.guard {
            if !guard(from, target, arg) {
                return Err(TransitionError::TransitionFailed);
            }
        }
        if let Some(notify) = &entry.hooks.notify {
            notify(from, target, arg);
        }

        self.current = Some(target_idx);
        Ok(())
    }

    /// Multi-step transition through every state between current and
    /// `target` (by ordinal), in direction of travel.
    ///
    /// Stops at the first failing step and returns its error; the machine
    /// stays at the last state successfully entered.
    pub fn travel_to_state(&mut self, target: S, arg: &A) -> Result<(), TransitionError> {
        let start = self.current.ok_or(TransitionError::InvalidState)?;
        let end = self
            .position(target)
            .ok_or(TransitionError::InvalidState)?;
        if start == end {
            return Err(TransitionError::InvalidState);
        }

        let path: Vec<S> = if start < end {
            self.states[start + 1..=end]
                .iter()
                .map(|entry| entry.value)
                .collect()
        } else {
            self.states[end..start]
                .iter()
                .rev()
                .map(|entry| entry.value)
                .collect()
        };

        for step in path {
            self.set_state(step, arg)?;
        }
        Ok(())
    }

    fn position(&self, value: S) -> Option<usize> {
        self.states.iter().position(|entry| entry.value == value)
    }
}

impl<S: Copy + Eq + fmt::Debug, A> fmt::Debug for StateMachine<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let states: Vec<S> = self.states.iter().map(|entry| entry.value).collect();
        f.debug_struct("StateMachine")
            .field("states", &states)
            .field("current", &self.current_state())
            .finish()
    }
}
