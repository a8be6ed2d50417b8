// ── Discovery session ──
//
// One active search: its key, filters, started drivers, timeout token,
// pending candidate and state machine. States are registered in
// lifecycle order so travel follows the natural progression.

use std::fmt;
use std::sync::Arc;

use strum::IntoEnumIterator;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::driver::DeviceDriver;
use crate::error::CoreError;
use crate::event::DiscoveryType;
use crate::fsm::{StateHooks, StateMachine, TransitionError};
use crate::model::DeviceFoundDetails;

use super::filter::FilterSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum SessionState {
    Idle,
    Discovering,
    Found,
    Configuring,
    Added,
    Failed,
    Stopped,
}

/// What drove a transition; handed to the exit hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransitionCause {
    Start,
    Candidate,
    Configure,
    Stop,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum SessionKey {
    DeviceClass(String),
    /// Single-target commissioning, keyed by subsystem name.
    Commissioning(String),
}

impl SessionKey {
    pub(crate) fn label(&self) -> &str {
        match self {
            Self::DeviceClass(name) | Self::Commissioning(name) => name,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub(crate) type SessionFsm = StateMachine<SessionState, TransitionCause>;
type SessionHooks = StateHooks<SessionState, TransitionCause>;

pub(crate) struct DiscoverySession {
    pub(crate) id: u64,
    pub(crate) key: SessionKey,
    pub(crate) recovery: bool,
    pub(crate) timeout_secs: u16,
    pub(crate) filters: FilterSet,
    pub(crate) drivers: Vec<Arc<dyn DeviceDriver>>,
    pub(crate) cancel: CancellationToken,
    pub(crate) pending: Option<DeviceFoundDetails>,
    fsm: SessionFsm,
}

impl DiscoverySession {
    pub(crate) fn new(
        id: u64,
        key: SessionKey,
        recovery: bool,
        timeout_secs: u16,
        filters: FilterSet,
        drivers: Vec<Arc<dyn DeviceDriver>>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let fsm = session_fsm(&cancel);
        Self {
            id,
            key,
            recovery,
            timeout_secs,
            filters,
            drivers,
            cancel,
            pending: None,
            fsm,
        }
    }

    pub(crate) fn discovery_type(&self) -> DiscoveryType {
        if self.recovery {
            DiscoveryType::Recovery
        } else {
            DiscoveryType::Discovery
        }
    }

    pub(crate) fn state(&self) -> Option<SessionState> {
        self.fsm.current_state()
    }

    pub(crate) fn transition(
        &mut self,
        target: SessionState,
        cause: TransitionCause,
    ) -> Result<(), CoreError> {
        let from = self.state();
        self.fsm.set_state(target, &cause).map_err(|err| {
            let session = self.key.to_string();
            match err {
                TransitionError::InvalidState => CoreError::InvalidState {
                    session,
                    state: target.to_string(),
                },
                TransitionError::TransitionFailed => CoreError::TransitionFailed {
                    session,
                    from: from.map(|s| s.to_string()).unwrap_or_default(),
                    to: target.to_string(),
                },
            }
        })?;
        debug!(session = %self.key, id = self.id, ?from, to = %target, ?cause, "session transition");
        Ok(())
    }
}

/// Exit hooks per state. Leaving Discovering for Stopped cancels the
/// timeout task; Stopped is terminal.
fn session_fsm(cancel: &CancellationToken) -> SessionFsm {
    let mut fsm = SessionFsm::new();
    for state in SessionState::iter() {
        let hooks = match state {
            SessionState::Discovering => {
                let token = cancel.clone();
                SessionHooks::none().with_notify(move |_, to, _| {
                    if to == SessionState::Stopped {
                        token.cancel();
                    }
                })
            }
            SessionState::Found => SessionHooks::none().with_guard(|_, to, _| {
                matches!(
                    to,
                    SessionState::Configuring | SessionState::Discovering | SessionState::Stopped
                )
            }),
            SessionState::Configuring => SessionHooks::none().with_guard(|_, to, _| {
                matches!(
                    to,
                    SessionState::Added | SessionState::Failed | SessionState::Stopped
                )
            }),
            SessionState::Stopped => SessionHooks::none().with_guard(|_, _, _| false),
            SessionState::Idle | SessionState::Added | SessionState::Failed => SessionHooks::none(),
        };
        fsm.append_state(state, hooks);
    }
    fsm
}
