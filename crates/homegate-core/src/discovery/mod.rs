// ── Discovery orchestration ──
//
// Session bookkeeping plus the `DeviceService` operations that start,
// feed, configure and stop discovery sessions. Every operation here runs
// with the orchestrator lock held for its whole duration, events
// included. Driver callbacks are synchronous and run under that lock.

mod filter;
mod session;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::Readiness;
use crate::driver::{Commissioner, CommissioningInfo, DeviceDriver, DriverError};
use crate::error::CoreError;
use crate::event::{DiscoveryType, EventKind};
use crate::model::{Device, DeviceFoundDetails};
use crate::service::DeviceService;

pub use filter::DiscoveryFilter;
pub use session::SessionState;

use filter::FilterSet;
use session::{DiscoverySession, SessionKey, TransitionCause};

// ── Session set ──────────────────────────────────────────────────────

/// Everything guarded by the orchestrator lock.
#[derive(Default)]
pub(crate) struct DiscoveryState {
    sessions: BTreeMap<SessionKey, DiscoverySession>,
    next_session_id: u64,
}

impl DiscoveryState {
    fn allocate_id(&mut self) -> u64 {
        self.next_session_id += 1;
        self.next_session_id
    }

    /// Device classes with a live session. Commissioning targets excluded.
    pub(crate) fn active_classes(&self) -> BTreeSet<String> {
        self.sessions
            .keys()
            .filter_map(|key| match key {
                SessionKey::DeviceClass(class) => Some(class.clone()),
                SessionKey::Commissioning(_) => None,
            })
            .collect()
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.sessions.is_empty()
    }

    pub(crate) fn any_discovery(&self) -> bool {
        self.sessions.values().any(|s| !s.recovery)
    }

    pub(crate) fn any_recovery(&self) -> bool {
        self.sessions.values().any(|s| s.recovery)
    }

    /// Timeout of the most recently started live session, 0 when idle.
    pub(crate) fn timeout_secs(&self) -> u16 {
        self.sessions
            .values()
            .max_by_key(|session| session.id)
            .map_or(0, |session| session.timeout_secs)
    }

    /// Session a candidate belongs to: its device class first, then a
    /// commissioning session for its subsystem.
    fn key_for_candidate(&self, details: &DeviceFoundDetails) -> Option<SessionKey> {
        let by_class = SessionKey::DeviceClass(details.device_class.clone());
        if self.sessions.contains_key(&by_class) {
            return Some(by_class);
        }
        details
            .subsystem
            .as_ref()
            .map(|subsystem| SessionKey::Commissioning(subsystem.clone()))
            .filter(|key| self.sessions.contains_key(key))
    }

    fn key_for_label(&self, label: &str) -> Option<SessionKey> {
        [
            SessionKey::DeviceClass(label.to_owned()),
            SessionKey::Commissioning(label.to_owned()),
        ]
        .into_iter()
        .find(|key| self.sessions.contains_key(key))
    }
}

// ── Orchestrator operations ──────────────────────────────────────────

impl DeviceService {
    /// Start discovery (or recovery) for each class in `device_classes`.
    ///
    /// Classes that already have a session are skipped. Returns `true`
    /// when at least one new session started, in which case exactly one
    /// `DiscoveryStarted`/`RecoveryStarted` event lists every class being
    /// discovered.
    pub async fn discover_start(
        &self,
        device_classes: &[&str],
        filters: Option<Vec<DiscoveryFilter>>,
        timeout_secs: u16,
        recovery: bool,
    ) -> Result<bool, CoreError> {
        if device_classes.is_empty() {
            return Err(CoreError::invalid_argument("no device classes given"));
        }
        if device_classes.iter().any(|class| class.is_empty()) {
            return Err(CoreError::invalid_argument("empty device class"));
        }
        let filters = FilterSet::compile(filters.as_deref().unwrap_or_default())?;

        let mut state = self.inner.discovery.lock().await;
        let readiness = self.readiness();

        let mut seen = BTreeSet::new();
        let mut started = Vec::new();
        for &class in device_classes {
            if !seen.insert(class) {
                continue;
            }
            let key = SessionKey::DeviceClass(class.to_owned());
            if state.sessions.contains_key(&key) {
                warn!(device_class = class, "discovery already active for class, skipping");
                continue;
            }

            let drivers = self.start_drivers(class, recovery, readiness);
            if drivers.is_empty() {
                warn!(device_class = class, recovery, "no driver started for class");
                continue;
            }

            let id = state.allocate_id();
            let mut session =
                DiscoverySession::new(id, key.clone(), recovery, timeout_secs, filters.clone(), drivers);
            session.transition(SessionState::Discovering, TransitionCause::Start)?;
            if timeout_secs > 0 {
                self.schedule_timeout(&session);
            }
            info!(
                device_class = class,
                session_id = id,
                recovery,
                timeout_secs,
                drivers = session.drivers.len(),
                "discovery session started"
            );
            state.sessions.insert(key, session);
            started.push(class);
        }

        if started.is_empty() {
            return Ok(false);
        }

        let device_classes: Vec<String> = state.active_classes().into_iter().collect();
        self.inner.events.emit(if recovery {
            EventKind::RecoveryStarted {
                device_classes,
                timeout: timeout_secs,
            }
        } else {
            EventKind::DiscoveryStarted {
                device_classes,
                timeout: timeout_secs,
            }
        });
        Ok(true)
    }

    /// Stop the named sessions, or every session when `device_classes` is
    /// `None`. Names without a session are ignored.
    pub async fn discover_stop(&self, device_classes: Option<&[&str]>) -> Result<bool, CoreError> {
        let mut state = self.inner.discovery.lock().await;
        let keys: BTreeSet<SessionKey> = match device_classes {
            None => state.sessions.keys().cloned().collect(),
            Some(labels) => labels
                .iter()
                .filter_map(|label| state.key_for_label(label))
                .collect(),
        };
        for key in &keys {
            self.stop_session(&mut state, key, TransitionCause::Stop);
        }
        Ok(true)
    }

    /// Report a candidate found by a subsystem.
    ///
    /// Returns `true` if the candidate passed the session's filters and is
    /// now pending configuration, `false` if it was rejected. A session
    /// still handling another candidate emits `DeviceRejected` for this
    /// one and returns `SessionBusy`.
    pub async fn device_found(&self, details: &DeviceFoundDetails) -> Result<bool, CoreError> {
        if details.uuid.is_empty() {
            return Err(CoreError::invalid_argument("candidate uuid is empty"));
        }
        if details.device_class.is_empty() {
            return Err(CoreError::invalid_argument("candidate device class is empty"));
        }

        let mut state = self.inner.discovery.lock().await;
        let key = state
            .key_for_candidate(details)
            .ok_or_else(|| CoreError::not_found("discovery session", &details.device_class))?;
        let Some(session) = state.sessions.get_mut(&key) else {
            return Err(CoreError::not_found("discovery session", key.label()));
        };
        let session_discovery_type = session.discovery_type();
        if session.state() != Some(SessionState::Discovering) {
            warn!(
                uuid = %details.uuid,
                session = %key,
                state = ?session.state(),
                "session busy, rejecting candidate"
            );
            self.inner.events.emit(EventKind::DeviceRejected {
                details: details.clone(),
                session_discovery_type,
            });
            return Err(CoreError::SessionBusy {
                session: key.to_string(),
            });
        }

        if session.filters.matches(&details.initial_values()) {
            session.transition(SessionState::Found, TransitionCause::Candidate)?;
            session.pending = Some(details.clone());
            debug!(uuid = %details.uuid, session = %key, "candidate accepted");
            self.inner.events.emit(EventKind::DeviceDiscovered {
                details: details.clone(),
                session_discovery_type,
            });
            return Ok(true);
        }

        warn!(uuid = %details.uuid, session = %key, "candidate rejected by discovery filters");
        session.transition(SessionState::Idle, TransitionCause::Candidate)?;
        self.inner.events.emit(EventKind::DeviceRejected {
            details: details.clone(),
            session_discovery_type,
        });
        session.transition(SessionState::Discovering, TransitionCause::Candidate)?;
        Ok(false)
    }

    /// Configure the pending candidate and add it to the store.
    ///
    /// The session returns to Discovering whatever the outcome.
    pub async fn configure_device(&self, details: &DeviceFoundDetails) -> Result<Device, CoreError> {
        let mut state = self.inner.discovery.lock().await;
        let pending_missing = || CoreError::not_found("pending candidate", &details.uuid);

        let key = state.key_for_candidate(details).ok_or_else(pending_missing)?;
        let session = state.sessions.get_mut(&key).ok_or_else(pending_missing)?;
        let is_pending = session.state() == Some(SessionState::Found)
            && session
                .pending
                .as_ref()
                .is_some_and(|pending| pending.uuid == details.uuid);
        if !is_pending {
            return Err(pending_missing());
        }
        session.pending = None;

        let session_discovery_type = session.discovery_type();
        let uuid = details.uuid.clone();
        let device_class = details.device_class.clone();

        session.transition(SessionState::Configuring, TransitionCause::Configure)?;
        self.inner.events.emit(EventKind::DeviceConfigurationStarted {
            uuid: uuid.clone(),
            device_class: device_class.clone(),
            session_discovery_type,
        });

        match self.build_device(details) {
            Ok(device) => {
                session.transition(SessionState::Added, TransitionCause::Configure)?;
                self.inner.store.insert(device.clone());
                self.inner.events.emit(EventKind::DeviceConfigurationCompleted {
                    uuid: uuid.clone(),
                    device_class: device_class.clone(),
                    session_discovery_type,
                });
                let added = if session.recovery {
                    EventKind::DeviceRecovered {
                        uuid,
                        uri: device.uri.clone(),
                        device_class,
                        device_class_version: device.device_class_version,
                    }
                } else {
                    EventKind::DeviceAdded {
                        uuid,
                        uri: device.uri.clone(),
                        device_class,
                        device_class_version: device.device_class_version,
                    }
                };
                self.inner.events.emit(added);
                session.transition(SessionState::Discovering, TransitionCause::Configure)?;
                info!(uuid = %device.uuid, driver = %device.managing_driver, "device added");
                Ok(device)
            }
            Err(reason) => {
                warn!(uuid = %uuid, reason = %reason, "device configuration failed");
                session.transition(SessionState::Failed, TransitionCause::Configure)?;
                self.inner.events.emit(EventKind::DeviceConfigurationFailed {
                    uuid: uuid.clone(),
                    device_class,
                    session_discovery_type,
                });
                session.transition(SessionState::Discovering, TransitionCause::Configure)?;
                Err(CoreError::ConfigurationFailed { uuid, reason })
            }
        }
    }

    pub async fn is_discovery_active(&self) -> bool {
        self.inner.discovery.lock().await.any_discovery()
    }

    pub async fn is_in_recovery_mode(&self) -> bool {
        self.inner.discovery.lock().await.any_recovery()
    }

    /// State of the session for a device class or commissioning subsystem.
    pub async fn session_state(&self, label: &str) -> Option<SessionState> {
        let state = self.inner.discovery.lock().await;
        let key = state.key_for_label(label)?;
        state.sessions.get(&key).and_then(DiscoverySession::state)
    }

    // ── Commissioning ────────────────────────────────────────────────

    /// Commission a single device from its setup payload (QR or manual
    /// code). Returns `false` if a commissioning session is already open.
    pub async fn commission_device(&self, setup_payload: &str, timeout_secs: u16) -> Result<bool, CoreError> {
        if setup_payload.is_empty() {
            return Err(CoreError::invalid_argument("setup payload is empty"));
        }
        let timeout = Duration::from_secs(u64::from(timeout_secs));
        let started = self
            .start_commissioning(timeout_secs, |commissioner| {
                commissioner.commission(setup_payload, timeout)
            })
            .await?;
        Ok(started.is_some())
    }

    /// Pair an already commissioned node. Returns `false` when the
    /// gateway is not ready for pairing or a session is already open.
    pub async fn add_matter_device(&self, node_id: u64, timeout_secs: u16) -> Result<bool, CoreError> {
        if !self.readiness().pairing_ready() {
            info!(node_id, "not ready for pairing, ignoring pair request");
            return Ok(false);
        }
        let timeout = Duration::from_secs(u64::from(timeout_secs));
        let started = self
            .start_commissioning(timeout_secs, |commissioner| commissioner.pair(node_id, timeout))
            .await?;
        Ok(started.is_some())
    }

    /// Open a commissioning window on the gateway (`None`) or on a paired
    /// node. A zero timeout uses the configured default window.
    pub async fn open_commissioning_window(
        &self,
        node_id: Option<&str>,
        timeout_secs: u16,
    ) -> Result<CommissioningInfo, CoreError> {
        if node_id.is_some_and(str::is_empty) {
            return Err(CoreError::invalid_argument("node id is empty"));
        }
        let window = if timeout_secs == 0 {
            self.inner.config.default_commissioning_window
        } else {
            Duration::from_secs(u64::from(timeout_secs))
        };
        let session_secs = u16::try_from(window.as_secs()).unwrap_or(u16::MAX);

        self.start_commissioning(session_secs, |commissioner| {
            commissioner.open_commissioning_window(node_id, window)
        })
        .await?
        .ok_or_else(|| CoreError::SessionBusy {
            session: self.commissioning_subsystem().unwrap_or_default(),
        })
    }

    // ── Internals ────────────────────────────────────────────────────

    fn commissioning_subsystem(&self) -> Option<String> {
        self.inner
            .registry
            .commissioner()
            .map(|commissioner| commissioner.subsystem().to_owned())
    }

    /// Open a single-target session keyed by the commissioner's subsystem
    /// and run `begin` against the commissioner. `None` when a session for
    /// that subsystem already exists.
    async fn start_commissioning<T>(
        &self,
        timeout_secs: u16,
        begin: impl FnOnce(&dyn Commissioner) -> Result<T, DriverError> + Send,
    ) -> Result<Option<T>, CoreError> {
        let commissioner = self.inner.registry.commissioner().cloned().ok_or_else(|| {
            CoreError::Unsupported {
                operation: "commissioning".into(),
                required: "commissioner".into(),
            }
        })?;
        let subsystem = commissioner.subsystem().to_owned();

        let mut state = self.inner.discovery.lock().await;
        let key = SessionKey::Commissioning(subsystem.clone());
        if state.sessions.contains_key(&key) {
            warn!(subsystem = %subsystem, "commissioning already in progress");
            return Ok(None);
        }

        let output = begin(commissioner.as_ref()).map_err(|err| CoreError::driver(&subsystem, &err))?;

        let id = state.allocate_id();
        let drivers = self.inner.registry.drivers_for_subsystem(&subsystem);
        let mut session = DiscoverySession::new(
            id,
            key.clone(),
            false,
            timeout_secs,
            FilterSet::default(),
            drivers,
        );
        session.transition(SessionState::Discovering, TransitionCause::Start)?;
        if timeout_secs > 0 {
            self.schedule_timeout(&session);
        }
        state.sessions.insert(key, session);
        info!(subsystem = %subsystem, session_id = id, timeout_secs, "commissioning session started");

        self.inner.events.emit(EventKind::DiscoveryStarted {
            device_classes: vec![subsystem],
            timeout: timeout_secs,
        });
        Ok(Some(output))
    }

    /// Start every capable driver for `class`; keep the ones that accepted.
    fn start_drivers(&self, class: &str, recovery: bool, readiness: Readiness) -> Vec<Arc<dyn DeviceDriver>> {
        self.inner
            .registry
            .drivers_for_class(class)
            .into_iter()
            .filter(|driver| readiness.ready_for_device_operation || driver.never_reject())
            .filter(|driver| !recovery || driver.supports_recovery())
            .filter(|driver| {
                let result = if recovery {
                    driver.recover_devices(class)
                } else {
                    driver.discover_devices(class)
                };
                match result {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(driver = driver.name(), device_class = class, error = %err, "driver failed to start");
                        false
                    }
                }
            })
            .collect()
    }

    fn schedule_timeout(&self, session: &DiscoverySession) {
        let service = self.clone();
        let key = session.key.clone();
        let id = session.id;
        let token = session.cancel.clone();
        let period = Duration::from_secs(u64::from(session.timeout_secs));

        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => {}
                () = tokio::time::sleep(period) => service.expire_session(&key, id).await,
            }
        });
    }

    async fn expire_session(&self, key: &SessionKey, id: u64) {
        let mut state = self.inner.discovery.lock().await;
        if state.sessions.get(key).is_some_and(|session| session.id == id) {
            info!(session = %key, session_id = id, "discovery session timed out");
            self.stop_session(&mut state, key, TransitionCause::Timeout);
        }
    }

    /// The one stop path, shared by explicit stop and timeout.
    fn stop_session(&self, state: &mut DiscoveryState, key: &SessionKey, cause: TransitionCause) {
        let Some(mut session) = state.sessions.remove(key) else {
            return;
        };
        session.cancel.cancel();
        if let Err(err) = session.transition(SessionState::Stopped, cause) {
            warn!(session = %key, error = %err, "session did not reach stopped");
        }

        match key {
            SessionKey::DeviceClass(class) => {
                for driver in &session.drivers {
                    driver.stop_discovering(class);
                }
            }
            SessionKey::Commissioning(_) => {
                if let Some(commissioner) = self.inner.registry.commissioner() {
                    commissioner.stop_commissioning();
                }
            }
        }

        info!(session = %key, session_id = session.id, ?cause, "discovery session stopped");
        let device_class = key.label().to_owned();
        self.inner.events.emit(match session.discovery_type() {
            DiscoveryType::Recovery => EventKind::RecoveryStopped { device_class },
            DiscoveryType::Discovery | DiscoveryType::None => EventKind::DiscoveryStopped { device_class },
        });
    }

    /// Build, driver-configure and validate a device from candidate details.
    fn build_device(&self, details: &DeviceFoundDetails) -> Result<Device, String> {
        let driver = self
            .inner
            .registry
            .driver(&details.driver)
            .ok_or_else(|| format!("driver {} is not registered", details.driver))?;
        let mut device = Device::from_found(details);
        driver
            .configure_device(&mut device, details)
            .map_err(|err| err.to_string())?;
        device.validate().map_err(|err| err.to_string())?;
        Ok(device)
    }
}
