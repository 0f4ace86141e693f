//! Push event routing: cache updates and listener fan-out for unsolicited
//! controller notifications.
//!
//! The transport hands events to an [`EventSink`](crate::EventSink) from its
//! own thread. They are queued in order and consumed by a single router task,
//! which updates exactly the cache fields an event names and then calls every
//! registered listener once. Listeners run as their own tasks, so a slow one
//! never holds up the next event.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use futures::StreamExt;
use futures::channel::mpsc::UnboundedReceiver;
use futures::future::{AbortHandle, Abortable};
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use uuid::Uuid;

use crate::cache::StateCache;
use crate::connection::ConnectionManager;
use crate::controller::{ControllerFacade, dedup_sorted};
use crate::runtime::{self, Instant};
use crate::status::ZoneState;
use crate::transport::{PushEvent, PushEventKind, RawRunState};

/// Callback invoked once per push event.
pub type Listener = Arc<dyn Fn(&Notification) + Send + Sync + 'static>;

/// Handle returned by [`Client::register_listener`](crate::Client::register_listener).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListenerId(Uuid);

impl ListenerId {
    fn new() -> Self {
        ListenerId(Uuid::new_v4())
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a listener is told about a dispatched event.
///
/// The new values are already in the cache when a listener runs; read them
/// with [`Client::get_cached_state`](crate::Client::get_cached_state).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: PushEventKind,
    /// Zones whose state changed; empty for controller-wide events.
    pub zones: Vec<String>,
}

/// Diagnostics for the push router.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushDiagnostics {
    pub running: bool,
    pub listener_count: usize,
    pub events_dispatched: BTreeMap<String, u64>,
    pub time_since_last_push: Option<f64>,
    pub last_error: Option<String>,
}

struct RouterState {
    cache: Arc<StateCache>,
    /// Reads back zone states that arrived without a payload.
    poll: ControllerFacade,
    /// Every session that must be recycled after a push channel error.
    sessions: Vec<Arc<ConnectionManager>>,
    listeners: RwLock<HashMap<ListenerId, Listener>>,
    running: AtomicBool,
    dispatched: Mutex<HashMap<PushEventKind, u64>>,
    last_push: Mutex<Option<Instant>>,
    last_error: Mutex<Option<String>>,
}

/// Consumes the push queue on a background task until stopped.
pub(crate) struct PushRouter {
    state: Arc<RouterState>,
    abort: AbortHandle,
}

impl PushRouter {
    /// Start routing events from `events`. Must be called inside the runtime.
    pub(crate) fn start(
        cache: Arc<StateCache>,
        poll: ControllerFacade,
        sessions: Vec<Arc<ConnectionManager>>,
        mut events: UnboundedReceiver<PushEvent>,
    ) -> Self {
        let state = Arc::new(RouterState {
            cache,
            poll,
            sessions,
            listeners: RwLock::new(HashMap::new()),
            running: AtomicBool::new(true),
            dispatched: Mutex::new(HashMap::new()),
            last_push: Mutex::new(None),
            last_error: Mutex::new(None),
        });

        let (abort, registration) = AbortHandle::new_pair();
        let router = Arc::clone(&state);
        let routing = Abortable::new(
            async move {
                while let Some(event) = events.next().await {
                    dispatch(&router, event);
                }
                debug!("Push queue closed");
            },
            registration,
        );
        let finished = Arc::clone(&state);
        runtime::spawn_detached(async move {
            let _ = routing.await;
            finished.running.store(false, Ordering::SeqCst);
        });

        PushRouter { state, abort }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    /// Stop consuming events. Listeners are not called after this returns.
    pub(crate) fn stop(&self) {
        self.state.running.store(false, Ordering::SeqCst);
        self.abort.abort();
    }

    pub(crate) fn register(&self, listener: Listener) -> ListenerId {
        let id = ListenerId::new();
        self.state
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, listener);
        id
    }

    pub(crate) fn unregister(&self, id: ListenerId) -> bool {
        self.state
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    pub(crate) fn diagnostics(&self) -> PushDiagnostics {
        let dispatched = lock(&self.state.dispatched);
        PushDiagnostics {
            running: self.is_running(),
            listener_count: self
                .state
                .listeners
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
            events_dispatched: PushEventKind::iter()
                .map(|kind| (kind.to_string(), dispatched.get(&kind).copied().unwrap_or(0)))
                .collect(),
            time_since_last_push: lock(&self.state.last_push).map(|t| t.elapsed().as_secs_f64()),
            last_error: lock(&self.state.last_error).clone(),
        }
    }
}

impl Drop for PushRouter {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Apply one event to the cache, then notify. Never waits on a session lock.
fn dispatch(state: &Arc<RouterState>, event: PushEvent) {
    let kind = event.kind();
    *lock(&state.last_push) = Some(Instant::now());
    *lock(&state.dispatched).entry(kind).or_insert(0) += 1;

    let cache = &state.cache;
    let zones = match event {
        PushEvent::Opened => {
            debug!("[PUSH UPDATE] push channel opened");
            Vec::new()
        }
        PushEvent::Closed => {
            debug!("[PUSH UPDATE] push channel closed");
            Vec::new()
        }
        PushEvent::Error(reason) => {
            warn!("[PUSH UPDATE] push channel error: {}", reason);
            *lock(&state.last_error) = Some(reason);
            schedule_reconnect(state);
            Vec::new()
        }
        PushEvent::NameChanged(name) => {
            debug!("[PUSH UPDATE] name: {}", name);
            cache.update_info(|info| info.name = name);
            Vec::new()
        }
        PushEvent::HostnameChanged(hostname) => {
            debug!("[PUSH UPDATE] hostname: {}", hostname);
            cache.update_info(|info| info.hostname = hostname);
            Vec::new()
        }
        PushEvent::FirmwareChanged(version) => {
            debug!("[PUSH UPDATE] firmware version: {}", version);
            cache.update_info(|info| info.firmware_version = version);
            Vec::new()
        }
        PushEvent::ZonesChanged(zones) => {
            debug!("[PUSH UPDATE] zones: {:?}", zones);
            cache.retain_states(&zones);
            cache.set_zones(zones);
            Vec::new()
        }
        PushEvent::PatternsChanged(patterns) => {
            debug!("[PUSH UPDATE] {} patterns", patterns.len());
            cache.set_patterns(dedup_sorted(patterns));
            Vec::new()
        }
        PushEvent::ZoneStatesChanged(states) => {
            let zones: Vec<String> = states.keys().cloned().collect();
            debug!("[PUSH UPDATE] zone states: {:?}", zones);
            let missing = apply_zone_states(cache, states);
            if !missing.is_empty() {
                schedule_read(state, kind, zones, missing);
                return;
            }
            zones
        }
    };

    notify(state, Notification { kind, zones });
}

/// Store the states that came with the event; returns the zones that did not.
fn apply_zone_states(
    cache: &StateCache,
    states: HashMap<String, Option<RawRunState>>,
) -> Vec<String> {
    let mut present = HashMap::new();
    let mut missing = Vec::new();
    for (zone, raw) in states {
        match raw {
            Some(raw) => {
                let classified = ZoneState::classify(&zone, &raw);
                present.insert(zone, classified);
            }
            None => missing.push(zone),
        }
    }
    cache.put_states(present);
    missing
}

/// Read back zones whose new state was not included, then notify.
fn schedule_read(
    state: &Arc<RouterState>,
    kind: PushEventKind,
    zones: Vec<String>,
    missing: Vec<String>,
) {
    let state = Arc::clone(state);
    runtime::spawn_detached(async move {
        match state.poll.get_zone_states(&missing).await {
            Ok(states) => state.cache.put_states(states),
            Err(e) => {
                warn!("Failed to read back pushed zone states: {}", e);
                *lock(&state.last_error) = Some(e.to_string());
            }
        }
        notify(&state, Notification { kind, zones });
    });
}

/// Flag every session and reconnect each once in the background.
fn schedule_reconnect(state: &Arc<RouterState>) {
    for session in &state.sessions {
        session.mark_reconnect_pending();
        let session = Arc::clone(session);
        let state = Arc::clone(state);
        runtime::spawn_detached(async move {
            if let Err(e) = session.reconnect().await {
                error!("Reconnect after push error failed: {}", e);
                *lock(&state.last_error) = Some(e.to_string());
            }
        });
    }
}

fn notify(state: &Arc<RouterState>, notification: Notification) {
    if !state.running.load(Ordering::SeqCst) {
        return;
    }
    let listeners: Vec<Listener> = state
        .listeners
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .values()
        .cloned()
        .collect();
    for listener in listeners {
        let notification = notification.clone();
        let state = Arc::clone(state);
        runtime::spawn_detached(async move {
            if state.running.load(Ordering::SeqCst) {
                listener(&notification);
            }
        });
    }
}
