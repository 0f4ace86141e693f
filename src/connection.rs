//! Session lifecycle and serialization for one transport handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::ClientConfig;
use crate::controller::Operation;
use crate::errors::{Error, TransportError};
use crate::runtime::{self, TimedOut};
use crate::transport::{Transport, TransportResult};
use crate::types::ControllerAddress;

type Result<T> = std::result::Result<T, Error>;

/// Connection status of a session, as the manager last observed it.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
    /// Connected, but a failure was seen; the next call tears the session down first.
    ReconnectPending,
}

/// Which half of the session lifecycle failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum LinkAction {
    Connect,
    Disconnect,
}

#[derive(Debug, Clone, Copy, Default)]
struct Link {
    state: ConnectionState,
    reconnect_pending: bool,
}

/// Owns one [`Transport`] and serializes every interaction with it.
///
/// Two locks guard the handle. The async `io` lock orders callers: whoever holds
/// it owns the session until its call returns, connect and disconnect included.
/// The handle itself sits behind a std mutex that the blocking call holds for its
/// whole duration, so a call abandoned by an outer timeout still keeps the next
/// one off the wire until it returns.
///
/// Any failure sets the reconnect-pending flag. The next call then disconnects
/// and reconnects before touching the device, even if the handle still claims
/// to be connected.
pub struct ConnectionManager {
    address: ControllerAddress,
    connect_timeout: Duration,
    disconnect_timeout: Duration,
    io: runtime::Mutex<()>,
    link: Mutex<Link>,
    cycling: AtomicBool,
    transport: Arc<Mutex<Box<dyn Transport>>>,
}

impl ConnectionManager {
    pub fn new(
        address: ControllerAddress,
        transport: Box<dyn Transport>,
        config: &ClientConfig,
    ) -> Self {
        ConnectionManager {
            address,
            connect_timeout: config.connect_timeout(),
            disconnect_timeout: config.disconnect_timeout(),
            io: runtime::Mutex::new(()),
            link: Mutex::new(Link::default()),
            cycling: AtomicBool::new(false),
            transport: Arc::new(Mutex::new(transport)),
        }
    }

    pub fn address(&self) -> &ControllerAddress {
        &self.address
    }

    pub fn state(&self) -> ConnectionState {
        self.link().state
    }

    pub fn reconnect_pending(&self) -> bool {
        self.link().reconnect_pending
    }

    /// True while a connect or disconnect is in flight.
    pub fn is_connecting(&self) -> bool {
        self.cycling.load(Ordering::SeqCst)
    }

    /// Make sure the session is usable, reconnecting if it is down or flagged.
    pub async fn ensure_connected(&self) -> Result<()> {
        let _io = self.io.lock().await;
        self.ensure_connected_locked().await
    }

    /// Flag the session as unreliable without waiting for the I/O lock.
    pub fn mark_reconnect_pending(&self) {
        let mut link = self.link_mut();
        link.reconnect_pending = true;
        if link.state == ConnectionState::Connected {
            link.state = ConnectionState::ReconnectPending;
        }
    }

    /// Flag the session and immediately run a full reconnect cycle.
    pub async fn reconnect(&self) -> Result<()> {
        let _io = self.io.lock().await;
        self.mark_reconnect_pending();
        self.ensure_connected_locked().await
    }

    /// Close the session.
    pub async fn disconnect(&self) -> Result<()> {
        let _io = self.io.lock().await;
        if !self.handle_connected().await {
            self.set_link(ConnectionState::Disconnected, self.reconnect_pending());
            return Ok(());
        }

        info!(
            "Disconnecting from the JellyFish Lighting controller at {}",
            self.address
        );
        self.cycling.store(true, Ordering::SeqCst);
        let result = self
            .timed(self.disconnect_timeout, |t, limit| t.disconnect(limit))
            .await;
        self.cycling.store(false, Ordering::SeqCst);

        match result {
            Ok(()) => {
                self.set_link(ConnectionState::Disconnected, false);
                Ok(())
            }
            Err(source) => {
                warn!("Failed to disconnect from {}: {}", self.address, source);
                self.set_link(ConnectionState::Disconnected, true);
                Err(Error::connection(&self.address, LinkAction::Disconnect, source))
            }
        }
    }

    /// Run one device call: connect if needed, then call the handle on the
    /// blocking pool. A failure flags the session and is reported with the
    /// operation and zones it was for.
    pub(crate) async fn run<T, F>(&self, operation: Operation, zones: &[String], call: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Transport) -> TransportResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let _io = self.io.lock().await;
        self.ensure_connected_locked().await?;

        debug!("{} on {} for zones {:?}", operation, self.address, zones);
        match self.blocking(call).await {
            Ok(value) => Ok(value),
            Err(source) => {
                warn!(
                    "{} failed on {}: {}; reconnecting before the next call",
                    operation, self.address, source
                );
                self.mark_reconnect_pending();
                Err(Error::command(&self.address, operation, zones, source))
            }
        }
    }

    async fn ensure_connected_locked(&self) -> Result<()> {
        let pending = self.reconnect_pending();
        let connected = self.handle_connected().await;
        if connected && !pending {
            self.set_link(ConnectionState::Connected, false);
            return Ok(());
        }

        self.cycling.store(true, Ordering::SeqCst);
        let result = self.cycle(connected).await;
        self.cycling.store(false, Ordering::SeqCst);

        match result {
            Ok(()) => {
                info!(
                    "Connected to the JellyFish Lighting controller at {}",
                    self.address
                );
                self.set_link(ConnectionState::Connected, false);
                Ok(())
            }
            Err(source) => {
                warn!("Failed to connect to {}: {}", self.address, source);
                self.set_link(ConnectionState::Disconnected, true);
                Err(Error::connection(&self.address, LinkAction::Connect, source))
            }
        }
    }

    /// Tear down a stale session if there is one, then connect.
    async fn cycle(&self, teardown: bool) -> TransportResult<()> {
        if teardown {
            info!(
                "Forcing reconnect to the JellyFish Lighting controller at {}",
                self.address
            );
            if let Err(e) = self
                .timed(self.disconnect_timeout, |t, limit| t.disconnect(limit))
                .await
            {
                warn!(
                    "Forced disconnect from {} failed: {}; connecting anyway",
                    self.address, e
                );
            }
        }
        debug!(
            "Connecting to the JellyFish Lighting controller at {}",
            self.address
        );
        self.timed(self.connect_timeout, |t, limit| t.connect(limit))
            .await
    }

    async fn handle_connected(&self) -> bool {
        self.blocking(|t| Ok(t.is_connected()))
            .await
            .unwrap_or(false)
    }

    /// Connect or disconnect under a hard deadline; overrunning it is a failure.
    async fn timed<F>(&self, limit: Duration, call: F) -> TransportResult<()>
    where
        F: FnOnce(&mut dyn Transport, Duration) -> TransportResult<()> + Send + 'static,
    {
        match runtime::timeout(limit, self.blocking(move |t| call(t, limit))).await {
            Ok(result) => result,
            Err(TimedOut) => Err(TransportError::TimedOut(limit)),
        }
    }

    async fn blocking<T, F>(&self, call: F) -> TransportResult<T>
    where
        F: FnOnce(&mut dyn Transport) -> TransportResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let transport = Arc::clone(&self.transport);
        runtime::spawn_blocking(move || {
            let mut transport = transport.lock().unwrap_or_else(PoisonError::into_inner);
            call(&mut **transport)
        })
        .await
    }

    fn link(&self) -> Link {
        *self.link_mut()
    }

    fn link_mut(&self) -> std::sync::MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_link(&self, state: ConnectionState, reconnect_pending: bool) {
        *self.link_mut() = Link {
            state,
            reconnect_pending,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Call, MockController};

    fn manager(device: &MockController) -> ConnectionManager {
        ConnectionManager::new(
            ControllerAddress::new("10.0.0.5"),
            device.transport("poll"),
            &ClientConfig::default().with_connect_timeout(Duration::from_millis(100)),
        )
    }

    async fn turn_on(manager: &ConnectionManager, zone: &str) -> Result<()> {
        let zones = vec![zone.to_string()];
        let args = zones.clone();
        manager
            .run(Operation::TurnOn, &zones, move |t| t.turn_on(&args))
            .await
    }

    #[tokio::test]
    async fn test_first_call_connects() {
        let device = MockController::new();
        let manager = manager(&device);
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        turn_on(&manager, "Front").await.unwrap();

        assert_eq!(
            device.calls(),
            vec![Call::Connect, Call::TurnOn(vec!["Front".into()])]
        );
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert!(!manager.reconnect_pending());
    }

    #[tokio::test]
    async fn test_ensure_connected_is_idempotent() {
        let device = MockController::new();
        let manager = manager(&device);
        manager.ensure_connected().await.unwrap();
        manager.ensure_connected().await.unwrap();
        assert_eq!(device.calls(), vec![Call::Connect]);
    }

    #[tokio::test]
    async fn test_failure_forces_full_cycle_before_next_call() {
        let device = MockController::new();
        let manager = manager(&device);
        manager.ensure_connected().await.unwrap();

        device.fail_next("turn_on", 1);
        let err = turn_on(&manager, "Front").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Command {
                operation: Operation::TurnOn,
                ..
            }
        ));
        assert!(manager.reconnect_pending());
        assert_eq!(manager.state(), ConnectionState::ReconnectPending);

        device.clear_calls();
        turn_on(&manager, "Back").await.unwrap();
        assert_eq!(
            device.calls(),
            vec![
                Call::Disconnect,
                Call::Connect,
                Call::TurnOn(vec!["Back".into()])
            ]
        );
        assert!(!manager.reconnect_pending());
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_connect_timeout_leaves_session_flagged() {
        let device = MockController::new();
        device.stall_connect(Duration::from_millis(400));
        let manager = manager(&device);

        let err = manager.ensure_connected().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Connection {
                action: LinkAction::Connect,
                source: TransportError::TimedOut(_),
                ..
            }
        ));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.reconnect_pending());
        assert!(!manager.is_connecting());
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported_as_connection_error() {
        let device = MockController::new();
        device.fail_next("connect", 1);
        let manager = manager(&device);

        let err = turn_on(&manager, "Front").await.unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));
        assert!(err.to_string().contains("10.0.0.5"));
        // The command never reached the device.
        assert_eq!(device.calls(), vec![Call::Connect]);

        turn_on(&manager, "Front").await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_failed_forced_disconnect_still_reconnects() {
        let device = MockController::new();
        let manager = manager(&device);
        manager.ensure_connected().await.unwrap();
        manager.mark_reconnect_pending();
        device.fail_next("disconnect", 1);
        device.clear_calls();

        manager.ensure_connected().await.unwrap();
        assert_eq!(device.calls(), vec![Call::Disconnect, Call::Connect]);
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_reconnect_runs_full_cycle() {
        let device = MockController::new();
        let manager = manager(&device);
        manager.ensure_connected().await.unwrap();
        device.clear_calls();

        manager.reconnect().await.unwrap();
        assert_eq!(device.calls(), vec![Call::Disconnect, Call::Connect]);
    }

    #[tokio::test]
    async fn test_disconnect() {
        let device = MockController::new();
        let manager = manager(&device);
        manager.disconnect().await.unwrap();
        assert!(device.calls().is_empty());

        manager.ensure_connected().await.unwrap();
        manager.disconnect().await.unwrap();
        assert_eq!(device.calls(), vec![Call::Connect, Call::Disconnect]);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.reconnect_pending());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_are_serialized_in_issue_order() {
        let device = MockController::new();
        device.slow_calls(Duration::from_millis(20));
        let manager = Arc::new(manager(&device));
        manager.ensure_connected().await.unwrap();
        device.clear_calls();

        let zones = ["A", "B", "C", "D", "E"];
        let mut handles = Vec::new();
        for zone in zones {
            let manager = Arc::clone(&manager);
            handles.push(runtime::spawn(async move { turn_on(&manager, zone).await }));
            // Let the task queue on the lock before issuing the next one.
            runtime::sleep(Duration::from_millis(5)).await;
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let expected: Vec<Call> = zones
            .iter()
            .map(|z| Call::TurnOn(vec![z.to_string()]))
            .collect();
        assert_eq!(device.calls(), expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_independent_managers_do_not_share_a_lock() {
        let device = MockController::new();
        let slow = ConnectionManager::new(
            ControllerAddress::new("10.0.0.5"),
            device.transport("poll"),
            &ClientConfig::default(),
        );
        let fast = ConnectionManager::new(
            ControllerAddress::new("10.0.0.5"),
            device.transport("command"),
            &ClientConfig::default(),
        );
        slow.ensure_connected().await.unwrap();
        fast.ensure_connected().await.unwrap();

        // Hold the slow session's I/O lock indefinitely.
        let _held = slow.io.lock().await;

        let result =
            tokio::time::timeout(Duration::from_secs(2), turn_on(&fast, "Front")).await;
        assert!(matches!(result, Ok(Ok(()))));
        assert_eq!(
            device.calls_on("command").last(),
            Some(&Call::TurnOn(vec!["Front".into()]))
        );
    }
}
