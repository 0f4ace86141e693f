//! The client external collaborators hold for one controller.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::channel::mpsc::UnboundedReceiver;
use log::{debug, info, warn};
use serde_json::{Value, json};

use crate::cache::{CachedState, StateCache};
use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::controller::ControllerFacade;
use crate::errors::Error;
use crate::push::{ListenerId, Notification, PushRouter};
use crate::status::ZoneState;
use crate::transport::{EventSink, PushEvent, Transport};
use crate::types::{Brightness, Color, ControllerAddress, Zones};

type Result<T> = std::result::Result<T, Error>;

/// Resilient client for a single JellyFish Lighting controller.
///
/// Scheduled refreshes and push events both feed one cache, read with
/// [`get_cached_state`](Self::get_cached_state). Every device call is
/// serialized per session and heals itself after a failure: the next call on
/// that session runs a full disconnect/connect cycle first.
///
/// A client built with [`with_split_sessions`](Self::with_split_sessions) uses
/// one session for refreshes and another for commands, so a slow refresh
/// never delays a user action.
///
/// Construct it inside the async runtime; it spawns its push router there.
pub struct Client {
    address: ControllerAddress,
    config: ClientConfig,
    poll: ControllerFacade,
    command: ControllerFacade,
    cache: Arc<StateCache>,
    router: PushRouter,
    shut_down: AtomicBool,
}

impl Client {
    /// Client that refreshes and commands over one session.
    pub fn new(
        address: impl Into<ControllerAddress>,
        mut transport: Box<dyn Transport>,
        config: ClientConfig,
    ) -> Self {
        let address = address.into();
        let (sink, events) = EventSink::channel();
        transport.subscribe(sink);

        let session = Arc::new(ConnectionManager::new(address.clone(), transport, &config));
        Self::assemble(address, config, Arc::clone(&session), session, events)
    }

    /// Client with separate refresh and command sessions to the same controller.
    ///
    /// Push events are taken from the refresh session only, so a controller
    /// that broadcasts to every open session is still routed once per change.
    pub fn with_split_sessions(
        address: impl Into<ControllerAddress>,
        mut poll: Box<dyn Transport>,
        command: Box<dyn Transport>,
        config: ClientConfig,
    ) -> Self {
        let address = address.into();
        let (sink, events) = EventSink::channel();
        poll.subscribe(sink);

        let poll = Arc::new(ConnectionManager::new(address.clone(), poll, &config));
        let command = Arc::new(ConnectionManager::new(address.clone(), command, &config));
        Self::assemble(address, config, poll, command, events)
    }

    fn assemble(
        address: ControllerAddress,
        config: ClientConfig,
        poll: Arc<ConnectionManager>,
        command: Arc<ConnectionManager>,
        events: UnboundedReceiver<PushEvent>,
    ) -> Self {
        let cache = Arc::new(StateCache::new());
        let mut sessions = vec![Arc::clone(&poll)];
        if !Arc::ptr_eq(&poll, &command) {
            sessions.push(Arc::clone(&command));
        }
        let poll = ControllerFacade::new(poll);
        let router = PushRouter::start(Arc::clone(&cache), poll.clone(), sessions, events);

        Client {
            address,
            config,
            poll,
            command: ControllerFacade::new(command),
            cache,
            router,
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn address(&self) -> &ControllerAddress {
        &self.address
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Fetch identity, zones, patterns and every zone's state.
    ///
    /// The cache is only written once everything was read; a failure leaves
    /// the last known values in place.
    pub async fn refresh_all(&self) -> Result<()> {
        self.check_open()?;
        let info = self.poll.controller_info().await?;
        let zones = self.poll.list_zones().await?;
        let patterns = self.poll.list_patterns().await?;
        let states = if zones.is_empty() {
            HashMap::new()
        } else {
            self.poll.get_zone_states(&zones).await?
        };

        debug!(
            "Refreshed {}: {} zones, {} patterns",
            info.title(),
            zones.len(),
            patterns.len()
        );
        self.cache.set_info(info);
        self.cache.set_zones(zones);
        self.cache.set_patterns(patterns);
        self.cache.replace_states(states);
        Ok(())
    }

    /// Re-read the state of the selected zones only.
    pub async fn refresh_zones(&self, zones: impl Into<Zones>) -> Result<()> {
        self.check_open()?;
        let zones = self.resolve(zones.into())?;
        let states = self.poll.get_zone_states(&zones).await?;
        self.cache.put_states(states);
        Ok(())
    }

    pub async fn refresh_zone(&self, zone: &str) -> Result<()> {
        self.refresh_zones(zone).await
    }

    pub async fn turn_on(&self, zones: impl Into<Zones>) -> Result<()> {
        self.check_open()?;
        let zones = self.resolve(zones.into())?;
        self.command.turn_on(&zones).await?;
        self.refresh_after_command(&zones).await;
        Ok(())
    }

    pub async fn turn_off(&self, zones: impl Into<Zones>) -> Result<()> {
        self.check_open()?;
        let zones = self.resolve(zones.into())?;
        self.command.turn_off(&zones).await?;
        self.refresh_after_command(&zones).await;
        Ok(())
    }

    pub async fn apply_pattern(&self, pattern: &str, zones: impl Into<Zones>) -> Result<()> {
        self.check_open()?;
        let zones = self.resolve(zones.into())?;
        self.command.apply_pattern(pattern, &zones).await?;
        self.refresh_after_command(&zones).await;
        Ok(())
    }

    pub async fn apply_color(
        &self,
        color: Color,
        brightness: Brightness,
        zones: impl Into<Zones>,
    ) -> Result<()> {
        self.check_open()?;
        let zones = self.resolve(zones.into())?;
        self.command.apply_color(color, brightness, &zones).await?;
        self.refresh_after_command(&zones).await;
        Ok(())
    }

    pub fn get_cached_state(&self) -> CachedState {
        self.cache.snapshot()
    }

    /// Cached state of one zone, without copying the rest of the cache.
    pub fn zone_state(&self, zone: &str) -> Option<ZoneState> {
        self.cache.state(zone)
    }

    /// Call `listener` once for every push event, after the cache was updated.
    pub fn register_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.router.register(Arc::new(listener))
    }

    /// Returns `false` if the listener was already gone.
    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        self.router.unregister(id)
    }

    /// Status of the refresh session.
    pub fn connection_status(&self) -> ConnectionState {
        self.poll.connection().state()
    }

    pub fn reconnect_pending(&self) -> bool {
        self.sessions().iter().any(|s| s.reconnect_pending())
    }

    pub fn is_connecting(&self) -> bool {
        self.sessions().iter().any(|s| s.is_connecting())
    }

    /// A zone is available once its state is cached and the session is up.
    pub fn is_zone_available(&self, zone: &str) -> bool {
        self.cache.has_state(zone) && self.connection_status() == ConnectionState::Connected
    }

    pub fn diagnostics(&self) -> Value {
        let info = self.cache.info();
        json!({
            "address": self.address.to_string(),
            "title": info.title(),
            "controller": info,
            "connection_status": self.connection_status(),
            "reconnect_pending": self.reconnect_pending(),
            "is_connecting": self.is_connecting(),
            "zone_count": self.cache.zones().len(),
            "pattern_count": self.cache.patterns().len(),
            "config": self.config,
            "push": self.router.diagnostics(),
        })
    }

    /// Stop the push router and close every session.
    ///
    /// Calls made afterwards fail with [`Error::Shutdown`]. Every session is
    /// closed even if an earlier one fails; the first failure is returned.
    pub async fn shutdown(&self) -> Result<()> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Shutting down client for {}", self.address);
        self.router.stop();

        let mut result = Ok(());
        for session in self.sessions() {
            if let Err(e) = session.disconnect().await {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }

    fn sessions(&self) -> Vec<&Arc<ConnectionManager>> {
        let poll = self.poll.connection();
        let command = self.command.connection();
        if Arc::ptr_eq(poll, command) {
            vec![poll]
        } else {
            vec![poll, command]
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(Error::Shutdown(self.address.clone()));
        }
        Ok(())
    }

    fn resolve(&self, zones: Zones) -> Result<Vec<String>> {
        let resolved = zones.resolve(&self.cache.zones());
        if resolved.is_empty() {
            return Err(Error::NoZones(self.address.clone()));
        }
        Ok(resolved)
    }

    async fn refresh_after_command(&self, zones: &[String]) {
        if !self.config.refresh_after_command() {
            return;
        }
        match self.command.get_zone_states(zones).await {
            Ok(states) => self.cache.put_states(states),
            Err(e) => warn!("Command succeeded but reading back its zones failed: {}", e),
        }
    }
}
