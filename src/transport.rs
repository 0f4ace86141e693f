//! The transport handle boundary.
//!
//! A [`Transport`] is one logical session to one controller. Its calls block the
//! calling thread and fail with [`TransportError`]; the client never invokes it
//! from an async task directly but through the runtime's blocking pool, one call
//! at a time. The wire protocol behind it is up to the implementation.
//!
//! Unsolicited notifications are handed to the [`EventSink`] given to
//! [`Transport::subscribe`], from whatever thread the transport reads on.

use std::collections::HashMap;
use std::time::Duration;

use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{Error, TransportError};
use crate::types::{Brightness, Color};

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Blocking session to a single controller.
pub trait Transport: Send + 'static {
    /// Open the session, giving up after `timeout`.
    fn connect(&mut self, timeout: Duration) -> TransportResult<()>;

    /// Close the session, giving up after `timeout`.
    fn disconnect(&mut self, timeout: Duration) -> TransportResult<()>;

    /// Whether the handle believes its session is open.
    fn is_connected(&self) -> bool;

    fn get_name(&mut self) -> TransportResult<String>;

    fn get_hostname(&mut self) -> TransportResult<String>;

    fn get_firmware_version(&mut self) -> TransportResult<String>;

    fn list_zone_names(&mut self) -> TransportResult<Vec<String>>;

    /// Pattern names as stored in the library; may contain duplicates.
    fn list_pattern_names(&mut self) -> TransportResult<Vec<String>>;

    fn get_run_state(&mut self, zones: &[String]) -> TransportResult<HashMap<String, RawRunState>>;

    fn turn_on(&mut self, zones: &[String]) -> TransportResult<()>;

    fn turn_off(&mut self, zones: &[String]) -> TransportResult<()>;

    fn apply_pattern(&mut self, pattern: &str, zones: &[String]) -> TransportResult<()>;

    fn apply_color(
        &mut self,
        color: Color,
        brightness: Brightness,
        zones: &[String],
    ) -> TransportResult<()>;

    /// Register where push events go. Called once, before the first connect.
    fn subscribe(&mut self, sink: EventSink);
}

/// An unsolicited notification from the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// The push channel opened.
    Opened,
    /// The push channel closed.
    Closed,
    /// The push channel reported an error; the session can no longer be trusted.
    Error(String),
    NameChanged(String),
    HostnameChanged(String),
    FirmwareChanged(String),
    ZonesChanged(Vec<String>),
    /// The pattern library or a pattern's configuration changed.
    PatternsChanged(Vec<String>),
    /// Run state of some zones changed. A `None` entry means the notification did
    /// not carry the new state and it has to be read back from the controller.
    ZoneStatesChanged(HashMap<String, Option<RawRunState>>),
}

/// The kind of a [`PushEvent`], handed to listeners.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
    strum_macros::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PushEventKind {
    Opened,
    Closed,
    Error,
    NameChanged,
    HostnameChanged,
    FirmwareChanged,
    ZonesChanged,
    PatternsChanged,
    ZoneStatesChanged,
}

impl PushEvent {
    pub fn kind(&self) -> PushEventKind {
        match self {
            PushEvent::Opened => PushEventKind::Opened,
            PushEvent::Closed => PushEventKind::Closed,
            PushEvent::Error(_) => PushEventKind::Error,
            PushEvent::NameChanged(_) => PushEventKind::NameChanged,
            PushEvent::HostnameChanged(_) => PushEventKind::HostnameChanged,
            PushEvent::FirmwareChanged(_) => PushEventKind::FirmwareChanged,
            PushEvent::ZonesChanged(_) => PushEventKind::ZonesChanged,
            PushEvent::PatternsChanged(_) => PushEventKind::PatternsChanged,
            PushEvent::ZoneStatesChanged(_) => PushEventKind::ZoneStatesChanged,
        }
    }
}

/// Sending half of the push queue, owned by the transport.
///
/// Cheap to clone and safe to use from any thread. Events are delivered in the
/// order they are sent.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: UnboundedSender<PushEvent>,
}

impl EventSink {
    pub(crate) fn channel() -> (EventSink, UnboundedReceiver<PushEvent>) {
        let (tx, rx) = unbounded();
        (EventSink { tx }, rx)
    }

    /// Queue an event for the router. Returns `false` once the client is gone.
    pub fn send(&self, event: PushEvent) -> bool {
        self.tx.unbounded_send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The controller's on/off flag, reported either as a boolean or as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OnFlag {
    Bool(bool),
    Int(i64),
}

impl OnFlag {
    /// Nonzero integers count as on.
    pub fn is_on(&self) -> bool {
        match self {
            OnFlag::Bool(on) => *on,
            OnFlag::Int(n) => *n != 0,
        }
    }
}

impl Default for OnFlag {
    fn default() -> Self {
        OnFlag::Bool(false)
    }
}

impl From<bool> for OnFlag {
    fn from(on: bool) -> Self {
        OnFlag::Bool(on)
    }
}

/// What the controller says it is rendering on a zone, besides the run file.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectDescriptor {
    /// LED layout of the effect; `"Color"` for a solid color.
    #[serde(alias = "type")]
    pub layout: String,
    /// Channel values; numbers for a solid color, anything for other layouts.
    #[serde(default, alias = "colors")]
    pub channels: Vec<Value>,
    pub brightness: Option<Value>,
}

/// Run state of one zone exactly as the controller reported it.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRunState {
    #[serde(default, alias = "state")]
    pub is_on: OnFlag,
    #[serde(default, alias = "file")]
    pub run_file_name: String,
    #[serde(default, alias = "data")]
    pub effect_descriptor: Option<EffectDescriptor>,
}

impl RawRunState {
    /// Decode a run-state record from its JSON form.
    ///
    /// # Examples
    ///
    /// ```
    /// use serde_json::json;
    /// use jellyfish_lighting_rs::RawRunState;
    ///
    /// let raw = RawRunState::from_value(json!({
    ///     "state": 1,
    ///     "file": "",
    ///     "data": {"type": "Color", "colors": [10, 20, 30], "brightness": 50}
    /// }))
    /// .unwrap();
    /// assert!(raw.is_on.is_on());
    /// assert_eq!(raw.effect_descriptor.unwrap().layout, "Color");
    /// ```
    pub fn from_value(value: Value) -> Result<Self, Error> {
        serde_json::from_value(value).map_err(Error::JsonLoad)
    }
}
