//! # jellyfish_lighting_rs
//!
//! A resilient async client for JellyFish Lighting controllers.
//!
//! The controller is a single stateful device reached over one persistent
//! session. This crate wraps that session (any [`Transport`] implementation)
//! in a client that survives disconnects, serializes every device call, and
//! merges periodic refreshes with the controller's push notifications into one
//! typed cache of zones, patterns and per-zone state.
//!
//! ## Quick Start
//!
//! ```ignore
//! use jellyfish_lighting_rs::{Brightness, Client, ClientConfig, Color, Zones};
//!
//! async fn porch_lights(transport: Box<dyn jellyfish_lighting_rs::Transport>)
//!     -> Result<(), jellyfish_lighting_rs::Error>
//! {
//!     let client = Client::new("192.168.1.50", transport, ClientConfig::default());
//!     client.refresh_all().await?;
//!
//!     client.apply_pattern("Christmas/Candy Cane.json", "Front").await?;
//!     client.apply_color(Color::rgb(255, 0, 0), Brightness::new(), Zones::All).await?;
//!
//!     for (zone, state) in client.get_cached_state().states {
//!         println!("{zone}: on={} effect={:?}", state.is_on(), state.effect());
//!     }
//!     client.shutdown().await
//! }
//! ```
//!
//! ## Features
//!
//! - **Self-healing sessions**: any failure flags the session, and the next call
//!   tears it down and reconnects before touching the device
//! - **Serialized I/O**: calls through one session reach the device in issue order
//! - **Split sessions**: [`Client::with_split_sessions`] keeps refreshes from
//!   delaying user commands
//! - **Push updates**: controller notifications update exactly the cache fields
//!   they name, then fan out to registered listeners
//! - **Zone classification**: [`ZoneState`] tells a running pattern from a solid color
//!
//! ## Runtime Selection
//!
//! This library is runtime-agnostic. Select your preferred runtime using feature flags:
//!
//! ### Using tokio (default)
//!
//! ```toml
//! [dependencies]
//! jellyfish-lighting-rs = "0.1"
//! tokio = { version = "1", features = ["rt-multi-thread", "macros"] }
//! ```
//!
//! ### Using async-std
//!
//! ```toml
//! [dependencies]
//! jellyfish-lighting-rs = { version = "0.1", default-features = false, features = ["runtime-async-std"] }
//! async-std = { version = "1.12", features = ["attributes"] }
//! ```
//!
//! ### Using smol
//!
//! ```toml
//! [dependencies]
//! jellyfish-lighting-rs = { version = "0.1", default-features = false, features = ["runtime-smol"] }
//! smol = "2"
//! ```
//!
//! ## Feature Flags
//!
//! - `runtime-tokio` (default): Use the tokio async runtime
//! - `runtime-async-std`: Use the async-std runtime
//! - `runtime-smol`: Use the smol runtime

mod cache;
mod client;
mod config;
mod connection;
mod controller;
mod errors;
#[cfg(test)]
mod mock;
mod push;
pub mod runtime;
mod status;
mod transport;
mod types;

// Re-export public API
pub use cache::{CachedState, ControllerInfo};
pub use client::Client;
pub use config::ClientConfig;
pub use connection::{ConnectionManager, ConnectionState, LinkAction};
pub use controller::{ControllerFacade, Operation};
pub use errors::{Error, TransportError};
pub use push::{Listener, ListenerId, Notification, PushDiagnostics};
pub use status::ZoneState;
pub use transport::{
    EffectDescriptor, EventSink, OnFlag, PushEvent, PushEventKind, RawRunState, Transport,
    TransportResult,
};
pub use types::{ALL_ZONES, Brightness, Color, ControllerAddress, Zones};
