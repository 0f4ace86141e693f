//! Last-known controller state shared by the refresh and push paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::status::ZoneState;

/// Identity of the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerInfo {
    pub name: String,
    pub hostname: String,
    pub firmware_version: String,
}

impl ControllerInfo {
    /// Display title, `"{name} ({hostname})"`.
    ///
    /// ```
    /// use jellyfish_lighting_rs::ControllerInfo;
    ///
    /// let info = ControllerInfo {
    ///     name: "Porch".into(),
    ///     hostname: "JellyFish-0A1B.local".into(),
    ///     firmware_version: "1.2.3".into(),
    /// };
    /// assert_eq!(info.title(), "Porch (JellyFish-0A1B.local)");
    /// ```
    pub fn title(&self) -> String {
        format!("{} ({})", self.name, self.hostname)
    }
}

/// Point-in-time copy of everything the cache holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedState {
    pub info: ControllerInfo,
    pub zones: Vec<String>,
    pub patterns: Vec<String>,
    pub states: BTreeMap<String, ZoneState>,
}

/// Concurrent store for zones, patterns, controller identity and per-zone state.
///
/// Each field group is written as a whole. Per-zone states live in a
/// concurrent map so writers touching different zones never contend.
#[derive(Debug, Default)]
pub(crate) struct StateCache {
    info: RwLock<ControllerInfo>,
    zones: RwLock<Vec<String>>,
    patterns: RwLock<Vec<String>>,
    states: DashMap<String, ZoneState>,
}

impl StateCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn info(&self) -> ControllerInfo {
        self.info.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn zones(&self) -> Vec<String> {
        self.zones.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn patterns(&self) -> Vec<String> {
        self.patterns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn state(&self, zone: &str) -> Option<ZoneState> {
        self.states.get(zone).map(|s| s.value().clone())
    }

    pub(crate) fn has_state(&self, zone: &str) -> bool {
        self.states.contains_key(zone)
    }

    pub(crate) fn set_info(&self, info: ControllerInfo) {
        *self.info.write().unwrap_or_else(PoisonError::into_inner) = info;
    }

    /// Apply `f` to the controller info in place.
    pub(crate) fn update_info(&self, f: impl FnOnce(&mut ControllerInfo)) {
        f(&mut self.info.write().unwrap_or_else(PoisonError::into_inner));
    }

    pub(crate) fn set_zones(&self, zones: Vec<String>) {
        *self.zones.write().unwrap_or_else(PoisonError::into_inner) = zones;
    }

    pub(crate) fn set_patterns(&self, patterns: Vec<String>) {
        *self.patterns.write().unwrap_or_else(PoisonError::into_inner) = patterns;
    }

    /// Overwrite the given zones' states; every other zone is left alone.
    pub(crate) fn put_states(&self, states: HashMap<String, ZoneState>) {
        for (zone, state) in states {
            self.states.insert(zone, state);
        }
    }

    /// Replace the whole per-zone map, dropping zones not in `states`.
    pub(crate) fn replace_states(&self, states: HashMap<String, ZoneState>) {
        self.states.retain(|zone, _| states.contains_key(zone));
        self.put_states(states);
    }

    /// Drop the state of every zone not in `zones`.
    pub(crate) fn retain_states(&self, zones: &[String]) {
        self.states.retain(|zone, _| zones.contains(zone));
    }

    pub(crate) fn snapshot(&self) -> CachedState {
        CachedState {
            info: self.info(),
            zones: self.zones(),
            patterns: self.patterns(),
            states: self
                .states
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
        }
    }
}
