//! Typed device operations over one connection manager.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::ControllerInfo;
use crate::connection::ConnectionManager;
use crate::errors::Error;
use crate::status::ZoneState;
use crate::types::{Brightness, Color};

type Result<T> = std::result::Result<T, Error>;

/// Name of a device-facing operation, as it appears in errors and logs.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::AsRefStr,
    strum_macros::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    GetControllerInfo,
    ListZones,
    ListPatterns,
    GetZoneStates,
    TurnOn,
    TurnOff,
    ApplyPattern,
    ApplyColor,
}

/// One method per device capability, each serialized through the wrapped
/// [`ConnectionManager`] and checked for a pending reconnect first.
#[derive(Clone)]
pub struct ControllerFacade {
    connection: Arc<ConnectionManager>,
}

impl ControllerFacade {
    pub fn new(connection: Arc<ConnectionManager>) -> Self {
        ControllerFacade { connection }
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    /// Name, hostname and firmware version, read in one locked call.
    pub async fn controller_info(&self) -> Result<ControllerInfo> {
        self.connection
            .run(Operation::GetControllerInfo, &[], |t| {
                Ok(ControllerInfo {
                    name: t.get_name()?,
                    hostname: t.get_hostname()?,
                    firmware_version: t.get_firmware_version()?,
                })
            })
            .await
    }

    pub async fn list_zones(&self) -> Result<Vec<String>> {
        self.connection
            .run(Operation::ListZones, &[], |t| t.list_zone_names())
            .await
    }

    /// Pattern names, deduplicated and in byte order (so uppercase sorts first).
    pub async fn list_patterns(&self) -> Result<Vec<String>> {
        let names = self
            .connection
            .run(Operation::ListPatterns, &[], |t| t.list_pattern_names())
            .await?;
        Ok(dedup_sorted(names))
    }

    /// State of a single zone. A zone the controller did not report reads as off.
    pub async fn get_zone_state(&self, zone: &str) -> Result<ZoneState> {
        let mut states = self.get_zone_states(&[zone.to_string()]).await?;
        Ok(states.remove(zone).unwrap_or_default())
    }

    /// Classified state of every zone the controller reported on.
    pub async fn get_zone_states(&self, zones: &[String]) -> Result<HashMap<String, ZoneState>> {
        let args = zones.to_vec();
        let raw = self
            .connection
            .run(Operation::GetZoneStates, zones, move |t| t.get_run_state(&args))
            .await?;
        Ok(raw
            .iter()
            .map(|(zone, raw)| (zone.clone(), ZoneState::classify(zone, raw)))
            .collect())
    }

    pub async fn turn_on(&self, zones: &[String]) -> Result<()> {
        let args = zones.to_vec();
        self.connection
            .run(Operation::TurnOn, zones, move |t| t.turn_on(&args))
            .await
    }

    pub async fn turn_off(&self, zones: &[String]) -> Result<()> {
        let args = zones.to_vec();
        self.connection
            .run(Operation::TurnOff, zones, move |t| t.turn_off(&args))
            .await
    }

    pub async fn apply_pattern(&self, pattern: &str, zones: &[String]) -> Result<()> {
        let pattern = pattern.to_string();
        let args = zones.to_vec();
        self.connection
            .run(Operation::ApplyPattern, zones, move |t| {
                t.apply_pattern(&pattern, &args)
            })
            .await
    }

    pub async fn apply_color(
        &self,
        color: Color,
        brightness: Brightness,
        zones: &[String],
    ) -> Result<()> {
        let args = zones.to_vec();
        self.connection
            .run(Operation::ApplyColor, zones, move |t| {
                t.apply_color(color, brightness, &args)
            })
            .await
    }
}

/// Deduplicate and sort pattern names in byte order.
pub(crate) fn dedup_sorted(names: Vec<String>) -> Vec<String> {
    names
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
