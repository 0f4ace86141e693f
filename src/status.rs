//! Zone state tracking.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::Error;
use crate::transport::{EffectDescriptor, RawRunState};
use crate::types::{Brightness, Color};

/// LED layout the controller reports for a solid color.
const SOLID_COLOR_LAYOUT: &str = "Color";

/// Last known visual state of one zone.
///
/// A zone runs either a pattern file or a solid color, never both: at most one
/// of [`effect`](Self::effect) and [`color`](Self::color) is set.
#[serde_with::skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ZoneState {
    is_on: bool,
    effect: Option<String>,
    color: Option<Color>,
    brightness: Option<Brightness>,
}

impl ZoneState {
    /// Check if the zone is lit.
    pub fn is_on(&self) -> bool {
        self.is_on
    }

    /// The pattern file the zone is running, if any.
    pub fn effect(&self) -> Option<&str> {
        self.effect.as_deref()
    }

    /// The solid color the zone shows, if any.
    pub fn color(&self) -> Option<&Color> {
        self.color.as_ref()
    }

    pub fn brightness(&self) -> Option<&Brightness> {
        self.brightness.as_ref()
    }

    /// Classify a raw run-state response.
    ///
    /// The zone is a solid color only when the run file is empty and the effect
    /// descriptor has the `"Color"` layout with exactly three channels that are
    /// all whole numbers in 0-255. Everything else is a pattern (or nothing):
    /// the run file, if any, becomes the effect and no color is reported.
    /// Brightness is kept whenever the descriptor carries a valid one.
    ///
    /// # Examples
    ///
    /// ```
    /// use serde_json::json;
    /// use jellyfish_lighting_rs::{Color, RawRunState, ZoneState};
    ///
    /// let raw = RawRunState::from_value(json!({
    ///     "isOn": 1,
    ///     "runFileName": "",
    ///     "effectDescriptor": {"layout": "Color", "channels": [10, 20, 30], "brightness": 50}
    /// }))
    /// .unwrap();
    /// let state = ZoneState::classify("Front", &raw);
    /// assert_eq!(state.effect(), None);
    /// assert_eq!(state.color(), Some(&Color::rgb(10, 20, 30)));
    /// assert_eq!(state.brightness().map(|b| b.value()), Some(50));
    ///
    /// let raw = RawRunState::from_value(json!({"isOn": true, "runFileName": "Sunset.json"})).unwrap();
    /// let state = ZoneState::classify("Front", &raw);
    /// assert_eq!(state.effect(), Some("Sunset.json"));
    /// assert!(state.color().is_none());
    /// assert!(state.brightness().is_none());
    /// ```
    pub fn classify(zone: &str, raw: &RawRunState) -> Self {
        let is_on = raw.is_on.is_on();
        let descriptor = raw.effect_descriptor.as_ref();
        let brightness = descriptor.and_then(|d| descriptor_brightness(zone, d));

        if raw.run_file_name.is_empty() {
            if let Some(descriptor) = descriptor {
                match solid_color(descriptor) {
                    Ok(Some(color)) => {
                        return ZoneState {
                            is_on,
                            effect: None,
                            color: Some(color),
                            brightness,
                        };
                    }
                    Ok(None) => {}
                    Err(reason) => {
                        warn!("{}", Error::classification_ambiguous(zone, &reason));
                    }
                }
            }
        } else if descriptor.is_some_and(|d| d.layout == SOLID_COLOR_LAYOUT) {
            debug!(
                "{}",
                Error::classification_ambiguous(
                    zone,
                    &format!("run file '{}' with a color layout", raw.run_file_name)
                )
            );
        }

        ZoneState {
            is_on,
            effect: Some(raw.run_file_name.clone()).filter(|f| !f.is_empty()),
            color: None,
            brightness,
        }
    }
}

/// `Ok(None)` for a non-color layout, `Err` for a color layout whose channels don't fit.
fn solid_color(descriptor: &EffectDescriptor) -> Result<Option<Color>, String> {
    if descriptor.layout != SOLID_COLOR_LAYOUT {
        return Ok(None);
    }
    let channels: Vec<u8> = descriptor.channels.iter().filter_map(as_channel).collect();
    match (descriptor.channels.len(), channels.as_slice()) {
        (3, [r, g, b]) => Ok(Some(Color::rgb(*r, *g, *b))),
        (3, _) => Err(format!(
            "color channels {:?} are not all whole numbers in 0-255",
            descriptor.channels
        )),
        (n, _) => Err(format!("color layout with {n} channels instead of 3")),
    }
}

fn as_channel(value: &Value) -> Option<u8> {
    if let Some(n) = value.as_u64() {
        return u8::try_from(n).ok();
    }
    value
        .as_f64()
        .filter(|f| f.fract() == 0.0 && (0.0..=255.0).contains(f))
        .map(|f| f as u8)
}

fn descriptor_brightness(zone: &str, descriptor: &EffectDescriptor) -> Option<Brightness> {
    let value = descriptor.brightness.as_ref()?;
    let brightness = value
        .as_u64()
        .and_then(|n| u8::try_from(n).ok())
        .and_then(Brightness::create);
    if brightness.is_none() {
        debug!("Ignoring brightness {} reported for zone '{}'", value, zone);
    }
    brightness
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawRunState {
        RawRunState::from_value(value).unwrap()
    }

    #[test]
    fn test_solid_color() {
        let state = ZoneState::classify(
            "Front",
            &raw(json!({
                "isOn": 1,
                "runFileName": "",
                "effectDescriptor": {"layout": "Color", "channels": [10, 20, 30], "brightness": 50}
            })),
        );
        assert_eq!(
            state,
            ZoneState {
                is_on: true,
                effect: None,
                color: Some(Color::rgb(10, 20, 30)),
                brightness: Brightness::create(50),
            }
        );
    }

    #[test]
    fn test_pattern_without_descriptor() {
        let state = ZoneState::classify(
            "Front",
            &raw(json!({"isOn": 1, "runFileName": "Sunset.json", "effectDescriptor": null})),
        );
        assert_eq!(
            state,
            ZoneState {
                is_on: true,
                effect: Some("Sunset.json".to_string()),
                color: None,
                brightness: None,
            }
        );
    }

    #[test]
    fn test_pattern_keeps_descriptor_brightness() {
        let state = ZoneState::classify(
            "Front",
            &raw(json!({
                "isOn": 1,
                "runFileName": "Christmas/Candy Cane.json",
                "effectDescriptor": {"layout": "Chase", "channels": [1, 2, 3, 4], "brightness": 80}
            })),
        );
        assert_eq!(state.effect(), Some("Christmas/Candy Cane.json"));
        assert_eq!(state.color(), None);
        assert_eq!(state.brightness(), Brightness::create(80).as_ref());
    }

    #[test]
    fn test_run_file_wins_over_color_layout() {
        let state = ZoneState::classify(
            "Front",
            &raw(json!({
                "isOn": 1,
                "runFileName": "Sunset.json",
                "effectDescriptor": {"layout": "Color", "channels": [10, 20, 30], "brightness": 40}
            })),
        );
        assert_eq!(state.effect(), Some("Sunset.json"));
        assert_eq!(state.color(), None);
        assert_eq!(state.brightness(), Brightness::create(40).as_ref());
    }

    #[test]
    fn test_wrong_channel_count_falls_through() {
        let state = ZoneState::classify(
            "Front",
            &raw(json!({
                "isOn": 0,
                "runFileName": "",
                "effectDescriptor": {"layout": "Color", "channels": [10, 20, 30, 40], "brightness": 50}
            })),
        );
        assert!(!state.is_on());
        assert_eq!(state.effect(), None);
        assert_eq!(state.color(), None);
        assert_eq!(state.brightness(), Brightness::create(50).as_ref());
    }

    #[test]
    fn test_non_numeric_channel_falls_through() {
        let state = ZoneState::classify(
            "Front",
            &raw(json!({
                "isOn": 1,
                "runFileName": "",
                "effectDescriptor": {"layout": "Color", "channels": [10, "20", 30]}
            })),
        );
        assert_eq!(state.color(), None);
        assert_eq!(state.effect(), None);
    }

    #[test]
    fn test_out_of_range_channel_falls_through() {
        let state = ZoneState::classify(
            "Front",
            &raw(json!({
                "isOn": 1,
                "runFileName": "",
                "effectDescriptor": {"layout": "Color", "channels": [10, 256, 30]}
            })),
        );
        assert_eq!(state.color(), None);
    }

    #[test]
    fn test_layout_match_is_exact() {
        let state = ZoneState::classify(
            "Front",
            &raw(json!({
                "isOn": 1,
                "runFileName": "",
                "effectDescriptor": {"layout": "color", "channels": [10, 20, 30]}
            })),
        );
        assert_eq!(state.color(), None);
    }

    #[test]
    fn test_whole_float_channels_count_as_numeric() {
        let state = ZoneState::classify(
            "Front",
            &raw(json!({
                "isOn": 1,
                "runFileName": "",
                "effectDescriptor": {"layout": "Color", "channels": [10.0, 20.0, 30.0]}
            })),
        );
        assert_eq!(state.color(), Some(&Color::rgb(10, 20, 30)));
        assert_eq!(state.brightness(), None);
    }

    #[test]
    fn test_invalid_brightness_is_dropped() {
        let state = ZoneState::classify(
            "Front",
            &raw(json!({
                "isOn": 1,
                "runFileName": "",
                "effectDescriptor": {"layout": "Color", "channels": [1, 2, 3], "brightness": 180}
            })),
        );
        assert_eq!(state.color(), Some(&Color::rgb(1, 2, 3)));
        assert_eq!(state.brightness(), None);
    }

    #[test]
    fn test_effect_and_color_are_exclusive() {
        for value in [
            json!({"runFileName": "A.json", "effectDescriptor": {"layout": "Color", "channels": [1, 2, 3]}}),
            json!({"runFileName": "", "effectDescriptor": {"layout": "Color", "channels": [1, 2, 3]}}),
            json!({"runFileName": "", "effectDescriptor": null}),
        ] {
            let state = ZoneState::classify("Front", &raw(value));
            assert!(!(state.effect().is_some() && state.color().is_some()));
        }
    }
}
