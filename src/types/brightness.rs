//! Brightness for JellyFish zones.

use serde::{Deserialize, Serialize};

/// Brightness level from 0 to 100 percent, as the controller reports and accepts it.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "u8", into = "u8")]
pub struct Brightness {
    pub(crate) value: u8,
}

impl Default for Brightness {
    fn default() -> Self {
        Self::new()
    }
}

impl Brightness {
    const MIN: u8 = 0;
    const MAX: u8 = 100;

    /// Full brightness, the level used when nothing else is known.
    ///
    /// # Examples
    ///
    /// ```
    /// use jellyfish_lighting_rs::Brightness;
    ///
    /// assert_eq!(Brightness::new().value(), 100);
    /// ```
    pub fn new() -> Self {
        Brightness { value: Self::MAX }
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    /// Returns None if value is outside valid range (0-100).
    ///
    /// # Examples
    ///
    /// ```
    /// use jellyfish_lighting_rs::Brightness;
    ///
    /// assert!(Brightness::create(0).is_some());
    /// assert!(Brightness::create(100).is_some());
    /// assert!(Brightness::create(101).is_none());
    /// ```
    pub fn create(value: u8) -> Option<Self> {
        if Self::is_valid(value) {
            Some(Brightness { value })
        } else {
            None
        }
    }

    /// Returns default (100%) if value is invalid.
    pub fn create_or(value: u8) -> Self {
        Self::create(value).unwrap_or_default()
    }

    /// Convert from the 0-255 scale light UIs use.
    ///
    /// # Examples
    ///
    /// ```
    /// use jellyfish_lighting_rs::Brightness;
    ///
    /// assert_eq!(Brightness::from_byte_scale(255).value(), 100);
    /// assert_eq!(Brightness::from_byte_scale(128).value(), 50);
    /// assert_eq!(Brightness::from_byte_scale(0).value(), 0);
    /// ```
    pub fn from_byte_scale(level: u8) -> Self {
        Brightness {
            value: (u16::from(level) * u16::from(Self::MAX) / 255) as u8,
        }
    }

    /// Convert to the 0-255 scale light UIs use.
    ///
    /// # Examples
    ///
    /// ```
    /// use jellyfish_lighting_rs::Brightness;
    ///
    /// assert_eq!(Brightness::new().to_byte_scale(), 255);
    /// assert_eq!(Brightness::create(50).unwrap().to_byte_scale(), 127);
    /// ```
    pub fn to_byte_scale(&self) -> u8 {
        (u16::from(self.value) * 255 / u16::from(Self::MAX)) as u8
    }

    fn is_valid(value: u8) -> bool {
        (Self::MIN..=Self::MAX).contains(&value)
    }
}

impl TryFrom<u8> for Brightness {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, String> {
        Self::create(value).ok_or_else(|| format!("brightness {value} is outside 0-100"))
    }
}

impl From<Brightness> for u8 {
    fn from(brightness: Brightness) -> u8 {
        brightness.value
    }
}
