//! Value types shared across the client.

mod address;
mod brightness;
mod color;
mod zones;

pub use address::ControllerAddress;
pub use brightness::Brightness;
pub use color::Color;
pub use zones::{ALL_ZONES, Zones};
