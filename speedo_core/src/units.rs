//! Display unit conversion and speed banding.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// km/h → mph
pub const KPH_TO_MPH: f64 = 0.621371;

/// Unit the presentation layer shows speeds in. Internally everything is km/h.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedUnit {
    #[default]
    Kph,
    Mph,
}

impl SpeedUnit {
    /// Suffix shown after a formatted value.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Kph => "km/h",
            Self::Mph => "mph",
        }
    }
}

impl fmt::Display for SpeedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kph => write!(f, "kph"),
            Self::Mph => write!(f, "mph"),
        }
    }
}

impl FromStr for SpeedUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "kph" | "kmh" | "km/h" => Ok(Self::Kph),
            "mph" => Ok(Self::Mph),
            other => Err(format!("unknown speed unit '{}'", other)),
        }
    }
}

/// Convert an internal km/h value into `unit`.
pub fn to_display(speed_kph: f64, unit: SpeedUnit) -> f64 {
    match unit {
        SpeedUnit::Kph => speed_kph,
        SpeedUnit::Mph => speed_kph * KPH_TO_MPH,
    }
}

/// Convert and round half away from zero to `decimals` places.
pub fn format(speed_kph: f64, unit: SpeedUnit, decimals: usize) -> String {
    let value = to_display(speed_kph, unit);
    let scale = 10f64.powi(decimals as i32);
    let rounded = (value * scale).round() / scale;
    // Avoid printing "-0"
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    format!("{:.*}", decimals, rounded)
}

/// Coarse speed classification a presentation layer can style by.
///
/// Thresholds are in km/h regardless of display unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedBand {
    Standby,
    Slow,
    Medium,
    Fast,
    VeryFast,
}

impl SpeedBand {
    pub const SLOW_KPH: f64 = 20.0;
    pub const MEDIUM_KPH: f64 = 40.0;
    pub const FAST_KPH: f64 = 60.0;
    pub const VERY_FAST_KPH: f64 = 80.0;

    pub fn classify(speed_kph: f64) -> Self {
        if speed_kph >= Self::VERY_FAST_KPH {
            Self::VeryFast
        } else if speed_kph >= Self::FAST_KPH {
            Self::Fast
        } else if speed_kph >= Self::MEDIUM_KPH {
            Self::Medium
        } else if speed_kph >= Self::SLOW_KPH {
            Self::Slow
        } else {
            Self::Standby
        }
    }
}
