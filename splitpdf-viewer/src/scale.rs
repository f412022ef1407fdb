use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub const MIN_SCALE: f32 = 0.1;
pub const MAX_SCALE: f32 = 5.0;

/// Percentages offered as fixed zoom choices.
pub const KNOWN_PERCENTAGES: [u32; 8] = [50, 75, 100, 125, 150, 200, 300, 400];

const ZOOM_STEP_PERCENT: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalePreset {
    Auto,
    PageActual,
    PageFit,
    PageWidth,
}

impl ScalePreset {
    pub const ALL: [ScalePreset; 4] = [
        ScalePreset::Auto,
        ScalePreset::PageActual,
        ScalePreset::PageFit,
        ScalePreset::PageWidth,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ScalePreset::Auto => "auto",
            ScalePreset::PageActual => "page-actual",
            ScalePreset::PageFit => "page-fit",
            ScalePreset::PageWidth => "page-width",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|preset| preset.as_str() == value.trim())
    }
}

/// A scale as handed to the engine: a preset it resolves itself, or a factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScaleValue {
    Preset(ScalePreset),
    Numeric(f32),
}

impl Default for ScaleValue {
    fn default() -> Self {
        ScaleValue::Preset(ScalePreset::Auto)
    }
}

impl fmt::Display for ScaleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScaleValue::Preset(preset) => f.write_str(preset.as_str()),
            ScaleValue::Numeric(scale) => write!(f, "{}", scale),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("`{0}` is neither a scale preset nor a positive number")]
pub struct ScaleParseError(String);

impl FromStr for ScaleValue {
    type Err = ScaleParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if let Some(preset) = ScalePreset::parse(value) {
            return Ok(ScaleValue::Preset(preset));
        }
        match value.trim().parse::<f32>() {
            Ok(scale) if scale.is_finite() && scale > 0.0 => Ok(ScaleValue::Numeric(scale)),
            _ => Err(ScaleParseError(value.to_owned())),
        }
    }
}

/// What the zoom selector shows for the current scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleToken {
    Preset(ScalePreset),
    Percent(u32),
    Custom,
}

impl ScaleToken {
    pub fn for_numeric(scale: f32) -> Self {
        let normalized = round_to_hundredths(scale);
        KNOWN_PERCENTAGES
            .into_iter()
            .find(|percent| (*percent as f64 / 100.0 - normalized).abs() < 1e-9)
            .map_or(ScaleToken::Custom, ScaleToken::Percent)
    }

    pub fn for_value(value: ScaleValue) -> Self {
        match value {
            ScaleValue::Preset(preset) => ScaleToken::Preset(preset),
            ScaleValue::Numeric(scale) => Self::for_numeric(scale),
        }
    }

    /// Token for a scale reported by the engine alongside its preset, if any.
    pub fn for_engine_scale(scale: f32, preset_value: Option<&str>) -> Self {
        preset_value
            .and_then(ScalePreset::parse)
            .map_or_else(|| Self::for_numeric(scale), ScaleToken::Preset)
    }
}

fn round_to_hundredths(scale: f32) -> f64 {
    (scale as f64 * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleBounds {
    pub min: f32,
    pub max: f32,
}

impl Default for ScaleBounds {
    fn default() -> Self {
        Self {
            min: MIN_SCALE,
            max: MAX_SCALE,
        }
    }
}

impl ScaleBounds {
    pub fn clamp(&self, scale: f32) -> f32 {
        if scale.is_nan() {
            return self.min;
        }
        scale.clamp(self.min, self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDirection {
    In,
    Out,
}

/// Snaps `scale` to the nearest ten percent, then moves one ten-percent step.
pub fn step_zoom(scale: f32, direction: ZoomDirection, bounds: ScaleBounds) -> f32 {
    let percent = (scale as f64 * 100.0).round();
    let snapped = (percent / ZOOM_STEP_PERCENT).round() * ZOOM_STEP_PERCENT;
    let stepped = match direction {
        ZoomDirection::In => snapped + ZOOM_STEP_PERCENT,
        ZoomDirection::Out => snapped - ZOOM_STEP_PERCENT,
    };
    bounds.clamp((stepped / 100.0) as f32)
}
