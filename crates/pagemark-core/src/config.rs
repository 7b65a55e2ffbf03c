//! Engine configuration.
//!
//! Every tunable that used to be a product constant (render DPI, minimum
//! image size, rotate sensitivity, handle geometry, eraser style) lives here
//! and is handed to [`Engine::new`](crate::Engine::new).

use crate::strokes::StrokeColor;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default raster/canonical DPI.
pub const DEFAULT_DPI: u32 = 150;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Fixed style applied to eraser strokes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EraserStyle {
    /// Page background color painted by the eraser.
    pub color: StrokeColor,
    /// Eraser width in canonical units.
    pub width: f64,
    /// Eraser opacity.
    pub opacity: f64,
}

impl Default for EraserStyle {
    fn default() -> Self {
        Self {
            color: StrokeColor::white(),
            width: 20.0,
            opacity: 1.0,
        }
    }
}

/// Engine-wide parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// DPI of the page raster; canonical coordinates share it.
    pub dpi: u32,
    /// Lower bound for placed image width and height (canonical units).
    pub min_image_size: f64,
    /// Degrees of rotation per screen pixel of horizontal drag.
    pub rotate_sensitivity: f64,
    /// Distance from the image's top edge to the rotate handle (screen pixels).
    pub rotate_arm_length: f64,
    /// Hit radius around selection handles (screen pixels).
    pub handle_hit_radius: f64,
    /// Drawn radius of selection handles (screen pixels).
    pub handle_radius: f64,
    /// Color of the selection outline, arm and handles.
    pub selection_color: StrokeColor,
    /// Largest fraction of the page an inserted image may cover per axis.
    pub max_insert_fraction: f64,
    /// Style forced onto eraser strokes.
    pub eraser: EraserStyle,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            min_image_size: 30.0,
            rotate_sensitivity: 0.5,
            rotate_arm_length: 40.0,
            handle_hit_radius: 14.0,
            handle_radius: 6.0,
            selection_color: StrokeColor::new(59, 130, 246, 255),
            max_insert_fraction: 0.5,
            eraser: EraserStyle::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        log::debug!("Loaded engine config: {:?}", config);
        Ok(config)
    }

    /// Serialize the configuration to pretty JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
