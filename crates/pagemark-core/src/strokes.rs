//! Freehand strokes and the three-layer stroke store.

use crate::config::EraserStyle;
use kurbo::{BezPath, Point};
use peniko::Color;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Strokes with fewer points than this are discarded at gesture end.
pub const MIN_STROKE_POINTS: usize = 2;

/// Server-assigned stroke identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrokeId(pub u64);

impl fmt::Display for StrokeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stroke#{}", self.0)
    }
}

/// Drawing tool a stroke was made with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    #[default]
    Pen,
    Highlighter,
    /// Paints the background color; there is no true erase.
    Eraser,
}

/// RGBA8 stroke color, serialized as a `#rrggbb` / `#rrggbbaa` hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct StrokeColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl StrokeColor {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }

    pub const fn white() -> Self {
        Self::new(255, 255, 255, 255)
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa`.
    pub fn parse_hex(color: &str) -> Option<Self> {
        let hex = color.trim().strip_prefix('#')?;
        let channel = |range: std::ops::Range<usize>| {
            hex.get(range).and_then(|s| u8::from_str_radix(s, 16).ok())
        };
        match hex.len() {
            3 => Some(Self::new(
                channel(0..1)? * 17,
                channel(1..2)? * 17,
                channel(2..3)? * 17,
                255,
            )),
            6 => Some(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?, 255)),
            8 => Some(Self::new(
                channel(0..2)?,
                channel(2..4)?,
                channel(4..6)?,
                channel(6..8)?,
            )),
            _ => None,
        }
    }

    /// Parse a hex color, falling back to black.
    pub fn from_hex(color: &str) -> Self {
        Self::parse_hex(color).unwrap_or_else(Self::black)
    }

    /// Hex representation; alpha is only written when not opaque.
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl Default for StrokeColor {
    fn default() -> Self {
        Self::black()
    }
}

impl From<StrokeColor> for String {
    fn from(color: StrokeColor) -> Self {
        color.to_hex()
    }
}

impl From<String> for StrokeColor {
    fn from(color: String) -> Self {
        Self::from_hex(&color)
    }
}

impl From<StrokeColor> for Color {
    fn from(color: StrokeColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// A freehand stroke in canonical coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    /// Absent until the server confirms creation.
    pub id: Option<StrokeId>,
    /// Local identity while the create is in flight.
    #[serde(skip, default = "Uuid::new_v4")]
    pub(crate) local_key: Uuid,
    /// 1-based page number.
    pub page: u32,
    pub tool: ToolKind,
    pub color: StrokeColor,
    pub width: f64,
    pub opacity: f64,
    pub points: Vec<Point>,
}

impl Stroke {
    /// Create an empty, unconfirmed stroke.
    pub fn new(page: u32, tool: ToolKind, color: StrokeColor, width: f64, opacity: f64) -> Self {
        Self {
            id: None,
            local_key: Uuid::new_v4(),
            page,
            tool,
            color,
            width,
            opacity,
            points: Vec::new(),
        }
    }

    /// Builder for a confirmed stroke, as returned by the remote store.
    pub fn with_id(mut self, id: StrokeId) -> Self {
        self.id = Some(id);
        self
    }

    /// Builder that sets the points.
    pub fn with_points(mut self, points: Vec<Point>) -> Self {
        self.points = points;
        self
    }

    /// Key identifying this stroke while it is pending.
    pub fn local_key(&self) -> Uuid {
        self.local_key
    }

    pub fn add_point(&mut self, point: Point) {
        self.points.push(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Polyline path through the points.
    pub fn to_path(&self) -> BezPath {
        let mut path = BezPath::new();
        let mut points = self.points.iter();
        if let Some(first) = points.next() {
            path.move_to(*first);
            for point in points {
                path.line_to(*point);
            }
        }
        path
    }

    /// Stroke color with opacity folded into alpha.
    pub fn paint_color(&self) -> Color {
        let alpha = (f64::from(self.color.a) * self.opacity.clamp(0.0, 1.0)).round() as u8;
        Color::from_rgba8(self.color.r, self.color.g, self.color.b, alpha)
    }
}

/// Persisted, locally pending and in-progress strokes for the current page.
#[derive(Debug, Clone, Default)]
pub struct StrokeStore {
    persisted: Vec<Stroke>,
    local_pending: Vec<Stroke>,
    in_progress: Option<Stroke>,
    eraser: EraserStyle,
}

impl StrokeStore {
    pub fn new(eraser: EraserStyle) -> Self {
        Self {
            eraser,
            ..Self::default()
        }
    }

    /// Open a new in-progress stroke, discarding any unfinished one.
    ///
    /// Eraser strokes take the configured eraser style regardless of the
    /// requested color, width and opacity.
    pub fn begin_stroke(
        &mut self,
        page: u32,
        tool: ToolKind,
        color: StrokeColor,
        width: f64,
        opacity: f64,
    ) {
        let stroke = match tool {
            ToolKind::Eraser => Stroke::new(
                page,
                tool,
                self.eraser.color,
                self.eraser.width,
                self.eraser.opacity,
            ),
            _ => Stroke::new(page, tool, color, width, opacity),
        };
        self.in_progress = Some(stroke);
    }

    /// Append a canonical point to the in-progress stroke.
    /// Returns false when no stroke is open.
    pub fn append_point(&mut self, point: Point) -> bool {
        match &mut self.in_progress {
            Some(stroke) => {
                stroke.add_point(point);
                true
            }
            None => false,
        }
    }

    /// Close the in-progress stroke.
    ///
    /// A stroke with enough points moves to the local-pending layer and a copy
    /// is returned for persistence; shorter strokes are dropped.
    pub fn end_stroke(&mut self) -> Option<Stroke> {
        let stroke = self.in_progress.take()?;
        if stroke.len() < MIN_STROKE_POINTS {
            log::debug!("Discarding stroke with {} point(s)", stroke.len());
            return None;
        }
        self.local_pending.push(stroke.clone());
        Some(stroke)
    }

    /// Drop the in-progress stroke without committing it.
    pub fn cancel_stroke(&mut self) -> bool {
        self.in_progress.take().is_some()
    }

    /// Clear local-pending and in-progress layers.
    pub fn reset(&mut self) {
        self.local_pending.clear();
        self.in_progress = None;
    }

    /// Replace the persisted layer with a fresh server listing.
    pub fn load(&mut self, strokes: Vec<Stroke>) {
        self.persisted = strokes;
        self.reset();
    }

    /// Promote a pending stroke to persisted once the server assigned `id`.
    /// Returns false if the stroke is no longer pending.
    pub fn confirm(&mut self, key: Uuid, id: StrokeId) -> bool {
        let Some(index) = self.local_pending.iter().position(|s| s.local_key == key) else {
            return false;
        };
        let stroke = self.local_pending.remove(index).with_id(id);
        self.persisted.push(stroke);
        true
    }

    pub fn persisted(&self) -> &[Stroke] {
        &self.persisted
    }

    pub fn local_pending(&self) -> &[Stroke] {
        &self.local_pending
    }

    pub fn in_progress(&self) -> Option<&Stroke> {
        self.in_progress.as_ref()
    }

    /// Number of loaded strokes carrying a server id.
    pub fn confirmed_count(&self) -> usize {
        self.persisted.iter().filter(|s| s.id.is_some()).count()
    }

    /// Strokes in paint order: persisted, local-pending, then in-progress on top.
    pub fn paint_order(&self) -> impl Iterator<Item = &Stroke> {
        self.persisted
            .iter()
            .chain(self.local_pending.iter())
            .chain(self.in_progress.iter())
    }
}
