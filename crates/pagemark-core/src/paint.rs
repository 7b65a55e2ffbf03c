//! Backend-agnostic display list.
//!
//! Hosts rasterize the list with whatever renderer they use. Everything is in
//! screen space except images, which carry their canonical rect and the
//! transform (fit plus rotation) that places it on screen.

use crate::config::EngineConfig;
use crate::geometry::PageFit;
use crate::objects::{Handle, ImageId, ObjectManager, SelectionChrome};
use crate::strokes::StrokeStore;
use kurbo::{Affine, BezPath, Point, Rect};
use peniko::Color;
use std::rc::Rc;

/// One drawing command.
#[derive(Debug, Clone)]
pub enum PaintItem {
    /// The page raster stretched over `rect`.
    Raster { rect: Rect, bytes: Rc<[u8]> },
    /// Stand-in for a page raster that is missing or unreadable.
    PagePlaceholder { rect: Rect },
    /// A placed image. `bytes` is `None` when they are not fetched yet.
    Image {
        id: ImageId,
        rect: Rect,
        transform: Affine,
        bytes: Option<Rc<[u8]>>,
    },
    Stroke { path: BezPath, color: Color, width: f64 },
    /// Closed outline of the selected image.
    Outline { points: [Point; 4], color: Color },
    /// Connector from the image's top edge to the rotate handle.
    ArmLine { from: Point, to: Point, color: Color },
    Handle { handle: Handle, radius: f64, color: Color },
}

/// Ordered drawing commands; later items draw on top.
#[derive(Debug, Clone, Default)]
pub struct DisplayList {
    pub items: Vec<PaintItem>,
}

impl DisplayList {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PaintItem> {
        self.items.iter()
    }
}

/// Inputs for one frame.
pub struct PaintContext<'a> {
    pub fit: PageFit,
    pub raster: Option<&'a Rc<[u8]>>,
    pub strokes: &'a StrokeStore,
    pub objects: &'a ObjectManager,
    /// Rotate arm length in screen pixels.
    pub arm_length: f64,
    /// Drawn handle radius in screen pixels.
    pub handle_radius: f64,
    pub selection_color: Color,
}

impl<'a> PaintContext<'a> {
    /// Chrome geometry and color come from `config`.
    pub fn new(fit: PageFit, strokes: &'a StrokeStore, objects: &'a ObjectManager, config: &EngineConfig) -> Self {
        Self {
            fit,
            raster: None,
            strokes,
            objects,
            arm_length: config.rotate_arm_length,
            handle_radius: config.handle_radius,
            selection_color: config.selection_color.into(),
        }
    }

    pub fn with_raster(mut self, raster: Option<&'a Rc<[u8]>>) -> Self {
        self.raster = raster;
        self
    }

    /// Build the display list: page, images, strokes, then selection chrome.
    pub fn build(&self) -> DisplayList {
        let mut items = Vec::new();
        let fit = &self.fit;

        match self.raster {
            Some(bytes) if !fit.is_degenerate() => items.push(PaintItem::Raster {
                rect: fit.rect,
                bytes: bytes.clone(),
            }),
            _ => items.push(PaintItem::PagePlaceholder { rect: fit.rect }),
        }

        let to_screen = fit.transform();
        for image in self.objects.images() {
            let t = &image.transform;
            items.push(PaintItem::Image {
                id: image.id,
                rect: t.rect(),
                transform: to_screen * Affine::rotate_about(t.rotation.to_radians(), t.center()),
                bytes: self.objects.bytes(image.id).cloned(),
            });
        }

        let scale = fit.scale();
        for stroke in self.strokes.paint_order() {
            items.push(PaintItem::Stroke {
                path: to_screen * stroke.to_path(),
                color: stroke.paint_color(),
                width: stroke.width * scale,
            });
        }

        if let Some(image) = self.objects.selected_image() {
            let chrome = SelectionChrome::new(&image.transform, fit, self.arm_length);
            let color = self.selection_color;
            items.push(PaintItem::Outline {
                points: chrome.outline,
                color,
            });
            items.push(PaintItem::ArmLine {
                from: chrome.arm_start,
                to: chrome.rotate.position,
                color,
            });
            for handle in [chrome.rotate, chrome.resize] {
                items.push(PaintItem::Handle {
                    handle,
                    radius: self.handle_radius,
                    color,
                });
            }
        }

        DisplayList { items }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::objects::{HandleKind, ImageTransform, PlacedImage};
    use crate::strokes::{StrokeColor, ToolKind};
    use kurbo::Size;

    fn fit() -> PageFit {
        PageFit::contain(Size::new(800.0, 600.0), Size::new(1000.0, 1500.0))
    }

    fn objects() -> ObjectManager {
        let mut objects = ObjectManager::new(&EngineConfig::default());
        objects.load(vec![PlacedImage::new(
            ImageId(1),
            1,
            ImageTransform::new(Point::new(100.0, 100.0), Size::new(200.0, 100.0), 0.0),
        )]);
        objects
    }

    fn strokes() -> StrokeStore {
        let mut strokes = StrokeStore::default();
        strokes.begin_stroke(1, ToolKind::Pen, StrokeColor::black(), 5.0, 0.5);
        strokes.append_point(Point::new(0.0, 0.0));
        strokes.append_point(Point::new(250.0, 250.0));
        strokes
    }

    #[test]
    fn test_paint_order() {
        let raster: Rc<[u8]> = Rc::from(vec![1u8]);
        let strokes = strokes();
        let mut objects = objects();
        objects.select(0);
        let list = PaintContext::new(fit(), &strokes, &objects, &EngineConfig::default())
            .with_raster(Some(&raster))
            .build();

        let kinds: Vec<_> = list
            .iter()
            .map(|item| match item {
                PaintItem::Raster { .. } => "raster",
                PaintItem::PagePlaceholder { .. } => "placeholder",
                PaintItem::Image { .. } => "image",
                PaintItem::Stroke { .. } => "stroke",
                PaintItem::Outline { .. } => "outline",
                PaintItem::ArmLine { .. } => "arm",
                PaintItem::Handle { .. } => "handle",
            })
            .collect();
        assert_eq!(kinds, vec!["raster", "image", "stroke", "outline", "arm", "handle", "handle"]);
    }

    #[test]
    fn test_stroke_in_screen_space() {
        let strokes = strokes();
        let objects = ObjectManager::new(&EngineConfig::default());
        let list = PaintContext::new(fit(), &strokes, &objects, &EngineConfig::default()).build();
        let PaintItem::Stroke { path, width, color } = &list.items[1] else {
            panic!("expected stroke, got {:?}", list.items[1]);
        };
        assert!((width - 2.0).abs() < 1e-9);
        assert_eq!(color.to_rgba8().a, 128);
        let end = path.elements().last().and_then(|el| el.end_point()).unwrap();
        assert!((end.x - 300.0).abs() < 1e-9);
        assert!((end.y - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_raster_and_bytes_use_placeholders() {
        let strokes = StrokeStore::default();
        let objects = objects();
        let list = PaintContext::new(fit(), &strokes, &objects, &EngineConfig::default()).build();
        assert!(matches!(list.items[0], PaintItem::PagePlaceholder { .. }));
        assert!(matches!(list.items[1], PaintItem::Image { bytes: None, .. }));
    }

    #[test]
    fn test_rotated_image_transform() {
        let strokes = StrokeStore::default();
        let mut objects = objects();
        objects.begin_rotate(0);
        objects.rotate_by(180.0);
        objects.end_rotate();
        let list = PaintContext::new(fit(), &strokes, &objects, &EngineConfig::default()).build();
        let PaintItem::Image { rect, transform, .. } = &list.items[1] else {
            panic!("expected image");
        };
        // Top-left corner rotates 90° about the center (200, 150).
        let corner = *transform * Point::new(rect.x0, rect.y0);
        let expected = fit().to_screen(Point::new(250.0, 50.0));
        assert!((corner.x - expected.x).abs() < 1e-9);
        assert!((corner.y - expected.y).abs() < 1e-9);
    }

    #[test]
    fn test_selection_handles() {
        let strokes = StrokeStore::default();
        let mut objects = objects();
        objects.select(0);
        let list = PaintContext::new(fit(), &strokes, &objects, &EngineConfig::default()).build();
        let handles: Vec<_> = list
            .iter()
            .filter_map(|item| match item {
                PaintItem::Handle { handle, .. } => Some(handle.kind),
                _ => None,
            })
            .collect();
        assert_eq!(handles, vec![HandleKind::Rotate, HandleKind::Resize]);
    }

    #[test]
    fn test_chrome_follows_config() {
        let strokes = StrokeStore::default();
        let mut objects = objects();
        objects.select(0);
        let config = EngineConfig {
            rotate_arm_length: 25.0,
            handle_radius: 9.0,
            selection_color: StrokeColor::from_hex("#ff0000"),
            ..EngineConfig::default()
        };
        let list = PaintContext::new(fit(), &strokes, &objects, &config).build();

        let arm = list.iter().find(|item| matches!(item, PaintItem::ArmLine { .. }));
        let Some(PaintItem::ArmLine { from, to, color }) = arm else {
            panic!("expected arm line");
        };
        assert!((from.distance(*to) - 25.0).abs() < 1e-9);
        assert_eq!(color.to_rgba8().r, 255);
        for item in list.iter() {
            if let PaintItem::Handle { radius, .. } = item {
                assert!((radius - 9.0).abs() < 1e-9);
            }
        }
    }
}
