//! Annotation object manager: placed images, selection and gestures.
//!
//! Gestures run through a single transition function. The active gesture is
//! one [`Interaction`] value, so at most one image can be dragged, resized or
//! rotated at a time.

mod handles;
mod image;

pub use handles::{Handle, HandleKind, SelectionChrome};
pub use image::{ImageFormat, ImageId, ImageTransform, NewImage, PlacedImage, default_placement};

use crate::config::EngineConfig;
use crate::geometry::{normalize_degrees, rotated_local_offset};
use kurbo::{Point, Size, Vec2};
use std::collections::HashMap;
use std::rc::Rc;

/// The gesture currently applied to a placed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interaction {
    #[default]
    Idle,
    Dragging(usize),
    Resizing(usize),
    Rotating(usize),
}

impl Interaction {
    /// Index of the image under manipulation.
    pub fn index(&self) -> Option<usize> {
        match *self {
            Interaction::Idle => None,
            Interaction::Dragging(i) | Interaction::Resizing(i) | Interaction::Rotating(i) => Some(i),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Interaction::Idle)
    }
}

/// Input to [`ObjectManager::transition`]. Deltas are in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObjectEvent {
    Select(usize),
    ClearSelection,
    BeginDrag(usize),
    DragBy(Vec2),
    EndDrag,
    BeginResize(usize),
    ResizeBy(Vec2),
    EndResize,
    BeginRotate(usize),
    /// Horizontal drag distance.
    RotateBy(f64),
    EndRotate,
    /// Abandon the active gesture without persisting it.
    Cancel,
}

/// Remote write requested by a gesture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Write {
    UpdateTransform { image: ImageId, transform: ImageTransform },
}

/// Side effect of a transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    Redraw,
    Persist(Write),
}

/// Asks the user whether an image may be deleted.
pub trait DeleteConfirmation {
    fn confirm_delete(&self, image: &PlacedImage) -> bool;
}

impl<F> DeleteConfirmation for F
where
    F: Fn(&PlacedImage) -> bool,
{
    fn confirm_delete(&self, image: &PlacedImage) -> bool {
        self(image)
    }
}

/// Placed images of the current page plus selection and gesture state.
#[derive(Debug, Clone)]
pub struct ObjectManager {
    images: Vec<PlacedImage>,
    selected: Option<usize>,
    interaction: Interaction,
    bytes: HashMap<ImageId, Rc<[u8]>>,
    min_size: f64,
    rotate_sensitivity: f64,
}

impl ObjectManager {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            images: Vec::new(),
            selected: None,
            interaction: Interaction::Idle,
            bytes: HashMap::new(),
            min_size: config.min_image_size,
            rotate_sensitivity: config.rotate_sensitivity,
        }
    }

    /// Replace the image list, clearing selection and gestures.
    ///
    /// Cached bytes are kept for images that are still present.
    pub fn load(&mut self, images: Vec<PlacedImage>) {
        self.bytes.retain(|id, _| images.iter().any(|image| image.id == *id));
        self.images = images;
        self.selected = None;
        self.interaction = Interaction::Idle;
    }

    pub fn images(&self) -> &[PlacedImage] {
        &self.images
    }

    pub fn get(&self, index: usize) -> Option<&PlacedImage> {
        self.images.get(index)
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected_image(&self) -> Option<&PlacedImage> {
        self.selected.and_then(|i| self.images.get(i))
    }

    pub fn interaction(&self) -> Interaction {
        self.interaction
    }

    /// Topmost image containing a canonical point.
    pub fn image_at(&self, point: Point) -> Option<usize> {
        self.images.iter().rposition(|image| image.transform.contains(point))
    }

    pub fn cache_bytes(&mut self, id: ImageId, bytes: Rc<[u8]>) {
        self.bytes.insert(id, bytes);
    }

    pub fn bytes(&self, id: ImageId) -> Option<&Rc<[u8]>> {
        self.bytes.get(&id)
    }

    /// Ids with cached bytes.
    pub fn cached_ids(&self) -> Vec<ImageId> {
        self.bytes.keys().copied().collect()
    }

    /// Remove an image record and its cached bytes, clearing selection.
    pub fn remove(&mut self, id: ImageId) -> Option<PlacedImage> {
        self.bytes.remove(&id);
        let index = self.images.iter().position(|image| image.id == id)?;
        self.selected = None;
        self.interaction = Interaction::Idle;
        Some(self.images.remove(index))
    }

    /// Apply an event at the given screen-per-canonical `scale`.
    pub fn transition(&mut self, event: ObjectEvent, scale: f64) -> Vec<Effect> {
        if !scale.is_finite() || scale <= 0.0 {
            return Vec::new();
        }
        match (event, self.interaction) {
            (ObjectEvent::Select(i), _) if i < self.images.len() => {
                self.selected = Some(i);
                self.interaction = Interaction::Idle;
                vec![Effect::Redraw]
            }
            (ObjectEvent::ClearSelection, _) => {
                self.selected = None;
                self.interaction = Interaction::Idle;
                vec![Effect::Redraw]
            }
            (ObjectEvent::BeginDrag(i), Interaction::Idle) if i < self.images.len() => {
                self.begin(Interaction::Dragging(i))
            }
            (ObjectEvent::BeginResize(i), Interaction::Idle) if i < self.images.len() => {
                self.begin(Interaction::Resizing(i))
            }
            (ObjectEvent::BeginRotate(i), Interaction::Idle) if i < self.images.len() => {
                self.begin(Interaction::Rotating(i))
            }
            (ObjectEvent::DragBy(delta), Interaction::Dragging(i)) => {
                let transform = &mut self.images[i].transform;
                transform.position += delta / scale;
                vec![Effect::Redraw]
            }
            (ObjectEvent::ResizeBy(delta), Interaction::Resizing(i)) => {
                let min_size = self.min_size;
                let transform = &mut self.images[i].transform;
                let local = rotated_local_offset(delta, transform.rotation) / scale;
                transform.size = Size::new(
                    (transform.size.width + local.x).max(min_size),
                    (transform.size.height + local.y).max(min_size),
                );
                vec![Effect::Redraw]
            }
            (ObjectEvent::RotateBy(dx), Interaction::Rotating(i)) => {
                let transform = &mut self.images[i].transform;
                transform.rotation = normalize_degrees(transform.rotation + dx * self.rotate_sensitivity);
                vec![Effect::Redraw]
            }
            (ObjectEvent::EndDrag, Interaction::Dragging(i))
            | (ObjectEvent::EndResize, Interaction::Resizing(i))
            | (ObjectEvent::EndRotate, Interaction::Rotating(i)) => {
                self.interaction = Interaction::Idle;
                let image = &self.images[i];
                vec![
                    Effect::Redraw,
                    Effect::Persist(Write::UpdateTransform {
                        image: image.id,
                        transform: image.transform,
                    }),
                ]
            }
            (ObjectEvent::Cancel, active) if !active.is_idle() => {
                self.interaction = Interaction::Idle;
                vec![Effect::Redraw]
            }
            _ => Vec::new(),
        }
    }

    fn begin(&mut self, interaction: Interaction) -> Vec<Effect> {
        self.selected = interaction.index();
        self.interaction = interaction;
        vec![Effect::Redraw]
    }

    pub fn select(&mut self, index: usize) -> Vec<Effect> {
        self.transition(ObjectEvent::Select(index), 1.0)
    }

    pub fn clear_selection(&mut self) -> Vec<Effect> {
        self.transition(ObjectEvent::ClearSelection, 1.0)
    }

    pub fn begin_drag(&mut self, index: usize) -> Vec<Effect> {
        self.transition(ObjectEvent::BeginDrag(index), 1.0)
    }

    pub fn drag_by(&mut self, delta: Vec2, scale: f64) -> Vec<Effect> {
        self.transition(ObjectEvent::DragBy(delta), scale)
    }

    pub fn end_drag(&mut self) -> Vec<Effect> {
        self.transition(ObjectEvent::EndDrag, 1.0)
    }

    pub fn begin_resize(&mut self, index: usize) -> Vec<Effect> {
        self.transition(ObjectEvent::BeginResize(index), 1.0)
    }

    pub fn resize_by(&mut self, delta: Vec2, scale: f64) -> Vec<Effect> {
        self.transition(ObjectEvent::ResizeBy(delta), scale)
    }

    pub fn end_resize(&mut self) -> Vec<Effect> {
        self.transition(ObjectEvent::EndResize, 1.0)
    }

    pub fn begin_rotate(&mut self, index: usize) -> Vec<Effect> {
        self.transition(ObjectEvent::BeginRotate(index), 1.0)
    }

    pub fn rotate_by(&mut self, dx: f64) -> Vec<Effect> {
        self.transition(ObjectEvent::RotateBy(dx), 1.0)
    }

    pub fn end_rotate(&mut self) -> Vec<Effect> {
        self.transition(ObjectEvent::EndRotate, 1.0)
    }

    pub fn cancel(&mut self) -> Vec<Effect> {
        self.transition(ObjectEvent::Cancel, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn manager() -> ObjectManager {
        let mut manager = ObjectManager::new(&EngineConfig::default());
        manager.load(vec![
            PlacedImage::new(
                ImageId(1),
                1,
                ImageTransform::new(Point::new(100.0, 100.0), Size::new(200.0, 100.0), 0.0),
            ),
            PlacedImage::new(
                ImageId(2),
                1,
                ImageTransform::new(Point::new(150.0, 120.0), Size::new(100.0, 100.0), 0.0),
            ),
        ]);
        manager
    }

    fn persisted(effects: &[Effect]) -> Option<ImageTransform> {
        effects.iter().find_map(|effect| match effect {
            Effect::Persist(Write::UpdateTransform { transform, .. }) => Some(*transform),
            Effect::Redraw => None,
        })
    }

    #[test]
    fn test_select_clears_gesture() {
        let mut m = manager();
        m.begin_drag(0);
        assert_eq!(m.interaction(), Interaction::Dragging(0));
        assert_eq!(m.select(1), vec![Effect::Redraw]);
        assert_eq!(m.selected(), Some(1));
        assert!(m.interaction().is_idle());
    }

    #[test]
    fn test_drag_divides_by_scale() {
        let mut m = manager();
        m.begin_drag(0);
        m.drag_by(Vec2::new(40.0, -20.0), 0.4);
        m.drag_by(Vec2::new(4.0, 0.0), 0.4);
        let effects = m.end_drag();
        let t = persisted(&effects).unwrap();
        assert!((t.position.x - 210.0).abs() < EPS);
        assert!((t.position.y - 50.0).abs() < EPS);
        assert!(m.interaction().is_idle());
        assert_eq!(m.selected(), Some(0));
    }

    #[test]
    fn test_drag_ignores_rotation() {
        let mut m = manager();
        m.begin_rotate(0);
        m.rotate_by(90.0);
        m.end_rotate();
        m.begin_drag(0);
        m.drag_by(Vec2::new(10.0, 0.0), 1.0);
        assert!((m.get(0).unwrap().transform.position.x - 110.0).abs() < EPS);
    }

    #[test]
    fn test_resize_clamps_to_minimum() {
        let mut m = manager();
        m.begin_resize(0);
        for _ in 0..50 {
            m.resize_by(Vec2::new(-37.0, -23.0), 0.4);
            let size = m.get(0).unwrap().transform.size;
            assert!(size.width >= 30.0 && size.height >= 30.0);
        }
        let t = persisted(&m.end_resize()).unwrap();
        assert!((t.size.width - 30.0).abs() < EPS);
        assert!((t.size.height - 30.0).abs() < EPS);
    }

    #[test]
    fn test_resize_uses_local_axes() {
        let mut m = manager();
        m.begin_rotate(0);
        m.rotate_by(180.0);
        m.end_rotate();
        // Rotated 90°, a downward drag grows the image's local width.
        m.begin_resize(0);
        m.resize_by(Vec2::new(0.0, 20.0), 1.0);
        let size = m.get(0).unwrap().transform.size;
        assert!((size.width - 220.0).abs() < EPS);
        assert!((size.height - 100.0).abs() < EPS);
    }

    #[test]
    fn test_rotation_wraps() {
        let mut m = manager();
        m.begin_rotate(0);
        for _ in 0..72 {
            m.rotate_by(10.0);
        }
        let t = persisted(&m.end_rotate()).unwrap();
        assert!(t.rotation.abs() < EPS);

        m.begin_rotate(0);
        m.rotate_by(-30.0);
        assert!((m.get(0).unwrap().transform.rotation - 345.0).abs() < EPS);
    }

    #[test]
    fn test_gestures_are_mutually_exclusive() {
        let mut m = manager();
        assert!(!m.begin_drag(0).is_empty());
        assert!(m.begin_resize(0).is_empty());
        assert!(m.begin_rotate(1).is_empty());
        assert_eq!(m.interaction(), Interaction::Dragging(0));
        // Mismatched updates and ends do nothing.
        assert!(m.resize_by(Vec2::new(10.0, 10.0), 1.0).is_empty());
        assert!(m.end_rotate().is_empty());
        assert_eq!(m.interaction(), Interaction::Dragging(0));
        assert!(persisted(&m.end_drag()).is_some());
        assert!(m.end_drag().is_empty());
    }

    #[test]
    fn test_out_of_range_index_ignored() {
        let mut m = manager();
        assert!(m.select(9).is_empty());
        assert!(m.begin_drag(2).is_empty());
        assert_eq!(m.selected(), None);
        assert!(m.interaction().is_idle());
    }

    #[test]
    fn test_cancel_drops_write() {
        let mut m = manager();
        m.begin_drag(0);
        m.drag_by(Vec2::new(5.0, 5.0), 1.0);
        assert_eq!(m.cancel(), vec![Effect::Redraw]);
        assert!(m.end_drag().is_empty());
        assert!(m.cancel().is_empty());
    }

    #[test]
    fn test_image_at_prefers_topmost() {
        let m = manager();
        assert_eq!(m.image_at(Point::new(160.0, 130.0)), Some(1));
        assert_eq!(m.image_at(Point::new(110.0, 110.0)), Some(0));
        assert_eq!(m.image_at(Point::new(10.0, 10.0)), None);
    }

    #[test]
    fn test_remove_evicts_bytes() {
        let mut m = manager();
        m.cache_bytes(ImageId(1), Rc::from(vec![1u8, 2, 3]));
        m.cache_bytes(ImageId(2), Rc::from(vec![4u8]));
        m.select(0);
        let removed = m.remove(ImageId(1)).unwrap();
        assert_eq!(removed.id, ImageId(1));
        assert!(m.bytes(ImageId(1)).is_none());
        assert!(m.bytes(ImageId(2)).is_some());
        assert_eq!(m.selected(), None);
        assert_eq!(m.images().len(), 1);
    }

    #[test]
    fn test_load_keeps_bytes_of_surviving_images() {
        let mut m = manager();
        m.cache_bytes(ImageId(1), Rc::from(vec![1u8]));
        m.cache_bytes(ImageId(2), Rc::from(vec![2u8]));
        m.select(1);
        let survivor = m.get(0).unwrap().clone();
        m.load(vec![survivor]);
        assert!(m.bytes(ImageId(1)).is_some());
        assert!(m.bytes(ImageId(2)).is_none());
        assert_eq!(m.selected(), None);
        assert_eq!(m.cached_ids(), vec![ImageId(1)]);
    }

    #[test]
    fn test_closure_confirmation() {
        let m = manager();
        let image = m.get(0).unwrap();
        assert!((|_: &PlacedImage| true).confirm_delete(image));
        assert!(!(|_: &PlacedImage| false).confirm_delete(image));
    }
}
