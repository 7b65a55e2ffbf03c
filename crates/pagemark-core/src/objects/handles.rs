//! Selection handles for placed images.
//!
//! Handle geometry is computed in screen space so the hit radius and the
//! rotate arm stay a constant number of pixels at any zoom.

use super::ImageTransform;
use crate::geometry::{PageFit, rotate_offset};
use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};

/// Type of selection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandleKind {
    /// Bottom-right corner; drags change width and height.
    Resize,
    /// Above the top edge at the end of the arm.
    Rotate,
}

/// A selection handle with its position and type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Handle {
    /// Position in screen coordinates.
    pub position: Point,
    pub kind: HandleKind,
}

impl Handle {
    pub fn new(position: Point, kind: HandleKind) -> Self {
        Self { position, kind }
    }

    /// Check if a screen point hits this handle.
    pub fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        let dx = point.x - self.position.x;
        let dy = point.y - self.position.y;
        dx * dx + dy * dy <= tolerance * tolerance
    }
}

/// Screen-space decoration of the selected image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionChrome {
    /// Rotated corners: top-left, top-right, bottom-right, bottom-left.
    pub outline: [Point; 4],
    /// Rotated top-center, where the arm line starts.
    pub arm_start: Point,
    pub rotate: Handle,
    pub resize: Handle,
}

impl SelectionChrome {
    /// Lay out handles for `transform` displayed under `fit`.
    pub fn new(transform: &ImageTransform, fit: &PageFit, arm_length: f64) -> Self {
        let center = fit.to_screen(transform.center());
        let scale = fit.scale();
        let half_w = transform.size.width * scale / 2.0;
        let half_h = transform.size.height * scale / 2.0;
        let rotation = transform.rotation;

        let rotate_point = |dx: f64, dy: f64| -> Point { center + rotate_offset(Vec2::new(dx, dy), rotation) };

        Self {
            outline: [
                rotate_point(-half_w, -half_h),
                rotate_point(half_w, -half_h),
                rotate_point(half_w, half_h),
                rotate_point(-half_w, half_h),
            ],
            arm_start: rotate_point(0.0, -half_h),
            rotate: Handle::new(rotate_point(0.0, -(half_h + arm_length)), HandleKind::Rotate),
            resize: Handle::new(rotate_point(half_w, half_h), HandleKind::Resize),
        }
    }

    /// Find which handle, if any, is under a screen point. The rotate handle
    /// wins when both are in range.
    pub fn hit_test(&self, point: Point, tolerance: f64) -> Option<HandleKind> {
        [self.rotate, self.resize]
            .into_iter()
            .find(|handle| handle.hit_test(point, tolerance))
            .map(|handle| handle.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Size;

    const EPS: f64 = 1e-9;

    fn unit_fit() -> PageFit {
        PageFit::contain(Size::new(1000.0, 1000.0), Size::new(1000.0, 1000.0))
    }

    fn assert_near(a: Point, b: Point) {
        assert!((a.x - b.x).abs() < EPS && (a.y - b.y).abs() < EPS, "{a:?} != {b:?}");
    }

    #[test]
    fn test_handles_unrotated() {
        let t = ImageTransform::new(Point::new(100.0, 100.0), Size::new(200.0, 100.0), 0.0);
        let chrome = SelectionChrome::new(&t, &unit_fit(), 40.0);
        assert_near(chrome.resize.position, Point::new(300.0, 200.0));
        assert_near(chrome.rotate.position, Point::new(200.0, 60.0));
        assert_near(chrome.arm_start, Point::new(200.0, 100.0));
        assert_near(chrome.outline[0], Point::new(100.0, 100.0));
    }

    #[test]
    fn test_handles_rotated_quarter_turn() {
        let t = ImageTransform::new(Point::new(100.0, 100.0), Size::new(200.0, 100.0), 90.0);
        let chrome = SelectionChrome::new(&t, &unit_fit(), 40.0);
        // Center (200, 150); offsets rotate clockwise on screen.
        assert_near(chrome.resize.position, Point::new(150.0, 250.0));
        assert_near(chrome.rotate.position, Point::new(290.0, 150.0));
    }

    #[test]
    fn test_arm_length_is_screen_space() {
        let fit = PageFit::contain(Size::new(800.0, 600.0), Size::new(1000.0, 1500.0));
        let t = ImageTransform::new(Point::new(0.0, 0.0), Size::new(100.0, 100.0), 0.0);
        let chrome = SelectionChrome::new(&t, &fit, 40.0);
        assert!((chrome.arm_start.y - chrome.rotate.position.y - 40.0).abs() < EPS);
        assert_near(chrome.resize.position, Point::new(240.0, 40.0));
    }

    #[test]
    fn test_hit_test_prefers_rotate() {
        let t = ImageTransform::new(Point::new(0.0, 0.0), Size::new(10.0, 10.0), 0.0);
        let chrome = SelectionChrome::new(&t, &unit_fit(), 5.0);
        // Rotate handle at (5, -5), resize at (10, 10).
        assert_eq!(chrome.hit_test(Point::new(6.0, -4.0), 3.0), Some(HandleKind::Rotate));
        assert_eq!(chrome.hit_test(Point::new(10.0, 11.0), 3.0), Some(HandleKind::Resize));
        assert_eq!(chrome.hit_test(Point::new(50.0, 50.0), 3.0), None);
        assert_eq!(chrome.hit_test(Point::new(8.0, 2.0), 100.0), Some(HandleKind::Rotate));
    }
}
