//! Viewport ↔ canonical coordinate mapping.
//!
//! Canonical space is the pixel space of the server-rendered page raster at
//! the configured DPI. The page is shown inside the viewport with "contain"
//! fitting; [`PageFit`] captures that placement and converts points both ways.

use kurbo::{Affine, Point, Rect, Size, Vec2};
use serde::{Deserialize, Serialize};

/// PDF user-space units per inch.
pub const POINTS_PER_INCH: f64 = 72.0;

/// Placement of the page raster inside the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageFit {
    /// Displayed page rectangle in screen coordinates.
    pub rect: Rect,
    /// Canonical page size.
    pub page: Size,
    degenerate: bool,
}

impl PageFit {
    /// Fit `page` inside `viewport`, preserving aspect ratio, centered.
    ///
    /// A page with a zero dimension (raster not loaded or unreadable) maps to
    /// the whole viewport with identity conversions. A zero-sized viewport is
    /// treated the same way.
    pub fn contain(viewport: Size, page: Size) -> Self {
        let scale = (viewport.width / page.width).min(viewport.height / page.height);
        if page.width <= 0.0 || page.height <= 0.0 || !scale.is_finite() || scale <= 0.0 {
            return Self {
                rect: Rect::from_origin_size(Point::ZERO, viewport),
                page,
                degenerate: true,
            };
        }

        let width = page.width * scale;
        let height = page.height * scale;
        let dx = (viewport.width - width) / 2.0;
        let dy = (viewport.height - height) / 2.0;
        Self {
            rect: Rect::new(dx, dy, dx + width, dy + height),
            page,
            degenerate: false,
        }
    }

    /// Whether conversions are the identity because the page size is unknown.
    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }

    /// Screen pixels per canonical unit.
    pub fn scale(&self) -> f64 {
        if self.degenerate {
            1.0
        } else {
            self.rect.width() / self.page.width
        }
    }

    /// Convert a screen point to canonical space.
    pub fn to_canonical(&self, screen: Point) -> Point {
        if self.degenerate {
            return screen;
        }
        let scale = self.scale();
        Point::new(
            (screen.x - self.rect.x0) / scale,
            (screen.y - self.rect.y0) / scale,
        )
    }

    /// Convert a canonical point to screen space.
    pub fn to_screen(&self, canonical: Point) -> Point {
        if self.degenerate {
            return canonical;
        }
        let scale = self.scale();
        Point::new(
            canonical.x * scale + self.rect.x0,
            canonical.y * scale + self.rect.y0,
        )
    }

    /// Affine transform from canonical to screen space.
    pub fn transform(&self) -> Affine {
        if self.degenerate {
            return Affine::IDENTITY;
        }
        Affine::translate(self.rect.origin().to_vec2()) * Affine::scale(self.scale())
    }
}

/// Rotate a screen-space delta into the local (unrotated) frame of an object
/// rotated by `degrees`.
pub fn rotated_local_offset(delta: Vec2, degrees: f64) -> Vec2 {
    let (sin, cos) = degrees.to_radians().sin_cos();
    Vec2::new(delta.x * cos + delta.y * sin, -delta.x * sin + delta.y * cos)
}

/// Rotate a local-frame offset by `degrees` into screen axes.
///
/// Inverse of [`rotated_local_offset`].
pub fn rotate_offset(local: Vec2, degrees: f64) -> Vec2 {
    let (sin, cos) = degrees.to_radians().sin_cos();
    Vec2::new(local.x * cos - local.y * sin, local.x * sin + local.y * cos)
}

/// Wrap an angle in degrees into `[0, 360)`.
pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees % 360.0;
    let wrapped = if wrapped < 0.0 { wrapped + 360.0 } else { wrapped };
    // -1e-17 % 360 + 360 rounds to exactly 360
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Convert a canonical length at `dpi` to PDF points.
pub fn canonical_to_points(value: f64, dpi: u32) -> f64 {
    value * POINTS_PER_INCH / f64::from(dpi)
}

/// Convert a length in PDF points to canonical pixels at `dpi`.
pub fn points_to_canonical(value: f64, dpi: u32) -> f64 {
    value * f64::from(dpi) / POINTS_PER_INCH
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn example_fit() -> PageFit {
        PageFit::contain(Size::new(800.0, 600.0), Size::new(1000.0, 1500.0))
    }

    #[test]
    fn test_contain_fit_example() {
        let fit = example_fit();
        assert!((fit.scale() - 0.4).abs() < EPS);
        assert!((fit.rect.width() - 400.0).abs() < EPS);
        assert!((fit.rect.height() - 600.0).abs() < EPS);
        assert!((fit.rect.x0 - 200.0).abs() < EPS);
        assert!(fit.rect.y0.abs() < EPS);
    }

    #[test]
    fn test_screen_to_canonical_example() {
        let fit = example_fit();
        let p = fit.to_canonical(Point::new(300.0, 100.0));
        assert!((p.x - 250.0).abs() < EPS);
        assert!((p.y - 250.0).abs() < EPS);

        let p = fit.to_canonical(Point::new(300.0, 200.0));
        assert!((p.x - 250.0).abs() < EPS);
        assert!((p.y - 500.0).abs() < EPS);
    }

    #[test]
    fn test_roundtrip_conversion() {
        let cases = [
            (Size::new(800.0, 600.0), Size::new(1000.0, 1500.0)),
            (Size::new(1920.0, 1080.0), Size::new(1275.0, 1650.0)),
            (Size::new(333.0, 777.0), Size::new(2480.0, 3508.0)),
            (Size::new(50.0, 50.0), Size::new(7.0, 3.0)),
        ];
        let points = [
            Point::new(0.0, 0.0),
            Point::new(123.456, 789.012),
            Point::new(1000.0, 1500.0),
            Point::new(-15.5, 2.25),
        ];
        for (viewport, page) in cases {
            let fit = PageFit::contain(viewport, page);
            for original in points {
                let back = fit.to_canonical(fit.to_screen(original));
                assert!((back.x - original.x).abs() < 1e-9, "{viewport:?} {page:?} {original:?}");
                assert!((back.y - original.y).abs() < 1e-9, "{viewport:?} {page:?} {original:?}");
            }
        }
    }

    #[test]
    fn test_degenerate_page_is_identity() {
        let fit = PageFit::contain(Size::new(800.0, 600.0), Size::ZERO);
        assert!(fit.is_degenerate());
        assert_eq!(fit.rect, Rect::new(0.0, 0.0, 800.0, 600.0));
        let p = Point::new(37.0, 91.5);
        assert_eq!(fit.to_canonical(p), p);
        assert_eq!(fit.to_screen(p), p);
        assert_eq!(fit.transform(), Affine::IDENTITY);
    }

    #[test]
    fn test_zero_viewport_is_identity() {
        let fit = PageFit::contain(Size::ZERO, Size::new(1000.0, 1500.0));
        assert!(fit.is_degenerate());
        let p = Point::new(4.0, 5.0);
        assert_eq!(fit.to_canonical(p), p);
    }

    #[test]
    fn test_transform_matches_to_screen() {
        let fit = example_fit();
        let p = Point::new(250.0, 500.0);
        let a = fit.transform() * p;
        let b = fit.to_screen(p);
        assert!((a.x - b.x).abs() < EPS);
        assert!((a.y - b.y).abs() < EPS);
    }

    #[test]
    fn test_rotated_local_offset() {
        let d = rotated_local_offset(Vec2::new(10.0, 0.0), 0.0);
        assert!((d.x - 10.0).abs() < EPS && d.y.abs() < EPS);

        // A rightward drag on an image rotated 90° moves along its local -y axis.
        let d = rotated_local_offset(Vec2::new(10.0, 0.0), 90.0);
        assert!(d.x.abs() < EPS);
        assert!((d.y + 10.0).abs() < EPS);

        let d = rotated_local_offset(Vec2::new(0.0, 10.0), 90.0);
        assert!((d.x - 10.0).abs() < EPS);
        assert!(d.y.abs() < EPS);
    }

    #[test]
    fn test_rotate_offset_inverts_local_offset() {
        let delta = Vec2::new(13.0, -7.5);
        for degrees in [0.0, 30.0, 90.0, 181.0, 359.0] {
            let back = rotate_offset(rotated_local_offset(delta, degrees), degrees);
            assert!((back.x - delta.x).abs() < EPS);
            assert!((back.y - delta.y).abs() < EPS);
        }
    }

    #[test]
    fn test_normalize_degrees() {
        assert!((normalize_degrees(0.0)).abs() < EPS);
        assert!((normalize_degrees(360.0)).abs() < EPS);
        assert!((normalize_degrees(-90.0) - 270.0).abs() < EPS);
        assert!((normalize_degrees(725.0) - 5.0).abs() < EPS);
        assert!((normalize_degrees(-720.0)).abs() < EPS);
        assert!(normalize_degrees(-1e-17) < 360.0);
    }

    #[test]
    fn test_points_conversion() {
        assert!((canonical_to_points(150.0, 150) - 72.0).abs() < EPS);
        assert!((points_to_canonical(612.0, 150) - 1275.0).abs() < EPS);
    }
}
