use serde::{Deserialize, Serialize};

/// A 2D point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn zero() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    /// Linear interpolation between two points.
    pub fn lerp(&self, other: &Point2D, t: f64) -> Point2D {
        Point2D {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }
}

impl Default for Point2D {
    fn default() -> Self {
        Self::zero()
    }
}

/// A 2D size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size2D {
    pub width: f64,
    pub height: f64,
}

impl Size2D {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Compute the aspect ratio (width / height).
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0.0 {
            return 0.0;
        }
        self.width / self.height
    }

    pub fn center(&self) -> Point2D {
        Point2D::new(self.width / 2.0, self.height / 2.0)
    }

    /// Width and height exchanged.
    pub fn transposed(&self) -> Size2D {
        Size2D::new(self.height, self.width)
    }
}

/// An axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rect {
    pub fn from_size(size: Size2D) -> Self {
        Self {
            x0: 0.0,
            y0: 0.0,
            x1: size.width,
            y1: size.height,
        }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }
}

/// A 2D affine transform stored as `[a, b, c, d, e, f]`:
///
/// ```text
/// x' = a*x + c*y + e
/// y' = b*x + d*y + f
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Affine2D(pub [f64; 6]);

impl Affine2D {
    pub const IDENTITY: Affine2D = Affine2D([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    pub fn translate(tx: f64, ty: f64) -> Self {
        Affine2D([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Affine2D([sx, 0.0, 0.0, sy, 0.0, 0.0])
    }

    /// Rotation by `radians`. With y pointing down, positive angles turn clockwise on screen.
    pub fn rotate(radians: f64) -> Self {
        let (s, c) = radians.sin_cos();
        Affine2D([c, s, -s, c, 0.0, 0.0])
    }

    /// `inner` applied about `pivot` instead of the origin.
    pub fn about(pivot: Point2D, inner: Affine2D) -> Self {
        Affine2D::translate(-pivot.x, -pivot.y)
            .then(&inner)
            .then(&Affine2D::translate(pivot.x, pivot.y))
    }

    /// The transform that applies `self` first, then `next`.
    pub fn then(&self, next: &Affine2D) -> Affine2D {
        let [a1, b1, c1, d1, e1, f1] = self.0;
        let [a2, b2, c2, d2, e2, f2] = next.0;
        Affine2D([
            a2 * a1 + c2 * b1,
            b2 * a1 + d2 * b1,
            a2 * c1 + c2 * d1,
            b2 * c1 + d2 * d1,
            a2 * e1 + c2 * f1 + e2,
            b2 * e1 + d2 * f1 + f2,
        ])
    }

    pub fn determinant(&self) -> f64 {
        let [a, b, c, d, _, _] = self.0;
        a * d - b * c
    }

    /// Inverse transform, or `None` when the matrix is singular.
    pub fn inverse(&self) -> Option<Affine2D> {
        let det = self.determinant();
        if det.abs() < 1e-12 || !det.is_finite() {
            return None;
        }
        let [a, b, c, d, e, f] = self.0;
        let inv = 1.0 / det;
        Some(Affine2D([
            d * inv,
            -b * inv,
            -c * inv,
            a * inv,
            (c * f - d * e) * inv,
            (b * e - a * f) * inv,
        ]))
    }

    pub fn apply(&self, p: Point2D) -> Point2D {
        let [a, b, c, d, e, f] = self.0;
        Point2D::new(a * p.x + c * p.y + e, b * p.x + d * p.y + f)
    }

    /// Bounding box of `rect` after transformation.
    pub fn transform_rect_bbox(&self, rect: Rect) -> Rect {
        let corners = [
            self.apply(Point2D::new(rect.x0, rect.y0)),
            self.apply(Point2D::new(rect.x1, rect.y0)),
            self.apply(Point2D::new(rect.x0, rect.y1)),
            self.apply(Point2D::new(rect.x1, rect.y1)),
        ];
        let mut out = Rect {
            x0: f64::INFINITY,
            y0: f64::INFINITY,
            x1: f64::NEG_INFINITY,
            y1: f64::NEG_INFINITY,
        };
        for p in corners {
            out.x0 = out.x0.min(p.x);
            out.y0 = out.y0.min(p.y);
            out.x1 = out.x1.max(p.x);
            out.y1 = out.y1.max(p.y);
        }
        out
    }

    /// True for 90° and 270° rotations (with or without mirroring), where the
    /// displayed width and height are swapped relative to the stored frame.
    pub fn is_quarter_turn(&self) -> bool {
        let [a, b, c, d, _, _] = self.0;
        a.abs() < 1e-6 && d.abs() < 1e-6 && b.abs() > 1e-6 && c.abs() > 1e-6
    }
}

impl Default for Affine2D {
    fn default() -> Self {
        Self::IDENTITY
    }
}
