// THEORY:
// The `geometry` module provides the comparative "lenses" the feature extractor
// looks through. A point on its own means nothing to the posture score; only its
// relation to other points does, so everything here takes two or three points and
// returns a distance or an angle.
//
// All inputs are expected in normalized frame coordinates (0..1 on both axes) so the
// resulting features are independent of camera resolution.

pub type Distance = f64;
pub type Degrees = f64;

/// Angle reported when one of the rays has zero length.
pub const DEGENERATE_ANGLE: Degrees = 180.0;

/// A 2D point in normalized frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance_to(&self, other: &Point) -> Distance {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn midpoint(&self, other: &Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    /// The angle at `self` between the rays towards `a` and `c`, in degrees [0, 180].
    ///
    /// A zero-length ray has no direction; the angle is then defined as
    /// [`DEGENERATE_ANGLE`].
    pub fn angle_between(&self, a: &Point, c: &Point) -> Degrees {
        let (ax, ay) = (a.x - self.x, a.y - self.y);
        let (cx, cy) = (c.x - self.x, c.y - self.y);
        let magnitude = ax.hypot(ay) * cx.hypot(cy);

        if magnitude == 0.0 || !magnitude.is_finite() {
            return DEGENERATE_ANGLE;
        }

        let cosine = ((ax * cx + ay * cy) / magnitude).clamp(-1.0, 1.0);
        cosine.acos().to_degrees()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn distance_is_euclidean() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(0.3, 0.4);
        assert!((a.distance_to(&b) - 0.5).abs() < EPS);
        assert!((b.distance_to(&a) - 0.5).abs() < EPS);
    }

    #[test]
    fn midpoint_is_halfway() {
        let m = Point::new(0.35, 0.5).midpoint(&Point::new(0.65, 0.5));
        assert!((m.x - 0.5).abs() < EPS);
        assert!((m.y - 0.5).abs() < EPS);
    }

    #[test]
    fn right_and_straight_angles() {
        let b = Point::new(0.0, 0.0);
        assert!((b.angle_between(&Point::new(1.0, 0.0), &Point::new(0.0, 1.0)) - 90.0).abs() < EPS);
        assert!((b.angle_between(&Point::new(1.0, 0.0), &Point::new(-2.0, 0.0)) - 180.0).abs() < EPS);
        assert!(b.angle_between(&Point::new(1.0, 0.0), &Point::new(2.0, 0.0)).abs() < EPS);
        assert!(b.angle_between(&Point::new(1.0, 1.0), &Point::new(2.0, 2.0)).abs() < 1e-5);
    }

    #[test]
    fn zero_length_ray_is_degenerate() {
        let b = Point::new(0.5, 0.5);
        assert_eq!(b.angle_between(&b, &Point::new(1.0, 0.0)), DEGENERATE_ANGLE);
        assert_eq!(b.angle_between(&Point::new(1.0, 0.0), &b), DEGENERATE_ANGLE);
    }
}
