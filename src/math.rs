use glam::{IVec2, Vec2};

/// Axis-aligned box in world space (meters). `min` is the bottom-left
/// corner, `max` the top-right (world Y grows upward).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Box2 {
    pub min: Vec2,
    pub max: Vec2,
}

impl Box2 {
    pub const fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Box of the given size centered on a point.
    pub fn centered_around(center: Vec2, size: Vec2) -> Self {
        let half = size * 0.5;
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Smallest box containing all of the given points.
    pub fn from_points(points: &[Vec2]) -> Self {
        let mut min = Vec2::INFINITY;
        let mut max = Vec2::NEG_INFINITY;
        for p in points {
            min = min.min(*p);
            max = max.max(*p);
        }
        Self { min, max }
    }

    /// Grow the box outward by `margin` on every side.
    pub fn enlarged(self, margin: f32) -> Self {
        Self {
            min: self.min - Vec2::splat(margin),
            max: self.max + Vec2::splat(margin),
        }
    }

    pub fn size(self) -> Vec2 {
        self.max - self.min
    }

    pub fn contains(self, point: Vec2) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }

    pub fn intersects(self, other: Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }
}

/// Axis-aligned box in integer pixel space. Used for viewport rectangles
/// and scissor state. The viewport convention is framebuffer-style: `min`
/// is the bottom-left corner of the rect, measured from the bottom of the
/// render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Box2i {
    pub min: IVec2,
    pub max: IVec2,
}

impl Box2i {
    pub const fn new(min: IVec2, max: IVec2) -> Self {
        Self { min, max }
    }

    pub fn from_dimensions(origin: IVec2, size: IVec2) -> Self {
        Self {
            min: origin,
            max: origin + size,
        }
    }

    pub fn size(self) -> IVec2 {
        self.max - self.min
    }

    pub fn width(self) -> i32 {
        self.max.x - self.min.x
    }

    pub fn height(self) -> i32 {
        self.max.y - self.min.y
    }

    /// Intersection with another box; zero-size result if disjoint.
    pub fn intersection(self, other: Self) -> Self {
        let min = self.min.max(other.min);
        let max = self.max.min(other.max).max(min);
        Self { min, max }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::vec2;

    #[test]
    fn test_centered_around() {
        let b = Box2::centered_around(vec2(10.0, -4.0), vec2(4.0, 2.0));
        assert_eq!(b.min, vec2(8.0, -5.0));
        assert_eq!(b.max, vec2(12.0, -3.0));
        assert_eq!(b.size(), vec2(4.0, 2.0));
    }

    #[test]
    fn test_from_points_covers_all() {
        let pts = [vec2(3.0, 1.0), vec2(-2.0, 7.0), vec2(0.5, -1.5), vec2(4.0, 4.0)];
        let b = Box2::from_points(&pts);
        assert_eq!(b.min, vec2(-2.0, -1.5));
        assert_eq!(b.max, vec2(4.0, 7.0));
        for p in pts {
            assert!(b.contains(p));
        }
    }

    #[test]
    fn test_enlarged() {
        let b = Box2::new(vec2(0.0, 0.0), vec2(1.0, 1.0)).enlarged(5.0);
        assert_eq!(b.min, vec2(-5.0, -5.0));
        assert_eq!(b.max, vec2(6.0, 6.0));
    }

    #[test]
    fn test_box2i_from_dimensions() {
        let b = Box2i::from_dimensions(IVec2::new(-3, 2), IVec2::new(10, 20));
        assert_eq!(b.min, IVec2::new(-3, 2));
        assert_eq!(b.max, IVec2::new(7, 22));
        assert_eq!(b.width(), 10);
        assert_eq!(b.height(), 20);
    }

    #[test]
    fn test_box2i_intersection() {
        let a = Box2i::from_dimensions(IVec2::ZERO, IVec2::new(10, 10));
        let b = Box2i::from_dimensions(IVec2::new(5, 5), IVec2::new(10, 10));
        let i = a.intersection(b);
        assert_eq!(i.min, IVec2::new(5, 5));
        assert_eq!(i.max, IVec2::new(10, 10));

        let far = Box2i::from_dimensions(IVec2::new(50, 50), IVec2::new(2, 2));
        assert_eq!(a.intersection(far).size(), IVec2::ZERO);
    }
}
