mod manager;

pub use manager::{EyeManager, NOMINAL_VIEWPORT_HEIGHT, PIXELS_PER_METER, VERTICAL_HALF_EXTENT_TILES};

use glam::{Mat3, Vec2};

/// Identifier of a game map. `NULLSPACE` is the "no map" sentinel; a
/// viewport whose eye sits in nullspace draws no world content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MapId(pub i32);

impl MapId {
    pub const NULLSPACE: Self = Self(0);
}

/// A world position paired with the map it lives on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapCoordinates {
    pub position: Vec2,
    pub map_id: MapId,
}

impl MapCoordinates {
    pub const fn new(position: Vec2, map_id: MapId) -> Self {
        Self { position, map_id }
    }
}

/// Camera state: where the world is viewed from. Read once per frame by
/// the renderer; mutating it mid-frame has no effect on the frame in
/// flight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Eye {
    pub position: MapCoordinates,
    pub zoom: Vec2,
    /// Rotation in radians, counter-clockwise.
    pub rotation: f32,
    /// Whether field-of-view masking applies to this eye's viewport.
    pub draw_fov: bool,
}

impl Default for Eye {
    /// The fixed fallback eye: origin, unit zoom, no rotation, FOV on.
    fn default() -> Self {
        Self {
            position: MapCoordinates::new(Vec2::ZERO, MapId::NULLSPACE),
            zoom: Vec2::ONE,
            rotation: 0.0,
            draw_fov: true,
        }
    }
}

impl Eye {
    /// World-to-eye transform: translate the eye position to the origin,
    /// undo the eye rotation, then scale by the inverse zoom.
    pub fn view_matrix(&self) -> Mat3 {
        Mat3::from_scale(1.0 / self.zoom)
            * Mat3::from_angle(-self.rotation)
            * Mat3::from_translation(-self.position.position)
    }

    /// Exact algebraic inverse of `view_matrix`.
    pub fn view_matrix_inv(&self) -> Mat3 {
        Mat3::from_translation(self.position.position)
            * Mat3::from_angle(self.rotation)
            * Mat3::from_scale(self.zoom)
    }
}
