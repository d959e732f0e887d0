use glam::{Mat3, UVec2, Vec2, Vec3};

use crate::eye::{Eye, MapCoordinates, MapId};
use crate::math::Box2;

/// World-to-pixel scale for the projection matrices. This value is a
/// cross-cutting contract: distance-based audio attenuation uses the same
/// scale and the two must stay numerically identical.
pub const PIXELS_PER_METER: i32 = 32;

/// Half-height of the nominal viewport, in tiles.
pub const VERTICAL_HALF_EXTENT_TILES: i32 = 19;

/// Fixed nominal viewport height used to re-center the Y axis in the
/// screen transform. Deliberately not the actual screen height; the rest
/// of the coordinate-consuming code is calibrated against this value.
pub const NOMINAL_VIEWPORT_HEIGHT: i32 = PIXELS_PER_METER * 2 * VERTICAL_HALF_EXTENT_TILES;

/// Converts between screen pixel space and world map space using the
/// current eye. Callers never see an absent eye: with no eye set, a fixed
/// default eye stands in, so every transform is well-defined.
#[derive(Debug, Default)]
pub struct EyeManager {
    current: Option<Eye>,
    screen_size: UVec2,
}

impl EyeManager {
    pub fn new(screen_size: UVec2) -> Self {
        Self {
            current: None,
            screen_size,
        }
    }

    /// The eye all coordinate math goes through. Never absent.
    pub fn current_eye(&self) -> Eye {
        self.current.unwrap_or_default()
    }

    pub fn set_current_eye(&mut self, eye: Option<Eye>) {
        self.current = eye;
    }

    pub fn clear_current_eye(&mut self) {
        self.current = None;
    }

    pub fn current_map(&self) -> MapId {
        self.current_eye().position.map_id
    }

    /// Updated by the frame orchestrator whenever the display size changes.
    pub fn set_screen_size(&mut self, size: UVec2) {
        self.screen_size = size;
    }

    pub fn screen_size(&self) -> UVec2 {
        self.screen_size
    }

    fn recenter_offset(&self) -> Vec2 {
        // Integer truncation kept intact; the half-extents are snapped to
        // whole pixels before the add/subtract so the two directions agree.
        Vec2::new(
            (self.screen_size.x as f32 * 0.5) as i32 as f32,
            (NOMINAL_VIEWPORT_HEIGHT as f32 * 0.5) as i32 as f32,
        )
    }

    /// Transform a world position to screen pixels: view matrix, then the
    /// pixels-per-meter scale with Y inverted (screen Y grows downward),
    /// then re-center on the screen width and nominal viewport height.
    pub fn world_to_screen(&self, point: Vec2) -> Vec2 {
        let eye = self.current_eye();
        let mut p = eye.view_matrix().transform_point2(point);
        p *= Vec2::new(1.0, -1.0) * PIXELS_PER_METER as f32;
        p + self.recenter_offset()
    }

    /// Exact inverse of `world_to_screen`, tagged with the current map.
    pub fn screen_to_map(&self, point: Vec2) -> MapCoordinates {
        let eye = self.current_eye();
        let mut p = point - self.recenter_offset();
        p *= Vec2::new(1.0, -1.0) / PIXELS_PER_METER as f32;
        MapCoordinates::new(eye.view_matrix_inv().transform_point2(p), self.current_map())
    }

    /// World-space bounding box of the visible screen area. With a rotated
    /// eye the screen rectangle maps to a rotated quad, so this takes the
    /// min/max over the four mapped corners: it over-covers, never
    /// under-covers.
    pub fn world_viewport(&self) -> Box2 {
        let size = self.screen_size.as_vec2();
        let corners = [
            self.screen_to_map(Vec2::ZERO).position,
            self.screen_to_map(Vec2::new(size.x, 0.0)).position,
            self.screen_to_map(size).position,
            self.screen_to_map(Vec2::new(0.0, size.y)).position,
        ];
        Box2::from_points(&corners)
    }

    /// Fixed orthographic matrix for screen-space (UI) rendering: scale by
    /// pixels-per-meter with Y flipped, translate by half the screen size.
    pub fn screen_projection_matrix(&self) -> Mat3 {
        let size = self.screen_size.as_vec2();
        Mat3::from_cols(
            Vec3::new(PIXELS_PER_METER as f32, 0.0, 0.0),
            Vec3::new(0.0, -(PIXELS_PER_METER as f32), 0.0),
            Vec3::new(size.x / 2.0, size.y / 2.0, 1.0),
        )
    }
}
