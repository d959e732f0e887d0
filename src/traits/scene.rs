use anyhow::Result;
use glam::{Mat3, Vec2};

use crate::eye::{Eye, MapId};
use crate::math::Box2;
use crate::render::overlay::OverlayRegistry;
use crate::render::viewport::Viewport;
use crate::traits::render::{RenderBackend, ShaderId, TextureId};

/// Stable identifier for a sprite, assigned by the scene. Used for draw
/// calls back into the scene and as the deterministic sort tie context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpriteKey(pub u64);

/// Per-sprite data returned by the spatial query. Transform fields are
/// sampled at query time; the pipeline does not call back for them.
#[derive(Debug, Clone, Copy)]
pub struct SpriteMeta {
    pub key: SpriteKey,
    pub visible: bool,
    /// Hidden inside a closed container; skipped without drawing.
    pub container_occluded: bool,
    pub world_matrix: Mat3,
    pub world_rotation: f32,
    pub local_position: Vec2,
    /// Post-process shader requiring offscreen isolation, if any.
    pub post_shader: Option<ShaderId>,
}

/// Entity and map provider: spatial sprite queries plus grid geometry.
///
/// `sprites_in_box` is an approximate range query: the pipeline enlarges
/// its culling bounds before calling and filters the results, so returning
/// extra sprites is fine. Results must come back in a stable order for
/// identical inputs (e.g. spatial-index iteration order).
pub trait Scene {
    fn map_exists(&self, map: MapId) -> bool;

    /// Draw the map grid geometry intersecting `bounds`.
    fn draw_grids(&mut self, backend: &mut dyn RenderBackend, bounds: Box2) -> Result<()>;

    /// Query sprites intersecting `bounds` on `map`, appending to `out`.
    fn sprites_in_box(&self, map: MapId, bounds: Box2, out: &mut Vec<SpriteMeta>);

    /// Draw one sprite with the given model transform and world rotation.
    fn draw_sprite(
        &mut self,
        backend: &mut dyn RenderBackend,
        sprite: SpriteKey,
        model: Mat3,
        rotation: f32,
    ) -> Result<()>;
}

/// Lighting subsystem hooks invoked during a viewport render.
pub trait Lighting {
    fn enabled(&self) -> bool;

    /// Render the light map and field-of-view occlusion for this viewport.
    fn draw_lights_and_fov(
        &mut self,
        backend: &mut dyn RenderBackend,
        viewport: &Viewport,
        bounds: Box2,
        eye: &Eye,
    ) -> Result<()>;

    /// Mask the viewport's framebuffer with the computed FOV.
    fn apply_fov_to_buffer(
        &mut self,
        backend: &mut dyn RenderBackend,
        viewport: &Viewport,
        eye: &Eye,
    ) -> Result<()>;

    /// FOV texture for the diagnostic debug layer, if available.
    fn fov_debug_texture(&self) -> Option<TextureId> {
        None
    }

    /// Light buffer texture for the diagnostic debug layer, if available.
    fn light_debug_texture(&self, _viewport: &Viewport) -> Option<TextureId> {
        None
    }
}

/// Lighting stub for headless use and maps without lighting.
pub struct DisabledLighting;

impl Lighting for DisabledLighting {
    fn enabled(&self) -> bool {
        false
    }

    fn draw_lights_and_fov(
        &mut self,
        _backend: &mut dyn RenderBackend,
        _viewport: &Viewport,
        _bounds: Box2,
        _eye: &Eye,
    ) -> Result<()> {
        Ok(())
    }

    fn apply_fov_to_buffer(
        &mut self,
        _backend: &mut dyn RenderBackend,
        _viewport: &Viewport,
        _eye: &Eye,
    ) -> Result<()> {
        Ok(())
    }
}

/// UI subsystem entry point, invoked once per frame in screen space.
pub trait UserInterface {
    fn render(&mut self, backend: &mut dyn RenderBackend) -> Result<()>;
}

/// Texture lookup by logical path (splash image and similar assets).
pub trait ResourceCache {
    fn texture(&self, path: &str) -> Option<TextureId>;
}

/// Per-frame bundle of collaborator references threaded through
/// `RenderPipeline::render`. Nothing here is retained across frames.
pub struct FrameContext<'a> {
    pub scene: &'a mut dyn Scene,
    pub lighting: &'a mut dyn Lighting,
    pub ui: &'a mut dyn UserInterface,
    pub resources: &'a dyn ResourceCache,
    pub overlays: &'a mut OverlayRegistry,
}
