use anyhow::Result;
use glam::{Mat3, UVec2, Vec2};

use crate::math::Box2i;

/// Texture handle for referencing loaded textures and render targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// Shader handle for referencing loaded post-process shaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderId(pub u64);

/// Blend mode for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    #[default]
    Alpha,
    Additive,
}

/// Color with RGBA components (0.0..=1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Self = Self {
        r: 1.0,
        g: 1.0,
        b: 1.0,
        a: 1.0,
    };

    pub const BLACK: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };

    pub const TRANSPARENT: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

/// Source rectangle within a texture (pixel coordinates).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SrcRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

/// Destination rectangle in the current drawing space. Under a
/// screen-space projection this is pixels with Y growing downward; under
/// a world-space projection it is meters with Y growing upward. The
/// texture's UV origin maps to the `(x, y)` corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DstRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl DstRect {
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }
}

/// Pixel contents captured from the current render target.
#[derive(Debug, Clone, PartialEq)]
pub struct Screenshot {
    pub size: UVec2,
    /// Tightly packed RGBA8 rows, top row first.
    pub rgba: Vec<u8>,
}

/// Abstraction over rendering backends.
/// Implementations: WgpuRenderer (production), CommandRecorder (testing).
///
/// Draw calls are queued; `flush` is the ordering barrier that forces all
/// queued commands targeting the current render target to complete. The
/// caller must flush before switching render targets so a command queue
/// never straddles a target switch.
pub trait RenderBackend {
    /// Begin a new frame, acquiring the backbuffer.
    fn begin_frame(&mut self) -> Result<()>;
    /// Present the backbuffer. Implies a flush.
    fn swap_buffers(&mut self) -> Result<()>;
    /// Submit all queued draw commands against the current target.
    fn flush(&mut self) -> Result<()>;

    /// Clear the current render target to a solid color.
    fn clear(&mut self, color: Color) -> Result<()>;

    /// Bind an offscreen render target, or `None` for the backbuffer.
    fn set_render_target(&mut self, target: Option<TextureId>) -> Result<()>;
    /// Set the viewport rectangle. The rect's origin is the bottom-left
    /// corner measured from the bottom of the target, and it may extend
    /// outside the target; out-of-target output clips.
    fn set_viewport_rect(&mut self, rect: Box2i) -> Result<()>;
    /// Set or clear the scissor rectangle (pixel rect, top-left origin).
    fn set_scissor(&mut self, rect: Option<Box2i>) -> Result<()>;
    /// Set the projection and view matrices applied to subsequent draws.
    fn set_proj_view(&mut self, proj: Mat3, view: Mat3) -> Result<()>;
    /// Set the model transform applied to subsequent draws.
    fn set_model_transform(&mut self, model: Mat3) -> Result<()>;
    /// Select a post-process shader for subsequent draws, or restore the
    /// default sprite shader with `None`.
    fn set_shader(&mut self, shader: Option<ShaderId>) -> Result<()>;
    /// Update the shared per-frame uniform constants (viewport size).
    fn update_uniform_constants(&mut self, viewport_size: UVec2) -> Result<()>;

    /// Create an offscreen color render target.
    fn create_render_target(&mut self, size: UVec2) -> Result<TextureId>;
    /// Free a texture or render target created by this backend.
    fn destroy_texture(&mut self, id: TextureId) -> Result<()>;
    /// Decode and upload a texture from encoded image bytes.
    fn load_texture_from_memory(&mut self, data: &[u8]) -> Result<TextureId>;
    /// Compile a post-process shader from source.
    fn load_shader(&mut self, source: &str) -> Result<ShaderId>;
    fn texture_size(&self, id: TextureId) -> Option<UVec2>;

    /// Queue a textured rectangle, rotated by `angle` radians around its
    /// center. `src` of `None` uses the whole texture.
    fn draw_texture_rect(
        &mut self,
        texture: TextureId,
        src: Option<SrcRect>,
        dst: DstRect,
        color: Color,
        angle: f32,
        blend: BlendMode,
    ) -> Result<()>;

    /// Read back the pixels of the current render target. Implies a flush.
    fn capture_target(&mut self) -> Result<Screenshot>;

    fn screen_size(&self) -> UVec2;
}

/// Compute the four corner positions of a rotated rectangle.
/// Returns vertices in order: (x,y), (x+w,y), (x+w,y+h), (x,y+h),
/// rotated by `angle` radians around the rect center.
pub fn rotated_rect_corners(dst: DstRect, angle: f32) -> [Vec2; 4] {
    let corners = [
        Vec2::new(dst.x, dst.y),
        Vec2::new(dst.x + dst.w, dst.y),
        Vec2::new(dst.x + dst.w, dst.y + dst.h),
        Vec2::new(dst.x, dst.y + dst.h),
    ];
    if angle == 0.0 {
        return corners;
    }

    let center = Vec2::new(dst.x + dst.w * 0.5, dst.y + dst.h * 0.5);
    let (sin, cos) = angle.sin_cos();
    corners.map(|c| {
        let d = c - center;
        center + Vec2::new(d.x * cos - d.y * sin, d.x * sin + d.y * cos)
    })
}
