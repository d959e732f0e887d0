use glam::{IVec2, UVec2};

use crate::eye::Eye;
use crate::traits::render::TextureId;

/// Index of a viewport registered with the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewportId(pub usize);

/// One camera's rendered output: an offscreen color target plus the eye
/// looking into it. A viewport with no eye renders nothing. At most one
/// viewport is "current" while rendering; the render-state stack is the
/// only way that changes hands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Offscreen color buffer this viewport renders into.
    pub render_target: TextureId,
    pub size: UVec2,
    /// Where the viewport texture lands when composited to the screen.
    pub screen_offset: IVec2,
    pub eye: Option<Eye>,
}

impl Viewport {
    pub fn new(render_target: TextureId, size: UVec2, screen_offset: IVec2) -> Self {
        Self {
            render_target,
            size,
            screen_offset,
            eye: None,
        }
    }
}
