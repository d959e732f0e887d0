use glam::{IVec2, Mat3, UVec2};

use crate::math::Box2i;
use crate::render::viewport::ViewportId;
use crate::traits::render::TextureId;

/// Snapshot of every mutable render-state field. The pipeline keeps one
/// live value; entering a nested render context copies it out with
/// `RenderPipeline::push_render_state_full` and restores it verbatim with
/// `pop_render_state_full` on every exit path, error or not. That pairing
/// is what keeps nested viewport renders from leaking target or matrix
/// state into their caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderState {
    pub proj: Mat3,
    pub view: Mat3,
    pub model: Mat3,
    pub scissor: Option<Box2i>,
    /// `None` means the backbuffer.
    pub render_target: Option<TextureId>,
    pub viewport_rect: Box2i,
    pub current_viewport: Option<ViewportId>,
}

impl RenderState {
    /// The known-clean state every frame starts from.
    pub fn baseline(screen_size: UVec2) -> Self {
        Self {
            proj: Mat3::IDENTITY,
            view: Mat3::IDENTITY,
            model: Mat3::IDENTITY,
            scissor: None,
            render_target: None,
            viewport_rect: Box2i::from_dimensions(IVec2::ZERO, screen_size.as_ivec2()),
            current_viewport: None,
        }
    }
}
