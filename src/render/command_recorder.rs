use std::collections::HashMap;

use anyhow::{Result, anyhow};
use glam::{IVec2, Mat3, UVec2};

use crate::math::Box2i;
use crate::traits::render::{
    BlendMode, Color, DstRect, RenderBackend, Screenshot, ShaderId, SrcRect, TextureId,
};

/// Recorded draw command for testing.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    BeginFrame,
    SwapBuffers,
    Flush,
    Clear(Color),
    SetRenderTarget(Option<TextureId>),
    SetViewportRect(Box2i),
    SetScissor(Option<Box2i>),
    SetProjView { proj: Mat3, view: Mat3 },
    SetModelTransform(Mat3),
    SetShader(Option<ShaderId>),
    UpdateUniformConstants(UVec2),
    DrawTextureRect {
        texture: TextureId,
        src: Option<SrcRect>,
        dst: DstRect,
        color: Color,
        angle: f32,
        blend: BlendMode,
    },
    CaptureTarget,
}

impl RecordedCommand {
    /// Whether this command queues geometry (as opposed to state changes).
    pub fn is_draw(&self) -> bool {
        matches!(self, Self::DrawTextureRect { .. })
    }
}

/// Backend-visible state mirror, updated as set-commands arrive. Tests
/// assert on this to verify the state stack restores what it pushed.
#[derive(Debug, Clone, PartialEq)]
pub struct RecorderState {
    pub render_target: Option<TextureId>,
    pub viewport_rect: Box2i,
    pub scissor: Option<Box2i>,
    pub proj: Mat3,
    pub view: Mat3,
    pub model: Mat3,
    pub shader: Option<ShaderId>,
    pub uniform_size: UVec2,
}

struct MockTexture {
    size: UVec2,
}

/// A mock RenderBackend that records commands for snapshot testing.
/// Does not require a GPU.
pub struct CommandRecorder {
    commands: Vec<RecordedCommand>,
    textures: HashMap<TextureId, MockTexture>,
    shaders: HashMap<ShaderId, String>,
    next_texture_id: u64,
    next_shader_id: u64,
    state: RecorderState,
    screen_size: UVec2,
}

impl CommandRecorder {
    pub fn new(screen_width: u32, screen_height: u32) -> Self {
        let screen_size = UVec2::new(screen_width, screen_height);
        Self {
            commands: Vec::new(),
            textures: HashMap::new(),
            shaders: HashMap::new(),
            next_texture_id: 1,
            next_shader_id: 1,
            state: RecorderState {
                render_target: None,
                viewport_rect: Box2i::from_dimensions(IVec2::ZERO, screen_size.as_ivec2()),
                scissor: None,
                proj: Mat3::IDENTITY,
                view: Mat3::IDENTITY,
                model: Mat3::IDENTITY,
                shader: None,
                uniform_size: screen_size,
            },
            screen_size,
        }
    }

    /// Get all recorded commands.
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// Clear recorded commands.
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Backend-visible state after the last recorded command.
    pub fn state(&self) -> &RecorderState {
        &self.state
    }

    /// Recorded draw commands only, in order.
    pub fn draws(&self) -> Vec<&RecordedCommand> {
        self.commands.iter().filter(|c| c.is_draw()).collect()
    }

    /// Register a mock texture with the given dimensions.
    pub fn register_texture(&mut self, width: u32, height: u32) -> TextureId {
        let id = TextureId(self.next_texture_id);
        self.next_texture_id += 1;
        self.textures.insert(
            id,
            MockTexture {
                size: UVec2::new(width, height),
            },
        );
        id
    }
}

impl RenderBackend for CommandRecorder {
    fn begin_frame(&mut self) -> Result<()> {
        self.commands.push(RecordedCommand::BeginFrame);
        Ok(())
    }

    fn swap_buffers(&mut self) -> Result<()> {
        self.commands.push(RecordedCommand::SwapBuffers);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.commands.push(RecordedCommand::Flush);
        Ok(())
    }

    fn clear(&mut self, color: Color) -> Result<()> {
        self.commands.push(RecordedCommand::Clear(color));
        Ok(())
    }

    fn set_render_target(&mut self, target: Option<TextureId>) -> Result<()> {
        if let Some(id) = target
            && !self.textures.contains_key(&id)
        {
            return Err(anyhow!("unknown render target texture: {:?}", id));
        }
        self.state.render_target = target;
        self.commands.push(RecordedCommand::SetRenderTarget(target));
        Ok(())
    }

    fn set_viewport_rect(&mut self, rect: Box2i) -> Result<()> {
        self.state.viewport_rect = rect;
        self.commands.push(RecordedCommand::SetViewportRect(rect));
        Ok(())
    }

    fn set_scissor(&mut self, rect: Option<Box2i>) -> Result<()> {
        self.state.scissor = rect;
        self.commands.push(RecordedCommand::SetScissor(rect));
        Ok(())
    }

    fn set_proj_view(&mut self, proj: Mat3, view: Mat3) -> Result<()> {
        self.state.proj = proj;
        self.state.view = view;
        self.commands.push(RecordedCommand::SetProjView { proj, view });
        Ok(())
    }

    fn set_model_transform(&mut self, model: Mat3) -> Result<()> {
        self.state.model = model;
        self.commands.push(RecordedCommand::SetModelTransform(model));
        Ok(())
    }

    fn set_shader(&mut self, shader: Option<ShaderId>) -> Result<()> {
        if let Some(id) = shader
            && !self.shaders.contains_key(&id)
        {
            return Err(anyhow!("unknown shader: {:?}", id));
        }
        self.state.shader = shader;
        self.commands.push(RecordedCommand::SetShader(shader));
        Ok(())
    }

    fn update_uniform_constants(&mut self, viewport_size: UVec2) -> Result<()> {
        self.state.uniform_size = viewport_size;
        self.commands
            .push(RecordedCommand::UpdateUniformConstants(viewport_size));
        Ok(())
    }

    fn create_render_target(&mut self, size: UVec2) -> Result<TextureId> {
        Ok(self.register_texture(size.x, size.y))
    }

    fn destroy_texture(&mut self, id: TextureId) -> Result<()> {
        self.textures
            .remove(&id)
            .ok_or_else(|| anyhow!("unknown texture: {:?}", id))?;
        Ok(())
    }

    fn load_texture_from_memory(&mut self, data: &[u8]) -> Result<TextureId> {
        // Try to decode image dimensions if valid.
        if let Ok(img) = image::load_from_memory(data) {
            Ok(self.register_texture(img.width(), img.height()))
        } else {
            // Fallback for raw data.
            Ok(self.register_texture(1, 1))
        }
    }

    fn load_shader(&mut self, source: &str) -> Result<ShaderId> {
        let id = ShaderId(self.next_shader_id);
        self.next_shader_id += 1;
        self.shaders.insert(id, source.to_string());
        Ok(id)
    }

    fn texture_size(&self, id: TextureId) -> Option<UVec2> {
        self.textures.get(&id).map(|t| t.size)
    }

    fn draw_texture_rect(
        &mut self,
        texture: TextureId,
        src: Option<SrcRect>,
        dst: DstRect,
        color: Color,
        angle: f32,
        blend: BlendMode,
    ) -> Result<()> {
        if !self.textures.contains_key(&texture) {
            return Err(anyhow!("unknown texture: {:?}", texture));
        }
        self.commands.push(RecordedCommand::DrawTextureRect {
            texture,
            src,
            dst,
            color,
            angle,
            blend,
        });
        Ok(())
    }

    fn capture_target(&mut self) -> Result<Screenshot> {
        self.commands.push(RecordedCommand::CaptureTarget);
        let size = match self.state.render_target {
            Some(id) => self.texture_size(id).unwrap_or(self.screen_size),
            None => self.screen_size,
        };
        Ok(Screenshot {
            size,
            rgba: vec![0; (size.x * size.y * 4) as usize],
        })
    }

    fn screen_size(&self) -> UVec2 {
        self.screen_size
    }
}
