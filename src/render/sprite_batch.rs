use glam::{UVec2, Vec2};

use crate::math::Box2i;
use crate::render::color::color_to_array;
use crate::traits::render::{BlendMode, Color, ShaderId, SrcRect, TextureId};

/// Vertex data for a textured quad. Positions are already in clip space;
/// the model/view/projection transforms are applied CPU-side when the
/// quad is pushed.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
    pub color: [f32; 4],
}

impl Vertex {
    /// Vertex buffer layout for wgpu pipeline.
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                // position
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x2,
                },
                // uv
                wgpu::VertexAttribute {
                    offset: 8,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
                // color
                wgpu::VertexAttribute {
                    offset: 16,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x4,
                },
            ],
        }
    }
}

/// A draw command in the sprite batch.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCommand {
    pub texture: TextureId,
    pub blend: BlendMode,
    pub shader: Option<ShaderId>,
    pub scissor: Option<Box2i>,
    pub index_start: u32,
    pub index_count: u32,
}

/// Batches textured quads for efficient rendering. Consecutive quads with
/// the same texture, blend mode, shader, and scissor merge into a single
/// draw command to minimize state changes.
#[derive(Default)]
pub struct SpriteBatch {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub commands: Vec<DrawCommand>,
}

/// UV corners for a source rect within a texture, in the quad corner
/// order `(x,y)`, `(x+w,y)`, `(x+w,y+h)`, `(x,y+h)`. `None` selects the
/// whole texture.
pub fn uv_corners(src: Option<SrcRect>, tex_size: UVec2) -> [Vec2; 4] {
    match src {
        None => [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ],
        Some(src) => {
            let tw = tex_size.x as f32;
            let th = tex_size.y as f32;
            let u0 = src.x / tw;
            let v0 = src.y / th;
            let u1 = (src.x + src.w) / tw;
            let v1 = (src.y + src.h) / th;
            [
                Vec2::new(u0, v0),
                Vec2::new(u1, v0),
                Vec2::new(u1, v1),
                Vec2::new(u0, v1),
            ]
        }
    }
}

impl SpriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Clear all batched data for a new flush cycle.
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.commands.clear();
    }

    /// Add a quad with pre-transformed clip-space corners.
    #[allow(clippy::too_many_arguments)]
    pub fn push_quad(
        &mut self,
        texture: TextureId,
        blend: BlendMode,
        shader: Option<ShaderId>,
        scissor: Option<Box2i>,
        positions: [Vec2; 4],
        uvs: [Vec2; 4],
        color: Color,
    ) {
        let rgba = color_to_array(color);
        let base = self.vertices.len() as u32;
        for i in 0..4 {
            self.vertices.push(Vertex {
                position: positions[i].to_array(),
                uv: uvs[i].to_array(),
                color: rgba,
            });
        }

        let index_start = self.indices.len() as u32;
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);

        // Try to merge with the last command if nothing about the GPU
        // state differs.
        if let Some(last) = self.commands.last_mut()
            && last.texture == texture
            && last.blend == blend
            && last.shader == shader
            && last.scissor == scissor
        {
            last.index_count += 6;
            return;
        }

        self.commands.push(DrawCommand {
            texture,
            blend,
            shader,
            scissor,
            index_start,
            index_count: 6,
        });
    }
}
