use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use glam::{IVec2, Mat3, UVec2, Vec2};
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::math::Box2i;
use crate::render::color::color_to_wgpu;
use crate::render::shader;
use crate::render::sprite_batch::{SpriteBatch, uv_corners};
use crate::render::texture::TextureManager;
use crate::traits::render::{
    BlendMode, Color, DstRect, RenderBackend, Screenshot, ShaderId, SrcRect, TextureId,
    rotated_rect_corners,
};

/// Per-frame constants shared with every sprite shader (group 0).
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct FrameConstants {
    viewport_size: [f32; 2],
    _pad: [f32; 2],
}

struct PostShaderPipelines {
    alpha: wgpu::RenderPipeline,
    additive: wgpu::RenderPipeline,
}

/// GPU-backed 2D renderer using wgpu.
///
/// Matrices and the viewport rect are applied CPU-side when quads enter
/// the batch, so they cost nothing to change between draws; only render
/// target switches, clears, and uniform updates force a flush.
pub struct WgpuRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    format: wgpu::TextureFormat,

    alpha_pipeline: wgpu::RenderPipeline,
    additive_pipeline: wgpu::RenderPipeline,
    post_pipelines: HashMap<ShaderId, PostShaderPipelines>,
    next_shader_id: u64,

    uniform_bind_group_layout: wgpu::BindGroupLayout,
    texture_bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    sampler: wgpu::Sampler,

    batch: SpriteBatch,
    textures: TextureManager,

    current_frame: Option<wgpu::SurfaceTexture>,
    current_render_target: Option<TextureId>,
    current_shader: Option<ShaderId>,
    viewport_rect: Box2i,
    scissor: Option<Box2i>,
    proj: Mat3,
    view: Mat3,
    model: Mat3,

    screen_size: UVec2,
}

/// Remap a clip-space position through a viewport rect into the clip
/// space of the whole target. The rect's origin is its bottom-left corner
/// measured from the bottom of the target and may lie outside the target;
/// geometry past the target edge clips.
fn viewport_transform(ndc: Vec2, rect: Box2i, target_size: UVec2) -> Vec2 {
    let px = rect.min.x as f32 + (ndc.x + 1.0) * 0.5 * rect.width() as f32;
    let py_bottom = rect.min.y as f32 + (ndc.y + 1.0) * 0.5 * rect.height() as f32;
    Vec2::new(
        2.0 * px / target_size.x as f32 - 1.0,
        2.0 * py_bottom / target_size.y as f32 - 1.0,
    )
}

impl WgpuRenderer {
    /// Create a new WgpuRenderer for the given window.
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| anyhow!("failed to create surface: {e}"))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow!("failed to find a suitable GPU adapter"))?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("vantage_device"),
                    ..Default::default()
                },
                None,
            )
            .await
            .map_err(|e| anyhow!("failed to create device: {e}"))?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        let format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let surface_config = wgpu::SurfaceConfiguration {
            // COPY_SRC so screenshot capture can read the backbuffer.
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            desired_maximum_frame_latency: 2,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
        };
        surface.configure(&device, &surface_config);

        let uniform_bind_group_layout = shader::create_uniform_bind_group_layout(&device);
        let texture_bind_group_layout = shader::create_texture_bind_group_layout(&device);

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sprite_shader"),
            source: wgpu::ShaderSource::Wgsl(shader::SPRITE_SHADER_WGSL.into()),
        });

        let alpha_pipeline = shader::create_sprite_pipeline(
            &device,
            &module,
            format,
            &uniform_bind_group_layout,
            &texture_bind_group_layout,
            BlendMode::Alpha,
        );
        let additive_pipeline = shader::create_sprite_pipeline(
            &device,
            &module,
            format,
            &uniform_bind_group_layout,
            &texture_bind_group_layout,
            BlendMode::Additive,
        );

        let constants = FrameConstants {
            viewport_size: [size.width as f32, size.height as f32],
            _pad: [0.0; 2],
        };
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("frame_constants"),
            contents: bytemuck::bytes_of(&constants),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame_constants_bind_group"),
            layout: &uniform_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("sprite_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let screen_size = UVec2::new(size.width.max(1), size.height.max(1));

        Ok(Self {
            device,
            queue,
            surface,
            surface_config,
            format,
            alpha_pipeline,
            additive_pipeline,
            post_pipelines: HashMap::new(),
            next_shader_id: 1,
            uniform_bind_group_layout,
            texture_bind_group_layout,
            uniform_buffer,
            uniform_bind_group,
            sampler,
            batch: SpriteBatch::new(),
            textures: TextureManager::new(),
            current_frame: None,
            current_render_target: None,
            current_shader: None,
            viewport_rect: Box2i::from_dimensions(IVec2::ZERO, screen_size.as_ivec2()),
            scissor: None,
            proj: Mat3::IDENTITY,
            view: Mat3::IDENTITY,
            model: Mat3::IDENTITY,
            screen_size,
        })
    }

    /// Resize the renderer surface.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.screen_size = UVec2::new(width, height);
        self.surface_config.width = width;
        self.surface_config.height = height;
        self.surface.configure(&self.device, &self.surface_config);
    }

    fn target_size(&self) -> UVec2 {
        match self.current_render_target {
            Some(id) => self.textures.size(id).unwrap_or(self.screen_size),
            None => self.screen_size,
        }
    }

    /// Get the render target view (either offscreen texture or surface frame).
    fn get_target_view(&self) -> Option<wgpu::TextureView> {
        if let Some(target_id) = self.current_render_target {
            self.textures.get(target_id).map(|e| e.view.clone())
        } else {
            self.current_frame.as_ref().map(|f| {
                f.texture
                    .create_view(&wgpu::TextureViewDescriptor::default())
            })
        }
    }

    /// Submit the queued batch as one render pass against the given view.
    fn flush_batch(&mut self, view: &wgpu::TextureView) {
        if self.batch.is_empty() {
            return;
        }

        let target_size = self.target_size();

        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("vertex_buffer"),
                contents: bytemuck::cast_slice(&self.batch.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });

        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("index_buffer"),
                contents: bytemuck::cast_slice(&self.batch.indices),
                usage: wgpu::BufferUsages::INDEX,
            });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("sprite_encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("sprite_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                ..Default::default()
            });

            render_pass.set_vertex_buffer(0, vertex_buffer.slice(..));
            render_pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.set_bind_group(0, &self.uniform_bind_group, &[]);

            let full_target =
                Box2i::from_dimensions(IVec2::ZERO, target_size.as_ivec2());

            for cmd in &self.batch.commands {
                let pipeline = match cmd.shader {
                    Some(id) => {
                        let Some(post) = self.post_pipelines.get(&id) else {
                            log::warn!("skipping draw with unknown shader {id:?}");
                            continue;
                        };
                        match cmd.blend {
                            BlendMode::Alpha => &post.alpha,
                            BlendMode::Additive => &post.additive,
                        }
                    }
                    None => match cmd.blend {
                        BlendMode::Alpha => &self.alpha_pipeline,
                        BlendMode::Additive => &self.additive_pipeline,
                    },
                };
                render_pass.set_pipeline(pipeline);

                let scissor = cmd
                    .scissor
                    .unwrap_or(full_target)
                    .intersection(full_target);
                if scissor.width() == 0 || scissor.height() == 0 {
                    continue;
                }
                render_pass.set_scissor_rect(
                    scissor.min.x as u32,
                    scissor.min.y as u32,
                    scissor.width() as u32,
                    scissor.height() as u32,
                );

                if let Some(entry) = self.textures.get(cmd.texture) {
                    render_pass.set_bind_group(1, &entry.bind_group, &[]);
                    render_pass.draw_indexed(
                        cmd.index_start..cmd.index_start + cmd.index_count,
                        0,
                        0..1,
                    );
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        self.batch.clear();
    }

    fn current_target_texture(&self) -> Result<&wgpu::Texture> {
        if let Some(id) = self.current_render_target {
            Ok(&self
                .textures
                .get(id)
                .ok_or_else(|| anyhow!("unknown render target: {id:?}"))?
                .texture)
        } else {
            Ok(&self
                .current_frame
                .as_ref()
                .ok_or_else(|| anyhow!("no frame in flight to capture"))?
                .texture)
        }
    }
}

impl RenderBackend for WgpuRenderer {
    fn begin_frame(&mut self) -> Result<()> {
        let frame = self
            .surface
            .get_current_texture()
            .map_err(|e| anyhow!("failed to get surface texture: {e}"))?;
        self.current_frame = Some(frame);
        self.batch.clear();
        Ok(())
    }

    fn swap_buffers(&mut self) -> Result<()> {
        self.flush()?;
        if let Some(frame) = self.current_frame.take() {
            frame.present();
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(view) = self.get_target_view() {
            self.flush_batch(&view);
        }
        Ok(())
    }

    fn clear(&mut self, color: Color) -> Result<()> {
        let view = self
            .get_target_view()
            .ok_or_else(|| anyhow!("no render target available"))?;

        // Pending draws must land before the clear wipes them.
        self.flush_batch(&view);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("clear_encoder"),
            });

        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("clear_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(color_to_wgpu(color)),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                ..Default::default()
            });
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn set_render_target(&mut self, target: Option<TextureId>) -> Result<()> {
        if target == self.current_render_target {
            return Ok(());
        }
        if let Some(id) = target
            && self.textures.get(id).is_none()
        {
            return Err(anyhow!("unknown render target texture: {id:?}"));
        }
        // Flush so queued commands land in the old target.
        self.flush()?;
        self.current_render_target = target;
        Ok(())
    }

    fn set_viewport_rect(&mut self, rect: Box2i) -> Result<()> {
        self.viewport_rect = rect;
        Ok(())
    }

    fn set_scissor(&mut self, rect: Option<Box2i>) -> Result<()> {
        self.scissor = rect;
        Ok(())
    }

    fn set_proj_view(&mut self, proj: Mat3, view: Mat3) -> Result<()> {
        self.proj = proj;
        self.view = view;
        Ok(())
    }

    fn set_model_transform(&mut self, model: Mat3) -> Result<()> {
        self.model = model;
        Ok(())
    }

    fn set_shader(&mut self, shader: Option<ShaderId>) -> Result<()> {
        if let Some(id) = shader
            && !self.post_pipelines.contains_key(&id)
        {
            return Err(anyhow!("unknown shader: {id:?}"));
        }
        self.current_shader = shader;
        Ok(())
    }

    fn update_uniform_constants(&mut self, viewport_size: UVec2) -> Result<()> {
        // Draws queued against the old constants must submit first.
        self.flush()?;
        let constants = FrameConstants {
            viewport_size: [viewport_size.x as f32, viewport_size.y as f32],
            _pad: [0.0; 2],
        };
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&constants));
        Ok(())
    }

    fn create_render_target(&mut self, size: UVec2) -> Result<TextureId> {
        Ok(self.textures.create_render_target(
            &self.device,
            &self.texture_bind_group_layout,
            &self.sampler,
            size,
            self.format,
        ))
    }

    fn destroy_texture(&mut self, id: TextureId) -> Result<()> {
        if self.current_render_target == Some(id) {
            return Err(anyhow!("cannot destroy the bound render target {id:?}"));
        }
        if !self.textures.remove(id) {
            return Err(anyhow!("unknown texture: {id:?}"));
        }
        Ok(())
    }

    fn load_texture_from_memory(&mut self, data: &[u8]) -> Result<TextureId> {
        self.textures.load_from_memory(
            data,
            &self.device,
            &self.queue,
            &self.texture_bind_group_layout,
            &self.sampler,
        )
    }

    fn load_shader(&mut self, source: &str) -> Result<ShaderId> {
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("post_shader"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let alpha = shader::create_sprite_pipeline(
            &self.device,
            &module,
            self.format,
            &self.uniform_bind_group_layout,
            &self.texture_bind_group_layout,
            BlendMode::Alpha,
        );
        let additive = shader::create_sprite_pipeline(
            &self.device,
            &module,
            self.format,
            &self.uniform_bind_group_layout,
            &self.texture_bind_group_layout,
            BlendMode::Additive,
        );

        let id = ShaderId(self.next_shader_id);
        self.next_shader_id += 1;
        self.post_pipelines
            .insert(id, PostShaderPipelines { alpha, additive });
        Ok(id)
    }

    fn texture_size(&self, id: TextureId) -> Option<UVec2> {
        self.textures.size(id)
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
        let tex_size = self
            .textures
            .size(texture)
            .ok_or_else(|| anyhow!("unknown texture: {texture:?}"))?;

        let transform = self.proj * self.view * self.model;
        let target_size = self.target_size();
        let positions = rotated_rect_corners(dst, angle)
            .map(|c| viewport_transform(transform.transform_point2(c), self.viewport_rect, target_size));

        self.batch.push_quad(
            texture,
            blend,
            self.current_shader,
            self.scissor,
            positions,
            uv_corners(src, tex_size),
            color,
        );
        Ok(())
    }

    fn capture_target(&mut self) -> Result<Screenshot> {
        self.flush()?;

        let size = self.target_size();
        let texture = self.current_target_texture()?;

        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let unpadded_bytes_per_row = size.x * 4;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("capture_buffer"),
            size: (padded_bytes_per_row * size.y) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("capture_encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(size.y),
                },
            },
            wgpu::Extent3d {
                width: size.x,
                height: size.y,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| anyhow!("capture map callback dropped"))?
            .map_err(|e| anyhow!("failed to map capture buffer: {e:?}"))?;

        let data = slice.get_mapped_range();
        let mut rgba = Vec::with_capacity((size.x * size.y * 4) as usize);
        let bgra = matches!(
            self.format,
            wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb
        );
        for row in 0..size.y {
            let start = (row * padded_bytes_per_row) as usize;
            let end = start + unpadded_bytes_per_row as usize;
            let row_data = &data[start..end];
            if bgra {
                for px in row_data.chunks_exact(4) {
                    rgba.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
                }
            } else {
                rgba.extend_from_slice(row_data);
            }
        }
        drop(data);
        buffer.unmap();

        Ok(Screenshot { size, rgba })
    }

    fn screen_size(&self) -> UVec2 {
        self.screen_size
    }
}
