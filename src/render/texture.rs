use std::collections::HashMap;

use anyhow::{Result, anyhow};
use glam::UVec2;

use crate::traits::render::TextureId;

/// Metadata for a loaded texture or render target.
pub struct TextureEntry {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub bind_group: wgpu::BindGroup,
    pub size: UVec2,
}

/// Manages texture decoding, GPU upload, render-target creation, and id
/// allocation for the wgpu backend.
pub struct TextureManager {
    textures: HashMap<TextureId, TextureEntry>,
    next_id: u64,
}

impl Default for TextureManager {
    fn default() -> Self {
        Self {
            textures: HashMap::new(),
            next_id: 1,
        }
    }
}

impl TextureManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc_id(&mut self) -> TextureId {
        let id = TextureId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Decode and upload a texture from encoded image bytes (PNG, JPEG).
    pub fn load_from_memory(
        &mut self,
        data: &[u8],
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        bind_group_layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
    ) -> Result<TextureId> {
        let img = image::load_from_memory(data)
            .map_err(|e| anyhow!("failed to decode image: {e}"))?
            .to_rgba8();
        let (width, height) = img.dimensions();

        let id = self.alloc_id();
        let entry = create_texture_entry(device, queue, bind_group_layout, sampler, &img, width, height);
        self.textures.insert(id, entry);
        Ok(id)
    }

    /// Create an empty color render target in the given format. The format
    /// must match the format the sprite pipelines render to.
    pub fn create_render_target(
        &mut self,
        device: &wgpu::Device,
        bind_group_layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        size: UVec2,
        format: wgpu::TextureFormat,
    ) -> TextureId {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("render_target"),
            size: wgpu::Extent3d {
                width: size.x,
                height: size.y,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = create_bind_group(device, bind_group_layout, sampler, &view);

        let id = self.alloc_id();
        self.textures.insert(
            id,
            TextureEntry {
                texture,
                view,
                bind_group,
                size,
            },
        );
        id
    }

    pub fn size(&self, id: TextureId) -> Option<UVec2> {
        self.textures.get(&id).map(|e| e.size)
    }

    pub fn get(&self, id: TextureId) -> Option<&TextureEntry> {
        self.textures.get(&id)
    }

    /// Remove a texture by ID, freeing GPU resources.
    pub fn remove(&mut self, id: TextureId) -> bool {
        self.textures.remove(&id).is_some()
    }
}

fn create_bind_group(
    device: &wgpu::Device,
    bind_group_layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    view: &wgpu::TextureView,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("texture_bind_group"),
        layout: bind_group_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

fn create_texture_entry(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    bind_group_layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    data: &[u8],
    width: u32,
    height: u32,
) -> TextureEntry {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };

    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("sprite_texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        size,
    );

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let bind_group = create_bind_group(device, bind_group_layout, sampler, &view);

    TextureEntry {
        texture,
        view,
        bind_group,
        size: UVec2::new(width, height),
    }
}
