use anyhow::Result;
use glam::{IVec2, Mat3, UVec2, Vec3};

use crate::config::RenderConfig;
use crate::eye::{Eye, EyeManager, MapId, PIXELS_PER_METER};
use crate::math::{Box2, Box2i};
use crate::render::overlay::OverlaySpace;
use crate::render::sprites::{self, SpriteDrawEntry, SPRITE_BOUNDS_MARGIN};
use crate::render::state::RenderState;
use crate::render::viewport::{Viewport, ViewportId};
use crate::traits::render::{BlendMode, Color, DstRect, RenderBackend, Screenshot, TextureId};
use crate::traits::scene::{FrameContext, SpriteMeta};

/// Diagnostic overlays that replace part of the normal viewport output.
/// They never affect production draw order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugLayers {
    #[default]
    None,
    /// Visualize the field-of-view buffer.
    Fov,
    /// Visualize the light buffer over the viewport.
    Light,
}

/// Points in the frame where a queued screenshot gets captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenshotKind {
    /// After the world viewport is composited, before UI draws.
    BeforeUi,
    /// After the UI, right before the buffer swap.
    AfterUi,
}

/// Callback receiving a captured screenshot.
pub type ScreenshotCallback = Box<dyn FnOnce(Screenshot) + Send>;

struct ScreenshotRequest {
    kind: ScreenshotKind,
    callback: ScreenshotCallback,
}

/// Screen-space matrices for a target of the given pixel size: pixels map
/// to clip space with the origin at the top-left and Y growing downward.
pub fn calc_screen_matrices(size: UVec2) -> (Mat3, Mat3) {
    let size = size.as_vec2();
    let proj = Mat3::from_cols(
        Vec3::new(2.0 / size.x, 0.0, 0.0),
        Vec3::new(0.0, -2.0 / size.y, 0.0),
        Vec3::new(-1.0, 1.0, 1.0),
    );
    (proj, Mat3::IDENTITY)
}

/// World-space matrices for a target of the given pixel size: meters map
/// to clip space at `PIXELS_PER_METER`, world Y grows upward, and the view
/// matrix comes from the eye.
pub fn calc_world_matrices(size: UVec2, eye: &Eye) -> (Mat3, Mat3) {
    let size = size.as_vec2();
    let ppm = PIXELS_PER_METER as f32;
    let proj = Mat3::from_cols(
        Vec3::new(2.0 * ppm / size.x, 0.0, 0.0),
        Vec3::new(0.0, 2.0 * ppm / size.y, 0.0),
        Vec3::Z,
    );
    (proj, eye.view_matrix())
}

/// The per-frame render orchestrator.
///
/// Owns the camera manager, the viewports, the pooled post-process
/// isolation target, and the live render state. Collaborators (scene,
/// lighting, UI, resources, overlays) are threaded through each
/// `render` call in a [`FrameContext`]; the pipeline retains none of them.
pub struct RenderPipeline {
    eye_manager: EyeManager,
    viewports: Vec<Viewport>,
    main_viewport: ViewportId,

    /// Pooled offscreen target for sprites with a post-process shader.
    /// Checked out per sprite, composited back, never reallocated.
    entity_post_render_target: TextureId,
    post_target_size: UVec2,

    sprite_entries: Vec<SpriteDrawEntry>,
    sprite_query_scratch: Vec<SpriteMeta>,
    sprite_order_scratch: Vec<usize>,

    state: RenderState,
    pub debug_layers: DebugLayers,
    drawing_splash: bool,
    splash_path: String,
    pending_screenshots: Vec<ScreenshotRequest>,

    screen_size: UVec2,
    minimized: bool,
}

impl RenderPipeline {
    pub fn new(backend: &mut dyn RenderBackend, config: &RenderConfig) -> Result<Self> {
        let screen_size = backend.screen_size();
        let main_target = backend.create_render_target(screen_size)?;
        let post_size = UVec2::new(config.post_target_size.0, config.post_target_size.1);
        let entity_post_render_target = backend.create_render_target(post_size)?;

        log::debug!(
            "render pipeline up: screen {}x{}, post target {}x{}",
            screen_size.x,
            screen_size.y,
            post_size.x,
            post_size.y
        );

        let mut viewport = Viewport::new(main_target, screen_size, IVec2::ZERO);
        viewport.eye = None;

        Ok(Self {
            eye_manager: EyeManager::new(screen_size),
            viewports: vec![viewport],
            main_viewport: ViewportId(0),
            entity_post_render_target,
            post_target_size: post_size,
            sprite_entries: Vec::new(),
            sprite_query_scratch: Vec::new(),
            sprite_order_scratch: Vec::new(),
            state: RenderState::baseline(screen_size),
            debug_layers: DebugLayers::None,
            drawing_splash: false,
            splash_path: config.splash_path.clone(),
            pending_screenshots: Vec::new(),
            screen_size,
            minimized: false,
        })
    }

    pub fn eye_manager(&self) -> &EyeManager {
        &self.eye_manager
    }

    pub fn eye_manager_mut(&mut self) -> &mut EyeManager {
        &mut self.eye_manager
    }

    pub fn main_viewport(&self) -> ViewportId {
        self.main_viewport
    }

    pub fn viewport(&self, id: ViewportId) -> &Viewport {
        &self.viewports[id.0]
    }

    /// Register an auxiliary viewport with its own render target.
    pub fn create_viewport(
        &mut self,
        backend: &mut dyn RenderBackend,
        size: UVec2,
        screen_offset: IVec2,
    ) -> Result<ViewportId> {
        let target = backend.create_render_target(size)?;
        self.viewports.push(Viewport::new(target, size, screen_offset));
        Ok(ViewportId(self.viewports.len() - 1))
    }

    pub fn set_viewport_eye(&mut self, id: ViewportId, eye: Option<Eye>) {
        self.viewports[id.0].eye = eye;
    }

    pub fn set_minimized(&mut self, minimized: bool) {
        self.minimized = minimized;
    }

    pub fn set_drawing_splash(&mut self, drawing: bool) {
        self.drawing_splash = drawing;
    }

    /// Handle a display resize: the main viewport's target is recreated at
    /// the new size.
    pub fn on_resize(&mut self, backend: &mut dyn RenderBackend, size: UVec2) -> Result<()> {
        if size.x == 0 || size.y == 0 {
            return Ok(());
        }
        self.screen_size = size;
        self.eye_manager.set_screen_size(size);

        let main = &mut self.viewports[self.main_viewport.0];
        let old_target = main.render_target;
        main.render_target = backend.create_render_target(size)?;
        main.size = size;
        backend.destroy_texture(old_target)?;
        Ok(())
    }

    /// Capture the framebuffer contents at the given frame hook.
    pub fn queue_screenshot(&mut self, kind: ScreenshotKind, callback: ScreenshotCallback) {
        self.pending_screenshots.push(ScreenshotRequest { kind, callback });
    }

    /// Render one full frame. Always terminates with exactly one buffer
    /// swap; on error the next frame starts from a clean state baseline.
    pub fn render(&mut self, backend: &mut dyn RenderBackend, ctx: &mut FrameContext<'_>) -> Result<()> {
        backend.begin_frame()?;

        let size = self.screen_size;
        if size.x == 0 || size.y == 0 || self.minimized {
            backend.clear(Color::BLACK)?;
            // Keep swapping even while minimized so the swap chain stays
            // responsive when the window comes back.
            backend.swap_buffers()?;
            return Ok(());
        }

        self.eye_manager.set_screen_size(size);

        // Flush renderer state back to the baseline. If the previous frame
        // died mid-render this is what un-wedges the pipeline.
        self.clear_render_state(backend)?;

        backend.clear(Color::BLACK)?;
        backend.update_uniform_constants(size)?;

        let (proj, view) = calc_screen_matrices(size);
        self.set_proj_view_full(backend, proj, view)?;

        // Short path to render only the splash.
        if self.drawing_splash {
            self.draw_splash(backend, ctx)?;
            backend.flush()?;
            backend.swap_buffers()?;
            return Ok(());
        }

        self.render_overlays(backend, ctx, OverlaySpace::SCREEN_SPACE_BELOW_WORLD)?;

        let eye = self.eye_manager.current_eye();
        self.viewports[self.main_viewport.0].eye = Some(eye);
        self.render_viewport(backend, ctx, self.main_viewport)?;

        {
            let viewport = self.viewports[self.main_viewport.0];
            let offset = viewport.screen_offset.as_vec2();
            let vp_size = viewport.size.as_vec2();
            backend.draw_texture_rect(
                viewport.render_target,
                None,
                DstRect::new(offset.x, offset.y, vp_size.x, vp_size.y),
                Color::WHITE,
                0.0,
                BlendMode::Alpha,
            )?;
            backend.flush()?;
        }

        self.take_screenshots(backend, ScreenshotKind::BeforeUi)?;

        self.render_overlays(backend, ctx, OverlaySpace::SCREEN_SPACE)?;

        log::trace!("ui pass");
        ctx.ui.render(backend)?;
        backend.flush()?;

        self.take_screenshots(backend, ScreenshotKind::AfterUi)?;

        backend.swap_buffers()?;
        Ok(())
    }

    /// Render one viewport into its target. No eye means no output. The
    /// full render state is pushed before any mutation and popped on every
    /// exit path, so a mid-render failure cannot leave the caller bound to
    /// the wrong target or matrices.
    pub fn render_viewport(
        &mut self,
        backend: &mut dyn RenderBackend,
        ctx: &mut FrameContext<'_>,
        id: ViewportId,
    ) -> Result<()> {
        let viewport = self.viewports[id.0];
        let Some(eye) = viewport.eye else {
            return Ok(());
        };

        // All queued commands must finish against the previous target
        // before this viewport takes over.
        backend.flush()?;

        let saved = self.push_render_state_full();
        self.state.current_viewport = Some(id);

        let result = self.render_viewport_inner(backend, ctx, &viewport, &eye);

        let restored = self.pop_render_state_full(backend, saved);
        // Shared per-frame uniforms go back to the caller's viewport size.
        let caller_size = saved
            .current_viewport
            .map(|v| self.viewports[v.0].size)
            .unwrap_or(self.screen_size);
        let uniforms = backend.update_uniform_constants(caller_size);

        result.and(restored).and(uniforms)
    }

    fn render_viewport_inner(
        &mut self,
        backend: &mut dyn RenderBackend,
        ctx: &mut FrameContext<'_>,
        viewport: &Viewport,
        eye: &Eye,
    ) -> Result<()> {
        self.bind_render_target_full(backend, Some(viewport.render_target))?;
        backend.clear(Color::TRANSPARENT)?;
        self.set_viewport_rect_full(
            backend,
            Box2i::from_dimensions(IVec2::ZERO, viewport.size.as_ivec2()),
        )?;
        backend.update_uniform_constants(viewport.size)?;

        let (proj, view) = calc_world_matrices(viewport.size, eye);
        self.set_proj_view_full(backend, proj, view)?;

        // World-space AABB for the camera, to cull off-screen things.
        // Zooming out enlarges the culled region proportionally.
        let world_bounds = Box2::centered_around(
            eye.position.position,
            self.screen_size.as_vec2() / PIXELS_PER_METER as f32 * eye.zoom,
        );

        let map = eye.position.map_id;
        if map != MapId::NULLSPACE && ctx.scene.map_exists(map) {
            log::trace!("lights pass");
            ctx.lighting.draw_lights_and_fov(backend, viewport, world_bounds, eye)?;

            log::trace!("grid pass");
            ctx.scene.draw_grids(backend, world_bounds)?;

            log::trace!("entity pass");
            self.draw_entities(backend, ctx, viewport, world_bounds)?;

            self.render_overlays(backend, ctx, OverlaySpace::WORLD_SPACE)?;

            if ctx.lighting.enabled() && eye.draw_fov {
                ctx.lighting.apply_fov_to_buffer(backend, viewport, eye)?;
            }
        }

        match self.debug_layers {
            DebugLayers::None => {}
            DebugLayers::Fov => {
                if let Some(texture) = ctx.lighting.fov_debug_texture() {
                    // Diagnostic draw in screen space; the state pop right
                    // after restores the caller's matrices.
                    let (proj, view) = calc_screen_matrices(self.screen_size);
                    backend.set_proj_view(proj, view)?;
                    backend.set_model_transform(Mat3::IDENTITY)?;
                    let pos = self.screen_size.as_ivec2() / 2 - IVec2::splat(200);
                    backend.draw_texture_rect(
                        texture,
                        None,
                        DstRect::new(pos.x as f32, pos.y as f32, 400.0, 400.0),
                        Color::WHITE,
                        0.0,
                        BlendMode::Alpha,
                    )?;
                    backend.set_model_transform(self.state.model)?;
                }
            }
            DebugLayers::Light => {
                if let Some(texture) = ctx.lighting.light_debug_texture(viewport) {
                    let (proj, view) = calc_screen_matrices(self.screen_size);
                    backend.set_proj_view(proj, view)?;
                    backend.set_model_transform(Mat3::IDENTITY)?;
                    let size = self.screen_size.as_vec2();
                    backend.draw_texture_rect(
                        texture,
                        None,
                        DstRect::new(0.0, 0.0, size.x, size.y),
                        Color::new(1.0, 1.0, 1.0, 0.5),
                        0.0,
                        BlendMode::Alpha,
                    )?;
                    backend.set_model_transform(self.state.model)?;
                }
            }
        }

        Ok(())
    }

    /// Entity pass: query, filter, order, draw. See `sprites` for the
    /// ordering rules.
    fn draw_entities(
        &mut self,
        backend: &mut dyn RenderBackend,
        ctx: &mut FrameContext<'_>,
        viewport: &Viewport,
        world_bounds: Box2,
    ) -> Result<()> {
        let map = self.eye_manager.current_map();
        if map == MapId::NULLSPACE || !ctx.scene.map_exists(map) {
            return Ok(());
        }

        let screen_size = viewport.size;
        let wider_bounds = world_bounds.enlarged(SPRITE_BOUNDS_MARGIN);

        self.sprite_query_scratch.clear();
        ctx.scene.sprites_in_box(map, wider_bounds, &mut self.sprite_query_scratch);

        self.sprite_entries.clear();
        for meta in &self.sprite_query_scratch {
            if meta.container_occluded || !meta.visible {
                continue;
            }
            let world_position = meta.world_matrix.transform_point2(meta.local_position);
            self.sprite_entries.push(SpriteDrawEntry {
                key: meta.key,
                post_shader: meta.post_shader,
                world_matrix: meta.world_matrix,
                world_rotation: meta.world_rotation,
                world_position,
                y_world_pos: world_position.y,
            });
        }

        sprites::sort_draw_indices(&self.sprite_entries, &mut self.sprite_order_scratch);

        for i in 0..self.sprite_order_scratch.len() {
            let entry = self.sprite_entries[self.sprite_order_scratch[i]];

            let mut rounded_pos = IVec2::ZERO;
            if entry.post_shader.is_some() {
                backend.set_render_target(Some(self.entity_post_render_target))?;
                backend.clear(Color::TRANSPARENT)?;
                // Shift the viewport rect so the sprite thinks it is
                // drawing at its normal screen position while actually
                // landing in the center of the isolation target. Keeps
                // position-dependent effects (lighting) correct.
                let screen_pos = self.eye_manager.world_to_screen(entry.world_position);
                rounded_pos = screen_pos.as_ivec2();
                let mut flipped_pos = IVec2::new(rounded_pos.x, screen_size.y as i32 - rounded_pos.y);
                flipped_pos -= self.post_target_size.as_ivec2() / 2;
                backend.set_viewport_rect(Box2i::from_dimensions(
                    -flipped_pos,
                    screen_size.as_ivec2(),
                ))?;
            }

            ctx.scene
                .draw_sprite(backend, entry.key, entry.world_matrix, entry.world_rotation)?;

            if let Some(shader) = entry.post_shader {
                let old_proj = self.state.proj;
                let old_view = self.state.view;

                backend.set_render_target(Some(viewport.render_target))?;
                backend.set_viewport_rect(Box2i::from_dimensions(
                    IVec2::ZERO,
                    screen_size.as_ivec2(),
                ))?;

                backend.set_shader(Some(shader))?;
                let (proj, view) = calc_screen_matrices(screen_size);
                backend.set_proj_view(proj, view)?;
                backend.set_model_transform(Mat3::IDENTITY)?;

                let origin = rounded_pos - self.post_target_size.as_ivec2() / 2;
                backend.draw_texture_rect(
                    self.entity_post_render_target,
                    None,
                    DstRect::new(
                        origin.x as f32,
                        origin.y as f32,
                        self.post_target_size.x as f32,
                        self.post_target_size.y as f32,
                    ),
                    Color::WHITE,
                    0.0,
                    BlendMode::Alpha,
                )?;

                backend.set_proj_view(old_proj, old_view)?;
                backend.set_model_transform(self.state.model)?;
                backend.set_shader(None)?;
            }
        }

        self.sprite_entries.clear();
        backend.flush()?;
        Ok(())
    }

    /// One compositing pass: overlays whose space intersects `space`, in
    /// stable z order.
    fn render_overlays(
        &mut self,
        backend: &mut dyn RenderBackend,
        ctx: &mut FrameContext<'_>,
        space: OverlaySpace,
    ) -> Result<()> {
        log::trace!("overlay pass {space:?}");
        for index in ctx.overlays.visible_in(space) {
            ctx.overlays.get_mut(index).render(backend, space)?;
        }
        backend.flush()?;
        Ok(())
    }

    fn draw_splash(&mut self, backend: &mut dyn RenderBackend, ctx: &FrameContext<'_>) -> Result<()> {
        let Some(texture) = ctx.resources.texture(&self.splash_path) else {
            log::warn!("splash texture missing: {}", self.splash_path);
            return Ok(());
        };
        let size = backend.texture_size(texture).unwrap_or(UVec2::ONE);
        let pos = (self.screen_size.as_ivec2() - size.as_ivec2()) / 2;
        backend.draw_texture_rect(
            texture,
            None,
            DstRect::new(pos.x as f32, pos.y as f32, size.x as f32, size.y as f32),
            Color::WHITE,
            0.0,
            BlendMode::Alpha,
        )
    }

    fn take_screenshots(&mut self, backend: &mut dyn RenderBackend, kind: ScreenshotKind) -> Result<()> {
        if !self.pending_screenshots.iter().any(|r| r.kind == kind) {
            return Ok(());
        }
        let shot = backend.capture_target()?;
        let mut remaining = Vec::with_capacity(self.pending_screenshots.len());
        for request in self.pending_screenshots.drain(..) {
            if request.kind == kind {
                (request.callback)(shot.clone());
            } else {
                remaining.push(request);
            }
        }
        self.pending_screenshots = remaining;
        Ok(())
    }

    // ---- render-state bookkeeping -------------------------------------

    /// Copy out the full live render state before entering a nested
    /// rendering context.
    fn push_render_state_full(&self) -> RenderState {
        self.state
    }

    /// Restore a previously pushed state verbatim, re-applying every field
    /// to the backend. Queued commands are flushed first so nothing
    /// straddles the target switch.
    fn pop_render_state_full(
        &mut self,
        backend: &mut dyn RenderBackend,
        saved: RenderState,
    ) -> Result<()> {
        backend.flush()?;
        backend.set_render_target(saved.render_target)?;
        backend.set_viewport_rect(saved.viewport_rect)?;
        backend.set_scissor(saved.scissor)?;
        backend.set_proj_view(saved.proj, saved.view)?;
        backend.set_model_transform(saved.model)?;
        self.state = saved;
        Ok(())
    }

    /// Reset all render state to the baseline at the top of a frame.
    fn clear_render_state(&mut self, backend: &mut dyn RenderBackend) -> Result<()> {
        self.state = RenderState::baseline(self.screen_size);
        backend.set_shader(None)?;
        backend.set_render_target(None)?;
        backend.set_viewport_rect(self.state.viewport_rect)?;
        backend.set_scissor(None)?;
        backend.set_proj_view(Mat3::IDENTITY, Mat3::IDENTITY)?;
        backend.set_model_transform(Mat3::IDENTITY)?;
        Ok(())
    }

    fn set_proj_view_full(
        &mut self,
        backend: &mut dyn RenderBackend,
        proj: Mat3,
        view: Mat3,
    ) -> Result<()> {
        self.state.proj = proj;
        self.state.view = view;
        backend.set_proj_view(proj, view)
    }

    fn bind_render_target_full(
        &mut self,
        backend: &mut dyn RenderBackend,
        target: Option<TextureId>,
    ) -> Result<()> {
        self.state.render_target = target;
        backend.set_render_target(target)
    }

    fn set_viewport_rect_full(&mut self, backend: &mut dyn RenderBackend, rect: Box2i) -> Result<()> {
        self.state.viewport_rect = rect;
        backend.set_viewport_rect(rect)
    }
}
