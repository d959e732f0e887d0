//! Integration tests for the frame pipeline, driven through the
//! CommandRecorder backend: frame sequencing, overlay ordering, sprite
//! draw order, render-state balance, and the post-shader isolation path.

use std::collections::HashMap;
use std::sync::mpsc;

use anyhow::{Result, anyhow};
use glam::{IVec2, Mat3, UVec2, Vec2, vec2};

use vantage::config::RenderConfig;
use vantage::eye::{Eye, MapCoordinates, MapId};
use vantage::math::{Box2, Box2i};
use vantage::render::command_recorder::{CommandRecorder, RecordedCommand};
use vantage::render::{Overlay, OverlayRegistry, OverlaySpace, RenderPipeline, ScreenshotKind};
use vantage::traits::render::{
    BlendMode, Color, DstRect, RenderBackend, ShaderId, TextureId,
};
use vantage::traits::scene::{
    DisabledLighting, FrameContext, ResourceCache, Scene, SpriteKey, SpriteMeta, UserInterface,
};

const MAP: MapId = MapId(1);

// ---- test collaborators ------------------------------------------------

#[derive(Default)]
struct TestScene {
    sprites: Vec<SpriteMeta>,
    textures: HashMap<SpriteKey, TextureId>,
    fail_sprite: Option<SpriteKey>,
}

impl TestScene {
    fn add_sprite(&mut self, recorder: &mut CommandRecorder, key: u64, position: Vec2) -> SpriteKey {
        self.add_sprite_full(recorder, key, position, true, false, None)
    }

    fn add_sprite_full(
        &mut self,
        recorder: &mut CommandRecorder,
        key: u64,
        position: Vec2,
        visible: bool,
        container_occluded: bool,
        post_shader: Option<ShaderId>,
    ) -> SpriteKey {
        let key = SpriteKey(key);
        let texture = recorder.register_texture(32, 32);
        self.textures.insert(key, texture);
        self.sprites.push(SpriteMeta {
            key,
            visible,
            container_occluded,
            world_matrix: Mat3::from_translation(position),
            world_rotation: 0.0,
            local_position: Vec2::ZERO,
            post_shader,
        });
        key
    }
}

impl Scene for TestScene {
    fn map_exists(&self, map: MapId) -> bool {
        map == MAP
    }

    fn draw_grids(&mut self, _backend: &mut dyn RenderBackend, _bounds: Box2) -> Result<()> {
        Ok(())
    }

    fn sprites_in_box(&self, _map: MapId, _bounds: Box2, out: &mut Vec<SpriteMeta>) {
        // Approximate query: over-returning is allowed by the contract.
        out.extend(self.sprites.iter().copied());
    }

    fn draw_sprite(
        &mut self,
        backend: &mut dyn RenderBackend,
        sprite: SpriteKey,
        model: Mat3,
        rotation: f32,
    ) -> Result<()> {
        if self.fail_sprite == Some(sprite) {
            return Err(anyhow!("sprite {sprite:?} lost its texture"));
        }
        let texture = self.textures[&sprite];
        backend.set_model_transform(model)?;
        backend.draw_texture_rect(
            texture,
            None,
            DstRect::new(-0.5, -0.5, 1.0, 1.0),
            Color::WHITE,
            rotation,
            BlendMode::Alpha,
        )
    }
}

#[derive(Default)]
struct TestUi {
    texture: Option<TextureId>,
}

impl UserInterface for TestUi {
    fn render(&mut self, backend: &mut dyn RenderBackend) -> Result<()> {
        if let Some(texture) = self.texture {
            backend.draw_texture_rect(
                texture,
                None,
                DstRect::new(0.0, 0.0, 64.0, 64.0),
                Color::WHITE,
                0.0,
                BlendMode::Alpha,
            )?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct TestResources {
    textures: HashMap<String, TextureId>,
}

impl ResourceCache for TestResources {
    fn texture(&self, path: &str) -> Option<TextureId> {
        self.textures.get(path).copied()
    }
}

struct DrawnOverlay {
    spaces: OverlaySpace,
    z: i32,
    texture: TextureId,
}

impl Overlay for DrawnOverlay {
    fn spaces(&self) -> OverlaySpace {
        self.spaces
    }

    fn z_index(&self) -> i32 {
        self.z
    }

    fn render(&mut self, backend: &mut dyn RenderBackend, _space: OverlaySpace) -> Result<()> {
        backend.draw_texture_rect(
            self.texture,
            None,
            DstRect::new(0.0, 0.0, 8.0, 8.0),
            Color::WHITE,
            0.0,
            BlendMode::Alpha,
        )
    }
}

struct FailingOverlay {
    spaces: OverlaySpace,
}

impl Overlay for FailingOverlay {
    fn spaces(&self) -> OverlaySpace {
        self.spaces
    }

    fn render(&mut self, _backend: &mut dyn RenderBackend, _space: OverlaySpace) -> Result<()> {
        Err(anyhow!("overlay shader went missing"))
    }
}

// ---- helpers -----------------------------------------------------------

struct Fixture {
    scene: TestScene,
    lighting: DisabledLighting,
    ui: TestUi,
    resources: TestResources,
    overlays: OverlayRegistry,
}

impl Fixture {
    fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self {
            scene: TestScene::default(),
            lighting: DisabledLighting,
            ui: TestUi::default(),
            resources: TestResources::default(),
            overlays: OverlayRegistry::new(),
        }
    }

    fn ctx(&mut self) -> FrameContext<'_> {
        FrameContext {
            scene: &mut self.scene,
            lighting: &mut self.lighting,
            ui: &mut self.ui,
            resources: &self.resources,
            overlays: &mut self.overlays,
        }
    }
}

fn pipeline(recorder: &mut CommandRecorder) -> RenderPipeline {
    RenderPipeline::new(recorder, &RenderConfig::default()).unwrap()
}

fn eye_on_map() -> Eye {
    Eye {
        position: MapCoordinates::new(Vec2::ZERO, MAP),
        ..Eye::default()
    }
}

/// Index of the first draw of `texture` in the command stream.
fn draw_index(commands: &[RecordedCommand], texture: TextureId) -> Option<usize> {
    commands.iter().position(
        |c| matches!(c, RecordedCommand::DrawTextureRect { texture: t, .. } if *t == texture),
    )
}

/// The render target bound when `texture` is first drawn.
fn target_at_draw(commands: &[RecordedCommand], texture: TextureId) -> Option<TextureId> {
    let mut current = None;
    for cmd in commands {
        match cmd {
            RecordedCommand::SetRenderTarget(t) => current = *t,
            RecordedCommand::DrawTextureRect { texture: t, .. } if *t == texture => {
                return current;
            }
            _ => {}
        }
    }
    panic!("texture {texture:?} never drawn");
}

/// Textures drawn, in order.
fn drawn_textures(commands: &[RecordedCommand]) -> Vec<TextureId> {
    commands
        .iter()
        .filter_map(|c| match c {
            RecordedCommand::DrawTextureRect { texture, .. } => Some(*texture),
            _ => None,
        })
        .collect()
}

fn swap_count(commands: &[RecordedCommand]) -> usize {
    commands
        .iter()
        .filter(|c| matches!(c, RecordedCommand::SwapBuffers))
        .count()
}

// ---- frame orchestration ----------------------------------------------

#[test]
fn test_frame_ends_with_single_swap() {
    let mut recorder = CommandRecorder::new(1280, 720);
    let mut pipeline = pipeline(&mut recorder);
    let mut fixture = Fixture::new();
    pipeline.eye_manager_mut().set_current_eye(Some(eye_on_map()));

    pipeline.render(&mut recorder, &mut fixture.ctx()).unwrap();

    let commands = recorder.commands();
    assert_eq!(commands[0], RecordedCommand::BeginFrame);
    assert_eq!(*commands.last().unwrap(), RecordedCommand::SwapBuffers);
    assert_eq!(swap_count(commands), 1);
}

#[test]
fn test_minimized_frame_swaps_without_draws() {
    let mut recorder = CommandRecorder::new(1280, 720);
    let mut pipeline = pipeline(&mut recorder);
    let mut fixture = Fixture::new();
    fixture.scene.add_sprite(&mut recorder, 1, Vec2::ZERO);
    pipeline.eye_manager_mut().set_current_eye(Some(eye_on_map()));
    pipeline.set_minimized(true);

    pipeline.render(&mut recorder, &mut fixture.ctx()).unwrap();

    assert_eq!(swap_count(recorder.commands()), 1);
    assert!(recorder.draws().is_empty());
}

#[test]
fn test_zero_size_frame_swaps_without_draws() {
    let mut recorder = CommandRecorder::new(0, 0);
    let mut pipeline = pipeline(&mut recorder);
    let mut fixture = Fixture::new();

    pipeline.render(&mut recorder, &mut fixture.ctx()).unwrap();

    assert_eq!(swap_count(recorder.commands()), 1);
    assert!(recorder.draws().is_empty());
}

#[test]
fn test_splash_short_circuits_scene() {
    let mut recorder = CommandRecorder::new(1280, 720);
    let mut pipeline = pipeline(&mut recorder);
    let mut fixture = Fixture::new();

    let splash = recorder.register_texture(200, 100);
    fixture
        .resources
        .textures
        .insert(RenderConfig::default().splash_path, splash);
    let overlay_tex = recorder.register_texture(8, 8);
    fixture.overlays.register(Box::new(DrawnOverlay {
        spaces: OverlaySpace::SCREEN_SPACE,
        z: 0,
        texture: overlay_tex,
    }));
    pipeline.eye_manager_mut().set_current_eye(Some(eye_on_map()));
    pipeline.set_drawing_splash(true);

    pipeline.render(&mut recorder, &mut fixture.ctx()).unwrap();

    let drawn = drawn_textures(recorder.commands());
    assert_eq!(drawn, vec![splash]);
    assert_eq!(swap_count(recorder.commands()), 1);

    // Centered on screen.
    let commands = recorder.commands();
    let idx = draw_index(commands, splash).unwrap();
    let RecordedCommand::DrawTextureRect { dst, .. } = &commands[idx] else {
        unreachable!();
    };
    assert_eq!((dst.x, dst.y), (540.0, 310.0));
}

#[test]
fn test_missing_splash_degrades_to_nothing() {
    let mut recorder = CommandRecorder::new(1280, 720);
    let mut pipeline = pipeline(&mut recorder);
    let mut fixture = Fixture::new();
    pipeline.set_drawing_splash(true);

    pipeline.render(&mut recorder, &mut fixture.ctx()).unwrap();

    assert!(recorder.draws().is_empty());
    assert_eq!(swap_count(recorder.commands()), 1);
}

// ---- overlay compositing ----------------------------------------------

#[test]
fn test_overlay_z_order_stable() {
    let mut recorder = CommandRecorder::new(1280, 720);
    let mut pipeline = pipeline(&mut recorder);
    let mut fixture = Fixture::new();

    // Registration order with z [3, 1, 2, 1]; expected invocation order is
    // both z=1 overlays in registration order, then 2, then 3.
    let mut textures = Vec::new();
    for z in [3, 1, 2, 1] {
        let texture = recorder.register_texture(8, 8);
        textures.push(texture);
        fixture.overlays.register(Box::new(DrawnOverlay {
            spaces: OverlaySpace::SCREEN_SPACE,
            z,
            texture,
        }));
    }

    pipeline.render(&mut recorder, &mut fixture.ctx()).unwrap();

    let drawn = drawn_textures(recorder.commands());
    let overlay_draws: Vec<TextureId> = drawn
        .into_iter()
        .filter(|t| textures.contains(t))
        .collect();
    assert_eq!(
        overlay_draws,
        vec![textures[1], textures[3], textures[2], textures[0]]
    );
}

#[test]
fn test_overlay_spaces_draw_into_expected_targets() {
    let mut recorder = CommandRecorder::new(1280, 720);
    let mut pipeline = pipeline(&mut recorder);
    let mut fixture = Fixture::new();

    let below = recorder.register_texture(8, 8);
    let world = recorder.register_texture(8, 8);
    let screen = recorder.register_texture(8, 8);
    for (spaces, texture) in [
        (OverlaySpace::SCREEN_SPACE_BELOW_WORLD, below),
        (OverlaySpace::WORLD_SPACE, world),
        (OverlaySpace::SCREEN_SPACE, screen),
    ] {
        fixture.overlays.register(Box::new(DrawnOverlay {
            spaces,
            z: 0,
            texture,
        }));
    }
    pipeline.eye_manager_mut().set_current_eye(Some(eye_on_map()));

    pipeline.render(&mut recorder, &mut fixture.ctx()).unwrap();

    let commands = recorder.commands();
    let viewport_target = pipeline.viewport(pipeline.main_viewport()).render_target;

    // Below-world and screen-space overlays draw to the backbuffer; the
    // world-space overlay draws inside the viewport's render target.
    assert_eq!(target_at_draw(commands, below), None);
    assert_eq!(target_at_draw(commands, world), Some(viewport_target));
    assert_eq!(target_at_draw(commands, screen), None);

    // Ordering: below-world, then world, then the viewport composite,
    // then screen-space.
    let below_idx = draw_index(commands, below).unwrap();
    let world_idx = draw_index(commands, world).unwrap();
    let composite_idx = draw_index(commands, viewport_target).unwrap();
    let screen_idx = draw_index(commands, screen).unwrap();
    assert!(below_idx < world_idx);
    assert!(world_idx < composite_idx);
    assert!(composite_idx < screen_idx);
}

#[test]
fn test_failed_overlay_aborts_frame_then_recovers() {
    let mut recorder = CommandRecorder::new(1280, 720);
    let mut pipeline = pipeline(&mut recorder);
    let mut fixture = Fixture::new();
    fixture.overlays.register(Box::new(FailingOverlay {
        spaces: OverlaySpace::SCREEN_SPACE_BELOW_WORLD,
    }));
    pipeline.eye_manager_mut().set_current_eye(Some(eye_on_map()));

    assert!(pipeline.render(&mut recorder, &mut fixture.ctx()).is_err());

    // The next frame starts from the state baseline and completes.
    let mut fixture = Fixture::new();
    pipeline.render(&mut recorder, &mut fixture.ctx()).unwrap();
    assert_eq!(*recorder.commands().last().unwrap(), RecordedCommand::SwapBuffers);
    assert_eq!(recorder.state().render_target, None);
}

// ---- ui ---------------------------------------------------------------

#[test]
fn test_ui_draws_after_world_composite() {
    let mut recorder = CommandRecorder::new(1280, 720);
    let mut pipeline = pipeline(&mut recorder);
    let mut fixture = Fixture::new();
    let ui_tex = recorder.register_texture(64, 64);
    fixture.ui.texture = Some(ui_tex);
    pipeline.eye_manager_mut().set_current_eye(Some(eye_on_map()));

    pipeline.render(&mut recorder, &mut fixture.ctx()).unwrap();

    let commands = recorder.commands();
    let viewport_target = pipeline.viewport(pipeline.main_viewport()).render_target;
    let composite_idx = draw_index(commands, viewport_target).unwrap();
    let ui_idx = draw_index(commands, ui_tex).unwrap();
    assert!(composite_idx < ui_idx);
    assert_eq!(target_at_draw(commands, ui_tex), None);
}

// ---- sprite ordering ---------------------------------------------------

#[test]
fn test_sprites_draw_high_y_first() {
    let mut recorder = CommandRecorder::new(1280, 720);
    let mut pipeline = pipeline(&mut recorder);
    let mut fixture = Fixture::new();

    let low = fixture.scene.add_sprite(&mut recorder, 1, vec2(0.0, -2.0));
    let high = fixture.scene.add_sprite(&mut recorder, 2, vec2(0.0, 3.0));
    let mid = fixture.scene.add_sprite(&mut recorder, 3, vec2(0.0, 1.0));
    pipeline.eye_manager_mut().set_current_eye(Some(eye_on_map()));

    pipeline.render(&mut recorder, &mut fixture.ctx()).unwrap();

    let sprite_textures: Vec<TextureId> = [high, mid, low]
        .iter()
        .map(|k| fixture.scene.textures[k])
        .collect();
    let drawn: Vec<TextureId> = drawn_textures(recorder.commands())
        .into_iter()
        .filter(|t| sprite_textures.contains(t))
        .collect();
    assert_eq!(drawn, sprite_textures);
}

#[test]
fn test_equal_y_sprites_keep_query_order() {
    let mut recorder = CommandRecorder::new(1280, 720);
    let mut pipeline = pipeline(&mut recorder);
    let mut fixture = Fixture::new();

    let first = fixture.scene.add_sprite(&mut recorder, 1, vec2(-1.0, 2.0));
    let second = fixture.scene.add_sprite(&mut recorder, 2, vec2(5.0, 2.0));
    pipeline.eye_manager_mut().set_current_eye(Some(eye_on_map()));

    pipeline.render(&mut recorder, &mut fixture.ctx()).unwrap();

    let expected: Vec<TextureId> = [first, second]
        .iter()
        .map(|k| fixture.scene.textures[k])
        .collect();
    let drawn: Vec<TextureId> = drawn_textures(recorder.commands())
        .into_iter()
        .filter(|t| expected.contains(t))
        .collect();
    assert_eq!(drawn, expected);
}

#[test]
fn test_occluded_and_invisible_sprites_skipped() {
    let mut recorder = CommandRecorder::new(1280, 720);
    let mut pipeline = pipeline(&mut recorder);
    let mut fixture = Fixture::new();

    let visible = fixture.scene.add_sprite(&mut recorder, 1, Vec2::ZERO);
    let invisible = fixture
        .scene
        .add_sprite_full(&mut recorder, 2, Vec2::ZERO, false, false, None);
    let occluded = fixture
        .scene
        .add_sprite_full(&mut recorder, 3, Vec2::ZERO, true, true, None);
    pipeline.eye_manager_mut().set_current_eye(Some(eye_on_map()));

    pipeline.render(&mut recorder, &mut fixture.ctx()).unwrap();

    let drawn = drawn_textures(recorder.commands());
    assert!(drawn.contains(&fixture.scene.textures[&visible]));
    assert!(!drawn.contains(&fixture.scene.textures[&invisible]));
    assert!(!drawn.contains(&fixture.scene.textures[&occluded]));
}

#[test]
fn test_identical_frames_replay_identically() {
    let mut recorder = CommandRecorder::new(1280, 720);
    let mut pipeline = pipeline(&mut recorder);
    let mut fixture = Fixture::new();
    for (key, y) in [(1, 4.0), (2, 4.0), (3, -1.0), (4, 0.5), (5, 4.0)] {
        fixture.scene.add_sprite(&mut recorder, key, vec2(0.0, y));
    }
    pipeline.eye_manager_mut().set_current_eye(Some(eye_on_map()));

    pipeline.render(&mut recorder, &mut fixture.ctx()).unwrap();
    let first: Vec<RecordedCommand> = recorder.commands().to_vec();

    recorder.clear_commands();
    pipeline.render(&mut recorder, &mut fixture.ctx()).unwrap();
    assert_eq!(recorder.commands(), first.as_slice());
}

#[test]
fn test_empty_scene_renders_clean_frame() {
    let mut recorder = CommandRecorder::new(1280, 720);
    let mut pipeline = pipeline(&mut recorder);
    let mut fixture = Fixture::new();
    pipeline.eye_manager_mut().set_current_eye(Some(eye_on_map()));

    pipeline.render(&mut recorder, &mut fixture.ctx()).unwrap();

    // Only the viewport composite draws; zero sprites is a valid no-op.
    let viewport_target = pipeline.viewport(pipeline.main_viewport()).render_target;
    assert_eq!(drawn_textures(recorder.commands()), vec![viewport_target]);
}

// ---- render-state stack ------------------------------------------------

#[test]
fn test_viewport_without_eye_is_noop() {
    let mut recorder = CommandRecorder::new(1280, 720);
    let mut pipeline = pipeline(&mut recorder);
    let mut fixture = Fixture::new();

    let aux = pipeline
        .create_viewport(&mut recorder, UVec2::new(256, 256), IVec2::ZERO)
        .unwrap();
    recorder.clear_commands();

    pipeline
        .render_viewport(&mut recorder, &mut fixture.ctx(), aux)
        .unwrap();
    assert!(recorder.commands().is_empty());
}

#[test]
fn test_render_state_balanced_after_viewport() {
    let mut recorder = CommandRecorder::new(1280, 720);
    let mut pipeline = pipeline(&mut recorder);
    let mut fixture = Fixture::new();
    fixture.scene.add_sprite(&mut recorder, 1, Vec2::ZERO);
    pipeline.set_viewport_eye(pipeline.main_viewport(), Some(eye_on_map()));

    let before = recorder.state().clone();
    pipeline
        .render_viewport(&mut recorder, &mut fixture.ctx(), pipeline.main_viewport())
        .unwrap();
    assert_eq!(*recorder.state(), before);
}

#[test]
fn test_render_state_balanced_when_sprite_draw_fails() {
    let mut recorder = CommandRecorder::new(1280, 720);
    let mut pipeline = pipeline(&mut recorder);
    let mut fixture = Fixture::new();
    fixture.scene.add_sprite(&mut recorder, 1, vec2(0.0, 5.0));
    let failing = fixture.scene.add_sprite(&mut recorder, 2, Vec2::ZERO);
    fixture.scene.add_sprite(&mut recorder, 3, vec2(0.0, -5.0));
    fixture.scene.fail_sprite = Some(failing);
    pipeline.set_viewport_eye(pipeline.main_viewport(), Some(eye_on_map()));

    let before = recorder.state().clone();
    let result = pipeline.render_viewport(&mut recorder, &mut fixture.ctx(), pipeline.main_viewport());

    assert!(result.is_err());
    // The caller's state survives the mid-render failure intact.
    assert_eq!(*recorder.state(), before);
}

#[test]
fn test_nested_sequential_viewports_restore_state() {
    let mut recorder = CommandRecorder::new(1280, 720);
    let mut pipeline = pipeline(&mut recorder);
    let mut fixture = Fixture::new();

    let aux = pipeline
        .create_viewport(&mut recorder, UVec2::new(320, 240), IVec2::new(10, 10))
        .unwrap();
    pipeline.set_viewport_eye(aux, Some(eye_on_map()));
    pipeline.set_viewport_eye(pipeline.main_viewport(), Some(eye_on_map()));

    let before = recorder.state().clone();
    pipeline
        .render_viewport(&mut recorder, &mut fixture.ctx(), pipeline.main_viewport())
        .unwrap();
    pipeline
        .render_viewport(&mut recorder, &mut fixture.ctx(), aux)
        .unwrap();
    assert_eq!(*recorder.state(), before);
}

// ---- post-shader isolation ---------------------------------------------

#[test]
fn test_post_shader_sprite_isolated_and_composited() {
    // Screen height equal to the nominal viewport height makes the
    // screen-transform and the viewport pixel mapping line up exactly.
    let mut recorder = CommandRecorder::new(1280, 1216);
    let mut pipeline = pipeline(&mut recorder);
    let mut fixture = Fixture::new();

    let shader = recorder.load_shader("// glow").unwrap();
    let sprite_pos = vec2(2.0, 3.0);
    let key = fixture
        .scene
        .add_sprite_full(&mut recorder, 1, sprite_pos, true, false, Some(shader));
    pipeline.eye_manager_mut().set_current_eye(Some(eye_on_map()));

    pipeline.render(&mut recorder, &mut fixture.ctx()).unwrap();

    let commands = recorder.commands();
    let sprite_tex = fixture.scene.textures[&key];
    let viewport_target = pipeline.viewport(pipeline.main_viewport()).render_target;

    // world_to_screen((2,3)) with a centered eye: (64 + 640, -96 + 608).
    let screen_pos = pipeline.eye_manager().world_to_screen(sprite_pos);
    assert_eq!(screen_pos, vec2(704.0, 512.0));

    // The sprite itself draws into the isolation target, with the
    // viewport rect shifted so it lands at its normal screen position.
    let post_target = target_at_draw(commands, sprite_tex).expect("sprite drew to backbuffer");
    assert_ne!(post_target, viewport_target);

    let sprite_idx = draw_index(commands, sprite_tex).unwrap();
    let viewport_rect = commands[..sprite_idx]
        .iter()
        .rev()
        .find_map(|c| match c {
            RecordedCommand::SetViewportRect(rect) => Some(*rect),
            _ => None,
        })
        .unwrap();
    // flipped = (704, 1216 - 512) - (512, 512) = (192, 192); the rect is
    // the negated flip with the viewport's full size.
    assert_eq!(
        viewport_rect,
        Box2i::from_dimensions(IVec2::new(-192, -192), IVec2::new(1280, 1216))
    );

    // The isolation target then composites into the viewport under the
    // post shader, centered on the sprite's screen position.
    let composite_idx = draw_index(commands, post_target).unwrap();
    assert!(composite_idx > sprite_idx);
    let RecordedCommand::DrawTextureRect { dst, .. } = &commands[composite_idx] else {
        unreachable!();
    };
    assert_eq!((dst.x, dst.y, dst.w, dst.h), (192.0, 0.0, 1024.0, 1024.0));
    assert_eq!(dst.x + dst.w / 2.0, screen_pos.x);
    assert_eq!(dst.y + dst.h / 2.0, screen_pos.y);
    assert_eq!(target_at_draw(commands, post_target), Some(viewport_target));

    // The shader wraps only the composite; it is off again afterwards.
    let shader_on = commands[..composite_idx]
        .iter()
        .rev()
        .find_map(|c| match c {
            RecordedCommand::SetShader(s) => Some(*s),
            _ => None,
        })
        .unwrap();
    assert_eq!(shader_on, Some(shader));
    assert_eq!(recorder.state().shader, None);
}

#[test]
fn test_post_shader_composite_matches_plain_position() {
    // Render the same sprite twice: once plain, once with a post shader.
    // The composite must place the isolation target so the sprite's
    // screen-space center matches the plain path.
    let sprite_pos = vec2(-4.0, 1.5);

    let mut recorder = CommandRecorder::new(1280, 1216);
    let mut pipeline_plain = pipeline(&mut recorder);
    let mut fixture = Fixture::new();
    let key = fixture.scene.add_sprite(&mut recorder, 1, sprite_pos);
    pipeline_plain.eye_manager_mut().set_current_eye(Some(eye_on_map()));
    pipeline_plain.render(&mut recorder, &mut fixture.ctx()).unwrap();

    // Plain path: the sprite's model transform carries its world position;
    // with the world matrices bound, its center projects to
    // world_to_screen(sprite_pos) on this screen size.
    let commands = recorder.commands();
    let sprite_idx = draw_index(commands, fixture.scene.textures[&key]).unwrap();
    let model = commands[..sprite_idx]
        .iter()
        .rev()
        .find_map(|c| match c {
            RecordedCommand::SetModelTransform(m) => Some(*m),
            _ => None,
        })
        .unwrap();
    assert_eq!(model.transform_point2(Vec2::ZERO), sprite_pos);
    let screen_pos = pipeline_plain.eye_manager().world_to_screen(sprite_pos);

    let mut recorder = CommandRecorder::new(1280, 1216);
    let mut pipeline_post = pipeline(&mut recorder);
    let mut fixture = Fixture::new();
    let shader = recorder.load_shader("// outline").unwrap();
    fixture
        .scene
        .add_sprite_full(&mut recorder, 1, sprite_pos, true, false, Some(shader));
    pipeline_post.eye_manager_mut().set_current_eye(Some(eye_on_map()));
    pipeline_post.render(&mut recorder, &mut fixture.ctx()).unwrap();

    let commands = recorder.commands();
    let viewport_target = pipeline_post.viewport(pipeline_post.main_viewport()).render_target;
    let composite = commands
        .iter()
        .find_map(|c| match c {
            RecordedCommand::DrawTextureRect { texture, dst, .. }
                if *texture != viewport_target && dst.w == 1024.0 =>
            {
                Some(*dst)
            }
            _ => None,
        })
        .expect("no composite draw found");

    let center = vec2(composite.x + composite.w / 2.0, composite.y + composite.h / 2.0);
    // Within a pixel: the isolation path rounds the anchor to integers.
    assert!((center - screen_pos).length() <= 1.0, "{center} vs {screen_pos}");
}

// ---- screenshots -------------------------------------------------------

#[test]
fn test_screenshot_hooks_deliver_captures() {
    let mut recorder = CommandRecorder::new(1280, 720);
    let mut pipeline = pipeline(&mut recorder);
    let mut fixture = Fixture::new();
    pipeline.eye_manager_mut().set_current_eye(Some(eye_on_map()));

    let (before_tx, before_rx) = mpsc::channel();
    let (after_tx, after_rx) = mpsc::channel();
    pipeline.queue_screenshot(
        ScreenshotKind::BeforeUi,
        Box::new(move |shot| {
            let _ = before_tx.send(shot);
        }),
    );
    pipeline.queue_screenshot(
        ScreenshotKind::AfterUi,
        Box::new(move |shot| {
            let _ = after_tx.send(shot);
        }),
    );

    pipeline.render(&mut recorder, &mut fixture.ctx()).unwrap();

    let before = before_rx.try_recv().unwrap();
    let after = after_rx.try_recv().unwrap();
    assert_eq!(before.size, UVec2::new(1280, 720));
    assert_eq!(after.size, UVec2::new(1280, 720));

    let captures = recorder
        .commands()
        .iter()
        .filter(|c| matches!(c, RecordedCommand::CaptureTarget))
        .count();
    assert_eq!(captures, 2);

    // Requests are one-shot; the next frame captures nothing.
    recorder.clear_commands();
    pipeline.render(&mut recorder, &mut fixture.ctx()).unwrap();
    assert!(
        !recorder
            .commands()
            .iter()
            .any(|c| matches!(c, RecordedCommand::CaptureTarget))
    );
}

// ---- resize ------------------------------------------------------------

#[test]
fn test_resize_recreates_main_target() {
    let mut recorder = CommandRecorder::new(1280, 720);
    let mut pipeline = pipeline(&mut recorder);
    let old_target = pipeline.viewport(pipeline.main_viewport()).render_target;

    pipeline.on_resize(&mut recorder, UVec2::new(1920, 1080)).unwrap();

    let viewport = pipeline.viewport(pipeline.main_viewport());
    assert_ne!(viewport.render_target, old_target);
    assert_eq!(viewport.size, UVec2::new(1920, 1080));
    assert_eq!(recorder.texture_size(old_target), None);
    assert_eq!(
        pipeline.eye_manager().screen_size(),
        UVec2::new(1920, 1080)
    );
}
