pub mod color;
pub mod command_recorder;
pub mod overlay;
pub mod pipeline;
pub mod shader;
pub mod sprite_batch;
pub mod sprites;
pub mod state;
pub mod texture;
pub mod viewport;
pub mod wgpu_renderer;

pub use overlay::{Overlay, OverlayRegistry, OverlaySpace};
pub use pipeline::{DebugLayers, RenderPipeline, ScreenshotKind};
pub use state::RenderState;
pub use viewport::{Viewport, ViewportId};
