//! Minimal multi-window Vulkan presentation layer.
//!
//! `vk_lite` drives several independent OS windows from one logical device:
//! each window carries its own surface, swapchain image ring, and frame
//! synchronization set, while drawing pipelines are compiled from GLSL at
//! runtime and shared between windows by id.
//!
//! The whole API funnels through [`Context`]:
//!
//! ```no_run
//! use vk_lite::{Context, ContextConfig};
//!
//! # fn main() -> vk_lite::Result<()> {
//! let mut ctx = Context::new(ContextConfig::default())?;
//! let _window = ctx.create_window(800, 600, "demo")?;
//! ctx.run_main_loop();
//! ctx.shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! Rendering targets swapchain images directly through Vulkan 1.3 dynamic
//! rendering; there are no render passes or framebuffer objects. Adapters
//! without `dynamicRendering` support are rejected at startup.

mod config;
mod context;
mod device;
mod error;
mod frame;
mod pipeline;
mod surface;
mod sync;
mod window;

pub use ash;

pub use config::{ContextConfig, DEFAULT_FENCE_TIMEOUT_NS};
pub use context::Context;
pub use error::{Error, Result};
pub use pipeline::{ShaderCompiler, ShaderStage};
pub use surface::PresentationSurface;
pub use window::Window;

slotmap::new_key_type! {
    /// Stable handle to a window owned by a [`Context`]
    pub struct WindowId;

    /// Stable handle to a pipeline owned by a [`Context`]
    pub struct PipelineId;
}
