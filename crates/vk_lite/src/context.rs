//! Top-level context: device ownership, window/pipeline arenas, main loop
//!
//! The [`Context`] exclusively owns every window and pipeline through
//! slotmap arenas keyed by opaque ids. Stale ids are harmless: destroy
//! operations on them are no-ops, and a window whose attached pipeline has
//! been destroyed simply stops drawing. Shutdown consumes the context, so
//! use-after-shutdown cannot be expressed.

use ash::vk;
use slotmap::SlotMap;

use crate::config::ContextConfig;
use crate::device::DeviceContext;
use crate::error::{Error, Result};
use crate::frame::FrameScheduler;
use crate::pipeline::{Pipeline, ShaderCompiler, ShaderStage};
use crate::surface::PresentationSurface;
use crate::sync::FrameSyncSet;
use crate::window::Window;
use crate::{PipelineId, WindowId};

/// Owns the device context and the window collection, and drives the
/// cooperative single-threaded main loop.
pub struct Context {
    // Arenas drop before the device context (explicitly cleared in Drop)
    windows: SlotMap<WindowId, Window>,
    pipelines: SlotMap<PipelineId, Pipeline>,
    scheduler: FrameScheduler,
    compiler: ShaderCompiler,
    device: DeviceContext,
    glfw: glfw::Glfw,
}

impl Context {
    /// Initialize the windowing library and build the device context.
    /// On failure nothing is left allocated.
    pub fn new(config: ContextConfig) -> Result<Self> {
        log::info!("initializing context for '{}'", config.app_name);

        let mut glfw = glfw::init(glfw::fail_on_errors)
            .map_err(|e| Error::Initialization(format!("GLFW init failed: {e}")))?;
        // Rendering goes through Vulkan; no client-API context wanted
        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(true));

        let device = DeviceContext::new(&glfw, &config)?;
        let scheduler = FrameScheduler::new(config.clear_color, config.fence_timeout_ns);
        let compiler = ShaderCompiler::new(config.shader_compiler.clone());

        Ok(Self {
            windows: SlotMap::with_key(),
            pipelines: SlotMap::with_key(),
            scheduler,
            compiler,
            device,
            glfw,
        })
    }

    /// Create a window with its full presentation stack.
    ///
    /// All-or-nothing: if any step fails, everything built so far —
    /// including the native handle — is torn back down and the window
    /// collection is left untouched.
    pub fn create_window(&mut self, width: u32, height: u32, title: &str) -> Result<WindowId> {
        let (mut handle, events) = self
            .glfw
            .create_window(width, height, title, glfw::WindowMode::Windowed)
            .ok_or_else(|| Error::Window(format!("failed to create window '{title}'")))?;
        handle.set_close_polling(true);
        handle.set_framebuffer_size_polling(true);

        // Each `?` below drops the partial products: sync set, surface,
        // and finally the native handle itself.
        let surface = PresentationSurface::new(&self.device, &mut handle)?;
        let sync = FrameSyncSet::new(&self.device)?;

        let id = self
            .windows
            .insert(Window::new(handle, events, title.to_string(), surface, sync));
        log::info!("created window '{title}' ({width}x{height})");
        Ok(id)
    }

    /// Destroy a window and its presentation resources. The device is idled
    /// first so nothing in flight is torn down. A stale or already-removed
    /// id is a no-op.
    pub fn destroy_window(&mut self, id: WindowId) {
        if let Some(window) = self.windows.remove(id) {
            if let Err(e) = self.device.wait_idle() {
                log::warn!("device idle wait failed during window teardown: {e}");
            }
            log::info!("destroyed window '{}'", window.title());
            drop(window);
        }
    }

    /// Number of currently open windows
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    /// Access a window by id
    pub fn window(&self, id: WindowId) -> Option<&Window> {
        self.windows.get(id)
    }

    /// Mutable access to a window by id
    pub fn window_mut(&mut self, id: WindowId) -> Option<&mut Window> {
        self.windows.get_mut(id)
    }

    /// The swapchain color format of a window, the natural target format
    /// for a pipeline that will draw into it
    pub fn window_format(&self, id: WindowId) -> Option<vk::Format> {
        self.windows.get(id).map(|w| w.surface().format().format)
    }

    /// Compile GLSL source for both stages and build a drawing pipeline.
    ///
    /// Compiler diagnostics surface in the returned error; no device object
    /// is created unless both stages compile and validate.
    pub fn create_pipeline(
        &mut self,
        vert_glsl: &str,
        frag_glsl: &str,
        vertex_count: u32,
        color_format: vk::Format,
    ) -> Result<PipelineId> {
        let vert = self.compiler.compile(ShaderStage::Vertex, vert_glsl)?;
        let frag = self.compiler.compile(ShaderStage::Fragment, frag_glsl)?;
        let pipeline = Pipeline::new(&self.device, &vert, &frag, vertex_count, color_format)?;
        Ok(self.pipelines.insert(pipeline))
    }

    /// Destroy a pipeline. The device is idled first. Windows should be
    /// detached beforehand; any that still reference the id keep rendering
    /// without a draw. A stale id is a no-op.
    pub fn destroy_pipeline(&mut self, id: PipelineId) {
        if self.pipelines.contains_key(id) {
            let attached = self
                .windows
                .values()
                .filter(|w| w.pipeline == Some(id))
                .count();
            if attached > 0 {
                log::warn!("destroying a pipeline still attached to {attached} window(s)");
            }
            if let Err(e) = self.device.wait_idle() {
                log::warn!("device idle wait failed during pipeline teardown: {e}");
            }
            self.pipelines.remove(id);
        }
    }

    /// Attach a pipeline to a window so every frame draws it. Returns false
    /// if either id is stale.
    pub fn attach_pipeline(&mut self, window: WindowId, pipeline: PipelineId) -> bool {
        if !self.pipelines.contains_key(pipeline) {
            return false;
        }
        match self.windows.get_mut(window) {
            Some(w) => {
                w.pipeline = Some(pipeline);
                true
            }
            None => false,
        }
    }

    /// Detach the window's pipeline, returning the previously attached id
    pub fn detach_pipeline(&mut self, window: WindowId) -> Option<PipelineId> {
        self.windows.get_mut(window).and_then(|w| w.pipeline.take())
    }

    /// Run the cooperative main loop until every window has closed.
    ///
    /// Each iteration polls platform events, renders one frame per open
    /// window, then destroys the windows whose close flag is set. Frame
    /// errors are logged and the window retried next iteration.
    pub fn run_main_loop(&mut self) {
        while !self.windows.is_empty() {
            self.glfw.poll_events();

            let open: Vec<WindowId> = self.windows.keys().collect();
            for id in open {
                let Some(window) = self.windows.get_mut(id) else {
                    continue;
                };
                if window.should_close() {
                    continue;
                }
                if let Err(e) = self
                    .scheduler
                    .render_frame(&self.device, window, &self.pipelines)
                {
                    log::warn!("frame skipped for '{}': {e}", window.title());
                }
            }

            let closed: Vec<WindowId> = self
                .windows
                .iter()
                .filter(|(_, window)| window.should_close())
                .map(|(id, _)| id)
                .collect();
            for id in closed {
                self.destroy_window(id);
            }
        }
        log::info!("all windows closed, main loop finished");
    }

    /// Tear everything down: remaining windows, pipelines, then the device
    /// context. Consuming `self` makes use-after-shutdown unrepresentable.
    pub fn shutdown(self) {
        // Drop does the work
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::warn!("device idle wait failed during shutdown: {e}");
        }
        self.windows.clear();
        self.pipelines.clear();
        log::info!("context shut down");
        // DeviceContext and the GLFW instance drop afterward, in that order
    }
}
