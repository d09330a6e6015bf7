//! Window aggregate: native handle, surface, sync set, pipeline attachment
//!
//! A [`Window`] is only ever constructed whole by
//! [`Context::create_window`](crate::Context::create_window): native handle,
//! presentation surface, image ring, and sync set all valid, or the window
//! does not exist. Field order matters for teardown — the sync set and
//! surface release their device objects before the native handle drops.

use crate::sync::FrameSyncSet;
use crate::surface::{framebuffer_extent, PresentationSurface};
use crate::PipelineId;

/// One open window with its presentation resources
pub struct Window {
    // Drop order: sync objects, then swapchain/surface, then native handle
    pub(crate) sync: FrameSyncSet,
    pub(crate) surface: PresentationSurface,
    pub(crate) handle: glfw::PWindow,
    // Events are drained by polling; the receiver just has to stay alive
    _events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
    title: String,
    /// Weak back-reference into the context's pipeline arena
    pub(crate) pipeline: Option<PipelineId>,
    /// Set when acquire/present reported the surface stale; honored at the
    /// top of the next frame
    pub(crate) needs_rebuild: bool,
}

impl Window {
    pub(crate) fn new(
        handle: glfw::PWindow,
        events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
        title: String,
        surface: PresentationSurface,
        sync: FrameSyncSet,
    ) -> Self {
        Self {
            sync,
            surface,
            handle,
            _events: events,
            title,
            pipeline: None,
            needs_rebuild: false,
        }
    }

    /// Whether the user or the application requested this window to close
    pub fn should_close(&self) -> bool {
        self.handle.should_close()
    }

    /// Set or clear the close-requested flag
    pub fn set_should_close(&mut self, should_close: bool) {
        self.handle.set_should_close(should_close);
    }

    /// Window title
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Current framebuffer size in pixels
    pub fn framebuffer_size(&self) -> (u32, u32) {
        framebuffer_extent(&self.handle)
    }

    /// The surface backing this window
    pub fn surface(&self) -> &PresentationSurface {
        &self.surface
    }

    /// The attached pipeline, if any
    pub fn attached_pipeline(&self) -> Option<PipelineId> {
        self.pipeline
    }
}
