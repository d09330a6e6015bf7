//! Host/device synchronization objects and per-window command recording
//!
//! RAII wrappers for semaphores and fences, plus the [`FrameSyncSet`] that
//! bundles one window's signaling objects with its command pool and buffer.
//! One set per window, one frame in flight per window: the in-flight fence
//! starts signaled so the first frame's wait passes immediately, and it is
//! always observed signaled before the command buffer is re-recorded.

use ash::{vk, Device};

use crate::device::DeviceContext;
use crate::error::{Error, Result};

/// Device-side ordering primitive with RAII cleanup
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new binary semaphore
    pub fn new(device: Device) -> Result<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let semaphore = unsafe {
            device
                .create_semaphore(&create_info, None)
                .map_err(|e| Error::ResourceCreation {
                    what: "semaphore",
                    source: e,
                })?
        };
        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Host-observable completion signal with RAII cleanup
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence, optionally already signaled
    pub fn new(device: Device, signaled: bool) -> Result<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        let fence = unsafe {
            device
                .create_fence(&create_info, None)
                .map_err(|e| Error::ResourceCreation {
                    what: "fence",
                    source: e,
                })?
        };
        Ok(Self { device, fence })
    }

    /// Wait for the fence with a bounded timeout. An expired wait surfaces
    /// as [`Error::Timeout`], never an indefinite block.
    pub fn wait(&self, timeout_ns: u64) -> Result<()> {
        unsafe {
            self.device
                .wait_for_fences(&[self.fence], true, timeout_ns)
                .map_err(|e| match e {
                    vk::Result::TIMEOUT => Error::Timeout,
                    other => Error::Api(other),
                })
        }
    }

    /// Reset the fence to unsignaled
    pub fn reset(&self) -> Result<()> {
        unsafe {
            self.device
                .reset_fences(&[self.fence])
                .map_err(Error::Api)
        }
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// One window's synchronization objects and command recording resources.
///
/// Destroyed with its window; the containing context idles the device first
/// so no object here can be in flight when it goes away.
pub struct FrameSyncSet {
    /// Signaled when the acquired swapchain image is ready to write
    pub(crate) acquire: Semaphore,
    /// Signaled when rendering finishes, gates presentation
    pub(crate) render_finished: Semaphore,
    /// Host-side gate: the previous frame's device work has completed
    pub(crate) in_flight: Fence,
    pub(crate) command_buffer: vk::CommandBuffer,
    command_pool: vk::CommandPool,
    device: Device,
}

impl FrameSyncSet {
    /// Create the full set for one window
    pub(crate) fn new(device_ctx: &DeviceContext) -> Result<Self> {
        let device = device_ctx.device().clone();
        let acquire = Semaphore::new(device.clone())?;
        let render_finished = Semaphore::new(device.clone())?;
        // Signaled so the first frame's wait returns immediately
        let in_flight = Fence::new(device.clone(), true)?;

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(device_ctx.graphics_family());
        let command_pool = unsafe {
            device
                .create_command_pool(&pool_info, None)
                .map_err(|e| Error::ResourceCreation {
                    what: "command pool",
                    source: e,
                })?
        };

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = match unsafe { device.allocate_command_buffers(&alloc_info) } {
            Ok(buffers) => buffers[0],
            Err(e) => {
                unsafe { device.destroy_command_pool(command_pool, None) };
                return Err(Error::ResourceCreation {
                    what: "command buffer",
                    source: e,
                });
            }
        };

        Ok(Self {
            acquire,
            render_finished,
            in_flight,
            command_buffer,
            command_pool,
            device,
        })
    }
}

impl Drop for FrameSyncSet {
    fn drop(&mut self) {
        unsafe {
            // Frees the command buffer along with the pool
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}
