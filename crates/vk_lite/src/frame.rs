//! Per-frame scheduling: acquire, record, submit, present
//!
//! The scheduler drives one window through a full frame, strictly
//! sequentially: wait on the in-flight fence (the only blocking point),
//! acquire the next swapchain image, re-record the command buffer, submit
//! to the shared graphics queue, and present. Frames for one window never
//! overlap — the fence wait at the top guarantees the previous frame's
//! device work is complete before any recording resource is touched.
//!
//! Failure scoping:
//! - a stale surface at acquire rebuilds the image ring and retries once
//! - a stale (or suboptimal) surface at present schedules a rebuild for the
//!   next frame
//! - any other failure aborts this frame only; the window stays open and
//!   the next iteration retries from the top
//!
//! The fence is reset immediately before submission rather than right after
//! the wait: a frame aborted between acquire and submit then leaves the
//! fence signaled, so the next attempt does not dead-wait on work that was
//! never submitted.

use ash::vk;
use slotmap::SlotMap;

use crate::device::DeviceContext;
use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use crate::window::Window;
use crate::PipelineId;

/// Drives the acquire → record → submit → present cycle for one window
pub struct FrameScheduler {
    clear_color: [f32; 4],
    fence_timeout_ns: u64,
}

impl FrameScheduler {
    pub(crate) fn new(clear_color: [f32; 4], fence_timeout_ns: u64) -> Self {
        Self {
            clear_color,
            fence_timeout_ns,
        }
    }

    /// Render one frame for one window
    pub(crate) fn render_frame(
        &self,
        device: &DeviceContext,
        window: &mut Window,
        pipelines: &SlotMap<PipelineId, Pipeline>,
    ) -> Result<()> {
        // Bound: the previous frame's device work must be complete
        window.sync.in_flight.wait(self.fence_timeout_ns)?;

        if window.needs_rebuild {
            let framebuffer = window.framebuffer_size();
            window.surface.rebuild(framebuffer)?;
            window.needs_rebuild = false;
        }

        let image_index = self.acquire(device, window)?;

        let pipeline = match window.pipeline {
            Some(id) => {
                let found = pipelines.get(id);
                if found.is_none() {
                    log::warn!(
                        "window '{}' references a destroyed pipeline; detach before destroying",
                        window.title()
                    );
                }
                found
            }
            None => None,
        };
        self.record(device, window, image_index, pipeline)?;

        // Reset only now that a submission is certain to follow
        window.sync.in_flight.reset()?;
        self.submit(device, window)?;
        self.present(device, window, image_index)
    }

    /// Acquire the next presentable image, rebuilding the surface and
    /// retrying once if the driver reports it stale.
    fn acquire(&self, device: &DeviceContext, window: &mut Window) -> Result<u32> {
        for attempt in 0..2 {
            let acquired = unsafe {
                device.swapchain_loader().acquire_next_image(
                    window.surface.swapchain(),
                    self.fence_timeout_ns,
                    window.sync.acquire.handle(),
                    vk::Fence::null(),
                )
            };
            match acquired {
                Ok((index, suboptimal)) => {
                    if suboptimal {
                        // Still presentable this frame; refresh afterwards
                        window.needs_rebuild = true;
                    }
                    return Ok(index);
                }
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) if attempt == 0 => {
                    log::debug!("surface stale at acquire, rebuilding image ring");
                    let framebuffer = window.framebuffer_size();
                    window.surface.rebuild(framebuffer)?;
                }
                Err(vk::Result::TIMEOUT) => return Err(Error::Timeout),
                Err(e) => return Err(Error::Api(e)),
            }
        }
        Err(Error::Api(vk::Result::ERROR_OUT_OF_DATE_KHR))
    }

    /// Reset and re-record the window's command buffer for this frame
    fn record(
        &self,
        device: &DeviceContext,
        window: &Window,
        image_index: u32,
        pipeline: Option<&Pipeline>,
    ) -> Result<()> {
        let dev = device.device();
        let cmd = window.sync.command_buffer;
        let image = window.surface.image(image_index);
        let extent = window.surface.extent();

        unsafe {
            dev.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .map_err(Error::Api)?;
            let begin_info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            dev.begin_command_buffer(cmd, &begin_info)
                .map_err(Error::Api)?;

            // Undefined → color attachment: previous contents are cleared
            let to_color = vk::ImageMemoryBarrier::builder()
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(color_subresource_range())
                .build();
            dev.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_color],
            );

            let clear_value = vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            };
            let color_attachments = [vk::RenderingAttachmentInfo::builder()
                .image_view(window.surface.view(image_index))
                .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(clear_value)
                .build()];
            let rendering_info = vk::RenderingInfo::builder()
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                })
                .layer_count(1)
                .color_attachments(&color_attachments);
            dev.cmd_begin_rendering(cmd, &rendering_info);

            if let Some(pipeline) = pipeline {
                let viewport = vk::Viewport {
                    x: 0.0,
                    y: 0.0,
                    width: extent.width as f32,
                    height: extent.height as f32,
                    min_depth: 0.0,
                    max_depth: 1.0,
                };
                dev.cmd_set_viewport(cmd, 0, &[viewport]);
                let scissor = vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                };
                dev.cmd_set_scissor(cmd, 0, &[scissor]);
                dev.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.handle());
                dev.cmd_draw(cmd, pipeline.vertex_count(), 1, 0, 0);
            }

            dev.cmd_end_rendering(cmd);

            // Color attachment → presentable
            let to_present = vk::ImageMemoryBarrier::builder()
                .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
                .dst_access_mask(vk::AccessFlags::empty())
                .old_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(color_subresource_range())
                .build();
            dev.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_present],
            );

            dev.end_command_buffer(cmd).map_err(Error::Api)?;
        }
        Ok(())
    }

    /// Submit the recorded buffer, waiting on acquire and signaling both
    /// the render-finished semaphore and the in-flight fence.
    fn submit(&self, device: &DeviceContext, window: &Window) -> Result<()> {
        let wait_semaphores = [window.sync.acquire.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [window.sync.command_buffer];
        let signal_semaphores = [window.sync.render_finished.handle()];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device
                .device()
                .queue_submit(
                    device.graphics_queue(),
                    &[submit_info.build()],
                    window.sync.in_flight.handle(),
                )
                .map_err(Error::Api)
        }
    }

    /// Present the rendered image, waiting on render-finished
    fn present(
        &self,
        device: &DeviceContext,
        window: &mut Window,
        image_index: u32,
    ) -> Result<()> {
        let wait_semaphores = [window.sync.render_finished.handle()];
        let swapchains = [window.surface.swapchain()];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let presented = unsafe {
            device
                .swapchain_loader()
                .queue_present(device.graphics_queue(), &present_info)
        };
        match presented {
            Ok(false) => Ok(()),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::debug!("surface stale at present, rebuild scheduled");
                window.needs_rebuild = true;
                Ok(())
            }
            Err(e) => Err(Error::Api(e)),
        }
    }
}

fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}
