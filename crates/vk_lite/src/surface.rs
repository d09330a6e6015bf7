//! Per-window presentation surface and image ring
//!
//! Builds and tears down the on-screen swapchain for one window: surface
//! binding, format and present-mode selection, extent derivation, and one
//! image view per presentable image. The ring is rebuilt in place whenever
//! the surface reports a stale state (`ERROR_OUT_OF_DATE_KHR`); retrying an
//! acquire or present against the old ring is never correct.
//!
//! Selection policy:
//! - format: prefer `B8G8R8A8_SRGB` with the sRGB-nonlinear color space,
//!   else the first reported format
//! - present mode: prefer `MAILBOX` (low latency, no tearing), else the
//!   always-available `FIFO`
//! - extent: the capability's fixed `current_extent` when reported,
//!   otherwise the framebuffer pixel size clamped into the supported range
//! - image count: `min + 1`, clamped to `max` when the surface bounds it

use ash::extensions::khr::{Surface as SurfaceLoader, Swapchain as SwapchainLoader};
use ash::{vk, Device};

use crate::device::DeviceContext;
use crate::error::{Error, Result};

/// Choose the swapchain surface format: 8-bit sRGB when offered, else the
/// first reported format.
pub(crate) fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .find(|sf| {
            sf.format == vk::Format::B8G8R8A8_SRGB
                && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .copied()
        .unwrap_or(formats[0])
}

/// Choose the present mode: mailbox when offered, else FIFO which every
/// conformant surface supports.
pub(crate) fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Derive the swapchain extent from the surface capability and the window's
/// framebuffer pixel size.
pub(crate) fn choose_extent(
    caps: &vk::SurfaceCapabilitiesKHR,
    framebuffer: (u32, u32),
) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: framebuffer
                .0
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: framebuffer
                .1
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// Choose the image count: `min + 1`, clamped when the surface reports an
/// upper bound (`max == 0` means unbounded).
pub(crate) fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        desired.min(caps.max_image_count)
    } else {
        desired
    }
}

/// One window's surface, swapchain, and image views, with RAII teardown.
///
/// The caller must ensure the device is idle before dropping this (enforced
/// by [`Context::destroy_window`](crate::Context::destroy_window)).
pub struct PresentationSurface {
    device: Device,
    surface_loader: SurfaceLoader,
    swapchain_loader: SwapchainLoader,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
}

impl PresentationSurface {
    /// Bind a surface to the given window and build its image ring.
    pub(crate) fn new(
        device_ctx: &DeviceContext,
        window: &mut glfw::PWindow,
    ) -> Result<Self> {
        let mut surface = vk::SurfaceKHR::null();
        let result =
            window.create_window_surface(device_ctx.instance_handle(), std::ptr::null(), &mut surface);
        if result != vk::Result::SUCCESS {
            return Err(Error::ResourceCreation {
                what: "window surface",
                source: result,
            });
        }

        let framebuffer = framebuffer_extent(window);
        let mut built = Self {
            device: device_ctx.device().clone(),
            surface_loader: device_ctx.surface_loader().clone(),
            swapchain_loader: device_ctx.swapchain_loader().clone(),
            physical_device: device_ctx.physical_device(),
            surface,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            views: Vec::new(),
            format: vk::SurfaceFormatKHR::default(),
            present_mode: vk::PresentModeKHR::FIFO,
            extent: vk::Extent2D::default(),
        };
        // On failure the half-built value drops here, releasing the surface.
        built.build_ring(framebuffer, vk::SwapchainKHR::null())?;
        Ok(built)
    }

    /// Destroy and recreate the image ring after the surface went stale.
    ///
    /// The old swapchain is handed to the driver as `old_swapchain` so
    /// in-flight images are retired cleanly, then destroyed.
    pub(crate) fn rebuild(&mut self, framebuffer: (u32, u32)) -> Result<()> {
        unsafe { self.device.device_wait_idle().map_err(Error::Api)? };
        log::debug!(
            "rebuilding swapchain ({}x{} framebuffer)",
            framebuffer.0,
            framebuffer.1
        );

        let old_swapchain = self.swapchain;
        self.destroy_views();
        self.build_ring(framebuffer, old_swapchain)?;
        unsafe { self.swapchain_loader.destroy_swapchain(old_swapchain, None) };
        Ok(())
    }

    fn build_ring(&mut self, framebuffer: (u32, u32), old_swapchain: vk::SwapchainKHR) -> Result<()> {
        let caps = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, self.surface)
                .map_err(Error::Api)?
        };
        let formats = unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(self.physical_device, self.surface)
                .map_err(Error::Api)?
        };
        let present_modes = unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(self.physical_device, self.surface)
                .map_err(Error::Api)?
        };

        let format = choose_surface_format(&formats);
        let present_mode = choose_present_mode(&present_modes);
        let extent = choose_extent(&caps, framebuffer);
        let image_count = choose_image_count(&caps);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe {
            self.swapchain_loader
                .create_swapchain(&create_info, None)
                .map_err(|e| Error::ResourceCreation {
                    what: "swapchain",
                    source: e,
                })?
        };

        let images = unsafe {
            match self.swapchain_loader.get_swapchain_images(swapchain) {
                Ok(images) => images,
                Err(e) => {
                    self.swapchain_loader.destroy_swapchain(swapchain, None);
                    return Err(Error::Api(e));
                }
            }
        };

        let mut views = Vec::with_capacity(images.len());
        for &image in &images {
            let view_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            match unsafe { self.device.create_image_view(&view_info, None) } {
                Ok(view) => views.push(view),
                Err(e) => {
                    unsafe {
                        for view in views {
                            self.device.destroy_image_view(view, None);
                        }
                        self.swapchain_loader.destroy_swapchain(swapchain, None);
                    }
                    return Err(Error::ResourceCreation {
                        what: "image view",
                        source: e,
                    });
                }
            }
        }

        log::debug!(
            "image ring built: {} images, {:?}, {:?}, {}x{}",
            images.len(),
            format.format,
            present_mode,
            extent.width,
            extent.height
        );

        self.swapchain = swapchain;
        self.images = images;
        self.views = views;
        self.format = format;
        self.present_mode = present_mode;
        self.extent = extent;
        Ok(())
    }

    fn destroy_views(&mut self) {
        unsafe {
            for view in self.views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
        }
    }

    /// The swapchain handle
    pub(crate) fn swapchain(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Presentable image at `index`
    pub(crate) fn image(&self, index: u32) -> vk::Image {
        self.images[index as usize]
    }

    /// View over the presentable image at `index`
    pub(crate) fn view(&self, index: u32) -> vk::ImageView {
        self.views[index as usize]
    }

    /// The chosen surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Current swapchain extent in pixels
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for PresentationSurface {
    fn drop(&mut self) {
        self.destroy_views();
        unsafe {
            if self.swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            }
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

/// Framebuffer size in pixels, clamped to zero on nonsense values
pub(crate) fn framebuffer_extent(window: &glfw::PWindow) -> (u32, u32) {
    let (width, height) = window.get_framebuffer_size();
    (width.max(0) as u32, height.max(0) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    #[test]
    fn test_srgb_format_preferred() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::B8G8R8A8_SRGB
        );
    }

    #[test]
    fn test_first_format_when_srgb_missing() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::R8G8B8A8_UNORM
        );
    }

    #[test]
    fn test_mailbox_preferred_over_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn test_fifo_fallback() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_fixed_current_extent_wins() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            ..Default::default()
        };
        let extent = choose_extent(&caps, (1920, 1080));
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_extent_clamped_to_capability_range() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 64,
                height: 64,
            },
            max_image_extent: vk::Extent2D {
                width: 1024,
                height: 1024,
            },
            ..Default::default()
        };
        let extent = choose_extent(&caps, (4096, 16));
        assert_eq!((extent.width, extent.height), (1024, 64));
    }

    #[test]
    fn test_image_count_min_plus_one() {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn test_image_count_clamped_to_max() {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 3,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn test_image_count_unbounded_when_max_is_zero() {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 4,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&caps), 5);
    }
}
