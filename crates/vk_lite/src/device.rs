//! Device context: instance, adapter, logical device, and queue
//!
//! The [`DeviceContext`] is created once at startup and destroyed last. It
//! owns the Vulkan instance (plus the optional debug messenger), the selected
//! physical device, the logical device with its single graphics-capable
//! queue, and the surface/swapchain extension loaders. Every other component
//! receives an immutable `&DeviceContext` at construction time instead of
//! reading ambient global state.

use std::ffi::{CStr, CString};

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device, Entry, Instance};

use crate::config::ContextConfig;
use crate::error::{Error, Result};

/// Minimum Vulkan API version the loader must report
const MIN_API_VERSION: u32 = vk::API_VERSION_1_3;

/// Instance-level state with RAII cleanup (messenger before instance)
struct InstanceContext {
    entry: Entry,
    instance: Instance,
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl InstanceContext {
    fn new(glfw: &glfw::Glfw, config: &ContextConfig) -> Result<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| Error::Initialization(format!("failed to load Vulkan: {e}")))?;

        // The loader must support at least Vulkan 1.3: dynamic rendering is
        // core there, which is what lets pipelines declare their color format
        // without a framebuffer object.
        let api_version = match entry.try_enumerate_instance_version() {
            Ok(Some(version)) => version,
            Ok(None) => vk::API_VERSION_1_0,
            Err(e) => return Err(Error::Api(e)),
        };
        log::debug!(
            "Vulkan loader supports API version {}.{}.{}",
            vk::api_version_major(api_version),
            vk::api_version_minor(api_version),
            vk::api_version_patch(api_version)
        );
        if api_version < MIN_API_VERSION {
            return Err(Error::Initialization(format!(
                "Vulkan 1.3 or higher is required, loader reports {}.{}",
                vk::api_version_major(api_version),
                vk::api_version_minor(api_version)
            )));
        }

        let app_name = CString::new(config.app_name.as_str())
            .map_err(|e| Error::Initialization(format!("invalid application name: {e}")))?;
        let engine_name = CString::new("vk_lite").map_err(|e| Error::Initialization(e.to_string()))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(MIN_API_VERSION);

        // Surface extensions come from the windowing library
        let required_extensions = glfw.get_required_instance_extensions().ok_or_else(|| {
            Error::Initialization("GLFW reports no Vulkan surface support".to_string())
        })?;
        let cstr_extensions: Vec<CString> = required_extensions
            .iter()
            .map(|ext| CString::new(ext.as_str()))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Initialization(e.to_string()))?;
        let mut extensions: Vec<*const i8> = cstr_extensions.iter().map(|ext| ext.as_ptr()).collect();
        if config.validation {
            extensions.push(DebugUtils::name().as_ptr());
        }
        #[cfg(target_os = "macos")]
        extensions.push(vk::KhrPortabilityEnumerationFn::name().as_ptr());

        let layer_names = if config.validation {
            vec![CString::new("VK_LAYER_KHRONOS_validation")
                .map_err(|e| Error::Initialization(e.to_string()))?]
        } else {
            vec![]
        };
        let layer_ptrs: Vec<*const i8> = layer_names.iter().map(|name| name.as_ptr()).collect();

        #[cfg(target_os = "macos")]
        let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
        #[cfg(not(target_os = "macos"))]
        let create_flags = vk::InstanceCreateFlags::empty();

        let create_info = vk::InstanceCreateInfo::builder()
            .flags(create_flags)
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_ptrs);

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(Error::Api)?
        };

        let debug = if config.validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            match Self::create_debug_messenger(&debug_utils) {
                Ok(messenger) => Some((debug_utils, messenger)),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(Self {
            entry,
            instance,
            debug,
        })
    }

    fn create_debug_messenger(debug_utils: &DebugUtils) -> Result<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(Error::Api)
        }
    }
}

impl Drop for InstanceContext {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = &self.debug {
                debug_utils.destroy_debug_utils_messenger(*messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Validation messages are forwarded into the `log` facade rather than
/// routed through a callback that captures a containing object.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();
    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }
    vk::FALSE
}

/// Selected physical device and the queue family used for graphics work
struct AdapterInfo {
    handle: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    graphics_family: u32,
}

impl AdapterInfo {
    /// Pick the first adapter exposing a graphics-capable queue family, the
    /// swapchain extension, and dynamic rendering.
    fn select(instance: &Instance) -> Result<Self> {
        let devices = unsafe {
            instance
                .enumerate_physical_devices()
                .map_err(Error::Api)?
        };

        for device in devices {
            if let Some(info) = Self::evaluate(instance, device)? {
                log::info!("selected GPU: {}", unsafe {
                    CStr::from_ptr(info.properties.device_name.as_ptr()).to_string_lossy()
                });
                return Ok(info);
            }
        }

        Err(Error::Initialization("no suitable GPU found".to_string()))
    }

    fn evaluate(instance: &Instance, device: vk::PhysicalDevice) -> Result<Option<Self>> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(device) };

        let graphics_family = queue_families
            .iter()
            .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS));
        let Some(graphics_family) = graphics_family else {
            return Ok(None);
        };

        let extensions = unsafe {
            instance
                .enumerate_device_extension_properties(device)
                .map_err(Error::Api)?
        };
        let has_swapchain = extensions.iter().any(|available| {
            let name = unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
            name == SwapchainLoader::name()
        });
        if !has_swapchain {
            return Ok(None);
        }

        // Dynamic rendering is core in 1.3, but the feature must still be
        // advertised and enabled.
        let mut dynamic_rendering = vk::PhysicalDeviceDynamicRenderingFeatures::default();
        let mut features2 = vk::PhysicalDeviceFeatures2::builder().push_next(&mut dynamic_rendering);
        unsafe { instance.get_physical_device_features2(device, &mut features2) };
        if dynamic_rendering.dynamic_rendering != vk::TRUE {
            return Ok(None);
        }

        Ok(Some(Self {
            handle: device,
            properties,
            graphics_family: graphics_family as u32,
        }))
    }
}

/// Owns the Vulkan instance, adapter, logical device, and graphics queue.
///
/// Created once by [`Context::new`](crate::Context::new) and destroyed after
/// every window and pipeline is gone. Destruction idles the device first.
pub struct DeviceContext {
    device: Device,
    graphics_queue: vk::Queue,
    graphics_family: u32,
    physical_device: vk::PhysicalDevice,
    surface_loader: Surface,
    swapchain_loader: SwapchainLoader,
    instance_ctx: InstanceContext,
}

impl DeviceContext {
    /// Build the full device context. On failure nothing is left allocated.
    pub(crate) fn new(glfw: &glfw::Glfw, config: &ContextConfig) -> Result<Self> {
        let instance_ctx = InstanceContext::new(glfw, config)?;
        let adapter = AdapterInfo::select(&instance_ctx.instance)?;

        let queue_priorities = [1.0f32];
        let queue_infos = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(adapter.graphics_family)
            .queue_priorities(&queue_priorities)
            .build()];
        let extension_names = [SwapchainLoader::name().as_ptr()];
        let mut dynamic_rendering =
            vk::PhysicalDeviceDynamicRenderingFeatures::builder().dynamic_rendering(true);
        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_names)
            .push_next(&mut dynamic_rendering);

        let device = unsafe {
            instance_ctx
                .instance
                .create_device(adapter.handle, &create_info, None)
                .map_err(Error::Api)?
        };
        let graphics_queue = unsafe { device.get_device_queue(adapter.graphics_family, 0) };

        let surface_loader = Surface::new(&instance_ctx.entry, &instance_ctx.instance);
        let swapchain_loader = SwapchainLoader::new(&instance_ctx.instance, &device);

        log::debug!(
            "logical device created (graphics family {})",
            adapter.graphics_family
        );

        Ok(Self {
            device,
            graphics_queue,
            graphics_family: adapter.graphics_family,
            physical_device: adapter.handle,
            surface_loader,
            swapchain_loader,
            instance_ctx,
        })
    }

    /// The logical device
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// The raw instance handle (needed for surface creation)
    pub fn instance_handle(&self) -> vk::Instance {
        self.instance_ctx.instance.handle()
    }

    /// The selected physical device
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Index of the graphics-capable queue family
    pub fn graphics_family(&self) -> u32 {
        self.graphics_family
    }

    /// The single graphics queue all windows submit to
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Surface extension loader
    pub fn surface_loader(&self) -> &Surface {
        &self.surface_loader
    }

    /// Swapchain extension loader
    pub fn swapchain_loader(&self) -> &SwapchainLoader {
        &self.swapchain_loader
    }

    /// Block until the device has finished all submitted work. This is the
    /// teardown barrier that must precede destruction of any per-window or
    /// per-pipeline GPU object.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle().map_err(Error::Api) }
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
        // instance_ctx drops afterward, destroying the messenger and instance
    }
}
