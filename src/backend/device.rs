// Vulkan Device Context - GPU connection and queues
//
// Responsibilities:
// - Instance creation with the window system's surface extensions
// - Validation layers + debug messenger when enabled
// - Physical device selection against a presentable surface
// - Logical device + graphics/present queue creation (at most once)
// - Submit / present / wait-idle primitives

use anyhow::{Context, Result};
use ash::extensions::{ext::DebugUtils, khr};
use ash::prelude::VkResult;
use ash::{vk, Entry};
use std::ffi::{c_char, CStr, CString};

use super::swapchain::SwapchainSupport;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Device-level extensions every candidate GPU must support
fn required_device_extensions() -> Vec<&'static CStr> {
    vec![khr::Swapchain::name()]
}

/// Startup settings for the device context
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Application name reported to the driver
    pub app_name: String,
    /// Enable the Khronos validation layer and route its messages to `log`
    pub enable_validation: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            app_name: "swapframe".to_string(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

/// Graphics and present queue families of one GPU, resolved against a surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Picks the lowest graphics-capable and the lowest present-capable family.
    ///
    /// `supports_present` is only asked about families visited before both
    /// roles are filled; one family may fill both.
    pub fn resolve<F>(families: &[vk::QueueFamilyProperties], mut supports_present: F) -> Self
    where
        F: FnMut(u32) -> bool,
    {
        let mut indices = Self::default();

        for (index, family) in families.iter().enumerate() {
            let index = index as u32;

            if indices.graphics_family.is_none()
                && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            {
                indices.graphics_family = Some(index);
            }
            if indices.present_family.is_none() && supports_present(index) {
                indices.present_family = Some(index);
            }
            if indices.is_complete() {
                break;
            }
        }

        indices
    }

    /// Distinct families, ascending. One queue is created per entry.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families: Vec<u32> = [self.graphics_family, self.present_family]
            .into_iter()
            .flatten()
            .collect();
        families.sort_unstable();
        families.dedup();
        families
    }
}

/// Required extensions that `available` does not list
pub fn missing_extensions<'a>(
    required: &[&'a CStr],
    available: &[vk::ExtensionProperties],
) -> Vec<&'a CStr> {
    let available: Vec<&CStr> = available
        .iter()
        .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) })
        .collect();

    required
        .iter()
        .copied()
        .filter(|name| !available.contains(name))
        .collect()
}

pub fn is_device_suitable(
    indices: &QueueFamilyIndices,
    extensions_supported: bool,
    swapchain_adequate: bool,
) -> bool {
    indices.is_complete() && extensions_supported && swapchain_adequate
}

/// Everything that exists only after `create_device`
pub struct LogicalDevice {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub graphics_family: u32,
    pub present_family: u32,
    pub graphics_queue: vk::Queue,
    /// May be the same queue as `graphics_queue`
    pub present_queue: vk::Queue,
    pub swapchain_loader: khr::Swapchain,
}

/// The process's GPU connection
pub struct DeviceContext {
    // Vulkan handles (order matters for drop!)
    logical: Option<LogicalDevice>,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    surface_loader: khr::Surface,
    instance: ash::Instance,
    entry: Entry,
}

impl DeviceContext {
    /// Load Vulkan and create the instance.
    ///
    /// `required_extensions` comes from the window system (surface
    /// extensions). The logical device is created later by `create_device`,
    /// once a surface exists to test presentation support against.
    pub fn new(config: &DeviceConfig, required_extensions: &[*const c_char]) -> Result<Self> {
        log::info!("Creating Vulkan instance: {}", config.app_name);

        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        let enable_validation = config.enable_validation && Self::validation_available(&entry);
        let instance =
            Self::create_instance(&entry, &config.app_name, required_extensions, enable_validation)?;

        let debug_utils = if enable_validation {
            Some(Self::setup_debug_messenger(&entry, &instance)?)
        } else {
            None
        };

        let surface_loader = khr::Surface::new(&entry, &instance);

        Ok(Self {
            logical: None,
            debug_utils,
            surface_loader,
            instance,
            entry,
        })
    }

    fn validation_available(entry: &Entry) -> bool {
        let layers = match entry.enumerate_instance_layer_properties() {
            Ok(layers) => layers,
            Err(e) => {
                log::warn!("Could not enumerate instance layers: {}", e);
                return false;
            }
        };

        let found = layers
            .iter()
            .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER);

        if !found {
            log::warn!("Validation requested but {:?} is not installed", VALIDATION_LAYER);
        }
        found
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        required_extensions: &[*const c_char],
        enable_validation: bool,
    ) -> Result<ash::Instance> {
        let app_name_cstr = CString::new(app_name)?;
        let engine_name = CString::new("swapframe")?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let mut extensions = required_extensions.to_vec();
        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let layer_names = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;

        Ok(instance)
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(MESSENGER_SEVERITIES)
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .context("Failed to set up debug messenger")?;

        Ok((debug_utils, messenger))
    }

    /// Select a GPU and create the logical device. No-op if one exists.
    pub fn create_device(&mut self, surface: vk::SurfaceKHR) -> Result<()> {
        if self.logical.is_some() {
            return Ok(());
        }

        let (physical_device, queue_families) = self.pick_physical_device(surface)?;
        let graphics_family = queue_families
            .graphics_family
            .context("Selected GPU has no graphics queue family")?;
        let present_family = queue_families
            .present_family
            .context("Selected GPU has no present queue family")?;

        let device = self.create_logical_device(physical_device, &queue_families)?;

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };

        let properties = unsafe { self.instance.get_physical_device_properties(physical_device) };

        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );
        log::debug!(
            "Queue families: graphics={} present={}",
            graphics_family,
            present_family
        );

        let swapchain_loader = khr::Swapchain::new(&self.instance, &device);

        self.logical = Some(LogicalDevice {
            device,
            physical_device,
            graphics_family,
            present_family,
            graphics_queue,
            present_queue,
            swapchain_loader,
        });

        Ok(())
    }

    fn pick_physical_device(
        &self,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, QueueFamilyIndices)> {
        let devices = unsafe { self.instance.enumerate_physical_devices() }
            .context("Failed to enumerate physical devices")?;

        if devices.is_empty() {
            anyhow::bail!("No Vulkan-capable GPU found");
        }

        let required = required_device_extensions();

        // First suitable device wins
        for physical_device in devices {
            let indices = self.find_queue_families(physical_device, surface);

            let available =
                unsafe { self.instance.enumerate_device_extension_properties(physical_device) }
                    .context("Failed to enumerate device extensions")?;
            let missing = missing_extensions(&required, &available);

            // Only query the surface once the swapchain extension is known to exist
            let swapchain_adequate = missing.is_empty()
                && SwapchainSupport::query(&self.surface_loader, physical_device, surface)
                    .map(|support| support.is_adequate())
                    .unwrap_or(false);

            if is_device_suitable(&indices, missing.is_empty(), swapchain_adequate) {
                return Ok((physical_device, indices));
            }

            let props = unsafe { self.instance.get_physical_device_properties(physical_device) };
            log::debug!(
                "Skipping GPU {}: queues {:?}, missing extensions {:?}, swapchain adequate: {}",
                unsafe { CStr::from_ptr(props.device_name.as_ptr()) }.to_string_lossy(),
                indices,
                missing,
                swapchain_adequate
            );
        }

        anyhow::bail!("No suitable GPU found (need graphics + present queues and VK_KHR_swapchain)")
    }

    fn create_logical_device(
        &self,
        physical_device: vk::PhysicalDevice,
        indices: &QueueFamilyIndices,
    ) -> Result<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = indices
            .unique_families()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let extensions: Vec<*const c_char> = required_device_extensions()
            .iter()
            .map(|name| name.as_ptr())
            .collect();

        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        unsafe { self.instance.create_device(physical_device, &create_info, None) }
            .context("Failed to create logical device")
    }

    /// Queue families of `physical_device` as seen by `surface`
    pub fn find_queue_families(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> QueueFamilyIndices {
        let families = unsafe {
            self.instance
                .get_physical_device_queue_family_properties(physical_device)
        };

        QueueFamilyIndices::resolve(&families, |index| {
            unsafe {
                self.surface_loader
                    .get_physical_device_surface_support(physical_device, index, surface)
            }
            .unwrap_or(false)
        })
    }

    pub fn logical(&self) -> Result<&LogicalDevice> {
        self.logical
            .as_ref()
            .context("Logical device has not been created yet")
    }

    /// Shorthand for the `ash::Device` of the logical device
    pub fn device(&self) -> Result<&ash::Device> {
        Ok(&self.logical()?.device)
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn surface_loader(&self) -> &khr::Surface {
        &self.surface_loader
    }

    /// Submit work to the graphics queue.
    ///
    /// A supplied fence is reset first so that it only signals for this
    /// submission.
    pub fn submit(&self, submit_info: &vk::SubmitInfo, fence: Option<vk::Fence>) -> Result<()> {
        let logical = self.logical()?;

        let fence = match fence {
            Some(fence) => {
                unsafe { logical.device.reset_fences(&[fence]) }
                    .context("Failed to reset in-flight fence")?;
                fence
            }
            None => vk::Fence::null(),
        };

        unsafe {
            logical.device.queue_submit(
                logical.graphics_queue,
                std::slice::from_ref(submit_info),
                fence,
            )
        }
        .context("Failed to submit draw command buffer")?;

        Ok(())
    }

    /// Queue a present. The raw result is returned untouched: out-of-date and
    /// suboptimal are for the caller to interpret.
    pub fn present(&self, present_info: &vk::PresentInfoKHR) -> VkResult<bool> {
        let logical = self
            .logical
            .as_ref()
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)?;

        unsafe {
            logical
                .swapchain_loader
                .queue_present(logical.present_queue, present_info)
        }
    }

    /// Wait for device to be idle (teardown and chain rebuilds)
    pub fn wait_idle(&self) -> Result<()> {
        if let Some(logical) = &self.logical {
            unsafe { logical.device.device_wait_idle() }.context("Failed to wait for device idle")?;
        }
        Ok(())
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        let _ = self.wait_idle();

        // Cleanup in reverse order
        unsafe {
            if let Some(logical) = self.logical.take() {
                logical.device.destroy_device(None);
            }

            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

/// Every severity the validation layers report; the log filter decides
const MESSENGER_SEVERITIES: vk::DebugUtilsMessageSeverityFlagsEXT =
    vk::DebugUtilsMessageSeverityFlagsEXT::from_raw(
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE.as_raw()
            | vk::DebugUtilsMessageSeverityFlagsEXT::INFO.as_raw()
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING.as_raw()
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR.as_raw(),
    );

fn severity_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> log::Level {
    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::Level::Error,
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::Level::Warn,
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::Level::Debug,
        _ => log::Level::Trace,
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();

    log::log!(severity_level(message_severity), "[Vulkan] {}", message);

    vk::FALSE
}
