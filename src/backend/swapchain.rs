// Swapchain - Window presentation
//
// Owns the chain of images we render to and present, their views, and the
// per-frame sync objects. The chain is built lazily on the first `update`,
// marked stale on resize / out-of-date / suboptimal, and rebuilt wholesale on
// the next `update`. The surface itself lives as long as this object.

use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::prelude::VkResult;
use ash::vk;
use std::sync::Arc;

use super::device::DeviceContext;
use super::sync::{FrameSync, FrameTracker, MAX_FRAMES_IN_FLIGHT};

/// Surface properties queried from a physical device
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn query(
        surface_loader: &khr::Surface,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        unsafe {
            Ok(Self {
                capabilities: surface_loader
                    .get_physical_device_surface_capabilities(physical_device, surface)
                    .context("Failed to query surface capabilities")?,
                formats: surface_loader
                    .get_physical_device_surface_formats(physical_device, surface)
                    .context("Failed to query surface formats")?,
                present_modes: surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)
                    .context("Failed to query surface present modes")?,
            })
        }
    }

    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Prefer 8-bit BGRA sRGB with the standard non-linear color space, else the
/// first format the surface reports.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
}

/// MAILBOX: no tearing, triple buffered, low latency
/// FIFO: vsync, guaranteed available
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's current extent when defined, else the window size clamped
/// into the allowed range.
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, window: vk::Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: window.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: window.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// One more than the minimum, capped by the maximum (0 means no maximum)
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && image_count > capabilities.max_image_count {
        capabilities.max_image_count
    } else {
        image_count
    }
}

/// Images are shared between the two queue families when they differ
pub fn image_sharing(graphics_family: u32, present_family: u32) -> (vk::SharingMode, Vec<u32>) {
    if graphics_family != present_family {
        (
            vk::SharingMode::CONCURRENT,
            vec![graphics_family, present_family],
        )
    } else {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    /// Never built
    Absent,
    Valid,
    /// Built, but no longer matches the surface
    Stale,
}

#[derive(Debug, Clone, Copy)]
pub struct ChainLifecycle {
    built: bool,
    out_of_date: bool,
}

impl Default for ChainLifecycle {
    fn default() -> Self {
        Self {
            built: false,
            out_of_date: true,
        }
    }
}

impl ChainLifecycle {
    pub fn state(&self) -> ChainState {
        match (self.built, self.out_of_date) {
            (false, _) => ChainState::Absent,
            (true, true) => ChainState::Stale,
            (true, false) => ChainState::Valid,
        }
    }

    pub fn needs_rebuild(&self) -> bool {
        self.out_of_date
    }

    pub fn mark_out_of_date(&mut self) {
        self.out_of_date = true;
    }

    pub fn mark_built(&mut self) {
        self.built = true;
        self.out_of_date = false;
    }
}

/// What a rebuild changed, so dependents can rebuild only what they must
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainChange {
    pub image_count: usize,
    pub image_count_changed: bool,
    pub format: vk::Format,
    pub format_changed: bool,
    pub extent: vk::Extent2D,
}

impl ChainChange {
    pub fn between(
        old_format: vk::Format,
        old_image_count: usize,
        format: vk::Format,
        image_count: usize,
        extent: vk::Extent2D,
    ) -> Self {
        Self {
            image_count,
            image_count_changed: old_image_count != image_count,
            format,
            format_changed: old_format != format,
            extent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainUpdate {
    /// Chain was valid; nothing happened
    Unchanged,
    /// Chain is stale but the surface has no area (minimized); try again later
    Deferred,
    Rebuilt(ChainChange),
}

/// An acquired image plus the sync objects of the frame slot that owns it
#[derive(Debug, Clone, Copy)]
pub struct AvailableImage {
    pub image_index: u32,
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
    /// Acquire succeeded but the chain should be rebuilt soon
    pub suboptimal: bool,
}

impl AvailableImage {
    const INVALID_INDEX: u32 = u32::MAX;

    /// Record returned when the chain was out of date; the frame must be skipped
    pub fn out_of_date() -> Self {
        Self {
            image_index: Self::INVALID_INDEX,
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight_fence: vk::Fence::null(),
            suboptimal: false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.image_index != Self::INVALID_INDEX
    }
}

pub struct Swapchain {
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    frames: Vec<FrameSync>,
    tracker: FrameTracker,
    lifecycle: ChainLifecycle,
    surface: vk::SurfaceKHR,
    device: Arc<DeviceContext>,
}

impl Swapchain {
    /// Takes ownership of `surface`. The chain itself is built by the first
    /// `update`.
    pub fn new(device: Arc<DeviceContext>, surface: vk::SurfaceKHR) -> Result<Self> {
        device
            .logical()
            .context("Swapchain needs a logical device; call create_device first")?;

        Ok(Self {
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            surface_format: vk::SurfaceFormatKHR {
                format: vk::Format::UNDEFINED,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            present_mode: vk::PresentModeKHR::FIFO,
            extent: vk::Extent2D::default(),
            frames: Vec::new(),
            tracker: FrameTracker::new(MAX_FRAMES_IN_FLIGHT),
            lifecycle: ChainLifecycle::default(),
            surface,
            device,
        })
    }

    /// Build or rebuild the chain if it is absent or stale.
    ///
    /// `window_extent` is the drawable size in pixels, used when the surface
    /// leaves the extent up to us.
    pub fn update(&mut self, window_extent: vk::Extent2D) -> Result<ChainUpdate> {
        if !self.lifecycle.needs_rebuild() {
            return Ok(ChainUpdate::Unchanged);
        }

        let device = Arc::clone(&self.device);
        let logical = device.logical()?;

        let support =
            SwapchainSupport::query(device.surface_loader(), logical.physical_device, self.surface)?;

        let extent = choose_extent(&support.capabilities, window_extent);
        if extent.width == 0 || extent.height == 0 {
            log::debug!("Surface has no area, deferring swapchain rebuild");
            return Ok(ChainUpdate::Deferred);
        }

        let surface_format = choose_surface_format(&support.formats)
            .context("Surface reports no supported formats")?;
        let present_mode = choose_present_mode(&support.present_modes);
        let image_count = choose_image_count(&support.capabilities);

        let old_format = self.surface_format.format;
        let old_image_count = self.images.len();

        if self.swapchain != vk::SwapchainKHR::null() {
            // Nothing may still be reading the views or waiting on the sync
            // objects we are about to destroy
            device.wait_idle()?;
            self.destroy_resources();
        }

        log::info!(
            "Creating swapchain from {:?} state: {}x{}, {:?}, {:?}",
            self.lifecycle.state(),
            extent.width,
            extent.height,
            surface_format.format,
            present_mode
        );

        let (sharing_mode, queue_family_indices) =
            image_sharing(logical.graphics_family, logical.present_family);

        // The old handle lets the driver recycle its internals
        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&queue_family_indices)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(self.swapchain);

        let swapchain = unsafe { logical.swapchain_loader.create_swapchain(&create_info, None) }
            .context("Failed to create swapchain")?;

        let retired = std::mem::replace(&mut self.swapchain, swapchain);
        if retired != vk::SwapchainKHR::null() {
            unsafe { logical.swapchain_loader.destroy_swapchain(retired, None) };
        }

        self.images = unsafe { logical.swapchain_loader.get_swapchain_images(swapchain) }
            .context("Failed to get swapchain images")?;
        self.image_views = create_image_views(&logical.device, &self.images, surface_format.format)?;

        self.frames = (0..self.tracker.frames_in_flight())
            .map(|_| FrameSync::new(&logical.device))
            .collect::<Result<Vec<_>>>()?;
        self.tracker.reset(self.images.len());

        self.surface_format = surface_format;
        self.present_mode = present_mode;
        self.extent = extent;
        self.lifecycle.mark_built();

        log::info!(
            "Created swapchain with {} images ({:?})",
            self.images.len(),
            self.present_mode
        );

        Ok(ChainUpdate::Rebuilt(ChainChange::between(
            old_format,
            old_image_count,
            surface_format.format,
            self.images.len(),
            extent,
        )))
    }

    /// Destroy views and sync objects. The chain handle stays for reuse.
    fn destroy_resources(&mut self) {
        let Ok(device) = self.device.device() else {
            return;
        };

        for sync in self.frames.drain(..) {
            sync.destroy(device);
        }
        self.tracker.reset(0);

        unsafe {
            for view in self.image_views.drain(..) {
                device.destroy_image_view(view, None);
            }
        }
    }

    fn current_sync(&self) -> Result<FrameSync> {
        self.frames
            .get(self.tracker.current_frame())
            .copied()
            .context("Swapchain has no sync objects; update() has not built a chain")
    }

    /// Block until the current frame slot's previous submission has finished
    pub fn wait_for_next_frame(&self) -> Result<()> {
        let sync = self.current_sync()?;
        let device = self.device.device()?;

        log::trace!("Waiting on frame slot {}", self.tracker.current_frame());
        unsafe { device.wait_for_fences(&[sync.in_flight_fence], true, u64::MAX) }
            .context("Failed to wait for in-flight fence")?;

        Ok(())
    }

    /// Acquire the next image for the current frame slot.
    ///
    /// Returns an invalid record if the chain is out of date.
    pub fn acquire_image(&mut self) -> Result<AvailableImage> {
        let sync = self.current_sync()?;
        let device = Arc::clone(&self.device);
        let logical = device.logical()?;

        let result = unsafe {
            logical.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                sync.image_available,
                vk::Fence::null(),
            )
        };

        let Some((image_index, suboptimal)) = acquire_outcome(result)? else {
            log::debug!("Swapchain out of date on acquire");
            return Ok(AvailableImage::out_of_date());
        };

        // An older frame from another slot may still be using this image
        if let Some(previous) = self.tracker.claim_image(image_index, sync.in_flight_fence) {
            log::trace!("Image {} still in flight, waiting", image_index);
            unsafe { logical.device.wait_for_fences(&[previous], true, u64::MAX) }
                .context("Failed to wait for image fence")?;
        }

        Ok(AvailableImage {
            image_index,
            image_available: sync.image_available,
            render_finished: sync.render_finished,
            in_flight_fence: sync.in_flight_fence,
            suboptimal,
        })
    }

    /// Present the image once rendering has finished.
    ///
    /// Returns `false` if the chain is out of date or suboptimal; the frame
    /// slot only advances on success.
    pub fn present(&mut self, image: &AvailableImage) -> Result<bool> {
        let wait_semaphores = [image.render_finished];
        let swapchains = [self.swapchain];
        let image_indices = [image.image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let presented = settle_present(&mut self.tracker, self.device.present(&present_info))?;
        if !presented {
            log::debug!("Swapchain out of date or suboptimal on present");
        }
        Ok(presented)
    }

    pub fn mark_out_of_date(&mut self) {
        self.lifecycle.mark_out_of_date();
    }

    pub fn format(&self) -> vk::Format {
        self.surface_format.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }
}

/// Classify an acquire result. `None` means the chain is out of date and the
/// frame must be skipped; any other error is fatal.
pub fn acquire_outcome(result: VkResult<(u32, bool)>) -> Result<Option<(u32, bool)>> {
    match result {
        Ok(acquired) => Ok(Some(acquired)),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(None),
        Err(e) => Err(e).context("Failed to acquire swapchain image"),
    }
}

/// Classify a present result. `false` when the chain is out of date or
/// suboptimal; any other error is fatal.
pub fn present_outcome(result: VkResult<bool>) -> Result<bool> {
    match result {
        Ok(suboptimal) => Ok(!suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(false),
        Err(e) => Err(e).context("Failed to present swapchain image"),
    }
}

/// Apply a present result to the frame slots; only a clean present moves on
fn settle_present(tracker: &mut FrameTracker, result: VkResult<bool>) -> Result<bool> {
    let presented = present_outcome(result)?;
    if presented {
        tracker.advance();
    }
    Ok(presented)
}

fn create_image_views(
    device: &ash::Device,
    images: &[vk::Image],
    format: vk::Format,
) -> Result<Vec<vk::ImageView>> {
    images
        .iter()
        .map(|&image| {
            let create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
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

            unsafe { device.create_image_view(&create_info, None) }
                .context("Failed to create image view")
        })
        .collect()
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        let _ = self.device.wait_idle();
        self.destroy_resources();

        unsafe {
            if self.swapchain != vk::SwapchainKHR::null() {
                if let Ok(logical) = self.device.logical() {
                    logical.swapchain_loader.destroy_swapchain(self.swapchain, None);
                }
                self.swapchain = vk::SwapchainKHR::null();
            }
            self.device.surface_loader().destroy_surface(self.surface, None);
        }
    }
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

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn variable_extent_caps() -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: extent(u32::MAX, u32::MAX),
            min_image_extent: extent(1, 1),
            max_image_extent: extent(4096, 4096),
            min_image_count: 2,
            ..Default::default()
        }
    }

    #[test]
    fn prefers_bgra_srgb_nonlinear() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];

        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn srgb_format_in_wrong_color_space_is_not_preferred() {
        let formats = [
            format(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
        ];

        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::R16G16B16A16_SFLOAT);
    }

    #[test]
    fn falls_back_to_first_format() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];

        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn no_formats_means_no_choice() {
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn prefers_mailbox() {
        let modes = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn falls_back_to_fifo_even_when_unlisted() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE]),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(choose_present_mode(&[]), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn uses_current_extent_when_defined() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(1280, 720),
            ..Default::default()
        };
        assert_eq!(choose_extent(&caps, extent(1920, 1080)), extent(1280, 720));
    }

    #[test]
    fn clamps_window_size_when_extent_is_undefined() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(u32::MAX, u32::MAX),
            min_image_extent: extent(640, 480),
            max_image_extent: extent(1920, 1080),
            ..Default::default()
        };
        assert_eq!(choose_extent(&caps, extent(4000, 200)), extent(1920, 480));
        assert_eq!(choose_extent(&caps, extent(800, 600)), extent(800, 600));
    }

    #[test]
    fn unbounded_max_requests_one_more_than_min() {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn image_count_is_capped_by_max() {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 3,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&caps), 3);

        let roomy = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&roomy), 3);
    }

    #[test]
    fn separate_families_share_images_concurrently() {
        assert_eq!(
            image_sharing(0, 1),
            (vk::SharingMode::CONCURRENT, vec![0, 1])
        );
        assert_eq!(image_sharing(2, 2), (vk::SharingMode::EXCLUSIVE, vec![]));
    }

    #[test]
    fn support_needs_formats_and_present_modes() {
        let mut support = SwapchainSupport {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR)],
            present_modes: vec![],
        };
        assert!(!support.is_adequate());

        support.present_modes.push(vk::PresentModeKHR::FIFO);
        assert!(support.is_adequate());

        support.formats.clear();
        assert!(!support.is_adequate());
    }

    #[test]
    fn lifecycle_starts_absent_and_needs_a_build() {
        let lifecycle = ChainLifecycle::default();
        assert_eq!(lifecycle.state(), ChainState::Absent);
        assert!(lifecycle.needs_rebuild());
    }

    #[test]
    fn marking_absent_chain_keeps_it_absent() {
        let mut lifecycle = ChainLifecycle::default();
        lifecycle.mark_out_of_date();
        assert_eq!(lifecycle.state(), ChainState::Absent);
    }

    #[test]
    fn valid_chain_needs_no_rebuild() {
        let mut lifecycle = ChainLifecycle::default();
        lifecycle.mark_built();
        assert_eq!(lifecycle.state(), ChainState::Valid);
        assert!(!lifecycle.needs_rebuild());
    }

    #[test]
    fn repeated_suboptimal_presents_each_mark_stale_and_one_rebuild_clears_it() {
        let mut lifecycle = ChainLifecycle::default();
        lifecycle.mark_built();

        for _ in 0..2 {
            lifecycle.mark_out_of_date();
            assert_eq!(lifecycle.state(), ChainState::Stale);
            assert!(lifecycle.needs_rebuild());

            lifecycle.mark_built();
            assert_eq!(lifecycle.state(), ChainState::Valid);
        }
    }

    #[test]
    fn first_build_reports_everything_changed() {
        let change = ChainChange::between(
            vk::Format::UNDEFINED,
            0,
            vk::Format::B8G8R8A8_SRGB,
            3,
            extent(800, 600),
        );
        assert!(change.image_count_changed);
        assert!(change.format_changed);
        assert_eq!(change.image_count, 3);
    }

    #[test]
    fn format_and_count_changes_are_reported_independently() {
        let format_only = ChainChange::between(
            vk::Format::B8G8R8A8_SRGB,
            3,
            vk::Format::B8G8R8A8_UNORM,
            3,
            extent(800, 600),
        );
        assert!(format_only.format_changed);
        assert!(!format_only.image_count_changed);

        let count_only = ChainChange::between(
            vk::Format::B8G8R8A8_SRGB,
            3,
            vk::Format::B8G8R8A8_SRGB,
            4,
            extent(800, 600),
        );
        assert!(!count_only.format_changed);
        assert!(count_only.image_count_changed);
    }

    #[test]
    fn resize_while_idle_rebuilds_with_new_extent() {
        let caps = variable_extent_caps();
        let mut lifecycle = ChainLifecycle::default();

        // First build at the initial window size
        assert!(lifecycle.needs_rebuild());
        let first = choose_extent(&caps, extent(800, 600));
        lifecycle.mark_built();

        // Resize notification arrives between frames
        lifecycle.mark_out_of_date();
        assert!(lifecycle.needs_rebuild());
        let second = choose_extent(&caps, extent(1024, 768));
        lifecycle.mark_built();

        let change = ChainChange::between(
            vk::Format::B8G8R8A8_SRGB,
            3,
            vk::Format::B8G8R8A8_SRGB,
            3,
            second,
        );

        assert_eq!(first, extent(800, 600));
        assert_eq!(change.extent, extent(1024, 768));
        assert!(!change.format_changed);
        assert!(!change.image_count_changed);
        assert_eq!(lifecycle.state(), ChainState::Valid);
    }

    #[test]
    fn minimized_window_yields_zero_area_extent() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(0, 0),
            ..variable_extent_caps()
        };
        let chosen = choose_extent(&caps, extent(0, 0));
        assert_eq!(chosen.width * chosen.height, 0);
    }

    #[test]
    fn invalid_record_is_not_valid() {
        let record = AvailableImage::out_of_date();
        assert!(!record.is_valid());
        assert!(!record.suboptimal);

        let acquired = AvailableImage {
            image_index: 0,
            ..record
        };
        assert!(acquired.is_valid());
    }

    #[test]
    fn acquired_image_is_used_as_is() {
        assert_eq!(acquire_outcome(Ok((2, false))).unwrap(), Some((2, false)));
    }

    #[test]
    fn suboptimal_acquire_still_yields_the_image() {
        assert_eq!(acquire_outcome(Ok((1, true))).unwrap(), Some((1, true)));
    }

    #[test]
    fn out_of_date_acquire_skips_the_frame() {
        assert_eq!(
            acquire_outcome(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            None
        );
    }

    #[test]
    fn other_acquire_errors_are_fatal() {
        assert!(acquire_outcome(Err(vk::Result::ERROR_DEVICE_LOST)).is_err());
        assert!(acquire_outcome(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).is_err());
    }

    #[test]
    fn clean_present_succeeds() {
        assert!(present_outcome(Ok(false)).unwrap());
    }

    #[test]
    fn suboptimal_present_asks_for_a_rebuild() {
        assert!(!present_outcome(Ok(true)).unwrap());
    }

    #[test]
    fn out_of_date_present_asks_for_a_rebuild() {
        assert!(!present_outcome(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap());
    }

    #[test]
    fn other_present_errors_are_fatal() {
        assert!(present_outcome(Err(vk::Result::ERROR_DEVICE_LOST)).is_err());
    }

    #[test]
    fn frame_slot_only_advances_on_a_clean_present() {
        let mut tracker = FrameTracker::new(MAX_FRAMES_IN_FLIGHT);

        assert!(!settle_present(&mut tracker, Ok(true)).unwrap());
        assert_eq!(tracker.current_frame(), 0);

        assert!(!settle_present(&mut tracker, Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap());
        assert_eq!(tracker.current_frame(), 0);

        assert!(settle_present(&mut tracker, Ok(false)).unwrap());
        assert_eq!(tracker.current_frame(), 1);

        assert!(settle_present(&mut tracker, Err(vk::Result::ERROR_DEVICE_LOST)).is_err());
        assert_eq!(tracker.current_frame(), 1);
    }
}
