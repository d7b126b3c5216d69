// Synchronization primitives
//
// Fences and semaphores for GPU-CPU and GPU-GPU sync, plus the CPU-side
// bookkeeping of which fence currently guards which swapchain image.

use anyhow::{Context, Result};
use ash::vk;

/// Frames the CPU may record ahead of the GPU
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Frame synchronization - one per frame in flight
#[derive(Debug, Clone, Copy)]
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &ash::Device) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        let fence_info = vk::FenceCreateInfo::builder()
            .flags(vk::FenceCreateFlags::SIGNALED); // Start signaled

        unsafe {
            Ok(Self {
                image_available: device
                    .create_semaphore(&semaphore_info, None)
                    .context("Failed to create image-available semaphore")?,
                render_finished: device
                    .create_semaphore(&semaphore_info, None)
                    .context("Failed to create render-finished semaphore")?,
                in_flight_fence: device
                    .create_fence(&fence_info, None)
                    .context("Failed to create in-flight fence")?,
            })
        }
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_fence(self.in_flight_fence, None);
        }
    }
}

/// Round-robin frame slot plus the image -> in-flight fence map.
///
/// The image count is chosen by the presentation engine and need not match
/// the number of frame slots, so an acquired image can still be guarded by a
/// fence that belongs to another slot.
#[derive(Debug, Clone)]
pub struct FrameTracker {
    current_frame: usize,
    frames_in_flight: usize,
    /// `vk::Fence::null()` marks an unprotected image
    images_in_flight: Vec<vk::Fence>,
}

impl FrameTracker {
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            current_frame: 0,
            frames_in_flight: frames_in_flight.max(1),
            images_in_flight: Vec::new(),
        }
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Forget every image's fence and size the map for a new chain
    pub fn reset(&mut self, image_count: usize) {
        self.images_in_flight.clear();
        self.images_in_flight.resize(image_count, vk::Fence::null());
    }

    /// Hand `image_index` to the slot owning `slot_fence`.
    ///
    /// Returns the fence of a different slot that still guards the image; the
    /// caller must wait on it before writing to the image.
    pub fn claim_image(&mut self, image_index: u32, slot_fence: vk::Fence) -> Option<vk::Fence> {
        let entry = self.images_in_flight.get_mut(image_index as usize)?;
        let previous = std::mem::replace(entry, slot_fence);

        if previous != vk::Fence::null() && previous != slot_fence {
            Some(previous)
        } else {
            None
        }
    }

    /// Move to the next frame slot
    pub fn advance(&mut self) {
        self.current_frame = (self.current_frame + 1) % self.frames_in_flight;
    }
}
