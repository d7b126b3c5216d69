// Command pool and per-image command buffers
//
// One primary buffer per swapchain image, re-recorded every frame. The pool
// allows individual resets so `begin` can reuse a buffer in place.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::device::DeviceContext;

pub struct CommandPool {
    pool: vk::CommandPool,
    buffers: Vec<vk::CommandBuffer>,
    device: Arc<DeviceContext>,
}

impl CommandPool {
    pub fn new(device: Arc<DeviceContext>) -> Result<Self> {
        let logical = device.logical()?;

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(logical.graphics_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { logical.device.create_command_pool(&pool_info, None) }
            .context("Failed to create command pool")?;

        Ok(Self {
            pool,
            buffers: Vec::new(),
            device,
        })
    }

    /// Free the current buffers and allocate `count` new ones.
    ///
    /// The caller must ensure none of the old buffers are pending.
    pub fn resize(&mut self, count: usize) -> Result<()> {
        let device = self.device.device()?;

        if !self.buffers.is_empty() {
            unsafe { device.free_command_buffers(self.pool, &self.buffers) };
            self.buffers.clear();
        }

        if count == 0 {
            return Ok(());
        }

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count as u32);

        self.buffers = unsafe { device.allocate_command_buffers(&alloc_info) }
            .context("Failed to allocate command buffers")?;

        log::debug!("Allocated {} command buffers", count);
        Ok(())
    }

    pub fn buffer(&self, image_index: u32) -> Result<vk::CommandBuffer> {
        self.buffers
            .get(image_index as usize)
            .copied()
            .with_context(|| {
                format!(
                    "No command buffer for image {} ({} allocated)",
                    image_index,
                    self.buffers.len()
                )
            })
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        if let Ok(device) = self.device.device() {
            // Also frees the buffers
            unsafe { device.destroy_command_pool(self.pool, None) };
        }
    }
}
