// Renderer - the Vulkan frame backend
//
// Owns the swapchain and everything rebuilt with it: per-image command
// buffers, the render pass and one framebuffer per image. The scene records
// into whichever image was acquired.

use anyhow::{Context, Result};
use ash::vk;
use glam::Vec4;
use std::sync::Arc;
use winit::window::Window;

use crate::backend::pipeline::{create_framebuffers, create_render_pass};
use crate::backend::{
    AvailableImage, ChainChange, ChainUpdate, CommandPool, DeviceContext, Swapchain,
};
use crate::engine::FrameBackend;
use crate::scene::{RenderContext, Scene};
use crate::window;

/// Stage at which a submission waits for its image to become available
const WAIT_STAGES: [vk::PipelineStageFlags; 1] = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];

pub struct Renderer {
    // Dropped top to bottom: scene pipelines go before the chain and device
    scene: Scene,
    commands: CommandPool,
    framebuffers: Vec<vk::Framebuffer>,
    render_pass: vk::RenderPass,
    swapchain: Swapchain,
    window: Arc<Window>,
    clear_color: Vec4,
    device: Arc<DeviceContext>,
}

impl Renderer {
    /// `surface` must belong to `window`; the swapchain takes ownership of it
    pub fn new(
        device: Arc<DeviceContext>,
        window: Arc<Window>,
        surface: vk::SurfaceKHR,
        scene: Scene,
        clear_color: Vec4,
    ) -> Result<Self> {
        let swapchain = Swapchain::new(Arc::clone(&device), surface)?;
        let commands = CommandPool::new(Arc::clone(&device))?;
        log::debug!("Renderer created with {} scene objects", scene.object_count());

        Ok(Self {
            scene,
            commands,
            framebuffers: Vec::new(),
            render_pass: vk::RenderPass::null(),
            swapchain,
            window,
            clear_color,
            device,
        })
    }

    fn destroy_framebuffers(&mut self, device: &ash::Device) {
        for framebuffer in self.framebuffers.drain(..) {
            unsafe { device.destroy_framebuffer(framebuffer, None) };
        }
    }

    fn destroy_render_pass(&mut self, device: &ash::Device) {
        if self.render_pass != vk::RenderPass::null() {
            unsafe { device.destroy_render_pass(self.render_pass, None) };
            self.render_pass = vk::RenderPass::null();
        }
    }
}

impl FrameBackend for Renderer {
    fn update_chain(&mut self) -> Result<ChainUpdate> {
        self.swapchain.update(window::drawable_extent(&self.window))
    }

    fn rebuild_targets(&mut self, change: &ChainChange) -> Result<()> {
        let device = Arc::clone(&self.device);
        let device = device.device()?;

        if change.image_count_changed || self.commands.buffer_count() != change.image_count {
            self.commands.resize(change.image_count)?;
        }

        self.destroy_framebuffers(device);

        if change.format_changed || self.render_pass == vk::RenderPass::null() {
            self.destroy_render_pass(device);
            self.render_pass = create_render_pass(device, change.format)?;
            log::debug!("Created render pass for {:?}", change.format);
        }

        self.framebuffers = create_framebuffers(
            device,
            self.swapchain.image_views(),
            self.render_pass,
            change.extent,
        )?;

        Ok(())
    }

    fn wait_for_next_frame(&mut self) -> Result<()> {
        self.swapchain.wait_for_next_frame()
    }

    fn acquire_image(&mut self) -> Result<AvailableImage> {
        self.swapchain.acquire_image()
    }

    fn record(&mut self, image: &AvailableImage, out_of_date: bool) -> Result<vk::CommandBuffer> {
        let command_buffer = self.commands.buffer(image.image_index)?;
        let framebuffer = self
            .framebuffers
            .get(image.image_index as usize)
            .copied()
            .with_context(|| format!("No framebuffer for image {}", image.image_index))?;

        let ctx = RenderContext {
            device: &self.device,
            swapchain: &self.swapchain,
            render_pass: self.render_pass,
            image_format: self.swapchain.format(),
            framebuffer,
            command_buffer,
            image_index: image.image_index,
            out_of_date,
        };

        // Pipelines are (re)built here, outside any recording
        self.scene.update(&ctx)?;

        let device = self.device.device()?;

        // ── Begin ────────────────────────────────────────────────────────────
        // The pool resets the buffer implicitly; acquire_image has already
        // waited for every submission that used it
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { device.begin_command_buffer(command_buffer, &begin_info) }
            .context("Failed to begin command buffer")?;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color.to_array(),
            },
        }];

        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(ctx.render_pass)
            .framebuffer(ctx.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: ctx.swapchain.extent(),
            })
            .clear_values(&clear_values);

        unsafe {
            device.cmd_begin_render_pass(command_buffer, &render_pass_info, vk::SubpassContents::INLINE)
        };

        // ── Draw ─────────────────────────────────────────────────────────────
        self.scene.draw(&ctx)?;

        // ── End ──────────────────────────────────────────────────────────────
        unsafe {
            device.cmd_end_render_pass(command_buffer);
            device.end_command_buffer(command_buffer)
        }
        .context("Failed to record command buffer")?;

        Ok(command_buffer)
    }

    fn submit(&mut self, command_buffer: vk::CommandBuffer, image: &AvailableImage) -> Result<()> {
        let wait_semaphores = [image.image_available];
        let signal_semaphores = [image.render_finished];
        let command_buffers = [command_buffer];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&WAIT_STAGES)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        self.device.submit(&submit_info, Some(image.in_flight_fence))
    }

    fn present(&mut self, image: &AvailableImage) -> Result<bool> {
        self.swapchain.present(image)
    }

    fn mark_out_of_date(&mut self) {
        self.swapchain.mark_out_of_date();
    }

    fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        let _ = self.device.wait_idle();
        self.scene.clear();

        let device = Arc::clone(&self.device);
        if let Ok(device) = device.device() {
            self.destroy_framebuffers(device);
            self.destroy_render_pass(device);
        }
    }
}
