// Graphics pipeline creation and management
//
// Render pass and framebuffers depend on the swapchain format and views; the
// pipeline bakes in the extent. All three are rebuilt with the chain.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::device::DeviceContext;
use super::shader::create_shader_module;

/// Bytes of push constant data visible to the vertex stage (one vec4)
pub const PUSH_CONSTANT_SIZE: u32 = 16;

/// Single color attachment cleared on load and handed to presentation
pub fn create_render_pass(device: &ash::Device, format: vk::Format) -> Result<vk::RenderPass> {
    let color_attachment = vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .build();

    let color_attachment_ref = vk::AttachmentReference::builder()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build();

    let color_attachments = &[color_attachment_ref];
    let subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(color_attachments)
        .build();

    // The image-available semaphore is waited on at color output, so the
    // layout transition must not start before that stage either
    let dependency = vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        .build();

    let attachments = &[color_attachment];
    let subpasses = &[subpass];
    let dependencies = &[dependency];

    let render_pass_info = vk::RenderPassCreateInfo::builder()
        .attachments(attachments)
        .subpasses(subpasses)
        .dependencies(dependencies);

    unsafe { device.create_render_pass(&render_pass_info, None) }
        .context("Failed to create render pass")
}

/// One framebuffer per swapchain image view
pub fn create_framebuffers(
    device: &ash::Device,
    image_views: &[vk::ImageView],
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
) -> Result<Vec<vk::Framebuffer>> {
    image_views
        .iter()
        .map(|&image_view| {
            let attachments = &[image_view];
            let framebuffer_info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass)
                .attachments(attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            unsafe { device.create_framebuffer(&framebuffer_info, None) }
                .context("Failed to create framebuffer")
        })
        .collect()
}

/// SPIR-V for one pipeline stage
#[derive(Debug, Clone)]
pub struct ShaderStage {
    pub stage: vk::ShaderStageFlags,
    pub code: Vec<u32>,
}

/// Inputs set since the last `update`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineChanges {
    shaders: bool,
    vertex_input: bool,
    descriptors: bool,
}

impl PipelineChanges {
    /// Nothing built yet; the layout is needed even without descriptors
    fn initial() -> Self {
        Self {
            shaders: false,
            vertex_input: false,
            descriptors: true,
        }
    }

    fn mark_shaders(&mut self) {
        self.shaders = true;
    }

    fn mark_vertex_input(&mut self) {
        self.vertex_input = true;
    }

    fn mark_descriptors(&mut self) {
        self.descriptors = true;
    }

    fn clear(&mut self) {
        self.shaders = false;
        self.vertex_input = false;
        self.descriptors = false;
    }

    pub fn any(&self) -> bool {
        self.shaders || self.vertex_input || self.descriptors
    }

    pub fn rebuild_modules(&self) -> bool {
        self.shaders
    }

    /// Descriptor set layout and pipeline layout
    pub fn rebuild_layout(&self) -> bool {
        self.descriptors
    }
}

/// A pipeline bound to one render pass and extent.
///
/// Shader stages, vertex input and descriptor bindings are set separately and
/// only turned into Vulkan objects (and a new pipeline) by the next `update`.
pub struct GraphicsPipeline {
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    descriptor_set_layout: vk::DescriptorSetLayout,
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
    stages: Vec<ShaderStage>,
    modules: Vec<(vk::ShaderStageFlags, vk::ShaderModule)>,
    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    descriptor_bindings: Vec<vk::DescriptorSetLayoutBinding>,
    changes: PipelineChanges,
    device: Arc<DeviceContext>,
}

impl GraphicsPipeline {
    pub fn new(
        device: Arc<DeviceContext>,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
    ) -> Self {
        Self {
            pipeline: vk::Pipeline::null(),
            layout: vk::PipelineLayout::null(),
            descriptor_set_layout: vk::DescriptorSetLayout::null(),
            render_pass,
            extent,
            stages: Vec::new(),
            modules: Vec::new(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            descriptor_bindings: Vec::new(),
            changes: PipelineChanges::initial(),
            device,
        }
    }

    pub fn set_shader_stages(&mut self, stages: Vec<ShaderStage>) {
        self.stages = stages;
        self.changes.mark_shaders();
    }

    pub fn set_vertex_input(
        &mut self,
        bindings: Vec<vk::VertexInputBindingDescription>,
        attributes: Vec<vk::VertexInputAttributeDescription>,
    ) {
        self.vertex_bindings = bindings;
        self.vertex_attributes = attributes;
        self.changes.mark_vertex_input();
    }

    /// Bindings of descriptor set 0; empty means no set layout at all
    pub fn set_descriptor_bindings(&mut self, bindings: Vec<vk::DescriptorSetLayoutBinding>) {
        self.descriptor_bindings = bindings;
        self.changes.mark_descriptors();
    }

    /// Recreate whatever changed since the last call, then the pipeline
    pub fn update(&mut self) -> Result<()> {
        if !self.changes.any() {
            return Ok(());
        }

        let device = Arc::clone(&self.device);
        let device = device.device()?;

        self.destroy_pipeline(device);

        if self.changes.rebuild_modules() {
            self.destroy_modules(device);
            for stage in &self.stages {
                let module = create_shader_module(device, &stage.code)?;
                self.modules.push((stage.stage, module));
            }
        }

        if self.changes.rebuild_layout() {
            self.destroy_layouts(device);
            self.create_layouts(device)?;
        }

        self.pipeline = self.create_pipeline(device)?;
        self.changes.clear();

        log::debug!(
            "Built graphics pipeline ({} stages, {} vertex bindings, {} descriptor bindings, {}x{})",
            self.modules.len(),
            self.vertex_bindings.len(),
            self.descriptor_bindings.len(),
            self.extent.width,
            self.extent.height
        );
        Ok(())
    }

    fn create_layouts(&mut self, device: &ash::Device) -> Result<()> {
        if !self.descriptor_bindings.is_empty() {
            let set_layout_info =
                vk::DescriptorSetLayoutCreateInfo::builder().bindings(&self.descriptor_bindings);
            self.descriptor_set_layout =
                unsafe { device.create_descriptor_set_layout(&set_layout_info, None) }
                    .context("Failed to create descriptor set layout")?;
        }

        let push_constant_range = vk::PushConstantRange::builder()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(PUSH_CONSTANT_SIZE)
            .build();

        let push_constant_ranges = &[push_constant_range];
        let set_layouts: &[vk::DescriptorSetLayout] =
            if self.descriptor_set_layout == vk::DescriptorSetLayout::null() {
                &[]
            } else {
                std::slice::from_ref(&self.descriptor_set_layout)
            };
        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);

        self.layout = unsafe { device.create_pipeline_layout(&layout_info, None) }
            .context("Failed to create pipeline layout")?;
        Ok(())
    }

    fn create_pipeline(&self, device: &ash::Device) -> Result<vk::Pipeline> {
        let entry_point = c"main";

        let shader_stages: Vec<vk::PipelineShaderStageCreateInfo> = self
            .modules
            .iter()
            .map(|&(stage, module)| {
                vk::PipelineShaderStageCreateInfo::builder()
                    .stage(stage)
                    .module(module)
                    .name(entry_point)
                    .build()
            })
            .collect();

        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewport = vk::Viewport::builder()
            .x(0.0)
            .y(0.0)
            .width(self.extent.width as f32)
            .height(self.extent.height as f32)
            .min_depth(0.0)
            .max_depth(1.0)
            .build();

        let scissor = vk::Rect2D::builder()
            .offset(vk::Offset2D { x: 0, y: 0 })
            .extent(self.extent)
            .build();

        let viewports = &[viewport];
        let scissors = &[scissor];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(viewports)
            .scissors(scissors);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        // Opaque
        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build();

        let color_blend_attachments = &[color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(color_blend_attachments);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .layout(self.layout)
            .render_pass(self.render_pass)
            .subpass(0)
            .build();

        let pipelines = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, e)| e)
                .context("Failed to create graphics pipeline")?
        };

        pipelines
            .into_iter()
            .next()
            .context("Driver returned no graphics pipeline")
    }

    pub fn bind(&self, device: &ash::Device, command_buffer: vk::CommandBuffer) {
        unsafe {
            device.cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, self.pipeline)
        };
    }

    pub fn push_constants(&self, device: &ash::Device, command_buffer: vk::CommandBuffer, data: &[u8]) {
        unsafe {
            device.cmd_push_constants(
                command_buffer,
                self.layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                data,
            )
        };
    }

    fn destroy_pipeline(&mut self, device: &ash::Device) {
        if self.pipeline != vk::Pipeline::null() {
            unsafe { device.destroy_pipeline(self.pipeline, None) };
            self.pipeline = vk::Pipeline::null();
        }
    }

    fn destroy_modules(&mut self, device: &ash::Device) {
        for (_, module) in self.modules.drain(..) {
            unsafe { device.destroy_shader_module(module, None) };
        }
    }

    fn destroy_layouts(&mut self, device: &ash::Device) {
        unsafe {
            if self.layout != vk::PipelineLayout::null() {
                device.destroy_pipeline_layout(self.layout, None);
                self.layout = vk::PipelineLayout::null();
            }
            if self.descriptor_set_layout != vk::DescriptorSetLayout::null() {
                device.destroy_descriptor_set_layout(self.descriptor_set_layout, None);
                self.descriptor_set_layout = vk::DescriptorSetLayout::null();
            }
        }
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        let device = Arc::clone(&self.device);
        let Ok(device) = device.device() else {
            return;
        };

        self.destroy_pipeline(device);
        self.destroy_modules(device);
        self.destroy_layouts(device);
    }
}
