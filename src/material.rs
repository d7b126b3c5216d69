// Materials - how a scene object is shaded
//
// A material owns its pipeline and rebuilds it whenever the render context
// says the chain changed underneath it. Materials are shared between objects
// through `Rc<RefCell<dyn Material>>`.

use anyhow::{Context, Result};
use ash::vk;
use glam::Vec4;
use std::path::Path;

use crate::backend::pipeline::{ShaderStage, PUSH_CONSTANT_SIZE};
use crate::backend::shader::load_spirv;
use crate::backend::GraphicsPipeline;
use crate::scene::RenderContext;

pub trait Material {
    /// Prepare GPU state for this frame. Called before the render pass begins.
    fn update(&mut self, ctx: &RenderContext) -> Result<()>;
    /// Record binds into the context's command buffer
    fn bind(&self, ctx: &RenderContext) -> Result<()>;
}

/// Unlit, single color
pub struct FlatMaterial {
    tint: Vec4,
    stages: Vec<ShaderStage>,
    pipeline: Option<GraphicsPipeline>,
}

impl FlatMaterial {
    /// Loads `triangle.vert.spv` and `triangle.frag.spv` from `shader_dir`
    pub fn new(shader_dir: &Path, tint: Vec4) -> Result<Self> {
        let stages = vec![
            ShaderStage {
                stage: vk::ShaderStageFlags::VERTEX,
                code: load_spirv(shader_dir.join("triangle.vert.spv"))?,
            },
            ShaderStage {
                stage: vk::ShaderStageFlags::FRAGMENT,
                code: load_spirv(shader_dir.join("triangle.frag.spv"))?,
            },
        ];

        Ok(Self {
            tint,
            stages,
            pipeline: None,
        })
    }

}

impl Material for FlatMaterial {
    fn update(&mut self, ctx: &RenderContext) -> Result<()> {
        if self.pipeline.is_none() || ctx.out_of_date {
            // Release the old pipeline before building its replacement
            self.pipeline = None;
            log::debug!("Building flat material pipeline for {:?}", ctx.image_format);

            let mut pipeline = GraphicsPipeline::new(
                ctx.device.clone(),
                ctx.render_pass,
                ctx.swapchain.extent(),
            );
            pipeline.set_shader_stages(self.stages.clone());
            // Vertices come from gl_VertexIndex and the tint is a push constant
            pipeline.set_vertex_input(Vec::new(), Vec::new());
            pipeline.set_descriptor_bindings(Vec::new());
            self.pipeline = Some(pipeline);
        }

        match &mut self.pipeline {
            Some(pipeline) => pipeline.update(),
            None => Ok(()),
        }
    }

    fn bind(&self, ctx: &RenderContext) -> Result<()> {
        let pipeline = self
            .pipeline
            .as_ref()
            .context("FlatMaterial bound before update")?;
        let device = ctx.device.device()?;

        pipeline.bind(device, ctx.command_buffer);
        pipeline.push_constants(device, ctx.command_buffer, &push_constant_bytes(self.tint));
        Ok(())
    }
}

/// Native-endian bytes of a vec4, as the shader's push block expects
pub fn push_constant_bytes(color: Vec4) -> [u8; PUSH_CONSTANT_SIZE as usize] {
    let mut bytes = [0u8; PUSH_CONSTANT_SIZE as usize];
    for (chunk, component) in bytes.chunks_exact_mut(4).zip(color.to_array()) {
        chunk.copy_from_slice(&component.to_ne_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_constant_holds_components_in_order() {
        let bytes = push_constant_bytes(Vec4::new(0.25, 0.5, 0.75, 1.0));

        let components: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(components, vec![0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn missing_shaders_fail_construction() {
        let result = FlatMaterial::new(Path::new("no/such/dir"), Vec4::ONE);
        assert!(result.is_err());
    }
}
