// Scene - drawable objects recorded into each frame's command buffer
//
// Objects are updated (pipelines rebuilt if needed) before the render pass
// begins, then drawn inside it, in insertion order.

use anyhow::Result;
use ash::vk;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::backend::{DeviceContext, Swapchain};
use crate::material::Material;

/// Everything an object may need while recording one frame
pub struct RenderContext<'a> {
    pub device: &'a Arc<DeviceContext>,
    pub swapchain: &'a Swapchain,
    pub render_pass: vk::RenderPass,
    pub image_format: vk::Format,
    pub framebuffer: vk::Framebuffer,
    pub command_buffer: vk::CommandBuffer,
    pub image_index: u32,
    /// The chain was rebuilt this frame; anything baked against it is stale
    pub out_of_date: bool,
}

pub trait SceneObject {
    fn update(&mut self, ctx: &RenderContext) -> Result<()>;
    fn draw(&self, ctx: &RenderContext) -> Result<()>;
}

#[derive(Default)]
pub struct Scene {
    objects: Vec<Box<dyn SceneObject>>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, object: Box<dyn SceneObject>) {
        self.objects.push(object);
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn update(&mut self, ctx: &RenderContext) -> Result<()> {
        for object in &mut self.objects {
            object.update(ctx)?;
        }
        Ok(())
    }

    pub fn draw(&self, ctx: &RenderContext) -> Result<()> {
        for object in &self.objects {
            object.draw(ctx)?;
        }
        Ok(())
    }
}

/// A triangle whose vertices are generated by the vertex shader
pub struct MeshObject {
    material: Rc<RefCell<dyn Material>>,
}

impl MeshObject {
    pub const VERTEX_COUNT: u32 = 3;

    pub fn with_material(material: Rc<RefCell<dyn Material>>) -> Self {
        Self { material }
    }
}

impl SceneObject for MeshObject {
    fn update(&mut self, ctx: &RenderContext) -> Result<()> {
        self.material.borrow_mut().update(ctx)
    }

    fn draw(&self, ctx: &RenderContext) -> Result<()> {
        log::trace!("Drawing mesh into image {}", ctx.image_index);
        self.material.borrow().bind(ctx)?;
        let device = ctx.device.device()?;
        unsafe { device.cmd_draw(ctx.command_buffer, Self::VERTEX_COUNT, 1, 0, 0) };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Inert;

    impl SceneObject for Inert {
        fn update(&mut self, _ctx: &RenderContext) -> Result<()> {
            Ok(())
        }

        fn draw(&self, _ctx: &RenderContext) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn objects_are_counted_until_cleared() {
        let mut scene = Scene::new();
        assert_eq!(scene.object_count(), 0);

        scene.add(Box::new(Inert));
        scene.add(Box::new(Inert));
        assert_eq!(scene.object_count(), 2);

        scene.clear();
        assert_eq!(scene.object_count(), 0);
    }
}
