// Window system glue
//
// winit owns the window; ash-window turns its raw handles into a Vulkan
// surface. Sizes are physical pixels throughout.

use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::ffi::c_char;
use winit::dpi::PhysicalSize;
use winit::event_loop::ControlFlow;
use winit::window::{Fullscreen, Window, WindowAttributes};

use crate::backend::DeviceContext;
use crate::config::WindowConfig;

pub fn window_attributes(config: &WindowConfig) -> WindowAttributes {
    let attributes = Window::default_attributes()
        .with_title(&config.title)
        .with_inner_size(PhysicalSize::new(config.width, config.height));

    if config.fullscreen {
        attributes.with_fullscreen(Some(Fullscreen::Borderless(None)))
    } else {
        attributes
    }
}

pub fn extent_of(size: PhysicalSize<u32>) -> vk::Extent2D {
    vk::Extent2D {
        width: size.width,
        height: size.height,
    }
}

/// Drawable size of the window in pixels
pub fn drawable_extent(window: &Window) -> vk::Extent2D {
    extent_of(window.inner_size())
}

pub fn is_minimized(size: PhysicalSize<u32>) -> bool {
    size.width == 0 || size.height == 0
}

/// Render as fast as possible, but sleep until the next event while there is
/// nothing to render into
pub fn control_flow(minimized: bool) -> ControlFlow {
    if minimized {
        ControlFlow::Wait
    } else {
        ControlFlow::Poll
    }
}

/// Instance extensions needed to present to this window
pub fn required_extensions(window: &Window) -> Result<Vec<*const c_char>> {
    let extensions = ash_window::enumerate_required_extensions(window.raw_display_handle())
        .context("Window system is not supported by Vulkan")?;
    Ok(extensions.to_vec())
}

pub fn create_surface(device: &DeviceContext, window: &Window) -> Result<vk::SurfaceKHR> {
    unsafe {
        ash_window::create_surface(
            device.entry(),
            device.instance(),
            window.raw_display_handle(),
            window.raw_window_handle(),
            None,
        )
    }
    .context("Failed to create window surface")
}
