// Backend module - Vulkan abstraction layer
//
// Thin wrappers around ash. Everything that owns a Vulkan handle holds an
// `Arc<DeviceContext>` so the device outlives it.

pub mod command;
pub mod device;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use command::CommandPool;
pub use device::{DeviceConfig, DeviceContext};
pub use pipeline::GraphicsPipeline;
pub use swapchain::{AvailableImage, ChainChange, ChainUpdate, Swapchain};
