// Shader module loading
//
// Vulkan consumes SPIR-V. build.rs compiles the GLSL sources next to
// themselves; at runtime we read the `.spv` files from the configured
// shader directory.

use anyhow::{Context, Result};
use ash::vk;
use std::path::Path;

/// Read a SPIR-V file into 4-byte words
pub fn load_spirv<P: AsRef<Path>>(path: P) -> Result<Vec<u32>> {
    let path = path.as_ref();
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open shader {:?}. Was it compiled with glslc?", path))?;

    ash::util::read_spv(&mut file).with_context(|| format!("Failed to read SPIR-V from {:?}", path))
}

pub fn create_shader_module(device: &ash::Device, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

    unsafe { device.create_shader_module(&create_info, None) }
        .context("Failed to create shader module")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn reads_little_endian_words() {
        let path = std::env::temp_dir().join("swapframe_words.spv");
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&7u32.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();

        let words = load_spirv(&path).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 7]);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn truncated_file_is_rejected() {
        let path = std::env::temp_dir().join("swapframe_truncated.spv");
        std::fs::write(&path, [0x03u8, 0x02, 0x23]).unwrap();

        assert!(load_spirv(&path).is_err());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_spirv("no/such/shader.spv").unwrap_err();
        assert!(format!("{:#}", err).contains("no/such/shader.spv"));
    }
}
