//! Context configuration
//!
//! Plain-data settings for [`Context`](crate::Context) creation. All fields
//! have sensible defaults; a TOML file may override any subset of them.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default bound on in-flight fence waits (one second)
pub const DEFAULT_FENCE_TIMEOUT_NS: u64 = 1_000_000_000;

/// Settings applied when creating a [`Context`](crate::Context)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Application name reported to the Vulkan driver
    pub app_name: String,

    /// Enable validation layers and the debug messenger
    pub validation: bool,

    /// Upper bound on waiting for a window's in-flight fence, in
    /// nanoseconds. An expired wait surfaces as [`Error::Timeout`] and
    /// aborts that frame only.
    pub fence_timeout_ns: u64,

    /// Clear color applied to every frame, RGBA in linear [0, 1]
    pub clear_color: [f32; 4],

    /// Command used to invoke the external GLSL-to-SPIR-V compiler
    pub shader_compiler: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            app_name: "vk-lite-app".to_string(),
            validation: cfg!(debug_assertions),
            fence_timeout_ns: DEFAULT_FENCE_TIMEOUT_NS,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            shader_compiler: "glslangValidator".to_string(),
        }
    }
}

impl ContextConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// any field the file omits
    pub fn load_from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path, e)))?;
        toml::from_str(&contents).map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ContextConfig::default();
        assert_eq!(config.fence_timeout_ns, DEFAULT_FENCE_TIMEOUT_NS);
        assert_eq!(config.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(config.shader_compiler, "glslangValidator");
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config: ContextConfig =
            toml::from_str("app_name = \"demo\"\nfence_timeout_ns = 5000000")
                .expect("partial config should parse");
        assert_eq!(config.app_name, "demo");
        assert_eq!(config.fence_timeout_ns, 5_000_000);
        // Unspecified fields keep their defaults
        assert_eq!(config.shader_compiler, "glslangValidator");
    }

    #[test]
    fn test_missing_file_is_a_config_error() {
        let err = ContextConfig::load_from_file("/nonexistent/vk_lite.toml")
            .expect_err("missing file must fail");
        assert!(matches!(err, Error::Config(_)));
    }
}
