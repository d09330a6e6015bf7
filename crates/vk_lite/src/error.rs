//! Error taxonomy for the presentation layer
//!
//! Errors fall into a few distinct classes with different recovery stories:
//! initialization errors are fatal and leave nothing allocated, resource
//! creation errors roll back the in-progress window, compile errors carry the
//! external compiler's diagnostics and leave no device objects behind, and
//! frame-scoped errors (including fence timeouts) abort a single frame while
//! the window stays open.

use ash::vk;
use thiserror::Error;

use crate::pipeline::ShaderStage;

/// Errors produced by the presentation layer
#[derive(Error, Debug)]
pub enum Error {
    /// Startup failure: unsupported API version, windowing init failure, or
    /// no suitable adapter. Nothing is left allocated.
    #[error("initialization failed: {0}")]
    Initialization(String),

    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// A surface, swapchain, image view, or synchronization object could not
    /// be created. Triggers full rollback of the window being built.
    #[error("failed to create {what}: {source:?}")]
    ResourceCreation {
        /// The kind of object that failed to create
        what: &'static str,
        /// The Vulkan result code reported by the driver
        source: vk::Result,
    },

    /// Windowing library failure (window creation, surface binding)
    #[error("window error: {0}")]
    Window(String),

    /// The external shader compiler exited non-zero
    #[error("{stage} shader compilation failed:\n{log}")]
    Compile {
        /// Which shader stage was being compiled
        stage: ShaderStage,
        /// Captured compiler diagnostics (stdout and stderr)
        log: String,
    },

    /// The compiler produced a blob whose length is not a multiple of the
    /// SPIR-V word size
    #[error("{stage} shader produced malformed bytecode: {len} bytes is not a multiple of 4")]
    MalformedBytecode {
        /// Which shader stage produced the blob
        stage: ShaderStage,
        /// The offending blob length in bytes
        len: usize,
    },

    /// The shader compiler process could not be spawned or fed
    #[error("failed to run shader compiler `{command}`: {source}")]
    CompilerSpawn {
        /// The command that was invoked
        command: String,
        /// The underlying process error
        source: std::io::Error,
    },

    /// A bounded fence wait expired before the device finished the previous
    /// frame
    #[error("timed out waiting for the in-flight fence")]
    Timeout,

    /// Configuration file could not be read or parsed
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for presentation-layer operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_carries_diagnostics() {
        let err = Error::Compile {
            stage: ShaderStage::Fragment,
            log: "ERROR: 0:3: 'foo' : undeclared identifier".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("fragment"));
        assert!(text.contains("undeclared identifier"));
    }

    #[test]
    fn test_malformed_bytecode_reports_length() {
        let err = Error::MalformedBytecode {
            stage: ShaderStage::Vertex,
            len: 3,
        };
        assert!(err.to_string().contains("3 bytes"));
    }

    #[test]
    fn test_resource_creation_names_the_object() {
        let err = Error::ResourceCreation {
            what: "swapchain",
            source: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
        };
        assert!(err.to_string().contains("swapchain"));
    }
}
