//! Runtime shader compilation and graphics pipeline creation
//!
//! GLSL source is turned into SPIR-V by an external compiler process, one
//! isolated invocation per stage: the source is fed over stdin, the binary
//! blob comes back on stdout, and diagnostics on stderr. The compiler is
//! invoked with an argument vector and dedicated pipes, never through a
//! shell. Compiler failure or a misaligned blob is rejected before any
//! device object exists, so a failed compile leaves nothing allocated.
//!
//! The resulting [`Pipeline`] is a fixed-configuration drawing program:
//! triangle list, fill rasterization, no culling, one color attachment with
//! blending off, dynamic viewport/scissor, and the output format declared
//! through dynamic rendering instead of a render pass.

use std::ffi::CStr;
use std::fmt;
use std::io::Write;
use std::process::{Command, Stdio};

use ash::{vk, Device};

use crate::device::DeviceContext;
use crate::error::{Error, Result};

/// Shader stage targeted by a compiler invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    /// Vertex stage
    Vertex,
    /// Fragment stage
    Fragment,
}

impl ShaderStage {
    /// Stage name the external compiler expects after `-S`
    fn compiler_stage(self) -> &'static str {
        match self {
            Self::Vertex => "vert",
            Self::Fragment => "frag",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vertex => write!(f, "vertex"),
            Self::Fragment => write!(f, "fragment"),
        }
    }
}

/// Reject a compiled blob whose byte length is not a whole number of SPIR-V
/// code words. Runs before any device call is made.
pub(crate) fn validate_bytecode(stage: ShaderStage, bytes: &[u8]) -> Result<()> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return Err(Error::MalformedBytecode {
            stage,
            len: bytes.len(),
        });
    }
    Ok(())
}

/// Invokes the external GLSL-to-SPIR-V compiler as an isolated subprocess
pub struct ShaderCompiler {
    command: String,
}

impl ShaderCompiler {
    /// Create a compiler front-end for the given command
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Argument vector for one stage: SPIR-V output, source on stdin,
    /// binary on stdout. No shell interpolation anywhere.
    fn argv(stage: ShaderStage) -> [&'static str; 6] {
        ["-V", "--stdin", "-S", stage.compiler_stage(), "-o", "-"]
    }

    /// Compile one stage's source text to validated SPIR-V.
    ///
    /// A non-zero exit returns [`Error::Compile`] with the captured
    /// diagnostic text; a misaligned blob returns
    /// [`Error::MalformedBytecode`]. Neither creates any device object.
    pub fn compile(&self, stage: ShaderStage, source: &str) -> Result<Vec<u8>> {
        let spawn_err = |source| Error::CompilerSpawn {
            command: self.command.clone(),
            source,
        };

        let mut child = Command::new(&self.command)
            .args(Self::argv(stage))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_err)?;

        // Feed the source and close the pipe so the compiler sees EOF. A
        // broken pipe means the compiler exited early; its exit status and
        // captured diagnostics are the interesting part then.
        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(source.as_bytes()) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => return Err(spawn_err(e)),
            }
        }

        let output = child.wait_with_output().map_err(spawn_err)?;
        if !output.status.success() {
            let mut log = String::from_utf8_lossy(&output.stdout).into_owned();
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.is_empty() {
                if !log.is_empty() {
                    log.push('\n');
                }
                log.push_str(&stderr);
            }
            log::warn!("{stage} shader compilation failed ({})", output.status);
            return Err(Error::Compile { stage, log });
        }

        validate_bytecode(stage, &output.stdout)?;
        log::debug!(
            "{stage} shader compiled: {} bytes of SPIR-V",
            output.stdout.len()
        );
        Ok(output.stdout)
    }
}

/// SPIR-V shader module with RAII cleanup
struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    fn from_bytes(device: &Device, stage: ShaderStage, bytes: &[u8]) -> Result<Self> {
        validate_bytecode(stage, bytes)?;
        // SPIR-V is consumed as u32 code words
        let (prefix, words, suffix) = unsafe { bytes.align_to::<u32>() };
        if !prefix.is_empty() || !suffix.is_empty() {
            return Err(Error::MalformedBytecode {
                stage,
                len: bytes.len(),
            });
        }

        let create_info = vk::ShaderModuleCreateInfo::builder().code(words);
        let module = unsafe {
            device
                .create_shader_module(&create_info, None)
                .map_err(|e| Error::ResourceCreation {
                    what: "shader module",
                    source: e,
                })?
        };
        Ok(Self {
            device: device.clone(),
            module,
        })
    }

    fn stage_info(
        &self,
        stage: vk::ShaderStageFlags,
        entry_point: &CStr,
    ) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.module)
            .name(entry_point)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

/// A compiled, fixed-configuration drawing program.
///
/// Owned by the [`Context`](crate::Context) pipeline arena; windows hold it
/// only through a [`PipelineId`](crate::PipelineId) back-reference. Dropping
/// destroys the pipeline and layout first, then the shader modules.
pub struct Pipeline {
    device: Device,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    // Kept alive for the lifetime of the pipeline, dropped after it
    _vert: ShaderModule,
    _frag: ShaderModule,
    vertex_count: u32,
    color_format: vk::Format,
}

impl Pipeline {
    /// Build the pipeline from already-validated SPIR-V blobs
    pub(crate) fn new(
        device_ctx: &DeviceContext,
        vert_spirv: &[u8],
        frag_spirv: &[u8],
        vertex_count: u32,
        color_format: vk::Format,
    ) -> Result<Self> {
        let device = device_ctx.device();
        let vert = ShaderModule::from_bytes(device, ShaderStage::Vertex, vert_spirv)?;
        let frag = ShaderModule::from_bytes(device, ShaderStage::Fragment, frag_spirv)?;

        let entry = CStr::from_bytes_with_nul(b"main\0").unwrap();
        let shader_stages = [
            vert.stage_info(vk::ShaderStageFlags::VERTEX, entry),
            frag.stage_info(vk::ShaderStageFlags::FRAGMENT, entry),
        ];

        // No vertex buffers: positions come from gl_VertexIndex
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder();

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Counts only; viewport and scissor are dynamic, set per draw
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .line_width(1.0);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];
        let color_blending =
            vk::PipelineColorBlendStateCreateInfo::builder().attachments(&color_blend_attachments);

        // Empty parameter layout: this pipeline binds no resources
        let layout_info = vk::PipelineLayoutCreateInfo::builder();
        let layout = unsafe {
            device
                .create_pipeline_layout(&layout_info, None)
                .map_err(|e| Error::ResourceCreation {
                    what: "pipeline layout",
                    source: e,
                })?
        };

        // Output format is declared here instead of through a render pass
        let color_formats = [color_format];
        let mut rendering_info =
            vk::PipelineRenderingCreateInfo::builder().color_attachment_formats(&color_formats);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .push_next(&mut rendering_info)
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout);

        let pipelines = unsafe {
            device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                &[pipeline_info.build()],
                None,
            )
        };
        let pipeline = match pipelines {
            Ok(pipelines) => pipelines[0],
            Err((_, e)) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(Error::ResourceCreation {
                    what: "graphics pipeline",
                    source: e,
                });
            }
        };

        log::debug!(
            "pipeline created: {} vertices, {:?} output",
            vertex_count,
            color_format
        );

        Ok(Self {
            device: device.clone(),
            pipeline,
            layout,
            _vert: vert,
            _frag: frag,
            vertex_count,
            color_format,
        })
    }

    /// Pipeline handle for binding
    pub(crate) fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Vertex count for the non-indexed draw
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// The color attachment format this pipeline renders to
    pub fn color_format(&self) -> vk::Format {
        self.color_format
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
        // Shader modules drop afterward
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_byte_blob_rejected() {
        let err = validate_bytecode(ShaderStage::Vertex, &[0u8; 3])
            .expect_err("3 bytes is not a whole code word");
        assert!(matches!(
            err,
            Error::MalformedBytecode {
                stage: ShaderStage::Vertex,
                len: 3
            }
        ));
    }

    #[test]
    fn test_empty_blob_rejected() {
        assert!(validate_bytecode(ShaderStage::Fragment, &[]).is_err());
    }

    #[test]
    fn test_word_aligned_blob_accepted() {
        assert!(validate_bytecode(ShaderStage::Vertex, &[0u8; 8]).is_ok());
    }

    #[test]
    fn test_argv_is_a_fixed_vector() {
        // Structured arguments, not a concatenated shell string
        assert_eq!(
            ShaderCompiler::argv(ShaderStage::Vertex),
            ["-V", "--stdin", "-S", "vert", "-o", "-"]
        );
        assert_eq!(
            ShaderCompiler::argv(ShaderStage::Fragment),
            ["-V", "--stdin", "-S", "frag", "-o", "-"]
        );
    }

    #[test]
    fn test_missing_compiler_is_a_spawn_error() {
        let compiler = ShaderCompiler::new("/nonexistent/vk-lite-glslang");
        let err = compiler
            .compile(ShaderStage::Vertex, "void main() {}")
            .expect_err("spawning a missing binary must fail");
        assert!(matches!(err, Error::CompilerSpawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_compiler_surfaces_diagnostics() {
        // `cat` rejects the compiler's argument vector with a non-zero exit
        // and a message on stderr, exercising the diagnostic capture path.
        let compiler = ShaderCompiler::new("cat");
        let err = compiler
            .compile(ShaderStage::Fragment, "void main() {}")
            .expect_err("cat cannot compile shaders");
        match err {
            Error::Compile { stage, log } => {
                assert_eq!(stage, ShaderStage::Fragment);
                assert!(!log.is_empty(), "diagnostics must be captured");
            }
            other => panic!("expected Compile error, got {other:?}"),
        }
    }
}
