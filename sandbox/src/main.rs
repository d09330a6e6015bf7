//! Two-window demo: a red full-screen triangle in one window, a bare
//! clear in the other, both driven by the same main loop.

use ash::vk;
use vk_lite::{Context, ContextConfig};

const TRIANGLE_VERT: &str = "\
#version 450
vec2 positions[3] = vec2[](
    vec2(-1.0, -1.0),
    vec2( 3.0, -1.0),
    vec2(-1.0,  3.0)
);
void main() {
    gl_Position = vec4(positions[gl_VertexIndex], 0.0, 1.0);
}
";

const TRIANGLE_FRAG: &str = "\
#version 450
layout(location = 0) out vec4 outColor;
void main() {
    outColor = vec4(1.0, 0.0, 0.0, 1.0);
}
";

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        log::error!("sandbox failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> vk_lite::Result<()> {
    let config = ContextConfig {
        app_name: "sandbox".to_string(),
        ..ContextConfig::default()
    };
    let mut ctx = Context::new(config)?;

    let window_one = ctx.create_window(800, 600, "VkLite Window 1")?;
    let _window_two = ctx.create_window(640, 480, "VkLite Window 2")?;

    let color_format = ctx
        .window_format(window_one)
        .unwrap_or(vk::Format::B8G8R8A8_SRGB);
    let triangle = ctx.create_pipeline(TRIANGLE_VERT, TRIANGLE_FRAG, 3, color_format)?;
    ctx.attach_pipeline(window_one, triangle);

    ctx.run_main_loop();

    ctx.destroy_pipeline(triangle);
    ctx.shutdown();
    Ok(())
}
