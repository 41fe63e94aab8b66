//! Test utilities shared by the integration tests.

use parking_lot::Mutex;
use std::{borrow::Cow, sync::Arc};
use webgpu_gl::{
    headless::{HeadlessContext, HeadlessControl},
    *,
};

pub const VERTEX_SHADER: &str = "#version 300 es
void main() {
    gl_Position = vec4(0.0, 0.0, 0.0, 1.0);
}
";

pub const FRAGMENT_SHADER: &str = "#version 300 es
precision mediump float;
out vec4 color;
void main() {
    color = vec4(1.0);
}
";

pub const SAMPLING_FRAGMENT_SHADER: &str = "#version 300 es
precision mediump float;
uniform highp sampler2D _group0_binding0_diffuse;
out vec4 color;
void main() {
    color = texture(_group0_binding0_diffuse, vec2(0.5));
}
";

pub const UNIFORM_VERTEX_SHADER: &str = "#version 300 es
layout(std140) uniform _group0_binding0_Globals {
    vec4 offset;
} globals;
void main() {
    gl_Position = globals.offset;
}
";

pub struct TestingContext {
    pub device: Device,
    pub control: HeadlessControl,
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn initialize_test() -> TestingContext {
    initialize_test_with(&DeviceDescriptor::default())
}

pub fn initialize_test_with(desc: &DeviceDescriptor) -> TestingContext {
    init_logger();
    let context = HeadlessContext::new();
    let control = context.control();
    let device = Device::new(context, desc).unwrap();
    TestingContext { device, control }
}

/// Run some code in an error scope and assert that validation fails.
pub fn fail<T>(device: &Device, callback: impl FnOnce() -> T) -> T {
    device.push_error_scope(ErrorFilter::Validation);
    let result = callback();
    assert!(pollster::block_on(device.pop_error_scope()).is_ok());

    result
}

/// Run some code in an error scope and assert that validation succeeds.
pub fn valid<T>(device: &Device, callback: impl FnOnce() -> T) -> T {
    device.push_error_scope(ErrorFilter::Validation);
    let result = callback();
    assert_eq!(
        pollster::block_on(device.pop_error_scope()).err(),
        Some(PopErrorScopeError::NoErrorCaptured)
    );

    result
}

/// Collects every error that reaches the uncaptured error handler.
pub fn collect_uncaptured(device: &Device) -> Arc<Mutex<Vec<Error>>> {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    device.on_uncaptured_error(move |error| sink.lock().push(error));
    errors
}

pub fn shader(device: &Device, stage: ShaderStage, source: &str) -> Arc<ShaderModule> {
    device.create_shader_module(&ShaderModuleDescriptor {
        label: None,
        source: ShaderSource::Glsl {
            shader: Cow::Owned(source.to_string()),
            stage,
        },
    })
}

pub fn render_target(device: &Device, surface: bool) -> Arc<TextureView> {
    let desc = TextureDescriptor {
        label: Some(if surface { "surface" } else { "target" }),
        size: Extent3d {
            width: 64,
            height: 64,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format: TextureFormat::Rgba8Unorm,
        usage: TextureUsages::RENDER_ATTACHMENT,
    };
    let texture = if surface {
        device.create_surface_texture(&desc)
    } else {
        device.create_texture(&desc)
    };
    texture.create_default_view()
}

pub fn uniform_entry(binding: u32, has_dynamic_offset: bool) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::VERTEX,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Uniform,
            has_dynamic_offset,
            min_binding_size: None,
        },
    }
}

pub fn pipeline(
    device: &Device,
    layout: &Arc<PipelineLayout>,
    vertex_source: &str,
    targets: &[Option<ColorTargetState>],
) -> Arc<RenderPipeline> {
    let vertex = shader(device, ShaderStage::Vertex, vertex_source);
    let fragment = shader(device, ShaderStage::Fragment, FRAGMENT_SHADER);
    device.create_render_pipeline(&RenderPipelineDescriptor {
        label: None,
        layout,
        vertex: VertexState {
            module: &vertex,
            entry_point: "main",
            buffers: &[],
        },
        primitive: PrimitiveState::default(),
        depth_stencil: None,
        fragment: Some(FragmentState {
            module: &fragment,
            entry_point: "main",
            targets,
        }),
    })
}

pub fn color_attachment(view: &Arc<TextureView>, store: StoreOp) -> RenderPassColorAttachment<'_> {
    RenderPassColorAttachment {
        view,
        resolve_target: None,
        ops: Operations {
            load: LoadOp::Clear(Color::BLACK),
            store,
        },
    }
}
