use crate::common::{
    color_attachment, fail, initialize_test, pipeline, render_target, shader, uniform_entry,
    valid, TestingContext, FRAGMENT_SHADER, SAMPLING_FRAGMENT_SHADER, UNIFORM_VERTEX_SHADER,
    VERTEX_SHADER,
};
use std::sync::Arc;
use webgpu_gl::{headless::Call, *};

fn layout_of(device: &Device, entries: &[BindGroupLayoutEntry]) -> Arc<PipelineLayout> {
    let group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: None,
        entries,
    });
    device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: None,
        bind_group_layouts: &[&group_layout],
    })
}

fn create_with_fragment(
    device: &Device,
    layout: &Arc<PipelineLayout>,
    fragment_source: &str,
) -> Arc<RenderPipeline> {
    let vertex = shader(device, ShaderStage::Vertex, VERTEX_SHADER);
    let fragment = shader(device, ShaderStage::Fragment, fragment_source);
    device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some("fragment"),
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
            targets: &[Some(TextureFormat::Rgba8Unorm.into())],
        }),
    })
}

#[test]
fn shader_compile_failure() {
    let TestingContext { device, .. } = initialize_test();
    fail(&device, || {
        shader(&device, ShaderStage::Vertex, "void start() {}")
    });
    fail(&device, || shader(&device, ShaderStage::Vertex, ""));
    valid(&device, || shader(&device, ShaderStage::Vertex, VERTEX_SHADER));
}

#[test]
fn stage_and_entry_point() {
    let TestingContext { device, .. } = initialize_test();
    let layout = layout_of(&device, &[]);
    let vertex = shader(&device, ShaderStage::Vertex, VERTEX_SHADER);
    let fragment = shader(&device, ShaderStage::Fragment, FRAGMENT_SHADER);
    let create = |vertex_module, entry_point| {
        device.create_render_pipeline(&RenderPipelineDescriptor {
            label: None,
            layout: &layout,
            vertex: VertexState {
                module: vertex_module,
                entry_point,
                buffers: &[],
            },
            primitive: PrimitiveState::default(),
            depth_stencil: None,
            fragment: Some(FragmentState {
                module: &fragment,
                entry_point: "main",
                targets: &[Some(TextureFormat::Rgba8Unorm.into())],
            }),
        })
    };
    fail(&device, || create(&vertex, "vs_main"));
    fail(&device, || create(&fragment, "main"));
    valid(&device, || create(&vertex, "main"));
}

#[test]
fn divergent_color_targets() {
    let TestingContext { device, .. } = initialize_test();
    let layout = layout_of(&device, &[]);
    let target = |blend| {
        Some(ColorTargetState {
            format: TextureFormat::Rgba8Unorm,
            blend,
            write_mask: ColorWrites::ALL,
        })
    };

    fail(&device, || {
        pipeline(
            &device,
            &layout,
            VERTEX_SHADER,
            &[target(Some(BlendState::REPLACE)), target(None)],
        )
    });
    fail(&device, || {
        pipeline(
            &device,
            &layout,
            VERTEX_SHADER,
            &[
                target(None),
                Some(ColorTargetState {
                    format: TextureFormat::Rgba8Unorm,
                    blend: None,
                    write_mask: ColorWrites::RED,
                }),
            ],
        )
    });
    // unused attachments don't take part
    valid(&device, || {
        pipeline(
            &device,
            &layout,
            VERTEX_SHADER,
            &[target(Some(BlendState::REPLACE)), None, target(Some(BlendState::REPLACE))],
        )
    });
}

#[test]
fn uniforms_need_binding_prefix() {
    let TestingContext { device, .. } = initialize_test();
    let layout = layout_of(&device, &[uniform_entry(0, false)]);

    fail(&device, || {
        create_with_fragment(
            &device,
            &layout,
            "#version 300 es
precision mediump float;
uniform vec4 tint;
out vec4 color;
void main() { color = tint; }
",
        )
    });
    fail(&device, || {
        create_with_fragment(
            &device,
            &layout,
            "#version 300 es
precision mediump float;
uniform Globals { vec4 tint; } globals;
out vec4 color;
void main() { color = globals.tint; }
",
        )
    });
    fail(&device, || {
        create_with_fragment(
            &device,
            &layout,
            "#version 300 es
precision mediump float;
uniform _group0_binding3_Globals { vec4 tint; } globals;
out vec4 color;
void main() { color = globals.tint; }
",
        )
    });
    valid(&device, || {
        pipeline(
            &device,
            &layout,
            UNIFORM_VERTEX_SHADER,
            &[Some(TextureFormat::Rgba8Unorm.into())],
        )
    });
}

#[test]
fn sampler_uniform_uses_texture_unit() {
    let TestingContext { device, control } = initialize_test();
    let texture_entry = BindGroupLayoutEntry {
        binding: 0,
        visibility: ShaderStages::FRAGMENT,
        ty: BindingType::Texture {
            sample_type: TextureSampleType::Float { filterable: true },
            view_dimension: TextureViewDimension::D2,
            multisampled: false,
        },
    };
    let sampler_entry = BindGroupLayoutEntry {
        binding: 1,
        visibility: ShaderStages::FRAGMENT,
        ty: BindingType::Sampler(SamplerBindingType::Filtering),
    };

    // the texture needs its sampler right after it
    let layout = layout_of(&device, &[texture_entry]);
    fail(&device, || {
        create_with_fragment(&device, &layout, SAMPLING_FRAGMENT_SHADER)
    });

    let group_layouts = [
        device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: None,
            entries: &[uniform_entry(0, false)],
        }),
        device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: None,
            entries: &[texture_entry, sampler_entry],
        }),
    ];
    let layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: None,
        bind_group_layouts: &[&group_layouts[0], &group_layouts[1]],
    });
    let source = SAMPLING_FRAGMENT_SHADER.replace("_group0_", "_group1_");
    valid(&device, || create_with_fragment(&device, &layout, &source));

    let unit = layout.group_offset(1).unwrap();
    let calls = control.calls();
    let program = calls
        .iter()
        .rev()
        .find_map(|c| match *c {
            Call::LinkProgram(program) => Some(program),
            _ => None,
        })
        .unwrap();
    assert!(calls.contains(&Call::Uniform1I32 {
        program,
        name: "_group1_binding0_diffuse".to_string(),
        value: unit as i32,
    }));
}

#[test]
fn vertex_attributes_follow_buffer_offset() {
    let TestingContext { device, control } = initialize_test();
    let target = render_target(&device, false);
    let layout = layout_of(&device, &[]);
    let vertex = shader(
        &device,
        ShaderStage::Vertex,
        "#version 300 es
layout(location = 0) in vec2 position;
void main() { gl_Position = vec4(position, 0.0, 1.0); }
",
    );
    let fragment = shader(&device, ShaderStage::Fragment, FRAGMENT_SHADER);
    let attributes = [VertexAttribute {
        format: VertexFormat::Float32x2,
        offset: 8,
        shader_location: 0,
    }];
    let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
        label: None,
        layout: &layout,
        vertex: VertexState {
            module: &vertex,
            entry_point: "main",
            buffers: &[VertexBufferLayout {
                array_stride: 16,
                step_mode: VertexStepMode::Vertex,
                attributes: &attributes,
            }],
        },
        primitive: PrimitiveState::default(),
        depth_stencil: None,
        fragment: Some(FragmentState {
            module: &fragment,
            entry_point: "main",
            targets: &[Some(TextureFormat::Rgba8Unorm.into())],
        }),
    });
    let vertices = device.create_buffer(&BufferDescriptor {
        label: Some("vertices"),
        size: 256,
        usage: BufferUsages::VERTEX,
        mapped_at_creation: false,
    });
    let indices = device.create_buffer(&BufferDescriptor {
        label: Some("indices"),
        size: 256,
        usage: BufferUsages::INDEX | BufferUsages::VERTEX,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor::default());
    {
        let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: None,
            color_attachments: &[color_attachment(&target, StoreOp::Store)],
            depth_stencil_attachment: None,
        });
        pass.set_pipeline(&pipeline);
        fail(&device, || pass.draw(3, 1, 0, 0));
        pass.set_index_buffer(&indices, IndexFormat::Uint16, 0);
        fail(&device, || pass.set_vertex_buffer(0, &indices, 0));
        pass.set_vertex_buffer(0, &vertices, 32);
        valid(&device, || pass.draw(3, 1, 0, 0));
        pass.end_pass();
    }
    valid(&device, || device.queue().submit(Some(encoder.finish())));

    assert!(control.calls().contains(&Call::VertexAttribPointer {
        index: 0,
        size: 2,
        data_type: glow::FLOAT,
        normalized: false,
        integer: false,
        stride: 16,
        offset: 40,
    }));
}
