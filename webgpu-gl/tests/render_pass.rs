use crate::common::{
    collect_uncaptured, color_attachment, fail, initialize_test, pipeline, render_target, shader,
    uniform_entry, valid, TestingContext, FRAGMENT_SHADER, SAMPLING_FRAGMENT_SHADER,
    UNIFORM_VERTEX_SHADER, VERTEX_SHADER,
};
use std::sync::Arc;
use webgpu_gl::{
    headless::{Call, HeadlessControl},
    *,
};

fn empty_layout(device: &Device) -> Arc<PipelineLayout> {
    device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: None,
        bind_group_layouts: &[],
    })
}

fn target_state() -> Option<ColorTargetState> {
    Some(TextureFormat::Rgba8Unorm.into())
}

fn attachment_view(
    device: &Device,
    format: TextureFormat,
    sample_count: u32,
    usage: TextureUsages,
) -> Arc<TextureView> {
    device
        .create_texture(&TextureDescriptor {
            label: Some("attachment"),
            size: Extent3d {
                width: 64,
                height: 64,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count,
            dimension: TextureDimension::D2,
            format,
            usage,
        })
        .create_default_view()
}

fn depth_view(device: &Device, format: TextureFormat) -> Arc<TextureView> {
    attachment_view(device, format, 1, TextureUsages::RENDER_ATTACHMENT)
}

/// Drains the call log and returns the first object it picks.
fn created<T>(control: &HeadlessControl, pick: impl FnMut(Call) -> Option<T>) -> T {
    control
        .take_calls()
        .into_iter()
        .find_map(pick)
        .expect("nothing was created")
}

fn created_renderbuffer(control: &HeadlessControl) -> context::RawRenderbuffer {
    created(control, |call| match call {
        Call::CreateRenderbuffer(raw) => Some(raw),
        _ => None,
    })
}

fn depth_stencil_pipeline(device: &Device, layout: &Arc<PipelineLayout>) -> Arc<RenderPipeline> {
    let vertex = shader(device, ShaderStage::Vertex, VERTEX_SHADER);
    let fragment = shader(device, ShaderStage::Fragment, FRAGMENT_SHADER);
    let face = StencilFaceState {
        compare: CompareFunction::Equal,
        fail_op: StencilOperation::Keep,
        depth_fail_op: StencilOperation::Keep,
        pass_op: StencilOperation::Replace,
    };
    device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some("depth stencil"),
        layout,
        vertex: VertexState {
            module: &vertex,
            entry_point: "main",
            buffers: &[],
        },
        primitive: PrimitiveState::default(),
        depth_stencil: Some(DepthStencilState {
            format: TextureFormat::Depth24PlusStencil8,
            depth_write_enabled: true,
            depth_compare: CompareFunction::Less,
            stencil: StencilState {
                front: face,
                back: face,
                read_mask: 0xff,
                write_mask: 0xff,
            },
            bias: DepthBiasState::default(),
        }),
        fragment: Some(FragmentState {
            module: &fragment,
            entry_point: "main",
            targets: &[target_state()],
        }),
    })
}

#[test]
fn surface_clear_skips_framebuffer() {
    let TestingContext { device, control } = initialize_test();
    let surface = render_target(&device, true);
    control.take_calls();

    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor::default());
    {
        let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("present"),
            color_attachments: &[color_attachment(&surface, StoreOp::Discard)],
            depth_stencil_attachment: None,
        });
        pass.end_pass();
    }
    valid(&device, || device.queue().submit(Some(encoder.finish())));

    let calls = control.take_calls();
    assert!(calls.contains(&Call::BindFramebuffer {
        target: glow::DRAW_FRAMEBUFFER,
        framebuffer: None,
    }));
    assert!(calls.contains(&Call::ClearBufferF32 {
        target: glow::COLOR,
        draw_buffer: 0,
        values: vec![0.0, 0.0, 0.0, 1.0],
    }));
    for call in calls.iter() {
        assert!(
            !matches!(
                call,
                Call::CreateFramebuffer(_)
                    | Call::CreateRenderbuffer(_)
                    | Call::CreateTexture(_)
                    | Call::BlitFramebuffer { .. }
            ),
            "unexpected {:?}",
            call
        );
    }
}

#[test]
fn surface_store_resolves_to_default_framebuffer() {
    let TestingContext { device, control } = initialize_test();
    let surface = render_target(&device, true);
    control.take_calls();

    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor::default());
    {
        let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: None,
            color_attachments: &[color_attachment(&surface, StoreOp::Store)],
            depth_stencil_attachment: None,
        });
        pass.end_pass();
    }
    valid(&device, || device.queue().submit(Some(encoder.finish())));

    assert_eq!(control.count(|c| matches!(c, Call::CreateRenderbuffer(_))), 1);
    assert!(control.count(|c| matches!(c, Call::CreateFramebuffer(_))) >= 1);
    assert_eq!(control.count(|c| matches!(c, Call::BlitFramebuffer { .. })), 1);
    assert!(control.calls().contains(&Call::BindFramebuffer {
        target: glow::DRAW_FRAMEBUFFER,
        framebuffer: None,
    }));
}

#[test]
fn uniform_block_binds_flat_slot() {
    let TestingContext { device, control } = initialize_test();
    let errors = collect_uncaptured(&device);
    let target = render_target(&device, false);

    let buffer = device.create_buffer(&BufferDescriptor {
        label: Some("globals"),
        size: 64,
        usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: None,
        entries: &[uniform_entry(0, false)],
    });
    let layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: None,
        bind_group_layouts: &[&group_layout],
    });
    let pipeline = pipeline(&device, &layout, UNIFORM_VERTEX_SHADER, &[target_state()]);
    let group = device.create_bind_group(&BindGroupDescriptor {
        label: None,
        layout: &group_layout,
        entries: &[BindGroupEntry {
            binding: 0,
            resource: BindingResource::Buffer(BufferBinding {
                buffer: &buffer,
                offset: 0,
                size: None,
            }),
        }],
    });

    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor::default());
    {
        let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: None,
            color_attachments: &[color_attachment(&target, StoreOp::Store)],
            depth_stencil_attachment: None,
        });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &group, &[]);
        pass.draw(3, 1, 0, 0);
        pass.end_pass();
    }
    device.queue().submit(Some(encoder.finish()));

    assert!(errors.lock().is_empty());
    let slot = layout.group_offset(0).unwrap();
    let calls = control.calls();
    assert!(calls.contains(&Call::BindBufferRange {
        target: glow::UNIFORM_BUFFER,
        index: slot,
        buffer: buffer.as_raw(),
        offset: 0,
        size: 64,
    }));
    assert!(calls.contains(&Call::DrawArrays {
        mode: glow::TRIANGLES,
        first: 0,
        count: 3,
        instance_count: 1,
    }));
    assert!(calls
        .iter()
        .any(|c| matches!(*c, Call::UniformBlockBinding { binding, .. } if binding == slot)));
}

#[test]
fn unchanged_state_materializes_once() {
    let TestingContext { device, control } = initialize_test();
    let target = render_target(&device, false);
    let buffer = device.create_buffer(&BufferDescriptor {
        label: None,
        size: 64,
        usage: BufferUsages::UNIFORM,
        mapped_at_creation: false,
    });
    let group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: None,
        entries: &[uniform_entry(0, false)],
    });
    let layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: None,
        bind_group_layouts: &[&group_layout],
    });
    let pipeline = pipeline(&device, &layout, UNIFORM_VERTEX_SHADER, &[target_state()]);
    let group = device.create_bind_group(&BindGroupDescriptor {
        label: None,
        layout: &group_layout,
        entries: &[BindGroupEntry {
            binding: 0,
            resource: BindingResource::Buffer(BufferBinding {
                buffer: &buffer,
                offset: 0,
                size: None,
            }),
        }],
    });
    control.take_calls();

    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor::default());
    {
        let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: None,
            color_attachments: &[color_attachment(&target, StoreOp::Store)],
            depth_stencil_attachment: None,
        });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &group, &[]);
        pass.draw(3, 1, 0, 0);
        pass.set_pipeline(&pipeline);
        pass.draw(3, 1, 3, 0);
        pass.draw(3, 1, 6, 0);
        pass.end_pass();
    }
    valid(&device, || device.queue().submit(Some(encoder.finish())));

    assert_eq!(control.count(|c| matches!(c, Call::DrawArrays { .. })), 3);
    assert_eq!(control.count(|c| matches!(c, Call::UseProgram(Some(_)))), 1);
    assert_eq!(control.count(|c| matches!(c, Call::BindBufferRange { .. })), 1);
    assert_eq!(control.count(|c| matches!(c, Call::ClearBufferF32 { .. })), 1);
}

#[test]
fn dynamic_offsets_follow_binding_order() {
    let TestingContext { device, control } = initialize_test();
    let target = render_target(&device, false);

    let buffer = device.create_buffer(&BufferDescriptor {
        label: None,
        size: 1024,
        usage: BufferUsages::UNIFORM,
        mapped_at_creation: false,
    });
    // declared out of order, offsets still follow binding order
    let group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: None,
        entries: &[uniform_entry(1, true), uniform_entry(0, true)],
    });
    let layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: None,
        bind_group_layouts: &[&group_layout],
    });
    let pipeline = pipeline(
        &device,
        &layout,
        "#version 300 es
layout(std140) uniform _group0_binding0_First { vec4 a; } first;
layout(std140) uniform _group0_binding1_Second { vec4 b; } second;
void main() { gl_Position = first.a + second.b; }
",
        &[target_state()],
    );
    let range = |binding| BindGroupEntry {
        binding,
        resource: BindingResource::Buffer(BufferBinding {
            buffer: &buffer,
            offset: 0,
            size: BufferSize::new(64),
        }),
    };
    let group = device.create_bind_group(&BindGroupDescriptor {
        label: None,
        layout: &group_layout,
        entries: &[range(0), range(1)],
    });

    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor::default());
    {
        let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: None,
            color_attachments: &[color_attachment(&target, StoreOp::Store)],
            depth_stencil_attachment: None,
        });
        pass.set_pipeline(&pipeline);
        fail(&device, || pass.set_bind_group(0, &group, &[100, 0]));
        fail(&device, || pass.set_bind_group(0, &group, &[256]));
        valid(&device, || pass.set_bind_group(0, &group, &[256, 512]));
        pass.draw(3, 1, 0, 0);
        pass.end_pass();
    }
    valid(&device, || device.queue().submit(Some(encoder.finish())));

    let base = layout.group_offset(0).unwrap();
    let calls = control.calls();
    for (binding, offset) in [(0, 256), (1, 512)] {
        assert!(calls.contains(&Call::BindBufferRange {
            target: glow::UNIFORM_BUFFER,
            index: base + binding,
            buffer: buffer.as_raw(),
            offset,
            size: 64,
        }));
    }
}

#[test]
fn draw_indexed_offsets_by_index_width() {
    let TestingContext { device, control } = initialize_test();
    let target = render_target(&device, false);
    let layout = empty_layout(&device);
    let pipeline = pipeline(&device, &layout, VERTEX_SHADER, &[target_state()]);
    let indices = device.create_buffer(&BufferDescriptor {
        label: Some("indices"),
        size: 64,
        usage: BufferUsages::INDEX,
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
        fail(&device, || pass.draw_indexed(3, 1, 0, 0, 0));
        fail(&device, || pass.set_index_buffer(&indices, IndexFormat::Uint32, 2));
        pass.set_index_buffer(&indices, IndexFormat::Uint32, 8);
        pass.draw_indexed(3, 1, 2, 0, 0);
        pass.set_index_buffer(&indices, IndexFormat::Uint16, 8);
        pass.draw_indexed(6, 1, 2, 0, 0);
        pass.end_pass();
    }
    valid(&device, || device.queue().submit(Some(encoder.finish())));

    let calls = control.calls();
    assert!(calls.contains(&Call::DrawElements {
        mode: glow::TRIANGLES,
        count: 3,
        element_type: glow::UNSIGNED_INT,
        offset: 16,
        instance_count: 1,
    }));
    assert!(calls.contains(&Call::DrawElements {
        mode: glow::TRIANGLES,
        count: 6,
        element_type: glow::UNSIGNED_SHORT,
        offset: 12,
        instance_count: 1,
    }));
}

#[test]
fn ending_pass_twice() {
    let TestingContext { device, control } = initialize_test();
    let target = render_target(&device, false);
    let layout = empty_layout(&device);
    let pipeline = pipeline(&device, &layout, VERTEX_SHADER, &[target_state()]);

    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor::default());
    let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
        label: None,
        color_attachments: &[color_attachment(&target, StoreOp::Store)],
        depth_stencil_attachment: None,
    });
    pass.set_pipeline(&pipeline);
    pass.end_pass();
    fail(&device, || pass.end_pass());
    // calls on an ended pass are inert
    valid(&device, || pass.draw(3, 1, 0, 0));
    drop(pass);

    let cmd_buf = valid(&device, || encoder.finish());
    valid(&device, || device.queue().submit(Some(cmd_buf)));
    assert_eq!(control.count(|c| matches!(c, Call::DrawArrays { .. })), 0);
}

#[test]
fn draw_without_pipeline() {
    let TestingContext { device, .. } = initialize_test();
    let target = render_target(&device, false);

    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor::default());
    let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
        label: None,
        color_attachments: &[color_attachment(&target, StoreOp::Store)],
        depth_stencil_attachment: None,
    });
    fail(&device, || pass.draw(3, 1, 0, 0));
    // a failed draw only skips itself
    valid(&device, || pass.end_pass());
}

#[test]
fn missing_bind_group() {
    let TestingContext { device, .. } = initialize_test();
    let target = render_target(&device, false);
    let group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: None,
        entries: &[uniform_entry(0, false)],
    });
    let layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: None,
        bind_group_layouts: &[&group_layout],
    });
    let pipeline = pipeline(&device, &layout, UNIFORM_VERTEX_SHADER, &[target_state()]);

    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor::default());
    let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
        label: None,
        color_attachments: &[color_attachment(&target, StoreOp::Store)],
        depth_stencil_attachment: None,
    });
    pass.set_pipeline(&pipeline);
    fail(&device, || pass.draw(3, 1, 0, 0));
    pass.end_pass();
}

#[test]
fn attachment_size_mismatch() {
    let TestingContext { device, .. } = initialize_test();
    let small = device
        .create_texture(&TextureDescriptor {
            label: None,
            size: Extent3d {
                width: 16,
                height: 16,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsages::RENDER_ATTACHMENT,
        })
        .create_default_view();
    let large = render_target(&device, false);

    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor::default());
    let mut pass = fail(&device, || {
        encoder.begin_render_pass(&RenderPassDescriptor {
            label: None,
            color_attachments: &[
                color_attachment(&small, StoreOp::Store),
                color_attachment(&large, StoreOp::Store),
            ],
            depth_stencil_attachment: None,
        })
    });
    valid(&device, || pass.end_pass());
}

#[test]
fn blend_constant_resets_between_passes() {
    let TestingContext { device, control } = initialize_test();
    let target = render_target(&device, false);
    let layout = empty_layout(&device);
    let pipeline = pipeline(&device, &layout, VERTEX_SHADER, &[target_state()]);
    control.take_calls();

    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor::default());
    {
        let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("tinted"),
            color_attachments: &[color_attachment(&target, StoreOp::Store)],
            depth_stencil_attachment: None,
        });
        pass.set_pipeline(&pipeline);
        pass.set_blend_constant(Color::RED);
        pass.draw(3, 1, 0, 0);
        pass.end_pass();
    }
    {
        let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("plain"),
            color_attachments: &[color_attachment(&target, StoreOp::Store)],
            depth_stencil_attachment: None,
        });
        pass.set_pipeline(&pipeline);
        pass.set_blend_constant(Color::TRANSPARENT);
        pass.draw(3, 1, 0, 0);
        pass.draw(3, 1, 0, 0);
        pass.end_pass();
    }
    valid(&device, || device.queue().submit(Some(encoder.finish())));

    let colors: Vec<_> = control
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::BlendColor(color) => Some(color),
            _ => None,
        })
        .collect();
    assert_eq!(colors, vec![[1.0, 0.0, 0.0, 1.0], [0.0, 0.0, 0.0, 0.0]]);
}

#[test]
fn scissor_is_applied_once() {
    let TestingContext { device, control } = initialize_test();
    let target = render_target(&device, false);
    let layout = empty_layout(&device);
    let pipeline = pipeline(&device, &layout, VERTEX_SHADER, &[target_state()]);
    control.take_calls();

    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor::default());
    {
        let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: None,
            color_attachments: &[color_attachment(&target, StoreOp::Store)],
            depth_stencil_attachment: None,
        });
        pass.set_pipeline(&pipeline);
        fail(&device, || pass.set_scissor_rect(60, 0, 8, 8));
        pass.set_scissor_rect(4, 8, 16, 32);
        pass.draw(3, 1, 0, 0);
        pass.draw(3, 1, 0, 0);
        pass.end_pass();
    }
    valid(&device, || device.queue().submit(Some(encoder.finish())));

    let calls = control.calls();
    assert_eq!(control.count(|c| matches!(c, Call::Scissor(_))), 1);
    let scissor = calls
        .iter()
        .position(|c| *c == Call::Scissor([4, 8, 16, 32]))
        .unwrap();
    assert_eq!(calls[scissor + 1], Call::Enable(glow::SCISSOR_TEST));
}

#[test]
fn offscreen_depth_stencil_clear_and_discard() {
    let TestingContext { device, control } = initialize_test();
    let target = render_target(&device, false);
    let depth = depth_view(&device, TextureFormat::Depth24PlusStencil8);
    let renderbuffer = created_renderbuffer(&control);

    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor::default());
    {
        let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: None,
            color_attachments: &[color_attachment(&target, StoreOp::Store)],
            depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                view: &depth,
                depth_ops: Some(Operations {
                    load: LoadOp::Clear(1.0),
                    store: StoreOp::Discard,
                }),
                stencil_ops: Some(Operations {
                    load: LoadOp::Clear(0),
                    store: StoreOp::Discard,
                }),
            }),
        });
        pass.end_pass();
    }
    valid(&device, || device.queue().submit(Some(encoder.finish())));

    let calls = control.take_calls();
    assert!(calls.contains(&Call::FramebufferRenderbuffer {
        target: glow::DRAW_FRAMEBUFFER,
        attachment: glow::DEPTH_STENCIL_ATTACHMENT,
        renderbuffer: Some(renderbuffer),
    }));
    assert!(calls.contains(&Call::ClearBufferDepthStencil {
        depth: 1.0,
        stencil: 0,
    }));
    assert!(calls.contains(&Call::InvalidateFramebuffer {
        target: glow::DRAW_FRAMEBUFFER,
        attachments: vec![glow::DEPTH_ATTACHMENT, glow::STENCIL_ATTACHMENT],
    }));
}

#[test]
fn depth_only_clear_ignores_stencil_ops() {
    let TestingContext { device, control } = initialize_test();
    let target = render_target(&device, false);
    let depth = depth_view(&device, TextureFormat::Depth32Float);
    let renderbuffer = created_renderbuffer(&control);

    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor::default());
    {
        let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: None,
            color_attachments: &[color_attachment(&target, StoreOp::Store)],
            depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                view: &depth,
                depth_ops: Some(Operations {
                    load: LoadOp::Clear(0.5),
                    store: StoreOp::Store,
                }),
                stencil_ops: Some(Operations {
                    load: LoadOp::Clear(5),
                    store: StoreOp::Discard,
                }),
            }),
        });
        pass.end_pass();
    }
    valid(&device, || device.queue().submit(Some(encoder.finish())));

    let calls = control.take_calls();
    assert!(calls.contains(&Call::FramebufferRenderbuffer {
        target: glow::DRAW_FRAMEBUFFER,
        attachment: glow::DEPTH_ATTACHMENT,
        renderbuffer: Some(renderbuffer),
    }));
    assert!(calls.contains(&Call::ClearBufferF32 {
        target: glow::DEPTH,
        draw_buffer: 0,
        values: vec![0.5],
    }));
    for call in calls.iter() {
        assert!(
            !matches!(
                call,
                Call::ClearBufferI32 { .. }
                    | Call::ClearBufferDepthStencil { .. }
                    | Call::InvalidateFramebuffer { .. }
            ),
            "unexpected {:?}",
            call
        );
    }
}

#[test]
fn transient_depth_stencil_keeps_fast_path() {
    let TestingContext { device, control } = initialize_test();
    let surface = render_target(&device, true);
    let depth = depth_view(&device, TextureFormat::Depth24PlusStencil8);
    let renderbuffer = created_renderbuffer(&control);
    let depth_stencil = |depth_store| {
        Some(RenderPassDepthStencilAttachment {
            view: &depth,
            depth_ops: Some(Operations {
                load: LoadOp::Clear(1.0),
                store: depth_store,
            }),
            stencil_ops: Some(Operations {
                load: LoadOp::Clear(0),
                store: StoreOp::Discard,
            }),
        })
    };

    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor::default());
    {
        let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: None,
            color_attachments: &[color_attachment(&surface, StoreOp::Discard)],
            depth_stencil_attachment: depth_stencil(StoreOp::Discard),
        });
        pass.end_pass();
    }
    valid(&device, || device.queue().submit(Some(encoder.finish())));

    let calls = control.take_calls();
    assert!(calls.contains(&Call::BindFramebuffer {
        target: glow::DRAW_FRAMEBUFFER,
        framebuffer: None,
    }));
    assert!(calls.contains(&Call::ClearBufferDepthStencil {
        depth: 1.0,
        stencil: 0,
    }));
    assert!(calls.contains(&Call::InvalidateFramebuffer {
        target: glow::DRAW_FRAMEBUFFER,
        attachments: vec![glow::DEPTH, glow::STENCIL],
    }));
    for call in calls.iter() {
        assert!(
            !matches!(
                call,
                Call::CreateFramebuffer(_) | Call::FramebufferRenderbuffer { .. }
            ),
            "unexpected {:?}",
            call
        );
    }

    // a stored depth aspect needs the real attachment
    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor::default());
    {
        let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: None,
            color_attachments: &[color_attachment(&surface, StoreOp::Discard)],
            depth_stencil_attachment: depth_stencil(StoreOp::Store),
        });
        pass.end_pass();
    }
    valid(&device, || device.queue().submit(Some(encoder.finish())));

    let calls = control.take_calls();
    assert_eq!(
        calls
            .iter()
            .filter(|c| matches!(c, Call::CreateFramebuffer(_)))
            .count(),
        1
    );
    assert!(calls.contains(&Call::FramebufferRenderbuffer {
        target: glow::DRAW_FRAMEBUFFER,
        attachment: glow::DEPTH_STENCIL_ATTACHMENT,
        renderbuffer: Some(renderbuffer),
    }));
    assert!(calls.contains(&Call::InvalidateFramebuffer {
        target: glow::DRAW_FRAMEBUFFER,
        attachments: vec![glow::STENCIL_ATTACHMENT],
    }));
}

#[test]
fn depth_stencil_state_follows_pass_aspects() {
    let TestingContext { device, control } = initialize_test();
    let target = render_target(&device, false);
    let depth = depth_view(&device, TextureFormat::Depth24PlusStencil8);
    let layout = empty_layout(&device);
    let pipeline = depth_stencil_pipeline(&device, &layout);
    control.take_calls();

    // without a depth attachment both tests stay off
    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor::default());
    {
        let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: None,
            color_attachments: &[color_attachment(&target, StoreOp::Store)],
            depth_stencil_attachment: None,
        });
        pass.set_pipeline(&pipeline);
        pass.set_stencil_reference(7);
        pass.draw(3, 1, 0, 0);
        pass.end_pass();
    }
    valid(&device, || device.queue().submit(Some(encoder.finish())));

    let calls = control.take_calls();
    assert_eq!(
        calls.iter().filter(|c| matches!(c, Call::DrawArrays { .. })).count(),
        1
    );
    for call in calls.iter() {
        assert!(
            !matches!(
                call,
                Call::Enable(glow::DEPTH_TEST)
                    | Call::Enable(glow::STENCIL_TEST)
                    | Call::DepthFunc(_)
                    | Call::StencilFuncSeparate { .. }
            ),
            "unexpected {:?}",
            call
        );
    }

    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor::default());
    {
        let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: None,
            color_attachments: &[color_attachment(&target, StoreOp::Store)],
            depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                view: &depth,
                depth_ops: Some(Operations {
                    load: LoadOp::Clear(1.0),
                    store: StoreOp::Store,
                }),
                stencil_ops: Some(Operations {
                    load: LoadOp::Load,
                    store: StoreOp::Store,
                }),
            }),
        });
        pass.set_pipeline(&pipeline);
        pass.set_stencil_reference(7);
        pass.draw(3, 1, 0, 0);
        pass.draw(3, 1, 0, 0);
        pass.set_stencil_reference(3);
        pass.draw(3, 1, 0, 0);
        pass.end_pass();
    }
    valid(&device, || device.queue().submit(Some(encoder.finish())));

    let calls = control.take_calls();
    assert!(calls.contains(&Call::Enable(glow::DEPTH_TEST)));
    assert!(calls.contains(&Call::DepthFunc(glow::LESS)));
    assert!(calls.contains(&Call::DepthMask(true)));
    assert!(calls.contains(&Call::Enable(glow::STENCIL_TEST)));
    let references: Vec<_> = calls
        .iter()
        .filter_map(|call| match *call {
            Call::StencilFuncSeparate {
                face,
                func,
                reference,
                mask,
            } => {
                assert_eq!((func, mask), (glow::EQUAL, 0xff));
                Some((face, reference))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        references,
        vec![
            (glow::FRONT, 7),
            (glow::BACK, 7),
            (glow::FRONT, 3),
            (glow::BACK, 3),
        ]
    );
}

#[test]
fn multisampled_attachment_resolves_into_target() {
    let TestingContext { device, control } = initialize_test();
    let layout = empty_layout(&device);
    let pipeline = pipeline(&device, &layout, VERTEX_SHADER, &[target_state()]);
    control.take_calls();
    let msaa = attachment_view(
        &device,
        TextureFormat::Rgba8Unorm,
        4,
        TextureUsages::RENDER_ATTACHMENT,
    );
    let msaa_raw = created_renderbuffer(&control);
    let resolve = render_target(&device, false);
    let resolve_raw = created_renderbuffer(&control);

    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor::default());
    {
        let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("msaa"),
            color_attachments: &[RenderPassColorAttachment {
                view: &msaa,
                resolve_target: Some(&resolve),
                ops: Operations {
                    load: LoadOp::Clear(Color::BLACK),
                    store: StoreOp::Discard,
                },
            }],
            depth_stencil_attachment: None,
        });
        pass.set_pipeline(&pipeline);
        pass.draw(3, 1, 0, 0);
        pass.end_pass();
    }
    valid(&device, || device.queue().submit(Some(encoder.finish())));

    let calls = control.take_calls();
    let position = |expected: &Call| calls.iter().position(|c| c == expected).unwrap();
    let bind_msaa = position(&Call::FramebufferRenderbuffer {
        target: glow::DRAW_FRAMEBUFFER,
        attachment: glow::COLOR_ATTACHMENT0,
        renderbuffer: Some(msaa_raw),
    });
    let read = position(&Call::ReadBuffer(glow::COLOR_ATTACHMENT0));
    let bind_resolve = position(&Call::FramebufferRenderbuffer {
        target: glow::DRAW_FRAMEBUFFER,
        attachment: glow::COLOR_ATTACHMENT0,
        renderbuffer: Some(resolve_raw),
    });
    let blit = position(&Call::BlitFramebuffer {
        src: [0, 0, 64, 64],
        dst: [0, 0, 64, 64],
        mask: glow::COLOR_BUFFER_BIT,
        filter: glow::NEAREST,
    });
    assert!(bind_msaa < read && read < bind_resolve && bind_resolve < blit);
    assert_eq!(
        calls
            .iter()
            .filter(|c| matches!(c, Call::CreateFramebuffer(_)))
            .count(),
        2
    );
}

#[test]
fn texture_and_sampler_share_a_unit() {
    let TestingContext { device, control } = initialize_test();
    let target = render_target(&device, false);
    let group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: None,
        entries: &[
            BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStages::FRAGMENT,
                ty: BindingType::Texture {
                    sample_type: TextureSampleType::Float { filterable: true },
                    view_dimension: TextureViewDimension::D2,
                    multisampled: false,
                },
            },
            BindGroupLayoutEntry {
                binding: 1,
                visibility: ShaderStages::FRAGMENT,
                ty: BindingType::Sampler(SamplerBindingType::Filtering),
            },
        ],
    });
    let layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: None,
        bind_group_layouts: &[&group_layout],
    });
    let vertex = shader(&device, ShaderStage::Vertex, VERTEX_SHADER);
    let fragment = shader(&device, ShaderStage::Fragment, SAMPLING_FRAGMENT_SHADER);
    let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some("sampling"),
        layout: &layout,
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
            targets: &[target_state()],
        }),
    });
    control.take_calls();

    let texture = attachment_view(
        &device,
        TextureFormat::Rgba8Unorm,
        1,
        TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
    );
    let texture_raw = created(&control, |call| match call {
        Call::CreateTexture(raw) => Some(raw),
        _ => None,
    });
    let sampler = device.create_sampler(&SamplerDescriptor::default());
    let sampler_raw = created(&control, |call| match call {
        Call::CreateSampler(raw) => Some(raw),
        _ => None,
    });
    let group = device.create_bind_group(&BindGroupDescriptor {
        label: None,
        layout: &group_layout,
        entries: &[
            BindGroupEntry {
                binding: 0,
                resource: BindingResource::TextureView(&texture),
            },
            BindGroupEntry {
                binding: 1,
                resource: BindingResource::Sampler(&sampler),
            },
        ],
    });

    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor::default());
    {
        let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: None,
            color_attachments: &[color_attachment(&target, StoreOp::Store)],
            depth_stencil_attachment: None,
        });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &group, &[]);
        pass.draw(3, 1, 0, 0);
        pass.end_pass();
    }
    valid(&device, || device.queue().submit(Some(encoder.finish())));

    let unit = layout.group_offset(0).unwrap();
    let calls = control.calls();
    let active = calls
        .iter()
        .position(|c| *c == Call::ActiveTexture(glow::TEXTURE0 + unit))
        .unwrap();
    assert_eq!(
        calls[active + 1],
        Call::BindTexture {
            target: glow::TEXTURE_2D,
            texture: Some(texture_raw),
        }
    );
    assert!(calls.contains(&Call::BindSampler {
        unit,
        sampler: Some(sampler_raw),
    }));
    assert!(!calls.iter().any(|c| matches!(
        c,
        Call::BindSampler { unit: other, .. } if *other == unit + 1
    )));
}
