use crate::common::{color_attachment, fail, initialize_test, render_target, valid, TestingContext};
use std::sync::Arc;
use webgpu_gl::{headless::Call, *};

fn copy_buffer(device: &Device, usage: BufferUsages) -> Arc<Buffer> {
    device.create_buffer(&BufferDescriptor {
        label: None,
        size: 256,
        usage,
        mapped_at_creation: false,
    })
}

#[test]
fn drop_encoder() {
    let TestingContext { device, .. } = initialize_test();
    let encoder = device.create_command_encoder(&CommandEncoderDescriptor::default());
    drop(encoder);
}

#[test]
fn begin_pass_while_in_pass() {
    let TestingContext { device, control } = initialize_test();
    let target = render_target(&device, false);
    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor::default());

    let mut first = encoder.begin_render_pass(&RenderPassDescriptor {
        label: Some("first"),
        color_attachments: &[color_attachment(&target, StoreOp::Store)],
        depth_stencil_attachment: None,
    });
    let mut second = fail(&device, || {
        encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("second"),
            color_attachments: &[color_attachment(&target, StoreOp::Store)],
            depth_stencil_attachment: None,
        })
    });
    // the failed pass is inert
    valid(&device, || second.end_pass());
    first.end_pass();

    let cmd_buf = valid(&device, || encoder.finish());
    assert!(cmd_buf.is_valid());
    device.queue().submit(Some(cmd_buf));
    assert_eq!(control.count(|c| matches!(c, Call::ClearBufferF32 { .. })), 1);
}

#[test]
fn finish_states() {
    let TestingContext { device, .. } = initialize_test();
    let target = render_target(&device, false);
    let src = copy_buffer(&device, BufferUsages::COPY_SRC);
    let dst = copy_buffer(&device, BufferUsages::COPY_DST);

    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor::default());
    let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
        label: None,
        color_attachments: &[color_attachment(&target, StoreOp::Store)],
        depth_stencil_attachment: None,
    });
    fail(&device, || encoder.copy_buffer_to_buffer(&src, 0, &dst, 0, 16));
    let cmd_buf = fail(&device, || encoder.finish());
    assert!(!cmd_buf.is_valid());
    pass.end_pass();

    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor::default());
    let cmd_buf = valid(&device, || encoder.finish());
    assert!(cmd_buf.is_valid());
    let cmd_buf = fail(&device, || encoder.finish());
    assert!(!cmd_buf.is_valid());
    fail(&device, || encoder.copy_buffer_to_buffer(&src, 0, &dst, 0, 16));
    fail(&device, || device.queue().submit(Some(cmd_buf)));

    let mut pass = fail(&device, || {
        encoder.begin_render_pass(&RenderPassDescriptor {
            label: None,
            color_attachments: &[color_attachment(&target, StoreOp::Store)],
            depth_stencil_attachment: None,
        })
    });
    valid(&device, || pass.end_pass());
}

#[test]
fn buffer_copy_validation() {
    let TestingContext { device, .. } = initialize_test();
    let src = copy_buffer(&device, BufferUsages::COPY_SRC);
    let dst = copy_buffer(&device, BufferUsages::COPY_DST);
    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor::default());

    fail(&device, || encoder.copy_buffer_to_buffer(&dst, 0, &src, 0, 16));
    fail(&device, || encoder.copy_buffer_to_buffer(&src, 0, &src, 16, 16));
    fail(&device, || encoder.copy_buffer_to_buffer(&src, 0, &dst, 0, 6));
    fail(&device, || encoder.copy_buffer_to_buffer(&src, 2, &dst, 0, 16));
    fail(&device, || encoder.copy_buffer_to_buffer(&src, 0, &dst, 248, 16));
    valid(&device, || encoder.copy_buffer_to_buffer(&src, 0, &dst, 240, 16));
    // a failed copy leaves the encoder usable
    let cmd_buf = valid(&device, || encoder.finish());
    valid(&device, || device.queue().submit(Some(cmd_buf)));
}

#[test]
fn copy_into_cube_faces() {
    let TestingContext { device, control } = initialize_test();
    let buffer = device.create_buffer(&BufferDescriptor {
        label: Some("texels"),
        size: 8192,
        usage: BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    });
    let texture = device.create_texture(&TextureDescriptor {
        label: Some("cube"),
        size: Extent3d {
            width: 4,
            height: 4,
            depth_or_array_layers: 6,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format: TextureFormat::Rgba8Unorm,
        usage: TextureUsages::COPY_DST | TextureUsages::TEXTURE_BINDING,
    });
    control.take_calls();

    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor::default());
    let source = ImageCopyBuffer {
        buffer: &buffer,
        layout: ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(256),
            rows_per_image: Some(4),
        },
    };
    let destination = ImageCopyTexture {
        texture: &texture,
        mip_level: 0,
        origin: Origin3d::ZERO,
        aspect: TextureAspect::All,
    };
    valid(&device, || {
        encoder.copy_buffer_to_texture(&source, &destination, texture.size())
    });
    device.queue().submit(Some(encoder.finish()));

    let uploads: Vec<_> = control
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::TexSubImage { target, offset, .. } => Some((target, offset)),
            _ => None,
        })
        .collect();
    let expected: Vec<_> = (0..6)
        .map(|face| (glow::TEXTURE_CUBE_MAP_POSITIVE_X + face, face * 1024))
        .collect();
    assert_eq!(uploads, expected);
}
