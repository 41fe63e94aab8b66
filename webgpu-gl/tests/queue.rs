use crate::common::{collect_uncaptured, fail, initialize_test, valid, TestingContext};
use std::sync::Arc;
use webgpu_gl::{headless::Call, *};

fn buffer(device: &Device, label: &str, usage: BufferUsages) -> Arc<Buffer> {
    device.create_buffer(&BufferDescriptor {
        label: Some(label),
        size: 16,
        usage,
        mapped_at_creation: false,
    })
}

fn copy(device: &Device, label: &str, src: &Arc<Buffer>, dst: &Arc<Buffer>) -> CommandBuffer {
    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor {
        label: Some(label),
    });
    encoder.copy_buffer_to_buffer(src, 0, dst, 0, 16);
    encoder.finish()
}

#[test]
fn failed_command_buffer_is_isolated() {
    let TestingContext { device, control } = initialize_test();
    let errors = collect_uncaptured(&device);
    let doomed = buffer(&device, "doomed", BufferUsages::COPY_SRC);
    let src = buffer(&device, "src", BufferUsages::COPY_SRC);
    let dst_a = buffer(&device, "a", BufferUsages::COPY_DST);
    let dst_b = buffer(&device, "b", BufferUsages::COPY_DST);

    let first = copy(&device, "first", &doomed, &dst_a);
    let second = copy(&device, "second", &src, &dst_b);
    doomed.destroy();
    device.queue().submit([first, second]);

    let errors = errors.lock();
    assert_eq!(errors.len(), 1);
    let description = errors[0].to_string();
    assert!(description.contains("In Queue::submit, label = 'first'"), "{}", description);
    drop(errors);

    let copies = control.count(|c| matches!(c, Call::CopyBufferSubData { .. }));
    assert_eq!(copies, 1);
}

#[test]
fn submit_rejects_foreign_buffers() {
    let TestingContext { device, .. } = initialize_test();
    let other = initialize_test();
    let src = buffer(&other.device, "src", BufferUsages::COPY_SRC);
    let dst = buffer(&other.device, "dst", BufferUsages::COPY_DST);

    let cmd_buf = valid(&other.device, || copy(&other.device, "foreign", &src, &dst));
    fail(&device, || device.queue().submit(Some(cmd_buf)));

    // copying a foreign buffer fails at recording
    let local = buffer(&device, "local", BufferUsages::COPY_DST);
    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor::default());
    fail(&device, || encoder.copy_buffer_to_buffer(&src, 0, &local, 0, 16));
}

#[test]
fn submit_on_lost_device() {
    let TestingContext { device, control } = initialize_test();
    let src = buffer(&device, "src", BufferUsages::COPY_SRC);
    let dst = buffer(&device, "dst", BufferUsages::COPY_DST);
    let cmd_buf = copy(&device, "late", &src, &dst);

    device.lose();
    control.take_calls();
    device.queue().submit(Some(cmd_buf));
    assert_eq!(control.count(|c| matches!(c, Call::CopyBufferSubData { .. })), 0);
}

#[test]
fn submit_finishes_pending_reads() {
    let TestingContext { device, control } = initialize_test();
    let readback = device.create_buffer(&BufferDescriptor {
        label: None,
        size: 16,
        usage: BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mapping = readback.map_read_async();
    device.queue().submit(std::iter::empty());
    assert!(mapping.is_ready());
    assert_eq!(control.count(|c| matches!(c, Call::Finish)), 1);
    assert_eq!(
        control.count(|c| matches!(c, Call::GetBufferSubData { size: 16, .. })),
        1
    );
}
