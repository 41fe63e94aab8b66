use crate::common::{collect_uncaptured, fail, initialize_test, initialize_test_with, TestingContext};
use pollster::block_on;
use webgpu_gl::{headless::HeadlessContext, *};

fn unmapped_buffer(device: &Device) -> std::sync::Arc<Buffer> {
    device.create_buffer(&BufferDescriptor {
        label: Some("plain"),
        size: 16,
        usage: BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

#[test]
fn request_on_lost_context() {
    let context = HeadlessContext::new();
    context.control().lose_context();
    let result = Device::new(context, &DeviceDescriptor::default());
    assert!(matches!(result, Err(RequestDeviceError::ContextLost)));
}

#[test]
fn limits_beyond_defaults() {
    let result = Device::new(
        HeadlessContext::new(),
        &DeviceDescriptor {
            limits: Limits {
                max_bind_groups: 16,
                ..Limits::default()
            },
            ..DeviceDescriptor::default()
        },
    );
    assert!(matches!(result, Err(RequestDeviceError::LimitsExceeded {
            name: "max_bind_groups",
            ..
        })));
}

#[test]
fn nested_error_scopes() {
    let TestingContext { device, .. } = initialize_test();
    let errors = collect_uncaptured(&device);
    let buffer = unmapped_buffer(&device);

    device.push_error_scope(ErrorFilter::Validation);
    device.push_error_scope(ErrorFilter::OutOfMemory);
    buffer.unmap();
    buffer.unmap();
    assert_eq!(
        block_on(device.pop_error_scope()).err(),
        Some(PopErrorScopeError::NoErrorCaptured)
    );
    let error = block_on(device.pop_error_scope()).unwrap();
    assert_eq!(error.filter(), ErrorFilter::Validation);
    let description = error.to_string();
    assert!(
        description.starts_with("Validation Error\n\nCaused by:\n    In Buffer::unmap, label = 'plain'\n"),
        "{}",
        description
    );
    assert_eq!(
        block_on(device.pop_error_scope()).err(),
        Some(PopErrorScopeError::EmptyStack)
    );

    // only the first error reaches the scope, nothing escapes it
    assert!(errors.lock().is_empty());
    buffer.unmap();
    assert_eq!(errors.lock().len(), 1);
}

#[test]
fn out_of_memory_scope() {
    let TestingContext { device, control } = initialize_test();
    control.set_memory_budget(Some(32));

    device.push_error_scope(ErrorFilter::OutOfMemory);
    let buffer = device.create_buffer(&BufferDescriptor {
        label: Some("large"),
        size: 64,
        usage: BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    });
    let error = block_on(device.pop_error_scope()).unwrap();
    assert!(matches!(error, Error::OutOfMemory { .. }));
    assert_eq!(buffer.as_raw(), None);
    control.set_memory_budget(None);

    // the failed buffer is invalid from then on
    let dst = unmapped_buffer(&device);
    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor::default());
    fail(&device, || encoder.copy_buffer_to_buffer(&buffer, 0, &dst, 0, 16));

    let buffer = device.create_buffer(&BufferDescriptor {
        label: Some("large"),
        size: 64,
        usage: BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    });
    assert!(buffer.as_raw().is_some());
}

#[test]
fn context_loss_loses_device() {
    let TestingContext { device, control } = initialize_test();
    let lost = device.lost();
    assert!(!lost.is_ready());

    control.lose_context();
    assert!(!device.is_lost());
    device.poll();
    assert!(device.is_lost());

    let info = block_on(lost);
    assert_eq!(info.reason, DeviceLostReason::ContextLost);
    // later requests see the same loss
    assert_eq!(block_on(device.lost()), info);
    device.poll();
    device.lose();
    assert_eq!(block_on(device.lost()).reason, DeviceLostReason::ContextLost);

    device.push_error_scope(ErrorFilter::Validation);
    assert_eq!(
        block_on(device.pop_error_scope()).err(),
        Some(PopErrorScopeError::DeviceLost)
    );
}

#[test]
fn lost_device_fails_pending_reads() {
    let TestingContext { device, .. } = initialize_test();
    let buffer = device.create_buffer(&BufferDescriptor {
        label: None,
        size: 16,
        usage: BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mapping = buffer.map_read_async();
    device.lose();
    assert_eq!(block_on(mapping), Err(BufferAsyncError::DeviceLost));
    assert_eq!(block_on(device.lost()).reason, DeviceLostReason::Destroyed);
    assert_eq!(
        block_on(buffer.map_read_async()),
        Err(BufferAsyncError::Validation)
    );
}

#[test]
fn deferred_errors_wait_for_poll() {
    let TestingContext { device, .. } = initialize_test_with(&DeviceDescriptor {
        error_delivery: ErrorDelivery::Deferred,
        ..DeviceDescriptor::default()
    });
    let errors = collect_uncaptured(&device);
    let buffer = unmapped_buffer(&device);

    buffer.unmap();
    buffer.unmap();
    assert!(errors.lock().is_empty());
    device.poll();
    assert_eq!(errors.lock().len(), 2);
    device.poll();
    assert_eq!(errors.lock().len(), 2);

    // scopes still capture right away
    fail(&device, || buffer.unmap());
    assert_eq!(errors.lock().len(), 2);
}
