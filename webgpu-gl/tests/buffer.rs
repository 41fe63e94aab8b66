use crate::common::{fail, initialize_test, valid, TestingContext};
use pollster::block_on;
use webgpu_gl::{
    headless::Call,
    util::{BufferInitDescriptor, DeviceExt},
    *,
};

const DATA: [u8; 16] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];

#[test]
fn write_copy_read_round_trip() {
    let TestingContext { device, .. } = initialize_test();
    let upload = device.create_buffer(&BufferDescriptor {
        label: Some("upload"),
        size: 16,
        usage: BufferUsages::MAP_WRITE | BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    });
    let readback = device.create_buffer(&BufferDescriptor {
        label: Some("readback"),
        size: 16,
        usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    block_on(upload.map_write_async()).unwrap();
    upload.get_mapped_range_mut().unwrap().copy_from_slice(&DATA);
    upload.unmap();

    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor::default());
    encoder.copy_buffer_to_buffer(&upload, 0, &readback, 0, 16);
    valid(&device, || device.queue().submit(Some(encoder.finish())));

    let mapping = readback.map_read_async();
    assert!(!mapping.is_ready());
    device.poll();
    assert!(mapping.is_ready());
    block_on(mapping).unwrap();
    assert_eq!(&*readback.get_mapped_range().unwrap(), &DATA[..]);
    readback.unmap();
}

#[test]
fn mapped_at_creation_defers_storage() {
    let TestingContext { device, control } = initialize_test();
    control.take_calls();
    let buffer = device.create_buffer(&BufferDescriptor {
        label: Some("vertices"),
        size: 16,
        usage: BufferUsages::VERTEX,
        mapped_at_creation: true,
    });
    assert_eq!(buffer.as_raw(), None);
    assert_eq!(control.count(|c| matches!(c, Call::BufferDataSize { .. })), 0);

    buffer.get_mapped_range_mut().unwrap().copy_from_slice(&DATA);
    buffer.unmap();

    let raw = buffer.as_raw().unwrap();
    assert_eq!(control.count(|c| matches!(c, Call::BufferDataSize { .. })), 1);
    assert_eq!(control.buffer_contents(raw), Some(DATA.to_vec()));
}

#[test]
fn init_pads_to_copy_alignment() {
    let TestingContext { device, control } = initialize_test();
    let buffer = device.create_buffer_init(&BufferInitDescriptor {
        label: Some("init"),
        contents: &[1, 2, 3, 4, 5, 6],
        usage: BufferUsages::VERTEX,
    });
    assert_eq!(buffer.size(), 8);
    let contents = control.buffer_contents(buffer.as_raw().unwrap()).unwrap();
    assert_eq!(contents, vec![1, 2, 3, 4, 5, 6, 0, 0]);

    let empty = valid(&device, || {
        device.create_buffer_init(&BufferInitDescriptor {
            label: None,
            contents: &[],
            usage: BufferUsages::VERTEX,
        })
    });
    assert_eq!(empty.size(), 0);
}

#[test]
fn mapping_requires_usage() {
    let TestingContext { device, .. } = initialize_test();
    let buffer = device.create_buffer(&BufferDescriptor {
        label: None,
        size: 16,
        usage: BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let result = fail(&device, || block_on(buffer.map_write_async()));
    assert_eq!(result, Err(BufferAsyncError::Validation));
    let result = fail(&device, || block_on(buffer.map_read_async()));
    assert_eq!(result, Err(BufferAsyncError::Validation));
    fail(&device, || buffer.unmap());
    assert!(buffer.get_mapped_range().is_err());
}

#[test]
fn invalid_usage_combinations() {
    let TestingContext { device, .. } = initialize_test();
    let create = |usage, mapped_at_creation, size| {
        device.create_buffer(&BufferDescriptor {
            label: None,
            size,
            usage,
            mapped_at_creation,
        })
    };
    fail(&device, || create(BufferUsages::empty(), false, 16));
    fail(&device, || {
        create(BufferUsages::MAP_READ | BufferUsages::MAP_WRITE, false, 16)
    });
    fail(&device, || {
        create(BufferUsages::MAP_WRITE | BufferUsages::VERTEX, false, 16)
    });
    fail(&device, || create(BufferUsages::VERTEX, true, 6));
    let buffer = valid(&device, || {
        create(BufferUsages::MAP_READ | BufferUsages::COPY_DST, false, 16)
    });
    // a second map request fails while the first is pending
    let pending = buffer.map_read_async();
    let result = fail(&device, || block_on(buffer.map_read_async()));
    assert_eq!(result, Err(BufferAsyncError::Validation));
    device.poll();
    assert_eq!(block_on(pending), Ok(()));
}

#[test]
fn pending_read_is_aborted() {
    let TestingContext { device, .. } = initialize_test();
    let buffer = device.create_buffer(&BufferDescriptor {
        label: None,
        size: 16,
        usage: BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mapping = buffer.map_read_async();
    valid(&device, || buffer.unmap());
    assert_eq!(block_on(mapping), Err(BufferAsyncError::Aborted));

    let mapping = buffer.map_read_async();
    buffer.destroy();
    assert_eq!(block_on(mapping), Err(BufferAsyncError::Destroyed));
    device.poll();
}

#[test]
fn destroy_ends_write_mapping() {
    let TestingContext { device, control } = initialize_test();
    let buffer = device.create_buffer(&BufferDescriptor {
        label: None,
        size: 16,
        usage: BufferUsages::MAP_WRITE,
        mapped_at_creation: false,
    });
    block_on(buffer.map_write_async()).unwrap();
    buffer.destroy();
    assert!(buffer.get_mapped_range().is_err());
    fail(&device, || buffer.unmap());
    device.poll();
    assert_eq!(control.count(|c| matches!(c, Call::BufferSubData { .. })), 0);
    assert_eq!(control.count(|c| matches!(c, Call::DeleteBuffer(_))), 1);
}

#[test]
fn live_view_fails_instead_of_blocking() {
    let TestingContext { device, control } = initialize_test();
    let buffer = device.create_buffer(&BufferDescriptor {
        label: Some("staging"),
        size: 16,
        usage: BufferUsages::MAP_WRITE | BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    });
    block_on(buffer.map_write_async()).unwrap();

    let mut view = buffer.get_mapped_range_mut().unwrap();
    view.copy_from_slice(&DATA);
    fail(&device, || buffer.unmap());
    fail(&device, || buffer.destroy());
    assert!(matches!(
        buffer.get_mapped_range(),
        Err(BufferAccessError::RangeInUse(1))
    ));
    drop(view);

    valid(&device, || buffer.unmap());
    let raw = buffer.as_raw().unwrap();
    assert_eq!(control.buffer_contents(raw), Some(DATA.to_vec()));
}
