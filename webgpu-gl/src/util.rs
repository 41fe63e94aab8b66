//! Utility structures and functions that are built on top of the main API.

use crate::{Buffer, BufferDescriptor, Device, ErrorDelivery, Label};
use std::sync::Arc;
use wgt::{BufferAddress, BufferUsages};

/// Get the uncaptured error delivery from the environment variable
/// WEBGPU_GL_ERROR_DELIVERY.
pub fn error_delivery_from_env() -> Option<ErrorDelivery> {
    parse_error_delivery(std::env::var("WEBGPU_GL_ERROR_DELIVERY").ok()?.as_str())
}

fn parse_error_delivery(value: &str) -> Option<ErrorDelivery> {
    Some(match value.trim().to_lowercase().as_str() {
        "immediate" => ErrorDelivery::Immediate,
        "deferred" => ErrorDelivery::Deferred,
        _ => return None,
    })
}

/// Describes a [`Buffer`] when allocating.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct BufferInitDescriptor<'a> {
    /// Debug label of a buffer. This will show up in graphics debuggers for easy identification.
    pub label: Label<'a>,
    /// Contents of a buffer on creation.
    pub contents: &'a [u8],
    /// Usages of a buffer. If the buffer is used in any way that isn't specified here, the operation
    /// will panic.
    pub usage: BufferUsages,
}

/// Utility methods not meant to be in the main API.
pub trait DeviceExt {
    /// Creates a [`Buffer`] with data to initialize it.
    fn create_buffer_init(&self, desc: &BufferInitDescriptor) -> Arc<Buffer>;
}

impl DeviceExt for Device {
    fn create_buffer_init(&self, descriptor: &BufferInitDescriptor<'_>) -> Arc<Buffer> {
        // Skip mapping if the buffer is zero sized
        if descriptor.contents.is_empty() {
            return self.create_buffer(&BufferDescriptor {
                label: descriptor.label,
                size: 0,
                usage: descriptor.usage,
                mapped_at_creation: false,
            });
        }

        let unpadded_size = descriptor.contents.len() as BufferAddress;
        // buffers created mapped need a size that is a multiple of COPY_BUFFER_ALIGNMENT
        let align_mask = wgt::COPY_BUFFER_ALIGNMENT - 1;
        let padded_size =
            ((unpadded_size + align_mask) & !align_mask).max(wgt::COPY_BUFFER_ALIGNMENT);

        let buffer = self.create_buffer(&BufferDescriptor {
            label: descriptor.label,
            size: padded_size,
            usage: descriptor.usage,
            mapped_at_creation: true,
        });
        // an invalid buffer has nothing mapped, its creation error is already routed
        let mapped = match buffer.get_mapped_range_mut() {
            Ok(mut view) => {
                view[..unpadded_size as usize].copy_from_slice(descriptor.contents);
                true
            }
            Err(_) => false,
        };
        if mapped {
            buffer.unmap();
        }
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_delivery_values() {
        assert_eq!(
            parse_error_delivery("deferred"),
            Some(ErrorDelivery::Deferred)
        );
        assert_eq!(
            parse_error_delivery(" Immediate "),
            Some(ErrorDelivery::Immediate)
        );
        assert_eq!(parse_error_delivery("later"), None);
    }
}
