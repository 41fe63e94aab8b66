//! Recording of deferred work.
//!
//! Encoders never touch the context. Every recording call validates its
//! arguments and appends a self-contained [`Command`], holding the resources
//! it uses alive. The queue interprets the list on submission.

mod bind;
mod render;

pub use render::{
    PassErrorScope, RenderPassColorAttachment, RenderPassDepthStencilAttachment,
    RenderPassDescriptor, RenderPassEncoder, RenderPassError, RenderPassErrorInner,
};

use crate::{
    device::DeviceShared,
    error::{device_error_class, DeviceError},
    pipeline::{AttributeDesc, ColorTargetDesc, DepthState, RenderPipeline, StencilOps},
    resource::{Buffer, ResourceError, Sampler, Texture, TextureView},
};
use arrayvec::ArrayVec;
use parking_lot::Mutex;
use std::{fmt, ops::Range, sync::Arc};
use thiserror::Error;
use wgt::{BufferAddress, BufferUsages, TextureUsages};

/// Value a color attachment is cleared with, by format class.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum ClearColor {
    Float([f32; 4]),
    Sint([i32; 4]),
    Uint([u32; 4]),
}

impl ClearColor {
    pub(crate) fn new(format: wgt::TextureFormat, color: wgt::Color) -> Self {
        let wgt::Color { r, g, b, a } = color;
        match format.class() {
            wgt::TextureFormatClass::Sint => Self::Sint([r as i32, g as i32, b as i32, a as i32]),
            wgt::TextureFormatClass::Uint => Self::Uint([r as u32, g as u32, b as u32, a as u32]),
            _ => Self::Float([r as f32, g as f32, b as f32, a as f32]),
        }
    }
}

/// One deferred operation.
#[derive(Clone, Debug)]
pub(crate) enum Command {
    CopyBufferToBuffer {
        src: Arc<Buffer>,
        dst: Arc<Buffer>,
        src_offset: BufferAddress,
        dst_offset: BufferAddress,
        size: BufferAddress,
    },
    CopyBufferToTexture {
        src: Arc<Buffer>,
        dst: Arc<Texture>,
        layout: wgt::ImageDataLayout,
        mip_level: u32,
        origin: wgt::Origin3d,
        size: wgt::Extent3d,
    },
    /// Binds the draw framebuffer of a pass and resets the masks and tests
    /// that affect clears.
    ResetFramebuffer {
        is_default: bool,
    },
    BindAttachment {
        attachment: u32,
        view: Arc<TextureView>,
    },
    SetDrawColorBuffers(ArrayVec<u32, { wgt::MAX_COLOR_ATTACHMENTS }>),
    ClearColor {
        draw_buffer: u32,
        value: ClearColor,
    },
    ClearDepth(f32),
    ClearStencil(u32),
    ClearDepthAndStencil(f32, u32),
    /// Copies a color attachment of the draw framebuffer to `dst`, or to
    /// the default framebuffer if `None`.
    ResolveAttachment {
        attachment: u32,
        dst: Option<Arc<TextureView>>,
        size: wgt::Extent3d,
    },
    /// Hints that the listed attachments of the draw framebuffer can be
    /// dropped.
    InvalidateAttachments(ArrayVec<u32, 2>),
    SetViewport {
        rect: Rect<f32>,
        depth: Range<f32>,
    },
    SetScissor(Rect<u32>),
    /// Binds the program and vertex array of the pipeline.
    SetProgram(Arc<RenderPipeline>),
    SetPrimitive {
        front_face: u32,
        cull_face: u32,
    },
    SetColorTarget(ColorTargetDesc),
    SetDepthBias(wgt::DepthBiasState),
    /// Enables the tests whose state is given, disables the others.
    ConfigureDepthStencil {
        depth: Option<DepthState>,
        stencil: bool,
    },
    SetStencilFunc {
        face: u32,
        function: u32,
        reference: u32,
        read_mask: u32,
    },
    SetStencilOps {
        face: u32,
        write_mask: u32,
        ops: StencilOps,
    },
    SetBlendConstant([f32; 4]),
    SetVertexAttribute {
        buffer: Arc<Buffer>,
        stride: u32,
        /// Offset of the binding, added to the attribute offset.
        offset: BufferAddress,
        attribute: AttributeDesc,
    },
    SetIndexBuffer(Arc<Buffer>),
    BindBuffer {
        slot: u32,
        buffer: Arc<Buffer>,
        offset: BufferAddress,
        size: BufferAddress,
    },
    BindTexture {
        slot: u32,
        view: Arc<TextureView>,
    },
    BindSampler {
        slot: u32,
        sampler: Arc<Sampler>,
    },
    Draw {
        topology: u32,
        first_vertex: u32,
        vertex_count: u32,
        instance_count: u32,
    },
    DrawIndexed {
        topology: u32,
        index_type: u32,
        index_offset: BufferAddress,
        index_count: u32,
        instance_count: u32,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct Rect<T> {
    pub x: T,
    pub y: T,
    pub w: T,
    pub h: T,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum EncoderStatus {
    Recording,
    InPass,
    Finished,
}

/// Recording state shared between an encoder and its open pass.
#[derive(Debug)]
pub(crate) struct EncoderData {
    pub status: EncoderStatus,
    pub commands: Vec<Command>,
}

impl EncoderData {
    pub(crate) fn check_recording(&self) -> Result<(), CommandEncoderError> {
        match self.status {
            EncoderStatus::Recording => Ok(()),
            EncoderStatus::InPass => Err(CommandEncoderError::InPass),
            EncoderStatus::Finished => Err(CommandEncoderError::NotRecording),
        }
    }
}

#[derive(Clone, Debug, Error)]
pub enum CommandEncoderError {
    #[error("Command encoder is invalid")]
    Invalid,
    #[error("Command encoder must be active")]
    NotRecording,
    #[error("A render pass is still open on the command encoder")]
    InPass,
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Side of a copy, for error reporting.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CopySide {
    Source,
    Destination,
}

#[derive(Clone, Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Encoder(#[from] CommandEncoderError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error("Source buffer/texture is missing the `COPY_SRC` usage flag")]
    MissingCopySrcUsageFlag,
    #[error("Destination buffer/texture is missing the `COPY_DST` usage flag")]
    MissingCopyDstUsageFlag,
    #[error("Copy of {start_offset}..{end_offset} would end up overrunning the bounds of the {side:?} buffer of size {buffer_size}")]
    BufferOverrun {
        start_offset: BufferAddress,
        end_offset: BufferAddress,
        buffer_size: BufferAddress,
        side: CopySide,
    },
    #[error("Copy of {dimension} {start_offset}..{end_offset} would end up overrunning the bounds of the {side:?} texture of {dimension} size {texture_size}")]
    TextureOverrun {
        start_offset: u32,
        end_offset: u32,
        texture_size: u32,
        dimension: &'static str,
        side: CopySide,
    },
    #[error("Copy size {0} does not respect `COPY_BUFFER_ALIGNMENT`")]
    UnalignedCopySize(BufferAddress),
    #[error("Copy offset {0} does not respect `COPY_BUFFER_ALIGNMENT`")]
    UnalignedCopyOffset(BufferAddress),
    #[error("Copy bytes per row {0} is not a multiple of `COPY_BYTES_PER_ROW_ALIGNMENT`")]
    UnalignedBytesPerRow(u32),
    #[error("Number of bytes per row needs to be specified since more than one row is copied")]
    UnspecifiedBytesPerRow,
    #[error("Number of rows per image needs to be specified since more than one image is copied")]
    UnspecifiedRowsPerImage,
    #[error("Bytes per row {given} is less than the size of a row, {minimum}")]
    InvalidBytesPerRow { given: u32, minimum: u32 },
    #[error("Rows per image {given} is less than the copy height {minimum}")]
    InvalidRowsPerImage { given: u32, minimum: u32 },
    #[error("Source and destination cannot be the same buffer")]
    SameSourceDestinationBuffer,
    #[error("Destination mip level {level} is out of range, the texture has {total}")]
    InvalidMipLevel { level: u32, total: u32 },
    #[error("Copying to textures with format {0:?} is forbidden")]
    CopyToForbiddenTextureFormat(wgt::TextureFormat),
    #[error("Unable to select texture aspect {aspect:?} from format {format:?}")]
    InvalidTextureAspect {
        format: wgt::TextureFormat,
        aspect: wgt::TextureAspect,
    },
    #[error("Copying into multisampled textures is forbidden")]
    CopyToMultisampledTexture,
}

device_error_class!(CommandEncoderError);

impl crate::error::ErrorClass for TransferError {
    fn filter(&self) -> wgt::ErrorFilter {
        match *self {
            Self::Encoder(ref err) => crate::error::ErrorClass::filter(err),
            _ => wgt::ErrorFilter::Validation,
        }
    }
}

/// A buffer as the source of a texture copy.
#[derive(Clone, Debug)]
pub struct ImageCopyBuffer<'a> {
    pub buffer: &'a Arc<Buffer>,
    pub layout: wgt::ImageDataLayout,
}

/// A region of a texture as the destination of a copy.
#[derive(Clone, Debug)]
pub struct ImageCopyTexture<'a> {
    pub texture: &'a Arc<Texture>,
    pub mip_level: u32,
    /// Origin of the copy, in texels. `z` is the first array layer of 2D
    /// textures.
    pub origin: wgt::Origin3d,
    pub aspect: wgt::TextureAspect,
}

/// Records copies and render passes into a [`CommandBuffer`].
///
/// Recording errors are routed through the device as they happen and the
/// failing call records nothing, so the rest of the sequence stays usable.
pub struct CommandEncoder {
    device: Arc<DeviceShared>,
    label: String,
    /// `false` for placeholders created on a lost device.
    valid: bool,
    data: Arc<Mutex<EncoderData>>,
}

impl fmt::Debug for CommandEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandEncoder")
            .field("label", &self.label)
            .field("valid", &self.valid)
            .field("status", &self.data.lock().status)
            .finish()
    }
}

impl CommandEncoder {
    pub(crate) fn new(device: &Arc<DeviceShared>, label: String, valid: bool) -> Self {
        Self {
            device: Arc::clone(device),
            label,
            valid,
            data: Arc::new(Mutex::new(EncoderData {
                status: EncoderStatus::Recording,
                commands: Vec::new(),
            })),
        }
    }

    fn check_valid(&self) -> Result<(), CommandEncoderError> {
        if !self.valid {
            return Err(CommandEncoderError::Invalid);
        }
        self.device.check_alive()?;
        Ok(())
    }

    /// Runs `record` against the command list if the encoder is recording,
    /// routing any error.
    fn record<E, F>(&mut self, operation: &'static str, record: F)
    where
        E: crate::error::ErrorClass + From<CommandEncoderError>,
        F: FnOnce(&Arc<DeviceShared>, &mut Vec<Command>) -> Result<(), E>,
    {
        let result = self.check_valid().map_err(E::from).and_then(|()| {
            let mut data = self.data.lock();
            data.check_recording()?;
            record(&self.device, &mut data.commands)
        });
        if let Err(err) = result {
            self.device.handle_error(err, operation, &self.label);
        }
    }

    /// Copies `size` bytes between two buffers.
    pub fn copy_buffer_to_buffer(
        &mut self,
        source: &Arc<Buffer>,
        source_offset: BufferAddress,
        destination: &Arc<Buffer>,
        destination_offset: BufferAddress,
        size: BufferAddress,
    ) {
        self.record(
            "CommandEncoder::copy_buffer_to_buffer",
            |device, commands| -> Result<(), TransferError> {
                source.info.check(device)?;
                destination.info.check(device)?;
                if Arc::ptr_eq(source, destination) {
                    return Err(TransferError::SameSourceDestinationBuffer);
                }
                if !source.usage.contains(BufferUsages::COPY_SRC) {
                    return Err(TransferError::MissingCopySrcUsageFlag);
                }
                if !destination.usage.contains(BufferUsages::COPY_DST) {
                    return Err(TransferError::MissingCopyDstUsageFlag);
                }
                if size % wgt::COPY_BUFFER_ALIGNMENT != 0 {
                    return Err(TransferError::UnalignedCopySize(size));
                }
                for offset in [source_offset, destination_offset] {
                    if offset % wgt::COPY_BUFFER_ALIGNMENT != 0 {
                        return Err(TransferError::UnalignedCopyOffset(offset));
                    }
                }
                for (buffer, offset, side) in [
                    (source, source_offset, CopySide::Source),
                    (destination, destination_offset, CopySide::Destination),
                ] {
                    let end_offset = offset.saturating_add(size);
                    if end_offset > buffer.size {
                        return Err(TransferError::BufferOverrun {
                            start_offset: offset,
                            end_offset,
                            buffer_size: buffer.size,
                            side,
                        });
                    }
                }
                if size == 0 {
                    log::trace!("Ignoring zero sized copy");
                    return Ok(());
                }
                commands.push(Command::CopyBufferToBuffer {
                    src: Arc::clone(source),
                    dst: Arc::clone(destination),
                    src_offset: source_offset,
                    dst_offset: destination_offset,
                    size,
                });
                Ok(())
            },
        );
    }

    /// Copies texels from a buffer into a texture.
    pub fn copy_buffer_to_texture(
        &mut self,
        source: &ImageCopyBuffer,
        destination: &ImageCopyTexture,
        copy_size: wgt::Extent3d,
    ) {
        self.record(
            "CommandEncoder::copy_buffer_to_texture",
            |device, commands| -> Result<(), TransferError> {
                let buffer = source.buffer;
                let texture = destination.texture;
                buffer.info.check(device)?;
                texture.info.check(device)?;
                if !buffer.usage.contains(BufferUsages::COPY_SRC) {
                    return Err(TransferError::MissingCopySrcUsageFlag);
                }
                if !texture.usage().contains(TextureUsages::COPY_DST) {
                    return Err(TransferError::MissingCopyDstUsageFlag);
                }
                let format = texture.format();
                if format.is_depth_stencil_format() {
                    return Err(TransferError::CopyToForbiddenTextureFormat(format));
                }
                if destination.aspect != wgt::TextureAspect::All {
                    return Err(TransferError::InvalidTextureAspect {
                        format,
                        aspect: destination.aspect,
                    });
                }
                if texture.sample_count() > 1 {
                    return Err(TransferError::CopyToMultisampledTexture);
                }
                if destination.mip_level >= texture.mip_level_count() {
                    return Err(TransferError::InvalidMipLevel {
                        level: destination.mip_level,
                        total: texture.mip_level_count(),
                    });
                }

                let mip_size = texture
                    .desc
                    .size
                    .mip_level_size(destination.mip_level, texture.dimension());
                let origin = destination.origin;
                for (start_offset, extent, texture_size, dimension) in [
                    (origin.x, copy_size.width, mip_size.width, "X"),
                    (origin.y, copy_size.height, mip_size.height, "Y"),
                    (
                        origin.z,
                        copy_size.depth_or_array_layers,
                        mip_size.depth_or_array_layers,
                        "Z",
                    ),
                ] {
                    let end_offset = start_offset.saturating_add(extent);
                    if end_offset > texture_size {
                        return Err(TransferError::TextureOverrun {
                            start_offset,
                            end_offset,
                            texture_size,
                            dimension,
                            side: CopySide::Destination,
                        });
                    }
                }

                let layout = source.layout;
                let row_size = copy_size.width * format.block_size();
                let multiple_rows = copy_size.height > 1 || copy_size.depth_or_array_layers > 1;
                let bytes_per_row = match layout.bytes_per_row {
                    Some(bytes_per_row) => {
                        if multiple_rows && bytes_per_row % wgt::COPY_BYTES_PER_ROW_ALIGNMENT != 0
                        {
                            return Err(TransferError::UnalignedBytesPerRow(bytes_per_row));
                        }
                        if bytes_per_row < row_size {
                            return Err(TransferError::InvalidBytesPerRow {
                                given: bytes_per_row,
                                minimum: row_size,
                            });
                        }
                        bytes_per_row
                    }
                    None if multiple_rows => return Err(TransferError::UnspecifiedBytesPerRow),
                    None => row_size,
                };
                let rows_per_image = match layout.rows_per_image {
                    Some(rows) => {
                        if rows < copy_size.height {
                            return Err(TransferError::InvalidRowsPerImage {
                                given: rows,
                                minimum: copy_size.height,
                            });
                        }
                        rows
                    }
                    None if copy_size.depth_or_array_layers > 1 => {
                        return Err(TransferError::UnspecifiedRowsPerImage)
                    }
                    None => copy_size.height,
                };

                let image_size = bytes_per_row as BufferAddress * rows_per_image as BufferAddress;
                let required = if copy_size.width == 0
                    || copy_size.height == 0
                    || copy_size.depth_or_array_layers == 0
                {
                    0
                } else {
                    image_size * (copy_size.depth_or_array_layers as BufferAddress - 1)
                        + bytes_per_row as BufferAddress * (copy_size.height as BufferAddress - 1)
                        + row_size as BufferAddress
                };
                let end_offset = layout.offset.saturating_add(required);
                if end_offset > buffer.size {
                    return Err(TransferError::BufferOverrun {
                        start_offset: layout.offset,
                        end_offset,
                        buffer_size: buffer.size,
                        side: CopySide::Source,
                    });
                }
                if required == 0 {
                    log::trace!("Ignoring empty texture copy");
                    return Ok(());
                }

                commands.push(Command::CopyBufferToTexture {
                    src: Arc::clone(buffer),
                    dst: Arc::clone(texture),
                    layout: wgt::ImageDataLayout {
                        offset: layout.offset,
                        bytes_per_row: Some(bytes_per_row),
                        rows_per_image: Some(rows_per_image),
                    },
                    mip_level: destination.mip_level,
                    origin,
                    size: copy_size,
                });
                Ok(())
            },
        );
    }

    /// Begins a render pass.
    ///
    /// Fails validation if a pass is already open on the encoder, or if the
    /// encoder is finished. A failed pass is inert: its calls record nothing.
    pub fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) -> RenderPassEncoder {
        let result = self
            .check_valid()
            .map_err(RenderPassErrorInner::from)
            .and_then(|()| render::begin(&self.device, &self.data, desc));
        match result {
            Ok(pass) => pass,
            Err(inner) => {
                let err = RenderPassError {
                    scope: PassErrorScope::Pass,
                    inner,
                };
                self.device.handle_error(
                    err,
                    "CommandEncoder::begin_render_pass",
                    desc.label.unwrap_or_default(),
                );
                RenderPassEncoder::inert(&self.device, &self.data, desc.label)
            }
        }
    }

    /// Ends recording.
    ///
    /// Finishing with a pass still open, or a second time, fails validation
    /// and returns an invalid command buffer.
    pub fn finish(&mut self) -> CommandBuffer {
        let result = self.check_valid().and_then(|()| {
            let mut data = self.data.lock();
            data.check_recording()?;
            data.status = EncoderStatus::Finished;
            Ok(std::mem::take(&mut data.commands))
        });
        match result {
            Ok(commands) => CommandBuffer {
                device: Arc::clone(&self.device),
                label: self.label.clone(),
                valid: true,
                commands,
            },
            Err(err) => {
                self.device
                    .handle_error(err, "CommandEncoder::finish", &self.label);
                CommandBuffer {
                    device: Arc::clone(&self.device),
                    label: self.label.clone(),
                    valid: false,
                    commands: Vec::new(),
                }
            }
        }
    }
}

/// A finished, immutable list of commands.
pub struct CommandBuffer {
    pub(crate) device: Arc<DeviceShared>,
    pub(crate) label: String,
    pub(crate) valid: bool,
    pub(crate) commands: Vec<Command>,
}

impl fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("label", &self.label)
            .field("valid", &self.valid)
            .field("commands", &self.commands.len())
            .finish()
    }
}

impl CommandBuffer {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}
