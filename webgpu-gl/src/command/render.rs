//! Render passes.
//!
//! Pass state is stored as it is set and only turned into commands at the
//! next draw, once per span of unchanged state. Attachment clears and
//! stores are deferred into thunks that run at most once.

use super::{bind::Binder, ClearColor, Command, CommandEncoderError, EncoderData, EncoderStatus, Rect};
use crate::{
    binding_model::BindGroup,
    conv,
    device::DeviceShared,
    error::{DeviceError, ErrorClass},
    label_to_string,
    pipeline::RenderPipeline,
    resource::{Buffer, FormatAspects, ResourceError, TextureView},
    Label,
};
use arrayvec::ArrayVec;
use parking_lot::Mutex;
use std::{fmt, mem, ops::Range, sync::Arc};
use thiserror::Error;
use wgt::{
    BufferAddress, BufferUsages, Color, DynamicOffset, IndexFormat, LoadOp, Operations, StoreOp,
    TextureFormat, TextureUsages,
};

/// A color attachment of a render pass.
#[derive(Clone, Debug)]
pub struct RenderPassColorAttachment<'a> {
    /// The view to render to.
    pub view: &'a Arc<TextureView>,
    /// Single-sampled view the multisampled `view` is resolved to on end.
    pub resolve_target: Option<&'a Arc<TextureView>>,
    pub ops: Operations<Color>,
}

/// The depth-stencil attachment of a render pass.
///
/// An aspect with no operations is read-only: loaded and stored as is.
#[derive(Clone, Debug)]
pub struct RenderPassDepthStencilAttachment<'a> {
    pub view: &'a Arc<TextureView>,
    pub depth_ops: Option<Operations<f32>>,
    pub stencil_ops: Option<Operations<u32>>,
}

/// Describes the attachments of a render pass.
#[derive(Clone, Debug, Default)]
pub struct RenderPassDescriptor<'a> {
    pub label: Label<'a>,
    pub color_attachments: &'a [RenderPassColorAttachment<'a>],
    pub depth_stencil_attachment: Option<RenderPassDepthStencilAttachment<'a>>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum PassErrorScope {
    #[error("In a pass parameter")]
    Pass,
    #[error("In a set_pipeline command")]
    SetPipeline,
    #[error("In a set_bind_group command")]
    SetBindGroup,
    #[error("In a set_vertex_buffer command")]
    SetVertexBuffer,
    #[error("In a set_index_buffer command")]
    SetIndexBuffer,
    #[error("In a set_viewport command")]
    SetViewport,
    #[error("In a set_scissor_rect command")]
    SetScissorRect,
    #[error("In a set_blend_constant command")]
    SetBlendConstant,
    #[error("In a set_stencil_reference command")]
    SetStencilReference,
    #[error("In a draw command, indexed:{indexed}")]
    Draw { indexed: bool },
    #[error("In an end_pass command")]
    End,
}

#[derive(Clone, Debug, Error)]
pub enum RenderPassErrorInner {
    #[error(transparent)]
    Encoder(#[from] CommandEncoderError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("A render pass needs at least one color attachment")]
    MissingColorAttachments,
    #[error("Too many color attachments: {given}, limit is {limit}")]
    TooManyColorAttachments { given: usize, limit: u32 },
    #[error("Attachments have differing sizes: {expected:?} is followed by {actual:?}")]
    AttachmentsDimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("Color attachment format {0:?} is not a color format")]
    InvalidColorAttachmentFormat(TextureFormat),
    #[error("Depth-stencil attachment format {0:?} has no depth or stencil aspect")]
    InvalidDepthStencilAttachmentFormat(TextureFormat),
    #[error("Attachment texture is missing the `RENDER_ATTACHMENT` usage flag")]
    MissingRenderAttachmentUsage,
    #[error("Attachment views must cover a single mip level and array layer, not {mip_levels} and {array_layers}")]
    AttachmentNotSingleSubresource { mip_levels: u32, array_layers: u32 },
    #[error("Attachment texture is destroyed")]
    TextureDestroyed,
    #[error("Resolve source must be multisampled")]
    InvalidResolveSourceSampleCount,
    #[error("Resolve target must have a sample count of 1")]
    InvalidResolveTargetSampleCount,
    #[error("Resolve source format {src:?} differs from the target format {dst:?}")]
    ResolveFormatMismatch {
        src: TextureFormat,
        dst: TextureFormat,
    },
    #[error("The pass has already ended")]
    PassEnded,
    #[error("Render pipeline targets are incompatible with the render pass")]
    IncompatiblePipelineTargets,
    #[error("Buffer usage {actual:?} must contain {expected:?}")]
    MissingBufferUsage {
        actual: BufferUsages,
        expected: BufferUsages,
    },
    #[error("Index buffers can't be bound as vertex buffers")]
    VertexBufferIsIndexBuffer,
    #[error("Vertex buffer slot {slot} is out of range, the limit is {max}")]
    VertexSlotOutOfRange { slot: u32, max: u32 },
    #[error("Offset {offset} is beyond the end of the buffer of size {size}")]
    OffsetOutOfBounds {
        offset: BufferAddress,
        size: BufferAddress,
    },
    #[error("Index buffer offset {offset} is not a multiple of the index size {alignment}")]
    UnalignedIndexBufferOffset {
        offset: BufferAddress,
        alignment: BufferAddress,
    },
    #[error("Bind group index {index} is greater than the device's requested `max_bind_group` limit {max}")]
    BindGroupIndexOutOfRange { index: u32, max: u32 },
    #[error("Number of buffer offsets ({actual}) does not match the number of dynamic bindings ({expected})")]
    InvalidDynamicOffsetCount { actual: usize, expected: usize },
    #[error("Dynamic offset {offset} of binding {binding} is not a multiple of {alignment}")]
    UnalignedDynamicOffset {
        binding: u32,
        offset: DynamicOffset,
        alignment: u32,
    },
    #[error("Dynamic offset {offset} of binding {binding} moves the range end to {end}, beyond the buffer size {buffer_size}")]
    DynamicOffsetOutOfBounds {
        binding: u32,
        offset: DynamicOffset,
        end: BufferAddress,
        buffer_size: BufferAddress,
    },
    #[error("Invalid Viewport parameters")]
    InvalidViewport,
    #[error("Invalid ScissorRect parameters")]
    InvalidScissorRect,
    #[error("Render pipeline must be set")]
    MissingPipeline,
    #[error("Vertex buffer {index} must be set")]
    MissingVertexBuffer { index: u32 },
    #[error("Index buffer must be set")]
    MissingIndexBuffer,
    #[error("Bind group {index} expected by the pipeline layout must be set")]
    MissingBindGroup { index: u32 },
    #[error("Current render pipeline has a layout which is incompatible with a currently set bind group, first differing at entry index {index}")]
    IncompatibleBindGroup { index: u32 },
    #[error("Index {last_index} extends beyond limit {index_limit}. Did you bind the correct index buffer?")]
    IndexBeyondLimit { last_index: u64, index_limit: u64 },
    #[error("Support for {0} is not implemented")]
    Unimplemented(&'static str),
}

impl ErrorClass for RenderPassErrorInner {
    fn filter(&self) -> wgt::ErrorFilter {
        match *self {
            Self::Device(ref err) => err.filter(),
            Self::Encoder(ref err) => err.filter(),
            _ => wgt::ErrorFilter::Validation,
        }
    }
}

/// Error encountered when performing a render pass.
#[derive(Clone, Debug, Error)]
#[error("{scope}")]
pub struct RenderPassError {
    pub scope: PassErrorScope,
    #[source]
    pub inner: RenderPassErrorInner,
}

impl ErrorClass for RenderPassError {
    fn filter(&self) -> wgt::ErrorFilter {
        self.inner.filter()
    }
}

/// Attachment work deferred until it is first needed.
///
/// Running a thunk more than once has no further effect.
#[derive(Debug, Default)]
struct Thunk {
    commands: Vec<Command>,
    done: bool,
}

impl Thunk {
    fn new(commands: Vec<Command>) -> Self {
        Self {
            commands,
            done: false,
        }
    }

    fn run(&mut self, out: &mut Vec<Command>) {
        if !mem::replace(&mut self.done, true) {
            out.append(&mut self.commands);
        }
    }
}

bitflags::bitflags! {
    /// Pass state that changed since the last draw.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct Dirty: u8 {
        const PIPELINE = 1 << 0;
        const VERTEX_BUFFERS = 1 << 1;
        const INDEX_BUFFER = 1 << 2;
        const BLEND_CONSTANT = 1 << 3;
        const STENCIL_REFERENCE = 1 << 4;
        const VIEWPORT = 1 << 5;
        const SCISSOR = 1 << 6;
    }
}

#[derive(Debug)]
struct VertexBufferState {
    buffer: Arc<Buffer>,
    offset: BufferAddress,
}

#[derive(Debug)]
struct IndexState {
    buffer: Arc<Buffer>,
    format: IndexFormat,
    offset: BufferAddress,
    size: BufferAddress,
}

#[derive(Debug)]
struct Viewport {
    rect: Rect<f32>,
    depth: Range<f32>,
}

/// Returns `true` for operations that neither read the previous contents
/// nor keep the results.
fn is_transient<V>(ops: Option<&Operations<V>>) -> bool {
    match ops {
        Some(ops) => matches!(ops.load, LoadOp::Clear(_)) && ops.store == StoreOp::Discard,
        None => false,
    }
}

/// Returns `true` if the pass can render straight to the default framebuffer.
fn is_fast_path(desc: &RenderPassDescriptor) -> bool {
    let color = match desc.color_attachments {
        [ref color] => color,
        _ => return false,
    };
    let depth_stencil_transient = match desc.depth_stencil_attachment {
        Some(ref ds) => {
            let aspects = ds.view.aspects;
            (!aspects.contains(FormatAspects::DEPTH) || is_transient(ds.depth_ops.as_ref()))
                && (!aspects.contains(FormatAspects::STENCIL)
                    || is_transient(ds.stencil_ops.as_ref()))
        }
        None => true,
    };
    color.view.texture.is_surface
        && color.resolve_target.is_none()
        && is_transient(Some(&color.ops))
        && depth_stencil_transient
}

/// Checks what every attachment must satisfy, and that all of them have
/// the same size.
fn check_attachment(
    device: &Arc<DeviceShared>,
    view: &TextureView,
    extent: &mut Option<(u32, u32)>,
) -> Result<(), RenderPassErrorInner> {
    view.info.check(device)?;
    let texture = &view.texture;
    if !texture.usage().contains(TextureUsages::RENDER_ATTACHMENT) {
        return Err(RenderPassErrorInner::MissingRenderAttachmentUsage);
    }
    let (mip_levels, array_layers) = (view.mip_levels.len() as u32, view.array_layers.len() as u32);
    if mip_levels != 1 || array_layers != 1 {
        return Err(RenderPassErrorInner::AttachmentNotSingleSubresource {
            mip_levels,
            array_layers,
        });
    }
    if texture.state.lock().destroyed {
        return Err(RenderPassErrorInner::TextureDestroyed);
    }
    let size = view.extent();
    let actual = (size.width, size.height);
    match *extent {
        None => *extent = Some(actual),
        Some(expected) if expected != actual => {
            return Err(RenderPassErrorInner::AttachmentsDimensionMismatch { expected, actual })
        }
        Some(_) => {}
    }
    Ok(())
}

fn depth_stencil_attachment_point(aspects: FormatAspects) -> u32 {
    if aspects.contains(FormatAspects::DEPTH | FormatAspects::STENCIL) {
        glow::DEPTH_STENCIL_ATTACHMENT
    } else if aspects.contains(FormatAspects::DEPTH) {
        glow::DEPTH_ATTACHMENT
    } else {
        glow::STENCIL_ATTACHMENT
    }
}

struct PassState {
    /// Renders to the default framebuffer.
    is_default: bool,
    extent: (u32, u32),
    color_formats: ArrayVec<TextureFormat, { wgt::MAX_COLOR_ATTACHMENTS }>,
    depth_stencil: Option<(TextureFormat, FormatAspects)>,
    loads: Vec<Thunk>,
    stores: Vec<Thunk>,
    pipeline: Option<Arc<RenderPipeline>>,
    vertex_buffers: [Option<VertexBufferState>; wgt::MAX_VERTEX_BUFFERS],
    index: Option<IndexState>,
    binder: Binder,
    blend_constant: Color,
    stencil_reference: u32,
    viewport: Viewport,
    scissor: Option<Rect<u32>>,
    dirty: Dirty,
    commands: Vec<Command>,
}

impl PassState {
    fn new(
        device: &Arc<DeviceShared>,
        desc: &RenderPassDescriptor,
    ) -> Result<Self, RenderPassErrorInner> {
        let limit = device.limits.max_color_attachments;
        if desc.color_attachments.is_empty() {
            return Err(RenderPassErrorInner::MissingColorAttachments);
        }
        if desc.color_attachments.len() > limit as usize {
            return Err(RenderPassErrorInner::TooManyColorAttachments {
                given: desc.color_attachments.len(),
                limit,
            });
        }

        let mut extent = None;
        for color in desc.color_attachments {
            check_attachment(device, color.view, &mut extent)?;
            if color.view.aspects != FormatAspects::COLOR {
                return Err(RenderPassErrorInner::InvalidColorAttachmentFormat(
                    color.view.format,
                ));
            }
            if let Some(resolve) = color.resolve_target {
                check_attachment(device, resolve, &mut extent)?;
                if color.view.texture.sample_count() == 1 {
                    return Err(RenderPassErrorInner::InvalidResolveSourceSampleCount);
                }
                if resolve.texture.sample_count() != 1 {
                    return Err(RenderPassErrorInner::InvalidResolveTargetSampleCount);
                }
                if resolve.format != color.view.format {
                    return Err(RenderPassErrorInner::ResolveFormatMismatch {
                        src: color.view.format,
                        dst: resolve.format,
                    });
                }
            }
        }
        if let Some(ref ds) = desc.depth_stencil_attachment {
            check_attachment(device, ds.view, &mut extent)?;
            if !ds
                .view
                .aspects
                .intersects(FormatAspects::DEPTH | FormatAspects::STENCIL)
            {
                return Err(RenderPassErrorInner::InvalidDepthStencilAttachmentFormat(
                    ds.view.format,
                ));
            }
        }
        let extent = extent.unwrap_or_default();

        let is_default = is_fast_path(desc);
        let mut commands = vec![Command::ResetFramebuffer { is_default }];
        let mut draw_buffers = ArrayVec::<u32, { wgt::MAX_COLOR_ATTACHMENTS }>::new();
        let mut loads = Vec::new();
        let mut stores = Vec::new();
        let size = wgt::Extent3d {
            width: extent.0,
            height: extent.1,
            depth_or_array_layers: 1,
        };

        for (index, color) in desc.color_attachments.iter().enumerate() {
            let attachment = glow::COLOR_ATTACHMENT0 + index as u32;
            if is_default {
                draw_buffers.push(glow::BACK);
            } else {
                commands.push(Command::BindAttachment {
                    attachment,
                    view: Arc::clone(color.view),
                });
                draw_buffers.push(attachment);
            }

            let load = match color.ops.load {
                LoadOp::Clear(value) => vec![Command::ClearColor {
                    draw_buffer: index as u32,
                    value: ClearColor::new(color.view.format, value),
                }],
                LoadOp::Load => Vec::new(),
            };
            loads.push(Thunk::new(load));

            let store = if let Some(resolve) = color.resolve_target {
                vec![Command::ResolveAttachment {
                    attachment,
                    dst: if resolve.texture.is_surface {
                        None
                    } else {
                        Some(Arc::clone(resolve))
                    },
                    size,
                }]
            } else if !is_default
                && color.view.texture.is_surface
                && color.ops.store == StoreOp::Store
            {
                vec![Command::ResolveAttachment {
                    attachment,
                    dst: None,
                    size,
                }]
            } else if !is_default && color.ops.store == StoreOp::Discard {
                let mut list = ArrayVec::<u32, 2>::new();
                list.push(attachment);
                vec![Command::InvalidateAttachments(list)]
            } else {
                Vec::new()
            };
            stores.push(Thunk::new(store));
        }

        let depth_stencil = match desc.depth_stencil_attachment {
            Some(ref ds) => {
                let aspects = ds.view.aspects;
                if !is_default {
                    commands.push(Command::BindAttachment {
                        attachment: depth_stencil_attachment_point(aspects),
                        view: Arc::clone(ds.view),
                    });
                }

                let depth_ops = ds.depth_ops.filter(|_| aspects.contains(FormatAspects::DEPTH));
                let stencil_ops = ds
                    .stencil_ops
                    .filter(|_| aspects.contains(FormatAspects::STENCIL));
                let depth_clear = match depth_ops {
                    Some(Operations {
                        load: LoadOp::Clear(value),
                        ..
                    }) => Some(value),
                    _ => None,
                };
                let stencil_clear = match stencil_ops {
                    Some(Operations {
                        load: LoadOp::Clear(value),
                        ..
                    }) => Some(value),
                    _ => None,
                };
                let load = match (depth_clear, stencil_clear) {
                    (Some(depth), Some(stencil)) => {
                        vec![Command::ClearDepthAndStencil(depth, stencil)]
                    }
                    (Some(depth), None) => vec![Command::ClearDepth(depth)],
                    (None, Some(stencil)) => vec![Command::ClearStencil(stencil)],
                    (None, None) => Vec::new(),
                };
                loads.push(Thunk::new(load));

                let mut list = ArrayVec::<u32, 2>::new();
                if matches!(depth_ops, Some(ops) if ops.store == StoreOp::Discard) {
                    list.push(if is_default {
                        glow::DEPTH
                    } else {
                        glow::DEPTH_ATTACHMENT
                    });
                }
                if matches!(stencil_ops, Some(ops) if ops.store == StoreOp::Discard) {
                    list.push(if is_default {
                        glow::STENCIL
                    } else {
                        glow::STENCIL_ATTACHMENT
                    });
                }
                let store = if list.is_empty() {
                    Vec::new()
                } else {
                    vec![Command::InvalidateAttachments(list)]
                };
                stores.push(Thunk::new(store));

                Some((ds.view.format, aspects))
            }
            None => None,
        };

        commands.push(Command::SetDrawColorBuffers(draw_buffers));

        Ok(Self {
            is_default,
            extent,
            color_formats: desc
                .color_attachments
                .iter()
                .map(|color| color.view.format)
                .collect(),
            depth_stencil,
            loads,
            stores,
            pipeline: None,
            vertex_buffers: Default::default(),
            index: None,
            binder: Binder::default(),
            blend_constant: Color::TRANSPARENT,
            stencil_reference: 0,
            viewport: Viewport {
                rect: Rect {
                    x: 0.0,
                    y: 0.0,
                    w: extent.0 as f32,
                    h: extent.1 as f32,
                },
                depth: 0.0..1.0,
            },
            scissor: None,
            // the context keeps the blend color of the previous pass
            dirty: Dirty::VIEWPORT | Dirty::BLEND_CONSTANT,
            commands,
        })
    }

    fn depth_stencil_aspects(&self) -> FormatAspects {
        self.depth_stencil
            .map_or(FormatAspects::empty(), |(_, aspects)| aspects)
    }

    fn set_pipeline(
        &mut self,
        device: &Arc<DeviceShared>,
        pipeline: &Arc<RenderPipeline>,
    ) -> Result<(), RenderPassErrorInner> {
        pipeline.info.check(device)?;

        let target_count = pipeline.color_formats.len().max(self.color_formats.len());
        for index in 0..target_count {
            let expected = pipeline.color_formats.get(index).copied().flatten();
            match (expected, self.color_formats.get(index)) {
                (None, _) => {}
                (Some(expected), Some(&actual)) if expected == actual => {}
                _ => return Err(RenderPassErrorInner::IncompatiblePipelineTargets),
            }
        }
        if let (Some(ref ds), Some((format, _))) = (pipeline.depth_stencil, self.depth_stencil) {
            if ds.format != format {
                return Err(RenderPassErrorInner::IncompatiblePipelineTargets);
            }
        }

        if let Some(ref current) = self.pipeline {
            if Arc::ptr_eq(current, pipeline) {
                return Ok(());
            }
        }
        self.pipeline = Some(Arc::clone(pipeline));
        // vertex and index bindings live in the vertex array of the pipeline
        self.dirty |= Dirty::PIPELINE
            | Dirty::VERTEX_BUFFERS
            | Dirty::INDEX_BUFFER
            | Dirty::STENCIL_REFERENCE;
        self.binder.invalidate();
        Ok(())
    }

    fn set_vertex_buffer(
        &mut self,
        device: &Arc<DeviceShared>,
        slot: u32,
        buffer: &Arc<Buffer>,
        offset: BufferAddress,
    ) -> Result<(), RenderPassErrorInner> {
        let max = device.limits.max_vertex_buffers;
        if slot >= max {
            return Err(RenderPassErrorInner::VertexSlotOutOfRange { slot, max });
        }
        buffer.info.check(device)?;
        if !buffer.usage.contains(BufferUsages::VERTEX) {
            return Err(RenderPassErrorInner::MissingBufferUsage {
                actual: buffer.usage,
                expected: BufferUsages::VERTEX,
            });
        }
        if buffer.is_index() {
            return Err(RenderPassErrorInner::VertexBufferIsIndexBuffer);
        }
        if offset > buffer.size {
            return Err(RenderPassErrorInner::OffsetOutOfBounds {
                offset,
                size: buffer.size,
            });
        }

        let entry = &mut self.vertex_buffers[slot as usize];
        if let Some(ref current) = *entry {
            if Arc::ptr_eq(&current.buffer, buffer) && current.offset == offset {
                return Ok(());
            }
        }
        *entry = Some(VertexBufferState {
            buffer: Arc::clone(buffer),
            offset,
        });
        self.dirty |= Dirty::VERTEX_BUFFERS;
        Ok(())
    }

    fn set_index_buffer(
        &mut self,
        device: &Arc<DeviceShared>,
        buffer: &Arc<Buffer>,
        format: IndexFormat,
        offset: BufferAddress,
    ) -> Result<(), RenderPassErrorInner> {
        buffer.info.check(device)?;
        if !buffer.usage.contains(BufferUsages::INDEX) {
            return Err(RenderPassErrorInner::MissingBufferUsage {
                actual: buffer.usage,
                expected: BufferUsages::INDEX,
            });
        }
        let alignment = format.byte_size() as BufferAddress;
        if offset % alignment != 0 {
            return Err(RenderPassErrorInner::UnalignedIndexBufferOffset { offset, alignment });
        }
        if offset > buffer.size {
            return Err(RenderPassErrorInner::OffsetOutOfBounds {
                offset,
                size: buffer.size,
            });
        }

        let same_buffer = self
            .index
            .as_ref()
            .map_or(false, |index| Arc::ptr_eq(&index.buffer, buffer));
        self.index = Some(IndexState {
            buffer: Arc::clone(buffer),
            format,
            offset,
            size: buffer.size - offset,
        });
        if !same_buffer {
            self.dirty |= Dirty::INDEX_BUFFER;
        }
        Ok(())
    }

    /// Checks that everything the next draw reads is bound.
    fn check_draw(&self, indexed: bool) -> Result<Arc<RenderPipeline>, RenderPassErrorInner> {
        let pipeline = match self.pipeline {
            Some(ref pipeline) => Arc::clone(pipeline),
            None => return Err(RenderPassErrorInner::MissingPipeline),
        };
        for index in 0..pipeline.vertex_buffers.len() {
            if self.vertex_buffers[index].is_none() {
                return Err(RenderPassErrorInner::MissingVertexBuffer {
                    index: index as u32,
                });
            }
        }
        if indexed && self.index.is_none() {
            return Err(RenderPassErrorInner::MissingIndexBuffer);
        }
        self.binder.check_compatible(&pipeline.layout)?;
        Ok(pipeline)
    }

    fn run_loads(&mut self) {
        for load in self.loads.iter_mut() {
            load.run(&mut self.commands);
        }
    }

    /// Emits the commands for every piece of state that changed since the
    /// last draw.
    fn flush(&mut self, pipeline: &Arc<RenderPipeline>) {
        self.run_loads();

        let aspects = self.depth_stencil_aspects();
        let stencil = pipeline
            .depth_stencil
            .as_ref()
            .and_then(|ds| ds.stencil)
            .filter(|_| aspects.contains(FormatAspects::STENCIL));

        if self.dirty.contains(Dirty::PIPELINE) {
            self.flush_pipeline(pipeline, aspects);
        }
        if self.dirty.contains(Dirty::VERTEX_BUFFERS) {
            for (desc, bound) in pipeline.vertex_buffers.iter().zip(self.vertex_buffers.iter()) {
                let bound = match *bound {
                    Some(ref bound) => bound,
                    None => continue,
                };
                for attribute in desc.attributes.iter() {
                    self.commands.push(Command::SetVertexAttribute {
                        buffer: Arc::clone(&bound.buffer),
                        stride: desc.stride,
                        offset: bound.offset,
                        attribute: *attribute,
                    });
                }
            }
        }
        if self.dirty.contains(Dirty::INDEX_BUFFER) {
            if let Some(ref index) = self.index {
                self.commands
                    .push(Command::SetIndexBuffer(Arc::clone(&index.buffer)));
            }
        }
        self.binder.flush(&pipeline.layout, &mut self.commands);
        if self.dirty.contains(Dirty::BLEND_CONSTANT) {
            let Color { r, g, b, a } = self.blend_constant;
            self.commands
                .push(Command::SetBlendConstant([r as f32, g as f32, b as f32, a as f32]));
        }
        if self.dirty.contains(Dirty::STENCIL_REFERENCE) {
            if let Some(stencil) = stencil {
                for (face, side) in [(glow::FRONT, stencil.front), (glow::BACK, stencil.back)] {
                    self.commands.push(Command::SetStencilFunc {
                        face,
                        function: side.function,
                        reference: self.stencil_reference,
                        read_mask: stencil.read_mask,
                    });
                }
            }
        }
        if self.dirty.contains(Dirty::VIEWPORT) {
            self.commands.push(Command::SetViewport {
                rect: self.viewport.rect,
                depth: self.viewport.depth.clone(),
            });
        }
        if self.dirty.contains(Dirty::SCISSOR) {
            if let Some(rect) = self.scissor {
                self.commands.push(Command::SetScissor(rect));
            }
        }
        self.dirty = Dirty::empty();
    }

    fn flush_pipeline(&mut self, pipeline: &Arc<RenderPipeline>, aspects: FormatAspects) {
        let commands = &mut self.commands;
        commands.push(Command::SetProgram(Arc::clone(pipeline)));
        commands.push(Command::SetPrimitive {
            front_face: pipeline.primitive.front_face,
            cull_face: pipeline.primitive.cull_face,
        });
        commands.push(Command::SetColorTarget(pipeline.color_target));

        let (depth, stencil, bias) = match pipeline.depth_stencil {
            Some(ref ds) => (
                ds.depth.filter(|_| aspects.contains(FormatAspects::DEPTH)),
                ds.stencil.filter(|_| aspects.contains(FormatAspects::STENCIL)),
                ds.bias,
            ),
            None => (None, None, wgt::DepthBiasState::default()),
        };
        commands.push(Command::SetDepthBias(bias));
        commands.push(Command::ConfigureDepthStencil {
            depth,
            stencil: stencil.is_some(),
        });
        if let Some(stencil) = stencil {
            for (face, side) in [(glow::FRONT, stencil.front), (glow::BACK, stencil.back)] {
                commands.push(Command::SetStencilOps {
                    face,
                    write_mask: stencil.write_mask,
                    ops: side.ops,
                });
            }
        }

        let draw_buffers: ArrayVec<u32, { wgt::MAX_COLOR_ATTACHMENTS }> = if self.is_default {
            std::iter::once(glow::BACK).collect()
        } else {
            (0..self.color_formats.len())
                .map(|index| match pipeline.color_formats.get(index) {
                    Some(Some(_)) => glow::COLOR_ATTACHMENT0 + index as u32,
                    _ => glow::NONE,
                })
                .collect()
        };
        commands.push(Command::SetDrawColorBuffers(draw_buffers));
    }

    /// Runs the remaining loads, then every store.
    fn finish(mut self) -> Vec<Command> {
        self.run_loads();
        for store in self.stores.iter_mut() {
            store.run(&mut self.commands);
        }
        self.commands
    }
}

impl fmt::Debug for PassState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassState")
            .field("is_default", &self.is_default)
            .field("extent", &self.extent)
            .field("dirty", &self.dirty)
            .field("commands", &self.commands.len())
            .finish()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum PassStatus {
    Open,
    Ended,
    /// Returned by a failed `begin`. Records nothing.
    Inert,
}

/// Bookkeeping shared by passes: the encoder a pass records into, and
/// whether the pass is still open.
struct PassScope {
    device: Arc<DeviceShared>,
    encoder: Arc<Mutex<EncoderData>>,
    label: String,
    status: PassStatus,
}

impl PassScope {
    fn route(&self, scope: PassErrorScope, inner: RenderPassErrorInner, operation: &'static str) {
        self.device
            .handle_error(RenderPassError { scope, inner }, operation, &self.label);
    }

    /// Hands the pass commands to the encoder and lets it record again.
    fn close(&mut self, commands: Vec<Command>) {
        self.status = PassStatus::Ended;
        let mut data = self.encoder.lock();
        data.commands.extend(commands);
        data.status = EncoderStatus::Recording;
        log::debug!("Render pass '{}' ended", self.label);
    }
}

/// Records draws into a render pass.
///
/// The pass ends with [`RenderPassEncoder::end_pass`], or when dropped.
pub struct RenderPassEncoder {
    scope: PassScope,
    state: Option<PassState>,
}

impl fmt::Debug for RenderPassEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderPassEncoder")
            .field("label", &self.scope.label)
            .field("status", &self.scope.status)
            .field("state", &self.state)
            .finish()
    }
}

pub(super) fn begin(
    device: &Arc<DeviceShared>,
    encoder: &Arc<Mutex<EncoderData>>,
    desc: &RenderPassDescriptor,
) -> Result<RenderPassEncoder, RenderPassErrorInner> {
    let mut data = encoder.lock();
    data.check_recording()?;
    let state = PassState::new(device, desc)?;
    data.status = EncoderStatus::InPass;
    drop(data);

    let label = label_to_string(desc.label);
    log::debug!(
        "Render pass '{}' began with {} color attachments, default framebuffer: {}",
        label,
        desc.color_attachments.len(),
        state.is_default
    );
    Ok(RenderPassEncoder {
        scope: PassScope {
            device: Arc::clone(device),
            encoder: Arc::clone(encoder),
            label,
            status: PassStatus::Open,
        },
        state: Some(state),
    })
}

impl RenderPassEncoder {
    pub(super) fn inert(
        device: &Arc<DeviceShared>,
        encoder: &Arc<Mutex<EncoderData>>,
        label: Label,
    ) -> Self {
        Self {
            scope: PassScope {
                device: Arc::clone(device),
                encoder: Arc::clone(encoder),
                label: label_to_string(label),
                status: PassStatus::Inert,
            },
            state: None,
        }
    }

    /// Runs `record` if the pass is open, routing any error.
    fn record<F>(&mut self, scope: PassErrorScope, operation: &'static str, record: F)
    where
        F: FnOnce(&Arc<DeviceShared>, &mut PassState) -> Result<(), RenderPassErrorInner>,
    {
        let state = match self.state {
            Some(ref mut state) if self.scope.status == PassStatus::Open => state,
            _ => {
                log::trace!("Ignoring {} on a closed pass", operation);
                return;
            }
        };
        let device = &self.scope.device;
        let result = device
            .check_alive()
            .map_err(RenderPassErrorInner::from)
            .and_then(|()| record(device, state));
        if let Err(inner) = result {
            self.scope.route(scope, inner, operation);
        }
    }

    pub fn set_pipeline(&mut self, pipeline: &Arc<RenderPipeline>) {
        self.record(
            PassErrorScope::SetPipeline,
            "RenderPassEncoder::set_pipeline",
            |device, state| state.set_pipeline(device, pipeline),
        );
    }

    /// Sets the bind group at `index`. `offsets` holds one entry per dynamic
    /// binding of the group, in binding order.
    pub fn set_bind_group(&mut self, index: u32, group: &Arc<BindGroup>, offsets: &[DynamicOffset]) {
        self.record(
            PassErrorScope::SetBindGroup,
            "RenderPassEncoder::set_bind_group",
            |device, state| state.binder.set_group(device, index, group, offsets),
        );
    }

    pub fn set_vertex_buffer(&mut self, slot: u32, buffer: &Arc<Buffer>, offset: BufferAddress) {
        self.record(
            PassErrorScope::SetVertexBuffer,
            "RenderPassEncoder::set_vertex_buffer",
            |device, state| state.set_vertex_buffer(device, slot, buffer, offset),
        );
    }

    /// Binds consecutive vertex buffer slots, starting at `start_slot`.
    pub fn set_vertex_buffers(&mut self, start_slot: u32, buffers: &[(&Arc<Buffer>, BufferAddress)]) {
        for (slot, &(buffer, offset)) in (start_slot..).zip(buffers) {
            self.set_vertex_buffer(slot, buffer, offset);
        }
    }

    pub fn set_index_buffer(&mut self, buffer: &Arc<Buffer>, format: IndexFormat, offset: BufferAddress) {
        self.record(
            PassErrorScope::SetIndexBuffer,
            "RenderPassEncoder::set_index_buffer",
            |device, state| state.set_index_buffer(device, buffer, format, offset),
        );
    }

    pub fn set_viewport(&mut self, x: f32, y: f32, w: f32, h: f32, min_depth: f32, max_depth: f32) {
        self.record(
            PassErrorScope::SetViewport,
            "RenderPassEncoder::set_viewport",
            |_, state| {
                if w <= 0.0
                    || h <= 0.0
                    || !(0.0..=1.0).contains(&min_depth)
                    || !(0.0..=1.0).contains(&max_depth)
                    || min_depth > max_depth
                {
                    return Err(RenderPassErrorInner::InvalidViewport);
                }
                state.viewport = Viewport {
                    rect: Rect { x, y, w, h },
                    depth: min_depth..max_depth,
                };
                state.dirty |= Dirty::VIEWPORT;
                Ok(())
            },
        );
    }

    pub fn set_scissor_rect(&mut self, x: u32, y: u32, w: u32, h: u32) {
        self.record(
            PassErrorScope::SetScissorRect,
            "RenderPassEncoder::set_scissor_rect",
            |_, state| {
                let (width, height) = state.extent;
                if x.saturating_add(w) > width || y.saturating_add(h) > height {
                    return Err(RenderPassErrorInner::InvalidScissorRect);
                }
                state.scissor = Some(Rect { x, y, w, h });
                state.dirty |= Dirty::SCISSOR;
                Ok(())
            },
        );
    }

    pub fn set_blend_constant(&mut self, color: Color) {
        self.record(
            PassErrorScope::SetBlendConstant,
            "RenderPassEncoder::set_blend_constant",
            |_, state| {
                if state.blend_constant != color {
                    state.blend_constant = color;
                    state.dirty |= Dirty::BLEND_CONSTANT;
                }
                Ok(())
            },
        );
    }

    pub fn set_stencil_reference(&mut self, reference: u32) {
        self.record(
            PassErrorScope::SetStencilReference,
            "RenderPassEncoder::set_stencil_reference",
            |_, state| {
                if state.stencil_reference != reference {
                    state.stencil_reference = reference;
                    state.dirty |= Dirty::STENCIL_REFERENCE;
                }
                Ok(())
            },
        );
    }

    pub fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.record(
            PassErrorScope::Draw { indexed: false },
            "RenderPassEncoder::draw",
            |_, state| {
                if first_instance != 0 {
                    return Err(RenderPassErrorInner::Unimplemented("a non-zero first instance"));
                }
                let pipeline = state.check_draw(false)?;
                state.flush(&pipeline);
                state.commands.push(Command::Draw {
                    topology: pipeline.primitive.topology,
                    first_vertex,
                    vertex_count,
                    instance_count,
                });
                Ok(())
            },
        );
    }

    /// Draws indexed primitives. The indices are read from
    /// `first_index * index size` bytes past the index buffer offset.
    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) {
        self.record(
            PassErrorScope::Draw { indexed: true },
            "RenderPassEncoder::draw_indexed",
            |_, state| {
                if first_instance != 0 {
                    return Err(RenderPassErrorInner::Unimplemented("a non-zero first instance"));
                }
                if base_vertex != 0 {
                    return Err(RenderPassErrorInner::Unimplemented("a non-zero base vertex"));
                }
                let pipeline = state.check_draw(true)?;
                let (index_type, index_offset) = match state.index {
                    Some(ref index) => {
                        let stride = index.format.byte_size() as u64;
                        let index_limit = index.size / stride;
                        let last_index = first_index as u64 + index_count as u64;
                        if last_index > index_limit {
                            return Err(RenderPassErrorInner::IndexBeyondLimit {
                                last_index,
                                index_limit,
                            });
                        }
                        (
                            conv::map_index_format(index.format),
                            index.offset + first_index as u64 * stride,
                        )
                    }
                    None => return Err(RenderPassErrorInner::MissingIndexBuffer),
                };
                state.flush(&pipeline);
                state.commands.push(Command::DrawIndexed {
                    topology: pipeline.primitive.topology,
                    index_type,
                    index_offset,
                    index_count,
                    instance_count,
                });
                Ok(())
            },
        );
    }

    /// Ends the pass: runs the clears no draw triggered, then the stores.
    ///
    /// Ending a pass twice is a validation error.
    pub fn end_pass(&mut self) {
        match self.scope.status {
            PassStatus::Open => self.close(),
            PassStatus::Ended => self.scope.route(
                PassErrorScope::End,
                RenderPassErrorInner::PassEnded,
                "RenderPassEncoder::end_pass",
            ),
            PassStatus::Inert => {}
        }
    }

    fn close(&mut self) {
        let commands = self.state.take().map(PassState::finish).unwrap_or_default();
        self.scope.close(commands);
    }
}

impl Drop for RenderPassEncoder {
    fn drop(&mut self) {
        if self.scope.status == PassStatus::Open {
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{headless::HeadlessContext, Device, DeviceDescriptor, TextureDescriptor};

    fn render_target(device: &Device, surface: bool) -> Arc<TextureView> {
        let desc = TextureDescriptor {
            label: None,
            size: wgt::Extent3d {
                width: 4,
                height: 4,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgt::TextureDimension::D2,
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

    fn ops(store: StoreOp) -> Operations<Color> {
        Operations {
            load: LoadOp::Clear(Color::BLACK),
            store,
        }
    }

    #[test]
    fn thunk_runs_once() {
        let mut thunk = Thunk::new(vec![Command::ClearDepth(1.0), Command::ClearStencil(0)]);
        let mut out = Vec::new();
        thunk.run(&mut out);
        thunk.run(&mut out);
        assert_eq!(out.len(), 2);
        assert!(thunk.done);
    }

    #[test]
    fn fast_path_detection() {
        let device = Device::new(HeadlessContext::new(), &DeviceDescriptor::default()).unwrap();
        let surface = render_target(&device, true);
        let offscreen = render_target(&device, false);

        let attachments = [RenderPassColorAttachment {
            view: &surface,
            resolve_target: None,
            ops: ops(StoreOp::Discard),
        }];
        let mut desc = RenderPassDescriptor {
            label: None,
            color_attachments: &attachments,
            depth_stencil_attachment: None,
        };
        assert!(is_fast_path(&desc));

        let stored = [RenderPassColorAttachment {
            ops: ops(StoreOp::Store),
            ..attachments[0].clone()
        }];
        desc.color_attachments = &stored;
        assert!(!is_fast_path(&desc));

        let loaded = [RenderPassColorAttachment {
            ops: Operations {
                load: LoadOp::Load,
                store: StoreOp::Discard,
            },
            ..attachments[0].clone()
        }];
        desc.color_attachments = &loaded;
        assert!(!is_fast_path(&desc));

        let not_surface = [RenderPassColorAttachment {
            view: &offscreen,
            ..attachments[0].clone()
        }];
        desc.color_attachments = &not_surface;
        assert!(!is_fast_path(&desc));

        let two = [attachments[0].clone(), attachments[0].clone()];
        desc.color_attachments = &two;
        assert!(!is_fast_path(&desc));
    }

    #[test]
    fn transient_ops() {
        assert!(is_transient(Some(&ops(StoreOp::Discard))));
        assert!(!is_transient(Some(&ops(StoreOp::Store))));
        assert!(!is_transient::<f32>(None));
    }
}
