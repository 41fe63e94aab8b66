/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

/*! An explicit, descriptor-driven GPU API executed on a bind-then-operate
 *  GL context (WebGL2 / OpenGL ES 3.0 class).
 *
 *  - Recording never touches the context. Encoders append self-contained
 *    commands, and the queue interprets them on submission.
 *  - Render passes materialize state lazily, at most once per span of
 *    unchanged state, and perform attachment loads and stores on demand.
 *  - Bind groups are resolved into the flat binding space of the context,
 *    which shaders address through a `_group<G>_binding<B>` name prefix.
 *  - Buffer mapping is emulated with shadow memory behind the asynchronous
 *    map/unmap contract.
 *  - Failed calls never unwind. Their errors go through error scopes, or
 *    to the uncaptured error handler.
 */

#![allow(
    // We don't use syntax sugar where it's not necessary.
    clippy::match_like_matches_macro,
    // Redundant matching is more explicit.
    clippy::redundant_pattern_matching,
    // The context seam mirrors GL entry points one to one.
    clippy::too_many_arguments,
    // Explicit lifetimes are often easier to reason about.
    clippy::needless_lifetimes,
)]
#![warn(
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_qualifications
)]

mod binding_model;
mod command;
pub mod context;
mod conv;
mod device;
mod error;
mod future;
#[cfg(feature = "gl-context")]
pub mod gl;
pub mod headless;
mod pipeline;
mod queue;
mod resource;
pub mod util;

pub use wgt::*;

pub use binding_model::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor,
    BindingResource, BufferBinding, CreateBindGroupError, CreateBindGroupLayoutError,
    CreatePipelineLayoutError, PipelineLayout, PipelineLayoutDescriptor,
};
pub use command::{
    CommandBuffer, CommandEncoder, CommandEncoderError, CopySide, ImageCopyBuffer,
    ImageCopyTexture, PassErrorScope, RenderPassColorAttachment, RenderPassDepthStencilAttachment, RenderPassDescriptor,
    RenderPassEncoder, RenderPassError, RenderPassErrorInner, TransferError,
};
pub use device::{Device, RequestDeviceError};
pub use error::{
    DeviceError, DeviceLostInfo, DeviceLostReason, Error, PopErrorScopeError,
    UncapturedErrorHandler,
};
pub use future::GpuFuture;
pub use pipeline::{
    CreateRenderPipelineError, CreateShaderModuleError, FragmentState, RenderPipeline,
    RenderPipelineDescriptor, ShaderModule, ShaderModuleDescriptor, ShaderSource, ShaderStage,
    VertexBufferLayout, VertexState,
};
pub use queue::{ExecutionError, Queue, QueueSubmitError};
pub use resource::{
    Buffer, BufferAccessError, BufferAsyncError, BufferView, BufferViewMut, CreateBufferError,
    CreateSamplerError, CreateTextureError, CreateTextureViewError, ResourceError, Sampler,
    Texture, TextureView,
};

/// Debug label of an object.
pub type Label<'a> = Option<&'a str>;
/// Describes a [`Buffer`].
pub type BufferDescriptor<'a> = wgt::BufferDescriptor<Label<'a>>;
/// Describes a [`CommandEncoder`].
pub type CommandEncoderDescriptor<'a> = wgt::CommandEncoderDescriptor<Label<'a>>;
/// Describes a [`Texture`].
pub type TextureDescriptor<'a> = wgt::TextureDescriptor<Label<'a>>;
/// Describes a [`TextureView`].
pub type TextureViewDescriptor<'a> = wgt::TextureViewDescriptor<Label<'a>>;
/// Describes a [`Sampler`].
pub type SamplerDescriptor<'a> = wgt::SamplerDescriptor<Label<'a>>;

/// When errors that escape every error scope reach the uncaptured error
/// handler.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ErrorDelivery {
    /// From within the failing call, once no device lock is held.
    #[default]
    Immediate,
    /// On the next [`Device::poll`].
    Deferred,
}

/// Describes a [`Device`].
#[derive(Clone, Debug, Default)]
pub struct DeviceDescriptor<'a> {
    /// Debug label of the device.
    pub label: Label<'a>,
    /// Features the device must support.
    pub features: Features,
    /// Limits the device must support.
    pub limits: Limits,
    /// Delivery of uncaptured errors.
    pub error_delivery: ErrorDelivery,
}

fn label_to_string(label: Label) -> String {
    label.map(str::to_string).unwrap_or_default()
}
