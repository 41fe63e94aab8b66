use crate::{
    binding_model::{
        BindGroup, BindGroupDescriptor, BindGroupLayout, BindGroupLayoutDescriptor,
        PipelineLayout, PipelineLayoutDescriptor,
    },
    command::CommandEncoder,
    context::{
        GlContext, RawBuffer, RawFramebuffer, RawProgram, RawRenderbuffer, RawSampler,
        RawShader, RawTexture, RawVertexArray,
    },
    error::{
        DeviceError, DeviceLostInfo, DeviceLostReason, Error, ErrorClass, ErrorScope, ErrorSink,
        PopErrorScopeError, UncapturedErrorHandler,
    },
    future::{new_gpu_future, GpuFuture, GpuFutureCompletion},
    label_to_string,
    pipeline::{RenderPipeline, RenderPipelineDescriptor, ShaderModule, ShaderModuleDescriptor},
    queue::Queue,
    resource::{Buffer, BufferAsyncError, PendingMap, Sampler, Texture},
    BufferDescriptor, CommandEncoderDescriptor, DeviceDescriptor, SamplerDescriptor,
    TextureDescriptor,
};
use parking_lot::{Mutex, MutexGuard};
use std::{fmt, mem, sync::Arc};
use thiserror::Error;

const ANISOTROPY_EXTENSIONS: &[&str] = &[
    "EXT_texture_filter_anisotropic",
    "GL_EXT_texture_filter_anisotropic",
];

/// Drains pending error flags, reporting whether an allocation failed.
pub(crate) fn check_allocation(gl: &mut dyn GlContext) -> Result<(), DeviceError> {
    let mut result = Ok(());
    // at most one flag is kept per error kind
    for _ in 0..8 {
        match gl.get_error() {
            glow::NO_ERROR => break,
            glow::OUT_OF_MEMORY => result = Err(DeviceError::OutOfMemory),
            other => log::trace!("Ignoring context error 0x{:X}", other),
        }
    }
    result
}

/// Native objects whose deletion waits for the next maintenance turn.
#[derive(Clone, Copy, Debug)]
pub(crate) enum RawObject {
    Buffer(RawBuffer),
    Texture(RawTexture),
    Renderbuffer(RawRenderbuffer),
    Sampler(RawSampler),
    Shader(RawShader),
    Program(RawProgram),
    VertexArray(RawVertexArray),
}

impl RawObject {
    fn delete(self, gl: &mut dyn GlContext) {
        match self {
            Self::Buffer(raw) => gl.delete_buffer(raw),
            Self::Texture(raw) => gl.delete_texture(raw),
            Self::Renderbuffer(raw) => gl.delete_renderbuffer(raw),
            Self::Sampler(raw) => gl.delete_sampler(raw),
            Self::Shader(raw) => gl.delete_shader(raw),
            Self::Program(raw) => gl.delete_program(raw),
            Self::VertexArray(raw) => gl.delete_vertex_array(raw),
        }
    }
}

/// Work that runs once all previously submitted commands are complete.
pub(crate) enum FencedCallback {
    MapRead(Arc<Buffer>),
}

impl FencedCallback {
    fn run(&self, gl: &mut dyn GlContext) -> Option<PendingMap> {
        match *self {
            Self::MapRead(ref buffer) => buffer.complete_read(gl),
        }
    }

    fn abort(&self, error: BufferAsyncError) -> Option<PendingMap> {
        match *self {
            Self::MapRead(ref buffer) => buffer.abort_read(error),
        }
    }
}

pub(crate) struct ContextState {
    pub gl: Box<dyn GlContext>,
    /// Framebuffer shared by every offscreen pass.
    pub draw_fbo: Option<RawFramebuffer>,
    /// Destination framebuffer of resolves.
    pub copy_fbo: Option<RawFramebuffer>,
}

#[derive(Default)]
struct LifeState {
    lost: Option<DeviceLostInfo>,
    waiters: Vec<GpuFutureCompletion<DeviceLostInfo>>,
}

/// State shared between a device, its queue and every resource it created.
///
/// Lock order: `context`, then any resource state, then the leaf locks
/// (`life`, `errors`, `fenced`, `released`). User callbacks only run once
/// every lock is released.
pub(crate) struct DeviceShared {
    pub(crate) label: String,
    pub(crate) features: wgt::Features,
    pub(crate) limits: wgt::Limits,
    context: Mutex<ContextState>,
    life: Mutex<LifeState>,
    errors: Mutex<ErrorSink>,
    fenced: Mutex<Vec<FencedCallback>>,
    released: Mutex<Vec<RawObject>>,
}

impl fmt::Debug for DeviceShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceShared")
            .field("label", &self.label)
            .field("features", &self.features)
            .finish()
    }
}

impl DeviceShared {
    pub(crate) fn lock_context(&self) -> MutexGuard<'_, ContextState> {
        self.context.lock()
    }

    pub(crate) fn is_lost(&self) -> bool {
        self.life.lock().lost.is_some()
    }

    pub(crate) fn check_alive(&self) -> Result<(), DeviceError> {
        if self.is_lost() {
            Err(DeviceError::Lost)
        } else {
            Ok(())
        }
    }

    /// Routes an error through the error scopes, or to the uncaptured
    /// error handler. Must not be called with the context locked.
    pub(crate) fn handle_error<E: ErrorClass>(
        &self,
        cause: E,
        operation: &'static str,
        label: &str,
    ) {
        let error = Error::from_class(cause, operation, label);
        log::warn!("Error in {}: {}", operation, error);
        let uncaptured = self.errors.lock().handle_error(error);
        if let Some(uncaptured) = uncaptured {
            uncaptured.deliver();
        }
    }

    pub(crate) fn schedule_release(&self, object: RawObject) {
        self.released.lock().push(object);
    }

    pub(crate) fn enqueue_fenced(&self, callback: FencedCallback) {
        self.fenced.lock().push(callback);
    }

    pub(crate) fn mark_lost(&self, reason: DeviceLostReason, message: &str) {
        let (info, waiters) = {
            let mut life = self.life.lock();
            if life.lost.is_some() {
                return;
            }
            let info = DeviceLostInfo {
                reason,
                message: message.to_string(),
            };
            life.lost = Some(info.clone());
            (info, mem::take(&mut life.waiters))
        };
        log::warn!("Device '{}' lost: {}", self.label, message);

        for waiter in waiters {
            waiter.complete(info.clone());
        }
        let fenced = mem::take(&mut *self.fenced.lock());
        abort_fenced(&fenced);
    }

    /// One maintenance turn: releases dropped objects, runs the fenced
    /// callbacks, notices context loss and delivers deferred errors.
    pub(crate) fn maintain(&self) {
        let fenced = mem::take(&mut *self.fenced.lock());
        let alive = !self.is_lost();

        let (completed, context_lost) = {
            let mut ctx = self.lock_context();
            let released = mem::take(&mut *self.released.lock());
            for object in released {
                object.delete(&mut *ctx.gl);
            }

            let mut completed = Vec::with_capacity(fenced.len());
            if alive && !fenced.is_empty() {
                // everything submitted so far is complete once this returns
                ctx.gl.finish();
                completed.extend(fenced.iter().filter_map(|callback| callback.run(&mut *ctx.gl)));
            }
            (completed, alive && ctx.gl.is_context_lost())
        };

        if !alive {
            abort_fenced(&fenced);
        }
        drop(fenced);
        for pending in completed {
            pending.fire();
        }

        if context_lost {
            self.mark_lost(DeviceLostReason::ContextLost, "The context was lost");
        }

        let deferred = self.errors.lock().take_deferred();
        for uncaptured in deferred {
            uncaptured.deliver();
        }
    }
}

fn abort_fenced(fenced: &[FencedCallback]) {
    let aborted = fenced
        .iter()
        .filter_map(|callback| callback.abort(BufferAsyncError::DeviceLost))
        .collect::<Vec<_>>();
    for pending in aborted {
        pending.fire();
    }
}

impl Drop for DeviceShared {
    fn drop(&mut self) {
        let ctx = self.context.get_mut();
        for object in self.released.get_mut().drain(..) {
            object.delete(&mut *ctx.gl);
        }
        for fbo in [ctx.draw_fbo.take(), ctx.copy_fbo.take()].into_iter().flatten() {
            ctx.gl.delete_framebuffer(fbo);
        }
    }
}

/// Failure of [`Device::new`].
#[derive(Clone, Debug, Error)]
pub enum RequestDeviceError {
    #[error("The context is lost")]
    ContextLost,
    #[error("Unsupported features were requested: {0:?}")]
    UnsupportedFeature(wgt::Features),
    #[error("Limit '{name}' value {requested} is better than allowed {allowed}")]
    LimitsExceeded {
        name: &'static str,
        requested: u64,
        allowed: u64,
    },
}

/// Open connection to a graphics context.
///
/// Creates resources and routes every error raised on their behalf. The
/// device owns its context and the [`Queue`] executing on it.
pub struct Device {
    shared: Arc<DeviceShared>,
    queue: Queue,
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("label", &self.shared.label)
            .field("lost", &self.shared.is_lost())
            .finish()
    }
}

impl Device {
    /// Opens a device on `context`.
    pub fn new<C: GlContext + 'static>(
        mut context: C,
        desc: &DeviceDescriptor,
    ) -> Result<Self, RequestDeviceError> {
        if context.is_context_lost() {
            return Err(RequestDeviceError::ContextLost);
        }

        let extensions = context.supported_extensions();
        let mut supported = wgt::Features::empty();
        if extensions
            .iter()
            .any(|ext| ANISOTROPY_EXTENSIONS.contains(&ext.as_str()))
        {
            supported |= wgt::Features::ANISOTROPIC_FILTERING;
        }
        if !supported.contains(desc.features) {
            return Err(RequestDeviceError::UnsupportedFeature(
                desc.features - supported,
            ));
        }

        let mut failed = None;
        desc.limits
            .check_limits_with_fail_fn(&wgt::Limits::default(), |name, requested, allowed| {
                failed.get_or_insert(RequestDeviceError::LimitsExceeded {
                    name,
                    requested,
                    allowed,
                });
            });
        if let Some(err) = failed {
            return Err(err);
        }

        let label = label_to_string(desc.label);
        log::info!(
            "Opened device '{}' with features {:?}, errors delivered {:?}",
            label,
            desc.features,
            desc.error_delivery
        );

        let shared = Arc::new(DeviceShared {
            label,
            features: desc.features,
            limits: desc.limits.clone(),
            context: Mutex::new(ContextState {
                gl: Box::new(context),
                draw_fbo: None,
                copy_fbo: None,
            }),
            life: Mutex::new(LifeState::default()),
            errors: Mutex::new(ErrorSink::new(desc.error_delivery)),
            fenced: Mutex::new(Vec::new()),
            released: Mutex::new(Vec::new()),
        });
        Ok(Self {
            queue: Queue {
                shared: Arc::clone(&shared),
            },
            shared,
        })
    }

    /// Features enabled on this device.
    pub fn features(&self) -> wgt::Features {
        self.shared.features
    }

    /// Limits of this device.
    pub fn limits(&self) -> wgt::Limits {
        self.shared.limits.clone()
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Pushes an error scope capturing the first error matching `filter`.
    pub fn push_error_scope(&self, filter: wgt::ErrorFilter) {
        self.shared.errors.lock().push_scope(filter);
    }

    /// Pops the most recently pushed error scope.
    ///
    /// The returned future is already complete.
    pub fn pop_error_scope(&self) -> GpuFuture<Result<Error, PopErrorScopeError>> {
        if self.shared.is_lost() {
            return GpuFuture::ready(Err(PopErrorScopeError::DeviceLost));
        }
        let scope = self.shared.errors.lock().pop_scope();
        GpuFuture::ready(match scope {
            None => Err(PopErrorScopeError::EmptyStack),
            Some(ErrorScope {
                error: Some(error), ..
            }) => Ok(error),
            Some(_) => Err(PopErrorScopeError::NoErrorCaptured),
        })
    }

    /// Replaces the handler of errors that escape every scope.
    pub fn on_uncaptured_error(&self, handler: impl UncapturedErrorHandler) {
        self.shared.errors.lock().set_handler(Arc::new(handler));
    }

    /// Completes once the device is lost.
    pub fn lost(&self) -> GpuFuture<DeviceLostInfo> {
        let mut life = self.shared.life.lock();
        match life.lost {
            Some(ref info) => GpuFuture::ready(info.clone()),
            None => {
                let (future, completion) = new_gpu_future();
                life.waiters.push(completion);
                future
            }
        }
    }

    /// Loses the device. Every later operation fails validation.
    pub fn lose(&self) {
        self.shared
            .mark_lost(DeviceLostReason::Destroyed, "The device was lost explicitly");
    }

    pub fn is_lost(&self) -> bool {
        self.shared.is_lost()
    }

    /// Runs one maintenance turn.
    ///
    /// Completes pending buffer reads, turns a lost context into a lost
    /// device and delivers errors held back by [`ErrorDelivery::Deferred`].
    ///
    /// [`ErrorDelivery::Deferred`]: crate::ErrorDelivery::Deferred
    pub fn poll(&self) {
        self.shared.maintain();
    }

    pub fn create_buffer(&self, desc: &BufferDescriptor) -> Arc<Buffer> {
        match Buffer::create(&self.shared, desc) {
            Ok(buffer) => buffer,
            Err(err) => {
                self.shared
                    .handle_error(err, "Device::create_buffer", desc.label.unwrap_or_default());
                Buffer::invalid(&self.shared, desc)
            }
        }
    }

    pub fn create_texture(&self, desc: &TextureDescriptor) -> Arc<Texture> {
        self.create_texture_impl(desc, false, "Device::create_texture")
    }

    /// Creates the texture standing for the presentation surface.
    ///
    /// A pass rendering only to this texture draws straight into the
    /// default framebuffer. Otherwise the texture gets storage on first use
    /// and is blitted to the default framebuffer when stored.
    pub fn create_surface_texture(&self, desc: &TextureDescriptor) -> Arc<Texture> {
        self.create_texture_impl(desc, true, "Device::create_surface_texture")
    }

    fn create_texture_impl(
        &self,
        desc: &TextureDescriptor,
        is_surface: bool,
        operation: &'static str,
    ) -> Arc<Texture> {
        match Texture::create(&self.shared, desc, is_surface) {
            Ok(texture) => texture,
            Err(err) => {
                self.shared
                    .handle_error(err, operation, desc.label.unwrap_or_default());
                Texture::invalid(&self.shared, desc, is_surface)
            }
        }
    }

    pub fn create_sampler(&self, desc: &SamplerDescriptor) -> Arc<Sampler> {
        match Sampler::create(&self.shared, desc) {
            Ok(sampler) => sampler,
            Err(err) => {
                self.shared
                    .handle_error(err, "Device::create_sampler", desc.label.unwrap_or_default());
                Sampler::invalid(&self.shared, desc)
            }
        }
    }

    pub fn create_bind_group_layout(
        &self,
        desc: &BindGroupLayoutDescriptor,
    ) -> Arc<BindGroupLayout> {
        match BindGroupLayout::create(&self.shared, desc) {
            Ok(layout) => layout,
            Err(err) => {
                self.shared.handle_error(
                    err,
                    "Device::create_bind_group_layout",
                    desc.label.unwrap_or_default(),
                );
                BindGroupLayout::invalid(&self.shared, desc)
            }
        }
    }

    pub fn create_pipeline_layout(&self, desc: &PipelineLayoutDescriptor) -> Arc<PipelineLayout> {
        match PipelineLayout::create(&self.shared, desc) {
            Ok(layout) => layout,
            Err(err) => {
                self.shared.handle_error(
                    err,
                    "Device::create_pipeline_layout",
                    desc.label.unwrap_or_default(),
                );
                PipelineLayout::invalid(&self.shared, desc)
            }
        }
    }

    pub fn create_bind_group(&self, desc: &BindGroupDescriptor) -> Arc<BindGroup> {
        match BindGroup::create(&self.shared, desc) {
            Ok(group) => group,
            Err(err) => {
                self.shared.handle_error(
                    err,
                    "Device::create_bind_group",
                    desc.label.unwrap_or_default(),
                );
                BindGroup::invalid(&self.shared, desc)
            }
        }
    }

    pub fn create_shader_module(&self, desc: &ShaderModuleDescriptor) -> Arc<ShaderModule> {
        match ShaderModule::create(&self.shared, desc) {
            Ok(module) => module,
            Err(err) => {
                self.shared.handle_error(
                    err,
                    "Device::create_shader_module",
                    desc.label.unwrap_or_default(),
                );
                ShaderModule::invalid(&self.shared, desc)
            }
        }
    }

    pub fn create_render_pipeline(&self, desc: &RenderPipelineDescriptor) -> Arc<RenderPipeline> {
        match RenderPipeline::create(&self.shared, desc) {
            Ok(pipeline) => pipeline,
            Err(err) => {
                self.shared.handle_error(
                    err,
                    "Device::create_render_pipeline",
                    desc.label.unwrap_or_default(),
                );
                RenderPipeline::invalid(&self.shared, desc)
            }
        }
    }

    pub fn create_command_encoder(&self, desc: &CommandEncoderDescriptor) -> CommandEncoder {
        let label = label_to_string(desc.label);
        match self.shared.check_alive() {
            Ok(()) => CommandEncoder::new(&self.shared, label, true),
            Err(err) => {
                self.shared
                    .handle_error(err, "Device::create_command_encoder", &label);
                CommandEncoder::new(&self.shared, label, false)
            }
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        log::debug!("Dropping device '{}'", self.shared.label);
        // pending reads hold their buffers, which hold the shared state
        let fenced = mem::take(&mut *self.shared.fenced.lock());
        abort_fenced(&fenced);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessContext;

    #[test]
    fn anisotropy_requires_extension() {
        let desc = DeviceDescriptor {
            features: wgt::Features::ANISOTROPIC_FILTERING,
            ..Default::default()
        };
        assert!(matches!(
            Device::new(HeadlessContext::new(), &desc),
            Err(RequestDeviceError::UnsupportedFeature(_))
        ));
        let context = HeadlessContext::new().with_extensions(["EXT_texture_filter_anisotropic"]);
        let device = Device::new(context, &desc).unwrap();
        assert!(device
            .features()
            .contains(wgt::Features::ANISOTROPIC_FILTERING));
    }

    #[test]
    fn limits_above_supported() {
        let desc = DeviceDescriptor {
            limits: wgt::Limits {
                max_bind_groups: 8,
                ..Default::default()
            },
            ..Default::default()
        };
        match Device::new(HeadlessContext::new(), &desc) {
            Err(RequestDeviceError::LimitsExceeded { name, .. }) => {
                assert_eq!(name, "max_bind_groups")
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn lost_completes_once() {
        let device = Device::new(HeadlessContext::new(), &DeviceDescriptor::default()).unwrap();
        let lost = device.lost();
        assert!(!lost.is_ready());
        device.lose();
        device.lose();
        let info = pollster::block_on(lost);
        assert_eq!(info.reason, DeviceLostReason::Destroyed);
        assert_eq!(
            pollster::block_on(device.lost()).reason,
            DeviceLostReason::Destroyed
        );
        assert_eq!(
            pollster::block_on(device.pop_error_scope()).err(),
            Some(PopErrorScopeError::DeviceLost)
        );
    }
}
