use crate::{
    context::{GlContext, RawBuffer, RawRenderbuffer, RawSampler, RawTexture},
    conv,
    device::{check_allocation, DeviceShared, FencedCallback, RawObject},
    error::{device_error_class, DeviceError, ErrorClass},
    future::{new_gpu_future, GpuFuture, GpuFutureCompletion},
    label_to_string, BufferDescriptor, Label, SamplerDescriptor, TextureDescriptor,
    TextureViewDescriptor,
};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use std::{
    fmt, mem,
    ops::{Deref, DerefMut, Range},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use thiserror::Error;
use wgt::{BufferAddress, BufferUsages, TextureUsages};

/// Identity shared by every resource: its device, debug label and validity.
#[derive(Debug)]
pub(crate) struct ResourceInfo {
    pub(crate) device: Arc<DeviceShared>,
    pub(crate) kind: &'static str,
    pub(crate) label: String,
    pub(crate) valid: bool,
}

impl ResourceInfo {
    pub(crate) fn new(device: &Arc<DeviceShared>, kind: &'static str, label: Label) -> Self {
        Self {
            device: Arc::clone(device),
            kind,
            label: label_to_string(label),
            valid: true,
        }
    }

    pub(crate) fn invalid(device: &Arc<DeviceShared>, kind: &'static str, label: Label) -> Self {
        Self {
            valid: false,
            ..Self::new(device, kind, label)
        }
    }

    /// Checks that the resource is valid and was created by `device`.
    pub(crate) fn check(&self, device: &Arc<DeviceShared>) -> Result<(), ResourceError> {
        if !Arc::ptr_eq(&self.device, device) {
            Err(ResourceError::WrongDevice {
                kind: self.kind,
                label: self.label.clone(),
            })
        } else if !self.valid {
            Err(ResourceError::Invalid {
                kind: self.kind,
                label: self.label.clone(),
            })
        } else {
            Ok(())
        }
    }

    /// Like [`ResourceInfo::check`], for objects with no other device in play.
    fn check_valid(&self) -> Result<(), ResourceError> {
        self.check(&self.device)
    }
}

/// Use of a resource that can't take part in the operation.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ResourceError {
    #[error("{kind} '{label}' is invalid")]
    Invalid { kind: &'static str, label: String },
    #[error("{kind} '{label}' belongs to another device")]
    WrongDevice { kind: &'static str, label: String },
}

impl ErrorClass for ResourceError {}

/// Failure of an asynchronous buffer mapping.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum BufferAsyncError {
    #[error("Mapping request failed validation")]
    Validation,
    #[error("Buffer was unmapped before the mapping completed")]
    Aborted,
    #[error("Buffer was destroyed before the mapping completed")]
    Destroyed,
    #[error("Parent device is lost")]
    DeviceLost,
}

#[derive(Clone, Debug, Error)]
pub enum BufferAccessError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error("Buffer is destroyed")]
    Destroyed,
    #[error("Buffer is already mapped")]
    AlreadyMapped,
    #[error("Buffer map is pending")]
    MapPending,
    #[error("Buffer is not mapped")]
    NotMapped,
    #[error("Buffer has {0} mapped range view(s) still alive")]
    RangeInUse(usize),
    #[error("Usage flags {actual:?} of the buffer don't contain {expected:?}")]
    MissingUsage {
        actual: BufferUsages,
        expected: BufferUsages,
    },
}

#[derive(Clone, Debug, Error)]
pub enum CreateBufferError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("Buffers that are mapped at creation have to be aligned to `COPY_BUFFER_ALIGNMENT`")]
    UnalignedSize,
    #[error("Invalid usage flags {0:?}")]
    InvalidUsage(BufferUsages),
    #[error("`MAP` usage can only be combined with the opposite `COPY`, requested {0:?}")]
    UsageMismatch(BufferUsages),
    #[error("Buffer size {requested} is greater than the maximum buffer size ({maximum})")]
    MaxBufferSize { requested: u64, maximum: u64 },
}

device_error_class!(BufferAccessError, CreateBufferError);

enum MapState {
    Unmapped,
    /// Mapped for writing. Buffers without a shadow write into `staging`.
    Write { staging: Option<Vec<u8>> },
    ReadPending(GpuFutureCompletion<Result<(), BufferAsyncError>>),
    Read,
}

impl fmt::Debug for MapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            Self::Unmapped => "Unmapped",
            Self::Write { .. } => "Write",
            Self::ReadPending(_) => "ReadPending",
            Self::Read => "Read",
        })
    }
}

pub(crate) struct BufferState {
    /// Native storage. Absent until the first unmap of a buffer created
    /// mapped, and after destruction.
    pub raw: Option<RawBuffer>,
    /// Host copy of the contents of mappable buffers.
    shadow: Option<Vec<u8>>,
    map: MapState,
    pub destroyed: bool,
}

impl BufferState {
    pub fn is_mapped(&self) -> bool {
        !matches!(self.map, MapState::Unmapped)
    }

    fn check_mapped(&self) -> Result<(), BufferAccessError> {
        match self.map {
            _ if self.destroyed => Err(BufferAccessError::Destroyed),
            MapState::Unmapped => Err(BufferAccessError::NotMapped),
            MapState::ReadPending(_) => Err(BufferAccessError::MapPending),
            MapState::Write { .. } | MapState::Read => Ok(()),
        }
    }

    fn check_unmapped(&self) -> Result<(), BufferAccessError> {
        match self.map {
            _ if self.destroyed => Err(BufferAccessError::Destroyed),
            MapState::Unmapped => Ok(()),
            MapState::ReadPending(_) => Err(BufferAccessError::MapPending),
            MapState::Write { .. } | MapState::Read => Err(BufferAccessError::AlreadyMapped),
        }
    }

    fn mapped_bytes(&mut self) -> &mut [u8] {
        let Self {
            ref mut shadow,
            ref mut map,
            ..
        } = *self;
        match *map {
            MapState::Write {
                staging: Some(ref mut staging),
            } => staging.as_mut_slice(),
            _ => shadow.as_deref_mut().unwrap_or_default(),
        }
    }
}

/// A read mapping waiting to be completed once no lock is held.
pub(crate) struct PendingMap {
    completion: GpuFutureCompletion<Result<(), BufferAsyncError>>,
    result: Result<(), BufferAsyncError>,
}

impl PendingMap {
    pub(crate) fn fire(self) {
        self.completion.complete(self.result);
    }
}

fn allocate_buffer(
    gl: &mut dyn GlContext,
    target: u32,
    size: BufferAddress,
    usage: BufferUsages,
) -> Result<RawBuffer, DeviceError> {
    let raw = gl.create_buffer().map_err(|_| DeviceError::OutOfMemory)?;
    let hint = if usage.contains(BufferUsages::MAP_READ) {
        glow::STREAM_READ
    } else if usage.contains(BufferUsages::MAP_WRITE) {
        glow::DYNAMIC_DRAW
    } else {
        glow::STATIC_DRAW
    };
    gl.bind_buffer(target, Some(raw));
    gl.buffer_data_size(target, size as i32, hint);
    gl.bind_buffer(target, None);
    if let Err(err) = check_allocation(gl) {
        gl.delete_buffer(raw);
        return Err(err);
    }
    Ok(raw)
}

/// Linear memory on the device.
///
/// Mapping is emulated: buffers with a `MAP_*` usage keep a shadow copy of
/// their contents on the host, which is what mapped ranges expose.
pub struct Buffer {
    pub(crate) info: ResourceInfo,
    pub(crate) size: BufferAddress,
    pub(crate) usage: BufferUsages,
    /// Bind target of the native storage.
    pub(crate) target: u32,
    pub(crate) state: Mutex<BufferState>,
    /// Live [`BufferView`]s and [`BufferViewMut`]s. Each holds `state` locked.
    views: AtomicUsize,
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("label", &self.info.label)
            .field("size", &self.size)
            .field("usage", &self.usage)
            .finish()
    }
}

impl Buffer {
    pub(crate) fn create(
        device: &Arc<DeviceShared>,
        desc: &BufferDescriptor,
    ) -> Result<Arc<Self>, CreateBufferError> {
        device.check_alive()?;

        if desc.usage.is_empty() || desc.usage.contains_invalid_bits() {
            return Err(CreateBufferError::InvalidUsage(desc.usage));
        }
        let map_flags = BufferUsages::MAP_READ | BufferUsages::MAP_WRITE;
        if desc.usage.contains(BufferUsages::MAP_READ)
            && !(BufferUsages::MAP_READ | BufferUsages::COPY_DST).contains(desc.usage)
            || desc.usage.contains(BufferUsages::MAP_WRITE)
                && !(BufferUsages::MAP_WRITE | BufferUsages::COPY_SRC).contains(desc.usage)
        {
            return Err(CreateBufferError::UsageMismatch(desc.usage));
        }
        if desc.size > i32::MAX as u64 {
            return Err(CreateBufferError::MaxBufferSize {
                requested: desc.size,
                maximum: i32::MAX as u64,
            });
        }
        if desc.mapped_at_creation && desc.size % wgt::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(CreateBufferError::UnalignedSize);
        }

        let target = Self::target_for(desc.usage);
        let shadow = if desc.usage.intersects(map_flags) {
            Some(vec![0; desc.size as usize])
        } else {
            None
        };
        let (raw, map) = if desc.mapped_at_creation {
            let staging = match shadow {
                Some(_) => None,
                None => Some(vec![0; desc.size as usize]),
            };
            (None, MapState::Write { staging })
        } else {
            let mut ctx = device.lock_context();
            let raw = allocate_buffer(&mut *ctx.gl, target, desc.size, desc.usage)?;
            (Some(raw), MapState::Unmapped)
        };

        Ok(Arc::new(Self {
            info: ResourceInfo::new(device, "Buffer", desc.label),
            size: desc.size,
            usage: desc.usage,
            target,
            state: Mutex::new(BufferState {
                raw,
                shadow,
                map,
                destroyed: false,
            }),
            views: AtomicUsize::new(0),
        }))
    }

    pub(crate) fn invalid(device: &Arc<DeviceShared>, desc: &BufferDescriptor) -> Arc<Self> {
        Arc::new(Self {
            info: ResourceInfo::invalid(device, "Buffer", desc.label),
            size: desc.size,
            usage: desc.usage,
            target: Self::target_for(desc.usage),
            state: Mutex::new(BufferState {
                raw: None,
                shadow: None,
                map: MapState::Unmapped,
                destroyed: false,
            }),
            views: AtomicUsize::new(0),
        })
    }

    fn target_for(usage: BufferUsages) -> u32 {
        if usage.contains(BufferUsages::INDEX) {
            glow::ELEMENT_ARRAY_BUFFER
        } else {
            glow::ARRAY_BUFFER
        }
    }

    pub fn size(&self) -> BufferAddress {
        self.size
    }

    pub fn usage(&self) -> BufferUsages {
        self.usage
    }

    pub(crate) fn is_index(&self) -> bool {
        self.target == glow::ELEMENT_ARRAY_BUFFER
    }

    /// Native storage, if allocated.
    pub fn as_raw(&self) -> Option<RawBuffer> {
        self.lock_state().ok()?.raw
    }

    pub(crate) fn live_views(&self) -> usize {
        self.views.load(Ordering::Acquire)
    }

    /// Locks the state, failing instead of blocking on a live view.
    pub(crate) fn lock_state(&self) -> Result<MutexGuard<'_, BufferState>, BufferAccessError> {
        match self.live_views() {
            0 => Ok(self.state.lock()),
            count => Err(BufferAccessError::RangeInUse(count)),
        }
    }

    fn check_usage(&self, expected: BufferUsages) -> Result<(), BufferAccessError> {
        if self.usage.contains(expected) {
            Ok(())
        } else {
            Err(BufferAccessError::MissingUsage {
                actual: self.usage,
                expected,
            })
        }
    }

    fn check_map(&self, expected: BufferUsages) -> Result<(), BufferAccessError> {
        self.info.check_valid()?;
        self.info.device.check_alive()?;
        self.check_usage(expected)
    }

    /// Maps the buffer for writing.
    ///
    /// No submitted work can be writing to a `MAP_WRITE` buffer, so the
    /// mapping is available as soon as this returns.
    pub fn map_write_async(&self) -> GpuFuture<Result<(), BufferAsyncError>> {
        let result = self.check_map(BufferUsages::MAP_WRITE).and_then(|()| {
            let mut state = self.lock_state()?;
            state.check_unmapped()?;
            state.map = MapState::Write { staging: None };
            Ok(())
        });
        GpuFuture::ready(self.route(result, "Buffer::map_write_async"))
    }

    /// Maps the buffer for reading.
    ///
    /// The contents are read back once all previously submitted work is
    /// complete, on the next [`Queue::submit`](crate::Queue::submit) or
    /// [`Device::poll`](crate::Device::poll).
    pub fn map_read_async(self: &Arc<Self>) -> GpuFuture<Result<(), BufferAsyncError>> {
        let result = self.check_map(BufferUsages::MAP_READ).and_then(|()| {
            let mut state = self.lock_state()?;
            state.check_unmapped()?;
            let (future, completion) = new_gpu_future();
            state.map = MapState::ReadPending(completion);
            Ok(future)
        });
        match result {
            Ok(future) => {
                self.info
                    .device
                    .enqueue_fenced(FencedCallback::MapRead(Arc::clone(self)));
                future
            }
            Err(err) => GpuFuture::ready(self.route(Err(err), "Buffer::map_read_async")),
        }
    }

    fn route(
        &self,
        result: Result<(), BufferAccessError>,
        operation: &'static str,
    ) -> Result<(), BufferAsyncError> {
        result.map_err(|err| {
            self.info
                .device
                .handle_error(err, operation, &self.info.label);
            BufferAsyncError::Validation
        })
    }

    /// Reads the native storage into the shadow and completes a pending read.
    pub(crate) fn complete_read(&self, gl: &mut dyn GlContext) -> Option<PendingMap> {
        let mut state = self.state.lock();
        let completion = match mem::replace(&mut state.map, MapState::Read) {
            MapState::ReadPending(completion) => completion,
            other => {
                state.map = other;
                return None;
            }
        };
        let BufferState {
            raw, ref mut shadow, ..
        } = *state;
        if let (Some(raw), Some(shadow)) = (raw, shadow.as_mut()) {
            gl.bind_buffer(glow::COPY_READ_BUFFER, Some(raw));
            gl.get_buffer_sub_data(glow::COPY_READ_BUFFER, 0, shadow);
            gl.bind_buffer(glow::COPY_READ_BUFFER, None);
        }
        Some(PendingMap {
            completion,
            result: Ok(()),
        })
    }

    pub(crate) fn abort_read(&self, error: BufferAsyncError) -> Option<PendingMap> {
        let mut state = self.state.lock();
        match mem::replace(&mut state.map, MapState::Unmapped) {
            MapState::ReadPending(completion) => Some(PendingMap {
                completion,
                result: Err(error),
            }),
            other => {
                state.map = other;
                None
            }
        }
    }

    /// Ends the mapping. Written contents are uploaded to the native
    /// storage, which buffers created mapped allocate here.
    ///
    /// Fails while a view of the mapped range is alive.
    pub fn unmap(&self) {
        let mut pending = None;
        let result = self.unmap_impl(&mut pending);
        if let Some(pending) = pending {
            pending.fire();
        }
        if let Err(err) = result {
            self.info
                .device
                .handle_error(err, "Buffer::unmap", &self.info.label);
        }
    }

    fn unmap_impl(&self, pending: &mut Option<PendingMap>) -> Result<(), BufferAccessError> {
        self.info.check_valid()?;
        self.info.device.check_alive()?;

        let mut ctx = self.info.device.lock_context();
        let mut state = self.lock_state()?;
        let staging = match mem::replace(&mut state.map, MapState::Unmapped) {
            MapState::Unmapped => return Err(BufferAccessError::NotMapped),
            MapState::ReadPending(completion) => {
                *pending = Some(PendingMap {
                    completion,
                    result: Err(BufferAsyncError::Aborted),
                });
                return Ok(());
            }
            MapState::Read => return Ok(()),
            MapState::Write { staging } => staging,
        };
        if state.destroyed {
            return Ok(());
        }

        let raw = match state.raw {
            Some(raw) => raw,
            None => {
                let raw = allocate_buffer(&mut *ctx.gl, self.target, self.size, self.usage)?;
                state.raw = Some(raw);
                raw
            }
        };
        let data = match staging {
            Some(ref staging) => staging.as_slice(),
            None => state.shadow.as_deref().unwrap_or_default(),
        };
        if !data.is_empty() {
            ctx.gl.bind_buffer(self.target, Some(raw));
            ctx.gl.buffer_sub_data(self.target, 0, data);
            ctx.gl.bind_buffer(self.target, None);
        }
        Ok(())
    }

    /// Returns the mapped contents.
    pub fn get_mapped_range(&self) -> Result<BufferView<'_>, BufferAccessError> {
        self.info.check_valid()?;
        let state = self.lock_state()?;
        state.check_mapped()?;
        self.views.fetch_add(1, Ordering::AcqRel);
        Ok(BufferView {
            guard: MutexGuard::map(state, BufferState::mapped_bytes),
            views: &self.views,
        })
    }

    /// Returns the mapped contents for writing.
    ///
    /// Writes into a read mapping are discarded on unmap.
    pub fn get_mapped_range_mut(&self) -> Result<BufferViewMut<'_>, BufferAccessError> {
        self.info.check_valid()?;
        let state = self.lock_state()?;
        state.check_mapped()?;
        self.views.fetch_add(1, Ordering::AcqRel);
        Ok(BufferViewMut {
            guard: MutexGuard::map(state, BufferState::mapped_bytes),
            views: &self.views,
        })
    }

    /// Releases the native storage. A pending read fails with
    /// [`BufferAsyncError::Destroyed`].
    pub fn destroy(&self) {
        let pending = {
            let mut state = match self.lock_state() {
                Ok(state) => state,
                Err(err) => {
                    self.info
                        .device
                        .handle_error(err, "Buffer::destroy", &self.info.label);
                    return;
                }
            };
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            if let Some(raw) = state.raw.take() {
                self.info.device.schedule_release(RawObject::Buffer(raw));
            }
            match mem::replace(&mut state.map, MapState::Unmapped) {
                MapState::ReadPending(completion) => Some(PendingMap {
                    completion,
                    result: Err(BufferAsyncError::Destroyed),
                }),
                _ => None,
            }
        };
        if let Some(pending) = pending {
            pending.fire();
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(raw) = self.state.get_mut().raw.take() {
            self.info.device.schedule_release(RawObject::Buffer(raw));
        }
    }
}

/// Read access to a mapped range. Keeps the buffer locked while alive.
pub struct BufferView<'a> {
    guard: MappedMutexGuard<'a, [u8]>,
    views: &'a AtomicUsize,
}

impl Drop for BufferView<'_> {
    fn drop(&mut self) {
        self.views.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Deref for BufferView<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.guard
    }
}

impl AsRef<[u8]> for BufferView<'_> {
    fn as_ref(&self) -> &[u8] {
        &self.guard
    }
}

/// Write access to a mapped range. Keeps the buffer locked while alive.
pub struct BufferViewMut<'a> {
    guard: MappedMutexGuard<'a, [u8]>,
    views: &'a AtomicUsize,
}

impl Drop for BufferViewMut<'_> {
    fn drop(&mut self) {
        self.views.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Deref for BufferViewMut<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.guard
    }
}

impl DerefMut for BufferViewMut<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.guard
    }
}

#[derive(Clone, Debug, Error)]
pub enum CreateTextureError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("Invalid usage flags {0:?}")]
    InvalidUsage(TextureUsages),
    #[error("Textures of dimension {0:?} are not supported")]
    UnsupportedDimension(wgt::TextureDimension),
    #[error("Dimension {0:?} is zero")]
    ZeroSize(wgt::Extent3d),
    #[error("Dimension value {given} exceeds the limit of {limit}")]
    LimitExceeded { given: u32, limit: u32 },
    #[error(
        "Texture descriptor mip level count {requested} is invalid, maximum allowed is {maximum}"
    )]
    InvalidMipLevelCount { requested: u32, maximum: u32 },
    #[error("Sample count {0} is invalid")]
    InvalidSampleCount(u32),
    #[error("Multisampled textures must have RENDER_ATTACHMENT usage only, a single mip level and a single layer")]
    InvalidMultisampled,
    #[error("Depth texture ({1:?}) can't be created as {0:?}")]
    InvalidDepthDimension(wgt::TextureDimension, wgt::TextureFormat),
    #[error("Cube map textures must be square, got {width}x{height}")]
    NonSquareCube { width: u32, height: u32 },
    #[error("Surface textures must be single sampled 2D textures with a single mip level and layer")]
    InvalidSurface,
}

#[derive(Clone, Debug, Error)]
pub enum CreateTextureViewError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error("Texture is destroyed")]
    Destroyed,
    #[error("Unable to view texture {texture:?} as {view:?}")]
    FormatReinterpretation {
        texture: wgt::TextureFormat,
        view: wgt::TextureFormat,
    },
    #[error("Texture view dimension {0:?} is not supported")]
    UnsupportedDimension(wgt::TextureViewDimension),
    #[error("Invalid texture view dimension `{view:?}` with texture of dimension `{texture:?}`")]
    InvalidTextureViewDimension {
        view: wgt::TextureViewDimension,
        texture: wgt::TextureDimension,
    },
    #[error("Mip level count is 0")]
    ZeroMipLevelCount,
    #[error("Array layer count is 0")]
    ZeroArrayLayerCount,
    #[error(
        "TextureView mip level count + base mip level {requested} must be <= Texture mip level count {total}"
    )]
    TooManyMipLevels { requested: u32, total: u32 },
    #[error("TextureView array layer count + base array layer {requested} must be <= Texture depth/array layer count {total}")]
    TooManyArrayLayers { requested: u32, total: u32 },
    #[error("Requested array layer count {requested} is not valid for the target view dimension {dim:?}")]
    InvalidArrayLayerCount {
        requested: u32,
        dim: wgt::TextureViewDimension,
    },
    #[error("Aspect {requested_aspect:?} is not in the source texture format {texture_format:?}")]
    InvalidAspect {
        texture_format: wgt::TextureFormat,
        requested_aspect: wgt::TextureAspect,
    },
}

device_error_class!(CreateTextureError, CreateTextureViewError);

bitflags::bitflags! {
    /// Aspects of a format reachable through a view.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub(crate) struct FormatAspects: u8 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

impl FormatAspects {
    pub(crate) fn new(format: wgt::TextureFormat, aspect: wgt::TextureAspect) -> Self {
        let full = if format.has_depth_aspect() {
            if format.has_stencil_aspect() {
                Self::DEPTH | Self::STENCIL
            } else {
                Self::DEPTH
            }
        } else {
            Self::COLOR
        };
        full & match aspect {
            wgt::TextureAspect::All => Self::all(),
            wgt::TextureAspect::DepthOnly => Self::DEPTH,
            wgt::TextureAspect::StencilOnly => Self::STENCIL,
        }
    }
}

/// How the storage of a texture is allocated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TextureKind {
    Texture { target: u32 },
    Renderbuffer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TextureInner {
    Texture { raw: RawTexture, target: u32 },
    Renderbuffer { raw: RawRenderbuffer },
}

pub(crate) struct TextureState {
    pub raw: Option<TextureInner>,
    pub destroyed: bool,
}

pub(crate) fn allocate_texture(
    gl: &mut dyn GlContext,
    kind: TextureKind,
    desc: &wgt::TextureDescriptor<()>,
    format_desc: conv::FormatDescription,
) -> Result<TextureInner, DeviceError> {
    let (width, height) = (desc.size.width as i32, desc.size.height as i32);
    let inner = match kind {
        TextureKind::Renderbuffer => {
            let raw = gl
                .create_renderbuffer()
                .map_err(|_| DeviceError::OutOfMemory)?;
            gl.bind_renderbuffer(glow::RENDERBUFFER, Some(raw));
            gl.renderbuffer_storage_multisample(
                glow::RENDERBUFFER,
                desc.sample_count as i32,
                format_desc.internal,
                width,
                height,
            );
            gl.bind_renderbuffer(glow::RENDERBUFFER, None);
            TextureInner::Renderbuffer { raw }
        }
        TextureKind::Texture { target } => {
            let raw = gl.create_texture().map_err(|_| DeviceError::OutOfMemory)?;
            gl.bind_texture(target, Some(raw));
            match target {
                glow::TEXTURE_3D | glow::TEXTURE_2D_ARRAY => gl.tex_storage_3d(
                    target,
                    desc.mip_level_count as i32,
                    format_desc.internal,
                    width,
                    height,
                    desc.size.depth_or_array_layers as i32,
                ),
                _ => gl.tex_storage_2d(
                    target,
                    desc.mip_level_count as i32,
                    format_desc.internal,
                    width,
                    height,
                ),
            }
            gl.tex_parameter_i32(
                target,
                glow::TEXTURE_MAX_LEVEL,
                desc.mip_level_count as i32 - 1,
            );
            gl.bind_texture(target, None);
            TextureInner::Texture { raw, target }
        }
    };
    if let Err(err) = check_allocation(gl) {
        match inner {
            TextureInner::Texture { raw, .. } => gl.delete_texture(raw),
            TextureInner::Renderbuffer { raw } => gl.delete_renderbuffer(raw),
        }
        return Err(err);
    }
    Ok(inner)
}

/// An image on the device.
pub struct Texture {
    pub(crate) info: ResourceInfo,
    pub(crate) desc: wgt::TextureDescriptor<()>,
    pub(crate) format_desc: conv::FormatDescription,
    pub(crate) kind: TextureKind,
    /// Stands for the presentation surface. Storage is allocated on first use.
    pub(crate) is_surface: bool,
    pub(crate) state: Mutex<TextureState>,
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("label", &self.info.label)
            .field("desc", &self.desc)
            .field("is_surface", &self.is_surface)
            .finish()
    }
}

impl Texture {
    pub(crate) fn create(
        device: &Arc<DeviceShared>,
        desc: &TextureDescriptor,
        is_surface: bool,
    ) -> Result<Arc<Self>, CreateTextureError> {
        device.check_alive()?;
        Self::validate(&device.limits, desc, is_surface)?;

        let kind = Self::kind_for(desc);
        let format_desc = conv::describe_texture_format(desc.format);
        let stored_desc = desc.map_label(|_| ());
        let raw = if is_surface {
            None
        } else {
            let mut ctx = device.lock_context();
            Some(allocate_texture(
                &mut *ctx.gl,
                kind,
                &stored_desc,
                format_desc,
            )?)
        };

        Ok(Arc::new(Self {
            info: ResourceInfo::new(device, "Texture", desc.label),
            desc: stored_desc,
            format_desc,
            kind,
            is_surface,
            state: Mutex::new(TextureState {
                raw,
                destroyed: false,
            }),
        }))
    }

    pub(crate) fn invalid(
        device: &Arc<DeviceShared>,
        desc: &TextureDescriptor,
        is_surface: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            info: ResourceInfo::invalid(device, "Texture", desc.label),
            desc: desc.map_label(|_| ()),
            format_desc: conv::describe_texture_format(desc.format),
            kind: Self::kind_for(desc),
            is_surface,
            state: Mutex::new(TextureState {
                raw: None,
                destroyed: false,
            }),
        })
    }

    fn validate(
        limits: &wgt::Limits,
        desc: &TextureDescriptor,
        is_surface: bool,
    ) -> Result<(), CreateTextureError> {
        use wgt::TextureDimension as Td;

        if desc.usage.is_empty() || desc.usage.contains_invalid_bits() {
            return Err(CreateTextureError::InvalidUsage(desc.usage));
        }
        let size = desc.size;
        if size.width == 0 || size.height == 0 || size.depth_or_array_layers == 0 {
            return Err(CreateTextureError::ZeroSize(size));
        }
        let (extent_limit, depth_limit) = match desc.dimension {
            Td::D1 => return Err(CreateTextureError::UnsupportedDimension(desc.dimension)),
            Td::D2 => (
                limits.max_texture_dimension_2d,
                limits.max_texture_array_layers,
            ),
            Td::D3 => (
                limits.max_texture_dimension_3d,
                limits.max_texture_dimension_3d,
            ),
        };
        for (given, limit) in [
            (size.width, extent_limit),
            (size.height, extent_limit),
            (size.depth_or_array_layers, depth_limit),
        ] {
            if given > limit {
                return Err(CreateTextureError::LimitExceeded { given, limit });
            }
        }

        let maximum = size.max_mips(desc.dimension);
        if desc.mip_level_count == 0 || desc.mip_level_count > maximum {
            return Err(CreateTextureError::InvalidMipLevelCount {
                requested: desc.mip_level_count,
                maximum,
            });
        }
        match desc.sample_count {
            1 => {}
            4 => {
                if desc.usage != TextureUsages::RENDER_ATTACHMENT
                    || desc.mip_level_count != 1
                    || desc.array_layer_count() != 1
                {
                    return Err(CreateTextureError::InvalidMultisampled);
                }
            }
            other => return Err(CreateTextureError::InvalidSampleCount(other)),
        }
        if desc.format.is_depth_stencil_format() && desc.dimension == Td::D3 {
            return Err(CreateTextureError::InvalidDepthDimension(
                desc.dimension,
                desc.format,
            ));
        }
        if let TextureKind::Texture {
            target: glow::TEXTURE_CUBE_MAP,
        } = Self::kind_for(desc)
        {
            if size.width != size.height {
                return Err(CreateTextureError::NonSquareCube {
                    width: size.width,
                    height: size.height,
                });
            }
        }
        if is_surface
            && (desc.dimension != Td::D2
                || desc.array_layer_count() != 1
                || desc.mip_level_count != 1
                || desc.sample_count != 1)
        {
            return Err(CreateTextureError::InvalidSurface);
        }
        Ok(())
    }

    fn kind_for(desc: &TextureDescriptor) -> TextureKind {
        let render_only = desc.usage == TextureUsages::RENDER_ATTACHMENT
            && desc.dimension == wgt::TextureDimension::D2
            && desc.size.depth_or_array_layers == 1;
        if desc.sample_count > 1 || render_only {
            TextureKind::Renderbuffer
        } else {
            TextureKind::Texture {
                target: conv::map_texture_target(
                    desc.dimension,
                    desc.array_layer_count(),
                    desc.usage,
                ),
            }
        }
    }

    pub fn size(&self) -> wgt::Extent3d {
        self.desc.size
    }

    pub fn format(&self) -> wgt::TextureFormat {
        self.desc.format
    }

    pub fn usage(&self) -> TextureUsages {
        self.desc.usage
    }

    pub fn dimension(&self) -> wgt::TextureDimension {
        self.desc.dimension
    }

    pub fn mip_level_count(&self) -> u32 {
        self.desc.mip_level_count
    }

    pub fn sample_count(&self) -> u32 {
        self.desc.sample_count
    }

    pub fn is_surface(&self) -> bool {
        self.is_surface
    }

    /// Allocates the storage of a surface texture that is used for the
    /// first time.
    pub(crate) fn allocate(&self, gl: &mut dyn GlContext) -> Result<TextureInner, DeviceError> {
        allocate_texture(gl, self.kind, &self.desc, self.format_desc)
    }

    /// Dimension of the view created by [`Texture::create_default_view`].
    fn default_view_dimension(&self) -> wgt::TextureViewDimension {
        use wgt::TextureViewDimension as Tvd;
        match self.kind {
            TextureKind::Renderbuffer => Tvd::D2,
            TextureKind::Texture { target } => match target {
                glow::TEXTURE_3D => Tvd::D3,
                glow::TEXTURE_CUBE_MAP => Tvd::Cube,
                glow::TEXTURE_2D_ARRAY => Tvd::D2Array,
                _ => Tvd::D2,
            },
        }
    }

    pub fn create_view(self: &Arc<Self>, desc: &TextureViewDescriptor) -> Arc<TextureView> {
        match self.create_view_impl(desc) {
            Ok(view) => Arc::new(view),
            Err(err) => {
                self.info.device.handle_error(
                    err,
                    "Texture::create_view",
                    desc.label.unwrap_or_default(),
                );
                Arc::new(TextureView {
                    info: ResourceInfo::invalid(&self.info.device, "TextureView", desc.label),
                    texture: Arc::clone(self),
                    format: self.desc.format,
                    dimension: desc.dimension.unwrap_or_default(),
                    aspects: FormatAspects::empty(),
                    mip_levels: 0..0,
                    array_layers: 0..0,
                })
            }
        }
    }

    pub fn create_default_view(self: &Arc<Self>) -> Arc<TextureView> {
        self.create_view(&TextureViewDescriptor::default())
    }

    fn create_view_impl(
        self: &Arc<Self>,
        desc: &TextureViewDescriptor,
    ) -> Result<TextureView, CreateTextureViewError> {
        use wgt::TextureViewDimension as Tvd;

        self.info.check_valid()?;
        self.info.device.check_alive()?;
        if self.state.lock().destroyed {
            return Err(CreateTextureViewError::Destroyed);
        }

        let format = desc.format.unwrap_or(self.desc.format);
        if format != self.desc.format {
            return Err(CreateTextureViewError::FormatReinterpretation {
                texture: self.desc.format,
                view: format,
            });
        }

        let dimension = desc
            .dimension
            .unwrap_or_else(|| self.default_view_dimension());
        let view_target = conv::map_view_dimension(dimension)
            .ok_or(CreateTextureViewError::UnsupportedDimension(dimension))?;
        let compatible = match self.kind {
            TextureKind::Renderbuffer => dimension == Tvd::D2,
            // a single layer or face can always be viewed as 2D, e.g. to render to it
            TextureKind::Texture { target } => view_target == target || dimension == Tvd::D2,
        };
        if !compatible || dimension.compatible_texture_dimension() != self.desc.dimension {
            return Err(CreateTextureViewError::InvalidTextureViewDimension {
                view: dimension,
                texture: self.desc.dimension,
            });
        }

        let total_mips = self.desc.mip_level_count;
        let mip_count = desc
            .mip_level_count
            .unwrap_or_else(|| total_mips.saturating_sub(desc.base_mip_level));
        if mip_count == 0 {
            return Err(CreateTextureViewError::ZeroMipLevelCount);
        }
        let mip_end = desc.base_mip_level.saturating_add(mip_count);
        if mip_end > total_mips {
            return Err(CreateTextureViewError::TooManyMipLevels {
                requested: mip_end,
                total: total_mips,
            });
        }

        let total_layers = self.desc.array_layer_count();
        let layer_count = desc
            .array_layer_count
            .unwrap_or_else(|| match dimension {
                Tvd::D2 | Tvd::D3 => 1,
                _ => total_layers.saturating_sub(desc.base_array_layer),
            });
        if layer_count == 0 {
            return Err(CreateTextureViewError::ZeroArrayLayerCount);
        }
        let layer_end = desc.base_array_layer.saturating_add(layer_count);
        if layer_end > total_layers {
            return Err(CreateTextureViewError::TooManyArrayLayers {
                requested: layer_end,
                total: total_layers,
            });
        }
        let layers_ok = match dimension {
            Tvd::D2 | Tvd::D3 => layer_count == 1,
            Tvd::Cube => layer_count == 6,
            _ => true,
        };
        if !layers_ok {
            return Err(CreateTextureViewError::InvalidArrayLayerCount {
                requested: layer_count,
                dim: dimension,
            });
        }

        let aspects = FormatAspects::new(format, desc.aspect);
        if aspects.is_empty() {
            return Err(CreateTextureViewError::InvalidAspect {
                texture_format: format,
                requested_aspect: desc.aspect,
            });
        }

        Ok(TextureView {
            info: ResourceInfo::new(&self.info.device, "TextureView", desc.label),
            texture: Arc::clone(self),
            format,
            dimension,
            aspects,
            mip_levels: desc.base_mip_level..mip_end,
            array_layers: desc.base_array_layer..layer_end,
        })
    }

    /// Releases the storage. Submitting work that uses the texture
    /// afterwards is an error.
    pub fn destroy(&self) {
        let mut state = self.state.lock();
        state.destroyed = true;
        if let Some(inner) = state.raw.take() {
            self.info.device.schedule_release(inner.into());
        }
    }
}

impl From<TextureInner> for RawObject {
    fn from(inner: TextureInner) -> Self {
        match inner {
            TextureInner::Texture { raw, .. } => Self::Texture(raw),
            TextureInner::Renderbuffer { raw } => Self::Renderbuffer(raw),
        }
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        if let Some(inner) = self.state.get_mut().raw.take() {
            self.info.device.schedule_release(inner.into());
        }
    }
}

/// A sub-range of a texture. Never owns storage.
pub struct TextureView {
    pub(crate) info: ResourceInfo,
    pub(crate) texture: Arc<Texture>,
    pub(crate) format: wgt::TextureFormat,
    pub(crate) dimension: wgt::TextureViewDimension,
    pub(crate) aspects: FormatAspects,
    pub(crate) mip_levels: Range<u32>,
    pub(crate) array_layers: Range<u32>,
}

impl fmt::Debug for TextureView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureView")
            .field("label", &self.info.label)
            .field("texture", &self.texture.info.label)
            .field("dimension", &self.dimension)
            .field("mip_levels", &self.mip_levels)
            .field("array_layers", &self.array_layers)
            .finish()
    }
}

impl TextureView {
    pub fn texture(&self) -> &Arc<Texture> {
        &self.texture
    }

    pub fn format(&self) -> wgt::TextureFormat {
        self.format
    }

    pub fn dimension(&self) -> wgt::TextureViewDimension {
        self.dimension
    }

    /// Size of the base mip level of the view.
    pub fn extent(&self) -> wgt::Extent3d {
        self.texture
            .desc
            .size
            .mip_level_size(self.mip_levels.start, self.texture.desc.dimension)
    }

    /// Returns `true` if the whole texture can be bound through this view
    /// for sampling.
    pub(crate) fn is_sampleable(&self) -> bool {
        match (self.texture.kind, conv::map_view_dimension(self.dimension)) {
            (TextureKind::Texture { target }, Some(view_target)) => target == view_target,
            _ => false,
        }
    }
}

#[derive(Clone, Debug, Error)]
pub enum CreateSamplerError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("Invalid lodMinClamp: {0}. Must be greater or equal to 0.0")]
    InvalidLodMinClamp(f32),
    #[error("Invalid lodMaxClamp: {lod_max_clamp}. Must be greater or equal to lodMinClamp (which is {lod_min_clamp}).")]
    InvalidLodMaxClamp {
        lod_min_clamp: f32,
        lod_max_clamp: f32,
    },
    #[error("Invalid anisotropic clamp: {0}. Must be in the range 1 to 16.")]
    InvalidAnisotropy(u16),
    #[error("Anisotropic clamp {0} requires all filter modes to be linear")]
    InvalidFilterModeWithAnisotropy(u16),
    #[error("Features {0:?} are required but not enabled on the device")]
    MissingFeatures(wgt::Features),
}

device_error_class!(CreateSamplerError);

/// Sampling state, applied to texture units by bind groups.
pub struct Sampler {
    pub(crate) info: ResourceInfo,
    pub(crate) raw: Option<RawSampler>,
    pub(crate) comparison: bool,
    pub(crate) filtering: bool,
}

impl fmt::Debug for Sampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sampler")
            .field("label", &self.info.label)
            .field("comparison", &self.comparison)
            .field("filtering", &self.filtering)
            .finish()
    }
}

impl Sampler {
    pub(crate) fn create(
        device: &Arc<DeviceShared>,
        desc: &SamplerDescriptor,
    ) -> Result<Arc<Self>, CreateSamplerError> {
        device.check_alive()?;

        if desc.lod_min_clamp < 0.0 {
            return Err(CreateSamplerError::InvalidLodMinClamp(desc.lod_min_clamp));
        }
        if desc.lod_max_clamp < desc.lod_min_clamp {
            return Err(CreateSamplerError::InvalidLodMaxClamp {
                lod_min_clamp: desc.lod_min_clamp,
                lod_max_clamp: desc.lod_max_clamp,
            });
        }
        if !(1..=16).contains(&desc.anisotropy_clamp) {
            return Err(CreateSamplerError::InvalidAnisotropy(desc.anisotropy_clamp));
        }
        if desc.anisotropy_clamp > 1 {
            if !device
                .features
                .contains(wgt::Features::ANISOTROPIC_FILTERING)
            {
                return Err(CreateSamplerError::MissingFeatures(
                    wgt::Features::ANISOTROPIC_FILTERING,
                ));
            }
            let linear = wgt::FilterMode::Linear;
            if desc.min_filter != linear
                || desc.mag_filter != linear
                || desc.mipmap_filter != linear
            {
                return Err(CreateSamplerError::InvalidFilterModeWithAnisotropy(
                    desc.anisotropy_clamp,
                ));
            }
        }

        let raw = {
            let mut ctx = device.lock_context();
            let gl = &mut *ctx.gl;
            let raw = gl.create_sampler().map_err(|_| DeviceError::OutOfMemory)?;

            let (min, mag) =
                conv::map_filter_modes(desc.min_filter, desc.mag_filter, desc.mipmap_filter);
            gl.sampler_parameter_i32(raw, glow::TEXTURE_MIN_FILTER, min as i32);
            gl.sampler_parameter_i32(raw, glow::TEXTURE_MAG_FILTER, mag as i32);
            for (name, mode) in [
                (glow::TEXTURE_WRAP_S, desc.address_mode_u),
                (glow::TEXTURE_WRAP_T, desc.address_mode_v),
                (glow::TEXTURE_WRAP_R, desc.address_mode_w),
            ] {
                gl.sampler_parameter_i32(raw, name, conv::map_address_mode(mode) as i32);
            }
            gl.sampler_parameter_f32(raw, glow::TEXTURE_MIN_LOD, desc.lod_min_clamp);
            gl.sampler_parameter_f32(raw, glow::TEXTURE_MAX_LOD, desc.lod_max_clamp);
            if desc.anisotropy_clamp > 1 {
                gl.sampler_parameter_f32(
                    raw,
                    glow::TEXTURE_MAX_ANISOTROPY,
                    desc.anisotropy_clamp as f32,
                );
            }
            if let Some(compare) = desc.compare {
                gl.sampler_parameter_i32(
                    raw,
                    glow::TEXTURE_COMPARE_MODE,
                    glow::COMPARE_REF_TO_TEXTURE as i32,
                );
                gl.sampler_parameter_i32(
                    raw,
                    glow::TEXTURE_COMPARE_FUNC,
                    conv::map_compare_func(compare) as i32,
                );
            }
            if let Err(err) = check_allocation(gl) {
                gl.delete_sampler(raw);
                return Err(err.into());
            }
            raw
        };

        let linear = wgt::FilterMode::Linear;
        Ok(Arc::new(Self {
            info: ResourceInfo::new(device, "Sampler", desc.label),
            raw: Some(raw),
            comparison: desc.compare.is_some(),
            filtering: desc.min_filter == linear
                || desc.mag_filter == linear
                || desc.mipmap_filter == linear,
        }))
    }

    pub(crate) fn invalid(device: &Arc<DeviceShared>, desc: &SamplerDescriptor) -> Arc<Self> {
        Arc::new(Self {
            info: ResourceInfo::invalid(device, "Sampler", desc.label),
            raw: None,
            comparison: desc.compare.is_some(),
            filtering: false,
        })
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            self.info.device.schedule_release(RawObject::Sampler(raw));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_aspects() {
        use wgt::{TextureAspect as Ta, TextureFormat as Tf};
        assert_eq!(
            FormatAspects::new(Tf::Depth24PlusStencil8, Ta::All),
            FormatAspects::DEPTH | FormatAspects::STENCIL
        );
        assert_eq!(
            FormatAspects::new(Tf::Depth32Float, Ta::StencilOnly),
            FormatAspects::empty()
        );
        assert_eq!(
            FormatAspects::new(Tf::Rgba8Unorm, Ta::All),
            FormatAspects::COLOR
        );
        assert_eq!(
            FormatAspects::new(Tf::Rgba8Unorm, Ta::DepthOnly),
            FormatAspects::empty()
        );
    }

    #[test]
    fn render_only_textures_are_renderbuffers() {
        let mut desc = TextureDescriptor {
            label: None,
            size: wgt::Extent3d {
                width: 4,
                height: 4,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgt::TextureDimension::D2,
            format: wgt::TextureFormat::Depth24Plus,
            usage: TextureUsages::RENDER_ATTACHMENT,
        };
        assert_eq!(Texture::kind_for(&desc), TextureKind::Renderbuffer);
        desc.usage |= TextureUsages::TEXTURE_BINDING;
        assert_eq!(
            Texture::kind_for(&desc),
            TextureKind::Texture {
                target: glow::TEXTURE_2D
            }
        );
    }
}
