use crate::{
    device::DeviceShared,
    error::{device_error_class, DeviceError},
    resource::{Buffer, ResourceError, ResourceInfo, Sampler, TextureView},
    Label,
};
use arrayvec::ArrayVec;
use fxhash::FxHashSet;
use std::{fmt, sync::Arc};
use thiserror::Error;
use wgt::{BufferAddress, BufferSize, BufferUsages, TextureUsages};

#[derive(Clone, Debug)]
pub enum BindingTypeMaxCountErrorKind {
    DynamicUniformBuffers,
    SampledTextures,
    Samplers,
    UniformBuffers,
}

impl BindingTypeMaxCountErrorKind {
    fn to_config_str(&self) -> &'static str {
        match self {
            Self::DynamicUniformBuffers => "max_dynamic_uniform_buffers_per_pipeline_layout",
            Self::SampledTextures => "max_sampled_textures_per_shader_stage",
            Self::Samplers => "max_samplers_per_shader_stage",
            Self::UniformBuffers => "max_uniform_buffers_per_shader_stage",
        }
    }
}

#[derive(Clone, Debug, Error)]
#[error("Too many bindings of type {kind:?} in stage {stage:?}, limit is {limit}, count was {count}. Check the limit `{}` passed to `Device::new`", .kind.to_config_str())]
pub struct BindingTypeMaxCountError {
    pub kind: BindingTypeMaxCountErrorKind,
    pub stage: wgt::ShaderStages,
    pub limit: u32,
    pub count: u32,
}

#[derive(Debug, Default)]
struct PerStageBindingTypeCounter {
    vertex: u32,
    fragment: u32,
}

impl PerStageBindingTypeCounter {
    fn add(&mut self, stage: wgt::ShaderStages, count: u32) {
        if stage.contains(wgt::ShaderStages::VERTEX) {
            self.vertex += count;
        }
        if stage.contains(wgt::ShaderStages::FRAGMENT) {
            self.fragment += count;
        }
    }

    fn max(&self) -> (wgt::ShaderStages, u32) {
        let max_value = self.vertex.max(self.fragment);
        let mut stage = wgt::ShaderStages::NONE;
        if max_value == self.vertex {
            stage |= wgt::ShaderStages::VERTEX
        }
        if max_value == self.fragment {
            stage |= wgt::ShaderStages::FRAGMENT
        }
        (stage, max_value)
    }

    fn merge(&mut self, other: &Self) {
        self.vertex += other.vertex;
        self.fragment += other.fragment;
    }

    fn validate(
        &self,
        limit: u32,
        kind: BindingTypeMaxCountErrorKind,
    ) -> Result<(), BindingTypeMaxCountError> {
        let (stage, count) = self.max();
        if limit < count {
            Err(BindingTypeMaxCountError {
                kind,
                stage,
                limit,
                count,
            })
        } else {
            Ok(())
        }
    }
}

/// Counts bindings by kind, for the per-stage and per-layout limits.
#[derive(Debug, Default)]
pub(crate) struct BindingTypeMaxCountValidator {
    dynamic_uniform_buffers: u32,
    sampled_textures: PerStageBindingTypeCounter,
    samplers: PerStageBindingTypeCounter,
    uniform_buffers: PerStageBindingTypeCounter,
}

impl BindingTypeMaxCountValidator {
    fn add_binding(&mut self, binding: &wgt::BindGroupLayoutEntry) {
        match binding.ty {
            wgt::BindingType::Buffer {
                ty: wgt::BufferBindingType::Uniform,
                has_dynamic_offset,
                ..
            } => {
                self.uniform_buffers.add(binding.visibility, 1);
                if has_dynamic_offset {
                    self.dynamic_uniform_buffers += 1;
                }
            }
            wgt::BindingType::Sampler(_) => {
                self.samplers.add(binding.visibility, 1);
            }
            wgt::BindingType::Texture { .. } => {
                self.sampled_textures.add(binding.visibility, 1);
            }
            wgt::BindingType::Buffer { .. } => {}
        }
    }

    fn merge(&mut self, other: &Self) {
        self.dynamic_uniform_buffers += other.dynamic_uniform_buffers;
        self.sampled_textures.merge(&other.sampled_textures);
        self.samplers.merge(&other.samplers);
        self.uniform_buffers.merge(&other.uniform_buffers);
    }

    fn validate(&self, limits: &wgt::Limits) -> Result<(), BindingTypeMaxCountError> {
        if limits.max_dynamic_uniform_buffers_per_pipeline_layout < self.dynamic_uniform_buffers {
            return Err(BindingTypeMaxCountError {
                kind: BindingTypeMaxCountErrorKind::DynamicUniformBuffers,
                stage: wgt::ShaderStages::NONE,
                limit: limits.max_dynamic_uniform_buffers_per_pipeline_layout,
                count: self.dynamic_uniform_buffers,
            });
        }
        self.sampled_textures.validate(
            limits.max_sampled_textures_per_shader_stage,
            BindingTypeMaxCountErrorKind::SampledTextures,
        )?;
        self.samplers.validate(
            limits.max_samplers_per_shader_stage,
            BindingTypeMaxCountErrorKind::Samplers,
        )?;
        self.uniform_buffers.validate(
            limits.max_uniform_buffers_per_shader_stage,
            BindingTypeMaxCountErrorKind::UniformBuffers,
        )?;
        Ok(())
    }
}

#[derive(Clone, Debug, Error)]
pub enum CreateBindGroupLayoutError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("Conflicting binding at index {0}")]
    ConflictBinding(u32),
    #[error("Binding index {binding} is greater than the maximum index {maximum}")]
    InvalidBindingIndex { binding: u32, maximum: u32 },
    #[error("Binding {0} has a type that is not supported by the context")]
    UnsupportedBindingType(u32),
    #[error("Sampler at binding {0} must directly follow a texture binding")]
    UnpairedSampler(u32),
    #[error(transparent)]
    TooManyBindings(#[from] BindingTypeMaxCountError),
}

#[derive(Clone, Debug, Error)]
pub enum CreatePipelineLayoutError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error("Bind group layout count {actual} exceeds device bind group limit {max}")]
    TooManyGroups { actual: usize, max: usize },
    #[error(transparent)]
    TooManyBindings(#[from] BindingTypeMaxCountError),
}

#[derive(Clone, Debug, Error)]
pub enum CreateBindGroupError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error("Number of bindings in bind group descriptor ({actual}) does not match the number of bindings defined in the bind group layout ({expected})")]
    BindingsNumMismatch { actual: usize, expected: usize },
    #[error("Binding {0} is used at least twice in the descriptor")]
    DuplicateBinding(u32),
    #[error("Unable to find a corresponding declaration for the given binding {0}")]
    MissingBindingDeclaration(u32),
    #[error("Binding {binding} has a different type ({actual}) than the one in the layout ({expected:?})")]
    WrongBindingType {
        binding: u32,
        actual: &'static str,
        expected: wgt::BindingType,
    },
    #[error("Usage flags {actual:?} of buffer at binding {binding} don't contain {expected:?}")]
    MissingBufferUsage {
        binding: u32,
        actual: BufferUsages,
        expected: BufferUsages,
    },
    #[error("Buffer offset {offset} at binding {binding} does not respect device's requested `min_uniform_buffer_offset_alignment` limit {alignment}")]
    UnalignedBufferOffset {
        binding: u32,
        offset: BufferAddress,
        alignment: u32,
    },
    #[error("Buffer binding {binding} range {given} exceeds `max_uniform_buffer_binding_size` limit {limit}")]
    BufferRangeTooLarge {
        binding: u32,
        given: u64,
        limit: u32,
    },
    #[error("Buffer binding {binding} range {offset}..{end} is out of bounds of a buffer of size {size}")]
    BindingRangeOutOfBounds {
        binding: u32,
        offset: BufferAddress,
        end: BufferAddress,
        size: BufferAddress,
    },
    #[error("Binding size {actual} of {binding} is less than minimum {min}")]
    BindingSizeTooSmall {
        binding: u32,
        actual: u64,
        min: u64,
    },
    #[error("Binding size of {0} is zero")]
    BindingZeroSize(u32),
    #[error("Sampler at binding {binding} has comparison = {comparison}, which doesn't match the layout")]
    WrongSamplerComparison { binding: u32, comparison: bool },
    #[error("Sampler at binding {0} filters, while the layout requires a non-filtering sampler")]
    WrongSamplerFiltering(u32),
    #[error("Usage flags {actual:?} of texture at binding {binding} don't contain {expected:?}")]
    MissingTextureUsage {
        binding: u32,
        actual: TextureUsages,
        expected: TextureUsages,
    },
    #[error("Texture binding {binding} expects dimension = {layout_dimension:?}, but given a view with dimension = {view_dimension:?}")]
    InvalidTextureDimension {
        binding: u32,
        layout_dimension: wgt::TextureViewDimension,
        view_dimension: wgt::TextureViewDimension,
    },
    #[error("Texture binding {binding} expects sample type = {layout_sample_type:?}, but given a view with format = {view_format:?}")]
    InvalidTextureSampleType {
        binding: u32,
        layout_sample_type: wgt::TextureSampleType,
        view_format: wgt::TextureFormat,
    },
    #[error("View at binding {0} covers only part of its texture, which can't be sampled")]
    PartialTextureView(u32),
}

device_error_class!(
    CreateBindGroupLayoutError,
    CreatePipelineLayoutError,
    CreateBindGroupError
);

/// Describes a [`BindGroupLayout`].
#[derive(Clone, Debug, Default)]
pub struct BindGroupLayoutDescriptor<'a> {
    /// Debug label of the bind group layout.
    pub label: Label<'a>,
    /// Bindings of the layout, in any order.
    pub entries: &'a [wgt::BindGroupLayoutEntry],
}

/// Declares the bindings of one group.
///
/// Shaders address binding `b` of the group at index `g` of a pipeline
/// layout through the flat slot `offset(g) + b`.
pub struct BindGroupLayout {
    pub(crate) info: ResourceInfo,
    /// Sorted by binding index.
    pub(crate) entries: Vec<wgt::BindGroupLayoutEntry>,
    pub(crate) dynamic_count: usize,
    count_validator: BindingTypeMaxCountValidator,
}

impl fmt::Debug for BindGroupLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindGroupLayout")
            .field("label", &self.info.label)
            .field("entries", &self.entries)
            .finish()
    }
}

impl BindGroupLayout {
    pub(crate) fn create(
        device: &Arc<DeviceShared>,
        desc: &BindGroupLayoutDescriptor,
    ) -> Result<Arc<Self>, CreateBindGroupLayoutError> {
        device.check_alive()?;

        let mut entries = desc.entries.to_vec();
        entries.sort_by_key(|entry| entry.binding);
        for pair in entries.windows(2) {
            if pair[0].binding == pair[1].binding {
                return Err(CreateBindGroupLayoutError::ConflictBinding(pair[0].binding));
            }
        }

        let mut count_validator = BindingTypeMaxCountValidator::default();
        for (index, entry) in entries.iter().enumerate() {
            let maximum = device.limits.max_bindings_per_bind_group - 1;
            if entry.binding > maximum {
                return Err(CreateBindGroupLayoutError::InvalidBindingIndex {
                    binding: entry.binding,
                    maximum,
                });
            }
            let supported = match entry.ty {
                wgt::BindingType::Buffer { ty, .. } => ty == wgt::BufferBindingType::Uniform,
                wgt::BindingType::Sampler(_) => true,
                wgt::BindingType::Texture {
                    view_dimension,
                    multisampled,
                    ..
                } => !multisampled && crate::conv::map_view_dimension(view_dimension).is_some(),
            };
            if !supported {
                return Err(CreateBindGroupLayoutError::UnsupportedBindingType(
                    entry.binding,
                ));
            }
            if let wgt::BindingType::Sampler(_) = entry.ty {
                let paired = index
                    .checked_sub(1)
                    .map(|prev| &entries[prev])
                    .filter(|prev| prev.binding + 1 == entry.binding)
                    .map_or(false, |prev| {
                        matches!(prev.ty, wgt::BindingType::Texture { .. })
                    });
                if !paired {
                    return Err(CreateBindGroupLayoutError::UnpairedSampler(entry.binding));
                }
            }
            count_validator.add_binding(entry);
        }
        count_validator.validate(&device.limits)?;

        Ok(Arc::new(Self {
            info: ResourceInfo::new(device, "BindGroupLayout", desc.label),
            dynamic_count: entries
                .iter()
                .filter(|entry| entry.ty.has_dynamic_offset())
                .count(),
            entries,
            count_validator,
        }))
    }

    pub(crate) fn invalid(device: &Arc<DeviceShared>, desc: &BindGroupLayoutDescriptor) -> Arc<Self> {
        Arc::new(Self {
            info: ResourceInfo::invalid(device, "BindGroupLayout", desc.label),
            entries: Vec::new(),
            dynamic_count: 0,
            count_validator: BindingTypeMaxCountValidator::default(),
        })
    }

    pub(crate) fn entry(&self, binding: u32) -> Option<&wgt::BindGroupLayoutEntry> {
        self.entries
            .binary_search_by_key(&binding, |entry| entry.binding)
            .ok()
            .map(|index| &self.entries[index])
    }

    /// Number of flat slots the group occupies.
    pub(crate) fn slot_count(&self) -> u32 {
        self.entries.last().map_or(0, |entry| entry.binding + 1)
    }

    /// Returns `true` if groups created with `other` can be bound where
    /// this layout is expected.
    pub(crate) fn is_compatible(self: &Arc<Self>, other: &Arc<Self>) -> bool {
        Arc::ptr_eq(self, other) || self.entries == other.entries
    }
}

/// Describes a [`PipelineLayout`].
#[derive(Clone, Debug, Default)]
pub struct PipelineLayoutDescriptor<'a> {
    /// Debug label of the pipeline layout.
    pub label: Label<'a>,
    /// Layouts of the bind groups, by group index.
    pub bind_group_layouts: &'a [&'a Arc<BindGroupLayout>],
}

#[derive(Debug)]
pub(crate) struct GroupSlots {
    pub layout: Arc<BindGroupLayout>,
    /// First flat slot of the group.
    pub offset: u32,
}

/// Ordered bind group layouts with their flat slot offsets.
pub struct PipelineLayout {
    pub(crate) info: ResourceInfo,
    pub(crate) groups: ArrayVec<GroupSlots, { wgt::MAX_BIND_GROUPS }>,
}

impl fmt::Debug for PipelineLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineLayout")
            .field("label", &self.info.label)
            .field("groups", &self.groups)
            .finish()
    }
}

impl PipelineLayout {
    pub(crate) fn create(
        device: &Arc<DeviceShared>,
        desc: &PipelineLayoutDescriptor,
    ) -> Result<Arc<Self>, CreatePipelineLayoutError> {
        device.check_alive()?;

        let max = device.limits.max_bind_groups as usize;
        if desc.bind_group_layouts.len() > max {
            return Err(CreatePipelineLayoutError::TooManyGroups {
                actual: desc.bind_group_layouts.len(),
                max,
            });
        }

        let mut count_validator = BindingTypeMaxCountValidator::default();
        let mut groups = ArrayVec::new();
        let mut offset = 0;
        for &layout in desc.bind_group_layouts {
            layout.info.check(device)?;
            count_validator.merge(&layout.count_validator);
            groups.push(GroupSlots {
                layout: Arc::clone(layout),
                offset,
            });
            offset += layout.slot_count();
        }
        count_validator.validate(&device.limits)?;

        Ok(Arc::new(Self {
            info: ResourceInfo::new(device, "PipelineLayout", desc.label),
            groups,
        }))
    }

    pub(crate) fn invalid(device: &Arc<DeviceShared>, desc: &PipelineLayoutDescriptor) -> Arc<Self> {
        Arc::new(Self {
            info: ResourceInfo::invalid(device, "PipelineLayout", desc.label),
            groups: ArrayVec::new(),
        })
    }

    /// First flat slot of the group at `index`.
    pub fn group_offset(&self, index: usize) -> Option<u32> {
        self.groups.get(index).map(|group| group.offset)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

/// A buffer range bound to a uniform buffer binding.
#[derive(Clone, Debug)]
pub struct BufferBinding<'a> {
    pub buffer: &'a Arc<Buffer>,
    pub offset: BufferAddress,
    /// Size of the range, `None` to bind up to the end of the buffer.
    pub size: Option<BufferSize>,
}

/// Resource bound to a single binding.
#[derive(Clone, Debug)]
pub enum BindingResource<'a> {
    Buffer(BufferBinding<'a>),
    Sampler(&'a Arc<Sampler>),
    TextureView(&'a Arc<TextureView>),
}

impl BindingResource<'_> {
    fn kind(&self) -> &'static str {
        match *self {
            Self::Buffer(_) => "buffer",
            Self::Sampler(_) => "sampler",
            Self::TextureView(_) => "texture view",
        }
    }
}

#[derive(Clone, Debug)]
pub struct BindGroupEntry<'a> {
    pub binding: u32,
    pub resource: BindingResource<'a>,
}

/// Describes a [`BindGroup`].
#[derive(Clone, Debug)]
pub struct BindGroupDescriptor<'a> {
    /// Debug label of the bind group.
    pub label: Label<'a>,
    pub layout: &'a Arc<BindGroupLayout>,
    /// One entry per binding of `layout`.
    pub entries: &'a [BindGroupEntry<'a>],
}

#[derive(Debug)]
pub(crate) enum BoundResource {
    Buffer {
        buffer: Arc<Buffer>,
        offset: BufferAddress,
        size: Option<BufferSize>,
        dynamic: bool,
    },
    Sampler(Arc<Sampler>),
    TextureView(Arc<TextureView>),
}

#[derive(Debug)]
pub(crate) struct BoundEntry {
    pub binding: u32,
    pub resource: BoundResource,
}

/// Resources bound to the bindings of a layout.
pub struct BindGroup {
    pub(crate) info: ResourceInfo,
    pub(crate) layout: Arc<BindGroupLayout>,
    /// In the order of the layout entries.
    pub(crate) entries: Vec<BoundEntry>,
}

impl fmt::Debug for BindGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindGroup")
            .field("label", &self.info.label)
            .field("layout", &self.layout.info.label)
            .finish()
    }
}

fn is_sample_type_bindable(
    actual: wgt::TextureSampleType,
    declared: wgt::TextureSampleType,
) -> bool {
    use wgt::TextureSampleType as Tst;
    match (actual, declared) {
        (Tst::Float { filterable }, Tst::Float { filterable: required }) => {
            filterable || !required
        }
        (Tst::Depth, Tst::Depth) | (Tst::Depth, Tst::Float { filterable: false }) => true,
        (Tst::Sint, Tst::Sint) | (Tst::Uint, Tst::Uint) => true,
        _ => false,
    }
}

impl BindGroup {
    pub(crate) fn create(
        device: &Arc<DeviceShared>,
        desc: &BindGroupDescriptor,
    ) -> Result<Arc<Self>, CreateBindGroupError> {
        device.check_alive()?;
        let layout = desc.layout;
        layout.info.check(device)?;

        let expected = layout.entries.len();
        if desc.entries.len() != expected {
            return Err(CreateBindGroupError::BindingsNumMismatch {
                actual: desc.entries.len(),
                expected,
            });
        }

        let mut used = FxHashSet::default();
        let mut entries = Vec::with_capacity(expected);
        for entry in desc.entries {
            let binding = entry.binding;
            if !used.insert(binding) {
                return Err(CreateBindGroupError::DuplicateBinding(binding));
            }
            let decl = layout
                .entry(binding)
                .ok_or(CreateBindGroupError::MissingBindingDeclaration(binding))?;
            let resource = Self::bind_resource(device, decl, &entry.resource)?;
            entries.push(BoundEntry { binding, resource });
        }
        entries.sort_by_key(|entry| entry.binding);

        Ok(Arc::new(Self {
            info: ResourceInfo::new(device, "BindGroup", desc.label),
            layout: Arc::clone(layout),
            entries,
        }))
    }

    pub(crate) fn invalid(device: &Arc<DeviceShared>, desc: &BindGroupDescriptor) -> Arc<Self> {
        Arc::new(Self {
            info: ResourceInfo::invalid(device, "BindGroup", desc.label),
            layout: Arc::clone(desc.layout),
            entries: Vec::new(),
        })
    }

    fn bind_resource(
        device: &Arc<DeviceShared>,
        decl: &wgt::BindGroupLayoutEntry,
        resource: &BindingResource,
    ) -> Result<BoundResource, CreateBindGroupError> {
        let binding = decl.binding;
        match (resource, decl.ty) {
            (
                &BindingResource::Buffer(ref bb),
                wgt::BindingType::Buffer {
                    has_dynamic_offset,
                    min_binding_size,
                    ..
                },
            ) => {
                let buffer = bb.buffer;
                buffer.info.check(device)?;
                if !buffer.usage.contains(BufferUsages::UNIFORM) {
                    return Err(CreateBindGroupError::MissingBufferUsage {
                        binding,
                        actual: buffer.usage,
                        expected: BufferUsages::UNIFORM,
                    });
                }
                let alignment = device.limits.min_uniform_buffer_offset_alignment;
                if bb.offset % alignment as u64 != 0 {
                    return Err(CreateBindGroupError::UnalignedBufferOffset {
                        binding,
                        offset: bb.offset,
                        alignment,
                    });
                }
                let end = match bb.size {
                    Some(size) => bb.offset + size.get(),
                    None => buffer.size,
                };
                if bb.offset > end || end > buffer.size {
                    return Err(CreateBindGroupError::BindingRangeOutOfBounds {
                        binding,
                        offset: bb.offset,
                        end,
                        size: buffer.size,
                    });
                }
                let bind_size = end - bb.offset;
                if bind_size == 0 {
                    return Err(CreateBindGroupError::BindingZeroSize(binding));
                }
                let limit = device.limits.max_uniform_buffer_binding_size;
                if bind_size > limit as u64 {
                    return Err(CreateBindGroupError::BufferRangeTooLarge {
                        binding,
                        given: bind_size,
                        limit,
                    });
                }
                if let Some(min) = min_binding_size {
                    if bind_size < min.get() {
                        return Err(CreateBindGroupError::BindingSizeTooSmall {
                            binding,
                            actual: bind_size,
                            min: min.get(),
                        });
                    }
                }
                Ok(BoundResource::Buffer {
                    buffer: Arc::clone(buffer),
                    offset: bb.offset,
                    size: bb.size,
                    dynamic: has_dynamic_offset,
                })
            }
            (&BindingResource::Sampler(sampler), wgt::BindingType::Sampler(ty)) => {
                sampler.info.check(device)?;
                let comparison = ty == wgt::SamplerBindingType::Comparison;
                if sampler.comparison != comparison {
                    return Err(CreateBindGroupError::WrongSamplerComparison {
                        binding,
                        comparison: sampler.comparison,
                    });
                }
                if ty == wgt::SamplerBindingType::NonFiltering && sampler.filtering {
                    return Err(CreateBindGroupError::WrongSamplerFiltering(binding));
                }
                Ok(BoundResource::Sampler(Arc::clone(sampler)))
            }
            (
                &BindingResource::TextureView(view),
                wgt::BindingType::Texture {
                    sample_type,
                    view_dimension,
                    ..
                },
            ) => {
                view.info.check(device)?;
                let texture = &view.texture;
                texture.info.check(device)?;
                if !texture.usage().contains(TextureUsages::TEXTURE_BINDING) {
                    return Err(CreateBindGroupError::MissingTextureUsage {
                        binding,
                        actual: texture.usage(),
                        expected: TextureUsages::TEXTURE_BINDING,
                    });
                }
                if view.dimension != view_dimension {
                    return Err(CreateBindGroupError::InvalidTextureDimension {
                        binding,
                        layout_dimension: view_dimension,
                        view_dimension: view.dimension,
                    });
                }
                let aspect = if view.aspects == crate::resource::FormatAspects::STENCIL {
                    wgt::TextureAspect::StencilOnly
                } else {
                    wgt::TextureAspect::All
                };
                let compatible = view
                    .format
                    .sample_type(aspect)
                    .map_or(false, |actual| is_sample_type_bindable(actual, sample_type));
                if !compatible {
                    return Err(CreateBindGroupError::InvalidTextureSampleType {
                        binding,
                        layout_sample_type: sample_type,
                        view_format: view.format,
                    });
                }
                if !view.is_sampleable() {
                    return Err(CreateBindGroupError::PartialTextureView(binding));
                }
                Ok(BoundResource::TextureView(Arc::clone(view)))
            }
            (resource, expected) => Err(CreateBindGroupError::WrongBindingType {
                binding,
                actual: resource.kind(),
                expected,
            }),
        }
    }

    pub fn layout(&self) -> &Arc<BindGroupLayout> {
        &self.layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_type_binding() {
        use wgt::TextureSampleType as Tst;
        let filterable = Tst::Float { filterable: true };
        let unfilterable = Tst::Float { filterable: false };
        assert!(is_sample_type_bindable(filterable, unfilterable));
        assert!(!is_sample_type_bindable(unfilterable, filterable));
        assert!(is_sample_type_bindable(Tst::Depth, unfilterable));
        assert!(!is_sample_type_bindable(Tst::Depth, filterable));
        assert!(!is_sample_type_bindable(Tst::Uint, Tst::Sint));
    }

    #[test]
    fn stage_counter_reports_busiest_stage() {
        let mut counter = PerStageBindingTypeCounter::default();
        counter.add(wgt::ShaderStages::VERTEX_FRAGMENT, 2);
        counter.add(wgt::ShaderStages::FRAGMENT, 1);
        assert_eq!(counter.max(), (wgt::ShaderStages::FRAGMENT, 3));
        let err = counter
            .validate(2, BindingTypeMaxCountErrorKind::Samplers)
            .unwrap_err();
        assert_eq!(err.count, 3);
        assert!(err.to_string().contains("max_samplers_per_shader_stage"));
    }
}
