use crate::{
    binding_model::PipelineLayout,
    context::{GlContext, RawProgram, RawShader, RawVertexArray},
    conv,
    device::{check_allocation, DeviceShared, RawObject},
    error::{device_error_class, DeviceError},
    resource::{ResourceError, ResourceInfo},
    Label,
};
use arrayvec::ArrayVec;
use fxhash::{FxHashMap, FxHashSet};
use std::{borrow::Cow, fmt, sync::Arc};
use thiserror::Error;
use wgt::{BufferAddress, ColorWrites, TextureFormat, VertexStepMode};

/// Fragment stage linked into pipelines that don't declare one.
const EMPTY_FRAGMENT_SOURCE: &str = "#version 300 es\nvoid main() {}\n";

/// The only supported entry point name.
const ENTRY_POINT: &str = "main";

/// Parses the `_group<G>_binding<B>` prefix of a uniform or uniform block
/// name, returning `(G, B)`.
///
/// The prefix must be followed by the end of the name or by `_`.
pub(crate) fn parse_binding_prefix(name: &str) -> Option<(u32, u32)> {
    fn split_number(s: &str) -> Option<(u32, &str)> {
        let end = s
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(s.len());
        if end == 0 {
            return None;
        }
        Some((s[..end].parse().ok()?, &s[end..]))
    }

    let rest = name.strip_prefix("_group")?;
    let (group, rest) = split_number(rest)?;
    let rest = rest.strip_prefix("_binding")?;
    let (binding, rest) = split_number(rest)?;
    if rest.is_empty() || rest.starts_with('_') {
        Some((group, binding))
    } else {
        None
    }
}

/// Pipeline stage a shader module is compiled for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    fn to_gl(self) -> u32 {
        match self {
            Self::Vertex => glow::VERTEX_SHADER,
            Self::Fragment => glow::FRAGMENT_SHADER,
        }
    }
}

/// Source of a [`ShaderModule`].
#[derive(Clone, Debug)]
pub enum ShaderSource<'a> {
    /// GLSL ES 3.00 source. Resources are declared with the
    /// `_group<G>_binding<B>` name prefix.
    Glsl {
        shader: Cow<'a, str>,
        stage: ShaderStage,
    },
}

/// Describes a [`ShaderModule`].
#[derive(Clone, Debug)]
pub struct ShaderModuleDescriptor<'a> {
    /// Debug label of the shader module.
    pub label: Label<'a>,
    pub source: ShaderSource<'a>,
}

#[derive(Clone, Debug, Error)]
pub enum CreateShaderModuleError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("Shader source is empty")]
    EmptySource,
    #[error("Shader failed to compile: {0}")]
    Compilation(String),
}

#[derive(Clone, Debug, Error)]
pub enum CreateRenderPipelineError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error("Module of the {expected:?} stage was compiled for the {actual:?} stage")]
    WrongStage {
        expected: ShaderStage,
        actual: ShaderStage,
    },
    #[error("Entry point '{0}' is not supported, only `main` is")]
    UnsupportedEntryPoint(String),
    #[error("Program failed to link: {0}")]
    Link(String),
    #[error("The number of vertex buffers {given} exceeds the limit {limit}")]
    TooManyVertexBuffers { given: u32, limit: u32 },
    #[error("The total number of vertex attributes {given} exceeds the limit {limit}")]
    TooManyVertexAttributes { given: u32, limit: u32 },
    #[error("Vertex buffer {index} stride {given} exceeds the limit {limit}")]
    VertexStrideTooLarge { index: u32, given: u32, limit: u32 },
    #[error("Vertex attribute at location {location} has invalid offset {offset}")]
    InvalidVertexAttributeOffset {
        location: u32,
        offset: BufferAddress,
    },
    #[error("Shader location {location} exceeds the limit {limit}")]
    InvalidShaderLocation { location: u32, limit: u32 },
    #[error("Two or more vertex attributes were assigned to the same location in the shader: {0}")]
    ShaderLocationClash(u32),
    #[error("The number of color targets {given} exceeds the limit {limit}")]
    TooManyColorTargets { given: usize, limit: u32 },
    #[error("Format {0:?} does not have a color aspect")]
    FormatNotColor(TextureFormat),
    #[error("Format {0:?} does not have a depth aspect")]
    FormatNotDepth(TextureFormat),
    #[error("Stencil state requires a format with a stencil aspect, got {0:?}")]
    FormatNotStencil(TextureFormat),
    #[error("Color targets don't share a single blend state and write mask")]
    DivergentColorTargets,
    #[error("Uniform '{0}' has no `_group<G>_binding<B>` prefix")]
    UnprefixedName(String),
    #[error("Uniform '{name}' refers to group {group}, which is not in the pipeline layout")]
    MissingGroup { name: String, group: u32 },
    #[error("Uniform '{name}' refers to binding {binding} of group {group}, which is not declared")]
    MissingBinding {
        name: String,
        group: u32,
        binding: u32,
    },
    #[error("Uniforms '{first}' and '{second}' are both bound to group {group} binding {binding}")]
    DuplicateBinding {
        first: String,
        second: String,
        group: u32,
        binding: u32,
    },
    #[error("Uniform '{name}' is a {expected}, but the layout declares {actual:?}")]
    WrongBindingType {
        name: String,
        expected: &'static str,
        actual: wgt::BindingType,
    },
    #[error("Sampler uniform '{name}' can't sample the texture declared in the layout ({actual:?})")]
    IncompatibleTexture {
        name: String,
        actual: wgt::BindingType,
    },
    #[error("Sampler uniform '{name}' needs a sampler at group {group} binding {binding}")]
    MissingSampler {
        name: String,
        group: u32,
        binding: u32,
    },
    #[error("Shadow sampler uniform '{0}' needs a comparison sampler")]
    ComparisonSamplerRequired(String),
    #[error("Uniform '{0}' is neither a uniform block nor a sampler")]
    PlainUniform(String),
}

device_error_class!(CreateShaderModuleError, CreateRenderPipelineError);

/// A compiled shader stage.
pub struct ShaderModule {
    pub(crate) info: ResourceInfo,
    pub(crate) stage: ShaderStage,
    pub(crate) raw: Option<RawShader>,
}

impl fmt::Debug for ShaderModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderModule")
            .field("label", &self.info.label)
            .field("stage", &self.stage)
            .finish()
    }
}

fn compile_shader(
    gl: &mut dyn GlContext,
    stage: ShaderStage,
    source: &str,
) -> Result<RawShader, CreateShaderModuleError> {
    let raw = gl
        .create_shader(stage.to_gl())
        .map_err(|_| DeviceError::OutOfMemory)?;
    gl.shader_source(raw, source);
    gl.compile_shader(raw);
    if !gl.get_shader_compile_status(raw) {
        let log = gl.get_shader_info_log(raw);
        gl.delete_shader(raw);
        return Err(CreateShaderModuleError::Compilation(log));
    }
    Ok(raw)
}

impl ShaderModule {
    pub(crate) fn create(
        device: &Arc<DeviceShared>,
        desc: &ShaderModuleDescriptor,
    ) -> Result<Arc<Self>, CreateShaderModuleError> {
        device.check_alive()?;
        let ShaderSource::Glsl { ref shader, stage } = desc.source;
        if shader.trim().is_empty() {
            return Err(CreateShaderModuleError::EmptySource);
        }

        let raw = {
            let mut ctx = device.lock_context();
            let raw = compile_shader(&mut *ctx.gl, stage, shader)?;
            if let Err(err) = check_allocation(&mut *ctx.gl) {
                ctx.gl.delete_shader(raw);
                return Err(err.into());
            }
            raw
        };

        Ok(Arc::new(Self {
            info: ResourceInfo::new(device, "ShaderModule", desc.label),
            stage,
            raw: Some(raw),
        }))
    }

    pub(crate) fn invalid(device: &Arc<DeviceShared>, desc: &ShaderModuleDescriptor) -> Arc<Self> {
        let ShaderSource::Glsl { stage, .. } = desc.source;
        Arc::new(Self {
            info: ResourceInfo::invalid(device, "ShaderModule", desc.label),
            stage,
            raw: None,
        })
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            self.info.device.schedule_release(RawObject::Shader(raw));
        }
    }
}

/// Describes how a vertex buffer is interpreted.
#[derive(Clone, Debug, Default)]
pub struct VertexBufferLayout<'a> {
    /// The stride, in bytes, between elements of this buffer.
    pub array_stride: BufferAddress,
    pub step_mode: VertexStepMode,
    pub attributes: &'a [wgt::VertexAttribute],
}

/// Describes the vertex stage of a render pipeline.
#[derive(Clone, Debug)]
pub struct VertexState<'a> {
    pub module: &'a Arc<ShaderModule>,
    pub entry_point: &'a str,
    /// Layouts of the vertex buffers, by slot.
    pub buffers: &'a [VertexBufferLayout<'a>],
}

/// Describes the fragment stage of a render pipeline.
#[derive(Clone, Debug)]
pub struct FragmentState<'a> {
    pub module: &'a Arc<ShaderModule>,
    pub entry_point: &'a str,
    /// One entry per color attachment, `None` for attachments the
    /// pipeline doesn't write.
    pub targets: &'a [Option<wgt::ColorTargetState>],
}

/// Describes a [`RenderPipeline`].
#[derive(Clone, Debug)]
pub struct RenderPipelineDescriptor<'a> {
    /// Debug label of the pipeline.
    pub label: Label<'a>,
    pub layout: &'a Arc<PipelineLayout>,
    pub vertex: VertexState<'a>,
    pub primitive: wgt::PrimitiveState,
    pub depth_stencil: Option<wgt::DepthStencilState>,
    pub fragment: Option<FragmentState<'a>>,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct AttributeDesc {
    pub location: u32,
    pub offset: u32,
    pub format_desc: conv::VertexFormatDesc,
}

#[derive(Clone, Debug)]
pub(crate) struct VertexBufferDesc {
    pub stride: u32,
    pub step: VertexStepMode,
    pub attributes: Vec<AttributeDesc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BlendComponentDesc {
    pub src: u32,
    pub dst: u32,
    pub equation: u32,
}

impl BlendComponentDesc {
    fn new(component: &wgt::BlendComponent) -> Self {
        Self {
            src: conv::map_blend_factor(component.src_factor),
            dst: conv::map_blend_factor(component.dst_factor),
            equation: conv::map_blend_operation(component.operation),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BlendDesc {
    pub color: BlendComponentDesc,
    pub alpha: BlendComponentDesc,
}

/// Color output state shared by every color target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ColorTargetDesc {
    pub mask: ColorWrites,
    pub blend: Option<BlendDesc>,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct PrimitiveDesc {
    pub topology: u32,
    pub front_face: u32,
    /// Zero when culling is disabled.
    pub cull_face: u32,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct DepthState {
    pub function: u32,
    pub mask: bool,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct StencilOps {
    pub pass: u32,
    pub fail: u32,
    pub depth_fail: u32,
}

impl StencilOps {
    fn new(face: &wgt::StencilFaceState) -> Self {
        Self {
            pass: conv::map_stencil_op(face.pass_op),
            fail: conv::map_stencil_op(face.fail_op),
            depth_fail: conv::map_stencil_op(face.depth_fail_op),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct StencilSide {
    pub function: u32,
    pub ops: StencilOps,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct StencilDesc {
    pub front: StencilSide,
    pub back: StencilSide,
    pub read_mask: u32,
    pub write_mask: u32,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct DepthStencilDesc {
    pub format: TextureFormat,
    pub depth: Option<DepthState>,
    pub stencil: Option<StencilDesc>,
    pub bias: wgt::DepthBiasState,
}

/// A linked program with the fixed-function state it is drawn with.
pub struct RenderPipeline {
    pub(crate) info: ResourceInfo,
    pub(crate) layout: Arc<PipelineLayout>,
    pub(crate) program: Option<RawProgram>,
    pub(crate) vertex_array: Option<RawVertexArray>,
    pub(crate) vertex_buffers: ArrayVec<VertexBufferDesc, { wgt::MAX_VERTEX_BUFFERS }>,
    pub(crate) primitive: PrimitiveDesc,
    pub(crate) color_formats: ArrayVec<Option<TextureFormat>, { wgt::MAX_COLOR_ATTACHMENTS }>,
    pub(crate) color_target: ColorTargetDesc,
    pub(crate) depth_stencil: Option<DepthStencilDesc>,
}

impl fmt::Debug for RenderPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderPipeline")
            .field("label", &self.info.label)
            .field("layout", &self.layout.info.label)
            .field("vertex_buffers", &self.vertex_buffers.len())
            .field("color_formats", &self.color_formats)
            .finish()
    }
}

impl RenderPipeline {
    pub(crate) fn create(
        device: &Arc<DeviceShared>,
        desc: &RenderPipelineDescriptor,
    ) -> Result<Arc<Self>, CreateRenderPipelineError> {
        profiling::scope!("Device::create_render_pipeline");
        device.check_alive()?;
        desc.layout.info.check(device)?;

        let vertex_module = Self::check_stage(
            device,
            desc.vertex.module,
            desc.vertex.entry_point,
            ShaderStage::Vertex,
        )?;
        let fragment_module = match desc.fragment {
            Some(ref fragment) => Some(Self::check_stage(
                device,
                fragment.module,
                fragment.entry_point,
                ShaderStage::Fragment,
            )?),
            None => None,
        };

        let vertex_buffers = Self::describe_vertex_buffers(&device.limits, desc.vertex.buffers)?;
        let targets = desc.fragment.as_ref().map_or(&[][..], |f| f.targets);
        let (color_formats, color_target) = Self::describe_color_targets(&device.limits, targets)?;
        let depth_stencil = match desc.depth_stencil {
            Some(ref ds) => Some(Self::describe_depth_stencil(ds)?),
            None => None,
        };

        let (program, vertex_array) = {
            let mut ctx = device.lock_context();
            let gl = &mut *ctx.gl;
            let program = link_program(gl, vertex_module, fragment_module)?;
            if let Err(err) = reflect_bindings(gl, program, desc.layout) {
                gl.delete_program(program);
                return Err(err);
            }
            let vertex_array = match build_vertex_array(gl, &vertex_buffers) {
                Ok(vertex_array) => vertex_array,
                Err(err) => {
                    gl.delete_program(program);
                    return Err(err.into());
                }
            };
            if let Err(err) = check_allocation(gl) {
                gl.delete_vertex_array(vertex_array);
                gl.delete_program(program);
                return Err(err.into());
            }
            (program, vertex_array)
        };

        let pipeline = Self {
            info: ResourceInfo::new(device, "RenderPipeline", desc.label),
            layout: Arc::clone(desc.layout),
            program: Some(program),
            vertex_array: Some(vertex_array),
            vertex_buffers,
            primitive: PrimitiveDesc {
                topology: conv::map_primitive_topology(desc.primitive.topology),
                front_face: conv::map_front_face(desc.primitive.front_face),
                cull_face: conv::map_cull_face(desc.primitive.cull_mode),
            },
            color_formats,
            color_target,
            depth_stencil,
        };
        log::debug!(
            "Created render pipeline '{}' with {} vertex buffers and {} color targets",
            pipeline.info.label,
            pipeline.vertex_buffers.len(),
            pipeline.color_formats.len()
        );
        Ok(Arc::new(pipeline))
    }

    pub(crate) fn invalid(
        device: &Arc<DeviceShared>,
        desc: &RenderPipelineDescriptor,
    ) -> Arc<Self> {
        Arc::new(Self {
            info: ResourceInfo::invalid(device, "RenderPipeline", desc.label),
            layout: Arc::clone(desc.layout),
            program: None,
            vertex_array: None,
            vertex_buffers: ArrayVec::new(),
            primitive: PrimitiveDesc {
                topology: glow::TRIANGLES,
                front_face: glow::CCW,
                cull_face: 0,
            },
            color_formats: ArrayVec::new(),
            color_target: ColorTargetDesc {
                mask: ColorWrites::ALL,
                blend: None,
            },
            depth_stencil: None,
        })
    }

    fn check_stage(
        device: &Arc<DeviceShared>,
        module: &ShaderModule,
        entry_point: &str,
        expected: ShaderStage,
    ) -> Result<RawShader, CreateRenderPipelineError> {
        module.info.check(device)?;
        if module.stage != expected {
            return Err(CreateRenderPipelineError::WrongStage {
                expected,
                actual: module.stage,
            });
        }
        if entry_point != ENTRY_POINT {
            return Err(CreateRenderPipelineError::UnsupportedEntryPoint(
                entry_point.to_string(),
            ));
        }
        module.raw.ok_or_else(|| {
            ResourceError::Invalid {
                kind: module.info.kind,
                label: module.info.label.clone(),
            }
            .into()
        })
    }

    fn describe_vertex_buffers(
        limits: &wgt::Limits,
        buffers: &[VertexBufferLayout],
    ) -> Result<ArrayVec<VertexBufferDesc, { wgt::MAX_VERTEX_BUFFERS }>, CreateRenderPipelineError>
    {
        if buffers.len() > limits.max_vertex_buffers as usize {
            return Err(CreateRenderPipelineError::TooManyVertexBuffers {
                given: buffers.len() as u32,
                limit: limits.max_vertex_buffers,
            });
        }

        let mut locations = FxHashSet::default();
        let mut descs = ArrayVec::new();
        for (index, layout) in buffers.iter().enumerate() {
            if layout.array_stride > limits.max_vertex_buffer_array_stride as BufferAddress {
                return Err(CreateRenderPipelineError::VertexStrideTooLarge {
                    index: index as u32,
                    given: layout.array_stride as u32,
                    limit: limits.max_vertex_buffer_array_stride,
                });
            }
            let mut attributes = Vec::with_capacity(layout.attributes.len());
            for attribute in layout.attributes {
                let end = attribute.offset + attribute.format.size();
                let bound = if layout.array_stride == 0 {
                    limits.max_vertex_buffer_array_stride as BufferAddress
                } else {
                    layout.array_stride
                };
                if end > bound {
                    return Err(CreateRenderPipelineError::InvalidVertexAttributeOffset {
                        location: attribute.shader_location,
                        offset: attribute.offset,
                    });
                }
                if attribute.shader_location >= limits.max_vertex_attributes {
                    return Err(CreateRenderPipelineError::InvalidShaderLocation {
                        location: attribute.shader_location,
                        limit: limits.max_vertex_attributes,
                    });
                }
                if !locations.insert(attribute.shader_location) {
                    return Err(CreateRenderPipelineError::ShaderLocationClash(
                        attribute.shader_location,
                    ));
                }
                attributes.push(AttributeDesc {
                    location: attribute.shader_location,
                    offset: attribute.offset as u32,
                    format_desc: conv::describe_vertex_format(attribute.format),
                });
            }
            descs.push(VertexBufferDesc {
                stride: layout.array_stride as u32,
                step: layout.step_mode,
                attributes,
            });
        }

        if locations.len() > limits.max_vertex_attributes as usize {
            return Err(CreateRenderPipelineError::TooManyVertexAttributes {
                given: locations.len() as u32,
                limit: limits.max_vertex_attributes,
            });
        }
        Ok(descs)
    }

    fn describe_color_targets(
        limits: &wgt::Limits,
        targets: &[Option<wgt::ColorTargetState>],
    ) -> Result<
        (
            ArrayVec<Option<TextureFormat>, { wgt::MAX_COLOR_ATTACHMENTS }>,
            ColorTargetDesc,
        ),
        CreateRenderPipelineError,
    > {
        if targets.len() > limits.max_color_attachments as usize {
            return Err(CreateRenderPipelineError::TooManyColorTargets {
                given: targets.len(),
                limit: limits.max_color_attachments,
            });
        }

        let mut formats = ArrayVec::new();
        let mut shared: Option<&wgt::ColorTargetState> = None;
        for target in targets {
            formats.push(target.as_ref().map(|t| t.format));
            let target = match *target {
                Some(ref target) => target,
                None => continue,
            };
            if target.format.is_depth_stencil_format() {
                return Err(CreateRenderPipelineError::FormatNotColor(target.format));
            }
            match shared {
                Some(first)
                    if first.blend != target.blend || first.write_mask != target.write_mask =>
                {
                    return Err(CreateRenderPipelineError::DivergentColorTargets);
                }
                Some(_) => {}
                None => shared = Some(target),
            }
        }

        let desc = match shared {
            Some(target) => ColorTargetDesc {
                mask: target.write_mask,
                blend: target.blend.as_ref().map(|blend| BlendDesc {
                    color: BlendComponentDesc::new(&blend.color),
                    alpha: BlendComponentDesc::new(&blend.alpha),
                }),
            },
            None => ColorTargetDesc {
                mask: ColorWrites::empty(),
                blend: None,
            },
        };
        Ok((formats, desc))
    }

    fn describe_depth_stencil(
        ds: &wgt::DepthStencilState,
    ) -> Result<DepthStencilDesc, CreateRenderPipelineError> {
        if !ds.format.has_depth_aspect() {
            return Err(CreateRenderPipelineError::FormatNotDepth(ds.format));
        }
        let stencil = if ds.stencil.is_enabled() {
            if !ds.format.has_stencil_aspect() {
                return Err(CreateRenderPipelineError::FormatNotStencil(ds.format));
            }
            let side = |face: &wgt::StencilFaceState| StencilSide {
                function: conv::map_compare_func(face.compare),
                ops: StencilOps::new(face),
            };
            Some(StencilDesc {
                front: side(&ds.stencil.front),
                back: side(&ds.stencil.back),
                read_mask: ds.stencil.read_mask,
                write_mask: ds.stencil.write_mask,
            })
        } else {
            None
        };
        Ok(DepthStencilDesc {
            format: ds.format,
            depth: if ds.is_depth_enabled() {
                Some(DepthState {
                    function: conv::map_compare_func(ds.depth_compare),
                    mask: ds.depth_write_enabled,
                })
            } else {
                None
            },
            stencil,
            bias: ds.bias,
        })
    }

    pub fn layout(&self) -> &Arc<PipelineLayout> {
        &self.layout
    }
}

impl Drop for RenderPipeline {
    fn drop(&mut self) {
        if let Some(vertex_array) = self.vertex_array.take() {
            self.info
                .device
                .schedule_release(RawObject::VertexArray(vertex_array));
        }
        if let Some(program) = self.program.take() {
            self.info.device.schedule_release(RawObject::Program(program));
        }
    }
}

fn link_program(
    gl: &mut dyn GlContext,
    vertex: RawShader,
    fragment: Option<RawShader>,
) -> Result<RawProgram, CreateRenderPipelineError> {
    let empty_fragment = match fragment {
        Some(_) => None,
        None => Some(
            compile_shader(gl, ShaderStage::Fragment, EMPTY_FRAGMENT_SOURCE).map_err(
                |err| match err {
                    CreateShaderModuleError::Device(err) => CreateRenderPipelineError::Device(err),
                    other => CreateRenderPipelineError::Link(other.to_string()),
                },
            )?,
        ),
    };
    let shaders = [Some(vertex), fragment.or(empty_fragment)];

    let result = gl
        .create_program()
        .map_err(|_| CreateRenderPipelineError::Device(DeviceError::OutOfMemory))
        .and_then(|program| {
            for &shader in shaders.iter().flatten() {
                gl.attach_shader(program, shader);
            }
            gl.link_program(program);
            for &shader in shaders.iter().flatten() {
                gl.detach_shader(program, shader);
            }
            if gl.get_program_link_status(program) {
                Ok(program)
            } else {
                let log = gl.get_program_info_log(program);
                gl.delete_program(program);
                Err(CreateRenderPipelineError::Link(log))
            }
        });
    if let Some(shader) = empty_fragment {
        gl.delete_shader(shader);
    }
    result
}

/// A `_group<G>_binding<B>` reference of a program, resolved against the
/// pipeline layout.
struct ResolvedBinding {
    group: u32,
    binding: u32,
    slot: u32,
    ty: wgt::BindingType,
}

struct BindingResolver<'a> {
    layout: &'a PipelineLayout,
    claimed: FxHashMap<(u32, u32), String>,
}

impl BindingResolver<'_> {
    fn resolve(&mut self, name: &str) -> Result<ResolvedBinding, CreateRenderPipelineError> {
        use CreateRenderPipelineError as E;

        let (group, binding) =
            parse_binding_prefix(name).ok_or_else(|| E::UnprefixedName(name.to_string()))?;
        let slots = self
            .layout
            .groups
            .get(group as usize)
            .ok_or_else(|| E::MissingGroup {
                name: name.to_string(),
                group,
            })?;
        let entry = slots.layout.entry(binding).ok_or_else(|| E::MissingBinding {
            name: name.to_string(),
            group,
            binding,
        })?;
        if let Some(first) = self.claimed.insert((group, binding), name.to_string()) {
            return Err(E::DuplicateBinding {
                first,
                second: name.to_string(),
                group,
                binding,
            });
        }
        Ok(ResolvedBinding {
            group,
            binding,
            slot: slots.offset + binding,
            ty: entry.ty,
        })
    }

    fn companion(&self, resolved: &ResolvedBinding) -> Option<wgt::BindingType> {
        self.layout.groups[resolved.group as usize]
            .layout
            .entry(resolved.binding + 1)
            .map(|entry| entry.ty)
    }
}

/// Points every uniform block and sampler uniform of `program` at its flat
/// slot in `layout`.
fn reflect_bindings(
    gl: &mut dyn GlContext,
    program: RawProgram,
    layout: &PipelineLayout,
) -> Result<(), CreateRenderPipelineError> {
    use CreateRenderPipelineError as E;

    let mut resolver = BindingResolver {
        layout,
        claimed: FxHashMap::default(),
    };

    for (index, name) in gl.active_uniform_blocks(program).into_iter().enumerate() {
        let resolved = resolver.resolve(&name)?;
        match resolved.ty {
            wgt::BindingType::Buffer {
                ty: wgt::BufferBindingType::Uniform,
                ..
            } => {}
            actual => {
                return Err(E::WrongBindingType {
                    name,
                    expected: "uniform block",
                    actual,
                })
            }
        }
        log::trace!("Uniform block '{}' -> slot {}", name, resolved.slot);
        gl.uniform_block_binding(program, index as u32, resolved.slot);
    }

    let mut samplers = Vec::new();
    for uniform in gl.active_uniforms(program) {
        let (dimension, class) = match conv::map_sampler_uniform(uniform.utype) {
            Some(pair) => pair,
            None => return Err(E::PlainUniform(uniform.name)),
        };
        let resolved = resolver.resolve(&uniform.name)?;
        match resolved.ty {
            wgt::BindingType::Texture {
                sample_type,
                view_dimension,
                multisampled: false,
            } => {
                if view_dimension != dimension
                    || !conv::is_sample_type_compatible(class, sample_type)
                {
                    return Err(E::IncompatibleTexture {
                        name: uniform.name,
                        actual: resolved.ty,
                    });
                }
            }
            actual => {
                return Err(E::WrongBindingType {
                    name: uniform.name,
                    expected: "sampled texture",
                    actual,
                })
            }
        }
        match resolver.companion(&resolved) {
            Some(wgt::BindingType::Sampler(wgt::SamplerBindingType::Comparison)) => {}
            Some(wgt::BindingType::Sampler(_)) if class != conv::SamplerClass::Shadow => {}
            Some(wgt::BindingType::Sampler(_)) => {
                return Err(E::ComparisonSamplerRequired(uniform.name));
            }
            _ => {
                return Err(E::MissingSampler {
                    name: uniform.name,
                    group: resolved.group,
                    binding: resolved.binding + 1,
                })
            }
        }
        samplers.push((uniform.name, resolved.slot));
    }

    if !samplers.is_empty() {
        for (name, slot) in samplers {
            log::trace!("Sampler '{}' -> texture unit {}", name, slot);
            gl.uniform_1_i32(program, &name, slot as i32);
        }
        gl.use_program(None);
    }
    Ok(())
}

/// Records the enabled attributes and their step rates. Pointers are set
/// once the vertex buffers are known.
fn build_vertex_array(
    gl: &mut dyn GlContext,
    buffers: &[VertexBufferDesc],
) -> Result<RawVertexArray, DeviceError> {
    let vertex_array = gl
        .create_vertex_array()
        .map_err(|_| DeviceError::OutOfMemory)?;
    gl.bind_vertex_array(Some(vertex_array));
    for buffer in buffers {
        let divisor = match buffer.step {
            VertexStepMode::Vertex => 0,
            VertexStepMode::Instance => 1,
        };
        for attribute in buffer.attributes.iter() {
            gl.enable_vertex_attrib_array(attribute.location);
            gl.vertex_attrib_divisor(attribute.location, divisor);
        }
    }
    gl.bind_vertex_array(None);
    Ok(vertex_array)
}

#[cfg(test)]
mod tests {
    use super::parse_binding_prefix;

    #[test]
    fn binding_prefix() {
        assert_eq!(parse_binding_prefix("_group0_binding0"), Some((0, 0)));
        assert_eq!(
            parse_binding_prefix("_group1_binding12_diffuse"),
            Some((1, 12))
        );
        assert_eq!(
            parse_binding_prefix("_group0_binding0_Globals"),
            Some((0, 0))
        );
        assert_eq!(parse_binding_prefix("_group0_binding3x"), None);
        assert_eq!(parse_binding_prefix("_group_binding0"), None);
        assert_eq!(parse_binding_prefix("_group0binding0"), None);
        assert_eq!(parse_binding_prefix("u_time"), None);
        assert_eq!(parse_binding_prefix("_group99999999999_binding0"), None);
    }
}
