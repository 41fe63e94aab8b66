//! Lookup tables between the descriptor vocabulary and GL enumerants.

/// How a texture format is allocated and uploaded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct FormatDescription {
    pub internal: u32,
    pub external: u32,
    pub data_type: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum VertexAttribKind {
    /// Float, or normalized integer.
    Float,
    Integer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct VertexFormatDesc {
    pub element_count: i32,
    pub element_format: u32,
    pub attrib_kind: VertexAttribKind,
    pub normalized: bool,
}

/// Class of the values returned by sampling through a sampler uniform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SamplerClass {
    Float,
    Sint,
    Uint,
    Shadow,
}

pub(crate) fn describe_texture_format(format: wgt::TextureFormat) -> FormatDescription {
    use wgt::TextureFormat as Tf;

    let (internal, external, data_type) = match format {
        Tf::R8Unorm => (glow::R8, glow::RED, glow::UNSIGNED_BYTE),
        Tf::R8Snorm => (glow::R8_SNORM, glow::RED, glow::BYTE),
        Tf::R8Uint => (glow::R8UI, glow::RED_INTEGER, glow::UNSIGNED_BYTE),
        Tf::R8Sint => (glow::R8I, glow::RED_INTEGER, glow::BYTE),
        Tf::R16Uint => (glow::R16UI, glow::RED_INTEGER, glow::UNSIGNED_SHORT),
        Tf::R16Sint => (glow::R16I, glow::RED_INTEGER, glow::SHORT),
        Tf::R16Float => (glow::R16F, glow::RED, glow::HALF_FLOAT),
        Tf::Rg8Unorm => (glow::RG8, glow::RG, glow::UNSIGNED_BYTE),
        Tf::Rg8Snorm => (glow::RG8_SNORM, glow::RG, glow::BYTE),
        Tf::Rg8Uint => (glow::RG8UI, glow::RG_INTEGER, glow::UNSIGNED_BYTE),
        Tf::Rg8Sint => (glow::RG8I, glow::RG_INTEGER, glow::BYTE),
        Tf::R32Uint => (glow::R32UI, glow::RED_INTEGER, glow::UNSIGNED_INT),
        Tf::R32Sint => (glow::R32I, glow::RED_INTEGER, glow::INT),
        Tf::R32Float => (glow::R32F, glow::RED, glow::FLOAT),
        Tf::Rg16Uint => (glow::RG16UI, glow::RG_INTEGER, glow::UNSIGNED_SHORT),
        Tf::Rg16Sint => (glow::RG16I, glow::RG_INTEGER, glow::SHORT),
        Tf::Rg16Float => (glow::RG16F, glow::RG, glow::HALF_FLOAT),
        Tf::Rgba8Unorm => (glow::RGBA8, glow::RGBA, glow::UNSIGNED_BYTE),
        Tf::Rgba8UnormSrgb => (glow::SRGB8_ALPHA8, glow::RGBA, glow::UNSIGNED_BYTE),
        Tf::Rgba8Snorm => (glow::RGBA8_SNORM, glow::RGBA, glow::BYTE),
        Tf::Rgba8Uint => (glow::RGBA8UI, glow::RGBA_INTEGER, glow::UNSIGNED_BYTE),
        Tf::Rgba8Sint => (glow::RGBA8I, glow::RGBA_INTEGER, glow::BYTE),
        // no BGRA storage, stored as RGBA
        Tf::Bgra8Unorm => (glow::RGBA8, glow::RGBA, glow::UNSIGNED_BYTE),
        Tf::Bgra8UnormSrgb => (glow::SRGB8_ALPHA8, glow::RGBA, glow::UNSIGNED_BYTE),
        Tf::Rgb10a2Unorm => (
            glow::RGB10_A2,
            glow::RGBA,
            glow::UNSIGNED_INT_2_10_10_10_REV,
        ),
        Tf::Rg11b10Float => (
            glow::R11F_G11F_B10F,
            glow::RGB,
            glow::UNSIGNED_INT_10F_11F_11F_REV,
        ),
        Tf::Rg32Uint => (glow::RG32UI, glow::RG_INTEGER, glow::UNSIGNED_INT),
        Tf::Rg32Sint => (glow::RG32I, glow::RG_INTEGER, glow::INT),
        Tf::Rg32Float => (glow::RG32F, glow::RG, glow::FLOAT),
        Tf::Rgba16Uint => (glow::RGBA16UI, glow::RGBA_INTEGER, glow::UNSIGNED_SHORT),
        Tf::Rgba16Sint => (glow::RGBA16I, glow::RGBA_INTEGER, glow::SHORT),
        Tf::Rgba16Float => (glow::RGBA16F, glow::RGBA, glow::HALF_FLOAT),
        Tf::Rgba32Uint => (glow::RGBA32UI, glow::RGBA_INTEGER, glow::UNSIGNED_INT),
        Tf::Rgba32Sint => (glow::RGBA32I, glow::RGBA_INTEGER, glow::INT),
        Tf::Rgba32Float => (glow::RGBA32F, glow::RGBA, glow::FLOAT),
        Tf::Depth32Float => (glow::DEPTH_COMPONENT32F, glow::DEPTH_COMPONENT, glow::FLOAT),
        Tf::Depth24Plus => (
            glow::DEPTH_COMPONENT24,
            glow::DEPTH_COMPONENT,
            glow::UNSIGNED_INT,
        ),
        Tf::Depth24PlusStencil8 => (
            glow::DEPTH24_STENCIL8,
            glow::DEPTH_STENCIL,
            glow::UNSIGNED_INT_24_8,
        ),
    };

    FormatDescription {
        internal,
        external,
        data_type,
    }
}

pub(crate) fn describe_vertex_format(vertex_format: wgt::VertexFormat) -> VertexFormatDesc {
    use VertexAttribKind as Vak;
    use wgt::VertexFormat as Vf;

    let (element_count, element_format, attrib_kind, normalized) = match vertex_format {
        Vf::Unorm8x2 => (2, glow::UNSIGNED_BYTE, Vak::Float, true),
        Vf::Snorm8x2 => (2, glow::BYTE, Vak::Float, true),
        Vf::Uint8x2 => (2, glow::UNSIGNED_BYTE, Vak::Integer, false),
        Vf::Sint8x2 => (2, glow::BYTE, Vak::Integer, false),
        Vf::Unorm8x4 => (4, glow::UNSIGNED_BYTE, Vak::Float, true),
        Vf::Snorm8x4 => (4, glow::BYTE, Vak::Float, true),
        Vf::Uint8x4 => (4, glow::UNSIGNED_BYTE, Vak::Integer, false),
        Vf::Sint8x4 => (4, glow::BYTE, Vak::Integer, false),
        Vf::Unorm16x2 => (2, glow::UNSIGNED_SHORT, Vak::Float, true),
        Vf::Snorm16x2 => (2, glow::SHORT, Vak::Float, true),
        Vf::Uint16x2 => (2, glow::UNSIGNED_SHORT, Vak::Integer, false),
        Vf::Sint16x2 => (2, glow::SHORT, Vak::Integer, false),
        Vf::Float16x2 => (2, glow::HALF_FLOAT, Vak::Float, false),
        Vf::Unorm16x4 => (4, glow::UNSIGNED_SHORT, Vak::Float, true),
        Vf::Snorm16x4 => (4, glow::SHORT, Vak::Float, true),
        Vf::Uint16x4 => (4, glow::UNSIGNED_SHORT, Vak::Integer, false),
        Vf::Sint16x4 => (4, glow::SHORT, Vak::Integer, false),
        Vf::Float16x4 => (4, glow::HALF_FLOAT, Vak::Float, false),
        Vf::Uint32 => (1, glow::UNSIGNED_INT, Vak::Integer, false),
        Vf::Sint32 => (1, glow::INT, Vak::Integer, false),
        Vf::Float32 => (1, glow::FLOAT, Vak::Float, false),
        Vf::Uint32x2 => (2, glow::UNSIGNED_INT, Vak::Integer, false),
        Vf::Sint32x2 => (2, glow::INT, Vak::Integer, false),
        Vf::Float32x2 => (2, glow::FLOAT, Vak::Float, false),
        Vf::Uint32x3 => (3, glow::UNSIGNED_INT, Vak::Integer, false),
        Vf::Sint32x3 => (3, glow::INT, Vak::Integer, false),
        Vf::Float32x3 => (3, glow::FLOAT, Vak::Float, false),
        Vf::Uint32x4 => (4, glow::UNSIGNED_INT, Vak::Integer, false),
        Vf::Sint32x4 => (4, glow::INT, Vak::Integer, false),
        Vf::Float32x4 => (4, glow::FLOAT, Vak::Float, false),
    };

    VertexFormatDesc {
        element_count,
        element_format,
        attrib_kind,
        normalized,
    }
}

pub(crate) fn map_address_mode(mode: wgt::AddressMode) -> u32 {
    match mode {
        wgt::AddressMode::Repeat => glow::REPEAT,
        wgt::AddressMode::MirrorRepeat => glow::MIRRORED_REPEAT,
        wgt::AddressMode::ClampToEdge => glow::CLAMP_TO_EDGE,
    }
}

pub(crate) fn map_filter_modes(
    min: wgt::FilterMode,
    mag: wgt::FilterMode,
    mip: wgt::FilterMode,
) -> (u32, u32) {
    use wgt::FilterMode as Fm;

    let mag_filter = match mag {
        Fm::Nearest => glow::NEAREST,
        Fm::Linear => glow::LINEAR,
    };

    let min_filter = match (min, mip) {
        (Fm::Nearest, Fm::Nearest) => glow::NEAREST_MIPMAP_NEAREST,
        (Fm::Nearest, Fm::Linear) => glow::NEAREST_MIPMAP_LINEAR,
        (Fm::Linear, Fm::Nearest) => glow::LINEAR_MIPMAP_NEAREST,
        (Fm::Linear, Fm::Linear) => glow::LINEAR_MIPMAP_LINEAR,
    };

    (min_filter, mag_filter)
}

pub(crate) fn map_primitive_topology(topology: wgt::PrimitiveTopology) -> u32 {
    use wgt::PrimitiveTopology as Pt;
    match topology {
        Pt::PointList => glow::POINTS,
        Pt::LineList => glow::LINES,
        Pt::LineStrip => glow::LINE_STRIP,
        Pt::TriangleList => glow::TRIANGLES,
        Pt::TriangleStrip => glow::TRIANGLE_STRIP,
    }
}

pub(crate) fn map_front_face(front_face: wgt::FrontFace) -> u32 {
    match front_face {
        wgt::FrontFace::Cw => glow::CW,
        wgt::FrontFace::Ccw => glow::CCW,
    }
}

pub(crate) fn map_cull_face(face: Option<wgt::Face>) -> u32 {
    match face {
        Some(wgt::Face::Front) => glow::FRONT,
        Some(wgt::Face::Back) => glow::BACK,
        None => 0,
    }
}

pub(crate) fn map_index_format(format: wgt::IndexFormat) -> u32 {
    match format {
        wgt::IndexFormat::Uint16 => glow::UNSIGNED_SHORT,
        wgt::IndexFormat::Uint32 => glow::UNSIGNED_INT,
    }
}

pub(crate) fn map_compare_func(fun: wgt::CompareFunction) -> u32 {
    use wgt::CompareFunction as Cf;
    match fun {
        Cf::Never => glow::NEVER,
        Cf::Less => glow::LESS,
        Cf::LessEqual => glow::LEQUAL,
        Cf::Equal => glow::EQUAL,
        Cf::GreaterEqual => glow::GEQUAL,
        Cf::Greater => glow::GREATER,
        Cf::NotEqual => glow::NOTEQUAL,
        Cf::Always => glow::ALWAYS,
    }
}

pub(crate) fn map_stencil_op(operation: wgt::StencilOperation) -> u32 {
    use wgt::StencilOperation as So;
    match operation {
        So::Keep => glow::KEEP,
        So::Zero => glow::ZERO,
        So::Replace => glow::REPLACE,
        So::Invert => glow::INVERT,
        So::IncrementClamp => glow::INCR,
        So::DecrementClamp => glow::DECR,
        So::IncrementWrap => glow::INCR_WRAP,
        So::DecrementWrap => glow::DECR_WRAP,
    }
}

pub(crate) fn map_blend_factor(factor: wgt::BlendFactor) -> u32 {
    use wgt::BlendFactor as Bf;
    match factor {
        Bf::Zero => glow::ZERO,
        Bf::One => glow::ONE,
        Bf::Src => glow::SRC_COLOR,
        Bf::OneMinusSrc => glow::ONE_MINUS_SRC_COLOR,
        Bf::Dst => glow::DST_COLOR,
        Bf::OneMinusDst => glow::ONE_MINUS_DST_COLOR,
        Bf::SrcAlpha => glow::SRC_ALPHA,
        Bf::OneMinusSrcAlpha => glow::ONE_MINUS_SRC_ALPHA,
        Bf::DstAlpha => glow::DST_ALPHA,
        Bf::OneMinusDstAlpha => glow::ONE_MINUS_DST_ALPHA,
        Bf::Constant => glow::CONSTANT_COLOR,
        Bf::OneMinusConstant => glow::ONE_MINUS_CONSTANT_COLOR,
        Bf::SrcAlphaSaturated => glow::SRC_ALPHA_SATURATE,
    }
}

pub(crate) fn map_blend_operation(operation: wgt::BlendOperation) -> u32 {
    use wgt::BlendOperation as Bo;
    match operation {
        Bo::Add => glow::FUNC_ADD,
        Bo::Subtract => glow::FUNC_SUBTRACT,
        Bo::ReverseSubtract => glow::FUNC_REVERSE_SUBTRACT,
        Bo::Min => glow::MIN,
        Bo::Max => glow::MAX,
    }
}

/// Returns the bind target of a texture allocation.
///
/// Six-layer sampled textures become cube maps, other layered 2D
/// textures become 2D arrays.
pub(crate) fn map_texture_target(
    dimension: wgt::TextureDimension,
    array_layer_count: u32,
    usage: wgt::TextureUsages,
) -> u32 {
    match dimension {
        wgt::TextureDimension::D3 => glow::TEXTURE_3D,
        _ if array_layer_count == 6 && usage.contains(wgt::TextureUsages::TEXTURE_BINDING) => {
            glow::TEXTURE_CUBE_MAP
        }
        _ if array_layer_count > 1 => glow::TEXTURE_2D_ARRAY,
        _ => glow::TEXTURE_2D,
    }
}

/// Bind target of a texture view, `None` if the context can't express it.
pub(crate) fn map_view_dimension(dimension: wgt::TextureViewDimension) -> Option<u32> {
    use wgt::TextureViewDimension as Tvd;
    match dimension {
        Tvd::D2 => Some(glow::TEXTURE_2D),
        Tvd::D2Array => Some(glow::TEXTURE_2D_ARRAY),
        Tvd::Cube => Some(glow::TEXTURE_CUBE_MAP),
        Tvd::D3 => Some(glow::TEXTURE_3D),
        Tvd::D1 | Tvd::CubeArray => None,
    }
}

/// Decodes the type of a sampler uniform.
pub(crate) fn map_sampler_uniform(
    utype: u32,
) -> Option<(wgt::TextureViewDimension, SamplerClass)> {
    use wgt::TextureViewDimension as Tvd;
    use SamplerClass as Sc;
    Some(match utype {
        glow::SAMPLER_2D => (Tvd::D2, Sc::Float),
        glow::SAMPLER_3D => (Tvd::D3, Sc::Float),
        glow::SAMPLER_CUBE => (Tvd::Cube, Sc::Float),
        glow::SAMPLER_2D_ARRAY => (Tvd::D2Array, Sc::Float),
        glow::SAMPLER_2D_SHADOW => (Tvd::D2, Sc::Shadow),
        glow::SAMPLER_CUBE_SHADOW => (Tvd::Cube, Sc::Shadow),
        glow::SAMPLER_2D_ARRAY_SHADOW => (Tvd::D2Array, Sc::Shadow),
        glow::INT_SAMPLER_2D => (Tvd::D2, Sc::Sint),
        glow::INT_SAMPLER_3D => (Tvd::D3, Sc::Sint),
        glow::INT_SAMPLER_CUBE => (Tvd::Cube, Sc::Sint),
        glow::INT_SAMPLER_2D_ARRAY => (Tvd::D2Array, Sc::Sint),
        glow::UNSIGNED_INT_SAMPLER_2D => (Tvd::D2, Sc::Uint),
        glow::UNSIGNED_INT_SAMPLER_3D => (Tvd::D3, Sc::Uint),
        glow::UNSIGNED_INT_SAMPLER_CUBE => (Tvd::Cube, Sc::Uint),
        glow::UNSIGNED_INT_SAMPLER_2D_ARRAY => (Tvd::D2Array, Sc::Uint),
        _ => return None,
    })
}

/// Returns `true` if a sampler uniform of `class` can read a texture binding
/// declared with `sample_type`.
pub(crate) fn is_sample_type_compatible(
    class: SamplerClass,
    sample_type: wgt::TextureSampleType,
) -> bool {
    use wgt::TextureSampleType as Tst;
    match (class, sample_type) {
        (SamplerClass::Float, Tst::Float { .. })
        | (SamplerClass::Float, Tst::Depth)
        | (SamplerClass::Shadow, Tst::Depth)
        | (SamplerClass::Sint, Tst::Sint)
        | (SamplerClass::Uint, Tst::Uint) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_targets() {
        use wgt::{TextureDimension as Td, TextureUsages as Tu};
        assert_eq!(
            map_texture_target(Td::D2, 6, Tu::TEXTURE_BINDING),
            glow::TEXTURE_CUBE_MAP
        );
        assert_eq!(
            map_texture_target(Td::D2, 6, Tu::COPY_DST),
            glow::TEXTURE_2D_ARRAY
        );
        assert_eq!(map_texture_target(Td::D2, 1, Tu::all()), glow::TEXTURE_2D);
        assert_eq!(map_texture_target(Td::D3, 1, Tu::all()), glow::TEXTURE_3D);
    }

    #[test]
    fn sampler_uniforms() {
        assert_eq!(
            map_sampler_uniform(glow::INT_SAMPLER_2D_ARRAY),
            Some((wgt::TextureViewDimension::D2Array, SamplerClass::Sint))
        );
        assert_eq!(map_sampler_uniform(glow::FLOAT_VEC4), None);
        assert!(is_sample_type_compatible(
            SamplerClass::Shadow,
            wgt::TextureSampleType::Depth
        ));
        assert!(!is_sample_type_compatible(
            SamplerClass::Shadow,
            wgt::TextureSampleType::Float { filterable: true }
        ));
    }
}
