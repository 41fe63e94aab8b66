//! The downstream seam: a bind-then-operate graphics context.
//!
//! Every method speaks the context's own vocabulary. Enumerants are plain
//! `u32` values from the [`glow`] constant space, object handles are opaque
//! non-zero names. The device owns its context behind a lock, so methods
//! take `&mut self` and are never re-entered.

use std::{fmt, num::NonZeroU32};

macro_rules! raw_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
        pub struct $name(pub NonZeroU32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

raw_handle!(
    /// Name of a buffer object.
    RawBuffer
);
raw_handle!(
    /// Name of a texture object.
    RawTexture
);
raw_handle!(
    /// Name of a renderbuffer object.
    RawRenderbuffer
);
raw_handle!(
    /// Name of a framebuffer object.
    RawFramebuffer
);
raw_handle!(
    /// Name of a linked or linkable program object.
    RawProgram
);
raw_handle!(
    /// Name of a shader object.
    RawShader
);
raw_handle!(
    /// Name of a sampler object.
    RawSampler
);
raw_handle!(
    /// Name of a vertex array object.
    RawVertexArray
);

/// An active uniform of the default block of a linked program.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ActiveUniform {
    /// Name, without any `[0]` array suffix.
    pub name: String,
    /// Type enumerant, e.g. `glow::SAMPLER_2D`.
    pub utype: u32,
    /// Array size.
    pub size: i32,
}

/// A context to execute commands on.
///
/// Implementors report allocation failures through [`GlContext::get_error`]
/// returning `glow::OUT_OF_MEMORY` after the allocating call, and loss through
/// [`GlContext::is_context_lost`].
pub trait GlContext: Send {
    /// Extension strings advertised by the context.
    fn supported_extensions(&mut self) -> Vec<String>;
    fn is_context_lost(&mut self) -> bool;
    /// Returns and clears the oldest pending error flag, `glow::NO_ERROR` if none.
    fn get_error(&mut self) -> u32;
    /// Blocks until all previously issued work has completed.
    fn finish(&mut self);

    fn create_buffer(&mut self) -> Result<RawBuffer, String>;
    fn delete_buffer(&mut self, buffer: RawBuffer);
    fn bind_buffer(&mut self, target: u32, buffer: Option<RawBuffer>);
    fn buffer_data_size(&mut self, target: u32, size: i32, usage: u32);
    fn buffer_sub_data(&mut self, target: u32, offset: i32, data: &[u8]);
    fn get_buffer_sub_data(&mut self, target: u32, offset: i32, data: &mut [u8]);
    fn copy_buffer_sub_data(
        &mut self,
        src_target: u32,
        dst_target: u32,
        src_offset: i32,
        dst_offset: i32,
        size: i32,
    );
    fn bind_buffer_range(
        &mut self,
        target: u32,
        index: u32,
        buffer: Option<RawBuffer>,
        offset: i32,
        size: i32,
    );

    fn create_texture(&mut self) -> Result<RawTexture, String>;
    fn delete_texture(&mut self, texture: RawTexture);
    fn active_texture(&mut self, unit: u32);
    fn bind_texture(&mut self, target: u32, texture: Option<RawTexture>);
    fn tex_storage_2d(
        &mut self,
        target: u32,
        levels: i32,
        internal_format: u32,
        width: i32,
        height: i32,
    );
    fn tex_storage_3d(
        &mut self,
        target: u32,
        levels: i32,
        internal_format: u32,
        width: i32,
        height: i32,
        depth: i32,
    );
    fn tex_parameter_i32(&mut self, target: u32, parameter: u32, value: i32);
    fn pixel_store_i32(&mut self, parameter: u32, value: i32);
    /// Uploads from the buffer bound to `PIXEL_UNPACK_BUFFER`, starting at `offset`.
    #[allow(clippy::too_many_arguments)]
    fn tex_sub_image_2d(
        &mut self,
        target: u32,
        level: i32,
        x_offset: i32,
        y_offset: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        offset: u32,
    );
    /// Uploads from the buffer bound to `PIXEL_UNPACK_BUFFER`, starting at `offset`.
    #[allow(clippy::too_many_arguments)]
    fn tex_sub_image_3d(
        &mut self,
        target: u32,
        level: i32,
        x_offset: i32,
        y_offset: i32,
        z_offset: i32,
        width: i32,
        height: i32,
        depth: i32,
        format: u32,
        ty: u32,
        offset: u32,
    );

    fn create_renderbuffer(&mut self) -> Result<RawRenderbuffer, String>;
    fn delete_renderbuffer(&mut self, renderbuffer: RawRenderbuffer);
    fn bind_renderbuffer(&mut self, target: u32, renderbuffer: Option<RawRenderbuffer>);
    fn renderbuffer_storage_multisample(
        &mut self,
        target: u32,
        samples: i32,
        internal_format: u32,
        width: i32,
        height: i32,
    );

    fn create_framebuffer(&mut self) -> Result<RawFramebuffer, String>;
    fn delete_framebuffer(&mut self, framebuffer: RawFramebuffer);
    /// `None` binds the default framebuffer of the presentation surface.
    fn bind_framebuffer(&mut self, target: u32, framebuffer: Option<RawFramebuffer>);
    fn framebuffer_texture_2d(
        &mut self,
        target: u32,
        attachment: u32,
        texture_target: u32,
        texture: Option<RawTexture>,
        level: i32,
    );
    fn framebuffer_texture_layer(
        &mut self,
        target: u32,
        attachment: u32,
        texture: Option<RawTexture>,
        level: i32,
        layer: i32,
    );
    fn framebuffer_renderbuffer(
        &mut self,
        target: u32,
        attachment: u32,
        renderbuffer_target: u32,
        renderbuffer: Option<RawRenderbuffer>,
    );
    fn draw_buffers(&mut self, buffers: &[u32]);
    fn read_buffer(&mut self, src: u32);
    #[allow(clippy::too_many_arguments)]
    fn blit_framebuffer(
        &mut self,
        src_x0: i32,
        src_y0: i32,
        src_x1: i32,
        src_y1: i32,
        dst_x0: i32,
        dst_y0: i32,
        dst_x1: i32,
        dst_y1: i32,
        mask: u32,
        filter: u32,
    );
    fn invalidate_framebuffer(&mut self, target: u32, attachments: &[u32]);
    fn clear_buffer_f32_slice(&mut self, target: u32, draw_buffer: u32, values: &[f32]);
    fn clear_buffer_i32_slice(&mut self, target: u32, draw_buffer: u32, values: &[i32]);
    fn clear_buffer_u32_slice(&mut self, target: u32, draw_buffer: u32, values: &[u32]);
    fn clear_buffer_depth_stencil(
        &mut self,
        target: u32,
        draw_buffer: u32,
        depth: f32,
        stencil: i32,
    );

    fn create_sampler(&mut self) -> Result<RawSampler, String>;
    fn delete_sampler(&mut self, sampler: RawSampler);
    fn bind_sampler(&mut self, unit: u32, sampler: Option<RawSampler>);
    fn sampler_parameter_i32(&mut self, sampler: RawSampler, name: u32, value: i32);
    fn sampler_parameter_f32(&mut self, sampler: RawSampler, name: u32, value: f32);

    fn create_shader(&mut self, shader_type: u32) -> Result<RawShader, String>;
    fn delete_shader(&mut self, shader: RawShader);
    fn shader_source(&mut self, shader: RawShader, source: &str);
    fn compile_shader(&mut self, shader: RawShader);
    fn get_shader_compile_status(&mut self, shader: RawShader) -> bool;
    fn get_shader_info_log(&mut self, shader: RawShader) -> String;

    fn create_program(&mut self) -> Result<RawProgram, String>;
    fn delete_program(&mut self, program: RawProgram);
    fn attach_shader(&mut self, program: RawProgram, shader: RawShader);
    fn detach_shader(&mut self, program: RawProgram, shader: RawShader);
    fn link_program(&mut self, program: RawProgram);
    fn get_program_link_status(&mut self, program: RawProgram) -> bool;
    fn get_program_info_log(&mut self, program: RawProgram) -> String;
    fn use_program(&mut self, program: Option<RawProgram>);
    /// Active uniforms of the default uniform block.
    fn active_uniforms(&mut self, program: RawProgram) -> Vec<ActiveUniform>;
    /// Names of the active uniform blocks, in block index order.
    fn active_uniform_blocks(&mut self, program: RawProgram) -> Vec<String>;
    fn uniform_block_binding(&mut self, program: RawProgram, index: u32, binding: u32);
    /// Sets an integer uniform by name. Leaves `program` current.
    fn uniform_1_i32(&mut self, program: RawProgram, name: &str, value: i32);

    fn create_vertex_array(&mut self) -> Result<RawVertexArray, String>;
    fn delete_vertex_array(&mut self, vertex_array: RawVertexArray);
    fn bind_vertex_array(&mut self, vertex_array: Option<RawVertexArray>);
    fn enable_vertex_attrib_array(&mut self, index: u32);
    fn vertex_attrib_pointer_f32(
        &mut self,
        index: u32,
        size: i32,
        data_type: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
    );
    fn vertex_attrib_pointer_i32(
        &mut self,
        index: u32,
        size: i32,
        data_type: u32,
        stride: i32,
        offset: i32,
    );
    fn vertex_attrib_divisor(&mut self, index: u32, divisor: u32);

    fn enable(&mut self, capability: u32);
    fn disable(&mut self, capability: u32);
    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32);
    fn depth_range_f32(&mut self, near: f32, far: f32);
    fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32);
    fn color_mask(&mut self, red: bool, green: bool, blue: bool, alpha: bool);
    fn depth_mask(&mut self, value: bool);
    fn depth_func(&mut self, func: u32);
    fn stencil_func_separate(&mut self, face: u32, func: u32, reference: i32, mask: u32);
    fn stencil_op_separate(&mut self, face: u32, fail: u32, depth_fail: u32, pass: u32);
    fn stencil_mask_separate(&mut self, face: u32, mask: u32);
    fn front_face(&mut self, value: u32);
    fn cull_face(&mut self, value: u32);
    fn polygon_offset(&mut self, factor: f32, units: f32);
    fn blend_color(&mut self, red: f32, green: f32, blue: f32, alpha: f32);
    fn blend_equation_separate(&mut self, mode_rgb: u32, mode_alpha: u32);
    fn blend_func_separate(&mut self, src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32);

    fn draw_arrays(&mut self, mode: u32, first: i32, count: i32);
    fn draw_arrays_instanced(&mut self, mode: u32, first: i32, count: i32, instance_count: i32);
    fn draw_elements(&mut self, mode: u32, count: i32, element_type: u32, offset: i32);
    fn draw_elements_instanced(
        &mut self,
        mode: u32,
        count: i32,
        element_type: u32,
        offset: i32,
        instance_count: i32,
    );
}
