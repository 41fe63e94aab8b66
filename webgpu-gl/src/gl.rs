//! [`GlContext`] over a native [`glow::Context`].
//!
//! Object names cross the seam unchanged: a `glow::NativeBuffer` and a
//! [`RawBuffer`] wrap the same non-zero name.

use crate::context::{
    ActiveUniform, GlContext, RawBuffer, RawFramebuffer, RawProgram, RawRenderbuffer, RawSampler,
    RawShader, RawTexture, RawVertexArray,
};
use glow::HasContext;
use std::fmt;

/// Loss latch over the error flags of a context.
///
/// Polling for loss reads one flag. Anything else it reads is held back for
/// the next `get_error`, so allocation checks still see it.
#[derive(Debug, Default)]
struct ErrorLatch {
    lost: bool,
    held: Option<u32>,
}

impl ErrorLatch {
    fn record(&mut self, error: u32) -> u32 {
        if error == glow::CONTEXT_LOST {
            self.lost = true;
        }
        error
    }

    fn is_lost(&mut self, fetch: impl FnOnce() -> u32) -> bool {
        if !self.lost && self.held.is_none() {
            match self.record(fetch()) {
                glow::NO_ERROR | glow::CONTEXT_LOST => {}
                other => self.held = Some(other),
            }
        }
        self.lost
    }

    fn next_error(&mut self, fetch: impl FnOnce() -> u32) -> u32 {
        match self.held.take() {
            Some(error) => error,
            None => self.record(fetch()),
        }
    }
}

/// A current GL ES 3.0 (or WebGL2-equivalent desktop GL) context.
pub struct GlowContext {
    gl: glow::Context,
    errors: ErrorLatch,
}

// The context is only reached through the device lock, from the thread the
// caller made it current on. See `GlowContext::new`.
unsafe impl Send for GlowContext {}

impl fmt::Debug for GlowContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlowContext")
            .field("version", self.gl.version())
            .field("lost", &self.errors.lost)
            .finish()
    }
}

impl GlowContext {
    /// Wraps a loaded context.
    ///
    /// # Safety
    ///
    /// `gl` must stay current on every thread that uses the device created
    /// from it, for as long as the device lives.
    pub unsafe fn new(gl: glow::Context) -> Self {
        log::info!("GL version: {:?}", gl.version());
        Self {
            gl,
            errors: ErrorLatch::default(),
        }
    }

    pub fn into_inner(self) -> glow::Context {
        self.gl
    }
}

impl GlContext for GlowContext {
    fn supported_extensions(&mut self) -> Vec<String> {
        self.gl.supported_extensions().iter().cloned().collect()
    }

    fn is_context_lost(&mut self) -> bool {
        let gl = &self.gl;
        self.errors.is_lost(|| unsafe { gl.get_error() })
    }

    fn get_error(&mut self) -> u32 {
        let gl = &self.gl;
        self.errors.next_error(|| unsafe { gl.get_error() })
    }

    fn finish(&mut self) {
        unsafe { self.gl.finish() }
    }

    fn create_buffer(&mut self) -> Result<RawBuffer, String> {
        unsafe { self.gl.create_buffer() }.map(|raw| RawBuffer(raw.0))
    }

    fn delete_buffer(&mut self, buffer: RawBuffer) {
        unsafe { self.gl.delete_buffer(glow::NativeBuffer(buffer.0)) }
    }

    fn bind_buffer(&mut self, target: u32, buffer: Option<RawBuffer>) {
        unsafe {
            self.gl
                .bind_buffer(target, buffer.map(|raw| glow::NativeBuffer(raw.0)))
        }
    }

    fn buffer_data_size(&mut self, target: u32, size: i32, usage: u32) {
        unsafe { self.gl.buffer_data_size(target, size, usage) }
    }

    fn buffer_sub_data(&mut self, target: u32, offset: i32, data: &[u8]) {
        unsafe { self.gl.buffer_sub_data_u8_slice(target, offset, data) }
    }

    fn get_buffer_sub_data(&mut self, target: u32, offset: i32, data: &mut [u8]) {
        unsafe { self.gl.get_buffer_sub_data(target, offset, data) }
    }

    fn copy_buffer_sub_data(
        &mut self,
        src_target: u32,
        dst_target: u32,
        src_offset: i32,
        dst_offset: i32,
        size: i32,
    ) {
        unsafe {
            self.gl
                .copy_buffer_sub_data(src_target, dst_target, src_offset, dst_offset, size)
        }
    }

    fn bind_buffer_range(
        &mut self,
        target: u32,
        index: u32,
        buffer: Option<RawBuffer>,
        offset: i32,
        size: i32,
    ) {
        unsafe {
            self.gl.bind_buffer_range(
                target,
                index,
                buffer.map(|raw| glow::NativeBuffer(raw.0)),
                offset,
                size,
            )
        }
    }

    fn create_texture(&mut self) -> Result<RawTexture, String> {
        unsafe { self.gl.create_texture() }.map(|raw| RawTexture(raw.0))
    }

    fn delete_texture(&mut self, texture: RawTexture) {
        unsafe { self.gl.delete_texture(glow::NativeTexture(texture.0)) }
    }

    fn active_texture(&mut self, unit: u32) {
        unsafe { self.gl.active_texture(unit) }
    }

    fn bind_texture(&mut self, target: u32, texture: Option<RawTexture>) {
        unsafe {
            self.gl
                .bind_texture(target, texture.map(|raw| glow::NativeTexture(raw.0)))
        }
    }

    fn tex_storage_2d(
        &mut self,
        target: u32,
        levels: i32,
        internal_format: u32,
        width: i32,
        height: i32,
    ) {
        unsafe {
            self.gl
                .tex_storage_2d(target, levels, internal_format, width, height)
        }
    }

    fn tex_storage_3d(
        &mut self,
        target: u32,
        levels: i32,
        internal_format: u32,
        width: i32,
        height: i32,
        depth: i32,
    ) {
        unsafe {
            self.gl
                .tex_storage_3d(target, levels, internal_format, width, height, depth)
        }
    }

    fn tex_parameter_i32(&mut self, target: u32, parameter: u32, value: i32) {
        unsafe { self.gl.tex_parameter_i32(target, parameter, value) }
    }

    fn pixel_store_i32(&mut self, parameter: u32, value: i32) {
        unsafe { self.gl.pixel_store_i32(parameter, value) }
    }

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
    ) {
        unsafe {
            self.gl.tex_sub_image_2d(
                target,
                level,
                x_offset,
                y_offset,
                width,
                height,
                format,
                ty,
                glow::PixelUnpackData::BufferOffset(offset),
            )
        }
    }

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
    ) {
        unsafe {
            self.gl.tex_sub_image_3d(
                target,
                level,
                x_offset,
                y_offset,
                z_offset,
                width,
                height,
                depth,
                format,
                ty,
                glow::PixelUnpackData::BufferOffset(offset),
            )
        }
    }

    fn create_renderbuffer(&mut self) -> Result<RawRenderbuffer, String> {
        unsafe { self.gl.create_renderbuffer() }.map(|raw| RawRenderbuffer(raw.0))
    }

    fn delete_renderbuffer(&mut self, renderbuffer: RawRenderbuffer) {
        unsafe {
            self.gl
                .delete_renderbuffer(glow::NativeRenderbuffer(renderbuffer.0))
        }
    }

    fn bind_renderbuffer(&mut self, target: u32, renderbuffer: Option<RawRenderbuffer>) {
        unsafe {
            self.gl.bind_renderbuffer(
                target,
                renderbuffer.map(|raw| glow::NativeRenderbuffer(raw.0)),
            )
        }
    }

    fn renderbuffer_storage_multisample(
        &mut self,
        target: u32,
        samples: i32,
        internal_format: u32,
        width: i32,
        height: i32,
    ) {
        unsafe {
            self.gl
                .renderbuffer_storage_multisample(target, samples, internal_format, width, height)
        }
    }

    fn create_framebuffer(&mut self) -> Result<RawFramebuffer, String> {
        unsafe { self.gl.create_framebuffer() }.map(|raw| RawFramebuffer(raw.0))
    }

    fn delete_framebuffer(&mut self, framebuffer: RawFramebuffer) {
        unsafe {
            self.gl
                .delete_framebuffer(glow::NativeFramebuffer(framebuffer.0))
        }
    }

    fn bind_framebuffer(&mut self, target: u32, framebuffer: Option<RawFramebuffer>) {
        unsafe {
            self.gl.bind_framebuffer(
                target,
                framebuffer.map(|raw| glow::NativeFramebuffer(raw.0)),
            )
        }
    }

    fn framebuffer_texture_2d(
        &mut self,
        target: u32,
        attachment: u32,
        texture_target: u32,
        texture: Option<RawTexture>,
        level: i32,
    ) {
        unsafe {
            self.gl.framebuffer_texture_2d(
                target,
                attachment,
                texture_target,
                texture.map(|raw| glow::NativeTexture(raw.0)),
                level,
            )
        }
    }

    fn framebuffer_texture_layer(
        &mut self,
        target: u32,
        attachment: u32,
        texture: Option<RawTexture>,
        level: i32,
        layer: i32,
    ) {
        unsafe {
            self.gl.framebuffer_texture_layer(
                target,
                attachment,
                texture.map(|raw| glow::NativeTexture(raw.0)),
                level,
                layer,
            )
        }
    }

    fn framebuffer_renderbuffer(
        &mut self,
        target: u32,
        attachment: u32,
        renderbuffer_target: u32,
        renderbuffer: Option<RawRenderbuffer>,
    ) {
        unsafe {
            self.gl.framebuffer_renderbuffer(
                target,
                attachment,
                renderbuffer_target,
                renderbuffer.map(|raw| glow::NativeRenderbuffer(raw.0)),
            )
        }
    }

    fn draw_buffers(&mut self, buffers: &[u32]) {
        unsafe { self.gl.draw_buffers(buffers) }
    }

    fn read_buffer(&mut self, src: u32) {
        unsafe { self.gl.read_buffer(src) }
    }

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
    ) {
        unsafe {
            self.gl.blit_framebuffer(
                src_x0, src_y0, src_x1, src_y1, dst_x0, dst_y0, dst_x1, dst_y1, mask, filter,
            )
        }
    }

    fn invalidate_framebuffer(&mut self, target: u32, attachments: &[u32]) {
        unsafe { self.gl.invalidate_framebuffer(target, attachments) }
    }

    fn clear_buffer_f32_slice(&mut self, target: u32, draw_buffer: u32, values: &[f32]) {
        unsafe { self.gl.clear_buffer_f32_slice(target, draw_buffer, values) }
    }

    fn clear_buffer_i32_slice(&mut self, target: u32, draw_buffer: u32, values: &[i32]) {
        unsafe { self.gl.clear_buffer_i32_slice(target, draw_buffer, values) }
    }

    fn clear_buffer_u32_slice(&mut self, target: u32, draw_buffer: u32, values: &[u32]) {
        unsafe { self.gl.clear_buffer_u32_slice(target, draw_buffer, values) }
    }

    fn clear_buffer_depth_stencil(
        &mut self,
        target: u32,
        draw_buffer: u32,
        depth: f32,
        stencil: i32,
    ) {
        unsafe {
            self.gl
                .clear_buffer_depth_stencil(target, draw_buffer, depth, stencil)
        }
    }

    fn create_sampler(&mut self) -> Result<RawSampler, String> {
        unsafe { self.gl.create_sampler() }.map(|raw| RawSampler(raw.0))
    }

    fn delete_sampler(&mut self, sampler: RawSampler) {
        unsafe { self.gl.delete_sampler(glow::NativeSampler(sampler.0)) }
    }

    fn bind_sampler(&mut self, unit: u32, sampler: Option<RawSampler>) {
        unsafe {
            self.gl
                .bind_sampler(unit, sampler.map(|raw| glow::NativeSampler(raw.0)))
        }
    }

    fn sampler_parameter_i32(&mut self, sampler: RawSampler, name: u32, value: i32) {
        unsafe {
            self.gl
                .sampler_parameter_i32(glow::NativeSampler(sampler.0), name, value)
        }
    }

    fn sampler_parameter_f32(&mut self, sampler: RawSampler, name: u32, value: f32) {
        unsafe {
            self.gl
                .sampler_parameter_f32(glow::NativeSampler(sampler.0), name, value)
        }
    }

    fn create_shader(&mut self, shader_type: u32) -> Result<RawShader, String> {
        unsafe { self.gl.create_shader(shader_type) }.map(|raw| RawShader(raw.0))
    }

    fn delete_shader(&mut self, shader: RawShader) {
        unsafe { self.gl.delete_shader(glow::NativeShader(shader.0)) }
    }

    fn shader_source(&mut self, shader: RawShader, source: &str) {
        unsafe { self.gl.shader_source(glow::NativeShader(shader.0), source) }
    }

    fn compile_shader(&mut self, shader: RawShader) {
        unsafe { self.gl.compile_shader(glow::NativeShader(shader.0)) }
    }

    fn get_shader_compile_status(&mut self, shader: RawShader) -> bool {
        unsafe {
            self.gl
                .get_shader_compile_status(glow::NativeShader(shader.0))
        }
    }

    fn get_shader_info_log(&mut self, shader: RawShader) -> String {
        unsafe { self.gl.get_shader_info_log(glow::NativeShader(shader.0)) }
    }

    fn create_program(&mut self) -> Result<RawProgram, String> {
        unsafe { self.gl.create_program() }.map(|raw| RawProgram(raw.0))
    }

    fn delete_program(&mut self, program: RawProgram) {
        unsafe { self.gl.delete_program(glow::NativeProgram(program.0)) }
    }

    fn attach_shader(&mut self, program: RawProgram, shader: RawShader) {
        unsafe {
            self.gl.attach_shader(
                glow::NativeProgram(program.0),
                glow::NativeShader(shader.0),
            )
        }
    }

    fn detach_shader(&mut self, program: RawProgram, shader: RawShader) {
        unsafe {
            self.gl.detach_shader(
                glow::NativeProgram(program.0),
                glow::NativeShader(shader.0),
            )
        }
    }

    fn link_program(&mut self, program: RawProgram) {
        unsafe { self.gl.link_program(glow::NativeProgram(program.0)) }
    }

    fn get_program_link_status(&mut self, program: RawProgram) -> bool {
        unsafe {
            self.gl
                .get_program_link_status(glow::NativeProgram(program.0))
        }
    }

    fn get_program_info_log(&mut self, program: RawProgram) -> String {
        unsafe { self.gl.get_program_info_log(glow::NativeProgram(program.0)) }
    }

    fn use_program(&mut self, program: Option<RawProgram>) {
        unsafe {
            self.gl
                .use_program(program.map(|raw| glow::NativeProgram(raw.0)))
        }
    }

    fn active_uniforms(&mut self, program: RawProgram) -> Vec<ActiveUniform> {
        let raw = glow::NativeProgram(program.0);
        let count = unsafe { self.gl.get_active_uniforms(raw) };
        (0..count)
            .filter_map(|index| unsafe { self.gl.get_active_uniform(raw, index) })
            // members of uniform blocks have no location
            .filter(|uniform| unsafe { self.gl.get_uniform_location(raw, &uniform.name) }.is_some())
            .map(|uniform| ActiveUniform {
                name: uniform.name.trim_end_matches("[0]").to_string(),
                utype: uniform.utype,
                size: uniform.size,
            })
            .collect()
    }

    fn active_uniform_blocks(&mut self, program: RawProgram) -> Vec<String> {
        let raw = glow::NativeProgram(program.0);
        let count = unsafe {
            self.gl
                .get_program_parameter_i32(raw, glow::ACTIVE_UNIFORM_BLOCKS)
        };
        (0..count.max(0) as u32)
            .map(|index| unsafe { self.gl.get_active_uniform_block_name(raw, index) })
            .collect()
    }

    fn uniform_block_binding(&mut self, program: RawProgram, index: u32, binding: u32) {
        unsafe {
            self.gl
                .uniform_block_binding(glow::NativeProgram(program.0), index, binding)
        }
    }

    fn uniform_1_i32(&mut self, program: RawProgram, name: &str, value: i32) {
        let raw = glow::NativeProgram(program.0);
        unsafe {
            self.gl.use_program(Some(raw));
            let location = self.gl.get_uniform_location(raw, name);
            self.gl.uniform_1_i32(location.as_ref(), value);
        }
    }

    fn create_vertex_array(&mut self) -> Result<RawVertexArray, String> {
        unsafe { self.gl.create_vertex_array() }.map(|raw| RawVertexArray(raw.0))
    }

    fn delete_vertex_array(&mut self, vertex_array: RawVertexArray) {
        unsafe {
            self.gl
                .delete_vertex_array(glow::NativeVertexArray(vertex_array.0))
        }
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<RawVertexArray>) {
        unsafe {
            self.gl
                .bind_vertex_array(vertex_array.map(|raw| glow::NativeVertexArray(raw.0)))
        }
    }

    fn enable_vertex_attrib_array(&mut self, index: u32) {
        unsafe { self.gl.enable_vertex_attrib_array(index) }
    }

    fn vertex_attrib_pointer_f32(
        &mut self,
        index: u32,
        size: i32,
        data_type: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
    ) {
        unsafe {
            self.gl
                .vertex_attrib_pointer_f32(index, size, data_type, normalized, stride, offset)
        }
    }

    fn vertex_attrib_pointer_i32(
        &mut self,
        index: u32,
        size: i32,
        data_type: u32,
        stride: i32,
        offset: i32,
    ) {
        unsafe {
            self.gl
                .vertex_attrib_pointer_i32(index, size, data_type, stride, offset)
        }
    }

    fn vertex_attrib_divisor(&mut self, index: u32, divisor: u32) {
        unsafe { self.gl.vertex_attrib_divisor(index, divisor) }
    }

    fn enable(&mut self, capability: u32) {
        unsafe { self.gl.enable(capability) }
    }

    fn disable(&mut self, capability: u32) {
        unsafe { self.gl.disable(capability) }
    }

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.viewport(x, y, width, height) }
    }

    fn depth_range_f32(&mut self, near: f32, far: f32) {
        unsafe { self.gl.depth_range_f32(near, far) }
    }

    fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.scissor(x, y, width, height) }
    }

    fn color_mask(&mut self, red: bool, green: bool, blue: bool, alpha: bool) {
        unsafe { self.gl.color_mask(red, green, blue, alpha) }
    }

    fn depth_mask(&mut self, value: bool) {
        unsafe { self.gl.depth_mask(value) }
    }

    fn depth_func(&mut self, func: u32) {
        unsafe { self.gl.depth_func(func) }
    }

    fn stencil_func_separate(&mut self, face: u32, func: u32, reference: i32, mask: u32) {
        unsafe { self.gl.stencil_func_separate(face, func, reference, mask) }
    }

    fn stencil_op_separate(&mut self, face: u32, fail: u32, depth_fail: u32, pass: u32) {
        unsafe { self.gl.stencil_op_separate(face, fail, depth_fail, pass) }
    }

    fn stencil_mask_separate(&mut self, face: u32, mask: u32) {
        unsafe { self.gl.stencil_mask_separate(face, mask) }
    }

    fn front_face(&mut self, value: u32) {
        unsafe { self.gl.front_face(value) }
    }

    fn cull_face(&mut self, value: u32) {
        unsafe { self.gl.cull_face(value) }
    }

    fn polygon_offset(&mut self, factor: f32, units: f32) {
        unsafe { self.gl.polygon_offset(factor, units) }
    }

    fn blend_color(&mut self, red: f32, green: f32, blue: f32, alpha: f32) {
        unsafe { self.gl.blend_color(red, green, blue, alpha) }
    }

    fn blend_equation_separate(&mut self, mode_rgb: u32, mode_alpha: u32) {
        unsafe { self.gl.blend_equation_separate(mode_rgb, mode_alpha) }
    }

    fn blend_func_separate(&mut self, src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32) {
        unsafe {
            self.gl
                .blend_func_separate(src_rgb, dst_rgb, src_alpha, dst_alpha)
        }
    }

    fn draw_arrays(&mut self, mode: u32, first: i32, count: i32) {
        unsafe { self.gl.draw_arrays(mode, first, count) }
    }

    fn draw_arrays_instanced(&mut self, mode: u32, first: i32, count: i32, instance_count: i32) {
        unsafe {
            self.gl
                .draw_arrays_instanced(mode, first, count, instance_count)
        }
    }

    fn draw_elements(&mut self, mode: u32, count: i32, element_type: u32, offset: i32) {
        unsafe { self.gl.draw_elements(mode, count, element_type, offset) }
    }

    fn draw_elements_instanced(
        &mut self,
        mode: u32,
        count: i32,
        element_type: u32,
        offset: i32,
        instance_count: i32,
    ) {
        unsafe {
            self.gl
                .draw_elements_instanced(mode, count, element_type, offset, instance_count)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorLatch;

    #[test]
    fn loss_is_polled_without_allocating() {
        let mut latch = ErrorLatch::default();
        assert!(!latch.is_lost(|| glow::NO_ERROR));
        assert!(latch.is_lost(|| glow::CONTEXT_LOST));
        assert!(latch.is_lost(|| unreachable!("loss is latched")));
    }

    #[test]
    fn polled_errors_stay_pending() {
        let mut latch = ErrorLatch::default();
        assert!(!latch.is_lost(|| glow::OUT_OF_MEMORY));
        assert!(!latch.is_lost(|| unreachable!("a flag is already held")));
        assert_eq!(latch.next_error(|| glow::NO_ERROR), glow::OUT_OF_MEMORY);
        assert_eq!(latch.next_error(|| glow::NO_ERROR), glow::NO_ERROR);
        assert_eq!(latch.next_error(|| glow::CONTEXT_LOST), glow::CONTEXT_LOST);
        assert!(latch.is_lost(|| glow::NO_ERROR));
    }
}
