use crate::{
    command::{ClearColor, Command, CommandBuffer},
    conv::VertexAttribKind,
    context::{GlContext, RawBuffer, RawFramebuffer},
    device::{ContextState, DeviceShared},
    error::{device_error_class, DeviceError, ErrorClass},
    resource::{Buffer, Texture, TextureInner, TextureView},
};
use std::sync::Arc;
use thiserror::Error;
use wgt::{ColorWrites, ErrorFilter};

const CUBEMAP_FACES: [u32; 6] = [
    glow::TEXTURE_CUBE_MAP_POSITIVE_X,
    glow::TEXTURE_CUBE_MAP_NEGATIVE_X,
    glow::TEXTURE_CUBE_MAP_POSITIVE_Y,
    glow::TEXTURE_CUBE_MAP_NEGATIVE_Y,
    glow::TEXTURE_CUBE_MAP_POSITIVE_Z,
    glow::TEXTURE_CUBE_MAP_NEGATIVE_Z,
];

fn is_layered_target(target: u32) -> bool {
    match target {
        glow::TEXTURE_2D_ARRAY | glow::TEXTURE_3D => true,
        _ => false,
    }
}

/// Failure while interpreting a recorded command.
///
/// Recording validates everything it can see. These cover what only becomes
/// known on submission, like a buffer destroyed in between.
#[derive(Clone, Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("Buffer '{0}' is destroyed")]
    BufferDestroyed(String),
    #[error("Buffer '{0}' is still mapped")]
    BufferMapped(String),
    #[error("Texture '{0}' is destroyed")]
    TextureDestroyed(String),
}

device_error_class!(ExecutionError);

#[derive(Clone, Debug, Error)]
pub enum QueueSubmitError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("Command buffer was recorded on a different device")]
    WrongDevice,
    #[error("Command buffer is invalid")]
    InvalidCommandBuffer,
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl ErrorClass for QueueSubmitError {
    fn filter(&self) -> ErrorFilter {
        match *self {
            Self::Device(ref err) => err.filter(),
            Self::Execution(ref err) => err.filter(),
            _ => ErrorFilter::Validation,
        }
    }
}

/// Executes command buffers against the context of its device.
#[derive(Debug)]
pub struct Queue {
    pub(crate) shared: Arc<DeviceShared>,
}

impl Queue {
    /// Executes `command_buffers` in order, then runs one maintenance turn.
    ///
    /// A failing command buffer is abandoned at the failing command and
    /// reported. The buffers after it still execute.
    pub fn submit<I: IntoIterator<Item = CommandBuffer>>(&self, command_buffers: I) {
        profiling::scope!("Queue::submit");
        let shared = &self.shared;
        let mut errors = Vec::new();
        match shared.check_alive() {
            Ok(()) => {
                let mut ctx = shared.lock_context();
                for cmd_buf in command_buffers {
                    if let Err(err) = ctx.execute(shared, &cmd_buf) {
                        errors.push((err, cmd_buf.label.clone()));
                    }
                }
            }
            Err(err) => errors.push((err.into(), String::new())),
        }

        for (err, label) in errors {
            shared.handle_error(err, "Queue::submit", &label);
        }
        shared.maintain();
    }
}

impl ContextState {
    fn execute(
        &mut self,
        device: &Arc<DeviceShared>,
        cmd_buf: &CommandBuffer,
    ) -> Result<(), QueueSubmitError> {
        if !Arc::ptr_eq(&cmd_buf.device, device) {
            return Err(QueueSubmitError::WrongDevice);
        }
        if !cmd_buf.valid {
            return Err(QueueSubmitError::InvalidCommandBuffer);
        }
        log::debug!(
            "Executing command buffer '{}' with {} commands",
            cmd_buf.label,
            cmd_buf.commands.len()
        );

        let result = cmd_buf
            .commands
            .iter()
            .try_for_each(|command| self.process(command));
        self.reset_state();
        if let Err(ref err) = result {
            log::debug!("Abandoning command buffer '{}': {}", cmd_buf.label, err);
        }
        result.map_err(QueueSubmitError::from)
    }

    /// Puts back the state that commands expect to find.
    fn reset_state(&mut self) {
        let gl = &mut *self.gl;
        gl.use_program(None);
        gl.bind_vertex_array(None);
        gl.bind_framebuffer(glow::FRAMEBUFFER, None);
        gl.disable(glow::DEPTH_TEST);
        gl.disable(glow::STENCIL_TEST);
        gl.disable(glow::SCISSOR_TEST);
        gl.disable(glow::BLEND);
        gl.disable(glow::CULL_FACE);
        gl.disable(glow::POLYGON_OFFSET_FILL);
        gl.bind_buffer(glow::ARRAY_BUFFER, None);
    }

    fn framebuffer(
        gl: &mut dyn GlContext,
        slot: &mut Option<RawFramebuffer>,
    ) -> Result<RawFramebuffer, ExecutionError> {
        match *slot {
            Some(fbo) => Ok(fbo),
            None => {
                let fbo = gl
                    .create_framebuffer()
                    .map_err(|_| DeviceError::OutOfMemory)?;
                *slot = Some(fbo);
                Ok(fbo)
            }
        }
    }

    fn draw_fbo(&mut self) -> Result<RawFramebuffer, ExecutionError> {
        Self::framebuffer(&mut *self.gl, &mut self.draw_fbo)
    }

    fn copy_fbo(&mut self) -> Result<RawFramebuffer, ExecutionError> {
        Self::framebuffer(&mut *self.gl, &mut self.copy_fbo)
    }

    fn texture_inner(&mut self, texture: &Texture) -> Result<TextureInner, ExecutionError> {
        let mut state = texture.state.lock();
        if state.destroyed {
            return Err(ExecutionError::TextureDestroyed(texture.info.label.clone()));
        }
        match state.raw {
            Some(inner) => Ok(inner),
            None => {
                // surface storage is only allocated on first use
                let inner = texture.allocate(&mut *self.gl)?;
                log::trace!("Allocated surface texture '{}'", texture.info.label);
                state.raw = Some(inner);
                Ok(inner)
            }
        }
    }

    fn set_attachment(
        &mut self,
        fbo_target: u32,
        attachment: u32,
        view: &TextureView,
    ) -> Result<(), ExecutionError> {
        let inner = self.texture_inner(&view.texture)?;
        let gl = &mut *self.gl;
        match inner {
            TextureInner::Renderbuffer { raw } => {
                gl.framebuffer_renderbuffer(fbo_target, attachment, glow::RENDERBUFFER, Some(raw));
            }
            TextureInner::Texture { raw, target } => {
                let level = view.mip_levels.start as i32;
                let layer = view.array_layers.start;
                if is_layered_target(target) {
                    gl.framebuffer_texture_layer(fbo_target, attachment, Some(raw), level, layer as i32);
                } else if target == glow::TEXTURE_CUBE_MAP {
                    gl.framebuffer_texture_2d(
                        fbo_target,
                        attachment,
                        CUBEMAP_FACES[layer as usize],
                        Some(raw),
                        level,
                    );
                } else {
                    gl.framebuffer_texture_2d(fbo_target, attachment, target, Some(raw), level);
                }
            }
        }
        Ok(())
    }

    fn process(&mut self, command: &Command) -> Result<(), ExecutionError> {
        log::trace!("{:?}", command);
        match *command {
            Command::CopyBufferToBuffer {
                ref src,
                ref dst,
                src_offset,
                dst_offset,
                size,
            } => {
                let src_raw = raw_buffer(src)?;
                let dst_raw = raw_buffer(dst)?;
                let src_target = glow::COPY_READ_BUFFER;
                let dst_target = if dst.is_index() || src.is_index() {
                    glow::ELEMENT_ARRAY_BUFFER
                } else {
                    glow::COPY_WRITE_BUFFER
                };
                let gl = &mut *self.gl;
                gl.bind_buffer(src_target, Some(src_raw));
                gl.bind_buffer(dst_target, Some(dst_raw));
                gl.copy_buffer_sub_data(
                    src_target,
                    dst_target,
                    src_offset as i32,
                    dst_offset as i32,
                    size as i32,
                );
                gl.bind_buffer(src_target, None);
                gl.bind_buffer(dst_target, None);
            }
            Command::CopyBufferToTexture {
                ref src,
                ref dst,
                ref layout,
                mip_level,
                origin,
                size,
            } => {
                let src_raw = raw_buffer(src)?;
                let (raw, target) = match self.texture_inner(dst)? {
                    TextureInner::Texture { raw, target } => (raw, target),
                    TextureInner::Renderbuffer { .. } => {
                        unreachable!("copy destinations are never renderbuffers")
                    }
                };
                let format_desc = dst.format_desc;
                let block_size = dst.format().block_size();
                let bytes_per_row = layout.bytes_per_row.unwrap_or(size.width * block_size);
                let rows_per_image = layout.rows_per_image.unwrap_or(size.height);
                let image_size = bytes_per_row * rows_per_image;
                let level = mip_level as i32;
                let offset = layout.offset as u32;

                let gl = &mut *self.gl;
                gl.bind_buffer(glow::PIXEL_UNPACK_BUFFER, Some(src_raw));
                gl.bind_texture(target, Some(raw));
                gl.pixel_store_i32(glow::UNPACK_ROW_LENGTH, (bytes_per_row / block_size) as i32);
                gl.pixel_store_i32(glow::UNPACK_IMAGE_HEIGHT, rows_per_image as i32);
                match target {
                    glow::TEXTURE_3D | glow::TEXTURE_2D_ARRAY => gl.tex_sub_image_3d(
                        target,
                        level,
                        origin.x as i32,
                        origin.y as i32,
                        origin.z as i32,
                        size.width as i32,
                        size.height as i32,
                        size.depth_or_array_layers as i32,
                        format_desc.external,
                        format_desc.data_type,
                        offset,
                    ),
                    glow::TEXTURE_CUBE_MAP => {
                        for i in 0..size.depth_or_array_layers {
                            gl.tex_sub_image_2d(
                                CUBEMAP_FACES[(origin.z + i) as usize],
                                level,
                                origin.x as i32,
                                origin.y as i32,
                                size.width as i32,
                                size.height as i32,
                                format_desc.external,
                                format_desc.data_type,
                                offset + i * image_size,
                            );
                        }
                    }
                    _ => gl.tex_sub_image_2d(
                        target,
                        level,
                        origin.x as i32,
                        origin.y as i32,
                        size.width as i32,
                        size.height as i32,
                        format_desc.external,
                        format_desc.data_type,
                        offset,
                    ),
                }
                gl.pixel_store_i32(glow::UNPACK_ROW_LENGTH, 0);
                gl.pixel_store_i32(glow::UNPACK_IMAGE_HEIGHT, 0);
                gl.bind_texture(target, None);
                gl.bind_buffer(glow::PIXEL_UNPACK_BUFFER, None);
            }
            Command::ResetFramebuffer { is_default } => {
                if is_default {
                    self.gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, None);
                } else {
                    let fbo = self.draw_fbo()?;
                    let gl = &mut *self.gl;
                    gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, Some(fbo));
                    gl.framebuffer_texture_2d(
                        glow::DRAW_FRAMEBUFFER,
                        glow::DEPTH_STENCIL_ATTACHMENT,
                        glow::TEXTURE_2D,
                        None,
                        0,
                    );
                    for i in 0..wgt::MAX_COLOR_ATTACHMENTS as u32 {
                        gl.framebuffer_texture_2d(
                            glow::DRAW_FRAMEBUFFER,
                            glow::COLOR_ATTACHMENT0 + i,
                            glow::TEXTURE_2D,
                            None,
                            0,
                        );
                    }
                }
                let gl = &mut *self.gl;
                gl.color_mask(true, true, true, true);
                gl.depth_mask(true);
                gl.stencil_mask_separate(glow::FRONT_AND_BACK, !0);
                gl.disable(glow::DEPTH_TEST);
                gl.disable(glow::STENCIL_TEST);
                gl.disable(glow::SCISSOR_TEST);
            }
            Command::BindAttachment {
                attachment,
                ref view,
            } => {
                self.set_attachment(glow::DRAW_FRAMEBUFFER, attachment, view)?;
            }
            Command::SetDrawColorBuffers(ref indices) => {
                self.gl.draw_buffers(indices);
            }
            Command::ClearColor { draw_buffer, value } => {
                let gl = &mut *self.gl;
                match value {
                    ClearColor::Float(ref values) => {
                        gl.clear_buffer_f32_slice(glow::COLOR, draw_buffer, values)
                    }
                    ClearColor::Sint(ref values) => {
                        gl.clear_buffer_i32_slice(glow::COLOR, draw_buffer, values)
                    }
                    ClearColor::Uint(ref values) => {
                        gl.clear_buffer_u32_slice(glow::COLOR, draw_buffer, values)
                    }
                }
            }
            Command::ClearDepth(depth) => {
                self.gl.clear_buffer_f32_slice(glow::DEPTH, 0, &[depth]);
            }
            Command::ClearStencil(value) => {
                self.gl
                    .clear_buffer_i32_slice(glow::STENCIL, 0, &[value as i32]);
            }
            Command::ClearDepthAndStencil(depth, stencil) => {
                self.gl
                    .clear_buffer_depth_stencil(glow::DEPTH_STENCIL, 0, depth, stencil as i32);
            }
            Command::ResolveAttachment {
                attachment,
                ref dst,
                size,
            } => {
                let draw_fbo = self.draw_fbo()?;
                self.gl
                    .bind_framebuffer(glow::READ_FRAMEBUFFER, Some(draw_fbo));
                self.gl.read_buffer(attachment);
                match *dst {
                    Some(ref view) => {
                        let copy_fbo = self.copy_fbo()?;
                        self.gl
                            .bind_framebuffer(glow::DRAW_FRAMEBUFFER, Some(copy_fbo));
                        self.set_attachment(glow::DRAW_FRAMEBUFFER, glow::COLOR_ATTACHMENT0, view)?;
                    }
                    None => self.gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, None),
                }
                let (w, h) = (size.width as i32, size.height as i32);
                let gl = &mut *self.gl;
                gl.blit_framebuffer(
                    0,
                    0,
                    w,
                    h,
                    0,
                    0,
                    w,
                    h,
                    glow::COLOR_BUFFER_BIT,
                    glow::NEAREST,
                );
                gl.bind_framebuffer(glow::READ_FRAMEBUFFER, None);
                gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, Some(draw_fbo));
            }
            Command::InvalidateAttachments(ref list) => {
                self.gl
                    .invalidate_framebuffer(glow::DRAW_FRAMEBUFFER, list);
            }
            Command::SetViewport {
                ref rect,
                ref depth,
            } => {
                let gl = &mut *self.gl;
                gl.viewport(rect.x as i32, rect.y as i32, rect.w as i32, rect.h as i32);
                gl.depth_range_f32(depth.start, depth.end);
            }
            Command::SetScissor(ref rect) => {
                let gl = &mut *self.gl;
                gl.scissor(rect.x as i32, rect.y as i32, rect.w as i32, rect.h as i32);
                gl.enable(glow::SCISSOR_TEST);
            }
            Command::SetProgram(ref pipeline) => {
                let gl = &mut *self.gl;
                gl.use_program(pipeline.program);
                gl.bind_vertex_array(pipeline.vertex_array);
            }
            Command::SetPrimitive {
                front_face,
                cull_face,
            } => {
                let gl = &mut *self.gl;
                gl.front_face(front_face);
                if cull_face != 0 {
                    gl.enable(glow::CULL_FACE);
                    gl.cull_face(cull_face);
                } else {
                    gl.disable(glow::CULL_FACE);
                }
            }
            Command::SetColorTarget(ref desc) => {
                let gl = &mut *self.gl;
                gl.color_mask(
                    desc.mask.contains(ColorWrites::RED),
                    desc.mask.contains(ColorWrites::GREEN),
                    desc.mask.contains(ColorWrites::BLUE),
                    desc.mask.contains(ColorWrites::ALPHA),
                );
                match desc.blend {
                    Some(ref blend) => {
                        gl.enable(glow::BLEND);
                        gl.blend_equation_separate(blend.color.equation, blend.alpha.equation);
                        gl.blend_func_separate(
                            blend.color.src,
                            blend.color.dst,
                            blend.alpha.src,
                            blend.alpha.dst,
                        );
                    }
                    None => gl.disable(glow::BLEND),
                }
            }
            Command::SetDepthBias(ref bias) => {
                let gl = &mut *self.gl;
                if bias.is_enabled() {
                    gl.enable(glow::POLYGON_OFFSET_FILL);
                    gl.polygon_offset(bias.slope_scale, bias.constant as f32);
                } else {
                    gl.disable(glow::POLYGON_OFFSET_FILL);
                }
            }
            Command::ConfigureDepthStencil { depth, stencil } => {
                let gl = &mut *self.gl;
                match depth {
                    Some(state) => {
                        gl.enable(glow::DEPTH_TEST);
                        gl.depth_func(state.function);
                        gl.depth_mask(state.mask);
                    }
                    None => gl.disable(glow::DEPTH_TEST),
                }
                if stencil {
                    gl.enable(glow::STENCIL_TEST);
                } else {
                    gl.disable(glow::STENCIL_TEST);
                }
            }
            Command::SetStencilFunc {
                face,
                function,
                reference,
                read_mask,
            } => {
                self.gl
                    .stencil_func_separate(face, function, reference as i32, read_mask);
            }
            Command::SetStencilOps {
                face,
                write_mask,
                ops,
            } => {
                let gl = &mut *self.gl;
                gl.stencil_mask_separate(face, write_mask);
                gl.stencil_op_separate(face, ops.fail, ops.depth_fail, ops.pass);
            }
            Command::SetBlendConstant(c) => {
                self.gl.blend_color(c[0], c[1], c[2], c[3]);
            }
            Command::SetVertexAttribute {
                ref buffer,
                stride,
                offset,
                attribute,
            } => {
                let raw = raw_buffer(buffer)?;
                let format = attribute.format_desc;
                let offset = (offset + attribute.offset as u64) as i32;
                let gl = &mut *self.gl;
                gl.bind_buffer(glow::ARRAY_BUFFER, Some(raw));
                gl.enable_vertex_attrib_array(attribute.location);
                match format.attrib_kind {
                    VertexAttribKind::Float => gl.vertex_attrib_pointer_f32(
                        attribute.location,
                        format.element_count,
                        format.element_format,
                        format.normalized,
                        stride as i32,
                        offset,
                    ),
                    VertexAttribKind::Integer => gl.vertex_attrib_pointer_i32(
                        attribute.location,
                        format.element_count,
                        format.element_format,
                        stride as i32,
                        offset,
                    ),
                }
            }
            Command::SetIndexBuffer(ref buffer) => {
                let raw = raw_buffer(buffer)?;
                self.gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(raw));
            }
            Command::BindBuffer {
                slot,
                ref buffer,
                offset,
                size,
            } => {
                let raw = raw_buffer(buffer)?;
                self.gl.bind_buffer_range(
                    glow::UNIFORM_BUFFER,
                    slot,
                    Some(raw),
                    offset as i32,
                    size as i32,
                );
            }
            Command::BindTexture { slot, ref view } => {
                let (raw, target) = match self.texture_inner(&view.texture)? {
                    TextureInner::Texture { raw, target } => (raw, target),
                    TextureInner::Renderbuffer { .. } => {
                        unreachable!("renderbuffers are never bound for sampling")
                    }
                };
                let gl = &mut *self.gl;
                gl.active_texture(glow::TEXTURE0 + slot);
                gl.bind_texture(target, Some(raw));
            }
            Command::BindSampler { slot, ref sampler } => {
                self.gl.bind_sampler(slot, sampler.raw);
            }
            Command::Draw {
                topology,
                first_vertex,
                vertex_count,
                instance_count,
            } => {
                if instance_count == 1 {
                    self.gl
                        .draw_arrays(topology, first_vertex as i32, vertex_count as i32);
                } else {
                    self.gl.draw_arrays_instanced(
                        topology,
                        first_vertex as i32,
                        vertex_count as i32,
                        instance_count as i32,
                    );
                }
            }
            Command::DrawIndexed {
                topology,
                index_type,
                index_offset,
                index_count,
                instance_count,
            } => {
                if instance_count == 1 {
                    self.gl.draw_elements(
                        topology,
                        index_count as i32,
                        index_type,
                        index_offset as i32,
                    );
                } else {
                    self.gl.draw_elements_instanced(
                        topology,
                        index_count as i32,
                        index_type,
                        index_offset as i32,
                        instance_count as i32,
                    );
                }
            }
        }
        Ok(())
    }
}

/// Returns the native buffer, if it can be used by the context right now.
fn raw_buffer(buffer: &Buffer) -> Result<RawBuffer, ExecutionError> {
    let state = buffer
        .lock_state()
        .map_err(|_| ExecutionError::BufferMapped(buffer.info.label.clone()))?;
    if state.destroyed {
        return Err(ExecutionError::BufferDestroyed(buffer.info.label.clone()));
    }
    if state.is_mapped() {
        return Err(ExecutionError::BufferMapped(buffer.info.label.clone()));
    }
    state
        .raw
        .ok_or_else(|| ExecutionError::BufferDestroyed(buffer.info.label.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layered_targets() {
        assert!(is_layered_target(glow::TEXTURE_2D_ARRAY));
        assert!(is_layered_target(glow::TEXTURE_3D));
        assert!(!is_layered_target(glow::TEXTURE_2D));
        assert!(!is_layered_target(glow::TEXTURE_CUBE_MAP));
    }

    #[test]
    fn submit_error_filters() {
        assert_eq!(
            QueueSubmitError::from(ExecutionError::Device(DeviceError::OutOfMemory)).filter(),
            ErrorFilter::OutOfMemory
        );
        assert_eq!(
            QueueSubmitError::from(ExecutionError::BufferDestroyed("b".to_string())).filter(),
            ErrorFilter::Validation
        );
        assert_eq!(QueueSubmitError::WrongDevice.filter(), ErrorFilter::Validation);
    }
}
