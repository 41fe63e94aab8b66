//! An in-memory context that needs no driver.
//!
//! Buffer storage is emulated so uploads, copies and read-backs round-trip.
//! Everything else only records the call. Programs are reflected by scanning
//! the `uniform` declarations of their GLSL sources, which is enough for the
//! binding model to be exercised end to end.

use crate::context::{
    ActiveUniform, GlContext, RawBuffer, RawFramebuffer, RawProgram, RawRenderbuffer, RawSampler,
    RawShader, RawTexture, RawVertexArray,
};
use fxhash::FxHashMap;
use parking_lot::Mutex;
use std::{num::NonZeroU32, sync::Arc};

/// One recorded call into a [`HeadlessContext`].
#[derive(Clone, Debug, PartialEq)]
#[allow(missing_docs)]
pub enum Call {
    Finish,
    CreateBuffer(RawBuffer),
    DeleteBuffer(RawBuffer),
    BindBuffer {
        target: u32,
        buffer: Option<RawBuffer>,
    },
    BufferDataSize {
        target: u32,
        size: i32,
        usage: u32,
    },
    BufferSubData {
        target: u32,
        offset: i32,
        data: Vec<u8>,
    },
    GetBufferSubData {
        target: u32,
        offset: i32,
        size: usize,
    },
    CopyBufferSubData {
        src_target: u32,
        dst_target: u32,
        src_offset: i32,
        dst_offset: i32,
        size: i32,
    },
    BindBufferRange {
        target: u32,
        index: u32,
        buffer: Option<RawBuffer>,
        offset: i32,
        size: i32,
    },
    CreateTexture(RawTexture),
    DeleteTexture(RawTexture),
    ActiveTexture(u32),
    BindTexture {
        target: u32,
        texture: Option<RawTexture>,
    },
    TexStorage2d {
        target: u32,
        levels: i32,
        internal_format: u32,
        width: i32,
        height: i32,
    },
    TexStorage3d {
        target: u32,
        levels: i32,
        internal_format: u32,
        width: i32,
        height: i32,
        depth: i32,
    },
    TexParameter {
        target: u32,
        parameter: u32,
        value: i32,
    },
    PixelStore {
        parameter: u32,
        value: i32,
    },
    TexSubImage {
        target: u32,
        level: i32,
        origin: [i32; 3],
        size: [i32; 3],
        format: u32,
        ty: u32,
        offset: u32,
    },
    CreateRenderbuffer(RawRenderbuffer),
    DeleteRenderbuffer(RawRenderbuffer),
    BindRenderbuffer(Option<RawRenderbuffer>),
    RenderbufferStorage {
        samples: i32,
        internal_format: u32,
        width: i32,
        height: i32,
    },
    CreateFramebuffer(RawFramebuffer),
    DeleteFramebuffer(RawFramebuffer),
    BindFramebuffer {
        target: u32,
        framebuffer: Option<RawFramebuffer>,
    },
    FramebufferTexture2d {
        target: u32,
        attachment: u32,
        texture_target: u32,
        texture: Option<RawTexture>,
        level: i32,
    },
    FramebufferTextureLayer {
        target: u32,
        attachment: u32,
        texture: Option<RawTexture>,
        level: i32,
        layer: i32,
    },
    FramebufferRenderbuffer {
        target: u32,
        attachment: u32,
        renderbuffer: Option<RawRenderbuffer>,
    },
    DrawBuffers(Vec<u32>),
    ReadBuffer(u32),
    BlitFramebuffer {
        src: [i32; 4],
        dst: [i32; 4],
        mask: u32,
        filter: u32,
    },
    InvalidateFramebuffer {
        target: u32,
        attachments: Vec<u32>,
    },
    ClearBufferF32 {
        target: u32,
        draw_buffer: u32,
        values: Vec<f32>,
    },
    ClearBufferI32 {
        target: u32,
        draw_buffer: u32,
        values: Vec<i32>,
    },
    ClearBufferU32 {
        target: u32,
        draw_buffer: u32,
        values: Vec<u32>,
    },
    ClearBufferDepthStencil {
        depth: f32,
        stencil: i32,
    },
    CreateSampler(RawSampler),
    DeleteSampler(RawSampler),
    BindSampler {
        unit: u32,
        sampler: Option<RawSampler>,
    },
    SamplerParameterI32 {
        sampler: RawSampler,
        name: u32,
        value: i32,
    },
    SamplerParameterF32 {
        sampler: RawSampler,
        name: u32,
        value: f32,
    },
    CreateShader {
        shader: RawShader,
        shader_type: u32,
    },
    DeleteShader(RawShader),
    CompileShader(RawShader),
    CreateProgram(RawProgram),
    DeleteProgram(RawProgram),
    AttachShader {
        program: RawProgram,
        shader: RawShader,
    },
    LinkProgram(RawProgram),
    UseProgram(Option<RawProgram>),
    UniformBlockBinding {
        program: RawProgram,
        index: u32,
        binding: u32,
    },
    Uniform1I32 {
        program: RawProgram,
        name: String,
        value: i32,
    },
    CreateVertexArray(RawVertexArray),
    DeleteVertexArray(RawVertexArray),
    BindVertexArray(Option<RawVertexArray>),
    EnableVertexAttribArray(u32),
    VertexAttribPointer {
        index: u32,
        size: i32,
        data_type: u32,
        normalized: bool,
        integer: bool,
        stride: i32,
        offset: i32,
    },
    VertexAttribDivisor {
        index: u32,
        divisor: u32,
    },
    Enable(u32),
    Disable(u32),
    Viewport([i32; 4]),
    DepthRange(f32, f32),
    Scissor([i32; 4]),
    ColorMask([bool; 4]),
    DepthMask(bool),
    DepthFunc(u32),
    StencilFuncSeparate {
        face: u32,
        func: u32,
        reference: i32,
        mask: u32,
    },
    StencilOpSeparate {
        face: u32,
        fail: u32,
        depth_fail: u32,
        pass: u32,
    },
    StencilMaskSeparate {
        face: u32,
        mask: u32,
    },
    FrontFace(u32),
    CullFace(u32),
    PolygonOffset(f32, f32),
    BlendColor([f32; 4]),
    BlendEquationSeparate(u32, u32),
    BlendFuncSeparate([u32; 4]),
    DrawArrays {
        mode: u32,
        first: i32,
        count: i32,
        instance_count: i32,
    },
    DrawElements {
        mode: u32,
        count: i32,
        element_type: u32,
        offset: i32,
        instance_count: i32,
    },
}

struct ShaderObject {
    shader_type: u32,
    source: String,
    compiled: bool,
    log: String,
}

#[derive(Default)]
struct ProgramObject {
    shaders: Vec<RawShader>,
    linked: bool,
    log: String,
    uniforms: Vec<ActiveUniform>,
    blocks: Vec<String>,
}

#[derive(Default)]
struct State {
    last_name: u32,
    calls: Vec<Call>,
    lost: bool,
    errors: Vec<u32>,
    extensions: Vec<String>,
    memory_budget: Option<u64>,
    memory_used: u64,
    buffers: FxHashMap<RawBuffer, Vec<u8>>,
    buffer_bindings: FxHashMap<u32, RawBuffer>,
    texture_bindings: FxHashMap<u32, RawTexture>,
    texture_bytes: FxHashMap<RawTexture, u64>,
    bound_renderbuffer: Option<RawRenderbuffer>,
    renderbuffer_bytes: FxHashMap<RawRenderbuffer, u64>,
    shaders: FxHashMap<RawShader, ShaderObject>,
    programs: FxHashMap<RawProgram, ProgramObject>,
}

impl State {
    fn next_name(&mut self) -> Result<NonZeroU32, String> {
        if self.lost {
            return Err("context lost".to_string());
        }
        self.last_name += 1;
        NonZeroU32::new(self.last_name).ok_or_else(|| "object names exhausted".to_string())
    }

    fn error(&mut self, code: u32) {
        self.errors.push(code);
    }

    /// Reserves `bytes` of the memory budget, replacing a previous
    /// reservation of `previous` bytes.
    fn reserve(&mut self, previous: u64, bytes: u64) -> bool {
        let used = self.memory_used - previous;
        match self.memory_budget {
            Some(budget) if used + bytes > budget => {
                self.error(glow::OUT_OF_MEMORY);
                false
            }
            _ => {
                self.memory_used = used + bytes;
                true
            }
        }
    }

    fn bound_buffer(&mut self, target: u32) -> Option<&mut Vec<u8>> {
        let buffer = *self.buffer_bindings.get(&target)?;
        self.buffers.get_mut(&buffer)
    }

    fn allocate_texture(&mut self, target: u32, bytes: u64) {
        let texture = match self.texture_bindings.get(&target) {
            Some(&texture) => texture,
            None => return self.error(glow::INVALID_OPERATION),
        };
        let previous = self.texture_bytes.get(&texture).copied().unwrap_or(0);
        if self.reserve(previous, bytes) {
            self.texture_bytes.insert(texture, bytes);
        }
    }
}

/// A recording context with emulated buffer storage.
pub struct HeadlessContext {
    state: Arc<Mutex<State>>,
}

/// Shared access to a [`HeadlessContext`] after it was moved into a device.
#[derive(Clone)]
pub struct HeadlessControl {
    state: Arc<Mutex<State>>,
}

impl Default for HeadlessContext {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessContext {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Advertises the given extension strings.
    pub fn with_extensions<I, S>(self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.lock().extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn control(&self) -> HeadlessControl {
        HeadlessControl {
            state: Arc::clone(&self.state),
        }
    }

    fn record(&self, call: Call) {
        self.state.lock().calls.push(call);
    }
}

impl HeadlessControl {
    /// Snapshot of every call recorded so far.
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Drains the recorded calls.
    pub fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut self.state.lock().calls)
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    /// Makes the context report loss from now on.
    pub fn lose_context(&self) {
        self.state.lock().lost = true;
    }

    /// Limits the bytes that buffer, texture and renderbuffer storage may
    /// occupy. Allocations past the budget raise `OUT_OF_MEMORY`.
    pub fn set_memory_budget(&self, budget: Option<u64>) {
        self.state.lock().memory_budget = budget;
    }

    pub fn buffer_contents(&self, buffer: RawBuffer) -> Option<Vec<u8>> {
        self.state.lock().buffers.get(&buffer).cloned()
    }
}

impl GlContext for HeadlessContext {
    fn supported_extensions(&mut self) -> Vec<String> {
        self.state.lock().extensions.clone()
    }
    fn is_context_lost(&mut self) -> bool {
        self.state.lock().lost
    }
    fn get_error(&mut self) -> u32 {
        let mut state = self.state.lock();
        if state.errors.is_empty() {
            glow::NO_ERROR
        } else {
            state.errors.remove(0)
        }
    }
    fn finish(&mut self) {
        self.record(Call::Finish);
    }

    fn create_buffer(&mut self) -> Result<RawBuffer, String> {
        let mut state = self.state.lock();
        let buffer = RawBuffer(state.next_name()?);
        state.buffers.insert(buffer, Vec::new());
        state.calls.push(Call::CreateBuffer(buffer));
        Ok(buffer)
    }
    fn delete_buffer(&mut self, buffer: RawBuffer) {
        let mut state = self.state.lock();
        if let Some(data) = state.buffers.remove(&buffer) {
            state.memory_used -= data.len() as u64;
        }
        state.buffer_bindings.retain(|_, bound| *bound != buffer);
        state.calls.push(Call::DeleteBuffer(buffer));
    }
    fn bind_buffer(&mut self, target: u32, buffer: Option<RawBuffer>) {
        let mut state = self.state.lock();
        match buffer {
            Some(buffer) => state.buffer_bindings.insert(target, buffer),
            None => state.buffer_bindings.remove(&target),
        };
        state.calls.push(Call::BindBuffer { target, buffer });
    }
    fn buffer_data_size(&mut self, target: u32, size: i32, usage: u32) {
        let mut state = self.state.lock();
        state.calls.push(Call::BufferDataSize {
            target,
            size,
            usage,
        });
        let previous = match state.bound_buffer(target) {
            Some(data) => data.len() as u64,
            None => return state.error(glow::INVALID_OPERATION),
        };
        if state.reserve(previous, size.max(0) as u64) {
            if let Some(data) = state.bound_buffer(target) {
                *data = vec![0; size.max(0) as usize];
            }
        }
    }
    fn buffer_sub_data(&mut self, target: u32, offset: i32, data: &[u8]) {
        let mut state = self.state.lock();
        state.calls.push(Call::BufferSubData {
            target,
            offset,
            data: data.to_vec(),
        });
        let offset = offset as usize;
        match state.bound_buffer(target) {
            Some(storage) if offset + data.len() <= storage.len() => {
                storage[offset..offset + data.len()].copy_from_slice(data);
            }
            _ => state.error(glow::INVALID_VALUE),
        }
    }
    fn get_buffer_sub_data(&mut self, target: u32, offset: i32, data: &mut [u8]) {
        let mut state = self.state.lock();
        state.calls.push(Call::GetBufferSubData {
            target,
            offset,
            size: data.len(),
        });
        let offset = offset as usize;
        match state.bound_buffer(target) {
            Some(storage) if offset + data.len() <= storage.len() => {
                data.copy_from_slice(&storage[offset..offset + data.len()]);
            }
            _ => state.error(glow::INVALID_VALUE),
        }
    }
    fn copy_buffer_sub_data(
        &mut self,
        src_target: u32,
        dst_target: u32,
        src_offset: i32,
        dst_offset: i32,
        size: i32,
    ) {
        let mut state = self.state.lock();
        state.calls.push(Call::CopyBufferSubData {
            src_target,
            dst_target,
            src_offset,
            dst_offset,
            size,
        });
        let (src_offset, dst_offset, size) =
            (src_offset as usize, dst_offset as usize, size as usize);
        let chunk = match state.bound_buffer(src_target) {
            Some(src) if src_offset + size <= src.len() => src[src_offset..src_offset + size].to_vec(),
            _ => return state.error(glow::INVALID_VALUE),
        };
        match state.bound_buffer(dst_target) {
            Some(dst) if dst_offset + size <= dst.len() => {
                dst[dst_offset..dst_offset + size].copy_from_slice(&chunk);
            }
            _ => state.error(glow::INVALID_VALUE),
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
        self.record(Call::BindBufferRange {
            target,
            index,
            buffer,
            offset,
            size,
        });
    }

    fn create_texture(&mut self) -> Result<RawTexture, String> {
        let mut state = self.state.lock();
        let texture = RawTexture(state.next_name()?);
        state.calls.push(Call::CreateTexture(texture));
        Ok(texture)
    }
    fn delete_texture(&mut self, texture: RawTexture) {
        let mut state = self.state.lock();
        if let Some(bytes) = state.texture_bytes.remove(&texture) {
            state.memory_used -= bytes;
        }
        state.texture_bindings.retain(|_, bound| *bound != texture);
        state.calls.push(Call::DeleteTexture(texture));
    }
    fn active_texture(&mut self, unit: u32) {
        self.record(Call::ActiveTexture(unit));
    }
    fn bind_texture(&mut self, target: u32, texture: Option<RawTexture>) {
        let mut state = self.state.lock();
        match texture {
            Some(texture) => state.texture_bindings.insert(target, texture),
            None => state.texture_bindings.remove(&target),
        };
        state.calls.push(Call::BindTexture { target, texture });
    }
    fn tex_storage_2d(
        &mut self,
        target: u32,
        levels: i32,
        internal_format: u32,
        width: i32,
        height: i32,
    ) {
        let mut state = self.state.lock();
        state.calls.push(Call::TexStorage2d {
            target,
            levels,
            internal_format,
            width,
            height,
        });
        let layers = if target == glow::TEXTURE_CUBE_MAP { 6 } else { 1 };
        state.allocate_texture(target, texel_bytes(width, height, layers));
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
        let mut state = self.state.lock();
        state.calls.push(Call::TexStorage3d {
            target,
            levels,
            internal_format,
            width,
            height,
            depth,
        });
        state.allocate_texture(target, texel_bytes(width, height, depth));
    }
    fn tex_parameter_i32(&mut self, target: u32, parameter: u32, value: i32) {
        self.record(Call::TexParameter {
            target,
            parameter,
            value,
        });
    }
    fn pixel_store_i32(&mut self, parameter: u32, value: i32) {
        self.record(Call::PixelStore { parameter, value });
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
        self.record(Call::TexSubImage {
            target,
            level,
            origin: [x_offset, y_offset, 0],
            size: [width, height, 1],
            format,
            ty,
            offset,
        });
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
        self.record(Call::TexSubImage {
            target,
            level,
            origin: [x_offset, y_offset, z_offset],
            size: [width, height, depth],
            format,
            ty,
            offset,
        });
    }

    fn create_renderbuffer(&mut self) -> Result<RawRenderbuffer, String> {
        let mut state = self.state.lock();
        let renderbuffer = RawRenderbuffer(state.next_name()?);
        state.calls.push(Call::CreateRenderbuffer(renderbuffer));
        Ok(renderbuffer)
    }
    fn delete_renderbuffer(&mut self, renderbuffer: RawRenderbuffer) {
        let mut state = self.state.lock();
        if let Some(bytes) = state.renderbuffer_bytes.remove(&renderbuffer) {
            state.memory_used -= bytes;
        }
        if state.bound_renderbuffer == Some(renderbuffer) {
            state.bound_renderbuffer = None;
        }
        state.calls.push(Call::DeleteRenderbuffer(renderbuffer));
    }
    fn bind_renderbuffer(&mut self, _target: u32, renderbuffer: Option<RawRenderbuffer>) {
        let mut state = self.state.lock();
        state.bound_renderbuffer = renderbuffer;
        state.calls.push(Call::BindRenderbuffer(renderbuffer));
    }
    fn renderbuffer_storage_multisample(
        &mut self,
        _target: u32,
        samples: i32,
        internal_format: u32,
        width: i32,
        height: i32,
    ) {
        let mut state = self.state.lock();
        state.calls.push(Call::RenderbufferStorage {
            samples,
            internal_format,
            width,
            height,
        });
        let renderbuffer = match state.bound_renderbuffer {
            Some(renderbuffer) => renderbuffer,
            None => return state.error(glow::INVALID_OPERATION),
        };
        let bytes = texel_bytes(width, height, samples.max(1));
        let previous = state
            .renderbuffer_bytes
            .get(&renderbuffer)
            .copied()
            .unwrap_or(0);
        if state.reserve(previous, bytes) {
            state.renderbuffer_bytes.insert(renderbuffer, bytes);
        }
    }

    fn create_framebuffer(&mut self) -> Result<RawFramebuffer, String> {
        let mut state = self.state.lock();
        let framebuffer = RawFramebuffer(state.next_name()?);
        state.calls.push(Call::CreateFramebuffer(framebuffer));
        Ok(framebuffer)
    }
    fn delete_framebuffer(&mut self, framebuffer: RawFramebuffer) {
        self.record(Call::DeleteFramebuffer(framebuffer));
    }
    fn bind_framebuffer(&mut self, target: u32, framebuffer: Option<RawFramebuffer>) {
        self.record(Call::BindFramebuffer {
            target,
            framebuffer,
        });
    }
    fn framebuffer_texture_2d(
        &mut self,
        target: u32,
        attachment: u32,
        texture_target: u32,
        texture: Option<RawTexture>,
        level: i32,
    ) {
        self.record(Call::FramebufferTexture2d {
            target,
            attachment,
            texture_target,
            texture,
            level,
        });
    }
    fn framebuffer_texture_layer(
        &mut self,
        target: u32,
        attachment: u32,
        texture: Option<RawTexture>,
        level: i32,
        layer: i32,
    ) {
        self.record(Call::FramebufferTextureLayer {
            target,
            attachment,
            texture,
            level,
            layer,
        });
    }
    fn framebuffer_renderbuffer(
        &mut self,
        target: u32,
        attachment: u32,
        _renderbuffer_target: u32,
        renderbuffer: Option<RawRenderbuffer>,
    ) {
        self.record(Call::FramebufferRenderbuffer {
            target,
            attachment,
            renderbuffer,
        });
    }
    fn draw_buffers(&mut self, buffers: &[u32]) {
        self.record(Call::DrawBuffers(buffers.to_vec()));
    }
    fn read_buffer(&mut self, src: u32) {
        self.record(Call::ReadBuffer(src));
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
        self.record(Call::BlitFramebuffer {
            src: [src_x0, src_y0, src_x1, src_y1],
            dst: [dst_x0, dst_y0, dst_x1, dst_y1],
            mask,
            filter,
        });
    }
    fn invalidate_framebuffer(&mut self, target: u32, attachments: &[u32]) {
        self.record(Call::InvalidateFramebuffer {
            target,
            attachments: attachments.to_vec(),
        });
    }
    fn clear_buffer_f32_slice(&mut self, target: u32, draw_buffer: u32, values: &[f32]) {
        self.record(Call::ClearBufferF32 {
            target,
            draw_buffer,
            values: values.to_vec(),
        });
    }
    fn clear_buffer_i32_slice(&mut self, target: u32, draw_buffer: u32, values: &[i32]) {
        self.record(Call::ClearBufferI32 {
            target,
            draw_buffer,
            values: values.to_vec(),
        });
    }
    fn clear_buffer_u32_slice(&mut self, target: u32, draw_buffer: u32, values: &[u32]) {
        self.record(Call::ClearBufferU32 {
            target,
            draw_buffer,
            values: values.to_vec(),
        });
    }
    fn clear_buffer_depth_stencil(
        &mut self,
        _target: u32,
        _draw_buffer: u32,
        depth: f32,
        stencil: i32,
    ) {
        self.record(Call::ClearBufferDepthStencil { depth, stencil });
    }

    fn create_sampler(&mut self) -> Result<RawSampler, String> {
        let mut state = self.state.lock();
        let sampler = RawSampler(state.next_name()?);
        state.calls.push(Call::CreateSampler(sampler));
        Ok(sampler)
    }
    fn delete_sampler(&mut self, sampler: RawSampler) {
        self.record(Call::DeleteSampler(sampler));
    }
    fn bind_sampler(&mut self, unit: u32, sampler: Option<RawSampler>) {
        self.record(Call::BindSampler { unit, sampler });
    }
    fn sampler_parameter_i32(&mut self, sampler: RawSampler, name: u32, value: i32) {
        self.record(Call::SamplerParameterI32 {
            sampler,
            name,
            value,
        });
    }
    fn sampler_parameter_f32(&mut self, sampler: RawSampler, name: u32, value: f32) {
        self.record(Call::SamplerParameterF32 {
            sampler,
            name,
            value,
        });
    }

    fn create_shader(&mut self, shader_type: u32) -> Result<RawShader, String> {
        let mut state = self.state.lock();
        let shader = RawShader(state.next_name()?);
        state.shaders.insert(
            shader,
            ShaderObject {
                shader_type,
                source: String::new(),
                compiled: false,
                log: String::new(),
            },
        );
        state.calls.push(Call::CreateShader {
            shader,
            shader_type,
        });
        Ok(shader)
    }
    fn delete_shader(&mut self, shader: RawShader) {
        let mut state = self.state.lock();
        state.shaders.remove(&shader);
        state.calls.push(Call::DeleteShader(shader));
    }
    fn shader_source(&mut self, shader: RawShader, source: &str) {
        if let Some(object) = self.state.lock().shaders.get_mut(&shader) {
            object.source = source.to_string();
        }
    }
    fn compile_shader(&mut self, shader: RawShader) {
        let mut state = self.state.lock();
        state.calls.push(Call::CompileShader(shader));
        if let Some(object) = state.shaders.get_mut(&shader) {
            object.compiled = object.source.contains("main");
            object.log = if object.compiled {
                String::new()
            } else {
                "ERROR: 0:1: 'main' : function not defined".to_string()
            };
        }
    }
    fn get_shader_compile_status(&mut self, shader: RawShader) -> bool {
        self.state
            .lock()
            .shaders
            .get(&shader)
            .map_or(false, |object| object.compiled)
    }
    fn get_shader_info_log(&mut self, shader: RawShader) -> String {
        self.state
            .lock()
            .shaders
            .get(&shader)
            .map(|object| object.log.clone())
            .unwrap_or_default()
    }

    fn create_program(&mut self) -> Result<RawProgram, String> {
        let mut state = self.state.lock();
        let program = RawProgram(state.next_name()?);
        state.programs.insert(program, ProgramObject::default());
        state.calls.push(Call::CreateProgram(program));
        Ok(program)
    }
    fn delete_program(&mut self, program: RawProgram) {
        let mut state = self.state.lock();
        state.programs.remove(&program);
        state.calls.push(Call::DeleteProgram(program));
    }
    fn attach_shader(&mut self, program: RawProgram, shader: RawShader) {
        let mut state = self.state.lock();
        if let Some(object) = state.programs.get_mut(&program) {
            object.shaders.push(shader);
        }
        state.calls.push(Call::AttachShader { program, shader });
    }
    fn detach_shader(&mut self, program: RawProgram, shader: RawShader) {
        if let Some(object) = self.state.lock().programs.get_mut(&program) {
            object.shaders.retain(|&s| s != shader);
        }
    }
    fn link_program(&mut self, program: RawProgram) {
        let mut state = self.state.lock();
        state.calls.push(Call::LinkProgram(program));
        let shaders = match state.programs.get(&program) {
            Some(object) => object.shaders.clone(),
            None => return state.error(glow::INVALID_VALUE),
        };

        let mut stages = Vec::new();
        let mut uniforms = Vec::<ActiveUniform>::new();
        let mut blocks = Vec::<String>::new();
        let mut log = String::new();
        for shader in shaders {
            match state.shaders.get(&shader) {
                Some(object) if object.compiled => {
                    stages.push(object.shader_type);
                    let (stage_uniforms, stage_blocks) = scan_uniforms(&object.source);
                    for uniform in stage_uniforms {
                        if !uniforms.iter().any(|u| u.name == uniform.name) {
                            uniforms.push(uniform);
                        }
                    }
                    for block in stage_blocks {
                        if !blocks.contains(&block) {
                            blocks.push(block);
                        }
                    }
                }
                _ => log = "Attached shader is not compiled".to_string(),
            }
        }
        for (stage, name) in [
            (glow::VERTEX_SHADER, "vertex"),
            (glow::FRAGMENT_SHADER, "fragment"),
        ] {
            if log.is_empty() && !stages.contains(&stage) {
                log = format!("Missing {} shader", name);
            }
        }

        if let Some(object) = state.programs.get_mut(&program) {
            object.linked = log.is_empty();
            object.log = log;
            object.uniforms = uniforms;
            object.blocks = blocks;
        }
    }
    fn get_program_link_status(&mut self, program: RawProgram) -> bool {
        self.state
            .lock()
            .programs
            .get(&program)
            .map_or(false, |object| object.linked)
    }
    fn get_program_info_log(&mut self, program: RawProgram) -> String {
        self.state
            .lock()
            .programs
            .get(&program)
            .map(|object| object.log.clone())
            .unwrap_or_default()
    }
    fn use_program(&mut self, program: Option<RawProgram>) {
        self.record(Call::UseProgram(program));
    }
    fn active_uniforms(&mut self, program: RawProgram) -> Vec<ActiveUniform> {
        self.state
            .lock()
            .programs
            .get(&program)
            .map(|object| object.uniforms.clone())
            .unwrap_or_default()
    }
    fn active_uniform_blocks(&mut self, program: RawProgram) -> Vec<String> {
        self.state
            .lock()
            .programs
            .get(&program)
            .map(|object| object.blocks.clone())
            .unwrap_or_default()
    }
    fn uniform_block_binding(&mut self, program: RawProgram, index: u32, binding: u32) {
        self.record(Call::UniformBlockBinding {
            program,
            index,
            binding,
        });
    }
    fn uniform_1_i32(&mut self, program: RawProgram, name: &str, value: i32) {
        self.record(Call::Uniform1I32 {
            program,
            name: name.to_string(),
            value,
        });
    }

    fn create_vertex_array(&mut self) -> Result<RawVertexArray, String> {
        let mut state = self.state.lock();
        let vertex_array = RawVertexArray(state.next_name()?);
        state.calls.push(Call::CreateVertexArray(vertex_array));
        Ok(vertex_array)
    }
    fn delete_vertex_array(&mut self, vertex_array: RawVertexArray) {
        self.record(Call::DeleteVertexArray(vertex_array));
    }
    fn bind_vertex_array(&mut self, vertex_array: Option<RawVertexArray>) {
        self.record(Call::BindVertexArray(vertex_array));
    }
    fn enable_vertex_attrib_array(&mut self, index: u32) {
        self.record(Call::EnableVertexAttribArray(index));
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
        self.record(Call::VertexAttribPointer {
            index,
            size,
            data_type,
            normalized,
            integer: false,
            stride,
            offset,
        });
    }
    fn vertex_attrib_pointer_i32(
        &mut self,
        index: u32,
        size: i32,
        data_type: u32,
        stride: i32,
        offset: i32,
    ) {
        self.record(Call::VertexAttribPointer {
            index,
            size,
            data_type,
            normalized: false,
            integer: true,
            stride,
            offset,
        });
    }
    fn vertex_attrib_divisor(&mut self, index: u32, divisor: u32) {
        self.record(Call::VertexAttribDivisor { index, divisor });
    }

    fn enable(&mut self, capability: u32) {
        self.record(Call::Enable(capability));
    }
    fn disable(&mut self, capability: u32) {
        self.record(Call::Disable(capability));
    }
    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.record(Call::Viewport([x, y, width, height]));
    }
    fn depth_range_f32(&mut self, near: f32, far: f32) {
        self.record(Call::DepthRange(near, far));
    }
    fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.record(Call::Scissor([x, y, width, height]));
    }
    fn color_mask(&mut self, red: bool, green: bool, blue: bool, alpha: bool) {
        self.record(Call::ColorMask([red, green, blue, alpha]));
    }
    fn depth_mask(&mut self, value: bool) {
        self.record(Call::DepthMask(value));
    }
    fn depth_func(&mut self, func: u32) {
        self.record(Call::DepthFunc(func));
    }
    fn stencil_func_separate(&mut self, face: u32, func: u32, reference: i32, mask: u32) {
        self.record(Call::StencilFuncSeparate {
            face,
            func,
            reference,
            mask,
        });
    }
    fn stencil_op_separate(&mut self, face: u32, fail: u32, depth_fail: u32, pass: u32) {
        self.record(Call::StencilOpSeparate {
            face,
            fail,
            depth_fail,
            pass,
        });
    }
    fn stencil_mask_separate(&mut self, face: u32, mask: u32) {
        self.record(Call::StencilMaskSeparate { face, mask });
    }
    fn front_face(&mut self, value: u32) {
        self.record(Call::FrontFace(value));
    }
    fn cull_face(&mut self, value: u32) {
        self.record(Call::CullFace(value));
    }
    fn polygon_offset(&mut self, factor: f32, units: f32) {
        self.record(Call::PolygonOffset(factor, units));
    }
    fn blend_color(&mut self, red: f32, green: f32, blue: f32, alpha: f32) {
        self.record(Call::BlendColor([red, green, blue, alpha]));
    }
    fn blend_equation_separate(&mut self, mode_rgb: u32, mode_alpha: u32) {
        self.record(Call::BlendEquationSeparate(mode_rgb, mode_alpha));
    }
    fn blend_func_separate(&mut self, src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32) {
        self.record(Call::BlendFuncSeparate([
            src_rgb, dst_rgb, src_alpha, dst_alpha,
        ]));
    }

    fn draw_arrays(&mut self, mode: u32, first: i32, count: i32) {
        self.draw_arrays_instanced(mode, first, count, 1);
    }
    fn draw_arrays_instanced(&mut self, mode: u32, first: i32, count: i32, instance_count: i32) {
        self.record(Call::DrawArrays {
            mode,
            first,
            count,
            instance_count,
        });
    }
    fn draw_elements(&mut self, mode: u32, count: i32, element_type: u32, offset: i32) {
        self.draw_elements_instanced(mode, count, element_type, offset, 1);
    }
    fn draw_elements_instanced(
        &mut self,
        mode: u32,
        count: i32,
        element_type: u32,
        offset: i32,
        instance_count: i32,
    ) {
        self.record(Call::DrawElements {
            mode,
            count,
            element_type,
            offset,
            instance_count,
        });
    }
}

fn texel_bytes(width: i32, height: i32, layers: i32) -> u64 {
    width.max(0) as u64 * height.max(0) as u64 * layers.max(0) as u64 * 4
}

fn uniform_type(name: &str) -> u32 {
    match name {
        "float" => glow::FLOAT,
        "vec2" => glow::FLOAT_VEC2,
        "vec3" => glow::FLOAT_VEC3,
        "vec4" => glow::FLOAT_VEC4,
        "int" => glow::INT,
        "ivec2" => glow::INT_VEC2,
        "ivec3" => glow::INT_VEC3,
        "ivec4" => glow::INT_VEC4,
        "uint" => glow::UNSIGNED_INT,
        "uvec2" => glow::UNSIGNED_INT_VEC2,
        "uvec3" => glow::UNSIGNED_INT_VEC3,
        "uvec4" => glow::UNSIGNED_INT_VEC4,
        "bool" => glow::BOOL,
        "mat2" => glow::FLOAT_MAT2,
        "mat3" => glow::FLOAT_MAT3,
        "mat4" => glow::FLOAT_MAT4,
        "sampler2D" => glow::SAMPLER_2D,
        "sampler3D" => glow::SAMPLER_3D,
        "samplerCube" => glow::SAMPLER_CUBE,
        "sampler2DArray" => glow::SAMPLER_2D_ARRAY,
        "sampler2DShadow" => glow::SAMPLER_2D_SHADOW,
        "samplerCubeShadow" => glow::SAMPLER_CUBE_SHADOW,
        "sampler2DArrayShadow" => glow::SAMPLER_2D_ARRAY_SHADOW,
        "isampler2D" => glow::INT_SAMPLER_2D,
        "isampler3D" => glow::INT_SAMPLER_3D,
        "isamplerCube" => glow::INT_SAMPLER_CUBE,
        "isampler2DArray" => glow::INT_SAMPLER_2D_ARRAY,
        "usampler2D" => glow::UNSIGNED_INT_SAMPLER_2D,
        "usampler3D" => glow::UNSIGNED_INT_SAMPLER_3D,
        "usamplerCube" => glow::UNSIGNED_INT_SAMPLER_CUBE,
        "usampler2DArray" => glow::UNSIGNED_INT_SAMPLER_2D_ARRAY,
        _ => 0,
    }
}

fn tokenize(source: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    for line in source.lines() {
        let line = line.split("//").next().unwrap_or("");
        if line.trim_start().starts_with('#') {
            continue;
        }
        let mut start = None;
        for (i, c) in line.char_indices() {
            let ident = c.is_ascii_alphanumeric() || c == '_';
            match (ident, start) {
                (true, None) => start = Some(i),
                (true, Some(_)) => {}
                (false, Some(s)) => {
                    tokens.push(&line[s..i]);
                    start = None;
                }
                (false, None) => {}
            }
            if !ident && !c.is_whitespace() {
                tokens.push(&line[i..i + c.len_utf8()]);
            }
        }
        if let Some(s) = start {
            tokens.push(&line[s..]);
        }
    }
    tokens
}

/// Finds the default-block uniforms and the uniform block names declared in
/// a GLSL source. Block comments are not supported.
fn scan_uniforms(source: &str) -> (Vec<ActiveUniform>, Vec<String>) {
    const QUALIFIERS: &[&str] = &["lowp", "mediump", "highp"];
    let tokens = tokenize(source);
    let mut uniforms = Vec::new();
    let mut blocks = Vec::new();

    let mut i = 0;
    while i < tokens.len() {
        if tokens[i] != "uniform" {
            i += 1;
            continue;
        }
        i += 1;
        while i < tokens.len() && QUALIFIERS.contains(&tokens[i]) {
            i += 1;
        }
        let ty = match tokens.get(i) {
            Some(&ty) => ty,
            None => break,
        };
        i += 1;
        if tokens.get(i) == Some(&"{") {
            blocks.push(ty.to_string());
            let mut depth = 0;
            while i < tokens.len() {
                match tokens[i] {
                    "{" => depth += 1,
                    "}" => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    _ => {}
                }
                i += 1;
            }
            continue;
        }
        while let Some(&name) = tokens.get(i) {
            let mut size = 1;
            i += 1;
            if tokens.get(i) == Some(&"[") {
                size = tokens
                    .get(i + 1)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1);
                i += 3;
            }
            uniforms.push(ActiveUniform {
                name: name.to_string(),
                utype: uniform_type(ty),
                size,
            });
            if tokens.get(i) == Some(&",") {
                i += 1;
            } else {
                break;
            }
        }
    }

    (uniforms, blocks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_blocks_and_samplers() {
        let source = "#version 300 es
            precision highp float;
            layout(std140) uniform _group0_binding0_Globals {
                mat4 mvp; // not a default-block uniform
                vec4 tint;
            } globals;
            uniform highp sampler2D _group1_binding0_diffuse;
            uniform vec4 loose[2], other;
            void main() {}
        ";
        let (uniforms, blocks) = scan_uniforms(source);
        assert_eq!(blocks, ["_group0_binding0_Globals"]);
        let names: Vec<_> = uniforms.iter().map(|u| (u.name.as_str(), u.utype, u.size)).collect();
        assert_eq!(
            names,
            [
                ("_group1_binding0_diffuse", glow::SAMPLER_2D, 1),
                ("loose", glow::FLOAT_VEC4, 2),
                ("other", glow::FLOAT_VEC4, 1),
            ]
        );
    }

    #[test]
    fn buffer_storage_round_trips() {
        let mut context = HeadlessContext::new();
        let control = context.control();
        let buffer = context.create_buffer().unwrap();
        context.bind_buffer(glow::ARRAY_BUFFER, Some(buffer));
        context.buffer_data_size(glow::ARRAY_BUFFER, 8, glow::STATIC_DRAW);
        context.buffer_sub_data(glow::ARRAY_BUFFER, 4, &[1, 2, 3, 4]);
        let mut out = [0u8; 2];
        context.get_buffer_sub_data(glow::ARRAY_BUFFER, 5, &mut out);
        assert_eq!(out, [2, 3]);
        assert_eq!(
            control.buffer_contents(buffer).unwrap(),
            [0, 0, 0, 0, 1, 2, 3, 4]
        );
        assert_eq!(context.get_error(), glow::NO_ERROR);
    }

    #[test]
    fn memory_budget() {
        let mut context = HeadlessContext::new();
        context.control().set_memory_budget(Some(16));
        let buffer = context.create_buffer().unwrap();
        context.bind_buffer(glow::ARRAY_BUFFER, Some(buffer));
        context.buffer_data_size(glow::ARRAY_BUFFER, 32, glow::STATIC_DRAW);
        assert_eq!(context.get_error(), glow::OUT_OF_MEMORY);
        context.buffer_data_size(glow::ARRAY_BUFFER, 16, glow::STATIC_DRAW);
        assert_eq!(context.get_error(), glow::NO_ERROR);
    }

    #[test]
    fn link_requires_both_stages() {
        let mut context = HeadlessContext::new();
        let vs = context.create_shader(glow::VERTEX_SHADER).unwrap();
        context.shader_source(vs, "void main() {}");
        context.compile_shader(vs);
        let program = context.create_program().unwrap();
        context.attach_shader(program, vs);
        context.link_program(program);
        assert!(!context.get_program_link_status(program));
        assert_eq!(context.get_program_info_log(program), "Missing fragment shader");
    }
}
