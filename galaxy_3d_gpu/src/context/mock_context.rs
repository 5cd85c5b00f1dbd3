/// Mock context for unit tests (no driver required)
///
/// Records the name of every call, hands out increasing object names and
/// answers queries with fixed values. Behaviour tests that need real
/// semantics run against the headless backend crate instead.

use std::cell::{Cell, RefCell};

use crate::context::{
    ContextAttributes, Surface, ActiveUniform, ActiveUniformBlock, ContextTier, GlContext, NativeBuffer, NativeFence,
    NativeFramebuffer, NativeProgram, NativeRenderbuffer, NativeSampler, NativeShader,
    NativeTexture, NativeUniformLocation, NativeVertexArray, UniformData,
};
use crate::context::gl;
use rustc_hash::FxHashMap;
use std::num::NonZeroU32;
use std::rc::Rc;

pub struct MockContext {
    tier: ContextTier,
    extensions: Vec<String>,
    calls: RefCell<Vec<&'static str>>,
    next_id: Cell<u32>,
    uniforms: RefCell<Vec<ActiveUniform>>,
    blocks: RefCell<Vec<ActiveUniformBlock>>,
    compile_error: RefCell<Option<String>>,
    link_error: RefCell<Option<String>>,
    /// Last payload per uniform location, as raw 32-bit words
    uploads: RefCell<FxHashMap<u32, Vec<u32>>>,
    lost: Cell<bool>,
    pending_error: Cell<u32>,
    fence_status: Cell<u32>,
}

impl MockContext {
    pub fn new(tier: ContextTier) -> Self {
        Self {
            tier,
            extensions: Vec::new(),
            calls: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
            uniforms: RefCell::new(Vec::new()),
            blocks: RefCell::new(Vec::new()),
            compile_error: RefCell::new(None),
            link_error: RefCell::new(None),
            uploads: RefCell::new(FxHashMap::default()),
            lost: Cell::new(false),
            pending_error: Cell::new(gl::NO_ERROR),
            fence_status: Cell::new(gl::CONDITION_SATISFIED),
        }
    }

    /// Reflection answered by every program
    pub fn with_uniforms(self, uniforms: Vec<ActiveUniform>, blocks: Vec<ActiveUniformBlock>) -> Self {
        *self.uniforms.borrow_mut() = uniforms;
        *self.blocks.borrow_mut() = blocks;
        self
    }

    /// Report the context as lost (or back) to the next poll
    pub fn set_context_lost(&self, lost: bool) {
        self.lost.set(lost);
    }

    /// Error code returned by the next `get_error`
    pub fn raise_error(&self, code: u32) {
        self.pending_error.set(code);
    }

    /// What `client_wait_sync` answers from now on
    pub fn set_fence_status(&self, status: u32) {
        self.fence_status.set(status);
    }

    pub fn fail_compile(&self, log: &str) {
        *self.compile_error.borrow_mut() = Some(log.to_string());
    }

    pub fn fail_link(&self, log: &str) {
        *self.link_error.borrow_mut() = Some(log.to_string());
    }

    /// Location the mock hands out for `name` (`base[i]` addresses element i)
    pub fn location_of(&self, name: &str) -> Option<u32> {
        let (base, element) = match name.strip_suffix(']').and_then(|n| n.rsplit_once('[')) {
            Some((base, index)) => (base, index.parse::<u32>().ok()?),
            None => (name, 0),
        };
        let uniforms = self.uniforms.borrow();
        let index = uniforms
            .iter()
            .position(|u| u.name == base || u.name.strip_suffix("[0]") == Some(base))?;
        if element >= uniforms[index].size.max(1) {
            return None;
        }
        Some((index as u32 + 1) * 100 + element)
    }

    /// Words last uploaded to the uniform `name`
    pub fn uploaded(&self, name: &str) -> Option<Vec<u32>> {
        let location = self.location_of(name)?;
        self.uploads.borrow().get(&location).cloned()
    }

    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions = extensions.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls.borrow().iter().filter(|c| **c == name).count()
    }

    pub fn reset(&self) {
        self.calls.borrow_mut().clear();
    }

    fn record(&self, name: &'static str) {
        self.calls.borrow_mut().push(name);
    }

    fn next(&self) -> NonZeroU32 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        NonZeroU32::new(id).unwrap_or(NonZeroU32::MIN)
    }
}

impl GlContext for MockContext {
    fn tier(&self) -> ContextTier {
        self.tier
    }
    fn supported_extensions(&self) -> Vec<String> {
        self.extensions.clone()
    }
    fn get_parameter_i32(&self, pname: u32) -> i32 {
        match pname {
            gl::MAX_TEXTURE_SIZE
            | gl::MAX_CUBE_MAP_TEXTURE_SIZE
            | gl::MAX_RENDERBUFFER_SIZE
            | gl::MAX_3D_TEXTURE_SIZE => 4096,
            gl::MAX_ARRAY_TEXTURE_LAYERS => 256,
            gl::UNIFORM_BUFFER_OFFSET_ALIGNMENT => 256,
            gl::MAX_UNIFORM_BLOCK_SIZE => 16384,
            gl::MAX_SAMPLES => 4,
            _ => 16,
        }
    }
    fn get_parameter_f32(&self, _pname: u32) -> f32 {
        1.0
    }
    fn get_error(&self) -> u32 {
        self.pending_error.replace(gl::NO_ERROR)
    }
    fn is_context_lost(&self) -> bool {
        self.lost.get()
    }
    fn drawing_buffer_size(&self) -> (u32, u32) {
        (300, 150)
    }
    fn flush(&self) {
        self.record("flush");
    }

    fn create_buffer(&self) -> Option<NativeBuffer> {
        self.record("create_buffer");
        Some(NativeBuffer(self.next()))
    }
    fn delete_buffer(&self, _buffer: NativeBuffer) {
        self.record("delete_buffer");
    }
    fn bind_buffer(&self, _target: u32, _buffer: Option<NativeBuffer>) {
        self.record("bind_buffer");
    }
    fn bind_buffer_range(&self, _t: u32, _i: u32, _b: Option<NativeBuffer>, _o: u32, _s: u32) {
        self.record("bind_buffer_range");
    }
    fn buffer_data_size(&self, _target: u32, _size: u32, _usage: u32) {
        self.record("buffer_data_size");
    }
    fn buffer_sub_data(&self, _target: u32, _offset: u32, _data: &[u8]) {
        self.record("buffer_sub_data");
    }
    fn get_buffer_sub_data(&self, _target: u32, _offset: u32, _dst: &mut [u8]) {
        self.record("get_buffer_sub_data");
    }

    fn create_texture(&self) -> Option<NativeTexture> {
        self.record("create_texture");
        Some(NativeTexture(self.next()))
    }
    fn delete_texture(&self, _texture: NativeTexture) {
        self.record("delete_texture");
    }
    fn active_texture(&self, _unit: u32) {
        self.record("active_texture");
    }
    fn bind_texture(&self, _target: u32, _texture: Option<NativeTexture>) {
        self.record("bind_texture");
    }
    fn tex_parameter_i32(&self, _target: u32, _pname: u32, _value: i32) {
        self.record("tex_parameter_i32");
    }
    fn tex_parameter_f32(&self, _target: u32, _pname: u32, _value: f32) {
        self.record("tex_parameter_f32");
    }
    fn pixel_store_i32(&self, _pname: u32, _value: i32) {
        self.record("pixel_store_i32");
    }
    fn tex_storage_2d(&self, _t: u32, _l: u32, _f: u32, _w: u32, _h: u32) {
        self.record("tex_storage_2d");
    }
    fn tex_storage_3d(&self, _t: u32, _l: u32, _f: u32, _w: u32, _h: u32, _d: u32) {
        self.record("tex_storage_3d");
    }
    fn tex_image_2d(
        &self,
        _t: u32,
        _l: u32,
        _i: u32,
        _w: u32,
        _h: u32,
        _f: u32,
        _ty: u32,
        _p: Option<&[u8]>,
    ) {
        self.record("tex_image_2d");
    }
    fn tex_image_3d(
        &self,
        _t: u32,
        _l: u32,
        _i: u32,
        _w: u32,
        _h: u32,
        _d: u32,
        _f: u32,
        _ty: u32,
        _p: Option<&[u8]>,
    ) {
        self.record("tex_image_3d");
    }
    fn tex_sub_image_2d(
        &self,
        _t: u32,
        _l: u32,
        _x: u32,
        _y: u32,
        _w: u32,
        _h: u32,
        _f: u32,
        _ty: u32,
        _p: &[u8],
    ) {
        self.record("tex_sub_image_2d");
    }
    fn tex_sub_image_3d(
        &self,
        _t: u32,
        _l: u32,
        _x: u32,
        _y: u32,
        _z: u32,
        _w: u32,
        _h: u32,
        _d: u32,
        _f: u32,
        _ty: u32,
        _p: &[u8],
    ) {
        self.record("tex_sub_image_3d");
    }
    fn compressed_tex_image_2d(&self, _t: u32, _l: u32, _i: u32, _w: u32, _h: u32, _d: &[u8]) {
        self.record("compressed_tex_image_2d");
    }
    fn compressed_tex_image_3d(
        &self,
        _t: u32,
        _l: u32,
        _i: u32,
        _w: u32,
        _h: u32,
        _dp: u32,
        _d: &[u8],
    ) {
        self.record("compressed_tex_image_3d");
    }
    fn compressed_tex_sub_image_2d(
        &self,
        _t: u32,
        _l: u32,
        _x: u32,
        _y: u32,
        _w: u32,
        _h: u32,
        _f: u32,
        _d: &[u8],
    ) {
        self.record("compressed_tex_sub_image_2d");
    }
    fn compressed_tex_sub_image_3d(
        &self,
        _t: u32,
        _l: u32,
        _x: u32,
        _y: u32,
        _z: u32,
        _w: u32,
        _h: u32,
        _d: u32,
        _f: u32,
        _data: &[u8],
    ) {
        self.record("compressed_tex_sub_image_3d");
    }
    fn copy_tex_sub_image_2d(
        &self,
        _t: u32,
        _l: u32,
        _xo: u32,
        _yo: u32,
        _x: u32,
        _y: u32,
        _w: u32,
        _h: u32,
    ) {
        self.record("copy_tex_sub_image_2d");
    }
    fn generate_mipmap(&self, _target: u32) {
        self.record("generate_mipmap");
    }

    fn create_sampler(&self) -> Option<NativeSampler> {
        self.record("create_sampler");
        Some(NativeSampler(self.next()))
    }
    fn delete_sampler(&self, _sampler: NativeSampler) {
        self.record("delete_sampler");
    }
    fn bind_sampler(&self, _unit: u32, _sampler: Option<NativeSampler>) {
        self.record("bind_sampler");
    }
    fn sampler_parameter_i32(&self, _s: NativeSampler, _p: u32, _v: i32) {
        self.record("sampler_parameter_i32");
    }
    fn sampler_parameter_f32(&self, _s: NativeSampler, _p: u32, _v: f32) {
        self.record("sampler_parameter_f32");
    }

    fn create_framebuffer(&self) -> Option<NativeFramebuffer> {
        self.record("create_framebuffer");
        Some(NativeFramebuffer(self.next()))
    }
    fn delete_framebuffer(&self, _framebuffer: NativeFramebuffer) {
        self.record("delete_framebuffer");
    }
    fn bind_framebuffer(&self, _target: u32, _framebuffer: Option<NativeFramebuffer>) {
        self.record("bind_framebuffer");
    }
    fn framebuffer_texture_2d(&self, _t: u32, _a: u32, _tt: u32, _tx: Option<NativeTexture>, _l: u32) {
        self.record("framebuffer_texture_2d");
    }
    fn framebuffer_texture_layer(&self, _t: u32, _a: u32, _tx: Option<NativeTexture>, _l: u32, _ly: u32) {
        self.record("framebuffer_texture_layer");
    }
    fn framebuffer_renderbuffer(&self, _t: u32, _a: u32, _rt: u32, _rb: Option<NativeRenderbuffer>) {
        self.record("framebuffer_renderbuffer");
    }
    fn check_framebuffer_status(&self, _target: u32) -> u32 {
        self.record("check_framebuffer_status");
        gl::FRAMEBUFFER_COMPLETE
    }
    fn draw_buffers(&self, _buffers: &[u32]) {
        self.record("draw_buffers");
    }
    fn read_buffer(&self, _source: u32) {
        self.record("read_buffer");
    }
    fn blit_framebuffer(
        &self,
        _a: i32,
        _b: i32,
        _c: i32,
        _d: i32,
        _e: i32,
        _f: i32,
        _g: i32,
        _h: i32,
        _mask: u32,
        _filter: u32,
    ) {
        self.record("blit_framebuffer");
    }
    fn create_renderbuffer(&self) -> Option<NativeRenderbuffer> {
        self.record("create_renderbuffer");
        Some(NativeRenderbuffer(self.next()))
    }
    fn delete_renderbuffer(&self, _renderbuffer: NativeRenderbuffer) {
        self.record("delete_renderbuffer");
    }
    fn bind_renderbuffer(&self, _target: u32, _renderbuffer: Option<NativeRenderbuffer>) {
        self.record("bind_renderbuffer");
    }
    fn renderbuffer_storage(&self, _t: u32, _f: u32, _w: u32, _h: u32) {
        self.record("renderbuffer_storage");
    }
    fn renderbuffer_storage_multisample(&self, _t: u32, _s: u32, _f: u32, _w: u32, _h: u32) {
        self.record("renderbuffer_storage_multisample");
    }

    fn create_shader(&self, _shader_type: u32) -> Option<NativeShader> {
        self.record("create_shader");
        Some(NativeShader(self.next()))
    }
    fn delete_shader(&self, _shader: NativeShader) {
        self.record("delete_shader");
    }
    fn shader_source(&self, _shader: NativeShader, _source: &str) {
        self.record("shader_source");
    }
    fn compile_shader(&self, _shader: NativeShader) {
        self.record("compile_shader");
    }
    fn get_shader_compile_status(&self, _shader: NativeShader) -> bool {
        self.compile_error.borrow().is_none()
    }
    fn get_shader_info_log(&self, _shader: NativeShader) -> String {
        self.compile_error.borrow().clone().unwrap_or_default()
    }
    fn create_program(&self) -> Option<NativeProgram> {
        self.record("create_program");
        Some(NativeProgram(self.next()))
    }
    fn delete_program(&self, _program: NativeProgram) {
        self.record("delete_program");
    }
    fn attach_shader(&self, _program: NativeProgram, _shader: NativeShader) {
        self.record("attach_shader");
    }
    fn detach_shader(&self, _program: NativeProgram, _shader: NativeShader) {
        self.record("detach_shader");
    }
    fn bind_attrib_location(&self, _program: NativeProgram, _index: u32, _name: &str) {
        self.record("bind_attrib_location");
    }
    fn link_program(&self, _program: NativeProgram) {
        self.record("link_program");
    }
    fn get_program_link_status(&self, _program: NativeProgram) -> bool {
        self.link_error.borrow().is_none()
    }
    fn get_program_info_log(&self, _program: NativeProgram) -> String {
        self.link_error.borrow().clone().unwrap_or_default()
    }
    fn use_program(&self, _program: Option<NativeProgram>) {
        self.record("use_program");
    }
    fn get_active_uniforms(&self, _program: NativeProgram) -> Vec<ActiveUniform> {
        self.uniforms.borrow().clone()
    }
    fn get_uniform_location(&self, _program: NativeProgram, name: &str) -> Option<NativeUniformLocation> {
        self.location_of(name).map(NativeUniformLocation)
    }
    fn get_active_uniform_blocks(&self, _program: NativeProgram) -> Vec<ActiveUniformBlock> {
        self.blocks.borrow().clone()
    }
    fn uniform_block_binding(&self, _program: NativeProgram, _block_index: u32, _binding: u32) {
        self.record("uniform_block_binding");
    }
    fn uniform(&self, location: NativeUniformLocation, data: UniformData<'_>) {
        self.record("uniform");
        let words: Vec<u32> = match data {
            UniformData::Float { values, .. } | UniformData::Matrix { values, .. } => {
                values.iter().map(|v| v.to_bits()).collect()
            }
            UniformData::Int { values, .. } => values.iter().map(|v| *v as u32).collect(),
            UniformData::UInt { values, .. } => values.to_vec(),
        };
        self.uploads.borrow_mut().insert(location.0, words);
    }

    fn create_vertex_array(&self) -> Option<NativeVertexArray> {
        self.record("create_vertex_array");
        Some(NativeVertexArray(self.next()))
    }
    fn delete_vertex_array(&self, _vertex_array: NativeVertexArray) {
        self.record("delete_vertex_array");
    }
    fn bind_vertex_array(&self, _vertex_array: Option<NativeVertexArray>) {
        self.record("bind_vertex_array");
    }
    fn enable_vertex_attrib_array(&self, _index: u32) {
        self.record("enable_vertex_attrib_array");
    }
    fn disable_vertex_attrib_array(&self, _index: u32) {
        self.record("disable_vertex_attrib_array");
    }
    fn vertex_attrib_pointer_f32(&self, _i: u32, _s: u32, _t: u32, _n: bool, _st: u32, _o: u32) {
        self.record("vertex_attrib_pointer_f32");
    }
    fn vertex_attrib_pointer_i32(&self, _i: u32, _s: u32, _t: u32, _st: u32, _o: u32) {
        self.record("vertex_attrib_pointer_i32");
    }
    fn vertex_attrib_divisor(&self, _index: u32, _divisor: u32) {
        self.record("vertex_attrib_divisor");
    }

    fn enable(&self, _capability: u32) {
        self.record("enable");
    }
    fn disable(&self, _capability: u32) {
        self.record("disable");
    }
    fn blend_func_separate(&self, _a: u32, _b: u32, _c: u32, _d: u32) {
        self.record("blend_func_separate");
    }
    fn blend_equation_separate(&self, _a: u32, _b: u32) {
        self.record("blend_equation_separate");
    }
    fn blend_color(&self, _r: f32, _g: f32, _b: f32, _a: f32) {
        self.record("blend_color");
    }
    fn color_mask(&self, _r: bool, _g: bool, _b: bool, _a: bool) {
        self.record("color_mask");
    }
    fn depth_mask(&self, _enabled: bool) {
        self.record("depth_mask");
    }
    fn depth_func(&self, _func: u32) {
        self.record("depth_func");
    }
    fn polygon_offset(&self, _factor: f32, _units: f32) {
        self.record("polygon_offset");
    }
    fn cull_face(&self, _mode: u32) {
        self.record("cull_face");
    }
    fn front_face(&self, _mode: u32) {
        self.record("front_face");
    }
    fn stencil_func_separate(&self, _f: u32, _func: u32, _r: i32, _m: u32) {
        self.record("stencil_func_separate");
    }
    fn stencil_op_separate(&self, _f: u32, _a: u32, _b: u32, _c: u32) {
        self.record("stencil_op_separate");
    }
    fn stencil_mask_separate(&self, _face: u32, _mask: u32) {
        self.record("stencil_mask_separate");
    }
    fn viewport(&self, _x: i32, _y: i32, _w: i32, _h: i32) {
        self.record("viewport");
    }
    fn scissor(&self, _x: i32, _y: i32, _w: i32, _h: i32) {
        self.record("scissor");
    }
    fn clear_color(&self, _r: f32, _g: f32, _b: f32, _a: f32) {
        self.record("clear_color");
    }
    fn clear_depth(&self, _depth: f32) {
        self.record("clear_depth");
    }
    fn clear_stencil(&self, _stencil: i32) {
        self.record("clear_stencil");
    }
    fn clear(&self, _mask: u32) {
        self.record("clear");
    }

    fn draw_arrays(&self, _mode: u32, _first: u32, _count: u32) {
        self.record("draw_arrays");
    }
    fn draw_arrays_instanced(&self, _mode: u32, _first: u32, _count: u32, _instances: u32) {
        self.record("draw_arrays_instanced");
    }
    fn draw_elements(&self, _mode: u32, _count: u32, _index_type: u32, _offset: u32) {
        self.record("draw_elements");
    }
    fn draw_elements_instanced(&self, _m: u32, _c: u32, _t: u32, _o: u32, _i: u32) {
        self.record("draw_elements_instanced");
    }

    fn read_pixels(&self, _x: i32, _y: i32, _w: u32, _h: u32, _f: u32, _t: u32, _dst: &mut [u8]) {
        self.record("read_pixels");
    }
    fn read_pixels_to_pack_buffer(&self, _x: i32, _y: i32, _w: u32, _h: u32, _f: u32, _t: u32, _o: u32) {
        self.record("read_pixels_to_pack_buffer");
    }

    fn fence_sync(&self, _condition: u32, _flags: u32) -> Option<NativeFence> {
        self.record("fence_sync");
        Some(NativeFence(self.next()))
    }
    fn client_wait_sync(&self, _fence: NativeFence, _flags: u32, _timeout_ns: u64) -> u32 {
        self.record("client_wait_sync");
        self.fence_status.get()
    }
    fn delete_sync(&self, _fence: NativeFence) {
        self.record("delete_sync");
    }
}

/// Surface handing out one shared `MockContext`
pub struct MockSurface {
    pub context: Rc<MockContext>,
    pub client_size: Cell<(u32, u32)>,
    pub device_pixel_ratio: f32,
}

impl MockSurface {
    pub fn new(context: MockContext) -> Self {
        Self {
            context: Rc::new(context),
            client_size: Cell::new((300, 150)),
            device_pixel_ratio: 1.0,
        }
    }
}

impl Surface for MockSurface {
    fn create_context(
        &self,
        tier: ContextTier,
        _attributes: &ContextAttributes,
    ) -> Option<Rc<dyn GlContext>> {
        if tier != self.context.tier {
            return None;
        }
        let context: Rc<dyn GlContext> = self.context.clone();
        Some(context)
    }

    fn client_size(&self) -> (u32, u32) {
        self.client_size.get()
    }

    fn device_pixel_ratio(&self) -> f32 {
        self.device_pixel_ratio
    }

    fn set_drawing_buffer_size(&self, _width: u32, _height: u32) {}
}

/// Device state over a fresh mock context, for resource unit tests
pub(crate) fn mock_shared(
    tier: ContextTier,
    extensions: &[&str],
) -> (Rc<MockContext>, Rc<crate::device::shared::DeviceShared>) {
    mock_shared_with_msaa(tier, extensions, false)
}

/// Same as `mock_shared` with multisampling allowed
pub(crate) fn mock_shared_with_msaa(
    tier: ContextTier,
    extensions: &[&str],
    msaa: bool,
) -> (Rc<MockContext>, Rc<crate::device::shared::DeviceShared>) {
    mock_shared_over(MockContext::new(tier).with_extensions(extensions), msaa)
}

/// Device state over a prepared mock context
pub(crate) fn mock_shared_over(
    context: MockContext,
    msaa: bool,
) -> (Rc<MockContext>, Rc<crate::device::shared::DeviceShared>) {
    let context = Rc::new(context);
    let caps = crate::caps::DeviceCaps::query(context.as_ref());
    let gl: Rc<dyn GlContext> = context.clone();
    let shared = crate::device::shared::DeviceShared::new(
        gl,
        caps,
        std::time::Duration::from_millis(0),
        msaa,
    );
    (context, Rc::new(shared))
}
