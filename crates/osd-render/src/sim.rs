//! Deterministic in-memory device used by tests and headless tooling.
//!
//! [`SimulatedDevice`] records every state-changing call, keeps the committed
//! vertex data and texture contents around for inspection, and lets callers
//! script failures (device loss, allocation errors) and the raster clock.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use crate::batch::PolygonDescriptor;
use crate::device::{
    Adapter, AdapterIdentifier, CooperativeLevel, Device, DeviceCaps, DeviceResult,
    DeviceTexture, DisplayMode, GammaRamp, PresentInterval, PresentParams, PresentStats,
    PresentationIntervals, PrimitiveTopology, QueryStatus, RasterStatus, RenderState,
    RenderTargetId, SamplerState, TextureCaps, TextureDesc, TextureFormat, TextureId,
    TextureStageState, TextureUsage, VertexFormat, WindowHandle,
};
use crate::error::{DeviceError, RenderError};
use crate::geometry::Vertex;
use crate::postfx::PostProcessor;
use crate::primitive::Primitive;
use crate::texture::TextureObject;

pub const VENDOR_AMD: u32 = 0x1002;
pub const VENDOR_INTEL: u32 = 0x8086;
pub const VENDOR_NVIDIA: u32 = 0x10de;

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    Reset,
    ResetEx,
    SetMaximumFrameLatency(u32),
    CreateTexture(TextureId, TextureDesc),
    WriteTexture(TextureId),
    CreateVertexBuffer(u32, VertexFormat),
    LockVertexBuffer,
    UnlockVertexBuffer(usize),
    SetStreamSource,
    SetVertexFormat(VertexFormat),
    SetRenderState(RenderState),
    SetSamplerState(u32, SamplerState),
    SetTextureStageState(u32, TextureStageState),
    SetTexture(u32, Option<TextureId>),
    SetRenderTarget(RenderTargetId),
    Clear(u32),
    BeginScene,
    EndScene,
    DrawPrimitive {
        topology: PrimitiveTopology,
        start_vertex: u32,
        primitive_count: u32,
    },
    Present,
    SetGammaRamp,
    CreateQuery,
    IssueQuery,
}

/// One executed draw with the state it ran under.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub topology: PrimitiveTopology,
    pub vertices: Vec<Vertex>,
    pub texture: Option<TextureId>,
    pub render_target: RenderTargetId,
    pub blend_enable: bool,
}

#[derive(Debug, Default)]
struct SimShared {
    next_texture_id: u64,
    live_textures: HashMap<TextureId, TextureUsage>,
}

#[derive(Debug)]
struct SimTextureInner {
    id: TextureId,
    desc: TextureDesc,
    shared: Rc<RefCell<SimShared>>,
}

impl Drop for SimTextureInner {
    fn drop(&mut self) {
        self.shared.borrow_mut().live_textures.remove(&self.id);
    }
}

#[derive(Debug, Clone)]
pub struct SimTexture(Rc<SimTextureInner>);

impl DeviceTexture for SimTexture {
    fn id(&self) -> TextureId {
        self.0.id
    }

    fn desc(&self) -> TextureDesc {
        self.0.desc
    }
}

#[derive(Debug)]
pub struct SimVertexBuffer {
    capacity: u32,
    format: VertexFormat,
}

impl SimVertexBuffer {
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn format(&self) -> VertexFormat {
        self.format
    }
}

#[derive(Debug)]
pub struct SimQuery {
    _private: (),
}

/// Raster position model: advances `step` scanlines per poll and wraps at `vtotal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterClock {
    pub vtotal: u32,
    pub vactive: u32,
    pub step: u32,
}

impl Default for RasterClock {
    fn default() -> Self {
        Self {
            vtotal: 806,
            vactive: 768,
            step: 7,
        }
    }
}

#[derive(Debug)]
pub struct SimulatedAdapter {
    identifier: AdapterIdentifier,
    caps: DeviceCaps,
    display_mode: DisplayMode,
    unsupported_formats: HashSet<TextureFormat>,
    create_results: VecDeque<DeviceError>,
    shared: Rc<RefCell<SimShared>>,
    devices_created: u32,
}

impl Default for SimulatedAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedAdapter {
    pub fn new() -> Self {
        Self {
            identifier: AdapterIdentifier {
                description: "Simulated Display Adapter".to_string(),
                vendor_id: VENDOR_NVIDIA,
                device_id: 0x0001,
            },
            caps: Self::default_caps(),
            display_mode: DisplayMode {
                width: 1024,
                height: 768,
                refresh_rate: 60,
                format: TextureFormat::X8R8G8B8,
            },
            unsupported_formats: HashSet::new(),
            create_results: VecDeque::new(),
            shared: Rc::new(RefCell::new(SimShared::default())),
            devices_created: 0,
        }
    }

    pub fn default_caps() -> DeviceCaps {
        DeviceCaps {
            presentation_intervals: PresentationIntervals {
                immediate: true,
                one: true,
            },
            can_render_after_flip: true,
            hw_rasterization: true,
            modulate: true,
            texture_caps: TextureCaps::default(),
            fullscreen_gamma: true,
            max_pixel_shader30_instruction_slots: 32768,
            max_texture_width: 4096,
            max_texture_height: 4096,
            max_texture_aspect_ratio: 4096,
        }
    }

    pub fn with_vendor(mut self, vendor_id: u32) -> Self {
        self.identifier.vendor_id = vendor_id;
        self
    }

    pub fn with_caps(mut self, caps: DeviceCaps) -> Self {
        self.caps = caps;
        self
    }

    pub fn with_display_mode(mut self, mode: DisplayMode) -> Self {
        self.display_mode = mode;
        self
    }

    pub fn without_format(mut self, format: TextureFormat) -> Self {
        self.unsupported_formats.insert(format);
        self
    }

    /// Queues an error for the next `create_device` call.
    pub fn push_create_failure(&mut self, err: DeviceError) {
        self.create_results.push_back(err);
    }

    pub fn devices_created(&self) -> u32 {
        self.devices_created
    }

    /// Number of textures created by any device of this adapter and not yet dropped.
    pub fn live_textures(&self) -> usize {
        self.shared.borrow().live_textures.len()
    }

    /// Device with windowed 640x480 parameters, bypassing the renderer.
    pub fn create_default_device(&mut self) -> SimulatedDevice {
        let params = PresentParams {
            back_buffer_width: 640,
            back_buffer_height: 480,
            back_buffer_format: TextureFormat::X8R8G8B8,
            back_buffer_count: 1,
            windowed: true,
            refresh_rate: 0,
            interval: PresentInterval::Immediate,
            device_window: WindowHandle::default(),
        };
        SimulatedDevice::new(params, self.shared.clone())
    }
}

impl Adapter for SimulatedAdapter {
    type Device = SimulatedDevice;

    fn identifier(&self) -> DeviceResult<AdapterIdentifier> {
        Ok(self.identifier.clone())
    }

    fn caps(&self) -> DeviceResult<DeviceCaps> {
        Ok(self.caps)
    }

    fn display_mode(&self) -> DeviceResult<DisplayMode> {
        Ok(self.display_mode)
    }

    fn supports_format(
        &self,
        _display_format: TextureFormat,
        _usage: TextureUsage,
        format: TextureFormat,
    ) -> bool {
        !self.unsupported_formats.contains(&format)
    }

    fn supports_device_type(&self, display_format: TextureFormat, _windowed: bool) -> bool {
        !self.unsupported_formats.contains(&display_format)
    }

    fn create_device(
        &mut self,
        params: &PresentParams,
        _fullscreen_mode: Option<&DisplayMode>,
    ) -> DeviceResult<SimulatedDevice> {
        if let Some(err) = self.create_results.pop_front() {
            return Err(err);
        }
        self.devices_created += 1;
        Ok(SimulatedDevice::new(*params, self.shared.clone()))
    }
}

#[derive(Debug)]
pub struct SimulatedDevice {
    params: PresentParams,
    shared: Rc<RefCell<SimShared>>,
    calls: Vec<DeviceCall>,
    draws: Vec<DrawRecord>,
    committed: Vec<Vertex>,
    texture_data: HashMap<TextureId, Vec<u8>>,
    bound_texture: Option<TextureId>,
    render_target: RenderTargetId,
    blend_enable: bool,
    vertex_locked: bool,
    in_scene: bool,

    cooperative: VecDeque<CooperativeLevel>,
    reset_results: VecDeque<DeviceError>,
    fail_render_targets: u32,
    fail_dynamic_textures: u32,
    fail_state_calls: u32,
    fail_vertex_locks: u32,

    raster: Option<RasterClock>,
    scanline: u32,
    raster_polls: u64,

    present_stats_supported: bool,
    refresh_count: u32,
    refresh_steps: VecDeque<u32>,

    query_pending_polls: u32,
    query_polls_left: u32,
    gamma_ramp: Option<GammaRamp>,
    max_frame_latency: Option<u32>,
}

impl SimulatedDevice {
    fn new(params: PresentParams, shared: Rc<RefCell<SimShared>>) -> Self {
        Self {
            params,
            shared,
            calls: Vec::new(),
            draws: Vec::new(),
            committed: Vec::new(),
            texture_data: HashMap::new(),
            bound_texture: None,
            render_target: RenderTargetId::BackBuffer,
            blend_enable: false,
            vertex_locked: false,
            in_scene: false,
            cooperative: VecDeque::new(),
            reset_results: VecDeque::new(),
            fail_render_targets: 0,
            fail_dynamic_textures: 0,
            fail_state_calls: 0,
            fail_vertex_locks: 0,
            raster: Some(RasterClock::default()),
            scanline: 0,
            raster_polls: 0,
            present_stats_supported: true,
            refresh_count: 0,
            refresh_steps: VecDeque::new(),
            query_pending_polls: 0,
            query_polls_left: 0,
            gamma_ramp: None,
            max_frame_latency: None,
        }
    }

    pub fn params(&self) -> &PresentParams {
        &self.params
    }

    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<DeviceCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    pub fn take_draws(&mut self) -> Vec<DrawRecord> {
        std::mem::take(&mut self.draws)
    }

    pub fn texture_data(&self, id: TextureId) -> Option<&[u8]> {
        self.texture_data.get(&id).map(Vec::as_slice)
    }

    pub fn gamma_ramp(&self) -> Option<&GammaRamp> {
        self.gamma_ramp.as_ref()
    }

    pub fn max_frame_latency(&self) -> Option<u32> {
        self.max_frame_latency
    }

    pub fn raster_polls(&self) -> u64 {
        self.raster_polls
    }

    pub fn count_calls(&self, pred: impl Fn(&DeviceCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn push_cooperative_level(&mut self, level: CooperativeLevel) {
        self.cooperative.push_back(level);
    }

    pub fn push_reset_failure(&mut self, err: DeviceError) {
        self.reset_results.push_back(err);
    }

    pub fn fail_render_target_creates(&mut self, count: u32) {
        self.fail_render_targets = count;
    }

    pub fn fail_dynamic_texture_creates(&mut self, count: u32) {
        self.fail_dynamic_textures = count;
    }

    pub fn fail_next_state_call(&mut self) {
        self.fail_state_calls += 1;
    }

    pub fn fail_vertex_locks(&mut self, count: u32) {
        self.fail_vertex_locks = count;
    }

    /// `None` makes raster polling report [`DeviceError::NotAvailable`].
    pub fn set_raster_clock(&mut self, clock: Option<RasterClock>) {
        self.raster = clock;
        self.scanline = 0;
    }

    pub fn set_scanline(&mut self, scanline: u32) {
        self.scanline = scanline;
    }

    pub fn set_present_stats_supported(&mut self, supported: bool) {
        self.present_stats_supported = supported;
    }

    /// Refresh-counter increments applied by upcoming presents (default 1).
    pub fn push_refresh_step(&mut self, step: u32) {
        self.refresh_steps.push_back(step);
    }

    pub fn set_query_pending_polls(&mut self, polls: u32) {
        self.query_pending_polls = polls;
    }

    fn state_call(&mut self, call: DeviceCall) -> DeviceResult<()> {
        self.calls.push(call);
        if self.fail_state_calls > 0 {
            self.fail_state_calls -= 1;
            return Err(DeviceError::InvalidCall("scripted failure"));
        }
        Ok(())
    }

    fn alloc_texture_id(&self, usage: TextureUsage) -> TextureId {
        let mut shared = self.shared.borrow_mut();
        shared.next_texture_id += 1;
        let id = TextureId(shared.next_texture_id);
        shared.live_textures.insert(id, usage);
        id
    }
}

impl Device for SimulatedDevice {
    type Texture = SimTexture;
    type VertexBuffer = SimVertexBuffer;
    type Query = SimQuery;

    fn test_cooperative_level(&mut self) -> CooperativeLevel {
        self.cooperative.pop_front().unwrap_or(CooperativeLevel::Ok)
    }

    fn reset(&mut self, params: &PresentParams) -> DeviceResult<()> {
        self.calls.push(DeviceCall::Reset);
        if let Some(err) = self.reset_results.pop_front() {
            return Err(err);
        }
        self.params = *params;
        self.render_target = RenderTargetId::BackBuffer;
        self.bound_texture = None;
        Ok(())
    }

    fn reset_ex(
        &mut self,
        params: &PresentParams,
        _fullscreen_mode: Option<&DisplayMode>,
    ) -> DeviceResult<()> {
        self.calls.push(DeviceCall::ResetEx);
        if let Some(err) = self.reset_results.pop_front() {
            return Err(err);
        }
        self.params = *params;
        Ok(())
    }

    fn set_maximum_frame_latency(&mut self, frames: u32) -> DeviceResult<()> {
        self.calls.push(DeviceCall::SetMaximumFrameLatency(frames));
        self.max_frame_latency = Some(frames);
        Ok(())
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> DeviceResult<SimTexture> {
        let remaining = match desc.usage {
            TextureUsage::RenderTarget => &mut self.fail_render_targets,
            TextureUsage::Dynamic => &mut self.fail_dynamic_textures,
        };
        if *remaining > 0 {
            *remaining -= 1;
            return Err(DeviceError::OutOfVideoMemory);
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(DeviceError::InvalidCall("zero-sized texture"));
        }

        let id = self.alloc_texture_id(desc.usage);
        self.calls.push(DeviceCall::CreateTexture(id, *desc));
        Ok(SimTexture(Rc::new(SimTextureInner {
            id,
            desc: *desc,
            shared: self.shared.clone(),
        })))
    }

    fn write_texture(&mut self, texture: &SimTexture, data: &[u8], pitch: u32) -> DeviceResult<()> {
        let desc = texture.desc();
        if desc.usage != TextureUsage::Dynamic {
            return Err(DeviceError::InvalidCall("texture is not CPU writable"));
        }
        if (data.len() as u64) < pitch as u64 * desc.height as u64 {
            return Err(DeviceError::InvalidCall("upload smaller than texture"));
        }
        self.calls.push(DeviceCall::WriteTexture(texture.id()));
        self.texture_data.insert(texture.id(), data.to_vec());
        Ok(())
    }

    fn create_vertex_buffer(
        &mut self,
        capacity: u32,
        format: VertexFormat,
    ) -> DeviceResult<SimVertexBuffer> {
        self.calls.push(DeviceCall::CreateVertexBuffer(capacity, format));
        Ok(SimVertexBuffer { capacity, format })
    }

    fn lock_vertex_buffer(&mut self, _buffer: &SimVertexBuffer) -> DeviceResult<()> {
        self.calls.push(DeviceCall::LockVertexBuffer);
        if self.fail_vertex_locks > 0 {
            self.fail_vertex_locks -= 1;
            return Err(DeviceError::InvalidCall("scripted lock failure"));
        }
        if self.vertex_locked {
            return Err(DeviceError::InvalidCall("vertex buffer already locked"));
        }
        self.vertex_locked = true;
        Ok(())
    }

    fn unlock_vertex_buffer(
        &mut self,
        buffer: &SimVertexBuffer,
        vertices: &[Vertex],
    ) -> DeviceResult<()> {
        self.calls.push(DeviceCall::UnlockVertexBuffer(vertices.len()));
        if !self.vertex_locked {
            return Err(DeviceError::InvalidCall("vertex buffer not locked"));
        }
        if vertices.len() > buffer.capacity as usize {
            return Err(DeviceError::InvalidCall("vertex data exceeds buffer capacity"));
        }
        self.vertex_locked = false;
        self.committed = vertices.to_vec();
        Ok(())
    }

    fn set_stream_source(&mut self, _buffer: &SimVertexBuffer) -> DeviceResult<()> {
        self.calls.push(DeviceCall::SetStreamSource);
        Ok(())
    }

    fn set_vertex_format(&mut self, format: VertexFormat) -> DeviceResult<()> {
        self.calls.push(DeviceCall::SetVertexFormat(format));
        Ok(())
    }

    fn set_render_state(&mut self, state: RenderState) -> DeviceResult<()> {
        self.state_call(DeviceCall::SetRenderState(state))?;
        if let RenderState::AlphaBlendEnable(enable) = state {
            self.blend_enable = enable;
        }
        Ok(())
    }

    fn set_sampler_state(&mut self, stage: u32, state: SamplerState) -> DeviceResult<()> {
        self.state_call(DeviceCall::SetSamplerState(stage, state))
    }

    fn set_texture_stage_state(&mut self, stage: u32, state: TextureStageState) -> DeviceResult<()> {
        self.state_call(DeviceCall::SetTextureStageState(stage, state))
    }

    fn set_texture(&mut self, stage: u32, texture: Option<&SimTexture>) -> DeviceResult<()> {
        let id = texture.map(DeviceTexture::id);
        self.state_call(DeviceCall::SetTexture(stage, id))?;
        if stage == 0 {
            self.bound_texture = id;
        }
        Ok(())
    }

    fn render_target(&self) -> RenderTargetId {
        self.render_target
    }

    fn set_render_target(&mut self, texture: Option<&SimTexture>) -> DeviceResult<()> {
        let target = match texture {
            Some(texture) => {
                if texture.desc().usage != TextureUsage::RenderTarget {
                    return Err(DeviceError::InvalidCall("texture is not a render target"));
                }
                RenderTargetId::Texture(texture.id())
            }
            None => RenderTargetId::BackBuffer,
        };
        self.calls.push(DeviceCall::SetRenderTarget(target));
        self.render_target = target;
        Ok(())
    }

    fn restore_render_target(&mut self, target: RenderTargetId) -> DeviceResult<()> {
        if let RenderTargetId::Texture(id) = target {
            let usage = self.shared.borrow().live_textures.get(&id).copied();
            match usage {
                Some(TextureUsage::RenderTarget) => {}
                Some(TextureUsage::Dynamic) => {
                    return Err(DeviceError::InvalidCall("texture is not a render target"))
                }
                None => return Err(DeviceError::InvalidCall("render target was released")),
            }
        }
        self.calls.push(DeviceCall::SetRenderTarget(target));
        self.render_target = target;
        Ok(())
    }

    fn clear(&mut self, argb: u32) -> DeviceResult<()> {
        self.calls.push(DeviceCall::Clear(argb));
        Ok(())
    }

    fn begin_scene(&mut self) -> DeviceResult<()> {
        self.calls.push(DeviceCall::BeginScene);
        if self.in_scene {
            return Err(DeviceError::InvalidCall("scene already begun"));
        }
        self.in_scene = true;
        Ok(())
    }

    fn end_scene(&mut self) -> DeviceResult<()> {
        self.calls.push(DeviceCall::EndScene);
        if !self.in_scene {
            return Err(DeviceError::InvalidCall("no scene to end"));
        }
        self.in_scene = false;
        Ok(())
    }

    fn draw_primitive(
        &mut self,
        topology: PrimitiveTopology,
        start_vertex: u32,
        primitive_count: u32,
    ) -> DeviceResult<()> {
        self.calls.push(DeviceCall::DrawPrimitive {
            topology,
            start_vertex,
            primitive_count,
        });
        if self.vertex_locked {
            return Err(DeviceError::InvalidCall("draw while vertex buffer is locked"));
        }
        let count = match topology {
            PrimitiveTopology::TriangleList => primitive_count * 3,
            PrimitiveTopology::TriangleStrip => primitive_count + 2,
        } as usize;
        let start = start_vertex as usize;
        let vertices = self
            .committed
            .get(start..start + count)
            .ok_or(DeviceError::InvalidCall("draw outside committed vertices"))?
            .to_vec();
        self.draws.push(DrawRecord {
            topology,
            vertices,
            texture: self.bound_texture,
            render_target: self.render_target,
            blend_enable: self.blend_enable,
        });
        Ok(())
    }

    fn present(&mut self) -> DeviceResult<()> {
        self.calls.push(DeviceCall::Present);
        let step = self.refresh_steps.pop_front().unwrap_or(1);
        self.refresh_count = self.refresh_count.wrapping_add(step);
        Ok(())
    }

    fn raster_status(&mut self) -> DeviceResult<RasterStatus> {
        self.raster_polls += 1;
        let clock = self.raster.ok_or(DeviceError::NotAvailable)?;
        let status = RasterStatus {
            in_vblank: self.scanline >= clock.vactive,
            scanline: self.scanline,
        };
        self.scanline = (self.scanline + clock.step) % clock.vtotal.max(1);
        Ok(status)
    }

    fn present_stats(&mut self) -> Option<PresentStats> {
        self.present_stats_supported.then_some(PresentStats {
            present_count: self.refresh_count,
            present_refresh_count: self.refresh_count,
            sync_refresh_count: self.refresh_count,
        })
    }

    fn set_gamma_ramp(&mut self, ramp: &GammaRamp) -> DeviceResult<()> {
        self.calls.push(DeviceCall::SetGammaRamp);
        self.gamma_ramp = Some(ramp.clone());
        Ok(())
    }

    fn create_query(&mut self) -> DeviceResult<SimQuery> {
        self.calls.push(DeviceCall::CreateQuery);
        Ok(SimQuery { _private: () })
    }

    fn issue_query_end(&mut self, _query: &SimQuery) -> DeviceResult<()> {
        self.calls.push(DeviceCall::IssueQuery);
        self.query_polls_left = self.query_pending_polls;
        Ok(())
    }

    fn query_status(&mut self, _query: &SimQuery) -> DeviceResult<QueryStatus> {
        if self.query_polls_left > 0 {
            self.query_polls_left -= 1;
            return Ok(QueryStatus::Pending);
        }
        Ok(QueryStatus::Done)
    }
}

/// Post-processing request observed by [`RecordingPostProcessor`].
#[derive(Debug, Clone, PartialEq)]
pub enum PostFxCall {
    CreateResources,
    DeleteResources,
    Toggle,
    CreateTextureTarget { width: u32, height: u32, screen: u32 },
    CreateVectorTarget { screen: u32 },
    BeginDraw,
    EndDraw,
    RenderQuad { start_vertex: u32, vertex_count: u32 },
    /// Final texture of the bound cache entry; `None` for the default texture.
    SetTexture { texture: Option<TextureId> },
}

#[derive(Debug, Default)]
struct PostFxShared {
    enabled: bool,
    calls: Vec<PostFxCall>,
    texture_targets: HashSet<(u32, u32, u32)>,
    vector_targets: HashSet<u32>,
    fail_creates: u32,
}

/// Post-processor that draws nothing and logs what the renderer asked of it.
///
/// Clones share state, so a test can keep one handle while the renderer owns another.
#[derive(Debug, Clone, Default)]
pub struct RecordingPostProcessor {
    shared: Rc<RefCell<PostFxShared>>,
}

impl RecordingPostProcessor {
    pub fn new(enabled: bool) -> Self {
        let this = Self::default();
        this.shared.borrow_mut().enabled = enabled;
        this
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.borrow().enabled
    }

    pub fn calls(&self) -> Vec<PostFxCall> {
        self.shared.borrow().calls.clone()
    }

    pub fn take_calls(&self) -> Vec<PostFxCall> {
        std::mem::take(&mut self.shared.borrow_mut().calls)
    }

    /// Makes the next `count` resource creations fail.
    pub fn fail_resource_creates(&self, count: u32) {
        self.shared.borrow_mut().fail_creates = count;
    }

    fn record(&self, call: PostFxCall) {
        self.shared.borrow_mut().calls.push(call);
    }
}

impl<D: Device> PostProcessor<D> for RecordingPostProcessor {
    fn enabled(&self) -> bool {
        self.is_enabled()
    }

    fn toggle(&mut self) {
        let mut shared = self.shared.borrow_mut();
        shared.enabled = !shared.enabled;
        shared.calls.push(PostFxCall::Toggle);
    }

    fn create_resources(&mut self, _device: &mut D) -> Result<(), RenderError> {
        self.record(PostFxCall::CreateResources);
        let mut shared = self.shared.borrow_mut();
        if shared.fail_creates > 0 {
            shared.fail_creates -= 1;
            return Err(RenderError::PostProcessResources);
        }
        Ok(())
    }

    fn delete_resources(&mut self) {
        let mut shared = self.shared.borrow_mut();
        shared.texture_targets.clear();
        shared.vector_targets.clear();
        shared.calls.push(PostFxCall::DeleteResources);
    }

    fn get_texture_target(&mut self, _prim: &Primitive, width: u32, height: u32, screen: u32) -> bool {
        self.shared
            .borrow()
            .texture_targets
            .contains(&(width, height, screen))
    }

    fn create_texture_target(
        &mut self,
        _device: &mut D,
        _prim: &Primitive,
        width: u32,
        height: u32,
        screen: u32,
    ) -> bool {
        let mut shared = self.shared.borrow_mut();
        shared.texture_targets.insert((width, height, screen));
        shared.calls.push(PostFxCall::CreateTextureTarget {
            width,
            height,
            screen,
        });
        true
    }

    fn get_vector_target(&mut self, _prim: &Primitive, screen: u32) -> bool {
        self.shared.borrow().vector_targets.contains(&screen)
    }

    fn create_vector_target(&mut self, _device: &mut D, _prim: &Primitive, screen: u32) -> bool {
        let mut shared = self.shared.borrow_mut();
        shared.vector_targets.insert(screen);
        shared.calls.push(PostFxCall::CreateVectorTarget { screen });
        true
    }

    fn begin_draw(&mut self, _device: &mut D) {
        self.record(PostFxCall::BeginDraw);
    }

    fn end_draw(&mut self, _device: &mut D) {
        self.record(PostFxCall::EndDraw);
    }

    fn render_quad(&mut self, _device: &mut D, poly: &PolygonDescriptor, start_vertex: u32) {
        self.record(PostFxCall::RenderQuad {
            start_vertex,
            vertex_count: poly.vertex_count,
        });
    }

    fn set_texture(&mut self, texture: Option<&TextureObject<D::Texture>>) {
        self.record(PostFxCall::SetTexture {
            texture: texture.map(|entry| entry.final_texture().id()),
        });
    }
}
