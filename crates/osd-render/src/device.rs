//! Device model consumed by the renderer.
//!
//! The traits mirror a Direct3D 9 style device: an [`Adapter`] answers capability
//! and format queries and creates a [`Device`], which in turn owns a swap chain and
//! exposes immediate-mode state setters and draw calls. Resources created by the
//! device are RAII owners; dropping them releases the GPU allocation.

use crate::error::DeviceError;
use crate::geometry::Vertex;

pub type DeviceResult<T> = Result<T, DeviceError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    A8R8G8B8,
    X8R8G8B8,
    /// Packed 4:2:2, byte order Y0 U Y1 V.
    Yuy2,
    /// Packed 4:2:2, byte order U Y0 V Y1.
    Uyvy,
    X1R5G5B5,
    R5G6B5,
}

impl TextureFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            TextureFormat::A8R8G8B8 | TextureFormat::X8R8G8B8 => 4,
            TextureFormat::Yuy2
            | TextureFormat::Uyvy
            | TextureFormat::X1R5G5B5
            | TextureFormat::R5G6B5 => 2,
        }
    }

    pub fn is_yuv(self) -> bool {
        matches!(self, TextureFormat::Yuy2 | TextureFormat::Uyvy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureUsage {
    /// CPU-writable texture, rewritten wholesale on every upload.
    Dynamic,
    RenderTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

pub trait DeviceTexture {
    fn id(&self) -> TextureId;
    fn desc(&self) -> TextureDesc;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    TriangleList,
    TriangleStrip,
}

impl PrimitiveTopology {
    /// Number of triangles produced by `vertex_count` vertices.
    pub fn triangle_count(self, vertex_count: u32) -> u32 {
        match self {
            PrimitiveTopology::TriangleList => vertex_count / 3,
            PrimitiveTopology::TriangleStrip => vertex_count.saturating_sub(2),
        }
    }
}

impl std::fmt::Display for PrimitiveTopology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrimitiveTopology::TriangleList => write!(f, "TRIANGLELIST"),
            PrimitiveTopology::TriangleStrip => write!(f, "TRIANGLESTRIP"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Point,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Clamp,
    Wrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerState {
    MinFilter(Filter),
    MagFilter(Filter),
    AddressU(AddressMode),
    AddressV(AddressMode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureOp {
    Modulate,
    SelectTexture,
    SelectDiffuse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureStageState {
    ColorOp(TextureOp),
    AlphaOp(TextureOp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOp {
    Add,
    Subtract,
    RevSubtract,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    InvSrcColor,
    SrcAlpha,
    InvSrcAlpha,
    DestAlpha,
    InvDestAlpha,
    DestColor,
    InvDestColor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Clockwise,
    CounterClockwise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderState {
    ZEnable(bool),
    ZWriteEnable(bool),
    ZFunc(CompareFunc),
    CullMode(CullMode),
    AlphaTestEnable(bool),
    AlphaRef(u8),
    AlphaFunc(CompareFunc),
    AlphaBlendEnable(bool),
    BlendOp(BlendOp),
    SrcBlend(BlendFactor),
    DestBlend(BlendFactor),
    DitherEnable(bool),
    FogEnable(bool),
    SpecularEnable(bool),
    StencilEnable(bool),
    Clipping(bool),
    Lighting(bool),
    ColorVertex(bool),
    LastPixel(bool),
}

/// Layout of the position in [`Vertex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    /// Screen-space x/y with z and reciprocal w.
    PreTransformed,
    /// Homogeneous clip-space x/y/z/w, used when a post-processing chain owns the transform.
    Homogeneous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresentInterval {
    Immediate,
    One,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WindowHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentParams {
    pub back_buffer_width: u32,
    pub back_buffer_height: u32,
    pub back_buffer_format: TextureFormat,
    pub back_buffer_count: u32,
    pub windowed: bool,
    /// Zero when windowed.
    pub refresh_rate: u32,
    pub interval: PresentInterval,
    pub device_window: WindowHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayMode {
    pub width: u32,
    pub height: u32,
    pub refresh_rate: u32,
    pub format: TextureFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterIdentifier {
    pub description: String,
    pub vendor_id: u32,
    pub device_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PresentationIntervals {
    pub immediate: bool,
    pub one: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextureCaps {
    pub pow2: bool,
    pub nonpow2_conditional: bool,
    pub square_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCaps {
    pub presentation_intervals: PresentationIntervals,
    pub can_render_after_flip: bool,
    pub hw_rasterization: bool,
    pub modulate: bool,
    pub texture_caps: TextureCaps,
    pub fullscreen_gamma: bool,
    pub max_pixel_shader30_instruction_slots: u32,
    pub max_texture_width: u32,
    pub max_texture_height: u32,
    pub max_texture_aspect_ratio: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooperativeLevel {
    Ok,
    /// Lost and not yet resettable.
    Lost,
    /// Lost and ready to be reset.
    NotReset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RasterStatus {
    pub in_vblank: bool,
    pub scanline: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PresentStats {
    pub present_count: u32,
    pub present_refresh_count: u32,
    pub sync_refresh_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Pending,
    Done,
}

/// 256-entry 16-bit ramps per channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GammaRamp {
    pub red: [u16; 256],
    pub green: [u16; 256],
    pub blue: [u16; 256],
}

/// Current output surface for draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTargetId {
    BackBuffer,
    Texture(TextureId),
}

pub trait Adapter {
    type Device: Device;

    fn identifier(&self) -> DeviceResult<AdapterIdentifier>;
    fn caps(&self) -> DeviceResult<DeviceCaps>;
    fn display_mode(&self) -> DeviceResult<DisplayMode>;
    /// Whether `format` can be created with `usage` while the display uses `display_format`.
    fn supports_format(
        &self,
        display_format: TextureFormat,
        usage: TextureUsage,
        format: TextureFormat,
    ) -> bool;
    fn supports_device_type(&self, display_format: TextureFormat, windowed: bool) -> bool;
    fn create_device(
        &mut self,
        params: &PresentParams,
        fullscreen_mode: Option<&DisplayMode>,
    ) -> DeviceResult<Self::Device>;
}

pub trait Device {
    type Texture: DeviceTexture;
    type VertexBuffer;
    type Query;

    fn test_cooperative_level(&mut self) -> CooperativeLevel;
    fn reset(&mut self, params: &PresentParams) -> DeviceResult<()>;
    fn reset_ex(
        &mut self,
        params: &PresentParams,
        fullscreen_mode: Option<&DisplayMode>,
    ) -> DeviceResult<()>;
    fn set_maximum_frame_latency(&mut self, frames: u32) -> DeviceResult<()>;

    fn create_texture(&mut self, desc: &TextureDesc) -> DeviceResult<Self::Texture>;
    /// Replaces the whole texture contents. `data` holds `desc.height` rows of `pitch` bytes.
    fn write_texture(&mut self, texture: &Self::Texture, data: &[u8], pitch: u32) -> DeviceResult<()>;

    fn create_vertex_buffer(
        &mut self,
        capacity: u32,
        format: VertexFormat,
    ) -> DeviceResult<Self::VertexBuffer>;
    /// Acquires the buffer for a discarding write.
    fn lock_vertex_buffer(&mut self, buffer: &Self::VertexBuffer) -> DeviceResult<()>;
    /// Releases the write lock, committing `vertices` to the start of the buffer.
    fn unlock_vertex_buffer(
        &mut self,
        buffer: &Self::VertexBuffer,
        vertices: &[Vertex],
    ) -> DeviceResult<()>;
    fn set_stream_source(&mut self, buffer: &Self::VertexBuffer) -> DeviceResult<()>;
    fn set_vertex_format(&mut self, format: VertexFormat) -> DeviceResult<()>;

    fn set_render_state(&mut self, state: RenderState) -> DeviceResult<()>;
    fn set_sampler_state(&mut self, stage: u32, state: SamplerState) -> DeviceResult<()>;
    fn set_texture_stage_state(&mut self, stage: u32, state: TextureStageState) -> DeviceResult<()>;
    fn set_texture(&mut self, stage: u32, texture: Option<&Self::Texture>) -> DeviceResult<()>;

    fn render_target(&self) -> RenderTargetId;
    /// `None` binds the swap chain's back buffer.
    fn set_render_target(&mut self, texture: Option<&Self::Texture>) -> DeviceResult<()>;
    /// Rebinds a target previously reported by [`Device::render_target`].
    ///
    /// Fails with `InvalidCall` when the texture has since been released.
    fn restore_render_target(&mut self, target: RenderTargetId) -> DeviceResult<()>;

    fn clear(&mut self, argb: u32) -> DeviceResult<()>;
    fn begin_scene(&mut self) -> DeviceResult<()>;
    fn end_scene(&mut self) -> DeviceResult<()>;
    fn draw_primitive(
        &mut self,
        topology: PrimitiveTopology,
        start_vertex: u32,
        primitive_count: u32,
    ) -> DeviceResult<()>;
    fn present(&mut self) -> DeviceResult<()>;

    fn raster_status(&mut self) -> DeviceResult<RasterStatus>;
    /// `None` when the swap chain cannot report presentation statistics.
    fn present_stats(&mut self) -> Option<PresentStats>;
    fn set_gamma_ramp(&mut self, ramp: &GammaRamp) -> DeviceResult<()>;

    fn create_query(&mut self) -> DeviceResult<Self::Query>;
    fn issue_query_end(&mut self, query: &Self::Query) -> DeviceResult<()>;
    fn query_status(&mut self, query: &Self::Query) -> DeviceResult<QueryStatus>;
}
