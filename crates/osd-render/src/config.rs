use crate::device::AddressMode;
use crate::error::RenderError;

/// Largest frame delay the presentation scheduler accepts (tenths of a frame).
pub const MAX_FRAME_DELAY: u32 = 9;

/// Default vertex buffer capacity, in vertices.
pub const DEFAULT_VERTEX_BUFFER_CAPACITY: u32 = 40960 * 4 + 4;

/// Renderer options. Parsing these from the command line or an ini file is
/// the front-end's job; the renderer only reads the resolved values.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    /// Bilinear filtering for screen textures.
    pub filter: bool,
    /// Address mode programmed into the sampler when resources are created.
    pub wrap_default: AddressMode,
    /// Busy-wait on the raster position around present.
    pub sync_refresh: bool,
    /// Present with a one-refresh interval (ignored when `sync_refresh` is on).
    pub wait_vsync: bool,
    pub frame_delay: u32,
    /// Scanlines subtracted from the last visible line to get the break line.
    pub vsync_offset: i32,
    pub switch_res: bool,
    pub target_width: u32,
    pub target_height: u32,
    pub target_refresh: u32,
    pub full_screen_brightness: f32,
    pub full_screen_contrast: f32,
    pub full_screen_gamma: f32,
    pub vertex_buffer_capacity: u32,
    /// Upper bound on raster-status polls per vblank wait.
    pub max_vsync_polls: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            filter: true,
            wrap_default: AddressMode::Clamp,
            sync_refresh: false,
            wait_vsync: false,
            frame_delay: 0,
            vsync_offset: 0,
            switch_res: false,
            target_width: 0,
            target_height: 0,
            target_refresh: 0,
            full_screen_brightness: 1.0,
            full_screen_contrast: 1.0,
            full_screen_gamma: 1.0,
            vertex_buffer_capacity: DEFAULT_VERTEX_BUFFER_CAPACITY,
            max_vsync_polls: 1 << 20,
        }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> Result<(), RenderError> {
        if self.frame_delay > MAX_FRAME_DELAY {
            return Err(RenderError::InvalidConfig("frame_delay must be between 0 and 9"));
        }
        // The batcher needs room for at least one vector line (6 vertices)
        // plus the post-processing quad.
        if self.vertex_buffer_capacity < 12 {
            return Err(RenderError::InvalidConfig(
                "vertex_buffer_capacity must hold at least 12 vertices",
            ));
        }
        if self.max_vsync_polls == 0 {
            return Err(RenderError::InvalidConfig("max_vsync_polls must be non-zero"));
        }
        if self.full_screen_gamma <= 0.0 {
            return Err(RenderError::InvalidConfig("full_screen_gamma must be positive"));
        }
        Ok(())
    }
}
