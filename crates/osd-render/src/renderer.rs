use std::sync::Arc;

use crate::config::RenderConfig;
use crate::context::{Capabilities, GpuContext};
use crate::device::{Adapter, Device, DisplayMode, TextureFormat};
use crate::error::{log_failure, RenderError};
use crate::lifecycle::{DeviceState, FrameCheck};
use crate::postfx::{NullPostProcessor, PostProcessor};
use crate::present::{PresentScheduler, VblankTrace};
use crate::primitive::Primitive;
use crate::scanline::{ScanlineThresholds, Vendor};
use crate::stats::{RenderStats, RenderStatsSnapshot};
use crate::vector::VectorOrientation;
use crate::window::RenderWindow;

/// What [`Renderer::draw`] did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// Nothing was drawn; try again next frame.
    Skipped,
    /// The device is unusable; the caller should draw this frame another way.
    Fallback,
}

/// Output mode chosen for the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplaySettings {
    pub width: u32,
    pub height: u32,
    pub refresh: u32,
    pub format: TextureFormat,
    pub vendor: Vendor,
}

impl DisplaySettings {
    pub fn mode(&self) -> DisplayMode {
        DisplayMode {
            width: self.width,
            height: self.height,
            refresh_rate: self.refresh,
            format: self.format,
        }
    }
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            refresh: 0,
            format: TextureFormat::X8R8G8B8,
            vendor: Vendor::Other,
        }
    }
}

/// Frame renderer for one window.
///
/// Owns the adapter, the device context (when a device exists), the
/// post-processing chain and the presentation scheduler. Every method runs
/// on the render thread.
pub struct Renderer<A: Adapter> {
    pub(crate) adapter: A,
    pub(crate) config: RenderConfig,
    pub(crate) caps: Capabilities,
    pub(crate) postfx: Box<dyn PostProcessor<A::Device>>,
    pub(crate) ctx: Option<GpuContext<A::Device>>,
    pub(crate) state: DeviceState,
    pub(crate) create_failures: u32,
    pub(crate) toggle_pending: bool,
    pub(crate) display: DisplaySettings,
    pub(crate) prescale: u32,
    pub(crate) scheduler: PresentScheduler,
    pub(crate) stats: Arc<RenderStats>,
}

impl<A: Adapter> Renderer<A> {
    pub fn new(adapter: A, config: RenderConfig) -> Result<Self, RenderError> {
        config.validate()?;
        let scheduler = PresentScheduler::new(config.max_vsync_polls);
        Ok(Self {
            adapter,
            caps: Capabilities::default(),
            postfx: Box::new(NullPostProcessor),
            ctx: None,
            state: DeviceState::Uninitialized,
            create_failures: 0,
            toggle_pending: false,
            display: DisplaySettings::default(),
            prescale: 1,
            scheduler,
            stats: Arc::new(RenderStats::new()),
            config,
        })
    }

    pub fn with_post_processor(mut self, postfx: Box<dyn PostProcessor<A::Device>>) -> Self {
        self.postfx = postfx;
        self
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    pub fn display(&self) -> DisplaySettings {
        self.display
    }

    pub fn lifecycle_state(&self) -> DeviceState {
        self.state
    }

    /// Consecutive creation attempts that reported a lost device.
    pub fn create_failures(&self) -> u32 {
        self.create_failures
    }

    pub fn context(&self) -> Option<&GpuContext<A::Device>> {
        self.ctx.as_ref()
    }

    pub fn context_mut(&mut self) -> Option<&mut GpuContext<A::Device>> {
        self.ctx.as_mut()
    }

    pub fn device(&self) -> Option<&A::Device> {
        self.ctx.as_ref().map(GpuContext::device)
    }

    pub fn device_mut(&mut self) -> Option<&mut A::Device> {
        self.ctx.as_mut().map(GpuContext::device_mut)
    }

    pub fn texture_count(&self) -> usize {
        self.ctx.as_ref().map_or(0, |ctx| ctx.textures().len())
    }

    pub fn scanlines(&self) -> ScanlineThresholds {
        self.scheduler.thresholds()
    }

    pub fn vblank_trace(&self) -> VblankTrace {
        self.scheduler.trace()
    }

    pub fn stats(&self) -> RenderStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn stats_handle(&self) -> Arc<RenderStats> {
        self.stats.clone()
    }

    pub fn post_processing_enabled(&self) -> bool {
        self.caps.post_fx_available && self.postfx.enabled()
    }

    /// Takes effect at the next frame check, after the scheduler has picked it up.
    pub fn set_frame_delay(&mut self, frame_delay: u32) -> Result<(), RenderError> {
        let config = RenderConfig {
            frame_delay,
            ..self.config.clone()
        };
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn set_vsync_offset(&mut self, vsync_offset: i32) {
        self.config.vsync_offset = vsync_offset;
    }

    /// Runs the frame check and, when the device is usable, draws and presents
    /// the window's current primitive list.
    pub fn draw<W: RenderWindow>(&mut self, window: &mut W) -> FrameOutcome {
        match self.per_frame_check(window) {
            FrameCheck::SkipFrame => {
                self.stats.inc_frames_skipped();
                return FrameOutcome::Skipped;
            }
            FrameCheck::Fallback => {
                self.stats.inc_frames_fallback();
                return FrameOutcome::Fallback;
            }
            FrameCheck::Continue => {}
        }

        let orientation = VectorOrientation {
            native: window.native_orientation(),
            target: window.target_orientation(),
        };
        self.prescale = window.prescale().max(1);
        {
            let prims = window.primitives().acquire();
            self.begin_frame(&prims);
            self.process_primitives(&prims, orientation);
        }
        self.end_frame();
        FrameOutcome::Presented
    }

    /// Clears the back buffer, refreshes textures for `prims` and opens the scene.
    pub fn begin_frame(&mut self, prims: &[Primitive]) {
        let enabled = self.post_processing_enabled();
        let Some(ctx) = self.ctx.as_mut() else {
            return;
        };

        log_failure(ctx.device.clear(0), "Clear");
        let refresh = ctx.update_textures(prims, self.prescale, &mut *self.postfx, enabled);
        self.caps.apply(refresh);

        log_failure(ctx.device.begin_scene(), "BeginScene");
        if self.caps.post_fx_available && self.postfx.enabled() {
            ctx.init_fsfx_quad(&mut *self.postfx);
        }
    }

    /// Queues polygons for `prims`, flushing whenever the vertex buffer fills.
    pub fn process_primitives(&mut self, prims: &[Primitive], orientation: VectorOrientation) {
        let enabled = self.post_processing_enabled();
        if let Some(ctx) = self.ctx.as_mut() {
            ctx.process_primitives(prims, orientation, &mut *self.postfx, enabled);
        }
    }

    /// Draws what is left in the batch, closes the scene and presents.
    pub fn end_frame(&mut self) {
        let enabled = self.post_processing_enabled();
        let Some(ctx) = self.ctx.as_mut() else {
            return;
        };

        ctx.flush(&mut *self.postfx, enabled);
        log_failure(ctx.device.end_scene(), "EndScene");

        self.scheduler
            .update_settings(self.config.frame_delay, self.config.vsync_offset);
        self.scheduler
            .present(&mut ctx.device, self.config.sync_refresh, &self.stats);
    }
}
