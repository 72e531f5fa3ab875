//! Device creation, loss recovery and teardown.
//!
//! The renderer checks the device once at the start of every frame. A device
//! that reports itself lost makes the frame fall back; one that can be reset
//! gets its resources rebuilt in place. Creation failures reported as "device
//! lost" are retried on later frames up to [`MAX_CREATE_RETRIES`] times.

use crate::config::RenderConfig;
use crate::context::{GpuContext, ResourceSettings, SurfaceFormats};
use crate::device::{
    Adapter, CooperativeLevel, Device, DeviceCaps, DisplayMode, PresentInterval, PresentParams,
    QueryStatus, TextureFormat, TextureUsage, WindowHandle,
};
use crate::error::{log_failure, DeviceError, ErrorClass, MissingCap, RenderError};
use crate::gamma::{build_gamma_ramp, identity_gamma_ramp};
use crate::renderer::Renderer;
use crate::scanline::{ScanlineMode, Vendor};
use crate::texture::TextureLimits;
use crate::window::{RenderWindow, ResizeState};

/// Consecutive "device lost" creation results tolerated before giving up.
pub const MAX_CREATE_RETRIES: u32 = 10;

/// Pixel shader 3.0 instruction slots required by the post-processing chain.
pub const MIN_POST_FX_INSTRUCTION_SLOTS: u32 = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Uninitialized,
    Ready,
    /// Lost and not yet resettable; frames fall back until it recovers.
    Lost,
    ResetPending,
    /// Torn down after a fatal error. Stays here for the rest of the session.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameCheck {
    Continue,
    SkipFrame,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// The adapter reported a lost device; creation is retried on a later frame.
    RetryLater,
}

/// Result of capability negotiation for one adapter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapsReport {
    pub caps: DeviceCaps,
    pub post_fx_available: bool,
    pub gamma_supported: bool,
}

/// Checks the hard requirements and collects every one that is missing.
/// Optional features only switch off post-processing or gamma.
pub fn verify_caps<A: Adapter>(
    adapter: &A,
    display_format: TextureFormat,
) -> Result<CapsReport, RenderError> {
    let caps = adapter.caps().map_err(RenderError::Caps)?;

    let mut missing = Vec::new();
    if !caps.presentation_intervals.immediate {
        missing.push(MissingCap::ImmediatePresentation);
    }
    if !caps.presentation_intervals.one {
        missing.push(MissingCap::PerRefreshPresentation);
    }
    if !caps.can_render_after_flip {
        missing.push(MissingCap::RenderAfterFlip);
    }
    if !caps.hw_rasterization {
        missing.push(MissingCap::HardwareRasterization);
    }
    if !caps.modulate {
        missing.push(MissingCap::ModulateBlending);
    }
    if caps.texture_caps.nonpow2_conditional {
        missing.push(MissingCap::NonPow2Conditional);
    }
    if caps.texture_caps.pow2 {
        missing.push(MissingCap::Pow2Only);
    }
    if caps.texture_caps.square_only {
        missing.push(MissingCap::SquareOnly);
    }
    if !adapter.supports_format(display_format, TextureUsage::Dynamic, TextureFormat::A8R8G8B8) {
        missing.push(MissingCap::Argb32Textures);
    }
    if !missing.is_empty() {
        return Err(RenderError::UnsupportedCaps(missing));
    }

    let post_fx_available = caps.max_pixel_shader30_instruction_slots >= MIN_POST_FX_INSTRUCTION_SLOTS;
    if !post_fx_available {
        tracing::warn!(
            slots = caps.max_pixel_shader30_instruction_slots,
            "too few pixel shader instruction slots, post-processing disabled"
        );
    }
    if !caps.fullscreen_gamma {
        tracing::debug!("device does not support full screen gamma ramps");
    }

    Ok(CapsReport {
        caps,
        post_fx_available,
        gamma_supported: caps.fullscreen_gamma,
    })
}

/// Format for RGB screen textures: X8R8G8B8, or A8R8G8B8 when that is all the device offers.
pub fn pick_screen_format<A: Adapter>(
    adapter: &A,
    display_format: TextureFormat,
) -> Result<TextureFormat, RenderError> {
    [TextureFormat::X8R8G8B8, TextureFormat::A8R8G8B8]
        .into_iter()
        .find(|&format| adapter.supports_format(display_format, TextureUsage::Dynamic, format))
        .ok_or(RenderError::NoScreenFormat)
}

/// Format for packed YUV sources: UYVY, then YUY2, then converted to A8R8G8B8.
pub fn pick_yuv_format<A: Adapter>(adapter: &A, display_format: TextureFormat) -> TextureFormat {
    [TextureFormat::Uyvy, TextureFormat::Yuy2]
        .into_iter()
        .find(|&format| adapter.supports_format(display_format, TextureUsage::Dynamic, format))
        .unwrap_or(TextureFormat::A8R8G8B8)
}

/// Swap chain parameters for a single back buffer at `mode`.
pub fn present_params(
    mode: &DisplayMode,
    config: &RenderConfig,
    windowed: bool,
    window: WindowHandle,
) -> PresentParams {
    PresentParams {
        back_buffer_width: mode.width,
        back_buffer_height: mode.height,
        back_buffer_format: mode.format,
        back_buffer_count: 1,
        windowed,
        refresh_rate: if windowed { 0 } else { mode.refresh_rate },
        interval: if config.wait_vsync && !config.sync_refresh {
            PresentInterval::One
        } else {
            PresentInterval::Immediate
        },
        device_window: window,
    }
}

fn is_windowed<W: RenderWindow>(window: &W) -> bool {
    !window.is_fullscreen() || window.has_menu()
}

impl<A: Adapter> Renderer<A> {
    /// Resolves the display mode and, for full screen windows, creates the
    /// device right away. Windowed devices are created by the first frame check.
    pub fn initialize<W: RenderWindow>(&mut self, window: &mut W) -> Result<(), RenderError> {
        if let Err(err) = self.config_adapter_mode(window) {
            tracing::error!(error = %err, "unable to configure the adapter");
            self.state = DeviceState::Failed;
            return Err(err);
        }
        self.prescale = window.prescale().max(1);

        if window.is_fullscreen() {
            if let CreateOutcome::RetryLater = self.device_create(window)? {
                tracing::debug!("device creation deferred to a later frame");
            }
        }
        Ok(())
    }

    /// Picks the vendor, the output size and the display format.
    pub fn config_adapter_mode<W: RenderWindow>(&mut self, window: &W) -> Result<(), RenderError> {
        let identifier = self
            .adapter
            .identifier()
            .map_err(RenderError::AdapterIdentifier)?;
        self.display.vendor = Vendor::from_id(identifier.vendor_id);
        tracing::debug!(
            adapter = %identifier.description,
            vendor_id = identifier.vendor_id,
            "configuring adapter"
        );

        let desktop = self.adapter.display_mode().map_err(RenderError::DisplayMode)?;

        if !window.is_fullscreen() || !self.config.switch_res || window.has_menu() {
            let (width, height) = window.client_size();
            self.display.width = width;
            self.display.height = height;
            self.display.refresh = desktop.refresh_rate;
            self.display.format = desktop.format;

            if !matches!(
                desktop.format,
                TextureFormat::X1R5G5B5 | TextureFormat::R5G6B5 | TextureFormat::X8R8G8B8
            ) {
                return Err(RenderError::UnsupportedDisplayFormat(desktop.format));
            }
        } else {
            let (width, height, refresh) = match window.modeline() {
                Some(mode) => (mode.width, mode.height, mode.refresh),
                None => (
                    pick_target(self.config.target_width, desktop.width),
                    pick_target(self.config.target_height, desktop.height),
                    pick_target(self.config.target_refresh, desktop.refresh_rate),
                ),
            };
            self.display.width = width;
            self.display.height = height;
            self.display.refresh = refresh;
            self.display.format = desktop.format;
        }

        if !self
            .adapter
            .supports_device_type(self.display.format, is_windowed(window))
        {
            return Err(RenderError::UnsupportedMode {
                width: self.display.width,
                height: self.display.height,
                format: self.display.format,
            });
        }

        tracing::debug!(
            width = self.display.width,
            height = self.display.height,
            refresh = self.display.refresh,
            format = ?self.display.format,
            "display mode"
        );
        Ok(())
    }

    fn present_params_for<W: RenderWindow>(&self, window: &W) -> PresentParams {
        present_params(
            &self.display.mode(),
            &self.config,
            is_windowed(window),
            window.handle(),
        )
    }

    fn scanline_mode<W: RenderWindow>(window: &W) -> ScanlineMode {
        window
            .modeline()
            .as_ref()
            .map_or(ScanlineMode::UNKNOWN, ScanlineMode::from)
    }

    /// Creates the device and everything that lives with it. Any existing
    /// device is torn down first.
    pub fn device_create<W: RenderWindow>(
        &mut self,
        window: &W,
    ) -> Result<CreateOutcome, RenderError> {
        self.device_delete();

        let report = match verify_caps(&self.adapter, self.display.format) {
            Ok(report) => report,
            Err(err) => {
                tracing::error!(error = %err, "device capabilities are insufficient");
                self.state = DeviceState::Failed;
                return Err(err);
            }
        };
        self.caps.post_fx_available &= report.post_fx_available;
        self.caps.gamma_supported = report.gamma_supported;

        let formats = match pick_screen_format(&self.adapter, self.display.format) {
            Ok(screen) => SurfaceFormats {
                screen,
                yuv: pick_yuv_format(&self.adapter, self.display.format),
            },
            Err(err) => {
                tracing::error!(error = %err, "no usable screen texture format");
                self.state = DeviceState::Failed;
                return Err(err);
            }
        };

        let params = self.present_params_for(window);
        let fullscreen_mode = (!params.windowed).then(|| self.display.mode());
        let mut device = match self.adapter.create_device(&params, fullscreen_mode.as_ref()) {
            Ok(device) => device,
            Err(DeviceError::DeviceLost) => {
                self.create_failures += 1;
                self.stats.inc_create_retries();
                if self.create_failures < MAX_CREATE_RETRIES {
                    tracing::debug!(attempt = self.create_failures, "device lost during creation");
                    return Ok(CreateOutcome::RetryLater);
                }
                let attempts = self.create_failures;
                tracing::error!(attempts, "unable to create the device");
                self.state = DeviceState::Failed;
                return Err(RenderError::CreateRetriesExhausted { attempts });
            }
            Err(err) => {
                tracing::error!(error = %err, "unable to create the device");
                self.state = DeviceState::Failed;
                return Err(RenderError::DeviceCreation(err));
            }
        };
        self.create_failures = 0;
        self.stats.inc_device_creates();

        log_failure(device.set_maximum_frame_latency(1), "SetMaximumFrameLatency");

        self.scheduler.configure(
            self.display.vendor,
            Self::scanline_mode(window),
            params.back_buffer_height,
        );
        self.scheduler
            .update_settings(self.config.frame_delay, self.config.vsync_offset);

        if self.caps.gamma_supported && !params.windowed {
            if let Some(ramp) = build_gamma_ramp(
                self.config.full_screen_brightness,
                self.config.full_screen_contrast,
                self.config.full_screen_gamma,
            ) {
                log_failure(device.set_gamma_ramp(&ramp), "SetGammaRamp");
            }
        }

        let limits = TextureLimits {
            max_width: report.caps.max_texture_width,
            max_height: report.caps.max_texture_height,
            max_aspect: report.caps.max_texture_aspect_ratio,
        };
        self.ctx = Some(GpuContext::new(
            device,
            params,
            formats,
            limits,
            self.config.filter,
            self.stats.clone(),
        ));

        if let Err(err) = self.create_resources() {
            tracing::error!(error = %err, "failed to create resources for the device");
            self.device_delete();
            self.state = DeviceState::Failed;
            return Err(err);
        }

        self.state = DeviceState::Ready;
        tracing::info!(
            width = params.back_buffer_width,
            height = params.back_buffer_height,
            windowed = params.windowed,
            post_fx = self.post_processing_enabled(),
            "device created"
        );
        Ok(CreateOutcome::Created)
    }

    /// Builds the per-device resource set. A post-processing chain that cannot
    /// create its resources is switched off and the set is built without it.
    pub(crate) fn create_resources(&mut self) -> Result<(), RenderError> {
        let mut settings = ResourceSettings {
            postfx_enabled: self.post_processing_enabled(),
            wrap_default: self.config.wrap_default,
            vertex_capacity: self.config.vertex_buffer_capacity,
            prescale: self.prescale,
        };
        let ctx = self.ctx.as_mut().ok_or(RenderError::NoDevice)?;

        let refresh = match ctx.create_resources(&mut *self.postfx, &settings) {
            Err(err) if settings.postfx_enabled && err.class() == ErrorClass::Degraded => {
                tracing::warn!(error = %err, "post-processing disabled for the rest of the session");
                self.caps.post_fx_available = false;
                ctx.delete_resources(&mut *self.postfx);
                settings.postfx_enabled = false;
                ctx.create_resources(&mut *self.postfx, &settings)?
            }
            result => result?,
        };
        self.caps.apply(refresh);
        Ok(())
    }

    /// Decides whether this frame can be drawn. Handles pending resizes,
    /// post-processing toggles and device loss along the way.
    pub fn per_frame_check<W: RenderWindow>(&mut self, window: &mut W) -> FrameCheck {
        if self.state == DeviceState::Failed {
            return FrameCheck::Fallback;
        }
        if window.resize_state() == ResizeState::Resizing {
            return FrameCheck::SkipFrame;
        }

        if self.toggle_pending {
            self.toggle_pending = false;
            if let Err(err) = self.toggle_post_processing() {
                tracing::error!(error = %err, "failed to recreate resources after toggling post-processing");
                self.device_delete();
                self.state = DeviceState::Failed;
                return FrameCheck::Fallback;
            }
        }

        if self.ctx.is_some() && !self.test_cooperative() {
            return FrameCheck::Fallback;
        }

        if !window.is_fullscreen() || self.ctx.is_none() {
            if self.update_window_size(window) {
                return FrameCheck::SkipFrame;
            }
            if self.ctx.is_none() {
                return FrameCheck::Fallback;
            }
        }
        FrameCheck::Continue
    }

    /// Returns whether the device is usable this frame.
    fn test_cooperative(&mut self) -> bool {
        let Some(ctx) = self.ctx.as_mut() else {
            return false;
        };

        match ctx.device.test_cooperative_level() {
            CooperativeLevel::Ok => {
                if self.state == DeviceState::Lost {
                    tracing::debug!("device recovered");
                }
                self.state = DeviceState::Ready;
                true
            }
            CooperativeLevel::Lost => {
                if self.state != DeviceState::Lost {
                    tracing::debug!("device lost");
                }
                self.state = DeviceState::Lost;
                false
            }
            CooperativeLevel::NotReset => {
                tracing::debug!("resetting device");
                self.state = DeviceState::ResetPending;
                match self.reset() {
                    Ok(()) => {
                        self.state = DeviceState::Ready;
                        true
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "device reset failed, failing permanently");
                        self.device_delete();
                        self.state = DeviceState::Failed;
                        false
                    }
                }
            }
        }
    }

    /// Frees every device resource, resets with the current parameters and rebuilds.
    fn reset(&mut self) -> Result<(), RenderError> {
        let ctx = self.ctx.as_mut().ok_or(RenderError::NoDevice)?;
        ctx.delete_resources(&mut *self.postfx);
        ctx.device.reset(&ctx.params).map_err(RenderError::Reset)?;
        self.stats.inc_device_resets();
        self.create_resources()
    }

    /// Recreates the device when the client area changed. Returns whether it did.
    fn update_window_size<W: RenderWindow>(&mut self, window: &mut W) -> bool {
        let (width, height) = window.client_size();
        if self.ctx.is_some() && width == self.display.width && height == self.display.height {
            if window.resize_state() == ResizeState::Pending {
                window.set_resize_state(ResizeState::Normal);
            }
            return false;
        }
        if window.resize_state() == ResizeState::Resizing {
            return false;
        }

        if is_windowed(window) {
            self.display.width = width;
            self.display.height = height;
        }
        match self.device_create(window) {
            Ok(CreateOutcome::Created) => {}
            Ok(CreateOutcome::RetryLater) => return false,
            Err(err) => {
                tracing::error!(error = %err, class = ?err.class(), "device creation failed");
                return false;
            }
        }

        window.set_resize_state(ResizeState::Normal);
        true
    }

    /// Toggles post-processing at the start of the next frame.
    pub fn request_post_processing_toggle(&mut self) {
        self.toggle_pending = true;
    }

    fn toggle_post_processing(&mut self) -> Result<(), RenderError> {
        if let Some(ctx) = self.ctx.as_mut() {
            ctx.delete_resources(&mut *self.postfx);
        }
        self.postfx.toggle();
        tracing::debug!(enabled = self.postfx.enabled(), "post-processing toggled");
        if self.ctx.is_some() {
            self.create_resources()?;
        }
        Ok(())
    }

    /// Resets the device with parameters recomputed for a new video mode.
    pub fn restart<W: RenderWindow>(&mut self, window: &W) -> Result<(), RenderError> {
        if self.ctx.is_none() {
            return Err(RenderError::NoDevice);
        }
        self.config_adapter_mode(window)?;

        let post_fx = self.post_processing_enabled();
        let params = self.present_params_for(window);
        let fullscreen_mode = (!params.windowed).then(|| self.display.mode());

        let reset = match self.ctx.as_mut() {
            Some(ctx) => {
                if post_fx {
                    ctx.delete_resources(&mut *self.postfx);
                }
                let result = ctx.device.reset_ex(&params, fullscreen_mode.as_ref());
                if result.is_ok() {
                    ctx.params = params;
                }
                result
            }
            None => return Err(RenderError::NoDevice),
        };
        if let Err(err) = reset {
            tracing::error!(error = %err, "unable to reset the device for the new mode");
            self.device_delete();
            self.state = DeviceState::Failed;
            return Err(RenderError::Reset(err));
        }
        self.stats.inc_device_resets();

        self.scheduler.configure(
            self.display.vendor,
            Self::scanline_mode(window),
            params.back_buffer_height,
        );

        if post_fx {
            if let Err(err) = self.create_resources() {
                self.device_delete();
                self.state = DeviceState::Failed;
                return Err(err);
            }
        }
        Ok(())
    }

    /// Waits for the GPU to drain submitted work.
    pub fn device_flush(&mut self) {
        let Some(ctx) = self.ctx.as_mut() else {
            return;
        };
        let Some(query) = ctx.query.as_ref() else {
            return;
        };
        if !log_failure(ctx.device.issue_query_end(query), "IssueQuery") {
            return;
        }

        for _ in 0..self.config.max_vsync_polls {
            match ctx.device.query_status(query) {
                Ok(QueryStatus::Done) => return,
                Ok(QueryStatus::Pending) => std::hint::spin_loop(),
                Err(err) => {
                    tracing::debug!(error = %err, "flush query aborted");
                    return;
                }
            }
        }
        tracing::debug!("gave up waiting for the flush query");
    }

    /// Releases the device and everything created with it.
    pub fn device_delete(&mut self) {
        let Some(mut ctx) = self.ctx.take() else {
            return;
        };
        ctx.delete_resources(&mut *self.postfx);
        if self.caps.gamma_supported && !ctx.params.windowed {
            log_failure(ctx.device.set_gamma_ramp(&identity_gamma_ramp()), "SetGammaRamp");
        }
        tracing::debug!("device deleted");
    }
}

fn pick_target(requested: u32, fallback: u32) -> u32 {
    if requested != 0 {
        requested
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::device::{PresentationIntervals, TextureCaps, VertexFormat};
    use crate::primitive::PrimitiveList;
    use crate::sim::{
        DeviceCall, PostFxCall, RecordingPostProcessor, SimulatedAdapter, SimulatedDevice,
    };
    use crate::window::{Modeline, Orientation};

    struct Window {
        size: (u32, u32),
        fullscreen: bool,
        resize: ResizeState,
        modeline: Option<Modeline>,
        prims: PrimitiveList,
    }

    impl Window {
        fn windowed(width: u32, height: u32) -> Self {
            Self {
                size: (width, height),
                fullscreen: false,
                resize: ResizeState::Normal,
                modeline: None,
                prims: PrimitiveList::new(),
            }
        }

        fn fullscreen(width: u32, height: u32) -> Self {
            Self {
                fullscreen: true,
                ..Self::windowed(width, height)
            }
        }
    }

    impl RenderWindow for Window {
        fn handle(&self) -> WindowHandle {
            WindowHandle(7)
        }
        fn client_size(&self) -> (u32, u32) {
            self.size
        }
        fn is_fullscreen(&self) -> bool {
            self.fullscreen
        }
        fn has_menu(&self) -> bool {
            false
        }
        fn resize_state(&self) -> ResizeState {
            self.resize
        }
        fn set_resize_state(&mut self, state: ResizeState) {
            self.resize = state;
        }
        fn prescale(&self) -> u32 {
            1
        }
        fn target_orientation(&self) -> Orientation {
            Orientation::ROT0
        }
        fn native_orientation(&self) -> Orientation {
            Orientation::ROT0
        }
        fn modeline(&self) -> Option<Modeline> {
            self.modeline
        }
        fn primitives(&self) -> &PrimitiveList {
            &self.prims
        }
    }

    fn renderer(adapter: SimulatedAdapter) -> Renderer<SimulatedAdapter> {
        Renderer::new(adapter, RenderConfig::default()).unwrap()
    }

    fn ready(window: &mut Window) -> Renderer<SimulatedAdapter> {
        let mut r = renderer(SimulatedAdapter::new());
        r.initialize(window).unwrap();
        assert_eq!(r.per_frame_check(window), FrameCheck::SkipFrame);
        r
    }

    fn sim(r: &mut Renderer<SimulatedAdapter>) -> &mut SimulatedDevice {
        r.device_mut().unwrap()
    }

    #[test]
    fn every_missing_cap_is_reported() {
        let caps = DeviceCaps {
            presentation_intervals: PresentationIntervals::default(),
            can_render_after_flip: false,
            hw_rasterization: false,
            modulate: false,
            texture_caps: TextureCaps {
                pow2: true,
                nonpow2_conditional: true,
                square_only: true,
            },
            ..SimulatedAdapter::default_caps()
        };
        let adapter = SimulatedAdapter::new()
            .with_caps(caps)
            .without_format(TextureFormat::A8R8G8B8);

        let err = verify_caps(&adapter, TextureFormat::X8R8G8B8).unwrap_err();
        assert_eq!(
            err,
            RenderError::UnsupportedCaps(vec![
                MissingCap::ImmediatePresentation,
                MissingCap::PerRefreshPresentation,
                MissingCap::RenderAfterFlip,
                MissingCap::HardwareRasterization,
                MissingCap::ModulateBlending,
                MissingCap::NonPow2Conditional,
                MissingCap::Pow2Only,
                MissingCap::SquareOnly,
                MissingCap::Argb32Textures,
            ])
        );
        assert_eq!(err.class(), ErrorClass::Fatal);
    }

    #[test]
    fn few_shader_slots_only_disable_post_processing() {
        let caps = DeviceCaps {
            max_pixel_shader30_instruction_slots: 256,
            fullscreen_gamma: false,
            ..SimulatedAdapter::default_caps()
        };
        let adapter = SimulatedAdapter::new().with_caps(caps);

        let report = verify_caps(&adapter, TextureFormat::X8R8G8B8).unwrap();
        assert!(!report.post_fx_available);
        assert!(!report.gamma_supported);
    }

    #[test]
    fn screen_and_yuv_format_preferences() {
        let adapter = SimulatedAdapter::new();
        let display = TextureFormat::X8R8G8B8;
        assert_eq!(pick_screen_format(&adapter, display), Ok(TextureFormat::X8R8G8B8));
        assert_eq!(pick_yuv_format(&adapter, display), TextureFormat::Uyvy);

        let adapter = SimulatedAdapter::new()
            .without_format(TextureFormat::X8R8G8B8)
            .without_format(TextureFormat::Uyvy);
        assert_eq!(pick_screen_format(&adapter, display), Ok(TextureFormat::A8R8G8B8));
        assert_eq!(pick_yuv_format(&adapter, display), TextureFormat::Yuy2);

        let adapter = SimulatedAdapter::new()
            .without_format(TextureFormat::X8R8G8B8)
            .without_format(TextureFormat::A8R8G8B8)
            .without_format(TextureFormat::Uyvy)
            .without_format(TextureFormat::Yuy2);
        assert_eq!(
            pick_screen_format(&adapter, display),
            Err(RenderError::NoScreenFormat)
        );
        assert_eq!(pick_yuv_format(&adapter, display), TextureFormat::A8R8G8B8);
    }

    #[test]
    fn present_interval_follows_vsync_settings() {
        let mode = DisplayMode {
            width: 800,
            height: 600,
            refresh_rate: 75,
            format: TextureFormat::X8R8G8B8,
        };
        let mut config = RenderConfig {
            wait_vsync: true,
            ..RenderConfig::default()
        };

        let params = present_params(&mode, &config, false, WindowHandle(1));
        assert_eq!(params.interval, PresentInterval::One);
        assert_eq!(params.refresh_rate, 75);
        assert_eq!(params.back_buffer_count, 1);

        config.sync_refresh = true;
        let params = present_params(&mode, &config, true, WindowHandle(1));
        assert_eq!(params.interval, PresentInterval::Immediate);
        assert_eq!(params.refresh_rate, 0);
    }

    #[test]
    fn windowed_device_is_created_by_the_first_frame_check() {
        let mut window = Window::windowed(800, 600);
        let mut r = renderer(SimulatedAdapter::new());
        r.initialize(&mut window).unwrap();
        assert!(r.device().is_none());

        assert_eq!(r.per_frame_check(&mut window), FrameCheck::SkipFrame);
        assert_eq!(r.lifecycle_state(), DeviceState::Ready);
        let device = sim(&mut r);
        assert_eq!(device.params().back_buffer_width, 800);
        assert_eq!(device.params().back_buffer_height, 600);
        assert!(device.params().windowed);
        assert_eq!(device.max_frame_latency(), Some(1));

        assert_eq!(r.per_frame_check(&mut window), FrameCheck::Continue);
        assert_eq!(r.stats().device_creates, 1);
    }

    #[test]
    fn fullscreen_device_uses_the_modeline() {
        let mut window = Window::fullscreen(1024, 768);
        window.modeline = Some(Modeline {
            width: 640,
            height: 480,
            refresh: 60,
            vtotal: 525,
            vactive: 480,
            vbegin: 490,
            interlace: false,
            v_scale: 1.0,
        });
        let mut r = Renderer::new(
            SimulatedAdapter::new(),
            RenderConfig {
                switch_res: true,
                full_screen_brightness: 1.5,
                ..RenderConfig::default()
            },
        )
        .unwrap();

        r.initialize(&mut window).unwrap();

        assert_eq!(r.lifecycle_state(), DeviceState::Ready);
        assert_eq!(r.scanlines().last, 479);
        let device = sim(&mut r);
        assert!(!device.params().windowed);
        assert_eq!(device.params().back_buffer_width, 640);
        assert_eq!(device.params().refresh_rate, 60);
        assert_eq!(device.gamma_ramp().map(|ramp| ramp.red[0]), Some(128 << 8));

        assert_eq!(r.per_frame_check(&mut window), FrameCheck::Continue);
    }

    #[test]
    fn unsupported_desktop_format_fails_windowed_setup() {
        let adapter = SimulatedAdapter::new().with_display_mode(DisplayMode {
            width: 1024,
            height: 768,
            refresh_rate: 60,
            format: TextureFormat::A8R8G8B8,
        });
        let mut r = renderer(adapter);
        let mut window = Window::windowed(640, 480);

        assert_eq!(
            r.initialize(&mut window),
            Err(RenderError::UnsupportedDisplayFormat(TextureFormat::A8R8G8B8))
        );
        assert_eq!(r.per_frame_check(&mut window), FrameCheck::Fallback);
    }

    #[test]
    fn tenth_lost_creation_is_fatal() {
        let mut adapter = SimulatedAdapter::new();
        for _ in 0..MAX_CREATE_RETRIES {
            adapter.push_create_failure(DeviceError::DeviceLost);
        }
        let mut r = renderer(adapter);
        let window = Window::windowed(640, 480);
        r.config_adapter_mode(&window).unwrap();

        for attempt in 1..MAX_CREATE_RETRIES {
            assert_eq!(r.device_create(&window), Ok(CreateOutcome::RetryLater));
            assert_eq!(r.create_failures(), attempt);
        }
        assert_eq!(
            r.device_create(&window),
            Err(RenderError::CreateRetriesExhausted { attempts: 10 })
        );
        assert_eq!(r.lifecycle_state(), DeviceState::Failed);
        assert_eq!(r.stats().create_retries, 10);
    }

    #[test]
    fn other_creation_errors_are_fatal_immediately() {
        let mut adapter = SimulatedAdapter::new();
        adapter.push_create_failure(DeviceError::OutOfVideoMemory);
        let mut r = renderer(adapter);
        let mut window = Window::windowed(640, 480);
        r.initialize(&mut window).unwrap();

        assert_eq!(r.per_frame_check(&mut window), FrameCheck::Fallback);
        assert_eq!(r.lifecycle_state(), DeviceState::Failed);
        assert_eq!(r.create_failures(), 0);
    }

    #[test]
    fn resize_in_progress_skips_the_frame() {
        let mut window = Window::windowed(640, 480);
        let mut r = ready(&mut window);
        window.resize = ResizeState::Resizing;
        window.size = (700, 500);

        assert_eq!(r.per_frame_check(&mut window), FrameCheck::SkipFrame);
        assert_eq!(sim(&mut r).params().back_buffer_width, 640);
    }

    #[test]
    fn finished_resize_recreates_the_device() {
        let mut window = Window::windowed(640, 480);
        let mut r = ready(&mut window);
        window.resize = ResizeState::Pending;
        window.size = (1024, 768);

        assert_eq!(r.per_frame_check(&mut window), FrameCheck::SkipFrame);
        assert_eq!(window.resize, ResizeState::Normal);
        assert_eq!(r.adapter().devices_created(), 2);
        assert_eq!(sim(&mut r).params().back_buffer_width, 1024);
        // Only the new device's default texture is alive.
        assert_eq!(r.adapter().live_textures(), 1);
    }

    #[test]
    fn lost_device_falls_back_until_it_can_be_reset() {
        let mut window = Window::windowed(640, 480);
        let mut r = ready(&mut window);

        sim(&mut r).push_cooperative_level(CooperativeLevel::Lost);
        assert_eq!(r.per_frame_check(&mut window), FrameCheck::Fallback);
        assert_eq!(r.lifecycle_state(), DeviceState::Lost);

        sim(&mut r).push_cooperative_level(CooperativeLevel::NotReset);
        sim(&mut r).take_calls();
        assert_eq!(r.per_frame_check(&mut window), FrameCheck::Continue);
        assert_eq!(r.lifecycle_state(), DeviceState::Ready);
        assert_eq!(r.stats().device_resets, 1);

        let device = sim(&mut r);
        assert_eq!(device.count_calls(|c| *c == DeviceCall::Reset), 1);
        assert_eq!(device.count_calls(|c| *c == DeviceCall::CreateQuery), 1);
        assert!(r.context().unwrap().textures().default_texture().is_some());
    }

    #[test]
    fn failed_reset_is_permanent() {
        let mut window = Window::windowed(640, 480);
        let mut r = ready(&mut window);
        sim(&mut r).push_cooperative_level(CooperativeLevel::NotReset);
        sim(&mut r).push_reset_failure(DeviceError::DeviceLost);

        assert_eq!(r.per_frame_check(&mut window), FrameCheck::Fallback);
        assert_eq!(r.lifecycle_state(), DeviceState::Failed);
        assert!(r.device().is_none());
        assert_eq!(r.adapter().live_textures(), 0);

        assert_eq!(r.per_frame_check(&mut window), FrameCheck::Fallback);
        assert_eq!(r.adapter().devices_created(), 1);
    }

    #[test]
    fn toggle_rebuilds_resources_with_the_new_vertex_format() {
        let postfx = RecordingPostProcessor::new(false);
        let mut window = Window::windowed(640, 480);
        let mut r = renderer(SimulatedAdapter::new()).with_post_processor(Box::new(postfx.clone()));
        r.initialize(&mut window).unwrap();
        r.per_frame_check(&mut window);
        assert_eq!(
            r.context().unwrap().vertex_format(),
            Some(VertexFormat::PreTransformed)
        );
        postfx.take_calls();

        r.request_post_processing_toggle();
        assert_eq!(r.per_frame_check(&mut window), FrameCheck::Continue);

        assert!(r.post_processing_enabled());
        assert_eq!(
            r.context().unwrap().vertex_format(),
            Some(VertexFormat::Homogeneous)
        );
        assert_eq!(
            postfx.calls(),
            vec![
                PostFxCall::DeleteResources,
                PostFxCall::Toggle,
                PostFxCall::CreateResources,
            ]
        );
    }

    #[test]
    fn post_processing_resource_failure_degrades() {
        let postfx = RecordingPostProcessor::new(true);
        postfx.fail_resource_creates(1);
        let mut window = Window::windowed(640, 480);
        let mut r = renderer(SimulatedAdapter::new()).with_post_processor(Box::new(postfx.clone()));
        r.initialize(&mut window).unwrap();

        assert_eq!(r.per_frame_check(&mut window), FrameCheck::SkipFrame);
        assert_eq!(r.lifecycle_state(), DeviceState::Ready);
        assert!(!r.capabilities().post_fx_available);
        assert_eq!(
            r.context().unwrap().vertex_format(),
            Some(VertexFormat::PreTransformed)
        );
    }

    #[test]
    fn restart_resets_with_the_new_mode() {
        let mut window = Window::windowed(640, 480);
        let mut r = ready(&mut window);
        window.size = (800, 600);

        r.restart(&window).unwrap();

        let device = sim(&mut r);
        assert_eq!(device.count_calls(|c| *c == DeviceCall::ResetEx), 1);
        assert_eq!(device.params().back_buffer_width, 800);
        assert_eq!(r.context().unwrap().params().back_buffer_height, 600);
        assert_eq!(r.stats().device_resets, 1);
    }

    #[test]
    fn failed_restart_tears_the_device_down() {
        let mut window = Window::windowed(640, 480);
        let mut r = ready(&mut window);
        sim(&mut r).push_reset_failure(DeviceError::InvalidCall("mode"));

        assert_eq!(
            r.restart(&window),
            Err(RenderError::Reset(DeviceError::InvalidCall("mode")))
        );
        assert!(r.device().is_none());
        assert_eq!(r.lifecycle_state(), DeviceState::Failed);
    }

    #[test]
    fn flush_waits_for_the_query() {
        let mut window = Window::windowed(640, 480);
        let mut r = ready(&mut window);
        sim(&mut r).set_query_pending_polls(3);

        r.device_flush();

        assert_eq!(sim(&mut r).count_calls(|c| *c == DeviceCall::IssueQuery), 1);
    }

    #[test]
    fn delete_releases_everything() {
        let mut window = Window::windowed(640, 480);
        let mut r = ready(&mut window);
        assert_eq!(r.adapter().live_textures(), 1);

        r.device_delete();

        assert!(r.device().is_none());
        assert_eq!(r.adapter().live_textures(), 0);
    }
}
