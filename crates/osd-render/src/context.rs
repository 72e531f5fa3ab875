use std::sync::Arc;

use crate::batch::VertexStream;
use crate::device::{
    AddressMode, CompareFunc, CullMode, Device, PresentParams, RenderState, SamplerState,
    TextureFormat, TextureOp, TextureStageState, VertexFormat,
};
use crate::error::{log_failure, RenderError};
use crate::postfx::PostProcessor;
use crate::state::StateCache;
use crate::stats::RenderStats;
use crate::texture::{TextureCache, TextureLimits, TextureRefresh};

/// Session-wide feature availability. The renderer owns the only copy and
/// folds in results reported by resource creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub post_fx_available: bool,
    pub gamma_supported: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            post_fx_available: true,
            gamma_supported: false,
        }
    }
}

impl Capabilities {
    pub fn apply(&mut self, refresh: TextureRefresh) {
        if refresh.disable_post_fx && self.post_fx_available {
            tracing::warn!("post-processing disabled for the rest of the session");
            self.post_fx_available = false;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceFormats {
    /// Format for RGB screen textures.
    pub screen: TextureFormat,
    /// Format for packed YUV screen textures; ARGB when neither YUV layout is supported.
    pub yuv: TextureFormat,
}

/// Resources that share the lifetime of one device.
pub(crate) struct ResourceSettings {
    pub postfx_enabled: bool,
    pub wrap_default: AddressMode,
    pub vertex_capacity: u32,
    pub prescale: u32,
}

/// Everything tied to a live device: the device itself, its swap chain
/// parameters, the state snapshot, cached textures and the vertex stream.
///
/// Dropping the context releases every GPU resource it owns.
pub struct GpuContext<D: Device> {
    pub(crate) device: D,
    pub(crate) params: PresentParams,
    pub(crate) formats: SurfaceFormats,
    pub(crate) limits: TextureLimits,
    pub(crate) filter: bool,
    pub(crate) state: StateCache,
    pub(crate) textures: TextureCache<D::Texture>,
    pub(crate) stream: Option<VertexStream<D>>,
    pub(crate) query: Option<D::Query>,
    pub(crate) stats: Arc<RenderStats>,
}

impl<D: Device> GpuContext<D> {
    pub(crate) fn new(
        device: D,
        params: PresentParams,
        formats: SurfaceFormats,
        limits: TextureLimits,
        filter: bool,
        stats: Arc<RenderStats>,
    ) -> Self {
        Self {
            device,
            params,
            formats,
            limits,
            filter,
            state: StateCache::new(stats.clone()),
            textures: TextureCache::new(),
            stream: None,
            query: None,
            stats,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn params(&self) -> &PresentParams {
        &self.params
    }

    pub fn formats(&self) -> SurfaceFormats {
        self.formats
    }

    pub fn textures(&self) -> &TextureCache<D::Texture> {
        &self.textures
    }

    pub fn vertex_format(&self) -> Option<VertexFormat> {
        self.stream.as_ref().map(VertexStream::format)
    }

    /// Creates the vertex stream, programs the fixed pipeline state and
    /// allocates the default texture.
    pub(crate) fn create_resources(
        &mut self,
        postfx: &mut dyn PostProcessor<D>,
        settings: &ResourceSettings,
    ) -> Result<TextureRefresh, RenderError> {
        if settings.postfx_enabled {
            postfx.create_resources(&mut self.device)?;
        }

        let format = if settings.postfx_enabled {
            VertexFormat::Homogeneous
        } else {
            VertexFormat::PreTransformed
        };
        let stream = VertexStream::new(&mut self.device, settings.vertex_capacity, format).map_err(
            |source| RenderError::ResourceCreation {
                what: "vertex buffer",
                source,
            },
        )?;
        self.stream = Some(stream);
        self.device
            .set_vertex_format(format)
            .map_err(|source| RenderError::ResourceCreation {
                what: "vertex format",
                source,
            })?;

        self.set_fixed_state(settings.wrap_default);
        self.state.invalidate_all();

        log_failure(self.device.clear(0), "Clear");
        log_failure(self.device.present(), "Present");

        if self.query.is_none() {
            match self.device.create_query() {
                Ok(query) => self.query = Some(query),
                Err(err) => tracing::error!(error = %err, "unable to create flush query"),
            }
        }

        let mut refresh = TextureRefresh::default();
        if let Err(err) = self.create_default_texture(settings.prescale, settings.postfx_enabled) {
            tracing::error!(error = %err, "default texture allocation failed");
            refresh.disable_post_fx = true;
        }
        Ok(refresh)
    }

    fn set_fixed_state(&mut self, wrap: AddressMode) {
        let states = [
            RenderState::ZEnable(false),
            RenderState::ZWriteEnable(false),
            RenderState::AlphaTestEnable(true),
            RenderState::LastPixel(true),
            RenderState::CullMode(CullMode::None),
            RenderState::ZFunc(CompareFunc::Less),
            RenderState::AlphaRef(0),
            RenderState::AlphaFunc(CompareFunc::Greater),
            RenderState::DitherEnable(false),
            RenderState::FogEnable(false),
            RenderState::SpecularEnable(false),
            RenderState::StencilEnable(false),
            RenderState::Clipping(true),
            RenderState::Lighting(false),
            RenderState::ColorVertex(true),
        ];
        for state in states {
            if !log_failure(self.device.set_render_state(state), "SetRenderState") {
                self.stats.inc_device_call_failures();
            }
        }

        for stage in 0..2 {
            for state in [
                TextureStageState::ColorOp(TextureOp::Modulate),
                TextureStageState::AlphaOp(TextureOp::Modulate),
            ] {
                log_failure(
                    self.device.set_texture_stage_state(stage, state),
                    "SetTextureStageState",
                );
            }
            for state in [SamplerState::AddressU(wrap), SamplerState::AddressV(wrap)] {
                log_failure(self.device.set_sampler_state(stage, state), "SetSamplerState");
            }
        }
    }

    /// Frees what `create_resources` made, plus the flush query. The device survives.
    pub(crate) fn delete_resources(&mut self, postfx: &mut dyn PostProcessor<D>) {
        postfx.delete_resources();
        self.textures.clear();
        self.stream = None;
        self.query = None;
        self.state.invalidate_all();
    }
}

#[cfg(test)]
impl GpuContext<crate::sim::SimulatedDevice> {
    /// Windowed 640x480 context with resources created and the call log cleared.
    pub(crate) fn for_tests(vertex_capacity: u32) -> Self {
        use crate::postfx::NullPostProcessor;

        let mut adapter = crate::sim::SimulatedAdapter::new();
        let device = adapter.create_default_device();
        let params = *device.params();
        let mut ctx = GpuContext::new(
            device,
            params,
            SurfaceFormats {
                screen: TextureFormat::X8R8G8B8,
                yuv: TextureFormat::Uyvy,
            },
            TextureLimits {
                max_width: 4096,
                max_height: 4096,
                max_aspect: 8,
            },
            true,
            Arc::new(RenderStats::new()),
        );
        ctx.create_resources(
            &mut NullPostProcessor,
            &ResourceSettings {
                postfx_enabled: false,
                wrap_default: AddressMode::Clamp,
                vertex_capacity,
                prescale: 1,
            },
        )
        .expect("simulated resources");
        ctx.device.take_calls();
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postfx::NullPostProcessor;
    use crate::sim::{DeviceCall, SimulatedAdapter};

    fn context(adapter: &mut SimulatedAdapter) -> GpuContext<crate::sim::SimulatedDevice> {
        let device = adapter.create_default_device();
        let params = *device.params();
        GpuContext::new(
            device,
            params,
            SurfaceFormats {
                screen: TextureFormat::X8R8G8B8,
                yuv: TextureFormat::Uyvy,
            },
            TextureLimits {
                max_width: 4096,
                max_height: 4096,
                max_aspect: 8,
            },
            true,
            Arc::new(RenderStats::new()),
        )
    }

    fn settings(postfx_enabled: bool) -> ResourceSettings {
        ResourceSettings {
            postfx_enabled,
            wrap_default: AddressMode::Clamp,
            vertex_capacity: 64,
            prescale: 1,
        }
    }

    #[test]
    fn create_resources_programs_fixed_state_and_default_texture() {
        let mut adapter = SimulatedAdapter::new();
        let mut ctx = context(&mut adapter);
        let refresh = ctx
            .create_resources(&mut NullPostProcessor, &settings(false))
            .unwrap();

        assert!(!refresh.disable_post_fx);
        assert_eq!(ctx.vertex_format(), Some(VertexFormat::PreTransformed));
        let calls = ctx.device.calls();
        assert!(calls.contains(&DeviceCall::SetRenderState(RenderState::AlphaFunc(
            CompareFunc::Greater
        ))));
        assert!(calls.contains(&DeviceCall::SetRenderState(RenderState::CullMode(CullMode::None))));
        assert!(calls.contains(&DeviceCall::Present));

        let default = ctx.textures.default_texture().unwrap();
        // 8x8 plus a one pixel border.
        assert_eq!(default.layout().raw_width, 10);
        assert_eq!(adapter.live_textures(), 1);
    }

    #[test]
    fn delete_resources_releases_textures() {
        let mut adapter = SimulatedAdapter::new();
        let mut ctx = context(&mut adapter);
        ctx.create_resources(&mut NullPostProcessor, &settings(false))
            .unwrap();
        ctx.delete_resources(&mut NullPostProcessor);

        assert_eq!(adapter.live_textures(), 0);
        assert!(ctx.textures.default_texture().is_none());
        assert!(ctx.vertex_format().is_none());
    }

    #[test]
    fn default_texture_failure_is_reported_not_fatal() {
        let mut adapter = SimulatedAdapter::new();
        let mut ctx = context(&mut adapter);
        ctx.device.fail_dynamic_texture_creates(1);

        let refresh = ctx
            .create_resources(&mut NullPostProcessor, &settings(false))
            .unwrap();
        assert!(refresh.disable_post_fx);

        let mut caps = Capabilities::default();
        caps.apply(refresh);
        assert!(!caps.post_fx_available);
    }
}
