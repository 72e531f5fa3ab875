use std::sync::Arc;

use osd_render::device::{
    Adapter, AdapterIdentifier, DeviceCaps, DeviceResult, DisplayMode, PresentParams,
    PresentationIntervals, TextureCaps, TextureFormat, TextureUsage,
};
use osd_render::DeviceError;

use crate::device::{SurfaceTarget, WgpuDevice};
use crate::error::WgpuBackendError;

/// Desktop mode reported when there is no window to measure.
pub const HEADLESS_DESKTOP: DisplayMode = DisplayMode {
    width: 640,
    height: 480,
    refresh_rate: 60,
    format: TextureFormat::X8R8G8B8,
};

/// wgpu has no pixel shader instruction limit; report a generous one.
const SHADER_INSTRUCTION_SLOTS: u32 = 32768;

/// A wgpu adapter, optionally paired with the window surface it presents to.
pub struct WgpuAdapter {
    _instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    surface: Option<Arc<wgpu::Surface<'static>>>,
    desktop: DisplayMode,
}

impl WgpuAdapter {
    /// Creates an adapter without a presentation surface. Presents only submit work.
    pub async fn new_headless() -> Result<Self, WgpuBackendError> {
        ensure_xdg_runtime_dir();

        // Prefer GL on Linux; some Vulkan software adapters crash under test.
        let (instance, adapter) = if cfg!(target_os = "linux") {
            match request_adapter(wgpu::Backends::GL, None).await {
                Some(found) => found,
                None => request_adapter(wgpu::Backends::PRIMARY, None)
                    .await
                    .ok_or(WgpuBackendError::AdapterNotFound)?,
            }
        } else {
            request_adapter(wgpu::Backends::PRIMARY, None)
                .await
                .ok_or(WgpuBackendError::AdapterNotFound)?
        };

        Ok(Self {
            _instance: instance,
            adapter,
            surface: None,
            desktop: HEADLESS_DESKTOP,
        })
    }

    /// Creates an adapter able to present to `target`.
    pub async fn with_surface(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        desktop: DisplayMode,
    ) -> Result<Self, WgpuBackendError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance.create_surface(target)?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(WgpuBackendError::AdapterNotFound)?;

        Ok(Self {
            _instance: instance,
            adapter,
            surface: Some(Arc::new(surface)),
            desktop,
        })
    }

    pub fn info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    pub fn set_desktop_mode(&mut self, mode: DisplayMode) {
        self.desktop = mode;
    }

    fn surface_target(&self) -> Option<SurfaceTarget> {
        let surface = self.surface.clone()?;
        let caps = surface.get_capabilities(&self.adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| *f == wgpu::TextureFormat::Bgra8Unorm)
            .or_else(|| caps.formats.iter().copied().find(|f| !f.is_srgb()))
            .or_else(|| caps.formats.first().copied())?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        Some(SurfaceTarget {
            surface,
            format,
            alpha_mode,
        })
    }
}

async fn request_adapter(
    backends: wgpu::Backends,
    compatible_surface: Option<&wgpu::Surface<'_>>,
) -> Option<(wgpu::Instance, wgpu::Adapter)> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends,
        ..Default::default()
    });
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface,
            force_fallback_adapter: false,
        })
        .await?;
    Some((instance, adapter))
}

/// The GL backend warns loudly when `XDG_RUNTIME_DIR` is unset or world-readable.
fn ensure_xdg_runtime_dir() {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let needs_runtime_dir = match std::env::var("XDG_RUNTIME_DIR") {
            Ok(dir) if !dir.is_empty() => match std::fs::metadata(&dir) {
                Ok(meta) => !meta.is_dir() || (meta.permissions().mode() & 0o077) != 0,
                Err(_) => true,
            },
            _ => true,
        };
        if needs_runtime_dir {
            let dir = std::env::temp_dir()
                .join(format!("osd-render-xdg-runtime-{}", std::process::id()));
            let _ = std::fs::create_dir_all(&dir);
            let _ = std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700));
            std::env::set_var("XDG_RUNTIME_DIR", &dir);
        }
    }
}

impl Adapter for WgpuAdapter {
    type Device = WgpuDevice;

    fn identifier(&self) -> DeviceResult<AdapterIdentifier> {
        let info = self.adapter.get_info();
        Ok(AdapterIdentifier {
            description: format!("{} ({:?})", info.name, info.backend),
            vendor_id: info.vendor,
            device_id: info.device,
        })
    }

    fn caps(&self) -> DeviceResult<DeviceCaps> {
        let limits = self.adapter.limits();
        let max_dim = limits.max_texture_dimension_2d;
        Ok(DeviceCaps {
            presentation_intervals: PresentationIntervals {
                immediate: true,
                one: true,
            },
            can_render_after_flip: true,
            hw_rasterization: true,
            modulate: true,
            texture_caps: TextureCaps::default(),
            fullscreen_gamma: false,
            max_pixel_shader30_instruction_slots: SHADER_INSTRUCTION_SLOTS,
            max_texture_width: max_dim,
            max_texture_height: max_dim,
            max_texture_aspect_ratio: max_dim,
        })
    }

    fn display_mode(&self) -> DeviceResult<DisplayMode> {
        Ok(self.desktop)
    }

    fn supports_format(
        &self,
        _display_format: TextureFormat,
        _usage: TextureUsage,
        format: TextureFormat,
    ) -> bool {
        matches!(format, TextureFormat::A8R8G8B8 | TextureFormat::X8R8G8B8)
    }

    fn supports_device_type(&self, _display_format: TextureFormat, _windowed: bool) -> bool {
        true
    }

    fn create_device(
        &mut self,
        params: &PresentParams,
        _fullscreen_mode: Option<&DisplayMode>,
    ) -> DeviceResult<WgpuDevice> {
        let required_limits =
            wgpu::Limits::downlevel_defaults().using_resolution(self.adapter.limits());
        let (device, queue) = pollster::block_on(self.adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("osd-render device"),
                required_features: wgpu::Features::empty(),
                required_limits,
            },
            None,
        ))
        .map_err(|err| DeviceError::Backend(err.to_string()))?;

        let info = self.adapter.get_info();
        tracing::debug!(
            adapter = %info.name,
            backend = ?info.backend,
            width = params.back_buffer_width,
            height = params.back_buffer_height,
            "created wgpu device"
        );
        WgpuDevice::new(device, queue, self.surface_target(), *params)
    }
}
