use osd_render::DeviceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WgpuBackendError {
    #[error("no suitable wgpu adapter found")]
    AdapterNotFound,
    #[error("failed to create surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),
    #[error("failed to request device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("map_async callback dropped unexpectedly")]
    MapAsyncDropped,
    #[error("map_async failed: {0}")]
    MapAsync(String),
    #[error(transparent)]
    Device(#[from] DeviceError),
}

pub(crate) fn map_surface_error(err: wgpu::SurfaceError) -> DeviceError {
    match err {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => DeviceError::DeviceLost,
        wgpu::SurfaceError::Timeout => DeviceError::WasStillDrawing,
        wgpu::SurfaceError::OutOfMemory => DeviceError::OutOfVideoMemory,
        #[allow(unreachable_patterns)]
        other => DeviceError::Backend(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_errors_map_to_device_errors() {
        assert_eq!(
            map_surface_error(wgpu::SurfaceError::Outdated),
            DeviceError::DeviceLost
        );
        assert_eq!(
            map_surface_error(wgpu::SurfaceError::Timeout),
            DeviceError::WasStillDrawing
        );
        assert_eq!(
            map_surface_error(wgpu::SurfaceError::OutOfMemory),
            DeviceError::OutOfVideoMemory
        );
    }
}
