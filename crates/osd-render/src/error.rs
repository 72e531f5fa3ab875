use thiserror::Error;

use crate::device::TextureFormat;

/// Result of an individual device call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("device lost")]
    DeviceLost,
    #[error("device lost but can be reset")]
    DeviceNotReset,
    #[error("out of video memory")]
    OutOfVideoMemory,
    #[error("invalid call: {0}")]
    InvalidCall(&'static str),
    #[error("operation not available on this device")]
    NotAvailable,
    #[error("previous operation still drawing")]
    WasStillDrawing,
    #[error("{0}")]
    Backend(String),
}

/// How the renderer reacts to a [`RenderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retried automatically; invisible unless the retry bound is exceeded.
    Transient,
    /// Device and resources are torn down; the caller falls back to another renderer.
    Fatal,
    /// A capability is switched off for the rest of the session; rendering continues.
    Degraded,
    /// Recorded for diagnostics only.
    Logged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingCap {
    ImmediatePresentation,
    PerRefreshPresentation,
    RenderAfterFlip,
    HardwareRasterization,
    ModulateBlending,
    NonPow2Conditional,
    Pow2Only,
    SquareOnly,
    Argb32Textures,
}

impl std::fmt::Display for MissingCap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            MissingCap::ImmediatePresentation => "immediate presentation",
            MissingCap::PerRefreshPresentation => "per-refresh presentation",
            MissingCap::RenderAfterFlip => "rendering after a page flip",
            MissingCap::HardwareRasterization => "hardware rasterization",
            MissingCap::ModulateBlending => "modulate-type blending",
            MissingCap::NonPow2Conditional => "unconditional non-power-of-two textures",
            MissingCap::Pow2Only => "non-power-of-two textures",
            MissingCap::SquareOnly => "non-square textures",
            MissingCap::Argb32Textures => "the A8R8G8B8 texture format",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("device does not support: {}", join_caps(.0))]
    UnsupportedCaps(Vec<MissingCap>),
    #[error("failed to query device capabilities: {0}")]
    Caps(DeviceError),
    #[error("failed to identify adapter: {0}")]
    AdapterIdentifier(DeviceError),
    #[error("failed to read the display mode: {0}")]
    DisplayMode(DeviceError),
    #[error("proposed video mode {width}x{height} ({format:?}) is not supported")]
    UnsupportedMode {
        width: u32,
        height: u32,
        format: TextureFormat,
    },
    #[error("display mode format {0:?} is not supported")]
    UnsupportedDisplayFormat(TextureFormat),
    #[error("unable to configure a screen texture format")]
    NoScreenFormat,
    #[error("unable to create the device: {0}")]
    DeviceCreation(DeviceError),
    #[error("device reported lost on {attempts} consecutive create attempts")]
    CreateRetriesExhausted { attempts: u32 },
    #[error("unable to reset the device: {0}")]
    Reset(DeviceError),
    #[error("failed to create {what}: {source}")]
    ResourceCreation {
        what: &'static str,
        #[source]
        source: DeviceError,
    },
    #[error("post-processing resources could not be created")]
    PostProcessResources,
    #[error("texture allocation failed for {width}x{height}: {source}")]
    TextureAllocation {
        width: u32,
        height: u32,
        #[source]
        source: DeviceError,
    },
    #[error("no device")]
    NoDevice,
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

fn join_caps(caps: &[MissingCap]) -> String {
    caps.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl RenderError {
    pub fn class(&self) -> ErrorClass {
        match self {
            RenderError::DeviceCreation(DeviceError::DeviceLost) => ErrorClass::Transient,
            RenderError::TextureAllocation { .. } | RenderError::PostProcessResources => {
                ErrorClass::Degraded
            }
            RenderError::InvalidConfig(_) => ErrorClass::Logged,
            _ => ErrorClass::Fatal,
        }
    }
}

/// Reports a failed best-effort device call. Execution continues either way.
pub(crate) fn log_failure(result: Result<(), DeviceError>, call: &'static str) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            tracing::debug!(call, error = %err, "device call failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_follow_taxonomy() {
        assert_eq!(
            RenderError::DeviceCreation(DeviceError::DeviceLost).class(),
            ErrorClass::Transient
        );
        assert_eq!(
            RenderError::CreateRetriesExhausted { attempts: 10 }.class(),
            ErrorClass::Fatal
        );
        assert_eq!(
            RenderError::TextureAllocation {
                width: 4,
                height: 4,
                source: DeviceError::OutOfVideoMemory,
            }
            .class(),
            ErrorClass::Degraded
        );
    }

    #[test]
    fn unsupported_caps_lists_every_missing_feature() {
        let err = RenderError::UnsupportedCaps(vec![
            MissingCap::RenderAfterFlip,
            MissingCap::SquareOnly,
        ]);
        assert_eq!(
            err.to_string(),
            "device does not support: rendering after a page flip, non-square textures"
        );
    }
}
