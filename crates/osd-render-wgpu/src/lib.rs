//! [`osd_render::device`] implementation on `wgpu`.
//!
//! [`WgpuAdapter`] runs headless (presents only submit work) or against a
//! window surface. The devices it creates emulate the fixed-function state the
//! renderer sets with a single WGSL shader; raster status, presentation
//! statistics and gamma ramps are unavailable, so raster-synchronized presents
//! degrade to plain presents.

mod adapter;
mod device;
mod error;
mod pipeline;
mod shader;

pub use adapter::{WgpuAdapter, HEADLESS_DESKTOP};
pub use device::{SurfaceTarget, WgpuDevice, WgpuQuery, WgpuTexture, WgpuVertexBuffer, BACK_BUFFER_FORMAT};
pub use error::WgpuBackendError;
pub use pipeline::{BlendKey, PipelineKey, SamplerKey};
