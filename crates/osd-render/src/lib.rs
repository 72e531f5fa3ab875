//! `osd-render` draws an emulator's per-frame primitive list through a
//! Direct3D 9 style device.
//!
//! The crate provides:
//! - Device lifecycle management: creation with capability negotiation,
//!   loss detection and reset, teardown (see [`Renderer`]).
//! - A texture cache that converts source images and optionally prescales
//!   them into render targets (see [`texture`]).
//! - A redundant-state filter in front of the device (see [`state::StateCache`]).
//! - Primitive batching, including single-draw batches of vector lines with
//!   rotation handling (see [`batch`] and [`vector`]).
//! - Raster-synchronized presentation with per-vendor scanline accounting
//!   (see [`present`] and [`scanline`]).
//!
//! The device itself is abstracted behind [`device::Adapter`] and
//! [`device::Device`]; [`sim`] provides a deterministic in-memory
//! implementation.

#![forbid(unsafe_code)]

mod context;
mod lifecycle;
mod renderer;

pub mod batch;
pub mod config;
pub mod convert;
pub mod device;
pub mod error;
pub mod gamma;
pub mod geometry;
pub mod postfx;
pub mod present;
pub mod primitive;
pub mod scanline;
pub mod sim;
pub mod state;
pub mod stats;
pub mod texture;
pub mod vector;
pub mod window;

pub use config::RenderConfig;
pub use context::{Capabilities, GpuContext, SurfaceFormats};
pub use error::{DeviceError, ErrorClass, MissingCap, RenderError};
pub use lifecycle::{
    pick_screen_format, pick_yuv_format, present_params, verify_caps, CapsReport, CreateOutcome,
    DeviceState, FrameCheck, MAX_CREATE_RETRIES, MIN_POST_FX_INSTRUCTION_SLOTS,
};
pub use renderer::{DisplaySettings, FrameOutcome, Renderer};
pub use stats::{RenderStats, RenderStatsSnapshot};
pub use window::{Modeline, Orientation, RenderWindow, ResizeState};
