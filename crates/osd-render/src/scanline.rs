//! Vendor-specific scanline accounting for raster-synchronized presents.
//!
//! Drivers disagree on where scanline zero sits relative to vertical blank, so
//! the visible window is derived per vendor from the active modeline.

use crate::window::Modeline;

pub const VENDOR_ID_AMD: u32 = 0x1002;
pub const VENDOR_ID_INTEL: u32 = 0x8086;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vendor {
    Amd,
    Intel,
    /// NVIDIA and everyone else.
    Other,
}

impl Vendor {
    pub fn from_id(vendor_id: u32) -> Self {
        match vendor_id {
            VENDOR_ID_AMD => Vendor::Amd,
            VENDOR_ID_INTEL => Vendor::Intel,
            _ => Vendor::Other,
        }
    }
}

/// Subset of the modeline the formulas read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanlineMode {
    pub vtotal: u32,
    pub vactive: u32,
    pub vbegin: u32,
    pub interlace: bool,
    pub v_scale: f32,
}

impl ScanlineMode {
    /// Timing-less mode; every vendor falls back to the back buffer height.
    pub const UNKNOWN: ScanlineMode = ScanlineMode {
        vtotal: 0,
        vactive: 0,
        vbegin: 0,
        interlace: false,
        v_scale: 1.0,
    };

    fn divisor(&self) -> i32 {
        if self.interlace {
            2
        } else {
            1
        }
    }
}

impl From<&Modeline> for ScanlineMode {
    fn from(mode: &Modeline) -> Self {
        Self {
            vtotal: mode.vtotal,
            vactive: mode.vactive,
            vbegin: mode.vbegin,
            interlace: mode.interlace,
            v_scale: mode.v_scale,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanlineWindow {
    pub first: i32,
    pub last: i32,
}

type WindowFn = fn(&ScanlineMode, i32) -> ScanlineWindow;

const VENDOR_TABLE: &[(Vendor, WindowFn)] = &[
    (Vendor::Amd, amd_window),
    (Vendor::Intel, intel_window),
    (Vendor::Other, default_window),
];

fn amd_window(mode: &ScanlineMode, height: i32) -> ScanlineWindow {
    if mode.vtotal == 0 {
        return ScanlineWindow {
            first: 1,
            last: height,
        };
    }
    let first = (mode.vtotal as i32 - mode.vbegin as i32) / mode.divisor();
    ScanlineWindow {
        first,
        last: mode.vactive as i32 + first,
    }
}

fn intel_window(mode: &ScanlineMode, height: i32) -> ScanlineWindow {
    let last = if mode.vtotal == 0 {
        height
    } else {
        mode.vactive as i32 / mode.divisor()
    };
    ScanlineWindow { first: 1, last }
}

fn default_window(mode: &ScanlineMode, height: i32) -> ScanlineWindow {
    let last = if mode.vtotal == 0 {
        height - 1
    } else {
        (mode.vactive as i32 - 1) / mode.divisor()
    };
    ScanlineWindow { first: 0, last }
}

pub fn scanline_window(vendor: Vendor, mode: &ScanlineMode, height: u32) -> ScanlineWindow {
    let compute = VENDOR_TABLE
        .iter()
        .find(|(v, _)| *v == vendor)
        .map_or(default_window as WindowFn, |(_, f)| *f);
    compute(mode, height as i32)
}

/// Scanline thresholds used by the presentation scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScanlineThresholds {
    pub first: i32,
    pub last: i32,
    /// The vblank wait gives up once the raster reaches this line.
    pub break_line: i32,
    /// Line at which a delayed frame should start emulating.
    pub delay_line: f32,
}

pub fn compute_thresholds(
    vendor: Vendor,
    mode: &ScanlineMode,
    height: u32,
    frame_delay: u32,
    vsync_offset: i32,
) -> ScanlineThresholds {
    let ScanlineWindow { first, last } = scanline_window(vendor, mode, height);

    let candidate = last - vsync_offset;
    let break_line = if candidate > first {
        candidate
    } else {
        last.max(first)
    };

    let v_scale = if mode.v_scale > 0.0 { mode.v_scale } else { 1.0 };
    let delay_line = first as f32 + height as f32 * frame_delay as f32 / (10.0 * v_scale);

    ScanlineThresholds {
        first,
        last,
        break_line,
        delay_line,
    }
}
