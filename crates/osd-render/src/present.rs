//! Frame presentation, optionally pinned to the start of vertical blank.

use crate::device::Device;
use crate::error::DeviceError;
use crate::scanline::{compute_thresholds, ScanlineMode, ScanlineThresholds, Vendor};
use crate::stats::RenderStats;

/// Raster positions recorded around the last synchronized present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VblankTrace {
    pub enter_line: u32,
    pub exit_line: u32,
    /// Refresh count reported by the swap chain after the present.
    pub sync_count: u32,
    pub missed: bool,
}

#[derive(Debug, Clone)]
pub struct PresentScheduler {
    vendor: Vendor,
    mode: ScanlineMode,
    height: u32,
    frame_delay: u32,
    vsync_offset: i32,
    thresholds: ScanlineThresholds,
    max_polls: u32,
    trace: VblankTrace,
}

impl PresentScheduler {
    pub fn new(max_polls: u32) -> Self {
        Self {
            vendor: Vendor::Other,
            mode: ScanlineMode::UNKNOWN,
            height: 0,
            frame_delay: 0,
            vsync_offset: 0,
            thresholds: ScanlineThresholds::default(),
            max_polls: max_polls.max(1),
            trace: VblankTrace::default(),
        }
    }

    pub fn thresholds(&self) -> ScanlineThresholds {
        self.thresholds
    }

    pub fn trace(&self) -> VblankTrace {
        self.trace
    }

    pub fn frame_delay(&self) -> u32 {
        self.frame_delay
    }

    pub fn vsync_offset(&self) -> i32 {
        self.vsync_offset
    }

    /// Recomputes the thresholds for a new mode or back buffer height.
    pub fn configure(&mut self, vendor: Vendor, mode: ScanlineMode, height: u32) {
        self.vendor = vendor;
        self.mode = mode;
        self.height = height;
        self.recompute();
    }

    /// Picks up new frame delay and vsync offset settings; returns whether anything changed.
    pub fn update_settings(&mut self, frame_delay: u32, vsync_offset: i32) -> bool {
        if self.frame_delay == frame_delay && self.vsync_offset == vsync_offset {
            return false;
        }
        self.frame_delay = frame_delay;
        self.vsync_offset = vsync_offset;
        self.recompute();
        true
    }

    fn recompute(&mut self) {
        self.thresholds = compute_thresholds(
            self.vendor,
            &self.mode,
            self.height,
            self.frame_delay,
            self.vsync_offset,
        );
        tracing::debug!(
            vendor = ?self.vendor,
            frame_delay = self.frame_delay,
            first = self.thresholds.first,
            last = self.thresholds.last,
            break_line = self.thresholds.break_line,
            delay_line = self.thresholds.delay_line,
            "scanline thresholds"
        );
    }

    /// Presents the back buffer. With `sync_refresh` the call busy-waits for
    /// vertical blank (or the break line) first, then for blank to end, and
    /// checks the swap chain's refresh counter for a missed retrace.
    pub fn present<D: Device>(&mut self, device: &mut D, sync_refresh: bool, stats: &RenderStats) {
        if sync_refresh {
            self.wait_for_vblank_start(device);
        }

        match device.present() {
            Ok(()) | Err(DeviceError::WasStillDrawing) => {}
            Err(err) => {
                tracing::debug!(error = %err, "present failed");
                stats.inc_device_call_failures();
            }
        }
        stats.inc_frames_presented();

        if sync_refresh {
            self.wait_for_vblank_end(device);
            self.check_missed_retrace(device, stats);
        }
    }

    fn wait_for_vblank_start<D: Device>(&mut self, device: &mut D) {
        self.trace.enter_line = device.raster_status().map_or(0, |status| status.scanline);

        let break_line = self.thresholds.break_line.max(0) as u32;
        for _ in 0..self.max_polls {
            match device.raster_status() {
                Ok(status) if !status.in_vblank && status.scanline < break_line => {
                    std::hint::spin_loop();
                }
                _ => return,
            }
        }
        tracing::debug!(polls = self.max_polls, "gave up waiting for vertical blank");
    }

    fn wait_for_vblank_end<D: Device>(&mut self, device: &mut D) {
        for _ in 0..self.max_polls {
            match device.raster_status() {
                Ok(status) => {
                    self.trace.exit_line = status.scanline;
                    if !status.in_vblank {
                        return;
                    }
                    std::hint::spin_loop();
                }
                Err(_) => return,
            }
        }
    }

    fn check_missed_retrace<D: Device>(&mut self, device: &mut D, stats: &RenderStats) {
        let Some(present_stats) = device.present_stats() else {
            return;
        };
        let refresh = present_stats.present_refresh_count;
        self.trace.missed =
            refresh.wrapping_sub(self.trace.sync_count) > 1 && self.trace.enter_line != 0;
        if self.trace.missed {
            stats.inc_missed_vblanks();
            tracing::debug!(
                refresh,
                last = self.trace.sync_count,
                enter_line = self.trace.enter_line,
                "missed retrace"
            );
        }
        self.trace.sync_count = refresh;
        tracing::trace!(
            frame = self.trace.sync_count,
            enter_line = self.trace.enter_line,
            exit_line = self.trace.exit_line,
            "vblank sync"
        );
    }
}
