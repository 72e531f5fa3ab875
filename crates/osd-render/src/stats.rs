use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of [`RenderStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStatsSnapshot {
    pub frames_presented: u64,
    pub frames_skipped: u64,
    pub frames_fallback: u64,
    pub draw_calls: u64,
    pub vertices_drawn: u64,
    pub implicit_flushes: u64,
    pub dropped_allocations: u64,
    pub state_changes_applied: u64,
    pub state_changes_suppressed: u64,
    pub textures_created: u64,
    pub textures_updated: u64,
    pub prescale_blits: u64,
    pub device_creates: u64,
    pub create_retries: u64,
    pub device_resets: u64,
    pub missed_vblanks: u64,
    pub device_call_failures: u64,
}

/// Counters for the render thread.
///
/// Cheap to update from the render loop and safe to read from another thread.
#[derive(Debug, Default)]
pub struct RenderStats {
    frames_presented: AtomicU64,
    frames_skipped: AtomicU64,
    frames_fallback: AtomicU64,
    draw_calls: AtomicU64,
    vertices_drawn: AtomicU64,
    implicit_flushes: AtomicU64,
    dropped_allocations: AtomicU64,
    state_changes_applied: AtomicU64,
    state_changes_suppressed: AtomicU64,
    textures_created: AtomicU64,
    textures_updated: AtomicU64,
    prescale_blits: AtomicU64,
    device_creates: AtomicU64,
    create_retries: AtomicU64,
    device_resets: AtomicU64,
    missed_vblanks: AtomicU64,
    device_call_failures: AtomicU64,
}

impl RenderStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_frames_presented(&self) {
        self.frames_presented.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_frames_skipped(&self) {
        self.frames_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_frames_fallback(&self) {
        self.frames_fallback.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_draw(&self, vertices: u64) {
        self.draw_calls.fetch_add(1, Ordering::Relaxed);
        self.vertices_drawn.fetch_add(vertices, Ordering::Relaxed);
    }

    pub fn inc_implicit_flushes(&self) {
        self.implicit_flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dropped_allocations(&self) {
        self.dropped_allocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_state_changes_applied(&self) {
        self.state_changes_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_state_changes_suppressed(&self) {
        self.state_changes_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_textures_created(&self) {
        self.textures_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_textures_updated(&self) {
        self.textures_updated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_prescale_blits(&self) {
        self.prescale_blits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_device_creates(&self) {
        self.device_creates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_create_retries(&self) {
        self.create_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_device_resets(&self) {
        self.device_resets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_missed_vblanks(&self) {
        self.missed_vblanks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_device_call_failures(&self) {
        self.device_call_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RenderStatsSnapshot {
        RenderStatsSnapshot {
            frames_presented: self.frames_presented.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            frames_fallback: self.frames_fallback.load(Ordering::Relaxed),
            draw_calls: self.draw_calls.load(Ordering::Relaxed),
            vertices_drawn: self.vertices_drawn.load(Ordering::Relaxed),
            implicit_flushes: self.implicit_flushes.load(Ordering::Relaxed),
            dropped_allocations: self.dropped_allocations.load(Ordering::Relaxed),
            state_changes_applied: self.state_changes_applied.load(Ordering::Relaxed),
            state_changes_suppressed: self.state_changes_suppressed.load(Ordering::Relaxed),
            textures_created: self.textures_created.load(Ordering::Relaxed),
            textures_updated: self.textures_updated.load(Ordering::Relaxed),
            prescale_blits: self.prescale_blits.load(Ordering::Relaxed),
            device_creates: self.device_creates.load(Ordering::Relaxed),
            create_retries: self.create_retries.load(Ordering::Relaxed),
            device_resets: self.device_resets.load(Ordering::Relaxed),
            missed_vblanks: self.missed_vblanks.load(Ordering::Relaxed),
            device_call_failures: self.device_call_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_increments() {
        let stats = RenderStats::new();
        stats.add_draw(4);
        stats.add_draw(30);
        stats.inc_implicit_flushes();
        stats.inc_missed_vblanks();

        let snap = stats.snapshot();
        assert_eq!(snap.draw_calls, 2);
        assert_eq!(snap.vertices_drawn, 34);
        assert_eq!(snap.implicit_flushes, 1);
        assert_eq!(snap.missed_vblanks, 1);
        assert_eq!(snap.frames_presented, 0);
    }
}
