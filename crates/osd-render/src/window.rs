use bitflags::bitflags;

use crate::device::WindowHandle;
use crate::primitive::PrimitiveList;

/// Window resize progress as tracked by the windowing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeState {
    Normal,
    /// The user is dragging; the renderer leaves the device alone.
    Resizing,
    /// The drag finished; the renderer picks up the new size on its next check.
    Pending,
}

bitflags! {
    /// Orientation of a render target or of the emulated system's screen.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Orientation: u32 {
        const FLIP_X = 0x1;
        const FLIP_Y = 0x2;
        const SWAP_XY = 0x4;
    }
}

impl Orientation {
    pub const ROT0: Orientation = Orientation::empty();
    pub const ROT90: Orientation = Orientation::SWAP_XY.union(Orientation::FLIP_X);
    pub const ROT180: Orientation = Orientation::FLIP_X.union(Orientation::FLIP_Y);
    pub const ROT270: Orientation = Orientation::SWAP_XY.union(Orientation::FLIP_Y);

    pub fn swaps_xy(self) -> bool {
        self.contains(Orientation::SWAP_XY)
    }
}

/// Timing of the video mode chosen by the resolution switcher.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Modeline {
    pub width: u32,
    pub height: u32,
    pub refresh: u32,
    /// Total lines per frame including blanking; zero when unknown.
    pub vtotal: u32,
    pub vactive: u32,
    /// First line of vertical blanking.
    pub vbegin: u32,
    pub interlace: bool,
    /// Vertical scale factor applied to the emulated screen.
    pub v_scale: f32,
}

/// What the renderer needs to know about the window it draws into.
pub trait RenderWindow {
    fn handle(&self) -> WindowHandle;
    /// Client area, excluding any menu bar.
    fn client_size(&self) -> (u32, u32);
    fn is_fullscreen(&self) -> bool;
    fn has_menu(&self) -> bool;
    fn resize_state(&self) -> ResizeState;
    fn set_resize_state(&mut self, state: ResizeState);
    /// Requested integer prescale for screen textures.
    fn prescale(&self) -> u32;
    fn target_orientation(&self) -> Orientation;
    /// Orientation of the emulated system's screen.
    fn native_orientation(&self) -> Orientation;
    /// Mode picked by the resolution switcher, if one is active.
    fn modeline(&self) -> Option<Modeline>;
    fn primitives(&self) -> &PrimitiveList;
}
