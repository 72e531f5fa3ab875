//! Shared helpers for `osd-render-wgpu` integration tests.

#![allow(dead_code)]

use osd_render::device::WindowHandle;
use osd_render::primitive::{Primitive, PrimitiveList};
use osd_render::{Modeline, Orientation, RenderWindow, ResizeState};
use osd_render_wgpu::{WgpuAdapter, WgpuBackendError};

pub fn require_gpu() -> bool {
    let Ok(raw) = std::env::var("OSD_RENDER_REQUIRE_GPU") else {
        return false;
    };

    let v = raw.trim();
    v == "1"
        || v.eq_ignore_ascii_case("true")
        || v.eq_ignore_ascii_case("yes")
        || v.eq_ignore_ascii_case("on")
}

pub fn skip_or_panic(test_name: &str, reason: &str) {
    if require_gpu() {
        panic!("OSD_RENDER_REQUIRE_GPU is enabled but {test_name} cannot run: {reason}");
    }
    eprintln!("skipping {test_name}: {reason}");
}

pub fn headless_adapter(test_name: &str) -> Option<WgpuAdapter> {
    match pollster::block_on(WgpuAdapter::new_headless()) {
        Ok(adapter) => Some(adapter),
        Err(WgpuBackendError::AdapterNotFound) => {
            skip_or_panic(test_name, "wgpu adapter not found");
            None
        }
        Err(err) => panic!("failed to create adapter: {err}"),
    }
}

pub struct HeadlessWindow {
    pub size: (u32, u32),
    pub resize: ResizeState,
    pub prims: PrimitiveList,
}

impl HeadlessWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            resize: ResizeState::Normal,
            prims: PrimitiveList::new(),
        }
    }

    pub fn show(&self, prims: Vec<Primitive>) {
        self.prims.replace(prims);
    }
}

impl RenderWindow for HeadlessWindow {
    fn handle(&self) -> WindowHandle {
        WindowHandle(0)
    }

    fn client_size(&self) -> (u32, u32) {
        self.size
    }

    fn is_fullscreen(&self) -> bool {
        false
    }

    fn has_menu(&self) -> bool {
        false
    }

    fn resize_state(&self) -> ResizeState {
        self.resize
    }

    fn set_resize_state(&mut self, state: ResizeState) {
        self.resize = state;
    }

    fn prescale(&self) -> u32 {
        1
    }

    fn target_orientation(&self) -> Orientation {
        Orientation::ROT0
    }

    fn native_orientation(&self) -> Orientation {
        Orientation::ROT0
    }

    fn modeline(&self) -> Option<Modeline> {
        None
    }

    fn primitives(&self) -> &PrimitiveList {
        &self.prims
    }
}
