//! Shared helpers for `osd-render` integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use osd_render::device::WindowHandle;
use osd_render::geometry::{Bounds, Color};
use osd_render::primitive::{
    BlendMode, ImageDescriptor, PixelBuffer, PrimFlags, Primitive, PrimitiveList, TexCoords,
    TexFormat,
};
use osd_render::sim::SimulatedAdapter;
use osd_render::{
    FrameCheck, Modeline, Orientation, RenderConfig, RenderWindow, Renderer, ResizeState,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub struct TestWindow {
    pub size: (u32, u32),
    pub fullscreen: bool,
    pub menu: bool,
    pub resize: ResizeState,
    pub prescale: u32,
    pub native: Orientation,
    pub target: Orientation,
    pub modeline: Option<Modeline>,
    pub prims: PrimitiveList,
}

impl TestWindow {
    pub fn windowed(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            fullscreen: false,
            menu: false,
            resize: ResizeState::Normal,
            prescale: 1,
            native: Orientation::ROT0,
            target: Orientation::ROT0,
            modeline: None,
            prims: PrimitiveList::new(),
        }
    }

    pub fn fullscreen(width: u32, height: u32) -> Self {
        Self {
            fullscreen: true,
            ..Self::windowed(width, height)
        }
    }

    pub fn show(&self, prims: Vec<Primitive>) {
        self.prims.replace(prims);
    }
}

impl RenderWindow for TestWindow {
    fn handle(&self) -> WindowHandle {
        WindowHandle(0x1000)
    }

    fn client_size(&self) -> (u32, u32) {
        self.size
    }

    fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    fn has_menu(&self) -> bool {
        self.menu
    }

    fn resize_state(&self) -> ResizeState {
        self.resize
    }

    fn set_resize_state(&mut self, state: ResizeState) {
        self.resize = state;
    }

    fn prescale(&self) -> u32 {
        self.prescale
    }

    fn target_orientation(&self) -> Orientation {
        self.target
    }

    fn native_orientation(&self) -> Orientation {
        self.native
    }

    fn modeline(&self) -> Option<Modeline> {
        self.modeline
    }

    fn primitives(&self) -> &PrimitiveList {
        &self.prims
    }
}

/// Renderer whose device already exists, with the creation call log cleared.
pub fn ready_renderer(
    adapter: SimulatedAdapter,
    config: RenderConfig,
    window: &mut TestWindow,
) -> Renderer<SimulatedAdapter> {
    let mut renderer = Renderer::new(adapter, config).expect("valid config");
    renderer.initialize(window).expect("initialize");
    if renderer.device().is_none() {
        assert_eq!(renderer.per_frame_check(window), FrameCheck::SkipFrame);
    }
    let device = renderer.device_mut().expect("device");
    device.take_calls();
    device.take_draws();
    renderer
}

/// Grey ramp palette: index `i` maps to `0x00iiiiii`.
pub fn grey_palette() -> Arc<[u32]> {
    (0..0x300u32)
        .map(|i| {
            let v = i & 0xff;
            (v << 16) | (v << 8) | v
        })
        .collect::<Vec<_>>()
        .into()
}

pub fn indexed_image(
    pixels: &Arc<[u16]>,
    width: u32,
    height: u32,
    palette: Arc<[u32]>,
    seq_id: u32,
) -> ImageDescriptor {
    ImageDescriptor {
        pixels: PixelBuffer::Bits16(pixels.clone()),
        row_pixels: width,
        width,
        height,
        palette: Some(palette),
        seq_id,
        unique_id: ImageDescriptor::make_unique_id(0, 0, 1),
    }
}

pub fn rgb_image(width: u32, height: u32) -> ImageDescriptor {
    let pixels: Arc<[u32]> = vec![0x0020_4080u32; (width * height) as usize].into();
    ImageDescriptor {
        pixels: PixelBuffer::Bits32(pixels),
        row_pixels: width,
        width,
        height,
        palette: None,
        seq_id: 0,
        unique_id: ImageDescriptor::make_unique_id(0, 0, 2),
    }
}

pub fn textured_quad(bounds: Bounds, image: ImageDescriptor, flags: PrimFlags) -> Primitive {
    Primitive::quad(bounds, Color::WHITE, flags).with_texture(image, TexCoords::default())
}

pub fn plain_quad(x0: f32, y0: f32, x1: f32, y1: f32) -> Primitive {
    Primitive::quad(
        Bounds::new(x0, y0, x1, y1),
        Color::WHITE,
        PrimFlags::empty().with_blend_mode(BlendMode::Alpha),
    )
}

pub fn vector_line(x0: f32, y0: f32, x1: f32, y1: f32) -> Primitive {
    Primitive::line(
        Bounds::new(x0, y0, x1, y1),
        1.0,
        Color::new(0.2, 1.0, 0.2, 1.0),
        PrimFlags::VECTOR.with_blend_mode(BlendMode::Add),
    )
}

pub fn vector_buffer_quad(width: f32, height: f32) -> Primitive {
    Primitive::quad(
        Bounds::new(0.0, 0.0, width, height),
        Color::WHITE,
        PrimFlags::VECTORBUF.with_blend_mode(BlendMode::Add),
    )
}

pub fn palette16_flags(blend: BlendMode) -> PrimFlags {
    PrimFlags::empty()
        .with_blend_mode(blend)
        .with_tex_format(TexFormat::Palette16)
}
