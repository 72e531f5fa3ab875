mod common;

use std::sync::Arc;

use osd_render::device::{CooperativeLevel, DeviceCaps, PresentationIntervals, VertexFormat};
use osd_render::geometry::Bounds;
use osd_render::primitive::BlendMode;
use osd_render::sim::{DeviceCall, RecordingPostProcessor, SimulatedAdapter};
use osd_render::{
    DeviceState, ErrorClass, FrameOutcome, MissingCap, RenderConfig, RenderError, Renderer,
    ResizeState,
};
use pretty_assertions::assert_eq;

use common::{
    grey_palette, indexed_image, init_tracing, palette16_flags, plain_quad, ready_renderer,
    textured_quad, TestWindow,
};

fn textured_frame(window: &TestWindow, pixels: &Arc<[u16]>) {
    window.show(vec![textured_quad(
        Bounds::new(0.0, 0.0, 8.0, 8.0),
        indexed_image(pixels, 4, 4, grey_palette(), 0),
        palette16_flags(BlendMode::Alpha),
    )]);
}

#[test]
fn lost_device_recovers_after_reset() {
    init_tracing();
    let mut window = TestWindow::windowed(640, 480);
    let mut r = ready_renderer(SimulatedAdapter::new(), RenderConfig::default(), &mut window);
    let pixels: Arc<[u16]> = vec![1u16; 16].into();
    textured_frame(&window, &pixels);
    assert_eq!(r.draw(&mut window), FrameOutcome::Presented);
    assert_eq!(r.adapter().live_textures(), 2);

    r.device_mut()
        .unwrap()
        .push_cooperative_level(CooperativeLevel::Lost);
    assert_eq!(r.draw(&mut window), FrameOutcome::Fallback);
    assert_eq!(r.lifecycle_state(), DeviceState::Lost);

    r.device_mut()
        .unwrap()
        .push_cooperative_level(CooperativeLevel::NotReset);
    r.device_mut().unwrap().take_calls();
    assert_eq!(r.draw(&mut window), FrameOutcome::Presented);
    assert_eq!(r.lifecycle_state(), DeviceState::Ready);

    // The cache was rebuilt: default texture plus the re-uploaded image.
    let device = r.device_mut().unwrap();
    assert_eq!(device.count_calls(|c| *c == DeviceCall::Reset), 1);
    assert_eq!(
        device.count_calls(|c| matches!(c, DeviceCall::CreateTexture(..))),
        2
    );
    assert_eq!(r.adapter().live_textures(), 2);
    assert_eq!(r.stats().device_resets, 1);
    assert_eq!(r.stats().frames_fallback, 1);
}

#[test]
fn missing_caps_fail_full_screen_initialization() {
    let caps = DeviceCaps {
        presentation_intervals: PresentationIntervals {
            immediate: true,
            one: false,
        },
        can_render_after_flip: false,
        ..SimulatedAdapter::default_caps()
    };
    let mut window = TestWindow::fullscreen(1024, 768);
    let mut r = Renderer::new(
        SimulatedAdapter::new().with_caps(caps),
        RenderConfig::default(),
    )
    .unwrap();

    let err = r.initialize(&mut window).unwrap_err();
    assert_eq!(
        err,
        RenderError::UnsupportedCaps(vec![
            MissingCap::PerRefreshPresentation,
            MissingCap::RenderAfterFlip,
        ])
    );
    assert_eq!(err.class(), ErrorClass::Fatal);
    assert_eq!(r.draw(&mut window), FrameOutcome::Fallback);
    assert_eq!(r.adapter().devices_created(), 0);
}

#[test]
fn window_resize_is_deferred_until_the_drag_ends() {
    let mut window = TestWindow::windowed(640, 480);
    let mut r = ready_renderer(SimulatedAdapter::new(), RenderConfig::default(), &mut window);
    window.show(vec![plain_quad(0.0, 0.0, 10.0, 10.0)]);

    window.resize = ResizeState::Resizing;
    window.size = (800, 500);
    assert_eq!(r.draw(&mut window), FrameOutcome::Skipped);
    assert_eq!(r.adapter().devices_created(), 1);

    window.resize = ResizeState::Pending;
    assert_eq!(r.draw(&mut window), FrameOutcome::Skipped);
    assert_eq!(window.resize, ResizeState::Normal);
    assert_eq!(r.adapter().devices_created(), 2);
    assert_eq!(r.device().unwrap().params().back_buffer_width, 800);

    assert_eq!(r.draw(&mut window), FrameOutcome::Presented);
    assert_eq!(r.stats().frames_skipped, 2);
}

#[test]
fn toggling_post_processing_between_frames() {
    let postfx = RecordingPostProcessor::new(false);
    let mut window = TestWindow::windowed(640, 480);
    let mut r = Renderer::new(SimulatedAdapter::new(), RenderConfig::default())
        .unwrap()
        .with_post_processor(Box::new(postfx.clone()));
    r.initialize(&mut window).unwrap();
    window.show(vec![plain_quad(0.0, 0.0, 10.0, 10.0)]);
    r.draw(&mut window);
    assert_eq!(r.draw(&mut window), FrameOutcome::Presented);
    assert_eq!(r.device_mut().unwrap().take_draws().len(), 1);

    r.request_post_processing_toggle();
    assert_eq!(r.draw(&mut window), FrameOutcome::Presented);

    assert!(postfx.is_enabled());
    assert_eq!(
        r.context().unwrap().vertex_format(),
        Some(VertexFormat::Homogeneous)
    );
    // The post-processor composes the frame; nothing is drawn directly.
    assert!(r.device_mut().unwrap().take_draws().is_empty());
}

#[test]
fn post_processing_that_cannot_start_is_switched_off() {
    let postfx = RecordingPostProcessor::new(false);
    let mut window = TestWindow::windowed(640, 480);
    let mut r = Renderer::new(SimulatedAdapter::new(), RenderConfig::default())
        .unwrap()
        .with_post_processor(Box::new(postfx.clone()));
    r.initialize(&mut window).unwrap();
    r.draw(&mut window);

    postfx.fail_resource_creates(1);
    r.request_post_processing_toggle();
    assert_eq!(r.draw(&mut window), FrameOutcome::Presented);

    assert!(!r.capabilities().post_fx_available);
    assert!(!r.post_processing_enabled());
    assert_eq!(r.lifecycle_state(), DeviceState::Ready);
    assert_eq!(
        r.context().unwrap().vertex_format(),
        Some(VertexFormat::PreTransformed)
    );
}

#[test]
fn teardown_releases_every_texture() {
    let mut window = TestWindow::windowed(640, 480);
    let mut r = ready_renderer(SimulatedAdapter::new(), RenderConfig::default(), &mut window);
    let pixels: Arc<[u16]> = vec![2u16; 16].into();
    textured_frame(&window, &pixels);
    r.draw(&mut window);
    assert_eq!(r.adapter().live_textures(), 2);

    r.device_flush();
    r.device_delete();

    assert_eq!(r.adapter().live_textures(), 0);
    assert_eq!(r.texture_count(), 0);
}
