// SPDX-License-Identifier: MPL-2.0

//! Integration tests for the effects pipeline

use camera_effects::backends::engine::{EngineFrame, SoftwareEngine};
use camera_effects::backends::surface::HeapAllocator;
use camera_effects::constants::PARAMETER_UNSET;
use camera_effects::testing::{CountingAllocator, EngineCall, RecordingEngine, StaticImageLoader};
use camera_effects::{
    BackgroundMode, Config, EffectKind, EffectsPipeline, FrameView, OwnedFrame, PipelineError, PixelFormat,
};

const RED: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];
const MARKER: [u8; 4] = [0x10, 0x20, 0x30, 0xFF];

#[test]
fn test_blur_scenario_full_hd() {
    let (width, height) = (1920, 1080);
    let (engine, log) = RecordingEngine::new();
    let marker = OwnedFrame::solid_bgra(width, height, MARKER);
    let engine = engine.with_marker(EngineFrame::from_vec(
        marker.data.clone(),
        width,
        height,
        width * 4,
        PixelFormat::Bgra32,
    ));
    let (allocator, counter) = CountingAllocator::new();

    let pipeline = EffectsPipeline::with_collaborators(
        width,
        height,
        Box::new(engine),
        Box::new(StaticImageLoader::solid(width, height)),
        &allocator,
    )
    .unwrap();

    assert!(pipeline.set_blur(0.8).unwrap());
    let state = pipeline.effect_state();
    assert!(state.is_enabled(EffectKind::Blur));
    assert_eq!(state.blur_power(), 0.8);

    let input = OwnedFrame::solid_bgra(width, height, RED);
    let view = pipeline.process(input.as_view()).unwrap();

    assert_eq!(view.width(), width);
    assert_eq!(view.height(), height);
    assert_eq!(view.stride(), width * 4);
    assert_eq!(view.format(), PixelFormat::Bgra32);
    assert!(view.pixels().chunks_exact(4).all(|px| px == MARKER));
    assert_eq!(log.calls()[0], EngineCall::EnableBlur(0.8));

    drop(view);
    pipeline.destroy();
    assert_eq!(log.count(|c| matches!(c, EngineCall::DisableBlur)), 1);
    assert_eq!(counter.live(), 0);
    assert_eq!(counter.total(), 2);
}

#[test]
fn test_background_rejection_leaves_state_unchanged() {
    let (mut engine, log) = RecordingEngine::new();
    engine.reject_background(5);
    let pipeline = EffectsPipeline::with_collaborators(
        8,
        8,
        Box::new(engine),
        Box::new(StaticImageLoader::solid(8, 8)),
        &HeapAllocator,
    )
    .unwrap();

    let err = pipeline.set_background_color(0xFF00FF00).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::BackgroundEnableFailure { code: 5, .. }
    ));
    assert!(!pipeline.any_effect_active());
    assert_eq!(pipeline.effect_state().background(), &BackgroundMode::None);
    assert_eq!(log.count(|c| matches!(c, EngineCall::SetBackground)), 0);

    // Other effects still work
    assert!(pipeline.set_beautification(0.5).unwrap());
}

#[test]
fn test_background_image_load_failure() {
    let (engine, log) = RecordingEngine::new();
    let pipeline = EffectsPipeline::with_collaborators(
        8,
        8,
        Box::new(engine),
        Box::new(StaticImageLoader::failing()),
        &HeapAllocator,
    )
    .unwrap();

    assert!(matches!(
        pipeline.set_background_image("/nonexistent/background.png"),
        Err(PipelineError::BackgroundLoadFailure(_))
    ));
    assert_eq!(
        log.count(|c| matches!(c, EngineCall::EnableReplaceBackground)),
        0
    );
    assert!(!pipeline.effect_state().is_enabled(EffectKind::Background));
}

#[test]
fn test_config_controls_background_fitting() {
    let path = std::env::temp_dir().join(format!("bg-{}.png", uuid::Uuid::new_v4()));
    image::RgbaImage::from_pixel(8, 8, image::Rgba([10, 20, 30, 255]))
        .save(&path)
        .unwrap();

    let strict = EffectsPipeline::from_config(&Config {
        width: 4,
        height: 4,
        fit_background: false,
        ..Config::default()
    })
    .unwrap();
    let strict_result = strict.set_background_image(&path);

    // Fitted content reaches the engine, which has no segmentation
    let fitted = EffectsPipeline::from_config(&Config {
        width: 4,
        height: 4,
        ..Config::default()
    })
    .unwrap();
    let fitted_result = fitted.set_background_image(&path);
    std::fs::remove_file(&path).ok();

    assert!(matches!(
        strict_result,
        Err(PipelineError::BackgroundLoadFailure(_))
    ));
    assert!(matches!(
        fitted_result,
        Err(PipelineError::BackgroundEnableFailure { .. })
    ));
}

#[test]
fn test_software_engine_end_to_end() {
    let pipeline = EffectsPipeline::new(16, 16).unwrap();

    // A single bright pixel spreads once blur is on
    let mut input = OwnedFrame::solid_bgra(16, 16, [0, 0, 0, 255]);
    let center = (8 * 16 + 8) * 4;
    input.data[center..center + 3].copy_from_slice(&[255, 255, 255]);

    let plain = pipeline.process(input.as_view()).unwrap().to_vec();
    assert_eq!(plain, input.data);

    // Radius 1: each pass divides the spike by three
    pipeline.set_blur(0.05).unwrap();
    let blurred = pipeline.process(input.as_view()).unwrap().to_vec();
    assert_eq!(blurred[center], 28);
    assert_eq!(blurred[center + 4], 28);
    assert!(blurred.chunks_exact(4).all(|px| px[3] == 255));

    pipeline.clear_blur();
    assert_eq!(pipeline.effect_state().blur_power(), PARAMETER_UNSET);
    let restored = pipeline.process(input.as_view()).unwrap().to_vec();
    assert_eq!(restored, input.data);
}

#[test]
fn test_software_engine_rejects_background() {
    let pipeline = EffectsPipeline::with_collaborators(
        4,
        4,
        Box::new(SoftwareEngine::new()),
        Box::new(StaticImageLoader::solid(4, 4)),
        &HeapAllocator,
    )
    .unwrap();

    assert!(matches!(
        pipeline.set_background_color(0xFF000000),
        Err(PipelineError::BackgroundEnableFailure { .. })
    ));
    assert!(!pipeline.any_effect_active());
}

#[test]
fn test_previous_output_survives_next_frame() {
    let pipeline = EffectsPipeline::new(4, 4).unwrap();
    let first = OwnedFrame::solid_bgra(4, 4, [1, 2, 3, 4]);
    let second = OwnedFrame::solid_bgra(4, 4, [5, 6, 7, 8]);

    let a = pipeline.process(first.as_view()).unwrap();
    let b = pipeline.process(second.as_view()).unwrap();

    // Double buffering keeps the previous frame intact
    assert!(a.is_current());
    assert_eq!(a.to_vec(), first.data);
    assert_eq!(b.to_vec(), second.data);
    assert_ne!(a.shared_handle(), b.shared_handle());

    // A third frame reuses the first buffer
    let third = OwnedFrame::solid_bgra(4, 4, [9; 4]);
    pipeline.process(third.as_view()).unwrap();
    assert!(!a.is_current());
    assert!(b.is_current());
}

#[test]
fn test_rejects_mismatched_input() {
    let pipeline = EffectsPipeline::new(4, 4).unwrap();
    let data = vec![0u8; 4 * 4 * 4];

    assert!(matches!(
        pipeline.process(FrameView::bgra(&data, 2, 8)),
        Err(PipelineError::FrameIngestFailure(_))
    ));
    assert_eq!(pipeline.stats().frames_failed, 1);
    assert!(pipeline.process(FrameView::bgra(&data, 4, 4)).is_ok());
}

#[cfg(target_os = "linux")]
#[test]
fn test_memfd_surfaces_end_to_end() {
    use camera_effects::backends::surface::{MemfdAllocator, SharedHandle};

    let pipeline = EffectsPipeline::with_collaborators(
        8,
        4,
        Box::new(SoftwareEngine::new()),
        Box::new(StaticImageLoader::solid(8, 4)),
        &MemfdAllocator,
    )
    .unwrap();

    let first = OwnedFrame::solid_bgra(8, 4, [10, 20, 30, 255]);
    let a = pipeline.process(first.as_view()).unwrap();
    assert_eq!(a.stride(), 8 * 4);
    assert_eq!(a.to_vec(), first.data);
    assert!(matches!(a.shared_handle(), SharedHandle::Fd(fd) if fd >= 0));

    // Uniform input stays uniform under blur
    pipeline.set_blur(0.1).unwrap();
    let second = OwnedFrame::solid_bgra(8, 4, [40, 50, 60, 255]);
    let b = pipeline.process(second.as_view()).unwrap();
    assert_eq!(b.to_vec(), second.data);
    assert_ne!(a.shared_handle(), b.shared_handle());

    // Both mappings keep their own frame
    assert_eq!(a.to_vec(), first.data);
    pipeline.destroy();
    assert_eq!(b.to_vec(), second.data);
}
