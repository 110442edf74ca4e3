mod common;

use std::sync::Arc;
use std::time::Duration;

use montage_core::hash::FrameHasher;
use montage_core::{Color, Filter, FrameBuffer, FrameSink, MontageError, Size2D, TimeRange};
use montage_encode::MemorySink;
use montage_ir::{Clip, ClipBuilder, EditorState, SourceRef, TextOverlay, TimelineSnapshot};
use montage_render::effects::{apply_exposure, apply_filter};
use montage_render::transform::{layer_matrix, warp};
use montage_render::{
    spawn_export, EngineState, ExportDriver, ExportProgress, ExportSettings, ExportStage,
    PreviewEngine, RebuildOutcome,
};

use common::{compositor, rgba, SolidSource};

fn settings(fps: f64) -> ExportSettings {
    ExportSettings {
        fps,
        fallback_canvas: Size2D::new(32.0, 18.0),
    }
}

fn media() -> SolidSource {
    SolidSource::new()
        .with("red.mp4", Color::RED, 32.0, 18.0)
        .with("blue.mp4", Color::BLUE, 16.0, 16.0)
        .with_audio("talk.mp4", Color::GREEN, 32.0, 18.0)
        .with("slow/a.mp4", Color::WHITE, 32.0, 18.0)
}

fn two_clip_snapshot() -> TimelineSnapshot {
    TimelineSnapshot {
        revision: 7,
        clips: vec![
            ClipBuilder::new("red.mp4", 2.0).rotation(10.0).build(),
            ClipBuilder::new("blue.mp4", 1.0).place(0.5, 1).scale(0.5).offset(4.0, 2.0).build(),
        ],
        overlays: vec![TextOverlay::new("title", 0.2, 1.4).with_color(Color::WHITE)],
    }
}

#[test]
fn test_frame_count_and_timestamps() {
    let snapshot = TimelineSnapshot {
        revision: 1,
        clips: vec![Clip::new(SourceRef::new("red.mp4"), 1.01)],
        overlays: vec![],
    };
    let driver = ExportDriver::new(compositor(media()), settings(30.0));
    let mut sink = MemorySink::new();
    let report = driver.run(&snapshot, &mut sink).unwrap();

    assert_eq!(report.frames_written, 31);
    assert_eq!(sink.len(), 31);
    assert!(sink.is_finished());
    for (k, (pts, frame)) in sink.frames.iter().enumerate() {
        assert_eq!(pts.as_seconds(), k as f64 / 30.0);
        assert_eq!((frame.width, frame.height), (32, 18));
    }
}

#[test]
fn test_text_present_exactly_on_frames_inside_its_window() {
    let snapshot = TimelineSnapshot {
        revision: 1,
        clips: vec![Clip::new(SourceRef::new("red.mp4"), 5.0)],
        overlays: vec![TextOverlay::new("Hi", 1.0, 4.0)
            .with_color(Color::WHITE)
            .with_position(0.5, 0.5)],
    };
    let driver = ExportDriver::new(compositor(media()), settings(10.0));
    let mut sink = MemorySink::new();
    driver.run(&snapshot, &mut sink).unwrap();
    assert_eq!(sink.len(), 50);

    let mut shown = Vec::new();
    for (k, (pts, frame)) in sink.frames.iter().enumerate() {
        let t = pts.as_seconds();
        let inside = (1.0..4.0).contains(&t);
        let expected = if inside { Color::WHITE } else { Color::RED };
        assert_eq!(frame.get_pixel(16, 9), Some(rgba(expected)), "frame {} at {}s", k, t);
        if inside {
            shown.push(k);
        }
    }
    assert_eq!(shown.first(), Some(&10));
    assert_eq!(shown.last(), Some(&39));
    assert_eq!(shown.len(), 30);
}

#[test]
fn test_transform_order_holds_on_every_exported_frame() {
    let base = Color::rgb(100.0 / 255.0, 50.0 / 255.0, 25.0 / 255.0);
    let source = SolidSource::new().with("clip.mp4", base, 320.0, 180.0);
    let clip = ClipBuilder::new("clip.mp4", 4.0)
        .offset(100.0, 0.0)
        .scale(2.0)
        .rotation(45.0)
        .exposure(1.0)
        .filter(Filter::Sepia, 0.5)
        .build();

    // Orientation, fit, rotate and scale, offset, exposure, filter, crop,
    // composite over black.
    let canvas = Size2D::new(320.0, 180.0);
    let matrix = layer_matrix(canvas, None, canvas, &clip.transform);
    let mut layer = warp(&FrameBuffer::solid(320, 180, &base), &matrix, 320, 180);
    apply_exposure(&mut layer, 1.0);
    let filtered = apply_filter(layer, Filter::Sepia, 0.5);
    let mut expected = FrameBuffer::solid(320, 180, &Color::BLACK);
    expected.composite_over(&filtered.image.crop(0, 0, 320, 180), 0, 0);
    assert_eq!(expected.get_pixel(260, 90), Some([182, 123, 82, 255]));

    let snapshot = TimelineSnapshot {
        revision: 1,
        clips: vec![clip],
        overlays: vec![],
    };
    let driver = ExportDriver::new(compositor(source), settings(6.0));
    let mut sink = MemorySink::new();
    driver.run(&snapshot, &mut sink).unwrap();

    assert_eq!(sink.len(), 24);
    for (pts, frame) in &sink.frames {
        assert!(*frame == expected, "frame at {}s", pts.as_seconds());
    }
}

#[tokio::test]
async fn test_export_matches_preview() {
    let snapshot = Arc::new(two_clip_snapshot());
    let compositor = compositor(media());

    let driver = ExportDriver::new(compositor.clone(), settings(10.0));
    let mut sink = MemorySink::new();
    let report = driver.run(&snapshot, &mut sink).unwrap();
    assert_eq!(report.frames_written, 20);

    let engine = PreviewEngine::new(compositor, Size2D::new(32.0, 18.0), 2);
    engine.rebuild(snapshot).await.unwrap();

    let mut hasher = FrameHasher::new();
    for (k, (_, exported)) in sink.frames.iter().enumerate() {
        let previewed = engine.render_at(k as f64 / 10.0).await.unwrap();
        assert_eq!(&previewed.image, exported, "frame {}", k);
        hasher.update(&previewed.image);
    }
    assert_eq!(hasher.finish().to_hex(), report.content_hash);
}

#[test]
fn test_export_is_deterministic() {
    let snapshot = two_clip_snapshot();
    let driver = ExportDriver::new(compositor(media()), settings(24.0));
    let first = driver.run(&snapshot, &mut MemorySink::new()).unwrap();
    let second = driver.run(&snapshot, &mut MemorySink::new()).unwrap();
    assert_eq!(first.content_hash, second.content_hash);
}

#[test]
fn test_config_errors_before_any_output() {
    let driver = ExportDriver::new(compositor(media()), settings(30.0));
    let mut sink = MemorySink::new();
    let empty = TimelineSnapshot::default();
    assert!(matches!(driver.run(&empty, &mut sink), Err(MontageError::Config(_))));

    let bad_fps = ExportDriver::new(compositor(media()), settings(0.0));
    assert!(matches!(
        bad_fps.run(&two_clip_snapshot(), &mut sink),
        Err(MontageError::Config(_))
    ));

    let zero_length = TimelineSnapshot {
        revision: 1,
        clips: vec![Clip::new(SourceRef::new("red.mp4"), 2.0).trimmed(1.0, 1.0)],
        overlays: vec![],
    };
    assert!(matches!(driver.run(&zero_length, &mut sink), Err(MontageError::Config(_))));

    assert!(sink.is_empty());
    assert!(!sink.is_finished());
}

#[test]
fn test_closed_sink_fails_export() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let driver = ExportDriver::new(compositor(media()), settings(10.0)).with_progress(tx);
    let mut sink = MemorySink::new().fail_after(3);

    let err = driver.run(&two_clip_snapshot(), &mut sink).unwrap_err();
    assert!(matches!(err, MontageError::Sink(_)));
    assert_eq!(sink.len(), 3);
    assert!(!sink.is_finished());

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    let last = events.last().unwrap();
    assert_eq!(last.stage, ExportStage::Failed);
    assert_eq!(last.frames_rendered, 3);
}

#[test]
fn test_progress_is_monotonic_and_completes() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let driver = ExportDriver::new(compositor(media()), settings(10.0)).with_progress(tx);
    driver.run(&two_clip_snapshot(), &mut MemorySink::new()).unwrap();

    let mut events: Vec<ExportProgress> = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(events.first().unwrap().stage, ExportStage::Preparing);
    for pair in events.windows(2) {
        assert!(pair[1].fraction >= pair[0].fraction);
    }
    let last = events.last().unwrap();
    assert_eq!(last.stage, ExportStage::Complete);
    assert_eq!(last.fraction, 1.0);
    assert_eq!(last.frames_rendered, 20);
    assert_eq!(
        events.iter().filter(|e| e.stage == ExportStage::Rendering).count(),
        21
    );
}

#[test]
fn test_dropped_progress_receiver_is_ignored() {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    drop(rx);
    let driver = ExportDriver::new(compositor(media()), settings(5.0)).with_progress(tx);
    assert!(driver.run(&two_clip_snapshot(), &mut MemorySink::new()).is_ok());
}

#[test]
fn test_broken_source_degrades_per_layer() {
    let snapshot = TimelineSnapshot {
        revision: 1,
        clips: vec![
            Clip::new(SourceRef::new("red.mp4"), 1.0),
            Clip::new(SourceRef::new("broken/overlay.mp4"), 0.5).at(0.0, 1),
        ],
        overlays: vec![],
    };
    let driver = ExportDriver::new(compositor(media()), settings(10.0));
    let mut sink = MemorySink::new();
    let report = driver.run(&snapshot, &mut sink).unwrap();
    assert_eq!(report.frames_written, 10);
    assert_eq!(report.layers_skipped, 5);
    assert!(sink
        .frames
        .iter()
        .all(|(_, frame)| frame.get_pixel(16, 9) == Some(rgba(Color::RED))));
}

#[test]
fn test_audio_passthrough_in_timeline_order() {
    let snapshot = TimelineSnapshot {
        revision: 1,
        clips: vec![
            ClipBuilder::new("talk.mp4", 10.0).place(2.0, 0).trim(3.0, 4.0).audio(true).build(),
            Clip::new(SourceRef::new("red.mp4"), 2.0),
            ClipBuilder::new("talk.mp4", 10.0).place(0.5, 1).trim(0.0, 1.0).audio(true).build(),
        ],
        overlays: vec![],
    };
    let driver = ExportDriver::new(compositor(media()), settings(4.0));
    let mut sink = MemorySink::new().with_audio();
    let report = driver.run(&snapshot, &mut sink).unwrap();

    assert_eq!(report.audio_segments, 2);
    let segments = sink.segments();
    assert_eq!(segments[0].output_start, 0.5);
    assert_eq!(segments[0].source_range, TimeRange::new(0.0, 1.0));
    assert_eq!(segments[1].output_start, 2.0);
    assert_eq!(segments[1].source_range, TimeRange::new(3.0, 4.0));
}

#[tokio::test]
async fn test_spawned_export_uses_snapshot_taken_at_start() {
    let mut state = EditorState::new();
    let id = state.add_clip(Clip::new(SourceRef::new("red.mp4"), 2.0)).unwrap();
    let snapshot = state.snapshot();

    state.trim_clip(id, 0.0, 1.0).unwrap();
    assert_eq!(state.snapshot().duration(), 1.0);

    let driver = ExportDriver::new(compositor(media()), settings(5.0));
    let sink: Box<dyn FrameSink> = Box::new(MemorySink::new());
    let report = spawn_export(driver, snapshot, sink).await.unwrap().unwrap();
    assert_eq!(report.frames_written, 10);
    assert_eq!(report.duration, 2.0);
}

#[tokio::test]
async fn test_preview_before_first_rebuild() {
    let engine = PreviewEngine::new(compositor(media()), Size2D::new(32.0, 18.0), 2);
    assert_eq!(engine.state(), EngineState::Idle);
    assert!(matches!(engine.render_at(0.0).await, Err(MontageError::NothingToRender)));
}

#[tokio::test]
async fn test_failed_rebuild_does_not_leave_engine_rebuilding() {
    let engine = PreviewEngine::new(compositor(media()), Size2D::new(32.0, 18.0), 2);
    let crashing = Arc::new(TimelineSnapshot {
        revision: 3,
        clips: vec![Clip::new(SourceRef::new("panic/a.mp4"), 1.0)],
        overlays: vec![],
    });

    assert!(matches!(
        engine.rebuild(crashing.clone()).await,
        Err(MontageError::Render(_))
    ));
    assert_eq!(engine.state(), EngineState::Idle);

    engine.rebuild(Arc::new(two_clip_snapshot())).await.unwrap();
    assert!(engine.rebuild(crashing).await.is_err());
    assert_eq!(engine.state(), EngineState::Ready);
    assert_eq!(engine.current().revision(), 7);
    assert!(engine.render_at(1.0).await.is_ok());
}

#[tokio::test]
async fn test_preview_out_of_range() {
    let engine = PreviewEngine::new(compositor(media()), Size2D::new(32.0, 18.0), 2);
    engine.rebuild(Arc::new(two_clip_snapshot())).await.unwrap();
    assert_eq!(engine.state(), EngineState::Ready);

    assert!(engine.render_at(2.0).await.is_ok());
    assert!(matches!(
        engine.render_at(2.5).await,
        Err(MontageError::OutOfRange { .. })
    ));
    assert!(matches!(
        engine.render_at(-0.1).await,
        Err(MontageError::OutOfRange { .. })
    ));
}

#[tokio::test]
async fn test_latest_rebuild_wins() {
    let engine = PreviewEngine::new(compositor(media()), Size2D::new(32.0, 18.0), 2);

    // Clip without metadata: building the slow snapshot waits on its metadata.
    let slow = Arc::new(TimelineSnapshot {
        revision: 1,
        clips: vec![Clip::new(SourceRef::new("slow/a.mp4"), 5.0)],
        overlays: vec![],
    });
    let fast = Arc::new(TimelineSnapshot {
        revision: 2,
        clips: vec![Clip::new(SourceRef::new("red.mp4"), 3.0)],
        overlays: vec![],
    });

    let (first, second) = tokio::join!(engine.rebuild(slow), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        engine.rebuild(fast).await
    });

    assert_eq!(first.unwrap(), RebuildOutcome::Superseded);
    assert_eq!(
        second.unwrap(),
        RebuildOutcome::Committed {
            revision: 2,
            segments: 1
        }
    );
    assert_eq!(engine.current().revision(), 2);
    assert_eq!(engine.current().duration, 3.0);
    assert_eq!(engine.state(), EngineState::Ready);
}

#[tokio::test]
async fn test_rebuild_restores_playhead() {
    let engine = PreviewEngine::new(compositor(media()), Size2D::new(32.0, 18.0), 2);
    let long = Arc::new(TimelineSnapshot {
        revision: 1,
        clips: vec![Clip::new(SourceRef::new("red.mp4"), 6.0)],
        overlays: vec![],
    });
    engine.rebuild(long).await.unwrap();
    engine.seek(4.5);
    engine.play();

    let short = Arc::new(TimelineSnapshot {
        revision: 2,
        clips: vec![Clip::new(SourceRef::new("red.mp4"), 2.0)],
        overlays: vec![],
    });
    engine.rebuild(short).await.unwrap();
    let playhead = engine.playhead();
    assert_eq!(playhead.position, 2.0);
    assert!(playhead.playing);

    // Still renderable: the end of the composition maps to its last segment.
    assert!(engine.render_playhead().await.is_ok());

    engine.seek(1.0);
    engine.pause();
    let same_length = Arc::new(TimelineSnapshot {
        revision: 3,
        clips: vec![Clip::new(SourceRef::new("blue.mp4"), 2.0)],
        overlays: vec![],
    });
    engine.rebuild(same_length).await.unwrap();
    assert_eq!(engine.playhead().position, 1.0);
    assert!(!engine.playhead().playing);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_preview_renders_agree() {
    let engine = Arc::new(PreviewEngine::new(compositor(media()), Size2D::new(32.0, 18.0), 3));
    engine.rebuild(Arc::new(two_clip_snapshot())).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.render_at(0.75).await.map(|f| f.image) })
        })
        .collect();
    let reference = engine.render_at(0.75).await.unwrap().image;
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), reference);
    }
}
