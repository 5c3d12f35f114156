// SPDX-License-Identifier: MPL-2.0

//! Integration tests for frame ownership, acquisition and buffer views

use kinect_bridge::backends::{EmulatedBridge, EmulatorConfig, KinectBridge};
use kinect_bridge::constants::BODY_INDEX_NO_BODY;
use kinect_bridge::ffi::{self, CameraSpacePoint};
use kinect_bridge::sensor::{
    AudioFrame, BodyIndex, Color, ColorFormat, Depth, Frame, FrameDescription, FrameSet,
    FrameSource, Infrared, Sensor, SourceKind,
};
use std::sync::Arc;

fn open(config: EmulatorConfig) -> (Arc<EmulatedBridge>, Sensor) {
    let emulator = Arc::new(EmulatedBridge::new(config));
    let sensor = Sensor::open_default(emulator.clone()).expect("emulated sensor should open");
    (emulator, sensor)
}

#[test]
fn test_body_index_view_matches_size() {
    let (_emulator, sensor) = open(EmulatorConfig::default());
    let desc = sensor.frame_description(FrameSource::BodyIndex).unwrap();
    let mut frame = sensor.create_frame(BodyIndex).unwrap();
    assert_eq!(frame.size(), desc.length_in_pixels() as usize);

    sensor.acquire(&mut frame).expect("a frame should be available");
    let view = frame.buffer().expect("acquired frame should have a view");
    assert_eq!(
        view.len(),
        frame.size(),
        "The view should cover exactly the reported size"
    );
    assert!(
        view.iter().all(|&v| v == BODY_INDEX_NO_BODY || v < 6),
        "Body index pixels are a body number or the no-body marker"
    );
}

#[test]
fn test_buffer_absent_before_acquire() {
    let (_emulator, sensor) = open(EmulatorConfig::default());
    let frame = sensor.create_frame(Depth).unwrap();
    assert_eq!(frame.generation(), 0);
    assert!(frame.buffer().is_none());
    assert!(!frame.is_current(0));
}

#[test]
fn test_generation_advances_per_acquire() {
    let (_emulator, sensor) = open(EmulatorConfig::default());
    let mut frame = sensor.create_frame(Depth).unwrap();

    sensor.acquire(&mut frame).unwrap();
    let first = frame.generation();
    let first_stamp = frame.timestamp();
    sensor.acquire(&mut frame).unwrap();

    assert_eq!(frame.generation(), first + 1);
    assert!(!frame.is_current(first), "Old generation should be stale");
    assert!(frame.is_current(frame.generation()));
    assert!(frame.timestamp() > first_stamp, "Timestamps should increase");
}

#[test]
fn test_depth_values_in_range() {
    let (_emulator, sensor) = open(EmulatorConfig::default());
    let mut frame = sensor.create_frame(Depth).unwrap();
    sensor.acquire(&mut frame).unwrap();

    let view = frame.buffer().unwrap();
    assert_eq!(view.len(), 512 * 424);
    assert_eq!(view.as_bytes().len(), view.len() * 2);
    assert!(view.iter().any(|&mm| mm > 0), "The scene should not be empty");
}

#[test]
fn test_color_frame_sized_from_format() {
    let (_emulator, sensor) = open(EmulatorConfig::default());
    for format in [ColorFormat::Bgra, ColorFormat::Yuy2] {
        let desc = sensor.frame_description(FrameSource::Color(format)).unwrap();
        let mut frame = sensor.create_frame(Color(format)).unwrap();
        assert_eq!(
            frame.size(),
            (desc.length_in_pixels() * desc.bytes_per_pixel()) as usize,
            "Color buffers hold every pixel at the format's width"
        );
        sensor.acquire(&mut frame).unwrap();
        assert_eq!(frame.buffer().unwrap().len(), frame.size());
    }
}

#[test]
fn test_drop_releases_frame() {
    let (emulator, sensor) = open(EmulatorConfig::default());
    {
        let _depth = sensor.create_frame(Depth).unwrap();
        let _ir = sensor.create_frame(Infrared).unwrap();
        assert_eq!(emulator.live_frames(), 2);
    }
    assert_eq!(emulator.live_frames(), 0, "Dropping frames should release them");
}

#[test]
fn test_frame_outlives_sensor() {
    let (emulator, sensor) = open(EmulatorConfig::default());
    let mut frame = sensor.create_frame(BodyIndex).unwrap();
    sensor.acquire(&mut frame).unwrap();
    sensor.close().unwrap();

    // The data stays readable, only further acquisition needs a sensor
    assert!(frame.buffer().is_some());
    drop(frame);
    assert_eq!(emulator.live_frames(), 0);
}

#[test]
fn test_acquire_rejects_foreign_frame() {
    let (_a, first) = open(EmulatorConfig::default());
    let (_b, second) = open(EmulatorConfig::default());
    let mut frame = first.create_frame(Depth).unwrap();

    let err = second.acquire(&mut frame).unwrap_err();
    assert_eq!(err.hresult(), Some(ffi::E_INVALIDARG));
    assert_eq!(frame.generation(), 0);
}

#[test]
fn test_paced_source_reports_pending() {
    let (_emulator, sensor) = open(EmulatorConfig {
        frame_rate: Some(1),
        ..Default::default()
    });
    let mut frame = sensor.create_frame(Depth).unwrap();
    sensor.acquire(&mut frame).unwrap();

    let err = sensor.acquire(&mut frame).unwrap_err();
    assert!(err.is_pending(), "A second read within the period should pend");
    assert_eq!(frame.generation(), 1, "A pending read leaves the data alone");
}

#[test]
fn test_readiness_follows_active_sources() {
    let (_emulator, sensor) = open(EmulatorConfig::default());
    assert!(!sensor.all_frames_ready(), "No source is active yet");

    let mut frame = sensor.create_frame(Depth).unwrap();
    sensor.acquire(&mut frame).unwrap();
    assert!(sensor.is_frame_ready(SourceKind::Depth));
    assert!(sensor.any_frame_ready());
    assert!(sensor.all_frames_ready());
    assert!(!sensor.is_frame_ready(SourceKind::Body));
}

#[test]
fn test_audio_read_fills_caller_buffer() {
    let (_emulator, sensor) = open(EmulatorConfig::default());
    let mut audio = AudioFrame::with_capacity(1024);

    sensor.read_audio(&mut audio).expect("audio should be available");
    assert_eq!(audio.generation(), 1);
    assert!(audio.bytes_read() > 0);
    assert!(audio.bytes_read() <= audio.capacity());
    assert_eq!(audio.samples().len() * 4, audio.bytes_read());
    assert!(audio.samples().iter().all(|s| s.abs() <= 1.0));
    assert!((0.0..=1.0).contains(&audio.beam_angle_confidence()));
}

#[test]
fn test_audio_null_buffer_rejected() {
    let emulator = EmulatedBridge::new(EmulatorConfig::default());
    let handle = emulator.open_default_sensor();
    let mut raw = ffi::KcbAudioFrame {
        audio_buffer_size: 64,
        audio_buffer: std::ptr::null_mut(),
        bytes_read: 0,
        beam_angle: 0.0,
        beam_angle_confidence: 0.0,
    };
    let hr = unsafe { emulator.get_audio_frame(handle, &mut raw) };
    assert_eq!(hr, ffi::E_POINTER);
}

#[test]
fn test_get_with_null_frame_rejected() {
    let emulator = EmulatedBridge::new(EmulatorConfig::default());
    let handle = emulator.open_default_sensor();
    let hr = unsafe { emulator.get_body_index_frame(handle, std::ptr::null_mut()) };
    assert_eq!(hr, ffi::E_POINTER);
}

#[test]
fn test_map_point_round_trip() {
    let (_emulator, sensor) = open(EmulatorConfig::default());
    let point = CameraSpacePoint {
        x: 0.1,
        y: -0.2,
        z: 2.0,
    };

    let depth_point = sensor.map_camera_point_to_depth_space(point).unwrap();
    let back = sensor
        .map_depth_point_to_camera_space(depth_point, 2000)
        .unwrap();
    assert!((back.x - point.x).abs() < 1e-3);
    assert!((back.y - point.y).abs() < 1e-3);
    assert!((back.z - point.z).abs() < 1e-3);
}

#[test]
fn test_map_frame_length_mismatch() {
    let (_emulator, sensor) = open(EmulatorConfig::default());
    let depth = vec![1000u16; 16];
    let mut points = vec![CameraSpacePoint::default(); 8];

    let err = sensor
        .map_depth_frame_to_camera_space(&depth, &mut points)
        .unwrap_err();
    assert_eq!(err.hresult(), Some(ffi::E_INVALIDARG));
}

#[test]
fn test_oversized_frame_is_out_of_memory() {
    let (emulator, sensor) = open(EmulatorConfig::default());
    let mut raw = *sensor.frame_description(FrameSource::Depth).unwrap().raw();
    raw.length_in_pixels = u32::MAX;

    let err = Frame::create(
        sensor.bridge().clone(),
        Depth,
        &FrameDescription::from(raw),
    )
    .unwrap_err();
    assert_eq!(err.hresult(), Some(ffi::E_OUTOFMEMORY));
    assert_eq!(emulator.live_frames(), 0, "A failed create should leave nothing behind");
}

#[test]
fn test_acquire_all_fills_from_one_instant() {
    let (_emulator, sensor) = open(EmulatorConfig::default());
    let mut depth = sensor.create_frame(Depth).unwrap();
    let mut index = sensor.create_frame(BodyIndex).unwrap();
    let mut color = sensor.create_frame(Color(ColorFormat::Rgba)).unwrap();

    // Let depth run ahead so the sources start out of step
    sensor.acquire(&mut depth).unwrap();

    sensor
        .acquire_all(FrameSet {
            depth: Some(&mut depth),
            body_index: Some(&mut index),
            color: Some(&mut color),
            ..Default::default()
        })
        .expect("every source should have a frame");

    assert_eq!(depth.generation(), 2);
    assert_eq!(index.generation(), 1);
    assert_eq!(color.generation(), 1);
    assert_eq!(depth.timestamp(), index.timestamp());
    assert_eq!(depth.timestamp(), color.timestamp());

    // Body pixels in the index frame carry body depths in the depth frame
    let depth_view = depth.buffer().unwrap();
    let index_view = index.buffer().unwrap();
    for (mm, body) in depth_view.iter().zip(index_view.iter()) {
        if *body != BODY_INDEX_NO_BODY {
            assert!(*mm < 3000, "Body pixel at {mm} mm should stand before the wall");
        }
    }
}

#[test]
fn test_acquire_all_pending_leaves_frames_alone() {
    let (_emulator, sensor) = open(EmulatorConfig {
        frame_rate: Some(1),
        ..Default::default()
    });
    let mut depth = sensor.create_frame(Depth).unwrap();
    let mut infrared = sensor.create_frame(Infrared).unwrap();
    sensor.acquire(&mut depth).unwrap();

    let err = sensor
        .acquire_all(FrameSet {
            depth: Some(&mut depth),
            infrared: Some(&mut infrared),
            ..Default::default()
        })
        .unwrap_err();
    assert!(err.is_pending());
    assert_eq!(depth.generation(), 1);
    assert_eq!(infrared.generation(), 0);
    assert!(infrared.buffer().is_none());
}

#[test]
fn test_acquire_all_rejects_empty_and_foreign_sets() {
    let (_a, first) = open(EmulatorConfig::default());
    let (_b, second) = open(EmulatorConfig::default());

    let err = first.acquire_all(FrameSet::default()).unwrap_err();
    assert_eq!(err.hresult(), Some(ffi::E_INVALIDARG));

    let mut ours = first.create_frame(Depth).unwrap();
    let mut theirs = second.create_frame(BodyIndex).unwrap();
    let err = first
        .acquire_all(FrameSet {
            depth: Some(&mut ours),
            body_index: Some(&mut theirs),
            ..Default::default()
        })
        .unwrap_err();
    assert_eq!(err.hresult(), Some(ffi::E_INVALIDARG));
    assert_eq!(ours.generation(), 0, "Nothing is filled when one frame is foreign");
}
