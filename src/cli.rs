// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for sensor operations
//!
//! This module provides command-line functionality for:
//! - Waiting for a sensor to appear
//! - Inspecting frame geometry and audio format
//! - Capturing image frames and audio blocks
//! - Coordinate mapping

use crate::SourceArg;
use chrono::Local;
use image::{ImageBuffer, Luma, Rgba};
use kinect_bridge::backends::{KinectBridge, get_bridge};
use kinect_bridge::config::Config;
use kinect_bridge::constants::{BODY_COUNT, BODY_INDEX_NO_BODY, TICKS_PER_SECOND};
use kinect_bridge::errors::{DisplayHresult, SensorError, SensorResult};
use kinect_bridge::ffi::{self, CameraSpacePoint};
use kinect_bridge::sensor::{
    self, AudioFrame, BodyIndex, Color, ColorFormat, Depth, Frame, FrameDescription, FrameKind,
    FrameSource, Infrared, LongExposureInfrared, Sensor, SourceKind,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// How long to keep retrying a pending acquisition
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(2);
/// Pause between two pending acquisitions
const PENDING_BACKOFF: Duration = Duration::from_millis(5);

fn bridge(config: &Config) -> Result<Arc<dyn KinectBridge>, Box<dyn std::error::Error>> {
    Ok(get_bridge(config.backend, &config.emulator)?)
}

fn open_sensor(config: &Config) -> Result<Sensor, Box<dyn std::error::Error>> {
    match Sensor::open_default(bridge(config)?) {
        Ok(sensor) => Ok(sensor),
        Err(SensorError::SensorUnavailable) => {
            Err("No sensor available (use `kinect-bridge connect` to wait for one)".into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Poll until a sensor opens, report the handle, then close it
pub fn connect(config: &Config, attempts: Option<u32>) -> CliResult {
    let bridge = bridge(config)?;
    let max_attempts = attempts.unwrap_or(config.open_retry.max_attempts);
    let interval = config.open_retry.interval();

    // Set up Ctrl+C handler
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    println!(
        "Waiting for a sensor on the {} bridge... (press Ctrl+C to stop)",
        bridge.bridge_type()
    );

    let mut attempt = 0;
    let mut handle = loop {
        attempt += 1;
        let handle = sensor::open_default_sensor(bridge.as_ref());
        if handle.is_valid() {
            break handle;
        }
        if max_attempts != 0 && attempt >= max_attempts {
            return Err(format!("No sensor after {} attempts", attempt).into());
        }
        if stop_flag.load(Ordering::SeqCst) {
            println!();
            println!("Interrupted.");
            return Ok(());
        }
        std::thread::sleep(interval);
    };

    println!("Connected: handle {} (attempt {})", handle, attempt);

    let hr = sensor::close_sensor(bridge.as_ref(), &mut handle);
    println!("Closed: {} (handle is now {})", DisplayHresult(hr), handle);
    if ffi::failed(hr) {
        return Err(SensorError::failed("KCBCloseSensor", hr).into());
    }
    Ok(())
}

/// Print everything the sensor can describe about itself
pub fn info(config: &Config) -> CliResult {
    let sensor = open_sensor(config)?;
    println!(
        "Sensor: handle {} ({} bridge)",
        sensor.handle(),
        sensor.bridge().bridge_type()
    );
    println!();

    println!("Frame descriptions:");
    let sources = [
        FrameSource::Depth,
        FrameSource::Infrared,
        FrameSource::LongExposureInfrared,
        FrameSource::BodyIndex,
    ]
    .into_iter()
    .chain(ColorFormat::ALL.into_iter().map(FrameSource::Color));
    for source in sources {
        match sensor.frame_description(source) {
            Ok(description) => println!("  {:<24} {}", source.to_string(), description),
            Err(e) => println!("  {:<24} unavailable ({})", source.to_string(), e),
        }
    }
    println!();

    match sensor.audio_format() {
        Ok(format) => println!(
            "Audio: {}, {} channel(s), {} Hz, {} bit",
            if format.is_ieee_float() {
                "IEEE float"
            } else {
                "PCM"
            },
            format.channels,
            format.samples_per_sec,
            format.bits_per_sample
        ),
        Err(e) => println!("Audio: unavailable ({})", e),
    }
    println!();

    println!("Readiness:");
    for kind in SourceKind::ALL {
        println!("  {:<24} {}", kind.to_string(), yes_no(sensor.is_frame_ready(kind)));
    }
    println!("  {:<24} {}", "any", yes_no(sensor.any_frame_ready()));
    println!("  {:<24} {}", "all", yes_no(sensor.all_frames_ready()));

    sensor.close()?;
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

/// Acquire `frames` frames from one source and optionally save the last one
pub fn capture(
    config: &Config,
    source: SourceArg,
    format: ColorFormat,
    frames: u32,
    output: Option<PathBuf>,
) -> CliResult {
    let sensor = open_sensor(config)?;
    let frames = frames.max(1);

    match source {
        SourceArg::BodyIndex => {
            let frame = acquire_frames(&sensor, BodyIndex, frames, summarize_body_index)?;
            if let Some(output) = output {
                let description = sensor.frame_description(FrameSource::BodyIndex)?;
                save_body_index(&frame, &description, &output_path(&output, "body_index"))?;
            }
        }
        SourceArg::Depth => {
            let frame = acquire_frames(&sensor, Depth, frames, summarize_depth)?;
            if let Some(output) = output {
                let description = sensor.frame_description(FrameSource::Depth)?;
                save_depth16(&frame, &description, &output_path(&output, "depth"))?;
            }
        }
        SourceArg::Infrared => {
            let frame = acquire_frames(&sensor, Infrared, frames, summarize_depth)?;
            if let Some(output) = output {
                let description = sensor.frame_description(FrameSource::Infrared)?;
                save_depth16(&frame, &description, &output_path(&output, "infrared"))?;
            }
        }
        SourceArg::LongIr => {
            let frame = acquire_frames(&sensor, LongExposureInfrared, frames, summarize_depth)?;
            if let Some(output) = output {
                let description = sensor.frame_description(FrameSource::LongExposureInfrared)?;
                save_depth16(&frame, &description, &output_path(&output, "long_ir"))?;
            }
        }
        SourceArg::Color => {
            let frame = acquire_frames(&sensor, Color(format), frames, summarize_color)?;
            if let Some(output) = output {
                let description = sensor.frame_description(FrameSource::Color(format))?;
                save_color(&frame, &description, &output_path(&output, "color"))?;
            }
        }
    }

    sensor.close()?;
    Ok(())
}

/// Create a frame and fill it `count` times, retrying while it is pending
fn acquire_frames<K: FrameKind>(
    sensor: &Sensor,
    kind: K,
    count: u32,
    summarize: fn(&[K::Element]) -> String,
) -> Result<Frame<K>, Box<dyn std::error::Error>> {
    let source = kind.source();
    let mut frame = sensor.create_frame(kind)?;
    println!("Capturing {} frame(s) from {}...", count, source);

    for _ in 0..count {
        acquire_with_retry(sensor, &mut frame)?;
        if let Some(view) = frame.buffer() {
            println!(
                "  #{:<4} t={:>9.3}s  {:>8} elements  {}",
                view.generation(),
                frame.timestamp() as f64 / TICKS_PER_SECOND as f64,
                view.len(),
                summarize(&view)
            );
        }
    }
    Ok(frame)
}

fn acquire_with_retry<K: FrameKind>(sensor: &Sensor, frame: &mut Frame<K>) -> SensorResult<()> {
    let start = Instant::now();
    loop {
        match sensor.acquire(frame) {
            Err(e) if e.is_pending() && start.elapsed() < ACQUIRE_TIMEOUT => {
                std::thread::sleep(PENDING_BACKOFF);
            }
            result => return result,
        }
    }
}

fn summarize_body_index(data: &[u8]) -> String {
    let mut counts = [0usize; BODY_COUNT as usize];
    for &value in data {
        if value != BODY_INDEX_NO_BODY
            && let Some(count) = counts.get_mut(value as usize)
        {
            *count += 1;
        }
    }
    let bodies: Vec<String> = counts
        .iter()
        .enumerate()
        .filter(|(_, count)| **count > 0)
        .map(|(body, count)| format!("{}:{}px", body, count))
        .collect();
    if bodies.is_empty() {
        "no bodies".to_string()
    } else {
        format!("bodies {}", bodies.join(" "))
    }
}

fn summarize_depth(data: &[u16]) -> String {
    let valid = data.iter().copied().filter(|&v| v > 0);
    let (min, max, sum, n) = valid.fold((u16::MAX, 0u16, 0u64, 0u64), |(lo, hi, s, n), v| {
        (lo.min(v), hi.max(v), s + u64::from(v), n + 1)
    });
    if n == 0 {
        return "no readings".to_string();
    }
    format!("min {} max {} mean {}", min, max, sum / n)
}

fn summarize_color(data: &[u8]) -> String {
    let head: Vec<String> = data.iter().take(4).map(|b| format!("{:02x}", b)).collect();
    format!("first pixel [{}]", head.join(" "))
}

/// A directory gets `<prefix>_<timestamp>.png`, anything else is used as is
fn output_path(output: &Path, prefix: &str) -> PathBuf {
    if output.is_dir() {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        output.join(format!("{}_{}.png", prefix, timestamp))
    } else {
        output.to_path_buf()
    }
}

fn dimensions(description: &FrameDescription) -> Result<(u32, u32), Box<dyn std::error::Error>> {
    match (
        u32::try_from(description.width()),
        u32::try_from(description.height()),
    ) {
        (Ok(width), Ok(height)) if width > 0 && height > 0 => Ok((width, height)),
        _ => Err(format!(
            "Invalid frame size {}x{}",
            description.width(),
            description.height()
        )
        .into()),
    }
}

fn save_body_index(
    frame: &Frame<BodyIndex>,
    description: &FrameDescription,
    path: &Path,
) -> CliResult {
    let view = frame.buffer().ok_or("No frame acquired")?;
    let (width, height) = dimensions(description)?;
    // Background black, bodies in distinct grey levels
    let pixels: Vec<u8> = view
        .iter()
        .map(|&v| {
            if v == BODY_INDEX_NO_BODY {
                0
            } else {
                255u8.saturating_sub(v.saturating_mul(32))
            }
        })
        .collect();
    let image = ImageBuffer::<Luma<u8>, _>::from_raw(width, height, pixels)
        .ok_or("Frame size does not match its description")?;
    image.save(path)?;
    println!("Saved: {}", path.display());
    Ok(())
}

/// Saved as 16-bit greyscale, values unscaled
fn save_depth16<K: FrameKind<Element = u16>>(
    frame: &Frame<K>,
    description: &FrameDescription,
    path: &Path,
) -> CliResult {
    let view = frame.buffer().ok_or("No frame acquired")?;
    let (width, height) = dimensions(description)?;
    let image = ImageBuffer::<Luma<u16>, _>::from_raw(width, height, view.to_vec())
        .ok_or("Frame size does not match its description")?;
    image.save(path)?;
    println!("Saved: {}", path.display());
    Ok(())
}

fn save_color(frame: &Frame<Color>, description: &FrameDescription, path: &Path) -> CliResult {
    let view = frame.buffer().ok_or("No frame acquired")?;
    let (width, height) = dimensions(description)?;

    match frame.kind().0 {
        ColorFormat::Rgba => {
            ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, view.to_vec())
                .ok_or("Frame size does not match its description")?
                .save(path)?;
        }
        ColorFormat::Bgra => {
            let rgba: Vec<u8> = view
                .chunks_exact(4)
                .flat_map(|p| [p[2], p[1], p[0], p[3]])
                .collect();
            ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, rgba)
                .ok_or("Frame size does not match its description")?
                .save(path)?;
        }
        // Packed 4:2:2: keep the luma plane only
        ColorFormat::Yuy2 | ColorFormat::Yuv => {
            let luma: Vec<u8> = view.iter().step_by(2).copied().collect();
            ImageBuffer::<Luma<u8>, _>::from_raw(width, height, luma)
                .ok_or("Frame size does not match its description")?
                .save(path)?;
        }
        ColorFormat::Bayer => {
            ImageBuffer::<Luma<u8>, _>::from_raw(width, height, view.to_vec())
                .ok_or("Frame size does not match its description")?
                .save(path)?;
        }
    }
    println!("Saved: {}", path.display());
    Ok(())
}

/// Read `reads` blocks of audio and print their beam and level
pub fn audio(config: &Config, reads: u32) -> CliResult {
    let sensor = open_sensor(config)?;
    let format = sensor.audio_format()?;
    println!(
        "Audio format: {} channel(s), {} Hz, {} bit",
        format.channels, format.samples_per_sec, format.bits_per_sample
    );

    let mut frame = AudioFrame::with_capacity(config.audio_buffer_size);
    for _ in 0..reads {
        let start = Instant::now();
        loop {
            match sensor.read_audio(&mut frame) {
                Err(e) if e.is_pending() && start.elapsed() < ACQUIRE_TIMEOUT => {
                    std::thread::sleep(PENDING_BACKOFF);
                }
                result => break result?,
            }
        }

        let samples = frame.samples();
        let rms = if samples.is_empty() {
            0.0
        } else {
            (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
        };
        println!(
            "  #{:<4} {:>6} bytes  beam {:>6.1}° (confidence {:.2})  rms {:.3}",
            frame.generation(),
            frame.bytes_read(),
            frame.beam_angle().to_degrees(),
            frame.beam_angle_confidence(),
            rms
        );
    }

    sensor.close()?;
    Ok(())
}

/// Map one camera-space point into depth and color space
pub fn map(config: &Config, x: f32, y: f32, z: f32) -> CliResult {
    let sensor = open_sensor(config)?;
    let point = CameraSpacePoint { x, y, z };

    let depth = sensor.map_camera_point_to_depth_space(point)?;
    let color = sensor.map_camera_point_to_color_space(point)?;
    println!("Camera ({:.3}, {:.3}, {:.3}) m", x, y, z);
    println!("  depth space: ({:.1}, {:.1}) px", depth.x, depth.y);
    println!("  color space: ({:.1}, {:.1}) px", color.x, color.y);

    sensor.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ColorType, GenericImageView};
    use kinect_bridge::backends::EmulatorConfig;
    use kinect_bridge::constants::{COLOR_HEIGHT, COLOR_WIDTH, DEPTH_HEIGHT, DEPTH_WIDTH};
    use kinect_bridge::config::OpenRetry;

    fn saved_png(dir: &Path) -> PathBuf {
        let files: Vec<PathBuf> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(files.len(), 1, "Expected one file, got {:?}", files);
        assert_eq!(files[0].extension().and_then(|e| e.to_str()), Some("png"));
        files[0].clone()
    }

    #[test]
    fn test_capture_depth_writes_16bit_png() {
        let dir = tempfile::tempdir().unwrap();
        capture(
            &Config::default(),
            SourceArg::Depth,
            ColorFormat::default(),
            2,
            Some(dir.path().to_path_buf()),
        )
        .unwrap();

        let path = saved_png(dir.path());
        let name = path.file_name().and_then(|n| n.to_str()).unwrap();
        assert!(name.starts_with("depth_"), "Unexpected name {}", name);

        let image = image::open(&path).unwrap();
        assert_eq!(image.dimensions(), (DEPTH_WIDTH as u32, DEPTH_HEIGHT as u32));
        assert_eq!(image.color(), ColorType::L16);
        // The emulated wall is never zero
        assert!(image.to_luma16().pixels().any(|p| p.0[0] > 0));
    }

    #[test]
    fn test_capture_body_index_to_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bodies.png");
        capture(
            &Config::default(),
            SourceArg::BodyIndex,
            ColorFormat::default(),
            1,
            Some(path.clone()),
        )
        .unwrap();

        let image = image::open(&path).unwrap();
        assert_eq!(image.dimensions(), (DEPTH_WIDTH as u32, DEPTH_HEIGHT as u32));
        assert_eq!(image.color(), ColorType::L8);
        let luma = image.to_luma8();
        assert!(luma.pixels().any(|p| p.0[0] == 0), "Background should be black");
        assert!(luma.pixels().any(|p| p.0[0] > 0), "One body should be visible");
    }

    #[test]
    fn test_capture_color_swaps_bgra() {
        let dir = tempfile::tempdir().unwrap();
        capture(
            &Config::default(),
            SourceArg::Color,
            ColorFormat::Bgra,
            1,
            Some(dir.path().to_path_buf()),
        )
        .unwrap();

        let image = image::open(saved_png(dir.path())).unwrap();
        assert_eq!(image.dimensions(), (COLOR_WIDTH as u32, COLOR_HEIGHT as u32));
        assert_eq!(image.color(), ColorType::Rgba8);
    }

    #[test]
    fn test_capture_without_output() {
        capture(
            &Config::default(),
            SourceArg::Infrared,
            ColorFormat::default(),
            3,
            None,
        )
        .unwrap();
    }

    #[test]
    fn test_commands_fail_without_sensor() {
        let config = Config {
            emulator: EmulatorConfig {
                sensor_attached: false,
                ..Default::default()
            },
            open_retry: OpenRetry {
                interval_ms: 1,
                max_attempts: 2,
            },
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();

        let err = capture(
            &config,
            SourceArg::Depth,
            ColorFormat::default(),
            1,
            Some(dir.path().to_path_buf()),
        )
        .unwrap_err();
        assert!(err.to_string().contains("No sensor available"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        // Installs the Ctrl+C handler, so it stays the only connect call here
        let err = connect(&config, None).unwrap_err();
        assert!(err.to_string().contains("after 2 attempts"), "{}", err);
    }

    #[test]
    fn test_audio_and_map_succeed() {
        audio(&Config::default(), 3).unwrap();
        map(&Config::default(), 0.1, 0.2, 2.0).unwrap();
    }
}
