// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic scene served by the emulated bridge
//!
//! A flat wall with `bodies` upright ellipses standing in front of it, each
//! swaying slowly with the frame counter. Depth, infrared and body index are
//! all derived from the same geometry so that the three streams agree pixel
//! for pixel. Coordinate mapping uses a plain pinhole model with the
//! published intrinsics of the Kinect v2 cameras.

use crate::constants::*;
use crate::ffi::{
    self, CameraSpacePoint, ColorImageFormat, ColorSpacePoint, DepthSpacePoint, PointF,
};

/// Distance of the back wall at the top row (mm)
const WALL_DEPTH_MM: f32 = 3000.0;
/// The wall leans back by this much per row (mm)
const WALL_SLOPE_MM: f32 = 2.0;
/// Distance of the first body (mm); later bodies stand further back
const BODY_DEPTH_MM: u16 = 1500;
const BODY_DEPTH_STEP_MM: u16 = 400;
/// Half extents of a body silhouette in depth pixels
const BODY_RADIUS_X: f32 = 36.0;
const BODY_RADIUS_Y: f32 = 140.0;
/// Sideways sway amplitude (depth pixels)
const BODY_SWAY: f32 = 20.0;
/// Test tone of the emulated microphone array
const AUDIO_TONE_HZ: f32 = 440.0;
const AUDIO_AMPLITUDE: f32 = 0.25;
/// Starting guess when looking up the depth behind a color pixel (m)
const COLOR_LOOKUP_DEPTH_M: f32 = 2.0;
const COLOR_LOOKUP_PASSES: usize = 3;

/// Geometry of the emulated room
#[derive(Debug, Clone, Copy)]
pub struct Scene {
    bodies: u8,
}

impl Scene {
    pub fn new(bodies: u8) -> Self {
        Self {
            bodies: bodies.min(BODY_COUNT),
        }
    }

    pub fn bodies(&self) -> u8 {
        self.bodies
    }

    /// Index of the body covering depth pixel `(x, y)` on frame `frame`
    pub fn body_at(&self, x: i32, y: i32, frame: u64) -> Option<u8> {
        (0..self.bodies).find(|&body| {
            let (cx, cy) = self.body_center(body, frame);
            let dx = (x as f32 - cx) / BODY_RADIUS_X;
            let dy = (y as f32 - cy) / BODY_RADIUS_Y;
            dx * dx + dy * dy <= 1.0
        })
    }

    fn body_center(&self, body: u8, frame: u64) -> (f32, f32) {
        let slots = f32::from(self.bodies) + 1.0;
        let base = DEPTH_WIDTH as f32 * (f32::from(body) + 1.0) / slots;
        let sway = ((frame as f32) * 0.05 + f32::from(body)).sin() * BODY_SWAY;
        (base + sway, DEPTH_HEIGHT as f32 / 2.0)
    }

    /// Depth in millimetres at depth pixel `(x, y)`
    pub fn depth_at(&self, x: i32, y: i32, frame: u64) -> u16 {
        match self.body_at(x, y, frame) {
            Some(body) => BODY_DEPTH_MM + BODY_DEPTH_STEP_MM * u16::from(body),
            None => {
                let wall = WALL_DEPTH_MM + WALL_SLOPE_MM * y as f32;
                wall.min(f32::from(DEPTH_MAX_RELIABLE_MM)) as u16
            }
        }
    }

    pub fn fill_body_index(&self, buffer: &mut [u8], frame: u64) {
        for (i, value) in buffer.iter_mut().enumerate() {
            let (x, y) = depth_pixel(i);
            *value = self.body_at(x, y, frame).unwrap_or(BODY_INDEX_NO_BODY);
        }
    }

    pub fn fill_depth(&self, buffer: &mut [u16], frame: u64) {
        for (i, value) in buffer.iter_mut().enumerate() {
            let (x, y) = depth_pixel(i);
            *value = self.depth_at(x, y, frame);
        }
    }

    /// Active infrared falls off with the square of the distance
    pub fn fill_infrared(&self, buffer: &mut [u16], frame: u64, long_exposure: bool) {
        let gain = if long_exposure { 3.0 } else { 1.0 };
        for (i, value) in buffer.iter_mut().enumerate() {
            let (x, y) = depth_pixel(i);
            let metres = f32::from(self.depth_at(x, y, frame)) / 1000.0;
            let intensity = gain * 12_000.0 / (metres * metres);
            *value = intensity.min(f32::from(u16::MAX)) as u16;
        }
    }

    /// Horizontal and vertical colour ramps, the blue channel cycling per frame
    pub fn fill_color(&self, format: ColorImageFormat, buffer: &mut [u8], frame: u64) {
        let bytes_per_pixel = color_bytes_per_pixel(format) as usize;
        if bytes_per_pixel == 0 {
            return;
        }
        let blue = (frame % 256) as u8;
        for (pixel, chunk) in buffer.chunks_mut(bytes_per_pixel).enumerate() {
            let x = (pixel % COLOR_WIDTH as usize) as u32;
            let y = ((pixel / COLOR_WIDTH as usize) % COLOR_HEIGHT as usize) as u32;
            let red = (x * 255 / (COLOR_WIDTH as u32 - 1)) as u8;
            let green = (y * 255 / (COLOR_HEIGHT as u32 - 1)) as u8;
            write_color_pixel(format, chunk, x, y, [red, green, blue]);
        }
    }

    /// Fill `samples` with the test tone, continuing from `position`
    ///
    /// Returns the beam angle (radians) and its confidence.
    pub fn fill_audio(&self, samples: &mut [f32], position: &mut u64) -> (f32, f32) {
        let rate = AUDIO_SAMPLE_RATE as f32;
        for sample in samples.iter_mut() {
            let t = (*position % u64::from(AUDIO_SAMPLE_RATE)) as f32 / rate;
            *sample = AUDIO_AMPLITUDE * (std::f32::consts::TAU * AUDIO_TONE_HZ * t).sin();
            *position += 1;
        }

        let seconds = *position as f32 / rate;
        let angle = (seconds * 0.5).sin() * AUDIO_BEAM_ANGLE_LIMIT * 0.5;
        let confidence = if self.bodies > 0 { 0.8 } else { 0.1 };
        (angle, confidence)
    }
}

fn depth_pixel(index: usize) -> (i32, i32) {
    let width = DEPTH_WIDTH as usize;
    ((index % width) as i32, (index / width) as i32)
}

fn write_color_pixel(format: ColorImageFormat, out: &mut [u8], x: u32, y: u32, rgb: [u8; 3]) {
    let [r, g, b] = rgb;
    let luma = ((u32::from(r) * 77 + u32::from(g) * 150 + u32::from(b) * 29) >> 8) as u8;
    let pixel: [u8; 4] = match format {
        ffi::COLOR_IMAGE_FORMAT_RGBA => [r, g, b, 0xff],
        ffi::COLOR_IMAGE_FORMAT_BGRA => [b, g, r, 0xff],
        // Packed 4:2:2, even pixels carry U and odd pixels carry V
        ffi::COLOR_IMAGE_FORMAT_YUY2 | ffi::COLOR_IMAGE_FORMAT_YUV => {
            let chroma = if x % 2 == 0 { b } else { r };
            [luma, chroma, 0, 0]
        }
        // RGGB mosaic
        ffi::COLOR_IMAGE_FORMAT_BAYER => match (x % 2, y % 2) {
            (0, 0) => [r, 0, 0, 0],
            (1, 1) => [b, 0, 0, 0],
            _ => [g, 0, 0, 0],
        },
        _ => [0; 4],
    };
    let len = out.len().min(pixel.len());
    out[..len].copy_from_slice(&pixel[..len]);
}

// ===== Pinhole calibration =====

/// Camera space uses metres with +Y up; image space has +Y down.
pub fn camera_to_depth(point: CameraSpacePoint) -> DepthSpacePoint {
    if point.z <= 0.0 {
        return DepthSpacePoint {
            x: f32::NEG_INFINITY,
            y: f32::NEG_INFINITY,
        };
    }
    DepthSpacePoint {
        x: DEPTH_FX * point.x / point.z + DEPTH_CX,
        y: DEPTH_CY - DEPTH_FY * point.y / point.z,
    }
}

pub fn camera_to_color(point: CameraSpacePoint) -> ColorSpacePoint {
    if point.z <= 0.0 {
        return ColorSpacePoint {
            x: f32::NEG_INFINITY,
            y: f32::NEG_INFINITY,
        };
    }
    let x = point.x - COLOR_BASELINE_M;
    ColorSpacePoint {
        x: COLOR_FX * x / point.z + COLOR_CX,
        y: COLOR_CY - COLOR_FY * point.y / point.z,
    }
}

/// A zero depth reading has no camera-space position
pub fn depth_to_camera(point: DepthSpacePoint, depth_mm: u16) -> CameraSpacePoint {
    if depth_mm == 0 {
        return CameraSpacePoint {
            x: f32::NEG_INFINITY,
            y: f32::NEG_INFINITY,
            z: f32::NEG_INFINITY,
        };
    }
    let z = f32::from(depth_mm) / 1000.0;
    CameraSpacePoint {
        x: (point.x - DEPTH_CX) * z / DEPTH_FX,
        y: (DEPTH_CY - point.y) * z / DEPTH_FY,
        z,
    }
}

pub fn depth_to_color(point: DepthSpacePoint, depth_mm: u16) -> ColorSpacePoint {
    camera_to_color(depth_to_camera(point, depth_mm))
}

/// Camera-space point at distance `z` seen by color pixel `point`
fn color_ray(point: ColorSpacePoint, z: f32) -> CameraSpacePoint {
    CameraSpacePoint {
        x: (point.x - COLOR_CX) * z / COLOR_FX + COLOR_BASELINE_M,
        y: (COLOR_CY - point.y) * z / COLOR_FY,
        z,
    }
}

/// Depth pixel and reading behind color pixel `point`
///
/// The color camera sits beside the depth camera, so the answer depends on
/// the distance. Starts from a fixed guess and refines it with the reading
/// found at each pass. `None` when the ray leaves the depth image or lands on
/// a zero reading.
pub fn color_to_depth(point: ColorSpacePoint, depth_frame: &[u16]) -> Option<(DepthSpacePoint, u16)> {
    let mut z = COLOR_LOOKUP_DEPTH_M;
    let mut found = None;
    for _ in 0..COLOR_LOOKUP_PASSES {
        let pixel = camera_to_depth(color_ray(point, z));
        let (x, y) = (pixel.x.round(), pixel.y.round());
        if !(0.0..DEPTH_WIDTH as f32).contains(&x) || !(0.0..DEPTH_HEIGHT as f32).contains(&y) {
            return None;
        }
        let index = y as usize * DEPTH_WIDTH as usize + x as usize;
        let depth_mm = *depth_frame.get(index)?;
        if depth_mm == 0 {
            return None;
        }
        z = f32::from(depth_mm) / 1000.0;
        found = Some((pixel, depth_mm));
    }
    found
}

/// Pixel centre of color pixel `index` in row order
pub fn color_pixel(index: usize) -> ColorSpacePoint {
    let width = COLOR_WIDTH as usize;
    ColorSpacePoint {
        x: (index % width) as f32,
        y: (index / width) as f32,
    }
}

/// Depth pixel `index` as a depth-space point
pub fn depth_point(index: usize) -> DepthSpacePoint {
    let (x, y) = depth_pixel(index);
    DepthSpacePoint {
        x: x as f32,
        y: y as f32,
    }
}

/// Unit-depth ray of depth pixel `index`
pub fn depth_table_entry(index: usize) -> PointF {
    let point = depth_point(index);
    PointF {
        x: (point.x - DEPTH_CX) / DEPTH_FX,
        y: (DEPTH_CY - point.y) / DEPTH_FY,
    }
}

pub const UNMAPPED_DEPTH_POINT: DepthSpacePoint = DepthSpacePoint {
    x: f32::NEG_INFINITY,
    y: f32::NEG_INFINITY,
};

pub const UNMAPPED_CAMERA_POINT: CameraSpacePoint = CameraSpacePoint {
    x: f32::NEG_INFINITY,
    y: f32::NEG_INFINITY,
    z: f32::NEG_INFINITY,
};
