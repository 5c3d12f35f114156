// SPDX-License-Identifier: MPL-2.0

//! Integration tests for constants module

use kinect_bridge::constants::*;
use kinect_bridge::ffi;
use kinect_bridge::sensor::{ColorFormat, SourceKind};

#[test]
fn test_frame_period_matches_rate() {
    // Integer division loses less than one tick per frame
    let second = TICKS_PER_FRAME * i64::from(NOMINAL_FRAME_RATE);
    assert!(second <= TICKS_PER_SECOND);
    assert!(TICKS_PER_SECOND - second < i64::from(NOMINAL_FRAME_RATE));
}

#[test]
fn test_color_bytes_per_pixel() {
    assert_eq!(color_bytes_per_pixel(ColorFormat::Bgra.raw()), 4);
    assert_eq!(color_bytes_per_pixel(ColorFormat::Rgba.raw()), 4);
    assert_eq!(color_bytes_per_pixel(ColorFormat::Yuy2.raw()), 2);
    assert_eq!(color_bytes_per_pixel(ColorFormat::Bayer.raw()), 1);
    assert_eq!(
        color_bytes_per_pixel(ffi::COLOR_IMAGE_FORMAT_NONE),
        0,
        "The None format has no pixel size"
    );
}

#[test]
fn test_color_format_raw_round_trip() {
    for format in ColorFormat::ALL {
        assert_eq!(ColorFormat::from_raw(format.raw()), Some(format));
    }
    assert_eq!(ColorFormat::from_raw(ffi::COLOR_IMAGE_FORMAT_NONE), None);
}

#[test]
fn test_source_flags_are_distinct_bits() {
    let mut seen = 0;
    for kind in SourceKind::ALL {
        let flag = kind.flag();
        assert_eq!(flag.count_ones(), 1, "{} should be a single bit", kind);
        assert_eq!(seen & flag, 0, "{} should not share a bit", kind);
        seen |= flag;
        assert_eq!(SourceKind::from_flag(flag), Some(kind));
    }
}

#[test]
fn test_reliable_depth_range() {
    assert!(DEPTH_MIN_RELIABLE_MM < DEPTH_MAX_RELIABLE_MM);
    assert!(i32::from(BODY_COUNT) > 0);
}
