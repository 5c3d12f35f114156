// SPDX-License-Identifier: GPL-3.0-only

//! Value types shared by the bridge seam and the safe sensor layer

use crate::ffi::{self, ColorImageFormat, FrameSourceTypes, KcbHandle};
use serde::{Deserialize, Serialize};

/// Integer token naming an open sensor session
///
/// A handle is either the invalid sentinel or a value issued by a successful
/// open. Closing writes the sentinel back, so a closed handle is
/// indistinguishable from one that was never valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SensorHandle(KcbHandle);

impl SensorHandle {
    /// The "no sensor" sentinel
    pub const INVALID: SensorHandle = SensorHandle(ffi::KCB_INVALID_HANDLE);

    /// Wrap a raw handle as returned by the native library
    pub const fn from_raw(raw: KcbHandle) -> Self {
        SensorHandle(raw)
    }

    /// Raw integer value
    pub const fn raw(&self) -> KcbHandle {
        self.0
    }

    /// True unless this is the invalid sentinel
    pub const fn is_valid(&self) -> bool {
        self.0 != ffi::KCB_INVALID_HANDLE
    }

    /// Reset to the sentinel, returning the previous value
    pub fn invalidate(&mut self) -> SensorHandle {
        std::mem::replace(self, SensorHandle::INVALID)
    }

    /// Raw in/out slot for calls that write the handle back
    pub(crate) fn as_raw_mut(&mut self) -> &mut KcbHandle {
        &mut self.0
    }
}

impl Default for SensorHandle {
    fn default() -> Self {
        SensorHandle::INVALID
    }
}

impl std::fmt::Display for SensorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "0x{:04X}", self.0)
        } else {
            write!(f, "invalid")
        }
    }
}

/// Pixel layout of a color frame
///
/// `ColorImageFormat_None` has no counterpart: the runtime rejects it for
/// every color call, so the safe layer cannot express it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColorFormat {
    Rgba,
    Yuv,
    #[default]
    Bgra,
    Bayer,
    Yuy2,
}

impl ColorFormat {
    pub const ALL: [ColorFormat; 5] = [
        ColorFormat::Rgba,
        ColorFormat::Yuv,
        ColorFormat::Bgra,
        ColorFormat::Bayer,
        ColorFormat::Yuy2,
    ];

    pub const fn raw(self) -> ColorImageFormat {
        match self {
            ColorFormat::Rgba => ffi::COLOR_IMAGE_FORMAT_RGBA,
            ColorFormat::Yuv => ffi::COLOR_IMAGE_FORMAT_YUV,
            ColorFormat::Bgra => ffi::COLOR_IMAGE_FORMAT_BGRA,
            ColorFormat::Bayer => ffi::COLOR_IMAGE_FORMAT_BAYER,
            ColorFormat::Yuy2 => ffi::COLOR_IMAGE_FORMAT_YUY2,
        }
    }

    /// Convert a raw `ColorImageFormat`, rejecting `None` and unknown values
    pub const fn from_raw(raw: ColorImageFormat) -> Option<Self> {
        match raw {
            ffi::COLOR_IMAGE_FORMAT_RGBA => Some(ColorFormat::Rgba),
            ffi::COLOR_IMAGE_FORMAT_YUV => Some(ColorFormat::Yuv),
            ffi::COLOR_IMAGE_FORMAT_BGRA => Some(ColorFormat::Bgra),
            ffi::COLOR_IMAGE_FORMAT_BAYER => Some(ColorFormat::Bayer),
            ffi::COLOR_IMAGE_FORMAT_YUY2 => Some(ColorFormat::Yuy2),
            _ => None,
        }
    }
}

impl std::fmt::Display for ColorFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColorFormat::Rgba => write!(f, "RGBA"),
            ColorFormat::Yuv => write!(f, "YUV"),
            ColorFormat::Bgra => write!(f, "BGRA"),
            ColorFormat::Bayer => write!(f, "Bayer"),
            ColorFormat::Yuy2 => write!(f, "YUY2"),
        }
    }
}

/// Image source whose geometry can be described
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameSource {
    Color(ColorFormat),
    Depth,
    Infrared,
    LongExposureInfrared,
    BodyIndex,
}

impl FrameSource {
    pub const fn kind(self) -> SourceKind {
        match self {
            FrameSource::Color(_) => SourceKind::Color,
            FrameSource::Depth => SourceKind::Depth,
            FrameSource::Infrared => SourceKind::Infrared,
            FrameSource::LongExposureInfrared => SourceKind::LongExposureInfrared,
            FrameSource::BodyIndex => SourceKind::BodyIndex,
        }
    }

    /// Native entry point that describes this source
    pub const fn description_operation(self) -> &'static str {
        match self {
            FrameSource::Color(_) => "KCBGetColorFrameDescription",
            FrameSource::Depth => "KCBGetDepthFrameDescription",
            FrameSource::Infrared => "KCBGetInfraredFrameDescription",
            FrameSource::LongExposureInfrared => "KCBGetLongExposureInfraredFrameDescription",
            FrameSource::BodyIndex => "KCBGetBodyIndexFrameDescription",
        }
    }
}

impl std::fmt::Display for FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameSource::Color(format) => write!(f, "color ({})", format),
            other => write!(f, "{}", other.kind()),
        }
    }
}

/// One bit of `FrameSourceTypes`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Color,
    Infrared,
    LongExposureInfrared,
    Depth,
    BodyIndex,
    Body,
    Audio,
}

impl SourceKind {
    pub const ALL: [SourceKind; 7] = [
        SourceKind::Color,
        SourceKind::Infrared,
        SourceKind::LongExposureInfrared,
        SourceKind::Depth,
        SourceKind::BodyIndex,
        SourceKind::Body,
        SourceKind::Audio,
    ];

    pub const fn flag(self) -> FrameSourceTypes {
        match self {
            SourceKind::Color => ffi::FRAME_SOURCE_TYPES_COLOR,
            SourceKind::Infrared => ffi::FRAME_SOURCE_TYPES_INFRARED,
            SourceKind::LongExposureInfrared => ffi::FRAME_SOURCE_TYPES_LONG_EXPOSURE_INFRARED,
            SourceKind::Depth => ffi::FRAME_SOURCE_TYPES_DEPTH,
            SourceKind::BodyIndex => ffi::FRAME_SOURCE_TYPES_BODY_INDEX,
            SourceKind::Body => ffi::FRAME_SOURCE_TYPES_BODY,
            SourceKind::Audio => ffi::FRAME_SOURCE_TYPES_AUDIO,
        }
    }

    /// Decode a single flag; combined or unknown bits yield `None`
    pub fn from_flag(flag: FrameSourceTypes) -> Option<Self> {
        SourceKind::ALL.into_iter().find(|kind| kind.flag() == flag)
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SourceKind::Color => "color",
            SourceKind::Infrared => "infrared",
            SourceKind::LongExposureInfrared => "long exposure infrared",
            SourceKind::Depth => "depth",
            SourceKind::BodyIndex => "body index",
            SourceKind::Body => "body",
            SourceKind::Audio => "audio",
        };
        write!(f, "{}", name)
    }
}

/// Sources that share the 16-bit `KCBDepthFrame` layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Depth16Source {
    Depth,
    Infrared,
    LongExposureInfrared,
}

impl Depth16Source {
    pub const fn frame_source(self) -> FrameSource {
        match self {
            Depth16Source::Depth => FrameSource::Depth,
            Depth16Source::Infrared => FrameSource::Infrared,
            Depth16Source::LongExposureInfrared => FrameSource::LongExposureInfrared,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_default_is_invalid() {
        let handle = SensorHandle::default();
        assert!(!handle.is_valid());
        assert_eq!(handle.raw(), -1);
        assert_eq!(handle.to_string(), "invalid");
    }

    #[test]
    fn test_handle_invalidate_returns_previous() {
        let mut handle = SensorHandle::from_raw(ffi::KCB_DEFAULT_HANDLE);
        assert_eq!(handle.to_string(), "0xE000");

        let previous = handle.invalidate();
        assert_eq!(previous.raw(), ffi::KCB_DEFAULT_HANDLE);
        assert_eq!(handle, SensorHandle::INVALID);
    }

    #[test]
    fn test_color_format_rejects_none() {
        assert_eq!(ColorFormat::from_raw(ffi::COLOR_IMAGE_FORMAT_NONE), None);
        for format in ColorFormat::ALL {
            assert_eq!(ColorFormat::from_raw(format.raw()), Some(format));
        }
    }

    #[test]
    fn test_source_flags_are_distinct_bits() {
        let mut seen = 0;
        for kind in SourceKind::ALL {
            assert_eq!(kind.flag().count_ones(), 1, "{} is not a single bit", kind);
            assert_eq!(seen & kind.flag(), 0);
            seen |= kind.flag();
            assert_eq!(SourceKind::from_flag(kind.flag()), Some(kind));
        }
        assert_eq!(SourceKind::from_flag(0x03), None);
    }
}
