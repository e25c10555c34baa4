use std::{fmt, fmt::Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    H264,
    Hevc,
    Aac,
}

impl Codec {
    /// Display name handed to the player for this codec family.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::Hevc => "hevc",
            Self::Aac => "aac",
        }
    }
}

impl Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Packs a four character code the way the player expects it: first
/// character in the lowest byte.
#[must_use]
pub const fn make_fourcc(code: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*code)
}

/// Container sample-entry type (the `stsd` child box type).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Avc1,
    Avc2,
    Avc3,
    Avc4,
    Dva1,
    Dvav,
    Hev1,
    Hvc1,
    Dvhe,
    Dvh1,
    Mp4a,
    Other([u8; 4]),
}

impl SampleFormat {
    #[must_use]
    pub fn from_box_type(box_type: [u8; 4]) -> Self {
        match &box_type {
            b"avc1" => Self::Avc1,
            b"avc2" => Self::Avc2,
            b"avc3" => Self::Avc3,
            b"avc4" => Self::Avc4,
            b"dva1" => Self::Dva1,
            b"dvav" => Self::Dvav,
            b"hev1" => Self::Hev1,
            b"hvc1" => Self::Hvc1,
            b"dvhe" => Self::Dvhe,
            b"dvh1" => Self::Dvh1,
            b"mp4a" => Self::Mp4a,
            _ => Self::Other(box_type),
        }
    }

    #[must_use]
    pub fn box_type(self) -> [u8; 4] {
        match self {
            Self::Avc1 => *b"avc1",
            Self::Avc2 => *b"avc2",
            Self::Avc3 => *b"avc3",
            Self::Avc4 => *b"avc4",
            Self::Dva1 => *b"dva1",
            Self::Dvav => *b"dvav",
            Self::Hev1 => *b"hev1",
            Self::Hvc1 => *b"hvc1",
            Self::Dvhe => *b"dvhe",
            Self::Dvh1 => *b"dvh1",
            Self::Mp4a => *b"mp4a",
            Self::Other(box_type) => box_type,
        }
    }
}

impl Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let box_type = self.box_type();
        if box_type.iter().all(u8::is_ascii_graphic) {
            f.write_str(&String::from_utf8_lossy(&box_type))
        } else {
            write!(f, "{:02x?}", box_type)
        }
    }
}

/// Width of the big-endian length field in front of each NAL unit of a
/// length-prefixed sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NaluLengthSize {
    One,
    Two,
    #[default]
    Four,
}

impl NaluLengthSize {
    #[must_use]
    pub fn bytes(self) -> usize {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Four => 4,
        }
    }
}

impl TryFrom<u8> for NaluLengthSize {
    type Error = DemuxError;

    fn try_from(bytes: u8) -> std::result::Result<Self, Self::Error> {
        match bytes {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            4 => Ok(Self::Four),
            other => Err(DemuxError::InvalidConfiguration(format!(
                "unsupported NAL unit length field size: {other} bytes"
            ))),
        }
    }
}

/// Player-facing stream metadata. Every `update_*` call writes only when the
/// value differs and reports whether it wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamInfo {
    pub codec_name: String,
    pub codec_fourcc: u32,
    pub fps_rate: u32,
    pub fps_scale: u32,
    pub sample_rate: u32,
    pub channels: u32,
}

impl StreamInfo {
    pub fn update_codec_name(&mut self, name: &str) -> bool {
        if self.codec_name == name {
            return false;
        }
        self.codec_name = name.to_string();
        true
    }

    /// A zero fourcc means "unknown" and never overwrites.
    pub fn update_codec_fourcc(&mut self, fourcc: u32) -> bool {
        if fourcc == 0 || self.codec_fourcc == fourcc {
            return false;
        }
        self.codec_fourcc = fourcc;
        true
    }

    pub fn update_sample_rate(&mut self, sample_rate: u32) -> bool {
        if sample_rate == 0 || self.sample_rate == sample_rate {
            return false;
        }
        self.sample_rate = sample_rate;
        true
    }

    pub fn update_channels(&mut self, channels: u32) -> bool {
        if channels == 0 || self.channels == channels {
            return false;
        }
        self.channels = channels;
        true
    }
}

impl Display for StreamInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StreamInfo(codec={}, fourcc={:#010x}, fps={}/{}, sample_rate={}, channels={})",
            self.codec_name,
            self.codec_fourcc,
            self.fps_rate,
            self.fps_scale,
            self.sample_rate,
            self.channels
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DemuxError {
    #[error("sample description {format} is not a {expected} description")]
    UnsupportedVariant { expected: Codec, format: SampleFormat },
    #[error("annex-b conversion does not apply to {0} samples")]
    NotApplicable(SampleFormat),
    #[error("decoder configuration has no parameter set arrays")]
    EmptyConfiguration,
    #[error("invalid decoder configuration: {0}")]
    InvalidConfiguration(String),
    #[error("invalid bitstream: {0}")]
    InvalidBitstream(String),
    #[error("stream format error: {0}")]
    StreamFormat(String),
    #[error("byte stream error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DemuxError>;
