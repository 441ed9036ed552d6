/// Caller-supplied download options and the format enums they select from.
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Audio container/codec requested from the resolution service.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Ogg,
    Wav,
    Opus,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 4] = [
        AudioFormat::Mp3,
        AudioFormat::Ogg,
        AudioFormat::Wav,
        AudioFormat::Opus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Wav => "wav",
            AudioFormat::Opus => "opus",
        }
    }

    /// File extension used for audio-only saves.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == wanted)
            .ok_or_else(|| format!("unknown audio format '{}'", s))
    }
}

/// Video codec requested when downloading video.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VideoCodec {
    #[default]
    H264,
    Av1,
    Vp9,
}

impl VideoCodec {
    pub const ALL: [VideoCodec; 3] = [VideoCodec::H264, VideoCodec::Av1, VideoCodec::Vp9];

    pub fn as_str(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "h264",
            VideoCodec::Av1 => "av1",
            VideoCodec::Vp9 => "vp9",
        }
    }
}

impl std::fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VideoCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| format!("unknown video codec '{}'", s))
    }
}

/// Vertical video resolution. Sent on the wire as a decimal string ("1080").
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum VideoQuality {
    #[default]
    #[serde(rename = "144")]
    P144,
    #[serde(rename = "240")]
    P240,
    #[serde(rename = "360")]
    P360,
    #[serde(rename = "480")]
    P480,
    #[serde(rename = "720")]
    P720,
    #[serde(rename = "1080")]
    P1080,
    #[serde(rename = "1440")]
    P1440,
    #[serde(rename = "2160")]
    P2160,
}

impl VideoQuality {
    pub const ALL: [VideoQuality; 8] = [
        VideoQuality::P144,
        VideoQuality::P240,
        VideoQuality::P360,
        VideoQuality::P480,
        VideoQuality::P720,
        VideoQuality::P1080,
        VideoQuality::P1440,
        VideoQuality::P2160,
    ];

    pub fn lines(&self) -> u16 {
        match self {
            VideoQuality::P144 => 144,
            VideoQuality::P240 => 240,
            VideoQuality::P360 => 360,
            VideoQuality::P480 => 480,
            VideoQuality::P720 => 720,
            VideoQuality::P1080 => 1080,
            VideoQuality::P1440 => 1440,
            VideoQuality::P2160 => 2160,
        }
    }
}

impl std::fmt::Display for VideoQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.lines())
    }
}

impl FromStr for VideoQuality {
    type Err = String;

    /// Accepts "1080" as well as "1080p".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().to_ascii_lowercase();
        let digits = trimmed.strip_suffix('p').unwrap_or(&trimmed);
        let lines: u16 = digits
            .parse()
            .map_err(|_| format!("unknown video quality '{}'", s))?;
        Self::ALL
            .into_iter()
            .find(|q| q.lines() == lines)
            .ok_or_else(|| format!("unsupported video quality '{}'", s))
    }
}

/// Everything the caller decides about a single download.
///
/// `video_codec` and `video_quality` only matter when `audio_only` is false.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadOptions {
    pub url: String,
    pub audio_only: bool,
    pub audio_format: AudioFormat,
    pub video_codec: VideoCodec,
    pub video_quality: VideoQuality,
}

impl DownloadOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn audio_only(mut self, format: AudioFormat) -> Self {
        self.audio_only = true;
        self.audio_format = format;
        self
    }

    pub fn with_audio_format(mut self, format: AudioFormat) -> Self {
        self.audio_format = format;
        self
    }

    pub fn with_video(mut self, codec: VideoCodec, quality: VideoQuality) -> Self {
        self.audio_only = false;
        self.video_codec = codec;
        self.video_quality = quality;
        self
    }
}
