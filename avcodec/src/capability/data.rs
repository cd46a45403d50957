// SPDX-FileCopyrightText: 2025 2025 Contributors to the AVCodec buffer manager project.
// SPDX-License-Identifier: Apache-2.0

//! Structured capability records.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::{
    range::{Range, Size},
    tables::CODEC_TYPES,
};
use crate::{Error, Result};

/// Audio or video, encoder or decoder.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CodecType {
    VideoEncoder,
    VideoDecoder,
    AudioEncoder,
    AudioDecoder,
}

impl CodecType {
    /// Integer constant used by descriptors and drivers.
    pub fn as_raw(&self) -> i32 {
        match self {
            CodecType::VideoEncoder => 0,
            CodecType::VideoDecoder => 1,
            CodecType::AudioEncoder => 2,
            CodecType::AudioDecoder => 3,
        }
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(CodecType::VideoEncoder),
            1 => Some(CodecType::VideoDecoder),
            2 => Some(CodecType::AudioEncoder),
            3 => Some(CodecType::AudioDecoder),
            _ => None,
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, CodecType::VideoEncoder | CodecType::VideoDecoder)
    }

    pub fn is_audio(&self) -> bool {
        !self.is_video()
    }

    pub fn is_encoder(&self) -> bool {
        matches!(self, CodecType::VideoEncoder | CodecType::AudioEncoder)
    }
}

impl FromStr for CodecType {
    type Err = Error;

    /// Parses a descriptor symbol such as `"VIDEO_DECODER"`.
    fn from_str(s: &str) -> Result<Self> {
        CODEC_TYPES
            .get(s)
            .and_then(CodecType::from_raw)
            .ok_or_else(|| Error::Parse(format!("unknown codec type \"{s}\"")))
    }
}

impl fmt::Display for CodecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(CODEC_TYPES.symbol(self.as_raw()).unwrap_or("UNKNOWN"))
    }
}

/// One hardware codec's advertised limits.
///
/// Range fields are `None` when the descriptor does not advertise them, and a
/// `None` range places no constraint on admission. Fields whose textual value
/// could not be parsed are also left unset, and their descriptor key is listed
/// in [`CapabilityData::incomplete`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CapabilityData {
    pub codec_name: String,
    pub codec_type: CodecType,
    pub mime_type: String,
    pub is_vendor: bool,
    pub bitrate: Option<Range>,
    pub channels: Option<Range>,
    pub complexity: Option<Range>,
    pub alignment: Option<Range>,
    pub width: Option<Range>,
    pub height: Option<Range>,
    pub frame_rate: Option<Range>,
    pub encode_quality: Option<Range>,
    pub quality: Option<Range>,
    pub block_per_frame: Option<Range>,
    pub block_per_second: Option<Range>,
    pub block_size: Option<Size>,
    pub sample_rate: Vec<i32>,
    pub format: Vec<i32>,
    pub profiles: Vec<i32>,
    pub bitrate_mode: Vec<i32>,
    pub levels: Vec<i32>,
    /// Resolution to frame-rate range measured on the hardware.
    pub measured_frame_rate: BTreeMap<Size, Range>,
    /// Descriptor keys whose values were rejected while parsing this record.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub incomplete: Vec<String>,
}

impl CapabilityData {
    /// Creates an empty record of the given type.
    pub fn new(codec_type: CodecType) -> Self {
        Self {
            codec_name: String::new(),
            codec_type,
            mime_type: String::new(),
            is_vendor: false,
            bitrate: None,
            channels: None,
            complexity: None,
            alignment: None,
            width: None,
            height: None,
            frame_rate: None,
            encode_quality: None,
            quality: None,
            block_per_frame: None,
            block_per_second: None,
            block_size: None,
            sample_rate: Vec::new(),
            format: Vec::new(),
            profiles: Vec::new(),
            bitrate_mode: Vec::new(),
            levels: Vec::new(),
            measured_frame_rate: BTreeMap::new(),
            incomplete: Vec::new(),
        }
    }

    /// `true` if every parsed field was accepted and the identifying fields are set.
    pub fn is_complete(&self) -> bool {
        self.incomplete.is_empty() && !self.codec_name.is_empty() && !self.mime_type.is_empty()
    }

    /// `true` if the value for descriptor key `key` was rejected.
    pub fn is_field_incomplete(&self, key: &str) -> bool {
        self.incomplete.iter().any(|k| k == key)
    }

    pub(crate) fn mark_incomplete(&mut self, key: &str) {
        if !self.is_field_incomplete(key) {
            self.incomplete.push(key.to_string());
        }
    }

    pub(crate) fn range_mut(&mut self, key: &str) -> Option<&mut Option<Range>> {
        Some(match key {
            "bitrate" => &mut self.bitrate,
            "channels" => &mut self.channels,
            "complexity" => &mut self.complexity,
            "alignment" => &mut self.alignment,
            "width" => &mut self.width,
            "height" => &mut self.height,
            "frameRate" => &mut self.frame_rate,
            "encodeQuality" => &mut self.encode_quality,
            "quality" => &mut self.quality,
            "blockPerFrame" => &mut self.block_per_frame,
            "blockPerSecond" => &mut self.block_per_second,
            _ => return None,
        })
    }

    pub(crate) fn vector_mut(&mut self, key: &str) -> Option<&mut Vec<i32>> {
        Some(match key {
            "sampleRate" => &mut self.sample_rate,
            "format" => &mut self.format,
            "profiles" => &mut self.profiles,
            "bitrateMode" => &mut self.bitrate_mode,
            "levels" => &mut self.levels,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_type_symbols() {
        assert_eq!(
            "AUDIO_DECODER".parse::<CodecType>().unwrap(),
            CodecType::AudioDecoder
        );
        assert_eq!(CodecType::VideoEncoder.to_string(), "VIDEO_ENCODER");
        assert!("VIDEO".parse::<CodecType>().is_err());
        assert_eq!(CodecType::from_raw(1), Some(CodecType::VideoDecoder));
    }

    #[test]
    fn incomplete_marks_are_unique() {
        let mut data = CapabilityData::new(CodecType::VideoDecoder);
        data.mark_incomplete("width");
        data.mark_incomplete("width");
        assert_eq!(data.incomplete, vec!["width".to_string()]);
        assert!(!data.is_complete());
    }
}
