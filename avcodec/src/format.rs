// SPDX-FileCopyrightText: 2025 2025 Contributors to the AVCodec buffer manager project.
// SPDX-License-Identifier: Apache-2.0

//! Key-value media format descriptor.
//!
//! A [`MediaFormat`] carries codec selection (by name or MIME type) and the
//! per-field configuration requested by the service layer. It serializes to a
//! flat JSON object:
//!
//! ```
//! use avcodec::{MediaFormat, format::keys};
//!
//! let format: MediaFormat = serde_json::from_str(
//!     r#"{"codec_mime": "video/avc", "width": 1920, "height": 1080, "frame_rate": 29.97}"#,
//! ).unwrap();
//! assert_eq!(format.get_int(keys::WIDTH), Some(1920));
//! assert_eq!(format.get_double(keys::FRAME_RATE), Some(29.97));
//! ```

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

/// Well known format keys.
pub mod keys {
    pub const CODEC_MIME: &str = "codec_mime";
    pub const CODEC_NAME: &str = "codec_name";
    pub const BITRATE: &str = "bitrate";
    pub const WIDTH: &str = "width";
    pub const HEIGHT: &str = "height";
    pub const PIXEL_FORMAT: &str = "pixel_format";
    pub const FRAME_RATE: &str = "frame_rate";
    pub const SAMPLE_RATE: &str = "samplerate";
    pub const CHANNEL_COUNT: &str = "channel_count";
    pub const PROFILE: &str = "codec_profile";
    pub const BITRATE_MODE: &str = "video_encode_bitrate_mode";
    pub const MAX_INPUT_SIZE: &str = "max_input_size";
    pub const AUDIO_SAMPLE_FORMAT: &str = "audio_sample_format";
}

/// A typed format value.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum FormatValue {
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
}

/// Discriminant of a [`FormatValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatValueType {
    Int,
    Long,
    Double,
    String,
}

impl FormatValue {
    pub fn value_type(&self) -> FormatValueType {
        match self {
            FormatValue::Int(_) => FormatValueType::Int,
            FormatValue::Long(_) => FormatValueType::Long,
            FormatValue::Double(_) => FormatValueType::Double,
            FormatValue::String(_) => FormatValueType::String,
        }
    }
}

impl fmt::Display for FormatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatValue::Int(v) => write!(f, "{v}"),
            FormatValue::Long(v) => write!(f, "{v}"),
            FormatValue::Double(v) => write!(f, "{v}"),
            FormatValue::String(v) => f.write_str(v),
        }
    }
}

/// Ordered map of format keys to typed values.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(transparent)]
pub struct MediaFormat {
    values: BTreeMap<String, FormatValue>,
}

impl MediaFormat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_int(&mut self, key: &str, value: i32) -> &mut Self {
        self.values.insert(key.to_string(), FormatValue::Int(value));
        self
    }

    pub fn set_long(&mut self, key: &str, value: i64) -> &mut Self {
        self.values.insert(key.to_string(), FormatValue::Long(value));
        self
    }

    pub fn set_double(&mut self, key: &str, value: f64) -> &mut Self {
        self.values.insert(key.to_string(), FormatValue::Double(value));
        self
    }

    pub fn set_string(&mut self, key: &str, value: &str) -> &mut Self {
        self.values
            .insert(key.to_string(), FormatValue::String(value.to_string()));
        self
    }

    /// Integer value of `key`. Longs that fit are narrowed.
    pub fn get_int(&self, key: &str) -> Option<i32> {
        match self.values.get(key)? {
            FormatValue::Int(v) => Some(*v),
            FormatValue::Long(v) => i32::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn get_long(&self, key: &str) -> Option<i64> {
        match self.values.get(key)? {
            FormatValue::Int(v) => Some(i64::from(*v)),
            FormatValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Floating point value of `key`. Integers are widened.
    pub fn get_double(&self, key: &str) -> Option<f64> {
        match self.values.get(key)? {
            FormatValue::Int(v) => Some(f64::from(*v)),
            FormatValue::Long(v) => Some(*v as f64),
            FormatValue::Double(v) => Some(*v),
            FormatValue::String(_) => None,
        }
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.values.get(key)? {
            FormatValue::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&FormatValue> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn value_type(&self, key: &str) -> Option<FormatValueType> {
        self.values.get(key).map(FormatValue::value_type)
    }

    pub fn remove(&mut self, key: &str) -> Option<FormatValue> {
        self.values.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copies every entry of `other` over this format.
    pub fn merge(&mut self, other: &MediaFormat) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.values {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value}")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_access() {
        let mut format = MediaFormat::new();
        format
            .set_string(keys::CODEC_MIME, "audio/flac")
            .set_int(keys::SAMPLE_RATE, 48000)
            .set_long("duration", 10_000_000_000);
        assert_eq!(format.get_string(keys::CODEC_MIME), Some("audio/flac"));
        assert_eq!(format.get_double(keys::SAMPLE_RATE), Some(48000.0));
        assert_eq!(format.get_int("duration"), None);
        assert_eq!(format.get_int(keys::CODEC_MIME), None);
        assert_eq!(format.value_type(keys::SAMPLE_RATE), Some(FormatValueType::Int));
    }

    #[test]
    fn json_values_keep_their_type() {
        let format: MediaFormat =
            serde_json::from_str(r#"{"frame_rate": 30, "bitrate": 5000000000, "x": 1.5}"#).unwrap();
        assert_eq!(format.value_type("frame_rate"), Some(FormatValueType::Int));
        assert_eq!(format.value_type("bitrate"), Some(FormatValueType::Long));
        assert_eq!(format.value_type("x"), Some(FormatValueType::Double));
        assert_eq!(format.to_string(), "bitrate=5000000000, frame_rate=30, x=1.5");
    }
}
