// SPDX-FileCopyrightText: 2025 2025 Contributors to the AVCodec buffer manager project.
// SPDX-License-Identifier: Apache-2.0

//! Immutable capability collection and configuration admission.

use std::{collections::HashMap, path::Path};

use tracing::{debug, info};

use super::{
    data::{CapabilityData, CodecType},
    parser::CapabilityParser,
    range::Range,
};
use crate::{
    Error, MediaFormat, Result,
    format::{FormatValue, keys},
};

/// Tolerance when comparing floating point frame rates against integer ranges.
const FRAME_RATE_EPSILON: f64 = 0.0001;

/// Parsed capability records indexed by `(codec type, MIME type)`.
///
/// The collection is read-only after construction and can be shared across
/// threads without synchronization.
///
/// # Examples
///
/// ```
/// use avcodec::{CapabilityList, CodecType, MediaFormat, format::keys};
///
/// # fn main() -> Result<(), avcodec::Error> {
/// let list = CapabilityList::from_document(r#"
///     <Codecs><VideoDecoder>
///         <Item codecName="avc.dec"/><Item mimeType="video/avc"/>
///         <Item width="2-1920"/><Item height="2-1080"/>
///     </VideoDecoder></Codecs>"#)?;
///
/// let mut format = MediaFormat::new();
/// format
///     .set_string(keys::CODEC_MIME, "video/avc")
///     .set_int(keys::WIDTH, 1280)
///     .set_int(keys::HEIGHT, 720);
/// assert_eq!(list.find_video_decoder(&format).as_deref(), Some("avc.dec"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct CapabilityList {
    records: Vec<CapabilityData>,
    index: HashMap<(CodecType, String), Vec<usize>>,
}

impl CapabilityList {
    /// Builds the collection from already parsed records, keeping their order.
    pub fn from_records(records: Vec<CapabilityData>) -> Self {
        let mut index: HashMap<(CodecType, String), Vec<usize>> = HashMap::new();
        for (position, record) in records.iter().enumerate() {
            index
                .entry((record.codec_type, record.mime_type.clone()))
                .or_default()
                .push(position);
        }
        Self { records, index }
    }

    /// Loads and parses the descriptor at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the descriptor is unreadable or malformed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut parser = CapabilityParser::new(path);
        parser.load_configuration()?;
        let records = parser.parse()?;
        info!("Capability list holds {} codecs", records.len());
        Ok(Self::from_records(records))
    }

    /// Parses an in-memory descriptor.
    pub fn from_document(document: &str) -> Result<Self> {
        let mut parser = CapabilityParser::from_document(document);
        Ok(Self::from_records(parser.parse()?))
    }

    pub fn records(&self) -> &[CapabilityData] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records advertising `codec_type` for `mime`, in descriptor order.
    pub fn lookup<'a>(
        &'a self,
        codec_type: CodecType,
        mime: &str,
    ) -> impl Iterator<Item = &'a CapabilityData> + 'a {
        self.index
            .get(&(codec_type, mime.to_string()))
            .into_iter()
            .flatten()
            .map(move |position| &self.records[*position])
    }

    pub fn find_by_name(&self, codec_name: &str) -> Option<&CapabilityData> {
        self.records
            .iter()
            .find(|record| record.codec_name == codec_name)
    }

    /// Returns the first record of `codec_type` that supports `format`.
    ///
    /// `codec_mime` is mandatory; every other key constrains only when present.
    pub fn find_codec(
        &self,
        format: &MediaFormat,
        codec_type: CodecType,
    ) -> Option<&CapabilityData> {
        let mime = format.get_string(keys::CODEC_MIME)?;
        self.lookup(codec_type, mime)
            .find(|record| check_format(record, format).is_ok())
    }

    pub fn find_video_decoder(&self, format: &MediaFormat) -> Option<String> {
        self.find_name(format, CodecType::VideoDecoder)
    }

    pub fn find_video_encoder(&self, format: &MediaFormat) -> Option<String> {
        self.find_name(format, CodecType::VideoEncoder)
    }

    pub fn find_audio_decoder(&self, format: &MediaFormat) -> Option<String> {
        self.find_name(format, CodecType::AudioDecoder)
    }

    pub fn find_audio_encoder(&self, format: &MediaFormat) -> Option<String> {
        self.find_name(format, CodecType::AudioEncoder)
    }

    fn find_name(&self, format: &MediaFormat, codec_type: CodecType) -> Option<String> {
        self.find_codec(format, codec_type)
            .map(|record| record.codec_name.clone())
    }

    /// Validates a configuration request before it reaches hardware.
    ///
    /// When `format` names a codec (`codec_name`) that record alone is checked;
    /// otherwise the first record matching `codec_mime` wins.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedConfig`] naming the first violated key, or
    /// [`Error::IllegalArgument`] if neither a codec name nor a MIME type is given.
    pub fn admit(&self, format: &MediaFormat, codec_type: CodecType) -> Result<&CapabilityData> {
        if let Some(name) = format.get_string(keys::CODEC_NAME) {
            let record = self.find_by_name(name).ok_or_else(|| {
                Error::UnsupportedConfig(format!("no codec named \"{name}\""))
            })?;
            if record.codec_type != codec_type {
                return Err(Error::UnsupportedConfig(format!(
                    "codec \"{name}\" is a {} not a {}",
                    record.codec_type, codec_type
                )));
            }
            check_format(record, format)?;
            debug!("Admitted {} for codec \"{}\"", format, name);
            return Ok(record);
        }

        let mime = format.get_string(keys::CODEC_MIME).ok_or_else(|| {
            Error::IllegalArgument("format selects neither a codec name nor a MIME type".into())
        })?;
        let mut first_error = None;
        for record in self.lookup(codec_type, mime) {
            match check_format(record, format) {
                Ok(()) => {
                    debug!("Admitted {} for codec \"{}\"", format, record.codec_name);
                    return Ok(record);
                }
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        Err(first_error.unwrap_or_else(|| {
            Error::UnsupportedConfig(format!("no {codec_type} advertises \"{mime}\""))
        }))
    }
}

/// Checks every constrained key of `format` against `record`.
pub(crate) fn check_format(record: &CapabilityData, format: &MediaFormat) -> Result<()> {
    if let Some(mime) = format.get_string(keys::CODEC_MIME)
        && mime != record.mime_type
    {
        return Err(unsupported(record, keys::CODEC_MIME, mime));
    }

    check_range(record, format, keys::BITRATE, "bitrate", record.bitrate)?;

    check_range(record, format, keys::WIDTH, "width", record.width)?;
    check_range(record, format, keys::HEIGHT, "height", record.height)?;

    if record.codec_type.is_video() {
        check_member(record, format, keys::PIXEL_FORMAT, "format", &record.format)?;
        check_frame_rate(record, format)?;
    } else {
        check_member(record, format, keys::SAMPLE_RATE, "sampleRate", &record.sample_rate)?;
        check_range(record, format, keys::CHANNEL_COUNT, "channels", record.channels)?;
    }

    check_member(record, format, keys::PROFILE, "profiles", &record.profiles)?;
    check_member(record, format, keys::BITRATE_MODE, "bitrateMode", &record.bitrate_mode)?;
    Ok(())
}

fn unsupported(record: &CapabilityData, key: &str, value: impl std::fmt::Display) -> Error {
    Error::UnsupportedConfig(format!(
        "{key}={value} is not supported by \"{}\"",
        record.codec_name
    ))
}

fn requested_int(format: &MediaFormat, key: &str) -> Result<Option<i32>> {
    if !format.contains_key(key) {
        return Ok(None);
    }
    format
        .get_int(key)
        .map(Some)
        .ok_or_else(|| Error::IllegalArgument(format!("\"{key}\" must be an integer")))
}

fn check_range(
    record: &CapabilityData,
    format: &MediaFormat,
    key: &str,
    field: &str,
    range: Option<Range>,
) -> Result<()> {
    let Some(value) = requested_int(format, key)? else {
        return Ok(());
    };
    if record.is_field_incomplete(field) {
        return Err(unsupported(record, key, value));
    }
    match range {
        Some(range) if !range.contains(value) => Err(unsupported(record, key, value)),
        _ => Ok(()),
    }
}

fn check_member(
    record: &CapabilityData,
    format: &MediaFormat,
    key: &str,
    field: &str,
    values: &[i32],
) -> Result<()> {
    let Some(value) = requested_int(format, key)? else {
        return Ok(());
    };
    if record.is_field_incomplete(field) || (!values.is_empty() && !values.contains(&value)) {
        return Err(unsupported(record, key, value));
    }
    Ok(())
}

fn check_frame_rate(record: &CapabilityData, format: &MediaFormat) -> Result<()> {
    let Some(value) = format.get(keys::FRAME_RATE) else {
        return Ok(());
    };
    if record.is_field_incomplete("frameRate") {
        return Err(unsupported(record, keys::FRAME_RATE, value));
    }
    let Some(range) = record.frame_rate else {
        return Ok(());
    };
    let supported = match value {
        FormatValue::Int(rate) => range.contains(*rate),
        FormatValue::Long(rate) => i32::try_from(*rate).is_ok_and(|rate| range.contains(rate)),
        FormatValue::Double(rate) => range.contains_f64(*rate, FRAME_RATE_EPSILON),
        FormatValue::String(_) => {
            return Err(Error::IllegalArgument(format!(
                "\"{}\" must be numeric",
                keys::FRAME_RATE
            )));
        }
    };
    if supported {
        Ok(())
    } else {
        Err(unsupported(record, keys::FRAME_RATE, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list() -> CapabilityList {
        CapabilityList::from_document(
            r#"<Codecs>
                <VideoDecoder>
                    <Item codecName="avc.small"/><Item mimeType="video/avc"/>
                    <Item width="2-720"/><Item height="2-576"/><Item frameRate="1-30"/>
                    <Item format="NV12"/>
                </VideoDecoder>
                <VideoDecoder>
                    <Item codecName="avc.large"/><Item mimeType="video/avc"/>
                    <Item width="2-1920"/><Item height="2-1080"/><Item frameRate="1-60"/>
                    <Item format="NV12,NV21"/><Item profiles="AVCBaseline,AVCMain"/>
                </VideoDecoder>
                <AudioDecoder>
                    <Item codecName="aac.dec"/><Item mimeType="audio/mp4a-latm"/>
                    <Item channels="1-8"/><Item sampleRate="44100,48000"/>
                    <Item bitrate="8000-x"/>
                </AudioDecoder>
            </Codecs>"#,
        )
        .unwrap()
    }

    fn video(width: i32, height: i32) -> MediaFormat {
        let mut format = MediaFormat::new();
        format
            .set_string(keys::CODEC_MIME, "video/avc")
            .set_int(keys::WIDTH, width)
            .set_int(keys::HEIGHT, height);
        format
    }

    #[test]
    fn first_matching_record_wins() {
        let list = list();
        assert_eq!(list.find_video_decoder(&video(640, 480)).as_deref(), Some("avc.small"));
        assert_eq!(list.find_video_decoder(&video(1280, 720)).as_deref(), Some("avc.large"));
        assert_eq!(list.find_video_decoder(&video(3840, 2160)), None);
        assert_eq!(list.find_video_encoder(&video(640, 480)), None);
    }

    #[test]
    fn width_alone_is_checked() {
        let mut format = MediaFormat::new();
        format
            .set_string(keys::CODEC_MIME, "video/avc")
            .set_int(keys::WIDTH, 3840);
        assert!(list().find_video_decoder(&format).is_none());
        format.set_int(keys::WIDTH, 1280);
        assert_eq!(list().find_video_decoder(&format).as_deref(), Some("avc.large"));
    }

    #[test]
    fn double_frame_rates_use_tolerance() {
        let list = list();
        let mut format = video(640, 480);
        format.set_double(keys::FRAME_RATE, 30.00001);
        assert_eq!(list.find_video_decoder(&format).as_deref(), Some("avc.small"));
        format.set_double(keys::FRAME_RATE, 59.94);
        assert_eq!(list.find_video_decoder(&format).as_deref(), Some("avc.large"));
    }

    #[test]
    fn pixel_format_and_profile_are_checked() {
        let list = list();
        let mut format = video(640, 480);
        format.set_int(keys::PIXEL_FORMAT, 3);
        assert_eq!(list.find_video_decoder(&format).as_deref(), Some("avc.large"));
        format.set_int(keys::PROFILE, 4);
        assert!(matches!(
            list.admit(&format, CodecType::VideoDecoder),
            Err(Error::UnsupportedConfig(_))
        ));
    }

    #[test]
    fn audio_keys_are_checked() {
        let list = list();
        let mut format = MediaFormat::new();
        format
            .set_string(keys::CODEC_MIME, "audio/mp4a-latm")
            .set_int(keys::SAMPLE_RATE, 48000)
            .set_int(keys::CHANNEL_COUNT, 2);
        assert_eq!(list.find_audio_decoder(&format).as_deref(), Some("aac.dec"));
        format.set_int(keys::SAMPLE_RATE, 22050);
        assert_eq!(list.find_audio_decoder(&format), None);
    }

    #[test]
    fn incomplete_fields_reject_constrained_keys() {
        let list = list();
        let mut format = MediaFormat::new();
        format
            .set_string(keys::CODEC_MIME, "audio/mp4a-latm")
            .set_int(keys::BITRATE, 64000);
        assert!(list.find_audio_decoder(&format).is_none());
    }

    #[test]
    fn admit_by_name() {
        let list = list();
        let mut format = video(1280, 720);
        format.set_string(keys::CODEC_NAME, "avc.small");
        let err = list.admit(&format, CodecType::VideoDecoder).unwrap_err();
        assert!(matches!(err, Error::UnsupportedConfig(_)));
        format.set_string(keys::CODEC_NAME, "avc.large");
        assert_eq!(
            list.admit(&format, CodecType::VideoDecoder).unwrap().codec_name,
            "avc.large"
        );
        assert!(list.admit(&format, CodecType::AudioDecoder).is_err());
    }

    #[test]
    fn missing_selection_is_an_argument_error() {
        assert!(matches!(
            list().admit(&MediaFormat::new(), CodecType::VideoDecoder),
            Err(Error::IllegalArgument(_))
        ));
    }
}
