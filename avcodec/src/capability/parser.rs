// SPDX-FileCopyrightText: 2025 2025 Contributors to the AVCodec buffer manager project.
// SPDX-License-Identifier: Apache-2.0

//! Capability descriptor parser.
//!
//! A descriptor is a hierarchical document. Grouping nodes (`Codecs`,
//! `AudioCodecs`, `VideoCodecs`, or anything else) are walked recursively;
//! leaf nodes (`AudioDecoder`, `AudioEncoder`, `VideoDecoder`, `VideoEncoder`)
//! each produce one [`CapabilityData`] from the attributes of their direct
//! `Item` children:
//!
//! ```xml
//! <Codecs>
//!   <VideoCodecs>
//!     <VideoDecoder>
//!       <Item codecName="video_decoder.avc"/>
//!       <Item codecType="VIDEO_DECODER"/>
//!       <Item mimeType="video/avc"/>
//!       <Item width="2-1920"/>
//!       <Item profiles="AVCBaseline,AVCMain"/>
//!     </VideoDecoder>
//!   </VideoCodecs>
//! </Codecs>
//! ```
//!
//! Every attribute is dispatched through a static key to kind table. A value
//! that cannot be converted leaves its field unset, is logged, and is listed in
//! [`CapabilityData::incomplete`]; the rest of the record and of the document
//! is still parsed. Unknown keys are reported as
//! [`Error::UnrecognizedKey`] diagnostics and otherwise ignored.

use std::path::{Path, PathBuf};

use quick_xml::{Reader, events::BytesStart, events::Event};
use tracing::{debug, info, warn};

use super::{
    data::{CapabilityData, CodecType},
    range::{parse_int, parse_size_range_map},
    tables::VECTOR_TABLES,
};
use crate::{Error, Result};

/// Typed setter selected for a descriptor key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    String,
    CodecType,
    Bool,
    Size,
    HashRange,
    Range,
    Vector,
}

const FIELD_KINDS: &[(&str, FieldKind)] = &[
    ("codecName", FieldKind::String),
    ("mimeType", FieldKind::String),
    ("codecType", FieldKind::CodecType),
    ("isVendor", FieldKind::Bool),
    ("blockSize", FieldKind::Size),
    ("measuredFrameRate", FieldKind::HashRange),
    ("bitrate", FieldKind::Range),
    ("channels", FieldKind::Range),
    ("complexity", FieldKind::Range),
    ("alignment", FieldKind::Range),
    ("width", FieldKind::Range),
    ("height", FieldKind::Range),
    ("frameRate", FieldKind::Range),
    ("encodeQuality", FieldKind::Range),
    ("quality", FieldKind::Range),
    ("blockPerFrame", FieldKind::Range),
    ("blockPerSecond", FieldKind::Range),
    ("sampleRate", FieldKind::Vector),
    ("format", FieldKind::Vector),
    ("profiles", FieldKind::Vector),
    ("bitrateMode", FieldKind::Vector),
    ("levels", FieldKind::Vector),
];

fn field_kind(key: &str) -> Option<FieldKind> {
    FIELD_KINDS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, kind)| *kind)
}

/// A field rejected while parsing a descriptor.
#[derive(Debug)]
pub struct FieldDiagnostic {
    /// Name of the record the field belongs to, possibly empty if the name
    /// had not been seen yet.
    pub codec_name: String,
    pub key: String,
    pub value: String,
    pub error: Error,
}

/// Loads and parses a capability descriptor.
///
/// # Examples
///
/// ```no_run
/// use avcodec::{CapabilityParser, config::get_caps_path};
///
/// # fn main() -> Result<(), avcodec::Error> {
/// let mut parser = CapabilityParser::new(get_caps_path());
/// parser.load_configuration()?;
/// let records = parser.parse()?;
/// for diagnostic in parser.diagnostics() {
///     eprintln!("{}: {}", diagnostic.key, diagnostic.error);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CapabilityParser {
    path: Option<PathBuf>,
    document: Option<String>,
    diagnostics: Vec<FieldDiagnostic>,
}

impl CapabilityParser {
    /// Creates a parser reading the descriptor at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            document: None,
            diagnostics: Vec::new(),
        }
    }

    /// Creates a parser over an in-memory descriptor, already loaded.
    pub fn from_document(document: impl Into<String>) -> Self {
        Self {
            path: None,
            document: Some(document.into()),
            diagnostics: Vec::new(),
        }
    }

    /// Reads the descriptor source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the source is unreadable.
    pub fn load_configuration(&mut self) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let document = std::fs::read_to_string(path).map_err(|err| {
            Error::Parse(format!(
                "cannot read capability descriptor \"{}\": {}",
                path.display(),
                err
            ))
        })?;
        info!("Loaded capability descriptor \"{}\"", path.display());
        self.document = Some(document);
        Ok(())
    }

    /// Walks the loaded document and returns one record per leaf node.
    ///
    /// # Errors
    ///
    /// - [`Error::IllegalState`] if [`Self::load_configuration`] has not succeeded
    /// - [`Error::Parse`] if the document has no root element or is not well formed
    pub fn parse(&mut self) -> Result<Vec<CapabilityData>> {
        let document = self.document.as_deref().ok_or_else(|| {
            Error::IllegalState("capability descriptor has not been loaded".to_string())
        })?;
        let (records, diagnostics) = walk(document)?;
        debug!(
            "Parsed {} capability records, {} rejected fields",
            records.len(),
            diagnostics.len()
        );
        self.diagnostics = diagnostics;
        Ok(records)
    }

    /// Fields rejected by the last [`Self::parse`].
    pub fn diagnostics(&self) -> &[FieldDiagnostic] {
        &self.diagnostics
    }
}

/// Record under construction and the depth of its leaf node.
struct OpenRecord {
    data: CapabilityData,
    depth: usize,
}

fn leaf_codec_type(name: &[u8]) -> Option<CodecType> {
    match name {
        b"AudioDecoder" => Some(CodecType::AudioDecoder),
        b"AudioEncoder" => Some(CodecType::AudioEncoder),
        b"VideoDecoder" => Some(CodecType::VideoDecoder),
        b"VideoEncoder" => Some(CodecType::VideoEncoder),
        _ => None,
    }
}

fn walk(document: &str) -> Result<(Vec<CapabilityData>, Vec<FieldDiagnostic>)> {
    let mut reader = Reader::from_str(document);
    reader.config_mut().trim_text(true);

    let mut records = Vec::new();
    let mut diagnostics = Vec::new();
    let mut open: Option<OpenRecord> = None;
    let mut depth = 0usize;
    let mut saw_root = false;

    loop {
        let event = reader.read_event().map_err(|err| {
            Error::Parse(format!(
                "malformed descriptor at byte {}: {}",
                reader.buffer_position(),
                err
            ))
        })?;
        match event {
            Event::Start(element) => {
                saw_root = true;
                open_element(&element, depth, &mut open, &mut diagnostics)?;
                depth += 1;
            }
            Event::Empty(element) => {
                saw_root = true;
                open_element(&element, depth, &mut open, &mut diagnostics)?;
                if open.as_ref().is_some_and(|record| record.depth == depth) {
                    close_record(&mut open, &mut records);
                }
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if open.as_ref().is_some_and(|record| record.depth == depth) {
                    close_record(&mut open, &mut records);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(Error::Parse(
            "capability descriptor has no root element".to_string(),
        ));
    }
    Ok((records, diagnostics))
}

fn open_element(
    element: &BytesStart<'_>,
    depth: usize,
    open: &mut Option<OpenRecord>,
    diagnostics: &mut Vec<FieldDiagnostic>,
) -> Result<()> {
    let name = element.name();
    match open {
        Some(record) => {
            if name.as_ref() == b"Item" && depth == record.depth + 1 {
                apply_item(element, &mut record.data, diagnostics)?;
            }
        }
        None => {
            if let Some(codec_type) = leaf_codec_type(name.as_ref()) {
                *open = Some(OpenRecord {
                    data: CapabilityData::new(codec_type),
                    depth,
                });
            }
        }
    }
    Ok(())
}

fn close_record(open: &mut Option<OpenRecord>, records: &mut Vec<CapabilityData>) {
    if let Some(record) = open.take() {
        let data = record.data;
        if data.codec_name.is_empty() || data.mime_type.is_empty() {
            warn!(
                "Capability record \"{}\" ({}) lacks a codec name or MIME type",
                data.codec_name, data.codec_type
            );
        }
        records.push(data);
    }
}

fn apply_item(
    element: &BytesStart<'_>,
    data: &mut CapabilityData,
    diagnostics: &mut Vec<FieldDiagnostic>,
) -> Result<()> {
    for attribute in element.attributes() {
        let attribute = attribute
            .map_err(|err| Error::Parse(format!("malformed descriptor attribute: {err}")))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|err| Error::Parse(format!("malformed value for \"{key}\": {err}")))?
            .into_owned();

        if let Err(error) = set_field(data, &key, &value) {
            if matches!(error, Error::UnrecognizedKey(_)) {
                warn!("Ignoring unrecognized capability key \"{}\"", key);
            } else {
                warn!(
                    "Rejected \"{}\"=\"{}\" for codec \"{}\": {}",
                    key, value, data.codec_name, error
                );
                reset_field(data, &key);
                data.mark_incomplete(&key);
            }
            diagnostics.push(FieldDiagnostic {
                codec_name: data.codec_name.clone(),
                key,
                value,
                error,
            });
        }
    }
    Ok(())
}

/// Converts `value` according to the kind of `key` and stores it in `data`.
pub(crate) fn set_field(data: &mut CapabilityData, key: &str, value: &str) -> Result<()> {
    let kind = field_kind(key).ok_or_else(|| Error::UnrecognizedKey(key.to_string()))?;
    match kind {
        FieldKind::String => {
            if key == "codecName" {
                data.codec_name = value.to_string();
            } else {
                data.mime_type = value.to_string();
            }
        }
        FieldKind::CodecType => data.codec_type = value.parse()?,
        FieldKind::Bool => data.is_vendor = parse_bool(value)?,
        FieldKind::Size => data.block_size = Some(value.parse()?),
        FieldKind::HashRange => data.measured_frame_rate = parse_size_range_map(value)?,
        FieldKind::Range => {
            let range = value.parse()?;
            if let Some(slot) = data.range_mut(key) {
                *slot = Some(range);
            }
        }
        FieldKind::Vector => {
            let values = parse_vector(value)?;
            if let Some(slot) = data.vector_mut(key) {
                *slot = values;
            }
        }
    }
    Ok(())
}

fn reset_field(data: &mut CapabilityData, key: &str) {
    match field_kind(key) {
        Some(FieldKind::Size) => data.block_size = None,
        Some(FieldKind::HashRange) => data.measured_frame_rate.clear(),
        Some(FieldKind::Range) => {
            if let Some(slot) = data.range_mut(key) {
                *slot = None;
            }
        }
        Some(FieldKind::Vector) => {
            if let Some(slot) = data.vector_mut(key) {
                slot.clear();
            }
        }
        // Strings never fail; the codec type keeps the leaf node's type.
        Some(FieldKind::Bool) => data.is_vendor = false,
        Some(FieldKind::String) | Some(FieldKind::CodecType) | None => {}
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(Error::Parse(format!("\"{other}\" is not a boolean"))),
    }
}

/// Resolves a comma separated list to integers.
///
/// The first token decides the mapping: the first symbol table containing it
/// resolves every token, and a token missing from that table fails the field.
/// If no table knows the first token, every token must be a decimal integer.
pub(crate) fn parse_vector(value: &str) -> Result<Vec<i32>> {
    if value.is_empty() {
        return Err(Error::Parse("empty value list".to_string()));
    }
    let tokens: Vec<&str> = value.strip_suffix(',').unwrap_or(value).split(',').collect();
    let probe = tokens[0];

    match VECTOR_TABLES.iter().find(|table| table.contains(probe)) {
        Some(table) => tokens
            .iter()
            .map(|token| {
                table.get(token).ok_or_else(|| {
                    Error::Parse(format!("\"{token}\" is not a known {}", table.name))
                })
            })
            .collect(),
        None => tokens.iter().map(|token| parse_int(token, value)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    use crate::capability::range::{Range, Size};

    const DESCRIPTOR: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Codecs>
    <VideoCodecs>
        <VideoDecoder>
            <Item codecName="video_decoder.avc"/>
            <Item codecType="VIDEO_DECODER"/>
            <Item mimeType="video/avc"/>
            <Item isVendor="true"/>
            <Item width="2-1920"/>
            <Item height="2-1080"/>
            <Item blockSize="16x16"/>
            <Item measuredFrameRate="320x240@1-120,1920x1080@1-30"/>
            <Item profiles="AVCBaseline,AVCMain"/>
            <Item format="NV12,NV21"/>
        </VideoDecoder>
    </VideoCodecs>
    <AudioCodecs>
        <AudioEncoder>
            <Item codecName="audio_encoder.aac"/>
            <Item mimeType="audio/mp4a-latm"/>
            <Item sampleRate="8000,44100,48000"/>
            <Item channels="1-2"/>
            <Item bitrate="null"/>
        </AudioEncoder>
    </AudioCodecs>
</Codecs>"#;

    #[test]
    fn parses_leaf_nodes() {
        let mut parser = CapabilityParser::from_document(DESCRIPTOR);
        let records = parser.parse().unwrap();
        assert_eq!(records.len(), 2);

        let avc = &records[0];
        assert_eq!(avc.codec_name, "video_decoder.avc");
        assert_eq!(avc.codec_type, CodecType::VideoDecoder);
        assert!(avc.is_vendor);
        assert_eq!(avc.width, Some(Range { min: 2, max: 1920 }));
        assert_eq!(avc.block_size, Some(Size::new(16, 16)));
        assert_eq!(avc.profiles, vec![0, 8]);
        assert_eq!(avc.format, vec![2, 3]);
        assert_eq!(avc.measured_frame_rate.len(), 2);
        assert!(avc.is_complete());

        // The codec type comes from the leaf node when the attribute is absent.
        let aac = &records[1];
        assert_eq!(aac.codec_type, CodecType::AudioEncoder);
        assert_eq!(aac.sample_rate, vec![8000, 44100, 48000]);
        assert_eq!(aac.bitrate, None);
        assert_eq!(aac.incomplete, vec!["bitrate".to_string()]);
        assert_eq!(parser.diagnostics().len(), 1);
    }

    #[test]
    #[traced_test]
    fn malformed_fields_are_logged() {
        let mut parser = CapabilityParser::from_document(DESCRIPTOR);
        parser.parse().unwrap();
        assert!(logs_contain("Rejected \"bitrate\"=\"null\""));
        assert!(!logs_contain("unrecognized capability key"));
    }

    #[test]
    fn unknown_keys_do_not_mark_records_incomplete() {
        let mut parser = CapabilityParser::from_document(
            r#"<Codecs><VideoEncoder><Item codecName="enc"/><Item colour="red"/><Item mimeType="video/hevc"/></VideoEncoder></Codecs>"#,
        );
        let records = parser.parse().unwrap();
        assert_eq!(records[0].mime_type, "video/hevc");
        assert!(records[0].incomplete.is_empty());
        assert!(matches!(
            parser.diagnostics()[0].error,
            Error::UnrecognizedKey(_)
        ));
    }

    #[test]
    fn vector_values_resolve_against_one_table() {
        assert_eq!(parse_vector("CBR,VBR,CQ").unwrap(), vec![0, 1, 2]);
        assert_eq!(parse_vector("AAC_LC,AAC_HE").unwrap(), vec![0, 3]);
        assert_eq!(parse_vector("44100,48000,").unwrap(), vec![44100, 48000]);
        assert!(parse_vector("AVCMain,Bogus").is_err());
        assert!(parse_vector("AVCMain,CBR").is_err());
        assert!(parse_vector("12,abc").is_err());
        assert!(parse_vector("").is_err());
    }

    #[test]
    fn invalid_scalar_values_are_rejected() {
        let mut data = CapabilityData::new(CodecType::VideoDecoder);
        assert!(set_field(&mut data, "isVendor", "yes").is_err());
        assert!(set_field(&mut data, "codecType", "VIDEO").is_err());
        assert!(set_field(&mut data, "blockSize", "16").is_err());
        assert!(matches!(
            set_field(&mut data, "profileLevelsMap", "x"),
            Err(Error::UnrecognizedKey(_))
        ));
    }

    #[test]
    fn empty_document_has_no_root() {
        let mut parser = CapabilityParser::from_document("<?xml version=\"1.0\"?>");
        assert!(matches!(parser.parse(), Err(Error::Parse(_))));
    }

    #[test]
    fn unloaded_parser_cannot_parse() {
        let mut parser = CapabilityParser::new("/nonexistent/codec_caps.xml");
        assert!(matches!(parser.parse(), Err(Error::IllegalState(_))));
        assert!(matches!(parser.load_configuration(), Err(Error::Parse(_))));
    }
}
