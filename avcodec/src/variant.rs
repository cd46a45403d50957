// SPDX-FileCopyrightText: 2025 2025 Contributors to the AVCodec buffer manager project.
// SPDX-License-Identifier: Apache-2.0

//! Codec variants and port buffer sizing.
//!
//! A [`CodecVariant`] knows which format keys its codec family requires,
//! what its output looks like and how large the buffers of each port must
//! be. Variants are created by [`create_variant`] from a MIME type and a
//! [`CodecType`].

use std::fmt;

use tracing::debug;

use crate::{
    CodecType, Error, MediaFormat, PortIndex, Result,
    capability::tables::{AUDIO_FORMATS, VIDEO_FORMATS},
    config::CodecConfig,
    format::keys,
};

/// Upper bound of a compressed video buffer.
pub const MAX_ENCODED_BUFFER_SIZE: usize = 3_150_000;
/// Buffer size of both audio ports.
pub const AUDIO_BUFFER_SIZE: usize = 30_000;
/// Largest supported video dimensions (exclusive).
pub const MAX_VIDEO_WIDTH: i32 = 8000;
pub const MAX_VIDEO_HEIGHT: i32 = 5000;

const ENCODED_COMPRESSION_RATIO: usize = 15;
const RAW_VIDEO_MIME: &str = "video/raw";
const RAW_AUDIO_MIME: &str = "audio/raw";

/// Codec families known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecFamily {
    H263,
    Avc,
    Hevc,
    Mpeg2,
    Mpeg4,
    Vp8,
    Vorbis,
    Mpeg,
    Aac,
    Flac,
}

impl CodecFamily {
    pub const ALL: [CodecFamily; 10] = [
        CodecFamily::H263,
        CodecFamily::Avc,
        CodecFamily::Hevc,
        CodecFamily::Mpeg2,
        CodecFamily::Mpeg4,
        CodecFamily::Vp8,
        CodecFamily::Vorbis,
        CodecFamily::Mpeg,
        CodecFamily::Aac,
        CodecFamily::Flac,
    ];

    pub fn mime(&self) -> &'static str {
        match self {
            CodecFamily::H263 => "video/3gpp",
            CodecFamily::Avc => "video/avc",
            CodecFamily::Hevc => "video/hevc",
            CodecFamily::Mpeg2 => "video/mpeg2",
            CodecFamily::Mpeg4 => "video/mp4v-es",
            CodecFamily::Vp8 => "video/x-vnd.on2.vp8",
            CodecFamily::Vorbis => "audio/vorbis",
            CodecFamily::Mpeg => "audio/mpeg",
            CodecFamily::Aac => "audio/mp4a-latm",
            CodecFamily::Flac => "audio/flac",
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|family| family.mime() == mime)
    }

    pub fn is_video(&self) -> bool {
        matches!(
            self,
            CodecFamily::H263
                | CodecFamily::Avc
                | CodecFamily::Hevc
                | CodecFamily::Mpeg2
                | CodecFamily::Mpeg4
                | CodecFamily::Vp8
        )
    }
}

impl fmt::Display for CodecFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// Buffer requirements of one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortDefinition {
    pub buffer_count: usize,
    pub buffer_size: usize,
}

/// Per-family behaviour of a codec.
pub trait CodecVariant: Send + Sync + fmt::Debug {
    fn family(&self) -> CodecFamily;

    fn codec_type(&self) -> CodecType;

    /// Reads the keys the family requires from an admitted format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalArgument`] if a required key is missing or out of range.
    fn init(&mut self, format: &MediaFormat) -> Result<()>;

    /// Format of the data produced on the output port.
    fn output_caps(&self) -> MediaFormat;

    /// Buffer requirements of `port`.
    fn port_definition(&self, port: PortIndex, config: &CodecConfig) -> PortDefinition;
}

/// Creates the variant for `mime`.
///
/// # Errors
///
/// - [`Error::UnsupportedConfig`] for an unknown MIME type
/// - [`Error::IllegalArgument`] if `codec_type` is audio for a video family or vice versa
///
/// # Examples
///
/// ```
/// use avcodec::{CodecType, PortIndex, MediaFormat, format::keys, config::CodecConfig};
/// use avcodec::variant::create_variant;
///
/// # fn main() -> Result<(), avcodec::Error> {
/// let mut variant = create_variant("video/avc", CodecType::VideoDecoder)?;
/// let mut format = MediaFormat::new();
/// format
///     .set_int(keys::WIDTH, 1920)
///     .set_int(keys::HEIGHT, 1080)
///     .set_int(keys::PIXEL_FORMAT, 2)
///     .set_int(keys::FRAME_RATE, 30);
/// variant.init(&format)?;
/// let output = variant.port_definition(PortIndex::Output, &CodecConfig::default());
/// assert_eq!(output.buffer_size, 1920 * 1080 * 3 / 2);
/// # Ok(())
/// # }
/// ```
pub fn create_variant(mime: &str, codec_type: CodecType) -> Result<Box<dyn CodecVariant>> {
    let family = CodecFamily::from_mime(mime)
        .ok_or_else(|| Error::UnsupportedConfig(format!("no codec variant for \"{mime}\"")))?;
    if family.is_video() != codec_type.is_video() {
        return Err(Error::IllegalArgument(format!(
            "{family} cannot be a {codec_type}"
        )));
    }
    debug!("Creating {} variant for {}", codec_type, family);
    if family.is_video() {
        Ok(Box::new(VideoVariant::new(family, codec_type)))
    } else {
        Ok(Box::new(AudioVariant::new(family, codec_type)))
    }
}

fn required_int(format: &MediaFormat, key: &str) -> Result<i32> {
    format
        .get_int(key)
        .ok_or_else(|| Error::IllegalArgument(format!("\"{key}\" is required")))
}

fn optional_int(format: &MediaFormat, key: &str) -> Option<i32> {
    format.get_int(key).filter(|value| *value > 0)
}

/// Video encoder or decoder.
#[derive(Debug, Clone)]
pub struct VideoVariant {
    family: CodecFamily,
    codec_type: CodecType,
    width: i32,
    height: i32,
    pixel_format: i32,
    frame_rate: f64,
    max_input_size: Option<i32>,
}

impl VideoVariant {
    fn new(family: CodecFamily, codec_type: CodecType) -> Self {
        Self {
            family,
            codec_type,
            width: 0,
            height: 0,
            pixel_format: 0,
            frame_rate: 0.0,
            max_input_size: None,
        }
    }

    fn raw_size(&self, config: &CodecConfig) -> usize {
        pixel_buffer_size(
            self.pixel_format,
            self.width as usize,
            self.height as usize,
            config.buffer_alignment,
        )
    }

    fn encoded_size(&self) -> usize {
        match self.max_input_size {
            Some(max) if self.codec_type == CodecType::VideoDecoder => {
                (max as usize).min(MAX_ENCODED_BUFFER_SIZE)
            }
            _ => encoded_buffer_size(self.width as usize, self.height as usize),
        }
    }
}

impl CodecVariant for VideoVariant {
    fn family(&self) -> CodecFamily {
        self.family
    }

    fn codec_type(&self) -> CodecType {
        self.codec_type
    }

    fn init(&mut self, format: &MediaFormat) -> Result<()> {
        let width = required_int(format, keys::WIDTH)?;
        let height = required_int(format, keys::HEIGHT)?;
        if !(1..MAX_VIDEO_WIDTH).contains(&width) || !(1..MAX_VIDEO_HEIGHT).contains(&height) {
            return Err(Error::IllegalArgument(format!(
                "{width}x{height} is outside the supported video dimensions"
            )));
        }
        let pixel_format = required_int(format, keys::PIXEL_FORMAT)?;
        if VIDEO_FORMATS.symbol(pixel_format).is_none() {
            return Err(Error::IllegalArgument(format!(
                "unknown pixel format {pixel_format}"
            )));
        }
        let frame_rate = format
            .get_double(keys::FRAME_RATE)
            .filter(|rate| *rate > 0.0)
            .ok_or_else(|| {
                Error::IllegalArgument(format!("\"{}\" is required", keys::FRAME_RATE))
            })?;

        self.width = width;
        self.height = height;
        self.pixel_format = pixel_format;
        self.frame_rate = frame_rate;
        self.max_input_size = optional_int(format, keys::MAX_INPUT_SIZE);
        debug!(
            "{} {} configured for {}x{} format {} at {} fps",
            self.family, self.codec_type, width, height, pixel_format, frame_rate
        );
        Ok(())
    }

    fn output_caps(&self) -> MediaFormat {
        let mut caps = MediaFormat::new();
        match self.codec_type {
            CodecType::VideoDecoder => caps
                .set_string(keys::CODEC_MIME, RAW_VIDEO_MIME)
                .set_int(keys::PIXEL_FORMAT, self.pixel_format),
            _ => caps.set_string(keys::CODEC_MIME, self.family.mime()),
        };
        caps.set_int(keys::WIDTH, self.width)
            .set_int(keys::HEIGHT, self.height)
            .set_double(keys::FRAME_RATE, self.frame_rate);
        caps
    }

    fn port_definition(&self, port: PortIndex, config: &CodecConfig) -> PortDefinition {
        let raw_side = match self.codec_type {
            CodecType::VideoDecoder => PortIndex::Output,
            _ => PortIndex::Input,
        };
        let buffer_size = if port == raw_side {
            self.raw_size(config)
        } else {
            self.encoded_size()
        };
        PortDefinition {
            buffer_count: port_buffer_count(port, config),
            buffer_size,
        }
    }
}

/// Audio encoder or decoder.
#[derive(Debug, Clone)]
pub struct AudioVariant {
    family: CodecFamily,
    codec_type: CodecType,
    sample_rate: i32,
    channels: i32,
    sample_format: i32,
}

impl AudioVariant {
    /// Samples per channel in one PCM buffer.
    const SAMPLES_PER_BUFFER: usize = 4096;
    /// Signed 16 bit little endian.
    const DEFAULT_SAMPLE_FORMAT: i32 = 1;

    fn new(family: CodecFamily, codec_type: CodecType) -> Self {
        Self {
            family,
            codec_type,
            sample_rate: 0,
            channels: 0,
            sample_format: Self::DEFAULT_SAMPLE_FORMAT,
        }
    }
}

impl CodecVariant for AudioVariant {
    fn family(&self) -> CodecFamily {
        self.family
    }

    fn codec_type(&self) -> CodecType {
        self.codec_type
    }

    fn init(&mut self, format: &MediaFormat) -> Result<()> {
        let channels = required_int(format, keys::CHANNEL_COUNT)?;
        let sample_rate = required_int(format, keys::SAMPLE_RATE)?;
        if channels <= 0 || sample_rate <= 0 {
            return Err(Error::IllegalArgument(format!(
                "{channels} channels at {sample_rate} Hz is not a valid audio format"
            )));
        }
        let sample_format = if self.codec_type.is_encoder() {
            required_int(format, keys::AUDIO_SAMPLE_FORMAT)?
        } else {
            format
                .get_int(keys::AUDIO_SAMPLE_FORMAT)
                .unwrap_or(Self::DEFAULT_SAMPLE_FORMAT)
        };
        if AUDIO_FORMATS.symbol(sample_format).is_none() {
            return Err(Error::IllegalArgument(format!(
                "unknown audio sample format {sample_format}"
            )));
        }
        self.channels = channels;
        self.sample_rate = sample_rate;
        self.sample_format = sample_format;
        Ok(())
    }

    fn output_caps(&self) -> MediaFormat {
        let mut caps = MediaFormat::new();
        match self.codec_type {
            CodecType::AudioDecoder => caps
                .set_string(keys::CODEC_MIME, RAW_AUDIO_MIME)
                .set_int(keys::AUDIO_SAMPLE_FORMAT, self.sample_format),
            _ => caps.set_string(keys::CODEC_MIME, self.family.mime()),
        };
        caps.set_int(keys::SAMPLE_RATE, self.sample_rate)
            .set_int(keys::CHANNEL_COUNT, self.channels);
        caps
    }

    fn port_definition(&self, port: PortIndex, config: &CodecConfig) -> PortDefinition {
        let pcm = pcm_buffer_size(
            self.sample_format,
            self.channels as usize,
            Self::SAMPLES_PER_BUFFER,
        );
        PortDefinition {
            buffer_count: port_buffer_count(port, config),
            buffer_size: pcm.max(AUDIO_BUFFER_SIZE),
        }
    }
}

fn port_buffer_count(port: PortIndex, config: &CodecConfig) -> usize {
    match port {
        PortIndex::Input => config.input_buffer_count,
        PortIndex::Output => config.output_buffer_count,
    }
}

/// Size of one raw frame: `width * height * 3 / 2` for the 4:2:0 formats,
/// rounded up to `alignment`. Unknown formats and zero inputs yield 0.
pub fn pixel_buffer_size(
    pixel_format: i32,
    width: usize,
    height: usize,
    alignment: usize,
) -> usize {
    if width == 0 || height == 0 || alignment == 0 {
        return 0;
    }
    match VIDEO_FORMATS.symbol(pixel_format) {
        Some("YUVI420" | "NV12" | "NV21") => {
            let size = width.saturating_mul(height).saturating_mul(3) / 2;
            size.div_ceil(alignment).saturating_mul(alignment)
        }
        _ => 0,
    }
}

/// Size of one compressed frame: `height / 15 * width`, or
/// [`MAX_ENCODED_BUFFER_SIZE`] if that overflows 32 bits.
pub fn encoded_buffer_size(width: usize, height: usize) -> usize {
    if width == 0 || height == 0 {
        return 0;
    }
    if (u32::MAX as usize / width) <= height / ENCODED_COMPRESSION_RATIO {
        return MAX_ENCODED_BUFFER_SIZE;
    }
    height / ENCODED_COMPRESSION_RATIO * width
}

/// Size of `samples` interleaved PCM samples per channel.
pub fn pcm_buffer_size(sample_format: i32, channels: usize, samples: usize) -> usize {
    let bytes_per_sample = match AUDIO_FORMATS.symbol(sample_format) {
        Some("U8") => 1,
        Some("S16LE") => 2,
        Some("S24LE") => 3,
        Some("S32LE") => 4,
        _ => return 0,
    };
    bytes_per_sample * channels * samples
}
