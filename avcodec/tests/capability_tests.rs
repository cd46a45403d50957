// SPDX-FileCopyrightText: 2025 2025 Contributors to the AVCodec buffer manager project.
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for the capability model.
//!
//! The tests load `tests/data/codec_caps.xml`, a descriptor with one
//! malformed field and one unknown key, and check parsing, admission and
//! the derived video/audio helpers against it.
//!
//! # Test Coverage
//!
//! - Descriptor loading, including the partial-data policy
//! - Range and size token properties
//! - Format admission and codec lookup
//! - `VideoCaps` / `AudioCaps` queries

use std::path::PathBuf;

use avcodec::{
    AudioCaps, CapabilityList, CapabilityParser, CodecType, Error, MediaFormat, Range, Size,
    VideoCaps,
    capability::tables::{AVC_PROFILE_BASELINE, AVC_PROFILE_MAIN, PIXEL_FORMAT_NV12},
    format::keys,
};

/// Ensures logging is initialized only once across all tests.
static LOG_ONCE: std::sync::Once = std::sync::Once::new();

fn caps_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data/codec_caps.xml")
}

/// Initializes logging and loads the test descriptor.
fn setup_test() -> CapabilityList {
    LOG_ONCE.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .init();
    });
    CapabilityList::load(caps_path()).unwrap()
}

fn video(mime: &str, width: i32, height: i32) -> MediaFormat {
    let mut format = MediaFormat::new();
    format
        .set_string(keys::CODEC_MIME, mime)
        .set_int(keys::WIDTH, width)
        .set_int(keys::HEIGHT, height);
    format
}

/// Tests that every record of the descriptor is kept, including the ones
/// with rejected fields, and that diagnostics name the offending keys.
#[test]
fn descriptor_loads_with_partial_records() {
    setup_test();
    let mut parser = CapabilityParser::new(caps_path());
    parser.load_configuration().unwrap();
    let records = parser.parse().unwrap();
    assert_eq!(records.len(), 5);

    let hevc = records
        .iter()
        .find(|record| record.codec_name == "video_decoder.hevc")
        .unwrap();
    assert_eq!(hevc.codec_type, CodecType::VideoDecoder);
    assert_eq!(hevc.frame_rate, None);
    assert!(hevc.is_field_incomplete("frameRate"));
    assert!(!hevc.is_complete());

    let keys: Vec<_> = parser
        .diagnostics()
        .iter()
        .map(|diagnostic| diagnostic.key.as_str())
        .collect();
    assert_eq!(keys, vec!["frameRate", "vendorColour"]);
    assert!(matches!(
        parser.diagnostics()[1].error,
        Error::UnrecognizedKey(_)
    ));
}

/// Profiles keep their descriptor order (scenario "AVCBaseline,AVCMain").
#[test]
fn profile_symbols_resolve_in_order() {
    let caps = setup_test();
    let avc = caps.find_by_name("video_decoder.avc").unwrap();
    assert_eq!(avc.profiles, vec![AVC_PROFILE_BASELINE, AVC_PROFILE_MAIN]);
    assert_eq!(avc.format, vec![1, PIXEL_FORMAT_NV12, 3]);
    assert_eq!(avc.block_size, Some(Size::new(16, 16)));
    assert_eq!(
        avc.measured_frame_rate.get(&Size::new(1280, 720)),
        Some(&Range { min: 1, max: 120 })
    );
}

/// Tests the token properties: parsed ranges are ordered and formatted
/// tokens parse back to the same value.
#[test]
fn range_and_size_tokens() {
    for (min, max) in [(0, 0), (0, 1920), (44100, 48000), (1, i32::MAX)] {
        let token = format!("{min}-{max}");
        let range: Range = token.parse().unwrap();
        assert!(range.min <= range.max);
        assert_eq!(range.to_string(), token);
    }
    for (width, height) in [(0, 0), (16, 16), (1920, 1080)] {
        let size: Size = format!("{width}x{height}").parse().unwrap();
        assert_eq!(size, Size::new(width, height));
    }
    for token in ["1920-0", "null", "", "-5", "10-", "1x2-3", "a-b"] {
        assert!(token.parse::<Range>().is_err(), "{token:?} must be rejected");
    }
    assert!("1920".parse::<Size>().is_err());
}

/// A width beyond the advertised range is unsupported even without a height.
#[test]
fn oversized_width_is_rejected() {
    let caps = setup_test();
    let mut format = MediaFormat::new();
    format
        .set_string(keys::CODEC_MIME, "video/avc")
        .set_int(keys::WIDTH, 3840);
    assert!(matches!(
        caps.admit(&format, CodecType::VideoDecoder),
        Err(Error::UnsupportedConfig(_))
    ));
    assert_eq!(
        caps.find_video_decoder(&video("video/avc", 1920, 1080)).as_deref(),
        Some("video_decoder.avc")
    );
}

/// Codec lookup by type and format for all four helpers.
#[test]
fn find_codec_by_type() {
    let caps = setup_test();
    let mut encode = video("video/avc", 176, 144);
    encode.set_int(keys::BITRATE_MODE, 1);
    assert_eq!(caps.find_video_encoder(&encode).as_deref(), Some("video_encoder.avc"));
    encode.set_int(keys::BITRATE_MODE, 2);
    assert_eq!(caps.find_video_encoder(&encode), None);

    // An incomplete field rejects any format that constrains it.
    let mut hevc = video("video/hevc", 3840, 2160);
    assert_eq!(caps.find_video_decoder(&hevc).as_deref(), Some("video_decoder.hevc"));
    hevc.set_int(keys::FRAME_RATE, 30);
    assert_eq!(caps.find_video_decoder(&hevc), None);

    let mut audio = MediaFormat::new();
    audio
        .set_string(keys::CODEC_MIME, "audio/mp4a-latm")
        .set_int(keys::SAMPLE_RATE, 22050)
        .set_int(keys::CHANNEL_COUNT, 2);
    assert_eq!(caps.find_audio_decoder(&audio).as_deref(), Some("audio_decoder.aac"));
    assert_eq!(caps.find_audio_encoder(&audio), None);
    audio.set_int(keys::SAMPLE_RATE, 48000);
    assert_eq!(caps.find_audio_encoder(&audio).as_deref(), Some("audio_encoder.aac"));
}

/// Non-integer values for integer keys are argument errors, not silent misses.
#[test]
fn mistyped_values_are_argument_errors() {
    let caps = setup_test();
    let mut format = MediaFormat::new();
    format
        .set_string(keys::CODEC_MIME, "video/avc")
        .set_string(keys::WIDTH, "wide");
    assert!(matches!(
        caps.admit(&format, CodecType::VideoDecoder),
        Err(Error::IllegalArgument(_))
    ));
}

/// Tests the derived video helpers against the block throughput limits.
#[test]
fn video_caps_queries() {
    let caps = setup_test();
    let record = caps.find_by_name("video_decoder.avc").unwrap();
    let video = VideoCaps::new(record).unwrap();

    // Zero-bounded sizes are unconstrained; the block limit still applies.
    assert!(video.is_size_supported(1920, 1080));
    assert_eq!(video.supported_width(), Range::POSITIVE);
    assert_eq!(video.supported_frame_rates_for(3840, 2160), None);
    assert_eq!(video.width_alignment(), Some(2));
    assert_eq!(
        video.supported_frame_rates_for(1920, 1080),
        Some(Range { min: 1, max: 60 })
    );
    assert!(video.is_size_and_rate_supported(1920, 1080, 59.94));
    assert!(!video.is_size_and_rate_supported(1920, 1080, 61.0));
    assert_eq!(
        video.preferred_frame_rate(1280, 720),
        Some(Range { min: 1, max: 120 })
    );

    let encoder = VideoCaps::new(caps.find_by_name("video_encoder.avc").unwrap()).unwrap();
    assert_eq!(encoder.supported_bitrate_modes(), &[0, 1]);
    assert_eq!(encoder.supported_frame_rate(), Range { min: 1, max: 30 });
}

/// Tests the derived audio helpers and the type guard of both views.
#[test]
fn audio_caps_queries() {
    let caps = setup_test();
    let record = caps.find_by_name("audio_decoder.aac").unwrap();
    let audio = AudioCaps::new(record).unwrap();
    assert!(audio.is_sample_rate_supported(16000));
    assert!(!audio.is_sample_rate_supported(96000));
    assert!(audio.is_channel_count_supported(8));
    assert!(!audio.is_channel_count_supported(9));
    assert_eq!(audio.supported_bitrate(), Some(Range { min: 8000, max: 960000 }));

    assert!(VideoCaps::new(record).is_err());
    assert!(AudioCaps::new(caps.find_by_name("video_decoder.avc").unwrap()).is_err());
}
