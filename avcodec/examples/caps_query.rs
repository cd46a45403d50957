// SPDX-FileCopyrightText: 2025 2025 Contributors to the AVCodec buffer manager project.
// SPDX-License-Identifier: Apache-2.0

//! Lists the codecs of a capability descriptor, or finds the codec that
//! supports a given format.
//!
//! ```text
//! cargo run --example caps_query -- --caps-path avcodec/tests/data/codec_caps.xml \
//!     --mime video/avc --codec-type VIDEO_DECODER --width 1280 --height 720
//! ```

mod common;

use std::path::PathBuf;

use avcodec::{AudioCaps, CodecType, MediaFormat, VideoCaps, config::get_caps_path, format::keys};
use clap::Parser;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(version, about = "Query a codec capability descriptor", long_about = None)]
struct Args {
    /// Path to the capability descriptor.
    #[arg(long, env = "AVCODEC_CAPS_PATH", default_value_os_t = get_caps_path())]
    caps_path: PathBuf,

    /// MIME type to look up. Without it every codec is listed.
    #[arg(long)]
    mime: Option<String>,

    /// Codec type symbol, for example VIDEO_DECODER.
    #[arg(long, default_value = "VIDEO_DECODER")]
    codec_type: CodecType,

    #[arg(long)]
    width: Option<i32>,

    #[arg(long)]
    height: Option<i32>,

    #[arg(long)]
    frame_rate: Option<f64>,

    #[arg(long)]
    sample_rate: Option<i32>,

    #[arg(long)]
    channels: Option<i32>,

    /// Print the matching records as JSON.
    #[arg(long)]
    json: bool,
}

fn describe(record: &avcodec::CapabilityData) {
    if let Ok(video) = VideoCaps::new(record) {
        info!(
            "{} [{}] {}: width {} height {} frame rate {}",
            record.codec_name,
            record.codec_type,
            record.mime_type,
            video.supported_width(),
            video.supported_height(),
            video.supported_frame_rate()
        );
    } else if let Ok(audio) = AudioCaps::new(record) {
        info!(
            "{} [{}] {}: sample rates {:?} channels {:?}",
            record.codec_name,
            record.codec_type,
            record.mime_type,
            audio.supported_sample_rates(),
            audio.supported_channels()
        );
    }
    if !record.is_complete() {
        warn!("{} has rejected fields: {:?}", record.codec_name, record.incomplete);
    }
}

fn main() -> Result<(), avcodec::Error> {
    common::setup_logging();
    let args = Args::parse();
    let caps = common::load_capabilities(&args.caps_path)?;

    let Some(mime) = args.mime else {
        for record in caps.records() {
            describe(record);
        }
        if args.json {
            println!("{}", serde_json::to_string_pretty(caps.records())?);
        }
        return Ok(());
    };

    let mut format = MediaFormat::new();
    format.set_string(keys::CODEC_MIME, &mime);
    if let Some(width) = args.width {
        format.set_int(keys::WIDTH, width);
    }
    if let Some(height) = args.height {
        format.set_int(keys::HEIGHT, height);
    }
    if let Some(frame_rate) = args.frame_rate {
        format.set_double(keys::FRAME_RATE, frame_rate);
    }
    if let Some(sample_rate) = args.sample_rate {
        format.set_int(keys::SAMPLE_RATE, sample_rate);
    }
    if let Some(channels) = args.channels {
        format.set_int(keys::CHANNEL_COUNT, channels);
    }

    match caps.admit(&format, args.codec_type) {
        Ok(record) => {
            describe(record);
            if args.json {
                println!("{}", serde_json::to_string_pretty(record)?);
            }
        }
        Err(err) => warn!("No {} supports {}: {}", args.codec_type, format, err),
    }
    Ok(())
}
