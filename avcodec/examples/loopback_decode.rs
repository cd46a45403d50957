// SPDX-FileCopyrightText: 2025 2025 Contributors to the AVCodec buffer manager project.
// SPDX-License-Identifier: Apache-2.0

//! Runs a codec session against the loopback driver: a producer thread
//! pushes numbered frames, the main thread pulls them back out.

mod common;

use std::{path::PathBuf, sync::Arc, thread, time::Duration};

use avcodec::{
    BufferFlags, BufferInfo, CodecBuffer, CodecSession, Error, MediaFormat,
    config::{CodecConfig, get_caps_path},
    driver::loopback::LoopbackDriver,
    format::keys,
};
use clap::Parser;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(version, about = "Decode through the loopback driver", long_about = None)]
struct Args {
    /// Path to the capability descriptor.
    #[arg(long, env = "AVCODEC_CAPS_PATH", default_value_os_t = get_caps_path())]
    caps_path: PathBuf,

    /// Optional JSON session configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Codec name from the descriptor.
    #[arg(long, default_value = "video_decoder.avc")]
    codec: String,

    #[arg(long, default_value_t = 640)]
    width: i32,

    #[arg(long, default_value_t = 480)]
    height: i32,

    /// Number of frames to push before end of stream.
    #[arg(long, default_value_t = 30)]
    frames: i64,
}

fn produce(session: Arc<CodecSession>, inputs: Vec<CodecBuffer>, frames: i64) -> Result<(), Error> {
    let mut free: Vec<_> = inputs.iter().map(CodecBuffer::id).collect();
    for pts in 0..=frames {
        let id = loop {
            if let Some(id) = free.pop() {
                break id;
            }
            match session.pull_input(None) {
                Ok((buffer, _)) => free.push(buffer.id()),
                Err(err) if err.is_transient() => {}
                Err(err) => return Err(err),
            }
        };
        if pts == frames {
            session.push_input(id, BufferInfo::eos(pts))?;
            break;
        }
        let payload = format!("frame {pts}");
        session.buffer(id)?.write(0, payload.as_bytes())?;
        session.push_input(id, BufferInfo::new(pts, 0, payload.len(), BufferFlags::NONE))?;
    }
    Ok(())
}

fn main() -> Result<(), Error> {
    common::setup_logging();
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => CodecConfig::load(path)?,
        None => CodecConfig::default(),
    };
    let caps = common::load_capabilities(&args.caps_path)?;

    let session = Arc::new(CodecSession::with_config(
        Arc::new(LoopbackDriver::new()),
        caps,
        config,
        Arc::new(avcodec::SharedMemoryAllocator::new()),
    ));
    session.init(&args.codec)?;

    let mut format = MediaFormat::new();
    format
        .set_int(keys::WIDTH, args.width)
        .set_int(keys::HEIGHT, args.height)
        .set_int(keys::PIXEL_FORMAT, 2)
        .set_int(keys::FRAME_RATE, 30);
    session.configure(&format)?;
    let inputs = session.allocate_input_buffers()?;
    session.allocate_output_buffers()?;
    session.start()?;

    let producer = {
        let session = session.clone();
        let frames = args.frames;
        thread::spawn(move || produce(session, inputs, frames))
    };

    let mut decoded = 0;
    loop {
        match session.pull_output(Some(Duration::from_secs(1))) {
            Ok((buffer, info)) if info.is_eos() => {
                info!("End of stream at pts {}", info.pts);
                session.push_output(buffer.id())?;
                break;
            }
            Ok((buffer, info)) => {
                let payload = buffer.read(info.offset, info.length)?;
                info!("pts {}: {}", info.pts, String::from_utf8_lossy(&payload));
                decoded += 1;
                session.push_output(buffer.id())?;
            }
            Err(err) if err.is_transient() => warn!("No output yet"),
            Err(err) => return Err(err),
        }
    }
    match producer.join() {
        Ok(result) => result?,
        Err(_) => return Err(Error::Other("producer thread panicked".to_string())),
    }

    info!("Decoded {} frames", decoded);
    session.stop()?;
    session.deinit()
}
