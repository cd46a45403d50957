// SPDX-FileCopyrightText: 2025 2025 Contributors to the AVCodec buffer manager project.
// SPDX-License-Identifier: Apache-2.0

//! # AVCodec - codec buffer manager and capability model
//!
//! Buffer lifecycle, session state machine and capability admission for
//! hardware-accelerated audio and video codecs.
//!
//! ## Overview
//!
//! A platform advertises what its codecs can do in an XML capability
//! descriptor. A [`CodecSession`] binds to one of those codecs, admits a
//! requested [`MediaFormat`] against the advertised ranges before anything
//! reaches the hardware, and then moves buffers between the caller and the
//! codec through one [`BufferManager`] per port.
//!
//! ### Key Concepts
//!
//! - **Capability record**: One codec's advertised configuration space ([`CapabilityData`])
//! - **Admission**: Checking a requested format against a record ([`CapabilityList::admit`])
//! - **Port**: One direction of a codec, input or output ([`PortIndex`])
//! - **Buffer mode**: Whether a port allocates its own memory or uses the caller's ([`BufferMode`])
//! - **Driver**: The hardware component behind a session ([`CodecDriver`])
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐   admit    ┌────────────────┐
//! │ CapabilityList │◄───────────┤  CodecSession  │──── SessionEvent ──► observers
//! └────────────────┘            └───┬────────┬───┘
//!                                   │        │
//!                       BufferManager      BufferManager
//!                          (input)           (output)
//!                              │                 │
//!                              └──► CodecDriver ◄┘
//!                                       │
//!                            DriverEvent (dispatcher thread)
//! ```
//!
//! ## Examples
//!
//! ### Finding a decoder for a format
//!
//! ```
//! use avcodec::{CapabilityList, MediaFormat, format::keys};
//!
//! # fn main() -> Result<(), avcodec::Error> {
//! let caps = CapabilityList::from_document(
//!     r#"<Codecs><VideoDecoder>
//!         <Item codecName="avc.dec"/><Item mimeType="video/avc"/>
//!         <Item width="2-1920"/><Item height="2-1080"/>
//!         <Item profiles="AVCBaseline,AVCMain"/>
//!     </VideoDecoder></Codecs>"#,
//! )?;
//!
//! let mut format = MediaFormat::new();
//! format
//!     .set_string(keys::CODEC_MIME, "video/avc")
//!     .set_int(keys::WIDTH, 1280)
//!     .set_int(keys::HEIGHT, 720);
//! assert_eq!(caps.find_video_decoder(&format).as_deref(), Some("avc.dec"));
//!
//! format.set_int(keys::WIDTH, 3840);
//! assert_eq!(caps.find_video_decoder(&format), None);
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! - [`CodecSession`] is `Send + Sync`; state transitions are serialized internally
//! - Push and pull on different ports may run concurrently with each other
//!   and with driver completions
//! - A stop or flush wakes every thread parked in a pull with [`Error::Cancelled`]
//! - [`CapabilityList`] is immutable after construction

mod error;
mod port;
mod session;

pub mod buffer;
pub mod capability;
pub mod config;
pub mod driver;
pub mod format;
pub mod variant;

pub use buffer::{
    BufferAllocator, BufferFlags, BufferId, BufferInfo, BufferMemory, BufferMode, BufferPool,
    BufferRegistry, CodecBuffer, Owner, PoolCounts, SharedMemory, SharedMemoryAllocator,
    SurfaceBuffer,
};
pub use capability::{
    AudioCaps, CapabilityData, CapabilityList, CapabilityParser, CodecType, FieldDiagnostic,
    Range, Size, VideoCaps,
};
pub use driver::{CodecDriver, DriverCommand, DriverEvent};
pub use error::{Error, ErrorKind, Result};
pub use format::{FormatValue, MediaFormat};
pub use port::{BufferManager, PortIndex, PortState};
pub use session::{CodecSession, FlushDirection, SessionEvent, SessionState};
pub use variant::{CodecFamily, CodecVariant};
