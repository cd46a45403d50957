// SPDX-FileCopyrightText: 2025 2025 Contributors to the AVCodec buffer manager project.
// SPDX-License-Identifier: Apache-2.0

//! Hardware codec driver boundary.
//!
//! A [`CodecDriver`] is injected into every [`crate::CodecSession`]. Calls
//! into the driver never block on completion: the driver acknowledges
//! commands and returns buffers by publishing [`DriverEvent`]s on the
//! channel it receives in [`CodecDriver::init`]. The session drains that
//! channel on its own dispatcher thread, so a driver may publish from any
//! thread it likes.
//!
//! ```text
//!  CodecSession ──send_command / empty_this_buffer / fill_this_buffer──► CodecDriver
//!       ▲                                                                   │
//!       └────────────── DriverEvent (mpsc) ◄────────────────────────────────┘
//! ```

pub mod loopback;

use std::{fmt, sync::mpsc};

use crate::{BufferId, BufferInfo, CodecBuffer, MediaFormat, PortIndex, Result};

/// Raw status code reported by a driver.
pub type Status = i32;

pub const STATUS_OK: Status = 0;
pub const STATUS_ERR_UNKNOWN: Status = -1;
pub const STATUS_ERR_INVALID_PARAM: Status = -2;
pub const STATUS_ERR_NO_MEMORY: Status = -3;
pub const STATUS_ERR_BUSY: Status = -4;
pub const STATUS_ERR_UNSUPPORTED: Status = -5;
pub const STATUS_ERR_TIMEOUT: Status = -6;

/// Component state requested with [`DriverCommand::SetState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentState {
    Loaded,
    Idle,
    Executing,
    Pause,
}

/// Asynchronous command sent to a driver. Every command is acknowledged
/// with a [`DriverEvent::CommandComplete`] carrying the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverCommand {
    SetState(ComponentState),
    /// Discards queued buffers of one port, or of both ports when `None`.
    /// Flushed buffers are not returned through [`DriverEvent::BufferDone`].
    Flush(Option<PortIndex>),
    PortEnable(PortIndex),
    /// Disabling a port discards its queued buffers like a flush.
    PortDisable(PortIndex),
}

impl fmt::Display for DriverCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverCommand::SetState(state) => write!(f, "SetState({state:?})"),
            DriverCommand::Flush(Some(port)) => write!(f, "Flush({port})"),
            DriverCommand::Flush(None) => f.write_str("Flush(all)"),
            DriverCommand::PortEnable(port) => write!(f, "PortEnable({port})"),
            DriverCommand::PortDisable(port) => write!(f, "PortDisable({port})"),
        }
    }
}

/// Notification published by a driver.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    CommandComplete {
        command: DriverCommand,
        status: Status,
    },
    /// The codec finished with a buffer: an input buffer was consumed, or an
    /// output buffer was filled.
    BufferDone {
        port: PortIndex,
        id: BufferId,
        info: BufferInfo,
    },
    /// The format of `port` changed; the output has to be reconfigured.
    PortSettingsChanged { port: PortIndex },
    /// Unrecoverable failure of the component.
    Error { status: Status },
}

/// Sending half of the driver event channel.
pub type EventSender = mpsc::Sender<DriverEvent>;

/// Hardware codec component.
///
/// Implementations must be thread-safe: the session calls them from the
/// control thread and from producer/consumer threads concurrently.
pub trait CodecDriver: Send + Sync {
    /// Creates the component for `codec_name` and starts publishing to `events`.
    fn init(&self, codec_name: &str, events: EventSender) -> Result<()>;

    /// Destroys the component. No events are published afterwards.
    fn deinit(&self) -> Result<()>;

    /// Applies an admitted configuration.
    fn set_parameter(&self, format: &MediaFormat) -> Result<()>;

    /// Queues `command`; completion is reported asynchronously.
    ///
    /// Repeated sends of the same command are acknowledged in send order.
    fn send_command(&self, command: DriverCommand) -> Result<()>;

    /// Hands a filled input buffer to the codec.
    fn empty_this_buffer(&self, buffer: &CodecBuffer, info: BufferInfo) -> Result<()>;

    /// Hands an empty output buffer to the codec.
    fn fill_this_buffer(&self, buffer: &CodecBuffer) -> Result<()>;
}
