// SPDX-FileCopyrightText: 2025 2025 Contributors to the AVCodec buffer manager project.
// SPDX-License-Identifier: Apache-2.0

//! In-process driver that copies input buffers to output buffers.

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

use tracing::{debug, trace, warn};

use super::{
    CodecDriver, ComponentState, DriverCommand, DriverEvent, EventSender, STATUS_OK, Status,
};
use crate::{BufferInfo, CodecBuffer, Error, MediaFormat, PortIndex, Result};

#[derive(Debug, Default)]
struct Faults {
    reject_parameters: Option<Status>,
    reject_commands: Option<Status>,
    command_status: Option<Status>,
}

struct LoopbackState {
    events: Option<EventSender>,
    codec_name: String,
    component: ComponentState,
    parameters: Option<MediaFormat>,
    input: VecDeque<(CodecBuffer, BufferInfo)>,
    output: VecDeque<CodecBuffer>,
    enabled: [bool; 2],
    faults: Faults,
}

/// A [`CodecDriver`] that completes every command immediately and "decodes"
/// by copying each consumed input buffer into the next queued output buffer.
///
/// Buffers are processed only while the component is executing. Flags and
/// timestamps travel with the payload, so an end-of-stream input produces an
/// end-of-stream output.
///
/// Faults can be injected to exercise error paths.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use avcodec::{CodecDriver, driver::{loopback::LoopbackDriver, STATUS_ERR_INVALID_PARAM}};
///
/// let driver = Arc::new(LoopbackDriver::new());
/// driver.reject_parameters(Some(STATUS_ERR_INVALID_PARAM));
/// assert!(driver.set_parameter(&avcodec::MediaFormat::new()).is_err());
/// ```
pub struct LoopbackDriver {
    state: Mutex<LoopbackState>,
}

impl Default for LoopbackDriver {
    fn default() -> Self {
        Self::new()
    }
}

fn port_slot(port: PortIndex) -> usize {
    match port {
        PortIndex::Input => 0,
        PortIndex::Output => 1,
    }
}

impl LoopbackDriver {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LoopbackState {
                events: None,
                codec_name: String::new(),
                component: ComponentState::Loaded,
                parameters: None,
                input: VecDeque::new(),
                output: VecDeque::new(),
                enabled: [true, true],
                faults: Faults::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes [`CodecDriver::set_parameter`] fail with `status`.
    pub fn reject_parameters(&self, status: Option<Status>) {
        self.lock().faults.reject_parameters = status;
    }

    /// Makes [`CodecDriver::send_command`] fail synchronously with `status`.
    pub fn reject_commands(&self, status: Option<Status>) {
        self.lock().faults.reject_commands = status;
    }

    /// Acknowledges subsequent commands with `status` instead of success.
    pub fn complete_commands_with(&self, status: Option<Status>) {
        self.lock().faults.command_status = status;
    }

    /// Publishes a [`DriverEvent::PortSettingsChanged`] for the output port.
    pub fn emit_port_settings_changed(&self) {
        self.lock().publish(DriverEvent::PortSettingsChanged {
            port: PortIndex::Output,
        });
    }

    /// Publishes a [`DriverEvent::Error`].
    pub fn emit_error(&self, status: Status) {
        self.lock().publish(DriverEvent::Error { status });
    }

    pub fn codec_name(&self) -> String {
        self.lock().codec_name.clone()
    }

    pub fn component_state(&self) -> ComponentState {
        self.lock().component
    }

    /// Last configuration accepted by [`CodecDriver::set_parameter`].
    pub fn parameters(&self) -> Option<MediaFormat> {
        self.lock().parameters.clone()
    }

    /// Number of buffers queued but not yet processed, per port.
    pub fn queued(&self, port: PortIndex) -> usize {
        let state = self.lock();
        match port {
            PortIndex::Input => state.input.len(),
            PortIndex::Output => state.output.len(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().events.is_some()
    }
}

impl LoopbackState {
    fn publish(&self, event: DriverEvent) {
        match &self.events {
            Some(events) => {
                if events.send(event).is_err() {
                    warn!("Loopback event dropped: receiver is gone");
                }
            }
            None => warn!("Loopback event dropped: driver is not initialized"),
        }
    }

    fn discard(&mut self, port: Option<PortIndex>) {
        if port != Some(PortIndex::Output) {
            self.input.clear();
        }
        if port != Some(PortIndex::Input) {
            self.output.clear();
        }
    }

    fn process(&mut self) {
        if self.component != ComponentState::Executing || !self.enabled.iter().all(|e| *e) {
            return;
        }
        while !self.input.is_empty() && !self.output.is_empty() {
            let (Some((input, info)), Some(output)) =
                (self.input.pop_front(), self.output.pop_front())
            else {
                break;
            };
            let length = match copy_payload(&input, info, &output) {
                Ok(length) => length,
                Err(err) => {
                    warn!("Loopback copy of {} failed: {:?}", input.id(), err);
                    0
                }
            };
            trace!("Loopback {} -> {} ({} bytes)", input.id(), output.id(), length);
            self.publish(DriverEvent::BufferDone {
                port: PortIndex::Input,
                id: input.id(),
                info: BufferInfo::new(info.pts, 0, 0, info.flags),
            });
            self.publish(DriverEvent::BufferDone {
                port: PortIndex::Output,
                id: output.id(),
                info: BufferInfo::new(info.pts, 0, length, info.flags),
            });
        }
    }
}

/// Copies the valid region of `input` to the start of `output`, truncating
/// to the output capacity. Buffers without CPU access copy nothing.
fn copy_payload(input: &CodecBuffer, info: BufferInfo, output: &CodecBuffer) -> Result<usize> {
    let (Some(source), Some(target)) = (input.memory().as_shared(), output.memory().as_shared())
    else {
        return Ok(0);
    };
    let length = info.length.min(target.len());
    if length == 0 {
        return Ok(0);
    }
    let payload = source.read(info.offset, length)?;
    target.write(0, &payload)?;
    Ok(length)
}

impl CodecDriver for LoopbackDriver {
    fn init(&self, codec_name: &str, events: EventSender) -> Result<()> {
        let mut state = self.lock();
        if state.events.is_some() {
            return Err(Error::IllegalState(
                "loopback component already exists".to_string(),
            ));
        }
        state.events = Some(events);
        state.codec_name = codec_name.to_string();
        state.component = ComponentState::Loaded;
        debug!("Loopback component created for \"{}\"", codec_name);
        Ok(())
    }

    fn deinit(&self) -> Result<()> {
        let mut state = self.lock();
        state.discard(None);
        state.events = None;
        state.parameters = None;
        state.component = ComponentState::Loaded;
        debug!("Loopback component destroyed");
        Ok(())
    }

    fn set_parameter(&self, format: &MediaFormat) -> Result<()> {
        let mut state = self.lock();
        if let Some(status) = state.faults.reject_parameters {
            return Error::from_status(status);
        }
        state.parameters = Some(format.clone());
        Ok(())
    }

    fn send_command(&self, command: DriverCommand) -> Result<()> {
        let mut state = self.lock();
        if let Some(status) = state.faults.reject_commands {
            return Error::from_status(status);
        }
        let status = state.faults.command_status.unwrap_or(STATUS_OK);
        if status == STATUS_OK {
            match command {
                DriverCommand::SetState(component) => {
                    if matches!(component, ComponentState::Idle | ComponentState::Loaded) {
                        state.discard(None);
                    }
                    state.component = component;
                }
                DriverCommand::Flush(port) => state.discard(port),
                DriverCommand::PortEnable(port) => state.enabled[port_slot(port)] = true,
                DriverCommand::PortDisable(port) => {
                    state.enabled[port_slot(port)] = false;
                    state.discard(Some(port));
                }
            }
        }
        debug!("Loopback {} completed with status {}", command, status);
        state.publish(DriverEvent::CommandComplete { command, status });
        state.process();
        Ok(())
    }

    fn empty_this_buffer(&self, buffer: &CodecBuffer, info: BufferInfo) -> Result<()> {
        let mut state = self.lock();
        if !state.enabled[port_slot(PortIndex::Input)] {
            return Err(Error::IllegalState("input port is disabled".to_string()));
        }
        state.input.push_back((buffer.clone(), info));
        state.process();
        Ok(())
    }

    fn fill_this_buffer(&self, buffer: &CodecBuffer) -> Result<()> {
        let mut state = self.lock();
        if !state.enabled[port_slot(PortIndex::Output)] {
            return Err(Error::IllegalState("output port is disabled".to_string()));
        }
        state.output.push_back(buffer.clone());
        state.process();
        Ok(())
    }
}
