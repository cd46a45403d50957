// SPDX-FileCopyrightText: 2025 2025 Contributors to the AVCodec buffer manager project.
// SPDX-License-Identifier: Apache-2.0

//! Codec session state machine.
//!
//! ```text
//!  Uninitialized ─init─► Initialized ─configure─► Configured ─start─► Running ◄─► Paused
//!        ▲                    ▲                                         │  ▲
//!        │                    └──────────────── reset ──────────────────┤  └─ flush ─► Flushing
//!        │                                                              ▼
//!        └──────────────────────── deinit ─── Released ◄─────────── Stopped
//! ```
//!
//! Transitions are serialized by a session-wide lock. Push and pull go
//! straight to the per-port [`BufferManager`]s and never take that lock.

use std::{
    fmt,
    sync::{
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use tracing::{debug, error, info, warn};

use crate::{
    BufferAllocator, BufferId, BufferInfo, BufferManager, BufferMode, BufferRegistry,
    CapabilityData, CapabilityList, CodecBuffer, CodecDriver, CodecType, Error, ErrorKind,
    MediaFormat, PortIndex, PortState, Result, SharedMemoryAllocator,
    capability::list::check_format,
    config::CodecConfig,
    driver::{ComponentState, DriverCommand, DriverEvent, STATUS_ERR_TIMEOUT, STATUS_OK, Status},
    format::keys,
    variant::{CodecVariant, PortDefinition, create_variant},
};

/// How often the dispatcher checks for shutdown while the driver is quiet.
const DISPATCH_POLL: Duration = Duration::from_millis(50);

/// Observable state of a [`CodecSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Configured,
    Running,
    Paused,
    /// A flush is in progress; pushes are rejected.
    Flushing,
    Stopped,
    /// Terminal state after [`CodecSession::deinit`].
    Released,
}

/// Ports affected by [`CodecSession::flush`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlushDirection {
    Input,
    Output,
    Both,
}

impl FlushDirection {
    fn ports(self) -> &'static [PortIndex] {
        match self {
            FlushDirection::Input => &[PortIndex::Input],
            FlushDirection::Output => &[PortIndex::Output],
            FlushDirection::Both => &[PortIndex::Input, PortIndex::Output],
        }
    }

    fn target(self) -> Option<PortIndex> {
        match self {
            FlushDirection::Input => Some(PortIndex::Input),
            FlushDirection::Output => Some(PortIndex::Output),
            FlushDirection::Both => None,
        }
    }
}

/// Notification delivered to [`CodecSession::subscribe`] receivers.
///
/// Events are sent from the session's dispatcher thread or from the thread
/// performing a transition, never necessarily the subscriber's.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    /// The codec consumed an input buffer; it can be pulled back.
    InputBufferDone { id: BufferId, info: BufferInfo },
    /// The codec filled an output buffer; it can be pulled.
    OutputBufferFilled { id: BufferId, info: BufferInfo },
    /// The output format changed.
    FormatChanged,
    Error { kind: ErrorKind, code: i32 },
}

#[derive(Default)]
struct Acks {
    completed: Vec<(DriverCommand, Status)>,
    /// Commands whose wait timed out; their acknowledgement is still due.
    abandoned: Vec<DriverCommand>,
}

/// Command acknowledgements received from the driver, waited on by the
/// control thread.
struct CommandTracker {
    acks: Mutex<Acks>,
    done: Condvar,
}

impl CommandTracker {
    fn new() -> Self {
        Self {
            acks: Mutex::new(Acks::default()),
            done: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Acks> {
        self.acks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete(&self, command: DriverCommand, status: Status) {
        let mut acks = self.lock();
        if let Some(position) = acks.abandoned.iter().position(|late| *late == command) {
            acks.abandoned.remove(position);
            debug!("Dropping late acknowledgement of {} ({})", command, status);
            return;
        }
        acks.completed.push((command, status));
        self.done.notify_all();
    }

    fn clear(&self, command: DriverCommand) {
        self.lock()
            .completed
            .retain(|(pending, _)| *pending != command);
    }

    fn wait(&self, command: DriverCommand, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut acks = self.lock();
        loop {
            if let Some(position) = acks.completed.iter().position(|(done, _)| *done == command) {
                let (_, status) = acks.completed.remove(position);
                return Error::from_status(status);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!("Driver did not acknowledge {} within {:?}", command, timeout);
                acks.abandoned.push(command);
                return Err(Error::Hardware(STATUS_ERR_TIMEOUT));
            }
            acks = self
                .done
                .wait_timeout(acks, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

/// State shared with the dispatcher thread.
struct Shared {
    input: BufferManager,
    output: BufferManager,
    commands: CommandTracker,
    observers: Mutex<Vec<Sender<SessionEvent>>>,
    shutdown: AtomicBool,
}

impl Shared {
    fn port(&self, port: PortIndex) -> &BufferManager {
        match port {
            PortIndex::Input => &self.input,
            PortIndex::Output => &self.output,
        }
    }

    fn notify(&self, event: SessionEvent) {
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        observers.retain(|observer| observer.send(event.clone()).is_ok());
    }

    fn dispatch(&self, event: DriverEvent) {
        match event {
            DriverEvent::CommandComplete { command, status } => {
                if status != STATUS_OK {
                    warn!("Driver completed {} with status {}", command, status);
                }
                self.commands.complete(command, status);
            }
            DriverEvent::BufferDone { port, id, info } => {
                if self.port(port).on_buffer_done(id, info) {
                    self.notify(match port {
                        PortIndex::Input => SessionEvent::InputBufferDone { id, info },
                        PortIndex::Output => SessionEvent::OutputBufferFilled { id, info },
                    });
                }
            }
            DriverEvent::PortSettingsChanged { port } => {
                info!("Driver reported new {} port settings", port);
                self.port(port).on_format_changed();
                self.notify(SessionEvent::FormatChanged);
            }
            DriverEvent::Error { status } => {
                error!("Driver reported error status {}", status);
                self.input.on_error(status);
                self.output.on_error(status);
                self.notify(SessionEvent::Error {
                    kind: ErrorKind::Hardware,
                    code: status,
                });
            }
        }
    }
}

fn run_dispatcher(shared: Arc<Shared>, events: Receiver<DriverEvent>) {
    debug!("Dispatcher started");
    while !shared.shutdown.load(Ordering::Acquire) {
        match events.recv_timeout(DISPATCH_POLL) {
            Ok(event) => shared.dispatch(event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("Dispatcher stopped");
}

/// Codec selected by [`CodecSession::init`].
struct Binding {
    record: CapabilityData,
    variant: Box<dyn CodecVariant>,
    format: Option<MediaFormat>,
}

/// One hardware codec instance: a capability record, a driver component
/// and an input and an output [`BufferManager`].
///
/// Control operations (`init`, `configure`, `start`, ...) may be called
/// from any thread and are serialized internally. Push and pull may run on
/// other threads at the same time.
///
/// # Examples
///
/// ```
/// use std::{sync::Arc, time::Duration};
/// use avcodec::{
///     BufferInfo, CapabilityList, CodecSession, MediaFormat, SessionState,
///     driver::loopback::LoopbackDriver, format::keys,
/// };
///
/// # fn main() -> Result<(), avcodec::Error> {
/// let caps = CapabilityList::from_document(
///     r#"<Codecs><AudioDecoder>
///         <Item codecName="aac.dec"/><Item mimeType="audio/mp4a-latm"/>
///         <Item channels="1-8"/><Item sampleRate="44100,48000"/>
///     </AudioDecoder></Codecs>"#,
/// )?;
/// let session = CodecSession::new(Arc::new(LoopbackDriver::new()), Arc::new(caps));
/// session.init("aac.dec")?;
///
/// let mut format = MediaFormat::new();
/// format.set_int(keys::CHANNEL_COUNT, 2).set_int(keys::SAMPLE_RATE, 48000);
/// session.configure(&format)?;
///
/// let inputs = session.allocate_input_buffers()?;
/// session.allocate_output_buffers()?;
/// session.start()?;
/// assert_eq!(session.state(), SessionState::Running);
///
/// inputs[0].write(0, b"frame")?;
/// session.push_input(inputs[0].id(), BufferInfo::new(0, 0, 5, Default::default()))?;
/// let (output, info) = session.pull_output(Some(Duration::from_secs(1)))?;
/// assert_eq!(output.read(0, info.length)?, b"frame");
///
/// session.stop()?;
/// session.deinit()?;
/// # Ok(())
/// # }
/// ```
pub struct CodecSession {
    driver: Arc<dyn CodecDriver>,
    capabilities: Arc<CapabilityList>,
    config: CodecConfig,
    shared: Arc<Shared>,
    /// Transition lock; also guards the codec binding.
    binding: Mutex<Option<Binding>>,
    state: Mutex<SessionState>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl CodecSession {
    /// Creates a session with the default configuration and a
    /// [`SharedMemoryAllocator`].
    pub fn new(driver: Arc<dyn CodecDriver>, capabilities: Arc<CapabilityList>) -> Self {
        Self::with_config(
            driver,
            capabilities,
            CodecConfig::default(),
            Arc::new(SharedMemoryAllocator::new()),
        )
    }

    /// Creates a session with explicit tunables and buffer allocator.
    ///
    /// # Arguments
    ///
    /// * `driver` - The hardware component both ports talk to
    /// * `capabilities` - Records used to admit configurations
    /// * `config` - Buffer counts and timeouts
    /// * `allocator` - Backing memory for internally allocated buffers
    pub fn with_config(
        driver: Arc<dyn CodecDriver>,
        capabilities: Arc<CapabilityList>,
        config: CodecConfig,
        allocator: Arc<dyn BufferAllocator>,
    ) -> Self {
        let registry = Arc::new(BufferRegistry::new());
        let port = |index| {
            BufferManager::new(index, driver.clone(), allocator.clone(), registry.clone())
                .with_default_timeout(config.pull_timeout())
        };
        let shared = Arc::new(Shared {
            input: port(PortIndex::Input),
            output: port(PortIndex::Output),
            commands: CommandTracker::new(),
            observers: Mutex::new(Vec::new()),
            shutdown: AtomicBool::new(false),
        });
        Self {
            driver,
            capabilities,
            config,
            shared,
            binding: Mutex::new(None),
            state: Mutex::new(SessionState::Uninitialized),
            dispatcher: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &Arc<CapabilityList> {
        &self.capabilities
    }

    pub fn input_port(&self) -> &BufferManager {
        &self.shared.input
    }

    pub fn output_port(&self) -> &BufferManager {
        &self.shared.output
    }

    pub fn port(&self, port: PortIndex) -> &BufferManager {
        self.shared.port(port)
    }

    /// Looks up a live buffer of either port.
    pub fn buffer(&self, id: BufferId) -> Result<CodecBuffer> {
        self.shared.input.buffer(id)
    }

    /// Registers a new observer.
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        let (tx, rx) = mpsc::channel();
        self.shared
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    fn lock_binding(&self) -> MutexGuard<'_, Option<Binding>> {
        self.binding.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Name of the codec selected by [`CodecSession::init`].
    pub fn codec_name(&self) -> Option<String> {
        self.lock_binding()
            .as_ref()
            .map(|binding| binding.record.codec_name.clone())
    }

    /// The last accepted configuration.
    pub fn format(&self) -> Option<MediaFormat> {
        self.lock_binding()
            .as_ref()
            .and_then(|binding| binding.format.clone())
    }

    /// Format of the data produced on the output port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] before a successful configuration.
    pub fn output_format(&self) -> Result<MediaFormat> {
        let binding = self.lock_binding();
        match binding.as_ref() {
            Some(binding) if binding.format.is_some() => Ok(binding.variant.output_caps()),
            _ => Err(Error::IllegalState("codec is not configured".to_string())),
        }
    }

    /// Takes the transition lock and checks the current state.
    fn begin(
        &self,
        allowed: &[SessionState],
        operation: &str,
    ) -> Result<(MutexGuard<'_, Option<Binding>>, SessionState)> {
        let binding = self.lock_binding();
        let state = self.state();
        if !allowed.contains(&state) {
            return Err(Error::IllegalState(format!(
                "cannot {operation} while {state:?}"
            )));
        }
        Ok((binding, state))
    }

    fn set_state(&self, state: SessionState) {
        let previous = std::mem::replace(
            &mut *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            state,
        );
        if previous != state {
            info!("Codec session {:?} -> {:?}", previous, state);
            self.shared.notify(SessionEvent::StateChanged(state));
        }
    }

    /// Sends `command` and waits for its acknowledgement.
    fn command(&self, command: DriverCommand) -> Result<()> {
        self.shared.commands.clear(command);
        let result = self
            .driver
            .send_command(command)
            .and_then(|()| {
                self.shared
                    .commands
                    .wait(command, self.config.command_timeout())
            });
        if let Err(err) = &result {
            error!("Driver command {} failed: {:?}", command, err);
            self.shared.notify(SessionEvent::Error {
                kind: err.kind(),
                code: err.code(),
            });
        }
        result
    }

    /// Sends `command` during teardown, logging failures.
    fn command_quietly(&self, command: DriverCommand) {
        if let Err(err) = self.command(command) {
            warn!("Ignoring failure of {} during teardown: {:?}", command, err);
        }
    }

    /// Rejects pushes on every port that accepts them. Returns the ports held.
    fn hold_ports(&self) -> Vec<&BufferManager> {
        [&self.shared.input, &self.shared.output]
            .into_iter()
            .filter(|port| port.hold().is_ok())
            .collect()
    }

    /// Selects the codec named `codec_name` and creates its driver component.
    ///
    /// # Errors
    ///
    /// - [`Error::IllegalState`] unless the session is uninitialized
    /// - [`Error::UnsupportedConfig`] if no capability record has that name
    /// - any driver error
    pub fn init(&self, codec_name: &str) -> Result<()> {
        let (binding, _) = self.begin(&[SessionState::Uninitialized], "init")?;
        let record = self
            .capabilities
            .find_by_name(codec_name)
            .ok_or_else(|| Error::UnsupportedConfig(format!("unknown codec \"{codec_name}\"")))?
            .clone();
        self.bind(binding, record)
    }

    /// Selects the first codec of `codec_type` advertising `mime`.
    ///
    /// # Errors
    ///
    /// As [`CodecSession::init`].
    pub fn init_by_mime(&self, mime: &str, codec_type: CodecType) -> Result<()> {
        let (binding, _) = self.begin(&[SessionState::Uninitialized], "init")?;
        let record = self
            .capabilities
            .lookup(codec_type, mime)
            .next()
            .ok_or_else(|| Error::UnsupportedConfig(format!("no {codec_type} for \"{mime}\"")))?
            .clone();
        self.bind(binding, record)
    }

    fn bind(
        &self,
        mut binding: MutexGuard<'_, Option<Binding>>,
        record: CapabilityData,
    ) -> Result<()> {
        if !record.is_complete() {
            warn!(
                "Codec \"{}\" has incomplete capabilities: {:?}",
                record.codec_name, record.incomplete
            );
        }
        let variant = create_variant(&record.mime_type, record.codec_type)?;

        let (tx, rx) = mpsc::channel();
        self.driver.init(&record.codec_name, tx)?;
        self.shared.shutdown.store(false, Ordering::Release);
        let shared = self.shared.clone();
        let handle = match thread::Builder::new()
            .name("avcodec-dispatch".to_string())
            .spawn(move || run_dispatcher(shared, rx))
        {
            Ok(handle) => handle,
            Err(err) => {
                if let Err(deinit_err) = self.driver.deinit() {
                    error!("Failed to deinit driver: {:?}", deinit_err);
                }
                return Err(err.into());
            }
        };
        *self.dispatcher.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        info!("Codec session bound to \"{}\"", record.codec_name);
        *binding = Some(Binding {
            record,
            variant,
            format: None,
        });
        self.set_state(SessionState::Initialized);
        Ok(())
    }

    /// Admits `format` against the codec's capabilities and applies it.
    ///
    /// Nothing reaches the driver unless the whole format is admitted.
    ///
    /// # Errors
    ///
    /// - [`Error::IllegalState`] unless the session is initialized or configured
    /// - [`Error::UnsupportedConfig`] if a key is outside the advertised capabilities
    /// - [`Error::IllegalArgument`] if a key the codec needs is missing
    /// - any driver error; the previous configuration stays in effect
    pub fn configure(&self, format: &MediaFormat) -> Result<()> {
        let (mut guard, state) = self.begin(
            &[SessionState::Initialized, SessionState::Configured],
            "configure",
        )?;
        let binding = guard
            .as_mut()
            .ok_or_else(|| Error::IllegalState("no codec bound".to_string()))?;
        let record = &binding.record;
        if let Some(name) = format.get_string(keys::CODEC_NAME)
            && name != record.codec_name
        {
            return Err(Error::UnsupportedConfig(format!(
                "format selects \"{name}\" but the session runs \"{}\"",
                record.codec_name
            )));
        }
        check_format(record, format)?;
        let mut variant = create_variant(&record.mime_type, record.codec_type)?;
        variant.init(format)?;
        self.driver.set_parameter(format)?;

        debug!("Codec \"{}\" configured with {}", record.codec_name, format);
        binding.variant = variant;
        binding.format = Some(format.clone());
        if state != SessionState::Configured {
            self.set_state(SessionState::Configured);
        }
        Ok(())
    }

    /// Buffer requirements of `port` under the current configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] before a successful configuration.
    pub fn port_definition(&self, port: PortIndex) -> Result<PortDefinition> {
        let binding = self.lock_binding();
        match binding.as_ref() {
            Some(binding) if binding.format.is_some() => {
                Ok(binding.variant.port_definition(port, &self.config))
            }
            _ => Err(Error::IllegalState("codec is not configured".to_string())),
        }
    }

    /// Selects internal or external buffers for `port`.
    pub fn set_buffer_mode(&self, port: PortIndex, mode: BufferMode) -> Result<()> {
        let _guard = self.begin(
            &[SessionState::Initialized, SessionState::Configured],
            "change buffer mode",
        )?;
        self.shared.port(port).set_buffer_mode(mode)
    }

    fn allocate(&self, port: PortIndex) -> Result<Vec<CodecBuffer>> {
        let (guard, _) = self.begin(
            &[SessionState::Configured, SessionState::Running, SessionState::Paused],
            "allocate buffers",
        )?;
        let definition = guard
            .as_ref()
            .map(|binding| binding.variant.port_definition(port, &self.config))
            .ok_or_else(|| Error::IllegalState("no codec bound".to_string()))?;
        debug!(
            "Allocating {} {} buffers of {} bytes",
            definition.buffer_count, port, definition.buffer_size
        );
        self.shared
            .port(port)
            .allocate_buffers(definition.buffer_count, definition.buffer_size)
    }

    fn attach(&self, port: PortIndex, buffers: Vec<CodecBuffer>) -> Result<()> {
        let (guard, _) = self.begin(
            &[SessionState::Configured, SessionState::Running, SessionState::Paused],
            "use buffers",
        )?;
        let definition = guard
            .as_ref()
            .map(|binding| binding.variant.port_definition(port, &self.config))
            .ok_or_else(|| Error::IllegalState("no codec bound".to_string()))?;
        if let Some(small) = buffers
            .iter()
            .find(|buffer| buffer.capacity() < definition.buffer_size)
        {
            return Err(Error::IllegalArgument(format!(
                "{} buffer {} holds {} bytes, {} are required",
                port,
                small.id(),
                small.capacity(),
                definition.buffer_size
            )));
        }
        self.shared.port(port).use_buffers(buffers)
    }

    /// Allocates the input buffers the configured codec requires.
    ///
    /// Legal once configured; while running only on a deactivated port.
    pub fn allocate_input_buffers(&self) -> Result<Vec<CodecBuffer>> {
        self.allocate(PortIndex::Input)
    }

    /// Allocates the output buffers the configured codec requires.
    pub fn allocate_output_buffers(&self) -> Result<Vec<CodecBuffer>> {
        self.allocate(PortIndex::Output)
    }

    /// Attaches caller-supplied input buffers. The port must be in
    /// [`BufferMode::External`].
    pub fn use_input_buffers(&self, buffers: Vec<CodecBuffer>) -> Result<()> {
        self.attach(PortIndex::Input, buffers)
    }

    /// Attaches caller-supplied output buffers, for example display surfaces.
    pub fn use_output_buffers(&self, buffers: Vec<CodecBuffer>) -> Result<()> {
        self.attach(PortIndex::Output, buffers)
    }

    /// Hands every free output buffer to the codec.
    fn prime_output(&self) {
        let output = &self.shared.output;
        for id in output.free_buffer_ids() {
            if let Err(err) = output.push_buffer(id, BufferInfo::default()) {
                warn!("Failed to queue output buffer {}: {:?}", id, err);
            }
        }
    }

    /// Starts the codec. Every free output buffer is handed to the codec.
    ///
    /// # Errors
    ///
    /// - [`Error::IllegalState`] unless configured with buffers on both ports
    /// - any driver error; the session stays configured
    pub fn start(&self) -> Result<()> {
        let _guard = self.begin(&[SessionState::Configured], "start")?;
        for port in [&self.shared.input, &self.shared.output] {
            if port.state() != PortState::Ready {
                return Err(Error::IllegalState(format!(
                    "{} port is {:?}; buffers are required before start",
                    port.port(),
                    port.state()
                )));
            }
        }

        self.command(DriverCommand::SetState(ComponentState::Idle))?;
        if let Err(err) = self.command(DriverCommand::SetState(ComponentState::Executing)) {
            self.command_quietly(DriverCommand::SetState(ComponentState::Loaded));
            return Err(err);
        }
        self.shared.input.start()?;
        self.shared.output.start()?;
        self.prime_output();
        self.set_state(SessionState::Running);
        Ok(())
    }

    /// Suspends processing. Completed buffers can still be pulled.
    pub fn pause(&self) -> Result<()> {
        let _guard = self.begin(&[SessionState::Running], "pause")?;
        self.command(DriverCommand::SetState(ComponentState::Pause))?;
        self.shared.input.pause()?;
        self.shared.output.pause()?;
        self.set_state(SessionState::Paused);
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        let _guard = self.begin(&[SessionState::Paused], "resume")?;
        self.command(DriverCommand::SetState(ComponentState::Executing))?;
        self.shared.input.resume()?;
        self.shared.output.resume()?;
        self.set_state(SessionState::Running);
        Ok(())
    }

    /// Discards every buffer the codec holds on the ports of `direction`.
    ///
    /// Parked pulls on those ports return [`Error::Cancelled`]. When this
    /// returns, every reclaimed buffer is free again; output buffers have to
    /// be pushed back with [`CodecSession::push_output`].
    ///
    /// # Errors
    ///
    /// - [`Error::IllegalState`] unless running or paused
    /// - any driver error; the session returns to its prior state and the
    ///   buffers stay with the codec
    pub fn flush(&self, direction: FlushDirection) -> Result<()> {
        let (_guard, prior) = self.begin(
            &[SessionState::Running, SessionState::Paused],
            "flush",
        )?;
        let mut flushing: Vec<&BufferManager> = Vec::new();
        for port in direction.ports() {
            let manager = self.shared.port(*port);
            if let Err(err) = manager.begin_flush() {
                for manager in &flushing {
                    manager.abort_flush();
                }
                return Err(err);
            }
            flushing.push(manager);
        }
        self.set_state(SessionState::Flushing);

        // Buffers stay with the codec until it confirms it dropped them.
        let result = self.command(DriverCommand::Flush(direction.target()));
        for manager in flushing {
            if result.is_ok() {
                manager.commit_flush();
            } else {
                manager.abort_flush();
            }
        }

        self.set_state(prior);
        result
    }

    /// Stops the codec and frees the buffers of both ports.
    ///
    /// Pushes fail with [`Error::NotReady`] while the codec idles and with
    /// [`Error::IllegalState`] once stopped. Parked pulls return
    /// [`Error::Cancelled`].
    ///
    /// # Errors
    ///
    /// - [`Error::IllegalState`] unless running or paused
    /// - any driver error; nothing changes then
    pub fn stop(&self) -> Result<()> {
        let _guard = self.begin(&[SessionState::Running, SessionState::Paused], "stop")?;
        let held = self.hold_ports();
        if let Err(err) = self.command(DriverCommand::SetState(ComponentState::Idle)) {
            for port in held {
                port.release();
            }
            return Err(err);
        }
        for port in [&self.shared.input, &self.shared.output] {
            port.stop();
            if let Err(err) = port.free_buffers() {
                error!("Failed to free {} buffers: {:?}", port.port(), err);
            }
        }
        self.set_state(SessionState::Stopped);
        Ok(())
    }

    fn reset_ports(&self) {
        for port in [&self.shared.input, &self.shared.output] {
            port.stop();
            if let Err(err) = port.reset() {
                error!("Failed to reset {} port: {:?}", port.port(), err);
            }
        }
    }

    /// Returns to [`SessionState::Initialized`], dropping buffers and the
    /// configuration. Driver failures are logged, not returned.
    pub fn reset(&self) -> Result<()> {
        let (mut guard, state) = self.begin(
            &[
                SessionState::Initialized,
                SessionState::Configured,
                SessionState::Running,
                SessionState::Paused,
                SessionState::Stopped,
            ],
            "reset",
        )?;
        if matches!(state, SessionState::Running | SessionState::Paused) {
            self.hold_ports();
            self.command_quietly(DriverCommand::SetState(ComponentState::Idle));
        }
        if matches!(
            state,
            SessionState::Running | SessionState::Paused | SessionState::Stopped
        ) {
            self.command_quietly(DriverCommand::SetState(ComponentState::Loaded));
        }
        self.reset_ports();
        if let Some(binding) = guard.as_mut() {
            binding.variant = create_variant(&binding.record.mime_type, binding.record.codec_type)?;
            binding.format = None;
        }
        self.set_state(SessionState::Initialized);
        Ok(())
    }

    /// Disables (`active == false`) or re-enables one port so its buffers
    /// can be replaced without stopping the codec.
    ///
    /// While disabled, the port's buffers are reclaimed and can be freed and
    /// allocated again. Re-enabling an output port of a running codec hands
    /// its free buffers to the codec.
    ///
    /// # Errors
    ///
    /// - [`Error::IllegalState`] unless configured, running or paused, or if
    ///   the port is not in a state that allows the change
    /// - any driver error; the port keeps its previous activation
    pub fn active_buffer_mgr(&self, port: PortIndex, active: bool) -> Result<()> {
        let _guard = self.begin(
            &[SessionState::Configured, SessionState::Running, SessionState::Paused],
            "reconfigure port",
        )?;
        let manager = self.shared.port(port);
        if !active {
            manager.hold()?;
            if let Err(err) = self.command(DriverCommand::PortDisable(port)) {
                manager.release();
                return Err(err);
            }
            manager.deactivate()?;
            info!("{} port deactivated", port);
            return Ok(());
        }

        let resumed = manager.activate()?;
        if let Err(err) = self.command(DriverCommand::PortEnable(port)) {
            if let Err(restore_err) = manager.deactivate() {
                error!("Failed to deactivate {} port: {:?}", port, restore_err);
            }
            return Err(err);
        }
        if port == PortIndex::Output && resumed == PortState::Running {
            self.prime_output();
        }
        info!("{} port activated", port);
        Ok(())
    }

    /// Destroys the driver component and stops the dispatcher.
    ///
    /// Legal from every state except [`SessionState::Released`]. The session
    /// is released even if the driver fails to tear down; that failure is
    /// returned.
    pub fn deinit(&self) -> Result<()> {
        let (mut guard, state) = self.begin(
            &[
                SessionState::Uninitialized,
                SessionState::Initialized,
                SessionState::Configured,
                SessionState::Running,
                SessionState::Paused,
                SessionState::Flushing,
                SessionState::Stopped,
            ],
            "deinit",
        )?;
        if state == SessionState::Uninitialized {
            self.set_state(SessionState::Released);
            return Ok(());
        }

        if matches!(state, SessionState::Running | SessionState::Paused) {
            self.hold_ports();
            self.command_quietly(DriverCommand::SetState(ComponentState::Idle));
        }
        self.reset_ports();
        let result = self.driver.deinit();
        if let Err(err) = &result {
            error!("Failed to deinit driver: {:?}", err);
        }

        self.shared.shutdown.store(true, Ordering::Release);
        let handle = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            error!("Failed to join dispatcher thread");
        }

        *guard = None;
        self.set_state(SessionState::Released);
        result
    }

    /// Queues the free input buffer `id` carrying `info`.
    pub fn push_input(&self, id: BufferId, info: BufferInfo) -> Result<()> {
        self.shared.input.push_buffer(id, info)
    }

    /// Takes back an input buffer the codec has consumed.
    pub fn pull_input(&self, timeout: Option<Duration>) -> Result<(CodecBuffer, BufferInfo)> {
        self.shared.input.pull_buffer(timeout)
    }

    /// Hands the free output buffer `id` back to the codec.
    pub fn push_output(&self, id: BufferId) -> Result<()> {
        self.shared.output.push_buffer(id, BufferInfo::default())
    }

    /// Takes the oldest filled output buffer, in the order the codec filled them.
    pub fn pull_output(&self, timeout: Option<Duration>) -> Result<(CodecBuffer, BufferInfo)> {
        self.shared.output.pull_buffer(timeout)
    }
}

impl fmt::Debug for CodecSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecSession")
            .field("state", &self.state())
            .field("input", &self.shared.input)
            .field("output", &self.shared.output)
            .finish()
    }
}

impl Drop for CodecSession {
    fn drop(&mut self) {
        if self.state() != SessionState::Released
            && let Err(err) = self.deinit()
        {
            error!("Failed to deinit codec session: {:?}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BufferFlags, driver::loopback::LoopbackDriver};

    const CAPS: &str = r#"<Codecs>
        <VideoDecoder>
            <Item codecName="avc.dec"/><Item mimeType="video/avc"/>
            <Item width="2-1920"/><Item height="2-1080"/><Item frameRate="1-60"/>
            <Item format="YUVI420,NV12"/>
        </VideoDecoder>
        <AudioDecoder>
            <Item codecName="aac.dec"/><Item mimeType="audio/mp4a-latm"/>
            <Item channels="1-8"/><Item sampleRate="44100,48000"/>
        </AudioDecoder>
    </Codecs>"#;

    fn session() -> (Arc<LoopbackDriver>, CodecSession) {
        let driver = Arc::new(LoopbackDriver::new());
        let caps = Arc::new(CapabilityList::from_document(CAPS).unwrap());
        let mut config = CodecConfig::default();
        config.input_buffer_count = 2;
        config.output_buffer_count = 2;
        let session = CodecSession::with_config(
            driver.clone(),
            caps,
            config,
            Arc::new(SharedMemoryAllocator::new()),
        );
        (driver, session)
    }

    fn audio_format() -> MediaFormat {
        let mut format = MediaFormat::new();
        format
            .set_int(keys::CHANNEL_COUNT, 2)
            .set_int(keys::SAMPLE_RATE, 44100);
        format
    }

    fn running() -> (Arc<LoopbackDriver>, CodecSession, Vec<CodecBuffer>) {
        let (driver, session) = session();
        session.init("aac.dec").unwrap();
        session.configure(&audio_format()).unwrap();
        let inputs = session.allocate_input_buffers().unwrap();
        session.allocate_output_buffers().unwrap();
        session.start().unwrap();
        (driver, session, inputs)
    }

    #[test]
    fn start_requires_configuration() {
        let (_, session) = session();
        session.init("aac.dec").unwrap();
        assert!(matches!(session.start(), Err(Error::IllegalState(_))));
        assert_eq!(session.state(), SessionState::Initialized);
    }

    #[test]
    fn init_twice_is_illegal() {
        let (_, session) = session();
        session.init("aac.dec").unwrap();
        assert!(matches!(session.init("aac.dec"), Err(Error::IllegalState(_))));
        assert_eq!(session.codec_name().as_deref(), Some("aac.dec"));
    }

    #[test]
    fn unknown_codec_is_unsupported() {
        let (driver, session) = session();
        assert!(matches!(
            session.init("vp9.dec"),
            Err(Error::UnsupportedConfig(_))
        ));
        assert!(!driver.is_initialized());
        assert_eq!(session.state(), SessionState::Uninitialized);
    }

    #[test]
    fn driver_rejection_keeps_previous_configuration() {
        let (driver, session) = session();
        session.init("aac.dec").unwrap();
        driver.reject_parameters(Some(crate::driver::STATUS_ERR_INVALID_PARAM));
        assert!(matches!(
            session.configure(&audio_format()),
            Err(Error::Hardware(_))
        ));
        assert_eq!(session.state(), SessionState::Initialized);
        assert!(session.format().is_none());
    }

    #[test]
    fn start_primes_output_buffers() {
        let (driver, session, _) = running();
        assert_eq!(session.output_port().counts().in_flight, 2);
        assert_eq!(driver.queued(PortIndex::Output), 2);
        assert_eq!(driver.component_state(), ComponentState::Executing);
    }

    #[test]
    fn start_failure_stays_configured() {
        let (driver, session) = session();
        session.init("aac.dec").unwrap();
        session.configure(&audio_format()).unwrap();
        session.allocate_input_buffers().unwrap();
        session.allocate_output_buffers().unwrap();
        driver.complete_commands_with(Some(crate::driver::STATUS_ERR_UNKNOWN));
        assert!(matches!(session.start(), Err(Error::Hardware(_))));
        assert_eq!(session.state(), SessionState::Configured);
        assert_eq!(session.input_port().state(), PortState::Ready);
    }

    #[test]
    fn flush_returns_to_prior_state() {
        let (_, session, _) = running();
        let events = session.subscribe();
        session.flush(FlushDirection::Both).unwrap();
        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(session.output_port().counts().free, 2);
        assert_eq!(
            events.try_iter().collect::<Vec<_>>(),
            vec![
                SessionEvent::StateChanged(SessionState::Flushing),
                SessionEvent::StateChanged(SessionState::Running),
            ]
        );
    }

    #[test]
    fn eos_travels_through_the_codec() {
        let (_, session, inputs) = running();
        session.push_input(inputs[0].id(), BufferInfo::eos(9)).unwrap();
        let (_, info) = session.pull_output(Some(Duration::from_secs(2))).unwrap();
        assert!(info.flags.contains(BufferFlags::EOS));
        assert!(matches!(
            session.pull_output(Some(Duration::from_millis(10))),
            Err(Error::EndOfStream)
        ));
    }

    #[test]
    fn late_acknowledgement_does_not_answer_the_next_command() {
        let tracker = CommandTracker::new();
        let idle = DriverCommand::SetState(ComponentState::Idle);
        assert!(matches!(
            tracker.wait(idle, Duration::from_millis(10)),
            Err(Error::Hardware(STATUS_ERR_TIMEOUT))
        ));

        tracker.complete(idle, crate::driver::STATUS_ERR_UNKNOWN);
        tracker.complete(idle, STATUS_OK);
        tracker.wait(idle, Duration::from_millis(10)).unwrap();
    }

    #[test]
    fn deinit_releases_everything() {
        let (driver, session, _) = running();
        session.deinit().unwrap();
        assert_eq!(session.state(), SessionState::Released);
        assert!(!driver.is_initialized());
        assert_eq!(session.output_port().counts().allocated, 0);
        assert!(matches!(session.deinit(), Err(Error::IllegalState(_))));
    }
}
