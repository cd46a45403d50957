// SPDX-FileCopyrightText: 2025 2025 Contributors to the AVCodec buffer manager project.
// SPDX-License-Identifier: Apache-2.0

//! Per-port codec buffer manager.
//!
//! A [`BufferManager`] combines a [`BufferPool`] with the push/pull verbs the
//! hardware codec expects. Buffers move through the pool like this:
//!
//! ```text
//!            push_buffer              driver BufferDone
//!   free ────────────────► in flight ──────────────────► filled
//!    ▲                        │                            │
//!    │        flush / stop    │                            │
//!    ├────────────────────────┘                            │
//!    └──────────────────────── pull_buffer ◄───────────────┘
//! ```
//!
//! On the input port "filled" means "consumed by the codec, awaiting
//! pull". On the output port it means "filled with decoded or encoded data".

use std::{
    fmt,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use tracing::{debug, info, trace, warn};

use crate::{
    BufferAllocator, BufferId, BufferInfo, BufferMode, BufferPool, BufferRegistry, CodecBuffer,
    CodecDriver, Error, Owner, PoolCounts, Result, driver::Status,
};

/// Direction of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortIndex {
    Input,
    Output,
}

impl fmt::Display for PortIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PortIndex::Input => "input",
            PortIndex::Output => "output",
        })
    }
}

/// Lifecycle of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortState {
    /// No buffers.
    Unallocated,
    /// Buffers allocated or attached, not started.
    Ready,
    /// Pushes and pulls are accepted.
    Running,
    /// Pulls are accepted, pushes are not.
    Paused,
    /// A flush is in progress.
    Flushing,
    /// Pushes are rejected while the codec is asked to stop or disable the port.
    Draining,
    Stopped,
    /// Disabled for reconfiguration.
    Deactivated,
}

struct PortInner {
    pool: BufferPool,
    state: PortState,
    /// State to return to after a flush or reactivation.
    resume_state: PortState,
    /// Incremented by stop, flush and deactivation to cancel parked pulls.
    generation: u64,
    eos_reached: bool,
    format_changed: bool,
    hardware_error: Option<Status>,
}

impl PortInner {
    fn clear_stream_events(&mut self) {
        self.eos_reached = false;
        self.format_changed = false;
        self.hardware_error = None;
    }
}

/// Buffer manager for one direction of a codec.
///
/// All queue mutations happen under a per-port mutex. Producer and consumer
/// threads may push and pull concurrently with each other and with driver
/// completions.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use avcodec::{
///     BufferManager, BufferRegistry, PortIndex, SharedMemoryAllocator,
///     driver::loopback::LoopbackDriver,
/// };
///
/// # fn main() -> Result<(), avcodec::Error> {
/// let port = BufferManager::new(
///     PortIndex::Input,
///     Arc::new(LoopbackDriver::new()),
///     Arc::new(SharedMemoryAllocator::new()),
///     Arc::new(BufferRegistry::new()),
/// );
/// let buffers = port.allocate_buffers(4, 4096)?;
/// assert_eq!(buffers.len(), 4);
/// assert_eq!(port.counts().free, 4);
/// port.free_buffers()?;
/// # Ok(())
/// # }
/// ```
pub struct BufferManager {
    port: PortIndex,
    mode: Mutex<BufferMode>,
    driver: Arc<dyn CodecDriver>,
    registry: Arc<BufferRegistry>,
    default_timeout: Duration,
    inner: Mutex<PortInner>,
    ready: Condvar,
}

impl BufferManager {
    /// Default timeout of [`BufferManager::pull_buffer`].
    pub const DEFAULT_PULL_TIMEOUT: Duration = Duration::from_millis(100);

    pub fn new(
        port: PortIndex,
        driver: Arc<dyn CodecDriver>,
        allocator: Arc<dyn BufferAllocator>,
        registry: Arc<BufferRegistry>,
    ) -> Self {
        Self {
            port,
            mode: Mutex::new(BufferMode::Internal),
            driver,
            registry: registry.clone(),
            default_timeout: Self::DEFAULT_PULL_TIMEOUT,
            inner: Mutex::new(PortInner {
                pool: BufferPool::new(allocator, registry),
                state: PortState::Unallocated,
                resume_state: PortState::Ready,
                generation: 0,
                eos_reached: false,
                format_changed: false,
                hardware_error: None,
            }),
            ready: Condvar::new(),
        }
    }

    /// Sets the timeout used by pulls that do not pass one.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    fn lock(&self) -> MutexGuard<'_, PortInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn port(&self) -> PortIndex {
        self.port
    }

    pub fn state(&self) -> PortState {
        self.lock().state
    }

    pub fn buffer_mode(&self) -> BufferMode {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Selects how the port obtains its buffers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] while the port holds buffers.
    pub fn set_buffer_mode(&self, mode: BufferMode) -> Result<()> {
        let inner = self.lock();
        if inner.pool.allocated() != 0 {
            return Err(Error::IllegalState(format!(
                "{} port holds buffers; free them before changing mode",
                self.port
            )));
        }
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner) = mode;
        debug!("{} port buffer mode set to {:?}", self.port, mode);
        Ok(())
    }

    pub fn counts(&self) -> PoolCounts {
        self.lock().pool.counts()
    }

    pub fn owner(&self, id: BufferId) -> Option<Owner> {
        self.lock().pool.owner(id)
    }

    /// All buffers of the port.
    pub fn buffers(&self) -> Vec<CodecBuffer> {
        self.lock().pool.buffers()
    }

    /// Ids of free buffers, oldest first.
    pub fn free_buffer_ids(&self) -> Vec<BufferId> {
        self.lock().pool.free_ids()
    }

    /// Looks up a live buffer of any port sharing this port's registry.
    pub fn buffer(&self, id: BufferId) -> Result<CodecBuffer> {
        self.registry.get(id)
    }

    fn check_init_state(&self, inner: &PortInner) -> Result<()> {
        match inner.state {
            PortState::Unallocated | PortState::Stopped | PortState::Deactivated => Ok(()),
            state => Err(Error::IllegalState(format!(
                "cannot initialize {} port buffers while {:?}",
                self.port, state
            ))),
        }
    }

    fn after_init(&self, inner: &mut PortInner) {
        if inner.state != PortState::Deactivated {
            inner.state = PortState::Ready;
        }
        inner.clear_stream_events();
    }

    /// Allocates `count` internal buffers of `size` bytes.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidMode`] if the port is in [`BufferMode::External`]
    /// - [`Error::IllegalState`] unless the port is unallocated, stopped or deactivated
    /// - [`Error::ResourceExhausted`] if the allocator fails; nothing is allocated then
    pub fn allocate_buffers(&self, count: usize, size: usize) -> Result<Vec<CodecBuffer>> {
        if self.buffer_mode() != BufferMode::Internal {
            return Err(Error::InvalidMode(format!(
                "{} port uses external buffers",
                self.port
            )));
        }
        let mut inner = self.lock();
        self.check_init_state(&inner)?;
        let buffers = inner.pool.allocate(count, size)?;
        self.after_init(&mut inner);
        info!("{} port allocated {} buffers of {} bytes", self.port, count, size);
        Ok(buffers)
    }

    /// Uses caller-supplied buffers.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidMode`] if the port is in [`BufferMode::Internal`]
    /// - [`Error::IllegalState`] unless the port is unallocated, stopped or deactivated
    pub fn use_buffers(&self, buffers: Vec<CodecBuffer>) -> Result<()> {
        if self.buffer_mode() != BufferMode::External {
            return Err(Error::InvalidMode(format!(
                "{} port allocates its own buffers",
                self.port
            )));
        }
        let mut inner = self.lock();
        self.check_init_state(&inner)?;
        let count = buffers.len();
        inner.pool.attach_external(buffers)?;
        self.after_init(&mut inner);
        info!("{} port uses {} external buffers", self.port, count);
        Ok(())
    }

    /// Releases every buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if any buffer is in flight or awaiting pull.
    pub fn free_buffers(&self) -> Result<()> {
        let mut inner = self.lock();
        inner.pool.free()?;
        if !matches!(inner.state, PortState::Stopped | PortState::Deactivated) {
            inner.state = PortState::Unallocated;
        }
        debug!("{} port buffers freed", self.port);
        Ok(())
    }

    /// Hands the free buffer `id` to the codec.
    ///
    /// On the input port `info` describes the payload; an end-of-stream
    /// buffer without payload is legal. On the output port `info` is ignored.
    ///
    /// # Errors
    ///
    /// - [`Error::IllegalState`] if the port is stopped; no buffer state changes
    /// - [`Error::NotReady`] if the port is not running
    /// - [`Error::Busy`] / [`Error::IllegalArgument`] if `id` is not a free buffer of this port
    /// - any driver error; the buffer is returned to the free queue
    pub fn push_buffer(&self, id: BufferId, info: BufferInfo) -> Result<()> {
        let mut inner = self.lock();
        match inner.state {
            PortState::Running => {}
            PortState::Stopped => {
                return Err(Error::IllegalState(format!(
                    "{} port is stopped",
                    self.port
                )));
            }
            state => {
                trace!("Push to {} port rejected while {:?}", self.port, state);
                return Err(Error::NotReady);
            }
        }
        let buffer = inner.pool.acquire(id)?;
        if self.port == PortIndex::Input {
            let end = info.offset.checked_add(info.length);
            if end.is_none_or(|end| end > buffer.capacity()) {
                inner.pool.release(id)?;
                return Err(Error::IllegalArgument(format!(
                    "payload {}+{} exceeds capacity {} of buffer {}",
                    info.offset,
                    info.length,
                    buffer.capacity(),
                    id
                )));
            }
        }

        let result = match self.port {
            PortIndex::Input => self.driver.empty_this_buffer(&buffer, info),
            PortIndex::Output => self.driver.fill_this_buffer(&buffer),
        };
        if let Err(err) = result {
            warn!("Driver rejected {} buffer {}: {:?}", self.port, id, err);
            inner.pool.release(id)?;
            return Err(err);
        }
        trace!("{} buffer {} pushed", self.port, id);
        Ok(())
    }

    /// Retrieves the oldest buffer the codec has finished with.
    ///
    /// Blocks for at most `timeout` (or the port's default timeout).
    ///
    /// # Errors
    ///
    /// - [`Error::NoBufferAvailable`] if nothing completed in time; not a failure
    /// - [`Error::Cancelled`] if a stop, flush or deactivation woke the call
    /// - [`Error::EndOfStream`] once an end-of-stream buffer was pulled and nothing else is filled
    /// - [`Error::FormatChanged`] once after the driver reported new output settings
    /// - [`Error::Hardware`] once after the driver reported an error
    /// - [`Error::IllegalState`] if the port is stopped, [`Error::NotReady`] if it is not running
    pub fn pull_buffer(&self, timeout: Option<Duration>) -> Result<(CodecBuffer, BufferInfo)> {
        let deadline = Instant::now() + timeout.unwrap_or(self.default_timeout);
        let mut inner = self.lock();
        let generation = inner.generation;
        loop {
            if inner.generation != generation {
                debug!("Pull on {} port cancelled", self.port);
                return Err(Error::Cancelled);
            }
            if let Some(status) = inner.hardware_error.take() {
                return Err(Error::Hardware(status));
            }
            if inner.format_changed {
                inner.format_changed = false;
                return Err(Error::FormatChanged);
            }
            if let Some((buffer, info)) = inner.pool.take_filled() {
                if self.port == PortIndex::Output && info.is_eos() {
                    info!("End of stream reached on {} port", self.port);
                    inner.eos_reached = true;
                }
                return Ok((buffer, info));
            }
            if inner.eos_reached {
                return Err(Error::EndOfStream);
            }
            match inner.state {
                PortState::Running | PortState::Paused => {}
                PortState::Stopped => {
                    return Err(Error::IllegalState(format!(
                        "{} port is stopped",
                        self.port
                    )));
                }
                _ => return Err(Error::NotReady),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::NoBufferAvailable);
            }
            inner = self
                .ready
                .wait_timeout(inner, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Driver completion of buffer `id`. Buffers that are not in flight (for
    /// example because a flush reclaimed them) are ignored.
    ///
    /// Returns `true` if the completion was accepted.
    pub fn on_buffer_done(&self, id: BufferId, info: BufferInfo) -> bool {
        let mut inner = self.lock();
        match inner.pool.mark_filled(id, info) {
            Ok(()) => {
                trace!("{} buffer {} done", self.port, id);
                self.ready.notify_all();
                true
            }
            Err(err) => {
                warn!("Ignoring completion of {} buffer {}: {:?}", self.port, id, err);
                false
            }
        }
    }

    /// Driver notification that the port format changed.
    pub fn on_format_changed(&self) {
        self.lock().format_changed = true;
        self.ready.notify_all();
    }

    /// Driver notification of a component error.
    pub fn on_error(&self, status: Status) {
        self.lock().hardware_error = Some(status);
        self.ready.notify_all();
    }

    fn cancel_waiters(&self, inner: &mut PortInner) {
        inner.generation = inner.generation.wrapping_add(1);
        self.ready.notify_all();
    }

    fn transition(&self, inner: &mut PortInner, state: PortState) {
        if inner.state != state {
            debug!("{} port {:?} -> {:?}", self.port, inner.state, state);
            inner.state = state;
        }
    }

    /// Starts accepting pushes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] unless the port has buffers and is ready.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.state != PortState::Ready {
            return Err(Error::IllegalState(format!(
                "cannot start {} port while {:?}",
                self.port, inner.state
            )));
        }
        inner.clear_stream_events();
        self.transition(&mut inner, PortState::Running);
        Ok(())
    }

    /// Rejects further pushes; pulls keep draining completed buffers.
    pub fn pause(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.state != PortState::Running {
            return Err(Error::IllegalState(format!(
                "cannot pause {} port while {:?}",
                self.port, inner.state
            )));
        }
        self.transition(&mut inner, PortState::Paused);
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.state != PortState::Paused {
            return Err(Error::IllegalState(format!(
                "cannot resume {} port while {:?}",
                self.port, inner.state
            )));
        }
        self.transition(&mut inner, PortState::Running);
        Ok(())
    }

    /// Moves every in-flight or filled buffer back to the free queue and
    /// cancels parked pulls.
    fn reclaim(&self, inner: &mut PortInner) -> usize {
        let reclaimed = inner.pool.flush().len();
        inner.clear_stream_events();
        self.cancel_waiters(inner);
        reclaimed
    }

    /// Enters `gate` from one of `allowed`, remembering the state to return to.
    fn gate(&self, gate: PortState, allowed: &[PortState]) -> Result<()> {
        let mut inner = self.lock();
        if !allowed.contains(&inner.state) {
            return Err(Error::IllegalState(format!(
                "cannot enter {:?} on {} port while {:?}",
                gate, self.port, inner.state
            )));
        }
        inner.resume_state = inner.state;
        self.transition(&mut inner, gate);
        Ok(())
    }

    fn ungate(&self, gate: PortState) {
        let mut inner = self.lock();
        if inner.state == gate {
            let resume = inner.resume_state;
            self.transition(&mut inner, resume);
        }
    }

    /// Rejects pushes while the codec is asked to flush this port. Nothing is
    /// reclaimed until [`BufferManager::commit_flush`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] unless the port is running or paused.
    pub fn begin_flush(&self) -> Result<()> {
        self.gate(
            PortState::Flushing,
            &[PortState::Running, PortState::Paused],
        )
    }

    /// Reclaims every buffer the codec dropped in the flush, cancels parked
    /// pulls and returns to the state before [`BufferManager::begin_flush`].
    ///
    /// Returns the number of buffers reclaimed.
    pub fn commit_flush(&self) -> usize {
        let mut inner = self.lock();
        if inner.state != PortState::Flushing {
            warn!("{} port is not flushing; nothing to commit", self.port);
            return 0;
        }
        let reclaimed = self.reclaim(&mut inner);
        let resume = inner.resume_state;
        self.transition(&mut inner, resume);
        info!("{} port flushed {} buffers", self.port, reclaimed);
        reclaimed
    }

    /// Leaves a flush the codec refused. Buffers it holds stay in flight.
    pub fn abort_flush(&self) {
        self.ungate(PortState::Flushing);
    }

    /// `enable == true` enters the flushing state: pushes are rejected, parked
    /// pulls return [`Error::Cancelled`] and every in-flight or filled buffer
    /// returns to the free queue. `enable == false` leaves it again.
    ///
    /// Returns the number of buffers reclaimed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] unless the port is running or paused
    /// (to enable) or flushing (to disable).
    pub fn flush(&self, enable: bool) -> Result<usize> {
        if !enable {
            let mut inner = self.lock();
            if inner.state != PortState::Flushing {
                return Err(Error::IllegalState(format!(
                    "{} port is not flushing",
                    self.port
                )));
            }
            let resume = inner.resume_state;
            self.transition(&mut inner, resume);
            return Ok(0);
        }
        self.begin_flush()?;
        let mut inner = self.lock();
        let reclaimed = self.reclaim(&mut inner);
        info!("{} port flushed {} buffers", self.port, reclaimed);
        Ok(reclaimed)
    }

    /// Rejects pushes while the codec is asked to stop or disable this port.
    /// Follow with [`BufferManager::stop`] or [`BufferManager::deactivate`],
    /// or with [`BufferManager::release`] if the codec refused.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] unless the port is ready, running or paused.
    pub fn hold(&self) -> Result<()> {
        self.gate(
            PortState::Draining,
            &[PortState::Ready, PortState::Running, PortState::Paused],
        )
    }

    /// Undoes [`BufferManager::hold`].
    pub fn release(&self) {
        self.ungate(PortState::Draining);
    }

    /// Stops the port: pushes fail with [`Error::IllegalState`], parked pulls
    /// are cancelled and every buffer returns to the free queue.
    pub fn stop(&self) {
        let mut inner = self.lock();
        let reclaimed = self.reclaim(&mut inner);
        self.transition(&mut inner, PortState::Stopped);
        debug!("{} port stopped, {} buffers reclaimed", self.port, reclaimed);
    }

    /// Disables the port so its buffers can be reconfigured.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] if the port is unallocated, stopped or
    /// already deactivated.
    pub fn deactivate(&self) -> Result<()> {
        let mut inner = self.lock();
        match inner.state {
            PortState::Ready | PortState::Running | PortState::Paused => {
                inner.resume_state = inner.state;
            }
            // Held by `hold`, which already recorded the state to resume.
            PortState::Draining => {}
            state => {
                return Err(Error::IllegalState(format!(
                    "cannot deactivate {} port while {:?}",
                    self.port, state
                )));
            }
        }
        self.reclaim(&mut inner);
        self.transition(&mut inner, PortState::Deactivated);
        Ok(())
    }

    /// Re-enables a deactivated port, returning it to its previous state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] if the port is not deactivated or has no buffers.
    pub fn activate(&self) -> Result<PortState> {
        let mut inner = self.lock();
        if inner.state != PortState::Deactivated {
            return Err(Error::IllegalState(format!(
                "{} port is not deactivated",
                self.port
            )));
        }
        if inner.pool.allocated() == 0 {
            return Err(Error::IllegalState(format!(
                "{} port has no buffers to activate with",
                self.port
            )));
        }
        inner.clear_stream_events();
        let resume = inner.resume_state;
        self.transition(&mut inner, resume);
        Ok(resume)
    }

    /// Returns a stopped or idle port to [`PortState::Unallocated`] with
    /// internal buffer mode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if buffers are still in flight or awaiting pull.
    pub fn reset(&self) -> Result<()> {
        let mut inner = self.lock();
        inner.pool.free()?;
        inner.clear_stream_events();
        self.transition(&mut inner, PortState::Unallocated);
        self.cancel_waiters(&mut inner);
        drop(inner);
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner) = BufferMode::Internal;
        Ok(())
    }
}

impl fmt::Debug for BufferManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("BufferManager")
            .field("port", &self.port)
            .field("state", &inner.state)
            .field("counts", &inner.pool.counts())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;
    use crate::{SharedMemoryAllocator, driver::loopback::LoopbackDriver};

    fn port(
        index: PortIndex,
    ) -> (
        BufferManager,
        Arc<LoopbackDriver>,
        mpsc::Receiver<crate::DriverEvent>,
    ) {
        let driver = Arc::new(LoopbackDriver::new());
        let (tx, rx) = mpsc::channel();
        driver.init("test", tx).unwrap();
        let port = BufferManager::new(
            index,
            driver.clone(),
            Arc::new(SharedMemoryAllocator::new()),
            Arc::new(BufferRegistry::new()),
        )
        .with_default_timeout(Duration::from_millis(10));
        (port, driver, rx)
    }

    #[test]
    fn wrong_initialization_path_is_invalid_mode() {
        let (port, _, _) = port(PortIndex::Output);
        assert!(matches!(port.use_buffers(Vec::new()), Err(Error::InvalidMode(_))));
        port.set_buffer_mode(BufferMode::External).unwrap();
        assert!(matches!(port.allocate_buffers(2, 8), Err(Error::InvalidMode(_))));
        assert_eq!(port.state(), PortState::Unallocated);
    }

    #[test]
    fn push_requires_running_port() {
        let (port, _, _) = port(PortIndex::Input);
        let id = port.allocate_buffers(1, 8).unwrap()[0].id();
        assert!(matches!(
            port.push_buffer(id, BufferInfo::default()),
            Err(Error::NotReady)
        ));
        port.start().unwrap();
        port.push_buffer(id, BufferInfo::default()).unwrap();
        assert_eq!(port.owner(id), Some(Owner::InFlight));
    }

    #[test]
    fn oversized_payload_is_rejected_without_leaking() {
        let (port, _, _) = port(PortIndex::Input);
        let id = port.allocate_buffers(1, 8).unwrap()[0].id();
        port.start().unwrap();
        assert!(matches!(
            port.push_buffer(id, BufferInfo::new(0, 4, 5, Default::default())),
            Err(Error::IllegalArgument(_))
        ));
        assert_eq!(port.owner(id), Some(Owner::Free));
    }

    #[test]
    fn completion_of_unknown_buffer_is_ignored() {
        let (port, _, _) = port(PortIndex::Output);
        port.allocate_buffers(1, 8).unwrap();
        let before = port.counts();
        assert!(!port.on_buffer_done(BufferId::new(), BufferInfo::default()));
        assert_eq!(port.counts(), before);
    }

    #[test]
    fn pull_times_out_without_data() {
        let (port, _, _) = port(PortIndex::Output);
        port.allocate_buffers(1, 8).unwrap();
        port.start().unwrap();
        assert!(matches!(port.pull_buffer(None), Err(Error::NoBufferAvailable)));
    }

    #[test]
    fn one_shot_stream_events() {
        let (port, _, _) = port(PortIndex::Output);
        port.allocate_buffers(1, 8).unwrap();
        port.start().unwrap();
        port.on_format_changed();
        assert!(matches!(port.pull_buffer(None), Err(Error::FormatChanged)));
        port.on_error(-9);
        assert!(matches!(port.pull_buffer(None), Err(Error::Hardware(-9))));
        assert!(matches!(port.pull_buffer(None), Err(Error::NoBufferAvailable)));
    }

    #[test]
    fn deactivate_and_reconfigure() {
        let (port, _, _) = port(PortIndex::Output);
        port.allocate_buffers(2, 8).unwrap();
        port.start().unwrap();
        port.deactivate().unwrap();
        port.free_buffers().unwrap();
        assert_eq!(port.state(), PortState::Deactivated);
        assert!(port.activate().is_err());
        port.allocate_buffers(3, 16).unwrap();
        assert_eq!(port.activate().unwrap(), PortState::Running);
        assert_eq!(port.counts().allocated, 3);
    }

    #[test]
    fn aborted_flush_leaves_buffers_in_flight() {
        let (port, driver, _) = port(PortIndex::Output);
        let ids: Vec<_> = port
            .allocate_buffers(2, 8)
            .unwrap()
            .iter()
            .map(CodecBuffer::id)
            .collect();
        port.start().unwrap();
        for id in &ids {
            port.push_buffer(*id, BufferInfo::default()).unwrap();
        }

        port.begin_flush().unwrap();
        assert!(matches!(
            port.push_buffer(ids[0], BufferInfo::default()),
            Err(Error::NotReady)
        ));
        port.abort_flush();
        assert_eq!(port.state(), PortState::Running);
        assert_eq!(port.counts().in_flight, 2);
        assert_eq!(driver.queued(PortIndex::Output), 2);

        port.begin_flush().unwrap();
        assert_eq!(port.commit_flush(), 2);
        assert_eq!(port.counts().free, 2);
        assert_eq!(port.state(), PortState::Running);
    }

    #[test]
    fn held_port_rejects_pushes() {
        let (port, _, _) = port(PortIndex::Input);
        let id = port.allocate_buffers(1, 8).unwrap()[0].id();
        port.start().unwrap();

        port.hold().unwrap();
        assert!(matches!(
            port.push_buffer(id, BufferInfo::default()),
            Err(Error::NotReady)
        ));
        port.release();
        assert_eq!(port.state(), PortState::Running);
        port.push_buffer(id, BufferInfo::default()).unwrap();

        port.hold().unwrap();
        port.deactivate().unwrap();
        assert_eq!(port.owner(id), Some(Owner::Free));
        assert_eq!(port.activate().unwrap(), PortState::Running);
    }
}
