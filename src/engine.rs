//! Thread-safe engine: one audio thread calls [`Engine::process`], any thread may
//! swap the patch, schedule events or exchange presets.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use cadenza_core::{
    AtomicValue, ClockId, DataType, EngineCore, Event, EventTarget, InterfaceEndpoint,
    InterfaceId, MillisecondTime, ParameterIndex, ParameterTable, Patcher, Preset,
    PresetCallback, ServiceNotification, TimedMidiEvent,
};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use crate::builder::EngineBuilder;
use crate::config::EngineConfig;
use crate::control::ControlEndpoint;
use crate::external_data::{run_all, ExternalDataMap, ReleaseCallback};
use crate::interface::{
    AsyncInterface, EventHandler, InterfaceKind, ParameterEventInterface, SyncInterface,
    TriggerInterface,
};
use crate::swap::SwapGate;
use crate::Result;

/// Drives one patch from a real-time audio callback while control threads replace it,
/// schedule events and read or write its state.
///
/// Scheduling events, requesting presets and reading parameter values go through a
/// lock-free queue and a value mirror, and never delay the audio thread. Operations that
/// need the patch itself (replacing it, lending buffers, synchronous presets, dispatching
/// without audio) wait, bounded by [`EngineConfig::lock_timeout`], until the audio thread
/// leaves `process`; while one is pending, `process` skips the block and returns `false`.
///
/// # Example
///
/// ```
/// use cadenza::{Engine, Event, NullPatcher};
///
/// let engine = Engine::builder()
///     .sample_rate(48000.0)
///     .max_block_size(512)
///     .patcher(Box::new(NullPatcher))
///     .build()?;
///
/// engine.schedule_event(Event::tempo(120.0, 0.0));
///
/// let mut left = vec![0.0f32; 512];
/// let mut outputs = [left.as_mut_slice()];
/// assert!(engine.process(&[], &mut outputs, 512, None, None));
/// # Ok::<(), cadenza::Error>(())
/// ```
pub struct Engine {
    core: UnsafeCell<EngineCore>,
    gate: SwapGate,
    control: Arc<ControlEndpoint>,
    services_tx: Sender<ServiceNotification>,
    services_rx: Receiver<ServiceNotification>,
    external: Mutex<ExternalDataMap>,
    parameters: ArcSwap<ParameterTable>,
    generation: AtomicU32,
    now: AtomicValue,
    sample_rate: AtomicValue,
    next_interface_id: AtomicU64,
    live_interfaces: AtomicUsize,
    config: EngineConfig,
}

// SAFETY: `core` is only dereferenced while holding a `ProcessPermit` or a `ControlPermit`
// from `gate`, and the gate never grants both at once. Everything else is `Sync`.
unsafe impl Sync for Engine {}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Unprepared engine with no patch attached.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let mut core = EngineCore::with_capacity(config.event_capacity);
        let control = Arc::new(ControlEndpoint::new(Arc::clone(core.parameter_table())));
        core.register_endpoint(control.clone());
        let (services_tx, services_rx) = crossbeam_channel::bounded(config.service_queue_capacity);
        tracing::debug!(
            "Created engine (lock timeout {:?}, {} interfaces max)",
            config.lock_timeout,
            config.max_interfaces
        );
        Ok(Self {
            parameters: ArcSwap::new(Arc::clone(core.parameter_table())),
            core: UnsafeCell::new(core),
            gate: SwapGate::new(),
            control,
            services_tx,
            services_rx,
            external: Mutex::new(ExternalDataMap::default()),
            generation: AtomicU32::new(0),
            now: AtomicValue::new(0.0),
            sample_rate: AtomicValue::new(0.0),
            next_interface_id: AtomicU64::new(1),
            live_interfaces: AtomicUsize::new(0),
            config,
        })
    }

    /// Audio-thread entry point. Never blocks.
    ///
    /// Returns `false` without touching `outputs` when a control operation holds the
    /// engine.
    pub fn process(
        &self,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        frames: usize,
        midi_in: Option<&[TimedMidiEvent]>,
        midi_out: Option<&mut Vec<TimedMidiEvent>>,
    ) -> bool {
        let Some(_permit) = self.gate.try_enter_process() else {
            return false;
        };
        // SAFETY: the process permit excludes every controller.
        let core = unsafe { &mut *self.core.get() };

        // Apply pending interface registrations
        self.drain_services(core);

        core.process(inputs, outputs, frames, midi_in, midi_out);
        self.now.set(core.current_time());
        true
    }

    /// Run `f` with exclusive access to the core, waiting for the audio thread if needed.
    fn exclusive<R>(&self, f: impl FnOnce(&mut EngineCore, &mut ExternalDataMap) -> R) -> Result<R> {
        let _permit = self.gate.acquire(self.config.lock_timeout)?;
        // SAFETY: the control permit excludes the audio thread and other controllers.
        let core = unsafe { &mut *self.core.get() };
        self.drain_services(core);
        // Queued events go first so they keep their order relative to whatever `f` schedules
        core.collect_incoming();
        let mut external = self.external.lock();
        let result = f(core, &mut external);
        self.now.set(core.current_time());
        Ok(result)
    }

    fn drain_services(&self, core: &mut EngineCore) {
        while let Ok(notification) = self.services_rx.try_recv() {
            apply_service(core, notification);
        }
    }

    pub fn prepare_to_process(&self, sample_rate: f64, max_block_size: usize) -> Result<()> {
        self.exclusive(|core, _| core.prepare_to_process(sample_rate, max_block_size))??;
        self.sample_rate.set(sample_rate);
        Ok(())
    }

    /// Replace the patch.
    ///
    /// Pending events of the old patch are dropped and host buffers move to the new patch's
    /// DataRefs of the same name; buffers the new patch has no DataRef for are released.
    /// On timeout the old patch stays active and `patcher` is dropped.
    pub fn set_patcher(&self, patcher: Box<dyn Patcher>) -> Result<()> {
        let (previous, releases) = self.exclusive(|core, external| {
            let mut previous = core.set_patcher(patcher);
            let releases = external.revalidate(core, previous.as_mut());
            self.parameters.store(Arc::clone(core.parameter_table()));
            self.generation
                .store(core.target().generation(), Ordering::Release);
            (previous, releases)
        })?;

        // Old patch and released buffers are handed back outside the permit
        drop(previous);
        if !releases.is_empty() {
            tracing::debug!("Released {} external buffers after patch swap", releases.len());
        }
        run_all(releases);
        Ok(())
    }

    /// Queue an event for the next dispatch. Never waits for the audio thread.
    pub fn schedule_event(&self, event: Event) {
        self.control.push(event);
    }

    /// Schedule `event` and dispatch everything up to its time right away.
    pub(crate) fn schedule_and_dispatch(&self, event: Event) -> Result<()> {
        self.exclusive(|core, _| {
            let now = core.current_time();
            let until = if event.time() > now { event.time() } else { now };
            core.schedule_event(event);
            core.process_events_until(until);
        })
    }

    /// Dispatch every pending event up to `time` without rendering audio.
    pub fn process_events_until(&self, time: MillisecondTime) -> Result<()> {
        self.exclusive(|core, _| core.process_events_until(time))
    }

    /// Remove the pending callbacks of a clock; with `execute` they run at the current time
    /// instead. Returns the number of events affected.
    pub fn flush_clock_events(
        &self,
        target: Option<EventTarget>,
        clock_id: ClockId,
        execute: bool,
    ) -> Result<usize> {
        self.exclusive(|core, _| core.flush_clock_events(target, clock_id, execute))
    }

    /// Last value the patch reported for a parameter, `0.0` if the index is out of range.
    /// Lock-free.
    pub fn parameter_value(&self, index: ParameterIndex) -> f64 {
        self.control.parameter_value(index)
    }

    /// Snapshot the patch state now.
    pub fn preset_sync(&self) -> Result<Preset> {
        self.exclusive(|core, _| core.get_preset_sync())
    }

    /// Apply a preset now.
    pub fn set_preset_sync(&self, preset: &Preset) -> Result<()> {
        self.exclusive(|core, _| core.set_preset_sync(preset))
    }

    /// Snapshot the patch state with the next dispatch; `callback` runs on the dispatching
    /// thread.
    pub fn get_preset(&self, callback: PresetCallback) {
        self.control
            .push(Event::preset_get(callback, self.current_time()));
    }

    /// Apply a preset with the next dispatch.
    pub fn set_preset(&self, preset: Arc<Preset>, callback: Option<PresetCallback>) {
        self.control
            .push(Event::preset_set(preset, callback, self.current_time()));
    }

    /// Lend `buffer` to the patch's DataRef `name`.
    ///
    /// `release` gets the buffer back when it is replaced, released, no longer used after a
    /// patch swap, or the engine is dropped. If the call fails the buffer is handed back
    /// through `release` right away.
    pub fn set_external_data(
        &self,
        name: &str,
        buffer: Vec<u8>,
        data_type: DataType,
        release: ReleaseCallback,
    ) -> Result<()> {
        let mut supplied = Some((buffer, release));
        let outcome = self.exclusive(|core, external| {
            let (buffer, release) = supplied.take()?;
            Some(external.set(core, name, buffer, data_type, release))
        });

        if let Some((buffer, release)) = supplied {
            release(name.to_string(), buffer);
        }
        match outcome? {
            Some(Ok(previous)) => {
                if let Some(previous) = previous {
                    previous.run();
                }
                Ok(())
            }
            Some(Err((error, unused))) => {
                unused.run();
                Err(error)
            }
            None => Ok(()),
        }
    }

    /// Take a host buffer back from the patch; its release callback runs before this returns.
    pub fn release_external_data(&self, name: &str) -> Result<()> {
        let release = self.exclusive(|core, external| external.release(core, name))??;
        release.run();
        Ok(())
    }

    /// Whether `name` currently holds a host buffer.
    pub fn has_external_data(&self, name: &str) -> bool {
        self.external.lock().contains(name)
    }

    /// Build a parameter interface of the given kind.
    pub fn create_parameter_interface(
        self: &Arc<Self>,
        kind: InterfaceKind,
        handler: Box<dyn EventHandler>,
    ) -> Result<Box<dyn ParameterEventInterface>> {
        Ok(match kind {
            InterfaceKind::Sync => Box::new(SyncInterface::new(self, handler)?),
            InterfaceKind::Trigger => Box::new(TriggerInterface::new(self, handler)?),
            InterfaceKind::Async(mode) => Box::new(AsyncInterface::with_mode(self, mode, handler)?),
        })
    }

    pub(crate) fn next_interface_id(&self) -> InterfaceId {
        InterfaceId::new(self.next_interface_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn register_endpoint(&self, endpoint: Arc<dyn InterfaceEndpoint>) -> Result<()> {
        let limit = self.config.max_interfaces;
        if self.live_interfaces.fetch_add(1, Ordering::AcqRel) >= limit {
            self.live_interfaces.fetch_sub(1, Ordering::AcqRel);
            return Err(crate::Error::TooManyInterfaces(limit));
        }
        let result = self.notify_service(ServiceNotification::Registered(endpoint));
        if result.is_err() {
            self.live_interfaces.fetch_sub(1, Ordering::AcqRel);
        }
        result
    }

    pub(crate) fn deregister_endpoint(&self, id: InterfaceId) {
        self.live_interfaces.fetch_sub(1, Ordering::AcqRel);
        if let Err(e) = self.notify_service(ServiceNotification::Deregistered(id)) {
            tracing::warn!("Could not deregister interface {:?}: {}", id, e);
        }
    }

    /// Queue a registration change; when the queue is full, apply it under the permit.
    fn notify_service(&self, notification: ServiceNotification) -> Result<()> {
        match self.services_tx.try_send(notification) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(notification)) | Err(TrySendError::Disconnected(notification)) => {
                self.exclusive(|core, _| apply_service(core, notification))
            }
        }
    }

    /// Time at the end of the last processed block, in milliseconds.
    pub fn current_time(&self) -> MillisecondTime {
        self.now.get()
    }

    /// `0.0` until prepared.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate.get()
    }

    /// Parameters of the attached patch.
    pub fn parameter_table(&self) -> Arc<ParameterTable> {
        self.parameters.load_full()
    }

    /// Target of the attached patch, for addressing its clocks.
    pub fn target(&self) -> EventTarget {
        EventTarget::root(self.generation.load(Ordering::Acquire))
    }

    pub fn is_swap_pending(&self) -> bool {
        self.gate.is_pending()
    }

    pub fn num_interfaces(&self) -> usize {
        self.live_interfaces.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let core = self.core.get_mut();
        let releases = self.external.get_mut().release_all(core);
        run_all(releases);
    }
}

fn apply_service(core: &mut EngineCore, notification: ServiceNotification) {
    match notification {
        ServiceNotification::Registered(endpoint) => core.register_endpoint(endpoint),
        ServiceNotification::Deregistered(id) => {
            core.deregister_endpoint(id);
        }
    }
}
