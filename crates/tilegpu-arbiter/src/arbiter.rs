use std::collections::HashMap;
use std::fmt;
use std::sync::mpsc::sync_channel;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

use serde::Serialize;
use tilegpu_hw::{mmio, ops, PipelineStages, PowerDomain, RegisterWindow};

use crate::config::ArbiterConfig;
use crate::error::ArbiterError;
use crate::irq::{FlushWaiter, IrqHandler, WaiterSlot};
use crate::stats::{ArbiterStats, ArbiterStatsSnapshot};

/// Identifies one client context registered with the arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ContextId(u32);

impl ContextId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context #{}", self.0)
    }
}

/// Result of a successful [`GpuArbiter::lock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// The caller owned the hardware last; its register state is still live.
    Acquired,
    /// Ownership changed (or the device was power-cycled). The pipeline and caches were flushed
    /// and the caller must replay its register state before drawing.
    RestoreNeeded,
}

impl LockOutcome {
    pub fn restore_needed(self) -> bool {
        self == Self::RestoreNeeded
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerState {
    pub powered_on: bool,
    /// Set while the device is powered, unlocked, and waiting to be gated.
    pub idle_deadline: Option<Instant>,
}

/// Attributes requested for a register window mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapRequest {
    pub shared: bool,
    pub cached: bool,
    pub write_buffered: bool,
}

impl MapRequest {
    /// The only mapping the arbiter grants.
    pub const DEVICE: Self = Self {
        shared: true,
        cached: false,
        write_buffered: false,
    };
}

/// A context's view of the register window.
///
/// Register access through a mapping is not checked against lock ownership; callers must hold
/// the lock for anything beyond reads of status registers.
#[derive(Clone)]
pub struct RegisterMapping {
    ctx: ContextId,
    regs: Arc<dyn RegisterWindow>,
}

impl RegisterMapping {
    pub fn context(&self) -> ContextId {
        self.ctx
    }
}

impl fmt::Debug for RegisterMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterMapping")
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

impl RegisterWindow for RegisterMapping {
    fn read_u32(&self, offset: u32) -> u32 {
        self.regs.read_u32(offset)
    }

    fn write_u32(&self, offset: u32, value: u32) {
        self.regs.write_u32(offset, value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Holder {
    Client(ContextId),
    /// The idle timer powering the device down.
    IdleTimer,
}

#[derive(Debug, Default)]
struct ContextEntry {
    mapped: bool,
}

pub(crate) struct LockState {
    pub(crate) holder: Option<Holder>,
    /// Owner whose register state the hardware currently carries.
    pub(crate) owner: Option<ContextId>,
    pub(crate) power: PowerState,
    contexts: HashMap<ContextId, ContextEntry>,
    next_context: u32,
    pub(crate) shutdown: bool,
}

pub(crate) struct Shared {
    pub(crate) regs: Arc<dyn RegisterWindow>,
    pub(crate) power: Arc<dyn PowerDomain>,
    pub(crate) config: ArbiterConfig,
    state: Mutex<LockState>,
    /// Signalled whenever the lock is released.
    pub(crate) lock_free: Condvar,
    /// Signalled whenever the idle deadline changes or the service shuts down.
    pub(crate) timer: Condvar,
    pub(crate) waiter: Arc<WaiterSlot>,
    pub(crate) stats: ArbiterStats,
}

impl Shared {
    pub(crate) fn state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn wait<'a>(
        &self,
        cv: &Condvar,
        guard: MutexGuard<'a, LockState>,
    ) -> MutexGuard<'a, LockState> {
        cv.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until every stage in `mask` is idle, using the pipeline interrupt.
    ///
    /// The caller must hold the exclusive lock. On timeout the hardware is soft-reset.
    pub(crate) fn flush_pipeline(&self, mask: PipelineStages) -> Result<(), ArbiterError> {
        let regs = self.regs.as_ref();
        if ops::pipeline_idle(regs, mask) {
            self.stats.inc_fast_flushes();
            return Ok(());
        }

        let (done, signalled) = sync_channel(1);
        self.waiter.arm(FlushWaiter { mask, done });
        regs.write_u32(mmio::PIPE_MASK, mask.bits());
        regs.write_u32(mmio::PIPE_TARGET_STATE, 0);

        // The pipeline may have drained between the first check and arming.
        if ops::pipeline_idle(regs, mask) && self.waiter.disarm() {
            self.stats.inc_fast_flushes();
            return Ok(());
        }

        regs.write_u32(mmio::INT_MASK, mmio::int_bits::PIPELINE);

        let timeout = self.config.flush_timeout();
        if signalled.recv_timeout(timeout).is_ok() {
            self.stats.inc_slow_flushes();
            return Ok(());
        }
        if !self.waiter.disarm() && signalled.try_recv().is_ok() {
            // The handler completed the waiter just as the wait expired.
            self.stats.inc_slow_flushes();
            return Ok(());
        }

        regs.write_u32(mmio::INT_MASK, 0);
        ops::soft_reset(regs);
        self.stats.inc_flush_timeouts();
        tracing::warn!(?mask, ?timeout, "pipeline flush timed out; GPU soft-reset");
        Err(ArbiterError::FlushTimeout { timeout, mask })
    }

    /// Flush the whole pipeline and all caches, tolerating timeouts.
    ///
    /// Used where the hardware must be clean but the caller cannot act on a failure (ownership
    /// handover, power-down). A timed-out flush has already reset the pipeline to idle.
    pub(crate) fn drain(&self) {
        if let Err(err) = self.flush_pipeline(PipelineStages::ALL) {
            tracing::warn!(%err, "continuing after pipeline flush failure");
        }
        if let Err(err) = ops::flush_caches(self.regs.as_ref(), self.config.cache_flush_timeout()) {
            self.stats.inc_cache_flush_timeouts();
            tracing::warn!(%err, "cache flush failed; resetting GPU");
            ops::soft_reset(self.regs.as_ref());
        }
    }

    pub(crate) fn release_lock(&self, mut state: MutexGuard<'_, LockState>) {
        state.holder = None;
        if self.config.power_gating && state.power.powered_on {
            state.power.idle_deadline = Some(Instant::now() + self.config.idle_timeout());
            self.timer.notify_all();
        }
        drop(state);
        self.lock_free.notify_all();
    }
}

/// The hardware arbitration service.
///
/// One instance exists per device. It owns the register window and the power domain, hands out
/// exclusive access to one context at a time, and reports when the new holder must restore its
/// register state.
pub struct GpuArbiter {
    shared: Arc<Shared>,
    irq: Arc<IrqHandler>,
    timer: Option<JoinHandle<()>>,
}

impl fmt::Debug for GpuArbiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuArbiter")
            .field("config", &self.shared.config)
            .field("power", &self.power_state())
            .finish_non_exhaustive()
    }
}

impl GpuArbiter {
    /// Open the device.
    ///
    /// Without power gating the device is powered and reset here and stays on until the
    /// arbiter is dropped. With power gating it starts off and the first `lock` powers it up.
    pub fn open(
        regs: Arc<dyn RegisterWindow>,
        power: Arc<dyn PowerDomain>,
        config: ArbiterConfig,
    ) -> Result<Arc<Self>, ArbiterError> {
        let waiter = Arc::new(WaiterSlot::default());
        let irq = Arc::new(IrqHandler::new(&regs, waiter.clone()));

        let mut powered_on = false;
        if !config.power_gating {
            power.power_on()?;
            ops::soft_reset(regs.as_ref());
            powered_on = true;
        }

        let shared = Arc::new(Shared {
            regs,
            power,
            config,
            state: Mutex::new(LockState {
                holder: None,
                owner: None,
                power: PowerState {
                    powered_on,
                    idle_deadline: None,
                },
                contexts: HashMap::new(),
                next_context: 1,
                shutdown: false,
            }),
            lock_free: Condvar::new(),
            timer: Condvar::new(),
            waiter,
            stats: ArbiterStats::default(),
        });
        if powered_on {
            shared.stats.inc_power_ups();
        }

        let timer = if config.power_gating {
            let shared = shared.clone();
            Some(
                std::thread::Builder::new()
                    .name("tilegpu-idle".into())
                    .spawn(move || crate::power::run_idle_timer(&shared))
                    .map_err(|err| ArbiterError::TimerSpawn(err.to_string()))?,
            )
        } else {
            None
        };

        tracing::info!(power_gating = config.power_gating, "GPU arbiter opened");
        Ok(Arc::new(Self { shared, irq, timer }))
    }

    /// The handler to connect to the device interrupt line.
    pub fn irq_handler(&self) -> Arc<IrqHandler> {
        self.irq.clone()
    }

    pub fn config(&self) -> &ArbiterConfig {
        &self.shared.config
    }

    pub fn open_context(&self) -> ContextId {
        let mut state = self.shared.state();
        let ctx = ContextId(state.next_context);
        state.next_context += 1;
        state.contexts.insert(ctx, ContextEntry::default());
        tracing::debug!(%ctx, "context opened");
        ctx
    }

    /// Map the register window for `ctx`. Each context may hold one mapping.
    pub fn map_registers(
        &self,
        ctx: ContextId,
        request: MapRequest,
    ) -> Result<RegisterMapping, ArbiterError> {
        if !request.shared {
            return Err(ArbiterError::InvalidMapping("register mappings must be shared"));
        }
        if request.cached || request.write_buffered {
            return Err(ArbiterError::InvalidMapping(
                "register mappings must be uncached and unbuffered",
            ));
        }

        let mut state = self.shared.state();
        let entry = state
            .contexts
            .get_mut(&ctx)
            .ok_or(ArbiterError::UnknownContext(ctx))?;
        if entry.mapped {
            return Err(ArbiterError::AlreadyMapped(ctx));
        }
        entry.mapped = true;
        Ok(RegisterMapping {
            ctx,
            regs: self.shared.regs.clone(),
        })
    }

    /// Block until the exclusive lock is free and take it.
    ///
    /// On a power-up failure the lock is still held and the caller must `unlock`.
    pub fn lock(&self, ctx: ContextId) -> Result<LockOutcome, ArbiterError> {
        let shared = &self.shared;
        let mut state = shared.state();
        if !state.contexts.contains_key(&ctx) {
            return Err(ArbiterError::UnknownContext(ctx));
        }
        if state.holder == Some(Holder::Client(ctx)) {
            return Err(ArbiterError::AlreadyHeld(ctx));
        }
        while state.holder.is_some() {
            state = shared.wait(&shared.lock_free, state);
            if !state.contexts.contains_key(&ctx) {
                return Err(ArbiterError::UnknownContext(ctx));
            }
        }

        state.holder = Some(Holder::Client(ctx));
        if state.power.idle_deadline.take().is_some() {
            shared.timer.notify_all();
        }
        let needs_power = shared.config.power_gating && !state.power.powered_on;
        let previous = state.owner;
        drop(state);
        shared.stats.inc_locks();

        if needs_power {
            crate::power::power_up(shared)?;
        }

        if previous == Some(ctx) {
            return Ok(LockOutcome::Acquired);
        }

        shared.drain();
        shared.state().owner = Some(ctx);
        shared.stats.inc_handovers();
        tracing::debug!(%ctx, ?previous, "GPU ownership handed over");
        Ok(LockOutcome::RestoreNeeded)
    }

    /// Release the lock. A non-owner's call is rejected and changes nothing.
    pub fn unlock(&self, ctx: ContextId) -> Result<(), ArbiterError> {
        let state = self.shared.state();
        if state.holder != Some(Holder::Client(ctx)) {
            return Err(ArbiterError::NotOwner(ctx));
        }
        self.shared.release_lock(state);
        Ok(())
    }

    /// Wait until every stage in `mask` is idle. Only the lock holder may flush.
    pub fn flush(&self, ctx: ContextId, mask: PipelineStages) -> Result<(), ArbiterError> {
        {
            let state = self.shared.state();
            if !state.contexts.contains_key(&ctx) {
                return Err(ArbiterError::UnknownContext(ctx));
            }
            if state.holder != Some(Holder::Client(ctx)) {
                return Err(ArbiterError::NotOwner(ctx));
            }
        }
        self.shared.flush_pipeline(mask)
    }

    /// Tear down `ctx`, forcing an unlock if it still holds the lock.
    pub fn release(&self, ctx: ContextId) {
        let mut state = self.shared.state();
        if state.contexts.remove(&ctx).is_none() {
            tracing::warn!(%ctx, "release of unknown context ignored");
            return;
        }
        if state.holder == Some(Holder::Client(ctx)) {
            tracing::warn!(%ctx, "context released while holding the GPU lock; forcing unlock");
            self.shared.release_lock(state);
        } else {
            drop(state);
            // Wake waiters so a lock attempt for the released context can fail.
            self.shared.lock_free.notify_all();
        }
        tracing::debug!(%ctx, "context released");
    }

    /// Power the device down if the idle deadline has passed at `now`.
    ///
    /// Returns whether the device was powered down. Does nothing while a client holds the lock
    /// or when no deadline is armed.
    pub fn expire_idle(&self, now: Instant) -> bool {
        crate::power::expire_idle(&self.shared, now)
    }

    pub fn power_state(&self) -> PowerState {
        self.shared.state().power
    }

    /// Context whose register state the hardware currently carries.
    pub fn current_owner(&self) -> Option<ContextId> {
        self.shared.state().owner
    }

    /// Context currently holding the lock.
    pub fn holder(&self) -> Option<ContextId> {
        match self.shared.state().holder {
            Some(Holder::Client(ctx)) => Some(ctx),
            _ => None,
        }
    }

    pub fn stats(&self) -> ArbiterStatsSnapshot {
        self.shared.stats.snapshot()
    }
}

impl Drop for GpuArbiter {
    fn drop(&mut self) {
        self.shared.state().shutdown = true;
        self.shared.timer.notify_all();
        if let Some(timer) = self.timer.take() {
            if timer.join().is_err() {
                tracing::warn!("idle timer thread panicked");
            }
        }
        tracing::info!("GPU arbiter closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tilegpu_hw::sim::{RetirePolicy, SimEvent, SimGpu};

    fn open(config: ArbiterConfig) -> (Arc<SimGpu>, Arc<GpuArbiter>) {
        let sim = Arc::new(SimGpu::new());
        let arbiter = GpuArbiter::open(sim.clone(), sim.clone(), config).unwrap();
        sim.connect_irq(arbiter.irq_handler());
        (sim, arbiter)
    }

    fn ungated() -> ArbiterConfig {
        ArbiterConfig {
            power_gating: false,
            flush_timeout_ms: 20,
            ..ArbiterConfig::default()
        }
    }

    #[test]
    fn restore_needed_only_on_ownership_change() {
        let (_sim, arbiter) = open(ungated());
        let a = arbiter.open_context();
        let b = arbiter.open_context();

        assert_eq!(arbiter.lock(a).unwrap(), LockOutcome::RestoreNeeded);
        arbiter.unlock(a).unwrap();
        assert_eq!(arbiter.lock(a).unwrap(), LockOutcome::Acquired);
        arbiter.unlock(a).unwrap();

        assert_eq!(arbiter.lock(b).unwrap(), LockOutcome::RestoreNeeded);
        arbiter.unlock(b).unwrap();
        assert_eq!(arbiter.lock(a).unwrap(), LockOutcome::RestoreNeeded);
        assert_eq!(arbiter.current_owner(), Some(a));
        arbiter.unlock(a).unwrap();

        assert_eq!(arbiter.stats().handovers, 3);
    }

    #[test]
    fn unlock_by_non_owner_is_rejected() {
        let (_sim, arbiter) = open(ungated());
        let a = arbiter.open_context();
        let b = arbiter.open_context();
        arbiter.lock(a).unwrap();

        assert_eq!(arbiter.unlock(b), Err(ArbiterError::NotOwner(b)));
        assert_eq!(arbiter.holder(), Some(a));
        assert_eq!(
            arbiter.flush(b, PipelineStages::ALL),
            Err(ArbiterError::NotOwner(b))
        );
        assert_eq!(arbiter.lock(a), Err(ArbiterError::AlreadyHeld(a)));
    }

    #[test]
    fn idle_flush_touches_no_registers() {
        let (sim, arbiter) = open(ungated());
        let a = arbiter.open_context();
        arbiter.lock(a).unwrap();

        sim.enable_trace(true);
        arbiter.flush(a, PipelineStages::ALL).unwrap();
        let trace = sim.take_trace();
        assert!(!trace.is_empty());
        assert!(
            trace.iter().all(|e| matches!(e, SimEvent::Read { .. })),
            "{trace:?}"
        );
    }

    #[test]
    fn busy_flush_waits_for_the_interrupt() {
        let (sim, arbiter) = open(ArbiterConfig {
            flush_timeout_ms: 5_000,
            ..ungated()
        });
        sim.set_retire_policy(RetirePolicy::Deferred);
        let a = arbiter.open_context();
        arbiter.lock(a).unwrap();

        sim.set_busy(PipelineStages::VERTEX_BUFFER);
        let waker = {
            let sim = sim.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(2));
                sim.retire_all();
            })
        };
        let result = arbiter.flush(a, PipelineStages::VERTEX_BUFFER);
        waker.join().unwrap();

        // Whether the retire lands before or after arming, no reset may be issued.
        assert_eq!(result, Ok(()));
        assert_eq!(sim.reset_count(), 1);
        assert_eq!(sim.peek(mmio::INT_MASK), 0);
    }

    #[test]
    fn flush_timeout_resets_and_keeps_the_lock() {
        let (sim, arbiter) = open(ungated());
        sim.set_retire_policy(RetirePolicy::Stalled);
        let a = arbiter.open_context();
        arbiter.lock(a).unwrap();
        let resets = sim.reset_count();

        sim.set_busy(PipelineStages::RASTERIZER);
        let err = arbiter.flush(a, PipelineStages::ALL).unwrap_err();
        assert!(matches!(err, ArbiterError::FlushTimeout { .. }));
        assert_eq!(err.class(), crate::ErrorClass::Recoverable);
        assert_eq!(sim.reset_count(), resets + 1);
        assert_eq!(sim.peek(mmio::PIPE_STATUS), 0);

        assert_eq!(arbiter.holder(), Some(a));
        arbiter.unlock(a).unwrap();
        assert_eq!(arbiter.stats().flush_timeouts, 1);
    }

    #[test]
    fn release_forces_unlock_for_waiters() {
        let (_sim, arbiter) = open(ungated());
        let a = arbiter.open_context();
        let b = arbiter.open_context();
        arbiter.lock(a).unwrap();

        let waiter = {
            let arbiter = arbiter.clone();
            std::thread::spawn(move || arbiter.lock(b))
        };
        std::thread::sleep(Duration::from_millis(5));
        arbiter.release(a);

        assert_eq!(waiter.join().unwrap(), Ok(LockOutcome::RestoreNeeded));
        assert_eq!(arbiter.holder(), Some(b));
        assert_eq!(arbiter.lock(a), Err(ArbiterError::UnknownContext(a)));
    }

    #[test]
    fn mapping_must_be_shared_and_uncached() {
        let (_sim, arbiter) = open(ungated());
        let a = arbiter.open_context();

        let cached = MapRequest {
            cached: true,
            ..MapRequest::DEVICE
        };
        let private = MapRequest {
            shared: false,
            ..MapRequest::DEVICE
        };
        assert!(matches!(
            arbiter.map_registers(a, cached),
            Err(ArbiterError::InvalidMapping(_))
        ));
        assert!(matches!(
            arbiter.map_registers(a, private),
            Err(ArbiterError::InvalidMapping(_))
        ));

        let mapping = arbiter.map_registers(a, MapRequest::DEVICE).unwrap();
        assert_eq!(mapping.context(), a);
        assert_eq!(mapping.read_u32(mmio::VERSION), tilegpu_hw::sim::SIM_VERSION);
        assert_eq!(
            arbiter.map_registers(a, MapRequest::DEVICE).unwrap_err(),
            ArbiterError::AlreadyMapped(a)
        );
    }
}
