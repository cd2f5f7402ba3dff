//! Power-domain gating.
//!
//! ```text
//! PoweredOff --lock--> PoweredOn --unlock--> PoweredOn(idle armed) --deadline--> PoweredOff
//!                          ^                        |
//!                          +---------- lock --------+
//! ```

use std::time::Instant;

use tilegpu_hw::ops;

use crate::arbiter::{Holder, Shared};
use crate::error::ArbiterError;

/// Ungate the device and reset it. The caller holds the exclusive lock.
pub(crate) fn power_up(shared: &Shared) -> Result<(), ArbiterError> {
    if let Err(err) = shared.power.power_on() {
        tracing::error!(%err, "GPU power-up failed");
        return Err(err.into());
    }
    ops::soft_reset(shared.regs.as_ref());

    let mut state = shared.state();
    state.power.powered_on = true;
    // Register state did not survive the power cycle.
    state.owner = None;
    drop(state);

    shared.stats.inc_power_ups();
    tracing::info!("GPU powered up");
    Ok(())
}

pub(crate) fn expire_idle(shared: &Shared, now: Instant) -> bool {
    let mut state = shared.state();
    if state.holder.is_some() {
        return false;
    }
    match state.power.idle_deadline {
        Some(deadline) if deadline <= now => {}
        _ => return false,
    }
    state.power.idle_deadline = None;
    if !state.power.powered_on {
        return false;
    }
    state.holder = Some(Holder::IdleTimer);
    drop(state);

    shared.drain();
    shared.power.power_off();

    let mut state = shared.state();
    state.power.powered_on = false;
    state.owner = None;
    state.holder = None;
    drop(state);
    shared.lock_free.notify_all();

    shared.stats.inc_power_downs();
    tracing::info!("GPU idle; powered down");
    true
}

/// Body of the idle timer thread. Exits when the arbiter shuts down.
pub(crate) fn run_idle_timer(shared: &Shared) {
    let mut state = shared.state();
    loop {
        if state.shutdown {
            return;
        }
        match state.power.idle_deadline {
            None => state = shared.wait(&shared.timer, state),
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    drop(state);
                    expire_idle(shared, now);
                    state = shared.state();
                    if state.power.idle_deadline == Some(deadline) {
                        // Someone else is mid-transition; wait for them to move the deadline.
                        state = shared.wait(&shared.timer, state);
                    }
                } else {
                    state = shared
                        .timer
                        .wait_timeout(state, deadline - now)
                        .map(|(guard, _)| guard)
                        .unwrap_or_else(|poisoned| poisoned.into_inner().0);
                }
            }
        }
    }
}
