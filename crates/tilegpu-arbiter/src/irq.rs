//! Pipeline interrupt handling.
//!
//! A blocked flush and the interrupt handler meet only in [`WaiterSlot`]: the flush installs a
//! one-shot waiter before arming the interrupt, and the handler completes it once the watched
//! stages report idle. The handler never touches the exclusive lock, which the flushing thread
//! holds for the whole wait.

use std::sync::mpsc::SyncSender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tilegpu_hw::{mmio, ops, IrqSink, PipelineStages, RegisterWindow};

pub(crate) struct FlushWaiter {
    pub(crate) mask: PipelineStages,
    pub(crate) done: SyncSender<()>,
}

#[derive(Default)]
pub(crate) struct WaiterSlot {
    waiter: Mutex<Option<FlushWaiter>>,
}

impl WaiterSlot {
    fn lock(&self) -> MutexGuard<'_, Option<FlushWaiter>> {
        self.waiter.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn arm(&self, waiter: FlushWaiter) {
        *self.lock() = Some(waiter);
    }

    /// Remove the waiter. Returns `false` if the handler already completed it.
    pub(crate) fn disarm(&self) -> bool {
        self.lock().take().is_some()
    }
}

/// Interrupt handler for the GPU interrupt line.
///
/// Connect it to the device with the platform's interrupt plumbing (for the software model,
/// `SimGpu::connect_irq`).
pub struct IrqHandler {
    regs: Weak<dyn RegisterWindow>,
    slot: Arc<WaiterSlot>,
}

impl IrqHandler {
    pub(crate) fn new(regs: &Arc<dyn RegisterWindow>, slot: Arc<WaiterSlot>) -> Self {
        // The device usually owns its handler, so a strong reference would leak both.
        Self {
            regs: Arc::downgrade(regs),
            slot,
        }
    }
}

impl IrqSink for IrqHandler {
    fn raise(&self) {
        let Some(regs) = self.regs.upgrade() else {
            return;
        };

        let pending = regs.read_u32(mmio::INT_PENDING);
        if pending == 0 {
            return;
        }
        regs.write_u32(mmio::INT_PENDING, pending);
        if pending & mmio::int_bits::PIPELINE == 0 {
            return;
        }

        let mut slot = self.slot.lock();
        let Some(waiter) = slot.as_ref() else {
            regs.write_u32(mmio::INT_MASK, 0);
            return;
        };
        // The pending bit may be stale from an earlier arming; only the live status counts.
        if !ops::pipeline_idle(regs.as_ref(), waiter.mask) {
            return;
        }
        regs.write_u32(mmio::INT_MASK, 0);
        if let Some(waiter) = slot.take() {
            let _ = waiter.done.try_send(());
        }
    }
}
