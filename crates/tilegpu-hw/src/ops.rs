//! Register sequences shared by the arbiter and its clients.

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::mmio;
use crate::regs::{CacheOps, PipelineStages};
use crate::window::RegisterWindow;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HwError {
    #[error("cache maintenance did not complete within {timeout:?} (pending=0x{pending:08x})")]
    CacheFlushTimeout { timeout: Duration, pending: u32 },
}

/// Pulse the soft reset line. The pipeline is idle afterwards and queued work is gone.
pub fn soft_reset(regs: &dyn RegisterWindow) {
    regs.write_u32(mmio::SW_RESET, mmio::reset_bits::ASSERT);
    regs.write_u32(mmio::SW_RESET, mmio::reset_bits::DEASSERT);
}

/// Whether every stage in `mask` currently reports idle.
pub fn pipeline_idle(regs: &dyn RegisterWindow, mask: PipelineStages) -> bool {
    regs.read_u32(mmio::PIPE_STATUS) & mask.bits() == 0
}

/// Flush and invalidate every cache, polling `CACHE_CTL` until the request bits self-clear.
///
/// The wait is bounded by wall-clock `timeout`; on expiry the caller decides whether to reset.
pub fn flush_caches(regs: &dyn RegisterWindow, timeout: Duration) -> Result<(), HwError> {
    let ops = CacheOps::FLUSH_AND_INVALIDATE_ALL.bits();
    regs.write_u32(mmio::CACHE_CTL, ops);

    let deadline = Instant::now() + timeout;
    loop {
        let pending = regs.read_u32(mmio::CACHE_CTL) & ops;
        if pending == 0 {
            return Ok(());
        }
        if Instant::now() >= deadline {
            tracing::warn!(pending, ?timeout, "cache flush timed out");
            return Err(HwError::CacheFlushTimeout { timeout, pending });
        }
        std::thread::yield_now();
    }
}
