//! Exclusive, ownership-tracked access to the tile GPU.
//!
//! [`GpuArbiter`] serializes clients onto the single GPU: `lock` blocks until the device is
//! free, powers it up when it was gated, and tells the new holder whether its register state
//! survived. `flush` waits for pipeline stages to drain using the pipeline interrupt and resets
//! the GPU when they do not. After `unlock` an idle timer gates the power domain.
#![forbid(unsafe_code)]

mod arbiter;
mod config;
mod control;
mod error;
mod irq;
mod power;
mod stats;

pub use arbiter::{
    ContextId, GpuArbiter, LockOutcome, MapRequest, PowerState, RegisterMapping,
};
pub use config::ArbiterConfig;
pub use control::{opcode, ControlOp, ControlReply};
pub use error::{ArbiterError, ErrorClass};
pub use irq::IrqHandler;
pub use stats::{ArbiterStats, ArbiterStatsSnapshot};
