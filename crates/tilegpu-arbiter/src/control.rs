//! Numeric control surface.
//!
//! Clients that talk to the arbiter through a raw command channel send one of three opcodes.
//! [`ControlOp::decode`] validates them and [`GpuArbiter::control`] dispatches.

use tilegpu_hw::PipelineStages;

use crate::arbiter::{ContextId, GpuArbiter};
use crate::error::ArbiterError;

pub mod opcode {
    pub const LOCK: u32 = 0x4701;
    pub const UNLOCK: u32 = 0x4702;
    /// Argument: pipeline stage mask.
    pub const FLUSH: u32 = 0x4703;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOp {
    Lock,
    Unlock,
    Flush(PipelineStages),
}

impl ControlOp {
    pub fn decode(cmd: u32, arg: u32) -> Result<Self, ArbiterError> {
        match cmd {
            opcode::LOCK => Ok(Self::Lock),
            opcode::UNLOCK => Ok(Self::Unlock),
            opcode::FLUSH => PipelineStages::from_bits(arg)
                .map(Self::Flush)
                .ok_or(ArbiterError::InvalidMask(arg)),
            _ => Err(ArbiterError::InvalidOpcode(cmd)),
        }
    }

    pub fn encode(self) -> (u32, u32) {
        match self {
            Self::Lock => (opcode::LOCK, 0),
            Self::Unlock => (opcode::UNLOCK, 0),
            Self::Flush(mask) => (opcode::FLUSH, mask.bits()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlReply {
    Locked { restore_needed: bool },
    Done,
}

impl GpuArbiter {
    pub fn control(&self, ctx: ContextId, op: ControlOp) -> Result<ControlReply, ArbiterError> {
        match op {
            ControlOp::Lock => self.lock(ctx).map(|outcome| ControlReply::Locked {
                restore_needed: outcome.restore_needed(),
            }),
            ControlOp::Unlock => self.unlock(ctx).map(|()| ControlReply::Done),
            ControlOp::Flush(mask) => self.flush(ctx, mask).map(|()| ControlReply::Done),
        }
    }
}
