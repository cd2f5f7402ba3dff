use std::time::Duration;

use thiserror::Error;
use tilegpu_hw::{PipelineStages, PowerError};

use crate::arbiter::ContextId;

/// How a caller should react to an [`ArbiterError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The operation cannot make progress; surface it without retrying.
    Fatal,
    /// The hardware was reset to idle; the service remains usable but in-flight work is lost.
    Recoverable,
    /// The caller broke the protocol.
    ProgrammingError,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArbiterError {
    #[error("failed to power up the GPU: {0}")]
    PowerUp(#[from] PowerError),

    #[error("failed to start idle timer: {0}")]
    TimerSpawn(String),

    #[error("pipeline flush did not reach idle within {timeout:?} (mask={mask:?})")]
    FlushTimeout {
        timeout: Duration,
        mask: PipelineStages,
    },

    #[error("{0} does not hold the GPU lock")]
    NotOwner(ContextId),

    #[error("{0} already holds the GPU lock")]
    AlreadyHeld(ContextId),

    #[error("unknown {0}")]
    UnknownContext(ContextId),

    #[error("invalid control opcode 0x{0:x}")]
    InvalidOpcode(u32),

    #[error("invalid pipeline stage mask 0x{0:08x}")]
    InvalidMask(u32),

    #[error("register mapping rejected: {0}")]
    InvalidMapping(&'static str),

    #[error("{0} already has the register window mapped")]
    AlreadyMapped(ContextId),
}

impl ArbiterError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::PowerUp(_) | Self::TimerSpawn(_) => ErrorClass::Fatal,
            Self::FlushTimeout { .. } => ErrorClass::Recoverable,
            Self::NotOwner(_)
            | Self::AlreadyHeld(_)
            | Self::UnknownContext(_)
            | Self::InvalidOpcode(_)
            | Self::InvalidMask(_)
            | Self::InvalidMapping(_)
            | Self::AlreadyMapped(_) => ErrorClass::ProgrammingError,
        }
    }
}
