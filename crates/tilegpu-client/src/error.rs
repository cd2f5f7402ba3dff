use thiserror::Error;
use tilegpu_arbiter::{ArbiterError, ErrorClass};
use tilegpu_hw::HwError;

use crate::shader::ShaderStage;

/// A draw call's arguments violate a precondition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VertexError {
    #[error("draw has no attributes")]
    NoAttributes,

    #[error("{0} attributes exceed the 8 hardware slots")]
    TooManyAttributes(usize),

    #[error("vertex count must be non-zero")]
    EmptyDraw,

    #[error("attribute {slot}: component count {components} is outside 1..=4")]
    InvalidComponents { slot: usize, components: u32 },

    #[error("attribute {slot}: stride {stride} exceeds the 255-byte limit")]
    StrideTooLarge { slot: usize, stride: usize },

    #[error("attribute {slot}: vertex {index} lies outside the {len}-byte source")]
    OutOfBounds { slot: usize, index: u32, len: usize },

    #[error("vertex range {first}+{count} overflows")]
    RangeOverflow { first: u32, count: u32 },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShaderError {
    #[error("invalid shader binary: {0}")]
    InvalidBinary(&'static str),

    #[error("{stage:?} program needs {needed} {what}, the unit has {available}")]
    TooLarge {
        stage: ShaderStage,
        what: &'static str,
        needed: usize,
        available: usize,
    },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error(transparent)]
    Arbiter(#[from] ArbiterError),

    #[error(transparent)]
    Hw(#[from] HwError),

    #[error(transparent)]
    Vertex(#[from] VertexError),

    #[error(transparent)]
    Shader(#[from] ShaderError),

    #[error("register 0x{0:05x} is not part of the shadowed state")]
    UnknownRegister(u32),

    #[error("this context does not hold the GPU")]
    NotHeld,

    #[error("the fixed-function compatibility layer is not enabled for this context")]
    FixedFunctionDisabled,
}

impl ClientError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Arbiter(err) => err.class(),
            Self::Hw(_) => ErrorClass::Recoverable,
            Self::Shader(ShaderError::InvalidBinary(_)) => ErrorClass::Fatal,
            Self::Shader(ShaderError::TooLarge { .. })
            | Self::Vertex(_)
            | Self::UnknownRegister(_)
            | Self::NotHeld
            | Self::FixedFunctionDisabled => ErrorClass::ProgrammingError,
        }
    }
}
