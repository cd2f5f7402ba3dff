//! Register-level description of the tile GPU block.
//!
//! This crate owns everything that is a fact about the hardware rather than a policy: the
//! register map ([`mmio`]), typed register values ([`regs`]), the traits that abstract register
//! access, power gating and the interrupt line, a few shared register sequences ([`ops`]) and a
//! software model of the block ([`sim`]) used by the tests of every crate above it.
#![forbid(unsafe_code)]

mod macros;
pub mod mmio;
pub mod ops;
pub mod regs;
pub mod sim;
mod window;

pub use macros::{field_mask, FieldValue};
pub use ops::HwError;
pub use regs::{CacheOps, DataType, PipelineStages, PrimitiveType};
pub use window::{IrqSink, PowerDomain, PowerError, RegisterWindow};
