//! Driver stack for the tile GPU.
//!
//! * [`hw`]: register map, register value types, the hardware traits and a software device
//!   model for tests.
//! * [`arbiter`]: exclusive, power-managed access to the single GPU.
//! * [`client`]: per-process device contexts, state shadowing and vertex streaming.
#![forbid(unsafe_code)]

pub use tilegpu_arbiter as arbiter;
pub use tilegpu_client as client;
pub use tilegpu_hw as hw;
