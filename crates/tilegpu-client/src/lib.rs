//! Per-process client side of the tile GPU driver.
//!
//! A [`DeviceContext`] keeps a shadow of every register the client programs, takes the GPU from
//! the arbiter for each draw and replays its state whenever another context owned the device in
//! between. Vertex data reaches the GPU either through the host FIFO or through the
//! double-buffered vertex buffer.
#![forbid(unsafe_code)]

mod compat;
mod config;
mod context;
mod error;
mod shader;
mod shadow;
mod vertex;

pub use compat::{Matrix4, MatrixKind, IDENTITY};
pub use config::{ClientConfig, FifoWaitPolicy};
pub use context::{ClientStats, DeviceContext};
pub use error::{ClientError, ShaderError, VertexError};
pub use shader::{ShaderBinary, ShaderStage};
pub use shadow::{
    FragmentState, GlobalState, HostState, PrimitiveState, RasterState, ShadowState,
};
pub use vertex::{Indices, StridedView, VertexAttribute};
