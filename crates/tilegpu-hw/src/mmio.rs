//! Register window layout.
//!
//! All registers are 32 bits wide and byte-addressed relative to the start of the window.
//! Floating-point registers share the address of their bit-pattern integer form.

/// Size of the register window in bytes.
pub const WINDOW_SIZE_BYTES: u32 = 0x8_0000;

// ---------------------------------------------------------------------
// Global block
// ---------------------------------------------------------------------

/// Read-only pipeline status; a set bit means the stage is busy (see `PipelineStages`).
pub const PIPE_STATUS: u32 = 0x0000;
/// Cache flush/invalidate request. Bits self-clear when the operation completes.
pub const CACHE_CTL: u32 = 0x0004;
/// Soft reset. Writing 1 then 0 resets the pipeline to idle and drops queued work.
pub const SW_RESET: u32 = 0x0008;
pub const VERSION: u32 = 0x0010;
/// Global control (clock ratio / endianness knobs); part of the shadowed state.
pub const GLOBAL_CTL: u32 = 0x0014;
/// Interrupt pending status. Write-1-to-clear.
pub const INT_PENDING: u32 = 0x0040;
pub const INT_MASK: u32 = 0x0044;
/// Pipeline stages the pipeline interrupt watches.
pub const PIPE_MASK: u32 = 0x0048;
/// Target state for the watched stages (0 = idle).
pub const PIPE_TARGET_STATE: u32 = 0x004c;
pub const PIPE_INT_STATE: u32 = 0x0050;

pub const GLOBAL_BASE: u32 = 0x0000;
pub const GLOBAL_END: u32 = 0x0100;

// ---------------------------------------------------------------------
// Host interface
// ---------------------------------------------------------------------

/// Read-only count of free FIFO entries.
pub const FIFO_SPACE: u32 = 0x8000;
pub const HOST_CTL: u32 = 0x8008;
/// Base index used by auto-increment draw ranges.
pub const INDEX_OFFSET: u32 = 0x800c;
/// Byte address inside the vertex buffer for subsequent `VB_DATA` writes.
pub const VB_ADDR: u32 = 0x8010;

const ATTR_CTL_BASE: u32 = 0x8040;
const VB_CTL_BASE: u32 = 0x8080;
const VB_BASE_BASE: u32 = 0x80c0;

/// FIFO entry port.
pub const FIFO_ENTRY: u32 = 0xc000;
/// Vertex buffer data port; the address auto-increments by 4 per write.
pub const VB_DATA: u32 = 0xe000;

pub const HOST_BASE: u32 = 0x8000;
pub const HOST_END: u32 = 0x8100;

/// Attribute control register of `slot`.
pub const fn attr_ctl(slot: usize) -> u32 {
    ATTR_CTL_BASE + 4 * slot as u32
}

/// Vertex buffer control register (stride/range) of `slot`.
pub const fn vb_ctl(slot: usize) -> u32 {
    VB_CTL_BASE + 4 * slot as u32
}

/// Vertex buffer base address register of `slot`.
pub const fn vb_base(slot: usize) -> u32 {
    VB_BASE_BASE + 4 * slot as u32
}

// ---------------------------------------------------------------------
// Shader memories
// ---------------------------------------------------------------------

pub const VS_INSTMEM: u32 = 0x1_0000;
pub const VS_CONST_FLOAT: u32 = 0x1_4000;
pub const VS_CONST_INT: u32 = 0x1_8000;
pub const VS_CONST_BOOL: u32 = 0x1_8400;
pub const VS_PC_RANGE: u32 = 0x2_0000;
pub const VS_ATTRIB_NUM: u32 = 0x2_0008;

pub const PS_INSTMEM: u32 = 0x4_0000;
pub const PS_CONST_FLOAT: u32 = 0x4_4000;
pub const PS_CONST_INT: u32 = 0x4_8000;
pub const PS_CONST_BOOL: u32 = 0x4_8400;
pub const PS_PC_RANGE: u32 = 0x4_c000;
pub const PS_ATTRIB_NUM: u32 = 0x4_c008;

/// Instruction slots per shader unit (4 words each).
pub const SHADER_INSTRUCTION_SLOTS: u32 = 512;
/// Float constant registers per shader unit (vec4 each).
pub const SHADER_CONST_FLOAT_VEC4: u32 = 256;
pub const SHADER_CONST_INT_REGS: u32 = 16;

// ---------------------------------------------------------------------
// Primitive engine
// ---------------------------------------------------------------------

pub const VERTEX_CTX: u32 = 0x3_0000;
pub const VIEWPORT_OX: u32 = 0x3_0004;
pub const VIEWPORT_OY: u32 = 0x3_0008;
pub const VIEWPORT_HALF_W: u32 = 0x3_000c;
pub const VIEWPORT_HALF_H: u32 = 0x3_0010;
pub const DEPTH_RANGE_NEAR: u32 = 0x3_0014;
pub const DEPTH_RANGE_FAR: u32 = 0x3_0018;

pub const PRIMITIVE_BASE: u32 = 0x3_0000;
pub const PRIMITIVE_END: u32 = 0x3_0100;

// ---------------------------------------------------------------------
// Rasterizer
// ---------------------------------------------------------------------

pub const SAMPLE_POS: u32 = 0x3_8000;
pub const DEPTH_OFFSET_EN: u32 = 0x3_8004;
pub const DEPTH_OFFSET_FACTOR: u32 = 0x3_8008;
pub const DEPTH_OFFSET_UNITS: u32 = 0x3_800c;
pub const CULL_CTL: u32 = 0x3_8010;
pub const Y_CLIP: u32 = 0x3_8014;
pub const X_CLIP: u32 = 0x3_8018;
pub const LOD_CTL: u32 = 0x3_801c;
pub const POINT_WIDTH: u32 = 0x3_8020;
pub const POINT_SIZE_MIN: u32 = 0x3_8024;
pub const POINT_SIZE_MAX: u32 = 0x3_8028;
pub const LINE_WIDTH: u32 = 0x3_802c;

pub const RASTER_BASE: u32 = 0x3_8000;
pub const RASTER_END: u32 = 0x3_8100;

// ---------------------------------------------------------------------
// Per-fragment unit
// ---------------------------------------------------------------------

pub const SCISSOR_X: u32 = 0x7_0000;
pub const SCISSOR_Y: u32 = 0x7_0004;
pub const ALPHA_TEST: u32 = 0x7_0008;
pub const STENCIL_FRONT: u32 = 0x7_000c;
pub const STENCIL_BACK: u32 = 0x7_0010;
pub const DEPTH_TEST: u32 = 0x7_0014;
pub const BLEND_COLOR: u32 = 0x7_0018;
pub const BLEND: u32 = 0x7_001c;
pub const LOGIC_OP: u32 = 0x7_0020;
pub const COLOR_MASK: u32 = 0x7_0024;
pub const DEPTH_MASK: u32 = 0x7_0028;
pub const COLOR_BUF_BASE: u32 = 0x7_002c;
pub const DEPTH_BUF_BASE: u32 = 0x7_0030;
pub const BUF_WIDTH: u32 = 0x7_0034;
pub const FB_CTL: u32 = 0x7_0038;

pub const FRAGMENT_BASE: u32 = 0x7_0000;
pub const FRAGMENT_END: u32 = 0x7_0100;

// ---------------------------------------------------------------------
// Vertex buffer geometry
// ---------------------------------------------------------------------

/// Hardware attribute slots.
pub const MAX_ATTRIBUTES: usize = 8;
/// Vertices per buffer half.
pub const VB_HALF_VERTICES: usize = 16;
/// Largest per-vertex element a slot can hold (4 components x 4 bytes).
pub const VB_MAX_ELEMENT_BYTES: usize = 16;
/// Bytes reserved per attribute slot (two halves).
pub const VB_SLOT_BYTES: u32 = (2 * VB_HALF_VERTICES * VB_MAX_ELEMENT_BYTES) as u32;
pub const VB_SIZE_BYTES: u32 = VB_SLOT_BYTES * MAX_ATTRIBUTES as u32;
/// Vertex buffer transfers are issued in multiples of this many bytes.
pub const VB_TRANSFER_ALIGN_BYTES: usize = 16;

/// Entries in the host FIFO.
pub const FIFO_DEPTH: u32 = 32;

/// Start of the vertex buffer region reserved for `slot`.
pub const fn vb_slot_base(slot: usize) -> u32 {
    VB_SLOT_BYTES * slot as u32
}

// ---------------------------------------------------------------------
// Bit values
// ---------------------------------------------------------------------

pub mod int_bits {
    /// Pipeline-state interrupt.
    pub const PIPELINE: u32 = 1 << 0;
}

pub mod reset_bits {
    pub const ASSERT: u32 = 1;
    pub const DEASSERT: u32 = 0;
}

const _: () = {
    assert!(VB_SIZE_BYTES == 4096);
    assert!(VB_SLOT_BYTES as usize % VB_TRANSFER_ALIGN_BYTES == 0);
    assert!(vb_base(MAX_ATTRIBUTES - 1) < HOST_END);
};
