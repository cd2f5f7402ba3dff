//! Typed register values.

use bitflags::bitflags;

bitflags! {
    /// Pipeline stages, as reported by `PIPE_STATUS` and selected by `PIPE_MASK`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStages: u32 {
        const HOST_FIFO = 1 << 0;
        const HOST_INTERFACE = 1 << 1;
        /// Vertex buffer fetch (consumer side of the double buffer).
        const VERTEX_BUFFER = 1 << 2;
        const VERTEX_SHADER = 1 << 3;
        const PRIMITIVE_ENGINE = 1 << 4;
        const TRIANGLE_SETUP = 1 << 8;
        const RASTERIZER = 1 << 9;
        const PIXEL_SHADER = 1 << 10;
        const PER_FRAGMENT = 1 << 12;
        const COLOR_CACHE = 1 << 16;
        const DEPTH_CACHE = 1 << 17;
    }
}

impl PipelineStages {
    pub const ALL: Self = Self::all();

    /// Every stage that may still read vertex buffer memory: a draw range can sit in the FIFO or
    /// host interface before the fetch stage picks it up.
    pub const VERTEX_BUFFER_CONSUMERS: Self = Self::HOST_FIFO
        .union(Self::HOST_INTERFACE)
        .union(Self::VERTEX_BUFFER);
}

bitflags! {
    /// Cache maintenance requests for `CACHE_CTL`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CacheOps: u32 {
        const FLUSH_COLOR = 1 << 0;
        const FLUSH_DEPTH = 1 << 1;
        const INVALIDATE_TEXTURE = 1 << 12;
        const INVALIDATE_VERTEX = 1 << 16;
    }
}

impl CacheOps {
    pub const FLUSH_AND_INVALIDATE_ALL: Self = Self::all();
}

/// Vertex attribute element encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DataType {
    Byte = 0,
    Short = 1,
    Int = 2,
    Fixed = 3,
    UByte = 4,
    UShort = 5,
    UInt = 6,
    Float = 7,
    NByte = 8,
    NShort = 9,
    NInt = 10,
    NFixed = 11,
    NUByte = 12,
    NUShort = 13,
    NUInt = 14,
    HalfFloat = 15,
}

impl DataType {
    pub const fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::Byte,
            1 => Self::Short,
            2 => Self::Int,
            3 => Self::Fixed,
            4 => Self::UByte,
            5 => Self::UShort,
            6 => Self::UInt,
            7 => Self::Float,
            8 => Self::NByte,
            9 => Self::NShort,
            10 => Self::NInt,
            11 => Self::NFixed,
            12 => Self::NUByte,
            13 => Self::NUShort,
            14 => Self::NUInt,
            15 => Self::HalfFloat,
            _ => return None,
        })
    }

    /// Size of one component in bytes.
    pub const fn byte_width(self) -> usize {
        match self {
            Self::Byte | Self::UByte | Self::NByte | Self::NUByte => 1,
            Self::Short | Self::UShort | Self::NShort | Self::NUShort | Self::HalfFloat => 2,
            Self::Int | Self::UInt | Self::NInt | Self::NUInt | Self::Fixed | Self::NFixed => 4,
            Self::Float => 4,
        }
    }
}

/// Primitive assembly mode written to `VERTEX_CTX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PrimitiveType {
    Points = 0,
    Lines = 1,
    LineStrip = 2,
    LineLoop = 3,
    Triangles = 4,
    TriangleStrip = 5,
    TriangleFan = 6,
}

crate::register! {
    /// `HOST_CTL`: where vertex data comes from and how indices are generated.
    pub struct HostControl {
        /// Fetch attributes from the vertex buffer instead of the FIFO.
        vertex_buffer, set_vertex_buffer: bool @ 0,
        /// Generate indices from `INDEX_OFFSET` instead of reading them from the FIFO.
        auto_increment, set_auto_increment: bool @ 1,
        /// Index width of explicit index streams (0 = 32-bit, 1 = 16-bit, 2 = 8-bit).
        index_width, set_index_width: u32 @ 2..=3,
        env_color, set_env_color: bool @ 8,
    }
}

crate::register! {
    /// `ATTR_CTL(n)`: layout of one input attribute.
    pub struct AttributeControl {
        data_type, set_data_type: u32 @ 0..=3,
        /// Component count minus one.
        components_minus_one, set_components_minus_one: u32 @ 4..=5,
        src_x, set_src_x: u32 @ 8..=9,
        src_y, set_src_y: u32 @ 10..=11,
        src_z, set_src_z: u32 @ 12..=13,
        src_w, set_src_w: u32 @ 14..=15,
        /// Marks the highest active slot.
        last, set_last: bool @ 31,
    }
}

impl AttributeControl {
    /// Identity swizzle for `data_type` with `components` components (1..=4).
    pub fn new(data_type: DataType, components: u32) -> Self {
        let mut ctl = Self::default();
        ctl.set_data_type(data_type as u32)
            .set_components_minus_one(components.saturating_sub(1))
            .set_src_x(0)
            .set_src_y(1)
            .set_src_z(2)
            .set_src_w(3);
        ctl
    }

    pub fn components(self) -> u32 {
        self.components_minus_one() + 1
    }

    /// Bytes of one vertex's element (components x component width).
    pub fn element_bytes(self) -> usize {
        let width = DataType::from_raw(self.data_type()).map_or(4, DataType::byte_width);
        width * self.components() as usize
    }
}

crate::register! {
    /// `VB_CTL(n)`: per-slot vertex buffer addressing.
    pub struct VertexBufferControl {
        stride, set_stride: u32 @ 0..=7,
        /// Vertices addressable from the slot base.
        range, set_range: u32 @ 16..=31,
    }
}

crate::register! {
    /// `VERTEX_CTX`: primitive type and varying count.
    pub struct VertexContext {
        primitive, set_primitive: u32 @ 0..=3,
        varyings, set_varyings: u32 @ 8..=12,
        point_size, set_point_size: bool @ 16,
    }
}

crate::register! {
    /// `CULL_CTL`.
    pub struct CullControl {
        enable, set_enable: bool @ 0,
        front_ccw, set_front_ccw: bool @ 1,
        /// 0 = back, 1 = front, 3 = both.
        face, set_face: u32 @ 2..=3,
    }
}

crate::register! {
    /// `SCISSOR_X` / `SCISSOR_Y`.
    pub struct ScissorRange {
        min, set_min: u32 @ 0..=11,
        max, set_max: u32 @ 16..=27,
        enable, set_enable: bool @ 31,
    }
}

crate::register! {
    /// `ALPHA_TEST`.
    pub struct AlphaTest {
        enable, set_enable: bool @ 0,
        func, set_func: u32 @ 1..=3,
        reference, set_reference: u32 @ 4..=11,
    }
}

crate::register! {
    /// `STENCIL_FRONT` / `STENCIL_BACK`.
    pub struct StencilTest {
        enable, set_enable: bool @ 0,
        func, set_func: u32 @ 1..=3,
        reference, set_reference: u32 @ 4..=11,
        mask, set_mask: u32 @ 12..=19,
        fail_op, set_fail_op: u32 @ 20..=22,
        zfail_op, set_zfail_op: u32 @ 23..=25,
        zpass_op, set_zpass_op: u32 @ 26..=28,
    }
}

crate::register! {
    /// `DEPTH_TEST`.
    pub struct DepthTest {
        enable, set_enable: bool @ 0,
        func, set_func: u32 @ 1..=3,
    }
}

crate::register! {
    /// `BLEND`.
    pub struct Blend {
        enable, set_enable: bool @ 0,
        src_rgb, set_src_rgb: u32 @ 1..=4,
        src_alpha, set_src_alpha: u32 @ 5..=8,
        dst_rgb, set_dst_rgb: u32 @ 9..=12,
        dst_alpha, set_dst_alpha: u32 @ 13..=16,
        equation_rgb, set_equation_rgb: u32 @ 17..=19,
        equation_alpha, set_equation_alpha: u32 @ 20..=22,
    }
}

crate::register! {
    /// `LOGIC_OP`.
    pub struct LogicOp {
        enable, set_enable: bool @ 0,
        op, set_op: u32 @ 1..=4,
    }
}

crate::register! {
    /// `COLOR_MASK`: a set bit disables writes to the channel.
    pub struct ColorMask {
        red, set_red: bool @ 3,
        green, set_green: bool @ 2,
        blue, set_blue: bool @ 1,
        alpha, set_alpha: bool @ 0,
    }
}

crate::register! {
    /// `DEPTH_MASK`.
    pub struct DepthMask {
        depth, set_depth: bool @ 0,
        stencil_front, set_stencil_front: u32 @ 16..=23,
        stencil_back, set_stencil_back: u32 @ 24..=31,
    }
}

crate::register! {
    /// `FB_CTL`.
    pub struct FramebufferControl {
        format, set_format: u32 @ 0..=2,
        alpha_threshold, set_alpha_threshold: u32 @ 8..=15,
        opaque_alpha, set_opaque_alpha: u32 @ 16..=23,
        dither, set_dither: bool @ 24,
    }
}
