//! Client-side mirror of the GPU register state.
//!
//! Every register a context programs is recorded here first, so the whole state can be replayed
//! after another context has owned the hardware. Groups follow the hardware units and
//! [`ShadowState::registers`] lists them in replay order: global, host interface, primitive
//! engine, rasterizer, per-fragment.

use tilegpu_hw::mmio;
use tilegpu_hw::regs::{
    AlphaTest, AttributeControl, Blend, ColorMask, CullControl, DepthMask, DepthTest,
    FramebufferControl, HostControl, LogicOp, ScissorRange, StencilTest, VertexBufferControl,
    VertexContext,
};
use tilegpu_hw::RegisterWindow;

use crate::error::ClientError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalState {
    pub global_ctl: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostState {
    pub host_ctl: HostControl,
    pub index_offset: u32,
    pub attributes: [AttributeControl; mmio::MAX_ATTRIBUTES],
    pub vb_ctl: [VertexBufferControl; mmio::MAX_ATTRIBUTES],
    pub vb_base: [u32; mmio::MAX_ATTRIBUTES],
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrimitiveState {
    pub vertex_ctx: VertexContext,
    pub viewport_ox: f32,
    pub viewport_oy: f32,
    pub viewport_half_w: f32,
    pub viewport_half_h: f32,
    pub depth_near: f32,
    pub depth_far: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RasterState {
    pub sample_pos: u32,
    pub depth_offset_en: u32,
    pub depth_offset_factor: f32,
    pub depth_offset_units: f32,
    pub cull: CullControl,
    pub y_clip: u32,
    pub x_clip: u32,
    pub lod_ctl: u32,
    pub point_width: f32,
    pub point_size_min: f32,
    pub point_size_max: f32,
    pub line_width: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FragmentState {
    pub scissor_x: ScissorRange,
    pub scissor_y: ScissorRange,
    pub alpha_test: AlphaTest,
    pub stencil_front: StencilTest,
    pub stencil_back: StencilTest,
    pub depth_test: DepthTest,
    pub blend_color: u32,
    pub blend: Blend,
    pub logic_op: LogicOp,
    pub color_mask: ColorMask,
    pub depth_mask: DepthMask,
    pub color_buf_base: u32,
    pub depth_buf_base: u32,
    pub buf_width: u32,
    pub fb_ctl: FramebufferControl,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShadowState {
    pub global: GlobalState,
    pub host: HostState,
    pub primitive: PrimitiveState,
    pub raster: RasterState,
    pub fragment: FragmentState,
}

fn slot_of(offset: u32, first: u32) -> Option<usize> {
    let slot = offset.checked_sub(first)? / 4;
    (offset % 4 == 0 && (slot as usize) < mmio::MAX_ATTRIBUTES).then_some(slot as usize)
}

impl ShadowState {
    /// Record `bits` as the value of the register at `offset`.
    pub fn store(&mut self, offset: u32, bits: u32) -> Result<(), ClientError> {
        let f = f32::from_bits(bits);
        match offset {
            mmio::GLOBAL_CTL => self.global.global_ctl = bits,

            mmio::HOST_CTL => self.host.host_ctl = HostControl::from_bits(bits),
            mmio::INDEX_OFFSET => self.host.index_offset = bits,
            o if o >= mmio::attr_ctl(0) && o < mmio::vb_ctl(0) => {
                let slot = slot_of(o, mmio::attr_ctl(0)).ok_or(ClientError::UnknownRegister(o))?;
                self.host.attributes[slot] = AttributeControl::from_bits(bits);
            }
            o if o >= mmio::vb_ctl(0) && o < mmio::vb_base(0) => {
                let slot = slot_of(o, mmio::vb_ctl(0)).ok_or(ClientError::UnknownRegister(o))?;
                self.host.vb_ctl[slot] = VertexBufferControl::from_bits(bits);
            }
            o if o >= mmio::vb_base(0) && o <= mmio::vb_base(mmio::MAX_ATTRIBUTES - 1) => {
                let slot = slot_of(o, mmio::vb_base(0)).ok_or(ClientError::UnknownRegister(o))?;
                self.host.vb_base[slot] = bits;
            }

            mmio::VERTEX_CTX => self.primitive.vertex_ctx = VertexContext::from_bits(bits),
            mmio::VIEWPORT_OX => self.primitive.viewport_ox = f,
            mmio::VIEWPORT_OY => self.primitive.viewport_oy = f,
            mmio::VIEWPORT_HALF_W => self.primitive.viewport_half_w = f,
            mmio::VIEWPORT_HALF_H => self.primitive.viewport_half_h = f,
            mmio::DEPTH_RANGE_NEAR => self.primitive.depth_near = f,
            mmio::DEPTH_RANGE_FAR => self.primitive.depth_far = f,

            mmio::SAMPLE_POS => self.raster.sample_pos = bits,
            mmio::DEPTH_OFFSET_EN => self.raster.depth_offset_en = bits,
            mmio::DEPTH_OFFSET_FACTOR => self.raster.depth_offset_factor = f,
            mmio::DEPTH_OFFSET_UNITS => self.raster.depth_offset_units = f,
            mmio::CULL_CTL => self.raster.cull = CullControl::from_bits(bits),
            mmio::Y_CLIP => self.raster.y_clip = bits,
            mmio::X_CLIP => self.raster.x_clip = bits,
            mmio::LOD_CTL => self.raster.lod_ctl = bits,
            mmio::POINT_WIDTH => self.raster.point_width = f,
            mmio::POINT_SIZE_MIN => self.raster.point_size_min = f,
            mmio::POINT_SIZE_MAX => self.raster.point_size_max = f,
            mmio::LINE_WIDTH => self.raster.line_width = f,

            mmio::SCISSOR_X => self.fragment.scissor_x = ScissorRange::from_bits(bits),
            mmio::SCISSOR_Y => self.fragment.scissor_y = ScissorRange::from_bits(bits),
            mmio::ALPHA_TEST => self.fragment.alpha_test = AlphaTest::from_bits(bits),
            mmio::STENCIL_FRONT => self.fragment.stencil_front = StencilTest::from_bits(bits),
            mmio::STENCIL_BACK => self.fragment.stencil_back = StencilTest::from_bits(bits),
            mmio::DEPTH_TEST => self.fragment.depth_test = DepthTest::from_bits(bits),
            mmio::BLEND_COLOR => self.fragment.blend_color = bits,
            mmio::BLEND => self.fragment.blend = Blend::from_bits(bits),
            mmio::LOGIC_OP => self.fragment.logic_op = LogicOp::from_bits(bits),
            mmio::COLOR_MASK => self.fragment.color_mask = ColorMask::from_bits(bits),
            mmio::DEPTH_MASK => self.fragment.depth_mask = DepthMask::from_bits(bits),
            mmio::COLOR_BUF_BASE => self.fragment.color_buf_base = bits,
            mmio::DEPTH_BUF_BASE => self.fragment.depth_buf_base = bits,
            mmio::BUF_WIDTH => self.fragment.buf_width = bits,
            mmio::FB_CTL => self.fragment.fb_ctl = FramebufferControl::from_bits(bits),

            other => return Err(ClientError::UnknownRegister(other)),
        }
        Ok(())
    }

    /// Every shadowed register as `(offset, bits)`, in replay order.
    pub fn registers(&self) -> Vec<(u32, u32)> {
        let host = &self.host;
        let prim = &self.primitive;
        let raster = &self.raster;
        let frag = &self.fragment;

        let mut regs = vec![
            (mmio::GLOBAL_CTL, self.global.global_ctl),
            (mmio::HOST_CTL, host.host_ctl.bits()),
            (mmio::INDEX_OFFSET, host.index_offset),
        ];
        for slot in 0..mmio::MAX_ATTRIBUTES {
            regs.push((mmio::attr_ctl(slot), host.attributes[slot].bits()));
            regs.push((mmio::vb_ctl(slot), host.vb_ctl[slot].bits()));
            regs.push((mmio::vb_base(slot), host.vb_base[slot]));
        }
        regs.extend([
            (mmio::VERTEX_CTX, prim.vertex_ctx.bits()),
            (mmio::VIEWPORT_OX, prim.viewport_ox.to_bits()),
            (mmio::VIEWPORT_OY, prim.viewport_oy.to_bits()),
            (mmio::VIEWPORT_HALF_W, prim.viewport_half_w.to_bits()),
            (mmio::VIEWPORT_HALF_H, prim.viewport_half_h.to_bits()),
            (mmio::DEPTH_RANGE_NEAR, prim.depth_near.to_bits()),
            (mmio::DEPTH_RANGE_FAR, prim.depth_far.to_bits()),
            (mmio::SAMPLE_POS, raster.sample_pos),
            (mmio::DEPTH_OFFSET_EN, raster.depth_offset_en),
            (mmio::DEPTH_OFFSET_FACTOR, raster.depth_offset_factor.to_bits()),
            (mmio::DEPTH_OFFSET_UNITS, raster.depth_offset_units.to_bits()),
            (mmio::CULL_CTL, raster.cull.bits()),
            (mmio::Y_CLIP, raster.y_clip),
            (mmio::X_CLIP, raster.x_clip),
            (mmio::LOD_CTL, raster.lod_ctl),
            (mmio::POINT_WIDTH, raster.point_width.to_bits()),
            (mmio::POINT_SIZE_MIN, raster.point_size_min.to_bits()),
            (mmio::POINT_SIZE_MAX, raster.point_size_max.to_bits()),
            (mmio::LINE_WIDTH, raster.line_width.to_bits()),
            (mmio::SCISSOR_X, frag.scissor_x.bits()),
            (mmio::SCISSOR_Y, frag.scissor_y.bits()),
            (mmio::ALPHA_TEST, frag.alpha_test.bits()),
            (mmio::STENCIL_FRONT, frag.stencil_front.bits()),
            (mmio::STENCIL_BACK, frag.stencil_back.bits()),
            (mmio::DEPTH_TEST, frag.depth_test.bits()),
            (mmio::BLEND_COLOR, frag.blend_color),
            (mmio::BLEND, frag.blend.bits()),
            (mmio::LOGIC_OP, frag.logic_op.bits()),
            (mmio::COLOR_MASK, frag.color_mask.bits()),
            (mmio::DEPTH_MASK, frag.depth_mask.bits()),
            (mmio::COLOR_BUF_BASE, frag.color_buf_base),
            (mmio::DEPTH_BUF_BASE, frag.depth_buf_base),
            (mmio::BUF_WIDTH, frag.buf_width),
            (mmio::FB_CTL, frag.fb_ctl.bits()),
        ]);
        regs
    }

    /// Write every shadowed register to the hardware.
    pub fn replay(&self, regs: &dyn RegisterWindow) {
        for (offset, bits) in self.registers() {
            regs.write_u32(offset, bits);
        }
    }
}
