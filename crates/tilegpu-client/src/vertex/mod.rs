//! Vertex streaming.
//!
//! Every draw validates its arguments, takes the GPU, applies the client queue and programs the
//! primitive mode and attribute slots, then transfers vertex data in one of two ways:
//!
//! * Unbuffered draws push every vertex through the host FIFO. The FIFO provides its own
//!   backpressure, so nothing has to be flushed.
//! * Buffered draws pack attributes into the vertex buffer. Up to 32 vertices go out as a single
//!   auto-increment batch. Larger draws alternate between the two 16-vertex halves of each
//!   attribute's buffer slot, and a selective flush of the vertex fetch stages guards every half
//!   before it is written again.
//!
//! The GPU is released when the draw returns, whether or not it succeeded.

mod attrib;
mod buffered;
mod fifo;
mod pack;

pub use attrib::{Indices, StridedView, VertexAttribute};

use tilegpu_hw::{mmio, PrimitiveType};

use crate::context::DeviceContext;
use crate::error::{ClientError, VertexError};

/// Vertices a draw reads, in submission order.
#[derive(Debug, Clone)]
pub(crate) enum Vertices {
    Range { first: u32, count: u32 },
    Indexed(Vec<u32>),
}

impl Vertices {
    pub fn len(&self) -> usize {
        match self {
            Self::Range { count, .. } => *count as usize,
            Self::Indexed(indices) => indices.len(),
        }
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self, Self::Indexed(_))
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        let (first, count, list) = match self {
            Self::Range { first, count } => (*first, *count, &[][..]),
            Self::Indexed(indices) => (0, 0, &indices[..]),
        };
        (0..count).map(move |i| first + i).chain(list.iter().copied())
    }
}

/// A validated draw.
#[derive(Debug)]
pub(crate) struct Draw<'a> {
    pub mode: PrimitiveType,
    pub attrs: &'a [VertexAttribute<'a>],
    pub vertices: Vertices,
}

impl<'a> Draw<'a> {
    fn arrays(
        mode: PrimitiveType,
        attrs: &'a [VertexAttribute<'a>],
        first: u32,
        count: u32,
    ) -> Result<Self, VertexError> {
        if count == 0 {
            return Err(VertexError::EmptyDraw);
        }
        let last = first
            .checked_add(count - 1)
            .ok_or(VertexError::RangeOverflow { first, count })?;
        validate_attributes(attrs, last)?;
        Ok(Self {
            mode,
            attrs,
            vertices: Vertices::Range { first, count },
        })
    }

    fn elements(
        mode: PrimitiveType,
        attrs: &'a [VertexAttribute<'a>],
        indices: Indices<'_>,
    ) -> Result<Self, VertexError> {
        let indices = indices.to_u32();
        let Some(&max_index) = indices.iter().max() else {
            return Err(VertexError::EmptyDraw);
        };
        validate_attributes(attrs, max_index)?;
        Ok(Self {
            mode,
            attrs,
            vertices: Vertices::Indexed(indices),
        })
    }
}

fn validate_attributes(attrs: &[VertexAttribute<'_>], max_index: u32) -> Result<(), VertexError> {
    if attrs.is_empty() {
        return Err(VertexError::NoAttributes);
    }
    if attrs.len() > mmio::MAX_ATTRIBUTES {
        return Err(VertexError::TooManyAttributes(attrs.len()));
    }
    for (slot, attr) in attrs.iter().enumerate() {
        attr.validate(slot, max_index)?;
    }
    Ok(())
}

impl DeviceContext {
    /// Draw `count` consecutive vertices starting at `first` through the vertex buffer.
    pub fn draw_arrays(
        &mut self,
        mode: PrimitiveType,
        attrs: &[VertexAttribute<'_>],
        first: u32,
        count: u32,
    ) -> Result<(), ClientError> {
        let draw = Draw::arrays(mode, attrs, first, count)?;
        self.submit(&draw, Self::stream_buffered)
    }

    /// Draw the vertices named by `indices` through the vertex buffer.
    pub fn draw_elements(
        &mut self,
        mode: PrimitiveType,
        attrs: &[VertexAttribute<'_>],
        indices: Indices<'_>,
    ) -> Result<(), ClientError> {
        let draw = Draw::elements(mode, attrs, indices)?;
        self.submit(&draw, Self::stream_buffered)
    }

    /// Like [`DeviceContext::draw_arrays`], streaming vertex data through the host FIFO.
    pub fn draw_arrays_unbuffered(
        &mut self,
        mode: PrimitiveType,
        attrs: &[VertexAttribute<'_>],
        first: u32,
        count: u32,
    ) -> Result<(), ClientError> {
        let draw = Draw::arrays(mode, attrs, first, count)?;
        self.submit(&draw, Self::stream_fifo)
    }

    pub fn draw_elements_unbuffered(
        &mut self,
        mode: PrimitiveType,
        attrs: &[VertexAttribute<'_>],
        indices: Indices<'_>,
    ) -> Result<(), ClientError> {
        let draw = Draw::elements(mode, attrs, indices)?;
        self.submit(&draw, Self::stream_fifo)
    }

    fn submit(
        &mut self,
        draw: &Draw<'_>,
        transfer: fn(&mut Self, &Draw<'_>) -> Result<(), ClientError>,
    ) -> Result<(), ClientError> {
        self.with_hardware(|ctx| {
            ctx.flush_client_queue()?;
            ctx.program_attributes(draw)?;
            transfer(ctx, draw)?;
            ctx.stats.draws += 1;
            Ok(())
        })
    }

    fn program_attributes(&mut self, draw: &Draw<'_>) -> Result<(), ClientError> {
        let mut vctx = self.shadow().primitive.vertex_ctx;
        vctx.set_primitive(draw.mode as u32);
        self.set_vertex_context(vctx)?;

        // The hardware stops fetching at the flagged slot, so the highest one always carries it.
        let last = draw.attrs.len() - 1;
        for (slot, attr) in draw.attrs.iter().enumerate() {
            self.set_attribute(slot, attr.control(slot == last))?;
        }
        Ok(())
    }

    pub(crate) fn program_host(
        &mut self,
        vertex_buffer: bool,
        auto_increment: bool,
    ) -> Result<(), ClientError> {
        let mut host = self.shadow().host.host_ctl;
        host.set_vertex_buffer(vertex_buffer)
            .set_auto_increment(auto_increment)
            .set_index_width(0);
        self.set_host_control(host)
    }
}

