//! Double-buffered vertex buffer transfers.
//!
//! Each attribute owns one [`mmio::VB_SLOT_BYTES`] slot split into two halves of
//! [`mmio::VB_HALF_VERTICES`] vertices. Batch `k` of a large draw is packed into half `k % 2`
//! while the previous batch is fetched from the other half.

use std::ops::Range;

use tilegpu_hw::regs::VertexBufferControl;
use tilegpu_hw::{mmio, PipelineStages, RegisterWindow};

use super::attrib::VertexAttribute;
use super::fifo::FifoWriter;
use super::pack::{pack_batch, PackStrategy, Selection};
use super::{Draw, Vertices};
use crate::context::DeviceContext;
use crate::error::ClientError;

const HALF: usize = mmio::VB_HALF_VERTICES;

/// Batch ranges for `count` vertices: everything at once when it fits the whole slot, otherwise
/// a leading `count % 16` remainder followed by full halves.
pub(crate) fn split_batches(count: usize) -> Vec<Range<usize>> {
    if count <= 2 * HALF {
        return vec![0..count];
    }
    let lead = count % HALF;
    let mut batches = Vec::with_capacity(count / HALF + 1);
    if lead > 0 {
        batches.push(0..lead);
    }
    batches.extend((lead..count).step_by(HALF).map(|start| start..start + HALF));
    batches
}

struct SlotPlan<'a> {
    attr: &'a VertexAttribute<'a>,
    strategy: PackStrategy,
    vb_stride: usize,
    base: u32,
    /// Written once for the whole draw instead of per batch.
    shared: bool,
}

fn write_vertex_buffer(regs: &dyn RegisterWindow, addr: u32, words: &[u32]) {
    regs.write_u32(mmio::VB_ADDR, addr);
    regs.write_port(mmio::VB_DATA, words);
}

impl DeviceContext {
    fn selective_flush(&mut self) -> Result<(), ClientError> {
        self.flush(PipelineStages::VERTEX_BUFFER_CONSUMERS)?;
        self.stats.selective_flushes += 1;
        Ok(())
    }

    pub(crate) fn stream_buffered(&mut self, draw: &Draw<'_>) -> Result<(), ClientError> {
        let constant_optimization = self.config.constant_stride_optimization;
        let indexed = draw.vertices.is_indexed();
        let plans: Vec<SlotPlan<'_>> = draw
            .attrs
            .iter()
            .enumerate()
            .map(|(slot, attr)| {
                let strategy = PackStrategy::select(attr, indexed);
                let vb_stride = strategy.vb_stride(attr, constant_optimization);
                SlotPlan {
                    attr,
                    strategy,
                    vb_stride,
                    base: mmio::vb_slot_base(slot),
                    shared: vb_stride == 0,
                }
            })
            .collect();

        for (slot, plan) in plans.iter().enumerate() {
            let mut vb = VertexBufferControl::default();
            vb.set_stride(plan.vb_stride as u32).set_range(2 * HALF as u32);
            self.set_vertex_buffer(slot, vb, plan.base)?;
        }

        // The previous draw may still be fetching from the slots about to be overwritten.
        if self.vb_in_flight {
            self.selective_flush()?;
        }

        let mut words = Vec::new();
        for plan in plans.iter().filter(|p| p.shared) {
            words.clear();
            let once = Selection::Range { first: 0, count: 1 };
            pack_batch(plan.attr, plan.strategy, once, constant_optimization, &mut words);
            write_vertex_buffer(self.regs(), plan.base, &words);
        }

        let batches = split_batches(draw.vertices.len());
        let single = batches.len() == 1;
        if single {
            self.program_host(true, true)?;
            self.set_index_offset(0)?;
        } else {
            self.program_host(true, false)?;
        }

        let last = batches.len() - 1;
        for (k, batch) in batches.iter().enumerate() {
            let half = k % 2;
            let selection = match &draw.vertices {
                Vertices::Range { first, .. } => Selection::Range {
                    first: *first as usize + batch.start,
                    count: batch.len(),
                },
                Vertices::Indexed(indices) => Selection::Indexed(&indices[batch.clone()]),
            };
            for plan in plans.iter().filter(|p| !p.shared) {
                words.clear();
                pack_batch(plan.attr, plan.strategy, selection, constant_optimization, &mut words);
                let addr = plan.base + (half * HALF * plan.vb_stride) as u32;
                write_vertex_buffer(self.regs(), addr, &words);
            }

            // Batch k+1 overwrites the half batch k-1 is reading.
            if k >= 1 && k < last {
                self.selective_flush()?;
            }

            let mut fifo = FifoWriter::new(self.regs(), self.config.fifo_wait);
            fifo.push(batch.len() as u32);
            if !single {
                fifo.extend((0..batch.len()).map(|i| (half * HALF + i) as u32));
            }
            let stalls = fifo.stalls();
            self.stats.fifo_stalls += stalls;
            self.stats.batches += 1;
        }

        self.vb_in_flight = true;
        tracing::trace!(
            ctx = %self.id(),
            vertices = draw.vertices.len(),
            batches = batches.len(),
            "buffered draw issued"
        );
        Ok(())
    }
}
