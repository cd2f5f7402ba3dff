//! Host FIFO writer with backpressure.

use tilegpu_hw::{mmio, RegisterWindow};

use super::pack::push_element;
use super::Draw;
use crate::config::FifoWaitPolicy;
use crate::context::DeviceContext;
use crate::error::ClientError;

/// Writes FIFO entries, waiting whenever the advertised free space runs out.
///
/// Free space is only re-read once the locally tracked count is exhausted.
pub(crate) struct FifoWriter<'a> {
    regs: &'a dyn RegisterWindow,
    policy: FifoWaitPolicy,
    free: u32,
    stalls: u64,
}

impl<'a> FifoWriter<'a> {
    pub fn new(regs: &'a dyn RegisterWindow, policy: FifoWaitPolicy) -> Self {
        Self {
            regs,
            policy,
            free: 0,
            stalls: 0,
        }
    }

    fn wait_for_space(&mut self) {
        loop {
            self.free = self.regs.read_u32(mmio::FIFO_SPACE);
            if self.free > 0 {
                return;
            }
            self.stalls += 1;
            tracing::trace!(stalls = self.stalls, "host fifo full");
            match self.policy {
                FifoWaitPolicy::BusyPoll => std::hint::spin_loop(),
                FifoWaitPolicy::Yield => std::thread::yield_now(),
            }
        }
    }

    pub fn push(&mut self, word: u32) {
        if self.free == 0 {
            self.wait_for_space();
        }
        self.regs.write_u32(mmio::FIFO_ENTRY, word);
        self.free -= 1;
    }

    pub fn extend(&mut self, words: impl IntoIterator<Item = u32>) {
        for word in words {
            self.push(word);
        }
    }

    /// Polls that found the FIFO full.
    pub fn stalls(&self) -> u64 {
        self.stalls
    }
}

impl DeviceContext {
    /// Push every vertex inline: a count word, then each vertex's attributes in slot order.
    pub(crate) fn stream_fifo(&mut self, draw: &Draw<'_>) -> Result<(), ClientError> {
        self.program_host(false, true)?;

        let views: Vec<_> = draw
            .attrs
            .iter()
            .map(|attr| (attr.data_type.byte_width(), attr.view()))
            .collect();
        let mut fifo = FifoWriter::new(self.regs(), self.config.fifo_wait);
        fifo.push(draw.vertices.len() as u32);
        let mut words = Vec::with_capacity(4 * views.len());
        for index in draw.vertices.iter() {
            for (width, view) in &views {
                if let Some(element) = view.get(index as usize) {
                    push_element(*width, element, &mut words);
                }
            }
            fifo.extend(words.drain(..));
        }
        let stalls = fifo.stalls();

        self.stats.fifo_stalls += stalls;
        self.stats.batches += 1;
        Ok(())
    }
}
