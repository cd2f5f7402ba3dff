//! Software model of the GPU block.
//!
//! `SimGpu` implements the register window, the power domain and the interrupt line closely
//! enough to drive the arbiter and the vertex streaming engine without hardware: pipeline busy
//! state, the latched pipeline interrupt, cache maintenance, FIFO backpressure, the vertex buffer
//! and the draw-range command stream. Draws are recorded as fetched vertex records so callers can
//! check exactly what the GPU would have read, and vertex buffer writes that race a queued draw
//! are reported as [`Hazard`]s.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::mmio;
use crate::regs::{AttributeControl, HostControl, PipelineStages, VertexBufferControl};
use crate::window::{IrqSink, PowerDomain, PowerError, RegisterWindow};

/// Value reported by `VERSION`.
pub const SIM_VERSION: u32 = 0x0105_0000;

/// When queued draws complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetirePolicy {
    /// Draws execute as soon as their draw-range command is parsed.
    #[default]
    Immediate,
    /// Draws stay queued (and the pipeline busy) until the pipeline interrupt is enabled or
    /// [`SimGpu::retire_all`] is called.
    Deferred,
    /// Nothing completes until a soft reset.
    Stalled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    Read { offset: u32, value: u32 },
    Write { offset: u32, value: u32 },
    Irq,
    DrawQueued { vertices: u32 },
    DrawExecuted { vertices: u32 },
}

/// A vertex buffer write that landed on bytes a queued draw had not fetched yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hazard {
    pub addr: u32,
    pub slot: usize,
    pub index: u32,
}

#[derive(Debug, Clone, Copy)]
struct SlotLayout {
    base: u32,
    stride: u32,
    element_bytes: usize,
}

impl SlotLayout {
    fn span(&self, index: u32) -> std::ops::Range<u32> {
        let start = self.base.wrapping_add(index.wrapping_mul(self.stride));
        start..start.wrapping_add(self.element_bytes as u32)
    }
}

#[derive(Debug, Clone)]
struct QueuedDraw {
    indices: Vec<u32>,
    layout: Vec<SlotLayout>,
}

#[derive(Debug, Default)]
enum FifoParser {
    #[default]
    Idle,
    Indices {
        remaining: u32,
        indices: Vec<u32>,
        layout: Vec<SlotLayout>,
    },
    Vertices {
        remaining: u32,
        total: u32,
        layout: Vec<SlotLayout>,
        words: Vec<u32>,
    },
}

#[derive(Debug)]
struct SimState {
    regs: HashMap<u32, u32>,
    vertex_buffer: Vec<u8>,
    vb_addr: u32,
    busy: PipelineStages,
    injected_busy: PipelineStages,
    policy: RetirePolicy,
    int_pending: u32,
    fifo_stall_reads: u32,
    fifo: FifoParser,
    queued: VecDeque<QueuedDraw>,
    fetched: Vec<Vec<u8>>,
    hazards: Vec<Hazard>,
    trace_enabled: bool,
    trace: Vec<SimEvent>,
    powered: bool,
    power_failure: Option<String>,
    power_on_count: u32,
    power_off_count: u32,
    reset_count: u32,
    cache_flush_count: u32,
    cache_stall: bool,
}

impl SimState {
    fn new() -> Self {
        Self {
            regs: HashMap::new(),
            vertex_buffer: vec![0; mmio::VB_SIZE_BYTES as usize],
            vb_addr: 0,
            busy: PipelineStages::empty(),
            injected_busy: PipelineStages::empty(),
            policy: RetirePolicy::Immediate,
            int_pending: 0,
            fifo_stall_reads: 0,
            fifo: FifoParser::Idle,
            queued: VecDeque::new(),
            fetched: Vec::new(),
            hazards: Vec::new(),
            trace_enabled: false,
            trace: Vec::new(),
            powered: false,
            power_failure: None,
            power_on_count: 0,
            power_off_count: 0,
            reset_count: 0,
            cache_flush_count: 0,
            cache_stall: false,
        }
    }

    fn reg(&self, offset: u32) -> u32 {
        self.regs.get(&offset).copied().unwrap_or(0)
    }

    fn status(&self) -> PipelineStages {
        self.busy | self.injected_busy
    }

    fn record(&mut self, event: SimEvent) {
        if self.trace_enabled {
            self.trace.push(event);
        }
    }

    fn read(&mut self, offset: u32) -> u32 {
        let value = match offset {
            mmio::PIPE_STATUS => self.status().bits(),
            mmio::FIFO_SPACE => {
                if self.fifo_stall_reads > 0 {
                    self.fifo_stall_reads -= 1;
                    0
                } else {
                    mmio::FIFO_DEPTH
                }
            }
            mmio::INT_PENDING => self.int_pending,
            mmio::VERSION => SIM_VERSION,
            _ => self.reg(offset),
        };
        self.record(SimEvent::Read { offset, value });
        value
    }

    /// Returns `true` when the write leaves an enabled interrupt pending.
    fn write(&mut self, offset: u32, value: u32) -> bool {
        self.record(SimEvent::Write { offset, value });
        match offset {
            mmio::SW_RESET => {
                if value & mmio::reset_bits::ASSERT != 0 {
                    self.reset();
                }
                self.regs.insert(offset, value);
                false
            }
            mmio::CACHE_CTL => {
                if value != 0 {
                    self.cache_flush_count += 1;
                }
                let stored = if self.cache_stall { value } else { 0 };
                self.regs.insert(offset, stored);
                false
            }
            mmio::INT_PENDING => {
                self.int_pending &= !value;
                false
            }
            mmio::INT_MASK => {
                self.regs.insert(offset, value);
                if value & mmio::int_bits::PIPELINE != 0 && self.policy == RetirePolicy::Deferred {
                    self.retire_queued();
                }
                self.latch_pipeline_interrupt();
                self.irq_asserted()
            }
            mmio::PIPE_MASK | mmio::PIPE_TARGET_STATE => {
                self.regs.insert(offset, value);
                self.latch_pipeline_interrupt();
                self.irq_asserted()
            }
            mmio::FIFO_ENTRY => {
                self.feed_fifo(value);
                false
            }
            mmio::VB_ADDR => {
                self.vb_addr = value;
                false
            }
            mmio::VB_DATA => {
                self.write_vertex_buffer(value);
                false
            }
            _ => {
                self.regs.insert(offset, value);
                false
            }
        }
    }

    fn reset(&mut self) {
        self.reset_count += 1;
        self.busy = PipelineStages::empty();
        self.injected_busy = PipelineStages::empty();
        self.queued.clear();
        self.fifo = FifoParser::Idle;
        self.int_pending = 0;
        self.regs.insert(mmio::INT_MASK, 0);
        self.regs.insert(mmio::CACHE_CTL, 0);
    }

    fn latch_pipeline_interrupt(&mut self) {
        let mask = self.reg(mmio::PIPE_MASK);
        if mask == 0 {
            return;
        }
        let target = self.reg(mmio::PIPE_TARGET_STATE) & mask;
        if self.status().bits() & mask == target {
            self.int_pending |= mmio::int_bits::PIPELINE;
        }
    }

    fn irq_asserted(&self) -> bool {
        self.int_pending & self.reg(mmio::INT_MASK) != 0
    }

    fn slot_layout(&self) -> Vec<SlotLayout> {
        let mut layout = Vec::new();
        for slot in 0..mmio::MAX_ATTRIBUTES {
            let ctl = AttributeControl::from_bits(self.reg(mmio::attr_ctl(slot)));
            let vb = VertexBufferControl::from_bits(self.reg(mmio::vb_ctl(slot)));
            layout.push(SlotLayout {
                base: self.reg(mmio::vb_base(slot)),
                stride: vb.stride(),
                element_bytes: ctl.element_bytes(),
            });
            if ctl.last() {
                return layout;
            }
        }
        // Without a terminating slot the host interface fetches nothing.
        Vec::new()
    }

    fn feed_fifo(&mut self, word: u32) {
        match std::mem::take(&mut self.fifo) {
            FifoParser::Idle => {
                if word == 0 {
                    return;
                }
                let host = HostControl::from_bits(self.reg(mmio::HOST_CTL));
                let layout = self.slot_layout();
                if !host.vertex_buffer() {
                    self.fifo = FifoParser::Vertices {
                        remaining: word,
                        total: word,
                        layout,
                        words: Vec::new(),
                    };
                } else if host.auto_increment() {
                    let first = self.reg(mmio::INDEX_OFFSET);
                    let indices = (first..first + word).collect();
                    self.queue_draw(QueuedDraw { indices, layout });
                } else {
                    self.fifo = FifoParser::Indices {
                        remaining: word,
                        indices: Vec::with_capacity(word as usize),
                        layout,
                    };
                }
            }
            FifoParser::Indices {
                remaining,
                mut indices,
                layout,
            } => {
                indices.push(word);
                if remaining > 1 {
                    self.fifo = FifoParser::Indices {
                        remaining: remaining - 1,
                        indices,
                        layout,
                    };
                } else {
                    self.queue_draw(QueuedDraw { indices, layout });
                }
            }
            FifoParser::Vertices {
                remaining,
                total,
                layout,
                mut words,
            } => {
                words.push(word);
                let per_vertex: usize = layout.iter().map(|s| s.element_bytes.div_ceil(4)).sum();
                if words.len() < per_vertex {
                    self.fifo = FifoParser::Vertices {
                        remaining,
                        total,
                        layout,
                        words,
                    };
                    return;
                }

                let mut record = Vec::new();
                let mut cursor = 0;
                for slot in &layout {
                    let count = slot.element_bytes.div_ceil(4);
                    let bytes: Vec<u8> = words[cursor..cursor + count]
                        .iter()
                        .flat_map(|w| w.to_le_bytes())
                        .collect();
                    record.extend_from_slice(&bytes[..slot.element_bytes]);
                    cursor += count;
                }
                self.fetched.push(record);

                if remaining > 1 {
                    self.fifo = FifoParser::Vertices {
                        remaining: remaining - 1,
                        total,
                        layout,
                        words: Vec::new(),
                    };
                } else {
                    self.record(SimEvent::DrawExecuted { vertices: total });
                }
            }
        }
    }

    fn queue_draw(&mut self, draw: QueuedDraw) {
        self.record(SimEvent::DrawQueued {
            vertices: draw.indices.len() as u32,
        });
        self.queued.push_back(draw);
        self.busy = PipelineStages::ALL;
        if self.policy == RetirePolicy::Immediate {
            self.retire_queued();
        }
    }

    fn retire_queued(&mut self) {
        while let Some(draw) = self.queued.pop_front() {
            for &index in &draw.indices {
                let mut record = Vec::new();
                for slot in &draw.layout {
                    let span = slot.span(index);
                    for addr in span {
                        record.push(self.vertex_buffer.get(addr as usize).copied().unwrap_or(0));
                    }
                }
                self.fetched.push(record);
            }
            self.record(SimEvent::DrawExecuted {
                vertices: draw.indices.len() as u32,
            });
        }
        self.busy = PipelineStages::empty();
    }

    fn write_vertex_buffer(&mut self, word: u32) {
        let addr = self.vb_addr;
        self.vb_addr = self.vb_addr.wrapping_add(4);

        let written = addr..addr.wrapping_add(4);
        for draw in &self.queued {
            for (slot, layout) in draw.layout.iter().enumerate() {
                for &index in &draw.indices {
                    let span = layout.span(index);
                    if span.start < written.end && written.start < span.end {
                        self.hazards.push(Hazard { addr, slot, index });
                    }
                }
            }
        }

        let start = addr as usize;
        if let Some(dst) = self.vertex_buffer.get_mut(start..start + 4) {
            dst.copy_from_slice(&word.to_le_bytes());
        }
    }
}

/// Software GPU; see the module docs.
pub struct SimGpu {
    state: Mutex<SimState>,
    irq: Mutex<Option<Arc<dyn IrqSink>>>,
}

impl Default for SimGpu {
    fn default() -> Self {
        Self::new()
    }
}

impl SimGpu {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::new()),
            irq: Mutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Connect the interrupt line. Interrupts are delivered on the thread that caused them,
    /// after the model's internal lock has been released.
    pub fn connect_irq(&self, sink: Arc<dyn IrqSink>) {
        *self.irq.lock().unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }

    fn deliver_irq(&self) {
        let sink = self
            .irq
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(sink) = sink {
            self.state().record(SimEvent::Irq);
            sink.raise();
        }
    }

    pub fn set_retire_policy(&self, policy: RetirePolicy) {
        self.state().policy = policy;
    }

    /// Mark extra stages busy until the next retire or reset.
    pub fn set_busy(&self, stages: PipelineStages) {
        self.state().injected_busy = stages;
    }

    /// Complete every queued draw and clear all busy stages, raising the pipeline interrupt if
    /// it is armed.
    pub fn retire_all(&self) {
        let raise = {
            let mut state = self.state();
            state.retire_queued();
            state.injected_busy = PipelineStages::empty();
            state.latch_pipeline_interrupt();
            state.irq_asserted()
        };
        if raise {
            self.deliver_irq();
        }
    }

    pub fn set_cache_stall(&self, stall: bool) {
        self.state().cache_stall = stall;
    }

    /// Report a full FIFO for the next `reads` reads of `FIFO_SPACE`.
    pub fn stall_fifo_reads(&self, reads: u32) {
        self.state().fifo_stall_reads = reads;
    }

    /// Make subsequent `power_on` calls fail with `message` (`None` restores success).
    pub fn set_power_on_failure(&self, message: Option<&str>) {
        self.state().power_failure = message.map(str::to_owned);
    }

    pub fn enable_trace(&self, enabled: bool) {
        let mut state = self.state();
        state.trace_enabled = enabled;
        state.trace.clear();
    }

    pub fn take_trace(&self) -> Vec<SimEvent> {
        std::mem::take(&mut self.state().trace)
    }

    /// Vertex records fetched by executed draws, in execution order.
    pub fn take_fetched(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.state().fetched)
    }

    pub fn hazards(&self) -> Vec<Hazard> {
        self.state().hazards.clone()
    }

    pub fn queued_draws(&self) -> usize {
        self.state().queued.len()
    }

    pub fn vertex_buffer(&self) -> Vec<u8> {
        self.state().vertex_buffer.clone()
    }

    /// Register value without side effects or tracing.
    pub fn peek(&self, offset: u32) -> u32 {
        let state = self.state();
        match offset {
            mmio::PIPE_STATUS => state.status().bits(),
            mmio::INT_PENDING => state.int_pending,
            _ => state.reg(offset),
        }
    }

    pub fn is_powered(&self) -> bool {
        self.state().powered
    }

    pub fn power_on_count(&self) -> u32 {
        self.state().power_on_count
    }

    pub fn power_off_count(&self) -> u32 {
        self.state().power_off_count
    }

    pub fn reset_count(&self) -> u32 {
        self.state().reset_count
    }

    pub fn cache_flush_count(&self) -> u32 {
        self.state().cache_flush_count
    }
}

impl RegisterWindow for SimGpu {
    fn read_u32(&self, offset: u32) -> u32 {
        self.state().read(offset)
    }

    fn write_u32(&self, offset: u32, value: u32) {
        let raise = self.state().write(offset, value);
        if raise {
            self.deliver_irq();
        }
    }
}

impl PowerDomain for SimGpu {
    fn power_on(&self) -> Result<(), PowerError> {
        let mut state = self.state();
        if let Some(message) = &state.power_failure {
            return Err(PowerError(message.clone()));
        }
        state.powered = true;
        state.power_on_count += 1;
        Ok(())
    }

    /// Gating the domain loses the register file and vertex buffer contents.
    fn power_off(&self) {
        let mut state = self.state();
        state.powered = false;
        state.power_off_count += 1;
        state.regs.clear();
        state.vertex_buffer.fill(0);
    }
}
