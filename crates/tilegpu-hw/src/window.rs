use thiserror::Error;

/// Access to the GPU register window.
///
/// Memory-mapped registers are shared by everyone holding a mapping (including the interrupt
/// handler), so every accessor takes `&self`. Implementations must perform each access exactly
/// once and in program order; reads may have side effects.
pub trait RegisterWindow: Send + Sync {
    fn read_u32(&self, offset: u32) -> u32;
    fn write_u32(&self, offset: u32, value: u32);

    fn read_f32(&self, offset: u32) -> f32 {
        f32::from_bits(self.read_u32(offset))
    }

    fn write_f32(&self, offset: u32, value: f32) {
        self.write_u32(offset, value.to_bits());
    }

    /// Write `words` one after another to the same port register (FIFO, vertex buffer data).
    fn write_port(&self, offset: u32, words: &[u32]) {
        for &word in words {
            self.write_u32(offset, word);
        }
    }

    /// Write `words` to consecutive registers starting at `offset`.
    fn write_block(&self, offset: u32, words: &[u32]) {
        for (i, &word) in words.iter().enumerate() {
            self.write_u32(offset + 4 * i as u32, word);
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("power domain error: {0}")]
pub struct PowerError(pub String);

/// Clock/power gate of the GPU block.
pub trait PowerDomain: Send + Sync {
    /// Ungate the clock and power the block. The caller issues the soft reset afterwards.
    fn power_on(&self) -> Result<(), PowerError>;
    fn power_off(&self);
}

/// The GPU interrupt line.
///
/// `raise` is called from interrupt context; implementations must not block on anything a
/// register-window user may hold.
pub trait IrqSink: Send + Sync {
    fn raise(&self);
}
