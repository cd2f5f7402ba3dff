use serde::{Deserialize, Serialize};

/// How the immediate-mode writer waits for FIFO space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FifoWaitPolicy {
    /// Spin on the free-slot register.
    BusyPoll,
    /// Yield the thread between polls.
    #[default]
    Yield,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub fifo_wait: FifoWaitPolicy,
    /// Upload zero-stride attributes once per draw and let the hardware re-read them.
    pub constant_stride_optimization: bool,
    /// Enable the fixed-function matrix state.
    pub fixed_function: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            fifo_wait: FifoWaitPolicy::Yield,
            constant_stride_optimization: true,
            fixed_function: false,
        }
    }
}
