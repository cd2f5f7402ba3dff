#![allow(dead_code)]

use std::sync::{Arc, Once};

use tilegpu_arbiter::{ArbiterConfig, GpuArbiter};
use tilegpu_client::{ClientConfig, DeviceContext, VertexAttribute};
use tilegpu_hw::sim::{RetirePolicy, SimGpu};

static TRACING: Once = Once::new();

/// Route `tracing` output through the test harness so it only shows for failing tests.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

pub struct Rig {
    pub sim: Arc<SimGpu>,
    pub arbiter: Arc<GpuArbiter>,
}

impl Rig {
    pub fn new(policy: RetirePolicy, config: ArbiterConfig) -> Self {
        init_tracing();
        let sim = Arc::new(SimGpu::new());
        sim.set_retire_policy(policy);
        let arbiter = GpuArbiter::open(sim.clone(), sim.clone(), config).unwrap();
        sim.connect_irq(arbiter.irq_handler());
        Self { sim, arbiter }
    }

    /// Always-on device with a generous flush timeout.
    pub fn ungated(policy: RetirePolicy) -> Self {
        Self::new(
            policy,
            ArbiterConfig {
                power_gating: false,
                flush_timeout_ms: 5_000,
                ..ArbiterConfig::default()
            },
        )
    }

    pub fn context(&self) -> DeviceContext {
        self.context_with(ClientConfig::default())
    }

    pub fn context_with(&self, config: ClientConfig) -> DeviceContext {
        DeviceContext::open(self.arbiter.clone(), config).unwrap()
    }
}

/// Per-vertex records as fetched by the device: each attribute's element, in slot order.
pub fn fetched_records(
    attrs: &[VertexAttribute<'_>],
    vertices: impl IntoIterator<Item = u32>,
) -> Vec<Vec<u8>> {
    vertices
        .into_iter()
        .map(|v| {
            attrs
                .iter()
                .flat_map(|a| {
                    let start = v as usize * a.stride;
                    a.data[start..start + a.element_bytes()].iter().copied()
                })
                .collect()
        })
        .collect()
}
