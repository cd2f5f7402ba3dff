use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tilegpu_arbiter::{ArbiterConfig, ArbiterError, ErrorClass, GpuArbiter};
use tilegpu_client::{
    ClientConfig, ClientError, DeviceContext, Indices, VertexAttribute, VertexError,
};
use tilegpu_hw::regs::AttributeControl;
use tilegpu_hw::sim::{RetirePolicy, SimGpu};
use tilegpu_hw::{mmio, DataType, PrimitiveType};

fn setup(policy: RetirePolicy) -> (Arc<SimGpu>, DeviceContext) {
    let sim = Arc::new(SimGpu::new());
    sim.set_retire_policy(policy);
    let config = ArbiterConfig {
        power_gating: false,
        flush_timeout_ms: 5_000,
        ..ArbiterConfig::default()
    };
    let arbiter = GpuArbiter::open(sim.clone(), sim.clone(), config).unwrap();
    sim.connect_irq(arbiter.irq_handler());
    let ctx = DeviceContext::open(arbiter, ClientConfig::default()).unwrap();
    (sim, ctx)
}

fn positions(count: usize) -> Vec<f32> {
    (0..count * 2).map(|i| i as f32 * 0.5).collect()
}

fn colors(count: usize) -> Vec<u8> {
    (0..count * 4).map(|i| (i * 7) as u8).collect()
}

/// Per-vertex records as the hardware fetches them: each attribute's element, in slot order.
fn expected(attrs: &[VertexAttribute<'_>], vertices: impl IntoIterator<Item = u32>) -> Vec<Vec<u8>> {
    vertices
        .into_iter()
        .map(|v| {
            attrs
                .iter()
                .flat_map(|a| {
                    let start = v as usize * a.stride;
                    a.data[start..start + a.element_bytes()].to_vec()
                })
                .collect()
        })
        .collect()
}

#[test]
fn fifo_draw_delivers_every_vertex_in_order() {
    let (sim, mut ctx) = setup(RetirePolicy::Immediate);
    let pos = positions(6);
    let col = colors(6);
    let attrs = [
        VertexAttribute::new(DataType::Float, 2, 8, bytemuck::cast_slice(&pos)),
        VertexAttribute::new(DataType::UByte, 3, 4, &col),
    ];

    ctx.draw_arrays_unbuffered(PrimitiveType::Triangles, &attrs, 1, 3)
        .unwrap();
    assert_eq!(sim.take_fetched(), expected(&attrs, 1..4));

    ctx.draw_elements_unbuffered(PrimitiveType::Points, &attrs, Indices::U8(&[5, 0, 5]))
        .unwrap();
    assert_eq!(sim.take_fetched(), expected(&attrs, [5, 0, 5]));
    assert_eq!(ctx.stats().draws, 2);
}

#[test]
fn only_the_highest_slot_is_flagged_last() {
    let (sim, mut ctx) = setup(RetirePolicy::Immediate);
    let pos = positions(4);
    let col = colors(4);
    let attrs = [
        VertexAttribute::new(DataType::Float, 2, 8, bytemuck::cast_slice(&pos)),
        VertexAttribute::new(DataType::UByte, 4, 4, &col),
    ];
    ctx.draw_arrays(PrimitiveType::Lines, &attrs, 0, 4).unwrap();

    assert!(!AttributeControl::from_bits(sim.peek(mmio::attr_ctl(0))).last());
    assert!(AttributeControl::from_bits(sim.peek(mmio::attr_ctl(1))).last());
    assert_eq!(sim.peek(mmio::VERTEX_CTX) & 0xf, PrimitiveType::Lines as u32);
}

#[test]
fn small_buffered_draw_is_one_auto_increment_batch() {
    let (sim, mut ctx) = setup(RetirePolicy::Immediate);
    let pos = positions(32);
    let attrs = [VertexAttribute::new(DataType::Float, 2, 8, bytemuck::cast_slice(&pos))];

    ctx.draw_arrays(PrimitiveType::TriangleStrip, &attrs, 0, 32).unwrap();
    assert_eq!(sim.take_fetched(), expected(&attrs, 0..32));

    let stats = ctx.stats();
    assert_eq!(stats.batches, 1);
    assert_eq!(stats.selective_flushes, 0);
}

#[test]
fn double_buffered_draw_never_overwrites_a_half_in_use() {
    let (sim, mut ctx) = setup(RetirePolicy::Deferred);
    let pos = positions(40);
    let color = [1.0f32, 0.5, 0.25, 1.0];
    let attrs = [
        VertexAttribute::new(DataType::Float, 2, 8, bytemuck::cast_slice(&pos)),
        VertexAttribute::new(DataType::Float, 4, 0, bytemuck::cast_slice(&color)),
    ];

    ctx.draw_arrays(PrimitiveType::Triangles, &attrs, 0, 40).unwrap();
    assert!(sim.hazards().is_empty(), "{:?}", sim.hazards());

    sim.retire_all();
    assert_eq!(sim.take_fetched(), expected(&attrs, 0..40));

    let stats = ctx.stats();
    assert_eq!(stats.batches, 3);
    assert_eq!(stats.selective_flushes, 1);
}

#[test]
fn indexed_buffered_draw_gathers_records() {
    let (sim, mut ctx) = setup(RetirePolicy::Deferred);
    let records: Vec<u32> = (0..3 * 50).collect();
    let attrs = [VertexAttribute::new(DataType::UInt, 3, 12, bytemuck::cast_slice(&records))];
    let indices: Vec<u16> = (0..40).map(|i| (i * 13 % 50) as u16).collect();

    ctx.draw_elements(PrimitiveType::Triangles, &attrs, Indices::U16(&indices))
        .unwrap();
    assert!(sim.hazards().is_empty(), "{:?}", sim.hazards());
    sim.retire_all();
    assert_eq!(
        sim.take_fetched(),
        expected(&attrs, indices.iter().map(|&i| u32::from(i)))
    );
}

#[test]
fn next_draw_waits_for_the_previous_one_to_leave_the_buffer() {
    let (sim, mut ctx) = setup(RetirePolicy::Deferred);
    let first = positions(8);
    let second: Vec<f32> = first.iter().map(|v| -v).collect();
    let a = [VertexAttribute::new(DataType::Float, 2, 8, bytemuck::cast_slice(&first))];
    let b = [VertexAttribute::new(DataType::Float, 2, 8, bytemuck::cast_slice(&second))];

    ctx.draw_arrays(PrimitiveType::Points, &a, 0, 8).unwrap();
    assert_eq!(sim.queued_draws(), 1);
    ctx.draw_arrays(PrimitiveType::Points, &b, 0, 8).unwrap();
    assert!(sim.hazards().is_empty(), "{:?}", sim.hazards());
    assert_eq!(ctx.stats().selective_flushes, 1);

    sim.retire_all();
    let mut want = expected(&a, 0..8);
    want.extend(expected(&b, 0..8));
    assert_eq!(sim.take_fetched(), want);
}

#[test]
fn full_fifo_stalls_are_counted() {
    let (sim, mut ctx) = setup(RetirePolicy::Immediate);
    let pos = positions(2);
    let attrs = [VertexAttribute::new(DataType::Float, 2, 8, bytemuck::cast_slice(&pos))];

    sim.stall_fifo_reads(2);
    ctx.draw_arrays_unbuffered(PrimitiveType::Lines, &attrs, 0, 2)
        .unwrap();
    assert_eq!(ctx.stats().fifo_stalls, 2);
    assert_eq!(sim.take_fetched(), expected(&attrs, 0..2));
}

#[test]
fn invalid_draws_fail_before_taking_the_gpu() {
    let (sim, mut ctx) = setup(RetirePolicy::Immediate);
    let pos = positions(4);
    let attr = VertexAttribute::new(DataType::Float, 2, 8, bytemuck::cast_slice(&pos));
    sim.enable_trace(true);

    assert_eq!(
        ctx.draw_arrays(PrimitiveType::Points, &[], 0, 1),
        Err(ClientError::Vertex(VertexError::NoAttributes))
    );
    assert_eq!(
        ctx.draw_arrays(PrimitiveType::Points, &[attr; 9], 0, 1),
        Err(ClientError::Vertex(VertexError::TooManyAttributes(9)))
    );
    assert_eq!(
        ctx.draw_arrays(PrimitiveType::Points, &[attr], 0, 0),
        Err(ClientError::Vertex(VertexError::EmptyDraw))
    );
    assert_eq!(
        ctx.draw_elements(PrimitiveType::Points, &[attr], Indices::U8(&[0, 4])),
        Err(ClientError::Vertex(VertexError::OutOfBounds {
            slot: 0,
            index: 4,
            len: 32
        }))
    );
    let err = ctx
        .draw_arrays(PrimitiveType::Points, &[attr], u32::MAX, 2)
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::ProgrammingError);

    assert!(sim.take_trace().is_empty());
    assert_eq!(ctx.stats().draws, 0);
}

#[test]
fn power_failure_surfaces_through_the_draw() {
    let sim = Arc::new(SimGpu::new());
    let config = ArbiterConfig {
        power_gating: true,
        idle_timeout_ms: 60_000,
        ..ArbiterConfig::default()
    };
    let arbiter = GpuArbiter::open(sim.clone(), sim.clone(), config).unwrap();
    sim.connect_irq(arbiter.irq_handler());
    let mut ctx = DeviceContext::open(arbiter.clone(), ClientConfig::default()).unwrap();
    sim.set_power_on_failure(Some("rail fault"));

    let pos = positions(1);
    let attrs = [VertexAttribute::new(DataType::Float, 2, 8, bytemuck::cast_slice(&pos))];
    let err = ctx
        .draw_arrays(PrimitiveType::Points, &attrs, 0, 1)
        .unwrap_err();
    assert!(matches!(err, ClientError::Arbiter(ArbiterError::PowerUp(_))));
    assert_eq!(err.class(), ErrorClass::Fatal);
    assert_eq!(arbiter.holder(), None);
    assert!(!ctx.is_held());

    sim.set_power_on_failure(None);
    ctx.draw_arrays(PrimitiveType::Points, &attrs, 0, 1).unwrap();
    assert!(sim.is_powered());
    assert_eq!(arbiter.config().idle_timeout(), Duration::from_secs(60));
}
