mod harness;

use harness::{fetched_records, Rig};
use pretty_assertions::assert_eq;
use tilegpu_client::{ClientConfig, Indices, VertexAttribute};
use tilegpu_hw::regs::VertexBufferControl;
use tilegpu_hw::sim::{RetirePolicy, SimEvent};
use tilegpu_hw::{mmio, DataType, PrimitiveType};

#[test]
fn constant_attribute_is_replicated_without_the_optimization() {
    let rig = Rig::ungated(RetirePolicy::Immediate);
    let mut ctx = rig.context_with(ClientConfig {
        constant_stride_optimization: false,
        ..ClientConfig::default()
    });
    let color = [0.1f32, 0.2, 0.3];
    let attrs = [VertexAttribute::new(DataType::Float, 3, 0, bytemuck::cast_slice(&color))];

    ctx.draw_arrays(PrimitiveType::Points, &attrs, 0, 5).unwrap();

    let vb = rig.sim.vertex_buffer();
    let element: &[u8] = bytemuck::cast_slice(&color);
    assert_eq!(&vb[..60], &element.repeat(5)[..]);
    let ctl = VertexBufferControl::from_bits(rig.sim.peek(mmio::vb_ctl(0)));
    assert_eq!(ctl.stride(), 12);
    assert_eq!(rig.sim.take_fetched(), fetched_records(&attrs, [0; 5]));
}

#[test]
fn constant_attribute_is_uploaded_once_with_the_optimization() {
    let rig = Rig::ungated(RetirePolicy::Immediate);
    let mut ctx = rig.context();
    let color = [0.1f32, 0.2, 0.3];
    let attrs = [VertexAttribute::new(DataType::Float, 3, 0, bytemuck::cast_slice(&color))];

    ctx.draw_arrays(PrimitiveType::Points, &attrs, 0, 5).unwrap();

    let vb = rig.sim.vertex_buffer();
    let element: &[u8] = bytemuck::cast_slice(&color);
    assert_eq!(&vb[..12], element);
    assert!(vb[12..60].iter().all(|&b| b == 0));
    let ctl = VertexBufferControl::from_bits(rig.sim.peek(mmio::vb_ctl(0)));
    assert_eq!(ctl.stride(), 0);
    assert_eq!(rig.sim.take_fetched(), fetched_records(&attrs, [0; 5]));
}

#[test]
fn aligned_word_records_land_verbatim() {
    let rig = Rig::ungated(RetirePolicy::Immediate);
    let mut ctx = rig.context();
    let source: Vec<u32> = (100..120).collect();
    let attrs = [VertexAttribute::new(DataType::UInt, 2, 8, bytemuck::cast_slice(&source))];

    ctx.draw_arrays(PrimitiveType::Lines, &attrs, 0, 10).unwrap();

    let vb = rig.sim.vertex_buffer();
    assert_eq!(&vb[..80], bytemuck::cast_slice::<u32, u8>(&source));
}

#[test]
fn indexed_records_are_gathered_in_index_order() {
    let rig = Rig::ungated(RetirePolicy::Immediate);
    let mut ctx = rig.context();
    let source: Vec<u32> = (0..9).collect();
    let attrs = [VertexAttribute::new(DataType::UInt, 3, 12, bytemuck::cast_slice(&source))];

    ctx.draw_elements(PrimitiveType::Triangles, &attrs, Indices::U8(&[2, 0, 1]))
        .unwrap();

    let vb = rig.sim.vertex_buffer();
    let gathered: Vec<u32> = vb[..36]
        .chunks_exact(4)
        .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
        .collect();
    assert_eq!(gathered, vec![6, 7, 8, 0, 1, 2, 3, 4, 5]);
    assert_eq!(rig.sim.take_fetched(), fetched_records(&attrs, [2, 0, 1]));
}

/// Replay the trace, tracking which buffer half each unexecuted draw reads, and report any
/// vertex buffer write into a half that a queued draw still reads.
fn unguarded_writes(trace: &[SimEvent], half_bytes: u32) -> Vec<u32> {
    let mut addr = 0;
    let mut pending: Vec<u32> = Vec::new();
    let mut last_half = None;
    let mut violations = Vec::new();
    for event in trace {
        match *event {
            SimEvent::Write { offset: mmio::VB_ADDR, value } => addr = value,
            SimEvent::Write { offset: mmio::VB_DATA, .. } => {
                let half = addr / half_bytes;
                last_half = Some(half);
                if pending.contains(&half) {
                    violations.push(addr);
                }
                addr += 4;
            }
            SimEvent::DrawQueued { .. } => pending.extend(last_half),
            SimEvent::DrawExecuted { .. } => {
                if !pending.is_empty() {
                    pending.remove(0);
                }
            }
            _ => {}
        }
    }
    violations
}

#[test]
fn forty_vertex_draw_is_double_buffered_safely() {
    let rig = Rig::ungated(RetirePolicy::Deferred);
    let mut ctx = rig.context();
    let source: Vec<f32> = (0..160).map(|i| i as f32).collect();
    let attrs = [VertexAttribute::new(DataType::Float, 4, 16, bytemuck::cast_slice(&source))];

    rig.sim.enable_trace(true);
    ctx.draw_arrays(PrimitiveType::Triangles, &attrs, 0, 40).unwrap();
    let trace = rig.sim.take_trace();

    let queued = trace
        .iter()
        .filter(|e| matches!(e, SimEvent::DrawQueued { .. }))
        .count();
    assert_eq!(queued, 3);
    assert_eq!(unguarded_writes(&trace, 16 * 16), Vec::<u32>::new());
    assert!(rig.sim.hazards().is_empty());

    rig.sim.retire_all();
    assert_eq!(rig.sim.take_fetched(), fetched_records(&attrs, 0..40));
    assert_eq!(ctx.stats().selective_flushes, 1);
}

#[test]
fn unaligned_and_odd_stride_sources_are_repacked() {
    let rig = Rig::ungated(RetirePolicy::Deferred);
    let mut ctx = rig.context();
    // Three shorts every 7 bytes, starting one byte into the buffer.
    let raw: Vec<u8> = (0..7 * 50 + 1).map(|i| (i % 251) as u8).collect();
    let shorts = VertexAttribute::new(DataType::Short, 3, 7, &raw[1..]);
    let bytes = VertexAttribute::new(DataType::UByte, 3, 3, &raw);
    let attrs = [shorts, bytes];

    ctx.draw_arrays(PrimitiveType::Points, &attrs, 5, 45).unwrap();
    assert!(rig.sim.hazards().is_empty());
    rig.sim.retire_all();
    assert_eq!(rig.sim.take_fetched(), fetched_records(&attrs, 5..50));

    let indices: Vec<u16> = (0..34).rev().collect();
    ctx.draw_elements(PrimitiveType::Points, &attrs, Indices::U16(&indices))
        .unwrap();
    assert!(rig.sim.hazards().is_empty());
    rig.sim.retire_all();
    assert_eq!(
        rig.sim.take_fetched(),
        fetched_records(&attrs, indices.iter().map(|&i| u32::from(i)))
    );
}
