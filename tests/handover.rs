mod harness;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use harness::{fetched_records, Rig};
use pretty_assertions::assert_eq;
use tilegpu_client::{
    ClientConfig, MatrixKind, ShaderBinary, ShaderStage, VertexAttribute, IDENTITY,
};
use tilegpu_hw::regs::CullControl;
use tilegpu_hw::sim::RetirePolicy;
use tilegpu_hw::{mmio, DataType, PrimitiveType, RegisterWindow};

fn triangle() -> Vec<f32> {
    vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0]
}

#[test]
fn each_context_sees_only_its_own_state() {
    let rig = Rig::ungated(RetirePolicy::Immediate);
    let mut a = rig.context();
    let mut b = rig.context();
    let pos = triangle();
    let attrs = [VertexAttribute::new(DataType::Float, 2, 8, bytemuck::cast_slice(&pos))];

    let mut cull = CullControl::default();
    cull.set_enable(true).set_face(1);
    a.write_register(mmio::CULL_CTL, cull.bits()).unwrap();
    a.write_register(mmio::BLEND_COLOR, 0xaaaa_aaaa).unwrap();
    a.set_viewport(0.0, 0.0, 320.0, 240.0).unwrap();
    b.write_register(mmio::BLEND_COLOR, 0xbbbb_bbbb).unwrap();

    a.draw_arrays(PrimitiveType::Triangles, &attrs, 0, 3).unwrap();
    assert_eq!(rig.sim.peek(mmio::CULL_CTL), cull.bits());
    assert_eq!(rig.sim.peek(mmio::BLEND_COLOR), 0xaaaa_aaaa);

    b.draw_arrays(PrimitiveType::Triangles, &attrs, 0, 3).unwrap();
    assert_eq!(rig.sim.peek(mmio::CULL_CTL), 0, "a's culling must not leak into b");
    assert_eq!(rig.sim.peek(mmio::BLEND_COLOR), 0xbbbb_bbbb);
    assert_eq!(rig.sim.peek(mmio::VIEWPORT_HALF_W), 0);

    a.draw_arrays(PrimitiveType::Triangles, &attrs, 0, 3).unwrap();
    assert_eq!(rig.sim.peek(mmio::CULL_CTL), cull.bits());
    assert_eq!(rig.sim.peek(mmio::VIEWPORT_HALF_W), 160.0f32.to_bits());

    assert_eq!(a.stats().restores, 2);
    assert_eq!(b.stats().restores, 1);
    let stats = rig.arbiter.stats();
    assert_eq!(stats.locks, 3);
    assert_eq!(stats.handovers, 3);
    assert_eq!(rig.sim.take_fetched().len(), 9);
}

#[test]
fn shaders_and_matrices_follow_their_context() {
    let rig = Rig::ungated(RetirePolicy::Immediate);
    let mut a = rig.context_with(ClientConfig {
        fixed_function: true,
        ..ClientConfig::default()
    });
    let mut b = rig.context();
    let pos = triangle();
    let attrs = [VertexAttribute::new(DataType::Float, 2, 8, bytemuck::cast_slice(&pos))];

    let program = ShaderBinary {
        instructions: vec![0x1234_5678; 8],
        ..ShaderBinary::default()
    };
    let mut words = vec![
        u32::from_le_bytes(*b"SBIN"),
        0xffff_0003,
        36,
        0,
        0,
        8,
        0,
        0,
        0,
    ];
    words.extend_from_slice(&program.instructions);
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    a.load_shader(ShaderStage::Pixel, &bytes).unwrap();

    let mut projection = IDENTITY;
    projection[3][2] = -1.0;
    a.set_matrix(MatrixKind::Projection, projection).unwrap();

    let projection_base = mmio::VS_CONST_FLOAT + MatrixKind::Projection.constant_register() * 16;
    a.draw_arrays(PrimitiveType::Triangles, &attrs, 0, 3).unwrap();
    assert_eq!(rig.sim.peek(mmio::PS_INSTMEM + 4), 0x1234_5678);
    assert_eq!(rig.sim.peek(mmio::PS_PC_RANGE), 1 << 16);
    assert_eq!(rig.sim.peek(projection_base + 14 * 4), (-1.0f32).to_bits());

    // Another client clobbers the program memory with its own.
    b.draw_arrays(PrimitiveType::Triangles, &attrs, 0, 3).unwrap();
    b.with_hardware(|ctx| {
        rig.sim.write_u32(mmio::PS_INSTMEM + 4, 0);
        ctx.flush_client_queue()
    })
    .unwrap();

    a.draw_arrays(PrimitiveType::Triangles, &attrs, 0, 3).unwrap();
    assert_eq!(rig.sim.peek(mmio::PS_INSTMEM + 4), 0x1234_5678);
    assert_eq!(rig.sim.peek(projection_base + 14 * 4), (-1.0f32).to_bits());
}

#[test]
fn concurrent_clients_draw_without_interference() {
    let rig = Rig::ungated(RetirePolicy::Immediate);
    let done = Arc::new(AtomicU32::new(0));
    let clients = 4;
    let draws = 10;

    let workers: Vec<_> = (0..clients)
        .map(|n| {
            let mut ctx = rig.context();
            let done = done.clone();
            std::thread::spawn(move || {
                let pos: Vec<f32> = (0..80).map(|i| (n * 100 + i) as f32).collect();
                let attrs =
                    [VertexAttribute::new(DataType::Float, 2, 8, bytemuck::cast_slice(&pos))];
                for _ in 0..draws {
                    ctx.draw_arrays(PrimitiveType::Triangles, &attrs, 0, 40).unwrap();
                    done.fetch_add(1, Ordering::SeqCst);
                }
                ctx.stats()
            })
        })
        .collect();
    let stats: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();

    assert_eq!(done.load(Ordering::SeqCst), clients * draws);
    assert!(stats.iter().all(|s| s.draws == u64::from(draws)));
    assert_eq!(rig.arbiter.holder(), None);
    assert_eq!(rig.arbiter.stats().locks, u64::from(clients * draws));
    assert!(rig.sim.hazards().is_empty());

    // Draws never interleave, so the fetched stream is whole 40-vertex runs of one client.
    let fetched = rig.sim.take_fetched();
    assert_eq!(fetched.len(), (clients * draws * 40) as usize);
    for run in fetched.chunks(40) {
        let first = f32::from_le_bytes([run[0][0], run[0][1], run[0][2], run[0][3]]);
        let n = (first / 100.0) as u32;
        let pos: Vec<f32> = (0..80).map(|i| (n * 100 + i) as f32).collect();
        let attrs = [VertexAttribute::new(DataType::Float, 2, 8, bytemuck::cast_slice(&pos))];
        assert_eq!(run, &fetched_records(&attrs, 0..40)[..]);
    }
}
