use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion, black_box};

use flora::ecotype::{EcotypeDef, GeneratorDef, VisualDef};
use flora::flora::{Flora, FloraConfig};
use flora::render::CpuFloraRenderer;
use flora::terrain::{AutoEcotypes, ProceduralTerrain, TerrainParams};

use glam::{Mat4, Vec2, Vec3};

fn config() -> FloraConfig {
    FloraConfig {
        max_per_frame_block_move: 1000,
        texture_width: 64,
        texture_height: 32,
        ecotypes: vec![
            EcotypeDef::default(),
            EcotypeDef {
                textures: vec!["maps/terrain/grass".into()],
                generator: Some(GeneratorDef::Visual {
                    density: 1.0,
                    texture: "#3c8c32".into(),
                    visuals: vec![
                        VisualDef { mesh: "quad".into(), flex: 1.0, scale_variation: 0.3 },
                        VisualDef { mesh: "cross".into(), flex: 0.5, scale_variation: 0.2 },
                    ],
                }),
            },
        ],
        ..Default::default()
    }
}

/// Manager with every ecotype loaded and the window filled around the origin.
fn settled(terrain: ProceduralTerrain) -> Flora<CpuFloraRenderer> {
    let mut flora = Flora::new(CpuFloraRenderer::new(), Arc::new(terrain), Arc::new(AutoEcotypes));
    flora.init(config()).expect("flora init");
    for _ in 0..4 {
        flora.update(0.016, Vec3::ZERO);
        flora.wait_for_loads();
    }
    flora
}

fn bench_teleport(c: &mut Criterion) {
    let mut flora = settled(ProceduralTerrain::flat("maps/terrain/grass.dds"));

    c.bench_function("flora_teleport_625_blocks", |b| {
        b.iter(|| {
            // Re-seeding drops the last reference, so the ecotype reloads before the refill.
            flora.teleport_camera(black_box(Vec2::ZERO));
            flora.wait_for_loads();
            flora.fill_blocks();
            black_box(flora.pending_count());
        });
    });
}

fn bench_scroll(c: &mut Criterion) {
    let mut flora = settled(ProceduralTerrain::flat("maps/terrain/grass.dds"));

    c.bench_function("flora_scroll_walk", |b| {
        let mut frame = 0u32;
        b.iter(|| {
            frame += 1;
            let t = frame as f32 * 0.05;
            let camera = Vec3::new(t.sin() * 20.0, 0.0, t.cos() * 20.0);
            flora.update(0.016, black_box(camera));
            black_box(flora.stats());
        });
    });
}

fn bench_scroll_noise_terrain(c: &mut Criterion) {
    let mut flora = settled(ProceduralTerrain::new(TerrainParams::default()));

    c.bench_function("flora_scroll_noise_terrain", |b| {
        let mut x = 0.0f32;
        b.iter(|| {
            x += 2.5;
            flora.update(0.016, black_box(Vec3::new(x, 0.0, 0.0)));
            flora.wait_for_loads();
        });
    });
}

fn bench_cull_and_draw(c: &mut Criterion) {
    let mut flora = settled(ProceduralTerrain::flat("maps/terrain/grass.dds"));
    let eye = Vec3::new(0.0, 1.7, 0.0);
    let view_proj = Mat4::perspective_rh(1.2, 16.0 / 9.0, 0.1, 500.0)
        * Mat4::look_at_rh(eye, Vec3::new(10.0, 0.0, -10.0), Vec3::Y);

    c.bench_function("flora_cull_and_draw", |b| {
        b.iter(|| {
            flora.draw(black_box(eye), black_box(&view_proj));
            black_box(flora.stats().draw_calls);
        });
    });
}

criterion_group!(
    benches,
    bench_teleport,
    bench_scroll,
    bench_scroll_noise_terrain,
    bench_cull_and_draw,
);
criterion_main!(benches);
