//! Walk a camera across procedural terrain and report flora streaming stats.
//!
//! Usage: cargo run --release --bin flora_walk -- [OPTIONS]
//!
//! Options:
//!   --config <PATH>    Flora config JSON (default: built-in grass and snow tufts)
//!   --frames <N>       Frames to simulate (default: 600)
//!   --speed <M/S>      Camera speed in meters per second (default: 6.0)
//!   --seed <SEED>      Terrain seed (default: 12345)
//!   --density <LABEL>  Density option, e.g. HIGH or LOW (default: first option)
//!   --jump-every <N>   Jump 500 m every N frames to force a re-seed (default: never)

use std::sync::Arc;
use std::time::Instant;

use glam::{Mat4, Vec3};

use flora::ecotype::{ChoiceDef, EcotypeDef, FunctionDef, GeneratorDef, VisualDef};
use flora::flora::{Flora, FloraConfig};
use flora::math::Aabb;
use flora::render::CpuFloraRenderer;
use flora::terrain::{AutoEcotypes, ProceduralTerrain, TerrainParams};

const FRAME_TIME: f32 = 1.0 / 60.0;

fn main() {
    flora::core::logging::init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return;
    }

    let frames = parse_usize_arg(&args, "--frames").unwrap_or(600);
    let speed = parse_f32_arg(&args, "--speed").unwrap_or(6.0);
    let seed = parse_u32_arg(&args, "--seed").unwrap_or(12345);
    let jump_every = parse_usize_arg(&args, "--jump-every");

    let config = match parse_str_arg(&args, "--config") {
        Some(path) => FloraConfig::load(&path).expect("Failed to load flora config"),
        None => default_config(),
    };

    let terrain = Arc::new(ProceduralTerrain::new(TerrainParams { seed, ..Default::default() }));
    let mut flora = Flora::new(CpuFloraRenderer::new(), terrain.clone(), Arc::new(AutoEcotypes));
    flora.init(config).expect("Failed to initialise flora");
    if let Some(label) = parse_str_arg(&args, "--density") {
        flora.set_density_option(&label).expect("Unknown density option");
    }

    println!("=== Flora Walk ===");
    println!("Frames:  {}", frames);
    println!("Speed:   {} m/s", speed);
    println!("Seed:    {}", seed);
    println!("Buffer:  {} KB, {} vertices per block", flora.vb_size() / 1024, flora.vertices_per_block());
    println!();

    let proj = Mat4::perspective_rh(70f32.to_radians(), 16.0 / 9.0, 0.1, 500.0);
    let heading = Vec3::new(0.8, 0.0, -0.6).normalize();
    let mut position = Vec3::ZERO;
    let mut total_fills = 0;
    let mut total_draws = 0;
    let start = Instant::now();

    for frame in 0..frames {
        position += heading * speed * FRAME_TIME;
        if jump_every.is_some_and(|n| n > 0 && frame > 0 && frame % n == 0) {
            position.x += 500.0;
        }
        let eye = Vec3::new(position.x, terrain.world_height_at(position.x, position.z) + 1.7, position.z);

        flora.update(FRAME_TIME, eye);
        let view = Mat4::look_at_rh(eye, eye + heading, Vec3::Y);
        flora.draw(eye, &(proj * view));
        flora.draw_shadows(&Aabb::from_center_half_extent(eye, Vec3::new(20.0, 50.0, 20.0)));

        let stats = flora.stats();
        total_fills += stats.fills;
        total_draws += stats.draw_calls;
        if frame % 60 == 0 {
            println!(
                "[frame {:>5}] pos ({:>8.1}, {:>8.1})  fills {:>3}  pending {:>3}  draws {:>3}  tris {:>6}  ecotypes {:>2}",
                frame,
                eye.x,
                eye.z,
                stats.fills,
                stats.pending_blocks,
                stats.draw_calls,
                stats.triangles,
                flora.table().live_count(),
            );
        }
    }

    let elapsed = start.elapsed();
    println!();
    println!("=== Summary ===");
    println!("Time:          {:.2?} ({:.1} us/frame)", elapsed, elapsed.as_secs_f64() * 1e6 / frames.max(1) as f64);
    println!("Blocks filled: {}", total_fills);
    println!("Draw calls:    {}", total_draws);
    println!("Atlas copies:  {}", flora.table().atlas().copy_count());
    println!("Atlas uploads: {}", flora.renderer().atlas_uploads());
}

/// Grass on the grass band, patches of frosted tufts on snow.
fn default_config() -> FloraConfig {
    let quad = |scale_variation| VisualDef { mesh: "quad".into(), flex: 1.0, scale_variation };
    FloraConfig {
        ecotypes: vec![
            EcotypeDef::default(),
            EcotypeDef {
                textures: vec!["maps/terrain/grass".into()],
                generator: Some(GeneratorDef::Visual {
                    density: 1.0,
                    texture: "#3c8c32".into(),
                    visuals: vec![quad(0.3), quad(0.1)],
                }),
            },
            EcotypeDef {
                textures: vec!["maps/terrain/snow".into()],
                generator: Some(GeneratorDef::ChooseMax {
                    choices: vec![
                        ChoiceDef {
                            generator: GeneratorDef::Visual {
                                density: 0.5,
                                texture: "#d0d0e8".into(),
                                visuals: vec![quad(0.2)],
                            },
                            function: FunctionDef::Noise { frequency: 20.0 },
                        },
                        ChoiceDef { generator: GeneratorDef::Empty, function: FunctionDef::Fixed { value: 0.4 } },
                    ],
                }),
            },
        ],
        ..Default::default()
    }
}

fn print_help() {
    println!("flora_walk - stream flora around a camera walking over procedural terrain");
    println!();
    println!("Options:");
    println!("  --config <PATH>    Flora config JSON");
    println!("  --frames <N>       Frames to simulate (default: 600)");
    println!("  --speed <M/S>      Camera speed (default: 6.0)");
    println!("  --seed <SEED>      Terrain seed (default: 12345)");
    println!("  --density <LABEL>  Density option (default: first option)");
    println!("  --jump-every <N>   Jump 500 m every N frames");
}

fn parse_f32_arg(args: &[String], flag: &str) -> Option<f32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_u32_arg(args: &[String], flag: &str) -> Option<u32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_usize_arg(args: &[String], flag: &str) -> Option<usize> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
