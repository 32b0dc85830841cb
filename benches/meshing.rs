use cgmath::Point3;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use voxel_streaming::engine_state::rendering::MeshBuilder;
use voxel_streaming::engine_state::voxels::block::{BlockCatalog, BlockId, AIR};
use voxel_streaming::engine_state::voxels::coords::{BlockIndex, PlanetSize};
use voxel_streaming::engine_state::voxels::world::{GenerationMethod, TerrainGenerator, TerrainPalette};

fn open_air(_: BlockIndex) -> Option<BlockId> {
    Some(AIR)
}

fn bench_meshing(c: &mut Criterion) {
    let catalog = BlockCatalog::builtin();
    let planet = PlanetSize::new(16, 16, 4);
    let palette = TerrainPalette::from_catalog(&catalog);

    // The sea level sits in layer 2, so this chunk holds the surface.
    let surface = Point3::new(0, 0, 2);
    let perlin = TerrainGenerator::new(planet, GenerationMethod::Perlin, palette, 7).generate(surface);
    let checkerboard =
        TerrainGenerator::new(planet, GenerationMethod::Checkerboard, palette, 7).generate(surface);

    let builder = MeshBuilder::new(&catalog);
    c.bench_function("mesh perlin surface", |b| {
        b.iter(|| builder.build(black_box(&perlin), surface, &open_air))
    });
    c.bench_function("mesh checkerboard", |b| {
        b.iter(|| builder.build(black_box(&checkerboard), surface, &open_air))
    });

    let flat = MeshBuilder::new(&catalog).with_ambient_occlusion(false);
    c.bench_function("mesh perlin surface without occlusion", |b| {
        b.iter(|| flat.build(black_box(&perlin), surface, &open_air))
    });
}

fn bench_generation(c: &mut Criterion) {
    let catalog = BlockCatalog::builtin();
    let generator = TerrainGenerator::new(
        PlanetSize::new(16, 16, 4),
        GenerationMethod::Perlin,
        TerrainPalette::from_catalog(&catalog),
        7,
    );
    c.bench_function("generate perlin chunk", |b| {
        b.iter(|| generator.generate(black_box(Point3::new(3, 5, 2))))
    });
}

criterion_group!(benches, bench_meshing, bench_generation);
criterion_main!(benches);
