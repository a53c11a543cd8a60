// benches/fbp_benchmarks.rs -- CPU reference benchmarks.
//
//   cargo bench --bench fbp_benchmarks
//
// Kernel generation is measured on its own because it runs once per
// reconstruction; filtering and back-projection dominate everything else.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

use tomo_fbp::backproject::backproject;
use tomo_fbp::filter::{FilterSpec, FilterType};
use tomo_fbp::filtering::filter_sinogram;
use tomo_fbp::geometry::{ParallelGeometry, ProjectionGeometry, VolumeGeometry};
use tomo_fbp::kernel::{self, generate, ideal_fourier_width, ideal_real_width};
use tomo_fbp::pipeline::reconstruct_reference;
use tomo_fbp::{Sinogram, Volume};

// ============================================================
// Helpers
// ============================================================

/// Parallel-beam sinogram of an off-centre disk.
fn make_sinogram(n: usize, m: usize) -> Sinogram {
    let geometry = ParallelGeometry::uniform(n, m);
    let angles = geometry.angles.clone();
    let r = n as f32 / 4.0;
    Sinogram::from_fn(Arc::new(geometry), |a, d| {
        let (sin, cos) = angles[a].sin_cos();
        let s = d as f32 + 0.5 - 0.5 * n as f32 - 0.1 * r * (cos + sin);
        2.0 * (r * r - s * s).max(0.0).sqrt()
    })
}

// ============================================================
// Benchmarks
// ============================================================

fn bench_kernel_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("kernel");
    for n in [256usize, 1024] {
        let (real, bins) = (ideal_real_width(n), ideal_fourier_width(n));
        for family in [FilterType::RamLak, FilterType::Hamming, FilterType::Kaiser] {
            group.bench_with_input(BenchmarkId::new(family.token(), n), &n, |b, _| {
                b.iter(|| generate(family, 1.0, 1, real, bins, None).unwrap());
            });
        }
    }
    group.finish();
}

fn bench_filtering(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_sinogram");
    for (n, m) in [(256usize, 180usize), (512, 360)] {
        let sino = make_sinogram(n, m);
        let geometry = sino.geometry().to_vectors();
        let spec = FilterSpec::new(FilterType::SheppLogan);
        let plan = kernel::plan(&spec, n, m).unwrap();
        let k = kernel::build(&spec, &plan).unwrap();
        group.bench_function(format!("{n}x{m}"), |b| {
            b.iter(|| filter_sinogram(sino.as_slice(), &geometry, k.as_ref()));
        });
    }
    group.finish();
}

fn bench_backprojection(c: &mut Criterion) {
    let mut group = c.benchmark_group("backproject");
    group.sample_size(10);
    let sino = make_sinogram(256, 180);
    let geometry = sino.geometry().to_vectors();
    let volume = VolumeGeometry::new(256, 256);
    for s in [1u32, 2] {
        group.bench_with_input(BenchmarkId::new("256x256", s), &s, |b, &s| {
            b.iter(|| backproject(sino.as_slice(), &geometry, &volume, s));
        });
    }
    group.finish();
}

fn bench_full_reconstruction(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconstruct_reference");
    group.sample_size(10);
    let sino = make_sinogram(256, 180);
    let mut vol = Volume::zeros(VolumeGeometry::new(256, 256));
    group.bench_function("ram-lak_256x180", |b| {
        b.iter(|| reconstruct_reference(&FilterSpec::default(), 1, &sino, &mut vol).unwrap());
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_kernel_generation,
    bench_filtering,
    bench_backprojection,
    bench_full_reconstruction
);
criterion_main!(benches);
