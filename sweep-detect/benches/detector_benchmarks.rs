use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::Luma;
use sweep_core::Image;
use sweep_detect::corner_detection::harris_score;
use sweep_detect::{fast, Detector, DetectorKind};

/// Benchmark image with a gradient, mild noise and corner-like structures
fn create_benchmark_image(width: u32, height: u32) -> Image {
    let mut img = Image::from_fn(width, height, |x, y| {
        let gradient = ((x as f32 / width as f32) * 50.0) as u8;
        let noise = ((x + y) % 7) as u8;
        Luma([100 + gradient + noise])
    });

    for i in 0..40u32 {
        let cx = (i * 37 + 11) % width;
        let cy = (i * 53 + 7) % height;
        for dy in 0..9 {
            for dx in 0..9 {
                let (x, y) = (cx + dx, cy + dy);
                if x < width && y < height {
                    img.put_pixel(x, y, Luma([if (dx / 3 + dy / 3) % 2 == 0 { 30 } else { 220 }]));
                }
            }
        }
    }
    img
}

/// Every detector on a KITTI-shaped frame
fn bench_detectors(c: &mut Criterion) {
    let img = create_benchmark_image(621, 188);
    let mut group = c.benchmark_group("detectors");
    group.sample_size(10);

    for kind in DetectorKind::ALL {
        let detector = Detector::new(kind);
        group.bench_with_input(BenchmarkId::from_parameter(kind), &img, |b, img| {
            b.iter(|| black_box(detector.detect(black_box(img))))
        });
    }

    group.finish();
}

fn bench_fast_scores(c: &mut Criterion) {
    let mut group = c.benchmark_group("fast_score_map");

    for &(width, height) in &[(128u32, 128u32), (256, 256), (512, 512)] {
        let img = create_benchmark_image(width, height);
        group.bench_with_input(
            BenchmarkId::new("threshold_10", format!("{}x{}", width, height)),
            &img,
            |b, img| b.iter(|| black_box(fast::score_map(black_box(img), 10))),
        );
    }

    group.finish();
}

fn bench_harris_response(c: &mut Criterion) {
    let img = create_benchmark_image(256, 256);
    let points: Vec<(usize, usize)> = (0..100)
        .map(|i| (50 + (i % 10) * 15, 50 + (i / 10) * 15))
        .collect();

    c.bench_function("harris_score_100_points", |b| {
        b.iter(|| {
            for &(x, y) in black_box(&points) {
                black_box(harris_score(&img, x, y, 7, 0.04));
            }
        })
    });
}

criterion_group!(benches, bench_detectors, bench_fast_scores, bench_harris_response);
criterion_main!(benches);
