use detpost::lowlevel::{diou_nms, nms};
use detpost::{
    BoxXywh, Candidate, CategoryMap, DecodeConfig, Decoder, Engine, HeadView, ImageMeta,
    SuppressConfig, Suppressor,
};
use criterion::{criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;

fn make_candidates(count: usize, seed: u64) -> Vec<Candidate> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let x = rng.random_range(0.0..600.0f32);
            let y = rng.random_range(0.0..400.0f32);
            let w = rng.random_range(8.0..120.0f32);
            let h = rng.random_range(8.0..120.0f32);
            Candidate::new(BoxXywh::new(x, y, w, h), rng.random_range(0.0..1.0f32))
        })
        .collect()
}

fn make_head(batch: usize, grid: usize, anchors: usize, attrs: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = Vec::with_capacity(batch * grid * grid * anchors * attrs);
    for _ in 0..batch * grid * grid * anchors {
        data.push(rng.random_range(0.0..1.0f32));
        data.push(rng.random_range(0.0..1.0f32));
        data.push(rng.random_range(0.02..0.3f32));
        data.push(rng.random_range(0.02..0.3f32));
        data.push(rng.random_range(0.0..1.0f32));
        for _ in 5..attrs {
            // Mostly background, like a trained detector.
            data.push(rng.random_range(0.0..1.0f32).powi(8));
        }
    }
    data
}

fn bench_suppression(c: &mut Criterion) {
    let candidates = make_candidates(2000, 7);

    c.bench_function("nms_2000", |b| {
        b.iter(|| black_box(nms(black_box(&candidates), 0.5)));
    });
    c.bench_function("diou_nms_2000", |b| {
        b.iter(|| black_box(diou_nms(black_box(&candidates), 0.5)));
    });
}

fn bench_decode(c: &mut Criterion) {
    let attrs = 85;
    let small = make_head(4, 20, 3, attrs, 1);
    let large = make_head(4, 40, 3, attrs, 2);
    let heads = [
        HeadView::new(&small, [4, 20, 20, 3, attrs]).unwrap(),
        HeadView::new(&large, [4, 40, 40, 3, attrs]).unwrap(),
    ];
    let metas: Vec<ImageMeta> = (0..4)
        .map(|i| ImageMeta::new(i + 1, 640.0, 480.0))
        .collect();
    let decoder = Decoder::new(CategoryMap::coco80()).with_config(DecodeConfig::default());

    c.bench_function("decode_two_heads_batch4", |b| {
        b.iter(|| black_box(decoder.decode_batch(&heads, &metas).unwrap()));
    });

    c.bench_function("engine_process_batch4", |b| {
        b.iter(|| {
            let mut engine = Engine::new(decoder.clone(), Suppressor::new(SuppressConfig::default()));
            black_box(engine.process(&heads, &metas).unwrap())
        });
    });

    if cfg!(feature = "rayon") {
        c.bench_function("engine_process_batch4_parallel", |b| {
            b.iter(|| {
                let mut engine = Engine::new(decoder.clone(), Suppressor::default())
                    .with_parallel(true);
                black_box(engine.process(&heads, &metas).unwrap())
            });
        });
    }
}

criterion_group!(benches, bench_suppression, bench_decode);
criterion_main!(benches);
