#![cfg(feature = "rayon")]

use detpost::decode::rayon::decode_batch_par;
use detpost::{
    CategoryMap, ConfidencePolicy, DecodeConfig, Decoder, Engine, HeadView, ImageMeta,
    SuppressConfig, SuppressionMode, Suppressor,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const CLASSES: usize = 4;
const ATTRS: usize = 5 + CLASSES;

fn make_head(batch: usize, grid: usize, anchors: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..batch * grid * grid * anchors * ATTRS)
        .map(|i| {
            let v = rng.random_range(0.0..1.0f32);
            if i % ATTRS >= 2 && i % ATTRS < 4 {
                v * 0.3
            } else {
                v
            }
        })
        .collect()
}

fn decoder() -> Decoder {
    Decoder::new(CategoryMap::identity(CLASSES)).with_config(DecodeConfig {
        num_classes: CLASSES,
        ignore_threshold: 0.05,
        policy: ConfidencePolicy::MultiLabel { threshold: 0.3 },
    })
}

#[test]
fn parallel_decode_matches_sequential() {
    let batch = 6;
    let small = make_head(batch, 5, 3, 1);
    let large = make_head(batch, 10, 3, 2);
    let heads = [
        HeadView::new(&small, [batch, 5, 5, 3, ATTRS]).unwrap(),
        HeadView::new(&large, [batch, 10, 10, 3, ATTRS]).unwrap(),
    ];
    let metas: Vec<ImageMeta> = (0..batch as u64)
        .map(|i| ImageMeta::new(i * 10, 320.0 + i as f32, 240.0))
        .collect();

    let seq = decoder().decode_batch(&heads, &metas).unwrap();
    let par = decode_batch_par(&decoder(), &heads, &metas).unwrap();
    assert_eq!(seq, par);
}

#[test]
fn parallel_engine_produces_the_same_store() {
    let batch = 8;
    let data = make_head(batch, 8, 3, 9);
    let heads = [HeadView::new(&data, [batch, 8, 8, 3, ATTRS]).unwrap()];
    let metas: Vec<ImageMeta> = (0..batch as u64)
        .map(|i| ImageMeta::new(i + 1, 416.0, 416.0))
        .collect();

    for mode in [SuppressionMode::Greedy, SuppressionMode::Diou] {
        let suppressor = Suppressor::new(SuppressConfig {
            mode,
            iou_threshold: 0.45,
        });
        let mut seq = Engine::new(decoder(), suppressor.clone());
        let mut par = Engine::new(decoder(), suppressor).with_parallel(true);
        let n_seq = seq.process(&heads, &metas).unwrap();
        let n_par = par.process(&heads, &metas).unwrap();

        assert_eq!(n_seq, n_par);
        assert_eq!(
            seq.aggregator().store().detections(),
            par.aggregator().store().detections()
        );
    }
}
