use detpost::aggregate::read_detections;
use detpost::{
    Aggregator, BoxXywh, Candidate, CategoryMap, ConfidencePolicy, DecodeConfig, Decoder,
    DetPostError, Engine, EvalConfig, GroundTruth, HeadView, ImageCandidates, ImageMeta,
    Suppressor,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(tag: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let dir = std::env::temp_dir().join(format!("detpost-{tag}-{}-{nanos}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn cand(x: f32, y: f32, w: f32, h: f32, score: f32) -> Candidate {
    Candidate::new(BoxXywh::new(x, y, w, h), score)
}

#[test]
fn finalize_writes_every_recorded_detection() {
    let dir = temp_dir("roundtrip");
    let mut agg = Aggregator::new();
    agg.record(2, 1, vec![cand(0.0, 0.0, 10.0, 10.0, 0.9)]).unwrap();
    agg.record(1, 3, vec![cand(5.0, 5.0, 20.0, 20.0, 0.8), cand(50.0, 50.0, 4.0, 4.0, 0.4)])
        .unwrap();
    agg.record(1, 1, Vec::new()).unwrap();

    let path = agg.finalize(dir.join("predict.json")).unwrap();
    assert!(agg.is_finalized());
    assert_eq!(agg.output_path(), Some(path.as_path()));

    let written = read_detections(&path).unwrap();
    assert_eq!(written.len(), 3);
    assert_eq!(written, agg.store().detections());
    assert_eq!(
        written
            .iter()
            .map(|d| (d.image_id(), d.category_id()))
            .collect::<Vec<_>>(),
        vec![(1, 3), (1, 3), (2, 1)]
    );
    assert_eq!(written[0].bbox(), BoxXywh::new(5.0, 5.0, 20.0, 20.0));
    assert_eq!(written[0].score(), 0.8);

    std::fs::remove_dir_all(&dir).ok();
}

fn detection_key(d: &detpost::aggregate::Detection) -> (u64, u32, [u32; 5]) {
    let b: [f32; 4] = d.bbox().into();
    (
        d.image_id(),
        d.category_id(),
        [
            b[0].to_bits(),
            b[1].to_bits(),
            b[2].to_bits(),
            b[3].to_bits(),
            d.score().to_bits(),
        ],
    )
}

#[test]
fn random_stores_survive_the_detection_file() {
    let mut rng = StdRng::seed_from_u64(23);
    let dir = temp_dir("random-roundtrip");
    for round in 0..20 {
        let mut agg = Aggregator::new();
        let mut expected = Vec::new();
        let images = rng.random_range(1..30u64);
        for image_id in 0..images {
            for category_id in 1..=rng.random_range(1..8u32) {
                let count = rng.random_range(0..6usize);
                // Quarter-pixel boxes and 1/1024 scores are exact in JSON.
                let kept: Vec<Candidate> = (0..count)
                    .map(|_| {
                        cand(
                            rng.random_range(0..2000u32) as f32 / 4.0,
                            rng.random_range(0..2000u32) as f32 / 4.0,
                            rng.random_range(1..800u32) as f32 / 4.0,
                            rng.random_range(1..800u32) as f32 / 4.0,
                            rng.random_range(1..1024u32) as f32 / 1024.0,
                        )
                    })
                    .collect();
                expected.extend(kept.iter().map(|c| {
                    detpost::aggregate::Detection::new(image_id, category_id, c.bbox, c.score)
                }));
                agg.record(image_id, category_id, kept).unwrap();
            }
        }

        let path = agg.finalize(dir.join(format!("predict-{round}.json"))).unwrap();
        let mut written: Vec<_> = read_detections(&path).unwrap().iter().map(detection_key).collect();
        let mut expected: Vec<_> = expected.iter().map(detection_key).collect();
        written.sort_unstable();
        expected.sort_unstable();
        assert_eq!(written, expected, "round {round}");
    }
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn non_finite_detections_are_not_written() {
    let dir = temp_dir("non-finite");
    let mut agg = Aggregator::new();
    agg.record(
        1,
        1,
        vec![
            cand(0.0, 0.0, f32::NAN, 1.0, 0.9),
            cand(0.0, 0.0, 4.0, 4.0, f32::INFINITY),
            cand(1.0, 1.0, 4.0, 4.0, 0.5),
        ],
    )
    .unwrap();
    assert_eq!(agg.store().num_detections(), 1);

    let path = agg.finalize(dir.join("predict.json")).unwrap();
    let written = read_detections(&path).unwrap();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].bbox(), BoxXywh::new(1.0, 1.0, 4.0, 4.0));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn store_is_read_only_after_finalize() {
    let dir = temp_dir("readonly");
    let mut agg = Aggregator::new();
    agg.record(1, 1, vec![cand(0.0, 0.0, 1.0, 1.0, 0.5)]).unwrap();
    agg.finalize(dir.join("predict.json")).unwrap();

    let err = agg.record(1, 1, vec![cand(0.0, 0.0, 1.0, 1.0, 0.5)]).unwrap_err();
    assert!(matches!(err, DetPostError::AlreadyFinalized));
    let err = agg.finalize(dir.join("again.json")).unwrap_err();
    assert!(matches!(err, DetPostError::AlreadyFinalized));
    assert_eq!(agg.store().num_detections(), 1);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn unwritable_output_path_is_an_io_error() {
    let dir = temp_dir("unwritable");
    let mut agg = Aggregator::new();
    agg.record(1, 1, vec![cand(0.0, 0.0, 1.0, 1.0, 0.5)]).unwrap();

    let err = agg
        .finalize(dir.join("missing").join("predict.json"))
        .unwrap_err();
    assert!(matches!(err, DetPostError::Io { .. }));
    assert!(!agg.is_finalized());

    agg.finalize(dir.join("predict.json")).unwrap();
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn evaluate_requires_a_written_file() {
    let gt = GroundTruth::from_json_str(r#"{"images": [{"id": 1, "width": 10, "height": 10}]}"#)
        .unwrap();
    let err = Aggregator::new()
        .evaluate(&gt, &EvalConfig::default())
        .unwrap_err();
    assert!(matches!(err, DetPostError::NotFinalized));
}

#[test]
fn suppress_and_record_keeps_one_box_per_cluster() {
    let mut image = ImageCandidates::new(9);
    image.push(4, cand(10.0, 10.0, 40.0, 40.0, 0.9));
    image.push(4, cand(11.0, 10.0, 40.0, 40.0, 0.7));
    image.push(4, cand(200.0, 200.0, 40.0, 40.0, 0.6));

    let mut agg = Aggregator::new();
    agg.suppress_and_record(&image, &Suppressor::default()).unwrap();
    let kept = agg.store().get(9, 4);
    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].score, 0.9);
    assert_eq!(kept[1].score, 0.6);
    assert!(agg.store().get(9, 5).is_empty());
}

#[test]
fn engine_runs_decode_suppress_record_and_evaluate() {
    // Two near-identical anchors of class 0 and one of class 1.
    let rows: [[f32; 7]; 3] = [
        [0.5, 0.5, 0.5, 0.5, 0.9, 0.95, 0.05],
        [0.505, 0.5, 0.5, 0.5, 0.8, 0.95, 0.05],
        [0.2, 0.2, 0.2, 0.2, 0.9, 0.05, 0.95],
    ];
    let data: Vec<f32> = rows.iter().flatten().copied().collect();
    let head = HeadView::new(&data, [1, 1, 1, 3, 7]).unwrap();
    let decoder = Decoder::new(CategoryMap::new(vec![1, 2]).unwrap()).with_config(DecodeConfig {
        num_classes: 2,
        ignore_threshold: 0.001,
        policy: ConfidencePolicy::SingleLabel,
    });
    let mut engine = Engine::new(decoder, Suppressor::default());
    let recorded = engine
        .process(&[head], &[ImageMeta::new(1, 200.0, 100.0)])
        .unwrap();
    assert_eq!(recorded, 2);

    let dir = temp_dir("engine");
    engine.finalize(dir.join("predict.json")).unwrap();

    let gt = GroundTruth::from_json_str(
        r#"{
            "images": [{"id": 1, "width": 200, "height": 100}],
            "annotations": [
                {"id": 1, "image_id": 1, "category_id": 1, "bbox": [50, 25, 100, 50], "iscrowd": 0},
                {"id": 2, "image_id": 1, "category_id": 2, "bbox": [20, 10, 40, 20], "iscrowd": 0}
            ],
            "categories": [{"id": 1, "name": "a"}, {"id": 2, "name": "b"}]
        }"#,
    )
    .unwrap();
    let summary = engine.evaluate(&gt, &EvalConfig::default()).unwrap();
    assert!((summary.ap - 1.0).abs() < 1e-9, "{summary}");
    assert_eq!(summary.num_detections, 2);

    let err = engine
        .process(&[head], &[ImageMeta::new(2, 200.0, 100.0)])
        .unwrap_err();
    assert!(matches!(err, DetPostError::AlreadyFinalized));

    std::fs::remove_dir_all(&dir).ok();
}
