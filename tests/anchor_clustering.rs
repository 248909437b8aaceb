use detpost::anchors::{read_annotation_file, Anchor};
use detpost::lowlevel::{average_iou, kmeans, shape_iou};
use detpost::{compute_anchors, AnchorSet, BoxSize, DetPostError, KMeansConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_boxes(seed: u64, count: usize) -> Vec<BoxSize> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| BoxSize::new(rng.random_range(4.0..300.0f32), rng.random_range(4.0..300.0f32)))
        .collect()
}

fn median(mut values: Vec<f32>) -> f32 {
    values.sort_by(f32::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        0.5 * (values[mid - 1] + values[mid])
    }
}

fn cfg(clusters: usize, seed: u64) -> KMeansConfig {
    KMeansConfig {
        clusters,
        seed,
        ..KMeansConfig::default()
    }
}

#[test]
fn same_seed_and_input_give_identical_clusters() {
    let boxes = random_boxes(1, 300);
    let a = kmeans(&boxes, &cfg(9, 42)).unwrap();
    let b = kmeans(&boxes, &cfg(9, 42)).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.centers.len(), 9);
    assert_eq!(a.assignments.len(), boxes.len());
}

#[test]
fn converged_centers_are_medians_of_their_members() {
    let boxes = random_boxes(2, 200);
    let clusters = kmeans(&boxes, &cfg(5, 7)).unwrap();
    assert!(clusters.converged);

    for (k, center) in clusters.centers.iter().enumerate() {
        let members: Vec<BoxSize> = boxes
            .iter()
            .zip(&clusters.assignments)
            .filter(|&(_, &a)| a == k)
            .map(|(&b, _)| b)
            .collect();
        if members.is_empty() {
            continue;
        }
        assert_eq!(center.width, median(members.iter().map(|b| b.width).collect()));
        assert_eq!(center.height, median(members.iter().map(|b| b.height).collect()));
    }
}

#[test]
fn every_box_is_assigned_to_its_closest_center() {
    let boxes = random_boxes(3, 150);
    let clusters = kmeans(&boxes, &cfg(6, 0)).unwrap();
    for (b, &assigned) in boxes.iter().zip(&clusters.assignments) {
        let own = shape_iou(*b, clusters.centers[assigned]);
        for c in &clusters.centers {
            assert!(shape_iou(*b, *c) <= own + 1e-6);
        }
    }
}

#[test]
fn one_cluster_per_box_fits_perfectly() {
    let boxes = vec![
        BoxSize::new(10.0, 13.0),
        BoxSize::new(16.0, 30.0),
        BoxSize::new(33.0, 23.0),
        BoxSize::new(116.0, 90.0),
    ];
    let set = compute_anchors(&boxes, &cfg(4, 9)).unwrap();
    assert!((set.mean_iou - 1.0).abs() < 1e-5);
    assert_eq!(
        set.anchors,
        vec![
            Anchor { width: 10, height: 13 },
            Anchor { width: 16, height: 30 },
            Anchor { width: 33, height: 23 },
            Anchor { width: 116, height: 90 },
        ]
    );
    assert_eq!(set.to_string(), "10,13, 16,30, 33,23, 116,90");
}

#[test]
fn anchor_set_reports_fit_of_its_clusters() {
    let boxes = random_boxes(4, 100);
    let clusters = kmeans(&boxes, &cfg(3, 1)).unwrap();
    let set = AnchorSet::from_clusters(&boxes, &clusters).unwrap();
    let expected = average_iou(&boxes, &clusters.centers).unwrap();
    assert_eq!(set.mean_iou, expected);
    assert!(set.mean_iou > 0.0 && set.mean_iou <= 1.0);
    let areas: Vec<u64> = set
        .anchors
        .iter()
        .map(|a| a.width as u64 * a.height as u64)
        .collect();
    assert!(areas.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn invalid_cluster_counts_and_boxes_are_rejected() {
    let boxes = random_boxes(5, 4);
    assert!(matches!(
        kmeans(&boxes, &cfg(0, 0)),
        Err(DetPostError::InvalidParameter { .. })
    ));
    assert!(matches!(
        kmeans(&boxes, &cfg(5, 0)),
        Err(DetPostError::InvalidParameter { .. })
    ));

    let mut degenerate = boxes.clone();
    degenerate[2] = BoxSize::new(0.0, 10.0);
    assert!(matches!(
        kmeans(&degenerate, &cfg(2, 0)),
        Err(DetPostError::DegenerateBox { index: 2 })
    ));
}

#[test]
fn annotation_file_is_read_line_by_line() {
    let path = std::env::temp_dir().join(format!("detpost-anno-{}.txt", std::process::id()));
    std::fs::write(
        &path,
        "0 a.jpg 416 416 0 0 0 100 50 1 10 10 30 50\n\n1 b.jpg 832 416 2 0 0 208 104\n",
    )
    .unwrap();

    let raw = read_annotation_file(&path, None).unwrap();
    assert_eq!(
        raw,
        vec![
            BoxSize::new(100.0, 50.0),
            BoxSize::new(20.0, 40.0),
            BoxSize::new(208.0, 104.0)
        ]
    );
    let scaled = read_annotation_file(&path, Some((416.0, 416.0))).unwrap();
    assert_eq!(scaled[2], BoxSize::new(104.0, 52.0));

    std::fs::write(&path, "0 a.jpg 416 416 0 0 0 100 50\n1 b.jpg oops 416\n").unwrap();
    let err = read_annotation_file(&path, None).unwrap_err();
    assert!(matches!(err, DetPostError::Annotation { line: 2, .. }));

    std::fs::remove_file(&path).ok();
}
