use clap::{Parser, Subcommand};
use detpost::anchors::read_annotation_file;
use detpost::io::image_meta;
use detpost::{
    compute_anchors, CategoryMap, ConfidencePolicy, DecodeConfig, Decoder, Engine, EvalConfig,
    GroundTruth, HeadTensor, ImageMeta, KMeansConfig, SuppressConfig, SuppressionMode, Suppressor,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SCHEMA_JSON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.schema.json"));
const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "detpost CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json", global = true)]
    config: PathBuf,
    /// Print the JSON schema and exit.
    #[arg(long)]
    print_schema: bool,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output.
    #[arg(long, global = true)]
    trace: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode raw head dumps, suppress, write the detection file and score it.
    Eval,
    /// Cluster annotation boxes into anchor sizes.
    Anchors,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum PolicyConfig {
    SingleLabel,
    MultiLabel,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ModeConfig {
    Greedy,
    Diou,
}

impl From<ModeConfig> for SuppressionMode {
    fn from(value: ModeConfig) -> Self {
        match value {
            ModeConfig::Greedy => SuppressionMode::Greedy,
            ModeConfig::Diou => SuppressionMode::Diou,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct DecodeConfigJson {
    num_classes: usize,
    ignore_threshold: f32,
    policy: PolicyConfig,
    multi_label_threshold: f32,
    /// External category ids in class order; defaults to the COCO 80→91 table.
    categories: Option<Vec<u32>>,
}

impl Default for DecodeConfigJson {
    fn default() -> Self {
        let cfg = DecodeConfig::default();
        let multi_label_threshold = match cfg.policy {
            ConfidencePolicy::MultiLabel { threshold } => threshold,
            ConfidencePolicy::SingleLabel => 0.1,
        };
        Self {
            num_classes: cfg.num_classes,
            ignore_threshold: cfg.ignore_threshold,
            policy: PolicyConfig::MultiLabel,
            multi_label_threshold,
            categories: None,
        }
    }
}

impl DecodeConfigJson {
    fn to_config(&self) -> DecodeConfig {
        let policy = match self.policy {
            PolicyConfig::SingleLabel => ConfidencePolicy::SingleLabel,
            PolicyConfig::MultiLabel => ConfidencePolicy::MultiLabel {
                threshold: self.multi_label_threshold,
            },
        };
        DecodeConfig {
            num_classes: self.num_classes,
            ignore_threshold: self.ignore_threshold,
            policy,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SuppressConfigJson {
    mode: ModeConfig,
    iou_threshold: f32,
}

impl Default for SuppressConfigJson {
    fn default() -> Self {
        Self {
            mode: ModeConfig::Greedy,
            iou_threshold: SuppressConfig::default().iou_threshold,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct EvalJson {
    ann_file: String,
    result_dir: String,
    dataset_dir: Option<String>,
    output_dir: String,
    /// Per-image head shapes `[grid_y, grid_x, anchors, attrs]`.
    heads: Vec<[usize; 4]>,
    batch_size: usize,
    parallel: bool,
    decode: DecodeConfigJson,
    suppress: SuppressConfigJson,
}

impl Default for EvalJson {
    fn default() -> Self {
        Self {
            ann_file: String::new(),
            result_dir: String::new(),
            dataset_dir: None,
            output_dir: "outputs".into(),
            heads: vec![[20, 20, 3, 85], [40, 40, 3, 85]],
            batch_size: 16,
            parallel: false,
            decode: DecodeConfigJson::default(),
            suppress: SuppressConfigJson::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct AnchorsJson {
    annotation_file: String,
    clusters: usize,
    seed: u64,
    max_iterations: usize,
    target_size: Option<[f32; 2]>,
}

impl Default for AnchorsJson {
    fn default() -> Self {
        let cfg = KMeansConfig::default();
        Self {
            annotation_file: String::new(),
            clusters: cfg.clusters,
            seed: cfg.seed,
            max_iterations: cfg.max_iterations,
            target_size: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Config {
    eval: EvalJson,
    anchors: AnchorsJson,
}

#[derive(Debug, Serialize)]
struct AnchorsOutput {
    anchors: String,
    mean_iou: f32,
    boxes: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive("detpost=info".parse()?))
            .with_target(false)
            .init();
    }

    if cli.print_schema {
        println!("{SCHEMA_JSON}");
        return Ok(());
    }
    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let Some(command) = cli.command else {
        return Err("expected a subcommand: eval or anchors".into());
    };
    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;

    match command {
        Command::Eval => run_eval(&config.eval),
        Command::Anchors => run_anchors(&config.anchors),
    }
}

fn run_eval(cfg: &EvalJson) -> Result<(), Box<dyn std::error::Error>> {
    if cfg.ann_file.is_empty() || cfg.result_dir.is_empty() {
        return Err("eval.ann_file and eval.result_dir must be set in the config".into());
    }
    if cfg.heads.is_empty() {
        return Err("eval.heads must list at least one head shape".into());
    }
    if cfg.batch_size == 0 {
        return Err("eval.batch_size must be at least 1".into());
    }

    let ground_truth = GroundTruth::from_file(&cfg.ann_file)?;
    let categories = match &cfg.decode.categories {
        Some(ids) => CategoryMap::new(ids.clone())?,
        None => CategoryMap::coco80(),
    };
    let decoder = Decoder::new(categories).with_config(cfg.decode.to_config());
    let suppressor = Suppressor::new(SuppressConfig {
        mode: cfg.suppress.mode.into(),
        iou_threshold: cfg.suppress.iou_threshold,
    });
    let mut engine = Engine::new(decoder, suppressor).with_parallel(cfg.parallel);

    let result_dir = Path::new(&cfg.result_dir);
    let mut pending = Vec::with_capacity(cfg.batch_size);
    let mut processed = 0usize;
    let mut skipped = 0usize;
    for image_id in ground_truth.image_ids() {
        let Some(info) = ground_truth.image(image_id) else {
            continue;
        };
        let stem = match &info.file_name {
            Some(name) => Path::new(name)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| name.clone()),
            None => format!("{image_id:012}"),
        };

        let file_name = info.file_name.as_deref();
        let meta = match resolve_meta(cfg, image_id, info.width, info.height, file_name) {
            Ok(meta) => meta,
            Err(err) => {
                warn!("skipping image {image_id}: {err}");
                skipped += 1;
                continue;
            }
        };
        let heads = match load_heads(result_dir, &stem, &cfg.heads) {
            Ok(heads) => heads,
            Err(err) => {
                warn!("skipping image {image_id}: {err}");
                skipped += 1;
                continue;
            }
        };
        pending.push((meta, heads));
        if pending.len() == cfg.batch_size {
            processed += flush_batch(&mut engine, &cfg.heads, &mut pending)?;
        }
    }
    processed += flush_batch(&mut engine, &cfg.heads, &mut pending)?;
    info!("decoded {processed} images, skipped {skipped}");

    fs::create_dir_all(&cfg.output_dir)?;
    let output = engine.finalize(Path::new(&cfg.output_dir).join("predict.json"))?;
    info!("detections written to {}", output.display());

    let summary = engine.evaluate(&ground_truth, &EvalConfig::default())?;
    print!("{summary}");
    let summary_json = serde_json::to_string_pretty(&summary)?;
    fs::write(Path::new(&cfg.output_dir).join("summary.json"), summary_json)?;
    Ok(())
}

fn resolve_meta(
    cfg: &EvalJson,
    image_id: u64,
    width: u32,
    height: u32,
    file_name: Option<&str>,
) -> Result<ImageMeta, Box<dyn std::error::Error>> {
    if width > 0 && height > 0 {
        return Ok(ImageMeta::new(image_id, width as f32, height as f32));
    }
    let (Some(dir), Some(name)) = (&cfg.dataset_dir, file_name) else {
        return Err("image size unknown and no dataset_dir/file_name to read it from".into());
    };
    Ok(image_meta(image_id, Path::new(dir).join(name))?)
}

fn load_heads(
    dir: &Path,
    stem: &str,
    shapes: &[[usize; 4]],
) -> Result<Vec<HeadTensor>, Box<dyn std::error::Error>> {
    let mut heads = Vec::with_capacity(shapes.len());
    for (idx, &[gy, gx, anchors, attrs]) in shapes.iter().enumerate() {
        let path = dir.join(format!("{stem}_{idx}.bin"));
        let bytes = fs::read(&path).map_err(|err| format!("{}: {err}", path.display()))?;
        heads.push(HeadTensor::from_le_bytes(&bytes, [1, gy, gx, anchors, attrs])?);
    }
    Ok(heads)
}

/// Stacks the per-image heads of `pending` into one batch and runs it.
fn flush_batch(
    engine: &mut Engine,
    shapes: &[[usize; 4]],
    pending: &mut Vec<(ImageMeta, Vec<HeadTensor>)>,
) -> Result<usize, Box<dyn std::error::Error>> {
    if pending.is_empty() {
        return Ok(0);
    }
    let batch = pending.len();
    let mut tensors = Vec::with_capacity(shapes.len());
    for (idx, &[gy, gx, anchors, attrs]) in shapes.iter().enumerate() {
        let mut data = Vec::with_capacity(batch * gy * gx * anchors * attrs);
        for (_, heads) in pending.iter() {
            if let Some(image) = heads.get(idx).and_then(|h| h.view().image(0)) {
                data.extend_from_slice(image);
            }
        }
        tensors.push(HeadTensor::new(data, [batch, gy, gx, anchors, attrs])?);
    }
    let metas: Vec<ImageMeta> = pending.drain(..).map(|(meta, _)| meta).collect();
    let views: Vec<_> = tensors.iter().map(HeadTensor::view).collect();
    engine.process(&views, &metas)?;
    Ok(batch)
}

fn run_anchors(cfg: &AnchorsJson) -> Result<(), Box<dyn std::error::Error>> {
    if cfg.annotation_file.is_empty() {
        return Err("anchors.annotation_file must be set in the config".into());
    }
    let target = cfg.target_size.map(|[w, h]| (w, h));
    let boxes = read_annotation_file(&cfg.annotation_file, target)?;
    info!("read {} boxes", boxes.len());

    let set = compute_anchors(
        &boxes,
        &KMeansConfig {
            clusters: cfg.clusters,
            seed: cfg.seed,
            max_iterations: cfg.max_iterations,
        },
    )?;
    let output = AnchorsOutput {
        anchors: set.to_string(),
        mean_iou: set.mean_iou,
        boxes: boxes.len(),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(parallel: bool) -> Engine {
        let decoder = Decoder::new(CategoryMap::new(vec![7, 9]).unwrap()).with_config(DecodeConfig {
            num_classes: 2,
            ignore_threshold: 0.01,
            policy: ConfidencePolicy::SingleLabel,
        });
        Engine::new(decoder, Suppressor::new(SuppressConfig::default())).with_parallel(parallel)
    }

    fn image_heads(class_scores: [f32; 2]) -> Vec<HeadTensor> {
        let row = [0.5, 0.5, 0.2, 0.2, 0.9, class_scores[0], class_scores[1]];
        vec![HeadTensor::new(row.to_vec(), [1, 1, 1, 1, 7]).unwrap()]
    }

    #[test]
    fn flush_batch_stacks_pending_images_into_one_batch() {
        for parallel in [false, true] {
            let mut engine = engine(parallel);
            let mut pending = vec![
                (ImageMeta::new(1, 100.0, 100.0), image_heads([0.8, 0.1])),
                (ImageMeta::new(2, 50.0, 50.0), image_heads([0.1, 0.8])),
                (ImageMeta::new(3, 10.0, 10.0), image_heads([0.6, 0.2])),
            ];

            let flushed = flush_batch(&mut engine, &[[1, 1, 1, 7]], &mut pending).unwrap();
            assert_eq!(flushed, 3);
            assert!(pending.is_empty());

            let store = engine.aggregator().store();
            assert_eq!(store.num_images(), 3);
            assert_eq!(store.get(1, 7).len(), 1);
            assert_eq!(store.get(2, 9).len(), 1);
            assert_eq!(store.get(3, 7).len(), 1);
            assert_eq!(store.get(2, 9)[0].bbox, detpost::BoxXywh::new(20.0, 20.0, 10.0, 10.0));

            assert_eq!(flush_batch(&mut engine, &[[1, 1, 1, 7]], &mut pending).unwrap(), 0);
        }
    }
}
