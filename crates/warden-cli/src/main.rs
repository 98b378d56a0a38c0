use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use warden_core::detector::load_cascade;
use warden_core::paths::{default_data_dir, DEFAULT_CASCADE_PATH, LABEL_MAPPING_FILE, MODEL_FILE};
use warden_core::recognizer::DEFAULT_CONFIDENCE_THRESHOLD;
use warden_core::{
    CascadeDetector, DetectorParams, FaceClassifier, FaceLocator, FaceRegion, IdentityClassifier, IdentityResult,
    LabelMapping, LbphRecognizer,
};
use warden_hw::{Camera, Frame};

#[derive(Parser)]
#[command(name = "warden", about = "Warden intruder detection CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List V4L2 capture devices
    Devices,
    /// Load the label mapping, model and cascade and report what was found
    Check(ModelArgs),
    /// Locate and classify faces in a still image, one JSON object per face
    Scan {
        /// Image to scan (any format the image crate reads)
        image: PathBuf,
        #[command(flatten)]
        models: ModelArgs,
        /// Distance below which a face counts as known
        #[arg(long, default_value_t = DEFAULT_CONFIDENCE_THRESHOLD)]
        threshold: f64,
        /// Image pyramid step
        #[arg(long, default_value_t = DetectorParams::default().scale_factor)]
        scale_factor: f64,
        /// Raw hits needed before a face is reported
        #[arg(long, default_value_t = DetectorParams::default().min_neighbors)]
        min_neighbors: usize,
    },
}

#[derive(Args)]
struct ModelArgs {
    /// Directory holding face_model.yml and label_mapping.json
    /// (default: $WARDEN_DATA_DIR, else $XDG_DATA_HOME/warden)
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// OpenCV LBPH model file (default: <data-dir>/face_model.yml)
    #[arg(long)]
    model: Option<PathBuf>,
    /// Label mapping file (default: <data-dir>/label_mapping.json)
    #[arg(long)]
    labels: Option<PathBuf>,
    /// Haar cascade XML
    #[arg(long, default_value = DEFAULT_CASCADE_PATH)]
    cascade: PathBuf,
}

impl ModelArgs {
    fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| default_data_dir(|key| std::env::var(key).ok()))
    }

    fn model_path(&self) -> PathBuf {
        self.model.clone().unwrap_or_else(|| self.data_dir().join(MODEL_FILE))
    }

    fn labels_path(&self) -> PathBuf {
        self.labels.clone().unwrap_or_else(|| self.data_dir().join(LABEL_MAPPING_FILE))
    }
}

/// One line of `scan` output.
#[derive(Serialize)]
struct ScanRecord {
    #[serde(flatten)]
    region: FaceRegion,
    #[serde(flatten)]
    result: IdentityResult,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for dev in devices {
                println!("{}\t{} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
        Commands::Check(models) => check(&models)?,
        Commands::Scan {
            image,
            models,
            threshold,
            scale_factor,
            min_neighbors,
        } => {
            let params = DetectorParams {
                scale_factor,
                min_neighbors,
                ..DetectorParams::default()
            };
            for record in scan(&image, &models, threshold, params)? {
                println!("{}", serde_json::to_string(&record)?);
            }
        }
    }

    Ok(())
}

/// Preflight for the daemon: every file it needs at startup, loaded the same way.
fn check(models: &ModelArgs) -> Result<()> {
    let labels_path = models.labels_path();
    let mapping = LabelMapping::load(&labels_path).with_context(|| format!("label mapping {}", labels_path.display()))?;
    println!("label mapping: {} ({} names)", labels_path.display(), mapping.len());

    let model_path = models.model_path();
    let recognizer = LbphRecognizer::load(&model_path).with_context(|| format!("model {}", model_path.display()))?;
    let model = recognizer.summary()?;
    println!(
        "model:         {} ({} samples, {}x{} grid, radius {}, {} neighbors)",
        model_path.display(),
        model.labels.len(),
        model.grid_x,
        model.grid_y,
        model.radius,
        model.neighbors
    );

    let unnamed: Vec<i32> = {
        let mut labels = model.labels.clone();
        labels.sort_unstable();
        labels.dedup();
        labels.into_iter().filter(|l| mapping.name_for(*l).is_none()).collect()
    };
    if !unnamed.is_empty() {
        println!("warning: labels without a name in the mapping: {unnamed:?}");
    }

    load_cascade(&models.cascade).with_context(|| format!("cascade {}", models.cascade.display()))?;
    println!("cascade:       {}", models.cascade.display());

    println!("OK");
    Ok(())
}

fn scan(image: &Path, models: &ModelArgs, threshold: f64, params: DetectorParams) -> Result<Vec<ScanRecord>> {
    let rgb = image::open(image)
        .with_context(|| format!("failed to open {}", image.display()))?
        .to_rgb8();
    let (width, height) = rgb.dimensions();
    let frame = Frame::from_rgb(rgb.as_raw(), width, height, 0)?;

    let mut detector = CascadeDetector::load(&models.cascade, params)?;
    let mapping = LabelMapping::load(&models.labels_path())?;
    let recognizer = LbphRecognizer::load(&models.model_path())?;
    let mut classifier = FaceClassifier::new(recognizer, mapping, threshold);

    let regions = detector.locate(&frame.gray)?;
    tracing::info!(faces = regions.len(), image = %image.display(), "scan complete");

    let mut records = Vec::with_capacity(regions.len());
    for region in regions {
        match classifier.classify(&frame.gray, &region) {
            Ok(result) => records.push(ScanRecord { region, result }),
            Err(e) => tracing::warn!(face = region.index, error = %e, "classification failed; skipping face"),
        }
    }
    Ok(records)
}
