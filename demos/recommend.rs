//! Print Settings Recommendation Example
//!
//! This example analyses one or more OBJ meshes and asks the print-settings
//! classifier for a filament, infill, nozzle and layer height recommendation
//! for each of them. Requests are submitted together and complete in parallel
//! up to the configured concurrency.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example recommend -- [OPTIONS] --model-path <MODEL> <MESHES>...
//! ```
//!
//! # Arguments
//!
//! * `-m, --model-path` - Path to the ONNX classifier
//! * `--profile` - JSON file with the requirement flags (overrides the flag options)
//! * `--functional`, `--decorative`, `--force`, `--friction`, `--weight-support`,
//!   `--outdoor`, `--detail` - Requirement flags
//! * `--device` - Device to use for inference (e.g., 'cpu', 'cuda', 'cuda:0')
//! * `--concurrency` - Maximum number of concurrent model calls
//! * `--cache` - Result cache capacity in entries (0 disables the cache)
//! * `--timeout-ms` - Queue deadline for each request
//! * `--details` - Print every head's score table
//! * `--json` - Print recommendations as JSON
//! * `<MESHES>...` - Paths to OBJ files
//!
//! # Example
//!
//! ```bash
//! cargo run --example recommend -- -m models/basic.onnx --functional --force bracket.obj
//! ```

use clap::Parser;
use print_advisor::core::config::OrtExecutionProvider;
use print_advisor::core::init_tracing;
use print_advisor::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

/// Command-line arguments for the recommendation example
#[derive(Parser)]
#[command(name = "recommend")]
#[command(about = "Print Settings Recommendation Example - recommends print settings for OBJ meshes")]
struct Args {
    /// Path to the ONNX classifier
    #[arg(short, long)]
    model_path: PathBuf,

    /// Paths to OBJ meshes to analyse
    #[arg(required = true)]
    meshes: Vec<PathBuf>,

    /// JSON file with the requirement flags
    #[arg(long)]
    profile: Option<PathBuf>,

    /// The part is functional
    #[arg(long)]
    functional: bool,

    /// The part is decorative
    #[arg(long)]
    decorative: bool,

    /// The part must withstand force (functional parts only)
    #[arg(long)]
    force: bool,

    /// The part is subject to friction (functional parts only)
    #[arg(long)]
    friction: bool,

    /// The part supports weight (functional parts only)
    #[arg(long)]
    weight_support: bool,

    /// The part is used outdoors
    #[arg(long)]
    outdoor: bool,

    /// The part has fine surface detail
    #[arg(long)]
    detail: bool,

    /// Device to use for inference (e.g., 'cpu', 'cuda', 'cuda:0')
    #[arg(long, default_value = "cpu")]
    device: String,

    /// Maximum number of concurrent model calls
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    /// Result cache capacity in entries (0 disables the cache)
    #[arg(long, default_value_t = 0)]
    cache: usize,

    /// Queue deadline in milliseconds for each request
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Print every head's score table
    #[arg(long)]
    details: bool,

    /// Print recommendations as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    fn requirement_profile(&self) -> Result<RequirementProfile, Box<dyn std::error::Error>> {
        if let Some(path) = &self.profile {
            let text = std::fs::read_to_string(path)?;
            return Ok(serde_json::from_str(&text)?);
        }
        Ok(RequirementProfile::new(
            self.functional,
            self.decorative,
            self.force,
            self.friction,
            self.weight_support,
            self.outdoor,
            self.detail,
        ))
    }

    fn dispatch_config(&self) -> DispatchConfig {
        let mut config = DispatchConfig::new().max_concurrency(self.concurrency);
        if self.cache > 0 {
            config = config.cache(CacheConfig::entries(self.cache));
        }
        if let Some(ms) = self.timeout_ms {
            config = config.default_timeout(Duration::from_millis(ms));
        }
        config
    }
}

/// Parse device string and create appropriate ONNX execution provider
///
/// # Arguments
///
/// * `device` - Device string (e.g., "cpu", "cuda", "cuda:0")
///
/// # Returns
///
/// Vector of execution providers in order of preference
fn parse_device(device: &str) -> Result<Vec<OrtExecutionProvider>, Box<dyn std::error::Error>> {
    let device = device.to_lowercase();

    if device == "cpu" {
        return Ok(vec![OrtExecutionProvider::CPU]);
    }

    let device_id = if device == "cuda" {
        0
    } else if let Some(id) = device.strip_prefix("cuda:") {
        id.parse::<i32>()
            .map_err(|_| format!("Invalid CUDA device ID: {id}"))?
    } else {
        return Err(format!("Unsupported device: {device}").into());
    };

    if cfg!(feature = "cuda") {
        Ok(vec![
            OrtExecutionProvider::CUDA {
                device_id: Some(device_id),
            },
            OrtExecutionProvider::CPU,
        ])
    } else {
        warn!("CUDA support not compiled in. Falling back to CPU.");
        Ok(vec![OrtExecutionProvider::CPU])
    }
}

/// Keep only mesh paths that exist, logging the rest.
fn validate_mesh_paths(paths: &[PathBuf]) -> Vec<&Path> {
    paths
        .iter()
        .filter_map(|path| {
            if path.exists() {
                Some(path.as_path())
            } else {
                error!("Mesh file not found: {}", path.display());
                None
            }
        })
        .collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args = Args::parse();

    let meshes = validate_mesh_paths(&args.meshes);
    if meshes.is_empty() {
        return Err("No valid mesh files found".into());
    }
    let profile = args.requirement_profile()?;

    let mut ort = OrtSessionConfig::new();
    for provider in parse_device(&args.device)? {
        ort = ort.add_execution_provider(provider);
    }

    info!("Loading model: {}", args.model_path.display());
    let advisor = PrintAdvisor::builder()
        .ort_session(ort)
        .dispatch_config(args.dispatch_config())
        .build(args.model_path.as_path())?;

    let mut pending = Vec::with_capacity(meshes.len());
    for path in meshes {
        let analysis = match ObjMesh::from_path(path).and_then(|mesh| MeshAnalysis::calculate(&mesh)) {
            Ok(analysis) => analysis,
            Err(e) => {
                error!("{}: {} error: {e}", path.display(), e.kind());
                continue;
            }
        };
        let handle = advisor.recommend(&analysis, profile, Priority::Normal);
        pending.push((path, analysis, handle));
    }

    for (path, analysis, handle) in pending {
        println!("== {} ==", path.display());
        println!("{}", analysis.describe());
        let outcome = handle.wait();
        if outcome.late {
            warn!("{}: recommendation arrived after its deadline", path.display());
        }
        match outcome.result {
            Ok(rec) if args.json => println!("{}", serde_json::to_string_pretty(&rec)?),
            Ok(rec) => {
                print!("{}", rec.format_summary());
                if args.details {
                    print!("{}", rec.format_details());
                }
            }
            Err(e) => error!("{}: {} error: {e}", path.display(), e.kind()),
        }
    }

    let stats = advisor.stats();
    info!(
        "Dispatched {} request(s): {} succeeded, {} failed, {} cache hit(s)",
        stats.submitted, stats.succeeded, stats.failed, stats.cache_hits
    );
    advisor.close();
    Ok(())
}
