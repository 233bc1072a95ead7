use anyhow::{Context, Result};
use clap::{Args, ColorChoice, CommandFactory, FromArgMatches, Parser, Subcommand};
use colored::Colorize;
use scansense::registry::{
    FileStore, KeyValueStore, MemoryStore, ModelRegistry, SimulatedUpdateSource, UpdateOptions,
    UpdateStatus,
};
use scansense::schema::{
    DetectionOptions, DetectionResult, DetectorType, ImagePayload, result_schema,
};
use scansense::{DetectionEngine, ScanConfig, SimulatedVision, logging};
use serde_json::Value;
use std::io::{IsTerminal, stdout};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

mod exit {
    pub const OK: i32 = 0;
    /// Nothing detected, or the operation was declined.
    pub const DECLINED: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const INTERNAL: i32 = 3;
}

#[derive(Parser)]
#[command(
    name = "scansense",
    about = "Detect barcodes, products, documents and context in images",
    arg_required_else_help = true
)]
struct Cli {
    /// Disable color
    #[arg(long = "no-color", global = true)]
    no_color: bool,

    /// Output JSON
    #[arg(long, global = true)]
    json: bool,

    /// Directory for the model registry and feedback log
    #[arg(long = "data-dir", value_name = "DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Skip simulated latency
    #[arg(long, global = true)]
    instant: bool,

    /// Config file (default: $SCANSENSE_CONFIG or the user config dir)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run detectors over an image
    Detect(DetectArgs),
    /// Inspect and manage detector models
    #[command(subcommand)]
    Models(ModelsCmd),
    /// Record or review accuracy feedback
    #[command(subcommand)]
    Feedback(FeedbackCmd),
    /// Print the JSON schema of detection results
    Schema,
}

#[derive(Args)]
struct DetectArgs {
    /// Image file, or - for stdin
    #[arg(value_name = "IMAGE", required_unless_present = "text")]
    input: Option<String>,

    /// Use literal text as the image's text layer
    #[arg(long, conflicts_with = "input")]
    text: Option<String>,

    /// Only run detectors of this type (barcode, product, document, context)
    #[arg(long = "type", value_name = "TYPE")]
    detector_type: Option<DetectorType>,

    /// Minimum confidence for returned results
    #[arg(long, value_name = "0..1")]
    threshold: Option<f32>,

    /// Return every result instead of the best one
    #[arg(long)]
    all: bool,

    /// Cap the number of results (with --all)
    #[arg(long = "max-results", value_name = "N", requires = "all")]
    max_results: Option<usize>,

    /// Echo the image in results
    #[arg(long = "raw-image")]
    raw_image: bool,

    /// Omit extracted text
    #[arg(long = "no-ocr")]
    no_ocr: bool,

    /// Language hint for text recognition
    #[arg(long)]
    language: Option<String>,
}

#[derive(Subcommand)]
enum ModelsCmd {
    /// List model versions
    List {
        #[arg(value_name = "TYPE")]
        detector_type: Option<DetectorType>,
    },
    /// Ask the update server which types have new models
    Check,
    /// Download and activate the next model
    Update {
        #[arg(value_name = "TYPE")]
        detector_type: DetectorType,
        /// Proceed even if another update is running
        #[arg(long)]
        force: bool,
        /// Install this version if it is newer
        #[arg(long = "version", value_name = "VERSION")]
        preferred_version: Option<String>,
    },
    /// Reactivate an earlier model
    Rollback {
        #[arg(value_name = "TYPE")]
        detector_type: DetectorType,
        /// Version (v1.0.0) or id (barcode-v1.0.0)
        #[arg(value_name = "VERSION")]
        target: String,
    },
}

#[derive(Subcommand)]
enum FeedbackCmd {
    /// Record whether a detection was accurate
    Add {
        /// Detection result JSON file, or - for stdin
        #[arg(long, value_name = "FILE")]
        result: String,
        #[arg(long, required_unless_present = "inaccurate", conflicts_with = "inaccurate")]
        accurate: bool,
        #[arg(long)]
        inaccurate: bool,
        /// Corrected value, as JSON or plain text
        #[arg(long)]
        correction: Option<String>,
    },
    /// Show recorded feedback for a type
    Show {
        #[arg(value_name = "TYPE")]
        detector_type: DetectorType,
    },
}

struct Output {
    json: bool,
    color: bool,
}

impl Output {
    fn heading(&self, text: &str) -> String {
        if self.color {
            text.bold().cyan().to_string()
        } else {
            text.to_string()
        }
    }

    fn print_json(&self, value: &impl serde::Serialize) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        _ => v.to_string(),
    }
}

fn render_result(result: &DetectionResult, out: &Output) -> Result<String> {
    let mut rendered = format!(
        "{} {:.2}",
        out.heading(&format!("{}:", result.detector_type())),
        result.confidence
    );
    if let Some(model) = &result.model_version {
        rendered.push_str(&format!(" ({model})"));
    }
    let Value::Object(fields) = serde_json::to_value(result)? else {
        return Ok(rendered);
    };
    for (field, value) in fields {
        if matches!(
            field.as_str(),
            "type" | "confidence" | "timestamp" | "rawImage" | "modelVersion"
        ) || value.is_null()
        {
            continue;
        }
        rendered.push_str(&format!("\n  {field} = {}", value_to_string(&value)));
    }
    Ok(rendered)
}

async fn read_input(input: &str) -> Result<Vec<u8>> {
    if input == "-" {
        let mut buf = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut buf)
            .await
            .context("failed to read stdin")?;
        Ok(buf)
    } else {
        std::fs::read(input).with_context(|| format!("failed to read {input}"))
    }
}

fn open_registry(cli: &Cli, config: &ScanConfig) -> Result<Arc<ModelRegistry>> {
    let store: Arc<dyn KeyValueStore> = match cli
        .data_dir
        .clone()
        .or_else(|| config.registry.resolved_data_dir())
    {
        Some(dir) => Arc::new(FileStore::new(dir)),
        None => {
            tracing::warn!("no data directory available; model changes will not persist");
            Arc::new(MemoryStore::new())
        }
    };
    let source = Arc::new(SimulatedUpdateSource::new(
        config.simulation.update_settings(),
        config.simulation.seed,
    ));
    ModelRegistry::open(store, source, config.registry.settings())
        .context("failed to open model registry")
}

async fn run_detect(
    args: DetectArgs,
    registry: Arc<ModelRegistry>,
    config: &ScanConfig,
    out: &Output,
) -> Result<i32> {
    let image = match (&args.text, &args.input) {
        (Some(text), _) => ImagePayload::from_text(text.clone()),
        (None, Some(input)) => match read_input(input).await {
            Ok(bytes) => ImagePayload::from_bytes(bytes),
            Err(e) => {
                eprintln!("{e:#}");
                return Ok(exit::USAGE);
            }
        },
        (None, None) => return Ok(exit::USAGE),
    };

    let mut options = DetectionOptions::new()
        .with_raw_image(args.raw_image)
        .with_ocr(!args.no_ocr);
    options.preferred_type = args.detector_type;
    options.confidence_threshold = args.threshold;
    options.max_results = args.max_results;
    options.language = args.language;

    let engine = DetectionEngine::standard(config, Arc::new(SimulatedVision::new()))
        .with_registry(registry);

    let results = if args.all {
        engine.process_multiple(&image, &options).await
    } else {
        engine
            .process(&image, &options)
            .await
            .map(|r| r.into_iter().collect())
    };
    let results = match results {
        Ok(results) => results,
        Err(e) => {
            eprintln!("invalid request: {e}");
            return Ok(exit::USAGE);
        }
    };

    if out.json {
        if args.all {
            out.print_json(&results)?;
        } else {
            out.print_json(&results.first())?;
        }
    } else if results.is_empty() {
        println!("Nothing detected");
    } else {
        let rendered: Vec<String> = results
            .iter()
            .map(|r| render_result(r, out))
            .collect::<Result<_>>()?;
        println!("{}", rendered.join("\n"));
    }

    Ok(if results.is_empty() {
        exit::DECLINED
    } else {
        exit::OK
    })
}

async fn run_models(cmd: ModelsCmd, registry: Arc<ModelRegistry>, out: &Output) -> Result<i32> {
    match cmd {
        ModelsCmd::List { detector_type } => {
            let types = detector_type.map_or_else(|| DetectorType::ALL.to_vec(), |t| vec![t]);
            if out.json {
                let listing: std::collections::BTreeMap<_, _> =
                    types.iter().map(|t| (*t, registry.versions(*t))).collect();
                out.print_json(&listing)?;
                return Ok(exit::OK);
            }
            let mut rendered = Vec::new();
            for detector_type in types {
                rendered.push(out.heading(&format!("{detector_type}:")));
                for model in registry.versions(detector_type) {
                    rendered.push(format!(
                        "  {} {}  accuracy {:.3}  threshold {:.2}  samples {}",
                        if model.is_active { "*" } else { " " },
                        model.version,
                        model.metrics.accuracy,
                        model.metrics.confidence_threshold,
                        model.metrics.test_samples
                    ));
                }
            }
            println!("{}", rendered.join("\n"));
            Ok(exit::OK)
        }
        ModelsCmd::Check => {
            let report = registry.check_for_updates().await?;
            if out.json {
                out.print_json(&report)?;
            } else {
                for detector_type in DetectorType::ALL {
                    let status = match registry.update_status(detector_type) {
                        UpdateStatus::UpdateAvailable => "update available",
                        UpdateStatus::Updating => "updating",
                        UpdateStatus::UpToDate => "up to date",
                    };
                    println!("{detector_type}: {status}");
                }
            }
            Ok(exit::OK)
        }
        ModelsCmd::Update {
            detector_type,
            force,
            preferred_version,
        } => {
            let options = UpdateOptions {
                force,
                preferred_version,
                on_progress: None,
            };
            match registry.update_model(detector_type, options).await? {
                Some(model) => {
                    if out.json {
                        out.print_json(&model)?;
                    } else {
                        println!(
                            "Updated {detector_type} to {} (accuracy {:.3})",
                            model.version, model.metrics.accuracy
                        );
                    }
                    Ok(exit::OK)
                }
                None => {
                    eprintln!("Update skipped");
                    Ok(exit::DECLINED)
                }
            }
        }
        ModelsCmd::Rollback {
            detector_type,
            target,
        } => {
            let Some(model) = registry
                .versions(detector_type)
                .into_iter()
                .find(|m| m.id == target || m.version == target)
            else {
                eprintln!("No {detector_type} model matches '{target}'");
                return Ok(exit::DECLINED);
            };
            if registry.rollback(detector_type, &model.id).await? {
                println!("Rolled back {detector_type} to {}", model.version);
                Ok(exit::OK)
            } else {
                eprintln!("Rollback declined");
                Ok(exit::DECLINED)
            }
        }
    }
}

async fn run_feedback(cmd: FeedbackCmd, registry: Arc<ModelRegistry>, out: &Output) -> Result<i32> {
    match cmd {
        FeedbackCmd::Add {
            result,
            accurate,
            inaccurate: _,
            correction,
        } => {
            let raw = match read_input(&result).await {
                Ok(raw) => raw,
                Err(e) => {
                    eprintln!("{e:#}");
                    return Ok(exit::USAGE);
                }
            };
            let detection: DetectionResult = match serde_json::from_slice(&raw) {
                Ok(detection) => detection,
                Err(e) => {
                    eprintln!("invalid detection result: {e}");
                    return Ok(exit::USAGE);
                }
            };
            let correction = correction.map(|c| {
                serde_json::from_str(&c).unwrap_or(Value::String(c))
            });
            let record = registry
                .add_feedback(detection.detector_type(), &detection, accurate, correction)
                .await?;
            if out.json {
                out.print_json(&record)?;
            } else {
                println!(
                    "Recorded {} feedback for {}",
                    if accurate { "accurate" } else { "inaccurate" },
                    record.detector_type
                );
            }
            Ok(exit::OK)
        }
        FeedbackCmd::Show { detector_type } => {
            let records = registry.feedback(detector_type)?;
            let summary = registry.feedback_summary(detector_type)?;
            if out.json {
                out.print_json(&serde_json::json!({
                    "summary": summary,
                    "records": records,
                }))?;
                return Ok(exit::OK);
            }
            println!("{}", out.heading(&format!("{detector_type} feedback:")));
            println!(
                "  total = {}\n  accurate = {}\n  inaccurate = {}",
                summary.total, summary.accurate, summary.inaccurate
            );
            if let Some(rate) = summary.accuracy_rate {
                println!("  accuracy = {:.1}%", rate * 100.0);
            }
            Ok(exit::OK)
        }
    }
}

fn detect_color_choice() -> ColorChoice {
    // Scan args before clap so help/errors honor `--no-color`.
    let mut args = std::env::args_os();
    args.next();
    let mut flag = false;
    for arg in args {
        if arg == "--" {
            break;
        }
        if arg == "--no-color" {
            flag = true;
            break;
        }
    }
    if flag || std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty()) {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    }
}

async fn run(cli: Cli, color: ColorChoice) -> Result<i32> {
    let mut config = match &cli.config {
        Some(path) => match ScanConfig::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{e}");
                return Ok(exit::USAGE);
            }
        },
        None => ScanConfig::load(),
    };
    if cli.instant {
        config.simulation.instant();
    }
    logging::init(&config.logging.level);

    let out = Output {
        json: cli.json,
        color: !matches!(color, ColorChoice::Never)
            && !cli.no_color
            && stdout().is_terminal()
            && supports_color::on(supports_color::Stream::Stdout).is_some(),
    };

    if let Commands::Schema = cli.command {
        out.print_json(&result_schema())?;
        return Ok(exit::OK);
    }

    let registry = open_registry(&cli, &config)?;
    match cli.command {
        Commands::Detect(args) => run_detect(args, registry, &config, &out).await,
        Commands::Models(cmd) => run_models(cmd, registry, &out).await,
        Commands::Feedback(cmd) => run_feedback(cmd, registry, &out).await,
        Commands::Schema => Ok(exit::OK),
    }
}

#[tokio::main]
async fn main() {
    let color = detect_color_choice();
    let matches = Cli::command().color(color).get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());
    let code = match run(cli, color).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            exit::INTERNAL
        }
    };
    std::process::exit(code);
}
