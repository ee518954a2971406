//! BinWatch command-line runner.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use binwatch_worker::{
    analyze_clip, DetectionInput, OpenAiVisionClient, Pipeline, PipelineConfig, VlmConfig,
};

#[derive(Parser)]
#[command(name = "binwatch")]
#[command(about = "Find, clip and classify garbage bin events in a video")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true, subcommand_negates_reqs = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a single event clip with the vision-language model
    AnalyzeClip {
        /// Path to the clip file
        clip: PathBuf,

        /// Number of frames sampled from the clip (2-5)
        #[arg(long, default_value_t = 5)]
        num_frames: usize,

        /// Spend ceiling for this analysis in USD
        #[arg(long, env = "MAX_VLM_COST_USD", default_value_t = 1.0)]
        max_cost: f64,

        /// Root directory for sampled clip frames
        #[arg(short, long, env = "BINWATCH_OUTPUT_DIR")]
        output_dir: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Video URL or local file path
    #[arg(short, long, required = true)]
    input: Option<String>,

    /// Pre-computed detection stream (JSON) used instead of the detector
    #[arg(long)]
    detections: Option<PathBuf>,

    /// Root directory for videos, frames, clips and reports
    #[arg(short, long, env = "BINWATCH_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Bin detection confidence threshold
    #[arg(short, long)]
    confidence: Option<f32>,

    /// Number of eligible events to classify (default: all)
    #[arg(long)]
    sample_size: Option<usize>,

    /// Seed for reproducible sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Spend ceiling for vision-language calls in USD
    #[arg(long, env = "MAX_VLM_COST_USD")]
    max_cost: Option<f64>,

    /// Stop after segmentation and clip extraction
    #[arg(long)]
    skip_analysis: bool,

    /// Do not run the fast overflow classifier
    #[arg(long)]
    no_fast_classifier: bool,

    /// Netscape cookies file for yt-dlp
    #[arg(long, env = "BINWATCH_COOKIES")]
    cookies: Option<PathBuf>,
}

impl RunArgs {
    fn apply(self, mut config: PipelineConfig) -> Result<(PipelineConfig, String, DetectionInput)> {
        if let Some(dir) = self.output_dir {
            config = config.with_output_dir(dir);
        }
        if let Some(confidence) = self.confidence {
            config.detection_confidence = confidence;
        }
        if self.sample_size.is_some() {
            config.sample_size = self.sample_size;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(max_cost) = self.max_cost {
            config.max_vlm_cost_usd = max_cost;
        }
        if self.skip_analysis {
            config.skip_analysis = true;
        }
        if self.no_fast_classifier {
            config.use_fast_classifier = false;
        }
        if self.cookies.is_some() {
            config.cookies = self.cookies;
        }

        let detections = self
            .detections
            .map(DetectionInput::File)
            .unwrap_or(DetectionInput::Detect);
        let input = self.input.context("--input is required")?;
        Ok((config, input, detections))
    }
}

fn init_tracing() -> Result<()> {
    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive(
        "binwatch=info"
            .parse()
            .context("invalid default log directive")?,
    );

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();
    init_tracing()?;

    let cli = Cli::parse();
    if let Some(Commands::AnalyzeClip {
        clip,
        num_frames,
        max_cost,
        output_dir,
    }) = cli.command
    {
        return run_analyze_clip(clip, num_frames, max_cost, output_dir).await;
    }

    let (config, input, detections) = cli.run.apply(PipelineConfig::from_env())?;

    info!("Starting binwatch");
    info!("Pipeline config: {:?}", config);

    binwatch_media::check_ffmpeg().context("ffmpeg is required")?;
    binwatch_media::check_ffprobe().context("ffprobe is required")?;

    let pipeline = Pipeline::from_config(config).context("failed to configure pipeline")?;

    if matches!(detections, DetectionInput::Detect) {
        match binwatch_ml_client::InferenceClient::new(pipeline.config().inference.clone()) {
            Ok(client) if client.health_check().await.unwrap_or(false) => {}
            _ => warn!(
                "Inference service at {} is not healthy",
                pipeline.config().inference.base_url
            ),
        }
    }

    match pipeline.run(&input, detections).await {
        Ok(outcome) => {
            let summary = &outcome.report.summary;
            let cost = &outcome.report.cost;
            info!(
                events = summary.total_events,
                sampled = summary.sampled,
                classified = summary.classified,
                unanalyzed = summary.unanalyzed,
                spent_usd = cost.total_cost_usd,
                "Run complete"
            );
            println!("JSON report:     {}", outcome.paths.json.display());
            println!("Markdown report: {}", outcome.paths.markdown.display());
            Ok(())
        }
        Err(e) => {
            if e.is_structural() {
                error!("Run aborted, no report written: {}", e);
            } else {
                error!("Run failed: {}", e);
            }
            Err(e).context(format!("processing {}", input))
        }
    }
}

async fn run_analyze_clip(
    clip: PathBuf,
    num_frames: usize,
    max_cost: f64,
    output_dir: Option<PathBuf>,
) -> Result<()> {
    if !clip.is_file() {
        anyhow::bail!("clip not found: {}", clip.display());
    }
    if !(max_cost.is_finite() && max_cost >= 0.0) {
        anyhow::bail!("--max-cost must be non-negative, got {}", max_cost);
    }

    binwatch_media::check_ffmpeg().context("ffmpeg is required")?;
    binwatch_media::check_ffprobe().context("ffprobe is required")?;

    let mut config = PipelineConfig::from_env();
    if let Some(dir) = output_dir {
        config = config.with_output_dir(dir);
    }
    let vlm_config = VlmConfig::from_env();
    if !vlm_config.is_configured() {
        anyhow::bail!("OPENAI_API_KEY is required for clip analysis");
    }
    let vlm = OpenAiVisionClient::new(vlm_config).context("failed to configure vision client")?;

    info!("Analyzing clip {}", clip.display());
    let analysis = analyze_clip(&vlm, &clip, config.frames_dir(), num_frames, max_cost)
        .await
        .with_context(|| format!("analyzing {}", clip.display()))?;

    let c = &analysis.classification;
    println!("Clip:        {}", analysis.clip.display());
    println!("Duration:    {:.2}s", analysis.duration);
    println!("Frames:      {}", analysis.frames.len());
    println!("Event type:  {}", c.event_type);
    println!("Confidence:  {}", c.confidence);
    println!("Method:      {}", c.method);
    match (&c.description, &c.skip_reason) {
        (Some(description), _) => println!("Description: {}", description),
        (None, Some(reason)) => println!("Not analyzed: {}", reason),
        (None, None) => {}
    }
    println!(
        "Cost:        ${:.4} of ${:.2} ({} images)",
        analysis.cost.total_cost_usd, max_cost, analysis.cost.images_analyzed
    );
    Ok(())
}
