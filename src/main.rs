use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context};
use dotenvy::dotenv;
use tracing::{info, warn};

mod analysis;
mod catalog;
mod config;
mod error;
mod generation;
mod media;
mod pipeline;
#[cfg(test)]
mod test_support;
mod utils;

use analysis::{AnalysisResponse, OutfitAnalysis};
use config::Config;
use media::codec::{prepare_upload, rotate_clockwise_90};
use pipeline::OutfitImagePipeline;
use utils::cancel::{CancelHandle, CancelToken, RunContext};
use utils::logging::init_logging;

// Headroom on top of the poll budget for uploads, submission and rotation.
const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(120);

#[derive(Debug, PartialEq)]
struct GenerateArgs {
    image_path: PathBuf,
    style: String,
    analysis_path: PathBuf,
    output_path: Option<PathBuf>,
}

#[derive(Debug, PartialEq)]
struct RotateArgs {
    input_path: PathBuf,
    output_path: PathBuf,
}

#[derive(Debug, PartialEq)]
enum Command {
    Generate(GenerateArgs),
    Rotate(RotateArgs),
}

fn usage() -> &'static str {
    "Usage:\n  outfit_render generate --image <path> --style <label> --analysis <json> [--output <json>]\n  outfit_render rotate --input <path> --output <path>"
}

fn take_value<'a>(args: &'a [String], index: &mut usize, flag: &str) -> anyhow::Result<&'a str> {
    *index += 1;
    args.get(*index)
        .map(|value| value.as_str())
        .ok_or_else(|| anyhow!("Missing value for {flag}"))
}

fn parse_args(args: &[String]) -> anyhow::Result<Command> {
    let Some(command) = args.get(1).map(|value| value.as_str()) else {
        return Err(anyhow!(usage()));
    };

    let mut image_path = None;
    let mut style = None;
    let mut analysis_path = None;
    let mut input_path = None;
    let mut output_path = None;

    let mut index = 2;
    while index < args.len() {
        match args[index].as_str() {
            "--image" => image_path = Some(PathBuf::from(take_value(args, &mut index, "--image")?)),
            "--style" => style = Some(take_value(args, &mut index, "--style")?.to_string()),
            "--analysis" => {
                analysis_path = Some(PathBuf::from(take_value(args, &mut index, "--analysis")?))
            }
            "--input" => input_path = Some(PathBuf::from(take_value(args, &mut index, "--input")?)),
            "--output" => {
                output_path = Some(PathBuf::from(take_value(args, &mut index, "--output")?))
            }
            "--help" | "-h" => return Err(anyhow!(usage())),
            other => return Err(anyhow!("Unknown argument: {other}\n{}", usage())),
        }
        index += 1;
    }

    match command {
        "generate" => {
            let style = style.ok_or_else(|| anyhow!("--style is required"))?;
            if style.trim().is_empty() {
                return Err(anyhow!("--style must not be empty"));
            }
            Ok(Command::Generate(GenerateArgs {
                image_path: image_path.ok_or_else(|| anyhow!("--image is required"))?,
                style,
                analysis_path: analysis_path.ok_or_else(|| anyhow!("--analysis is required"))?,
                output_path,
            }))
        }
        "rotate" => Ok(Command::Rotate(RotateArgs {
            input_path: input_path.ok_or_else(|| anyhow!("--input is required"))?,
            output_path: output_path.ok_or_else(|| anyhow!("--output is required"))?,
        })),
        other => Err(anyhow!("Unknown command: {other}\n{}", usage())),
    }
}

async fn cancel_on_ctrl_c(handle: CancelHandle) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            warn!("Interrupt received; cancelling outfit image generation");
            handle.cancel();
        }
        Err(err) => warn!("Failed to listen for Ctrl-C: {err}"),
    }
}

async fn run_generate(config: &Config, args: GenerateArgs) -> anyhow::Result<()> {
    let raw_image = tokio::fs::read(&args.image_path)
        .await
        .with_context(|| format!("Failed to read {}", args.image_path.display()))?;
    let image = prepare_upload(&raw_image, config.upload_limits())?;

    let raw_analysis = tokio::fs::read_to_string(&args.analysis_path)
        .await
        .with_context(|| format!("Failed to read {}", args.analysis_path.display()))?;
    let mut analysis = OutfitAnalysis::from_json(&raw_analysis)
        .with_context(|| format!("Invalid analysis JSON in {}", args.analysis_path.display()))?;
    analysis.attach_shop_links();

    let items = analysis.outfit_items();
    let generated = if items.is_empty() {
        warn!("Analysis has no recommendations; skipping image generation");
        None
    } else {
        let pipeline = OutfitImagePipeline::from_config(config);
        let budget = pipeline.generator().config().poll_budget() + REQUEST_TIMEOUT_MARGIN;
        let (handle, token) = CancelToken::new();
        let watcher = tokio::spawn(cancel_on_ctrl_c(handle));
        let ctx = RunContext::with_timeout(budget).with_cancel(token);
        let generated = pipeline
            .generate_outfit_image_with(&image, &items, &args.style, &ctx)
            .await;
        watcher.abort();
        generated
    };
    match &generated {
        Some(url) => info!("Generated outfit image: {url}"),
        None => warn!("Outfit image was not produced; returning analysis without it"),
    }

    let response = AnalysisResponse::from(analysis.with_generated_image(generated));
    let rendered = serde_json::to_string_pretty(&response)?;
    match args.output_path {
        Some(path) => {
            tokio::fs::write(&path, rendered)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote analysis to {}", path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

async fn run_rotate(args: RotateArgs) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(&args.input_path)
        .await
        .with_context(|| format!("Failed to read {}", args.input_path.display()))?;
    let rotated = rotate_clockwise_90(&bytes)?;
    tokio::fs::write(&args.output_path, rotated)
        .await
        .with_context(|| format!("Failed to write {}", args.output_path.display()))?;
    info!(
        "Rotated {} -> {}",
        args.input_path.display(),
        args.output_path.display()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let _guards = init_logging(&config::log_level_from_env());
    let config = Config::load()?;

    let args: Vec<String> = std::env::args().collect();
    match parse_args(&args)? {
        Command::Generate(generate) => run_generate(&config, generate).await,
        Command::Rotate(rotate) => run_rotate(rotate).await,
    }
}
