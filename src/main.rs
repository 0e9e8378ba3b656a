use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use adgen::logger::{self, LogLevel, LoggerConfig};
use adgen::{
    find_scene, scene_catalog, AdRequestClient, CancellationToken, GeminiConfig, GenerationRequest,
    GenerationResult, ImageMimeType, ImagePayload, SceneFormat,
};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "adgen", version, about = "Place a product photo into an advertisement scene")]
struct Cli {
    /// Show debug output, including each request attempt
    #[arg(long, short, global = true)]
    verbose: bool,
    /// Log JSON lines without colors
    #[arg(long, global = true)]
    json_logs: bool,
    /// Also append log lines to this file
    #[arg(long, global = true)]
    log_file: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the built-in advertisement scenes
    Scenes(ScenesArgs),
    /// Generate an advertisement for a product image
    Generate(GenerateArgs),
}

#[derive(Debug, Parser)]
struct ScenesArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    /// Product photo (PNG, JPG or WEBP)
    #[arg(long)]
    image: PathBuf,
    /// Scene id, see `adgen scenes`
    #[arg(long)]
    scene: String,
    /// Where to write the generated image (default: ad-<scene>.<ext>)
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    max_attempts: Option<u32>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let dotenv_loaded = dotenv::dotenv().is_ok();

    if let Err(e) = logger::init_with_config(logger_config(&cli)) {
        eprintln!("adgen: {}", e);
    }
    if dotenv_loaded {
        log::debug!("✅ .env file loaded");
    } else {
        log::debug!("⚠️  No .env file found, using system environment variables");
    }

    match run(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("adgen error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn logger_config(cli: &Cli) -> LoggerConfig {
    let level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Warn
    };
    let config = if cli.json_logs {
        LoggerConfig::production()
    } else if cli.verbose {
        LoggerConfig::development()
    } else {
        LoggerConfig::new()
    };
    let config = config.with_level(level);
    match &cli.log_file {
        Some(path) => config.with_file_output(path),
        None => config,
    }
}

async fn run(command: Command) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match command {
        Command::Scenes(args) => {
            print_scenes(args.json)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Generate(args) => generate(args).await,
    }
}

fn print_scenes(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(scene_catalog())?);
        return Ok(());
    }

    for scene in scene_catalog() {
        println!(
            "{:<16} {:<18} {:<14} {}",
            scene.id,
            scene.name,
            scene.category.as_str(),
            scene.prompt_text
        );
    }
    Ok(())
}

async fn generate(args: GenerateArgs) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let scene = find_scene(&args.scene);
    if scene.is_none() {
        let known: Vec<&str> = scene_catalog().iter().map(|s| s.id).collect();
        eprintln!(
            "Unknown scene '{}'. Choose one of: {}",
            args.scene,
            known.join(", ")
        );
    }
    let image = match ImagePayload::from_path(&args.image) {
        Ok(image) => Some(image),
        Err(e) => {
            eprintln!("{}", e);
            None
        }
    };
    let request = match GenerationRequest::from_selection(image, scene) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(ExitCode::from(2));
        }
    };
    // from_selection only succeeds with a scene.
    let scene: &SceneFormat = scene.ok_or("scene missing after validation")?;

    let mut config = GeminiConfig::from_env();
    if let Some(model) = args.model {
        config = config.with_model(model);
    }
    if let Some(max_attempts) = args.max_attempts {
        config.retry = config.retry.with_max_attempts(max_attempts);
    }
    logger::log_config_info(&config);

    let client = AdRequestClient::new(config)?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("🛑 Interrupted, cancelling generation");
            ctrl_c.cancel();
        }
    });

    println!("Generating '{}' ad, this can take a moment...", scene.label());
    let result = {
        let _timer = logger::timer("Ad generation");
        client.submit_with_cancellation(request, &cancel).await
    };

    match result {
        GenerationResult::Success {
            image_bytes,
            mime_type,
        } => {
            let output = args
                .output
                .unwrap_or_else(|| default_output_path(scene, &mime_type));
            fs::write(&output, &image_bytes)?;
            println!("Saved generated ad to {}", output.display());
            Ok(ExitCode::SUCCESS)
        }
        GenerationResult::Failure { reason, kind } => {
            log::debug!("Failure kind: {}", kind);
            eprintln!("{}", reason);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn default_output_path(scene: &SceneFormat, mime_type: &str) -> PathBuf {
    let extension = ImageMimeType::parse(mime_type)
        .map(|m| m.extension())
        .unwrap_or("png");
    Path::new(".").join(format!("ad-{}.{}", scene.id, extension))
}
