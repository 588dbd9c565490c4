// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Circuit Harvester: salvage guide for old electronics
//!
//! Serves the web UI by default; `analyze` and `capture` run the pipeline
//! once from the terminal.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use circuit_harvester::analysis::GeminiClient;
use circuit_harvester::capture::{CameraSession, FrameFileCamera};
use circuit_harvester::config::AppConfig;
use circuit_harvester::model::{AnalysisResult, Phase};
use circuit_harvester::sanitizer::ImageUpload;
use circuit_harvester::session::SessionStore;
use circuit_harvester::shopping::{render_text, shopping_list, Selection};
use circuit_harvester::training::ClientMetadata;
use circuit_harvester::{AppController, HarvesterError, Result};

/// Circuit Harvester CLI - identify circuit boards and the parts worth saving
#[derive(Parser, Debug)]
#[command(name = "circuit-harvester")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Identify circuit boards and harvestable components with a multimodal AI model", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Output format for results
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the web UI
    Serve {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Open browser automatically
        #[arg(long)]
        open: bool,
    },

    /// Analyze a photo of a circuit board
    Analyze {
        /// JPG, PNG or WebP image
        image: PathBuf,

        /// Don't overwrite the saved session
        #[arg(long)]
        no_save: bool,

        /// Skip the training data upload
        #[arg(long)]
        no_training: bool,

        /// Print a shopping list for these part numbers (1-based)
        #[arg(short, long, value_delimiter = ',')]
        list: Vec<usize>,
    },

    /// Grab a frame from a camera frame file and analyze it
    Capture {
        /// Frame file kept fresh by an external grabber (fswebcam, libcamera-still)
        #[arg(long)]
        frame: PathBuf,

        /// Don't overwrite the saved session
        #[arg(long)]
        no_save: bool,
    },

    /// Saved session operations
    Session {
        #[command(subcommand)]
        action: SessionCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show configuration and AI key status
    Status,
}

#[derive(Subcommand, Debug)]
enum SessionCommands {
    /// Show the last analysis, if it has not expired
    Show,

    /// Forget the last analysis
    Clear,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if !cli.quiet {
        info!("Circuit Harvester v{}", env!("CARGO_PKG_VERSION"));
    }

    let config = AppConfig::load(&cli.config)?;

    match cli.command {
        Some(Commands::Serve { host, port, open }) => run_serve(config, host, port, open).await,
        Some(Commands::Analyze { image, no_save, no_training, list }) => {
            run_analyze(config, &image, no_save, no_training, &list, &cli.format).await
        }
        Some(Commands::Capture { frame, no_save }) => run_capture(config, &frame, no_save, &cli.format).await,
        Some(Commands::Session { action }) => run_session_command(config, action, &cli.format).await,
        Some(Commands::Config { action }) => run_config_command(config, action, &cli.config),
        Some(Commands::Status) => run_status(config),
        None => run_serve(config, None, None, false).await,
    }
}

async fn run_serve(mut config: AppConfig, host: Option<String>, port: Option<u16>, open: bool) -> Result<()> {
    if let Some(host) = host {
        config.web.host = host;
    }
    if let Some(port) = port {
        config.web.port = port;
    }

    let controller = Arc::new(AppController::open(&config)?);

    if open {
        circuit_harvester::web::open_in_browser(&config);
    }

    circuit_harvester::web::start_server(config, controller).await
}

/// Controller for one-shot commands
fn cli_controller(config: &AppConfig, no_save: bool) -> Result<AppController> {
    if no_save {
        let analyzer = GeminiClient::from_config(config)?;
        let sessions = SessionStore::in_memory(config.session.ttl());
        Ok(AppController::from_config(config, Arc::new(analyzer), sessions))
    } else {
        AppController::open(config)
    }
}

async fn run_analyze(
    mut config: AppConfig,
    image: &Path,
    no_save: bool,
    no_training: bool,
    list: &[usize],
    format: &str,
) -> Result<()> {
    if no_training {
        config.training.enabled = false;
    }
    let controller = cli_controller(&config, no_save)?;

    let upload = ImageUpload::from_path(image)?;
    info!("Analyzing {}", image.display());
    let result = controller.submit(upload, ClientMetadata::from_user_agent(None)).await?;

    print_result(&result, format)?;
    if !list.is_empty() {
        let selection = Selection::from_indices(list.iter().filter(|n| **n > 0).map(|n| n - 1));
        println!("\n{}", render_text(&result, &shopping_list(&result, &selection)));
    }
    controller.drain_uploads().await;
    Ok(())
}

async fn run_capture(config: AppConfig, frame: &Path, no_save: bool, format: &str) -> Result<()> {
    let controller = cli_controller(&config, no_save)?;

    let camera = FrameFileCamera::new(frame);
    let image = match CameraSession::start(&camera, &config.camera).and_then(CameraSession::capture) {
        Ok(image) => image,
        Err(e) => {
            controller.fail(&e);
            return Err(e);
        }
    };

    let result = controller
        .submit_data_uri(&image, ClientMetadata::from_user_agent(None))
        .await?;
    print_result(&result, format)?;
    controller.drain_uploads().await;
    Ok(())
}

fn print_result(result: &AnalysisResult, format: &str) -> Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    println!("{}", result.device_name);
    if let Some(age) = &result.estimated_age {
        println!("  Era: {}", age);
    }
    println!("  {}", result.device_function);

    if !result.safety_warnings.is_empty() {
        println!("\nSafety first:");
        for warning in &result.safety_warnings {
            println!("  ! {}", warning);
        }
    }

    println!("\nHarvestable parts:");
    for (i, part) in result.parts.iter().enumerate() {
        println!("  {}. {} ({}) - {} value", i + 1, part.name, part.kind, part.harvestability);
        println!("     {}", part.description);
        for idea in &part.project_ideas {
            println!("     * {}", idea);
        }
    }
    if result.parts.is_empty() {
        println!("  (none identified)");
    }
    Ok(())
}

async fn run_session_command(config: AppConfig, action: SessionCommands, format: &str) -> Result<()> {
    let sessions = SessionStore::open(&config.session)?;

    match action {
        SessionCommands::Show => match sessions.load().await {
            Some(state) => match (state.phase(), &state.result) {
                (Phase::Succeeded, Some(result)) => print_result(result, format)?,
                _ => println!("Saved session has no analysis result"),
            },
            None => println!("No saved session (or it expired after {} minutes)", sessions.ttl().as_secs() / 60),
        },
        SessionCommands::Clear => {
            sessions.clear().await;
            println!("Session cleared");
        }
    }
    Ok(())
}

fn run_config_command(config: AppConfig, action: ConfigCommands, config_path: &Path) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        ConfigCommands::Generate { output } => {
            if output.exists() {
                return Err(HarvesterError::Config(format!(
                    "{} already exists; remove it first",
                    output.display()
                )));
            }
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            config.validate()?;
            println!("Configuration at {:?} is valid", config_path);
            println!("  Model: {}", config.ai_engine.model);
            println!("  Session store: {}", config.session.path);
            println!("  Web UI: {}:{}", config.web.host, config.web.port);
        }
    }

    Ok(())
}

fn run_status(config: AppConfig) -> Result<()> {
    println!("Circuit Harvester v{} Status", env!("CARGO_PKG_VERSION"));
    println!("===========================");

    let key = if config.ai_engine.api_key().is_some() {
        "set".to_string()
    } else {
        format!("missing (export {})", config.ai_engine.api_key_env)
    };

    println!("\nAI engine:");
    println!("  Endpoint: {}", config.ai_engine.url);
    println!("  Model: {}", config.ai_engine.model);
    println!("  API key: {}", key);

    println!("\nPipeline:");
    println!("  Accepted types: {}", config.sanitizer.allowed_mime_types.join(", "));
    println!("  Max upload: {}MB", config.sanitizer.max_bytes / (1024 * 1024));
    println!("  Max dimension: {}px", config.sanitizer.max_dimension);
    println!("  Session: {} (expires after {}s)", config.session.path, config.session.ttl_secs);
    println!(
        "  Training upload: {}",
        if config.training.enabled { "enabled (simulated)" } else { "disabled" }
    );
    println!("  Web UI: {}", circuit_harvester::web::ui_url(&config));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["circuit-harvester"]).unwrap();
        assert!(!cli.verbose);
        assert!(cli.command.is_none());
        assert_eq!(cli.format, "text");
    }

    #[test]
    fn test_cli_serve_command() {
        let cli = Cli::try_parse_from(["circuit-harvester", "serve", "-H", "0.0.0.0", "--port", "9000", "--open"])
            .unwrap();

        match cli.command {
            Some(Commands::Serve { host, port, open }) => {
                assert_eq!(host.as_deref(), Some("0.0.0.0"));
                assert_eq!(port, Some(9000));
                assert!(open);
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_cli_analyze_command() {
        let cli = Cli::try_parse_from([
            "circuit-harvester", "analyze", "/tmp/board.jpg", "--no-save", "--list", "1,3", "--format", "json",
        ])
        .unwrap();

        assert_eq!(cli.format, "json");
        match cli.command {
            Some(Commands::Analyze { image, no_save, no_training, list }) => {
                assert_eq!(image, PathBuf::from("/tmp/board.jpg"));
                assert!(no_save);
                assert!(!no_training);
                assert_eq!(list, vec![1, 3]);
            }
            _ => panic!("Expected Analyze command"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["circuit-harvester", "status", "--format", "xml"]).is_err());
    }

    #[test]
    fn test_cli_session_clear() {
        let cli = Cli::try_parse_from(["circuit-harvester", "session", "clear"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Session { action: SessionCommands::Clear })
        ));
    }
}
